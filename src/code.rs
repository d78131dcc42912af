// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Redemption code generation.
//!
//! Generators are stateless and may repeat themselves. [`mint`] turns a
//! generator into a source of unused codes by retrying against an existence
//! check supplied by the caller, normally a lookup inside the transaction that
//! will insert the record.

use crate::LedgerError;
use crate::base::Code;
use rand::Rng;
use serde::Serialize;
use std::fmt;
use tracing::debug;

/// Characters a generated code is drawn from.
pub const ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Default number of characters in a generated code.
pub const DEFAULT_CODE_LENGTH: usize = 12;

/// Which unique index a code is minted against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeKind {
    Voucher,
    Claim,
}

impl fmt::Display for CodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodeKind::Voucher => f.write_str("voucher"),
            CodeKind::Claim => f.write_str("claim"),
        }
    }
}

/// Source of candidate codes.
pub trait CodeGenerator: Send + Sync {
    fn generate(&self) -> Code;
}

/// Draws each character uniformly from [`ALPHABET`].
#[derive(Debug, Clone, Copy)]
pub struct RandomCodes {
    length: usize,
}

impl RandomCodes {
    /// Lengths below 1 are raised to 1.
    pub fn new(length: usize) -> Self {
        Self {
            length: length.max(1),
        }
    }

    pub fn length(&self) -> usize {
        self.length
    }
}

impl Default for RandomCodes {
    fn default() -> Self {
        Self::new(DEFAULT_CODE_LENGTH)
    }
}

impl CodeGenerator for RandomCodes {
    fn generate(&self) -> Code {
        let mut rng = rand::rng();
        let code: String = (0..self.length)
            .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
            .collect();
        Code::from(code)
    }
}

/// Generates codes until `exists` reports one as free.
///
/// The code is not reserved; the caller must insert the owning record before
/// releasing the transaction `exists` reads from.
///
/// # Errors
///
/// Returns [`LedgerError::ResourceExhausted`] once `max_attempts` candidates
/// have collided. `None` retries without bound.
pub fn mint<G, F>(
    generator: &G,
    kind: CodeKind,
    max_attempts: Option<u32>,
    mut exists: F,
) -> Result<Code, LedgerError>
where
    G: CodeGenerator + ?Sized,
    F: FnMut(&Code) -> bool,
{
    let mut attempts: u32 = 0;
    loop {
        if let Some(max) = max_attempts {
            if attempts >= max {
                return Err(LedgerError::ResourceExhausted { kind, attempts });
            }
        }
        attempts = attempts.saturating_add(1);

        let code = generator.generate();
        if !exists(&code) {
            return Ok(code);
        }
        debug!(%kind, attempts, "generated code already taken, retrying");
    }
}
