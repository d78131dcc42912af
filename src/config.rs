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

//! Engine configuration.

use crate::base::Code;
use crate::code::DEFAULT_CODE_LENGTH;
use serde::Deserialize;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("code_length must be at least 1, got {0}")]
    CodeLength(usize),
}

/// Tunables for an [`Engine`](crate::Engine).
///
/// Deserializable with every field optional; missing fields take the
/// [`Default`] values.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Characters per generated voucher or claim code.
    pub code_length: usize,
    /// Collisions tolerated while minting one code. `None` retries forever.
    pub max_mint_attempts: Option<u32>,
    /// Longest wait for the store lock before an operation is aborted.
    pub lock_timeout_ms: u64,
    /// Chat bot number used to build voucher claim links.
    pub bot_number: Option<String>,
}

impl LedgerConfig {
    pub const DEFAULT_MAX_MINT_ATTEMPTS: u32 = 64;
    pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5_000;

    /// Checks the values an engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::CodeLength`] for a zero code length; every code
    /// after the first empty one would collide.
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.code_length == 0 {
            return Err(ConfigError::CodeLength(self.code_length));
        }
        Ok(self)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Deadline for a store operation starting now.
    pub fn deadline(&self) -> Instant {
        Instant::now() + self.lock_timeout()
    }

    /// Chat link that pre-fills `code` as the message to the bot.
    pub fn claim_link(&self, code: &Code) -> Option<String> {
        self.bot_number
            .as_deref()
            .map(|number| format!("https://wa.me/{number}?text={code}"))
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            code_length: DEFAULT_CODE_LENGTH,
            max_mint_attempts: Some(Self::DEFAULT_MAX_MINT_ATTEMPTS),
            lock_timeout_ms: Self::DEFAULT_LOCK_TIMEOUT_MS,
            bot_number: None,
        }
    }
}
