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

//! Shopper accounts and their points balance.
//!
//! The balance only moves through [`Shopper::credit`] (voucher redeemed) and
//! [`Shopper::debit`] (claim generated), both crate-private and only called
//! inside a store transaction.
//!
//! # Example
//!
//! ```
//! use loyalty_ledger::Engine;
//!
//! let engine = Engine::new();
//! let shopper = engine.register_shopper("081234567890", "Ayu").unwrap();
//! assert_eq!(shopper.points(), 0);
//! ```

use crate::LedgerError;
use crate::base::ShopperId;
use chrono::{DateTime, Utc};
use serde::ser::{Serialize, SerializeStruct, Serializer};

/// A registered shopper, identified to the outside world by phone number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shopper {
    pub id: ShopperId,
    pub phone: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    points: u64,
}

impl Shopper {
    pub(crate) fn new(id: ShopperId, phone: String, name: String, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            phone,
            name,
            created_at,
            points: 0,
        }
    }

    pub fn points(&self) -> u64 {
        self.points
    }

    /// Adds redeemed voucher points. Returns the new balance.
    pub(crate) fn credit(&mut self, points: u64) -> Result<u64, LedgerError> {
        self.points = self
            .points
            .checked_add(points)
            .ok_or(LedgerError::InvalidPoints)?;
        Ok(self.points)
    }

    /// Spends points on a reward. Returns the remaining balance.
    ///
    /// The balance is left untouched when it does not cover `points`.
    pub(crate) fn debit(&mut self, points: u64) -> Result<u64, LedgerError> {
        if self.points < points {
            return Err(LedgerError::InsufficientPoints {
                current: self.points,
                required: points,
            });
        }
        self.points -= points;
        Ok(self.points)
    }
}

impl Serialize for Shopper {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("Shopper", 4)?;
        state.serialize_field("shopper", &self.id)?;
        state.serialize_field("phone", &self.phone)?;
        state.serialize_field("name", &self.name)?;
        state.serialize_field("points", &self.points)?;
        state.end()
    }
}
