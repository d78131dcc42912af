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

//! Error types for ledger operations.
//!
//! The display strings are the messages shown to shoppers and staff, so the
//! calling layer can forward them without rewording.

use crate::code::CodeKind;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;
use thiserror::Error;

/// Kind of record an operation failed to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Company,
    Campaign,
    Reward,
    Shopper,
    Voucher,
    Claim,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Entity::Company => "Company",
            Entity::Campaign => "Campaign",
            Entity::Reward => "Reward",
            Entity::Shopper => "Shopper",
            Entity::Voucher => "Voucher",
            Entity::Claim => "Claim",
        };
        f.write_str(name)
    }
}

/// Ledger operation errors.
///
/// Every error is terminal for the operation that produced it; any writes made
/// before the failure have already been rolled back when it is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Referenced record does not exist
    #[error("{0} not found.")]
    NotFound(Entity),

    /// Current time falls outside the campaign window
    #[error("Campaign is not active.")]
    CampaignInactive,

    /// Spend converts to fewer points than the campaign floor
    #[error("Minimum spend required for {min_points} point(s) is {min_spend}.")]
    BelowMinimum { min_points: u64, min_spend: Decimal },

    /// Voucher was already redeemed
    #[error("This voucher has already been used.")]
    AlreadyUsed { used_at: Option<DateTime<Utc>> },

    /// Claim was already handed out
    #[error("This claim has already been issued.")]
    AlreadyIssued { issued_at: DateTime<Utc> },

    /// Balance does not cover the reward
    #[error("Insufficient points. You have {current} points but need {required}.")]
    InsufficientPoints { current: u64, required: u64 },

    /// No free code was found within the attempt budget
    #[error("could not mint a unique {kind} code after {attempts} attempts")]
    ResourceExhausted { kind: CodeKind, attempts: u32 },

    /// The store aborted the transaction; the whole operation may be retried
    #[error("transaction aborted due to concurrent access")]
    TransactionConflict,

    #[error("Phone number is already registered.")]
    PhoneTaken,

    /// Spend amount is zero or negative
    #[error("Spend amount must be greater than 0.")]
    InvalidAmount,

    #[error("End date must be after start date.")]
    InvalidSchedule,

    #[error("Spend per point must be greater than 0.")]
    InvalidRate,

    /// Point thresholds must be at least one
    #[error("Points must be at least 1.")]
    InvalidPoints,
}

#[cfg(test)]
mod tests {
    use super::{Entity, LedgerError};
    use crate::code::CodeKind;
    use rust_decimal_macros::dec;

    #[test]
    fn error_display_messages() {
        assert_eq!(
            LedgerError::NotFound(Entity::Shopper).to_string(),
            "Shopper not found."
        );
        assert_eq!(
            LedgerError::NotFound(Entity::Voucher).to_string(),
            "Voucher not found."
        );
        assert_eq!(
            LedgerError::CampaignInactive.to_string(),
            "Campaign is not active."
        );
        assert_eq!(
            LedgerError::BelowMinimum {
                min_points: 5,
                min_spend: dec!(50)
            }
            .to_string(),
            "Minimum spend required for 5 point(s) is 50."
        );
        assert_eq!(
            LedgerError::AlreadyUsed { used_at: None }.to_string(),
            "This voucher has already been used."
        );
        assert_eq!(
            LedgerError::InsufficientPoints {
                current: 2,
                required: 10
            }
            .to_string(),
            "Insufficient points. You have 2 points but need 10."
        );
        assert_eq!(
            LedgerError::ResourceExhausted {
                kind: CodeKind::Claim,
                attempts: 8
            }
            .to_string(),
            "could not mint a unique claim code after 8 attempts"
        );
        assert_eq!(
            LedgerError::PhoneTaken.to_string(),
            "Phone number is already registered."
        );
    }

    #[test]
    fn errors_are_cloneable() {
        let error = LedgerError::InsufficientPoints {
            current: 1,
            required: 3,
        };
        let cloned = error.clone();
        assert_eq!(error, cloned);
    }
}
