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

//! Vouchers.
//!
//! ```text
//! Voucher (Active) ──redeem──► Voucher (Used { shopper, at })
//! ```
//!
//! `Used` is terminal. The shopper binding and the redemption time only exist
//! in the `Used` state, so an active voucher can never carry a shopper.

use crate::LedgerError;
use crate::base::{CampaignId, Code, ShopperId, VoucherId};
use crate::notice::Notice;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoucherStatus {
    Active,
    Used {
        shopper_id: ShopperId,
        used_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Voucher {
    pub id: VoucherId,
    pub campaign_id: CampaignId,
    pub code: Code,
    pub points_value: u64,
    pub status: VoucherStatus,
    pub created_at: DateTime<Utc>,
}

impl Voucher {
    pub fn is_active(&self) -> bool {
        self.status == VoucherStatus::Active
    }

    pub fn shopper_id(&self) -> Option<ShopperId> {
        match self.status {
            VoucherStatus::Active => None,
            VoucherStatus::Used { shopper_id, .. } => Some(shopper_id),
        }
    }

    pub fn used_at(&self) -> Option<DateTime<Utc>> {
        match self.status {
            VoucherStatus::Active => None,
            VoucherStatus::Used { used_at, .. } => Some(used_at),
        }
    }

    /// Binds the voucher to `shopper_id`.
    pub(crate) fn redeem(&mut self, shopper_id: ShopperId, now: DateTime<Utc>) -> Result<(), LedgerError> {
        match self.status {
            VoucherStatus::Active => {
                self.status = VoucherStatus::Used {
                    shopper_id,
                    used_at: now,
                };
                Ok(())
            }
            VoucherStatus::Used { used_at, .. } => Err(LedgerError::AlreadyUsed {
                used_at: Some(used_at),
            }),
        }
    }
}

/// Result of [`Engine::issue_voucher`](crate::Engine::issue_voucher).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuedVoucher {
    pub voucher: Voucher,
    pub campaign_title: String,
    pub notice: Notice,
}

/// Result of [`Engine::claim_voucher`](crate::Engine::claim_voucher).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoucherClaimed {
    pub voucher: Voucher,
    pub points_earned: u64,
    pub total_points: u64,
    pub campaign_title: String,
    pub notice: Notice,
}
