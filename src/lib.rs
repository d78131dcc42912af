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

//! # Loyalty Ledger
//!
//! This library provides a points ledger for merchant loyalty campaigns.
//! Spend turns into single-use vouchers. A redeemed voucher credits a
//! shopper's balance, and the balance pays for rewards through single-use
//! claim codes that staff issue in person.
//!
//! ## Core Components
//!
//! - [`Engine`]: Runs every operation against the shared store
//! - [`compute_award`]: Campaign rule converting spend into points
//! - [`mint`]: Retries a [`CodeGenerator`] until a code is unused
//! - [`Voucher`] / [`Claim`]: Single-use tokens and their state machines
//! - [`LedgerError`]: Error types for ledger operation failures
//!
//! ## Example
//!
//! ```
//! use chrono::{TimeDelta, Utc};
//! use loyalty_ledger::{Engine, NewCampaign, Role};
//! use rust_decimal_macros::dec;
//!
//! let engine = Engine::new();
//! let owner = Role::Owner.owner().unwrap();
//! let staff = owner.as_staff();
//!
//! let company = engine.register_company("Kopi Kita", None).unwrap();
//! let campaign = engine
//!     .create_campaign(
//!         &owner,
//!         NewCampaign {
//!             company_id: company.id,
//!             title: "Coffee Club".into(),
//!             start_date: Utc::now() - TimeDelta::days(1),
//!             end_date: Utc::now() + TimeDelta::days(30),
//!             min_points: Some(5),
//!             spend_per_point: dec!(10),
//!             description: None,
//!         },
//!     )
//!     .unwrap();
//! let latte = engine.create_reward(&staff, campaign.id, "Free latte", 10).unwrap();
//! let shopper = engine.register_shopper("081234567890", "Ayu").unwrap();
//!
//! // Spend 120 at 10 per point
//! let issued = engine.issue_voucher(&staff, campaign.id, dec!(120)).unwrap();
//! let claimed = engine.claim_voucher(&issued.voucher.code, shopper.id).unwrap();
//! assert_eq!(claimed.total_points, 12);
//!
//! // Points are spent when the claim is generated
//! let generated = engine.generate_claim(shopper.id, latte.id).unwrap();
//! assert_eq!(generated.remaining_points, 2);
//!
//! let detail = engine.issue_claim(&staff, &generated.claim.code).unwrap();
//! assert!(detail.issued_at().is_some());
//! ```
//!
//! ## Thread Safety
//!
//! The engine is shared by reference across request handlers. All state lives
//! in one store whose transactions serialize writers, so concurrent redemptions
//! of one code, or concurrent spends from one balance, resolve to exactly one
//! winner.

mod base;
pub mod capability;
mod catalog;
mod claim;
pub mod clock;
pub mod code;
mod config;
mod eligibility;
mod engine;
pub mod error;
pub mod journal;
mod notice;
mod rules;
mod shopper;
mod store;
mod voucher;

pub use base::{CampaignId, ClaimId, Code, CompanyId, RewardId, ShopperId, VoucherId};
pub use capability::{Owner, Role, Staff, UnknownRole};
pub use catalog::{Campaign, Company, NewCampaign, Reward};
pub use claim::{Claim, ClaimDetail, ClaimGenerated, ClaimStatus};
pub use clock::{Clock, FixedClock, SystemClock};
pub use code::{CodeGenerator, CodeKind, RandomCodes, mint};
pub use config::{ConfigError, LedgerConfig};
pub use eligibility::{AvailableReward, Eligibility};
pub use engine::Engine;
pub use error::{Entity, LedgerError};
pub use journal::{EntryKey, Journal, LedgerEntry};
pub use notice::Notice;
pub use rules::compute_award;
pub use shopper::Shopper;
pub use voucher::{IssuedVoucher, Voucher, VoucherClaimed, VoucherStatus};
