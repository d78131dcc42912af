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

//! Points ledger engine.
//!
//! The [`Engine`] owns the store and runs every operation that moves points:
//!
//! - **Issue voucher**: converts a spend into an active voucher with a fresh code.
//! - **Claim voucher**: marks a voucher used and credits its points to a shopper.
//! - **Generate claim**: debits a reward's cost and creates a pending claim.
//!
//! The claim lifecycle ([`Engine::verify_claim`], [`Engine::issue_claim`]) and
//! reward eligibility ([`Engine::list_available`]) live in their own modules.
//!
//! # Thread Safety
//!
//! `Engine` is `Send + Sync` and meant to be shared behind an `Arc` by
//! concurrent request handlers. Each mutating operation runs in a single store
//! transaction, so a status check and the write that depends on it can never
//! interleave with another writer.

use crate::base::{CampaignId, Code, RewardId, ShopperId};
use crate::capability::Staff;
use crate::claim::ClaimGenerated;
use crate::clock::{Clock, SystemClock};
use crate::code::{self, CodeGenerator, CodeKind, RandomCodes};
use crate::config::LedgerConfig;
use crate::error::Entity;
use crate::journal::{Journal, LedgerEntry};
use crate::notice::Notice;
use crate::rules::compute_award;
use crate::shopper::Shopper;
use crate::store::{Snapshot, Store, Transaction};
use crate::voucher::{IssuedVoucher, VoucherClaimed};
use crate::LedgerError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

/// Ledger engine managing shoppers, vouchers and claims.
///
/// # Invariants
///
/// - A shopper's points equal credited voucher values minus debited claim costs.
/// - Points never go negative; the affordability check and the debit share a
///   transaction.
/// - A voucher is credited at most once and a claim issued at most once.
/// - Voucher codes are unique among vouchers, claim codes among claims.
pub struct Engine {
    store: Store,
    config: LedgerConfig,
    codes: Box<dyn CodeGenerator>,
    clock: Arc<dyn Clock>,
}

impl Engine {
    /// Creates an engine with default configuration and the system clock.
    pub fn new() -> Self {
        Self::with_config(LedgerConfig::default())
    }

    pub fn with_config(config: LedgerConfig) -> Self {
        Engine {
            store: Store::new(),
            codes: Box::new(RandomCodes::new(config.code_length)),
            clock: Arc::new(SystemClock),
            config,
        }
    }

    /// Replaces the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the code generator.
    pub fn with_generator(mut self, generator: impl CodeGenerator + 'static) -> Self {
        self.codes = Box::new(generator);
        self
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Journal of every committed credit and debit.
    pub fn journal(&self) -> &Journal {
        self.store.journal()
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn begin(&self) -> Result<Transaction<'_>, LedgerError> {
        self.store.begin(self.config.deadline())
    }

    pub(crate) fn snapshot(&self) -> Result<Snapshot<'_>, LedgerError> {
        self.store.snapshot(self.config.deadline())
    }

    /// Registers a shopper with a zero balance.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::PhoneTaken`] if the phone is already registered.
    pub fn register_shopper(&self, phone: &str, name: &str) -> Result<Shopper, LedgerError> {
        let now = self.now();
        let mut tx = self.begin()?;
        let shopper = tx.insert_shopper(phone.to_owned(), name.to_owned(), now)?;
        tx.commit()?;

        info!(shopper = %shopper.id, "shopper registered");
        Ok(shopper)
    }

    pub fn shopper(&self, id: ShopperId) -> Result<Shopper, LedgerError> {
        self.snapshot()?
            .shopper(id)
            .cloned()
            .ok_or(LedgerError::NotFound(Entity::Shopper))
    }

    pub fn shopper_by_phone(&self, phone: &str) -> Result<Shopper, LedgerError> {
        self.snapshot()?
            .shopper_by_phone(phone)
            .cloned()
            .ok_or(LedgerError::NotFound(Entity::Shopper))
    }

    /// Current points of a shopper.
    pub fn balance(&self, id: ShopperId) -> Result<u64, LedgerError> {
        self.shopper(id).map(|shopper| shopper.points())
    }

    /// All shoppers ordered by id.
    pub fn shoppers(&self) -> Result<Vec<Shopper>, LedgerError> {
        let mut shoppers: Vec<Shopper> = self.snapshot()?.shoppers().cloned().collect();
        shoppers.sort_by_key(|shopper| shopper.id);
        Ok(shoppers)
    }

    /// Converts a spend into a new active voucher.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotFound`] - Campaign does not exist.
    /// - [`LedgerError::CampaignInactive`] - Campaign window does not include now.
    /// - [`LedgerError::BelowMinimum`] - Spend is under the campaign floor.
    /// - [`LedgerError::InvalidAmount`] - Spend is not positive.
    /// - [`LedgerError::ResourceExhausted`] - No free code was found.
    pub fn issue_voucher(
        &self,
        _staff: &Staff,
        campaign_id: CampaignId,
        spend: Decimal,
    ) -> Result<IssuedVoucher, LedgerError> {
        let now = self.now();
        let mut tx = self.begin()?;

        let campaign = tx
            .campaign(campaign_id)
            .cloned()
            .ok_or(LedgerError::NotFound(Entity::Campaign))?;
        let points = compute_award(&campaign, spend, now)?;

        let code = code::mint(
            &*self.codes,
            CodeKind::Voucher,
            self.config.max_mint_attempts,
            |code| tx.voucher_code_taken(code),
        )?;
        let voucher = tx.insert_voucher(campaign.id, code, points, now)?;
        tx.commit()?;

        info!(voucher = %voucher.id, campaign = %campaign.id, points, "voucher issued");
        let notice = Notice {
            message: format!(
                "Scan to claim {points} point(s) from {}.",
                campaign.title
            ),
            link: self.config.claim_link(&voucher.code),
            code: voucher.code.clone(),
        };
        Ok(IssuedVoucher {
            voucher,
            campaign_title: campaign.title,
            notice,
        })
    }

    /// Redeems a voucher for a shopper.
    ///
    /// The status flip, the shopper binding and the credit commit together;
    /// of any number of concurrent attempts on one code exactly one succeeds
    /// and the rest observe [`LedgerError::AlreadyUsed`].
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotFound`] - Shopper or voucher does not exist.
    /// - [`LedgerError::AlreadyUsed`] - Voucher was redeemed before.
    pub fn claim_voucher(&self, code: &Code, shopper_id: ShopperId) -> Result<VoucherClaimed, LedgerError> {
        let now = self.now();
        let mut tx = self.begin()?;

        if tx.shopper(shopper_id).is_none() {
            return Err(LedgerError::NotFound(Entity::Shopper));
        }
        let voucher = tx
            .voucher_by_code(code)
            .cloned()
            .ok_or(LedgerError::NotFound(Entity::Voucher))?;
        let campaign_title = tx
            .campaign(voucher.campaign_id)
            .map(|campaign| campaign.title.clone())
            .ok_or(LedgerError::NotFound(Entity::Campaign))?;

        let voucher = tx.update_voucher(voucher.id, |voucher| {
            voucher.redeem(shopper_id, now)?;
            Ok(voucher.clone())
        })?;
        let points = voucher.points_value;
        let total_points = tx.update_shopper(shopper_id, |shopper| shopper.credit(points))?;
        tx.record(LedgerEntry::credit(shopper_id, voucher.id, points, now));
        tx.commit()?;

        info!(voucher = %voucher.id, shopper = %shopper_id, points, total_points, "voucher claimed");
        let notice = Notice {
            code: voucher.code.clone(),
            message: format!("Successfully claimed {points} points!"),
            link: None,
        };
        Ok(VoucherClaimed {
            voucher,
            points_earned: points,
            total_points,
            campaign_title,
            notice,
        })
    }

    /// [`Engine::claim_voucher`] for a shopper addressed by phone.
    pub fn claim_voucher_by_phone(&self, code: &Code, phone: &str) -> Result<VoucherClaimed, LedgerError> {
        let shopper = self.shopper_by_phone(phone)?;
        self.claim_voucher(code, shopper.id)
    }

    /// Spends points on a reward and creates a pending claim for it.
    ///
    /// Points are debited now, not when the claim is issued. The balance
    /// check runs inside the debiting transaction, so concurrent requests for
    /// one shopper can never overdraw it.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotFound`] - Shopper or reward does not exist.
    /// - [`LedgerError::InsufficientPoints`] - Balance does not cover the reward.
    /// - [`LedgerError::ResourceExhausted`] - No free claim code was found.
    pub fn generate_claim(&self, shopper_id: ShopperId, reward_id: RewardId) -> Result<ClaimGenerated, LedgerError> {
        let now = self.now();
        let mut tx = self.begin()?;

        let current = tx
            .shopper(shopper_id)
            .map(|shopper| shopper.points())
            .ok_or(LedgerError::NotFound(Entity::Shopper))?;
        let reward = tx
            .reward(reward_id)
            .cloned()
            .ok_or(LedgerError::NotFound(Entity::Reward))?;
        if tx.campaign(reward.campaign_id).is_none() {
            return Err(LedgerError::NotFound(Entity::Campaign));
        }
        if current < reward.required_points {
            return Err(LedgerError::InsufficientPoints {
                current,
                required: reward.required_points,
            });
        }

        let code = code::mint(
            &*self.codes,
            CodeKind::Claim,
            self.config.max_mint_attempts,
            |code| tx.claim_code_taken(code),
        )?;
        let claim = tx.insert_claim(reward.id, shopper_id, code, now)?;
        let remaining_points =
            tx.update_shopper(shopper_id, |shopper| shopper.debit(reward.required_points))?;
        tx.record(LedgerEntry::debit(shopper_id, claim.id, reward.required_points, now));
        tx.commit()?;

        info!(
            claim = %claim.id,
            reward = %reward.id,
            shopper = %shopper_id,
            remaining_points,
            "claim generated"
        );
        let notice = Notice {
            code: claim.code.clone(),
            message: format!("Show this code to redeem {}.", reward.title),
            link: None,
        };
        Ok(ClaimGenerated {
            claim,
            reward_title: reward.title,
            remaining_points,
            notice,
        })
    }

    /// [`Engine::generate_claim`] for a shopper addressed by phone.
    pub fn generate_claim_by_phone(&self, phone: &str, reward_id: RewardId) -> Result<ClaimGenerated, LedgerError> {
        let shopper = self.shopper_by_phone(phone)?;
        self.generate_claim(shopper.id, reward_id)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
