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

//! Transactional record store.
//!
//! All tables sit behind one [`RwLock`]. A [`Transaction`] holds the write
//! lock for its whole lifetime, so writers are serialized and every
//! check-then-write sequence inside one transaction is isolated from other
//! writers. A [`Snapshot`] holds the read lock and sees a consistent view.
//!
//! Writes are applied in place and recorded in an undo log. Dropping a
//! transaction without calling [`Transaction::commit`] replays the log in
//! reverse, so an early `?` return rolls back every row and index it touched.
//!
//! Lock acquisition is bounded by a deadline; running out of time surfaces as
//! [`LedgerError::TransactionConflict`].

use crate::base::{CampaignId, ClaimId, Code, CompanyId, RewardId, ShopperId, VoucherId};
use crate::catalog::{Campaign, Company, NewCampaign, Reward};
use crate::claim::{Claim, ClaimStatus};
use crate::error::Entity;
use crate::journal::{Journal, LedgerEntry};
use crate::shopper::Shopper;
use crate::voucher::{Voucher, VoucherStatus};
use crate::LedgerError;
use chrono::{DateTime, Utc};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::HashMap;
use std::ops::Deref;
use std::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct Sequences {
    company: u32,
    campaign: u32,
    reward: u32,
    shopper: u32,
    voucher: u32,
    claim: u32,
}

fn next(sequence: &mut u32) -> u32 {
    *sequence += 1;
    *sequence
}

/// Row storage plus unique indexes on shopper phone, voucher code and claim code.
#[derive(Debug, Default)]
pub struct Tables {
    companies: HashMap<CompanyId, Company>,
    campaigns: HashMap<CampaignId, Campaign>,
    rewards: HashMap<RewardId, Reward>,
    shoppers: HashMap<ShopperId, Shopper>,
    vouchers: HashMap<VoucherId, Voucher>,
    claims: HashMap<ClaimId, Claim>,
    phones: HashMap<String, ShopperId>,
    voucher_codes: HashMap<Code, VoucherId>,
    claim_codes: HashMap<Code, ClaimId>,
    sequences: Sequences,
}

impl Tables {
    pub fn company(&self, id: CompanyId) -> Option<&Company> {
        self.companies.get(&id)
    }

    pub fn campaign(&self, id: CampaignId) -> Option<&Campaign> {
        self.campaigns.get(&id)
    }

    pub fn reward(&self, id: RewardId) -> Option<&Reward> {
        self.rewards.get(&id)
    }

    pub fn rewards(&self) -> impl Iterator<Item = &Reward> {
        self.rewards.values()
    }

    pub fn shopper(&self, id: ShopperId) -> Option<&Shopper> {
        self.shoppers.get(&id)
    }

    pub fn shopper_by_phone(&self, phone: &str) -> Option<&Shopper> {
        self.phones.get(phone).and_then(|id| self.shoppers.get(id))
    }

    pub fn shoppers(&self) -> impl Iterator<Item = &Shopper> {
        self.shoppers.values()
    }

    pub fn voucher_by_code(&self, code: &Code) -> Option<&Voucher> {
        self.voucher_codes.get(code).and_then(|id| self.vouchers.get(id))
    }

    pub fn claim_by_code(&self, code: &Code) -> Option<&Claim> {
        self.claim_codes.get(code).and_then(|id| self.claims.get(id))
    }

    pub fn voucher_code_taken(&self, code: &Code) -> bool {
        self.voucher_codes.contains_key(code)
    }

    pub fn claim_code_taken(&self, code: &Code) -> bool {
        self.claim_codes.contains_key(code)
    }

    fn revert(&mut self, step: Undo) {
        match step {
            Undo::CompanyInsert(id) => {
                self.companies.remove(&id);
            }
            Undo::CampaignInsert(id) => {
                self.campaigns.remove(&id);
            }
            Undo::RewardInsert(id) => {
                self.rewards.remove(&id);
            }
            Undo::ShopperInsert(id) => {
                if let Some(shopper) = self.shoppers.remove(&id) {
                    self.phones.remove(&shopper.phone);
                }
            }
            Undo::ShopperUpdate(previous) => {
                self.shoppers.insert(previous.id, previous);
            }
            Undo::VoucherInsert(id) => {
                if let Some(voucher) = self.vouchers.remove(&id) {
                    self.voucher_codes.remove(&voucher.code);
                }
            }
            Undo::VoucherUpdate(previous) => {
                self.vouchers.insert(previous.id, previous);
            }
            Undo::ClaimInsert(id) => {
                if let Some(claim) = self.claims.remove(&id) {
                    self.claim_codes.remove(&claim.code);
                }
            }
            Undo::ClaimUpdate(previous) => {
                self.claims.insert(previous.id, previous);
            }
        }
    }
}

/// One step of the undo log. Codes and phones never change after insert, so
/// restoring a row image never has to touch an index.
#[derive(Debug)]
enum Undo {
    CompanyInsert(CompanyId),
    CampaignInsert(CampaignId),
    RewardInsert(RewardId),
    ShopperInsert(ShopperId),
    ShopperUpdate(Shopper),
    VoucherInsert(VoucherId),
    VoucherUpdate(Voucher),
    ClaimInsert(ClaimId),
    ClaimUpdate(Claim),
}

/// The shared store: tables plus the committed-movement journal.
#[derive(Debug, Default)]
pub struct Store {
    tables: RwLock<Tables>,
    journal: Journal,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Starts a write transaction, waiting for the lock until `deadline`.
    pub fn begin(&self, deadline: Instant) -> Result<Transaction<'_>, LedgerError> {
        let tables = self.tables.try_write_until(deadline).ok_or_else(|| {
            warn!("timed out waiting for the store write lock");
            LedgerError::TransactionConflict
        })?;
        Ok(Transaction {
            tables,
            journal: &self.journal,
            undo: Vec::new(),
            entries: Vec::new(),
            committed: false,
        })
    }

    /// Opens a read-only view, waiting for the lock until `deadline`.
    pub fn snapshot(&self, deadline: Instant) -> Result<Snapshot<'_>, LedgerError> {
        let tables = self.tables.try_read_until(deadline).ok_or_else(|| {
            warn!("timed out waiting for the store read lock");
            LedgerError::TransactionConflict
        })?;
        Ok(Snapshot { tables })
    }
}

/// Read-only, point-in-time view of the tables.
pub struct Snapshot<'a> {
    tables: RwLockReadGuard<'a, Tables>,
}

impl Deref for Snapshot<'_> {
    type Target = Tables;

    fn deref(&self) -> &Tables {
        &self.tables
    }
}

/// An all-or-nothing unit of work.
///
/// Reads go through [`Deref`] to [`Tables`]; writes go through the methods
/// below so they land in the undo log.
pub struct Transaction<'a> {
    tables: RwLockWriteGuard<'a, Tables>,
    journal: &'a Journal,
    undo: Vec<Undo>,
    entries: Vec<LedgerEntry>,
    committed: bool,
}

impl Deref for Transaction<'_> {
    type Target = Tables;

    fn deref(&self) -> &Tables {
        &self.tables
    }
}

impl Transaction<'_> {
    pub fn insert_company(&mut self, name: String, logo: Option<String>) -> Company {
        let id = CompanyId(next(&mut self.tables.sequences.company));
        let company = Company { id, name, logo };
        self.tables.companies.insert(id, company.clone());
        self.undo.push(Undo::CompanyInsert(id));
        company
    }

    pub fn insert_campaign(&mut self, campaign: NewCampaign) -> Campaign {
        let id = CampaignId(next(&mut self.tables.sequences.campaign));
        let campaign = campaign.into_campaign(id);
        self.tables.campaigns.insert(id, campaign.clone());
        self.undo.push(Undo::CampaignInsert(id));
        campaign
    }

    pub fn insert_reward(&mut self, campaign_id: CampaignId, title: String, required_points: u64) -> Reward {
        let id = RewardId(next(&mut self.tables.sequences.reward));
        let reward = Reward {
            id,
            campaign_id,
            title,
            required_points,
        };
        self.tables.rewards.insert(id, reward.clone());
        self.undo.push(Undo::RewardInsert(id));
        reward
    }

    /// # Errors
    ///
    /// Returns [`LedgerError::PhoneTaken`] if the phone is already registered.
    pub fn insert_shopper(
        &mut self,
        phone: String,
        name: String,
        now: DateTime<Utc>,
    ) -> Result<Shopper, LedgerError> {
        if self.tables.phones.contains_key(&phone) {
            return Err(LedgerError::PhoneTaken);
        }
        let id = ShopperId(next(&mut self.tables.sequences.shopper));
        let shopper = Shopper::new(id, phone, name, now);
        self.tables.phones.insert(shopper.phone.clone(), id);
        self.tables.shoppers.insert(id, shopper.clone());
        self.undo.push(Undo::ShopperInsert(id));
        Ok(shopper)
    }

    /// Inserts an active voucher.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::TransactionConflict`] if the code is already
    /// taken by another voucher.
    pub fn insert_voucher(
        &mut self,
        campaign_id: CampaignId,
        code: Code,
        points_value: u64,
        now: DateTime<Utc>,
    ) -> Result<Voucher, LedgerError> {
        if self.tables.voucher_codes.contains_key(&code) {
            return Err(LedgerError::TransactionConflict);
        }
        let id = VoucherId(next(&mut self.tables.sequences.voucher));
        let voucher = Voucher {
            id,
            campaign_id,
            code,
            points_value,
            status: VoucherStatus::Active,
            created_at: now,
        };
        self.tables.voucher_codes.insert(voucher.code.clone(), id);
        self.tables.vouchers.insert(id, voucher.clone());
        self.undo.push(Undo::VoucherInsert(id));
        Ok(voucher)
    }

    /// Inserts a pending claim.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::TransactionConflict`] if the code is already
    /// taken by another claim.
    pub fn insert_claim(
        &mut self,
        reward_id: RewardId,
        shopper_id: ShopperId,
        code: Code,
        now: DateTime<Utc>,
    ) -> Result<Claim, LedgerError> {
        if self.tables.claim_codes.contains_key(&code) {
            return Err(LedgerError::TransactionConflict);
        }
        let id = ClaimId(next(&mut self.tables.sequences.claim));
        let claim = Claim {
            id,
            reward_id,
            shopper_id,
            code,
            status: ClaimStatus::Pending,
            created_at: now,
        };
        self.tables.claim_codes.insert(claim.code.clone(), id);
        self.tables.claims.insert(id, claim.clone());
        self.undo.push(Undo::ClaimInsert(id));
        Ok(claim)
    }

    /// Applies `change` to a shopper row, saving its prior image first.
    pub fn update_shopper<T>(
        &mut self,
        id: ShopperId,
        change: impl FnOnce(&mut Shopper) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let shopper = self
            .tables
            .shoppers
            .get_mut(&id)
            .ok_or(LedgerError::NotFound(Entity::Shopper))?;
        self.undo.push(Undo::ShopperUpdate(shopper.clone()));
        change(shopper)
    }

    pub fn update_voucher<T>(
        &mut self,
        id: VoucherId,
        change: impl FnOnce(&mut Voucher) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let voucher = self
            .tables
            .vouchers
            .get_mut(&id)
            .ok_or(LedgerError::NotFound(Entity::Voucher))?;
        self.undo.push(Undo::VoucherUpdate(voucher.clone()));
        change(voucher)
    }

    pub fn update_claim<T>(
        &mut self,
        id: ClaimId,
        change: impl FnOnce(&mut Claim) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let claim = self
            .tables
            .claims
            .get_mut(&id)
            .ok_or(LedgerError::NotFound(Entity::Claim))?;
        self.undo.push(Undo::ClaimUpdate(claim.clone()));
        change(claim)
    }

    /// Queues a journal entry to be appended on commit.
    pub fn record(&mut self, entry: LedgerEntry) {
        self.entries.push(entry);
    }

    /// Makes every write permanent and appends queued journal entries.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::TransactionConflict`] if a queued entry was
    /// already journaled. The transaction is rolled back in that case.
    pub fn commit(mut self) -> Result<(), LedgerError> {
        if self
            .entries
            .iter()
            .any(|entry| self.journal.contains(&entry.key))
        {
            warn!("refusing to journal the same movement twice");
            return Err(LedgerError::TransactionConflict);
        }
        for entry in std::mem::take(&mut self.entries) {
            self.journal.push(entry)?;
        }
        self.committed = true;
        self.undo.clear();
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.committed || self.undo.is_empty() {
            return;
        }
        let steps = self.undo.len();
        while let Some(step) = self.undo.pop() {
            self.tables.revert(step);
        }
        debug!(steps, "transaction rolled back");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn deadline() -> Instant {
        Instant::now() + Duration::from_millis(200)
    }

    fn seed(store: &Store) -> ShopperId {
        let mut tx = store.begin(deadline()).unwrap();
        let shopper = tx
            .insert_shopper("081111111111".to_owned(), "Ayu".to_owned(), Utc::now())
            .unwrap();
        tx.commit().unwrap();
        shopper.id
    }

    #[test]
    fn committed_writes_are_visible() {
        let store = Store::new();
        let id = seed(&store);

        let snapshot = store.snapshot(deadline()).unwrap();
        assert_eq!(snapshot.shopper(id).map(|s| s.name.as_str()), Some("Ayu"));
        assert!(snapshot.shopper_by_phone("081111111111").is_some());
    }

    #[test]
    fn dropped_transaction_rolls_back_rows_and_indexes() {
        let store = Store::new();
        let shopper_id = seed(&store);
        let code = Code::from("ROLLBACK0001");

        {
            let mut tx = store.begin(deadline()).unwrap();
            tx.insert_voucher(CampaignId(1), code.clone(), 5, Utc::now()).unwrap();
            tx.update_shopper(shopper_id, |s| s.credit(5)).unwrap();
            tx.insert_shopper("082222222222".to_owned(), "Budi".to_owned(), Utc::now())
                .unwrap();
            tx.record(LedgerEntry::credit(shopper_id, VoucherId(1), 5, Utc::now()));
        }

        let snapshot = store.snapshot(deadline()).unwrap();
        assert!(!snapshot.voucher_code_taken(&code));
        assert_eq!(snapshot.shopper(shopper_id).unwrap().points(), 0);
        assert!(snapshot.shopper_by_phone("082222222222").is_none());
        assert!(store.journal().is_empty());
    }

    #[test]
    fn failed_change_is_rolled_back() {
        let store = Store::new();
        let shopper_id = seed(&store);

        let result = (|| {
            let mut tx = store.begin(deadline())?;
            tx.update_shopper(shopper_id, |s| s.credit(3))?;
            tx.update_shopper(shopper_id, |s| s.debit(10))?;
            tx.commit()
        })();

        assert_eq!(
            result,
            Err(LedgerError::InsufficientPoints {
                current: 3,
                required: 10
            })
        );
        let snapshot = store.snapshot(deadline()).unwrap();
        assert_eq!(snapshot.shopper(shopper_id).unwrap().points(), 0);
    }

    #[test]
    fn duplicate_phone_is_rejected() {
        let store = Store::new();
        seed(&store);

        let mut tx = store.begin(deadline()).unwrap();
        let again = tx.insert_shopper("081111111111".to_owned(), "Other".to_owned(), Utc::now());
        assert_eq!(again, Err(LedgerError::PhoneTaken));
    }

    #[test]
    fn duplicate_codes_violate_unique_index() {
        let store = Store::new();
        let code = Code::from("SAMECODE0000");

        let mut tx = store.begin(deadline()).unwrap();
        tx.insert_voucher(CampaignId(1), code.clone(), 1, Utc::now()).unwrap();
        assert_eq!(
            tx.insert_voucher(CampaignId(1), code.clone(), 1, Utc::now()),
            Err(LedgerError::TransactionConflict)
        );
        // Claim codes live in their own index.
        assert!(tx
            .insert_claim(RewardId(1), ShopperId(1), code, Utc::now())
            .is_ok());
    }

    #[test]
    fn journal_duplicate_aborts_commit() {
        let store = Store::new();
        let shopper_id = seed(&store);
        store
            .journal()
            .push(LedgerEntry::credit(shopper_id, VoucherId(1), 5, Utc::now()))
            .unwrap();

        let mut tx = store.begin(deadline()).unwrap();
        tx.update_shopper(shopper_id, |s| s.credit(5)).unwrap();
        tx.record(LedgerEntry::credit(shopper_id, VoucherId(1), 5, Utc::now()));
        assert_eq!(tx.commit(), Err(LedgerError::TransactionConflict));

        let snapshot = store.snapshot(deadline()).unwrap();
        assert_eq!(snapshot.shopper(shopper_id).unwrap().points(), 0);
    }

    #[test]
    fn lock_timeout_is_a_conflict() {
        let store = Store::new();
        let _writer = store.begin(deadline()).unwrap();

        let short = Instant::now() + Duration::from_millis(20);
        assert!(matches!(
            store.begin(short),
            Err(LedgerError::TransactionConflict)
        ));
        let short = Instant::now() + Duration::from_millis(20);
        assert!(matches!(
            store.snapshot(short),
            Err(LedgerError::TransactionConflict)
        ));
    }
}
