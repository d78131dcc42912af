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

//! Append-only journal of committed point movements.
//!
//! Each voucher can be credited once and each claim debited once; the journal
//! refuses a second entry for the same key while keeping commit order for
//! downstream exporters.

use crate::LedgerError;
use crate::base::{ClaimId, ShopperId, VoucherId};
use chrono::{DateTime, Utc};
use crossbeam::queue::SegQueue;
use dashmap::DashMap;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::sync::Arc;

/// Dedup key of an entry: the record that moved the points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKey {
    Credit(VoucherId),
    Debit(ClaimId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub shopper_id: ShopperId,
    pub key: EntryKey,
    pub points: u64,
    pub at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn credit(shopper_id: ShopperId, voucher: VoucherId, points: u64, at: DateTime<Utc>) -> Self {
        Self {
            shopper_id,
            key: EntryKey::Credit(voucher),
            points,
            at,
        }
    }

    pub fn debit(shopper_id: ShopperId, claim: ClaimId, points: u64, at: DateTime<Utc>) -> Self {
        Self {
            shopper_id,
            key: EntryKey::Debit(claim),
            points,
            at,
        }
    }

    /// Points with the sign of their effect on the balance.
    pub fn signed_points(&self) -> i128 {
        match self.key {
            EntryKey::Credit(_) => i128::from(self.points),
            EntryKey::Debit(_) => -i128::from(self.points),
        }
    }
}

impl Serialize for LedgerEntry {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let (kind, reference) = match self.key {
            EntryKey::Credit(voucher) => ("credit", voucher.0),
            EntryKey::Debit(claim) => ("debit", claim.0),
        };
        let mut state = serializer.serialize_struct("LedgerEntry", 5)?;
        state.serialize_field("shopper", &self.shopper_id)?;
        state.serialize_field("kind", kind)?;
        state.serialize_field("reference", &reference)?;
        state.serialize_field("points", &self.points)?;
        state.serialize_field("at", &self.at.to_rfc3339())?;
        state.end()
    }
}

/// A thread-safe journal with duplicate detection.
///
/// Combines a [`DashMap`] for O(1) duplicate checks with a [`SegQueue`] that
/// keeps keys in commit order until they are drained.
///
/// Only committing transactions append to it; callers can read and drain it
/// but never write:
///
/// ```compile_fail
/// use chrono::Utc;
/// use loyalty_ledger::{Engine, LedgerEntry, ShopperId, VoucherId};
///
/// let engine = Engine::new();
/// let forged = LedgerEntry::credit(ShopperId(1), VoucherId(1), 100, Utc::now());
/// engine.journal().push(forged).unwrap();
/// ```
#[derive(Debug, Default)]
pub struct Journal {
    entries: DashMap<EntryKey, Arc<LedgerEntry>>,
    pending: SegQueue<EntryKey>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &EntryKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Appends an entry.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::TransactionConflict`] if an entry with the same
    /// key was already recorded.
    pub(crate) fn push(&self, entry: LedgerEntry) -> Result<(), LedgerError> {
        use dashmap::mapref::entry::Entry;

        let key = entry.key;
        match self.entries.entry(key) {
            Entry::Occupied(_) => Err(LedgerError::TransactionConflict),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(entry));
                self.pending.push(key);
                Ok(())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of credits minus debits recorded for `shopper_id`.
    pub fn net_points(&self, shopper_id: ShopperId) -> i128 {
        self.entries
            .iter()
            .filter(|entry| entry.shopper_id == shopper_id)
            .map(|entry| entry.signed_points())
            .sum()
    }

    /// Takes the entries recorded since the last drain, in commit order.
    ///
    /// Drained entries still count for duplicate detection and
    /// [`Journal::net_points`].
    pub fn drain(&self) -> Vec<LedgerEntry> {
        let mut drained = Vec::with_capacity(self.pending.len());
        while let Some(key) = self.pending.pop() {
            if let Some(entry) = self.entries.get(&key) {
                drained.push(LedgerEntry::clone(entry.value()));
            }
        }
        drained
    }
}
