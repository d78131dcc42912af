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

//! Claim lifecycle.
//!
//! A claim is created `Pending` by [`Engine::generate_claim`], with the
//! reward's points already debited. Staff preview it with
//! [`Engine::verify_claim`] and hand the reward over with
//! [`Engine::issue_claim`]:
//!
//! ```text
//! Claim (Pending) ──issue──► Claim (Issued { at })
//! ```
//!
//! `Issued` is terminal and carries the issuance time, so a claim has an
//! issue timestamp exactly when it has been issued.

use crate::base::{CampaignId, ClaimId, Code, RewardId, ShopperId};
use crate::capability::Staff;
use crate::error::Entity;
use crate::notice::Notice;
use crate::store::Tables;
use crate::{Engine, LedgerError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimStatus {
    Pending,
    Issued { issued_at: DateTime<Utc> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Claim {
    pub id: ClaimId,
    pub reward_id: RewardId,
    pub shopper_id: ShopperId,
    pub code: Code,
    pub status: ClaimStatus,
    pub created_at: DateTime<Utc>,
}

impl Claim {
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        match self.status {
            ClaimStatus::Pending => None,
            ClaimStatus::Issued { issued_at } => Some(issued_at),
        }
    }

    pub fn is_issued(&self) -> bool {
        self.issued_at().is_some()
    }

    pub(crate) fn issue(&mut self, now: DateTime<Utc>) -> Result<(), LedgerError> {
        match self.status {
            ClaimStatus::Pending => {
                self.status = ClaimStatus::Issued { issued_at: now };
                Ok(())
            }
            ClaimStatus::Issued { issued_at } => Err(LedgerError::AlreadyIssued { issued_at }),
        }
    }
}

/// A claim with the reward, campaign and shopper fields staff need to see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaimDetail {
    pub claim: Claim,
    pub reward_title: String,
    pub required_points: u64,
    pub campaign_id: CampaignId,
    pub campaign_title: String,
    pub shopper_name: String,
    pub shopper_phone: String,
}

impl ClaimDetail {
    fn load(tables: &Tables, claim: &Claim) -> Result<Self, LedgerError> {
        let reward = tables
            .reward(claim.reward_id)
            .ok_or(LedgerError::NotFound(Entity::Reward))?;
        let campaign = tables
            .campaign(reward.campaign_id)
            .ok_or(LedgerError::NotFound(Entity::Campaign))?;
        let shopper = tables
            .shopper(claim.shopper_id)
            .ok_or(LedgerError::NotFound(Entity::Shopper))?;

        Ok(Self {
            claim: claim.clone(),
            reward_title: reward.title.clone(),
            required_points: reward.required_points,
            campaign_id: campaign.id,
            campaign_title: campaign.title.clone(),
            shopper_name: shopper.name.clone(),
            shopper_phone: shopper.phone.clone(),
        })
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.claim.issued_at()
    }
}

/// Result of [`Engine::generate_claim`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaimGenerated {
    pub claim: Claim,
    pub reward_title: String,
    pub remaining_points: u64,
    pub notice: Notice,
}

impl Engine {
    /// Looks up a claim for preview without changing it.
    ///
    /// An issued claim is returned normally; check
    /// [`ClaimDetail::issued_at`] before handing anything over.
    pub fn verify_claim(&self, _staff: &Staff, code: &Code) -> Result<ClaimDetail, LedgerError> {
        let snapshot = self.snapshot()?;
        let claim = snapshot
            .claim_by_code(code)
            .ok_or(LedgerError::NotFound(Entity::Claim))?;
        ClaimDetail::load(&snapshot, claim)
    }

    /// Marks a pending claim as issued.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotFound`] - No claim has this code.
    /// - [`LedgerError::AlreadyIssued`] - Claim was issued before. Carries the
    ///   original issue time, which never changes.
    pub fn issue_claim(&self, _staff: &Staff, code: &Code) -> Result<ClaimDetail, LedgerError> {
        let now = self.now();
        let mut tx = self.begin()?;

        let claim_id = tx
            .claim_by_code(code)
            .map(|claim| claim.id)
            .ok_or(LedgerError::NotFound(Entity::Claim))?;
        let claim = tx.update_claim(claim_id, |claim| {
            claim.issue(now)?;
            Ok(claim.clone())
        })?;
        let detail = ClaimDetail::load(&tx, &claim)?;
        tx.commit()?;

        info!(claim = %claim.id, reward = %claim.reward_id, shopper = %claim.shopper_id, "claim issued");
        Ok(detail)
    }
}
