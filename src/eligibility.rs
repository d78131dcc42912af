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

//! Rewards a shopper can afford right now.

use crate::base::{CampaignId, ShopperId};
use crate::catalog::Reward;
use crate::error::Entity;
use crate::{Engine, LedgerError};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailableReward {
    pub reward: Reward,
    pub campaign_id: CampaignId,
    pub campaign_title: String,
}

/// Point-in-time answer of [`Engine::list_available`].
///
/// Nothing is reserved; [`Engine::generate_claim`] checks the balance again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Eligibility {
    pub current_points: u64,
    pub rewards: Vec<AvailableReward>,
}

impl Engine {
    /// Lists rewards of currently active campaigns that fit the shopper's
    /// balance, cheapest first.
    pub fn list_available(&self, shopper_id: ShopperId) -> Result<Eligibility, LedgerError> {
        let now = self.now();
        let snapshot = self.snapshot()?;

        let current_points = snapshot
            .shopper(shopper_id)
            .map(|shopper| shopper.points())
            .ok_or(LedgerError::NotFound(Entity::Shopper))?;

        let mut rewards: Vec<AvailableReward> = snapshot
            .rewards()
            .filter(|reward| reward.required_points <= current_points)
            .filter_map(|reward| {
                let campaign = snapshot.campaign(reward.campaign_id)?;
                campaign.is_active(now).then(|| AvailableReward {
                    reward: reward.clone(),
                    campaign_id: campaign.id,
                    campaign_title: campaign.title.clone(),
                })
            })
            .collect();
        rewards.sort_by_key(|available| (available.reward.required_points, available.reward.id));

        Ok(Eligibility {
            current_points,
            rewards,
        })
    }

    /// [`Engine::list_available`] for a shopper addressed by phone.
    pub fn list_available_by_phone(&self, phone: &str) -> Result<Eligibility, LedgerError> {
        let shopper = self.shopper_by_phone(phone)?;
        self.list_available(shopper.id)
    }
}
