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

//! Companies, campaigns and rewards.
//!
//! The catalog is read-only input to the ledger once created. Only the insert
//! path lives here.

use crate::base::{CampaignId, CompanyId, RewardId};
use crate::capability::{Owner, Staff};
use crate::error::Entity;
use crate::{Engine, LedgerError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Company {
    pub id: CompanyId,
    pub name: String,
    pub logo: Option<String>,
}

/// A time-boxed rule set converting spend into points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub company_id: CompanyId,
    pub title: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    /// Smallest award a single voucher may carry.
    pub min_points: u64,
    /// Spend needed per awarded point.
    pub spend_per_point: Decimal,
    pub description: Option<String>,
}

impl Campaign {
    /// Whether `now` falls inside the campaign window, bounds included.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.start_date <= now && now <= self.end_date
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reward {
    pub id: RewardId,
    pub campaign_id: CampaignId,
    pub title: String,
    pub required_points: u64,
}

/// Input for [`Engine::create_campaign`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCampaign {
    pub company_id: CompanyId,
    pub title: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    /// Defaults to [`NewCampaign::DEFAULT_MIN_POINTS`].
    pub min_points: Option<u64>,
    pub spend_per_point: Decimal,
    pub description: Option<String>,
}

impl NewCampaign {
    pub const DEFAULT_MIN_POINTS: u64 = 1;

    pub(crate) fn validate(&self) -> Result<(), LedgerError> {
        if self.end_date <= self.start_date {
            return Err(LedgerError::InvalidSchedule);
        }
        if self.spend_per_point <= Decimal::ZERO {
            return Err(LedgerError::InvalidRate);
        }
        if self.min_points == Some(0) {
            return Err(LedgerError::InvalidPoints);
        }
        Ok(())
    }

    pub(crate) fn into_campaign(self, id: CampaignId) -> Campaign {
        Campaign {
            id,
            company_id: self.company_id,
            title: self.title,
            start_date: self.start_date,
            end_date: self.end_date,
            min_points: self.min_points.unwrap_or(Self::DEFAULT_MIN_POINTS),
            spend_per_point: self.spend_per_point,
            description: self.description,
        }
    }
}

impl Engine {
    pub fn register_company(&self, name: &str, logo: Option<&str>) -> Result<Company, LedgerError> {
        let mut tx = self.begin()?;
        let company = tx.insert_company(name.to_owned(), logo.map(str::to_owned));
        tx.commit()?;

        info!(company = %company.id, name, "company registered");
        Ok(company)
    }

    /// Creates a campaign for an existing company.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotFound`] - Company does not exist.
    /// - [`LedgerError::InvalidSchedule`] - End date is not after start date.
    /// - [`LedgerError::InvalidRate`] - Spend per point is not positive.
    /// - [`LedgerError::InvalidPoints`] - Minimum points set to zero.
    pub fn create_campaign(
        &self,
        _owner: &Owner,
        campaign: NewCampaign,
    ) -> Result<Campaign, LedgerError> {
        campaign.validate()?;

        let mut tx = self.begin()?;
        if tx.company(campaign.company_id).is_none() {
            return Err(LedgerError::NotFound(Entity::Company));
        }
        let campaign = tx.insert_campaign(campaign);
        tx.commit()?;

        info!(campaign = %campaign.id, company = %campaign.company_id, "campaign created");
        Ok(campaign)
    }

    /// Adds a reward to a campaign catalog.
    pub fn create_reward(
        &self,
        _staff: &Staff,
        campaign_id: CampaignId,
        title: &str,
        required_points: u64,
    ) -> Result<Reward, LedgerError> {
        if required_points == 0 {
            return Err(LedgerError::InvalidPoints);
        }

        let mut tx = self.begin()?;
        if tx.campaign(campaign_id).is_none() {
            return Err(LedgerError::NotFound(Entity::Campaign));
        }
        let reward = tx.insert_reward(campaign_id, title.to_owned(), required_points);
        tx.commit()?;

        info!(reward = %reward.id, campaign = %campaign_id, required_points, "reward created");
        Ok(reward)
    }

    pub fn campaign(&self, id: CampaignId) -> Result<Campaign, LedgerError> {
        self.snapshot()?
            .campaign(id)
            .cloned()
            .ok_or(LedgerError::NotFound(Entity::Campaign))
    }

    pub fn reward(&self, id: RewardId) -> Result<Reward, LedgerError> {
        self.snapshot()?
            .reward(id)
            .cloned()
            .ok_or(LedgerError::NotFound(Entity::Reward))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn new_campaign() -> NewCampaign {
        NewCampaign {
            company_id: CompanyId(1),
            title: "Summer".to_owned(),
            start_date: Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
            end_date: Utc.with_ymd_and_hms(2025, 8, 31, 23, 59, 59).unwrap(),
            min_points: None,
            spend_per_point: dec!(10),
            description: None,
        }
    }

    #[test]
    fn window_is_inclusive() {
        let campaign = new_campaign().into_campaign(CampaignId(1));
        assert!(campaign.is_active(campaign.start_date));
        assert!(campaign.is_active(campaign.end_date));
        assert!(!campaign.is_active(campaign.start_date - chrono::TimeDelta::seconds(1)));
        assert!(!campaign.is_active(campaign.end_date + chrono::TimeDelta::seconds(1)));
    }

    #[test]
    fn min_points_defaults_to_one() {
        let campaign = new_campaign().into_campaign(CampaignId(1));
        assert_eq!(campaign.min_points, 1);
    }

    #[test]
    fn validation_rejects_bad_campaigns() {
        let mut reversed = new_campaign();
        std::mem::swap(&mut reversed.start_date, &mut reversed.end_date);
        assert_eq!(reversed.validate(), Err(LedgerError::InvalidSchedule));

        let mut same_instant = new_campaign();
        same_instant.end_date = same_instant.start_date;
        assert_eq!(same_instant.validate(), Err(LedgerError::InvalidSchedule));

        let mut free = new_campaign();
        free.spend_per_point = Decimal::ZERO;
        assert_eq!(free.validate(), Err(LedgerError::InvalidRate));

        let mut no_floor = new_campaign();
        no_floor.min_points = Some(0);
        assert_eq!(no_floor.validate(), Err(LedgerError::InvalidPoints));

        assert_eq!(new_campaign().validate(), Ok(()));
    }
}
