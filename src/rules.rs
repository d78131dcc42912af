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

//! Spend-to-points conversion.

use crate::LedgerError;
use crate::catalog::Campaign;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// Converts a spend amount into the points a voucher for `campaign` carries.
///
/// Points are `floor(spend / spend_per_point)`; fractional points are dropped.
///
/// # Errors
///
/// - [`LedgerError::InvalidAmount`] - Spend is not positive or too large to convert.
/// - [`LedgerError::CampaignInactive`] - `now` is outside the campaign window.
/// - [`LedgerError::InvalidRate`] - Campaign has a non-positive conversion rate.
/// - [`LedgerError::BelowMinimum`] - Award is under the campaign floor. Carries
///   the spend needed to reach it.
pub fn compute_award(
    campaign: &Campaign,
    spend: Decimal,
    now: DateTime<Utc>,
) -> Result<u64, LedgerError> {
    if spend <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount);
    }
    if !campaign.is_active(now) {
        return Err(LedgerError::CampaignInactive);
    }
    if campaign.spend_per_point <= Decimal::ZERO {
        return Err(LedgerError::InvalidRate);
    }

    let points = spend
        .checked_div(campaign.spend_per_point)
        .map(|ratio| ratio.floor())
        .and_then(|ratio| ratio.to_u64())
        .ok_or(LedgerError::InvalidAmount)?;

    if points < campaign.min_points {
        let min_spend = (Decimal::from(campaign.min_points) * campaign.spend_per_point).normalize();
        return Err(LedgerError::BelowMinimum {
            min_points: campaign.min_points,
            min_spend,
        });
    }

    Ok(points)
}
