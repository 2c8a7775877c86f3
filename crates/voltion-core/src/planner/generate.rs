// Copyright (c) 2026 SOLARE S.R.O.
//
// This file is part of VoltION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Price-ordered segment generation for one charging goal.

use chrono::{DateTime, Duration, Utc};

use voltion_store::Gateway;
use voltion_types::{ChargePlanSegment, ChargeType, Location, Vehicle};

use crate::curve::ChargeCurve;
use crate::error::EngineResult;

/// How far ahead prices are fetched when no deadline bounds the plan.
const OPEN_HORIZON_DAYS: i64 = 7;

/// Spread the time needed to reach `target_level` across the cheapest
/// available price hours before `before`.
///
/// Hours are consumed ascending by price; an hour priced above `max_price`
/// ends the walk (everything after it is dearer still). With no price data
/// at all the goal degrades to a single start-now segment.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn generate_charge_plan<G: Gateway>(
    gateway: &G,
    vehicle: &Vehicle,
    location: &Location,
    curve: &ChargeCurve,
    target_level: i16,
    charge_type: ChargeType,
    comment: &str,
    before: Option<DateTime<Utc>>,
    max_price: Option<i64>,
    now: DateTime<Utc>,
) -> EngineResult<Vec<ChargePlanSegment>> {
    let time_needed = curve.duration(vehicle.level, target_level);
    if time_needed <= Duration::zero() {
        return Ok(Vec::new());
    }

    let window_start = now - Duration::hours(1);
    let window_end = before
        .unwrap_or(now + Duration::days(OPEN_HORIZON_DAYS))
        .max(window_start);
    let mut points = gateway
        .price_points_between(&location.price_code, window_start, window_end)
        .await?;

    if points.is_empty() {
        return Ok(vec![ChargePlanSegment::new(
            None,
            Some(now + time_needed),
            target_level,
            ChargeType::Routine,
            comment,
        )]);
    }

    points.sort_by(|a, b| a.price.cmp(&b.price).then(a.ts.cmp(&b.ts)));

    let mut segments = Vec::new();
    let mut time_left = time_needed;
    for point in points {
        if max_price.is_some_and(|cap| point.price > cap) {
            break;
        }
        let ts_start = point.ts.max(now);
        let mut end = (ts_start + time_left).min(point.ts + Duration::hours(1));
        if let Some(before) = before {
            end = end.min(before);
        }
        if end <= ts_start {
            continue;
        }

        segments.push(ChargePlanSegment::new(
            Some(point.ts),
            Some(end),
            target_level,
            charge_type,
            comment,
        ));
        time_left -= end - ts_start;
        if time_left <= Duration::zero() {
            break;
        }
    }
    Ok(segments)
}
