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

//! The charge planner.
//!
//! One replan gathers up to six sub-plans for a vehicle at a known
//! location (calibration, emergency minimum, routine prediction, anxiety
//! margin, scheduled trip, low-price fill) and reconciles them into the
//! single ordered plan published on the vehicle row. A failed replan
//! leaves the previous plan untouched.

mod cleanup;
mod generate;

pub use cleanup::cleanup_plan;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, warn};
use uuid::Uuid;

use voltion_store::Gateway;
use voltion_types::{ChargePlanSegment, ChargeType};

use crate::curve::ChargeCurve;
use crate::error::EngineResult;
use crate::stats;
use generate::generate_charge_plan;

const STATUS_CALIBRATING: &str = "Calibrating charge curve";
const STATUS_LEARNING: &str = "Smart charging disabled (still learning)";
const STATUS_ENABLED: &str = "Smart charging enabled";

/// Extra percent of margin on top of the predicted routine need.
const ROUTINE_MARGIN: f64 = 5.0;

/// A scheduled trip influences planning from 36 h before departure until
/// an hour after; then it is considered consumed.
const TRIP_LOOKAHEAD_HOURS: i64 = 36;
const TRIP_LINGER_HOURS: i64 = 1;
const TRIP_DEPART_SLACK_MINUTES: i64 = 15;

/// Recompute and publish the charge plan for one vehicle.
pub async fn refresh_vehicle_charge_plan<G: Gateway>(
    gateway: &G,
    vehicle_id: Uuid,
    now: DateTime<Utc>,
    timezone: Tz,
) -> EngineResult<()> {
    let mut vehicle = gateway.get_vehicle(vehicle_id).await?;

    let Some(location_id) = vehicle.location_id else {
        // Off every known location there is nothing to plan; leave any
        // existing plan as-is and clear the status.
        let existing = vehicle.charge_plan.clone();
        gateway
            .set_charge_plan(vehicle.id, existing.as_deref(), "")
            .await?;
        return Ok(());
    };

    if let Some(paused_until) = vehicle.paused_until {
        if paused_until > now {
            let status = format!(
                "Smart charging paused until {}",
                paused_until.format("%Y-%m-%d %H:%M")
            );
            gateway.set_charge_plan(vehicle.id, None, &status).await?;
            return Ok(());
        }
    }

    let location = gateway.get_location(location_id).await?;
    let curve = ChargeCurve::from_points(
        &gateway.get_charge_curve(vehicle.id, location.id).await?,
    );

    // An in-progress emergency segment survives the replan until the
    // vehicle has cleared the comfort floor.
    let mut plan: Vec<ChargePlanSegment> =
        if vehicle.level < vehicle.minimum_charge + 1 {
            vehicle
                .charge_plan
                .clone()
                .unwrap_or_default()
                .into_iter()
                .filter(|segment| segment.charge_start.is_none())
                .collect()
        } else {
            Vec::new()
        };

    // Calibration overrides everything: a curve that never reached 100
    // cannot anchor duration estimates. A vehicle with no curve at all is
    // still learning and is handled below instead.
    let max_curve_level = gateway.max_curve_level(vehicle.id, location.id).await?;
    if vehicle.level < vehicle.maximum_charge && max_curve_level.is_some_and(|l| l < 100) {
        let calibration = vec![ChargePlanSegment::new(
            None,
            None,
            100,
            ChargeType::Calibrate,
            "Charge calibration",
        )];
        gateway
            .set_charge_plan(vehicle.id, Some(&calibration), STATUS_CALIBRATING)
            .await?;
        info!(vehicle = %vehicle.id, "calibration charge scheduled");
        return Ok(());
    }

    if vehicle.level < vehicle.minimum_charge {
        let duration = curve.duration(vehicle.level, vehicle.minimum_charge);
        plan.push(ChargePlanSegment::new(
            None,
            Some(now + duration),
            vehicle.minimum_charge,
            ChargeType::Minimum,
            "emergency charge",
        ));
    }

    let stats = stats::current_stats(gateway, &vehicle, &location, now).await?;

    let mut smart_status = STATUS_ENABLED;
    let mut learning = false;
    let mut before: Option<DateTime<Utc>> = None;
    let mut minimum_level = vehicle.minimum_charge;

    let has_charge_time = stats
        .as_ref()
        .is_some_and(|s| s.level_charge_time.is_some());
    if has_charge_time {
        let prediction = gateway
            .routine_prediction(vehicle.id, location.id, now, timezone.name())
            .await?;
        match (prediction.charge_percent, prediction.before) {
            (Some(charge), Some(predicted)) => {
                minimum_level = vehicle.maximum_charge.min(
                    (f64::from(vehicle.minimum_charge) + charge + ROUTINE_MARGIN).round()
                        as i16,
                );
                let time_needed = curve.duration(vehicle.level, minimum_level);
                let mut predicted = predicted;
                if predicted < now + time_needed / 2 {
                    predicted += Duration::days(1);
                }
                before = Some(predicted);
                plan.extend(
                    generate_charge_plan(
                        gateway,
                        &vehicle,
                        &location,
                        &curve,
                        minimum_level,
                        ChargeType::Routine,
                        "routine charge",
                        before,
                        None,
                        now,
                    )
                    .await?,
                );
            }
            _ => learning = true,
        }
    } else {
        learning = true;
    }

    if learning {
        if vehicle.level < vehicle.maximum_charge {
            let duration = curve.duration(vehicle.level, vehicle.maximum_charge);
            plan.push(ChargePlanSegment::new(
                None,
                Some(now + duration),
                vehicle.maximum_charge,
                ChargeType::Fill,
                "learning",
            ));
        }
        smart_status = STATUS_LEARNING;
        debug!(vehicle = %vehicle.id, "routine prediction incomplete, still learning");
    } else if vehicle.anxiety_level >= 1 {
        let target = if vehicle.anxiety_level > 1 {
            vehicle.maximum_charge
        } else {
            (minimum_level + vehicle.maximum_charge) / 2
        };
        plan.extend(
            generate_charge_plan(
                gateway,
                &vehicle,
                &location,
                &curve,
                target,
                ChargeType::Preferred,
                "charge setting",
                before,
                None,
                now,
            )
            .await?,
        );
    }

    let mut disconnect_time = before;
    let mut vehicle_dirty = false;
    if let Some(trip) = vehicle.scheduled_trip {
        if now > trip.time + Duration::hours(TRIP_LINGER_HOURS) {
            vehicle.scheduled_trip = None;
            vehicle_dirty = true;
            debug!(vehicle = %vehicle.id, "scheduled trip expired");
        } else if now >= trip.time - Duration::hours(TRIP_LOOKAHEAD_HOURS) {
            let depart_level = trip.level;
            let prepare_level = vehicle
                .level
                .max(depart_level.min(vehicle.maximum_charge));
            let topup_time = curve.duration(prepare_level, depart_level);
            let topup_start =
                trip.time - Duration::minutes(TRIP_DEPART_SLACK_MINUTES) - topup_time;

            plan.extend(
                generate_charge_plan(
                    gateway,
                    &vehicle,
                    &location,
                    &curve,
                    prepare_level,
                    ChargeType::Trip,
                    "upcoming trip",
                    Some(topup_start),
                    None,
                    now,
                )
                .await?,
            );
            if topup_time > Duration::zero() {
                plan.push(ChargePlanSegment::new(
                    Some(topup_start),
                    None,
                    depart_level,
                    ChargeType::Trip,
                    "topping up before trip",
                ));
            }
            disconnect_time =
                Some(disconnect_time.map_or(topup_start, |d| d.max(topup_start)));
        }
    }

    if let Some(stats) = &stats {
        let avg7 = stats.weekly_avg7_price as f64;
        let avg21 = stats.weekly_avg21_price as f64;
        let average = avg7 + (avg7 - avg21) / 2.0;
        let threshold_price =
            (average * f64::from(stats.threshold) / 100.0).round() as i64;
        plan.extend(
            generate_charge_plan(
                gateway,
                &vehicle,
                &location,
                &curve,
                vehicle.maximum_charge,
                ChargeType::Fill,
                "low price",
                disconnect_time,
                Some(threshold_price),
                now,
            )
            .await?,
        );
    }

    let plan = cleanup_plan(plan);
    if vehicle_dirty {
        if let Err(err) = gateway.put_vehicle(&vehicle).await {
            warn!(vehicle = %vehicle.id, %err, "could not clear expired trip schedule");
        }
    }
    let published = if plan.is_empty() {
        None
    } else {
        Some(plan.as_slice())
    };
    gateway
        .set_charge_plan(vehicle.id, published, smart_status)
        .await?;
    info!(
        vehicle = %vehicle.id,
        segments = plan.len(),
        status = smart_status,
        "charge plan published"
    );
    Ok(())
}
