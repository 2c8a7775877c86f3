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

//! Per-location charge statistics.
//!
//! For a `(vehicle, location)` the engine replays the last three weeks of
//! plug-in history against the price feed and sweeps the price thresholds
//! actually observed, looking for the ratio that would have charged the
//! cheapest. The winner is persisted as `CurrentStats` and consumed by the
//! planner's low-price fill; it stays valid until the price feed moves.

use chrono::{DateTime, Duration, DurationRound, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use voltion_store::Gateway;
use voltion_types::{Connection, CurrentStats, Location, PricePoint, Vehicle};

use crate::error::EngineResult;

/// Fallback threshold (x100) when no candidate survives simulation.
const DEFAULT_THRESHOLD: i16 = 100;

/// History considered by the simulation.
const HISTORY_WINDOW_DAYS: i64 = 21;

/// One hour of a past connection, with its price context.
#[derive(Debug, Clone)]
pub struct HistoryHour {
    /// Portion of the hour the vehicle was plugged in, (0, 1].
    pub fraction: f64,
    /// Scaled price for the hour.
    pub price: f64,
    /// Price relative to the 7-day average of the hour's day, adjusted by
    /// the current price trend.
    pub threshold: f64,
}

/// One past connection in simulation order.
#[derive(Debug, Clone)]
pub struct HistoryConnection {
    pub connected_id: Uuid,
    /// Plugged in somewhere other than the target location: its hours are
    /// not simulated, but its consumption still drains the carried level.
    pub offsite: bool,
    pub start_level: f64,
    /// Percent consumed between this connection's end and the next
    /// plug-in.
    pub needed: f64,
    pub hours: Vec<HistoryHour>,
}

/// Build the simulation history from closed connections and price points.
///
/// `prices` must cover at least seven days before the first connection so
/// the per-day averages have data. Hours without any price are skipped.
pub fn build_history(
    connections: &[Connection],
    target_location: Uuid,
    prices: &[PricePoint],
    avg7: f64,
    avg21: f64,
) -> Vec<HistoryConnection> {
    let trend_adjust = (avg7 - avg21) / 2.0;
    let mut history = Vec::with_capacity(connections.len());

    for (index, connection) in connections.iter().enumerate() {
        let needed = connections
            .get(index + 1)
            .map(|next| f64::from(connection.end_level - next.start_level))
            .unwrap_or(0.0);

        let offsite = connection.location_id != target_location;
        let mut hours = Vec::new();
        if !offsite {
            let first_hour = trunc_hour(connection.start_ts);
            let mut hour = first_hour;
            while hour <= connection.end_ts {
                let slot_end = hour + Duration::hours(1);
                let overlap = (connection.end_ts.min(slot_end)
                    - connection.start_ts.max(hour))
                .num_seconds();
                if overlap > 0 {
                    if let Some(price) = price_at(prices, hour) {
                        let day_avg = day_average(prices, hour).unwrap_or(avg7);
                        let denominator = day_avg + trend_adjust;
                        if denominator > 0.0 {
                            hours.push(HistoryHour {
                                fraction: overlap as f64 / 3600.0,
                                price,
                                threshold: price / denominator,
                            });
                        }
                    }
                }
                hour = slot_end;
            }
        }

        history.push(HistoryConnection {
            connected_id: connection.connected_id,
            offsite,
            start_level: f64::from(connection.start_level),
            needed,
            hours,
        });
    }
    history
}

fn trunc_hour(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.duration_trunc(Duration::hours(1)).unwrap_or(ts)
}

/// Latest price at or before the hour.
fn price_at(prices: &[PricePoint], hour: DateTime<Utc>) -> Option<f64> {
    prices
        .iter()
        .take_while(|p| p.ts <= hour)
        .last()
        .map(|p| p.price as f64)
}

/// Mean price over the seven days before the hour's day.
fn day_average(prices: &[PricePoint], hour: DateTime<Utc>) -> Option<f64> {
    let day_start = hour.duration_trunc(Duration::days(1)).unwrap_or(hour);
    let window_start = day_start - Duration::days(7);
    let window: Vec<f64> = prices
        .iter()
        .filter(|p| p.ts >= window_start && p.ts < day_start)
        .map(|p| p.price as f64)
        .collect();
    if window.is_empty() {
        None
    } else {
        Some(window.iter().sum::<f64>() / window.len() as f64)
    }
}

/// Replay the history charging at threshold `t`; the score is cost per
/// percent charged, lower is better. `None` when the strategy would have
/// run the battery below half the comfort floor, or never charged.
pub fn simulate_threshold(
    history: &[HistoryConnection],
    t: f64,
    minimum_charge: f64,
    maximum_charge: f64,
    level_charge_time: f64,
) -> Option<f64> {
    let mut lvl = 0.0;
    let mut total_charged = 0.0;
    let mut total_cost = 0.0;

    for (index, connection) in history.iter().enumerate() {
        let reset = index == 0 || history[index - 1].offsite;
        if reset {
            lvl = connection.start_level;
        } else {
            lvl -= history[index - 1].needed;
            if lvl < minimum_charge / 2.0 {
                return None;
            }
        }

        if connection.offsite {
            continue;
        }

        let needed_level = (minimum_charge + connection.needed * 1.1)
            .clamp(minimum_charge, maximum_charge);

        // Emergency: charge in time order until the floor is safe.
        let mut remaining: Vec<&HistoryHour> = Vec::new();
        for hour in &connection.hours {
            if lvl < minimum_charge {
                charge_in_hour(
                    hour,
                    maximum_charge,
                    level_charge_time,
                    &mut lvl,
                    &mut total_charged,
                    &mut total_cost,
                );
            } else {
                remaining.push(hour);
            }
        }

        // Smart: cheapest (by threshold) hours first.
        remaining.sort_by(|a, b| a.threshold.total_cmp(&b.threshold));
        for hour in remaining {
            let target = if hour.threshold <= t {
                maximum_charge
            } else if lvl < needed_level {
                needed_level
            } else {
                continue;
            };
            charge_in_hour(
                hour,
                target,
                level_charge_time,
                &mut lvl,
                &mut total_charged,
                &mut total_cost,
            );
        }
    }

    if lvl > minimum_charge && total_charged > 0.0 {
        Some(total_cost / total_charged)
    } else {
        None
    }
}

fn charge_in_hour(
    hour: &HistoryHour,
    target: f64,
    level_charge_time: f64,
    lvl: &mut f64,
    total_charged: &mut f64,
    total_cost: &mut f64,
) {
    let headroom_seconds = (target - *lvl) * level_charge_time;
    let charge_seconds = (3600.0 * hour.fraction).min(headroom_seconds);
    if charge_seconds <= 0.0 {
        return;
    }
    let gained = charge_seconds / level_charge_time;
    *lvl += gained;
    *total_charged += gained;
    *total_cost += charge_seconds / 3600.0 * hour.price;
}

/// Sweep the observed thresholds and pick the cheapest surviving one
/// (x100, [`DEFAULT_THRESHOLD`] when nothing survives).
pub fn best_threshold(
    history: &[HistoryConnection],
    minimum_charge: f64,
    maximum_charge: f64,
    level_charge_time: f64,
) -> i16 {
    let mut candidates: Vec<f64> = history
        .iter()
        .filter(|c| !c.offsite)
        .flat_map(|c| c.hours.iter().map(|h| h.threshold))
        .collect();
    candidates.sort_by(f64::total_cmp);
    candidates.dedup();

    let mut best: Option<(f64, f64)> = None;
    for &t in &candidates {
        if let Some(ratio) =
            simulate_threshold(history, t, minimum_charge, maximum_charge, level_charge_time)
        {
            let better = best.map_or(true, |(_, best_ratio)| ratio < best_ratio);
            if better {
                best = Some((t, ratio));
            }
        }
    }

    match best {
        Some((t, ratio)) => {
            debug!(threshold = t, cost_ratio = ratio, "threshold sweep winner");
            (t * 100.0).round() as i16
        }
        None => DEFAULT_THRESHOLD,
    }
}

/// Newest stats for the pair, re-simulated when the price feed has moved.
pub async fn current_stats<G: Gateway>(
    gateway: &G,
    vehicle: &Vehicle,
    location: &Location,
    now: DateTime<Utc>,
) -> EngineResult<Option<CurrentStats>> {
    let Some(latest_ts) = gateway.latest_price_ts(&location.price_code).await? else {
        return Ok(None);
    };
    if let Some(stats) = gateway.newest_stats(vehicle.id, location.id).await? {
        if stats.price_list_ts == latest_ts {
            return Ok(Some(stats));
        }
    }
    create_new_stats(gateway, vehicle, location, now).await
}

/// Rebuild and persist stats for the pair from scratch.
///
/// Returns `None` while the feed has no prices at all; everything else
/// degrades to learning defaults rather than failing.
pub async fn create_new_stats<G: Gateway>(
    gateway: &G,
    vehicle: &Vehicle,
    location: &Location,
    now: DateTime<Utc>,
) -> EngineResult<Option<CurrentStats>> {
    let Some(averages) = gateway.price_averages(&location.price_code, now).await? else {
        debug!(vehicle = %vehicle.id, location = %location.id, "no prices, skipping stats");
        return Ok(None);
    };

    let level_charge_time = gateway
        .median_curve_duration(vehicle.id, location.id)
        .await?;

    let mut since = now - Duration::days(HISTORY_WINDOW_DAYS);
    if let Some(earliest) = gateway.earliest_price_ts(&location.price_code).await? {
        since = since.max(earliest);
    }
    let connections = gateway.closed_connections_since(vehicle.id, since).await?;
    let prices = gateway
        .price_points_between(
            &location.price_code,
            since - Duration::days(7),
            now + Duration::hours(1),
        )
        .await?;

    let history = build_history(
        &connections,
        location.id,
        &prices,
        averages.avg7 as f64,
        averages.avg21 as f64,
    );

    let threshold = match level_charge_time {
        Some(seconds) => best_threshold(
            &history,
            f64::from(vehicle.minimum_charge),
            f64::from(vehicle.maximum_charge),
            f64::from(seconds),
        ),
        None => DEFAULT_THRESHOLD,
    };

    let stats = CurrentStats {
        stats_id: Uuid::new_v4(),
        vehicle_id: vehicle.id,
        location_id: location.id,
        price_list_ts: averages.latest_ts,
        level_charge_time,
        weekly_avg7_price: averages.avg7,
        weekly_avg21_price: averages.avg21,
        threshold,
    };
    gateway.put_stats(&stats).await?;
    info!(
        vehicle = %vehicle.id,
        location = %location.id,
        threshold,
        connections = connections.len(),
        "charge statistics rebuilt"
    );
    Ok(Some(stats))
}
