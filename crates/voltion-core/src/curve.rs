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

//! Per-percent charge-curve learning and duration estimation.
//!
//! Each `(vehicle, location)` accumulates a table of how many seconds it
//! took to gain each battery percent, learned from live charge sessions.
//! Duration estimates fall back to [`DEFAULT_LEVEL_SECONDS`] for percents
//! never observed, and shave a quarter off the final percent so the plan
//! stops short of overshooting.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use voltion_types::{Charge, ChargeCurrent, CurvePoint};

/// Assumed seconds per percent when a level has no learned row yet.
pub const DEFAULT_LEVEL_SECONDS: i32 = 100;

/// Fraction of the final percent's duration that is actually scheduled.
const FINAL_PERCENT_FACTOR: f64 = 0.75;

/// A loaded charge curve, keyed by the level a percent starts from: the
/// row at `level` holds the seconds observed going `level -> level + 1`.
#[derive(Debug, Clone, Default)]
pub struct ChargeCurve {
    durations: BTreeMap<i16, i32>,
}

impl ChargeCurve {
    pub fn from_points(points: &[CurvePoint]) -> Self {
        Self {
            durations: points.iter().map(|p| (p.level, p.duration)).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.durations.is_empty()
    }

    /// Estimated time to charge `from` -> `to`.
    ///
    /// Zero when `from >= to`. The final percent is weighted by
    /// [`FINAL_PERCENT_FACTOR`].
    pub fn duration(&self, from: i16, to: i16) -> Duration {
        if from >= to {
            return Duration::zero();
        }
        let mut millis: i64 = 0;
        for level in from..to {
            let seconds = f64::from(
                self.durations
                    .get(&level)
                    .copied()
                    .unwrap_or(DEFAULT_LEVEL_SECONDS),
            );
            let factor = if level + 1 < to {
                1.0
            } else {
                FINAL_PERCENT_FACTOR
            };
            millis += (seconds * factor * 1000.0).round() as i64;
        }
        Duration::milliseconds(millis)
    }
}

/// What one telemetry sample did to the learner state.
#[derive(Debug)]
pub struct CurveObservation {
    /// The reset or extended working row to persist.
    pub current: ChargeCurrent,
    /// A finished percent worth keeping, if the gain was clean.
    pub learned: Option<CurvePoint>,
    /// A new percent was observed, learned or not. Replan material.
    pub level_crossed: bool,
}

/// Feed one in-charge sample to the learner.
///
/// A gain of exactly 1% against the working row becomes a curve point;
/// larger jumps mean an offline gap and are discarded. The first percent
/// after charge start is always discarded: the car reports integer levels,
/// so its duration is truncated noise.
pub fn observe_sample(
    current: Option<ChargeCurrent>,
    charge: &Charge,
    level: i16,
    added_wm: i64,
    power_w: Option<i32>,
    outside_deci_temp: i16,
    now: DateTime<Utc>,
) -> CurveObservation {
    let mut current = current.unwrap_or(ChargeCurrent {
        charge_id: charge.charge_id,
        start_ts: now,
        start_level: level,
        start_added: added_wm,
        powers: Vec::new(),
        outside_deci_temps: Vec::new(),
    });

    if let Some(power) = power_w {
        current.powers.push(power);
    }
    current.outside_deci_temps.push(outside_deci_temp);

    let gain = level - current.start_level;
    if gain == 0 {
        return CurveObservation {
            current,
            learned: None,
            level_crossed: false,
        };
    }

    let learned = if gain == 1 && current.start_level > charge.start_level {
        let duration = (now - current.start_ts).num_seconds().max(0) as i32;
        let avg_power = mean_i32(&current.powers);
        let avg_temp = mean_i16(&current.outside_deci_temps);
        Some(CurvePoint {
            vehicle_id: charge.vehicle_id,
            location_id: charge.location_id,
            level: current.start_level,
            duration,
            avg_deci_temp: avg_temp,
            energy_used: (avg_power * f64::from(duration) / 60.0).round() as i64,
            energy_added: added_wm - current.start_added,
        })
    } else {
        debug!(
            charge_id = %charge.charge_id,
            gain,
            "discarding curve sample (offline gap or first percent)"
        );
        None
    };

    CurveObservation {
        current: ChargeCurrent {
            charge_id: charge.charge_id,
            start_ts: now,
            start_level: level,
            start_added: added_wm,
            powers: Vec::new(),
            outside_deci_temps: Vec::new(),
        },
        learned,
        level_crossed: true,
    }
}

fn mean_i32(values: &[i32]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|&v| f64::from(v)).sum::<f64>() / values.len() as f64
}

fn mean_i16(values: &[i16]) -> i16 {
    if values.is_empty() {
        return 0;
    }
    let sum: i64 = values.iter().map(|&v| i64::from(v)).sum();
    (sum as f64 / values.len() as f64).round() as i16
}
