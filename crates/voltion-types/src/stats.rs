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

//! Derived statistics rows: per-location stats and the hourly event map.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Simulation output for one `(vehicle, location)` against one price list.
///
/// Stale as soon as `price_list_ts` no longer equals the latest price
/// timestamp of the location's price code; the statistics engine then
/// re-simulates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentStats {
    pub stats_id: Uuid,
    pub vehicle_id: Uuid,
    pub location_id: Uuid,
    /// Latest price point timestamp the simulation saw.
    pub price_list_ts: DateTime<Utc>,
    /// Median seconds to gain one percent at this location, if learned.
    pub level_charge_time: Option<i32>,
    /// Mean price of the last 7 days, scaled price units.
    pub weekly_avg7_price: i64,
    /// Mean price of the last 21 days, scaled price units.
    pub weekly_avg21_price: i64,
    /// Best price-to-adjusted-average ratio x100 found by the simulation.
    pub threshold: i16,
}

/// Hourly activity aggregate for a vehicle.
///
/// Upserts combine min-of, max-of and sums so concurrent writers for the
/// same hour are safe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMapEntry {
    pub vehicle_id: Uuid,
    /// Hour bucket, `date_trunc('hour')` in UTC.
    pub hour: DateTime<Utc>,
    pub minimum_level: i16,
    pub maximum_level: i16,
    pub driven_seconds: i32,
    pub driven_meters: i64,
    pub charged_seconds: i32,
    /// Energy charged during the hour (Wm).
    pub charge_energy: i64,
}

impl EventMapEntry {
    /// Fold `other` into `self` the way the store's upsert does.
    pub fn combine(&mut self, other: &EventMapEntry) {
        self.minimum_level = self.minimum_level.min(other.minimum_level);
        self.maximum_level = self.maximum_level.max(other.maximum_level);
        self.driven_seconds += other.driven_seconds;
        self.driven_meters += other.driven_meters;
        self.charged_seconds += other.charged_seconds;
        self.charge_energy += other.charge_energy;
    }
}
