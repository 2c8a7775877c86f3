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

//! Connection, Charge and Trip session rows plus the learned charge curve.
//!
//! The three state machines nest: a Charge always lives inside a
//! Connection, a Trip always outside one. Rows are mutated in place by the
//! ingestor until their `end_ts` is finalized.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChargerType {
    Ac,
    Dc,
}

impl ChargerType {
    /// Storage column value.
    pub fn as_str(self) -> &'static str {
        match self {
            ChargerType::Ac => "ac",
            ChargerType::Dc => "dc",
        }
    }
}

impl std::str::FromStr for ChargerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ac" => Ok(ChargerType::Ac),
            "dc" => Ok(ChargerType::Dc),
            other => Err(format!("unknown charger type: {other}")),
        }
    }
}

/// A plug-in session at a known location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub connected_id: Uuid,
    pub vehicle_id: Uuid,
    pub location_id: Uuid,
    pub charger_type: ChargerType,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    pub start_level: i16,
    pub end_level: i16,
    /// Energy drawn over the session (Wm). Monotonically non-decreasing.
    pub energy_used: i64,
    /// Cost of the energy drawn, scaled price units.
    pub cost: i64,
    /// Cost avoided versus charging immediately on plug-in.
    pub saved: i64,
    /// Still plugged in.
    pub connected: bool,
}

/// An active-draw span inside a Connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Charge {
    pub charge_id: Uuid,
    pub connected_id: Uuid,
    pub vehicle_id: Uuid,
    pub location_id: Uuid,
    pub charger_type: ChargerType,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    pub start_level: i16,
    pub end_level: i16,
    /// Car-reported cumulative energy added at start (Wm).
    pub start_added: i64,
    pub end_added: i64,
    pub target_level: i16,
    /// Car-reported minutes left at the latest sample.
    pub estimate: Option<i32>,
    pub energy_used: i64,
}

/// Working state of the curve learner for one active Charge.
///
/// One row per active Charge, reset every observed percent, deleted when
/// the charge terminates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeCurrent {
    pub charge_id: Uuid,
    pub start_ts: DateTime<Utc>,
    pub start_level: i16,
    pub start_added: i64,
    pub powers: Vec<i32>,
    pub outside_deci_temps: Vec<i16>,
}

/// One learned percent of the charge curve for a `(vehicle, location)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurvePoint {
    pub vehicle_id: Uuid,
    pub location_id: Uuid,
    /// The percent gained, 1-100.
    pub level: i16,
    /// Seconds it took to gain this percent.
    pub duration: i32,
    pub avg_deci_temp: i16,
    pub energy_used: i64,
    pub energy_added: i64,
}

/// A drive between known locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    pub trip_id: Uuid,
    pub vehicle_id: Uuid,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    pub start_level: i16,
    pub end_level: i16,
    pub start_location_id: Option<Uuid>,
    pub end_location_id: Option<Uuid>,
    pub start_odometer: i64,
    pub start_outside_deci_temp: i16,
    /// Odometer distance covered (m).
    pub distance: i64,
}
