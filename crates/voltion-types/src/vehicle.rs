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

//! Vehicle row and the vehicle configuration ingress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::plan::ChargePlanSegment;

/// A scheduled departure the owner has announced in advance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTrip {
    /// Battery level (%) wanted at departure.
    pub level: i16,
    /// Departure time.
    pub time: DateTime<Utc>,
}

/// Canonical vehicle row.
///
/// The database is the source of truth; this struct is loaded at the start
/// of every ingestion or replan and written back before the section ends.
/// Invariant: `minimum_charge <= maximum_charge`. `charge_id` is only set
/// while `connected_id` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: Uuid,
    pub account_id: Uuid,
    pub name: String,

    /// Comfort floor (%): below this the planner charges unconditionally.
    pub minimum_charge: i16,
    /// Comfort ceiling (%): the planner never targets above this
    /// (calibration excepted).
    pub maximum_charge: i16,
    /// 0 = cost-optimal only, 1 = prefer a margin, 2 = always keep full.
    pub anxiety_level: i16,
    pub scheduled_trip: Option<ScheduledTrip>,
    /// Smart charging is suspended until this time.
    pub paused_until: Option<DateTime<Utc>>,

    /// Known location the vehicle is currently at, if any.
    pub location_id: Option<Uuid>,
    pub lat_micro: Option<i32>,
    pub lon_micro: Option<i32>,

    /// Battery level (%).
    pub level: i16,
    /// Odometer (m).
    pub odometer: i64,
    pub outside_deci_temp: i16,
    pub inside_deci_temp: i16,
    pub climate_on: bool,
    pub driving: bool,

    pub connected: bool,
    /// Charger level the car reports it will charge to (%), while drawing.
    pub charging_to: Option<i16>,
    /// Car-reported minutes left of the active charge.
    pub estimate: Option<i32>,

    pub connected_id: Option<Uuid>,
    pub charge_id: Option<Uuid>,
    pub trip_id: Option<Uuid>,

    pub charge_plan: Option<Vec<ChargePlanSegment>>,
    pub smart_status: String,
    pub status: String,
    pub updated: DateTime<Utc>,

    /// Opaque provider payload, preserved round-trip and never introspected.
    pub provider_data: serde_json::Value,
}

/// Configuration subset accepted on the `update_vehicle` ingress.
///
/// `trip_schedule` and `paused_until` are double-optional: absent means
/// "leave unchanged", `null` means "clear".
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateVehicleInput {
    pub name: Option<String>,
    pub minimum_level: Option<i16>,
    pub maximum_level: Option<i16>,
    pub anxiety_level: Option<i16>,
    #[serde(default, deserialize_with = "double_option")]
    pub trip_schedule: Option<Option<ScheduledTrip>>,
    #[serde(default, deserialize_with = "double_option")]
    pub paused_until: Option<Option<DateTime<Utc>>>,
    pub status: Option<String>,
    pub provider_data: Option<serde_json::Value>,
}

fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: serde::Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Range violation in a vehicle configuration update.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum VehicleConfigError {
    #[error("battery level {0} out of range 0-100")]
    LevelOutOfRange(i16),
    #[error("minimum level {minimum} exceeds maximum level {maximum}")]
    MinimumAboveMaximum { minimum: i16, maximum: i16 },
    #[error("anxiety level {0} not one of 0, 1, 2")]
    InvalidAnxietyLevel(i16),
}

impl UpdateVehicleInput {
    /// Validate against the current row, since min/max may each be updated
    /// independently of the other.
    pub fn validate(&self, current: &Vehicle) -> Result<(), VehicleConfigError> {
        let minimum = self.minimum_level.unwrap_or(current.minimum_charge);
        let maximum = self.maximum_level.unwrap_or(current.maximum_charge);
        for level in [minimum, maximum] {
            if !(0..=100).contains(&level) {
                return Err(VehicleConfigError::LevelOutOfRange(level));
            }
        }
        if minimum > maximum {
            return Err(VehicleConfigError::MinimumAboveMaximum { minimum, maximum });
        }
        if let Some(anxiety) = self.anxiety_level {
            if !(0..=2).contains(&anxiety) {
                return Err(VehicleConfigError::InvalidAnxietyLevel(anxiety));
            }
        }
        if let Some(Some(trip)) = &self.trip_schedule {
            if !(0..=100).contains(&trip.level) {
                return Err(VehicleConfigError::LevelOutOfRange(trip.level));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vehicle() -> Vehicle {
        Vehicle {
            id: Uuid::nil(),
            account_id: Uuid::nil(),
            name: "test".into(),
            minimum_charge: 30,
            maximum_charge: 90,
            anxiety_level: 0,
            scheduled_trip: None,
            paused_until: None,
            location_id: None,
            lat_micro: None,
            lon_micro: None,
            level: 50,
            odometer: 0,
            outside_deci_temp: 0,
            inside_deci_temp: 0,
            climate_on: false,
            driving: false,
            connected: false,
            charging_to: None,
            estimate: None,
            connected_id: None,
            charge_id: None,
            trip_id: None,
            charge_plan: None,
            smart_status: String::new(),
            status: String::new(),
            updated: Utc::now(),
            provider_data: serde_json::Value::Null,
        }
    }

    #[test]
    fn minimum_may_not_exceed_maximum() {
        let input = UpdateVehicleInput {
            minimum_level: Some(95),
            ..Default::default()
        };
        assert_eq!(
            input.validate(&vehicle()),
            Err(VehicleConfigError::MinimumAboveMaximum {
                minimum: 95,
                maximum: 90
            })
        );
    }

    #[test]
    fn anxiety_level_is_bounded() {
        let input = UpdateVehicleInput {
            anxiety_level: Some(3),
            ..Default::default()
        };
        assert_eq!(
            input.validate(&vehicle()),
            Err(VehicleConfigError::InvalidAnxietyLevel(3))
        );
    }

    #[test]
    fn absent_trip_schedule_differs_from_null() {
        let absent: UpdateVehicleInput = serde_json::from_str("{}").unwrap();
        assert!(absent.trip_schedule.is_none());

        let cleared: UpdateVehicleInput =
            serde_json::from_str(r#"{"tripSchedule": null}"#).unwrap();
        assert_eq!(cleared.trip_schedule, Some(None));
    }
}
