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

//! The telemetry ingress payload.

use serde::Deserialize;
use uuid::Uuid;

use crate::session::ChargerType;

/// Geographic position in plain degrees, as providers report it.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct GeoDegrees {
    pub lat: f64,
    pub lon: f64,
}

/// One `update_vehicle_data` sample.
///
/// Human units on the wire; the ingestor converts to storage units. One
/// sample is best-effort: a bad sample is dropped and logged, never allowed
/// to corrupt the state machines.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateVehicleDataInput {
    pub id: Uuid,
    pub geo: GeoDegrees,
    /// Battery level (%).
    pub battery_level: i16,
    /// Odometer (m).
    pub odometer: i64,
    /// Outside temperature (°C).
    pub outside_temperature: f64,
    /// Inside temperature (°C).
    pub inside_temperature: f64,
    pub climate_control: bool,
    pub is_driving: bool,
    /// `None` when no charger is attached.
    pub connected_charger: Option<ChargerType>,
    /// Level the car will charge to (%); set only while drawing.
    pub charging_to: Option<i16>,
    /// Car-estimated minutes left of the charge.
    pub estimated_time_left: Option<i32>,
    /// Present draw (kW).
    pub power_use: Option<f64>,
    /// Cumulative energy added this charge (kWh).
    pub energy_added: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_parses_with_nullable_charger() {
        let json = r#"{
            "id": "7f0f3a84-3c5d-4f0e-9d5f-2f8a33aa0001",
            "geo": {"lat": 59.3346, "lon": 18.0632},
            "batteryLevel": 63,
            "odometer": 8211554,
            "outsideTemperature": 11.5,
            "insideTemperature": 19.0,
            "climateControl": false,
            "isDriving": false,
            "connectedCharger": "ac",
            "chargingTo": 90,
            "estimatedTimeLeft": 95,
            "powerUse": 11.0,
            "energyAdded": 3.21
        }"#;
        let sample: UpdateVehicleDataInput = serde_json::from_str(json).unwrap();
        assert_eq!(sample.connected_charger, Some(ChargerType::Ac));
        assert_eq!(sample.charging_to, Some(90));

        let unplugged = json.replace(r#""ac""#, "null");
        let sample: UpdateVehicleDataInput = serde_json::from_str(&unplugged).unwrap();
        assert!(sample.connected_charger.is_none());
    }
}
