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

//! Storage-unit conversions.
//!
//! The wire formats speak human units (degrees, °C, kW, kWh); the store
//! keeps integers: micro-degrees, deci-°C, Watts and Watt-minutes
//! (60 Wm = 1 Wh). Prices are integer currency-per-kWh scaled by
//! [`PRICE_SCALE`].

/// Price points are stored as `price_per_kwh * PRICE_SCALE`, rounded.
pub const PRICE_SCALE: i64 = 100_000;

/// Geographic degrees to stored micro-degrees.
pub fn degrees_to_micro(deg: f64) -> i32 {
    (deg * 1_000_000.0).round() as i32
}

/// Stored micro-degrees back to degrees.
pub fn micro_to_degrees(micro: i32) -> f64 {
    f64::from(micro) / 1_000_000.0
}

/// Temperature in °C to stored deci-°C.
pub fn celsius_to_deci(celsius: f64) -> i16 {
    (celsius * 10.0).round() as i16
}

/// Power in kW to stored Watts.
pub fn kilowatts_to_watts(kw: f64) -> i32 {
    (kw * 1000.0).round() as i32
}

/// Energy in kWh to stored Watt-minutes.
pub fn kilowatt_hours_to_watt_minutes(kwh: f64) -> i64 {
    (kwh * 60_000.0).round() as i64
}

/// Energy drawn at `watts` for `seconds`, in Watt-minutes.
pub fn watt_seconds_to_watt_minutes(watts: f64, seconds: f64) -> f64 {
    watts * seconds / 60.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn micro_degrees_round_trip() {
        let lat = 59.334591;
        let micro = degrees_to_micro(lat);
        assert_eq!(micro, 59_334_591);
        assert!((micro_to_degrees(micro) - lat).abs() < 1e-6);
    }

    #[test]
    fn negative_coordinates_round_away_from_zero() {
        assert_eq!(degrees_to_micro(-0.0000005), -1);
    }

    #[test]
    fn energy_units() {
        // 1 kWh == 60_000 Wm
        assert_eq!(kilowatt_hours_to_watt_minutes(1.0), 60_000);
        // 11 kW for one hour == 11 kWh
        let wm = watt_seconds_to_watt_minutes(11_000.0, 3600.0);
        assert!((wm - 660_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn deci_temperature() {
        assert_eq!(celsius_to_deci(21.57), 216);
        assert_eq!(celsius_to_deci(-7.3), -73);
    }
}
