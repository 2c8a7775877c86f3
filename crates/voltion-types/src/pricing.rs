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

//! Time-of-use price feed types.
//!
//! Prices arrive hour-aligned per `price_code` (a feed identifier shared by
//! every location buying on that tariff) and are stored as integers scaled
//! by [`crate::units::PRICE_SCALE`].

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::units::PRICE_SCALE;

/// One stored price hour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    pub price_code: String,
    /// Start of the hour this price covers (hour-aligned).
    pub ts: DateTime<Utc>,
    /// Currency per kWh, scaled by [`PRICE_SCALE`].
    pub price: i64,
}

impl PricePoint {
    /// Price in currency per kWh as a float, for simulation arithmetic.
    pub fn price_per_kwh(&self) -> f64 {
        self.price as f64 / PRICE_SCALE as f64
    }
}

/// One point of a price ingress payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceUpdatePoint {
    pub start_at: DateTime<Utc>,
    /// Currency per kWh.
    pub price: f64,
}

/// The `update_price` ingress payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceUpdate {
    pub price_code: String,
    pub prices: Vec<PriceUpdatePoint>,
}

impl PriceUpdatePoint {
    /// True when the point sits exactly on an hour boundary.
    pub fn is_hour_aligned(&self) -> bool {
        self.start_at.minute() == 0
            && self.start_at.second() == 0
            && self.start_at.nanosecond() == 0
    }

    pub fn scaled_price(&self) -> i64 {
        (self.price * PRICE_SCALE as f64).round() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn price_scaling_round_trips() {
        let point = PriceUpdatePoint {
            start_at: Utc.with_ymd_and_hms(2026, 3, 1, 14, 0, 0).unwrap(),
            price: 0.41337,
        };
        assert!(point.is_hour_aligned());
        assert_eq!(point.scaled_price(), 41_337);

        let stored = PricePoint {
            price_code: "SE3".into(),
            ts: point.start_at,
            price: point.scaled_price(),
        };
        assert!((stored.price_per_kwh() - 0.41337).abs() < 1e-9);
    }

    #[test]
    fn off_hour_points_are_detected() {
        let point = PriceUpdatePoint {
            start_at: Utc.with_ymd_and_hms(2026, 3, 1, 14, 30, 0).unwrap(),
            price: 0.2,
        };
        assert!(!point.is_hour_aligned());
    }
}
