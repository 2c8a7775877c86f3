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

//! Charge plan segments, the planner's published output.
//!
//! A plan is an ordered array of non-overlapping segments persisted as JSON
//! on the vehicle row. Adapters enact it; the core never executes charging
//! itself. A `null` plan means "no action required"; a segment with
//! `chargeStart: null` means "start now" and `chargeStop: null` means
//! "until done".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Rationale tag for a plan segment.
///
/// The wire tag for `Preferred` is spelled `prefered`; the misspelling is
/// load-bearing for deployed adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChargeType {
    /// One-shot full charge to populate the level-100 curve point.
    Calibrate,
    /// Emergency charge up to the comfort floor.
    Minimum,
    /// Top-up before a scheduled departure.
    Trip,
    /// Predicted next-cycle need.
    Routine,
    #[serde(rename = "prefered")]
    /// Anxiety-driven extra margin.
    Preferred,
    /// Opportunistic low-price fill.
    Fill,
}

impl ChargeType {
    /// Priority for reconciliation tie-breaks; lower wins.
    pub fn priority(self) -> u8 {
        match self {
            ChargeType::Calibrate => 0,
            ChargeType::Minimum => 1,
            ChargeType::Trip => 2,
            ChargeType::Routine => 3,
            ChargeType::Preferred => 4,
            ChargeType::Fill => 5,
        }
    }
}

/// One element of a charge plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargePlanSegment {
    /// Start charging at this time; `None` = start now.
    pub charge_start: Option<DateTime<Utc>>,
    /// Stop at this time; `None` = charge until the level is reached.
    pub charge_stop: Option<DateTime<Utc>>,
    /// Target battery level (%).
    pub level: i16,
    pub charge_type: ChargeType,
    pub comment: String,
}

impl ChargePlanSegment {
    pub fn new(
        charge_start: Option<DateTime<Utc>>,
        charge_stop: Option<DateTime<Utc>>,
        level: i16,
        charge_type: ChargeType,
        comment: impl Into<String>,
    ) -> Self {
        Self {
            charge_start,
            charge_stop,
            level,
            charge_type,
            comment: comment.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn wire_shape_is_camel_case_with_lowercase_tag() {
        let segment = ChargePlanSegment::new(
            None,
            Some(Utc.with_ymd_and_hms(2026, 3, 1, 6, 0, 0).unwrap()),
            50,
            ChargeType::Minimum,
            "emergency charge",
        );
        let json = serde_json::to_value(&segment).unwrap();
        assert_eq!(json["chargeStart"], serde_json::Value::Null);
        assert_eq!(json["chargeType"], "minimum");
        assert_eq!(json["level"], 50);
    }

    #[test]
    fn preferred_keeps_its_legacy_spelling() {
        let json = serde_json::to_string(&ChargeType::Preferred).unwrap();
        assert_eq!(json, r#""prefered""#);
        let back: ChargeType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ChargeType::Preferred);
    }

    #[test]
    fn priorities_are_totally_ordered() {
        let order = [
            ChargeType::Calibrate,
            ChargeType::Minimum,
            ChargeType::Trip,
            ChargeType::Routine,
            ChargeType::Preferred,
            ChargeType::Fill,
        ];
        for pair in order.windows(2) {
            assert!(pair[0].priority() < pair[1].priority());
        }
    }
}
