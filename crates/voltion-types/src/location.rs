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

//! Known charging locations and their geo fences.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::units::micro_to_degrees;

/// A point in stored micro-degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat_micro: i32,
    pub lon_micro: i32,
}

impl GeoPoint {
    /// Great-circle distance to `other` in meters (haversine).
    ///
    /// Geo fences are tens to hundreds of meters, so float precision is a
    /// non-issue at this scale.
    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        const EARTH_RADIUS_M: f64 = 6_371_000.0;
        let lat1 = micro_to_degrees(self.lat_micro).to_radians();
        let lat2 = micro_to_degrees(other.lat_micro).to_radians();
        let dlat = lat2 - lat1;
        let dlon = (micro_to_degrees(other.lon_micro) - micro_to_degrees(self.lon_micro))
            .to_radians();

        let a = (dlat / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().asin()
    }
}

/// A user-registered charging location.
///
/// A vehicle is "at" the location whose fence circle contains its reported
/// point; ties are broken by the smallest radius.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub id: Uuid,
    pub account_id: Uuid,
    pub name: String,
    pub geo: GeoPoint,
    /// Fence radius (m).
    pub geo_fence_radius: i32,
    /// Price feed this location buys energy on.
    pub price_code: String,
}

impl Location {
    pub fn contains(&self, point: &GeoPoint) -> bool {
        self.geo.distance_m(point) <= f64::from(self.geo_fence_radius)
    }

    /// The smallest-radius location among `locations` whose fence contains
    /// `point`, if any.
    pub fn find_enclosing<'a>(
        locations: &'a [Location],
        point: &GeoPoint,
    ) -> Option<&'a Location> {
        locations
            .iter()
            .filter(|location| location.contains(point))
            .min_by_key(|location| location.geo_fence_radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_zero_at_same_point() {
        let p = GeoPoint {
            lat_micro: 59_334_591,
            lon_micro: 18_063_240,
        };
        assert!(p.distance_m(&p) < 1e-9);
    }

    #[test]
    fn hundred_meters_north() {
        // ~0.0009 degrees of latitude is ~100 m
        let a = GeoPoint {
            lat_micro: 59_334_591,
            lon_micro: 18_063_240,
        };
        let b = GeoPoint {
            lat_micro: a.lat_micro + 900,
            lon_micro: a.lon_micro,
        };
        let d = a.distance_m(&b);
        assert!((90.0..110.0).contains(&d), "distance was {d}");
    }
}
