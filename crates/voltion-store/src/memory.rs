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

//! In-memory gateway for tests and offline simulation.
//!
//! Mirrors the PostgreSQL implementation operation for operation, with the
//! percentile aggregates computed in Rust. Nothing here persists; seed it
//! with the inherent `insert_*` helpers.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, TimeZone, Utc};
use chrono_tz::Tz;
use uuid::Uuid;

use voltion_types::{
    Charge, ChargeCurrent, ChargePlanSegment, Connection, CurrentStats, CurvePoint,
    EventMapEntry, GeoPoint, Location, PricePoint, Trip, Vehicle,
};

use crate::error::{StoreError, StoreResult};
use crate::gateway::{Gateway, PriceAverages, PriceNowThen, RoutinePrediction};

#[derive(Default)]
struct Inner {
    vehicles: HashMap<Uuid, Vehicle>,
    locations: HashMap<Uuid, Location>,
    /// price_code -> ts -> scaled price
    prices: HashMap<String, BTreeMap<DateTime<Utc>, i64>>,
    connections: HashMap<Uuid, Connection>,
    charges: HashMap<Uuid, Charge>,
    charge_currents: HashMap<Uuid, ChargeCurrent>,
    trips: HashMap<Uuid, Trip>,
    /// (vehicle, location) -> level -> point
    curves: HashMap<(Uuid, Uuid), BTreeMap<i16, CurvePoint>>,
    event_map: HashMap<(Uuid, DateTime<Utc>), EventMapEntry>,
    stats: Vec<CurrentStats>,
}

/// HashMap-backed [`Gateway`].
#[derive(Default)]
pub struct MemStore {
    inner: Mutex<Inner>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_vehicle(&self, vehicle: Vehicle) {
        self.inner
            .lock()
            .unwrap()
            .vehicles
            .insert(vehicle.id, vehicle);
    }

    pub fn insert_location(&self, location: Location) {
        self.inner
            .lock()
            .unwrap()
            .locations
            .insert(location.id, location);
    }

    /// All trips currently stored, for test assertions.
    pub fn trips(&self) -> Vec<Trip> {
        self.inner.lock().unwrap().trips.values().cloned().collect()
    }

    /// All event-map rows, ordered by hour, for test assertions.
    pub fn event_entries(&self, vehicle_id: Uuid) -> Vec<EventMapEntry> {
        let inner = self.inner.lock().unwrap();
        let mut entries: Vec<EventMapEntry> = inner
            .event_map
            .values()
            .filter(|e| e.vehicle_id == vehicle_id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.hour);
        entries
    }
}

fn parse_tz(tz: &str) -> StoreResult<Tz> {
    Tz::from_str(tz).map_err(|_| StoreError::InvalidInput(format!("unknown timezone: {tz}")))
}

/// `percentile_cont`: linear interpolation between closest ranks.
fn percentile_cont(sorted: &[f64], fraction: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = fraction * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return Some(sorted[lower]);
    }
    let weight = rank - lower as f64;
    Some(sorted[lower] * (1.0 - weight) + sorted[upper] * weight)
}

/// `percentile_disc`: smallest value whose cumulative distribution reaches
/// the fraction.
fn percentile_disc<T: Clone>(sorted: &[T], fraction: f64) -> Option<T> {
    if sorted.is_empty() {
        return None;
    }
    let index = ((fraction * sorted.len() as f64).ceil() as usize).max(1) - 1;
    sorted.get(index.min(sorted.len() - 1)).cloned()
}

fn price_at_inner(inner: &Inner, price_code: &str, ts: DateTime<Utc>) -> Option<PricePoint> {
    inner.prices.get(price_code).and_then(|points| {
        points
            .range(..=ts)
            .next_back()
            .map(|(&point_ts, &price)| PricePoint {
                price_code: price_code.to_owned(),
                ts: point_ts,
                price,
            })
    })
}

#[async_trait]
impl Gateway for MemStore {
    async fn get_vehicle(&self, id: Uuid) -> StoreResult<Vehicle> {
        self.inner
            .lock()
            .unwrap()
            .vehicles
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("vehicle", id))
    }

    async fn put_vehicle(&self, vehicle: &Vehicle) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.vehicles.contains_key(&vehicle.id) {
            return Err(StoreError::not_found("vehicle", vehicle.id));
        }
        inner.vehicles.insert(vehicle.id, vehicle.clone());
        Ok(())
    }

    async fn vehicles_for_account(&self, account_id: Uuid) -> StoreResult<Vec<Vehicle>> {
        let inner = self.inner.lock().unwrap();
        let mut vehicles: Vec<Vehicle> = inner
            .vehicles
            .values()
            .filter(|v| v.account_id == account_id)
            .cloned()
            .collect();
        vehicles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(vehicles)
    }

    async fn vehicle_ids_for_price_code(&self, price_code: &str) -> StoreResult<Vec<Uuid>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .vehicles
            .values()
            .filter(|v| {
                v.location_id
                    .and_then(|id| inner.locations.get(&id))
                    .is_some_and(|l| l.price_code == price_code)
            })
            .map(|v| v.id)
            .collect())
    }

    async fn update_vehicle_data(
        &self,
        vehicle: &Vehicle,
        connection: Option<&Connection>,
        charge: Option<&Charge>,
        trip: Option<&Trip>,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.vehicles.contains_key(&vehicle.id) {
            return Err(StoreError::not_found("vehicle", vehicle.id));
        }
        inner.vehicles.insert(vehicle.id, vehicle.clone());
        if let Some(connection) = connection {
            inner
                .connections
                .insert(connection.connected_id, connection.clone());
        }
        if let Some(charge) = charge {
            inner.charges.insert(charge.charge_id, charge.clone());
        }
        if let Some(trip) = trip {
            inner.trips.insert(trip.trip_id, trip.clone());
        }
        Ok(())
    }

    async fn set_charge_plan(
        &self,
        vehicle_id: Uuid,
        plan: Option<&[ChargePlanSegment]>,
        smart_status: &str,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let vehicle = inner
            .vehicles
            .get_mut(&vehicle_id)
            .ok_or_else(|| StoreError::not_found("vehicle", vehicle_id))?;
        vehicle.charge_plan = plan.map(<[ChargePlanSegment]>::to_vec);
        vehicle.smart_status = smart_status.to_owned();
        Ok(())
    }

    async fn get_location(&self, id: Uuid) -> StoreResult<Location> {
        self.inner
            .lock()
            .unwrap()
            .locations
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("location", id))
    }

    async fn get_locations(&self, account_id: Uuid) -> StoreResult<Vec<Location>> {
        let inner = self.inner.lock().unwrap();
        let mut locations: Vec<Location> = inner
            .locations
            .values()
            .filter(|l| l.account_id == account_id)
            .cloned()
            .collect();
        locations.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(locations)
    }

    async fn lookup_known_location(
        &self,
        account_id: Uuid,
        lat_micro: i32,
        lon_micro: i32,
    ) -> StoreResult<Option<Location>> {
        let locations = self.get_locations(account_id).await?;
        Ok(Location::find_enclosing(
            &locations,
            &GeoPoint {
                lat_micro,
                lon_micro,
            },
        )
        .cloned())
    }

    async fn update_price_list(
        &self,
        price_code: &str,
        points: &[PricePoint],
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let feed = inner.prices.entry(price_code.to_owned()).or_default();
        for point in points {
            feed.insert(point.ts, point.price);
        }
        Ok(())
    }

    async fn latest_price_ts(&self, price_code: &str) -> StoreResult<Option<DateTime<Utc>>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .prices
            .get(price_code)
            .and_then(|points| points.keys().next_back().copied()))
    }

    async fn earliest_price_ts(
        &self,
        price_code: &str,
    ) -> StoreResult<Option<DateTime<Utc>>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .prices
            .get(price_code)
            .and_then(|points| points.keys().next().copied()))
    }

    async fn price_points_between(
        &self,
        price_code: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<PricePoint>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .prices
            .get(price_code)
            .map(|points| {
                points
                    .range(from..to)
                    .map(|(&ts, &price)| PricePoint {
                        price_code: price_code.to_owned(),
                        ts,
                        price,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn price_at(
        &self,
        price_code: &str,
        ts: DateTime<Utc>,
    ) -> StoreResult<Option<PricePoint>> {
        let inner = self.inner.lock().unwrap();
        Ok(price_at_inner(&inner, price_code, ts))
    }

    async fn price_averages(
        &self,
        price_code: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<PriceAverages>> {
        let inner = self.inner.lock().unwrap();
        let Some(points) = inner.prices.get(price_code) else {
            return Ok(None);
        };
        let Some(latest_ts) = points.keys().next_back().copied() else {
            return Ok(None);
        };

        let mean_since = |days: i64| -> Option<i64> {
            let from = now - chrono::Duration::days(days);
            let window: Vec<i64> = points
                .range(..=now)
                .filter(|&(&ts, _)| ts > from)
                .map(|(_, &price)| price)
                .collect();
            if window.is_empty() {
                None
            } else {
                let sum: i64 = window.iter().sum();
                Some((sum as f64 / window.len() as f64).round() as i64)
            }
        };

        let Some(avg7) = mean_since(7) else {
            return Ok(None);
        };
        Ok(Some(PriceAverages {
            avg7,
            avg21: mean_since(21).unwrap_or(avg7),
            latest_ts,
        }))
    }

    async fn price_now_then(
        &self,
        price_code: &str,
        connected_id: Uuid,
        connection_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<PriceNowThen> {
        let inner = self.inner.lock().unwrap();
        let accumulated: i64 = inner
            .charges
            .values()
            .filter(|c| c.connected_id == connected_id && c.start_ts < now)
            .map(|c| (c.end_ts.min(now) - c.start_ts).num_seconds().max(0))
            .sum();
        let then_ts = connection_start + chrono::Duration::seconds(accumulated);
        Ok(PriceNowThen {
            price_now: price_at_inner(&inner, price_code, now).map(|p| p.price),
            price_then: price_at_inner(&inner, price_code, then_ts).map(|p| p.price),
        })
    }

    async fn get_connection(&self, id: Uuid) -> StoreResult<Connection> {
        self.inner
            .lock()
            .unwrap()
            .connections
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("connection", id))
    }

    async fn put_connection(&self, connection: &Connection) -> StoreResult<()> {
        self.inner
            .lock()
            .unwrap()
            .connections
            .insert(connection.connected_id, connection.clone());
        Ok(())
    }

    async fn closed_connections_since(
        &self,
        vehicle_id: Uuid,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<Connection>> {
        let inner = self.inner.lock().unwrap();
        let mut connections: Vec<Connection> = inner
            .connections
            .values()
            .filter(|c| c.vehicle_id == vehicle_id && !c.connected && c.start_ts >= since)
            .cloned()
            .collect();
        connections.sort_by_key(|c| c.start_ts);
        Ok(connections)
    }

    async fn get_charge(&self, id: Uuid) -> StoreResult<Charge> {
        self.inner
            .lock()
            .unwrap()
            .charges
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("charge", id))
    }

    async fn put_charge(&self, charge: &Charge) -> StoreResult<()> {
        self.inner
            .lock()
            .unwrap()
            .charges
            .insert(charge.charge_id, charge.clone());
        Ok(())
    }

    async fn connection_charge_seconds(&self, connected_id: Uuid) -> StoreResult<i64> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .charges
            .values()
            .filter(|c| c.connected_id == connected_id)
            .map(|c| (c.end_ts - c.start_ts).num_seconds().max(0))
            .sum())
    }

    async fn get_charge_current(
        &self,
        charge_id: Uuid,
    ) -> StoreResult<Option<ChargeCurrent>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .charge_currents
            .get(&charge_id)
            .cloned())
    }

    async fn put_charge_current(&self, current: &ChargeCurrent) -> StoreResult<()> {
        self.inner
            .lock()
            .unwrap()
            .charge_currents
            .insert(current.charge_id, current.clone());
        Ok(())
    }

    async fn delete_charge_current(&self, charge_id: Uuid) -> StoreResult<()> {
        self.inner.lock().unwrap().charge_currents.remove(&charge_id);
        Ok(())
    }

    async fn get_trip(&self, id: Uuid) -> StoreResult<Trip> {
        self.inner
            .lock()
            .unwrap()
            .trips
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("trip", id))
    }

    async fn put_trip(&self, trip: &Trip) -> StoreResult<()> {
        self.inner
            .lock()
            .unwrap()
            .trips
            .insert(trip.trip_id, trip.clone());
        Ok(())
    }

    async fn delete_trip(&self, id: Uuid) -> StoreResult<()> {
        self.inner.lock().unwrap().trips.remove(&id);
        Ok(())
    }

    async fn set_charge_curve(&self, point: &CurvePoint) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .curves
            .entry((point.vehicle_id, point.location_id))
            .or_default()
            .insert(point.level, point.clone());
        Ok(())
    }

    async fn get_charge_curve(
        &self,
        vehicle_id: Uuid,
        location_id: Uuid,
    ) -> StoreResult<Vec<CurvePoint>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .curves
            .get(&(vehicle_id, location_id))
            .map(|points| points.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn max_curve_level(
        &self,
        vehicle_id: Uuid,
        location_id: Uuid,
    ) -> StoreResult<Option<i16>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .curves
            .get(&(vehicle_id, location_id))
            .and_then(|points| points.keys().next_back().copied()))
    }

    async fn median_curve_duration(
        &self,
        vehicle_id: Uuid,
        location_id: Uuid,
    ) -> StoreResult<Option<i32>> {
        let inner = self.inner.lock().unwrap();
        let mut durations: Vec<f64> = inner
            .curves
            .get(&(vehicle_id, location_id))
            .map(|points| points.values().map(|p| f64::from(p.duration)).collect())
            .unwrap_or_default();
        durations.sort_by(f64::total_cmp);
        Ok(percentile_cont(&durations, 0.5).map(|m| m.round() as i32))
    }

    async fn upsert_event_map(&self, entry: &EventMapEntry) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .event_map
            .entry((entry.vehicle_id, entry.hour))
            .and_modify(|existing| existing.combine(entry))
            .or_insert_with(|| entry.clone());
        Ok(())
    }

    async fn newest_stats(
        &self,
        vehicle_id: Uuid,
        location_id: Uuid,
    ) -> StoreResult<Option<CurrentStats>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .stats
            .iter()
            .filter(|s| s.vehicle_id == vehicle_id && s.location_id == location_id)
            .max_by_key(|s| s.price_list_ts)
            .cloned())
    }

    async fn put_stats(&self, stats: &CurrentStats) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner
            .stats
            .iter_mut()
            .find(|s| s.stats_id == stats.stats_id)
        {
            *existing = stats.clone();
        } else {
            inner.stats.push(stats.clone());
        }
        Ok(())
    }

    async fn routine_prediction(
        &self,
        vehicle_id: Uuid,
        location_id: Uuid,
        now: DateTime<Utc>,
        tz: &str,
    ) -> StoreResult<RoutinePrediction> {
        let tz = parse_tz(tz)?;
        let window_start = now - chrono::Duration::days(42);
        let sequence = self.closed_connections_since(vehicle_id, window_start).await?;

        let today = now.with_timezone(&tz);
        let target_dow = today.weekday();

        let mut recent: Vec<f64> = Vec::new();
        let mut historic: Vec<f64> = Vec::new();
        for pair in sequence.windows(2) {
            let used = f64::from(pair[0].end_level - pair[1].start_level);
            if pair[0].location_id != location_id {
                continue;
            }
            if pair[0].end_ts > now - chrono::Duration::days(7) {
                recent.push(used);
            }
            if pair[0].end_ts.with_timezone(&tz).weekday() == target_dow {
                historic.push(used);
            }
        }
        historic.sort_by(f64::total_cmp);

        let recent_used = if recent.is_empty() {
            None
        } else {
            Some(recent.iter().sum::<f64>() / recent.len() as f64)
        };
        let historic_used = percentile_cont(&historic, 0.6);
        let charge_percent = match (recent_used, historic_used) {
            (Some(recent), Some(historic)) => Some(recent.max(historic)),
            (value, None) | (None, value) => value,
        };

        let mut times_of_day: Vec<chrono::NaiveTime> = sequence
            .iter()
            .filter(|c| {
                c.location_id == location_id
                    && c.end_ts.with_timezone(&tz).weekday() == target_dow
            })
            .map(|c| c.end_ts.with_timezone(&tz).time())
            .collect();
        times_of_day.sort();

        let before = percentile_disc(&times_of_day, 0.2).and_then(|tod| {
            tz.from_local_datetime(&today.date_naive().and_time(tod))
                .earliest()
                .map(|local| local.with_timezone(&Utc))
        });

        Ok(RoutinePrediction {
            charge_percent,
            before,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_cont_interpolates() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile_cont(&values, 0.5), Some(2.5));
        assert_eq!(percentile_cont(&values, 0.0), Some(1.0));
        assert_eq!(percentile_cont(&values, 1.0), Some(4.0));
        assert_eq!(percentile_cont(&[], 0.5), None);
    }

    #[test]
    fn percentile_disc_picks_a_member() {
        let values = [10, 20, 30, 40, 50];
        assert_eq!(percentile_disc(&values, 0.2), Some(10));
        assert_eq!(percentile_disc(&values, 0.5), Some(30));
        assert_eq!(percentile_disc(&values, 1.0), Some(50));
    }
}
