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

//! The typed persistence surface the engine runs against.
//!
//! Two implementations exist: [`crate::postgres::PgStore`] for production
//! and [`crate::memory::MemStore`] for the test suites and offline
//! simulation. Every call is an await point; the engine holds no vehicle
//! state across requests beyond what it reads here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use voltion_types::{
    Charge, ChargeCurrent, ChargePlanSegment, Connection, CurrentStats, CurvePoint,
    EventMapEntry, Location, PricePoint, Trip, Vehicle,
};

use crate::error::StoreResult;

/// Rolling price means for a feed, plus the feed's newest timestamp.
///
/// `latest_ts` is what `CurrentStats.price_list_ts` is compared against for
/// staleness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceAverages {
    /// Mean price of the last 7 days, scaled.
    pub avg7: i64,
    /// Mean price of the last 21 days, scaled.
    pub avg21: i64,
    pub latest_ts: DateTime<Utc>,
}

/// Result of the routine-need prediction query.
///
/// Either field may be missing while the vehicle is still learning; the
/// planner then falls back to the learning fill.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RoutinePrediction {
    /// Percent of battery expected to be needed for the next cycle.
    pub charge_percent: Option<f64>,
    /// Predicted disconnect time, projected onto the current day.
    pub before: Option<DateTime<Utc>>,
}

/// The price-now / price-then pair used for cost and savings accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PriceNowThen {
    /// Latest price at or before now.
    pub price_now: Option<i64>,
    /// Price at the virtual time-shifted start-of-connection window.
    pub price_then: Option<i64>,
}

/// Typed access to the relational store.
///
/// Single-row transactions unless documented otherwise. Failures surface as
/// [`crate::StoreError`]; transient ones are already retried internally.
#[async_trait]
pub trait Gateway: Send + Sync {
    // ---- vehicles ----

    async fn get_vehicle(&self, id: Uuid) -> StoreResult<Vehicle>;

    async fn put_vehicle(&self, vehicle: &Vehicle) -> StoreResult<()>;

    async fn vehicles_for_account(&self, account_id: Uuid) -> StoreResult<Vec<Vehicle>>;

    /// Vehicles currently at a location buying on this price code.
    async fn vehicle_ids_for_price_code(&self, price_code: &str) -> StoreResult<Vec<Uuid>>;

    /// Write the vehicle row and its dirty children in one transaction.
    ///
    /// This is the ingestor's commit: the sample either lands completely or
    /// not at all.
    async fn update_vehicle_data(
        &self,
        vehicle: &Vehicle,
        connection: Option<&Connection>,
        charge: Option<&Charge>,
        trip: Option<&Trip>,
    ) -> StoreResult<()>;

    /// Publish a reconciled plan (or `None` for "no action required").
    async fn set_charge_plan(
        &self,
        vehicle_id: Uuid,
        plan: Option<&[ChargePlanSegment]>,
        smart_status: &str,
    ) -> StoreResult<()>;

    // ---- locations ----

    async fn get_location(&self, id: Uuid) -> StoreResult<Location>;

    async fn get_locations(&self, account_id: Uuid) -> StoreResult<Vec<Location>>;

    /// The smallest-radius known location whose fence contains the point.
    async fn lookup_known_location(
        &self,
        account_id: Uuid,
        lat_micro: i32,
        lon_micro: i32,
    ) -> StoreResult<Option<Location>>;

    // ---- price feed ----

    /// Upsert a batch of hour-aligned points for a feed.
    async fn update_price_list(
        &self,
        price_code: &str,
        points: &[PricePoint],
    ) -> StoreResult<()>;

    async fn latest_price_ts(&self, price_code: &str) -> StoreResult<Option<DateTime<Utc>>>;

    async fn earliest_price_ts(&self, price_code: &str)
        -> StoreResult<Option<DateTime<Utc>>>;

    /// Points with `from <= ts < to`, ascending by `ts`.
    async fn price_points_between(
        &self,
        price_code: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<PricePoint>>;

    /// Latest point at or before `ts`.
    async fn price_at(
        &self,
        price_code: &str,
        ts: DateTime<Utc>,
    ) -> StoreResult<Option<PricePoint>>;

    /// 7- and 21-day rolling means ending at `now`.
    async fn price_averages(
        &self,
        price_code: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<PriceAverages>>;

    /// The pair for incremental cost/saved accounting of an open
    /// connection: the price now, and the price at the virtual start-of-
    /// connection window shifted by the charge time already accumulated on
    /// this connection.
    async fn price_now_then(
        &self,
        price_code: &str,
        connected_id: Uuid,
        connection_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<PriceNowThen>;

    // ---- connections and charges ----

    async fn get_connection(&self, id: Uuid) -> StoreResult<Connection>;

    async fn put_connection(&self, connection: &Connection) -> StoreResult<()>;

    /// Closed connections (`connected = false`) for the vehicle with
    /// `start_ts >= since`, ascending by `start_ts`. All locations; the
    /// statistics engine flags offsite ones itself.
    async fn closed_connections_since(
        &self,
        vehicle_id: Uuid,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<Connection>>;

    async fn get_charge(&self, id: Uuid) -> StoreResult<Charge>;

    async fn put_charge(&self, charge: &Charge) -> StoreResult<()>;

    /// Total seconds of active draw recorded for the connection so far.
    async fn connection_charge_seconds(&self, connected_id: Uuid) -> StoreResult<i64>;

    async fn get_charge_current(&self, charge_id: Uuid)
        -> StoreResult<Option<ChargeCurrent>>;

    async fn put_charge_current(&self, current: &ChargeCurrent) -> StoreResult<()>;

    async fn delete_charge_current(&self, charge_id: Uuid) -> StoreResult<()>;

    // ---- trips ----

    async fn get_trip(&self, id: Uuid) -> StoreResult<Trip>;

    async fn put_trip(&self, trip: &Trip) -> StoreResult<()>;

    async fn delete_trip(&self, id: Uuid) -> StoreResult<()>;

    // ---- charge curve ----

    /// Upsert one learned percent, keyed `(vehicle, location, level)`.
    async fn set_charge_curve(&self, point: &CurvePoint) -> StoreResult<()>;

    /// All learned points for the pair, ascending by level.
    async fn get_charge_curve(
        &self,
        vehicle_id: Uuid,
        location_id: Uuid,
    ) -> StoreResult<Vec<CurvePoint>>;

    async fn max_curve_level(
        &self,
        vehicle_id: Uuid,
        location_id: Uuid,
    ) -> StoreResult<Option<i16>>;

    /// `percentile_cont(0.5)` of the per-percent durations.
    async fn median_curve_duration(
        &self,
        vehicle_id: Uuid,
        location_id: Uuid,
    ) -> StoreResult<Option<i32>>;

    // ---- hourly event map ----

    /// Atomic min/max/sum upsert of an hour bucket.
    async fn upsert_event_map(&self, entry: &EventMapEntry) -> StoreResult<()>;

    // ---- statistics ----

    async fn newest_stats(
        &self,
        vehicle_id: Uuid,
        location_id: Uuid,
    ) -> StoreResult<Option<CurrentStats>>;

    async fn put_stats(&self, stats: &CurrentStats) -> StoreResult<()>;

    /// Routine prediction over six weeks of completed connections at this
    /// location on similar weekdays: the percent expected to be used before
    /// the next plug-in and the projected disconnect time. `tz` is the
    /// planner timezone name used for day-of-week matching.
    async fn routine_prediction(
        &self,
        vehicle_id: Uuid,
        location_id: Uuid,
        now: DateTime<Utc>,
        tz: &str,
    ) -> StoreResult<RoutinePrediction>;
}
