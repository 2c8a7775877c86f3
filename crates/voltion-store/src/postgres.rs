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

//! PostgreSQL implementation of the persistence gateway.
//!
//! Plain parameterized SQL over `sqlx::PgPool`; rows are mapped by hand.
//! The statistics queries lean on `percentile_cont` / `percentile_disc`
//! and `date_trunc`, which is why PostgreSQL semantics are normative for
//! the engine. Schema migrations live outside this repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;

use voltion_types::{
    Charge, ChargeCurrent, ChargePlanSegment, ChargerType, Connection, CurrentStats,
    CurvePoint, EventMapEntry, GeoPoint, Location, PricePoint, ScheduledTrip, Trip, Vehicle,
};

use crate::error::{StoreError, StoreResult, with_retry};
use crate::gateway::{Gateway, PriceAverages, PriceNowThen, RoutinePrediction};

/// PostgreSQL-backed gateway over a shared connection pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn charger_type_from_column(value: &str) -> Result<ChargerType, StoreError> {
    ChargerType::from_str(value).map_err(StoreError::Internal)
}

fn vehicle_from_row(row: &PgRow) -> Result<Vehicle, sqlx::Error> {
    let trip_level: Option<i16> = row.try_get("scheduled_trip_level")?;
    let trip_time: Option<DateTime<Utc>> = row.try_get("scheduled_trip_time")?;
    let scheduled_trip = match (trip_level, trip_time) {
        (Some(level), Some(time)) => Some(ScheduledTrip { level, time }),
        _ => None,
    };

    let plan_json: Option<serde_json::Value> = row.try_get("charge_plan")?;
    let charge_plan = match plan_json {
        Some(value) => Some(
            serde_json::from_value::<Vec<ChargePlanSegment>>(value)
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        ),
        None => None,
    };

    Ok(Vehicle {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        name: row.try_get("name")?,
        minimum_charge: row.try_get("minimum_charge")?,
        maximum_charge: row.try_get("maximum_charge")?,
        anxiety_level: row.try_get("anxiety_level")?,
        scheduled_trip,
        paused_until: row.try_get("paused_until")?,
        location_id: row.try_get("location_id")?,
        lat_micro: row.try_get("lat_micro")?,
        lon_micro: row.try_get("lon_micro")?,
        level: row.try_get("level")?,
        odometer: row.try_get("odometer")?,
        outside_deci_temp: row.try_get("outside_deci_temp")?,
        inside_deci_temp: row.try_get("inside_deci_temp")?,
        climate_on: row.try_get("climate_on")?,
        driving: row.try_get("driving")?,
        connected: row.try_get("connected")?,
        charging_to: row.try_get("charging_to")?,
        estimate: row.try_get("estimate")?,
        connected_id: row.try_get("connected_id")?,
        charge_id: row.try_get("charge_id")?,
        trip_id: row.try_get("trip_id")?,
        charge_plan,
        smart_status: row.try_get("smart_status")?,
        status: row.try_get("status")?,
        updated: row.try_get("updated")?,
        provider_data: row.try_get("provider_data")?,
    })
}

fn location_from_row(row: &PgRow) -> Result<Location, sqlx::Error> {
    Ok(Location {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        name: row.try_get("name")?,
        geo: GeoPoint {
            lat_micro: row.try_get("lat_micro")?,
            lon_micro: row.try_get("lon_micro")?,
        },
        geo_fence_radius: row.try_get("geo_fence_radius")?,
        price_code: row.try_get("price_code")?,
    })
}

fn connection_from_row(row: &PgRow) -> StoreResult<Connection> {
    let charger_type: String = row.try_get("charger_type").map_err(StoreError::from)?;
    Ok(Connection {
        connected_id: row.try_get("connected_id").map_err(StoreError::from)?,
        vehicle_id: row.try_get("vehicle_id").map_err(StoreError::from)?,
        location_id: row.try_get("location_id").map_err(StoreError::from)?,
        charger_type: charger_type_from_column(&charger_type)?,
        start_ts: row.try_get("start_ts").map_err(StoreError::from)?,
        end_ts: row.try_get("end_ts").map_err(StoreError::from)?,
        start_level: row.try_get("start_level").map_err(StoreError::from)?,
        end_level: row.try_get("end_level").map_err(StoreError::from)?,
        energy_used: row.try_get("energy_used").map_err(StoreError::from)?,
        cost: row.try_get("cost").map_err(StoreError::from)?,
        saved: row.try_get("saved").map_err(StoreError::from)?,
        connected: row.try_get("connected").map_err(StoreError::from)?,
    })
}

fn charge_from_row(row: &PgRow) -> StoreResult<Charge> {
    let charger_type: String = row.try_get("charger_type").map_err(StoreError::from)?;
    Ok(Charge {
        charge_id: row.try_get("charge_id").map_err(StoreError::from)?,
        connected_id: row.try_get("connected_id").map_err(StoreError::from)?,
        vehicle_id: row.try_get("vehicle_id").map_err(StoreError::from)?,
        location_id: row.try_get("location_id").map_err(StoreError::from)?,
        charger_type: charger_type_from_column(&charger_type)?,
        start_ts: row.try_get("start_ts").map_err(StoreError::from)?,
        end_ts: row.try_get("end_ts").map_err(StoreError::from)?,
        start_level: row.try_get("start_level").map_err(StoreError::from)?,
        end_level: row.try_get("end_level").map_err(StoreError::from)?,
        start_added: row.try_get("start_added").map_err(StoreError::from)?,
        end_added: row.try_get("end_added").map_err(StoreError::from)?,
        target_level: row.try_get("target_level").map_err(StoreError::from)?,
        estimate: row.try_get("estimate").map_err(StoreError::from)?,
        energy_used: row.try_get("energy_used").map_err(StoreError::from)?,
    })
}

fn trip_from_row(row: &PgRow) -> Result<Trip, sqlx::Error> {
    Ok(Trip {
        trip_id: row.try_get("trip_id")?,
        vehicle_id: row.try_get("vehicle_id")?,
        start_ts: row.try_get("start_ts")?,
        end_ts: row.try_get("end_ts")?,
        start_level: row.try_get("start_level")?,
        end_level: row.try_get("end_level")?,
        start_location_id: row.try_get("start_location_id")?,
        end_location_id: row.try_get("end_location_id")?,
        start_odometer: row.try_get("start_odometer")?,
        start_outside_deci_temp: row.try_get("start_outside_deci_temp")?,
        distance: row.try_get("distance")?,
    })
}

fn curve_point_from_row(row: &PgRow) -> Result<CurvePoint, sqlx::Error> {
    Ok(CurvePoint {
        vehicle_id: row.try_get("vehicle_id")?,
        location_id: row.try_get("location_id")?,
        level: row.try_get("level")?,
        duration: row.try_get("duration")?,
        avg_deci_temp: row.try_get("avg_deci_temp")?,
        energy_used: row.try_get("energy_used")?,
        energy_added: row.try_get("energy_added")?,
    })
}

fn stats_from_row(row: &PgRow) -> Result<CurrentStats, sqlx::Error> {
    Ok(CurrentStats {
        stats_id: row.try_get("stats_id")?,
        vehicle_id: row.try_get("vehicle_id")?,
        location_id: row.try_get("location_id")?,
        price_list_ts: row.try_get("price_list_ts")?,
        level_charge_time: row.try_get("level_charge_time")?,
        weekly_avg7_price: row.try_get("weekly_avg7_price")?,
        weekly_avg21_price: row.try_get("weekly_avg21_price")?,
        threshold: row.try_get("threshold")?,
    })
}

const VEHICLE_COLUMNS: &str = "id, account_id, name, minimum_charge, maximum_charge, \
     anxiety_level, scheduled_trip_level, scheduled_trip_time, paused_until, location_id, \
     lat_micro, lon_micro, level, odometer, outside_deci_temp, inside_deci_temp, climate_on, \
     driving, connected, charging_to, estimate, connected_id, charge_id, trip_id, charge_plan, \
     smart_status, status, updated, provider_data";

async fn write_vehicle(
    executor: impl sqlx::PgExecutor<'_>,
    vehicle: &Vehicle,
) -> StoreResult<()> {
    let plan_json = vehicle
        .charge_plan
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| StoreError::InvalidInput(format!("charge plan not serializable: {e}")))?;

    let result = sqlx::query(
        "UPDATE vehicle SET \
            name = $2, minimum_charge = $3, maximum_charge = $4, anxiety_level = $5, \
            scheduled_trip_level = $6, scheduled_trip_time = $7, paused_until = $8, \
            location_id = $9, lat_micro = $10, lon_micro = $11, level = $12, odometer = $13, \
            outside_deci_temp = $14, inside_deci_temp = $15, climate_on = $16, driving = $17, \
            connected = $18, charging_to = $19, estimate = $20, connected_id = $21, \
            charge_id = $22, trip_id = $23, charge_plan = $24, smart_status = $25, \
            status = $26, updated = $27, provider_data = $28 \
         WHERE id = $1",
    )
    .bind(vehicle.id)
    .bind(&vehicle.name)
    .bind(vehicle.minimum_charge)
    .bind(vehicle.maximum_charge)
    .bind(vehicle.anxiety_level)
    .bind(vehicle.scheduled_trip.map(|t| t.level))
    .bind(vehicle.scheduled_trip.map(|t| t.time))
    .bind(vehicle.paused_until)
    .bind(vehicle.location_id)
    .bind(vehicle.lat_micro)
    .bind(vehicle.lon_micro)
    .bind(vehicle.level)
    .bind(vehicle.odometer)
    .bind(vehicle.outside_deci_temp)
    .bind(vehicle.inside_deci_temp)
    .bind(vehicle.climate_on)
    .bind(vehicle.driving)
    .bind(vehicle.connected)
    .bind(vehicle.charging_to)
    .bind(vehicle.estimate)
    .bind(vehicle.connected_id)
    .bind(vehicle.charge_id)
    .bind(vehicle.trip_id)
    .bind(plan_json)
    .bind(&vehicle.smart_status)
    .bind(&vehicle.status)
    .bind(vehicle.updated)
    .bind(&vehicle.provider_data)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::not_found("vehicle", vehicle.id));
    }
    Ok(())
}

async fn write_connection(
    executor: impl sqlx::PgExecutor<'_>,
    connection: &Connection,
) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO connected (connected_id, vehicle_id, location_id, charger_type, \
            start_ts, end_ts, start_level, end_level, energy_used, cost, saved, connected) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
         ON CONFLICT (connected_id) DO UPDATE SET \
            end_ts = EXCLUDED.end_ts, end_level = EXCLUDED.end_level, \
            energy_used = EXCLUDED.energy_used, cost = EXCLUDED.cost, \
            saved = EXCLUDED.saved, connected = EXCLUDED.connected",
    )
    .bind(connection.connected_id)
    .bind(connection.vehicle_id)
    .bind(connection.location_id)
    .bind(connection.charger_type.as_str())
    .bind(connection.start_ts)
    .bind(connection.end_ts)
    .bind(connection.start_level)
    .bind(connection.end_level)
    .bind(connection.energy_used)
    .bind(connection.cost)
    .bind(connection.saved)
    .bind(connection.connected)
    .execute(executor)
    .await?;
    Ok(())
}

async fn write_charge(
    executor: impl sqlx::PgExecutor<'_>,
    charge: &Charge,
) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO charge (charge_id, connected_id, vehicle_id, location_id, charger_type, \
            start_ts, end_ts, start_level, end_level, start_added, end_added, target_level, \
            estimate, energy_used) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
         ON CONFLICT (charge_id) DO UPDATE SET \
            end_ts = EXCLUDED.end_ts, end_level = EXCLUDED.end_level, \
            end_added = EXCLUDED.end_added, target_level = EXCLUDED.target_level, \
            estimate = EXCLUDED.estimate, energy_used = EXCLUDED.energy_used",
    )
    .bind(charge.charge_id)
    .bind(charge.connected_id)
    .bind(charge.vehicle_id)
    .bind(charge.location_id)
    .bind(charge.charger_type.as_str())
    .bind(charge.start_ts)
    .bind(charge.end_ts)
    .bind(charge.start_level)
    .bind(charge.end_level)
    .bind(charge.start_added)
    .bind(charge.end_added)
    .bind(charge.target_level)
    .bind(charge.estimate)
    .bind(charge.energy_used)
    .execute(executor)
    .await?;
    Ok(())
}

async fn write_trip(executor: impl sqlx::PgExecutor<'_>, trip: &Trip) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO trip (trip_id, vehicle_id, start_ts, end_ts, start_level, end_level, \
            start_location_id, end_location_id, start_odometer, start_outside_deci_temp, \
            distance) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
         ON CONFLICT (trip_id) DO UPDATE SET \
            end_ts = EXCLUDED.end_ts, end_level = EXCLUDED.end_level, \
            end_location_id = EXCLUDED.end_location_id, distance = EXCLUDED.distance",
    )
    .bind(trip.trip_id)
    .bind(trip.vehicle_id)
    .bind(trip.start_ts)
    .bind(trip.end_ts)
    .bind(trip.start_level)
    .bind(trip.end_level)
    .bind(trip.start_location_id)
    .bind(trip.end_location_id)
    .bind(trip.start_odometer)
    .bind(trip.start_outside_deci_temp)
    .bind(trip.distance)
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl Gateway for PgStore {
    async fn get_vehicle(&self, id: Uuid) -> StoreResult<Vehicle> {
        with_retry("get_vehicle", || async {
            let row = sqlx::query(&format!(
                "SELECT {VEHICLE_COLUMNS} FROM vehicle WHERE id = $1"
            ))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            match row {
                Some(row) => vehicle_from_row(&row).map_err(StoreError::from),
                None => Err(StoreError::not_found("vehicle", id)),
            }
        })
        .await
    }

    async fn put_vehicle(&self, vehicle: &Vehicle) -> StoreResult<()> {
        with_retry("put_vehicle", || async {
            write_vehicle(&self.pool, vehicle).await
        })
        .await
    }

    async fn vehicles_for_account(&self, account_id: Uuid) -> StoreResult<Vec<Vehicle>> {
        with_retry("vehicles_for_account", || async {
            let rows = sqlx::query(&format!(
                "SELECT {VEHICLE_COLUMNS} FROM vehicle WHERE account_id = $1 ORDER BY name"
            ))
            .bind(account_id)
            .fetch_all(&self.pool)
            .await?;
            rows.iter()
                .map(|row| vehicle_from_row(row).map_err(StoreError::from))
                .collect()
        })
        .await
    }

    async fn vehicle_ids_for_price_code(&self, price_code: &str) -> StoreResult<Vec<Uuid>> {
        with_retry("vehicle_ids_for_price_code", || async {
            let ids = sqlx::query_scalar::<_, Uuid>(
                "SELECT v.id FROM vehicle v \
                 JOIN location l ON l.id = v.location_id \
                 WHERE l.price_code = $1",
            )
            .bind(price_code)
            .fetch_all(&self.pool)
            .await?;
            Ok(ids)
        })
        .await
    }

    async fn update_vehicle_data(
        &self,
        vehicle: &Vehicle,
        connection: Option<&Connection>,
        charge: Option<&Charge>,
        trip: Option<&Trip>,
    ) -> StoreResult<()> {
        with_retry("update_vehicle_data", || async {
            let mut tx = self.pool.begin().await?;
            write_vehicle(&mut *tx, vehicle).await?;
            if let Some(connection) = connection {
                write_connection(&mut *tx, connection).await?;
            }
            if let Some(charge) = charge {
                write_charge(&mut *tx, charge).await?;
            }
            if let Some(trip) = trip {
                write_trip(&mut *tx, trip).await?;
            }
            tx.commit().await?;
            Ok(())
        })
        .await
    }

    async fn set_charge_plan(
        &self,
        vehicle_id: Uuid,
        plan: Option<&[ChargePlanSegment]>,
        smart_status: &str,
    ) -> StoreResult<()> {
        let plan_json = plan
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| StoreError::InvalidInput(format!("charge plan not serializable: {e}")))?;
        with_retry("set_charge_plan", || async {
            let result = sqlx::query(
                "UPDATE vehicle SET charge_plan = $2, smart_status = $3 WHERE id = $1",
            )
            .bind(vehicle_id)
            .bind(&plan_json)
            .bind(smart_status)
            .execute(&self.pool)
            .await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::not_found("vehicle", vehicle_id));
            }
            Ok(())
        })
        .await
    }

    async fn get_location(&self, id: Uuid) -> StoreResult<Location> {
        with_retry("get_location", || async {
            let row = sqlx::query(
                "SELECT id, account_id, name, lat_micro, lon_micro, geo_fence_radius, \
                    price_code \
                 FROM location WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            match row {
                Some(row) => location_from_row(&row).map_err(StoreError::from),
                None => Err(StoreError::not_found("location", id)),
            }
        })
        .await
    }

    async fn get_locations(&self, account_id: Uuid) -> StoreResult<Vec<Location>> {
        with_retry("get_locations", || async {
            let rows = sqlx::query(
                "SELECT id, account_id, name, lat_micro, lon_micro, geo_fence_radius, \
                    price_code \
                 FROM location WHERE account_id = $1 ORDER BY name",
            )
            .bind(account_id)
            .fetch_all(&self.pool)
            .await?;
            rows.iter()
                .map(|row| location_from_row(row).map_err(StoreError::from))
                .collect()
        })
        .await
    }

    async fn lookup_known_location(
        &self,
        account_id: Uuid,
        lat_micro: i32,
        lon_micro: i32,
    ) -> StoreResult<Option<Location>> {
        // Fence evaluation happens in Rust so both gateway implementations
        // share the same geometry.
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
        with_retry("update_price_list", || async {
            let mut tx = self.pool.begin().await?;
            for point in points {
                sqlx::query(
                    "INSERT INTO price_list (price_code, ts, price) VALUES ($1, $2, $3) \
                     ON CONFLICT (price_code, ts) DO UPDATE SET price = EXCLUDED.price",
                )
                .bind(price_code)
                .bind(point.ts)
                .bind(point.price)
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;
            Ok(())
        })
        .await
    }

    async fn latest_price_ts(&self, price_code: &str) -> StoreResult<Option<DateTime<Utc>>> {
        with_retry("latest_price_ts", || async {
            let ts = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
                "SELECT MAX(ts) FROM price_list WHERE price_code = $1",
            )
            .bind(price_code)
            .fetch_one(&self.pool)
            .await?;
            Ok(ts)
        })
        .await
    }

    async fn earliest_price_ts(
        &self,
        price_code: &str,
    ) -> StoreResult<Option<DateTime<Utc>>> {
        with_retry("earliest_price_ts", || async {
            let ts = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
                "SELECT MIN(ts) FROM price_list WHERE price_code = $1",
            )
            .bind(price_code)
            .fetch_one(&self.pool)
            .await?;
            Ok(ts)
        })
        .await
    }

    async fn price_points_between(
        &self,
        price_code: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<PricePoint>> {
        with_retry("price_points_between", || async {
            let rows = sqlx::query(
                "SELECT price_code, ts, price FROM price_list \
                 WHERE price_code = $1 AND ts >= $2 AND ts < $3 ORDER BY ts",
            )
            .bind(price_code)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await?;
            rows.iter()
                .map(|row| {
                    Ok(PricePoint {
                        price_code: row.try_get("price_code")?,
                        ts: row.try_get("ts")?,
                        price: row.try_get("price")?,
                    })
                })
                .collect::<Result<Vec<_>, sqlx::Error>>()
                .map_err(StoreError::from)
        })
        .await
    }

    async fn price_at(
        &self,
        price_code: &str,
        ts: DateTime<Utc>,
    ) -> StoreResult<Option<PricePoint>> {
        with_retry("price_at", || async {
            let row = sqlx::query(
                "SELECT price_code, ts, price FROM price_list \
                 WHERE price_code = $1 AND ts <= $2 ORDER BY ts DESC LIMIT 1",
            )
            .bind(price_code)
            .bind(ts)
            .fetch_optional(&self.pool)
            .await?;
            row.map(|row| {
                Ok::<_, sqlx::Error>(PricePoint {
                    price_code: row.try_get("price_code")?,
                    ts: row.try_get("ts")?,
                    price: row.try_get("price")?,
                })
            })
            .transpose()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn price_averages(
        &self,
        price_code: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<PriceAverages>> {
        with_retry("price_averages", || async {
            let row = sqlx::query(
                "SELECT \
                    (SELECT AVG(price)::bigint FROM price_list \
                        WHERE price_code = $1 AND ts > $2 - interval '7 days' AND ts <= $2) \
                        AS avg7, \
                    (SELECT AVG(price)::bigint FROM price_list \
                        WHERE price_code = $1 AND ts > $2 - interval '21 days' AND ts <= $2) \
                        AS avg21, \
                    (SELECT MAX(ts) FROM price_list WHERE price_code = $1) AS latest_ts",
            )
            .bind(price_code)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;

            let latest_ts: Option<DateTime<Utc>> = row.try_get("latest_ts")?;
            let avg7: Option<i64> = row.try_get("avg7")?;
            let avg21: Option<i64> = row.try_get("avg21")?;
            Ok(match (latest_ts, avg7) {
                (Some(latest_ts), Some(avg7)) => Some(PriceAverages {
                    avg7,
                    avg21: avg21.unwrap_or(avg7),
                    latest_ts,
                }),
                _ => None,
            })
        })
        .await
    }

    async fn price_now_then(
        &self,
        price_code: &str,
        connected_id: Uuid,
        connection_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<PriceNowThen> {
        with_retry("price_now_then", || async {
            let row = sqlx::query(
                "SELECT \
                    (SELECT price FROM price_list \
                        WHERE price_code = $1 AND ts <= $2 \
                        ORDER BY ts DESC LIMIT 1) AS price_now, \
                    (SELECT price FROM price_list \
                        WHERE price_code = $1 \
                          AND ts <= $3::timestamptz + make_interval(secs => ( \
                                SELECT COALESCE(SUM(EXTRACT(EPOCH FROM \
                                    (LEAST(end_ts, $2) - start_ts))), 0) \
                                FROM charge \
                                WHERE connected_id = $4 AND start_ts < $2)) \
                        ORDER BY ts DESC LIMIT 1) AS price_then",
            )
            .bind(price_code)
            .bind(now)
            .bind(connection_start)
            .bind(connected_id)
            .fetch_one(&self.pool)
            .await?;
            Ok(PriceNowThen {
                price_now: row.try_get("price_now")?,
                price_then: row.try_get("price_then")?,
            })
        })
        .await
    }

    async fn get_connection(&self, id: Uuid) -> StoreResult<Connection> {
        with_retry("get_connection", || async {
            let row = sqlx::query(
                "SELECT connected_id, vehicle_id, location_id, charger_type, start_ts, \
                    end_ts, start_level, end_level, energy_used, cost, saved, connected \
                 FROM connected WHERE connected_id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            match row {
                Some(row) => connection_from_row(&row),
                None => Err(StoreError::not_found("connection", id)),
            }
        })
        .await
    }

    async fn put_connection(&self, connection: &Connection) -> StoreResult<()> {
        with_retry("put_connection", || async {
            write_connection(&self.pool, connection).await
        })
        .await
    }

    async fn closed_connections_since(
        &self,
        vehicle_id: Uuid,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<Connection>> {
        with_retry("closed_connections_since", || async {
            let rows = sqlx::query(
                "SELECT connected_id, vehicle_id, location_id, charger_type, start_ts, \
                    end_ts, start_level, end_level, energy_used, cost, saved, connected \
                 FROM connected \
                 WHERE vehicle_id = $1 AND connected = false AND start_ts >= $2 \
                 ORDER BY start_ts",
            )
            .bind(vehicle_id)
            .bind(since)
            .fetch_all(&self.pool)
            .await?;
            rows.iter().map(connection_from_row).collect()
        })
        .await
    }

    async fn get_charge(&self, id: Uuid) -> StoreResult<Charge> {
        with_retry("get_charge", || async {
            let row = sqlx::query(
                "SELECT charge_id, connected_id, vehicle_id, location_id, charger_type, \
                    start_ts, end_ts, start_level, end_level, start_added, end_added, \
                    target_level, estimate, energy_used \
                 FROM charge WHERE charge_id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            match row {
                Some(row) => charge_from_row(&row),
                None => Err(StoreError::not_found("charge", id)),
            }
        })
        .await
    }

    async fn put_charge(&self, charge: &Charge) -> StoreResult<()> {
        with_retry("put_charge", || async {
            write_charge(&self.pool, charge).await
        })
        .await
    }

    async fn connection_charge_seconds(&self, connected_id: Uuid) -> StoreResult<i64> {
        with_retry("connection_charge_seconds", || async {
            let seconds = sqlx::query_scalar::<_, Option<f64>>(
                "SELECT SUM(EXTRACT(EPOCH FROM (end_ts - start_ts)))::float8 \
                 FROM charge WHERE connected_id = $1",
            )
            .bind(connected_id)
            .fetch_one(&self.pool)
            .await?;
            Ok(seconds.unwrap_or(0.0) as i64)
        })
        .await
    }

    async fn get_charge_current(
        &self,
        charge_id: Uuid,
    ) -> StoreResult<Option<ChargeCurrent>> {
        with_retry("get_charge_current", || async {
            let row = sqlx::query(
                "SELECT charge_id, start_ts, start_level, start_added, powers, \
                    outside_deci_temps \
                 FROM charge_current WHERE charge_id = $1",
            )
            .bind(charge_id)
            .fetch_optional(&self.pool)
            .await?;
            row.map(|row| {
                Ok::<_, sqlx::Error>(ChargeCurrent {
                    charge_id: row.try_get("charge_id")?,
                    start_ts: row.try_get("start_ts")?,
                    start_level: row.try_get("start_level")?,
                    start_added: row.try_get("start_added")?,
                    powers: row.try_get("powers")?,
                    outside_deci_temps: row.try_get("outside_deci_temps")?,
                })
            })
            .transpose()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn put_charge_current(&self, current: &ChargeCurrent) -> StoreResult<()> {
        with_retry("put_charge_current", || async {
            sqlx::query(
                "INSERT INTO charge_current (charge_id, start_ts, start_level, \
                    start_added, powers, outside_deci_temps) \
                 VALUES ($1, $2, $3, $4, $5, $6) \
                 ON CONFLICT (charge_id) DO UPDATE SET \
                    start_ts = EXCLUDED.start_ts, start_level = EXCLUDED.start_level, \
                    start_added = EXCLUDED.start_added, powers = EXCLUDED.powers, \
                    outside_deci_temps = EXCLUDED.outside_deci_temps",
            )
            .bind(current.charge_id)
            .bind(current.start_ts)
            .bind(current.start_level)
            .bind(current.start_added)
            .bind(&current.powers)
            .bind(&current.outside_deci_temps)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn delete_charge_current(&self, charge_id: Uuid) -> StoreResult<()> {
        with_retry("delete_charge_current", || async {
            sqlx::query("DELETE FROM charge_current WHERE charge_id = $1")
                .bind(charge_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }

    async fn get_trip(&self, id: Uuid) -> StoreResult<Trip> {
        with_retry("get_trip", || async {
            let row = sqlx::query(
                "SELECT trip_id, vehicle_id, start_ts, end_ts, start_level, end_level, \
                    start_location_id, end_location_id, start_odometer, \
                    start_outside_deci_temp, distance \
                 FROM trip WHERE trip_id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            match row {
                Some(row) => trip_from_row(&row).map_err(StoreError::from),
                None => Err(StoreError::not_found("trip", id)),
            }
        })
        .await
    }

    async fn put_trip(&self, trip: &Trip) -> StoreResult<()> {
        with_retry("put_trip", || async { write_trip(&self.pool, trip).await }).await
    }

    async fn delete_trip(&self, id: Uuid) -> StoreResult<()> {
        with_retry("delete_trip", || async {
            sqlx::query("DELETE FROM trip WHERE trip_id = $1")
                .bind(id)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }

    async fn set_charge_curve(&self, point: &CurvePoint) -> StoreResult<()> {
        with_retry("set_charge_curve", || async {
            sqlx::query(
                "INSERT INTO charge_curve (vehicle_id, location_id, level, duration, \
                    avg_deci_temp, energy_used, energy_added) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) \
                 ON CONFLICT (vehicle_id, location_id, level) DO UPDATE SET \
                    duration = EXCLUDED.duration, avg_deci_temp = EXCLUDED.avg_deci_temp, \
                    energy_used = EXCLUDED.energy_used, energy_added = EXCLUDED.energy_added",
            )
            .bind(point.vehicle_id)
            .bind(point.location_id)
            .bind(point.level)
            .bind(point.duration)
            .bind(point.avg_deci_temp)
            .bind(point.energy_used)
            .bind(point.energy_added)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn get_charge_curve(
        &self,
        vehicle_id: Uuid,
        location_id: Uuid,
    ) -> StoreResult<Vec<CurvePoint>> {
        with_retry("get_charge_curve", || async {
            let rows = sqlx::query(
                "SELECT vehicle_id, location_id, level, duration, avg_deci_temp, \
                    energy_used, energy_added \
                 FROM charge_curve WHERE vehicle_id = $1 AND location_id = $2 \
                 ORDER BY level",
            )
            .bind(vehicle_id)
            .bind(location_id)
            .fetch_all(&self.pool)
            .await?;
            rows.iter()
                .map(|row| curve_point_from_row(row).map_err(StoreError::from))
                .collect()
        })
        .await
    }

    async fn max_curve_level(
        &self,
        vehicle_id: Uuid,
        location_id: Uuid,
    ) -> StoreResult<Option<i16>> {
        with_retry("max_curve_level", || async {
            let level = sqlx::query_scalar::<_, Option<i16>>(
                "SELECT MAX(level) FROM charge_curve \
                 WHERE vehicle_id = $1 AND location_id = $2",
            )
            .bind(vehicle_id)
            .bind(location_id)
            .fetch_one(&self.pool)
            .await?;
            Ok(level)
        })
        .await
    }

    async fn median_curve_duration(
        &self,
        vehicle_id: Uuid,
        location_id: Uuid,
    ) -> StoreResult<Option<i32>> {
        with_retry("median_curve_duration", || async {
            let median = sqlx::query_scalar::<_, Option<f64>>(
                "SELECT PERCENTILE_CONT(0.5) WITHIN GROUP (ORDER BY duration) \
                 FROM charge_curve WHERE vehicle_id = $1 AND location_id = $2",
            )
            .bind(vehicle_id)
            .bind(location_id)
            .fetch_one(&self.pool)
            .await?;
            Ok(median.map(|m| m.round() as i32))
        })
        .await
    }

    async fn upsert_event_map(&self, entry: &EventMapEntry) -> StoreResult<()> {
        with_retry("upsert_event_map", || async {
            sqlx::query(
                "INSERT INTO event_map (vehicle_id, hour, minimum_level, maximum_level, \
                    driven_seconds, driven_meters, charged_seconds, charge_energy) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
                 ON CONFLICT (vehicle_id, hour) DO UPDATE SET \
                    minimum_level = LEAST(event_map.minimum_level, EXCLUDED.minimum_level), \
                    maximum_level = GREATEST(event_map.maximum_level, \
                        EXCLUDED.maximum_level), \
                    driven_seconds = event_map.driven_seconds + EXCLUDED.driven_seconds, \
                    driven_meters = event_map.driven_meters + EXCLUDED.driven_meters, \
                    charged_seconds = event_map.charged_seconds + EXCLUDED.charged_seconds, \
                    charge_energy = event_map.charge_energy + EXCLUDED.charge_energy",
            )
            .bind(entry.vehicle_id)
            .bind(entry.hour)
            .bind(entry.minimum_level)
            .bind(entry.maximum_level)
            .bind(entry.driven_seconds)
            .bind(entry.driven_meters)
            .bind(entry.charged_seconds)
            .bind(entry.charge_energy)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn newest_stats(
        &self,
        vehicle_id: Uuid,
        location_id: Uuid,
    ) -> StoreResult<Option<CurrentStats>> {
        with_retry("newest_stats", || async {
            let row = sqlx::query(
                "SELECT DISTINCT ON (vehicle_id, location_id) \
                    stats_id, vehicle_id, location_id, price_list_ts, level_charge_time, \
                    weekly_avg7_price, weekly_avg21_price, threshold \
                 FROM current_stats \
                 WHERE vehicle_id = $1 AND location_id = $2 \
                 ORDER BY vehicle_id, location_id, price_list_ts DESC",
            )
            .bind(vehicle_id)
            .bind(location_id)
            .fetch_optional(&self.pool)
            .await?;
            row.map(|row| stats_from_row(&row))
                .transpose()
                .map_err(StoreError::from)
        })
        .await
    }

    async fn put_stats(&self, stats: &CurrentStats) -> StoreResult<()> {
        with_retry("put_stats", || async {
            sqlx::query(
                "INSERT INTO current_stats (stats_id, vehicle_id, location_id, \
                    price_list_ts, level_charge_time, weekly_avg7_price, \
                    weekly_avg21_price, threshold) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
                 ON CONFLICT (stats_id) DO UPDATE SET \
                    price_list_ts = EXCLUDED.price_list_ts, \
                    level_charge_time = EXCLUDED.level_charge_time, \
                    weekly_avg7_price = EXCLUDED.weekly_avg7_price, \
                    weekly_avg21_price = EXCLUDED.weekly_avg21_price, \
                    threshold = EXCLUDED.threshold",
            )
            .bind(stats.stats_id)
            .bind(stats.vehicle_id)
            .bind(stats.location_id)
            .bind(stats.price_list_ts)
            .bind(stats.level_charge_time)
            .bind(stats.weekly_avg7_price)
            .bind(stats.weekly_avg21_price)
            .bind(stats.threshold)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn routine_prediction(
        &self,
        vehicle_id: Uuid,
        location_id: Uuid,
        now: DateTime<Utc>,
        tz: &str,
    ) -> StoreResult<RoutinePrediction> {
        with_retry("routine_prediction", || async {
            // Consumption between plug-ins is the level drop from one
            // connection's end to the next connection's start, over the
            // vehicle's full sequence; only rows ending at this location on
            // a similar weekday feed the percentile.
            let row = sqlx::query(
                "WITH seq AS ( \
                    SELECT location_id, end_ts, \
                        end_level - LEAD(start_level) OVER (ORDER BY start_ts) AS used \
                    FROM connected \
                    WHERE vehicle_id = $1 AND connected = false \
                      AND start_ts >= $3::timestamptz - interval '42 days' \
                 ) \
                 SELECT \
                    (SELECT AVG(used)::float8 FROM seq \
                        WHERE used IS NOT NULL AND location_id = $2 \
                          AND end_ts > $3::timestamptz - interval '7 days') AS recent_used, \
                    (SELECT PERCENTILE_CONT(0.6) WITHIN GROUP (ORDER BY used) FROM seq \
                        WHERE used IS NOT NULL AND location_id = $2 \
                          AND EXTRACT(ISODOW FROM end_ts AT TIME ZONE $4) = \
                              EXTRACT(ISODOW FROM $3::timestamptz AT TIME ZONE $4)) \
                        AS historic_used, \
                    (SELECT ((($3::timestamptz AT TIME ZONE $4)::date + tod) \
                            AT TIME ZONE $4) \
                        FROM (SELECT PERCENTILE_DISC(0.2) WITHIN GROUP \
                                (ORDER BY (end_ts AT TIME ZONE $4)::time) AS tod \
                              FROM connected \
                              WHERE vehicle_id = $1 AND location_id = $2 \
                                AND connected = false \
                                AND start_ts >= $3::timestamptz - interval '42 days' \
                                AND EXTRACT(ISODOW FROM end_ts AT TIME ZONE $4) = \
                                    EXTRACT(ISODOW FROM $3::timestamptz AT TIME ZONE $4) \
                             ) p WHERE p.tod IS NOT NULL) AS before_ts",
            )
            .bind(vehicle_id)
            .bind(location_id)
            .bind(now)
            .bind(tz)
            .fetch_one(&self.pool)
            .await?;

            let recent_used: Option<f64> = row.try_get("recent_used")?;
            let historic_used: Option<f64> = row.try_get("historic_used")?;
            let before: Option<DateTime<Utc>> = row.try_get("before_ts")?;

            let charge_percent = match (recent_used, historic_used) {
                (Some(recent), Some(historic)) => Some(recent.max(historic)),
                (value, None) | (None, value) => value,
            };
            Ok(RoutinePrediction {
                charge_percent,
                before,
            })
        })
        .await
    }
}
