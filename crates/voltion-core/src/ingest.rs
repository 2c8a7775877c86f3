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

//! Telemetry ingestion.
//!
//! Each sample drives three nested state machines: the Connection (plugged
//! in at a known location), the Charge inside it (actively drawing), and
//! the Trip outside it (moving, or off every known location). Energy and
//! cost deltas accumulate on the open connection; the charge-curve learner
//! rides along on active charges. The sample commits through a single
//! vehicle-plus-children transaction; a bad sample is dropped whole.

use chrono::{DateTime, Duration, DurationRound, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use voltion_store::Gateway;
use voltion_types::units::{
    celsius_to_deci, degrees_to_micro, kilowatt_hours_to_watt_minutes, kilowatts_to_watts,
    watt_seconds_to_watt_minutes,
};
use voltion_types::{Charge, Connection, EventMapEntry, Trip, UpdateVehicleDataInput};

use crate::curve;
use crate::error::{EngineError, EngineResult};

/// Trips shorter than this are noise and are discarded on arrival.
const MIN_TRIP_DISTANCE_M: i64 = 1000;

/// Sample gaps beyond this are not credited to any hour bucket.
const EVENT_MAP_MAX_GAP_S: i64 = 3 * 3600;

/// What a processed sample asks of the orchestrator.
#[derive(Debug, Default)]
pub struct IngestOutcome {
    /// A significant boundary was crossed; replan the vehicle.
    pub replan: bool,
    /// A connection just closed at this location; its statistics are due a
    /// rebuild.
    pub closed_connection_location: Option<Uuid>,
}

fn validate(input: &UpdateVehicleDataInput) -> EngineResult<()> {
    if !(0..=100).contains(&input.battery_level) {
        return Err(EngineError::InvalidInput(format!(
            "battery level {} out of range",
            input.battery_level
        )));
    }
    if let Some(charging_to) = input.charging_to {
        if !(0..=100).contains(&charging_to) {
            return Err(EngineError::InvalidInput(format!(
                "charging_to {charging_to} out of range"
            )));
        }
    }
    Ok(())
}

/// Cost of `wm` Watt-minutes at a scaled per-kWh price, in scaled units.
fn scaled_cost(wm: i64, price: i64) -> i64 {
    (wm as f64 * price as f64 / 60_000.0).round() as i64
}

/// Apply one telemetry sample. Deterministic and idempotent per
/// `(vehicle, now)`.
pub async fn apply_sample<G: Gateway>(
    gateway: &G,
    input: &UpdateVehicleDataInput,
    now: DateTime<Utc>,
) -> EngineResult<IngestOutcome> {
    validate(input)?;

    let mut vehicle = gateway.get_vehicle(input.id).await?;
    let prev_updated = vehicle.updated;
    let prev_level = vehicle.level;
    let prev_location = vehicle.location_id;
    let prev_odometer = vehicle.odometer;
    let prev_outside_deci = vehicle.outside_deci_temp;

    let lat_micro = degrees_to_micro(input.geo.lat);
    let lon_micro = degrees_to_micro(input.geo.lon);
    let current_location = gateway
        .lookup_known_location(vehicle.account_id, lat_micro, lon_micro)
        .await?;
    let current_location_id = current_location.as_ref().map(|l| l.id);

    vehicle.lat_micro = Some(lat_micro);
    vehicle.lon_micro = Some(lon_micro);
    vehicle.level = input.battery_level;
    vehicle.odometer = input.odometer;
    vehicle.outside_deci_temp = celsius_to_deci(input.outside_temperature);
    vehicle.inside_deci_temp = celsius_to_deci(input.inside_temperature);
    vehicle.climate_on = input.climate_control;
    vehicle.driving = input.is_driving;
    vehicle.connected = input.connected_charger.is_some();
    vehicle.charging_to = input.charging_to;
    vehicle.estimate = input.estimated_time_left;
    vehicle.location_id = current_location_id;
    vehicle.updated = now;

    let added_wm = input
        .energy_added
        .map(kilowatt_hours_to_watt_minutes)
        .unwrap_or(0);
    let power_w = input.power_use.map(kilowatts_to_watts);

    let mut outcome = IngestOutcome::default();
    let mut connection_row: Option<Connection> = None;
    let mut charge_row: Option<Charge> = None;
    let mut trip_row: Option<Trip> = None;
    let mut charged_seconds: i32 = 0;
    let mut charge_energy: i64 = 0;

    // ---- Connection state machine ----
    if input.connected_charger.is_some() || vehicle.connected_id.is_some() {
        let mut connection = match vehicle.connected_id {
            Some(id) => Some(gateway.get_connection(id).await?),
            None => match (&current_location, input.connected_charger) {
                (Some(location), Some(charger_type)) => {
                    let connection = Connection {
                        connected_id: Uuid::new_v4(),
                        vehicle_id: vehicle.id,
                        location_id: location.id,
                        charger_type,
                        start_ts: now,
                        end_ts: now,
                        start_level: input.battery_level,
                        end_level: input.battery_level,
                        energy_used: 0,
                        cost: 0,
                        saved: 0,
                        connected: true,
                    };
                    vehicle.connected_id = Some(connection.connected_id);
                    outcome.replan = true;
                    info!(
                        vehicle = %vehicle.id,
                        location = %location.name,
                        "charger connected"
                    );
                    Some(connection)
                }
                // A charger at an unknown location is not tracked.
                _ => None,
            },
        };

        if let Some(connection) = connection.as_mut() {
            if input.charging_to.is_some() || vehicle.charge_id.is_some() {
                let mut charge_is_new = false;
                let mut charge = match vehicle.charge_id {
                    Some(id) => gateway.get_charge(id).await?,
                    None => {
                        charge_is_new = true;
                        let charge = Charge {
                            charge_id: Uuid::new_v4(),
                            connected_id: connection.connected_id,
                            vehicle_id: vehicle.id,
                            location_id: connection.location_id,
                            charger_type: connection.charger_type,
                            start_ts: now,
                            end_ts: now,
                            start_level: input.battery_level,
                            end_level: input.battery_level,
                            start_added: added_wm,
                            end_added: added_wm,
                            target_level: input
                                .charging_to
                                .unwrap_or(vehicle.maximum_charge),
                            estimate: input.estimated_time_left,
                            energy_used: 0,
                        };
                        vehicle.charge_id = Some(charge.charge_id);
                        info!(vehicle = %vehicle.id, "charge started");
                        charge
                    }
                };

                if input.charging_to.is_none() {
                    // The car stopped drawing: finalize the charge as of
                    // its last active sample.
                    gateway.delete_charge_current(charge.charge_id).await?;
                    vehicle.charge_id = None;
                    info!(
                        vehicle = %vehicle.id,
                        energy_used = charge.energy_used,
                        "charge finished"
                    );
                } else {
                    let delta_seconds = (now - charge.end_ts).num_seconds().max(0);
                    let delta_used = power_w
                        .map(|w| {
                            watt_seconds_to_watt_minutes(
                                f64::from(w),
                                delta_seconds as f64,
                            )
                        })
                        .unwrap_or(0.0)
                        .max(0.0)
                        .round() as i64;
                    connection.energy_used += delta_used;
                    charge.energy_used += delta_used;

                    if delta_used > 0 {
                        let location = gateway.get_location(connection.location_id).await?;
                        let prices = gateway
                            .price_now_then(
                                &location.price_code,
                                connection.connected_id,
                                connection.start_ts,
                                now,
                            )
                            .await?;
                        if let Some(price_now) = prices.price_now {
                            let delta_cost = scaled_cost(delta_used, price_now);
                            connection.cost += delta_cost;
                            if let Some(price_then) = prices.price_then {
                                connection.saved +=
                                    scaled_cost(delta_used, price_then) - delta_cost;
                            }
                        }
                    }

                    // Learner state only moves when time has moved.
                    if delta_seconds > 0 || charge_is_new {
                        let current =
                            gateway.get_charge_current(charge.charge_id).await?;
                        let observation = curve::observe_sample(
                            current,
                            &charge,
                            input.battery_level,
                            added_wm,
                            power_w,
                            vehicle.outside_deci_temp,
                            now,
                        );
                        if let Some(point) = &observation.learned {
                            gateway.set_charge_curve(point).await?;
                        }
                        gateway.put_charge_current(&observation.current).await?;
                        outcome.replan |= observation.level_crossed;
                    }

                    charge.end_ts = now;
                    charge.end_level = input.battery_level;
                    charge.end_added = added_wm;
                    charge.target_level = input.charging_to.unwrap_or(charge.target_level);
                    charge.estimate = input.estimated_time_left;
                    charged_seconds = delta_seconds as i32;
                    charge_energy = delta_used;
                }
                charge_row = Some(charge);
            }

            connection.end_ts = now;
            connection.end_level = input.battery_level;
            connection.connected = input.connected_charger.is_some();

            if input.connected_charger.is_none() {
                // A charge may not outlive its connection.
                if let Some(charge_id) = vehicle.charge_id.take() {
                    gateway.delete_charge_current(charge_id).await?;
                }
                vehicle.connected_id = None;
                vehicle.charge_plan = None;
                outcome.closed_connection_location = Some(connection.location_id);
                info!(
                    vehicle = %vehicle.id,
                    energy_used = connection.energy_used,
                    saved = connection.saved,
                    "charger disconnected"
                );
            }
            connection_row = Some(connection.clone());
        }
    }

    // ---- Trip state machine ----
    if prev_location != current_location_id
        || input.is_driving
        || vehicle.trip_id.is_some()
    {
        let mut trip = match vehicle.trip_id {
            Some(id) => gateway.get_trip(id).await?,
            None => {
                let trip = Trip {
                    trip_id: Uuid::new_v4(),
                    vehicle_id: vehicle.id,
                    start_ts: now,
                    end_ts: now,
                    start_level: prev_level,
                    end_level: input.battery_level,
                    start_location_id: prev_location,
                    end_location_id: current_location_id,
                    start_odometer: prev_odometer,
                    start_outside_deci_temp: prev_outside_deci,
                    distance: 0,
                };
                vehicle.trip_id = Some(trip.trip_id);
                debug!(vehicle = %vehicle.id, "trip opened");
                trip
            }
        };
        trip.end_ts = now;
        trip.end_level = input.battery_level;
        trip.end_location_id = current_location_id;
        trip.distance = (vehicle.odometer - trip.start_odometer).max(0);

        let arrived = current_location_id.is_some() || input.connected_charger.is_some();
        if !input.is_driving && arrived {
            vehicle.trip_id = None;
            outcome.replan = true;
            if trip.distance < MIN_TRIP_DISTANCE_M {
                gateway.delete_trip(trip.trip_id).await?;
                debug!(
                    vehicle = %vehicle.id,
                    distance = trip.distance,
                    "short trip discarded"
                );
            } else {
                info!(
                    vehicle = %vehicle.id,
                    distance = trip.distance,
                    "trip closed"
                );
                trip_row = Some(trip);
            }
        } else {
            trip_row = Some(trip);
        }
    }

    // ---- Hourly event map ----
    let sample_gap = (now - prev_updated).num_seconds();
    if sample_gap > 0 && sample_gap < EVENT_MAP_MAX_GAP_S {
        let entry = EventMapEntry {
            vehicle_id: vehicle.id,
            hour: now.duration_trunc(Duration::hours(1)).unwrap_or(now),
            minimum_level: input.battery_level.min(prev_level),
            maximum_level: input.battery_level.max(prev_level),
            driven_seconds: if input.is_driving { sample_gap as i32 } else { 0 },
            driven_meters: if input.is_driving {
                (vehicle.odometer - prev_odometer).max(0)
            } else {
                0
            },
            charged_seconds,
            charge_energy,
        };
        gateway.upsert_event_map(&entry).await?;
    }

    gateway
        .update_vehicle_data(
            &vehicle,
            connection_row.as_ref(),
            charge_row.as_ref(),
            trip_row.as_ref(),
        )
        .await?;

    Ok(outcome)
}
