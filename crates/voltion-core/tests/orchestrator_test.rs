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

//! Orchestrator entry points: ingestion wiring, price fan-out, config.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use voltion_core::{EngineError, Orchestrator};
use voltion_store::{Gateway, MemStore};
use voltion_types::telemetry::GeoDegrees;
use voltion_types::{
    ChargerType, GeoPoint, Location, PriceUpdate, UpdateVehicleDataInput,
    UpdateVehicleInput, Vehicle,
};

const PRICE_CODE: &str = "SE3";

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 5, 0, 0).unwrap()
}

fn home(account_id: Uuid) -> Location {
    Location {
        id: Uuid::new_v4(),
        account_id,
        name: "home".into(),
        geo: GeoPoint {
            lat_micro: 59_334_591,
            lon_micro: 18_063_240,
        },
        geo_fence_radius: 150,
        price_code: PRICE_CODE.into(),
    }
}

fn vehicle(account_id: Uuid, location_id: Uuid) -> Vehicle {
    Vehicle {
        id: Uuid::new_v4(),
        account_id,
        name: "m3".into(),
        minimum_charge: 30,
        maximum_charge: 90,
        anxiety_level: 0,
        scheduled_trip: None,
        paused_until: None,
        location_id: Some(location_id),
        lat_micro: Some(59_334_591),
        lon_micro: Some(18_063_240),
        level: 55,
        odometer: 8_000_000,
        outside_deci_temp: 110,
        inside_deci_temp: 200,
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
        updated: t0(),
        provider_data: serde_json::Value::Null,
    }
}

fn charging_sample(vehicle_id: Uuid, level: i16) -> UpdateVehicleDataInput {
    UpdateVehicleDataInput {
        id: vehicle_id,
        geo: GeoDegrees {
            lat: 59.334591,
            lon: 18.063240,
        },
        battery_level: level,
        odometer: 8_000_000,
        outside_temperature: 11.0,
        inside_temperature: 20.0,
        climate_control: false,
        is_driving: false,
        connected_charger: Some(ChargerType::Ac),
        charging_to: Some(90),
        estimated_time_left: Some(120),
        power_use: Some(11.0),
        energy_added: Some(0.5),
    }
}

fn setup() -> (Arc<MemStore>, Orchestrator<MemStore>, Uuid, Uuid) {
    let store = Arc::new(MemStore::new());
    let account = Uuid::new_v4();
    let location = home(account);
    let location_id = location.id;
    let v = vehicle(account, location_id);
    let vehicle_id = v.id;
    store.insert_location(location);
    store.insert_vehicle(v);
    let orchestrator = Orchestrator::new(Arc::clone(&store), chrono_tz::UTC);
    (store, orchestrator, vehicle_id, location_id)
}

fn flat_prices(from: DateTime<Utc>, hours: i64) -> PriceUpdate {
    serde_json::from_value(serde_json::json!({
        "priceCode": PRICE_CODE,
        "prices": (0..hours)
            .map(|h| serde_json::json!({
                "startAt": from + Duration::hours(h),
                "price": 0.5,
            }))
            .collect::<Vec<_>>(),
    }))
    .unwrap()
}

#[tokio::test]
async fn connecting_publishes_a_plan() {
    let (store, orchestrator, vehicle_id, _) = setup();

    orchestrator
        .update_vehicle_data(&charging_sample(vehicle_id, 55), t0() + Duration::minutes(1))
        .await
        .unwrap();

    let v = store.get_vehicle(vehicle_id).await.unwrap();
    assert!(v.connected_id.is_some());
    // no prices, no curve: the replan lands on the learning fill
    let plan = v.charge_plan.expect("plan published on connect");
    assert_eq!(plan.len(), 1);
    assert_eq!(plan[0].comment, "learning");
    assert_eq!(
        v.smart_status,
        "Smart charging disabled (still learning)"
    );
}

#[tokio::test]
async fn disconnecting_clears_the_plan_and_rebuilds_stats() {
    let (store, orchestrator, vehicle_id, location_id) = setup();
    let now = t0() + Duration::minutes(1);
    orchestrator
        .update_price(&flat_prices(t0() - Duration::days(8), 8 * 24 + 6), now)
        .await
        .unwrap();
    orchestrator
        .update_vehicle_data(&charging_sample(vehicle_id, 55), now)
        .await
        .unwrap();

    let mut unplugged = charging_sample(vehicle_id, 62);
    unplugged.connected_charger = None;
    unplugged.charging_to = None;
    unplugged.power_use = None;
    orchestrator
        .update_vehicle_data(&unplugged, now + Duration::hours(2))
        .await
        .unwrap();

    let v = store.get_vehicle(vehicle_id).await.unwrap();
    assert_eq!(v.connected_id, None);
    assert_eq!(v.charge_plan, None, "plan withdrawn on disconnect");
    let stats = store
        .newest_stats(vehicle_id, location_id)
        .await
        .unwrap();
    assert!(stats.is_some(), "disconnect rebuilds statistics");
}

#[tokio::test]
async fn price_updates_fan_out_to_affected_vehicles() {
    let (store, orchestrator, vehicle_id, _) = setup();

    orchestrator
        .update_price(&flat_prices(t0() - Duration::hours(2), 30), t0())
        .await
        .unwrap();

    let v = store.get_vehicle(vehicle_id).await.unwrap();
    assert!(
        v.charge_plan.is_some(),
        "price refresh replans vehicles on the feed"
    );
}

#[tokio::test]
async fn off_hour_price_points_are_rejected() {
    let (_, orchestrator, _, _) = setup();

    let mut update = flat_prices(t0(), 3);
    update.prices[1].start_at += Duration::minutes(30);
    let err = orchestrator.update_price(&update, t0()).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
}

#[tokio::test]
async fn config_updates_validate_ranges() {
    let (store, orchestrator, vehicle_id, _) = setup();

    let bad = UpdateVehicleInput {
        minimum_level: Some(95),
        ..Default::default()
    };
    let err = orchestrator
        .update_vehicle(vehicle_id, &bad, t0())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));

    let good = UpdateVehicleInput {
        minimum_level: Some(20),
        maximum_level: Some(80),
        anxiety_level: Some(1),
        ..Default::default()
    };
    orchestrator
        .update_vehicle(vehicle_id, &good, t0())
        .await
        .unwrap();
    let v = store.get_vehicle(vehicle_id).await.unwrap();
    assert_eq!(v.minimum_charge, 20);
    assert_eq!(v.maximum_charge, 80);
    assert_eq!(v.anxiety_level, 1);
}

#[tokio::test]
async fn replans_emit_an_action_for_adapters() {
    let (_, orchestrator, vehicle_id, _) = setup();
    let mut actions = orchestrator.subscribe_actions();

    orchestrator.refresh(vehicle_id, t0()).await.unwrap();

    let action = actions.try_recv().expect("action emitted on replan");
    assert_eq!(action.target_id, vehicle_id);
    assert_eq!(action.action, "charge_plan_updated");
}
