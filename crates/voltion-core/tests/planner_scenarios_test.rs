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

//! End-to-end planner scenarios against the in-memory gateway.

use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use voltion_core::planner::refresh_vehicle_charge_plan;
use voltion_store::{Gateway, MemStore};
use voltion_types::{
    ChargerType, ChargeType, Connection, CurvePoint, GeoPoint, Location, PricePoint,
    ScheduledTrip, Vehicle,
};

const PRICE_CODE: &str = "SE3";

/// Monday 05:00 UTC; the seeded history disconnects Mondays at 07:30.
fn monday_morning() -> DateTime<Utc> {
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

fn vehicle_at(account_id: Uuid, location: Option<Uuid>, level: i16) -> Vehicle {
    Vehicle {
        id: Uuid::new_v4(),
        account_id,
        name: "m3".into(),
        minimum_charge: 50,
        maximum_charge: 90,
        anxiety_level: 0,
        scheduled_trip: None,
        paused_until: None,
        location_id: location,
        lat_micro: Some(59_334_591),
        lon_micro: Some(18_063_240),
        level,
        odometer: 8_000_000,
        outside_deci_temp: 110,
        inside_deci_temp: 200,
        climate_on: false,
        driving: false,
        connected: true,
        charging_to: None,
        estimate: None,
        connected_id: None,
        charge_id: None,
        trip_id: None,
        charge_plan: None,
        smart_status: String::new(),
        status: String::new(),
        updated: monday_morning() - Duration::minutes(5),
        provider_data: serde_json::Value::Null,
    }
}

async fn seed_curve(store: &MemStore, vehicle_id: Uuid, location_id: Uuid, seconds: i32, up_to: i16) {
    for level in 1..=up_to {
        store
            .set_charge_curve(&CurvePoint {
                vehicle_id,
                location_id,
                level,
                duration: seconds,
                avg_deci_temp: 110,
                energy_used: 11_000,
                energy_added: 10_000,
            })
            .await
            .unwrap();
    }
}

async fn seed_flat_prices(
    store: &MemStore,
    from: DateTime<Utc>,
    hours: i64,
    price: i64,
) {
    let points: Vec<PricePoint> = (0..hours)
        .map(|h| PricePoint {
            price_code: PRICE_CODE.into(),
            ts: from + Duration::hours(h),
            price,
        })
        .collect();
    store.update_price_list(PRICE_CODE, &points).await.unwrap();
}

/// Six weeks of Sunday-evening-to-Monday-morning plug-ins at `location`,
/// each ending 07:30 at 80 % with the next one starting at 60 %.
async fn seed_weekly_history(store: &MemStore, vehicle_id: Uuid, location_id: Uuid) {
    let now = monday_morning();
    for week in (1..=6).rev() {
        let end = now - Duration::days(7 * week) + Duration::minutes(150); // Monday 07:30
        let start = end - Duration::minutes(810); // Sunday 18:00
        store
            .put_connection(&Connection {
                connected_id: Uuid::new_v4(),
                vehicle_id,
                location_id,
                charger_type: ChargerType::Ac,
                start_ts: start,
                end_ts: end,
                start_level: 60,
                end_level: 80,
                energy_used: 700_000,
                cost: 500_000,
                saved: 90_000,
                connected: false,
            })
            .await
            .unwrap();
    }
}

fn assert_ordered_non_overlapping(plan: &[voltion_types::ChargePlanSegment]) {
    for pair in plan.windows(2) {
        let stop = pair[0].charge_stop.expect("interior stop must be closed");
        let start = pair[1].charge_start.expect("interior start must be closed");
        assert!(stop <= start, "plan overlaps: {stop} > {start}");
    }
}

#[tokio::test]
async fn cold_start_without_prices_emits_learning_fill() {
    let store = MemStore::new();
    let account = Uuid::new_v4();
    let location = home(account);
    let vehicle = vehicle_at(account, Some(location.id), 50);
    let vehicle_id = vehicle.id;
    store.insert_location(location);
    store.insert_vehicle(vehicle);

    let now = monday_morning();
    refresh_vehicle_charge_plan(&store, vehicle_id, now, chrono_tz::UTC)
        .await
        .unwrap();

    let vehicle = store.get_vehicle(vehicle_id).await.unwrap();
    assert_eq!(
        vehicle.smart_status,
        "Smart charging disabled (still learning)"
    );
    let plan = vehicle.charge_plan.expect("learning fill expected");
    assert_eq!(plan.len(), 1);
    let segment = &plan[0];
    assert_eq!(segment.charge_start, None);
    assert_eq!(segment.level, 90);
    assert_eq!(segment.charge_type, ChargeType::Fill);
    assert_eq!(segment.comment, "learning");
    // 50 -> 90 with the 100 s/% default and the shaved final percent
    let expected_stop = now + Duration::milliseconds((39 * 100 + 75) * 1000);
    assert_eq!(segment.charge_stop, Some(expected_stop));
}

#[tokio::test]
async fn partial_curve_forces_calibration() {
    let store = MemStore::new();
    let account = Uuid::new_v4();
    let location = home(account);
    let location_id = location.id;
    let vehicle = vehicle_at(account, Some(location_id), 80);
    let vehicle_id = vehicle.id;
    store.insert_location(location);
    store.insert_vehicle(vehicle);
    seed_curve(&store, vehicle_id, location_id, 60, 60).await;

    refresh_vehicle_charge_plan(&store, vehicle_id, monday_morning(), chrono_tz::UTC)
        .await
        .unwrap();

    let vehicle = store.get_vehicle(vehicle_id).await.unwrap();
    let plan = vehicle.charge_plan.expect("calibration plan expected");
    assert_eq!(plan.len(), 1);
    assert_eq!(plan[0].charge_start, None);
    assert_eq!(plan[0].charge_stop, None);
    assert_eq!(plan[0].level, 100);
    assert_eq!(plan[0].charge_type, ChargeType::Calibrate);
    assert_eq!(plan[0].comment, "Charge calibration");
    assert_eq!(vehicle.smart_status, "Calibrating charge curve");
}

#[tokio::test]
async fn established_vehicle_gets_low_price_fill() {
    let store = MemStore::new();
    let account = Uuid::new_v4();
    let location = home(account);
    let location_id = location.id;
    let vehicle = vehicle_at(account, Some(location_id), 60);
    let vehicle_id = vehicle.id;
    store.insert_location(location);
    store.insert_vehicle(vehicle);

    let now = monday_morning();
    seed_curve(&store, vehicle_id, location_id, 60, 100).await;
    seed_flat_prices(&store, now - Duration::days(30), 30 * 24 + 6, 50_000).await;
    seed_weekly_history(&store, vehicle_id, location_id).await;

    refresh_vehicle_charge_plan(&store, vehicle_id, now, chrono_tz::UTC)
        .await
        .unwrap();

    let vehicle = store.get_vehicle(vehicle_id).await.unwrap();
    assert_eq!(vehicle.smart_status, "Smart charging enabled");
    let plan = vehicle.charge_plan.expect("plan expected");
    assert_ordered_non_overlapping(&plan);

    // Routine (to 75) and fill (to 90) collapse into one cheap-hour fill.
    assert_eq!(plan.len(), 1);
    let segment = &plan[0];
    assert_eq!(segment.level, 90);
    assert_eq!(segment.charge_type, ChargeType::Fill);
    assert_eq!(
        segment.charge_start,
        Some(Utc.with_ymd_and_hms(2026, 3, 2, 5, 0, 0).unwrap())
    );
    // 60 -> 90 at 60 s/% with the final percent shaved
    let expected_stop = now + Duration::milliseconds((29 * 60 + 45) * 1000);
    assert_eq!(segment.charge_stop, Some(expected_stop));

    // Stats were simulated and persisted for the pair.
    let stats = store
        .newest_stats(vehicle_id, location_id)
        .await
        .unwrap()
        .expect("stats persisted");
    assert_eq!(stats.level_charge_time, Some(60));
    assert_eq!(stats.threshold, 100, "flat prices leave the ratio at 1.0");
}

#[tokio::test]
async fn emergency_segment_leads_when_below_minimum() {
    let store = MemStore::new();
    let account = Uuid::new_v4();
    let location = home(account);
    let location_id = location.id;
    let vehicle = vehicle_at(account, Some(location_id), 20);
    let vehicle_id = vehicle.id;
    store.insert_location(location);
    store.insert_vehicle(vehicle);

    let now = monday_morning();
    seed_curve(&store, vehicle_id, location_id, 60, 100).await;
    seed_flat_prices(&store, now - Duration::days(30), 30 * 24 + 6, 50_000).await;
    seed_weekly_history(&store, vehicle_id, location_id).await;

    refresh_vehicle_charge_plan(&store, vehicle_id, now, chrono_tz::UTC)
        .await
        .unwrap();

    let vehicle = store.get_vehicle(vehicle_id).await.unwrap();
    let plan = vehicle.charge_plan.expect("plan expected");
    assert_ordered_non_overlapping(&plan);

    assert_eq!(plan[0].charge_start, None, "emergency starts immediately");
    assert_eq!(plan[0].charge_type, ChargeType::Minimum);
    assert_eq!(plan[0].comment, "emergency charge");
    assert!(plan.len() >= 2, "smart segments follow the emergency");
    assert!(plan[1..].iter().all(|s| s.charge_type != ChargeType::Minimum));
}

#[tokio::test]
async fn scheduled_trip_adds_immutable_topup() {
    let store = MemStore::new();
    let account = Uuid::new_v4();
    let location = home(account);
    let location_id = location.id;
    let mut vehicle = vehicle_at(account, Some(location_id), 60);
    let vehicle_id = vehicle.id;
    let now = monday_morning();
    let depart = now + Duration::hours(4);
    vehicle.scheduled_trip = Some(ScheduledTrip {
        level: 95,
        time: depart,
    });
    store.insert_location(location);
    store.insert_vehicle(vehicle);

    seed_curve(&store, vehicle_id, location_id, 60, 100).await;
    seed_flat_prices(&store, now - Duration::days(30), 30 * 24 + 6, 50_000).await;
    seed_weekly_history(&store, vehicle_id, location_id).await;

    refresh_vehicle_charge_plan(&store, vehicle_id, now, chrono_tz::UTC)
        .await
        .unwrap();

    let vehicle = store.get_vehicle(vehicle_id).await.unwrap();
    let plan = vehicle.charge_plan.expect("plan expected");
    assert_ordered_non_overlapping(&plan);

    // 90 -> 95 at 60 s/% is 285 s; departure slack is 15 minutes.
    let topup_start = depart - Duration::minutes(15) - Duration::seconds(4 * 60 + 45);
    let topup = plan
        .iter()
        .find(|s| s.comment == "topping up before trip")
        .expect("topup segment expected");
    assert_eq!(topup.charge_start, Some(topup_start));
    assert_eq!(topup.charge_stop, None);
    assert_eq!(topup.level, 95);
    assert_eq!(topup.charge_type, ChargeType::Trip);

    // The preparation charge tops out at the comfort ceiling.
    let prepare = &plan[0];
    assert_eq!(prepare.level, 90);
    assert_eq!(prepare.charge_type, ChargeType::Trip);
}

#[tokio::test]
async fn expired_trip_schedule_is_cleared() {
    let store = MemStore::new();
    let account = Uuid::new_v4();
    let location = home(account);
    let location_id = location.id;
    let mut vehicle = vehicle_at(account, Some(location_id), 60);
    let vehicle_id = vehicle.id;
    let now = monday_morning();
    vehicle.scheduled_trip = Some(ScheduledTrip {
        level: 80,
        time: now - Duration::hours(2),
    });
    store.insert_location(location);
    store.insert_vehicle(vehicle);
    seed_curve(&store, vehicle_id, location_id, 60, 100).await;

    refresh_vehicle_charge_plan(&store, vehicle_id, now, chrono_tz::UTC)
        .await
        .unwrap();

    let vehicle = store.get_vehicle(vehicle_id).await.unwrap();
    assert_eq!(vehicle.scheduled_trip, None);
}

#[tokio::test]
async fn anxiety_is_suppressed_while_learning() {
    // Curve and prices exist but there is no connection history, so the
    // routine prediction is empty: only the learning fill is emitted and
    // the anxiety segment stays out of the plan.
    let store = MemStore::new();
    let account = Uuid::new_v4();
    let location = home(account);
    let location_id = location.id;
    let mut vehicle = vehicle_at(account, Some(location_id), 60);
    vehicle.anxiety_level = 2;
    let vehicle_id = vehicle.id;
    store.insert_location(location);
    store.insert_vehicle(vehicle);

    let now = monday_morning();
    seed_curve(&store, vehicle_id, location_id, 60, 100).await;
    seed_flat_prices(&store, now - Duration::days(30), 30 * 24 + 6, 50_000).await;

    refresh_vehicle_charge_plan(&store, vehicle_id, now, chrono_tz::UTC)
        .await
        .unwrap();

    let vehicle = store.get_vehicle(vehicle_id).await.unwrap();
    assert_eq!(
        vehicle.smart_status,
        "Smart charging disabled (still learning)"
    );
    let plan = vehicle.charge_plan.expect("plan expected");
    assert!(
        plan.iter().all(|s| s.charge_type != ChargeType::Preferred),
        "anxiety must not fire in learning mode"
    );
}

#[tokio::test]
async fn paused_vehicle_gets_no_plan() {
    let store = MemStore::new();
    let account = Uuid::new_v4();
    let location = home(account);
    let location_id = location.id;
    let mut vehicle = vehicle_at(account, Some(location_id), 60);
    let now = monday_morning();
    vehicle.paused_until = Some(now + Duration::days(1));
    let vehicle_id = vehicle.id;
    store.insert_location(location);
    store.insert_vehicle(vehicle);

    refresh_vehicle_charge_plan(&store, vehicle_id, now, chrono_tz::UTC)
        .await
        .unwrap();

    let vehicle = store.get_vehicle(vehicle_id).await.unwrap();
    assert_eq!(vehicle.charge_plan, None);
    assert!(vehicle.smart_status.contains("paused"));
}

#[tokio::test]
async fn off_location_leaves_plan_untouched() {
    let store = MemStore::new();
    let account = Uuid::new_v4();
    let mut vehicle = vehicle_at(account, None, 60);
    let existing = vec![voltion_types::ChargePlanSegment::new(
        None,
        None,
        90,
        ChargeType::Fill,
        "left over",
    )];
    vehicle.charge_plan = Some(existing.clone());
    vehicle.smart_status = "Smart charging enabled".into();
    let vehicle_id = vehicle.id;
    store.insert_vehicle(vehicle);

    refresh_vehicle_charge_plan(&store, vehicle_id, monday_morning(), chrono_tz::UTC)
        .await
        .unwrap();

    let vehicle = store.get_vehicle(vehicle_id).await.unwrap();
    assert_eq!(vehicle.charge_plan, Some(existing));
    assert_eq!(vehicle.smart_status, "");
}
