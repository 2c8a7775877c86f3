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

//! Entry points and per-vehicle serialization.
//!
//! The engine is single-writer-per-vehicle: every ingestion or replan for
//! a vehicle runs under that vehicle's async mutex, so `load -> compute ->
//! write` sections never interleave for one vehicle while different
//! vehicles proceed in parallel. A replan triggered by a sample runs
//! inside the same critical section, before the next sample for that
//! vehicle can enter.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

use voltion_store::Gateway;
use voltion_types::{
    Action, PricePoint, PriceUpdate, UpdateVehicleDataInput, UpdateVehicleInput,
};

use crate::error::{EngineError, EngineResult};
use crate::ingest;
use crate::planner;
use crate::stats;

const ACTION_CAPACITY: usize = 64;

/// The service façade over the planning engine.
pub struct Orchestrator<G> {
    gateway: Arc<G>,
    timezone: Tz,
    locks: StdMutex<HashMap<Uuid, Arc<Mutex<()>>>>,
    actions: broadcast::Sender<Action>,
}

impl<G: Gateway> Orchestrator<G> {
    pub fn new(gateway: Arc<G>, timezone: Tz) -> Self {
        let (actions, _) = broadcast::channel(ACTION_CAPACITY);
        Self {
            gateway,
            timezone,
            locks: StdMutex::new(HashMap::new()),
            actions,
        }
    }

    /// Subscribe to the action feed provider adapters consume. The core
    /// only emits; it never executes charging actions itself.
    pub fn subscribe_actions(&self) -> broadcast::Receiver<Action> {
        self.actions.subscribe()
    }

    fn vehicle_lock(&self, vehicle_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks
            .entry(vehicle_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Ingest one telemetry sample, replanning inside the same critical
    /// section when the sample crossed a significant boundary.
    pub async fn update_vehicle_data(
        &self,
        input: &UpdateVehicleDataInput,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        let lock = self.vehicle_lock(input.id);
        let _guard = lock.lock().await;

        let outcome = ingest::apply_sample(self.gateway.as_ref(), input, now).await?;

        if let Some(location_id) = outcome.closed_connection_location {
            let vehicle = self.gateway.get_vehicle(input.id).await?;
            let location = self.gateway.get_location(location_id).await?;
            stats::create_new_stats(self.gateway.as_ref(), &vehicle, &location, now)
                .await?;
        }

        if outcome.replan {
            self.replan_locked(input.id, now).await?;
        }
        Ok(())
    }

    /// Replan one vehicle.
    pub async fn refresh(&self, vehicle_id: Uuid, now: DateTime<Utc>) -> EngineResult<()> {
        let lock = self.vehicle_lock(vehicle_id);
        let _guard = lock.lock().await;
        self.replan_locked(vehicle_id, now).await
    }

    /// Replan every vehicle of an account. Per-vehicle failures are logged
    /// and skipped so one vehicle cannot starve the rest.
    pub async fn refresh_account(
        &self,
        account_id: Uuid,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        let vehicles = self.gateway.vehicles_for_account(account_id).await?;
        for vehicle in vehicles {
            if let Err(err) = self.refresh(vehicle.id, now).await {
                warn!(vehicle = %vehicle.id, %err, "account replan skipped a vehicle");
            }
        }
        Ok(())
    }

    /// Load a price feed update, then replan every vehicle buying on it.
    ///
    /// Requires the internal service identity; callers gate this.
    pub async fn update_price(
        &self,
        update: &PriceUpdate,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        for point in &update.prices {
            if !point.is_hour_aligned() {
                return Err(EngineError::InvalidInput(format!(
                    "price point {} is not hour-aligned",
                    point.start_at
                )));
            }
        }
        let points: Vec<PricePoint> = update
            .prices
            .iter()
            .map(|p| PricePoint {
                price_code: update.price_code.clone(),
                ts: p.start_at,
                price: p.scaled_price(),
            })
            .collect();
        self.gateway
            .update_price_list(&update.price_code, &points)
            .await?;
        info!(
            price_code = %update.price_code,
            points = points.len(),
            "price list updated"
        );
        self.price_list_refreshed(&update.price_code, now).await
    }

    /// Fan a price-feed refresh out to every affected vehicle, each under
    /// its own lock.
    pub async fn price_list_refreshed(
        &self,
        price_code: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        let vehicle_ids = self.gateway.vehicle_ids_for_price_code(price_code).await?;
        info!(
            price_code,
            vehicles = vehicle_ids.len(),
            "price feed refreshed, replanning"
        );
        for vehicle_id in vehicle_ids {
            if let Err(err) = self.refresh(vehicle_id, now).await {
                warn!(vehicle = %vehicle_id, %err, "price-triggered replan failed");
            }
        }
        Ok(())
    }

    /// Apply a configuration update, then replan.
    pub async fn update_vehicle(
        &self,
        vehicle_id: Uuid,
        input: &UpdateVehicleInput,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        let lock = self.vehicle_lock(vehicle_id);
        let _guard = lock.lock().await;

        let mut vehicle = self.gateway.get_vehicle(vehicle_id).await?;
        input.validate(&vehicle)?;

        if let Some(name) = &input.name {
            vehicle.name = name.clone();
        }
        if let Some(minimum) = input.minimum_level {
            vehicle.minimum_charge = minimum;
        }
        if let Some(maximum) = input.maximum_level {
            vehicle.maximum_charge = maximum;
        }
        if let Some(anxiety) = input.anxiety_level {
            vehicle.anxiety_level = anxiety;
        }
        if let Some(trip) = &input.trip_schedule {
            vehicle.scheduled_trip = *trip;
        }
        if let Some(paused) = &input.paused_until {
            vehicle.paused_until = *paused;
        }
        if let Some(status) = &input.status {
            vehicle.status = status.clone();
        }
        if let Some(provider_data) = &input.provider_data {
            vehicle.provider_data = provider_data.clone();
        }
        vehicle.updated = now;
        self.gateway.put_vehicle(&vehicle).await?;

        self.replan_locked(vehicle_id, now).await
    }

    /// Replan while already holding the vehicle's lock, then notify
    /// adapters.
    async fn replan_locked(&self, vehicle_id: Uuid, now: DateTime<Utc>) -> EngineResult<()> {
        planner::refresh_vehicle_charge_plan(
            self.gateway.as_ref(),
            vehicle_id,
            now,
            self.timezone,
        )
        .await?;

        let vehicle = self.gateway.get_vehicle(vehicle_id).await?;
        let payload = serde_json::json!({
            "chargePlan": vehicle.charge_plan,
            "smartStatus": vehicle.smart_status,
        });
        // Nobody listening is fine; adapters come and go.
        let _ = self.actions.send(Action::new(
            vehicle_id,
            "",
            "charge_plan_updated",
            payload,
        ));
        Ok(())
    }
}
