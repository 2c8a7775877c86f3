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

//! Ingress routes.
//!
//! The GraphQL façade, auth layer and UI live elsewhere; this surface is
//! the narrow ingress the engine exposes to providers and the price
//! loader: telemetry samples, price feed updates and vehicle
//! configuration.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use voltion_core::{EngineError, Orchestrator};
use voltion_store::{PgStore, StoreError};
use voltion_types::{PriceUpdate, UpdateVehicleDataInput, UpdateVehicleInput};

use crate::config::ServiceConfig;

pub struct AppState {
    pub orchestrator: Orchestrator<PgStore>,
    pub config: ServiceConfig,
}

struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
            EngineError::Store(StoreError::Conflict(_)) => StatusCode::CONFLICT,
            EngineError::Store(StoreError::InvalidInput(_))
            | EngineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            EngineError::Store(StoreError::AuthDenied(_)) => StatusCode::UNAUTHORIZED,
            EngineError::Store(StoreError::Transient(_))
            | EngineError::Store(StoreError::Internal(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            warn!(error = %self.0, "request failed");
        }
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

/// Price mutations require the internal service identity.
fn require_internal(config: &ServiceConfig, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(password) = &config.single_user_password else {
        // No identity configured: only loopback deployments do this, and
        // they gate access at the network layer.
        return Ok(());
    };
    let presented = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if presented == Some(password.as_str()) {
        Ok(())
    } else {
        Err(ApiError(EngineError::Store(StoreError::AuthDenied(
            "price mutations require the service identity",
        ))))
    }
}

async fn update_vehicle_data(
    State(state): State<Arc<AppState>>,
    Json(input): Json<UpdateVehicleDataInput>,
) -> Result<StatusCode, ApiError> {
    state
        .orchestrator
        .update_vehicle_data(&input, Utc::now())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_price(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(update): Json<PriceUpdate>,
) -> Result<StatusCode, ApiError> {
    require_internal(&state.config, &headers)?;
    state.orchestrator.update_price(&update, Utc::now()).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_vehicle(
    State(state): State<Arc<AppState>>,
    Path(vehicle_id): Path<Uuid>,
    Json(input): Json<UpdateVehicleInput>,
) -> Result<StatusCode, ApiError> {
    state
        .orchestrator
        .update_vehicle(vehicle_id, &input, Utc::now())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/vehicle_data", post(update_vehicle_data))
        .route("/api/price", post(update_price))
        .route("/api/vehicle/{id}", post(update_vehicle))
        .with_state(state)
}
