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

mod config;
mod routes;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use voltion_core::Orchestrator;
use voltion_store::PgStore;

use crate::config::ServiceConfig;
use crate::routes::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("voltion=info,voltion_server=info")),
        )
        .init();

    let config = ServiceConfig::from_env()?;
    info!(timezone = %config.timezone, "configuration loaded");

    let pool = voltion_store::connect(&config.database_url, config.database_ssl).await?;
    let store = Arc::new(PgStore::new(pool));
    let orchestrator = Orchestrator::new(store, config.timezone);

    // Keep a subscription alive so early actions are not dropped before
    // the first adapter attaches.
    let mut actions = orchestrator.subscribe_actions();
    tokio::spawn(async move {
        while let Ok(action) = actions.recv().await {
            tracing::debug!(
                target_id = %action.target_id,
                action = %action.action,
                "action emitted"
            );
        }
    });

    let addr = config.listen_addr();
    let state = Arc::new(AppState {
        orchestrator,
        config,
    });

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "VoltION server listening");
    axum::serve(listener, routes::router(state)).await?;
    Ok(())
}
