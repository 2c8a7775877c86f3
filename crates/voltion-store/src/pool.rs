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

//! Connection-pool construction.

use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::PgPool;
use tracing::info;

use crate::error::{StoreError, StoreResult};

/// Build the shared pool from a `DATABASE_URL` connection string.
///
/// `ssl` maps to `PgSslMode::Require`; otherwise the server's preference
/// wins. Pool sizing is deliberately modest: every engine operation is a
/// short single-row transaction.
pub async fn connect(database_url: &str, ssl: bool) -> StoreResult<PgPool> {
    let mut options: PgConnectOptions = database_url
        .parse()
        .map_err(|e| StoreError::InvalidInput(format!("DATABASE_URL: {e}")))?;
    if ssl {
        options = options.ssl_mode(PgSslMode::Require);
    }

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await
        .map_err(StoreError::from)?;

    info!(ssl, "database pool ready");
    Ok(pool)
}
