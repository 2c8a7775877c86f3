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

//! Persistence error taxonomy and the transient-retry policy.

use std::future::Future;
use std::time::Duration;

use tracing::warn;
use uuid::Uuid;

/// Typed failure of a gateway operation.
///
/// The engine never swallows these; the caller decides. `Transient` is
/// retried inside the gateway before it ever reaches a caller.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Lookup miss on an operation that requires the row. Fatal to the
    /// operation.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    /// Unique-key collision. Callers may retry once at their discretion.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Range or shape error in caller-supplied data.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Deadlock, dropped connection, pool timeout. Retried with backoff
    /// inside the gateway.
    #[error("transient database error: {0}")]
    Transient(String),

    /// Mutation requires the internal service identity.
    #[error("denied: {0}")]
    AuthDenied(&'static str),

    /// Anything else the database reports; not retried.
    #[error("database error: {0}")]
    Internal(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        StoreError::NotFound { entity, id }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) => {
                let code = db.code().map(|c| c.to_string()).unwrap_or_default();
                match code.as_str() {
                    // unique_violation
                    "23505" => StoreError::Conflict(db.to_string()),
                    // deadlock_detected, serialization_failure
                    "40P01" | "40001" => StoreError::Transient(db.to_string()),
                    _ => StoreError::Internal(db.to_string()),
                }
            }
            sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Transient(err.to_string()),
            _ => StoreError::Internal(err.to_string()),
        }
    }
}

/// Maximum attempts for a transient failure (first try included).
const MAX_ATTEMPTS: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_millis(100);

/// Run `op`, retrying transient failures with exponential backoff.
///
/// Only [`StoreError::Transient`] is retried; every other error kind is the
/// caller's to handle.
pub(crate) async fn with_retry<T, F, Fut>(op_name: &str, mut op: F) -> StoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(StoreError::Transient(reason)) if attempt < MAX_ATTEMPTS => {
                let delay = BASE_BACKOFF * 2u32.pow(attempt - 1);
                warn!(
                    op = op_name,
                    attempt,
                    ?delay,
                    %reason,
                    "transient store error, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn transient_errors_are_retried_three_times() {
        let calls = AtomicU32::new(0);
        let result: StoreResult<()> = with_retry("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(StoreError::Transient("deadlock".into())) }
        })
        .await;
        assert!(matches!(result, Err(StoreError::Transient(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_transient_errors_fail_fast() {
        let calls = AtomicU32::new(0);
        let result: StoreResult<()> = with_retry("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(StoreError::Conflict("dup".into())) }
        })
        .await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recovery_mid_retry_succeeds() {
        let calls = AtomicU32::new(0);
        let result = with_retry("test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(StoreError::Transient("blip".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
