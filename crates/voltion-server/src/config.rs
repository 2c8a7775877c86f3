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

//! Service configuration from environment variables.

use std::str::FromStr;

use anyhow::{Context, Result};
use chrono_tz::Tz;

/// Everything the service shell needs at startup. Only `DATABASE_URL` and
/// `DATABASE_SSL` reach the engine; the rest shapes the HTTP surface.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub database_url: String,
    pub database_ssl: bool,
    pub public_url: Option<String>,
    pub server_ip: String,
    pub server_port: u16,
    /// Single-user deployments authenticate the internal identity with a
    /// shared password.
    pub single_user: bool,
    pub single_user_password: Option<String>,
    /// Zone the planner's weekday arithmetic runs in.
    pub timezone: Tz,
}

fn env_optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_flag(key: &str) -> bool {
    env_optional(key)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

impl ServiceConfig {
    /// Load from the process environment, reading a `.env` file first if
    /// one exists.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let database_url =
            std::env::var("DATABASE_URL").context("DATABASE_URL is required")?;

        let server_port = env_optional("SERVER_PORT")
            .map(|v| v.parse::<u16>())
            .transpose()
            .context("SERVER_PORT must be a port number")?
            .unwrap_or(3030);

        let timezone = env_optional("PLANNER_TIMEZONE")
            .map(|v| Tz::from_str(&v))
            .transpose()
            .map_err(|e| anyhow::anyhow!("PLANNER_TIMEZONE: {e}"))?
            .unwrap_or(chrono_tz::UTC);

        Ok(Self {
            database_url,
            database_ssl: env_flag("DATABASE_SSL"),
            public_url: env_optional("PUBLIC_URL"),
            server_ip: env_optional("SERVER_IP").unwrap_or_else(|| "0.0.0.0".to_owned()),
            server_port,
            single_user: env_flag("SINGLE_USER"),
            single_user_password: env_optional("SINGLE_USER_PASSWORD"),
            timezone,
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server_ip, self.server_port)
    }
}
