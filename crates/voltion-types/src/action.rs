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

//! Provider action messages.
//!
//! The core only emits these; provider adapters consume and execute them
//! (wake the car, start or stop a charge). Payloads are opaque to the core.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub action_id: Uuid,
    /// Vehicle or location the action targets.
    pub target_id: Uuid,
    pub provider_name: String,
    pub action: String,
    pub data: serde_json::Value,
}

impl Action {
    pub fn new(
        target_id: Uuid,
        provider_name: impl Into<String>,
        action: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            action_id: Uuid::new_v4(),
            target_id,
            provider_name: provider_name.into(),
            action: action.into(),
            data,
        }
    }
}
