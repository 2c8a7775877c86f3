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

use voltion_store::StoreError;
use voltion_types::vehicle::VehicleConfigError;

/// Engine-level failure: either the store said no, or the caller did
/// something out of range.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl From<VehicleConfigError> for EngineError {
    fn from(err: VehicleConfigError) -> Self {
        EngineError::InvalidInput(err.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
