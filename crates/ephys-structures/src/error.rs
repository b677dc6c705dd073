// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Error types shared by every ephys crate.

`MissingMetadata` and `InsufficientData` are recovered per unit by batch
operations; every other variant is surfaced to the caller.
*/

use std::fmt::Display;
use thiserror::Error;

/// Pipeline errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EphysError {
    /// Unknown part name, malformed criteria template, invalid bin parameters
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Condition, group, criteria row or cached result does not exist
    #[error("Not found: {resource} with id '{id}'")]
    NotFound { resource: String, id: String },

    /// A criteria lookup matched more than one catalog row
    #[error("Ambiguous match: {matches} criteria rows match {flags}")]
    AmbiguousMatch { flags: String, matches: usize },

    /// Unit lacks hemisphere or brain-area information
    #[error("Missing metadata for unit {unit}: {field}")]
    MissingMetadata { unit: String, field: String },

    /// Not enough trials or spikes for a statistical test
    #[error("Insufficient data for unit {unit}: {reason}")]
    InsufficientData { unit: String, reason: String },

    /// Trial store / result store backend failure
    #[error("Store error: {0}")]
    Store(String),
}

impl EphysError {
    pub fn not_found(resource: &str, id: impl Display) -> Self {
        EphysError::NotFound {
            resource: resource.to_string(),
            id: id.to_string(),
        }
    }

    /// True for per-unit failures that batch runs skip over
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EphysError::MissingMetadata { .. } | EphysError::InsufficientData { .. }
        )
    }
}

/// Result type for pipeline operations
pub type EphysResult<T> = Result<T, EphysError>;

impl From<ephys_config::ConfigError> for EphysError {
    fn from(err: ephys_config::ConfigError) -> Self {
        EphysError::Configuration(err.to_string())
    }
}

impl From<serde_json::Error> for EphysError {
    fn from(err: serde_json::Error) -> Self {
        EphysError::Store(format!("Snapshot (de)serialization failed: {}", err))
    }
}

impl From<std::io::Error> for EphysError {
    fn from(err: std::io::Error) -> Self {
        EphysError::Store(format!("Snapshot I/O failed: {}", err))
    }
}
