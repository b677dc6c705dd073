// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! This module defines all configuration structs that map to sections in
//! `ephys_configuration.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Left edge of the default PSTH window (seconds)
pub const DEFAULT_PSTH_XMIN: f64 = -3.0;
/// Right edge of the default PSTH window (seconds)
pub const DEFAULT_PSTH_XMAX: f64 = 3.0;
/// Default PSTH bin width (seconds)
pub const DEFAULT_PSTH_BIN_WIDTH: f64 = 0.04;
/// Significance level for the ipsi/contra t-test
pub const DEFAULT_SELECTIVITY_ALPHA: f64 = 0.05;
/// Unit quality label included in PSTH populations
pub const DEFAULT_UNIT_QUALITY: &str = "good";

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct EphysConfig {
    pub system: SystemConfig,
    pub logging: LoggingConfig,
    pub psth: PsthConfig,
    pub selectivity: SelectivityConfig,
    pub conditions: Vec<TrialConditionConfig>,
    pub groups: Vec<UnitGroupConfig>,
}

/// System-level configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Worker threads for per-unit batches (0 = rayon default)
    pub max_threads: usize,
    pub log_level: String,
    /// Optional JSON snapshot of the trial store
    pub store_path: Option<PathBuf>,
    /// Optional JSON snapshot of derived results
    pub results_path: Option<PathBuf>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            max_threads: 0,
            log_level: "info".to_string(),
            store_path: None,
            results_path: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `text` or `json`
    pub format: String,
    pub log_dir: Option<PathBuf>,
    pub retention_days: u64,
    pub retention_runs: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: "text".to_string(),
            log_dir: None,
            retention_days: 30,
            retention_runs: 10,
        }
    }
}

/// PSTH binning parameters
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PsthConfig {
    pub xmin: f64,
    pub xmax: f64,
    pub bin_width: f64,
}

impl Default for PsthConfig {
    fn default() -> Self {
        Self {
            xmin: DEFAULT_PSTH_XMIN,
            xmax: DEFAULT_PSTH_XMAX,
            bin_width: DEFAULT_PSTH_BIN_WIDTH,
        }
    }
}

/// Selectivity classification parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SelectivityConfig {
    pub alpha: f64,
    /// Quality label a unit must carry to be included in condition PSTHs
    pub unit_quality: String,
    /// Early-lick label of behaviorally valid trials
    pub valid_early_lick: String,
}

impl Default for SelectivityConfig {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_SELECTIVITY_ALPHA,
            unit_quality: DEFAULT_UNIT_QUALITY.to_string(),
            valid_early_lick: "no early".to_string(),
        }
    }
}

/// A curated trial condition
///
/// ```toml
/// [[conditions]]
/// id = 0
/// description = "audio delay contra hit"
///
/// [[conditions.parts]]
/// kind = "TaskProtocol"
/// task = "audio delay"
/// protocol = 1
///
/// [[conditions.parts]]
/// kind = "TrialInstruction"
/// value = "right"
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TrialConditionConfig {
    pub id: u32,
    pub description: String,
    pub parts: Vec<ConditionPartConfig>,
}

/// One predicate slot of a condition, kept loosely typed until the catalog parses it
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ConditionPartConfig {
    pub kind: String,
    pub task: Option<String>,
    pub protocol: Option<u8>,
    pub value: Option<String>,
    pub photostim_device: Option<String>,
    pub brain_location: Option<String>,
}

/// Flag template for unit group membership; absent flags are unconstrained
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CriteriaTemplateConfig {
    pub sample_selectivity: Option<bool>,
    pub delay_selectivity: Option<bool>,
    pub go_selectivity: Option<bool>,
    pub global_selectivity: Option<bool>,
    pub any_selectivity: Option<bool>,
    pub sample_preference: Option<bool>,
    pub delay_preference: Option<bool>,
    pub go_preference: Option<bool>,
    pub global_preference: Option<bool>,
    pub any_preference: Option<bool>,
}

/// A curated unit group condition
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct UnitGroupConfig {
    pub id: u32,
    pub description: String,
    pub brain_area: Option<String>,
    pub criteria: CriteriaTemplateConfig,
    pub conditions: Vec<u32>,
}
