// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # ephys - trial-condition PSTHs and unit selectivity
//!
//! Resolves curated behavioral trial conditions into trial sets, builds
//! peri-stimulus time histograms per recording unit, classifies units by
//! firing-rate selectivity across task periods and aggregates selective
//! units into population PSTHs.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ephys::prelude::*;
//!
//! let config = ephys::config::load_config(None, None)?;
//! let _logging = ephys::init_logging_from_config(&config)?;
//!
//! let store = ephys::open_trial_store(&config)?;
//! let results = Arc::new(ephys::open_result_store(&config)?);
//! let service = PsthService::from_config(&config, Arc::new(store), results.clone())?;
//! let summary = service.run()?;
//! ephys::save_result_store(&config, &results)?;
//! println!("{} unit PSTHs", summary.unit_psths);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ephys-config         TOML + env/CLI overrides, validation
//! ephys-observability  tracing subscriber, per-crate debug flags
//! ephys-structures     trials, units, TrialStore, ResultStore, errors
//! ephys-psth           conditions, PSTHs, criteria, selectivity, groups
//! ```
//!
//! ## License
//!
//! Apache-2.0

pub use ephys_config as config;
pub use ephys_observability as observability;
pub use ephys_psth as psth;
pub use ephys_structures as structures;

use ephys_config::EphysConfig;
use ephys_observability::{init_logging, parse_debug_flags, LogFormat, LoggingConfig, LoggingGuard};
use ephys_structures::{EphysError, EphysResult, InMemoryResultStore, InMemoryTrialStore};

/// Observability settings derived from the workspace configuration
pub fn logging_config(config: &EphysConfig) -> anyhow::Result<LoggingConfig> {
    Ok(LoggingConfig {
        level: config.system.log_level.clone(),
        format: config.logging.format.parse::<LogFormat>()?,
        log_dir: config.logging.log_dir.clone(),
        retention_days: config.logging.retention_days,
        retention_runs: config.logging.retention_runs,
    })
}

/// Install the global subscriber using `config` and process debug flags
///
/// Keep the returned guard alive for the life of the process.
pub fn init_logging_from_config(config: &EphysConfig) -> anyhow::Result<LoggingGuard> {
    let logging = logging_config(config)?;
    init_logging(&parse_debug_flags(), &logging)
}

/// Load the trial store snapshot named by `system.store_path`
pub fn open_trial_store(config: &EphysConfig) -> EphysResult<InMemoryTrialStore> {
    let path = config.system.store_path.as_deref().ok_or_else(|| {
        EphysError::Configuration("system.store_path is not set".to_string())
    })?;
    InMemoryTrialStore::load_json(path)
}

/// Load previous results from `system.results_path`, or start empty
pub fn open_result_store(config: &EphysConfig) -> EphysResult<InMemoryResultStore> {
    match config.system.results_path.as_deref() {
        Some(path) if path.exists() => InMemoryResultStore::load_json(path),
        _ => Ok(InMemoryResultStore::new()),
    }
}

/// Persist results to `system.results_path`; no-op when unset
pub fn save_result_store(config: &EphysConfig, results: &InMemoryResultStore) -> EphysResult<()> {
    match config.system.results_path.as_deref() {
        Some(path) => results.save_json(path),
        None => Ok(()),
    }
}

/// Prelude - commonly used types and traits
pub mod prelude {
    pub use crate::config::{EphysConfig, PsthConfig, SelectivityConfig};
    pub use crate::psth::{
        BinParams, ConditionCatalog, CriteriaCatalog, CriteriaFlags, GroupAggregator, PsthBuilder,
        PsthService, SelectivityEngine, SelectivityPeriod, TrialCondition, TrialConditionPart,
    };
    pub use crate::structures::{
        BehaviorFilter, BehaviorTrial, EphysError, EphysResult, GroupPsth, Hemisphere,
        InMemoryResultStore, InMemoryTrialStore, PhotostimEvent, PhotostimSite, PsthRef,
        ResultStore, TaskProtocol, TrialId, TrialStore, Unit, UnitKey, UnitPsth,
    };
}
