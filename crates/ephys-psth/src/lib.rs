// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Ephys PSTH
//!
//! Trial-condition PSTHs and unit selectivity:
//! - Condition resolution by set algebra over trial ids
//! - Per-unit PSTH construction and caching
//! - Selectivity criteria catalog and Welch-test classification
//! - Unit group population PSTHs
//!
//! Per-unit work runs on the rayon thread pool; outputs are collected into
//! ordered maps so results do not depend on scheduling.

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod condition;
pub mod criteria;
pub mod group;
pub mod psth;
pub mod selectivity;
pub mod service;

pub use condition::{
    resolve_trials, ConditionCatalog, ConditionParts, ExpandedCondition, PartKind, TrialCondition,
    TrialConditionPart,
};
pub use criteria::{
    CriteriaCatalog, CriteriaFlags, SelectivityCriteriaRecord, SelectivityPeriod, CATALOG_ROWS,
    STRICT_ROWS,
};
pub use group::{GroupAggregator, GroupCellView, GroupInputs, GroupView, UnitGroupCondition};
pub use psth::{compute_psth, BinParams, PlotData, PsthBuilder, Raster};
pub use selectivity::{
    welch_t_test, Classification, PeriodStats, SelectivityEngine, SelectivityRecord,
    SelectivitySummary, WelchTest,
};
pub use service::{PipelineSummary, PsthService};
