// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! PSTH Service - orchestrates condition PSTHs, selectivity and unit groups
//!
//! - Read-only access to the trial store
//! - All derived results go through the result store as idempotent overwrites

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::info;

use ephys_config::{validate_config, EphysConfig};
use ephys_structures::{
    ConditionId, EphysError, EphysResult, GroupId, GroupPsth, PhotostimFilter, PhotostimSite, ResultStore,
    TrialStore, UnitFilter, UnitKey,
};

use crate::condition::ConditionCatalog;
use crate::group::{GroupAggregator, GroupInputs, GroupView};
use crate::psth::{BinParams, PlotData, PsthBuilder};
use crate::selectivity::{SelectivityEngine, SelectivitySummary};

/// Outcome of a full pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineSummary {
    pub conditions_populated: usize,
    pub unit_psths: usize,
    pub selectivity: SelectivitySummary,
    pub groups_built: usize,
}

/// Entry point tying the catalogs to a trial store and a result store
pub struct PsthService {
    store: Arc<dyn TrialStore>,
    results: Arc<dyn ResultStore>,
    conditions: ConditionCatalog,
    groups: GroupAggregator,
    psth: PsthBuilder,
    selectivity: SelectivityEngine,
    unit_quality: String,
    /// Dedicated pool when `system.max_threads` is set
    pool: Option<rayon::ThreadPool>,
}

impl PsthService {
    /// Build from configuration
    ///
    /// Without configured conditions the four audio delay defaults are used,
    /// excluding every photostimulation site present in the store. Without
    /// configured groups the default ALM group is used.
    pub fn from_config(
        config: &EphysConfig,
        store: Arc<dyn TrialStore>,
        results: Arc<dyn ResultStore>,
    ) -> EphysResult<Self> {
        validate_config(config)?;

        let conditions = if config.conditions.is_empty() {
            let sites: BTreeSet<PhotostimSite> = store
                .photostim_events(&PhotostimFilter::default())?
                .into_iter()
                .map(|e| e.site)
                .collect();
            let sites: Vec<PhotostimSite> = sites.into_iter().collect();
            info!(sites = sites.len(), "Using default trial conditions");
            ConditionCatalog::default_conditions(&sites)
        } else {
            ConditionCatalog::from_config(&config.conditions)?
        };

        let groups = if config.groups.is_empty() {
            GroupAggregator::default_groups()
        } else {
            GroupAggregator::from_config(&config.groups)?
        };

        let pool = match config.system.max_threads {
            0 => None,
            threads => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|e| EphysError::Configuration(format!("Failed to build thread pool: {}", e)))?,
            ),
        };

        Ok(Self {
            store,
            results,
            conditions,
            groups,
            psth: PsthBuilder::new(BinParams::from(&config.psth))?,
            selectivity: SelectivityEngine::new(&config.selectivity)?,
            unit_quality: config.selectivity.unit_quality.clone(),
            pool,
        })
    }

    pub fn conditions(&self) -> &ConditionCatalog {
        &self.conditions
    }

    pub fn groups(&self) -> &GroupAggregator {
        &self.groups
    }

    pub fn results(&self) -> &Arc<dyn ResultStore> {
        &self.results
    }

    fn group_inputs(&self) -> GroupInputs<'_> {
        GroupInputs {
            conditions: &self.conditions,
            criteria: self.selectivity.catalog(),
            psth: &self.psth,
            store: self.store.as_ref(),
            results: self.results.as_ref(),
            unit_quality: &self.unit_quality,
        }
    }

    pub fn populate_condition(&self, condition_id: ConditionId) -> EphysResult<usize> {
        self.psth.populate_condition(
            &self.conditions,
            self.store.as_ref(),
            self.results.as_ref(),
            condition_id,
            &self.unit_quality,
        )
    }

    pub fn get_for_plotting(&self, unit: &UnitKey, condition_id: ConditionId) -> EphysResult<PlotData> {
        self.psth.get_for_plotting(
            &self.conditions,
            self.store.as_ref(),
            self.results.as_ref(),
            unit,
            condition_id,
        )
    }

    /// Classify every unit in the store
    pub fn classify_units(&self) -> EphysResult<SelectivitySummary> {
        let units: Vec<UnitKey> = self
            .store
            .units(&UnitFilter::default())?
            .into_iter()
            .map(|u| u.key)
            .collect();
        Ok(self
            .selectivity
            .classify_all(self.store.as_ref(), self.results.as_ref(), &units))
    }

    pub fn build_group(&self, group_id: GroupId) -> EphysResult<GroupPsth> {
        self.groups.build_group(group_id, self.group_inputs())
    }

    pub fn group_view(&self, group_id: GroupId) -> EphysResult<GroupView> {
        self.groups.group_view(group_id, self.results.as_ref())
    }

    /// Populate every condition, classify every unit, then build every group
    pub fn run(&self) -> EphysResult<PipelineSummary> {
        match &self.pool {
            Some(pool) => pool.install(|| self.run_batches()),
            None => self.run_batches(),
        }
    }

    fn run_batches(&self) -> EphysResult<PipelineSummary> {
        let mut summary = PipelineSummary::default();
        for condition_id in self.conditions.ids() {
            summary.unit_psths += self.populate_condition(condition_id)?;
            summary.conditions_populated += 1;
        }
        summary.selectivity = self.classify_units()?;
        for group_id in self.groups.ids() {
            self.build_group(group_id)?;
            summary.groups_built += 1;
        }
        info!(
            conditions = summary.conditions_populated,
            unit_psths = summary.unit_psths,
            classified = summary.selectivity.computed,
            groups = summary.groups_built,
            "Pipeline run complete"
        );
        Ok(summary)
    }
}
