// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Population PSTHs of unit groups.
//!
//! A group selects units by a criteria template (and optionally a brain
//! area), splits them by preferred side and pairs each side with the ipsi
//! and contra trial conditions attached to the group.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{info, warn};

use ephys_config::UnitGroupConfig;
use ephys_structures::{
    ConditionId, CriteriaId, EphysError, EphysResult, GroupId, GroupPsth, PsthRef, ResultStore,
    TrialStore, UnitFilter, UnitKey,
};

use crate::condition::ConditionCatalog;
use crate::criteria::{CriteriaCatalog, CriteriaFlags};
use crate::psth::PsthBuilder;

/// A curated unit group
#[derive(Debug, Clone, PartialEq)]
pub struct UnitGroupCondition {
    pub group_id: GroupId,
    pub description: String,
    pub brain_area: Option<String>,
    /// Template; unset flags are unconstrained
    pub criteria: CriteriaFlags,
    pub condition_ids: Vec<ConditionId>,
}

impl From<&UnitGroupConfig> for UnitGroupCondition {
    fn from(config: &UnitGroupConfig) -> Self {
        Self {
            group_id: config.id,
            description: config.description.clone(),
            brain_area: config.brain_area.clone(),
            criteria: CriteriaFlags::from(&config.criteria),
            condition_ids: config.conditions.clone(),
        }
    }
}

/// Collaborators needed to build a group
#[derive(Clone, Copy)]
pub struct GroupInputs<'a> {
    pub conditions: &'a ConditionCatalog,
    pub criteria: &'a CriteriaCatalog,
    pub psth: &'a PsthBuilder,
    pub store: &'a dyn TrialStore,
    pub results: &'a dyn ResultStore,
    pub unit_quality: &'a str,
}

/// Mean population rate of one group cell
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupCellView {
    pub n_psths: usize,
    pub mean_rates: Vec<f64>,
    pub bin_edges: Vec<f64>,
}

/// Resolved rate curves of a stored group PSTH
#[derive(Debug, Clone, PartialEq)]
pub struct GroupView {
    pub group_id: GroupId,
    pub ipsi_pref_ipsi_trials: GroupCellView,
    pub ipsi_pref_contra_trials: GroupCellView,
    pub contra_pref_contra_trials: GroupCellView,
    pub contra_pref_ipsi_trials: GroupCellView,
}

fn cell_refs(
    units: &BTreeSet<UnitKey>,
    conditions: &[ConditionId],
    cached: &BTreeMap<ConditionId, BTreeSet<UnitKey>>,
) -> BTreeSet<PsthRef> {
    let mut refs = BTreeSet::new();
    for condition_id in conditions {
        if let Some(cached_units) = cached.get(condition_id) {
            refs.extend(
                cached_units
                    .intersection(units)
                    .map(|unit| PsthRef::new(*condition_id, *unit)),
            );
        }
    }
    refs
}

fn cell_view(results: &dyn ResultStore, refs: &BTreeSet<PsthRef>) -> EphysResult<GroupCellView> {
    let mut view = GroupCellView::default();
    for psth_ref in refs {
        let psth = results
            .unit_psth(psth_ref.condition_id, &psth_ref.unit)?
            .ok_or_else(|| {
                EphysError::not_found("UnitPsth", format!("{}:{}", psth_ref.condition_id, psth_ref.unit))
            })?;
        if view.n_psths == 0 {
            view.mean_rates = vec![0.0; psth.n_bins()];
            view.bin_edges = psth.bin_edges.clone();
        } else if psth.n_bins() != view.mean_rates.len() {
            return Err(EphysError::Configuration(format!(
                "Group mixes PSTHs of {} and {} bins",
                view.mean_rates.len(),
                psth.n_bins()
            )));
        }
        for (acc, rate) in view.mean_rates.iter_mut().zip(&psth.rates) {
            *acc += rate;
        }
        view.n_psths += 1;
    }
    if view.n_psths > 0 {
        let n = view.n_psths as f64;
        view.mean_rates.iter_mut().for_each(|r| *r /= n);
    }
    Ok(view)
}

/// Registry of unit groups
#[derive(Debug, Clone, Default)]
pub struct GroupAggregator {
    groups: BTreeMap<GroupId, UnitGroupCondition>,
}

impl GroupAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, group: UnitGroupCondition) -> EphysResult<()> {
        if self.groups.contains_key(&group.group_id) {
            return Err(EphysError::Configuration(format!(
                "Duplicate unit group id {}",
                group.group_id
            )));
        }
        self.groups.insert(group.group_id, group);
        Ok(())
    }

    pub fn from_config(groups: &[UnitGroupConfig]) -> EphysResult<Self> {
        let mut aggregator = Self::new();
        for config in groups {
            aggregator.insert(UnitGroupCondition::from(config))?;
        }
        Ok(aggregator)
    }

    /// ALM units with any selectivity under the audio delay hit conditions
    pub fn default_groups() -> Self {
        let group = UnitGroupCondition {
            group_id: 0,
            description: "audio delay hit, any selectivity; ALM".to_string(),
            brain_area: Some("ALM".to_string()),
            criteria: CriteriaFlags {
                any_selectivity: Some(true),
                ..Default::default()
            },
            condition_ids: vec![0, 1],
        };
        let mut aggregator = Self::new();
        aggregator.groups.insert(group.group_id, group);
        aggregator
    }

    pub fn get(&self, group_id: GroupId) -> EphysResult<&UnitGroupCondition> {
        self.groups
            .get(&group_id)
            .ok_or_else(|| EphysError::not_found("UnitGroupCondition", group_id))
    }

    pub fn ids(&self) -> impl Iterator<Item = GroupId> + '_ {
        self.groups.keys().copied()
    }

    /// Criteria ids of the template split into (ipsi-preferring, contra-preferring)
    pub fn preference_split(
        criteria: &CriteriaCatalog,
        template: &CriteriaFlags,
    ) -> EphysResult<(BTreeSet<CriteriaId>, BTreeSet<CriteriaId>)> {
        let rows = criteria.matching(template);
        if rows.is_empty() {
            return Err(EphysError::Configuration(format!(
                "Criteria template matches no catalog row: {:?}",
                template
            )));
        }
        let ipsi = rows
            .iter()
            .filter(|r| r.flags.any_preference == Some(true))
            .map(|r| r.criteria_id)
            .collect();
        let contra = rows
            .iter()
            .filter(|r| r.flags.any_preference == Some(false))
            .map(|r| r.criteria_id)
            .collect();
        Ok((ipsi, contra))
    }

    /// Compute and store the group's four PSTH reference cells
    pub fn build_group(&self, group_id: GroupId, inputs: GroupInputs<'_>) -> EphysResult<GroupPsth> {
        let group = self.get(group_id)?;
        info!(group_id, description = %group.description, "Building unit group PSTH");

        let (ipsi_ids, contra_ids) = Self::preference_split(inputs.criteria, &group.criteria)?;

        let area_units: Option<BTreeSet<UnitKey>> = match &group.brain_area {
            Some(area) => Some(
                inputs
                    .store
                    .units(&UnitFilter {
                        brain_area: Some(area.clone()),
                        ..Default::default()
                    })?
                    .into_iter()
                    .map(|u| u.key)
                    .collect(),
            ),
            None => None,
        };
        let in_area = |unit: &UnitKey| area_units.as_ref().map_or(true, |units| units.contains(unit));

        let mut ipsi_units = BTreeSet::new();
        let mut contra_units = BTreeSet::new();
        for record in inputs.results.selectivities()? {
            if !in_area(&record.unit) {
                continue;
            }
            if ipsi_ids.contains(&record.criteria_id) {
                ipsi_units.insert(record.unit);
            } else if contra_ids.contains(&record.criteria_id) {
                contra_units.insert(record.unit);
            }
        }

        let mut ipsi_conditions = Vec::new();
        let mut contra_conditions = Vec::new();
        for condition_id in &group.condition_ids {
            let condition = inputs.conditions.get(*condition_id)?;
            let is_contra = condition.description.contains("contra");
            let is_ipsi = condition.description.contains("ipsi");
            if is_contra {
                contra_conditions.push(*condition_id);
            }
            if is_ipsi {
                ipsi_conditions.push(*condition_id);
            }
            if !is_contra && !is_ipsi {
                warn!(
                    group_id,
                    condition_id,
                    description = %condition.description,
                    "Condition is neither ipsi nor contra, ignoring"
                );
            }
        }

        let mut cached: BTreeMap<ConditionId, BTreeSet<UnitKey>> = BTreeMap::new();
        for condition_id in ipsi_conditions.iter().chain(contra_conditions.iter()) {
            if cached.contains_key(condition_id) {
                continue;
            }
            let mut units = inputs.results.condition_units(*condition_id)?;
            if units.is_empty() {
                inputs.psth.populate_condition(
                    inputs.conditions,
                    inputs.store,
                    inputs.results,
                    *condition_id,
                    inputs.unit_quality,
                )?;
                units = inputs.results.condition_units(*condition_id)?;
            }
            cached.insert(*condition_id, units.into_iter().collect());
        }

        let group_psth = GroupPsth {
            group_id,
            ipsi_pref_ipsi_trials: cell_refs(&ipsi_units, &ipsi_conditions, &cached),
            ipsi_pref_contra_trials: cell_refs(&ipsi_units, &contra_conditions, &cached),
            contra_pref_contra_trials: cell_refs(&contra_units, &contra_conditions, &cached),
            contra_pref_ipsi_trials: cell_refs(&contra_units, &ipsi_conditions, &cached),
        };
        inputs.results.put_group_psth(group_psth.clone())?;

        info!(
            group_id,
            ipsi_units = ipsi_units.len(),
            contra_units = contra_units.len(),
            "Unit group PSTH stored"
        );
        Ok(group_psth)
    }

    /// Mean rate curves of a stored group
    pub fn group_view(&self, group_id: GroupId, results: &dyn ResultStore) -> EphysResult<GroupView> {
        let group = results
            .group_psth(group_id)?
            .ok_or_else(|| EphysError::not_found("GroupPsth", group_id))?;
        Ok(GroupView {
            group_id,
            ipsi_pref_ipsi_trials: cell_view(results, &group.ipsi_pref_ipsi_trials)?,
            ipsi_pref_contra_trials: cell_view(results, &group.ipsi_pref_contra_trials)?,
            contra_pref_contra_trials: cell_view(results, &group.contra_pref_contra_trials)?,
            contra_pref_ipsi_trials: cell_view(results, &group.contra_pref_ipsi_trials)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ephys_structures::{InMemoryResultStore, UnitPsth};

    #[test]
    fn test_default_group() {
        let groups = GroupAggregator::default_groups();
        let group = groups.get(0).unwrap();
        assert_eq!(group.brain_area.as_deref(), Some("ALM"));
        assert_eq!(group.condition_ids, vec![0, 1]);
        assert_eq!(group.criteria.any_selectivity, Some(true));
        assert!(groups.get(1).is_err());
    }

    #[test]
    fn test_preference_split_is_disjoint_and_covers_template() {
        let criteria = CriteriaCatalog::new();
        let template = CriteriaFlags {
            any_selectivity: Some(true),
            ..Default::default()
        };
        let (ipsi, contra) = GroupAggregator::preference_split(&criteria, &template).unwrap();
        assert!(ipsi.is_disjoint(&contra));
        assert_eq!(ipsi.len() + contra.len(), criteria.matching(&template).len());
    }

    #[test]
    fn test_unsatisfiable_template_is_configuration_error() {
        let criteria = CriteriaCatalog::new();
        let template = CriteriaFlags {
            sample_selectivity: Some(true),
            any_selectivity: Some(false),
            ..Default::default()
        };
        assert!(matches!(
            GroupAggregator::preference_split(&criteria, &template),
            Err(EphysError::Configuration(_))
        ));
    }

    #[test]
    fn test_cell_view_means() {
        let results = InMemoryResultStore::new();
        let a = UnitKey::new(1, 1, 1, 1);
        let b = UnitKey::new(1, 1, 1, 2);
        let edges = vec![0.0, 1.0, 2.0];
        results
            .put_unit_psth(0, a, UnitPsth { rates: vec![2.0, 4.0], bin_edges: edges.clone() })
            .unwrap();
        results
            .put_unit_psth(0, b, UnitPsth { rates: vec![4.0, 0.0], bin_edges: edges.clone() })
            .unwrap();
        let refs: BTreeSet<PsthRef> = [PsthRef::new(0, a), PsthRef::new(0, b)].into_iter().collect();

        let view = cell_view(&results, &refs).unwrap();
        assert_eq!(view.n_psths, 2);
        assert_eq!(view.mean_rates, vec![3.0, 2.0]);
        assert_eq!(view.bin_edges, edges);

        let empty = cell_view(&results, &BTreeSet::new()).unwrap();
        assert_eq!(empty, GroupCellView::default());
    }

    #[test]
    fn test_duplicate_group_rejected() {
        let config = UnitGroupConfig {
            id: 3,
            description: "g".into(),
            ..Default::default()
        };
        assert!(GroupAggregator::from_config(&[config.clone(), config]).is_err());
    }
}
