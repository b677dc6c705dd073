// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Derived results: unit PSTHs, unit selectivity and group PSTH references.

Every write is an overwrite keyed by its natural key, so re-running a
computation replaces the previous result instead of duplicating it.
*/

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::error::EphysResult;
use crate::unit::UnitKey;

pub type ConditionId = u32;
pub type CriteriaId = u32;
pub type GroupId = u32;

/// Trial-averaged firing rate of one unit under one condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitPsth {
    /// Spikes/s per bin
    pub rates: Vec<f64>,
    /// `rates.len() + 1` ascending edges
    pub bin_edges: Vec<f64>,
}

impl UnitPsth {
    pub fn n_bins(&self) -> usize {
        self.rates.len()
    }

    pub fn bin_centers(&self) -> Vec<f64> {
        self.bin_edges
            .windows(2)
            .map(|w| (w[0] + w[1]) / 2.0)
            .collect()
    }
}

/// Reference to a cached [`UnitPsth`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PsthRef {
    pub condition_id: ConditionId,
    pub unit: UnitKey,
}

impl PsthRef {
    pub fn new(condition_id: ConditionId, unit: UnitKey) -> Self {
        Self { condition_id, unit }
    }
}

/// Selectivity classification stored per unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSelectivity {
    pub unit: UnitKey,
    pub criteria_id: CriteriaId,
}

/// Population PSTH membership of a unit group
///
/// Units preferring one side, viewed under trials of either side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupPsth {
    pub group_id: GroupId,
    pub ipsi_pref_ipsi_trials: BTreeSet<PsthRef>,
    pub ipsi_pref_contra_trials: BTreeSet<PsthRef>,
    pub contra_pref_contra_trials: BTreeSet<PsthRef>,
    pub contra_pref_ipsi_trials: BTreeSet<PsthRef>,
}

impl GroupPsth {
    pub fn new(group_id: GroupId) -> Self {
        Self {
            group_id,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ipsi_pref_ipsi_trials.is_empty()
            && self.ipsi_pref_contra_trials.is_empty()
            && self.contra_pref_contra_trials.is_empty()
            && self.contra_pref_ipsi_trials.is_empty()
    }
}

/// Storage of derived results
pub trait ResultStore: Send + Sync {
    fn put_unit_psth(&self, condition_id: ConditionId, unit: UnitKey, psth: UnitPsth) -> EphysResult<()>;

    fn unit_psth(&self, condition_id: ConditionId, unit: &UnitKey) -> EphysResult<Option<UnitPsth>>;

    /// Units with a cached PSTH for the condition, ordered by key
    fn condition_units(&self, condition_id: ConditionId) -> EphysResult<Vec<UnitKey>>;

    /// Remove every cached PSTH of the condition; returns how many were removed
    fn delete_condition_psths(&self, condition_id: ConditionId) -> EphysResult<usize>;

    fn put_selectivity(&self, record: UnitSelectivity) -> EphysResult<()>;

    fn selectivity(&self, unit: &UnitKey) -> EphysResult<Option<UnitSelectivity>>;

    /// All stored classifications, ordered by unit
    fn selectivities(&self) -> EphysResult<Vec<UnitSelectivity>>;

    fn put_group_psth(&self, group: GroupPsth) -> EphysResult<()>;

    fn group_psth(&self, group_id: GroupId) -> EphysResult<Option<GroupPsth>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredUnitPsth {
    condition_id: ConditionId,
    unit: UnitKey,
    psth: UnitPsth,
}

/// Serializable form of an [`InMemoryResultStore`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultStoreSnapshot {
    unit_psths: Vec<StoredUnitPsth>,
    selectivities: Vec<UnitSelectivity>,
    group_psths: Vec<GroupPsth>,
}

#[derive(Debug, Default)]
struct ResultTables {
    unit_psths: BTreeMap<(ConditionId, UnitKey), UnitPsth>,
    selectivities: BTreeMap<UnitKey, UnitSelectivity>,
    group_psths: BTreeMap<GroupId, GroupPsth>,
}

/// Result store held in memory behind a read/write lock
#[derive(Debug, Default)]
pub struct InMemoryResultStore {
    tables: RwLock<ResultTables>,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to_snapshot(&self) -> ResultStoreSnapshot {
        let tables = self.tables.read();
        ResultStoreSnapshot {
            unit_psths: tables
                .unit_psths
                .iter()
                .map(|((condition_id, unit), psth)| StoredUnitPsth {
                    condition_id: *condition_id,
                    unit: *unit,
                    psth: psth.clone(),
                })
                .collect(),
            selectivities: tables.selectivities.values().copied().collect(),
            group_psths: tables.group_psths.values().cloned().collect(),
        }
    }

    pub fn from_snapshot(snapshot: ResultStoreSnapshot) -> Self {
        let tables = ResultTables {
            unit_psths: snapshot
                .unit_psths
                .into_iter()
                .map(|s| ((s.condition_id, s.unit), s.psth))
                .collect(),
            selectivities: snapshot
                .selectivities
                .into_iter()
                .map(|s| (s.unit, s))
                .collect(),
            group_psths: snapshot
                .group_psths
                .into_iter()
                .map(|g| (g.group_id, g))
                .collect(),
        };
        Self {
            tables: RwLock::new(tables),
        }
    }

    pub fn save_json(&self, path: &Path) -> EphysResult<()> {
        let data = serde_json::to_string(&self.to_snapshot())?;
        std::fs::write(path, data)?;
        tracing::debug!(path = %path.display(), "Saved result store snapshot");
        Ok(())
    }

    pub fn load_json(path: &Path) -> EphysResult<Self> {
        let data = std::fs::read_to_string(path)?;
        let snapshot: ResultStoreSnapshot = serde_json::from_str(&data)?;
        Ok(Self::from_snapshot(snapshot))
    }
}

impl ResultStore for InMemoryResultStore {
    fn put_unit_psth(&self, condition_id: ConditionId, unit: UnitKey, psth: UnitPsth) -> EphysResult<()> {
        self.tables.write().unit_psths.insert((condition_id, unit), psth);
        Ok(())
    }

    fn unit_psth(&self, condition_id: ConditionId, unit: &UnitKey) -> EphysResult<Option<UnitPsth>> {
        Ok(self
            .tables
            .read()
            .unit_psths
            .get(&(condition_id, *unit))
            .cloned())
    }

    fn condition_units(&self, condition_id: ConditionId) -> EphysResult<Vec<UnitKey>> {
        Ok(self
            .tables
            .read()
            .unit_psths
            .keys()
            .filter(|(c, _)| *c == condition_id)
            .map(|(_, unit)| *unit)
            .collect())
    }

    fn delete_condition_psths(&self, condition_id: ConditionId) -> EphysResult<usize> {
        let mut tables = self.tables.write();
        let before = tables.unit_psths.len();
        tables.unit_psths.retain(|(c, _), _| *c != condition_id);
        Ok(before - tables.unit_psths.len())
    }

    fn put_selectivity(&self, record: UnitSelectivity) -> EphysResult<()> {
        self.tables.write().selectivities.insert(record.unit, record);
        Ok(())
    }

    fn selectivity(&self, unit: &UnitKey) -> EphysResult<Option<UnitSelectivity>> {
        Ok(self.tables.read().selectivities.get(unit).copied())
    }

    fn selectivities(&self) -> EphysResult<Vec<UnitSelectivity>> {
        Ok(self.tables.read().selectivities.values().copied().collect())
    }

    fn put_group_psth(&self, group: GroupPsth) -> EphysResult<()> {
        self.tables.write().group_psths.insert(group.group_id, group);
        Ok(())
    }

    fn group_psth(&self, group_id: GroupId) -> EphysResult<Option<GroupPsth>> {
        Ok(self.tables.read().group_psths.get(&group_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn psth(value: f64) -> UnitPsth {
        UnitPsth {
            rates: vec![value; 2],
            bin_edges: vec![0.0, 0.5, 1.0],
        }
    }

    #[test]
    fn test_bin_centers() {
        assert_eq!(psth(1.0).bin_centers(), vec![0.25, 0.75]);
        assert_eq!(psth(1.0).n_bins(), 2);
    }

    #[test]
    fn test_put_overwrites() {
        let store = InMemoryResultStore::new();
        let unit = UnitKey::new(1, 1, 1, 1);
        store.put_unit_psth(0, unit, psth(1.0)).unwrap();
        store.put_unit_psth(0, unit, psth(2.0)).unwrap();

        assert_eq!(store.condition_units(0).unwrap(), vec![unit]);
        assert_eq!(store.unit_psth(0, &unit).unwrap().unwrap().rates, vec![2.0, 2.0]);
    }

    #[test]
    fn test_delete_condition_only_touches_that_condition() {
        let store = InMemoryResultStore::new();
        let a = UnitKey::new(1, 1, 1, 1);
        let b = UnitKey::new(1, 1, 1, 2);
        store.put_unit_psth(0, a, psth(1.0)).unwrap();
        store.put_unit_psth(0, b, psth(1.0)).unwrap();
        store.put_unit_psth(1, a, psth(1.0)).unwrap();

        assert_eq!(store.delete_condition_psths(0).unwrap(), 2);
        assert!(store.condition_units(0).unwrap().is_empty());
        assert_eq!(store.condition_units(1).unwrap(), vec![a]);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let store = InMemoryResultStore::new();
        let unit = UnitKey::new(1, 1, 1, 1);
        store.put_unit_psth(3, unit, psth(4.0)).unwrap();
        store
            .put_selectivity(UnitSelectivity {
                unit,
                criteria_id: 17,
            })
            .unwrap();
        let mut group = GroupPsth::new(0);
        group.ipsi_pref_ipsi_trials.insert(PsthRef::new(3, unit));
        store.put_group_psth(group.clone()).unwrap();

        let dir = tempdir().unwrap();
        let path = dir.path().join("results.json");
        store.save_json(&path).unwrap();
        let loaded = InMemoryResultStore::load_json(&path).unwrap();

        assert_eq!(loaded.unit_psth(3, &unit).unwrap(), Some(psth(4.0)));
        assert_eq!(loaded.selectivity(&unit).unwrap().unwrap().criteria_id, 17);
        assert_eq!(loaded.group_psth(0).unwrap(), Some(group));
    }
}
