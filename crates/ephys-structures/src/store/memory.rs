// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! In-memory [`TrialStore`] with JSON snapshot loading.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use super::{BehaviorFilter, PhotostimFilter, TrialStore, UnitFilter};
use crate::error::EphysResult;
use crate::trial::{BehaviorTrial, PhotostimEvent, TrialId};
use crate::unit::{Unit, UnitKey};

/// Spike train of one unit in one trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialSpikes {
    pub unit: UnitKey,
    pub trial: TrialId,
    pub spike_times: Vec<f64>,
}

/// Serializable form of a trial store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrialStoreSnapshot {
    pub behavior_trials: Vec<BehaviorTrial>,
    pub photostim_events: Vec<PhotostimEvent>,
    pub units: Vec<Unit>,
    pub trial_spikes: Vec<TrialSpikes>,
}

/// Trial store held entirely in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryTrialStore {
    behavior_trials: BTreeMap<TrialId, BehaviorTrial>,
    photostim_events: Vec<PhotostimEvent>,
    units: BTreeMap<UnitKey, Unit>,
    spikes: AHashMap<(UnitKey, TrialId), Vec<f64>>,
}

impl InMemoryTrialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the behavior labels of a trial
    pub fn insert_behavior_trial(&mut self, trial: BehaviorTrial) {
        self.behavior_trials.insert(trial.trial_id, trial);
    }

    pub fn insert_photostim_event(&mut self, event: PhotostimEvent) {
        self.photostim_events.push(event);
    }

    pub fn insert_unit(&mut self, unit: Unit) {
        self.units.insert(unit.key, unit);
    }

    /// Insert or replace a spike train; timestamps are stored in ascending order
    pub fn insert_spikes(&mut self, unit: UnitKey, trial: TrialId, mut spike_times: Vec<f64>) {
        spike_times.sort_by(f64::total_cmp);
        self.spikes.insert((unit, trial), spike_times);
    }

    pub fn trial_count(&self) -> usize {
        self.behavior_trials.len()
    }

    pub fn from_snapshot(snapshot: TrialStoreSnapshot) -> Self {
        let mut store = Self::new();
        for trial in snapshot.behavior_trials {
            store.insert_behavior_trial(trial);
        }
        for event in snapshot.photostim_events {
            store.insert_photostim_event(event);
        }
        for unit in snapshot.units {
            store.insert_unit(unit);
        }
        for spikes in snapshot.trial_spikes {
            store.insert_spikes(spikes.unit, spikes.trial, spikes.spike_times);
        }
        store
    }

    /// Snapshot with deterministic ordering of every table
    pub fn to_snapshot(&self) -> TrialStoreSnapshot {
        let mut trial_spikes: Vec<TrialSpikes> = self
            .spikes
            .iter()
            .map(|((unit, trial), times)| TrialSpikes {
                unit: *unit,
                trial: *trial,
                spike_times: times.clone(),
            })
            .collect();
        trial_spikes.sort_by(|a, b| (a.unit, a.trial).cmp(&(b.unit, b.trial)));

        TrialStoreSnapshot {
            behavior_trials: self.behavior_trials.values().cloned().collect(),
            photostim_events: self.photostim_events.clone(),
            units: self.units.values().cloned().collect(),
            trial_spikes,
        }
    }

    pub fn load_json(path: &Path) -> EphysResult<Self> {
        let data = std::fs::read_to_string(path)?;
        let snapshot: TrialStoreSnapshot = serde_json::from_str(&data)?;
        tracing::info!(
            path = %path.display(),
            trials = snapshot.behavior_trials.len(),
            units = snapshot.units.len(),
            "Loaded trial store snapshot"
        );
        Ok(Self::from_snapshot(snapshot))
    }

    pub fn save_json(&self, path: &Path) -> EphysResult<()> {
        let data = serde_json::to_string(&self.to_snapshot())?;
        std::fs::write(path, data)?;
        Ok(())
    }
}

impl TrialStore for InMemoryTrialStore {
    fn behavior_trials(&self, filter: &BehaviorFilter) -> EphysResult<Vec<BehaviorTrial>> {
        Ok(self
            .behavior_trials
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect())
    }

    fn photostim_events(&self, filter: &PhotostimFilter) -> EphysResult<Vec<PhotostimEvent>> {
        Ok(self
            .photostim_events
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect())
    }

    fn spike_times(&self, unit: &UnitKey, trial: &TrialId) -> EphysResult<Vec<f64>> {
        Ok(self
            .spikes
            .get(&(*unit, *trial))
            .cloned()
            .unwrap_or_default())
    }

    fn units(&self, filter: &UnitFilter) -> EphysResult<Vec<Unit>> {
        Ok(self
            .units
            .values()
            .filter(|u| filter.matches(u))
            .cloned()
            .collect())
    }
}
