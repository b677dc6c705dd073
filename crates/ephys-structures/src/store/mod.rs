// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Read-only access to recorded sessions.

The pipeline never owns raw data: trials, photostimulation events, spike
trains and unit metadata are fetched through [`TrialStore`]. Derived results
go through [`crate::results::ResultStore`].
*/

pub mod memory;

use std::collections::BTreeSet;

use crate::error::{EphysError, EphysResult};
use crate::trial::{BehaviorTrial, PhotostimEvent, PhotostimSite, SessionKey, TaskProtocol, TrialId};
use crate::unit::{Unit, UnitKey};

pub use memory::{InMemoryTrialStore, TrialSpikes, TrialStoreSnapshot};

/// Restriction by subject and/or session; empty matches everything
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionFilter {
    pub subject_id: Option<u32>,
    pub session: Option<u32>,
}

impl SessionFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn session(key: SessionKey) -> Self {
        Self {
            subject_id: Some(key.subject_id),
            session: Some(key.session),
        }
    }

    pub fn matches(&self, trial: &TrialId) -> bool {
        self.subject_id.map_or(true, |s| s == trial.subject_id)
            && self.session.map_or(true, |s| s == trial.session)
    }
}

/// Behavior trial query; every set field must match
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BehaviorFilter {
    pub session: SessionFilter,
    pub task_protocol: Option<TaskProtocol>,
    pub trial_instruction: Option<String>,
    pub early_lick: Option<String>,
    pub outcome: Option<String>,
}

impl BehaviorFilter {
    pub fn in_session(session: SessionFilter) -> Self {
        Self {
            session,
            ..Default::default()
        }
    }

    pub fn matches(&self, trial: &BehaviorTrial) -> bool {
        self.session.matches(&trial.trial_id)
            && self
                .task_protocol
                .as_ref()
                .map_or(true, |tp| *tp == trial.task_protocol)
            && self
                .trial_instruction
                .as_ref()
                .map_or(true, |v| *v == trial.trial_instruction)
            && self
                .early_lick
                .as_ref()
                .map_or(true, |v| *v == trial.early_lick)
            && self.outcome.as_ref().map_or(true, |v| *v == trial.outcome)
    }
}

/// Photostimulation event query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhotostimFilter {
    pub session: SessionFilter,
    pub site: Option<PhotostimSite>,
}

impl PhotostimFilter {
    pub fn matches(&self, event: &PhotostimEvent) -> bool {
        self.session.matches(&event.trial_id)
            && self.site.as_ref().map_or(true, |s| *s == event.site)
    }
}

/// Unit query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitFilter {
    pub sessions: Option<BTreeSet<SessionKey>>,
    pub unit: Option<UnitKey>,
    pub quality: Option<String>,
    pub brain_area: Option<String>,
}

impl UnitFilter {
    pub fn matches(&self, unit: &Unit) -> bool {
        self.sessions
            .as_ref()
            .map_or(true, |s| s.contains(&unit.key.session_key()))
            && self.unit.map_or(true, |k| k == unit.key)
            && self.quality.as_ref().map_or(true, |q| *q == unit.quality)
            && self
                .brain_area
                .as_ref()
                .map_or(true, |a| unit.brain_area.as_ref() == Some(a))
    }
}

/// Queryable provider of recorded data
///
/// Implementations must be safe to share across the per-unit worker threads.
pub trait TrialStore: Send + Sync {
    /// Behavior trials matching `filter`, ordered by trial id
    fn behavior_trials(&self, filter: &BehaviorFilter) -> EphysResult<Vec<BehaviorTrial>>;

    /// Photostimulation events matching `filter`
    fn photostim_events(&self, filter: &PhotostimFilter) -> EphysResult<Vec<PhotostimEvent>>;

    /// Spike timestamps of `unit` during `trial` (seconds, ascending); empty when
    /// the unit did not fire or was not recorded in that trial
    fn spike_times(&self, unit: &UnitKey, trial: &TrialId) -> EphysResult<Vec<f64>>;

    /// Units matching `filter`, ordered by key
    fn units(&self, filter: &UnitFilter) -> EphysResult<Vec<Unit>>;

    /// A single unit by key
    fn unit(&self, key: &UnitKey) -> EphysResult<Unit> {
        let filter = UnitFilter {
            unit: Some(*key),
            ..Default::default()
        };
        self.units(&filter)?
            .into_iter()
            .next()
            .ok_or_else(|| EphysError::not_found("Unit", key))
    }
}
