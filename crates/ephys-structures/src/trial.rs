// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Trial-level records: identifiers, behavior labels and photostimulation events.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// A recording session of one subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub subject_id: u32,
    pub session: u32,
}

impl SessionKey {
    pub fn new(subject_id: u32, session: u32) -> Self {
        Self {
            subject_id,
            session,
        }
    }
}

impl Display for SessionKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.subject_id, self.session)
    }
}

/// One behavioral attempt, ordered by (subject, session, trial)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrialId {
    pub subject_id: u32,
    pub session: u32,
    pub trial: u32,
}

impl TrialId {
    pub fn new(subject_id: u32, session: u32, trial: u32) -> Self {
        Self {
            subject_id,
            session,
            trial,
        }
    }

    pub fn session_key(&self) -> SessionKey {
        SessionKey::new(self.subject_id, self.session)
    }
}

impl Display for TrialId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.subject_id, self.session, self.trial)
    }
}

/// Task and protocol number, e.g. ("audio delay", 1)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskProtocol {
    pub task: String,
    pub protocol: u8,
}

impl TaskProtocol {
    pub fn new(task: impl Into<String>, protocol: u8) -> Self {
        Self {
            task: task.into(),
            protocol,
        }
    }
}

/// Behavioral labels of a trial
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehaviorTrial {
    pub trial_id: TrialId,
    pub task_protocol: TaskProtocol,
    /// "left" or "right"
    pub trial_instruction: String,
    /// "early", "early, presample only" or "no early"
    pub early_lick: String,
    /// "hit", "miss" or "ignore"
    pub outcome: String,
}

/// Stimulation device and target
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PhotostimSite {
    pub photostim_device: String,
    pub brain_location: String,
}

impl PhotostimSite {
    pub fn new(photostim_device: impl Into<String>, brain_location: impl Into<String>) -> Self {
        Self {
            photostim_device: photostim_device.into(),
            brain_location: brain_location.into(),
        }
    }
}

/// A photostimulation delivered during a trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotostimEvent {
    pub trial_id: TrialId,
    pub site: PhotostimSite,
    /// Seconds from trial start
    pub event_time: f64,
    /// Maximal power (mW)
    pub power: f64,
}

/// Recording hemisphere
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hemisphere {
    Left,
    Right,
}

impl Hemisphere {
    /// The trial instruction pointing to the same side as this hemisphere
    pub fn ipsi_instruction(self) -> &'static str {
        match self {
            Hemisphere::Left => "left",
            Hemisphere::Right => "right",
        }
    }

    pub fn contra_instruction(self) -> &'static str {
        match self {
            Hemisphere::Left => "right",
            Hemisphere::Right => "left",
        }
    }
}
