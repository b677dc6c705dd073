// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Recording units.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::trial::{Hemisphere, SessionKey, TrialId};

/// A sorted cluster on one probe insertion of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitKey {
    pub subject_id: u32,
    pub session: u32,
    pub insertion_number: u32,
    pub unit: u32,
}

impl UnitKey {
    pub fn new(subject_id: u32, session: u32, insertion_number: u32, unit: u32) -> Self {
        Self {
            subject_id,
            session,
            insertion_number,
            unit,
        }
    }

    pub fn session_key(&self) -> SessionKey {
        SessionKey::new(self.subject_id, self.session)
    }

    /// Whether `trial` was recorded in this unit's session
    pub fn shares_session(&self, trial: &TrialId) -> bool {
        self.subject_id == trial.subject_id && self.session == trial.session
    }
}

impl Display for UnitKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.subject_id, self.session, self.insertion_number, self.unit
        )
    }
}

/// Unit metadata; hemisphere and brain area come from the insertion location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub key: UnitKey,
    /// e.g. "good", "ok", "multi"
    pub quality: String,
    #[serde(default)]
    pub hemisphere: Option<Hemisphere>,
    #[serde(default)]
    pub brain_area: Option<String>,
}

impl Unit {
    pub fn new(key: UnitKey, quality: impl Into<String>) -> Self {
        Self {
            key,
            quality: quality.into(),
            hemisphere: None,
            brain_area: None,
        }
    }

    pub fn with_location(mut self, hemisphere: Hemisphere, brain_area: impl Into<String>) -> Self {
        self.hemisphere = Some(hemisphere);
        self.brain_area = Some(brain_area.into());
        self
    }
}
