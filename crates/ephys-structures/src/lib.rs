// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Core data types of the ephys pipeline: trials, units, the trial store that
//! serves recorded data and the result store that keeps derived PSTHs and
//! selectivity classifications.

mod error;
pub mod results;
pub mod store;
pub mod trial;
pub mod unit;

pub use error::{EphysError, EphysResult};
pub use results::{
    ConditionId, CriteriaId, GroupId, GroupPsth, InMemoryResultStore, PsthRef, ResultStore,
    ResultStoreSnapshot, UnitPsth, UnitSelectivity,
};
pub use store::{
    BehaviorFilter, InMemoryTrialStore, PhotostimFilter, SessionFilter, TrialSpikes, TrialStore,
    TrialStoreSnapshot, UnitFilter,
};
pub use trial::{
    BehaviorTrial, Hemisphere, PhotostimEvent, PhotostimSite, SessionKey, TaskProtocol, TrialId,
};
pub use unit::{Unit, UnitKey};
