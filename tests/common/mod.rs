// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Synthetic session fixtures shared by the integration tests.

#![allow(dead_code)]

use ephys::prelude::*;

pub const SUBJECT: u32 = 1;
pub const SESSION: u32 = 1;

pub fn trial_id(trial: u32) -> TrialId {
    TrialId::new(SUBJECT, SESSION, trial)
}

pub fn unit_key(unit: u32) -> UnitKey {
    UnitKey::new(SUBJECT, SESSION, 1, unit)
}

pub fn behavior(trial: u32, instruction: &str, early_lick: &str, outcome: &str) -> BehaviorTrial {
    BehaviorTrial {
        trial_id: trial_id(trial),
        task_protocol: TaskProtocol::new("audio delay", 1),
        trial_instruction: instruction.to_string(),
        early_lick: early_lick.to_string(),
        outcome: outcome.to_string(),
    }
}

/// `n` spikes evenly spread over `[start, start + span)`
pub fn spread(n: usize, start: f64, span: f64) -> Vec<f64> {
    (0..n).map(|i| start + i as f64 * span / n as f64).collect()
}

/// 20 ipsi ("left") and 20 contra ("right") hit trials, numbered 1..=40 and
/// interleaved; `ipsi_spikes` / `contra_spikes` give each trial's spike train
/// from its per-side repetition index
pub fn lateralized_session(
    store: &mut InMemoryTrialStore,
    unit: UnitKey,
    ipsi_spikes: impl Fn(u32) -> Vec<f64>,
    contra_spikes: impl Fn(u32) -> Vec<f64>,
) {
    for rep in 0..20u32 {
        let ipsi_trial = 2 * rep + 1;
        let contra_trial = 2 * rep + 2;
        store.insert_behavior_trial(behavior(ipsi_trial, "left", "no early", "hit"));
        store.insert_behavior_trial(behavior(contra_trial, "right", "no early", "hit"));
        store.insert_spikes(unit, trial_id(ipsi_trial), ipsi_spikes(rep));
        store.insert_spikes(unit, trial_id(contra_trial), contra_spikes(rep));
    }
}

/// Left-hemisphere ALM unit
pub fn alm_unit(unit: u32) -> Unit {
    Unit::new(unit_key(unit), "good").with_location(Hemisphere::Left, "ALM")
}

/// ~10 Hz in the sample period with small trial-to-trial variation
pub fn sample_10hz(rep: u32) -> Vec<f64> {
    spread(11 + (rep % 3) as usize, -2.35, 1.1)
}

/// ~2 Hz in the sample period with small trial-to-trial variation
pub fn sample_2hz(rep: u32) -> Vec<f64> {
    spread(2 + (rep % 2) as usize, -2.3, 0.9)
}
