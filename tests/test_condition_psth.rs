// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Trial condition + PSTH integration tests.

These tests validate:
- Condition resolution returns exactly the matching trials
- Conditions without parts resolve to nothing
- Photostimulated trials are excluded from condition PSTHs
- Cached PSTHs are recomputed idempotently and served for plotting
*/

mod common;

use std::collections::BTreeSet;

use common::*;
use ephys::prelude::*;
use ephys::psth::{resolve_trials, ConditionParts};

fn contra_hit_condition() -> TrialCondition {
    TrialCondition::new(7, "audio delay contra hit")
        .with_part(TrialConditionPart::TaskProtocol(TaskProtocol::new("audio delay", 1)))
        .with_part(TrialConditionPart::TrialInstruction("right".to_string()))
        .with_part(TrialConditionPart::EarlyLick("no early".to_string()))
        .with_part(TrialConditionPart::Outcome("hit".to_string()))
}

/// Trials 1-5 are right/no early/hit; 6-8 each break one predicate
fn five_matching_three_not() -> InMemoryTrialStore {
    let mut store = InMemoryTrialStore::new();
    for trial in 1..=5 {
        store.insert_behavior_trial(behavior(trial, "right", "no early", "hit"));
    }
    store.insert_behavior_trial(behavior(6, "left", "no early", "hit"));
    store.insert_behavior_trial(behavior(7, "right", "early", "hit"));
    store.insert_behavior_trial(behavior(8, "right", "no early", "miss"));
    store
}

#[test]
fn test_condition_resolves_exactly_matching_trials() {
    let store = five_matching_three_not();
    let mut catalog = ConditionCatalog::new();
    catalog.insert(contra_hit_condition()).unwrap();

    let trials = catalog
        .resolve_trials(&store, 7, &BehaviorFilter::default())
        .unwrap();
    let expected: BTreeSet<TrialId> = (1..=5).map(trial_id).collect();
    assert_eq!(trials, expected);

    // subset of the store's trials
    let all: BTreeSet<TrialId> = store
        .behavior_trials(&BehaviorFilter::default())
        .unwrap()
        .into_iter()
        .map(|t| t.trial_id)
        .collect();
    assert!(trials.is_subset(&all));
}

#[test]
fn test_repeated_part_is_idempotent() {
    let store = five_matching_three_not();
    let mut catalog = ConditionCatalog::new();
    catalog.insert(contra_hit_condition()).unwrap();
    catalog
        .insert(contra_hit_condition_with_id(8).with_part(TrialConditionPart::Outcome("hit".to_string())))
        .unwrap();

    let extra = BehaviorFilter::default();
    assert_eq!(
        catalog.resolve_trials(&store, 7, &extra).unwrap(),
        catalog.resolve_trials(&store, 8, &extra).unwrap()
    );
}

fn contra_hit_condition_with_id(id: u32) -> TrialCondition {
    TrialCondition {
        condition_id: id,
        ..contra_hit_condition()
    }
}

#[test]
fn test_condition_without_parts_is_empty() {
    let store = five_matching_three_not();
    let mut catalog = ConditionCatalog::new();
    catalog.insert(TrialCondition::new(9, "nothing")).unwrap();

    assert!(catalog
        .resolve_trials(&store, 9, &BehaviorFilter::default())
        .unwrap()
        .is_empty());
    assert!(resolve_trials(&store, &ConditionParts::default(), &BehaviorFilter::default())
        .unwrap()
        .is_empty());
}

#[test]
fn test_empty_trial_set_gives_zero_psth() {
    let store = InMemoryTrialStore::new();
    let builder = PsthBuilder::new(BinParams::default()).unwrap();
    let psths = builder
        .build(&store, &[unit_key(1)], &BTreeSet::new())
        .unwrap();

    let psth = &psths[&unit_key(1)];
    let params = BinParams::default();
    assert_eq!(psth.rates.len(), ((params.xmax - params.xmin) / params.bin_width).round() as usize);
    assert!(psth.rates.iter().all(|r| *r == 0.0));
}

/// Two right/hit trials, one of them photostimulated
fn stimulated_store() -> (InMemoryTrialStore, PhotostimSite) {
    let site = PhotostimSite::new("OBIS470", "left_alm");
    let mut store = InMemoryTrialStore::new();
    store.insert_behavior_trial(behavior(1, "right", "no early", "hit"));
    store.insert_behavior_trial(behavior(2, "right", "no early", "hit"));
    store.insert_photostim_event(PhotostimEvent {
        trial_id: trial_id(2),
        site: site.clone(),
        event_time: -1.2,
        power: 1.5,
    });
    store.insert_unit(alm_unit(1));
    store.insert_unit(Unit::new(unit_key(2), "multi"));
    store.insert_spikes(unit_key(1), trial_id(1), vec![-0.5, 0.1, 0.11]);
    store.insert_spikes(unit_key(1), trial_id(2), vec![0.5, 0.6, 0.7, 0.8]);
    (store, site)
}

#[test]
fn test_populate_condition_excludes_photostim_and_low_quality_units() {
    let (store, site) = stimulated_store();
    let catalog = ConditionCatalog::default_conditions(&[site]);
    let results = InMemoryResultStore::new();
    let builder = PsthBuilder::new(BinParams::default()).unwrap();

    let written = builder
        .populate_condition(&catalog, &store, &results, 0, "good")
        .unwrap();
    assert_eq!(written, 1);
    assert_eq!(results.condition_units(0).unwrap(), vec![unit_key(1)]);

    let psth = results.unit_psth(0, &unit_key(1)).unwrap().unwrap();
    // one clean trial, three spikes, 0.04 s bins
    let total: f64 = psth.rates.iter().map(|r| r * 0.04).sum();
    assert!((total - 3.0).abs() < 1e-9);

    // recompute yields the same result
    builder
        .populate_condition(&catalog, &store, &results, 0, "good")
        .unwrap();
    assert_eq!(results.unit_psth(0, &unit_key(1)).unwrap().unwrap(), psth);
    assert_eq!(results.condition_units(0).unwrap().len(), 1);
}

#[test]
fn test_get_for_plotting() {
    let (store, site) = stimulated_store();
    let catalog = ConditionCatalog::default_conditions(&[site]);
    let results = InMemoryResultStore::new();
    let builder = PsthBuilder::new(BinParams::default()).unwrap();

    assert!(matches!(
        builder.get_for_plotting(&catalog, &store, &results, &unit_key(1), 0),
        Err(EphysError::NotFound { .. })
    ));

    builder
        .populate_condition(&catalog, &store, &results, 0, "good")
        .unwrap();
    let plot = builder
        .get_for_plotting(&catalog, &store, &results, &unit_key(1), 0)
        .unwrap();

    assert_eq!(plot.trials, vec![trial_id(1)]);
    assert_eq!(plot.spikes, vec![vec![-0.5, 0.1, 0.11]]);
    assert_eq!(plot.raster.times, vec![-0.5, 0.1, 0.11]);
    assert_eq!(plot.raster.ranks, vec![0, 0, 0]);
    assert_eq!(plot.psth.n_bins(), 150);
}
