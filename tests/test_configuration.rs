// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Configuration integration tests.

These tests validate:
- The shipped ephys_configuration.toml loads and validates
- Configured conditions and groups drive the pipeline instead of the defaults
- Store and result snapshots round through `system.store_path` / `results_path`
*/

mod common;

use std::path::PathBuf;
use std::sync::Arc;

use common::*;
use ephys::config::{load_config, validate_config, ConditionPartConfig, EphysConfig, TrialConditionConfig};
use ephys::prelude::*;

fn shipped_config() -> EphysConfig {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("ephys_configuration.toml");
    load_config(Some(&path), None).unwrap()
}

#[test]
fn test_shipped_configuration_is_valid() {
    let config = shipped_config();
    validate_config(&config).unwrap();

    assert_eq!(config.psth, PsthConfig::default());
    assert_eq!(config.conditions.len(), 2);
    assert_eq!(config.groups.len(), 1);
    assert_eq!(config.groups[0].criteria.sample_selectivity, Some(true));

    let catalog = ConditionCatalog::from_config(&config.conditions).unwrap();
    assert_eq!(catalog.get(0).unwrap().description, "audio delay contra hit");
    assert_eq!(catalog.get(1).unwrap().parts.len(), 4);
}

#[test]
fn test_unknown_part_kind_is_rejected() {
    let conditions = vec![TrialConditionConfig {
        id: 0,
        description: "bad".to_string(),
        parts: vec![ConditionPartConfig {
            kind: "Laterality".to_string(),
            value: Some("left".to_string()),
            ..Default::default()
        }],
    }];
    assert!(matches!(
        ConditionCatalog::from_config(&conditions),
        Err(EphysError::Configuration(_))
    ));
}

#[test]
fn test_configured_pipeline_with_snapshots() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = shipped_config();
    config.system.max_threads = 2;
    config.system.store_path = Some(dir.path().join("store.json"));
    config.system.results_path = Some(dir.path().join("results.json"));

    let mut store = InMemoryTrialStore::new();
    store.insert_unit(alm_unit(1));
    lateralized_session(&mut store, unit_key(1), sample_10hz, sample_2hz);
    store.save_json(dir.path().join("store.json").as_path()).unwrap();

    let store = ephys::open_trial_store(&config).unwrap();
    let results = Arc::new(ephys::open_result_store(&config).unwrap());
    let service = PsthService::from_config(&config, Arc::new(store), results.clone()).unwrap();
    let summary = service.run().unwrap();

    assert_eq!(summary.conditions_populated, 2);
    assert_eq!(summary.unit_psths, 2);
    assert_eq!(summary.groups_built, 1);

    ephys::save_result_store(&config, &results).unwrap();
    let reloaded = ephys::open_result_store(&config).unwrap();
    let group = reloaded.group_psth(0).unwrap().unwrap();
    assert_eq!(
        group.ipsi_pref_ipsi_trials.iter().copied().collect::<Vec<_>>(),
        vec![PsthRef::new(1, unit_key(1))]
    );
    assert_eq!(
        group.ipsi_pref_contra_trials.iter().copied().collect::<Vec<_>>(),
        vec![PsthRef::new(0, unit_key(1))]
    );
    assert!(group.contra_pref_contra_trials.is_empty());
    assert!(reloaded.selectivity(&unit_key(1)).unwrap().is_some());
}
