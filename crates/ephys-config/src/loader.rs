// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support
//!
//! This module implements the 3-tier configuration loading system:
//! 1. TOML file (base defaults)
//! 2. Environment variables (runtime overrides)
//! 3. CLI arguments (explicit user overrides)

use crate::{ConfigError, ConfigResult, EphysConfig};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "ephys_configuration.toml";

/// Find the ephys configuration file
///
/// Search order:
/// 1. `EPHYS_CONFIG_PATH` environment variable
/// 2. Current working directory: `./ephys_configuration.toml`
/// 3. Parent directories (up to 5 levels)
///
/// # Errors
///
/// Returns `ConfigError::FileNotFound` if no config file is found in any location
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var("EPHYS_CONFIG_PATH") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        } else {
            return Err(ConfigError::FileNotFound(format!(
                "Config file specified by EPHYS_CONFIG_PATH not found: {}",
                path.display()
            )));
        }
    }

    let mut search_paths = Vec::new();

    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_FILE_NAME));

        let mut current = cwd.clone();
        for _ in 0..5 {
            if let Some(parent) = current.parent() {
                search_paths.push(parent.join(CONFIG_FILE_NAME));
                current = parent.to_path_buf();
            }
        }
    }

    for path in &search_paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    let search_list = search_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::FileNotFound(format!(
        "Configuration file '{}' not found in any of these locations:\n{}\n\nSet EPHYS_CONFIG_PATH environment variable to specify custom location.",
        CONFIG_FILE_NAME, search_list
    )))
}

/// Load configuration from TOML file
///
/// # Arguments
///
/// * `config_path` - Optional path to config file. If `None`, will search for config file.
/// * `cli_args` - Optional CLI argument overrides
///
/// # Errors
///
/// Returns error if config file is not found or contains invalid TOML.
/// Validation is a separate step (`validate_config`).
pub fn load_config(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<EphysConfig> {
    let config_file = if let Some(path) = config_path {
        path.to_path_buf()
    } else {
        find_config_file()?
    };

    let content = fs::read_to_string(&config_file)?;
    let mut config: EphysConfig = toml::from_str(&content)?;

    apply_environment_overrides(&mut config);

    if let Some(cli) = cli_args {
        apply_cli_overrides(&mut config, cli);
    }

    Ok(config)
}

/// Apply environment variable overrides to configuration
///
/// Supported environment variables:
/// - `EPHYS_LOG_LEVEL` -> `system.log_level`
/// - `EPHYS_MAX_THREADS` -> `system.max_threads`
/// - `EPHYS_STORE_PATH` -> `system.store_path`
/// - `EPHYS_PSTH_XMIN` / `EPHYS_PSTH_XMAX` / `EPHYS_PSTH_BIN_WIDTH` -> `psth.*`
/// - `EPHYS_SELECTIVITY_ALPHA` -> `selectivity.alpha`
/// - `EPHYS_UNIT_QUALITY` -> `selectivity.unit_quality`
pub fn apply_environment_overrides(config: &mut EphysConfig) {
    let vars: HashMap<String, String> = [
        ("log_level", "EPHYS_LOG_LEVEL"),
        ("max_threads", "EPHYS_MAX_THREADS"),
        ("store_path", "EPHYS_STORE_PATH"),
        ("psth_xmin", "EPHYS_PSTH_XMIN"),
        ("psth_xmax", "EPHYS_PSTH_XMAX"),
        ("psth_bin_width", "EPHYS_PSTH_BIN_WIDTH"),
        ("alpha", "EPHYS_SELECTIVITY_ALPHA"),
        ("unit_quality", "EPHYS_UNIT_QUALITY"),
    ]
    .into_iter()
    .filter_map(|(key, var)| env::var(var).ok().map(|value| (key.to_string(), value)))
    .collect();

    apply_cli_overrides(config, &vars);
}

/// Apply CLI argument overrides to configuration
///
/// Unparseable numeric values are ignored and the previous value is kept.
///
/// # Arguments
///
/// * `config` - Configuration to modify
/// * `cli_args` - HashMap of CLI arguments (e.g., `{"psth_bin_width": "0.02", "alpha": "0.01"}`)
pub fn apply_cli_overrides(config: &mut EphysConfig, cli_args: &HashMap<String, String>) {
    if let Some(value) = cli_args.get("log_level") {
        config.system.log_level = value.clone();
    }
    if let Some(value) = cli_args.get("max_threads") {
        if let Ok(threads) = value.parse::<usize>() {
            config.system.max_threads = threads;
        }
    }
    if let Some(value) = cli_args.get("store_path") {
        config.system.store_path = Some(PathBuf::from(value));
    }

    if let Some(value) = cli_args.get("psth_xmin") {
        if let Ok(xmin) = value.parse::<f64>() {
            config.psth.xmin = xmin;
        }
    }
    if let Some(value) = cli_args.get("psth_xmax") {
        if let Ok(xmax) = value.parse::<f64>() {
            config.psth.xmax = xmax;
        }
    }
    if let Some(value) = cli_args.get("psth_bin_width") {
        if let Ok(bin_width) = value.parse::<f64>() {
            config.psth.bin_width = bin_width;
        }
    }

    if let Some(value) = cli_args.get("alpha") {
        if let Ok(alpha) = value.parse::<f64>() {
            config.selectivity.alpha = alpha;
        }
    }
    if let Some(value) = cli_args.get("unit_quality") {
        config.selectivity.unit_quality = value.clone();
    }
}
