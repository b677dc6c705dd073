// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration validation
//!
//! Ensures configuration values are within valid ranges and that curated
//! conditions and groups reference each other consistently.

use crate::{ConfigError, ConfigResult, EphysConfig};
use std::collections::HashSet;

/// Validation errors that can occur during config validation
#[derive(Debug, Clone)]
pub enum ConfigValidationError {
    InvalidValue { field: String, reason: String },
    DuplicateId { section: String, id: u32 },
    UnknownReference { field: String, id: u32 },
    MissingRequired { field: String },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid configuration value for {}: {}", field, reason)
            }
            Self::DuplicateId { section, id } => {
                write!(f, "Duplicate id {} in [[{}]]", id, section)
            }
            Self::UnknownReference { field, id } => {
                write!(f, "{} references unknown condition id {}", field, id)
            }
            Self::MissingRequired { field } => {
                write!(f, "Missing required configuration: {}", field)
            }
        }
    }
}

/// Validate the complete configuration
///
/// Checks for:
/// - PSTH window and bin width
/// - Significance level range
/// - Duplicate condition / group ids
/// - Group references to undefined conditions
/// - Condition parts without a kind
///
/// Part kind names themselves are checked when the condition catalog is built.
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` with details if validation fails
pub fn validate_config(config: &EphysConfig) -> ConfigResult<()> {
    let mut errors = Vec::new();

    validate_psth(config, &mut errors);
    validate_selectivity(config, &mut errors);
    validate_conditions(config, &mut errors);
    validate_groups(config, &mut errors);

    if !errors.is_empty() {
        let error_messages = errors
            .iter()
            .map(|e| format!("  - {}", e))
            .collect::<Vec<_>>()
            .join("\n");

        return Err(ConfigError::ValidationError(format!(
            "Configuration validation failed:\n{}",
            error_messages
        )));
    }

    Ok(())
}

fn validate_psth(config: &EphysConfig, errors: &mut Vec<ConfigValidationError>) {
    let psth = &config.psth;
    if !(psth.xmin.is_finite() && psth.xmax.is_finite() && psth.bin_width.is_finite()) {
        errors.push(ConfigValidationError::InvalidValue {
            field: "psth".to_string(),
            reason: "xmin, xmax and bin_width must be finite".to_string(),
        });
        return;
    }
    if psth.bin_width <= 0.0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "psth.bin_width".to_string(),
            reason: "must be positive".to_string(),
        });
    }
    if psth.xmax <= psth.xmin {
        errors.push(ConfigValidationError::InvalidValue {
            field: "psth.xmax".to_string(),
            reason: "must be greater than psth.xmin".to_string(),
        });
    }
    if psth.bin_width > 0.0 && psth.xmax > psth.xmin {
        let ratio = (psth.xmax - psth.xmin) / psth.bin_width;
        if (ratio - ratio.round()).abs() > 1e-9 * ratio.round().max(1.0) {
            errors.push(ConfigValidationError::InvalidValue {
                field: "psth.bin_width".to_string(),
                reason: "must divide xmax - xmin into a whole number of bins".to_string(),
            });
        }
    }
}

fn validate_selectivity(config: &EphysConfig, errors: &mut Vec<ConfigValidationError>) {
    let alpha = config.selectivity.alpha;
    if !(alpha > 0.0 && alpha < 1.0) {
        errors.push(ConfigValidationError::InvalidValue {
            field: "selectivity.alpha".to_string(),
            reason: "must be between 0.0 and 1.0 (exclusive)".to_string(),
        });
    }
    if config.selectivity.unit_quality.is_empty() {
        errors.push(ConfigValidationError::MissingRequired {
            field: "selectivity.unit_quality".to_string(),
        });
    }
}

fn validate_conditions(config: &EphysConfig, errors: &mut Vec<ConfigValidationError>) {
    let mut seen = HashSet::new();
    for condition in &config.conditions {
        if !seen.insert(condition.id) {
            errors.push(ConfigValidationError::DuplicateId {
                section: "conditions".to_string(),
                id: condition.id,
            });
        }
        for (idx, part) in condition.parts.iter().enumerate() {
            if part.kind.trim().is_empty() {
                errors.push(ConfigValidationError::MissingRequired {
                    field: format!("conditions[{}].parts[{}].kind", condition.id, idx),
                });
            }
        }
    }
}

fn validate_groups(config: &EphysConfig, errors: &mut Vec<ConfigValidationError>) {
    let known: HashSet<u32> = config.conditions.iter().map(|c| c.id).collect();
    let mut seen = HashSet::new();
    for group in &config.groups {
        if !seen.insert(group.id) {
            errors.push(ConfigValidationError::DuplicateId {
                section: "groups".to_string(),
                id: group.id,
            });
        }
        for condition_id in &group.conditions {
            if !known.contains(condition_id) {
                errors.push(ConfigValidationError::UnknownReference {
                    field: format!("groups[{}].conditions", group.id),
                    id: *condition_id,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConditionPartConfig, TrialConditionConfig, UnitGroupConfig};

    fn condition(id: u32) -> TrialConditionConfig {
        TrialConditionConfig {
            id,
            description: format!("condition {}", id),
            parts: vec![ConditionPartConfig {
                kind: "Outcome".to_string(),
                value: Some("hit".to_string()),
                ..Default::default()
            }],
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = EphysConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_invalid_bin_width() {
        let mut config = EphysConfig::default();
        config.psth.bin_width = 0.0;

        let result = validate_config(&config);
        if let Err(ConfigError::ValidationError(msg)) = result {
            assert!(msg.contains("psth.bin_width"));
        } else {
            panic!("expected validation error");
        }
    }

    #[test]
    fn test_partial_last_bin() {
        let mut config = EphysConfig::default();
        config.psth.xmin = 0.0;
        config.psth.xmax = 1.0;
        config.psth.bin_width = 0.3;

        let result = validate_config(&config);
        if let Err(ConfigError::ValidationError(msg)) = result {
            assert!(msg.contains("whole number of bins"));
        } else {
            panic!("expected validation error");
        }
    }

    #[test]
    fn test_inverted_window() {
        let mut config = EphysConfig::default();
        config.psth.xmin = 2.0;
        config.psth.xmax = -2.0;

        let result = validate_config(&config);
        if let Err(ConfigError::ValidationError(msg)) = result {
            assert!(msg.contains("psth.xmax"));
        } else {
            panic!("expected validation error");
        }
    }

    #[test]
    fn test_alpha_out_of_range() {
        let mut config = EphysConfig::default();
        config.selectivity.alpha = 1.5;

        let result = validate_config(&config);
        if let Err(ConfigError::ValidationError(msg)) = result {
            assert!(msg.contains("selectivity.alpha"));
        } else {
            panic!("expected validation error");
        }
    }

    #[test]
    fn test_duplicate_condition_id() {
        let mut config = EphysConfig::default();
        config.conditions = vec![condition(3), condition(3)];

        let result = validate_config(&config);
        if let Err(ConfigError::ValidationError(msg)) = result {
            assert!(msg.contains("Duplicate id 3"));
        } else {
            panic!("expected validation error");
        }
    }

    #[test]
    fn test_group_references_unknown_condition() {
        let mut config = EphysConfig::default();
        config.conditions = vec![condition(0)];
        config.groups = vec![UnitGroupConfig {
            id: 0,
            description: "group".to_string(),
            conditions: vec![0, 7],
            ..Default::default()
        }];

        let result = validate_config(&config);
        if let Err(ConfigError::ValidationError(msg)) = result {
            assert!(msg.contains("unknown condition id 7"));
            assert!(!msg.contains("unknown condition id 0"));
        } else {
            panic!("expected validation error");
        }
    }
}
