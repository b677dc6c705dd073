// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Unit selectivity classification.

For each task period, per-trial firing rates (closed-interval spike count
over period duration) of ipsi- and contra-instructed trials are compared
with Welch's two-sample t-test. A unit is selective in a period when
`p <= alpha` and prefers ipsi when its mean ipsi rate is higher.

A unit moves `Pending -> Computed | Skipped`. Only computed units get a
stored criteria id; missing metadata or too little data leaves the unit
without a record.
*/

use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use statrs::distribution::{ContinuousCDF, StudentsT};
use tracing::{debug, error, info, warn};

use ephys_config::SelectivityConfig;
use ephys_structures::{
    BehaviorFilter, CriteriaId, EphysError, EphysResult, ResultStore, SessionFilter, TrialStore,
    UnitKey, UnitSelectivity,
};

use crate::criteria::{CriteriaCatalog, CriteriaFlags, SelectivityPeriod};

/// Result of a two-sided Welch t-test
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WelchTest {
    pub t: f64,
    pub p: f64,
}

fn mean_and_variance(samples: &[f64]) -> (f64, f64) {
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var)
}

/// Two-sided Welch test; both samples need at least two values
///
/// With zero standard error the test degenerates: equal means give `p = 1`,
/// different means `p = 0`.
pub fn welch_t_test(a: &[f64], b: &[f64]) -> EphysResult<WelchTest> {
    if a.len() < 2 || b.len() < 2 {
        return Err(EphysError::Configuration(format!(
            "Welch test needs two samples per group, got {} and {}",
            a.len(),
            b.len()
        )));
    }
    let (mean_a, var_a) = mean_and_variance(a);
    let (mean_b, var_b) = mean_and_variance(b);
    let se_a = var_a / a.len() as f64;
    let se_b = var_b / b.len() as f64;
    let se2 = se_a + se_b;

    if se2 == 0.0 {
        return Ok(if mean_a == mean_b {
            WelchTest { t: 0.0, p: 1.0 }
        } else {
            WelchTest {
                t: if mean_a > mean_b { f64::INFINITY } else { f64::NEG_INFINITY },
                p: 0.0,
            }
        });
    }

    let t = (mean_a - mean_b) / se2.sqrt();
    let df = se2.powi(2)
        / (se_a.powi(2) / (a.len() as f64 - 1.0) + se_b.powi(2) / (b.len() as f64 - 1.0));
    let dist = StudentsT::new(0.0, 1.0, df)
        .map_err(|e| EphysError::Configuration(format!("Invalid t distribution (df={}): {}", df, e)))?;
    let p = (2.0 * dist.cdf(-t.abs())).clamp(0.0, 1.0);
    Ok(WelchTest { t, p })
}

/// Spike times packed one trial per row, padded with NaN
pub fn pack_spikes(trains: &[Vec<f64>]) -> Array2<f64> {
    let width = trains.iter().map(Vec::len).max().unwrap_or(0);
    let mut square = Array2::from_elem((trains.len(), width), f64::NAN);
    for (mut row, train) in square.axis_iter_mut(Axis(0)).zip(trains) {
        for (slot, t) in row.iter_mut().zip(train) {
            *slot = *t;
        }
    }
    square
}

/// Per-trial rate inside `period`; NaN padding never counts
pub fn period_rates(square: &Array2<f64>, period: SelectivityPeriod) -> Array1<f64> {
    let (start, end) = period.interval();
    let duration = period.duration();
    square.map_axis(Axis(1), |row| {
        row.iter().filter(|t| **t >= start && **t <= end).count() as f64 / duration
    })
}

/// Per-period test outcome of a computed unit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodStats {
    pub period: SelectivityPeriod,
    pub mean_ipsi: f64,
    pub mean_contra: f64,
    pub p_value: f64,
}

/// A computed classification
#[derive(Debug, Clone, PartialEq)]
pub struct SelectivityRecord {
    pub unit: UnitKey,
    pub criteria_id: CriteriaId,
    pub flags: CriteriaFlags,
    pub periods: Vec<PeriodStats>,
}

/// Terminal state of one unit
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Computed(SelectivityRecord),
    Skipped(EphysError),
}

impl Classification {
    pub fn is_computed(&self) -> bool {
        matches!(self, Classification::Computed(_))
    }
}

/// Counts of a batch run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectivitySummary {
    pub computed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl SelectivitySummary {
    pub fn total(&self) -> usize {
        self.computed + self.skipped + self.failed
    }
}

/// Classifies units against the criteria catalog
#[derive(Debug, Clone)]
pub struct SelectivityEngine {
    alpha: f64,
    valid_early_lick: String,
    catalog: CriteriaCatalog,
}

impl SelectivityEngine {
    pub fn new(config: &SelectivityConfig) -> EphysResult<Self> {
        if !(config.alpha > 0.0 && config.alpha < 1.0) {
            return Err(EphysError::Configuration(format!(
                "Selectivity alpha must be in (0, 1), got {}",
                config.alpha
            )));
        }
        Ok(Self {
            alpha: config.alpha,
            valid_early_lick: config.valid_early_lick.clone(),
            catalog: CriteriaCatalog::new(),
        })
    }

    pub fn catalog(&self) -> &CriteriaCatalog {
        &self.catalog
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    fn insufficient(unit: &UnitKey, reason: impl Into<String>) -> EphysError {
        EphysError::InsufficientData {
            unit: unit.to_string(),
            reason: reason.into(),
        }
    }

    /// Compute flags without storing anything
    pub fn evaluate(&self, store: &dyn TrialStore, key: &UnitKey) -> EphysResult<SelectivityRecord> {
        let unit = store.unit(key)?;
        let hemisphere = unit.hemisphere.ok_or_else(|| EphysError::MissingMetadata {
            unit: key.to_string(),
            field: "hemisphere".to_string(),
        })?;
        if unit.brain_area.is_none() {
            return Err(EphysError::MissingMetadata {
                unit: key.to_string(),
                field: "brain_area".to_string(),
            });
        }

        let trials = store.behavior_trials(&BehaviorFilter {
            session: SessionFilter::session(key.session_key()),
            early_lick: Some(self.valid_early_lick.clone()),
            ..Default::default()
        })?;
        if trials.is_empty() {
            return Err(Self::insufficient(key, "no valid trials"));
        }

        let trains = trials
            .iter()
            .map(|t| store.spike_times(key, &t.trial_id))
            .collect::<EphysResult<Vec<_>>>()?;
        if trains.iter().all(Vec::is_empty) {
            return Err(Self::insufficient(key, "no spikes in valid trials"));
        }

        let ipsi: Vec<usize> = trials
            .iter()
            .enumerate()
            .filter(|(_, t)| t.trial_instruction == hemisphere.ipsi_instruction())
            .map(|(i, _)| i)
            .collect();
        let contra: Vec<usize> = trials
            .iter()
            .enumerate()
            .filter(|(_, t)| t.trial_instruction == hemisphere.contra_instruction())
            .map(|(i, _)| i)
            .collect();
        if ipsi.len() < 2 || contra.len() < 2 {
            return Err(Self::insufficient(
                key,
                format!("{} ipsi and {} contra trials", ipsi.len(), contra.len()),
            ));
        }

        let square = pack_spikes(&trains);
        let mut selectivity = [false; 4];
        let mut preference = [false; 4];
        let mut periods = Vec::with_capacity(SelectivityPeriod::ALL.len());
        for (i, period) in SelectivityPeriod::ALL.into_iter().enumerate() {
            let rates = period_rates(&square, period);
            let rates_ipsi: Vec<f64> = ipsi.iter().map(|&r| rates[r]).collect();
            let rates_contra: Vec<f64> = contra.iter().map(|&r| rates[r]).collect();

            let test = welch_t_test(&rates_ipsi, &rates_contra)?;
            let mean_ipsi = rates_ipsi.iter().sum::<f64>() / rates_ipsi.len() as f64;
            let mean_contra = rates_contra.iter().sum::<f64>() / rates_contra.len() as f64;

            selectivity[i] = test.p <= self.alpha;
            preference[i] = mean_ipsi > mean_contra;
            periods.push(PeriodStats {
                period,
                mean_ipsi,
                mean_contra,
                p_value: test.p,
            });
        }

        let flags = CriteriaFlags::from_periods(selectivity, preference);
        let criteria_id = self.catalog.lookup(&flags)?;
        Ok(SelectivityRecord {
            unit: *key,
            criteria_id,
            flags,
            periods,
        })
    }

    /// Classify one unit and store its criteria id when computed
    ///
    /// Missing metadata and insufficient data end in `Skipped`; other errors
    /// are returned.
    pub fn classify(
        &self,
        store: &dyn TrialStore,
        results: &dyn ResultStore,
        key: &UnitKey,
    ) -> EphysResult<Classification> {
        if key.unit % 50 == 0 {
            info!(unit = %key, "Classifying unit selectivity");
        } else {
            debug!(unit = %key, "Classifying unit selectivity");
        }

        match self.evaluate(store, key) {
            Ok(record) => {
                results.put_selectivity(UnitSelectivity {
                    unit: record.unit,
                    criteria_id: record.criteria_id,
                })?;
                debug!(
                    unit = %key,
                    criteria_id = record.criteria_id,
                    any_selectivity = ?record.flags.any_selectivity,
                    any_preference = ?record.flags.any_preference,
                    "Unit classified"
                );
                Ok(Classification::Computed(record))
            }
            Err(err @ EphysError::MissingMetadata { .. }) => {
                error!(unit = %key, error = %err, "Insertion location missing, skipping unit");
                Ok(Classification::Skipped(err))
            }
            Err(err @ EphysError::InsufficientData { .. }) => {
                warn!(unit = %key, error = %err, "Skipping unit");
                Ok(Classification::Skipped(err))
            }
            Err(err) => Err(err),
        }
    }

    /// Classify units in parallel; one unit's failure never stops the others
    pub fn classify_all(
        &self,
        store: &dyn TrialStore,
        results: &dyn ResultStore,
        units: &[UnitKey],
    ) -> SelectivitySummary {
        let outcomes: Vec<EphysResult<Classification>> = units
            .par_iter()
            .map(|key| self.classify(store, results, key))
            .collect();

        let mut summary = SelectivitySummary::default();
        for (key, outcome) in units.iter().zip(outcomes) {
            match outcome {
                Ok(Classification::Computed(_)) => summary.computed += 1,
                Ok(Classification::Skipped(_)) => summary.skipped += 1,
                Err(err) => {
                    error!(unit = %key, error = %err, "Selectivity classification failed");
                    summary.failed += 1;
                }
            }
        }
        info!(
            computed = summary.computed,
            skipped = summary.skipped,
            failed = summary.failed,
            "Selectivity classification finished"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_spikes_pads_with_nan() {
        let square = pack_spikes(&[vec![0.1, 0.2, 0.3], vec![], vec![-1.0]]);
        assert_eq!(square.dim(), (3, 3));
        assert_eq!(square[[0, 2]], 0.3);
        assert!(square[[1, 0]].is_nan());
        assert_eq!(square[[2, 0]], -1.0);
        assert!(square[[2, 1]].is_nan());
    }

    #[test]
    fn test_period_rates_closed_interval() {
        // both sample bounds count, delay spike does not
        let square = pack_spikes(&[vec![-2.4, -1.8, -1.2, -0.5]]);
        let rates = period_rates(&square, SelectivityPeriod::Sample);
        assert!((rates[0] - 3.0 / 1.2).abs() < 1e-12);
    }

    #[test]
    fn test_welch_identical_samples() {
        let test = welch_t_test(&[5.0, 5.0, 5.0], &[5.0, 5.0]).unwrap();
        assert_eq!(test.p, 1.0);
    }

    #[test]
    fn test_welch_constant_but_different() {
        let test = welch_t_test(&[5.0, 5.0], &[1.0, 1.0]).unwrap();
        assert_eq!(test.p, 0.0);
    }

    #[test]
    fn test_welch_known_value() {
        // t = -sqrt(3), df = 75/17
        let test = welch_t_test(&[1.0, 2.0, 3.0, 4.0], &[2.0, 4.0, 6.0, 8.0]).unwrap();
        assert!((test.t + 3f64.sqrt()).abs() < 1e-9);
        assert!((test.p - 0.15158).abs() < 1e-3);
    }

    #[test]
    fn test_welch_requires_two_samples() {
        assert!(welch_t_test(&[1.0], &[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_engine_rejects_bad_alpha() {
        let config = SelectivityConfig {
            alpha: 1.5,
            ..Default::default()
        };
        assert!(SelectivityEngine::new(&config).is_err());
    }
}
