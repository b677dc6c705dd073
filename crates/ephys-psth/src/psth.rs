// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Peri-stimulus time histograms.
//!
//! Spikes of all trials are pooled, binned over `[xmin, xmax)` and converted
//! to a rate by dividing by `trial count * bin width`.

use std::collections::{BTreeMap, BTreeSet};

use ahash::AHashMap;
use rayon::prelude::*;
use tracing::{debug, info};

use ephys_config::{PsthConfig, DEFAULT_PSTH_BIN_WIDTH, DEFAULT_PSTH_XMAX, DEFAULT_PSTH_XMIN};
use ephys_structures::{
    BehaviorFilter, ConditionId, EphysError, EphysResult, ResultStore, SessionFilter, SessionKey,
    TrialId, TrialStore, UnitFilter, UnitKey, UnitPsth,
};

use crate::condition::{resolve_trials, ConditionCatalog, PartKind};

/// Relative slack allowed when `(xmax - xmin) / bin_width` is checked for a whole bin count
const BIN_COUNT_TOLERANCE: f64 = 1e-9;

/// Histogram range and bin width (seconds)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinParams {
    pub xmin: f64,
    pub xmax: f64,
    pub bin_width: f64,
}

impl BinParams {
    pub const DEFAULT: BinParams = BinParams {
        xmin: DEFAULT_PSTH_XMIN,
        xmax: DEFAULT_PSTH_XMAX,
        bin_width: DEFAULT_PSTH_BIN_WIDTH,
    };

    pub fn validate(&self) -> EphysResult<()> {
        if !(self.xmin.is_finite() && self.xmax.is_finite() && self.bin_width.is_finite()) {
            return Err(EphysError::Configuration(format!(
                "PSTH bin parameters must be finite: {:?}",
                self
            )));
        }
        if self.bin_width <= 0.0 {
            return Err(EphysError::Configuration(format!(
                "PSTH bin width must be positive, got {}",
                self.bin_width
            )));
        }
        if self.xmax <= self.xmin {
            return Err(EphysError::Configuration(format!(
                "PSTH xmax ({}) must exceed xmin ({})",
                self.xmax, self.xmin
            )));
        }
        let ratio = (self.xmax - self.xmin) / self.bin_width;
        if (ratio - ratio.round()).abs() > BIN_COUNT_TOLERANCE * ratio.round().max(1.0) {
            return Err(EphysError::Configuration(format!(
                "PSTH window [{}, {}) is not a whole number of {} s bins",
                self.xmin, self.xmax, self.bin_width
            )));
        }
        if self.n_bins() == 0 {
            return Err(EphysError::Configuration(format!(
                "PSTH bin width {} leaves no bins in [{}, {})",
                self.bin_width, self.xmin, self.xmax
            )));
        }
        Ok(())
    }

    pub fn n_bins(&self) -> usize {
        ((self.xmax - self.xmin) / self.bin_width).round() as usize
    }

    /// `n_bins() + 1` edges from `xmin`; the last edge is exactly `xmax`
    pub fn edges(&self) -> Vec<f64> {
        let n_bins = self.n_bins();
        (0..=n_bins)
            .map(|i| {
                if i == n_bins {
                    self.xmax
                } else {
                    self.xmin + i as f64 * self.bin_width
                }
            })
            .collect()
    }
}

/// Bin `k` such that `edges[k] <= t < edges[k + 1]`
fn bin_of(edges: &[f64], t: f64) -> Option<usize> {
    let (first, last) = (*edges.first()?, *edges.last()?);
    if !(t >= first && t < last) {
        return None;
    }
    Some(edges.partition_point(|e| *e <= t) - 1)
}

impl Default for BinParams {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<&PsthConfig> for BinParams {
    fn from(config: &PsthConfig) -> Self {
        Self {
            xmin: config.xmin,
            xmax: config.xmax,
            bin_width: config.bin_width,
        }
    }
}

/// Histogram pooled spikes; zero trials yields all-zero rates
pub fn compute_psth(spikes: &[f64], n_trials: usize, params: &BinParams) -> UnitPsth {
    let bin_edges = params.edges();
    let mut rates = vec![0.0; params.n_bins()];
    if n_trials > 0 {
        for &t in spikes {
            if let Some(bin) = bin_of(&bin_edges, t) {
                rates[bin] += 1.0;
            }
        }
        let norm = n_trials as f64 * params.bin_width;
        rates.iter_mut().for_each(|r| *r /= norm);
    }
    UnitPsth { rates, bin_edges }
}

/// Spike raster: one entry per spike, `ranks` index the sorted trial list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Raster {
    pub times: Vec<f64>,
    pub ranks: Vec<usize>,
}

/// Everything needed to draw a unit PSTH with its raster
#[derive(Debug, Clone, PartialEq)]
pub struct PlotData {
    pub trials: Vec<TrialId>,
    pub spikes: Vec<Vec<f64>>,
    pub psth: UnitPsth,
    pub raster: Raster,
}

/// Builds and caches unit PSTHs
#[derive(Debug, Clone, Copy, Default)]
pub struct PsthBuilder {
    params: BinParams,
}

impl PsthBuilder {
    pub fn new(params: BinParams) -> EphysResult<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &BinParams {
        &self.params
    }

    fn build_unit(&self, store: &dyn TrialStore, unit: &UnitKey, trials: &BTreeSet<TrialId>) -> EphysResult<UnitPsth> {
        let mut spikes = Vec::new();
        for trial in trials {
            spikes.extend(store.spike_times(unit, trial)?);
        }
        Ok(compute_psth(&spikes, trials.len(), &self.params))
    }

    /// PSTH of every unit over the same trial set, computed in parallel
    pub fn build(
        &self,
        store: &dyn TrialStore,
        units: &[UnitKey],
        trials: &BTreeSet<TrialId>,
    ) -> EphysResult<BTreeMap<UnitKey, UnitPsth>> {
        units
            .par_iter()
            .map(|unit| Ok((*unit, self.build_unit(store, unit, trials)?)))
            .collect()
    }

    /// Recompute and cache the PSTHs of one condition
    ///
    /// Covers the units of `unit_quality` in every session the condition's
    /// trials touch; each unit is averaged over its own session's trials.
    /// Returns the number of PSTHs written.
    pub fn populate_condition(
        &self,
        catalog: &ConditionCatalog,
        store: &dyn TrialStore,
        results: &dyn ResultStore,
        condition_id: ConditionId,
        unit_quality: &str,
    ) -> EphysResult<usize> {
        info!(condition_id, "Populating unit PSTHs");
        let clean = catalog.clean_trials(store, condition_id, &BehaviorFilter::default())?;

        let mut by_session: AHashMap<SessionKey, BTreeSet<TrialId>> = AHashMap::new();
        for trial in &clean {
            by_session.entry(trial.session_key()).or_default().insert(*trial);
        }

        let units = store.units(&UnitFilter {
            sessions: Some(by_session.keys().copied().collect()),
            quality: Some(unit_quality.to_string()),
            ..Default::default()
        })?;

        let psths: Vec<(UnitKey, UnitPsth)> = units
            .par_iter()
            .map(|unit| {
                let trials = by_session
                    .get(&unit.key.session_key())
                    .cloned()
                    .unwrap_or_default();
                Ok((unit.key, self.build_unit(store, &unit.key, &trials)?))
            })
            .collect::<EphysResult<_>>()?;

        let removed = results.delete_condition_psths(condition_id)?;
        if removed > 0 {
            debug!(condition_id, removed, "Removed previous unit PSTHs");
        }

        let n_units = psths.len();
        for (i, (unit, psth)) in psths.into_iter().enumerate() {
            let done = i + 1;
            let percent = done as f64 / n_units as f64 * 100.0;
            if done % 50 == 0 {
                info!(condition_id, "Unit {}/{} ({:.2}%)", done, n_units, percent);
            } else {
                debug!(condition_id, %unit, "Unit {}/{} ({:.2}%)", done, n_units, percent);
            }
            results.put_unit_psth(condition_id, unit, psth)?;
        }

        info!(
            condition_id,
            units = n_units,
            trials = clean.len(),
            "Unit PSTHs populated"
        );
        Ok(n_units)
    }

    /// Cached PSTH plus the unit's trials, spikes and raster for a condition
    pub fn get_for_plotting(
        &self,
        catalog: &ConditionCatalog,
        store: &dyn TrialStore,
        results: &dyn ResultStore,
        unit: &UnitKey,
        condition_id: ConditionId,
    ) -> EphysResult<PlotData> {
        let expanded = catalog.expand(condition_id)?;
        let psth = results
            .unit_psth(condition_id, unit)?
            .ok_or_else(|| EphysError::not_found("UnitPsth", format!("{}:{}", condition_id, unit)))?;

        let session = BehaviorFilter::in_session(SessionFilter::session(unit.session_key()));
        let included = resolve_trials(store, &expanded.parts.restricted_to(&PartKind::BEHAVIOR), &session)?;
        let excluded = resolve_trials(
            store,
            &expanded.parts.restricted_to(&[PartKind::PhotostimLocation]),
            &session,
        )?;

        let trials: Vec<TrialId> = included.difference(&excluded).copied().collect();
        let mut spikes = Vec::with_capacity(trials.len());
        let mut raster = Raster::default();
        for (rank, trial) in trials.iter().enumerate() {
            let times = store.spike_times(unit, trial)?;
            raster.times.extend_from_slice(&times);
            raster.ranks.extend(std::iter::repeat(rank).take(times.len()));
            spikes.push(times);
        }

        Ok(PlotData {
            trials,
            spikes,
            psth,
            raster,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params_give_150_bins() {
        let params = BinParams::default();
        assert_eq!(params.n_bins(), 150);
        let edges = params.edges();
        assert_eq!(edges.len(), 151);
        assert!((edges[0] + 3.0).abs() < 1e-12);
        assert!((edges[150] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_trials_all_zero() {
        let psth = compute_psth(&[0.1, 0.2], 0, &BinParams::default());
        assert_eq!(psth.rates.len(), 150);
        assert!(psth.rates.iter().all(|r| *r == 0.0));
    }

    #[test]
    fn test_rate_normalisation_and_half_open_range() {
        let params = BinParams {
            xmin: 0.0,
            xmax: 1.0,
            bin_width: 0.5,
        };
        // 1.0 is outside [0, 1); -0.1 is below range
        let psth = compute_psth(&[0.1, 0.2, 0.7, 1.0, -0.1], 2, &params);
        assert_eq!(psth.rates, vec![2.0, 1.0]);
        assert_eq!(psth.bin_edges, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_validate_rejects_bad_params() {
        let bad = [
            BinParams { bin_width: 0.0, ..BinParams::DEFAULT },
            BinParams { xmax: -3.0, ..BinParams::DEFAULT },
            BinParams { xmin: f64::NAN, ..BinParams::DEFAULT },
            BinParams { xmin: 0.0, xmax: 1.0, bin_width: 0.3 },
        ];
        for params in bad {
            assert!(matches!(
                PsthBuilder::new(params),
                Err(EphysError::Configuration(_))
            ));
        }
    }

    #[test]
    fn test_spike_on_each_edge_opens_that_bin() {
        let params = BinParams::default();
        let edges = params.edges();
        for k in 0..params.n_bins() {
            let psth = compute_psth(&[edges[k]], 1, &params);
            let hit: Vec<usize> = psth
                .rates
                .iter()
                .enumerate()
                .filter(|(_, r)| **r > 0.0)
                .map(|(i, _)| i)
                .collect();
            assert_eq!(hit, vec![k], "spike at edge {} ({})", k, edges[k]);
        }
        // the last edge closes the range
        let psth = compute_psth(&[edges[params.n_bins()]], 1, &params);
        assert!(psth.rates.iter().all(|r| *r == 0.0));
    }

    #[test]
    fn test_spikes_past_the_last_edge_are_dropped() {
        let params = BinParams { xmin: 0.0, xmax: 1.0, bin_width: 0.25 };
        let psth = compute_psth(&[0.99, 1.0, 1.2], 1, &params);
        assert_eq!(psth.rates, vec![0.0, 0.0, 0.0, 4.0]);
        assert_eq!(psth.bin_edges.last(), Some(&1.0));
    }
}
