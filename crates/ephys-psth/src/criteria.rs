// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Selectivity criteria catalog.

Every combination of the eight period flags (selectivity and preference for
sample, delay, go and global) gets a row. Rows `0..256` are strict: each bit
is a definite `true`/`false`. Rows `256..511` repeat the combinations with
unset bits relaxed to "unknown"; the all-set relaxed row would duplicate the
last strict row and is left out.
*/

use serde::{Deserialize, Serialize};

use ephys_config::CriteriaTemplateConfig;
use ephys_structures::{CriteriaId, EphysError, EphysResult};

/// Number of period flags encoded in a catalog row index
pub const PERIOD_FIELDS: usize = 8;

/// Strict rows, one per bit pattern
pub const STRICT_ROWS: usize = 1 << PERIOD_FIELDS;

/// Total catalog size
pub const CATALOG_ROWS: usize = 2 * STRICT_ROWS - 1;

/// Task epochs, relative to the go cue (seconds)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectivityPeriod {
    Sample,
    Delay,
    Go,
    Global,
}

pub const SAMPLE_PERIOD: (f64, f64) = (-2.4, -1.2);
pub const DELAY_PERIOD: (f64, f64) = (-1.2, 0.0);
pub const GO_PERIOD: (f64, f64) = (0.0, 1.2);
pub const GLOBAL_PERIOD: (f64, f64) = (-2.4, 1.2);

impl SelectivityPeriod {
    pub const ALL: [SelectivityPeriod; 4] = [
        SelectivityPeriod::Sample,
        SelectivityPeriod::Delay,
        SelectivityPeriod::Go,
        SelectivityPeriod::Global,
    ];

    /// Closed interval `[start, end]`
    pub fn interval(&self) -> (f64, f64) {
        match self {
            SelectivityPeriod::Sample => SAMPLE_PERIOD,
            SelectivityPeriod::Delay => DELAY_PERIOD,
            SelectivityPeriod::Go => GO_PERIOD,
            SelectivityPeriod::Global => GLOBAL_PERIOD,
        }
    }

    pub fn duration(&self) -> f64 {
        let (start, end) = self.interval();
        end - start
    }

    /// Whether the period counts towards `any_selectivity` / `any_preference`
    pub fn counts_towards_any(&self) -> bool {
        !matches!(self, SelectivityPeriod::Global)
    }

    fn index(&self) -> usize {
        match self {
            SelectivityPeriod::Sample => 0,
            SelectivityPeriod::Delay => 1,
            SelectivityPeriod::Go => 2,
            SelectivityPeriod::Global => 3,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SelectivityPeriod::Sample => "sample",
            SelectivityPeriod::Delay => "delay",
            SelectivityPeriod::Go => "go",
            SelectivityPeriod::Global => "global",
        }
    }
}

/// Ten selectivity/preference flags; `None` is "unknown" in catalog rows and
/// "unconstrained" in templates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CriteriaFlags {
    pub sample_selectivity: Option<bool>,
    pub delay_selectivity: Option<bool>,
    pub go_selectivity: Option<bool>,
    pub global_selectivity: Option<bool>,
    pub any_selectivity: Option<bool>,
    pub sample_preference: Option<bool>,
    pub delay_preference: Option<bool>,
    pub go_preference: Option<bool>,
    pub global_preference: Option<bool>,
    pub any_preference: Option<bool>,
}

/// OR over the non-global periods; `None` when nothing is known to be set
fn derive_any(flags: [Option<bool>; 4], strict: bool) -> Option<bool> {
    let set = SelectivityPeriod::ALL
        .iter()
        .filter(|p| p.counts_towards_any())
        .any(|p| flags[p.index()] == Some(true));
    if strict {
        Some(set)
    } else if set {
        Some(true)
    } else {
        None
    }
}

impl CriteriaFlags {
    /// Flags in catalog field order: four selectivity then four preference
    pub fn period_flags(&self) -> [Option<bool>; PERIOD_FIELDS] {
        [
            self.sample_selectivity,
            self.delay_selectivity,
            self.go_selectivity,
            self.global_selectivity,
            self.sample_preference,
            self.delay_preference,
            self.go_preference,
            self.global_preference,
        ]
    }

    /// Build from the eight period flags, deriving both `any_*` flags
    pub fn from_period_flags(flags: [Option<bool>; PERIOD_FIELDS], strict: bool) -> Self {
        let selectivity = [flags[0], flags[1], flags[2], flags[3]];
        let preference = [flags[4], flags[5], flags[6], flags[7]];
        Self {
            sample_selectivity: flags[0],
            delay_selectivity: flags[1],
            go_selectivity: flags[2],
            global_selectivity: flags[3],
            any_selectivity: derive_any(selectivity, strict),
            sample_preference: flags[4],
            delay_preference: flags[5],
            go_preference: flags[6],
            global_preference: flags[7],
            any_preference: derive_any(preference, strict),
        }
    }

    /// Definite classification from per-period results
    pub fn from_periods(selectivity: [bool; 4], preference: [bool; 4]) -> Self {
        let mut flags = [None; PERIOD_FIELDS];
        for i in 0..4 {
            flags[i] = Some(selectivity[i]);
            flags[i + 4] = Some(preference[i]);
        }
        Self::from_period_flags(flags, true)
    }

    fn all_flags(&self) -> [Option<bool>; 10] {
        [
            self.sample_selectivity,
            self.delay_selectivity,
            self.go_selectivity,
            self.global_selectivity,
            self.any_selectivity,
            self.sample_preference,
            self.delay_preference,
            self.go_preference,
            self.global_preference,
            self.any_preference,
        ]
    }

    pub fn selectivity(&self, period: SelectivityPeriod) -> Option<bool> {
        self.period_flags()[period.index()]
    }

    pub fn preference(&self, period: SelectivityPeriod) -> Option<bool> {
        self.period_flags()[period.index() + 4]
    }

    /// True when every flag is definite
    pub fn is_strict(&self) -> bool {
        self.all_flags().iter().all(Option::is_some)
    }

    /// True when every non-null flag of `template` equals the same flag here
    pub fn agrees_with(&self, template: &CriteriaFlags) -> bool {
        self.all_flags()
            .iter()
            .zip(template.all_flags().iter())
            .all(|(mine, wanted)| wanted.is_none() || mine == wanted)
    }

    fn describe(&self) -> String {
        let names = [
            "sample_selectivity",
            "delay_selectivity",
            "go_selectivity",
            "global_selectivity",
            "any_selectivity",
            "sample_preference",
            "delay_preference",
            "go_preference",
            "global_preference",
            "any_preference",
        ];
        names
            .iter()
            .zip(self.all_flags().iter())
            .map(|(name, flag)| match flag {
                Some(v) => format!("{}={}", name, v),
                None => format!("{}=null", name),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl From<&CriteriaTemplateConfig> for CriteriaFlags {
    fn from(config: &CriteriaTemplateConfig) -> Self {
        Self {
            sample_selectivity: config.sample_selectivity,
            delay_selectivity: config.delay_selectivity,
            go_selectivity: config.go_selectivity,
            global_selectivity: config.global_selectivity,
            any_selectivity: config.any_selectivity,
            sample_preference: config.sample_preference,
            delay_preference: config.delay_preference,
            go_preference: config.go_preference,
            global_preference: config.global_preference,
            any_preference: config.any_preference,
        }
    }
}

/// A catalog row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectivityCriteriaRecord {
    pub criteria_id: CriteriaId,
    pub flags: CriteriaFlags,
}

/// Bit `PERIOD_FIELDS - 1` of `index` maps to the first field
fn index_bits(index: usize) -> [bool; PERIOD_FIELDS] {
    let mut bits = [false; PERIOD_FIELDS];
    for (field, bit) in bits.iter_mut().enumerate() {
        *bit = (index >> (PERIOD_FIELDS - 1 - field)) & 1 == 1;
    }
    bits
}

/// Derived table of all selectivity criteria
#[derive(Debug, Clone)]
pub struct CriteriaCatalog {
    rows: Vec<SelectivityCriteriaRecord>,
}

impl Default for CriteriaCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl CriteriaCatalog {
    pub fn new() -> Self {
        let mut rows = Vec::with_capacity(CATALOG_ROWS);
        for index in 0..STRICT_ROWS {
            let flags = index_bits(index).map(Some);
            rows.push(CriteriaFlags::from_period_flags(flags, true));
        }
        for index in 0..STRICT_ROWS - 1 {
            let flags = index_bits(index).map(|bit| if bit { Some(true) } else { None });
            rows.push(CriteriaFlags::from_period_flags(flags, false));
        }
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(id, flags)| SelectivityCriteriaRecord {
                criteria_id: id as CriteriaId,
                flags,
            })
            .collect();
        Self { rows }
    }

    pub fn rows(&self) -> &[SelectivityCriteriaRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, criteria_id: CriteriaId) -> EphysResult<&SelectivityCriteriaRecord> {
        self.rows
            .get(criteria_id as usize)
            .ok_or_else(|| EphysError::not_found("SelectivityCriteria", criteria_id))
    }

    /// Id of the single row whose ten flags equal `flags`; null only matches null
    pub fn lookup(&self, flags: &CriteriaFlags) -> EphysResult<CriteriaId> {
        let mut matches = self.rows.iter().filter(|row| row.flags == *flags);
        match (matches.next(), matches.next()) {
            (Some(row), None) => Ok(row.criteria_id),
            (None, _) => Err(EphysError::not_found("SelectivityCriteria", flags.describe())),
            (Some(_), Some(_)) => Err(EphysError::AmbiguousMatch {
                flags: flags.describe(),
                matches: self.rows.iter().filter(|row| row.flags == *flags).count(),
            }),
        }
    }

    /// Strict rows agreeing with every non-null flag of `template`
    pub fn matching(&self, template: &CriteriaFlags) -> Vec<&SelectivityCriteriaRecord> {
        self.rows[..STRICT_ROWS]
            .iter()
            .filter(|row| row.flags.agrees_with(template))
            .collect()
    }
}
