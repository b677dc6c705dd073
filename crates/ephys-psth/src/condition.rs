// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Trial conditions: curated predicates over behavior labels and photostimulation.

A condition owns an ordered list of parts. Resolution fetches the trials
matching each part from the [`TrialStore`], unions the results within a part
kind and intersects across kinds. Photostimulation parts are only ever used
as an exclusion set (see [`ConditionCatalog::clean_trials`]).
*/

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use ephys_config::{ConditionPartConfig, TrialConditionConfig};
use ephys_structures::{
    BehaviorFilter, ConditionId, EphysError, EphysResult, PhotostimFilter, PhotostimSite,
    TaskProtocol, TrialId, TrialStore,
};
use tracing::debug;

/// Part kinds a condition can constrain
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PartKind {
    TaskProtocol,
    TrialInstruction,
    EarlyLick,
    Outcome,
    PhotostimLocation,
}

impl PartKind {
    pub const ALL: [PartKind; 5] = [
        PartKind::TaskProtocol,
        PartKind::TrialInstruction,
        PartKind::EarlyLick,
        PartKind::Outcome,
        PartKind::PhotostimLocation,
    ];

    /// Kinds evaluated against behavior trials
    pub const BEHAVIOR: [PartKind; 4] = [
        PartKind::TaskProtocol,
        PartKind::TrialInstruction,
        PartKind::EarlyLick,
        PartKind::Outcome,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PartKind::TaskProtocol => "TaskProtocol",
            PartKind::TrialInstruction => "TrialInstruction",
            PartKind::EarlyLick => "EarlyLick",
            PartKind::Outcome => "Outcome",
            PartKind::PhotostimLocation => "PhotostimLocation",
        }
    }
}

impl Display for PartKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PartKind {
    type Err = EphysError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PartKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| EphysError::Configuration(format!("Unknown condition part '{}'", s)))
    }
}

/// One predicate of a trial condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrialConditionPart {
    TaskProtocol(TaskProtocol),
    TrialInstruction(String),
    EarlyLick(String),
    Outcome(String),
    PhotostimLocation(PhotostimSite),
}

impl TrialConditionPart {
    pub fn kind(&self) -> PartKind {
        match self {
            TrialConditionPart::TaskProtocol(_) => PartKind::TaskProtocol,
            TrialConditionPart::TrialInstruction(_) => PartKind::TrialInstruction,
            TrialConditionPart::EarlyLick(_) => PartKind::EarlyLick,
            TrialConditionPart::Outcome(_) => PartKind::Outcome,
            TrialConditionPart::PhotostimLocation(_) => PartKind::PhotostimLocation,
        }
    }
}

fn required<'a>(value: &'a Option<String>, kind: PartKind, field: &str) -> EphysResult<&'a str> {
    value.as_deref().ok_or_else(|| {
        EphysError::Configuration(format!("{} part requires '{}'", kind, field))
    })
}

impl TryFrom<&ConditionPartConfig> for TrialConditionPart {
    type Error = EphysError;

    fn try_from(config: &ConditionPartConfig) -> Result<Self, Self::Error> {
        let kind: PartKind = config.kind.parse()?;
        let part = match kind {
            PartKind::TaskProtocol => {
                let task = required(&config.task, kind, "task")?;
                let protocol = config.protocol.ok_or_else(|| {
                    EphysError::Configuration("TaskProtocol part requires 'protocol'".to_string())
                })?;
                TrialConditionPart::TaskProtocol(TaskProtocol::new(task, protocol))
            }
            PartKind::TrialInstruction => {
                TrialConditionPart::TrialInstruction(required(&config.value, kind, "value")?.to_string())
            }
            PartKind::EarlyLick => {
                TrialConditionPart::EarlyLick(required(&config.value, kind, "value")?.to_string())
            }
            PartKind::Outcome => {
                TrialConditionPart::Outcome(required(&config.value, kind, "value")?.to_string())
            }
            PartKind::PhotostimLocation => TrialConditionPart::PhotostimLocation(PhotostimSite::new(
                required(&config.photostim_device, kind, "photostim_device")?,
                required(&config.brain_location, kind, "brain_location")?,
            )),
        };
        Ok(part)
    }
}

/// A curated condition of interest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialCondition {
    pub condition_id: ConditionId,
    pub description: String,
    pub parts: Vec<TrialConditionPart>,
}

impl TrialCondition {
    pub fn new(condition_id: ConditionId, description: impl Into<String>) -> Self {
        Self {
            condition_id,
            description: description.into(),
            parts: Vec::new(),
        }
    }

    pub fn with_part(mut self, part: TrialConditionPart) -> Self {
        self.parts.push(part);
        self
    }
}

impl TryFrom<&TrialConditionConfig> for TrialCondition {
    type Error = EphysError;

    fn try_from(config: &TrialConditionConfig) -> Result<Self, Self::Error> {
        let parts = config
            .parts
            .iter()
            .map(TrialConditionPart::try_from)
            .collect::<EphysResult<Vec<_>>>()?;
        Ok(Self {
            condition_id: config.id,
            description: config.description.clone(),
            parts,
        })
    }
}

/// Condition parts grouped by kind; an empty kind places no constraint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionParts {
    pub task_protocol: Vec<TaskProtocol>,
    pub trial_instruction: Vec<String>,
    pub early_lick: Vec<String>,
    pub outcome: Vec<String>,
    pub photostim_location: Vec<PhotostimSite>,
}

impl ConditionParts {
    pub fn from_parts<'a>(parts: impl IntoIterator<Item = &'a TrialConditionPart>) -> Self {
        let mut grouped = Self::default();
        for part in parts {
            match part {
                TrialConditionPart::TaskProtocol(tp) => grouped.task_protocol.push(tp.clone()),
                TrialConditionPart::TrialInstruction(v) => grouped.trial_instruction.push(v.clone()),
                TrialConditionPart::EarlyLick(v) => grouped.early_lick.push(v.clone()),
                TrialConditionPart::Outcome(v) => grouped.outcome.push(v.clone()),
                TrialConditionPart::PhotostimLocation(site) => {
                    grouped.photostim_location.push(site.clone())
                }
            }
        }
        grouped
    }

    pub fn len_of(&self, kind: PartKind) -> usize {
        match kind {
            PartKind::TaskProtocol => self.task_protocol.len(),
            PartKind::TrialInstruction => self.trial_instruction.len(),
            PartKind::EarlyLick => self.early_lick.len(),
            PartKind::Outcome => self.outcome.len(),
            PartKind::PhotostimLocation => self.photostim_location.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        PartKind::ALL.iter().all(|kind| self.len_of(*kind) == 0)
    }

    fn clear(&mut self, kind: PartKind) {
        match kind {
            PartKind::TaskProtocol => self.task_protocol.clear(),
            PartKind::TrialInstruction => self.trial_instruction.clear(),
            PartKind::EarlyLick => self.early_lick.clear(),
            PartKind::Outcome => self.outcome.clear(),
            PartKind::PhotostimLocation => self.photostim_location.clear(),
        }
    }

    /// Keep only the listed kinds
    pub fn restricted_to(&self, kinds: &[PartKind]) -> Self {
        let mut selected = self.clone();
        for kind in PartKind::ALL {
            if !kinds.contains(&kind) {
                selected.clear(kind);
            }
        }
        selected
    }
}

/// A condition header with its parts grouped by kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandedCondition {
    pub condition_id: ConditionId,
    pub description: String,
    pub parts: ConditionParts,
}

impl ExpandedCondition {
    /// Restrict to the named part kinds
    pub fn select(&self, names: &[&str]) -> EphysResult<ConditionParts> {
        let kinds = names
            .iter()
            .map(|name| name.parse::<PartKind>())
            .collect::<EphysResult<Vec<_>>>()?;
        Ok(self.parts.restricted_to(&kinds))
    }
}

/// Narrow `base` by one extra field; `None` when the two contradict
fn narrow(base: &Option<String>, value: &str) -> Option<Option<String>> {
    match base {
        Some(existing) if existing != value => None,
        _ => Some(Some(value.to_string())),
    }
}

fn behavior_trial_ids(store: &dyn TrialStore, filter: Option<BehaviorFilter>) -> EphysResult<BTreeSet<TrialId>> {
    match filter {
        Some(filter) => Ok(store
            .behavior_trials(&filter)?
            .into_iter()
            .map(|t| t.trial_id)
            .collect()),
        None => Ok(BTreeSet::new()),
    }
}

fn has_behavior_constraint(filter: &BehaviorFilter) -> bool {
    filter.task_protocol.is_some()
        || filter.trial_instruction.is_some()
        || filter.early_lick.is_some()
        || filter.outcome.is_some()
}

/// Trials of a single kind: union over that kind's attribute tuples
fn resolve_kind(
    store: &dyn TrialStore,
    parts: &ConditionParts,
    kind: PartKind,
    extra: &BehaviorFilter,
) -> EphysResult<BTreeSet<TrialId>> {
    let mut trials = BTreeSet::new();
    match kind {
        PartKind::TaskProtocol => {
            for tp in &parts.task_protocol {
                let filter = match &extra.task_protocol {
                    Some(existing) if existing != tp => None,
                    _ => Some(BehaviorFilter {
                        task_protocol: Some(tp.clone()),
                        ..extra.clone()
                    }),
                };
                trials.extend(behavior_trial_ids(store, filter)?);
            }
        }
        PartKind::TrialInstruction => {
            for value in &parts.trial_instruction {
                let filter = narrow(&extra.trial_instruction, value).map(|v| BehaviorFilter {
                    trial_instruction: v,
                    ..extra.clone()
                });
                trials.extend(behavior_trial_ids(store, filter)?);
            }
        }
        PartKind::EarlyLick => {
            for value in &parts.early_lick {
                let filter = narrow(&extra.early_lick, value).map(|v| BehaviorFilter {
                    early_lick: v,
                    ..extra.clone()
                });
                trials.extend(behavior_trial_ids(store, filter)?);
            }
        }
        PartKind::Outcome => {
            for value in &parts.outcome {
                let filter = narrow(&extra.outcome, value).map(|v| BehaviorFilter {
                    outcome: v,
                    ..extra.clone()
                });
                trials.extend(behavior_trial_ids(store, filter)?);
            }
        }
        PartKind::PhotostimLocation => {
            for site in &parts.photostim_location {
                let filter = PhotostimFilter {
                    session: extra.session,
                    site: Some(site.clone()),
                };
                trials.extend(store.photostim_events(&filter)?.into_iter().map(|e| e.trial_id));
            }
            if has_behavior_constraint(extra) && !trials.is_empty() {
                let allowed = behavior_trial_ids(store, Some(extra.clone()))?;
                trials.retain(|t| allowed.contains(t));
            }
        }
    }
    Ok(trials)
}

/// Resolve grouped parts into trial ids
///
/// Each non-empty kind contributes the union of its tuples' trials; the
/// result is the intersection across non-empty kinds. No non-empty kind
/// resolves to the empty set. `extra` restricts every sub-query.
pub fn resolve_trials(
    store: &dyn TrialStore,
    parts: &ConditionParts,
    extra: &BehaviorFilter,
) -> EphysResult<BTreeSet<TrialId>> {
    let mut result: Option<BTreeSet<TrialId>> = None;
    for kind in PartKind::ALL {
        if parts.len_of(kind) == 0 {
            continue;
        }
        let kind_trials = resolve_kind(store, parts, kind, extra)?;
        result = Some(match result {
            None => kind_trials,
            Some(acc) => acc.intersection(&kind_trials).copied().collect(),
        });
        if result.as_ref().is_some_and(|r| r.is_empty()) {
            break;
        }
    }
    Ok(result.unwrap_or_default())
}

/// User-curated set of trial conditions keyed by id
#[derive(Debug, Clone, Default)]
pub struct ConditionCatalog {
    conditions: BTreeMap<ConditionId, TrialCondition>,
}

impl ConditionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, condition: TrialCondition) -> EphysResult<()> {
        if self.conditions.contains_key(&condition.condition_id) {
            return Err(EphysError::Configuration(format!(
                "Duplicate trial condition id {}",
                condition.condition_id
            )));
        }
        self.conditions.insert(condition.condition_id, condition);
        Ok(())
    }

    pub fn from_config(conditions: &[TrialConditionConfig]) -> EphysResult<Self> {
        let mut catalog = Self::new();
        for config in conditions {
            catalog.insert(TrialCondition::try_from(config)?)?;
        }
        Ok(catalog)
    }

    /// Audio delay task conditions 0-3 (contra/ipsi, hit/error), each excluding
    /// trials stimulated at any of `photostim_sites`
    pub fn default_conditions(photostim_sites: &[PhotostimSite]) -> Self {
        let specs = [
            (0, "audio delay contra hit", "right", "hit"),
            (1, "audio delay ipsi hit", "left", "hit"),
            (2, "audio delay contra error", "right", "miss"),
            (3, "audio delay ipsi error", "left", "miss"),
        ];
        let mut catalog = Self::new();
        for (id, description, instruction, outcome) in specs {
            let mut condition = TrialCondition::new(id, description)
                .with_part(TrialConditionPart::TaskProtocol(TaskProtocol::new("audio delay", 1)))
                .with_part(TrialConditionPart::TrialInstruction(instruction.to_string()))
                .with_part(TrialConditionPart::EarlyLick("no early".to_string()))
                .with_part(TrialConditionPart::Outcome(outcome.to_string()));
            for site in photostim_sites {
                condition = condition.with_part(TrialConditionPart::PhotostimLocation(site.clone()));
            }
            catalog.conditions.insert(id, condition);
        }
        catalog
    }

    pub fn get(&self, condition_id: ConditionId) -> EphysResult<&TrialCondition> {
        self.conditions
            .get(&condition_id)
            .ok_or_else(|| EphysError::not_found("TrialCondition", condition_id))
    }

    pub fn ids(&self) -> impl Iterator<Item = ConditionId> + '_ {
        self.conditions.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn expand(&self, condition_id: ConditionId) -> EphysResult<ExpandedCondition> {
        let condition = self.get(condition_id)?;
        Ok(ExpandedCondition {
            condition_id,
            description: condition.description.clone(),
            parts: ConditionParts::from_parts(&condition.parts),
        })
    }

    pub fn resolve_trials(
        &self,
        store: &dyn TrialStore,
        condition_id: ConditionId,
        extra: &BehaviorFilter,
    ) -> EphysResult<BTreeSet<TrialId>> {
        let expanded = self.expand(condition_id)?;
        resolve_trials(store, &expanded.parts, extra)
    }

    /// Behavior-matched trials minus photostimulated trials
    pub fn clean_trials(
        &self,
        store: &dyn TrialStore,
        condition_id: ConditionId,
        extra: &BehaviorFilter,
    ) -> EphysResult<BTreeSet<TrialId>> {
        let expanded = self.expand(condition_id)?;
        let included = resolve_trials(store, &expanded.parts.restricted_to(&PartKind::BEHAVIOR), extra)?;
        let excluded = resolve_trials(
            store,
            &expanded.parts.restricted_to(&[PartKind::PhotostimLocation]),
            extra,
        )?;
        let clean: BTreeSet<TrialId> = included.difference(&excluded).copied().collect();
        debug!(
            condition_id,
            included = included.len(),
            excluded = excluded.len(),
            clean = clean.len(),
            "Resolved clean trials"
        );
        Ok(clean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ephys_structures::{BehaviorTrial, InMemoryTrialStore, PhotostimEvent, SessionFilter};

    fn add_trial(store: &mut InMemoryTrialStore, trial: u32, instruction: &str, outcome: &str) {
        store.insert_behavior_trial(BehaviorTrial {
            trial_id: TrialId::new(1, 1, trial),
            task_protocol: TaskProtocol::new("audio delay", 1),
            trial_instruction: instruction.to_string(),
            early_lick: "no early".to_string(),
            outcome: outcome.to_string(),
        });
    }

    fn store() -> InMemoryTrialStore {
        let mut store = InMemoryTrialStore::new();
        add_trial(&mut store, 1, "right", "hit");
        add_trial(&mut store, 2, "right", "hit");
        add_trial(&mut store, 3, "left", "hit");
        add_trial(&mut store, 4, "right", "miss");
        store.insert_photostim_event(PhotostimEvent {
            trial_id: TrialId::new(1, 1, 2),
            site: PhotostimSite::new("OBIS470", "left_alm"),
            event_time: -1.2,
            power: 2.0,
        });
        store
    }

    fn ids(trials: &[u32]) -> BTreeSet<TrialId> {
        trials.iter().map(|t| TrialId::new(1, 1, *t)).collect()
    }

    #[test]
    fn test_part_kind_parse() {
        assert_eq!("Outcome".parse::<PartKind>().unwrap(), PartKind::Outcome);
        assert!(matches!(
            "Outcomes".parse::<PartKind>(),
            Err(EphysError::Configuration(_))
        ));
    }

    #[test]
    fn test_union_within_kind_intersection_across_kinds() {
        let store = store();
        let parts = ConditionParts {
            trial_instruction: vec!["right".into(), "left".into()],
            outcome: vec!["hit".into()],
            ..Default::default()
        };
        let trials = resolve_trials(&store, &parts, &BehaviorFilter::default()).unwrap();
        assert_eq!(trials, ids(&[1, 2, 3]));
    }

    #[test]
    fn test_duplicate_part_is_idempotent() {
        let store = store();
        let once = ConditionParts {
            outcome: vec!["hit".into()],
            ..Default::default()
        };
        let twice = ConditionParts {
            outcome: vec!["hit".into(), "hit".into()],
            ..Default::default()
        };
        let extra = BehaviorFilter::default();
        assert_eq!(
            resolve_trials(&store, &once, &extra).unwrap(),
            resolve_trials(&store, &twice, &extra).unwrap()
        );
    }

    #[test]
    fn test_empty_parts_resolve_to_nothing() {
        let store = store();
        let trials = resolve_trials(&store, &ConditionParts::default(), &BehaviorFilter::default()).unwrap();
        assert!(trials.is_empty());
    }

    #[test]
    fn test_contradicting_extra_filter() {
        let store = store();
        let parts = ConditionParts {
            outcome: vec!["hit".into()],
            ..Default::default()
        };
        let extra = BehaviorFilter {
            outcome: Some("miss".into()),
            ..Default::default()
        };
        assert!(resolve_trials(&store, &parts, &extra).unwrap().is_empty());
    }

    #[test]
    fn test_clean_trials_exclude_photostim() {
        let store = store();
        let catalog = ConditionCatalog::default_conditions(&[PhotostimSite::new("OBIS470", "left_alm")]);
        let clean = catalog
            .clean_trials(&store, 0, &BehaviorFilter::default())
            .unwrap();
        assert_eq!(clean, ids(&[1]));

        let other_session = BehaviorFilter::in_session(SessionFilter::session(
            ephys_structures::SessionKey::new(1, 2),
        ));
        assert!(catalog.clean_trials(&store, 0, &other_session).unwrap().is_empty());
    }

    #[test]
    fn test_expand_and_select() {
        let catalog = ConditionCatalog::default_conditions(&[PhotostimSite::new("OBIS470", "left_alm")]);
        let expanded = catalog.expand(1).unwrap();
        assert_eq!(expanded.description, "audio delay ipsi hit");
        assert_eq!(expanded.parts.photostim_location.len(), 1);

        let behavior_only = expanded
            .select(&["TaskProtocol", "TrialInstruction", "EarlyLick", "Outcome"])
            .unwrap();
        assert!(behavior_only.photostim_location.is_empty());
        assert_eq!(behavior_only.trial_instruction, vec!["left".to_string()]);

        assert!(expanded.select(&["Photostim"]).is_err());
        assert!(matches!(catalog.expand(42), Err(EphysError::NotFound { .. })));
    }

    #[test]
    fn test_from_config_rejects_duplicates_and_bad_parts() {
        let part = ConditionPartConfig {
            kind: "Outcome".into(),
            value: Some("hit".into()),
            ..Default::default()
        };
        let condition = TrialConditionConfig {
            id: 5,
            description: "hits".into(),
            parts: vec![part],
        };
        let catalog = ConditionCatalog::from_config(std::slice::from_ref(&condition)).unwrap();
        assert_eq!(catalog.len(), 1);

        assert!(ConditionCatalog::from_config(&[condition.clone(), condition.clone()]).is_err());

        let missing_value = TrialConditionConfig {
            parts: vec![ConditionPartConfig {
                kind: "TrialInstruction".into(),
                ..Default::default()
            }],
            ..condition
        };
        assert!(matches!(
            ConditionCatalog::from_config(&[missing_value]),
            Err(EphysError::Configuration(_))
        ));
    }
}
