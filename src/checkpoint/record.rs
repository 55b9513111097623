// src/checkpoint/record.rs

//! Typed checkpoint record and its JSON schema.
//!
//! ```json
//! {
//!   "cosmo_sp":   ["id000001", "id000002"],
//!   "cosmotherm": { "id000001": ["benzene", "water"] }
//! }
//! ```
//!
//! Keys are stage names; a single-condition stage maps to the sorted list of
//! completed item IDs, a multi-condition stage maps item IDs to the sorted
//! list of completed condition keys.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::errors::{PipeshardError, Result};
use crate::pipeline::Pipeline;
use crate::types::{ConditionKey, ItemId, StageKind, StageName};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StageProgress {
    Items(BTreeSet<ItemId>),
    Conditions(BTreeMap<ItemId, BTreeSet<ConditionKey>>),
}

impl StageProgress {
    pub fn empty(kind: StageKind) -> Self {
        match kind {
            StageKind::Single => StageProgress::Items(BTreeSet::new()),
            StageKind::Multi => StageProgress::Conditions(BTreeMap::new()),
        }
    }

    pub fn kind(&self) -> StageKind {
        match self {
            StageProgress::Items(_) => StageKind::Single,
            StageProgress::Conditions(_) => StageKind::Multi,
        }
    }

    /// Whether the item appears at all (for multi-condition stages: whether
    /// any progress was recorded).
    pub fn has_item(&self, item: &str) -> bool {
        match self {
            StageProgress::Items(done) => done.contains(item),
            StageProgress::Conditions(done) => done.contains_key(item),
        }
    }

    fn remove_item(&mut self, item: &str) -> bool {
        match self {
            StageProgress::Items(done) => done.remove(item),
            StageProgress::Conditions(done) => done.remove(item).is_some(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckpointRecord {
    stages: BTreeMap<StageName, StageProgress>,
}

impl CheckpointRecord {
    /// Empty record with one entry per pipeline stage.
    pub fn for_pipeline(pipeline: &Pipeline) -> Self {
        let stages = pipeline
            .stages()
            .iter()
            .map(|s| (s.name.clone(), StageProgress::empty(s.kind())))
            .collect();
        Self { stages }
    }

    /// Check a freshly deserialized record against the pipeline.
    ///
    /// Unknown stages and stages whose shape does not match their kind are
    /// rejected; stages missing from the file are added empty.
    pub fn conform(&mut self, pipeline: &Pipeline) -> std::result::Result<(), String> {
        for (name, progress) in self.stages.iter_mut() {
            let stage = pipeline
                .stage(name)
                .ok_or_else(|| format!("unknown stage '{name}'"))?;

            // An empty `[]` deserializes as `Items`; accept it for either kind.
            let empty_list = matches!(progress, StageProgress::Items(done) if done.is_empty());
            if empty_list && stage.kind() == StageKind::Multi {
                *progress = StageProgress::empty(StageKind::Multi);
            }
            if progress.kind() != stage.kind() {
                return Err(format!(
                    "stage '{name}' is {} but the record holds {} progress",
                    stage.kind(),
                    progress.kind()
                ));
            }
        }
        for stage in pipeline.stages() {
            self.stages
                .entry(stage.name.clone())
                .or_insert_with(|| StageProgress::empty(stage.kind()));
        }
        Ok(())
    }

    pub fn stage(&self, stage: &str) -> Option<&StageProgress> {
        self.stages.get(stage)
    }

    /// Raw membership test.
    ///
    /// With `sub = Some(key)` this asks about one condition of a
    /// multi-condition stage. With `sub = None` it asks whether the item is
    /// recorded for the stage at all; whether every declared condition is done
    /// is answered by `CheckpointStore::is_stage_complete`.
    pub fn is_complete(&self, stage: &str, item: &str, sub: Option<&str>) -> bool {
        match (self.stages.get(stage), sub) {
            (Some(progress), None) => progress.has_item(item),
            (Some(StageProgress::Conditions(done)), Some(key)) => {
                done.get(item).is_some_and(|keys| keys.contains(key))
            }
            (Some(StageProgress::Items(_)), Some(_)) | (None, _) => false,
        }
    }

    pub fn completed_conditions(&self, stage: &str, item: &str) -> Option<&BTreeSet<ConditionKey>> {
        match self.stages.get(stage) {
            Some(StageProgress::Conditions(done)) => done.get(item),
            _ => None,
        }
    }

    /// Record progress. Returns `true` if the record changed.
    pub fn mark_complete(&mut self, stage: &str, item: &str, sub: Option<&str>) -> Result<bool> {
        let progress = self.stages.get_mut(stage).ok_or_else(|| {
            PipeshardError::ConfigError(format!("checkpoint has no stage '{stage}'"))
        })?;

        match (progress, sub) {
            (StageProgress::Items(done), None) => Ok(done.insert(item.to_string())),
            (StageProgress::Conditions(done), None) => {
                let before = done.len();
                done.entry(item.to_string()).or_default();
                Ok(done.len() != before)
            }
            (StageProgress::Conditions(done), Some(key)) => Ok(done
                .entry(item.to_string())
                .or_default()
                .insert(key.to_string())),
            (StageProgress::Items(_), Some(key)) => Err(PipeshardError::ConfigError(format!(
                "stage '{stage}' is single-condition; cannot record condition '{key}'"
            ))),
        }
    }

    /// Drop the item from one stage. Returns `true` if it was present.
    pub fn remove_item(&mut self, stage: &str, item: &str) -> bool {
        self.stages
            .get_mut(stage)
            .is_some_and(|progress| progress.remove_item(item))
    }
}
