// src/checkpoint/store.rs

use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, info};

use crate::checkpoint::record::CheckpointRecord;
use crate::errors::{PipeshardError, Result};
use crate::pipeline::Pipeline;
use crate::types::{ConditionKey, StageKind, StageName};

/// Load a record, or an empty one if the file does not exist yet.
///
/// Anything unreadable (bad JSON, unknown stage, wrong shape) is reported as
/// [`PipeshardError::CheckpointCorruption`] and must be fixed by hand.
pub fn load(path: &Path, pipeline: &Pipeline) -> Result<CheckpointRecord> {
    let corrupt = |reason: String| PipeshardError::CheckpointCorruption {
        path: path.to_path_buf(),
        reason,
    };

    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = ?path, "no checkpoint yet; starting from an empty record");
            return Ok(CheckpointRecord::for_pipeline(pipeline));
        }
        Err(e) => return Err(corrupt(e.to_string())),
    };

    let mut record: CheckpointRecord =
        serde_json::from_str(&contents).map_err(|e| corrupt(e.to_string()))?;
    record.conform(pipeline).map_err(corrupt)?;
    Ok(record)
}

/// Persist a record atomically: temp file in the same directory, fsync,
/// rename over the target, fsync the directory.
pub fn save(path: &Path, record: &CheckpointRecord) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(record).context("serializing checkpoint record")?;
    crate::fs::atomic_write(path, &bytes).map_err(|source| PipeshardError::CheckpointWrite {
        path: path.to_path_buf(),
        source,
    })
}

/// Durable per-stage completion state of one shard.
///
/// Every mutation reloads the file, applies the increment and persists
/// atomically, so progress written by another process between two calls is
/// merged rather than overwritten.
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    pipeline: Arc<Pipeline>,
    record: CheckpointRecord,
}

impl CheckpointStore {
    pub fn open(path: impl Into<PathBuf>, pipeline: Arc<Pipeline>) -> Result<Self> {
        let path = path.into();
        let record = load(&path, &pipeline)?;
        info!(path = ?path, "checkpoint loaded");
        Ok(Self {
            path,
            pipeline,
            record,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self) -> &CheckpointRecord {
        &self.record
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Re-read the file, discarding the in-memory view.
    pub fn reload(&mut self) -> Result<()> {
        self.record = load(&self.path, &self.pipeline)?;
        Ok(())
    }

    /// Completion query.
    ///
    /// `sub = Some(key)` asks about one condition. `sub = None` asks whether
    /// the stage as a whole is done for the item, which for a multi-condition
    /// stage means every declared condition is recorded.
    pub fn is_complete(&self, stage: &str, item: &str, sub: Option<&str>) -> bool {
        match sub {
            Some(_) => self.record.is_complete(stage, item, sub),
            None => self.is_stage_complete(stage, item),
        }
    }

    pub fn is_stage_complete(&self, stage: &str, item: &str) -> bool {
        let Some(descriptor) = self.pipeline.stage(stage) else {
            return false;
        };
        match descriptor.kind() {
            StageKind::Single => self.record.is_complete(stage, item, None),
            StageKind::Multi => match self.record.completed_conditions(stage, item) {
                Some(done) => descriptor.condition_keys().all(|k| done.contains(k)),
                None => false,
            },
        }
    }

    /// Whether every stage of the pipeline is done for the item.
    pub fn is_pipeline_complete(&self, item: &str) -> bool {
        self.pipeline
            .stages()
            .iter()
            .all(|s| self.is_stage_complete(&s.name, item))
    }

    pub fn completed_conditions(&self, stage: &str, item: &str) -> BTreeSet<ConditionKey> {
        self.record
            .completed_conditions(stage, item)
            .cloned()
            .unwrap_or_default()
    }

    /// Record one unit of progress and persist it.
    pub fn mark_complete(&mut self, stage: &str, item: &str, sub: Option<&str>) -> Result<()> {
        let changed = self.update(|record| record.mark_complete(stage, item, sub))?;
        debug!(stage, item, condition = ?sub, changed, "checkpoint marked complete");
        Ok(())
    }

    /// Remove the item from `stage` and every stage downstream of it.
    ///
    /// Returns the stages the item was actually removed from.
    pub fn invalidate(&mut self, stage: &str, item: &str) -> Result<Vec<StageName>> {
        let mut targets = vec![stage.to_string()];
        targets.extend(self.pipeline.downstream_of(stage));
        self.remove_from(&targets, item)
    }

    /// Remove the item from every stage downstream of `stage`, keeping
    /// `stage` itself untouched.
    pub fn invalidate_downstream(&mut self, stage: &str, item: &str) -> Result<Vec<StageName>> {
        let targets = self.pipeline.downstream_of(stage);
        self.remove_from(&targets, item)
    }

    fn remove_from(&mut self, targets: &[StageName], item: &str) -> Result<Vec<StageName>> {
        let removed = self.update(|record| {
            Ok(targets
                .iter()
                .filter(|stage| record.remove_item(stage, item))
                .cloned()
                .collect::<Vec<_>>())
        })?;
        if !removed.is_empty() {
            info!(item, stages = ?removed, "checkpoint entries invalidated");
        }
        Ok(removed)
    }

    /// Read-merge-write around a record mutation.
    fn update<T>(&mut self, apply: impl FnOnce(&mut CheckpointRecord) -> Result<T>) -> Result<T> {
        let mut fresh = load(&self.path, &self.pipeline)?;
        let out = apply(&mut fresh)?;
        save(&self.path, &fresh)?;
        self.record = fresh;
        Ok(out)
    }
}
