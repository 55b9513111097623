// src/rollback.rs

//! Restoring the checkpoint ordering invariant.
//!
//! Completion of a stage implies completion of its upstream stage, and
//! completion of a multi-condition stage implies every declared condition is
//! done. When a stage fails part way, or a record is found that breaks
//! either rule, every stage downstream of the incomplete one is invalidated
//! for that item. Conditions that did complete are kept so a later run only
//! redoes the outstanding ones.

use tracing::{info, warn};

use crate::checkpoint::CheckpointStore;
use crate::errors::Result;
use crate::types::{ItemId, StageName};

#[derive(Debug, Clone, Copy, Default)]
pub struct RollbackCoordinator;

impl RollbackCoordinator {
    pub fn new() -> Self {
        Self
    }

    /// Called after `stage` failed for `item` with some units outstanding.
    ///
    /// Returns the downstream stages the item was removed from.
    pub fn roll_back(
        &self,
        store: &mut CheckpointStore,
        stage: &str,
        item: &str,
    ) -> Result<Vec<StageName>> {
        if store.is_stage_complete(stage, item) {
            return Ok(Vec::new());
        }
        let removed = store.invalidate_downstream(stage, item)?;
        if !removed.is_empty() {
            warn!(item, stage, invalidated = ?removed, "downstream progress rolled back");
        }
        Ok(removed)
    }

    /// Repair every item: any stage holding progress while its upstream is
    /// incomplete is invalidated together with its own downstream stages.
    ///
    /// Returns the items that were touched and the stages removed for each.
    pub fn sweep<'a>(
        &self,
        store: &mut CheckpointStore,
        items: impl IntoIterator<Item = &'a str>,
    ) -> Result<Vec<(ItemId, Vec<StageName>)>> {
        let order: Vec<(StageName, Option<StageName>)> = store
            .pipeline()
            .stages()
            .iter()
            .map(|s| (s.name.clone(), s.upstream.clone()))
            .collect();

        let mut repaired = Vec::new();
        for item in items {
            let mut removed = Vec::new();
            for (stage, upstream) in &order {
                let Some(upstream) = upstream else { continue };
                let has_progress = store
                    .record()
                    .stage(stage)
                    .is_some_and(|p| p.has_item(item));
                if has_progress && !store.is_stage_complete(upstream, item) {
                    removed.extend(store.invalidate(stage, item)?);
                }
            }
            if !removed.is_empty() {
                info!(item, invalidated = ?removed, "inconsistent checkpoint entries repaired");
                repaired.push((item.to_string(), removed));
            }
        }
        Ok(repaired)
    }
}
