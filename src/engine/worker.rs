// src/engine/worker.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::checkpoint::CheckpointStore;
use crate::claim::{ClaimState, ShardSpec, WorkClaimer};
use crate::compile::table;
use crate::engine::summary::RunSummary;
use crate::errors::{PipeshardError, Result};
use crate::exec::ExternalTool;
use crate::items::WorkItem;
use crate::layout::Layout;
use crate::pipeline::Pipeline;
use crate::rollback::RollbackCoordinator;
use crate::stage::{CompileStatus, StageOutcome, StageRunner};

/// One worker process: drives the items of one shard through the pipeline.
///
/// Items are processed one at a time and, within an item, stages run in
/// pipeline order. A failing item never stops the others; only errors that
/// make the checkpoint untrustworthy abort the run.
pub struct Worker {
    pipeline: Arc<Pipeline>,
    layout: Layout,
    shard: ShardSpec,
    runner: StageRunner,
    claimer: WorkClaimer,
    rollback: RollbackCoordinator,
    sweep_stale_claims: bool,
}

impl Worker {
    pub fn new(
        pipeline: Arc<Pipeline>,
        layout: Layout,
        shard: ShardSpec,
        tool: Arc<dyn ExternalTool>,
        vars: BTreeMap<String, String>,
    ) -> Self {
        let claimer = WorkClaimer::new(layout.claims_dir(), shard);
        let runner = StageRunner::new(layout.clone(), tool, vars);
        Self {
            pipeline,
            layout,
            shard,
            runner,
            claimer,
            rollback: RollbackCoordinator::new(),
            sweep_stale_claims: false,
        }
    }

    /// Return this shard's stuck claims to the unclaimed state before running.
    pub fn with_stale_claim_sweep(mut self, enabled: bool) -> Self {
        self.sweep_stale_claims = enabled;
        self
    }

    pub fn shard(&self) -> ShardSpec {
        self.shard
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub async fn run(&self, items: &[WorkItem]) -> Result<RunSummary> {
        let mine = self.shard.select(items);
        info!(
            shard = %self.shard,
            items = mine.len(),
            total = items.len(),
            "worker starting"
        );

        let mut store = CheckpointStore::open(
            self.layout.checkpoint_path(self.shard),
            Arc::clone(&self.pipeline),
        )?;
        self.rollback
            .sweep(&mut store, mine.iter().map(|item| item.id.as_str()))?;

        if self.sweep_stale_claims {
            self.claimer
                .sweep_stale(mine.iter().map(|item| item.id.as_str()))?;
        }

        let mut summary = RunSummary::new();
        for item in &mine {
            self.process_item(&mut store, item, &mut summary).await?;
        }

        self.write_shard_tables(&store, &mine)?;

        info!(
            shard = %self.shard,
            succeeded = summary.succeeded.len(),
            failed = summary.failed.len(),
            skipped = summary.skipped.len(),
            invocations = summary.invocations,
            "worker finished"
        );
        Ok(summary)
    }

    async fn process_item(
        &self,
        store: &mut CheckpointStore,
        item: &WorkItem,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let id = item.id.as_str();

        if self.is_finalized(store, id) {
            self.report_exclusions(id, summary);
            if !summary.is_failed(id) {
                summary.record_success(id);
            }
            return Ok(());
        }

        if self.claimer.state(id) == ClaimState::Claimed {
            warn!(item = id, "item is already claimed; run with --sweep-stale-claims to retry it");
            summary.record_failure(id, None, PipeshardError::StaleClaim { item: id.to_string() });
            return Ok(());
        }

        self.claimer.offer(id)?;
        if !self.claimer.claim(id)? {
            summary.record_skip(id);
            return Ok(());
        }
        // Another worker of this shard may have finished stages since we
        // loaded the checkpoint.
        store.reload()?;

        for stage in self.pipeline.stages() {
            match self.runner.run(store, stage, item).await {
                Ok(StageOutcome::Skipped) => {
                    if let Some(e) = self.runner.exclusion(stage, id) {
                        summary.record_failure(id, Some(stage.name.as_str()), e);
                    }
                }
                Ok(StageOutcome::Completed {
                    invocations,
                    compile,
                }) => {
                    summary.invocations += invocations;
                    if let CompileStatus::Excluded(e) = compile {
                        summary.record_failure(id, Some(stage.name.as_str()), e);
                    }
                }
                Ok(StageOutcome::Failed {
                    invocations,
                    failures,
                    ..
                }) => {
                    summary.invocations += invocations;
                    for failure in failures {
                        summary.record_failure(id, Some(stage.name.as_str()), failure);
                    }
                    break;
                }
                Err(e) if e.is_worker_fatal() => {
                    error!(item = id, stage = %stage.name, error = %e, "worker-level failure");
                    return Err(e);
                }
                Err(e) => {
                    warn!(item = id, stage = %stage.name, error = %e, "item failed");
                    summary.record_failure(id, Some(stage.name.as_str()), e);
                    break;
                }
            }
        }

        if self.is_finalized(store, id) {
            self.claimer.release(id)?;
        } else {
            self.claimer.relinquish(id)?;
        }
        if !summary.is_failed(id) {
            summary.record_success(id);
        }
        Ok(())
    }

    /// Every stage is recorded and bundled for `item`.
    fn is_finalized(&self, store: &CheckpointStore, item: &str) -> bool {
        self.pipeline
            .stages()
            .iter()
            .all(|stage| self.runner.is_finalized(store, &stage.name, item))
    }

    fn report_exclusions(&self, item: &str, summary: &mut RunSummary) {
        for stage in self.pipeline.stages() {
            if let Some(e) = self.runner.exclusion(stage, item) {
                summary.record_failure(item, Some(stage.name.as_str()), e);
            }
        }
    }

    /// Merge the per-item result tables of every compiled stage, in input
    /// order.
    fn write_shard_tables(&self, store: &CheckpointStore, items: &[&WorkItem]) -> Result<()> {
        for stage in self.pipeline.stages() {
            let Some(compile) = &stage.compile else {
                continue;
            };
            let sources: Vec<PathBuf> = items
                .iter()
                .filter(|item| self.runner.is_finalized(store, &stage.name, &item.id))
                .filter(|item| {
                    !self
                        .layout
                        .exclusion_marker_path(&item.id, &stage.name)
                        .exists()
                })
                .map(|item| self.layout.item_table_path(&item.id, &stage.name))
                .collect();
            let target = self.layout.shard_table_path(&stage.name, self.shard);
            let merged = table::merge(&target, &compile.derived_column, &sources)?;
            info!(stage = %stage.name, tables = merged, path = ?target, "shard result table written");
        }
        Ok(())
    }
}
