// src/stage/runner.rs

//! Running one stage for one item.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::bundle::BundleBuilder;
use crate::checkpoint::CheckpointStore;
use crate::compile::{ConditionOutputs, ResultCompiler, table};
use crate::errors::{PipeshardError, Result};
use crate::exec::{ExternalTool, Invocation};
use crate::items::WorkItem;
use crate::layout::Layout;
use crate::pipeline::{Condition, StageDescriptor};
use crate::rollback::RollbackCoordinator;
use crate::stage::workspace::{ScratchWorkspace, match_files};
use crate::template::Vars;
use crate::types::{StageKind, StageName};

/// What happened to the optional compile step of a completed stage.
#[derive(Debug)]
pub enum CompileStatus {
    NotConfigured,
    Written { rows: usize },
    /// The item is left out of the result tables.
    Excluded(PipeshardError),
}

#[derive(Debug)]
pub enum StageOutcome {
    /// Already complete in the checkpoint and bundled; nothing was run.
    Skipped,
    Completed {
        invocations: usize,
        compile: CompileStatus,
    },
    /// At least one unit failed. Completed units stay recorded; the
    /// workspace and the copied artifacts are left on disk.
    Failed {
        invocations: usize,
        failures: Vec<PipeshardError>,
        invalidated: Vec<StageName>,
    },
}

impl StageOutcome {
    pub fn invocations(&self) -> usize {
        match self {
            StageOutcome::Skipped => 0,
            StageOutcome::Completed { invocations, .. } | StageOutcome::Failed { invocations, .. } => {
                *invocations
            }
        }
    }
}

/// A unit of work inside a stage: one condition, or the stage as a whole.
struct Unit<'a> {
    condition: Option<&'a Condition>,
}

impl Unit<'_> {
    fn label<'s>(&'s self, stage: &'s str) -> &'s str {
        self.condition.map(|c| c.key.as_str()).unwrap_or(stage)
    }

    fn key(&self) -> Option<&str> {
        self.condition.map(|c| c.key.as_str())
    }
}

pub struct StageRunner {
    layout: Layout,
    tool: Arc<dyn ExternalTool>,
    globals: BTreeMap<String, String>,
    rollback: RollbackCoordinator,
}

impl StageRunner {
    pub fn new(layout: Layout, tool: Arc<dyn ExternalTool>, globals: BTreeMap<String, String>) -> Self {
        Self {
            layout,
            tool,
            globals,
            rollback: RollbackCoordinator::new(),
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Variables shared by every unit of `stage` for `item`.
    pub fn stage_vars(&self, stage: &StageDescriptor, item: &WorkItem) -> Vars {
        let mut vars = Vars::new();
        for (key, value) in &self.globals {
            vars.set(key.clone(), value.clone());
        }
        let mut item_vars = item.template_vars();
        item_vars
            .set("stage", stage.name.clone())
            .set(
                "workspace",
                self.layout.workspace(&stage.name, &item.id).display().to_string(),
            )
            .set("item_dir", self.layout.item_dir(&item.id).display().to_string());
        vars.merge(item_vars);
        vars
    }

    fn unit_vars(base: &Vars, condition: Option<&Condition>) -> Vars {
        let mut vars = base.clone();
        if let Some(condition) = condition {
            vars.set("condition", condition.key.clone())
                .extend_prefixed("condition", &condition.params);
        }
        vars
    }

    /// Run `stage` for `item`, resuming from whatever the checkpoint already
    /// records.
    ///
    /// Per-unit failures are reported in [`StageOutcome::Failed`]; an `Err`
    /// means the stage could not be attempted at all (ordering, missing
    /// inputs, templates) or the checkpoint could not be persisted.
    pub async fn run(
        &self,
        store: &mut CheckpointStore,
        stage: &StageDescriptor,
        item: &WorkItem,
    ) -> Result<StageOutcome> {
        let item_id = item.id.as_str();
        if store.is_stage_complete(&stage.name, item_id) {
            if self.is_finalized(store, &stage.name, item_id) {
                debug!(item = item_id, stage = %stage.name, "stage already complete; skipping");
                return Ok(StageOutcome::Skipped);
            }
            // Every unit is recorded but the attempt died before its bundle
            // was written.
            warn!(item = item_id, stage = %stage.name, "stage complete but not bundled; finishing");
            let workspace = ScratchWorkspace::reopen(self.layout.workspace(&stage.name, item_id));
            let base = self.stage_vars(stage, item);
            let compile = self.finish(stage, item, &base, workspace)?;
            return Ok(StageOutcome::Completed {
                invocations: 0,
                compile,
            });
        }

        if let Some(upstream) = &stage.upstream {
            if !store.is_stage_complete(upstream, item_id) {
                return Err(PipeshardError::OrderingViolation {
                    item: item.id.clone(),
                    stage: stage.name.clone(),
                    upstream: upstream.clone(),
                });
            }
        }

        let item_dir = self.layout.item_dir(item_id);
        std::fs::create_dir_all(&item_dir)?;
        crate::fs::remove_file_if_exists(&self.layout.bundle_path(item_id, &stage.name))?;
        let workspace = ScratchWorkspace::fresh(self.layout.workspace(&stage.name, item_id))?;
        let base = self.stage_vars(stage, item);

        for pattern in &stage.consume {
            let (rendered, files) = match_files(&item_dir, pattern, &base)?;
            if files.is_empty() {
                return Err(PipeshardError::MissingUpstreamArtifact {
                    item: item.id.clone(),
                    stage: stage.name.clone(),
                    pattern: rendered,
                });
            }
            for rel in &files {
                workspace.import(&item_dir, rel)?;
            }
        }

        let units: Vec<Unit<'_>> = match stage.kind() {
            StageKind::Single => vec![Unit { condition: None }],
            StageKind::Multi => {
                let done = store.completed_conditions(&stage.name, item_id);
                stage
                    .conditions
                    .iter()
                    .filter(|c| !done.contains(&c.key))
                    .map(|c| Unit { condition: Some(c) })
                    .collect()
            }
        };

        info!(
            item = item_id,
            stage = %stage.name,
            units = units.len(),
            "running stage"
        );

        let mut invocations = 0;
        let mut failures = Vec::new();
        for unit in &units {
            let vars = Self::unit_vars(&base, unit.condition);
            let label = unit.label(&stage.name);

            for input in &stage.inputs {
                workspace.render_input(input, &vars, &stage.parameters)?;
            }

            match self
                .run_unit(stage, &workspace, &vars, label, &mut invocations)
                .await?
            {
                Ok(artifacts) => {
                    for rel in &artifacts {
                        workspace.export(rel, &item_dir)?;
                    }
                    store.mark_complete(&stage.name, item_id, unit.key())?;
                    info!(item = item_id, stage = %stage.name, condition = ?unit.key(), "unit complete");
                }
                Err(reason) => {
                    warn!(
                        item = item_id,
                        stage = %stage.name,
                        condition = ?unit.key(),
                        reason = %reason,
                        "unit failed"
                    );
                    failures.push(PipeshardError::TransientToolFailure {
                        item: item.id.clone(),
                        stage: stage.name.clone(),
                        unit: label.to_string(),
                        reason,
                    });
                }
            }
        }

        if !failures.is_empty() {
            let invalidated = self.rollback.roll_back(store, &stage.name, item_id)?;
            return Ok(StageOutcome::Failed {
                invocations,
                failures,
                invalidated,
            });
        }

        let compile = self.finish(stage, item, &base, workspace)?;
        info!(item = item_id, stage = %stage.name, invocations, "stage complete");
        Ok(StageOutcome::Completed {
            invocations,
            compile,
        })
    }

    /// Run every command of one unit and check its artifacts.
    ///
    /// The inner `Err` is a unit failure reason; the outer one is an error
    /// that aborts the whole stage attempt.
    async fn run_unit(
        &self,
        stage: &StageDescriptor,
        workspace: &ScratchWorkspace,
        vars: &Vars,
        label: &str,
        invocations: &mut usize,
    ) -> Result<std::result::Result<Vec<PathBuf>, String>> {
        for (n, command) in stage.commands.iter().enumerate() {
            let invocation = Invocation {
                program: command.program.render_line(vars)?,
                args: command
                    .args
                    .iter()
                    .map(|a| a.render_line(vars))
                    .collect::<Result<Vec<_>>>()?,
                working_dir: workspace.path().to_path_buf(),
                log_stem: if label == stage.name {
                    format!("{}.{n}", stage.name)
                } else {
                    format!("{}.{label}.{n}", stage.name)
                },
            };

            *invocations += 1;
            match self.tool.run(&invocation).await {
                Ok(output) if output.success() => {}
                Ok(output) => {
                    let code = output
                        .exit_code
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "signal".to_string());
                    return Ok(Err(format!(
                        "'{}' exited with {code} (see {})",
                        invocation.program,
                        output.stderr_path.display()
                    )));
                }
                Err(e) => return Ok(Err(e.to_string())),
            }
        }

        let mut artifacts = Vec::new();
        for pattern in &stage.artifacts {
            let (rendered, files) = match_files(workspace.path(), pattern, vars)?;
            if files.is_empty() {
                return Ok(Err(format!("no artifact matching '{rendered}'")));
            }
            artifacts.extend(files);
        }
        artifacts.sort();
        artifacts.dedup();
        Ok(Ok(artifacts))
    }

    /// Every unit of `stage` is recorded and its bundle is on disk.
    pub fn is_finalized(&self, store: &CheckpointStore, stage: &str, item: &str) -> bool {
        store.is_stage_complete(stage, item) && self.layout.bundle_path(item, stage).is_file()
    }

    /// Why `item` was left out of the compiled results of `stage`, if it was.
    ///
    /// Read back from the marker `finish` leaves next to the bundle, so an
    /// excluded item keeps being reported on later runs.
    pub fn exclusion(&self, stage: &StageDescriptor, item: &str) -> Option<PipeshardError> {
        stage.compile.as_ref()?;
        let path = self.layout.exclusion_marker_path(item, &stage.name);
        match std::fs::read_to_string(&path) {
            Ok(reason) => Some(PipeshardError::ExcludedFromResults {
                item: item.to_string(),
                stage: stage.name.clone(),
                reason: reason.trim().to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => Some(PipeshardError::IoError(e)),
        }
    }

    /// Everything after the last unit succeeded: compile, bundle, clean up.
    fn finish(
        &self,
        stage: &StageDescriptor,
        item: &WorkItem,
        base: &Vars,
        workspace: ScratchWorkspace,
    ) -> Result<CompileStatus> {
        let item_dir = self.layout.item_dir(&item.id);

        let mut outputs = Vec::new();
        if stage.kind() == StageKind::Multi {
            for condition in &stage.conditions {
                let vars = Self::unit_vars(base, Some(condition));
                let mut files = Vec::new();
                for pattern in &stage.artifacts {
                    files.extend(match_files(&item_dir, pattern, &vars)?.1);
                }
                files.sort();
                files.dedup();
                outputs.push(ConditionOutputs {
                    condition: condition.key.clone(),
                    files,
                });
            }
        }

        let compile = match &stage.compile {
            None => CompileStatus::NotConfigured,
            Some(cfg) => {
                let compiler = ResultCompiler::new(cfg.clone())?;
                let absolute: Vec<ConditionOutputs> = outputs
                    .iter()
                    .map(|o| ConditionOutputs {
                        condition: o.condition.clone(),
                        files: o.files.iter().map(|f| item_dir.join(f)).collect(),
                    })
                    .collect();
                let table_path = self.layout.item_table_path(&item.id, &stage.name);
                let marker = self.layout.exclusion_marker_path(&item.id, &stage.name);
                match compiler.compile_item(&item.id, &absolute) {
                    Ok(rows) => {
                        table::write(&table_path, compiler.derived_column(), &rows)?;
                        crate::fs::remove_file_if_exists(&marker)?;
                        CompileStatus::Written { rows: rows.len() }
                    }
                    Err(e) => {
                        warn!(item = %item.id, stage = %stage.name, error = %e, "item excluded from results");
                        crate::fs::atomic_write(&marker, format!("{e}\n").as_bytes())?;
                        crate::fs::remove_file_if_exists(&table_path)?;
                        CompileStatus::Excluded(e)
                    }
                }
            }
        };

        let mut bundle = BundleBuilder::new();
        bundle.add_tree("workspace", workspace.path())?;
        for output in &outputs {
            for rel in &output.files {
                bundle.add(
                    format!("artifacts/{}", rel.to_string_lossy().replace('\\', "/")),
                    item_dir.join(rel),
                );
            }
        }
        if matches!(compile, CompileStatus::Written { .. }) {
            let table_path = self.layout.item_table_path(&item.id, &stage.name);
            let name = table_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| format!("{}_results.csv", stage.name));
            bundle.add(name, table_path);
        }
        bundle.write(&self.layout.bundle_path(&item.id, &stage.name))?;

        for output in &outputs {
            for rel in &output.files {
                crate::fs::remove_file_if_exists(&item_dir.join(rel))?;
            }
        }
        workspace.remove()?;
        Ok(compile)
    }
}
