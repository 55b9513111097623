// src/lib.rs

pub mod bundle;
pub mod checkpoint;
pub mod claim;
pub mod cli;
pub mod compile;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod items;
pub mod layout;
pub mod logging;
pub mod pipeline;
pub mod rollback;
pub mod stage;
pub mod template;
pub mod types;

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::claim::ShardSpec;
use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::engine::Worker;
use crate::exec::ProcessTool;
use crate::items::{WorkItem, load_items};
use crate::layout::Layout;
use crate::pipeline::Pipeline;

/// High-level entry point used by `main.rs`.
///
/// Loads and validates the config and the item list, then runs this shard's
/// items through the pipeline. Returns the process exit code for the run;
/// an `Err` is a worker-level failure.
pub async fn run(args: CliArgs) -> Result<i32> {
    let mut cfg = load_and_validate(&args.config)?;
    cfg.apply_overrides(
        args.output_root.clone(),
        args.scratch_root.clone(),
        args.vars.iter().cloned(),
    );

    let pipeline = Arc::new(Pipeline::from_config(&cfg)?);
    let items = load_items(&args.items)?;
    let shard = ShardSpec::new(args.shard_index, args.shard_count)?;
    let layout = Layout::from_config(&cfg.config);

    if args.dry_run {
        print_dry_run(&cfg, &pipeline, &items, shard);
        return Ok(engine::summary::EXIT_OK);
    }

    info!(
        config = %args.config.display(),
        stages = pipeline.stages().len(),
        items = items.len(),
        shard = %shard,
        "pipeshard starting"
    );

    let worker = Worker::new(pipeline, layout, shard, Arc::new(ProcessTool), cfg.vars.clone())
        .with_stale_claim_sweep(args.sweep_stale_claims);
    let summary = worker.run(&items).await?;

    print!("{summary}");
    Ok(summary.exit_code())
}

/// Print stages, their settings and this shard's items.
fn print_dry_run(cfg: &ConfigFile, pipeline: &Pipeline, items: &[WorkItem], shard: ShardSpec) {
    println!("pipeshard dry-run");
    println!("  config.output_root = {}", cfg.config.output_root.display());
    if let Some(scratch) = &cfg.config.scratch_root {
        println!("  config.scratch_root = {}", scratch.display());
    }
    println!();

    println!("stages ({}):", pipeline.stages().len());
    for stage in pipeline.stages() {
        println!("  - {} ({})", stage.name, stage.kind());
        if let Some(upstream) = &stage.upstream {
            println!("      after: {upstream}");
        }
        for command in &stage.commands {
            let args: Vec<_> = command.args.iter().map(|a| a.source()).collect();
            println!("      run: {} {}", command.program.source(), args.join(" "));
        }
        if !stage.conditions.is_empty() {
            let keys: Vec<_> = stage.condition_keys().collect();
            println!("      conditions: {}", keys.join(", "));
        }
        if !stage.parameters.is_empty() {
            println!("      parameters: {:?}", stage.parameters);
        }
        if let Some(compile) = &stage.compile {
            println!(
                "      compile: {} -> {} at {} (from {} and {})",
                compile.metric, compile.derived_column, compile.reference, compile.low, compile.high
            );
        }
    }
    println!();

    let mine = shard.select(items);
    println!("shard {shard}: {} of {} item(s)", mine.len(), items.len());
    for item in mine {
        println!("  - {} (#{})", item.id, item.index);
    }

    debug!("dry-run complete (no execution)");
}
