// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::loader::default_config_path;

/// Command-line arguments for `pipeshard`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "pipeshard",
    version,
    about = "Drive a batch of work items through a checkpointed pipeline of external tools.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Pipeshard.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value_os_t = default_config_path())]
    pub config: PathBuf,

    /// JSON file with the work items.
    #[arg(long, value_name = "PATH")]
    pub items: PathBuf,

    /// Override `config.output_root`.
    #[arg(long, value_name = "DIR")]
    pub output_root: Option<PathBuf>,

    /// Override `config.scratch_root`.
    #[arg(long, value_name = "DIR")]
    pub scratch_root: Option<PathBuf>,

    /// Extra template variable; may be repeated. Wins over `[vars]`.
    #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub vars: Vec<(String, String)>,

    /// Index of this worker's shard.
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub shard_index: usize,

    /// Total number of shards.
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub shard_count: usize,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PIPESHARD_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Validate, print the pipeline and this shard's items, run nothing.
    #[arg(long)]
    pub dry_run: bool,

    /// Return this shard's claimed descriptors to the unclaimed state first.
    ///
    /// Only safe when no other worker of the same shard is running.
    #[arg(long)]
    pub sweep_stale_claims: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    if key.is_empty() {
        return Err(format!("empty key in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
