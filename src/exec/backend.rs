// src/exec/backend.rs

//! Pluggable external tool abstraction.
//!
//! The stage runner talks to an `ExternalTool` instead of spawning processes
//! itself, so tests can swap in a scripted tool that writes the expected
//! artifacts without any real binary.
//!
//! - `ProcessTool` is the production implementation. It runs the program
//!   directly (no shell) and waits for it to exit.
//! - Tests provide their own `ExternalTool` that records invocations.

use std::fs::File;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;

use anyhow::Context;
use tokio::process::Command;
use tracing::{debug, info};

use crate::errors::Result;

/// One fully rendered command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    /// File stem for the captured output, relative to `working_dir`.
    pub log_stem: String,
}

impl Invocation {
    pub fn stdout_path(&self) -> PathBuf {
        self.working_dir.join(format!("{}.out", self.log_stem))
    }

    pub fn stderr_path(&self) -> PathBuf {
        self.working_dir.join(format!("{}.err", self.log_stem))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Trait abstracting how an external executable is run.
///
/// Implementations do not retry; a failed invocation is reported as-is and
/// the caller decides what to do with it.
pub trait ExternalTool: Send + Sync {
    fn run<'a>(
        &'a self,
        invocation: &'a Invocation,
    ) -> Pin<Box<dyn Future<Output = Result<ToolOutput>> + Send + 'a>>;
}

/// Runs real OS processes with `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessTool;

impl ExternalTool for ProcessTool {
    fn run<'a>(
        &'a self,
        invocation: &'a Invocation,
    ) -> Pin<Box<dyn Future<Output = Result<ToolOutput>> + Send + 'a>> {
        Box::pin(async move {
            let stdout_path = invocation.stdout_path();
            let stderr_path = invocation.stderr_path();
            let stdout = File::create(&stdout_path)
                .with_context(|| format!("creating {}", stdout_path.display()))?;
            let stderr = File::create(&stderr_path)
                .with_context(|| format!("creating {}", stderr_path.display()))?;

            info!(
                program = %invocation.program,
                args = ?invocation.args,
                cwd = %invocation.working_dir.display(),
                "starting external tool"
            );

            let status = Command::new(&invocation.program)
                .args(&invocation.args)
                .current_dir(&invocation.working_dir)
                .stdin(Stdio::null())
                .stdout(Stdio::from(stdout))
                .stderr(Stdio::from(stderr))
                .kill_on_drop(true)
                .status()
                .await
                .with_context(|| format!("spawning '{}'", invocation.program))?;

            let exit_code = status.code();
            debug!(
                program = %invocation.program,
                exit_code = ?exit_code,
                success = status.success(),
                "external tool exited"
            );

            Ok(ToolOutput {
                exit_code,
                stdout_path,
                stderr_path,
            })
        })
    }
}
