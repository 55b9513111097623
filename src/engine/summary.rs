// src/engine/summary.rs

//! Per-run outcome report.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::errors::PipeshardError;
use crate::types::{ItemId, StageName};

/// Exit code when every item of the shard succeeded.
pub const EXIT_OK: i32 = 0;
/// Exit code for a worker-level error (corrupt checkpoint, bad config, ...).
pub const EXIT_WORKER_ERROR: i32 = 1;
/// Exit code when at least one item failed in a way a re-run will not fix.
pub const EXIT_ITEM_FAILED: i32 = 2;
/// Exit code when every failure is retryable.
pub const EXIT_RETRYABLE: i32 = 3;

#[derive(Debug)]
pub struct ItemFailure {
    pub stage: Option<StageName>,
    pub error: PipeshardError,
}

impl ItemFailure {
    pub fn retryable(&self) -> bool {
        self.error.is_retryable()
    }
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.stage {
            Some(stage) => write!(f, "[{stage}] {}", self.error),
            None => write!(f, "{}", self.error),
        }
    }
}

/// Disjoint sets of succeeded, failed and skipped items.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub succeeded: BTreeSet<ItemId>,
    pub failed: BTreeMap<ItemId, Vec<ItemFailure>>,
    /// Items another worker claimed first.
    pub skipped: BTreeSet<ItemId>,
    /// External tool invocations performed during the run.
    pub invocations: usize,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self, item: &str) {
        self.succeeded.insert(item.to_string());
    }

    pub fn record_failure(&mut self, item: &str, stage: Option<&str>, error: PipeshardError) {
        self.failed
            .entry(item.to_string())
            .or_default()
            .push(ItemFailure {
                stage: stage.map(str::to_string),
                error,
            });
    }

    pub fn record_skip(&mut self, item: &str) {
        self.skipped.insert(item.to_string());
    }

    pub fn is_failed(&self, item: &str) -> bool {
        self.failed.contains_key(item)
    }

    pub fn exit_code(&self) -> i32 {
        if self.failed.is_empty() {
            EXIT_OK
        } else if self.failed.values().flatten().all(ItemFailure::retryable) {
            EXIT_RETRYABLE
        } else {
            EXIT_ITEM_FAILED
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "succeeded: {}  failed: {}  skipped: {}  invocations: {}",
            self.succeeded.len(),
            self.failed.len(),
            self.skipped.len(),
            self.invocations
        )?;
        for (item, failures) in &self.failed {
            for failure in failures {
                writeln!(f, "  failed {item}: {failure}")?;
            }
        }
        for item in &self.skipped {
            writeln!(f, "  skipped {item}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transient(item: &str) -> PipeshardError {
        PipeshardError::TransientToolFailure {
            item: item.into(),
            stage: "s".into(),
            unit: "u".into(),
            reason: "exit 1".into(),
        }
    }

    #[test]
    fn exit_codes() {
        let mut summary = RunSummary::new();
        summary.record_success("a");
        assert_eq!(summary.exit_code(), EXIT_OK);

        summary.record_failure("b", Some("s"), transient("b"));
        assert_eq!(summary.exit_code(), EXIT_RETRYABLE);

        summary.record_failure("c", None, PipeshardError::StaleClaim { item: "c".into() });
        assert_eq!(summary.exit_code(), EXIT_ITEM_FAILED);
    }
}
