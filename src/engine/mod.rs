// src/engine/mod.rs

//! Worker orchestration.
//!
//! - [`worker`] runs the shard's items through the pipeline: startup sweep,
//!   claiming, stage execution, claim release and shard result tables.
//! - [`summary`] collects the per-item outcome and maps it to an exit code.

pub mod summary;
pub mod worker;

pub use summary::{ItemFailure, RunSummary};
pub use worker::Worker;
