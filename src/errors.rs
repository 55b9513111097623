// src/errors.rs

//! Crate-wide error type and helpers.
//!
//! Variants carry the item, stage and cause so that the worker can log and
//! report every failure without losing context.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{ItemId, StageName};

#[derive(Error, Debug)]
pub enum PipeshardError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Cycle detected in stage graph: {0}")]
    StageCycle(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Invalid work item: {0}")]
    InvalidItem(String),

    #[error("checkpoint {path:?} is corrupt: {reason}")]
    CheckpointCorruption { path: PathBuf, reason: String },

    #[error("failed to persist checkpoint {path:?}: {source}")]
    CheckpointWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("item '{item}': stage '{stage}' requires upstream stage '{upstream}' to be complete")]
    OrderingViolation {
        item: ItemId,
        stage: StageName,
        upstream: StageName,
    },

    #[error("item '{item}': stage '{stage}' unit '{unit}' failed: {reason}")]
    TransientToolFailure {
        item: ItemId,
        stage: StageName,
        unit: String,
        reason: String,
    },

    #[error("item '{item}': stage '{stage}' found no upstream artifact matching '{pattern}'")]
    MissingUpstreamArtifact {
        item: ItemId,
        stage: StageName,
        pattern: String,
    },

    #[error("item '{item}': condition '{condition}' has no row at parameter value {value}")]
    MissingReferencePoint {
        item: ItemId,
        condition: String,
        value: f64,
    },

    #[error("item '{item}': excluded from the '{stage}' results: {reason}")]
    ExcludedFromResults {
        item: ItemId,
        stage: StageName,
        reason: String,
    },

    #[error("cannot parse result file {path:?}: {reason}")]
    ResultParse { path: PathBuf, reason: String },

    #[error("item '{item}': claim descriptor is stuck in the claimed state")]
    StaleClaim { item: ItemId },

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipeshardError {
    /// Errors that must stop the whole worker rather than a single item.
    pub fn is_worker_fatal(&self) -> bool {
        matches!(
            self,
            PipeshardError::CheckpointCorruption { .. } | PipeshardError::CheckpointWrite { .. }
        )
    }

    /// Whether a later sweep may succeed where this attempt failed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipeshardError::TransientToolFailure { .. } | PipeshardError::IoError(_)
        )
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, PipeshardError>;
