// src/stage/mod.rs

//! Stage execution.
//!
//! - [`runner`] drives one stage for one item: ordering check, fresh
//!   workspace, inputs, external tool invocations, artifact relocation,
//!   checkpointing, compilation and bundling.
//! - [`workspace`] owns the scratch directory and glob matching.

pub mod runner;
pub mod workspace;

pub use runner::{CompileStatus, StageOutcome, StageRunner};
pub use workspace::ScratchWorkspace;
