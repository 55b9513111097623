// src/exec/mod.rs

//! External tool execution.
//!
//! - [`backend`] defines the [`ExternalTool`] seam and the process-backed
//!   implementation used in production.

pub mod backend;

pub use backend::{ExternalTool, Invocation, ProcessTool, ToolOutput};
