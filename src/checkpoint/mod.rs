// src/checkpoint/mod.rs

//! Durable completion state.
//!
//! - [`record`] defines the typed record and its JSON schema.
//! - [`store`] loads, queries and atomically persists it.

pub mod record;
pub mod store;

pub use record::{CheckpointRecord, StageProgress};
pub use store::{CheckpointStore, load, save};
