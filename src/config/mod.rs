// src/config/mod.rs

//! Configuration loading and validation.
//!
//! - `model.rs`: the TOML-backed data model.
//! - `loader.rs`: reading a config file from disk.
//! - `validate.rs`: stage graph and per-stage invariants.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    CompileConfig, ConditionConfig, ConfigFile, ConfigSection, InputFileConfig, RawConfigFile,
    RunConfig, StageConfig,
};
