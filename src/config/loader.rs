// src/config/loader.rs

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{PipeshardError, Result};

/// Read and deserialize a pipeline config without semantic checks.
///
/// Unknown keys are already rejected here by `deny_unknown_fields`.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => {
            PipeshardError::ConfigError(format!("config file {} not found", path.display()))
        }
        _ => PipeshardError::IoError(e),
    })?;

    let raw: RawConfigFile = toml::from_str(&contents)?;
    debug!(path = %path.display(), stages = raw.stage.len(), "config parsed");
    Ok(raw)
}

/// Read a config and run every check from `validate.rs` on it.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    ConfigFile::try_from(load_from_path(path)?)
}

/// `Pipeshard.toml` in the current directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Pipeshard.toml")
}
