// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::types::{ConditionKey, StageName};

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// [config]
/// output_root = "output"
///
/// [vars]
/// cosmotherm = "/opt/COSMOtherm"
///
/// [stage.cosmo_sp]
/// artifacts = ["CosmofilesBP-TZVPD-FINE-COSMO-SP/*.cosmo"]
///
/// [[stage.cosmo_sp.run]]
/// program = "calculate"
/// args = ["-l", "{item}.txt", "-m", "BP-TZVPD-FINE-COSMO-SP"]
///
/// [stage.cosmotherm]
/// after = "cosmo_sp"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    /// Free template variables, typically install paths of external tools.
    #[serde(default)]
    pub vars: BTreeMap<String, String>,

    /// All stages from `[stage.<name>]`, keyed by stage name.
    #[serde(default)]
    pub stage: BTreeMap<StageName, StageConfig>,
}

/// Validated configuration.
///
/// Only obtainable through `TryFrom<RawConfigFile>` (see `validate.rs`), so
/// holders can rely on the stage graph being acyclic and every reference
/// resolving.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub vars: BTreeMap<String, String>,
    pub stage: BTreeMap<StageName, StageConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        config: ConfigSection,
        vars: BTreeMap<String, String>,
        stage: BTreeMap<StageName, StageConfig>,
    ) -> Self {
        Self {
            config,
            vars,
            stage,
        }
    }

    pub fn stages(&self) -> &BTreeMap<StageName, StageConfig> {
        &self.stage
    }

    /// Apply command-line overrides on top of the file contents.
    pub fn apply_overrides(
        &mut self,
        output_root: Option<PathBuf>,
        scratch_root: Option<PathBuf>,
        vars: impl IntoIterator<Item = (String, String)>,
    ) {
        if let Some(root) = output_root {
            self.config.output_root = root;
        }
        if scratch_root.is_some() {
            self.config.scratch_root = scratch_root;
        }
        self.vars.extend(vars);
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigSection {
    /// Root of all durable output (item directories, claims, checkpoints,
    /// merged result tables).
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,

    /// Root for per-attempt scratch workspaces.
    ///
    /// Defaults to `<output_root>/scratch`.
    #[serde(default)]
    pub scratch_root: Option<PathBuf>,
}

fn default_output_root() -> PathBuf {
    PathBuf::from("output")
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            output_root: default_output_root(),
            scratch_root: None,
        }
    }
}

/// `[stage.<name>]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageConfig {
    /// Upstream stage that must be complete before this one runs.
    #[serde(default)]
    pub after: Option<StageName>,

    /// Glob templates matched in the item directory; matching files are
    /// copied into the scratch workspace before the stage runs.
    #[serde(default)]
    pub consume: Vec<String>,

    /// Input files rendered into the workspace for every unit.
    #[serde(default, rename = "input")]
    pub inputs: Vec<InputFileConfig>,

    /// Commands invoked in order for every unit.
    #[serde(default, rename = "run")]
    pub runs: Vec<RunConfig>,

    /// Glob templates (relative to the workspace) every unit must produce.
    #[serde(default)]
    pub artifacts: Vec<String>,

    /// Declared sub-conditions; non-empty makes this a multi-condition stage.
    #[serde(default, rename = "condition")]
    pub conditions: Vec<ConditionConfig>,

    /// Parameter values, exposed to `repeat` lines as `{parameter}`.
    #[serde(default)]
    pub parameters: Vec<f64>,

    #[serde(default)]
    pub compile: Option<CompileConfig>,
}

/// `[[stage.<name>.input]]`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputFileConfig {
    /// Workspace-relative path template.
    pub path: String,

    /// Content template.
    #[serde(default)]
    pub content: String,

    /// Optional line template appended once per stage parameter value.
    #[serde(default)]
    pub repeat: Option<String>,
}

/// `[[stage.<name>.run]]`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,
}

/// `[[stage.<name>.condition]]`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConditionConfig {
    pub key: ConditionKey,

    /// Exposed to templates as `{condition.<name>}`.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

/// `[stage.<name>.compile]`: finite-difference derivation settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompileConfig {
    pub reference: f64,
    pub low: f64,
    pub high: f64,

    /// Metric column the derivative is taken of.
    #[serde(default = "default_metric")]
    pub metric: String,

    /// Name of the derived output column.
    #[serde(default = "default_derived_column")]
    pub derived_column: String,
}

fn default_metric() -> String {
    "gsolv_kcal_mol".to_string()
}

fn default_derived_column() -> String {
    "hsolv_kcal_mol".to_string()
}

impl CompileConfig {
    pub fn new(reference: f64, low: f64, high: f64) -> Self {
        Self {
            reference,
            low,
            high,
            metric: default_metric(),
            derived_column: default_derived_column(),
        }
    }
}
