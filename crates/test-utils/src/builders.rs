#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;

use pipeshard::config::{
    CompileConfig, ConditionConfig, ConfigFile, ConfigSection, InputFileConfig, RawConfigFile,
    RunConfig, StageConfig,
};
use pipeshard::errors::Result;
use pipeshard::items::WorkItem;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new(output_root: &Path) -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection {
                    output_root: output_root.to_path_buf(),
                    scratch_root: None,
                },
                vars: BTreeMap::new(),
                stage: BTreeMap::new(),
            },
        }
    }

    pub fn scratch_root(mut self, dir: &Path) -> Self {
        self.config.config.scratch_root = Some(dir.to_path_buf());
        self
    }

    pub fn var(mut self, key: &str, value: &str) -> Self {
        self.config.vars.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_stage(mut self, name: &str, stage: StageConfig) -> Self {
        self.config.stage.insert(name.to_string(), stage);
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn try_build(self) -> Result<ConfigFile> {
        ConfigFile::try_from(self.config)
    }

    pub fn build(self) -> ConfigFile {
        self.try_build()
            .expect("Failed to build valid config from builder")
    }
}

/// Builder for `StageConfig`.
#[derive(Default)]
pub struct StageConfigBuilder {
    stage: StageConfig,
}

impl StageConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.stage.after = Some(dep.to_string());
        self
    }

    pub fn consume(mut self, pattern: &str) -> Self {
        self.stage.consume.push(pattern.to_string());
        self
    }

    pub fn input(mut self, path: &str, content: &str) -> Self {
        self.stage.inputs.push(InputFileConfig {
            path: path.to_string(),
            content: content.to_string(),
            repeat: None,
        });
        self
    }

    pub fn repeated_input(mut self, path: &str, content: &str, repeat: &str) -> Self {
        self.stage.inputs.push(InputFileConfig {
            path: path.to_string(),
            content: content.to_string(),
            repeat: Some(repeat.to_string()),
        });
        self
    }

    pub fn run(mut self, program: &str, args: &[&str]) -> Self {
        self.stage.runs.push(RunConfig {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        });
        self
    }

    pub fn artifact(mut self, pattern: &str) -> Self {
        self.stage.artifacts.push(pattern.to_string());
        self
    }

    pub fn condition(mut self, key: &str, params: &[(&str, &str)]) -> Self {
        self.stage.conditions.push(ConditionConfig {
            key: key.to_string(),
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });
        self
    }

    pub fn parameters(mut self, values: &[f64]) -> Self {
        self.stage.parameters = values.to_vec();
        self
    }

    pub fn compile(mut self, compile: CompileConfig) -> Self {
        self.stage.compile = Some(compile);
        self
    }

    pub fn build(self) -> StageConfig {
        self.stage
    }
}

/// Builder for `WorkItem`.
pub struct WorkItemBuilder {
    item: WorkItem,
}

impl WorkItemBuilder {
    pub fn new(id: &str, index: usize) -> Self {
        Self {
            item: WorkItem::new(id, index),
        }
    }

    pub fn charge(mut self, charge: i32) -> Self {
        self.item.charge = charge;
        self
    }

    pub fn multiplicity(mut self, multiplicity: u32) -> Self {
        self.item.multiplicity = multiplicity;
        self
    }

    pub fn geometry(mut self, xyz: &str) -> Self {
        self.item.geometry = xyz.to_string();
        self
    }

    pub fn param(mut self, key: &str, value: &str) -> Self {
        self.item.params.insert(key.to_string(), value.to_string());
        self
    }

    pub fn build(self) -> WorkItem {
        self.item
    }
}

/// Items `id000000`, `id000001`, ... with a one-atom geometry.
pub fn numbered_items(count: usize) -> Vec<WorkItem> {
    (0..count)
        .map(|i| {
            WorkItemBuilder::new(&format!("id{i:06}"), i)
                .geometry("C 0.0 0.0 0.0")
                .build()
        })
        .collect()
}

pub const TEMPERATURES: [f64; 3] = [297.15, 298.15, 299.15];

/// A single-condition `sp` stage feeding a multi-condition `cosmotherm`
/// stage with `water` and `benzene` conditions and a compile section.
///
/// Meant to be driven by [`crate::fake_tool::FakeTool::cosmo`].
pub fn cosmo_pipeline(output_root: &Path) -> ConfigFileBuilder {
    cosmo_pipeline_with_conditions(output_root, &[("water", "h2o"), ("benzene", "c6h6")])
}

pub fn cosmo_pipeline_with_conditions(
    output_root: &Path,
    conditions: &[(&str, &str)],
) -> ConfigFileBuilder {
    let sp = StageConfigBuilder::new()
        .input("{item}.xyz", "{geometry}\n")
        .run("{qm}", &["{item}.xyz"])
        .artifact("{item}.cosmo")
        .build();

    let mut cosmotherm = StageConfigBuilder::new()
        .after("sp")
        .consume("{item}.cosmo")
        .repeated_input(
            "{item}_{condition}.inp",
            "f = {item}.cosmo\nsolvent = {condition.solvent}",
            "henry  xh={ 1 0 } tk={parameter} GSOLV",
        )
        .run("cosmotherm", &["{item}_{condition}.inp"])
        .artifact("{item}_{condition}.tab")
        .parameters(&TEMPERATURES)
        .compile(CompileConfig::new(298.15, 297.15, 299.15));
    for (key, solvent) in conditions {
        cosmotherm = cosmotherm.condition(key, &[("solvent", solvent)]);
    }

    ConfigFileBuilder::new(output_root)
        .var("qm", "ridft")
        .with_stage("sp", sp)
        .with_stage("cosmotherm", cosmotherm.build())
}

/// A single-condition stage downstream of `cosmotherm` that consumes its
/// per-item result table.
pub fn summary_stage() -> StageConfig {
    StageConfigBuilder::new()
        .after("cosmotherm")
        .consume("cosmotherm_results.csv")
        .run("summarize", &["cosmotherm_results.csv", "{item}.summary"])
        .artifact("{item}.summary")
        .build()
}
