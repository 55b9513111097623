// src/pipeline/descriptor.rs

//! Stage descriptors: the validated, template-parsed form of a
//! `[stage.<name>]` section.

use std::collections::BTreeMap;

use crate::config::model::{CompileConfig, StageConfig};
use crate::errors::Result;
use crate::template::Template;
use crate::types::{ConditionKey, StageKind, StageName};

/// One input file rendered into the scratch workspace.
#[derive(Debug, Clone)]
pub struct InputFile {
    pub path: Template,
    pub content: Template,
    pub repeat: Option<Template>,
}

/// One external command of a stage.
#[derive(Debug, Clone)]
pub struct CommandTemplate {
    pub program: Template,
    pub args: Vec<Template>,
}

/// A declared sub-condition of a multi-condition stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub key: ConditionKey,
    pub params: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct StageDescriptor {
    pub name: StageName,
    pub upstream: Option<StageName>,
    pub consume: Vec<Template>,
    pub inputs: Vec<InputFile>,
    pub commands: Vec<CommandTemplate>,
    pub artifacts: Vec<Template>,
    pub conditions: Vec<Condition>,
    pub parameters: Vec<f64>,
    pub compile: Option<CompileConfig>,
}

impl StageDescriptor {
    pub fn from_config(name: &str, cfg: &StageConfig) -> Result<Self> {
        let parse_all = |sources: &[String]| -> Result<Vec<Template>> {
            sources.iter().map(|s| Template::parse(s)).collect()
        };

        let inputs = cfg
            .inputs
            .iter()
            .map(|input| {
                Ok(InputFile {
                    path: Template::parse(&input.path)?,
                    content: Template::parse(&input.content)?,
                    repeat: input.repeat.as_deref().map(Template::parse).transpose()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let commands = cfg
            .runs
            .iter()
            .map(|run| {
                Ok(CommandTemplate {
                    program: Template::parse(&run.program)?,
                    args: parse_all(&run.args)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: name.to_string(),
            upstream: cfg.after.clone(),
            consume: parse_all(&cfg.consume)?,
            inputs,
            commands,
            artifacts: parse_all(&cfg.artifacts)?,
            conditions: cfg
                .conditions
                .iter()
                .map(|c| Condition {
                    key: c.key.clone(),
                    params: c.params.clone(),
                })
                .collect(),
            parameters: cfg.parameters.clone(),
            compile: cfg.compile.clone(),
        })
    }

    pub fn kind(&self) -> StageKind {
        if self.conditions.is_empty() {
            StageKind::Single
        } else {
            StageKind::Multi
        }
    }

    pub fn condition_keys(&self) -> impl Iterator<Item = &str> {
        self.conditions.iter().map(|c| c.key.as_str())
    }

    pub fn condition(&self, key: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.key == key)
    }
}
