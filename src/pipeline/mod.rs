// src/pipeline/mod.rs

//! The pipeline as an ordered list of stage descriptors.
//!
//! - [`graph`] keeps upstream/dependent edges between stages.
//! - [`descriptor`] holds the parsed per-stage settings.
//!
//! Invalidation cascades are computed from the graph, so no stage needs its
//! own rollback logic.

pub mod descriptor;
pub mod graph;

use crate::config::model::ConfigFile;
use crate::config::validate::stage_order;
use crate::errors::{PipeshardError, Result};
use crate::types::StageName;

pub use descriptor::{CommandTemplate, Condition, InputFile, StageDescriptor};
pub use graph::StageGraph;

#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Descriptors in dependency order (upstream before downstream).
    stages: Vec<StageDescriptor>,
    graph: StageGraph,
}

impl Pipeline {
    pub fn from_config(cfg: &ConfigFile) -> Result<Self> {
        let graph = StageGraph::from_config(cfg);

        let order = stage_order(cfg.stages())?;

        let mut stages = Vec::with_capacity(order.len());
        for name in order {
            let stage_cfg = &cfg.stages()[name];
            stages.push(StageDescriptor::from_config(name, stage_cfg)?);
        }

        Ok(Self { stages, graph })
    }

    /// All stages in dependency order.
    pub fn stages(&self) -> &[StageDescriptor] {
        &self.stages
    }

    pub fn stage(&self, name: &str) -> Option<&StageDescriptor> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Like [`Pipeline::stage`], but unknown names are a configuration error.
    pub fn require_stage(&self, name: &str) -> Result<&StageDescriptor> {
        self.stage(name)
            .ok_or_else(|| PipeshardError::ConfigError(format!("unknown stage '{name}'")))
    }

    /// Every stage downstream of `name`, in dependency order.
    pub fn downstream_of(&self, name: &str) -> Vec<StageName> {
        let descendants = self.graph.descendants_of(name);
        self.stages
            .iter()
            .filter(|s| descendants.contains(&s.name))
            .map(|s| s.name.clone())
            .collect()
    }
}
