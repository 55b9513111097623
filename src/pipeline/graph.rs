// src/pipeline/graph.rs

use std::collections::{HashMap, HashSet};

use crate::config::model::ConfigFile;
use crate::types::StageName;

/// Direct dependents of one stage.
#[derive(Debug, Clone, Default)]
struct StageNode {
    dependents: Vec<StageName>,
}

/// Adjacency view of the stage graph keyed by stage name.
///
/// Acyclicity is checked in `config::validate`; this only keeps the edges
/// needed to walk dependency chains and invalidation cascades.
#[derive(Debug, Clone)]
pub struct StageGraph {
    nodes: HashMap<StageName, StageNode>,
}

impl StageGraph {
    /// Build the graph from a validated [`ConfigFile`].
    pub fn from_config(cfg: &ConfigFile) -> Self {
        let mut nodes: HashMap<StageName, StageNode> = cfg
            .stages()
            .keys()
            .map(|name| (name.clone(), StageNode::default()))
            .collect();

        // BTreeMap iteration keeps dependents sorted by name.
        for (name, stage) in cfg.stages() {
            if let Some(dep) = &stage.after {
                if let Some(dep_node) = nodes.get_mut(dep) {
                    dep_node.dependents.push(name.clone());
                }
            }
        }

        Self { nodes }
    }

    /// Stages that list this one in their `after`.
    pub fn dependents_of(&self, name: &str) -> &[StageName] {
        self.nodes
            .get(name)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// Every stage reachable through dependents (excluding `name` itself).
    pub fn descendants_of(&self, name: &str) -> HashSet<StageName> {
        let mut stack: Vec<StageName> = self.dependents_of(name).to_vec();
        let mut seen = HashSet::new();

        while let Some(next) = stack.pop() {
            if seen.insert(next.clone()) {
                stack.extend(self.dependents_of(&next).iter().cloned());
            }
        }

        seen
    }
}
