// src/config/validate.rs

use std::collections::{BTreeMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::compile::METRIC_COLUMNS;
use crate::config::model::{ConfigFile, RawConfigFile, StageConfig};
use crate::errors::{PipeshardError, Result};
use crate::template::Template;
use crate::types::{StageName, check_file_component};

/// Tolerance used when comparing parameter values.
pub const PARAMETER_TOLERANCE: f64 = 1e-6;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = PipeshardError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.config, raw.vars, raw.stage))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_stages(cfg)?;
    validate_stage_dependencies(cfg)?;
    validate_stage_graph(cfg)?;
    for (name, stage) in cfg.stage.iter() {
        validate_stage(name, stage)?;
    }
    Ok(())
}

fn ensure_has_stages(cfg: &RawConfigFile) -> Result<()> {
    if cfg.stage.is_empty() {
        return Err(PipeshardError::ConfigError(
            "config must contain at least one [stage.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_stage_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, stage) in cfg.stage.iter() {
        if let Some(dep) = &stage.after {
            if dep == name {
                return Err(PipeshardError::ConfigError(format!(
                    "stage '{}' cannot depend on itself in `after`",
                    name
                )));
            }
            if !cfg.stage.contains_key(dep) {
                return Err(PipeshardError::ConfigError(format!(
                    "stage '{}' has unknown dependency '{}' in `after`",
                    name, dep
                )));
            }
        }
    }
    Ok(())
}

fn validate_stage_graph(cfg: &RawConfigFile) -> Result<()> {
    stage_order(&cfg.stage).map(|_| ())
}

/// Stage names in dependency order (upstream before downstream).
///
/// Fails with [`PipeshardError::StageCycle`] if `after` links form a cycle.
pub(crate) fn stage_order(stages: &BTreeMap<StageName, StageConfig>) -> Result<Vec<&str>> {
    // Edge direction: upstream -> stage.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in stages.keys() {
        graph.add_node(name.as_str());
    }
    for (name, stage) in stages {
        if let Some(dep) = &stage.after {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    toposort(&graph, None).map_err(|cycle| {
        PipeshardError::StageCycle(format!(
            "cycle detected in stage graph involving stage '{}'",
            cycle.node_id()
        ))
    })
}

fn validate_stage(name: &str, stage: &StageConfig) -> Result<()> {
    check_file_component(name)
        .map_err(|reason| PipeshardError::ConfigError(format!("stage name {reason}")))?;

    if stage.runs.is_empty() {
        return Err(PipeshardError::ConfigError(format!(
            "stage '{name}' must declare at least one [[stage.{name}.run]] command"
        )));
    }

    validate_templates(name, stage)?;

    let mut keys = HashSet::new();
    for condition in &stage.conditions {
        check_file_component(&condition.key).map_err(|reason| {
            PipeshardError::ConfigError(format!(
                "stage '{name}': condition key {reason}"
            ))
        })?;
        if !keys.insert(condition.key.as_str()) {
            return Err(PipeshardError::ConfigError(format!(
                "stage '{name}': duplicate condition key '{}'",
                condition.key
            )));
        }
    }

    // Conditions share one workspace per attempt, so each condition's
    // artifacts must be told apart by name.
    if !stage.conditions.is_empty() {
        for source in &stage.artifacts {
            let template = Template::parse(source)
                .map_err(|err| PipeshardError::ConfigError(format!("stage '{name}': {err}")))?;
            if !template.placeholders().any(|p| p == "condition") {
                return Err(PipeshardError::ConfigError(format!(
                    "stage '{name}': artifact pattern '{source}' of a multi-condition stage \
                     must contain {{condition}}"
                )));
            }
        }
    }

    if stage.parameters.iter().any(|p| !p.is_finite()) {
        return Err(PipeshardError::ConfigError(format!(
            "stage '{name}': parameters must be finite numbers"
        )));
    }

    if let Some(compile) = &stage.compile {
        if stage.conditions.is_empty() {
            return Err(PipeshardError::ConfigError(format!(
                "stage '{name}': [compile] requires a multi-condition stage"
            )));
        }
        if !(compile.low < compile.reference && compile.reference < compile.high) {
            return Err(PipeshardError::ConfigError(format!(
                "stage '{name}': compile requires low < reference < high"
            )));
        }
        let below = compile.reference - compile.low;
        let above = compile.high - compile.reference;
        if (below - above).abs() > PARAMETER_TOLERANCE {
            return Err(PipeshardError::ConfigError(format!(
                "stage '{name}': compile neighbours must be symmetric around the reference \
                 ({} vs {})",
                below, above
            )));
        }
        for value in [compile.low, compile.reference, compile.high] {
            if !stage
                .parameters
                .iter()
                .any(|p| (p - value).abs() <= PARAMETER_TOLERANCE)
            {
                return Err(PipeshardError::ConfigError(format!(
                    "stage '{name}': compile value {value} is not among the stage parameters"
                )));
            }
        }
        if !METRIC_COLUMNS.contains(&compile.metric.as_str()) {
            return Err(PipeshardError::ConfigError(format!(
                "stage '{name}': unknown compile metric '{}' (expected one of {:?})",
                compile.metric, METRIC_COLUMNS
            )));
        }
        check_file_component(&compile.derived_column).map_err(|reason| {
            PipeshardError::ConfigError(format!("stage '{name}': derived_column {reason}"))
        })?;
    }

    Ok(())
}

fn validate_templates(name: &str, stage: &StageConfig) -> Result<()> {
    let mut sources: Vec<&str> = Vec::new();
    sources.extend(stage.consume.iter().map(String::as_str));
    sources.extend(stage.artifacts.iter().map(String::as_str));
    for input in &stage.inputs {
        sources.push(&input.path);
        sources.push(&input.content);
        if let Some(repeat) = &input.repeat {
            sources.push(repeat);
        }
    }
    for run in &stage.runs {
        sources.push(&run.program);
        sources.extend(run.args.iter().map(String::as_str));
    }

    for source in sources {
        Template::parse(source).map_err(|err| {
            PipeshardError::ConfigError(format!("stage '{name}': {err}"))
        })?;
    }
    Ok(())
}
