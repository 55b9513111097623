// src/compile/mod.rs

//! Result compilation.
//!
//! Raw tool output is parsed into [`ResultRow`]s ([`tab`]), a derived value
//! is computed per condition from three parameter points ([`derive`]) and
//! the rows are written as CSV ([`table`]).

pub mod derive;
pub mod tab;
pub mod table;

use std::path::PathBuf;

use tracing::{debug, warn};

use crate::config::model::CompileConfig;
use crate::errors::{PipeshardError, Result};
use crate::types::{ConditionKey, ItemId};

use derive::{Point, same_parameter};

/// Metric columns of a result row, in table order.
pub const METRIC_COLUMNS: [&str; 4] = ["henry_bar", "ln_gamma", "pvap_bar", "gsolv_kcal_mol"];

/// A number together with the text it was parsed from, so tables reproduce
/// the tool's own formatting.
#[derive(Debug, Clone, PartialEq)]
pub struct Measured {
    pub raw: String,
    pub value: f64,
}

impl Measured {
    pub fn parse(raw: &str) -> Option<Self> {
        let value = raw.trim().parse::<f64>().ok()?;
        Some(Self {
            raw: raw.trim().to_string(),
            value,
        })
    }
}

/// One parsed table row before it is attributed to an item.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub solvent: String,
    pub solute: String,
    pub temperature_k: Measured,
    pub metrics: [Measured; 4],
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub item_id: ItemId,
    pub condition: ConditionKey,
    pub solvent: String,
    pub solute: String,
    pub temperature_k: Measured,
    pub metrics: [Measured; 4],
    pub derived: Option<f64>,
}

impl ResultRow {
    pub fn from_raw(item: &str, condition: &str, raw: RawRow) -> Self {
        Self {
            item_id: item.to_string(),
            condition: condition.to_string(),
            solvent: raw.solvent,
            solute: raw.solute,
            temperature_k: raw.temperature_k,
            metrics: raw.metrics,
            derived: None,
        }
    }

    pub fn metric(&self, name: &str) -> Option<&Measured> {
        METRIC_COLUMNS
            .iter()
            .position(|c| *c == name)
            .map(|i| &self.metrics[i])
    }
}

/// Raw output files of one condition, as found in the item directory.
#[derive(Debug, Clone)]
pub struct ConditionOutputs {
    pub condition: ConditionKey,
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResultCompiler {
    config: CompileConfig,
    metric_index: usize,
}

impl ResultCompiler {
    pub fn new(config: CompileConfig) -> Result<Self> {
        let metric_index = METRIC_COLUMNS
            .iter()
            .position(|c| *c == config.metric)
            .ok_or_else(|| {
                PipeshardError::ConfigError(format!("unknown metric column '{}'", config.metric))
            })?;
        Ok(Self {
            config,
            metric_index,
        })
    }

    pub fn config(&self) -> &CompileConfig {
        &self.config
    }

    pub fn derived_column(&self) -> &str {
        &self.config.derived_column
    }

    /// Parse every output file of every condition and derive the reference
    /// value per condition.
    ///
    /// Files without result tables contribute no rows. A condition lacking
    /// any of the three parameter points fails with
    /// [`PipeshardError::MissingReferencePoint`].
    pub fn compile_item(&self, item: &str, outputs: &[ConditionOutputs]) -> Result<Vec<ResultRow>> {
        let mut all = Vec::new();
        for output in outputs {
            let mut rows = Vec::new();
            for file in &output.files {
                let parsed = tab::parse_tab_file(file)?;
                rows.extend(
                    parsed
                        .into_iter()
                        .map(|raw| ResultRow::from_raw(item, &output.condition, raw)),
                );
            }
            self.derive_condition(item, &output.condition, &mut rows)?;
            all.extend(rows);
        }
        debug!(item, rows = all.len(), "result rows compiled");
        Ok(all)
    }

    /// Fill the derived column of the reference row of one condition.
    pub fn derive_condition(&self, item: &str, condition: &str, rows: &mut [ResultRow]) -> Result<()> {
        let cfg = &self.config;
        let low = self.point(item, condition, rows, cfg.low)?;
        let high = self.point(item, condition, rows, cfg.high)?;
        let reference = self.point(item, condition, rows, cfg.reference)?;

        let value = derive::derive(low.1, reference.1, high.1);
        if !value.is_finite() {
            warn!(item, condition, "derived value is not finite");
        }
        rows[reference.0].derived = Some(value);
        Ok(())
    }

    fn point(
        &self,
        item: &str,
        condition: &str,
        rows: &[ResultRow],
        parameter: f64,
    ) -> Result<(usize, Point)> {
        rows.iter()
            .position(|r| same_parameter(r.temperature_k.value, parameter))
            .map(|i| {
                let point = Point {
                    parameter: rows[i].temperature_k.value,
                    metric: rows[i].metrics[self.metric_index].value,
                };
                (i, point)
            })
            .ok_or_else(|| PipeshardError::MissingReferencePoint {
                item: item.to_string(),
                condition: condition.to_string(),
                value: parameter,
            })
    }
}
