// src/compile/table.rs

//! CSV rendering of compiled rows and merging of per-item tables.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::compile::derive::format_derived;
use crate::compile::{METRIC_COLUMNS, ResultRow};
use crate::errors::{PipeshardError, Result};

pub fn header(derived_column: &str) -> String {
    let mut columns = vec!["item_id", "condition", "solvent", "solute", "temperature_k"];
    columns.extend(METRIC_COLUMNS);
    columns.push(derived_column);
    columns.join(",")
}

pub fn render(derived_column: &str, rows: &[ResultRow]) -> String {
    let mut out = header(derived_column);
    out.push('\n');
    for row in rows {
        let derived = row.derived.map(format_derived).unwrap_or_default();
        let mut fields = vec![
            row.item_id.as_str(),
            row.condition.as_str(),
            row.solvent.as_str(),
            row.solute.as_str(),
            row.temperature_k.raw.as_str(),
        ];
        fields.extend(row.metrics.iter().map(|m| m.raw.as_str()));
        fields.push(&derived);

        let line: Vec<String> = fields.into_iter().map(escape).collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }
    out
}

pub fn write(path: &Path, derived_column: &str, rows: &[ResultRow]) -> Result<()> {
    crate::fs::atomic_write(path, render(derived_column, rows).as_bytes())?;
    debug!(path = ?path, rows = rows.len(), "result table written");
    Ok(())
}

/// Concatenate per-item tables (in the given order) under one header.
///
/// Missing per-item tables are skipped; a table whose header differs from
/// the expected one is an error.
pub fn merge(target: &Path, derived_column: &str, sources: &[PathBuf]) -> Result<usize> {
    let header = header(derived_column);
    let mut out = format!("{header}\n");
    let mut merged = 0;

    for source in sources {
        let text = match fs::read_to_string(source) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(path = ?source, "per-item result table missing; skipped");
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        let mut lines = text.lines();
        if lines.next() != Some(header.as_str()) {
            return Err(PipeshardError::ResultParse {
                path: source.clone(),
                reason: format!("expected header {header:?}"),
            });
        }
        for line in lines.filter(|l| !l.is_empty()) {
            out.push_str(line);
            out.push('\n');
        }
        merged += 1;
    }

    crate::fs::atomic_write(target, out.as_bytes())?;
    debug!(path = ?target, tables = merged, "shard result table written");
    Ok(merged)
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
