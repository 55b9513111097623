// src/compile/tab.rs

//! Parser for COSMOtherm `.tab` result tables.
//!
//! The parts we read look like this:
//!
//! ```text
//! Settings  job   1 : T= 298.15 K ; x(1)= 1.0000 ...
//! ...
//!   Nr Compound      H (in bar)   ln(gamma)   Pvap (in bar)  Gsolv (kcal/mol)
//!    1 water
//!    2 id000001     1.23E-02     -2.1000     3.4E-03        -5.2000
//! ```
//!
//! A job's temperature comes from its `Settings  job` line. The line after
//! the `Nr Compound` header names the solvent, the next one carries the
//! solute and its four metric columns.

use std::path::Path;

use crate::compile::{Measured, RawRow};
use crate::errors::{PipeshardError, Result};

const SETTINGS_MARKER: &str = "Settings  job";
const HEADER_MARKER: &str = "Nr Compound";

pub fn parse_tab_file(path: &Path) -> Result<Vec<RawRow>> {
    let bytes = std::fs::read(path)?;
    parse_tab(&String::from_utf8_lossy(&bytes)).map_err(|reason| PipeshardError::ResultParse {
        path: path.to_path_buf(),
        reason,
    })
}

pub fn parse_tab(text: &str) -> std::result::Result<Vec<RawRow>, String> {
    let mut rows = Vec::new();
    let mut temperature: Option<Measured> = None;
    let mut lines = text.lines().enumerate();

    while let Some((n, line)) = lines.next() {
        if line.contains(SETTINGS_MARKER) {
            temperature = Some(parse_temperature(line).map_err(|e| format!("line {}: {e}", n + 1))?);
        }
        if !line.contains(HEADER_MARKER) {
            continue;
        }

        let (sn, solvent_line) = lines
            .next()
            .ok_or_else(|| format!("line {}: table header without solvent line", n + 1))?;
        let solvent = nth_field(solvent_line, 1)
            .ok_or_else(|| format!("line {}: missing solvent name", sn + 1))?;

        let (rn, solute_line) = lines
            .next()
            .ok_or_else(|| format!("line {}: table header without solute line", n + 1))?;
        let fields: Vec<&str> = solute_line.split_whitespace().collect();
        if fields.len() < 6 {
            return Err(format!(
                "line {}: expected a solute name and 4 metrics, found {} field(s)",
                rn + 1,
                fields.len()
            ));
        }
        let parsed = fields[2..6]
            .iter()
            .map(|raw| {
                Measured::parse(raw).ok_or_else(|| format!("line {}: bad number {raw:?}", rn + 1))
            })
            .collect::<std::result::Result<Vec<_>, String>>()?;
        let metrics: [Measured; 4] = parsed
            .try_into()
            .map_err(|_| format!("line {}: expected 4 metrics", rn + 1))?;
        let temperature_k = temperature
            .take()
            .ok_or_else(|| format!("line {}: result block without a temperature", n + 1))?;

        rows.push(RawRow {
            solvent: solvent.to_string(),
            solute: fields[1].to_string(),
            temperature_k,
            metrics,
        });
    }

    Ok(rows)
}

fn parse_temperature(line: &str) -> std::result::Result<Measured, String> {
    let after = line
        .split_once("T=")
        .map(|(_, rest)| rest)
        .ok_or("settings line without 'T='")?;
    let raw = after.split('K').next().unwrap_or_default().trim();
    Measured::parse(raw).ok_or_else(|| format!("bad temperature {raw:?}"))
}

fn nth_field(line: &str, n: usize) -> Option<&str> {
    line.split_whitespace().nth(n)
}
