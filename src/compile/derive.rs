// src/compile/derive.rs

//! Central finite difference of a metric around a reference parameter value.

use crate::config::validate::PARAMETER_TOLERANCE;

/// A metric value observed at one parameter value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub parameter: f64,
    pub metric: f64,
}

/// `m(ref) + ref * s` with `s = -(m(high) - m(low)) / (high - low)`.
///
/// For a free energy sampled at three temperatures this is the enthalpy at
/// the reference temperature (`H = G + T * S`, `S = -dG/dT`).
pub fn derive(low: Point, reference: Point, high: Point) -> f64 {
    let slope = -(high.metric - low.metric) / (high.parameter - low.parameter);
    reference.metric + reference.parameter * slope
}

pub fn same_parameter(a: f64, b: f64) -> bool {
    (a - b).abs() <= PARAMETER_TOLERANCE
}

/// Fixed eight-decimal rendering used in result tables.
pub fn format_derived(value: f64) -> String {
    format!("{value:.8}")
}
