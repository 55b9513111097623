use std::fs;
use std::future::Future;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use pipeshard::errors::Result;
use pipeshard::exec::{ExternalTool, Invocation, ToolOutput};

type Script = dyn Fn(&Invocation) -> io::Result<i32> + Send + Sync;

/// A fake external tool that:
/// - records every invocation
/// - writes empty `.out` / `.err` capture files like the real one
/// - runs a scripted response that may create artifacts in the working dir
/// - fails (exit 1) any invocation whose program or args contain one of the
///   registered needles.
pub struct FakeTool {
    invocations: Mutex<Vec<Invocation>>,
    failures: Mutex<Vec<String>>,
    script: Arc<Script>,
}

impl FakeTool {
    pub fn new(script: impl Fn(&Invocation) -> io::Result<i32> + Send + Sync + 'static) -> Self {
        Self {
            invocations: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
            script: Arc::new(script),
        }
    }

    /// Exits 0 without producing anything.
    pub fn succeeding() -> Self {
        Self::new(|_| Ok(0))
    }

    /// Imitates the QM and COSMOtherm steps of
    /// [`crate::builders::cosmo_pipeline`]:
    ///
    /// - `ridft <item>.xyz` writes `<item>.cosmo`;
    /// - `cosmotherm <item>_<cond>.inp` requires the consumed `.cosmo` file
    ///   and writes `<item>_<cond>.tab` with one job per `tk=` line;
    /// - `summarize <in> <out>` copies the consumed results table.
    pub fn cosmo() -> Self {
        Self::new(|invocation| cosmo_script(invocation, None))
    }

    /// Like [`FakeTool::cosmo`], but every `.tab` lacks the job at
    /// `temperature`.
    pub fn cosmo_without(temperature: f64) -> Self {
        Self::new(move |invocation| cosmo_script(invocation, Some(temperature)))
    }

    pub fn fail_when(self, needle: &str) -> Self {
        self.add_failure(needle);
        self
    }

    pub fn add_failure(&self, needle: &str) {
        self.failures.lock().unwrap().push(needle.to_string());
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.invocations.lock().unwrap().len()
    }

    pub fn reset(&self) {
        self.invocations.lock().unwrap().clear();
    }

    fn should_fail(&self, invocation: &Invocation) -> bool {
        let failures = self.failures.lock().unwrap();
        failures.iter().any(|needle| {
            invocation.program.contains(needle.as_str())
                || invocation.args.iter().any(|a| a.contains(needle.as_str()))
        })
    }
}

impl ExternalTool for FakeTool {
    fn run<'a>(
        &'a self,
        invocation: &'a Invocation,
    ) -> Pin<Box<dyn Future<Output = Result<ToolOutput>> + Send + 'a>> {
        Box::pin(async move {
            self.invocations.lock().unwrap().push(invocation.clone());

            let stdout_path = invocation.stdout_path();
            let stderr_path = invocation.stderr_path();
            fs::write(&stdout_path, "")?;
            fs::write(&stderr_path, "")?;

            let code = if self.should_fail(invocation) {
                fs::write(&stderr_path, "injected failure\n")?;
                1
            } else {
                (self.script)(invocation)?
            };

            Ok(ToolOutput {
                exit_code: Some(code),
                stdout_path,
                stderr_path,
            })
        })
    }
}

fn cosmo_script(invocation: &Invocation, missing: Option<f64>) -> io::Result<i32> {
    let dir = &invocation.working_dir;
    let Some(input) = invocation.args.first() else {
        return Ok(2);
    };

    match invocation.program.as_str() {
        "ridft" => {
            let stem = input.trim_end_matches(".xyz");
            fs::write(dir.join(format!("{stem}.cosmo")), "$cosmo\n")?;
            Ok(0)
        }
        "cosmotherm" => {
            let text = fs::read_to_string(dir.join(input))?;
            let mut cosmo_file = None;
            let mut solvent = None;
            let mut temperatures = Vec::new();
            for line in text.lines() {
                if let Some(v) = line.strip_prefix("f = ") {
                    cosmo_file = Some(v.trim().to_string());
                } else if let Some(v) = line.strip_prefix("solvent = ") {
                    solvent = Some(v.trim().to_string());
                } else if let Some((_, rest)) = line.split_once("tk=") {
                    let t = rest.split_whitespace().next().unwrap_or_default();
                    temperatures.push(t.parse::<f64>().unwrap_or(f64::NAN));
                }
            }
            let (Some(cosmo_file), Some(solvent)) = (cosmo_file, solvent) else {
                return Ok(2);
            };
            if !dir.join(&cosmo_file).is_file() {
                return Ok(3);
            }

            let solute = cosmo_file.trim_end_matches(".cosmo");
            let points: Vec<(f64, f64)> = temperatures
                .iter()
                .filter(|t| missing.is_none_or(|m| (**t - m).abs() > 1e-6))
                .map(|t| (*t, gsolv_at(*t)))
                .collect();
            let out = dir.join(input.replace(".inp", ".tab"));
            write_tab(&out, &solvent, solute, &points)?;
            Ok(0)
        }
        "summarize" => {
            if !dir.join(input).is_file() {
                return Ok(3);
            }
            let Some(out) = invocation.args.get(1) else {
                return Ok(2);
            };
            fs::copy(dir.join(input), dir.join(out))?;
            Ok(0)
        }
        _ => Ok(127),
    }
}

/// Linear free energy used by the fake COSMOtherm: -5.0 at 297.15 K,
/// falling by 0.2 per kelvin. The derived enthalpy at 298.15 K is 54.43.
pub fn gsolv_at(temperature: f64) -> f64 {
    -5.0 - 0.2 * (temperature - 297.15)
}

/// Render a COSMOtherm `.tab` table with one job per `(temperature, gsolv)`.
pub fn tab_fixture(solvent: &str, solute: &str, points: &[(f64, f64)]) -> String {
    let mut out = String::from("COSMOtherm Version 19.0.4 (fake)\n");
    for (n, (temperature, gsolv)) in points.iter().enumerate() {
        out.push_str(&format!(
            "Settings  job {:>3} : T= {temperature} K ; x(1)= 1.0000 ; Unit=kcal/mol\n",
            n + 1
        ));
        out.push_str("  Nr Compound   H (in bar)   ln(gamma)   Pvap (in bar)   Gsolv (kcal/mol)\n");
        out.push_str(&format!("   1 {solvent}\n"));
        out.push_str(&format!(
            "   2 {solute}     1.00E-02     -1.5000     2.0E-03         {gsolv:.4}\n"
        ));
        out.push('\n');
    }
    out
}

pub fn write_tab(path: &Path, solvent: &str, solute: &str, points: &[(f64, f64)]) -> io::Result<()> {
    fs::write(path, tab_fixture(solvent, solute, points))
}
