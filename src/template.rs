// src/template.rs

//! Placeholder templates used for tool input scripts, command lines and
//! workspace-relative paths.
//!
//! Syntax:
//! - `{name}` or `{name.sub}` is replaced by the variable of that name;
//! - `{{` and `}}` produce literal braces;
//! - any other brace group (e.g. COSMOtherm's `xh={ 1 0 }`) is kept verbatim.
//!
//! Templates are parsed once when the pipeline is built, so a malformed
//! placeholder is reported at startup. Rendering fails on unknown variables
//! instead of emitting a half-filled script.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::errors::{PipeshardError, Result};

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{|\}\}|\{([A-Za-z_][A-Za-z0-9_.]*)\}").expect("placeholder regex is valid")
    })
}

fn dangling_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{[A-Za-z_]").expect("dangling placeholder regex is valid"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Var(String),
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut last = 0;

        for caps in placeholder_re().captures_iter(source) {
            let Some(whole) = caps.get(0) else { continue };
            let chunk = &source[last..whole.start()];
            if dangling_re().is_match(chunk) {
                return Err(PipeshardError::Template(format!(
                    "malformed placeholder in template {source:?}"
                )));
            }
            literal.push_str(chunk);
            match caps.get(1) {
                Some(name) => {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Var(name.as_str().to_string()));
                }
                None if whole.as_str() == "{{" => literal.push('{'),
                None => literal.push('}'),
            }
            last = whole.end();
        }

        let tail = &source[last..];
        if dangling_re().is_match(tail) {
            return Err(PipeshardError::Template(format!(
                "malformed placeholder in template {source:?}"
            )));
        }
        literal.push_str(tail);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Names of all variables referenced by this template.
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Var(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Render a multi-line block (input scripts, file contents).
    pub fn render(&self, vars: &Vars) -> Result<String> {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Var(name) => {
                    let value = vars.get(name).ok_or_else(|| {
                        PipeshardError::Template(format!(
                            "unknown placeholder {{{name}}} in template {:?}",
                            self.source
                        ))
                    })?;
                    if value.contains('\0') {
                        return Err(PipeshardError::Template(format!(
                            "value of {{{name}}} contains a NUL byte"
                        )));
                    }
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }

    /// Render something that must stay on one line (program names, args).
    pub fn render_line(&self, vars: &Vars) -> Result<String> {
        let out = self.render(vars)?;
        if out.contains('\n') || out.contains('\r') {
            return Err(PipeshardError::Template(format!(
                "template {:?} rendered to a multi-line value",
                self.source
            )));
        }
        Ok(out)
    }

    /// Render a path that must stay inside the directory it is joined to.
    pub fn render_relative_path(&self, vars: &Vars) -> Result<PathBuf> {
        let rendered = self.render_line(vars)?;
        let path = PathBuf::from(&rendered);
        check_relative(&path).map_err(|reason| {
            PipeshardError::Template(format!(
                "template {:?} rendered to invalid path {rendered:?}: {reason}",
                self.source
            ))
        })?;
        Ok(path)
    }
}

fn check_relative(path: &Path) -> std::result::Result<(), &'static str> {
    if path.as_os_str().is_empty() {
        return Err("empty path");
    }
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => return Err("'..' is not allowed"),
            Component::RootDir | Component::Prefix(_) => return Err("path must be relative"),
        }
    }
    Ok(())
}

/// Variables available while rendering templates.
#[derive(Debug, Clone, Default)]
pub struct Vars {
    values: BTreeMap<String, String>,
}

impl Vars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Builder-style variant of [`Vars::set`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    /// Insert every entry of `map` as `<prefix>.<key>`.
    pub fn extend_prefixed(&mut self, prefix: &str, map: &BTreeMap<String, String>) -> &mut Self {
        for (key, value) in map {
            self.values.insert(format!("{prefix}.{key}"), value.clone());
        }
        self
    }

    /// Overlay `other`; its values win on conflicts.
    pub fn merge(&mut self, other: Vars) -> &mut Self {
        self.values.extend(other.values);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> Vars {
        Vars::new()
            .with("item", "id0001")
            .with("condition", "water")
            .with("condition.source", "COSMObase")
    }

    #[test]
    fn renders_placeholders_and_keeps_foreign_braces() {
        let t = Template::parse("henry  xh={ 1 0 } tk={parameter} GSOLV").unwrap();
        let out = t.render(&Vars::new().with("parameter", "298.15")).unwrap();
        assert_eq!(out, "henry  xh={ 1 0 } tk=298.15 GSOLV");
    }

    #[test]
    fn dotted_names_and_escapes() {
        let t = Template::parse("{item}_{condition}.inp {{{condition.source}}}").unwrap();
        assert_eq!(t.render(&vars()).unwrap(), "id0001_water.inp {COSMObase}");
        assert_eq!(
            t.placeholders().collect::<Vec<_>>(),
            vec!["item", "condition", "condition.source"]
        );
    }

    #[test]
    fn unknown_placeholder_fails() {
        let t = Template::parse("{item} {charge}").unwrap();
        let err = t.render(&vars()).unwrap_err();
        assert!(matches!(err, PipeshardError::Template(msg) if msg.contains("{charge}")));
    }

    #[test]
    fn malformed_placeholder_rejected_at_parse() {
        assert!(Template::parse("{item").is_err());
        assert!(Template::parse("{item}_{condition").is_err());
    }

    #[test]
    fn line_and_path_checks() {
        let multi = Vars::new().with("geometry", "C 0 0 0\nH 1 0 0");
        assert!(Template::parse("{geometry}").unwrap().render_line(&multi).is_err());

        let t = Template::parse("{item}/out.tab").unwrap();
        assert_eq!(
            t.render_relative_path(&vars()).unwrap(),
            PathBuf::from("id0001/out.tab")
        );
        let escape = Template::parse("../{item}").unwrap();
        assert!(escape.render_relative_path(&vars()).is_err());
        let absolute = Template::parse("/tmp/{item}").unwrap();
        assert!(absolute.render_relative_path(&vars()).is_err());
    }
}
