// src/stage/workspace.rs

//! Scratch workspace handling and artifact matching.

use std::fs;
use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};
use tracing::debug;

use crate::errors::{PipeshardError, Result};
use crate::pipeline::InputFile;
use crate::template::{Template, Vars};

/// Compile a rendered pattern; `*` does not cross directory separators.
pub fn compile_glob(pattern: &str) -> Result<GlobMatcher> {
    let glob = GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|e| PipeshardError::ConfigError(format!("invalid glob '{pattern}': {e}")))?;
    Ok(glob.compile_matcher())
}

/// Render `template` and return the files of `root` (relative paths) that
/// match it, sorted.
pub fn match_files(root: &Path, template: &Template, vars: &Vars) -> Result<(String, Vec<PathBuf>)> {
    let pattern = template.render_relative_path(vars)?;
    let pattern = pattern.to_string_lossy().replace('\\', "/");
    let matcher = compile_glob(&pattern)?;
    let files = crate::fs::list_files(root)?
        .into_iter()
        .filter(|rel| matcher.is_match(rel))
        .collect();
    Ok((pattern, files))
}

/// An ephemeral per-attempt working directory.
#[derive(Debug)]
pub struct ScratchWorkspace {
    root: PathBuf,
}

impl ScratchWorkspace {
    /// Remove any leftover from an earlier attempt and start empty.
    pub fn fresh(root: PathBuf) -> Result<Self> {
        crate::fs::recreate_dir(&root)?;
        debug!(path = ?root, "scratch workspace created");
        Ok(Self { root })
    }

    /// Pick up the workspace left behind by an earlier attempt, if any.
    pub fn reopen(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Copy `rel` from `source_dir` into the workspace.
    pub fn import(&self, source_dir: &Path, rel: &Path) -> Result<()> {
        crate::fs::copy_file(&source_dir.join(rel), &self.root.join(rel))?;
        Ok(())
    }

    /// Copy `rel` from the workspace into `target_dir`.
    pub fn export(&self, rel: &Path, target_dir: &Path) -> Result<()> {
        crate::fs::copy_file(&self.root.join(rel), &target_dir.join(rel))?;
        Ok(())
    }

    /// Render an input file into the workspace.
    ///
    /// A `repeat` line is rendered once per parameter value (exposed as
    /// `{parameter}`) and appended after the content.
    pub fn render_input(&self, input: &InputFile, vars: &Vars, parameters: &[f64]) -> Result<PathBuf> {
        let rel = input.path.render_relative_path(vars)?;
        let mut text = input.content.render(vars)?;

        if let Some(repeat) = &input.repeat {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            for value in parameters {
                let line_vars = vars.clone().with("parameter", value.to_string());
                text.push_str(&repeat.render_line(&line_vars)?);
                text.push('\n');
            }
        }

        let path = self.root.join(&rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, text)?;
        Ok(rel)
    }

    pub fn remove(self) -> Result<()> {
        crate::fs::remove_dir_if_exists(&self.root)?;
        debug!(path = ?self.root, "scratch workspace removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_stays_in_one_directory() {
        let m = compile_glob("*.tab").unwrap();
        assert!(m.is_match("a.tab"));
        assert!(!m.is_match("sub/a.tab"));
        assert!(compile_glob("**/*.tab").unwrap().is_match("sub/a.tab"));
    }

    #[test]
    fn repeat_lines_follow_content() {
        let dir = tempfile::tempdir().unwrap();
        let ws = ScratchWorkspace::fresh(dir.path().join("ws")).unwrap();
        let input = InputFile {
            path: Template::parse("{item}.inp").unwrap(),
            content: Template::parse("ctd = BP_TZVP").unwrap(),
            repeat: Some(Template::parse("henry  xh={ 1 0 } tk={parameter} GSOLV").unwrap()),
        };
        let vars = Vars::new().with("item", "id1");
        let rel = ws.render_input(&input, &vars, &[297.15, 298.15]).unwrap();
        let text = fs::read_to_string(ws.path().join(rel)).unwrap();
        assert_eq!(
            text,
            "ctd = BP_TZVP\nhenry  xh={ 1 0 } tk=297.15 GSOLV\nhenry  xh={ 1 0 } tk=298.15 GSOLV\n"
        );
    }
}
