// src/bundle.rs

//! Result bundles: one zip archive per item and stage.
//!
//! Entries are written in name order with a fixed timestamp, and a `MANIFEST`
//! entry lists every file with its blake3 digest, so identical inputs give a
//! byte-identical archive.

use std::collections::BTreeMap;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, warn};
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::errors::Result;

pub const MANIFEST_NAME: &str = "MANIFEST";

/// Collects `archive name -> source file` pairs before writing.
#[derive(Debug, Default, Clone)]
pub struct BundleBuilder {
    entries: BTreeMap<String, PathBuf>,
}

impl BundleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file under `name`. A second file with the same name is ignored.
    pub fn add(&mut self, name: impl Into<String>, source: impl Into<PathBuf>) -> &mut Self {
        let name = name.into();
        if self.entries.contains_key(&name) {
            warn!(entry = %name, "duplicate bundle entry ignored");
        } else {
            self.entries.insert(name, source.into());
        }
        self
    }

    /// Add every file of `root` (recursively) under `prefix/`.
    pub fn add_tree(&mut self, prefix: &str, root: &Path) -> Result<&mut Self> {
        for rel in crate::fs::list_files(root)? {
            let name = format!("{prefix}/{}", archive_name(&rel));
            self.add(name, root.join(&rel));
        }
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the archive atomically to `path`. Returns the manifest text.
    pub fn write(&self, path: &Path) -> Result<String> {
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default())
            .unix_permissions(0o644);

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let mut manifest = String::new();

        for (name, source) in &self.entries {
            let bytes = fs::read(source).with_context(|| format!("reading {:?}", source))?;
            manifest.push_str(&format!("{}  {}\n", blake3::hash(&bytes).to_hex(), name));
            zip.start_file(name.as_str(), options)?;
            zip.write_all(&bytes)?;
        }
        zip.start_file(MANIFEST_NAME, options)?;
        zip.write_all(manifest.as_bytes())?;

        let bytes = zip.finish()?.into_inner();
        crate::fs::atomic_write(path, &bytes)?;
        debug!(path = ?path, entries = self.entries.len(), "bundle written");
        Ok(manifest)
    }
}

/// Forward-slash form of a relative path, as stored in the archive.
fn archive_name(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
