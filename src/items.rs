// src/items.rs

//! Work items and their input file.
//!
//! Items are produced by an upstream collaborator as a JSON array:
//!
//! ```json
//! [
//!   { "id": "id000001", "charge": 0, "multiplicity": 1,
//!     "geometry": "C 0.0 0.0 0.0\nO 1.2 0.0 0.0\n",
//!     "params": { "smiles": "C=O" } }
//! ]
//! ```
//!
//! Once loaded an item is never mutated; the position in the file is the
//! sharding index.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::errors::{PipeshardError, Result};
use crate::template::Vars;
use crate::types::{ItemId, check_file_component};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawWorkItem {
    id: ItemId,
    #[serde(default)]
    charge: i32,
    #[serde(default = "default_multiplicity")]
    multiplicity: u32,
    #[serde(default)]
    geometry: String,
    #[serde(default)]
    params: BTreeMap<String, String>,
}

fn default_multiplicity() -> u32 {
    1
}

/// Immutable snapshot of one unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub id: ItemId,
    /// Position in the input list; drives shard assignment.
    pub index: usize,
    pub charge: i32,
    pub multiplicity: u32,
    /// Atomic coordinates as an XYZ block (without the atom-count header).
    pub geometry: String,
    pub params: BTreeMap<String, String>,
}

impl WorkItem {
    pub fn new(id: impl Into<ItemId>, index: usize) -> Self {
        Self {
            id: id.into(),
            index,
            charge: 0,
            multiplicity: 1,
            geometry: String::new(),
            params: BTreeMap::new(),
        }
    }

    /// Template variables describing this item.
    pub fn template_vars(&self) -> Vars {
        let mut vars = Vars::new();
        vars.set("item", self.id.clone())
            .set("charge", self.charge.to_string())
            .set("multiplicity", self.multiplicity.to_string())
            .set("geometry", self.geometry.clone())
            .extend_prefixed("param", &self.params);
        vars
    }
}

/// Load and validate the item list.
pub fn load_items(path: impl AsRef<Path>) -> Result<Vec<WorkItem>> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let raw: Vec<RawWorkItem> = serde_json::from_str(&contents).map_err(|e| {
        PipeshardError::InvalidItem(format!("cannot parse item list {:?}: {e}", path))
    })?;

    let items = raw
        .into_iter()
        .enumerate()
        .map(|(index, r)| WorkItem {
            id: r.id,
            index,
            charge: r.charge,
            multiplicity: r.multiplicity,
            geometry: r.geometry,
            params: r.params,
        })
        .collect::<Vec<_>>();

    validate_items(&items)?;
    Ok(items)
}

/// Check ID uniqueness and per-item sanity.
pub fn validate_items(items: &[WorkItem]) -> Result<()> {
    let mut seen = HashSet::new();
    for item in items {
        check_file_component(&item.id)
            .map_err(|reason| PipeshardError::InvalidItem(format!("item id {reason}")))?;
        if !seen.insert(item.id.as_str()) {
            return Err(PipeshardError::InvalidItem(format!(
                "duplicate item id '{}'",
                item.id
            )));
        }
        if item.multiplicity == 0 {
            return Err(PipeshardError::InvalidItem(format!(
                "item '{}': multiplicity must be >= 1",
                item.id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_duplicates_and_bad_ids() {
        let items = vec![WorkItem::new("a", 0), WorkItem::new("a", 1)];
        assert!(matches!(
            validate_items(&items),
            Err(PipeshardError::InvalidItem(msg)) if msg.contains("duplicate")
        ));

        let items = vec![WorkItem::new("../a", 0)];
        assert!(validate_items(&items).is_err());
    }

    #[test]
    fn exposes_params_as_vars() {
        let mut item = WorkItem::new("id1", 0);
        item.params.insert("smiles".into(), "C=O".into());
        let vars = item.template_vars();
        assert_eq!(vars.get("item"), Some("id1"));
        assert_eq!(vars.get("multiplicity"), Some("1"));
        assert_eq!(vars.get("param.smiles"), Some("C=O"));
    }
}
