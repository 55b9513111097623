// src/layout.rs

//! On-disk layout of a pipeline run.
//!
//! ```text
//! <output_root>/
//!   items/<item>/                     durable per-item directory
//!   items/<item>/<stage>.zip          result bundle
//!   items/<item>/<stage>_results.csv  compiled rows for one item
//!   items/<item>/<stage>.excluded     why the item has no compiled rows
//!   claims/<item>.unclaimed|.claimed  claim descriptors
//!   checkpoints/shard_<i>_of_<n>.json
//!   results/<stage>_shard_<i>_of_<n>.csv
//! <scratch_root>/<stage>/<item>/      per-attempt workspace
//! ```

use std::path::{Path, PathBuf};

use crate::claim::ShardSpec;
use crate::config::model::ConfigSection;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    output_root: PathBuf,
    scratch_root: PathBuf,
}

impl Layout {
    pub fn new(output_root: impl Into<PathBuf>, scratch_root: Option<PathBuf>) -> Self {
        let output_root = output_root.into();
        let scratch_root = scratch_root.unwrap_or_else(|| output_root.join("scratch"));
        Self {
            output_root,
            scratch_root,
        }
    }

    pub fn from_config(section: &ConfigSection) -> Self {
        Self::new(section.output_root.clone(), section.scratch_root.clone())
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn item_dir(&self, item: &str) -> PathBuf {
        self.output_root.join("items").join(item)
    }

    pub fn claims_dir(&self) -> PathBuf {
        self.output_root.join("claims")
    }

    pub fn checkpoint_path(&self, shard: ShardSpec) -> PathBuf {
        self.output_root
            .join("checkpoints")
            .join(format!("shard_{}_of_{}.json", shard.index, shard.count))
    }

    pub fn workspace(&self, stage: &str, item: &str) -> PathBuf {
        self.scratch_root.join(stage).join(item)
    }

    pub fn bundle_path(&self, item: &str, stage: &str) -> PathBuf {
        self.item_dir(item).join(format!("{stage}.zip"))
    }

    /// Written instead of the item table when compilation excluded the item.
    pub fn exclusion_marker_path(&self, item: &str, stage: &str) -> PathBuf {
        self.item_dir(item).join(format!("{stage}.excluded"))
    }

    pub fn item_table_path(&self, item: &str, stage: &str) -> PathBuf {
        self.item_dir(item).join(format!("{stage}_results.csv"))
    }

    pub fn shard_table_path(&self, stage: &str, shard: ShardSpec) -> PathBuf {
        self.output_root.join("results").join(format!(
            "{stage}_shard_{}_of_{}.csv",
            shard.index, shard.count
        ))
    }
}
