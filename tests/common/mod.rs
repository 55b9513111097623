#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use pipeshard::checkpoint::CheckpointStore;
use pipeshard::claim::ShardSpec;
use pipeshard::config::ConfigFile;
use pipeshard::engine::Worker;
use pipeshard::exec::ExternalTool;
use pipeshard::layout::Layout;
use pipeshard::pipeline::Pipeline;

pub use pipeshard_test_utils::init_tracing;

/// A temporary output root plus the pipeline built from a config.
pub struct Harness {
    pub dir: TempDir,
    pub pipeline: Arc<Pipeline>,
    pub layout: Layout,
    pub vars: BTreeMap<String, String>,
}

impl Harness {
    /// `make_config` receives the output root to put into `[config]`.
    pub fn new(make_config: impl FnOnce(&Path) -> ConfigFile) -> Self {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let cfg = make_config(&dir.path().join("out"));
        Self::from_parts(dir, cfg)
    }

    fn from_parts(dir: TempDir, cfg: ConfigFile) -> Self {
        let pipeline = Arc::new(Pipeline::from_config(&cfg).unwrap());
        let layout = Layout::from_config(&cfg.config);
        Self {
            dir,
            pipeline,
            layout,
            vars: cfg.vars.clone(),
        }
    }

    /// Same output root, different configuration (e.g. an extra condition).
    pub fn reconfigure(self, make_config: impl FnOnce(&Path) -> ConfigFile) -> Self {
        let cfg = make_config(&self.dir.path().join("out"));
        Self::from_parts(self.dir, cfg)
    }

    pub fn worker(&self, tool: Arc<dyn ExternalTool>, shard: ShardSpec) -> Worker {
        Worker::new(
            Arc::clone(&self.pipeline),
            self.layout.clone(),
            shard,
            tool,
            self.vars.clone(),
        )
    }

    pub fn store(&self, shard: ShardSpec) -> CheckpointStore {
        CheckpointStore::open(self.layout.checkpoint_path(shard), Arc::clone(&self.pipeline))
            .unwrap()
    }

    pub fn checkpoint_json(&self, shard: ShardSpec) -> serde_json::Value {
        let text = std::fs::read_to_string(self.layout.checkpoint_path(shard)).unwrap();
        serde_json::from_str(&text).unwrap()
    }

    pub fn item_file(&self, item: &str, name: &str) -> PathBuf {
        self.layout.item_dir(item).join(name)
    }
}
