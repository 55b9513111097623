pub mod builders;
pub mod fake_tool;

use std::path::{Path, PathBuf};
use std::sync::Once;

use pipeshard::items::WorkItem;
use pipeshard::logging::LOG_ENV_VAR;
use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// Output goes through the test writer, so it only shows up for failing
/// tests (or with `--nocapture`). Levels come from `PIPESHARD_LOG`, e.g.
/// `PIPESHARD_LOG=pipeshard::stage=debug cargo test`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = std::env::var(LOG_ENV_VAR)
            .ok()
            .and_then(|directives| EnvFilter::try_new(directives).ok())
            .unwrap_or_else(|| EnvFilter::new("warn"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Write `items` in the JSON item-list format and return the file path.
pub fn write_items_file(dir: &Path, items: &[WorkItem]) -> PathBuf {
    let list: Vec<serde_json::Value> = items
        .iter()
        .map(|item| {
            serde_json::json!({
                "id": item.id,
                "charge": item.charge,
                "multiplicity": item.multiplicity,
                "geometry": item.geometry,
                "params": item.params,
            })
        })
        .collect();
    let path = dir.join("items.json");
    std::fs::write(&path, serde_json::to_vec_pretty(&list).unwrap()).unwrap();
    path
}
