// tests/cli_run.rs

use std::fs;
use std::path::Path;

use clap::Parser;
use pipeshard::cli::CliArgs;
use pipeshard::engine::summary::EXIT_OK;
use pipeshard_test_utils::builders::numbered_items;
use pipeshard_test_utils::{init_tracing, write_items_file};

const COPY_PIPELINE: &str = r#"
[vars]
cp = "cp"

[stage.copy]
artifacts = ["{item}.copy"]

[[stage.copy.input]]
path = "{item}.xyz"
content = "{geometry}\n"

[[stage.copy.run]]
program = "{cp}"
args = ["{item}.xyz", "{item}.copy"]
"#;

fn write_config(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("Pipeshard.toml");
    fs::write(&path, COPY_PIPELINE).unwrap();
    path
}

fn args(dir: &Path, extra: &[&str]) -> CliArgs {
    let config = write_config(dir);
    let items = write_items_file(dir, &numbered_items(2));
    let out = dir.join("out");
    let mut argv = vec![
        "pipeshard".to_string(),
        "--config".to_string(),
        config.display().to_string(),
        "--items".to_string(),
        items.display().to_string(),
        "--output-root".to_string(),
        out.display().to_string(),
    ];
    argv.extend(extra.iter().map(|s| s.to_string()));
    CliArgs::try_parse_from(argv).unwrap()
}

#[tokio::test]
async fn dry_run_touches_nothing() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();

    let code = pipeshard::run(args(dir.path(), &["--dry-run"])).await.unwrap();

    assert_eq!(code, EXIT_OK);
    assert!(!dir.path().join("out").exists());
}

#[tokio::test]
async fn missing_config_is_an_error() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let mut args = args(dir.path(), &[]);
    args.config = dir.path().join("nope.toml");

    assert!(pipeshard::run(args).await.is_err());
}

#[tokio::test]
async fn invalid_shard_is_an_error() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let args = args(dir.path(), &["--shard-index", "2", "--shard-count", "2"]);

    assert!(pipeshard::run(args).await.is_err());
}

#[cfg(unix)]
#[tokio::test]
async fn runs_real_commands_end_to_end() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");

    let code = pipeshard::run(args(dir.path(), &[])).await.unwrap();
    assert_eq!(code, EXIT_OK);

    let copied = fs::read_to_string(out.join("items/id000001/id000001.copy")).unwrap();
    assert_eq!(copied, "C 0.0 0.0 0.0\n");
    assert!(out.join("items/id000001/copy.zip").is_file());

    let checkpoint = fs::read_to_string(out.join("checkpoints/shard_0_of_1.json")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&checkpoint).unwrap();
    assert_eq!(json, serde_json::json!({ "copy": ["id000000", "id000001"] }));

    // The overridden binary would fail, but completed items are skipped.
    let rerun = pipeshard::run(args(dir.path(), &["--var", "cp=/nonexistent/cp"]))
        .await
        .unwrap();
    assert_eq!(rerun, EXIT_OK, "completed items are not re-run");
}

#[cfg(unix)]
#[tokio::test]
async fn missing_binary_is_retryable() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();

    let code = pipeshard::run(args(dir.path(), &["--var", "cp=/nonexistent/cp"]))
        .await
        .unwrap();

    assert_eq!(code, pipeshard::engine::summary::EXIT_RETRYABLE);
    let claims = dir.path().join("out/claims");
    assert!(claims.join("id000000.unclaimed").is_file());
    assert!(dir.path().join("out/scratch/copy/id000000").is_dir());
}
