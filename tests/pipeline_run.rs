// tests/pipeline_run.rs

mod common;

use std::fs;
use std::sync::Arc;

use pipeshard::claim::{ClaimState, ShardSpec, WorkClaimer};
use pipeshard::engine::summary::{EXIT_ITEM_FAILED, EXIT_OK, EXIT_RETRYABLE};
use pipeshard::errors::PipeshardError;
use pipeshard_test_utils::builders::{
    TEMPERATURES, cosmo_pipeline, cosmo_pipeline_with_conditions, numbered_items, summary_stage,
};
use pipeshard_test_utils::fake_tool::{FakeTool, gsolv_at, write_tab};

use common::Harness;

const SHARD: ShardSpec = ShardSpec { index: 0, count: 1 };

fn shard_table(h: &Harness) -> String {
    fs::read_to_string(h.layout.shard_table_path("cosmotherm", SHARD)).unwrap()
}

fn claimer(h: &Harness) -> WorkClaimer {
    WorkClaimer::new(h.layout.claims_dir(), SHARD)
}

#[tokio::test]
async fn full_run_completes_every_item() {
    let h = Harness::new(|out| cosmo_pipeline(out).build());
    let items = numbered_items(3);
    let tool = Arc::new(FakeTool::cosmo());

    let summary = h.worker(tool.clone(), SHARD).run(&items).await.unwrap();

    assert_eq!(summary.succeeded.len(), 3);
    assert!(summary.failed.is_empty());
    assert!(summary.skipped.is_empty());
    assert_eq!(summary.exit_code(), EXIT_OK);
    // One QM run plus one COSMOtherm run per condition, per item.
    assert_eq!(summary.invocations, 9);
    assert_eq!(tool.count(), 9);

    let table = shard_table(&h);
    assert_eq!(table.lines().count(), 1 + 3 * 6);
    let derived: Vec<_> = table.lines().filter(|l| l.ends_with(",54.43000000")).collect();
    assert_eq!(derived.len(), 6);
    assert!(table.lines().nth(1).unwrap().starts_with("id000000,water,"));
    assert!(table.lines().last().unwrap().starts_with("id000002,benzene,"));

    for item in &items {
        assert_eq!(claimer(&h).state(&item.id), ClaimState::Absent);
        assert!(h.layout.bundle_path(&item.id, "cosmotherm").is_file());
    }
}

#[tokio::test]
async fn rerun_of_completed_batch_is_a_no_op() {
    let h = Harness::new(|out| cosmo_pipeline(out).build());
    let items = numbered_items(4);

    h.worker(Arc::new(FakeTool::cosmo()), SHARD)
        .run(&items)
        .await
        .unwrap();
    let first_table = fs::read(h.layout.shard_table_path("cosmotherm", SHARD)).unwrap();
    let first_checkpoint = h.checkpoint_json(SHARD);

    let tool = Arc::new(FakeTool::cosmo());
    let summary = h.worker(tool.clone(), SHARD).run(&items).await.unwrap();

    assert_eq!(tool.count(), 0);
    assert_eq!(summary.invocations, 0);
    assert_eq!(summary.succeeded.len(), 4);
    assert_eq!(
        fs::read(h.layout.shard_table_path("cosmotherm", SHARD)).unwrap(),
        first_table
    );
    assert_eq!(h.checkpoint_json(SHARD), first_checkpoint);
    assert!(!h.layout.claims_dir().join("id000000.unclaimed").exists());
}

#[tokio::test]
async fn failing_item_does_not_affect_the_others() {
    let h = Harness::new(|out| cosmo_pipeline(out).build());
    let items = numbered_items(3);
    let tool = Arc::new(FakeTool::cosmo().fail_when("id000001_benzene"));

    let summary = h.worker(tool.clone(), SHARD).run(&items).await.unwrap();

    assert_eq!(summary.exit_code(), EXIT_RETRYABLE);
    assert_eq!(
        summary.succeeded.iter().collect::<Vec<_>>(),
        vec!["id000000", "id000002"]
    );
    let failures = &summary.failed["id000001"];
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].stage.as_deref(), Some("cosmotherm"));
    assert!(failures[0].retryable());

    // Scratch and the completed condition's artifact stay for inspection.
    assert!(h.layout.workspace("cosmotherm", "id000001").is_dir());
    assert!(h.item_file("id000001", "id000001_water.tab").is_file());
    assert!(h.item_file("id000001", "id000001.cosmo").is_file());
    assert!(!h.layout.bundle_path("id000001", "cosmotherm").exists());

    // The claim is handed back for a later run.
    assert_eq!(claimer(&h).state("id000001"), ClaimState::Unclaimed);

    let table = shard_table(&h);
    assert!(!table.contains("id000001"));
    assert_eq!(table.lines().count(), 1 + 2 * 6);
}

#[tokio::test]
async fn resume_runs_only_outstanding_conditions() {
    let h = Harness::new(|out| cosmo_pipeline(out).build());
    let items = numbered_items(3);

    h.worker(
        Arc::new(FakeTool::cosmo().fail_when("id000001_benzene")),
        SHARD,
    )
    .run(&items)
    .await
    .unwrap();

    let tool = Arc::new(FakeTool::cosmo());
    let summary = h.worker(tool.clone(), SHARD).run(&items).await.unwrap();

    assert_eq!(summary.exit_code(), EXIT_OK);
    assert_eq!(tool.count(), 1);
    assert_eq!(tool.invocations()[0].args, vec!["id000001_benzene.inp".to_string()]);

    let table = shard_table(&h);
    let ids: Vec<_> = table
        .lines()
        .skip(1)
        .map(|l| l.split(',').next().unwrap())
        .collect();
    let mut expected = Vec::new();
    for id in ["id000000", "id000001", "id000002"] {
        expected.extend(std::iter::repeat_n(id, 6));
    }
    assert_eq!(ids, expected);
    assert!(!h.layout.workspace("cosmotherm", "id000001").exists());
    assert_eq!(claimer(&h).state("id000001"), ClaimState::Absent);
}

#[tokio::test]
async fn new_failing_condition_rolls_back_downstream_stage() {
    let h = Harness::new(|out| {
        cosmo_pipeline(out)
            .with_stage("summary", summary_stage())
            .build()
    });
    let items = numbered_items(2);

    let first = h
        .worker(Arc::new(FakeTool::cosmo()), SHARD)
        .run(&items)
        .await
        .unwrap();
    assert_eq!(first.exit_code(), EXIT_OK);
    assert!(h.store(SHARD).is_pipeline_complete("id000000"));

    // Add a condition whose runs fail.
    let h = h.reconfigure(|out| {
        cosmo_pipeline_with_conditions(
            out,
            &[("water", "h2o"), ("benzene", "c6h6"), ("octanol", "c8h18o")],
        )
        .with_stage("summary", summary_stage())
        .build()
    });
    let tool = Arc::new(FakeTool::cosmo().fail_when("octanol"));
    let second = h.worker(tool.clone(), SHARD).run(&items).await.unwrap();

    assert_eq!(second.exit_code(), EXIT_RETRYABLE);
    assert_eq!(tool.count(), 2, "only the new condition is attempted");

    let store = h.store(SHARD);
    for item in &items {
        let id = item.id.as_str();
        assert!(!store.is_complete("summary", id, None));
        assert!(!store.is_stage_complete("cosmotherm", id));
        let done = store.completed_conditions("cosmotherm", id);
        assert_eq!(
            done.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["benzene", "water"]
        );
        assert!(store.is_stage_complete("sp", id));
    }

    let json = h.checkpoint_json(SHARD);
    assert_eq!(json["summary"], serde_json::json!([]));
}

#[tokio::test]
async fn recorded_stage_without_bundle_is_finished_on_rerun() {
    let h = Harness::new(|out| cosmo_pipeline(out).build());
    let items = numbered_items(2);
    h.worker(Arc::new(FakeTool::cosmo()), SHARD)
        .run(&items)
        .await
        .unwrap();

    // Put id000000 back where a crash right after the last condition was
    // recorded would leave it: artifacts copied out, no bundle, no table.
    let points: Vec<(f64, f64)> = TEMPERATURES.iter().map(|t| (*t, gsolv_at(*t))).collect();
    for (condition, solvent) in [("water", "h2o"), ("benzene", "c6h6")] {
        let tab = h.item_file("id000000", &format!("id000000_{condition}.tab"));
        write_tab(&tab, solvent, "id000000", &points).unwrap();
    }
    fs::remove_file(h.layout.bundle_path("id000000", "cosmotherm")).unwrap();
    fs::remove_file(h.layout.item_table_path("id000000", "cosmotherm")).unwrap();
    assert!(h.store(SHARD).is_stage_complete("cosmotherm", "id000000"));

    let tool = Arc::new(FakeTool::cosmo());
    let summary = h.worker(tool.clone(), SHARD).run(&items).await.unwrap();

    assert_eq!(summary.exit_code(), EXIT_OK);
    assert_eq!(tool.count(), 0);
    assert!(h.layout.bundle_path("id000000", "cosmotherm").is_file());
    assert!(h.layout.item_table_path("id000000", "cosmotherm").is_file());
    assert!(!h.item_file("id000000", "id000000_water.tab").exists());
    assert!(!h.item_file("id000000", "id000000_benzene.tab").exists());
    assert_eq!(claimer(&h).state("id000000"), ClaimState::Absent);

    let table = shard_table(&h);
    assert_eq!(table.lines().count(), 1 + 2 * 6);
    assert_eq!(table.lines().filter(|l| l.starts_with("id000000,")).count(), 6);
}

#[tokio::test]
async fn excluded_item_stays_excluded_on_rerun() {
    let h = Harness::new(|out| cosmo_pipeline(out).build());
    let items = numbered_items(1);

    // No job at the upper neighbour, so the enthalpy cannot be derived.
    let tool = Arc::new(FakeTool::cosmo_without(299.15));
    let first = h.worker(tool.clone(), SHARD).run(&items).await.unwrap();

    assert_eq!(first.exit_code(), EXIT_ITEM_FAILED);
    assert!(first.failed.contains_key("id000000"));
    assert!(h.layout.bundle_path("id000000", "cosmotherm").is_file());
    assert!(h.layout.exclusion_marker_path("id000000", "cosmotherm").is_file());
    assert!(!h.layout.item_table_path("id000000", "cosmotherm").exists());

    let tool = Arc::new(FakeTool::cosmo());
    let second = h.worker(tool.clone(), SHARD).run(&items).await.unwrap();

    assert_eq!(tool.count(), 0);
    assert_eq!(second.exit_code(), EXIT_ITEM_FAILED);
    assert!(second.succeeded.is_empty());
    let failures = &second.failed["id000000"];
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].stage.as_deref(), Some("cosmotherm"));
    assert!(matches!(
        failures[0].error,
        PipeshardError::ExcludedFromResults { .. }
    ));
    assert_eq!(shard_table(&h).lines().count(), 1);
}

#[tokio::test]
async fn shards_split_the_work() {
    let h = Harness::new(|out| cosmo_pipeline(out).build());
    let items = numbered_items(5);

    let even = ShardSpec::new(0, 2).unwrap();
    let odd = ShardSpec::new(1, 2).unwrap();
    let a = h.worker(Arc::new(FakeTool::cosmo()), even).run(&items).await.unwrap();
    let b = h.worker(Arc::new(FakeTool::cosmo()), odd).run(&items).await.unwrap();

    assert_eq!(
        a.succeeded.iter().collect::<Vec<_>>(),
        vec!["id000000", "id000002", "id000004"]
    );
    assert_eq!(b.succeeded.iter().collect::<Vec<_>>(), vec!["id000001", "id000003"]);
    assert!(h.layout.checkpoint_path(even).is_file());
    assert!(h.layout.checkpoint_path(odd).is_file());

    let odd_table = fs::read_to_string(h.layout.shard_table_path("cosmotherm", odd)).unwrap();
    assert_eq!(odd_table.lines().count(), 1 + 2 * 6);
}

#[tokio::test]
async fn stale_claims_fail_until_swept() {
    let h = Harness::new(|out| cosmo_pipeline(out).build());
    let items = numbered_items(2);

    // A worker died while holding id000001.
    let claims = claimer(&h);
    claims.offer("id000001").unwrap();
    claims.claim("id000001").unwrap();

    let tool = Arc::new(FakeTool::cosmo());
    let summary = h.worker(tool.clone(), SHARD).run(&items).await.unwrap();
    assert_eq!(summary.exit_code(), EXIT_ITEM_FAILED);
    assert!(matches!(
        summary.failed["id000001"][0].error,
        PipeshardError::StaleClaim { .. }
    ));
    assert!(summary.succeeded.contains("id000000"));
    assert_eq!(tool.count(), 3);

    let summary = h
        .worker(tool.clone(), SHARD)
        .with_stale_claim_sweep(true)
        .run(&items)
        .await
        .unwrap();
    assert_eq!(summary.exit_code(), EXIT_OK);
    assert_eq!(tool.count(), 6);
    assert_eq!(claims.state("id000001"), ClaimState::Absent);
}

#[tokio::test]
async fn corrupt_checkpoint_stops_the_worker() {
    let h = Harness::new(|out| cosmo_pipeline(out).build());
    let path = h.layout.checkpoint_path(SHARD);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, "[1, 2, 3]").unwrap();

    let tool = Arc::new(FakeTool::cosmo());
    let err = h
        .worker(tool.clone(), SHARD)
        .run(&numbered_items(2))
        .await
        .unwrap_err();
    assert!(matches!(err, PipeshardError::CheckpointCorruption { .. }));
    assert_eq!(tool.count(), 0);
}
