// tests/claims.rs

mod common;

use std::fs;
use std::sync::{Arc, Barrier};
use std::thread;

use pipeshard::claim::{ClaimState, ShardSpec, WorkClaimer};

#[test]
fn exactly_one_racing_thread_wins_a_claim() {
    common::init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let claims = dir.path().join("claims");

    for round in 0..20 {
        let item = format!("id{round:04}");
        let threads = 8;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                let claimer = WorkClaimer::new(&claims, ShardSpec::single());
                let item = item.clone();
                thread::spawn(move || {
                    claimer.offer(&item).unwrap();
                    barrier.wait();
                    claimer.claim(&item).unwrap()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1, "round {round}");

        let claimer = WorkClaimer::new(&claims, ShardSpec::single());
        assert_eq!(claimer.state(&item), ClaimState::Claimed);
    }
}

#[test]
fn racing_offer_and_claim_has_one_owner() {
    common::init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let claims = dir.path().join("claims");

    for round in 0..500 {
        let item = format!("id{round:04}");
        let threads = 4;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                let claimer = WorkClaimer::new(&claims, ShardSpec::single());
                let item = item.clone();
                thread::spawn(move || {
                    barrier.wait();
                    claimer.offer(&item).unwrap();
                    claimer.claim(&item).unwrap()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1, "round {round}");
        assert!(!claims.join(format!("{item}.unclaimed")).exists(), "round {round}");
    }
}

#[test]
fn late_offer_after_claim_cannot_win() {
    let dir = tempfile::tempdir().unwrap();
    let winner = WorkClaimer::new(dir.path(), ShardSpec::single());
    let late = WorkClaimer::new(dir.path(), ShardSpec::single());

    winner.offer("a").unwrap();
    assert!(winner.claim("a").unwrap());

    // An offer that checked for the claimed descriptor just before the
    // winner's claim still gets to create its unclaimed file.
    fs::write(dir.path().join("a.unclaimed"), "a").unwrap();
    assert!(!late.claim("a").unwrap());
    assert_eq!(late.state("a"), ClaimState::Claimed);
    assert!(!dir.path().join("a.unclaimed").exists());
    assert!(
        fs::read_to_string(dir.path().join("a.claimed"))
            .unwrap()
            .starts_with("worker 0/1")
    );
}

#[test]
fn offer_is_create_if_absent() {
    let dir = tempfile::tempdir().unwrap();
    let claimer = WorkClaimer::new(dir.path(), ShardSpec::single());

    assert_eq!(claimer.state("a"), ClaimState::Absent);
    assert!(claimer.offer("a").unwrap());
    assert!(!claimer.offer("a").unwrap());
    assert_eq!(fs::read_to_string(dir.path().join("a.unclaimed")).unwrap(), "a");

    assert!(claimer.claim("a").unwrap());
    assert!(!claimer.offer("a").unwrap(), "claimed items are not re-offered");
    assert!(!dir.path().join("a.unclaimed").exists());
    assert!(!claimer.claim("a").unwrap());
}

#[test]
fn claimed_descriptor_records_the_owner() {
    let dir = tempfile::tempdir().unwrap();
    let claimer = WorkClaimer::new(dir.path(), ShardSpec::new(1, 3).unwrap());
    claimer.offer("a").unwrap();
    claimer.claim("a").unwrap();

    let owner = fs::read_to_string(dir.path().join("a.claimed")).unwrap();
    assert!(owner.starts_with("worker 1/3 pid "), "{owner}");
}

#[test]
fn release_relinquish_and_sweep() {
    let dir = tempfile::tempdir().unwrap();
    let claimer = WorkClaimer::new(dir.path(), ShardSpec::single());
    for item in ["a", "b", "c"] {
        claimer.offer(item).unwrap();
        claimer.claim(item).unwrap();
    }

    claimer.release("a").unwrap();
    assert_eq!(claimer.state("a"), ClaimState::Absent);
    claimer.release("a").unwrap();

    claimer.relinquish("b").unwrap();
    assert_eq!(claimer.state("b"), ClaimState::Unclaimed);

    let swept = claimer.sweep_stale(["a", "b", "c"]).unwrap();
    assert_eq!(swept, vec!["c".to_string()]);
    assert_eq!(claimer.state("c"), ClaimState::Unclaimed);
    assert!(claimer.claim("c").unwrap());
}
