#![cfg(test)]
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use harvestr_common::config::Config;
use harvestr_common::models::ap::WpsState;
use harvestr_common::models::harvest::{HarvestState, TransactionOutcome};
use harvestr_common::models::interface::InterfaceMode;
use harvestr_common::network::channels::ChannelPlan;
use harvestr_common::network::mac::{Bssid, Oui};
use harvestr_core::interface::{InterfaceManager, LeasePolicy};
use harvestr_core::pipeline::{Pipeline, PipelineReport};
use harvestr_core::store::{Store, StoreReader};
use tokio_util::sync::CancellationToken;

use crate::sim::{Air, Behaviour, SimAp};

const VULNERABLE: [u8; 3] = [0x00, 0x1A, 0x2B];

fn config(dir: &Path) -> Config {
    let mut cfg = Config::default();
    cfg.scan.channels = ChannelPlan::new([1, 6, 11]);
    cfg.scan.dwell = Duration::from_millis(200);
    cfg.scoring.vulnerable_ouis = vec![Oui(VULNERABLE)];
    cfg.store.path = dir.join("harvest.jsonl");
    cfg.store.backoff = Duration::from_millis(1);
    cfg
}

/// Runs the pipeline over `air` for `duration` of virtual time.
async fn run_for(air: &Air, cfg: Config, duration: Duration) -> PipelineReport {
    let policy = LeasePolicy {
        scan_mode: InterfaceMode::Monitor,
        timeout: cfg.timeouts.lease,
    };
    let manager = InterfaceManager::new(
        "sim0",
        Arc::new(air.control(InterfaceMode::Managed)),
        policy,
        InterfaceMode::Managed,
    );
    let store = Store::open(&cfg.store).await.unwrap();
    let pipeline = Pipeline::new(cfg, manager, Box::new(air.source()), Some(Box::new(air.link())), store);

    let cancel = CancellationToken::new();
    let stopper = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            cancel.cancel();
        })
    };

    let report = pipeline.run(cancel).await.unwrap();
    stopper.await.unwrap();
    report
}

fn neighbourhood() -> (Air, Bssid) {
    let best = Bssid::new(VULNERABLE[0], VULNERABLE[1], VULNERABLE[2], 0x10, 0x20, 0x40);
    let aps = vec![
        SimAp::new(Bssid::new(0x02, 0, 0, 0, 0, 0x70), "seventy", 1, -70),
        SimAp::new(Bssid::new(0x02, 0, 0, 0, 0, 0x60), "sixty", 6, -60),
        SimAp::new(Bssid::new(0x02, 0, 0, 0, 0, 0x50), "fifty", 11, -50),
        SimAp::new(best, "forty", 6, -40),
        SimAp::new(Bssid::new(0x02, 0, 0, 0, 0, 0x80), "eighty", 1, -80),
    ];
    (Air::new(aps), best)
}

#[tokio::test(start_paused = true)]
async fn vulnerable_strong_ap_is_harvested_first() {
    let dir = tempfile::tempdir().unwrap();
    let (air, best) = neighbourhood();
    let cfg = config(dir.path());
    let store_path = cfg.store.path.clone();

    let report = run_for(&air, cfg, Duration::from_secs(5)).await;

    // The hop plan is [1, 6, 11] and the best AP sits on 6, after two weaker ones on 1.
    let associations = air.associations();
    assert!(!associations.is_empty(), "nothing was harvested");
    assert_eq!(associations[0].bssid, best);
    assert!(report.scan.sweeps >= 1);

    assert_eq!(report.records.len(), 5);
    assert_eq!(report.records[0].bssid, best);
    assert!(report.attempts.is_empty(), "unexpected failures: {:?}", report.attempts);

    let stored = StoreReader::open(&store_path).captures_for(best).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].outcome(), TransactionOutcome::CompleteM3);

    let enrollee = air.ap(best).unwrap().enrollee;
    assert_eq!(stored[0].pke(), enrollee.public_key().as_slice());
    assert_eq!(stored[0].e_nonce(), enrollee.e_nonce().as_slice());
    assert_eq!(stored[0].enrollee_mac(), best);

    // Every AP gets a snapshot when it first shows up.
    let snapshots = StoreReader::open(&store_path).snapshots().unwrap();
    assert_eq!(snapshots.len(), 5);

    // Monitor for the whole run, then back to where it started.
    assert_eq!(air.modes().first(), Some(&InterfaceMode::Monitor));
    assert_eq!(air.modes().last(), Some(&InterfaceMode::Managed));
    assert!(air.channels().contains(&6));
}

#[tokio::test(start_paused = true)]
async fn each_target_is_harvested_once_per_cooldown() {
    let dir = tempfile::tempdir().unwrap();
    let (air, _) = neighbourhood();
    let report = run_for(&air, config(dir.path()), Duration::from_secs(20)).await;

    assert_eq!(report.captures.len(), 5);
    let mut harvested: Vec<Bssid> = air.associations().iter().map(|a| a.bssid).collect();
    harvested.sort();
    harvested.dedup();
    assert_eq!(harvested.len(), 5);
    assert_eq!(air.associations().len(), 5);
}

#[tokio::test(start_paused = true)]
async fn silent_target_times_out_and_rests() {
    let dir = tempfile::tempdir().unwrap();
    let bssid = Bssid::new(0x02, 0, 0, 0, 0, 0x99);
    let air = Air::new(vec![SimAp::new(bssid, "quiet", 6, -50).behaving(Behaviour::Silent)]);

    let mut cfg = config(dir.path());
    cfg.scheduler.cooldown = Duration::from_secs(30);
    let m1_timeout = cfg.timeouts.m1;
    let cooldown = cfg.scheduler.cooldown;
    let store_path = cfg.store.path.clone();

    let report = run_for(&air, cfg, Duration::from_secs(45)).await;

    let associations = air.associations();
    assert_eq!(associations.len(), 2, "expected exactly one retry after the cooldown");
    let gap = associations[1].at.duration_since(associations[0].at);
    assert!(gap >= m1_timeout + cooldown, "retried after {gap:?}");

    let first = &report.attempts[0];
    assert_eq!(first.outcome, TransactionOutcome::Timeout);
    assert_eq!(first.state, HarvestState::AwaitM1);

    // The retry was still waiting for M1 when the run ended.
    assert_eq!(report.attempts.len(), 2);
    assert_eq!(report.attempts[1].outcome, TransactionOutcome::Error);

    let reader = StoreReader::open(&store_path);
    assert!(reader.captures().unwrap().is_empty());
    assert_eq!(reader.attempts().unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn locked_target_is_rejected_once() {
    let dir = tempfile::tempdir().unwrap();
    let bssid = Bssid::new(0x02, 0, 0, 0, 0, 0x15);
    let air = Air::new(vec![SimAp::new(bssid, "locked", 11, -45).behaving(Behaviour::Locked)]);

    let report = run_for(&air, config(dir.path()), Duration::from_secs(10)).await;

    assert_eq!(air.associations().len(), 1);
    assert_eq!(report.attempts.len(), 1);
    assert_eq!(report.attempts[0].outcome, TransactionOutcome::Rejected);
    assert!(report.attempts[0].reason.contains("15"), "{}", report.attempts[0].reason);
    assert!(report.captures.is_empty());
}

#[tokio::test(start_paused = true)]
async fn wps_less_targets_are_only_surveyed() {
    let dir = tempfile::tempdir().unwrap();
    let air = Air::new(vec![
        SimAp::new(Bssid::new(0x02, 0, 0, 0, 0, 0x01), "plain", 1, -40).wps(WpsState::None),
        SimAp::new(Bssid::new(0x02, 0, 0, 0, 0, 0x02), "closed", 6, -40).wps(WpsState::Locked),
    ]);

    let report = run_for(&air, config(dir.path()), Duration::from_secs(5)).await;

    assert_eq!(report.records.len(), 2);
    assert!(air.associations().is_empty());
    assert!(report.scan.dropped > 0);
}
