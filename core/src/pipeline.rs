//! # Pipeline
//!
//! One coordinating loop owns the [`Registry`], the [`Scheduler`] and the [`Store`].
//! The scanner runs beside it as a task and feeds it sightings; at most one harvest
//! task runs at a time and hands its link back together with the result.
//!
//! ```text
//!   scanner ──sightings──▶ registry ──scores──▶ scheduler ──pop──▶ harvest task
//!                              │                    ▲                   │
//!                              ▼                    └──cooldown─────────┤
//!                            store ◀──────────captures / attempts───────┘
//! ```
//!
//! Nothing is harvested before the scanner has finished one full channel sweep, so the
//! first target is chosen from the whole neighbourhood rather than from the first
//! channel that happened to be tuned.
//!
//! Per-target failures end in cooldown and a stored attempt. Interface and store
//! failures stop the loop and come back to the caller.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use harvestr_common::config::{Config, ScanBackend};
use harvestr_common::error::{ConfigError, HarvestTransactionError, InterfaceError, StoreWriteError};
use harvestr_common::models::ap::{ApRecord, Sighting};
use harvestr_common::models::crypto::{HarvestAttempt, WpsCryptoMaterial};
use harvestr_common::models::harvest::TransactionOutcome;
use harvestr_common::models::interface::{InterfaceMode, LeaseKind};
use harvestr_common::network::mac::Bssid;
use harvestr_common::success;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::harvester::{Harvester, MonitorLink, WpsLink};
use crate::interface::{InterfaceManager, IwModeControl, LeasePolicy};
use crate::registry::Registry;
use crate::scanner::{FrameSource, IwScanSource, MonitorCapture, ScanEvent, ScanStats, Scanner};
use crate::scheduler::{Scheduler, Scorer};
use crate::store::{Store, StoreEntry};

const SCAN_QUEUE: usize = 256;
const EVICTION_PERIOD: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Interface(#[from] InterfaceError),

    #[error(transparent)]
    Store(#[from] StoreWriteError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{0} task panicked")]
    Task(&'static str),
}

/// What a run leaves behind.
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    /// Every record still in the registry, best score first.
    pub records: Vec<ApRecord>,
    pub captures: Vec<WpsCryptoMaterial>,
    pub attempts: Vec<HarvestAttempt>,
    pub scan: ScanStats,
}

pub struct Pipeline {
    config: Config,
    manager: InterfaceManager,
    source: Box<dyn FrameSource>,
    /// `None` runs the pipeline as a scan-only survey.
    link: Option<Box<dyn WpsLink>>,
    store: Store,
    sweeps: Option<u64>,
    only: Option<Bssid>,
}

enum HarvestFailure {
    Transaction(HarvestTransactionError),
    Interface(InterfaceError),
    Cancelled,
}

struct HarvestReport {
    bssid: Bssid,
    link: Box<dyn WpsLink>,
    result: Result<WpsCryptoMaterial, HarvestFailure>,
}

impl Pipeline {
    pub fn new(
        config: Config,
        manager: InterfaceManager,
        source: Box<dyn FrameSource>,
        link: Option<Box<dyn WpsLink>>,
        store: Store,
    ) -> Self {
        Self {
            config,
            manager,
            source,
            link,
            store,
            sweeps: None,
            only: None,
        }
    }

    /// Stops on its own after `sweeps` full passes over the channel plan.
    pub fn sweeps(mut self, sweeps: Option<u64>) -> Self {
        self.sweeps = sweeps;
        self
    }

    /// Ignores every access point but `bssid`.
    pub fn only(mut self, bssid: Option<Bssid>) -> Self {
        self.only = bssid;
        self
    }

    /// Wires the real radio behind `interface` according to `config`.
    pub async fn for_interface(config: Config, interface: &str, harvest: bool) -> Result<Self, PipelineError> {
        IwModeControl::preflight(interface)?;

        let scan_mode = match config.backend {
            ScanBackend::Monitor => InterfaceMode::Monitor,
            ScanBackend::Iw => InterfaceMode::Managed,
        };
        let policy = LeasePolicy {
            scan_mode,
            timeout: config.timeouts.lease,
        };
        let manager = InterfaceManager::connect(interface, Arc::new(IwModeControl), policy).await?;

        let source: Box<dyn FrameSource> = match config.backend {
            ScanBackend::Monitor => Box::new(MonitorCapture::new(interface)),
            ScanBackend::Iw => Box::new(IwScanSource::new(interface)),
        };
        let link: Option<Box<dyn WpsLink>> = match harvest {
            true => Some(Box::new(MonitorLink::new(interface)?)),
            false => None,
        };
        let store = Store::open(&config.store).await?;

        Ok(Self::new(config, manager, source, link, store))
    }

    /// Runs until `cancel` fires or shared infrastructure fails.
    ///
    /// On the way out the in-flight harvest is cancelled and recorded, the store is
    /// flushed and the interface goes back to the mode it started in.
    pub async fn run(self, cancel: CancellationToken) -> Result<PipelineReport, PipelineError> {
        let Pipeline {
            config,
            manager,
            source,
            link,
            store,
            sweeps,
            only,
        } = self;

        let initial_mode = manager.state().mode;
        let mut coordinator = Coordinator {
            registry: Registry::new(&config.registry),
            scheduler: Scheduler::new(Scorer::new(&config.scoring)?, &config.scheduler),
            harvester: Harvester::new(config.timeouts),
            manager: manager.clone(),
            store,
            link,
            in_flight: None,
            swept: false,
            sweep_limit: sweeps,
            only,
            report: PipelineReport::default(),
        };

        let child = cancel.child_token();
        let (event_tx, event_rx) = mpsc::channel(SCAN_QUEUE);
        let (report_tx, report_rx) = mpsc::channel(1);
        let scanner = Scanner::new(source, config.scan.channels.clone(), config.scan.dwell);
        let scan_task = tokio::spawn(scanner.run(manager.clone(), event_tx, child.clone()));

        info!(interface = manager.name(), "pipeline started");
        let result = coordinator
            .run(&cancel, &child, event_rx, report_tx, report_rx, scan_task)
            .await;
        child.cancel();

        if let Err(e) = manager.set_mode(initial_mode).await {
            warn!(interface = manager.name(), "could not restore {initial_mode} mode: {e}");
        }

        let flushed = coordinator.store.flush().await;
        let mut report = result?;
        flushed?;

        let mut records: Vec<ApRecord> = coordinator.registry.iter().cloned().collect();
        records.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.discovered.cmp(&b.discovered)));
        report.records = records;
        Ok(report)
    }
}

struct Coordinator {
    registry: Registry,
    scheduler: Scheduler,
    harvester: Harvester,
    manager: InterfaceManager,
    store: Store,
    /// Present while idle; travels with the harvest task otherwise.
    link: Option<Box<dyn WpsLink>>,
    in_flight: Option<Bssid>,
    /// Set once the scanner has covered every channel.
    swept: bool,
    sweep_limit: Option<u64>,
    only: Option<Bssid>,
    report: PipelineReport,
}

impl Coordinator {
    async fn run(
        &mut self,
        cancel: &CancellationToken,
        child: &CancellationToken,
        mut events: mpsc::Receiver<ScanEvent>,
        report_tx: mpsc::Sender<HarvestReport>,
        mut reports: mpsc::Receiver<HarvestReport>,
        mut scan_task: JoinHandle<Result<ScanStats, InterfaceError>>,
    ) -> Result<PipelineReport, PipelineError> {
        let mut eviction = tokio::time::interval(EVICTION_PERIOD);
        let mut scan_done = false;

        let outcome = loop {
            self.dispatch(child, &report_tx);

            let wake = match self.link {
                Some(_) if self.swept => self.scheduler.next_ready(Instant::now()),
                _ => None,
            };
            let far = Instant::now() + Duration::from_secs(3600);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ok(()),
                Some(report) = reports.recv() => {
                    if let Err(e) = self.finish(report).await {
                        break Err(e);
                    }
                }
                event = events.recv(), if !scan_done => match event {
                    Some(event) => match self.absorb(event, &mut events).await {
                        Ok(ControlFlow::Continue(())) => {}
                        Ok(ControlFlow::Break(())) => break Ok(()),
                        Err(e) => break Err(e),
                    },
                    None => {
                        scan_done = true;
                        self.swept = true;
                        match (&mut scan_task).await {
                            Ok(Ok(stats)) => self.report.scan = stats,
                            Ok(Err(e)) => break Err(e.into()),
                            Err(_) => break Err(PipelineError::Task("scanner")),
                        }
                    }
                },
                _ = eviction.tick() => self.evict(),
                _ = tokio::time::sleep_until(wake.unwrap_or(far)), if wake.is_some() => {}
            }
        };

        child.cancel();
        let mut failure = outcome.err();

        if self.in_flight.is_some()
            && let Some(report) = reports.recv().await
            && let Err(e) = self.finish(report).await
        {
            failure.get_or_insert(e);
        }

        if !scan_done {
            drop(events);
            match scan_task.await {
                Ok(Ok(stats)) => self.report.scan = stats,
                Ok(Err(e)) => {
                    failure.get_or_insert(e.into());
                }
                Err(_) => {
                    failure.get_or_insert(PipelineError::Task("scanner"));
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(std::mem::take(&mut self.report)),
        }
    }

    /// Handles a scan event and whatever else is already queued behind it.
    async fn absorb(
        &mut self,
        first: ScanEvent,
        rest: &mut mpsc::Receiver<ScanEvent>,
    ) -> Result<ControlFlow<()>, PipelineError> {
        let mut flow = self.on_event(first).await?;
        while flow.is_continue()
            && let Ok(event) = rest.try_recv()
        {
            flow = self.on_event(event).await?;
        }
        Ok(flow)
    }

    async fn on_event(&mut self, event: ScanEvent) -> Result<ControlFlow<()>, PipelineError> {
        match event {
            ScanEvent::Sighting(sighting) => self.on_sighting(sighting).await?,
            ScanEvent::SweepComplete(sweep) => {
                if !self.swept {
                    info!(access_points = self.registry.len(), "first channel sweep complete");
                }
                self.swept = true;
                if self.sweep_limit.is_some_and(|limit| sweep >= limit) {
                    info!(sweeps = sweep, "sweep limit reached");
                    return Ok(ControlFlow::Break(()));
                }
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    async fn on_sighting(&mut self, sighting: Sighting) -> Result<(), PipelineError> {
        if self.only.is_some_and(|only| only != sighting.bssid) {
            return Ok(());
        }
        let (record, change) = self.registry.upsert(sighting, Instant::now());
        let score = self.scheduler.update(record);
        record.score = score;

        if change.created {
            info!(
                bssid = %record.bssid,
                essid = %record.essid,
                channel = record.channel,
                wps = %record.wps_state,
                "new access point"
            );
        } else if change.wps_changed {
            info!(bssid = %record.bssid, wps = %record.wps_state, "WPS state changed");
        }

        if change.created || change.wps_changed {
            let entry = StoreEntry::Snapshot(record.snapshot());
            self.store.append(&entry).await?;
        }
        Ok(())
    }

    fn evict(&mut self) {
        let now = Instant::now();
        for bssid in self.registry.evict_silent(now) {
            self.scheduler.remove(&bssid);
            debug!(bssid = %bssid, "evicted silent access point");
        }
        self.scheduler.prune_cooldowns(now);
    }

    /// Starts a harvest if the link is idle and a target is ready.
    fn dispatch(&mut self, cancel: &CancellationToken, reports: &mpsc::Sender<HarvestReport>) {
        if self.link.is_none() || !self.swept {
            return;
        }
        let Some(entry) = self.scheduler.pop(Instant::now()) else {
            return;
        };
        let Some(record) = self.registry.get(&entry.bssid).cloned() else {
            self.scheduler.release(entry.bssid);
            self.scheduler.remove(&entry.bssid);
            return;
        };
        let Some(link) = self.link.take() else {
            return;
        };

        info!(
            bssid = %record.bssid,
            essid = %record.essid,
            channel = record.channel,
            score = format!("{:.1}", entry.score),
            "harvesting"
        );
        self.in_flight = Some(record.bssid);
        tokio::spawn(harvest(
            self.manager.clone(),
            self.harvester,
            link,
            record,
            cancel.clone(),
            reports.clone(),
        ));
    }

    async fn finish(&mut self, report: HarvestReport) -> Result<(), PipelineError> {
        let HarvestReport { bssid, link, result } = report;
        self.link = Some(link);
        self.in_flight = None;
        let now = Instant::now();

        match result {
            Ok(material) => {
                self.scheduler.mark_attempted(bssid, TransactionOutcome::CompleteM3, now);
                success!(bssid = %bssid, "captured WPS material");
                self.store.append(&StoreEntry::Capture(material.clone())).await?;
                self.report.captures.push(material);
            }
            Err(HarvestFailure::Transaction(e)) => {
                let until = self.scheduler.mark_attempted(bssid, e.outcome(), now);
                warn!(bssid = %bssid, cooldown = ?until.saturating_duration_since(now), "{e}");
                let attempt = HarvestAttempt {
                    bssid,
                    outcome: e.outcome(),
                    state: e.state(),
                    reason: e.to_string(),
                    attempted_at: Utc::now(),
                };
                self.store.append(&StoreEntry::Attempt(attempt.clone())).await?;
                self.report.attempts.push(attempt);
            }
            Err(HarvestFailure::Interface(InterfaceError::Busy(reason))) => {
                debug!(bssid = %bssid, "radio not available for harvest: {reason}");
                self.scheduler.release(bssid);
            }
            Err(HarvestFailure::Interface(e)) => {
                self.scheduler.release(bssid);
                return Err(e.into());
            }
            Err(HarvestFailure::Cancelled) => self.scheduler.release(bssid),
        }
        Ok(())
    }
}

async fn harvest(
    manager: InterfaceManager,
    harvester: Harvester,
    mut link: Box<dyn WpsLink>,
    target: ApRecord,
    cancel: CancellationToken,
    reports: mpsc::Sender<HarvestReport>,
) {
    let result = attempt(&manager, &harvester, link.as_mut(), &target, &cancel).await;
    let report = HarvestReport {
        bssid: target.bssid,
        link,
        result,
    };
    if reports.send(report).await.is_err() {
        debug!(bssid = %target.bssid, "harvest finished after shutdown");
    }
}

async fn attempt(
    manager: &InterfaceManager,
    harvester: &Harvester,
    link: &mut dyn WpsLink,
    target: &ApRecord,
    cancel: &CancellationToken,
) -> Result<WpsCryptoMaterial, HarvestFailure> {
    let lease = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(HarvestFailure::Cancelled),
        lease = manager.acquire_lease(LeaseKind::Harvest) => lease.map_err(HarvestFailure::Interface)?,
    };
    if target.channel != 0 {
        lease.tune(target.channel).await.map_err(HarvestFailure::Interface)?;
    }

    let result = harvester.run(link, target, cancel).await;
    drop(lease);
    result.map_err(HarvestFailure::Transaction)
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
