//! # Scanner
//!
//! Turns a [`FrameSource`] into a stream of [`Sighting`]s while holding a scan lease.
//!
//! Work is split into cycles: one channel, one dwell. Between cycles the scanner checks
//! whether a harvest is waiting for the radio and, if so, ends the session so the lease
//! can change hands. A new session starts from nothing; sources drop whatever they were
//! holding from the previous one.
//!
//! Once every channel of the plan has been listened to, the scanner follows the last
//! sighting with a [`ScanEvent::SweepComplete`] on the same channel, so the receiver
//! knows it has seen the whole neighbourhood at least once.

use std::time::Duration;

use async_trait::async_trait;
use harvestr_common::error::{InterfaceError, ScanParseError};
use harvestr_common::models::ap::Sighting;
use harvestr_common::models::interface::LeaseKind;
use harvestr_common::network::channels::ChannelPlan;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::interface::{InterfaceManager, Lease};

mod capture;
mod iw;

pub use capture::MonitorCapture;
pub use iw::IwScanSource;

/// Where sightings come from.
#[async_trait]
pub trait FrameSource: Send {
    /// Listens on `channel` for about `dwell` and returns everything it heard,
    /// including frames that failed to parse.
    async fn collect(
        &mut self,
        channel: u8,
        dwell: Duration,
    ) -> Result<Vec<Result<Sighting, ScanParseError>>, InterfaceError>;

    /// Whether the radio must be tuned before each cycle.
    fn hops_channels(&self) -> bool {
        true
    }

    /// Forgets everything from the current session.
    fn reset(&mut self) {}
}

/// What the scanner sends downstream, in the order it happened.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    Sighting(Sighting),
    /// Total number of full passes over the channel plan so far.
    SweepComplete(u64),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub sessions: u64,
    pub cycles: u64,
    pub sweeps: u64,
    pub frames: u64,
    pub sightings: u64,
    pub dropped: u64,
}

impl ScanStats {
    fn absorb(&mut self, session: &ScanStats) {
        self.sessions += session.sessions;
        self.cycles += session.cycles;
        self.sweeps += session.sweeps;
        self.frames += session.frames;
        self.sightings += session.sightings;
        self.dropped += session.dropped;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// A harvest asked for the radio.
    Yielded,
    Cancelled,
    /// Nobody is listening for sightings anymore.
    Closed,
}

pub struct Scanner {
    source: Box<dyn FrameSource>,
    channels: ChannelPlan,
    dwell: Duration,
    next_channel: usize,
    stats: ScanStats,
}

impl Scanner {
    pub fn new(source: Box<dyn FrameSource>, channels: ChannelPlan, dwell: Duration) -> Self {
        Self {
            source,
            channels,
            dwell,
            next_channel: 0,
            stats: ScanStats::default(),
        }
    }

    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    /// Scans whenever the radio is free until `cancel` fires or `tx` closes.
    pub async fn run(
        mut self,
        manager: InterfaceManager,
        tx: mpsc::Sender<ScanEvent>,
        cancel: CancellationToken,
    ) -> Result<ScanStats, InterfaceError> {
        loop {
            let lease = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                lease = manager.acquire_lease(LeaseKind::Scan) => lease,
            };
            let lease = match lease {
                Ok(lease) => lease,
                Err(InterfaceError::Busy(reason)) => {
                    debug!("scan lease not available yet: {reason}");
                    continue;
                }
                Err(e) => return Err(e),
            };

            match self.run_session(&lease, &tx, &cancel).await? {
                SessionEnd::Yielded => continue,
                SessionEnd::Cancelled | SessionEnd::Closed => break,
            }
        }
        Ok(self.stats)
    }

    /// Runs scan cycles under `lease` until told to stop.
    pub async fn run_session(
        &mut self,
        lease: &Lease,
        tx: &mpsc::Sender<ScanEvent>,
        cancel: &CancellationToken,
    ) -> Result<SessionEnd, InterfaceError> {
        self.source.reset();
        let mut session = ScanStats {
            sessions: 1,
            ..ScanStats::default()
        };

        let result = self.cycles(lease, tx, cancel, &mut session).await;

        self.source.reset();
        self.stats.absorb(&session);
        debug!(
            cycles = session.cycles,
            frames = session.frames,
            sightings = session.sightings,
            dropped = session.dropped,
            "scan session ended"
        );
        result
    }

    async fn cycles(
        &mut self,
        lease: &Lease,
        tx: &mpsc::Sender<ScanEvent>,
        cancel: &CancellationToken,
        session: &mut ScanStats,
    ) -> Result<SessionEnd, InterfaceError> {
        loop {
            if cancel.is_cancelled() {
                return Ok(SessionEnd::Cancelled);
            }
            if lease.should_yield() {
                return Ok(SessionEnd::Yielded);
            }

            let channel = self.advance_channel();
            let hops = self.source.hops_channels() && channel != 0;
            if hops {
                lease.tune(channel).await?;
            }

            let batch = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(SessionEnd::Cancelled),
                batch = self.source.collect(channel, self.dwell) => batch?,
            };

            session.cycles += 1;
            session.frames += batch.len() as u64;
            for item in batch {
                match item {
                    Ok(mut sighting) => {
                        if sighting.channel == 0 && hops {
                            sighting.channel = channel;
                        }
                        session.sightings += 1;
                        if tx.send(ScanEvent::Sighting(sighting)).await.is_err() {
                            return Ok(SessionEnd::Closed);
                        }
                    }
                    Err(e) => {
                        session.dropped += 1;
                        debug!(channel, "dropped frame: {e}");
                    }
                }
            }

            // Sources that do not hop cover every channel in one cycle.
            if !hops || self.next_channel == 0 {
                session.sweeps += 1;
                let total = self.stats.sweeps + session.sweeps;
                debug!(sweep = total, "channel sweep complete");
                if tx.send(ScanEvent::SweepComplete(total)).await.is_err() {
                    return Ok(SessionEnd::Closed);
                }
            }
        }
    }

    fn advance_channel(&mut self) -> u8 {
        let plan = self.channels.channels();
        if plan.is_empty() {
            return 0;
        }
        let channel = plan[self.next_channel % plan.len()];
        self.next_channel = (self.next_channel + 1) % plan.len();
        channel
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
