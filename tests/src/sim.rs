//! A simulated neighbourhood of access points.
//!
//! [`Air`] is shared between the fakes handed to the pipeline: the frame source reports
//! the APs on the tuned channel each dwell, the link plays each AP's side of the registration protocol,
//! and the mode control records what the interface manager asked for.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use harvestr_common::error::{InterfaceError, ScanParseError};
use harvestr_common::models::ap::{ApRecord, Encryption, Sighting, WpsState};
use harvestr_common::models::interface::InterfaceMode;
use harvestr_common::network::mac::Bssid;
use harvestr_core::harvester::{LinkError, LinkEvent, WpsLink};
use harvestr_core::interface::ModeControl;
use harvestr_core::scanner::FrameSource;
use harvestr_protocols::eapol::WscOp;
use harvestr_protocols::wps::enrollee::Enrollee;
use harvestr_protocols::wps::message::CONFIG_ERROR_SETUP_LOCKED;
use pnet::util::MacAddr;
use tokio::time::Instant;

/// How a simulated AP reacts once associated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    /// Runs M1 → M2 → M3 like a real enrollee.
    Cooperative,
    /// Accepts EAPOL-Start and then never says anything.
    Silent,
    /// Answers the identity response with a setup-locked NACK.
    Locked,
}

#[derive(Debug, Clone)]
pub struct SimAp {
    pub bssid: Bssid,
    pub essid: String,
    pub channel: u8,
    pub rssi: i16,
    pub wps_state: WpsState,
    pub behaviour: Behaviour,
    pub enrollee: Enrollee,
}

impl SimAp {
    pub fn new(bssid: Bssid, essid: &str, channel: u8, rssi: i16) -> Self {
        Self {
            bssid,
            essid: essid.to_string(),
            channel,
            rssi,
            wps_state: WpsState::Unlocked,
            behaviour: Behaviour::Cooperative,
            enrollee: Enrollee::new([bssid.0, bssid.1, bssid.2, bssid.3, bssid.4, bssid.5], "12345670"),
        }
    }

    pub fn behaving(mut self, behaviour: Behaviour) -> Self {
        self.behaviour = behaviour;
        self
    }

    pub fn wps(mut self, state: WpsState) -> Self {
        self.wps_state = state;
        self
    }

    fn sighting(&self) -> Sighting {
        let mut sighting = Sighting::new(self.bssid);
        sighting.essid = self.essid.clone();
        sighting.channel = self.channel;
        sighting.rssi = self.rssi;
        sighting.encryption = Encryption::Wpa2;
        sighting.ciphers.ccmp = true;
        sighting.wps_state = self.wps_state;
        sighting
    }
}

/// One association, as the link saw it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Association {
    pub bssid: Bssid,
    pub at: Instant,
}

#[derive(Debug, Default)]
struct AirState {
    aps: Vec<SimAp>,
    associations: Vec<Association>,
    modes: Vec<InterfaceMode>,
    channels: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct Air {
    state: Arc<Mutex<AirState>>,
}

impl Air {
    pub fn new(aps: Vec<SimAp>) -> Self {
        Self {
            state: Arc::new(Mutex::new(AirState {
                aps,
                ..AirState::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AirState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn ap(&self, bssid: Bssid) -> Option<SimAp> {
        self.lock().aps.iter().find(|ap| ap.bssid == bssid).cloned()
    }

    pub fn associations(&self) -> Vec<Association> {
        self.lock().associations.clone()
    }

    pub fn modes(&self) -> Vec<InterfaceMode> {
        self.lock().modes.clone()
    }

    pub fn channels(&self) -> Vec<u8> {
        self.lock().channels.clone()
    }

    pub fn source(&self) -> SimSource {
        SimSource { air: self.clone() }
    }

    pub fn link(&self) -> SimLink {
        SimLink {
            air: self.clone(),
            target: None,
            m1: Vec::new(),
            queue: VecDeque::new(),
        }
    }

    pub fn control(&self, mode: InterfaceMode) -> SimControl {
        SimControl {
            air: self.clone(),
            mode: Mutex::new(mode),
        }
    }
}

/// Hears the APs on the tuned channel once per dwell, plus one unparseable frame.
pub struct SimSource {
    air: Air,
}

#[async_trait]
impl FrameSource for SimSource {
    async fn collect(
        &mut self,
        channel: u8,
        dwell: Duration,
    ) -> Result<Vec<Result<Sighting, ScanParseError>>, InterfaceError> {
        tokio::time::sleep(dwell).await;
        let mut batch: Vec<Result<Sighting, ScanParseError>> = self
            .air
            .lock()
            .aps
            .iter()
            .filter(|ap| ap.channel == channel)
            .map(|ap| Ok(ap.sighting()))
            .collect();
        batch.push(Err(ScanParseError::NotApFrame {
            frame_type: 2,
            subtype: 0,
        }));
        Ok(batch)
    }
}

pub struct SimControl {
    air: Air,
    mode: Mutex<InterfaceMode>,
}

#[async_trait]
impl ModeControl for SimControl {
    async fn current_mode(&self, _: &str) -> Result<InterfaceMode, InterfaceError> {
        Ok(*self.mode.lock().unwrap_or_else(|p| p.into_inner()))
    }

    async fn set_mode(&self, _: &str, mode: InterfaceMode) -> Result<(), InterfaceError> {
        *self.mode.lock().unwrap_or_else(|p| p.into_inner()) = mode;
        self.air.lock().modes.push(mode);
        Ok(())
    }

    async fn set_channel(&self, _: &str, channel: u8) -> Result<(), InterfaceError> {
        self.air.lock().channels.push(channel);
        Ok(())
    }
}

/// Plays the AP side of an exchange with whichever simulated AP it is associated to.
pub struct SimLink {
    air: Air,
    target: Option<SimAp>,
    m1: Vec<u8>,
    queue: VecDeque<LinkEvent>,
}

impl SimLink {
    fn target(&self) -> Result<&SimAp, LinkError> {
        self.target.as_ref().ok_or(LinkError::Closed)
    }
}

#[async_trait]
impl WpsLink for SimLink {
    fn station(&self) -> MacAddr {
        MacAddr::new(0x02, 0xAA, 0xBB, 0xCC, 0xDD, 0x01)
    }

    async fn associate(&mut self, target: &ApRecord, _: Duration) -> Result<(), LinkError> {
        let ap = self
            .air
            .ap(target.bssid)
            .ok_or_else(|| LinkError::Refused("no such access point".into()))?;
        self.air.lock().associations.push(Association {
            bssid: target.bssid,
            at: Instant::now(),
        });
        self.m1 = ap.enrollee.m1();
        self.queue.clear();
        self.target = Some(ap);
        Ok(())
    }

    async fn send_eapol_start(&mut self) -> Result<(), LinkError> {
        if self.target()?.behaviour != Behaviour::Silent {
            self.queue.push_back(LinkEvent::IdentityRequest { id: 1 });
        }
        Ok(())
    }

    async fn send_identity(&mut self, _: u8) -> Result<(), LinkError> {
        let ap = self.target()?;
        let event = match ap.behaviour {
            Behaviour::Locked => LinkEvent::Wsc {
                id: 2,
                op: WscOp::Nack,
                body: ap.enrollee.nack(&[0; 16], CONFIG_ERROR_SETUP_LOCKED),
            },
            _ => LinkEvent::Wsc {
                id: 2,
                op: WscOp::Msg,
                body: self.m1.clone(),
            },
        };
        self.queue.push_back(event);
        Ok(())
    }

    async fn send_wsc(&mut self, _: u8, op: WscOp, body: &[u8]) -> Result<(), LinkError> {
        if op != WscOp::Msg {
            return Ok(());
        }
        let reply = self
            .target()?
            .enrollee
            .m3(&self.m1, body)
            .map_err(|e| LinkError::Refused(format!("enrollee refused M2: {e}")))?;
        self.queue.push_back(LinkEvent::Wsc {
            id: 3,
            op: WscOp::Msg,
            body: reply.bytes,
        });
        Ok(())
    }

    async fn recv(&mut self) -> Result<LinkEvent, LinkError> {
        match self.queue.pop_front() {
            Some(event) => Ok(event),
            None => std::future::pending().await,
        }
    }

    async fn disconnect(&mut self) {
        self.target = None;
        self.queue.clear();
    }
}
