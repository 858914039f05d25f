//! [`WpsLink`] over raw frames on a monitor interface.
//!
//! The radio is opened on `associate`, once the interface is in monitor mode, and
//! closed again on `disconnect`. Authentication and association are sent by hand and
//! resent until answered.
//! EAPOL rides in unprotected data frames behind an LLC/SNAP header.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use harvestr_common::error::InterfaceError;
use harvestr_common::models::ap::ApRecord;
use harvestr_common::network::interface::find_interface;
use harvestr_common::network::mac::Bssid;
use harvestr_protocols::eapol::{self, EapBody, EapCode, EapPacket, Eapol, Reassembly, WscOp};
use harvestr_protocols::ieee80211::{self, LinkFrame};
use pnet::util::MacAddr;
use tokio::time::Instant;
use tracing::debug;

use super::link::{LinkError, LinkEvent, WpsLink};
use crate::radio::{self, RadioHandle};

const RESEND_INTERVAL: Duration = Duration::from_millis(300);
const REASON_LEAVING: u16 = 3;

pub struct MonitorLink {
    interface: String,
    mac: MacAddr,
    /// Open between `associate` and `disconnect`.
    radio: Option<RadioHandle>,
    bssid: Option<Bssid>,
    seq: u16,
    reassembly: Reassembly,
    pending: VecDeque<LinkEvent>,
}

impl MonitorLink {
    pub fn new(interface: &str) -> Result<Self, InterfaceError> {
        let intf = find_interface(interface).ok_or_else(|| InterfaceError::DeviceMissing(interface.to_string()))?;
        let mac = intf.mac.ok_or_else(|| InterfaceError::Capture {
            interface: interface.to_string(),
            reason: "no hardware address".into(),
        })?;
        Ok(Self {
            interface: interface.to_string(),
            mac,
            radio: None,
            bssid: None,
            seq: 0,
            reassembly: Reassembly::new(),
            pending: VecDeque::new(),
        })
    }

    fn next_seq(&mut self) -> u16 {
        self.seq = (self.seq + 1) & 0x0fff;
        self.seq
    }

    fn target(&self) -> Result<Bssid, LinkError> {
        self.bssid.ok_or(LinkError::Closed)
    }

    fn radio(&mut self) -> Result<&mut RadioHandle, LinkError> {
        self.radio.as_mut().ok_or(LinkError::Closed)
    }

    fn send_eapol(&mut self, payload: &[u8]) -> Result<(), LinkError> {
        let bssid = self.target()?;
        let seq = self.next_seq();
        let frame = ieee80211::build_eapol_data(bssid, self.mac, seq, payload);
        self.radio()?.send(&frame)?;
        Ok(())
    }

    /// Sends `build(seq)` until a frame matching `accept` comes back or `deadline` passes.
    async fn handshake(
        &mut self,
        what: &str,
        deadline: Instant,
        build: impl Fn(u16) -> Vec<u8> + Send,
        accept: impl Fn(&LinkFrame) -> bool + Send,
    ) -> Result<LinkFrame, LinkError> {
        let bssid = self.target()?;
        let station = self.mac;

        loop {
            let seq = self.next_seq();
            let radio = self.radio()?;
            radio.send(&build(seq))?;
            let resend_at = (Instant::now() + RESEND_INTERVAL).min(deadline);

            loop {
                let frame = match tokio::time::timeout_at(resend_at, radio.recv()).await {
                    Err(_) if Instant::now() >= deadline => {
                        return Err(LinkError::Refused(format!("no {what} response")));
                    }
                    Err(_) => break,
                    Ok(None) => return Err(LinkError::Closed),
                    Ok(Some(bytes)) => bytes,
                };

                match ieee80211::parse_link_frame(&frame, bssid, station) {
                    Ok(Some(LinkFrame::Deauth { reason } | LinkFrame::Disassoc { reason })) => {
                        return Err(LinkError::Refused(format!("kicked during {what} (reason {reason})")));
                    }
                    Ok(Some(parsed)) if accept(&parsed) => return Ok(parsed),
                    Ok(_) => {}
                    Err(e) => debug!(bssid = %bssid, "dropped frame during {what}: {e}"),
                }
            }
        }
    }

    fn on_eapol(&mut self, payload: &[u8]) -> Result<Option<LinkEvent>, LinkError> {
        let packet = match eapol::parse(payload) {
            Ok(Eapol::Eap(packet)) => packet,
            Ok(_) => return Ok(None),
            Err(e) => {
                debug!("dropped EAPOL frame: {e}");
                return Ok(None);
            }
        };

        let EapPacket { code, id, body } = packet;
        match (code, body) {
            (EapCode::Failure, _) => Ok(Some(LinkEvent::EapFailure)),
            (EapCode::Request, EapBody::Identity(_)) => Ok(Some(LinkEvent::IdentityRequest { id })),
            (EapCode::Request, EapBody::Wsc(frame)) => match frame.op {
                WscOp::Start => Ok(Some(LinkEvent::WscStart { id })),
                WscOp::FragAck => Ok(None),
                _ => match self.reassembly.push(frame) {
                    Ok(Some((op, body))) => Ok(Some(LinkEvent::Wsc { id, op, body })),
                    Ok(None) => {
                        let ack = eapol::build_wsc(EapCode::Response, id, WscOp::FragAck, &[]);
                        self.send_eapol(&ack)?;
                        Ok(None)
                    }
                    Err(e) => {
                        debug!("dropped WSC fragment: {e}");
                        Ok(None)
                    }
                },
            },
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl WpsLink for MonitorLink {
    fn station(&self) -> MacAddr {
        self.mac
    }

    async fn associate(&mut self, target: &ApRecord, timeout: Duration) -> Result<(), LinkError> {
        if self.radio.is_none() {
            self.radio = Some(radio::open(&self.interface)?);
        }
        self.bssid = Some(target.bssid);
        self.reassembly = Reassembly::new();
        self.pending.clear();
        self.radio()?.drain();

        let deadline = Instant::now() + timeout;
        let bssid = target.bssid;
        let station = self.mac;

        let auth = self
            .handshake(
                "authentication",
                deadline,
                |seq| ieee80211::build_auth(bssid, station, seq),
                |frame| matches!(frame, LinkFrame::Auth { .. }),
            )
            .await?;
        if let LinkFrame::Auth { status } = auth
            && status != 0
        {
            return Err(LinkError::Refused(format!("authentication status {status}")));
        }

        let essid = target.essid.clone();
        let assoc = self
            .handshake(
                "association",
                deadline,
                move |seq| ieee80211::build_assoc_request(bssid, station, &essid, seq),
                |frame| matches!(frame, LinkFrame::AssocResponse { .. }),
            )
            .await?;
        if let LinkFrame::AssocResponse { status } = assoc
            && status != 0
        {
            return Err(LinkError::Refused(format!("association status {status}")));
        }

        debug!(bssid = %bssid, "associated");
        Ok(())
    }

    async fn send_eapol_start(&mut self) -> Result<(), LinkError> {
        self.send_eapol(&eapol::build_start())
    }

    async fn send_identity(&mut self, id: u8) -> Result<(), LinkError> {
        let response = eapol::build_identity(EapCode::Response, id, eapol::REGISTRAR_IDENTITY);
        self.send_eapol(&response)
    }

    async fn send_wsc(&mut self, id: u8, op: WscOp, body: &[u8]) -> Result<(), LinkError> {
        let response = eapol::build_wsc(EapCode::Response, id, op, body);
        self.send_eapol(&response)
    }

    async fn recv(&mut self) -> Result<LinkEvent, LinkError> {
        let bssid = self.target()?;
        let station = self.mac;

        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(event);
            }

            let frame = self.radio()?.recv().await.ok_or(LinkError::Closed)?;
            match ieee80211::parse_link_frame(&frame, bssid, station) {
                Ok(Some(LinkFrame::Eapol(payload))) => {
                    if let Some(event) = self.on_eapol(&payload)? {
                        self.pending.push_back(event);
                    }
                }
                Ok(Some(LinkFrame::Deauth { reason } | LinkFrame::Disassoc { reason })) => {
                    return Ok(LinkEvent::Deauthenticated { reason });
                }
                Ok(_) => {}
                Err(e) => debug!(bssid = %bssid, "dropped frame: {e}"),
            }
        }
    }

    async fn disconnect(&mut self) {
        let bssid = self.bssid.take();
        let radio = self.radio.take();
        self.reassembly = Reassembly::new();
        self.pending.clear();

        if let (Some(bssid), Some(mut radio)) = (bssid, radio) {
            let seq = self.next_seq();
            let frame = ieee80211::build_deauth(bssid, self.mac, seq, REASON_LEAVING);
            if let Err(e) = radio.send(&frame) {
                debug!(bssid = %bssid, "deauthentication not sent: {e}");
            }
        }
    }
}
