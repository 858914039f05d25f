//! The radio side of a harvest, as the state machine sees it.

use std::time::Duration;

use async_trait::async_trait;
use harvestr_common::error::InterfaceError;
use harvestr_common::models::ap::ApRecord;
use harvestr_protocols::eapol::WscOp;
use pnet::util::MacAddr;
use thiserror::Error;

/// Something the AP did that the harvester has to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    IdentityRequest { id: u8 },
    WscStart { id: u8 },
    /// A complete (reassembled) EAP-WSC request.
    Wsc { id: u8, op: WscOp, body: Vec<u8> },
    EapFailure,
    Deauthenticated { reason: u16 },
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("association refused: {0}")]
    Refused(String),

    #[error(transparent)]
    Interface(#[from] InterfaceError),

    #[error("link closed")]
    Closed,
}

#[async_trait]
pub trait WpsLink: Send {
    /// Our own hardware address.
    fn station(&self) -> MacAddr;

    /// Authenticates and associates with `target`, giving up after `timeout`.
    async fn associate(&mut self, target: &ApRecord, timeout: Duration) -> Result<(), LinkError>;

    async fn send_eapol_start(&mut self) -> Result<(), LinkError>;

    /// Answers an identity request as an external registrar.
    async fn send_identity(&mut self, id: u8) -> Result<(), LinkError>;

    async fn send_wsc(&mut self, id: u8, op: WscOp, body: &[u8]) -> Result<(), LinkError>;

    /// Waits for the next event. Unbounded; the caller owns the deadline.
    async fn recv(&mut self) -> Result<LinkEvent, LinkError>;

    /// Leaves the AP. Best effort.
    async fn disconnect(&mut self);
}
