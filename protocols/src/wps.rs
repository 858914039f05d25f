//! # WiFi Protected Setup
//!
//! WPS data is a flat list of big-endian type/length/value attributes. The same
//! encoding is used inside the beacon information element and inside the
//! registration messages carried over EAP-WSC.

pub mod attr;
pub mod enrollee;
pub mod keys;
pub mod message;

use harvestr_common::models::ap::{WpsDevice, WpsState};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WpsError {
    #[error("attribute list truncated at offset {0}")]
    Truncated(usize),

    #[error("missing attribute {0}")]
    Missing(&'static str),

    #[error("attribute {name} has length {got}, expected {expected}")]
    BadLength {
        name: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("expected message type {expected:#04x}, got {got:#04x}")]
    UnexpectedMessage { expected: u8, got: u8 },

    #[error("registrar nonce does not match the one sent in M2")]
    NonceMismatch,

    #[error("authenticator does not verify")]
    BadAuthenticator,

    #[error("peer public key is out of range")]
    BadPublicKey,
}

/// Reads lock state and device strings out of a beacon's WPS element body
/// (the bytes after the `00:50:F2:04` vendor header).
///
/// An element that cannot be decoded still proves WPS is present, so it reports
/// [`WpsState::Unknown`] rather than failing the whole frame.
pub fn parse_beacon_element(body: &[u8]) -> (WpsState, Option<WpsDevice>) {
    let Ok(attrs) = attr::parse(body) else {
        return (WpsState::Unknown, None);
    };

    let locked = attr::find(&attrs, attr::id::AP_SETUP_LOCKED)
        .and_then(|value| value.first())
        .is_some_and(|flag| *flag == 0x01);

    let device = WpsDevice {
        manufacturer: attr::find_string(&attrs, attr::id::MANUFACTURER),
        model_name: attr::find_string(&attrs, attr::id::MODEL_NAME),
        model_number: attr::find_string(&attrs, attr::id::MODEL_NUMBER),
        device_name: attr::find_string(&attrs, attr::id::DEVICE_NAME),
    };

    let state = if locked { WpsState::Locked } else { WpsState::Unlocked };
    (state, (!device.is_empty()).then_some(device))
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

#[cfg(test)]
mod tests {
    use super::*;
    use attr::AttrWriter;

    #[test]
    fn beacon_element_reports_lock_and_device() {
        let mut w = AttrWriter::new();
        w.put_u8(attr::id::VERSION, 0x10);
        w.put_u8(attr::id::WPS_STATE, 0x02);
        w.put_u8(attr::id::AP_SETUP_LOCKED, 0x01);
        w.put(attr::id::MANUFACTURER, b"Acme");
        w.put(attr::id::MODEL_NAME, b"Router 9000");

        let (state, device) = parse_beacon_element(&w.finish());
        assert_eq!(state, WpsState::Locked);
        let device = device.unwrap();
        assert_eq!(device.manufacturer.as_deref(), Some("Acme"));
        assert_eq!(device.model_name.as_deref(), Some("Router 9000"));
        assert!(device.device_name.is_none());
    }

    #[test]
    fn beacon_element_without_lock_is_unlocked() {
        let mut w = AttrWriter::new();
        w.put_u8(attr::id::VERSION, 0x10);
        w.put_u8(attr::id::WPS_STATE, 0x02);
        assert_eq!(parse_beacon_element(&w.finish()), (WpsState::Unlocked, None));
    }

    #[test]
    fn garbled_element_is_unknown() {
        assert_eq!(parse_beacon_element(&[0x10, 0x4a, 0x00]), (WpsState::Unknown, None));
    }
}
