//! The enrollee side of the registration protocol, i.e. what an access point sends.
//!
//! Produces M1 and answers M2 with M3 using the same key schedule as the registrar,
//! so the registrar can be driven with real messages.

use harvestr_common::models::ap::WpsDevice;

use super::WpsError;
use super::attr::{self, AttrWriter, id};
use super::keys::{self, DhKeyPair, NONCE_LEN, PUBLIC_KEY_LEN};
use super::message::{self, WPS_VERSION, msg_type};

const AUTH_TYPES: u16 = 0x0023;
const ENCR_TYPES: u16 = 0x000D;
const CONFIG_METHODS: u16 = 0x0084;

/// Everything M3 commits to, for checking what the registrar captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct M3Reply {
    pub bytes: Vec<u8>,
    pub auth_key: [u8; 32],
    pub r_nonce: [u8; NONCE_LEN],
    pub pkr: Vec<u8>,
    pub e_hash1: [u8; 32],
    pub e_hash2: [u8; 32],
}

#[derive(Debug, Clone)]
pub struct Enrollee {
    keys: DhKeyPair,
    mac: [u8; 6],
    uuid_e: [u8; 16],
    e_nonce: [u8; NONCE_LEN],
    e_s1: [u8; NONCE_LEN],
    e_s2: [u8; NONCE_LEN],
    pin: String,
    device: WpsDevice,
}

impl Enrollee {
    /// `pin` is the 8-digit device PIN; it is split into halves of four.
    pub fn new(mac: [u8; 6], pin: &str) -> Self {
        Self {
            keys: DhKeyPair::generate(),
            mac,
            uuid_e: keys::random_nonce(),
            e_nonce: keys::random_nonce(),
            e_s1: keys::random_nonce(),
            e_s2: keys::random_nonce(),
            pin: pin.to_string(),
            device: WpsDevice::default(),
        }
    }

    pub fn with_device(mut self, device: WpsDevice) -> Self {
        self.device = device;
        self
    }

    pub fn mac(&self) -> [u8; 6] {
        self.mac
    }

    pub fn e_nonce(&self) -> &[u8; NONCE_LEN] {
        &self.e_nonce
    }

    pub fn public_key(&self) -> &[u8; PUBLIC_KEY_LEN] {
        self.keys.public_key()
    }

    pub fn m1(&self) -> Vec<u8> {
        let text = |value: &Option<String>| value.clone().unwrap_or_else(|| " ".into()).into_bytes();

        let mut w = AttrWriter::new();
        w.put_u8(id::VERSION, WPS_VERSION)
            .put_u8(id::MSG_TYPE, msg_type::M1)
            .put(id::UUID_E, &self.uuid_e)
            .put(id::MAC_ADDR, &self.mac)
            .put(id::ENROLLEE_NONCE, &self.e_nonce)
            .put(id::PUBLIC_KEY, self.keys.public_key())
            .put_u16(id::AUTH_TYPE_FLAGS, AUTH_TYPES)
            .put_u16(id::ENCR_TYPE_FLAGS, ENCR_TYPES)
            .put_u8(id::CONN_TYPE_FLAGS, 0x01)
            .put_u16(id::CONFIG_METHODS, CONFIG_METHODS)
            .put_u8(id::WPS_STATE, 0x02)
            .put(id::MANUFACTURER, &text(&self.device.manufacturer))
            .put(id::MODEL_NAME, &text(&self.device.model_name))
            .put(id::MODEL_NUMBER, &text(&self.device.model_number))
            .put(id::SERIAL_NUMBER, b"0")
            .put(id::PRIMARY_DEVICE_TYPE, &[0x00, 0x06, 0x00, 0x50, 0xf2, 0x04, 0x00, 0x01])
            .put(id::DEVICE_NAME, &text(&self.device.device_name))
            .put_u8(id::RF_BANDS, 0x01)
            .put_u16(id::ASSOC_STATE, 0x0000)
            .put_u16(id::DEVICE_PASSWORD_ID, 0x0000)
            .put_u16(id::CONFIG_ERROR, message::CONFIG_ERROR_NONE)
            .put_u32(id::OS_VERSION, 0x8000_0000);
        w.finish()
    }

    /// Checks M2 against the M1 it answers and builds M3.
    pub fn m3(&self, m1: &[u8], m2: &[u8]) -> Result<M3Reply, WpsError> {
        let attrs = attr::parse(m2)?;
        let got = attr::require(&attrs, id::MSG_TYPE, "message type", 1)?[0];
        if got != msg_type::M2 {
            return Err(WpsError::UnexpectedMessage {
                expected: msg_type::M2,
                got,
            });
        }

        let mut r_nonce = [0u8; NONCE_LEN];
        r_nonce.copy_from_slice(attr::require(&attrs, id::REGISTRAR_NONCE, "registrar nonce", NONCE_LEN)?);
        let pkr = attr::require(&attrs, id::PUBLIC_KEY, "public key", PUBLIC_KEY_LEN)?.to_vec();

        let dh_key = self.keys.dh_key(&pkr)?;
        let session = keys::derive_session_keys(&dh_key, &self.e_nonce, &self.mac, &r_nonce);
        message::verify_authenticator(m2, &session.auth_key, m1)?;

        let (first, second) = self.pin.as_bytes().split_at(self.pin.len().min(4));
        let pke = self.keys.public_key();
        let e_hash1 = keys::pin_commitment(&session.auth_key, &self.e_s1, first, pke, &pkr);
        let e_hash2 = keys::pin_commitment(&session.auth_key, &self.e_s2, second, pke, &pkr);

        let mut w = AttrWriter::new();
        w.put_u8(id::VERSION, WPS_VERSION)
            .put_u8(id::MSG_TYPE, msg_type::M3)
            .put(id::REGISTRAR_NONCE, &r_nonce)
            .put(id::E_HASH1, &e_hash1)
            .put(id::E_HASH2, &e_hash2);
        let mut bytes = w.finish();
        message::append_authenticator(&mut bytes, &session.auth_key, m2);

        Ok(M3Reply {
            bytes,
            auth_key: session.auth_key,
            r_nonce,
            pkr,
            e_hash1,
            e_hash2,
        })
    }

    /// The NACK an enrollee sends to refuse a registrar, e.g. when locked out.
    pub fn nack(&self, r_nonce: &[u8; NONCE_LEN], config_error: u16) -> Vec<u8> {
        message::build_nack(&self.e_nonce, r_nonce, config_error)
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
