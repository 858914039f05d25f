//! Registration protocol messages, seen from the registrar side.

use harvestr_common::models::ap::WpsDevice;

use super::WpsError;
use super::attr::{self, AttrWriter, id};
use super::keys::{self, AUTHENTICATOR_LEN, NONCE_LEN, PUBLIC_KEY_LEN};

pub const WPS_VERSION: u8 = 0x10;

pub mod msg_type {
    pub const M1: u8 = 0x04;
    pub const M2: u8 = 0x05;
    pub const M2D: u8 = 0x06;
    pub const M3: u8 = 0x07;
    pub const ACK: u8 = 0x0D;
    pub const NACK: u8 = 0x0E;
    pub const DONE: u8 = 0x0F;
}

/// Config error carried in a NACK when the enrollee has locked out PIN attempts.
pub const CONFIG_ERROR_SETUP_LOCKED: u16 = 15;
pub const CONFIG_ERROR_NONE: u16 = 0;

const PASSWORD_ID_DEFAULT: u16 = 0x0000;

pub fn message_type(bytes: &[u8]) -> Result<u8, WpsError> {
    let attrs = attr::parse(bytes)?;
    Ok(attr::require(&attrs, id::MSG_TYPE, "message type", 1)?[0])
}

fn expect_type(attrs: &[attr::Attribute<'_>], expected: u8) -> Result<(), WpsError> {
    let got = attr::require(attrs, id::MSG_TYPE, "message type", 1)?[0];
    if got != expected {
        return Err(WpsError::UnexpectedMessage { expected, got });
    }
    Ok(())
}

fn fixed<const N: usize>(
    attrs: &[attr::Attribute<'_>],
    attr_id: u16,
    name: &'static str,
) -> Result<[u8; N], WpsError> {
    let mut out = [0u8; N];
    out.copy_from_slice(attr::require(attrs, attr_id, name, N)?);
    Ok(out)
}

/// The enrollee's opening message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct M1 {
    pub uuid_e: [u8; 16],
    pub enrollee_mac: [u8; 6],
    pub e_nonce: [u8; NONCE_LEN],
    pub public_key: Vec<u8>,
    pub auth_types: u16,
    pub encr_types: u16,
    pub config_methods: u16,
    pub device_password_id: u16,
    pub device: WpsDevice,
}

impl M1 {
    pub fn parse(bytes: &[u8]) -> Result<Self, WpsError> {
        let attrs = attr::parse(bytes)?;
        expect_type(&attrs, msg_type::M1)?;

        Ok(Self {
            uuid_e: fixed(&attrs, id::UUID_E, "UUID-E")?,
            enrollee_mac: fixed(&attrs, id::MAC_ADDR, "MAC address")?,
            e_nonce: fixed(&attrs, id::ENROLLEE_NONCE, "enrollee nonce")?,
            public_key: attr::require(&attrs, id::PUBLIC_KEY, "public key", PUBLIC_KEY_LEN)?
                .to_vec(),
            auth_types: attr::require_u16(&attrs, id::AUTH_TYPE_FLAGS, "auth type flags")?,
            encr_types: attr::require_u16(&attrs, id::ENCR_TYPE_FLAGS, "encryption type flags")?,
            config_methods: attr::require_u16(&attrs, id::CONFIG_METHODS, "config methods")
                .unwrap_or(0),
            device_password_id: attr::require_u16(
                &attrs,
                id::DEVICE_PASSWORD_ID,
                "device password id",
            )
            .unwrap_or(PASSWORD_ID_DEFAULT),
            device: WpsDevice {
                manufacturer: attr::find_string(&attrs, id::MANUFACTURER),
                model_name: attr::find_string(&attrs, id::MODEL_NAME),
                model_number: attr::find_string(&attrs, id::MODEL_NUMBER),
                device_name: attr::find_string(&attrs, id::DEVICE_NAME),
            },
        })
    }
}

/// The registrar's reply to M1.
#[derive(Debug, Clone)]
pub struct M2<'a> {
    pub e_nonce: &'a [u8; NONCE_LEN],
    pub r_nonce: &'a [u8; NONCE_LEN],
    pub uuid_r: &'a [u8; 16],
    pub public_key: &'a [u8; PUBLIC_KEY_LEN],
    pub auth_types: u16,
    pub encr_types: u16,
    pub device_password_id: u16,
}

impl M2<'_> {
    /// Encodes the message and appends its authenticator over `m1 || m2`.
    pub fn encode(&self, auth_key: &[u8; 32], m1: &[u8]) -> Vec<u8> {
        let mut w = AttrWriter::new();
        w.put_u8(id::VERSION, WPS_VERSION)
            .put_u8(id::MSG_TYPE, msg_type::M2)
            .put(id::ENROLLEE_NONCE, self.e_nonce)
            .put(id::REGISTRAR_NONCE, self.r_nonce)
            .put(id::UUID_R, self.uuid_r)
            .put(id::PUBLIC_KEY, self.public_key)
            .put_u16(id::AUTH_TYPE_FLAGS, self.auth_types)
            .put_u16(id::ENCR_TYPE_FLAGS, self.encr_types)
            .put_u8(id::CONN_TYPE_FLAGS, 0x01)
            .put_u16(id::CONFIG_METHODS, 0x0084)
            .put(id::MANUFACTURER, b" ")
            .put(id::MODEL_NAME, b" ")
            .put(id::MODEL_NUMBER, b" ")
            .put(id::SERIAL_NUMBER, b" ")
            .put(id::PRIMARY_DEVICE_TYPE, &[0x00, 0x01, 0x00, 0x50, 0xf2, 0x04, 0x00, 0x01])
            .put(id::DEVICE_NAME, b" ")
            .put_u8(id::RF_BANDS, 0x01)
            .put_u16(id::ASSOC_STATE, 0x0000)
            .put_u16(id::CONFIG_ERROR, CONFIG_ERROR_NONE)
            .put_u16(id::DEVICE_PASSWORD_ID, self.device_password_id)
            .put_u32(id::OS_VERSION, 0x8000_0000);

        let mut bytes = w.finish();
        append_authenticator(&mut bytes, auth_key, m1);
        bytes
    }
}

/// The enrollee's commitment to the two PIN halves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct M3 {
    pub r_nonce: [u8; NONCE_LEN],
    pub e_hash1: [u8; 32],
    pub e_hash2: [u8; 32],
}

impl M3 {
    pub fn parse(bytes: &[u8]) -> Result<Self, WpsError> {
        let attrs = attr::parse(bytes)?;
        expect_type(&attrs, msg_type::M3)?;

        Ok(Self {
            r_nonce: fixed(&attrs, id::REGISTRAR_NONCE, "registrar nonce")?,
            e_hash1: fixed(&attrs, id::E_HASH1, "E-Hash1")?,
            e_hash2: fixed(&attrs, id::E_HASH2, "E-Hash2")?,
        })
    }
}

/// Encodes the NACK the registrar sends to end a session after M3.
pub fn build_nack(e_nonce: &[u8; NONCE_LEN], r_nonce: &[u8; NONCE_LEN], config_error: u16) -> Vec<u8> {
    let mut w = AttrWriter::new();
    w.put_u8(id::VERSION, WPS_VERSION)
        .put_u8(id::MSG_TYPE, msg_type::NACK)
        .put(id::ENROLLEE_NONCE, e_nonce)
        .put(id::REGISTRAR_NONCE, r_nonce)
        .put_u16(id::CONFIG_ERROR, config_error);
    w.finish()
}

/// Reads the config error out of a NACK; absent means no error was given.
pub fn parse_nack(bytes: &[u8]) -> Result<u16, WpsError> {
    let attrs = attr::parse(bytes)?;
    expect_type(&attrs, msg_type::NACK)?;
    Ok(attr::require_u16(&attrs, id::CONFIG_ERROR, "config error").unwrap_or(CONFIG_ERROR_NONE))
}

/// Appends the authenticator attribute computed over `previous || msg`.
pub fn append_authenticator(msg: &mut Vec<u8>, auth_key: &[u8; 32], previous: &[u8]) {
    let tag = keys::authenticator(auth_key, previous, msg);
    let mut w = AttrWriter::new();
    w.put(id::AUTHENTICATOR, &tag);
    msg.extend_from_slice(w.as_bytes());
}

/// Checks the trailing authenticator attribute of `msg` against `previous`.
pub fn verify_authenticator(msg: &[u8], auth_key: &[u8; 32], previous: &[u8]) -> Result<(), WpsError> {
    let (body, tag) = split_authenticator(msg)?;
    if keys::authenticator(auth_key, previous, body) != tag {
        return Err(WpsError::BadAuthenticator);
    }
    Ok(())
}

/// Splits off the authenticator, which is always the last attribute.
pub fn split_authenticator(msg: &[u8]) -> Result<(&[u8], [u8; AUTHENTICATOR_LEN]), WpsError> {
    let attr_len = 4 + AUTHENTICATOR_LEN;
    if msg.len() < attr_len {
        return Err(WpsError::Missing("authenticator"));
    }
    let (body, tail) = msg.split_at(msg.len() - attr_len);
    let header = [
        (id::AUTHENTICATOR >> 8) as u8,
        id::AUTHENTICATOR as u8,
        0x00,
        AUTHENTICATOR_LEN as u8,
    ];
    if tail[..4] != header {
        return Err(WpsError::Missing("authenticator"));
    }
    let mut tag = [0u8; AUTHENTICATOR_LEN];
    tag.copy_from_slice(&tail[4..]);
    Ok((body, tag))
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
