use super::WpsError;

/// Attribute type identifiers used by this crate.
pub mod id {
    pub const ASSOC_STATE: u16 = 0x1002;
    pub const AUTH_TYPE_FLAGS: u16 = 0x1004;
    pub const AUTHENTICATOR: u16 = 0x1005;
    pub const CONFIG_METHODS: u16 = 0x1008;
    pub const CONFIG_ERROR: u16 = 0x1009;
    pub const CONN_TYPE_FLAGS: u16 = 0x100D;
    pub const ENCR_TYPE_FLAGS: u16 = 0x1010;
    pub const DEVICE_NAME: u16 = 0x1011;
    pub const DEVICE_PASSWORD_ID: u16 = 0x1012;
    pub const E_HASH1: u16 = 0x1014;
    pub const E_HASH2: u16 = 0x1015;
    pub const ENROLLEE_NONCE: u16 = 0x101A;
    pub const MAC_ADDR: u16 = 0x1020;
    pub const MANUFACTURER: u16 = 0x1021;
    pub const MSG_TYPE: u16 = 0x1022;
    pub const MODEL_NAME: u16 = 0x1023;
    pub const MODEL_NUMBER: u16 = 0x1024;
    pub const OS_VERSION: u16 = 0x102D;
    pub const PUBLIC_KEY: u16 = 0x1032;
    pub const REGISTRAR_NONCE: u16 = 0x1039;
    pub const REQUEST_TYPE: u16 = 0x103A;
    pub const RF_BANDS: u16 = 0x103C;
    pub const SERIAL_NUMBER: u16 = 0x1042;
    pub const WPS_STATE: u16 = 0x1044;
    pub const UUID_E: u16 = 0x1047;
    pub const UUID_R: u16 = 0x1048;
    pub const VERSION: u16 = 0x104A;
    pub const PRIMARY_DEVICE_TYPE: u16 = 0x1054;
    pub const AP_SETUP_LOCKED: u16 = 0x1057;
}

const TLV_HDR_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attribute<'a> {
    pub id: u16,
    pub value: &'a [u8],
}

/// Splits `bytes` into attributes. Any trailing garbage fails the whole list.
pub fn parse(bytes: &[u8]) -> Result<Vec<Attribute<'_>>, WpsError> {
    let mut attrs = Vec::new();
    let mut offset = 0;

    while offset < bytes.len() {
        if offset + TLV_HDR_LEN > bytes.len() {
            return Err(WpsError::Truncated(offset));
        }
        let id = u16::from_be_bytes([bytes[offset], bytes[offset + 1]]);
        let len = u16::from_be_bytes([bytes[offset + 2], bytes[offset + 3]]) as usize;
        let start = offset + TLV_HDR_LEN;
        let end = start + len;
        if end > bytes.len() {
            return Err(WpsError::Truncated(offset));
        }
        attrs.push(Attribute {
            id,
            value: &bytes[start..end],
        });
        offset = end;
    }

    Ok(attrs)
}

pub fn find<'a>(attrs: &[Attribute<'a>], id: u16) -> Option<&'a [u8]> {
    attrs.iter().find(|attr| attr.id == id).map(|attr| attr.value)
}

/// Finds a text attribute, dropping trailing NULs some vendors pad with.
pub fn find_string(attrs: &[Attribute<'_>], id: u16) -> Option<String> {
    let value = find(attrs, id)?;
    let text = String::from_utf8_lossy(value);
    let text = text.trim_end_matches('\0').trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Finds an attribute that must be present with an exact length.
pub fn require<'a>(
    attrs: &[Attribute<'a>],
    id: u16,
    name: &'static str,
    len: usize,
) -> Result<&'a [u8], WpsError> {
    let value = find(attrs, id).ok_or(WpsError::Missing(name))?;
    if value.len() != len {
        return Err(WpsError::BadLength {
            name,
            expected: len,
            got: value.len(),
        });
    }
    Ok(value)
}

pub fn require_u16(attrs: &[Attribute<'_>], id: u16, name: &'static str) -> Result<u16, WpsError> {
    let value = require(attrs, id, name, 2)?;
    Ok(u16::from_be_bytes([value[0], value[1]]))
}

/// Builds an attribute list in insertion order.
#[derive(Debug, Default, Clone)]
pub struct AttrWriter {
    buf: Vec<u8>,
}

impl AttrWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, id: u16, value: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(&id.to_be_bytes());
        self.buf.extend_from_slice(&(value.len() as u16).to_be_bytes());
        self.buf.extend_from_slice(value);
        self
    }

    pub fn put_u8(&mut self, id: u16, value: u8) -> &mut Self {
        self.put(id, &[value])
    }

    pub fn put_u16(&mut self, id: u16, value: u16) -> &mut Self {
        self.put(id, &value.to_be_bytes())
    }

    pub fn put_u32(&mut self, id: u16, value: u32) -> &mut Self {
        self.put(id, &value.to_be_bytes())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
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
