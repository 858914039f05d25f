//! EAPOL framing, EAP, and the WSC expanded method that carries WPS messages.

use thiserror::Error;

pub const EAPOL_VERSION: u8 = 0x01;
const EAPOL_HDR_LEN: usize = 4;
const EAP_HDR_LEN: usize = 4;

const TYPE_EAP_PACKET: u8 = 0;
const TYPE_START: u8 = 1;
const TYPE_LOGOFF: u8 = 2;

const EAP_TYPE_IDENTITY: u8 = 1;
const EAP_TYPE_EXPANDED: u8 = 254;

const WFA_VENDOR_ID: [u8; 3] = [0x00, 0x37, 0x2A];
const WFA_SIMPLECONFIG_TYPE: u32 = 1;

/// Identity a registrar answers with.
pub const REGISTRAR_IDENTITY: &[u8] = b"WFA-SimpleConfig-Registrar-1-0";
pub const ENROLLEE_IDENTITY: &[u8] = b"WFA-SimpleConfig-Enrollee-1-0";

pub const FLAG_MORE_FRAGMENTS: u8 = 0x01;
pub const FLAG_LENGTH_FIELD: u8 = 0x02;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EapCode {
    Request = 1,
    Response = 2,
    Success = 3,
    Failure = 4,
}

impl TryFrom<u8> for EapCode {
    type Error = EapolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(EapCode::Request),
            2 => Ok(EapCode::Response),
            3 => Ok(EapCode::Success),
            4 => Ok(EapCode::Failure),
            other => Err(EapolError::UnknownCode(other)),
        }
    }
}

/// WSC op-codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WscOp {
    Start = 1,
    Ack = 2,
    Nack = 3,
    Msg = 4,
    Done = 5,
    FragAck = 6,
}

impl TryFrom<u8> for WscOp {
    type Error = EapolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(WscOp::Start),
            2 => Ok(WscOp::Ack),
            3 => Ok(WscOp::Nack),
            4 => Ok(WscOp::Msg),
            5 => Ok(WscOp::Done),
            6 => Ok(WscOp::FragAck),
            other => Err(EapolError::UnknownOpCode(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EapolError {
    #[error("{what} truncated: need {needed} bytes, have {got}")]
    Truncated {
        what: &'static str,
        needed: usize,
        got: usize,
    },

    #[error("unknown EAP code {0}")]
    UnknownCode(u8),

    #[error("unknown WSC op-code {0}")]
    UnknownOpCode(u8),

    #[error("expanded EAP method is not WFA SimpleConfig")]
    NotSimpleConfig,

    #[error("reassembled WSC message exceeds its announced length")]
    Overflow,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eapol {
    Start,
    Logoff,
    Eap(EapPacket),
    Other(u8),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EapPacket {
    pub code: EapCode,
    pub id: u8,
    pub body: EapBody,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EapBody {
    /// Success and Failure carry no type.
    Empty,
    Identity(Vec<u8>),
    Wsc(WscFrame),
    Other(u8),
}

/// One EAP-WSC frame, possibly a fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WscFrame {
    pub op: WscOp,
    pub flags: u8,
    /// Total message length, present on the first fragment when `LF` is set.
    pub message_len: Option<u16>,
    pub data: Vec<u8>,
}

impl WscFrame {
    pub fn more_fragments(&self) -> bool {
        self.flags & FLAG_MORE_FRAGMENTS != 0
    }
}

fn ensure(what: &'static str, bytes: &[u8], needed: usize) -> Result<(), EapolError> {
    if bytes.len() < needed {
        return Err(EapolError::Truncated {
            what,
            needed,
            got: bytes.len(),
        });
    }
    Ok(())
}

/// Parses an EAPOL frame (the bytes following the LLC/SNAP header).
pub fn parse(bytes: &[u8]) -> Result<Eapol, EapolError> {
    ensure("EAPOL header", bytes, EAPOL_HDR_LEN)?;
    let body_len = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
    ensure("EAPOL body", bytes, EAPOL_HDR_LEN + body_len)?;
    let body = &bytes[EAPOL_HDR_LEN..EAPOL_HDR_LEN + body_len];

    match bytes[1] {
        TYPE_EAP_PACKET => parse_eap(body).map(Eapol::Eap),
        TYPE_START => Ok(Eapol::Start),
        TYPE_LOGOFF => Ok(Eapol::Logoff),
        other => Ok(Eapol::Other(other)),
    }
}

fn parse_eap(bytes: &[u8]) -> Result<EapPacket, EapolError> {
    ensure("EAP header", bytes, EAP_HDR_LEN)?;
    let code = EapCode::try_from(bytes[0])?;
    let id = bytes[1];
    let len = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
    ensure("EAP packet", bytes, len.max(EAP_HDR_LEN))?;
    let packet = &bytes[..len.max(EAP_HDR_LEN)];

    let body = match code {
        EapCode::Success | EapCode::Failure => EapBody::Empty,
        EapCode::Request | EapCode::Response => {
            ensure("EAP type", packet, EAP_HDR_LEN + 1)?;
            let data = &packet[EAP_HDR_LEN + 1..];
            match packet[EAP_HDR_LEN] {
                EAP_TYPE_IDENTITY => EapBody::Identity(data.to_vec()),
                EAP_TYPE_EXPANDED => EapBody::Wsc(parse_wsc(data)?),
                other => EapBody::Other(other),
            }
        }
    };

    Ok(EapPacket { code, id, body })
}

fn parse_wsc(bytes: &[u8]) -> Result<WscFrame, EapolError> {
    ensure("WSC header", bytes, 9)?;
    let vendor_type = u32::from_be_bytes([bytes[3], bytes[4], bytes[5], bytes[6]]);
    if bytes[..3] != WFA_VENDOR_ID || vendor_type != WFA_SIMPLECONFIG_TYPE {
        return Err(EapolError::NotSimpleConfig);
    }
    let op = WscOp::try_from(bytes[7])?;
    let flags = bytes[8];
    let mut offset = 9;
    let message_len = if flags & FLAG_LENGTH_FIELD != 0 {
        ensure("WSC message length", bytes, offset + 2)?;
        let len = u16::from_be_bytes([bytes[offset], bytes[offset + 1]]);
        offset += 2;
        Some(len)
    } else {
        None
    };

    Ok(WscFrame {
        op,
        flags,
        message_len,
        data: bytes[offset..].to_vec(),
    })
}

fn eapol_frame(kind: u8, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(EAPOL_HDR_LEN + body.len());
    out.push(EAPOL_VERSION);
    out.push(kind);
    out.extend_from_slice(&(body.len() as u16).to_be_bytes());
    out.extend_from_slice(body);
    out
}

fn eap_packet(code: EapCode, id: u8, typed: &[u8]) -> Vec<u8> {
    let len = EAP_HDR_LEN + typed.len();
    let mut eap = Vec::with_capacity(len);
    eap.push(code as u8);
    eap.push(id);
    eap.extend_from_slice(&(len as u16).to_be_bytes());
    eap.extend_from_slice(typed);
    eapol_frame(TYPE_EAP_PACKET, &eap)
}

pub fn build_start() -> Vec<u8> {
    eapol_frame(TYPE_START, &[])
}

pub fn build_identity(code: EapCode, id: u8, identity: &[u8]) -> Vec<u8> {
    let mut typed = Vec::with_capacity(1 + identity.len());
    typed.push(EAP_TYPE_IDENTITY);
    typed.extend_from_slice(identity);
    eap_packet(code, id, &typed)
}

/// Builds an unfragmented EAP-WSC frame.
pub fn build_wsc(code: EapCode, id: u8, op: WscOp, data: &[u8]) -> Vec<u8> {
    let mut typed = Vec::with_capacity(10 + data.len());
    typed.push(EAP_TYPE_EXPANDED);
    typed.extend_from_slice(&WFA_VENDOR_ID);
    typed.extend_from_slice(&WFA_SIMPLECONFIG_TYPE.to_be_bytes());
    typed.push(op as u8);
    typed.push(0x00);
    typed.extend_from_slice(data);
    eap_packet(code, id, &typed)
}

/// Success or Failure.
pub fn build_status(code: EapCode, id: u8) -> Vec<u8> {
    eap_packet(code, id, &[])
}

/// Collects fragmented WSC messages.
#[derive(Debug, Default)]
pub struct Reassembly {
    buf: Vec<u8>,
    expected: Option<usize>,
    op: Option<WscOp>,
}

impl Reassembly {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_progress(&self) -> bool {
        self.op.is_some()
    }

    /// Adds a frame. Returns the whole message once the last fragment arrives.
    pub fn push(&mut self, frame: WscFrame) -> Result<Option<(WscOp, Vec<u8>)>, EapolError> {
        if self.op.is_none() {
            self.op = Some(frame.op);
            self.expected = frame.message_len.map(usize::from);
        }
        self.buf.extend_from_slice(&frame.data);
        if let Some(expected) = self.expected
            && self.buf.len() > expected
        {
            *self = Self::default();
            return Err(EapolError::Overflow);
        }

        if frame.more_fragments() {
            return Ok(None);
        }
        let op = self.op.take().unwrap_or(frame.op);
        self.expected = None;
        Ok(Some((op, std::mem::take(&mut self.buf))))
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_frame_layout() {
        assert_eq!(build_start(), vec![0x01, 0x01, 0x00, 0x00]);
        assert_eq!(parse(&build_start()), Ok(Eapol::Start));
    }

    #[test]
    fn identity_response_layout() {
        let frame = build_identity(EapCode::Response, 7, REGISTRAR_IDENTITY);
        assert_eq!(&frame[..9], &[0x01, 0x00, 0x00, 35, 0x02, 0x07, 0x00, 35, 0x01]);

        let Eapol::Eap(packet) = parse(&frame).unwrap() else {
            panic!("expected an EAP packet");
        };
        assert_eq!(packet.code, EapCode::Response);
        assert_eq!(packet.id, 7);
        assert_eq!(packet.body, EapBody::Identity(REGISTRAR_IDENTITY.to_vec()));
    }

    #[test]
    fn wsc_frame_carries_vendor_header() {
        let frame = build_wsc(EapCode::Request, 3, WscOp::Msg, b"payload");
        assert_eq!(&frame[8..17], &[254, 0x00, 0x37, 0x2a, 0, 0, 0, 1, 4]);

        let Eapol::Eap(packet) = parse(&frame).unwrap() else {
            panic!("expected an EAP packet");
        };
        let EapBody::Wsc(wsc) = packet.body else {
            panic!("expected a WSC body");
        };
        assert_eq!(wsc.op, WscOp::Msg);
        assert_eq!(wsc.data, b"payload");
        assert!(!wsc.more_fragments());
    }

    #[test]
    fn failure_has_no_body() {
        let Eapol::Eap(packet) = parse(&build_status(EapCode::Failure, 9)).unwrap() else {
            panic!("expected an EAP packet");
        };
        assert_eq!(packet.code, EapCode::Failure);
        assert_eq!(packet.body, EapBody::Empty);
    }

    #[test]
    fn other_vendors_are_refused() {
        let mut frame = build_wsc(EapCode::Request, 1, WscOp::Start, &[]);
        frame[10] = 0x99;
        assert_eq!(parse(&frame), Err(EapolError::NotSimpleConfig));
    }

    #[test]
    fn truncated_frames_are_refused() {
        assert!(matches!(parse(&[0x01, 0x00, 0x00, 0x10, 0x01]), Err(EapolError::Truncated { .. })));
        assert!(matches!(parse(&[0x01]), Err(EapolError::Truncated { .. })));
    }

    #[test]
    fn reassembles_fragments() {
        let mut reassembly = Reassembly::new();
        let first = WscFrame {
            op: WscOp::Msg,
            flags: FLAG_MORE_FRAGMENTS | FLAG_LENGTH_FIELD,
            message_len: Some(6),
            data: b"abc".to_vec(),
        };
        let last = WscFrame {
            op: WscOp::Msg,
            flags: 0,
            message_len: None,
            data: b"def".to_vec(),
        };
        assert_eq!(reassembly.push(first), Ok(None));
        assert!(reassembly.in_progress());
        assert_eq!(reassembly.push(last), Ok(Some((WscOp::Msg, b"abcdef".to_vec()))));
        assert!(!reassembly.in_progress());
    }

    #[test]
    fn oversized_reassembly_is_an_error() {
        let mut reassembly = Reassembly::new();
        let frame = WscFrame {
            op: WscOp::Msg,
            flags: FLAG_MORE_FRAGMENTS | FLAG_LENGTH_FIELD,
            message_len: Some(2),
            data: b"abc".to_vec(),
        };
        assert_eq!(reassembly.push(frame), Err(EapolError::Overflow));
        assert!(!reassembly.in_progress());
    }
}
