use harvestr_common::error::ScanParseError;

const PRESENT_TSFT: u32 = 1 << 0;
const PRESENT_FLAGS: u32 = 1 << 1;
const PRESENT_RATE: u32 = 1 << 2;
const PRESENT_CHANNEL: u32 = 1 << 3;
const PRESENT_FHSS: u32 = 1 << 4;
const PRESENT_DBM_ANTSIGNAL: u32 = 1 << 5;
const PRESENT_EXT: u32 = 1 << 31;

/// The frame carries its FCS at the end.
const FLAG_FCS: u8 = 0x10;

const MIN_HDR_LEN: usize = 8;

/// The fields of a radiotap header the scanner cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RadiotapInfo {
    /// Length of the whole header; the 802.11 frame starts here.
    pub header_len: usize,
    pub dbm_signal: Option<i8>,
    pub frequency: Option<u16>,
    pub has_fcs: bool,
}

/// Parses the radiotap header at the start of `bytes`.
///
/// Only the first presence word is decoded; extended presence words are skipped so
/// the field offsets stay right.
pub fn parse(bytes: &[u8]) -> Result<RadiotapInfo, ScanParseError> {
    ensure_len("radiotap header", bytes, MIN_HDR_LEN)?;

    if bytes[0] != 0 {
        return Err(ScanParseError::RadiotapVersion(bytes[0]));
    }
    let header_len = u16::from_le_bytes([bytes[2], bytes[3]]) as usize;
    if header_len < MIN_HDR_LEN {
        return Err(ScanParseError::Truncated {
            what: "radiotap header length",
            needed: MIN_HDR_LEN,
            got: header_len,
        });
    }
    ensure_len("radiotap header", bytes, header_len)?;

    let present = read_u32(bytes, 4);
    let mut offset = 8;
    let mut word = present;
    while word & PRESENT_EXT != 0 {
        ensure_len("radiotap presence words", &bytes[..header_len], offset + 4)?;
        word = read_u32(bytes, offset);
        offset += 4;
    }

    let header = &bytes[..header_len];
    let mut info = RadiotapInfo {
        header_len,
        ..RadiotapInfo::default()
    };

    // (bit, alignment, size) in the order fields appear on the wire.
    let fields: [(u32, usize, usize); 6] = [
        (PRESENT_TSFT, 8, 8),
        (PRESENT_FLAGS, 1, 1),
        (PRESENT_RATE, 1, 1),
        (PRESENT_CHANNEL, 2, 4),
        (PRESENT_FHSS, 1, 2),
        (PRESENT_DBM_ANTSIGNAL, 1, 1),
    ];

    for (bit, align, size) in fields {
        if present & bit == 0 {
            continue;
        }
        offset = offset.next_multiple_of(align);
        ensure_len("radiotap field", header, offset + size)?;

        match bit {
            PRESENT_FLAGS => info.has_fcs = header[offset] & FLAG_FCS != 0,
            PRESENT_CHANNEL => {
                info.frequency = Some(u16::from_le_bytes([header[offset], header[offset + 1]]))
            }
            PRESENT_DBM_ANTSIGNAL => info.dbm_signal = Some(header[offset] as i8),
            _ => {}
        }
        offset += size;
    }

    Ok(info)
}

/// The smallest valid header for injected frames: no fields, the driver picks the rate.
pub fn injection_header() -> [u8; 8] {
    [0x00, 0x00, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00]
}

/// Maps a centre frequency in MHz to its 802.11 channel number.
pub fn frequency_to_channel(freq: u16) -> Option<u8> {
    match freq {
        2484 => Some(14),
        2412..=2472 => Some(((freq - 2407) / 5) as u8),
        5000..=5900 => Some(((freq - 5000) / 5) as u8),
        5955..=7115 => Some(((freq - 5950) / 5) as u8),
        _ => None,
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

fn ensure_len(what: &'static str, bytes: &[u8], needed: usize) -> Result<(), ScanParseError> {
    if bytes.len() < needed {
        return Err(ScanParseError::Truncated {
            what,
            needed,
            got: bytes.len(),
        });
    }
    Ok(())
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
