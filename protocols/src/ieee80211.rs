//! 802.11 frames: beacon parsing for the scanner, and the handful of frames the
//! harvester needs to authenticate, associate and exchange EAPOL with one AP.
//!
//! Every function here takes or returns frames with a radiotap header in front,
//! which is how monitor-mode interfaces deliver and accept them.

use harvestr_common::error::ScanParseError;
use harvestr_common::models::ap::{Ciphers, Encryption, Sighting, WpsState};
use harvestr_common::network::mac::Bssid;
use pnet::util::MacAddr;

use crate::radiotap;
use crate::wps;
use crate::wps::attr::{AttrWriter, id};

const HDR_LEN: usize = 24;
const FIXED_PARAMS_LEN: usize = 12;
const FCS_LEN: usize = 4;

const TYPE_MGMT: u8 = 0;
const TYPE_DATA: u8 = 2;

const SUBTYPE_ASSOC_REQ: u8 = 0;
const SUBTYPE_ASSOC_RESP: u8 = 1;
const SUBTYPE_PROBE_RESP: u8 = 5;
const SUBTYPE_BEACON: u8 = 8;
const SUBTYPE_DISASSOC: u8 = 10;
const SUBTYPE_AUTH: u8 = 11;
const SUBTYPE_DEAUTH: u8 = 12;
const SUBTYPE_QOS_DATA: u8 = 8;

const FLAG_TO_DS: u8 = 0x01;
const FLAG_FROM_DS: u8 = 0x02;
const FLAG_PROTECTED: u8 = 0x40;

const CAP_PRIVACY: u16 = 0x0010;

const IE_SSID: u8 = 0;
const IE_RATES: u8 = 1;
const IE_DS_PARAMS: u8 = 3;
const IE_RSN: u8 = 48;
const IE_HT_OPERATION: u8 = 61;
const IE_VENDOR: u8 = 221;

const MS_OUI: [u8; 3] = [0x00, 0x50, 0xF2];
const MS_TYPE_WPA: u8 = 1;
const MS_TYPE_WPS: u8 = 4;
const IEEE_OUI: [u8; 3] = [0x00, 0x0F, 0xAC];

const CIPHER_TKIP: u8 = 2;
const CIPHER_CCMP: u8 = 4;
const AKM_SAE: u8 = 8;
const AKM_SAE_EXT: u8 = 24;

const LLC_SNAP_EAPOL: [u8; 8] = [0xAA, 0xAA, 0x03, 0x00, 0x00, 0x00, 0x88, 0x8E];

/// An information element borrowed from a frame body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Element<'a> {
    pub id: u8,
    pub data: &'a [u8],
}

/// Walks the element chain. A truncated trailing element ends the walk.
pub fn elements(mut bytes: &[u8]) -> impl Iterator<Item = Element<'_>> {
    std::iter::from_fn(move || {
        if bytes.len() < 2 {
            return None;
        }
        let id = bytes[0];
        let len = bytes[1] as usize;
        if bytes.len() < 2 + len {
            return None;
        }
        let data = &bytes[2..2 + len];
        bytes = &bytes[2 + len..];
        Some(Element { id, data })
    })
}

struct Frame<'a> {
    frame_type: u8,
    subtype: u8,
    flags: u8,
    addr1: MacAddr,
    addr2: MacAddr,
    addr3: MacAddr,
    body: &'a [u8],
    info: radiotap::RadiotapInfo,
}

fn mac_at(bytes: &[u8], offset: usize) -> MacAddr {
    MacAddr::new(
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
        bytes[offset + 4],
        bytes[offset + 5],
    )
}

fn split_frame(bytes: &[u8]) -> Result<Frame<'_>, ScanParseError> {
    let info = radiotap::parse(bytes)?;
    let mut frame = &bytes[info.header_len..];
    if info.has_fcs {
        if frame.len() < FCS_LEN {
            return Err(ScanParseError::Truncated {
                what: "802.11 FCS",
                needed: FCS_LEN,
                got: frame.len(),
            });
        }
        frame = &frame[..frame.len() - FCS_LEN];
    }
    if frame.len() < HDR_LEN {
        return Err(ScanParseError::Truncated {
            what: "802.11 header",
            needed: HDR_LEN,
            got: frame.len(),
        });
    }

    let frame_type = (frame[0] >> 2) & 0x03;
    let subtype = frame[0] >> 4;
    let mut hdr_len = HDR_LEN;
    if frame_type == TYPE_DATA && subtype & SUBTYPE_QOS_DATA != 0 {
        hdr_len += 2;
    }
    if frame.len() < hdr_len {
        return Err(ScanParseError::Truncated {
            what: "802.11 QoS header",
            needed: hdr_len,
            got: frame.len(),
        });
    }

    Ok(Frame {
        frame_type,
        subtype,
        flags: frame[1],
        addr1: mac_at(frame, 4),
        addr2: mac_at(frame, 10),
        addr3: mac_at(frame, 16),
        body: &frame[hdr_len..],
        info,
    })
}

/// Parses a beacon or probe response into a [`Sighting`].
pub fn parse_sighting(bytes: &[u8]) -> Result<Sighting, ScanParseError> {
    let frame = split_frame(bytes)?;
    if frame.frame_type != TYPE_MGMT
        || (frame.subtype != SUBTYPE_BEACON && frame.subtype != SUBTYPE_PROBE_RESP)
    {
        return Err(ScanParseError::NotApFrame {
            frame_type: frame.frame_type,
            subtype: frame.subtype,
        });
    }
    if frame.body.len() < FIXED_PARAMS_LEN {
        return Err(ScanParseError::Truncated {
            what: "beacon fixed parameters",
            needed: FIXED_PARAMS_LEN,
            got: frame.body.len(),
        });
    }

    let capability = u16::from_le_bytes([frame.body[10], frame.body[11]]);
    let mut sighting = Sighting::new(frame.addr3);
    if let Some(signal) = frame.info.dbm_signal {
        sighting.rssi = i16::from(signal);
    }

    let mut ds_channel = None;
    let mut ht_channel = None;
    let mut wpa = None;
    let mut rsn = None;
    let mut wps_body: Option<Vec<u8>> = None;

    for element in elements(&frame.body[FIXED_PARAMS_LEN..]) {
        match element.id {
            IE_SSID => sighting.essid = decode_essid(element.data),
            IE_DS_PARAMS => ds_channel = element.data.first().copied(),
            IE_HT_OPERATION => ht_channel = element.data.first().copied(),
            IE_RSN => rsn = Some(parse_cipher_suites(element.data, IEEE_OUI)),
            IE_VENDOR if element.data.len() >= 4 && element.data[..3] == MS_OUI => {
                match element.data[3] {
                    MS_TYPE_WPA => wpa = Some(parse_cipher_suites(&element.data[4..], MS_OUI)),
                    // A long WPS element is split across consecutive vendor elements.
                    MS_TYPE_WPS => wps_body
                        .get_or_insert_with(Vec::new)
                        .extend_from_slice(&element.data[4..]),
                    _ => {}
                }
            }
            _ => {}
        }
    }

    sighting.channel = ds_channel
        .or(ht_channel)
        .or_else(|| frame.info.frequency.and_then(radiotap::frequency_to_channel))
        .unwrap_or(0);

    let sae = rsn.as_ref().is_some_and(|suites| suites.sae);
    sighting.encryption = Encryption::classify(
        capability & CAP_PRIVACY != 0,
        wpa.is_some(),
        rsn.is_some(),
        sae,
    );
    let suites = rsn.or(wpa).unwrap_or_default();
    sighting.ciphers = suites.ciphers;

    match wps_body {
        Some(body) => {
            let (state, device) = wps::parse_beacon_element(&body);
            sighting.wps_state = state;
            sighting.wps_device = device;
        }
        None => sighting.wps_state = WpsState::None,
    }

    Ok(sighting)
}

fn decode_essid(data: &[u8]) -> String {
    if data.iter().all(|b| *b == 0) {
        return String::new();
    }
    String::from_utf8_lossy(data).into_owned()
}

#[derive(Debug, Default, Clone, Copy)]
struct Suites {
    ciphers: Ciphers,
    sae: bool,
}

/// Reads pairwise ciphers and AKMs out of an RSN or WPA element body. Short
/// elements yield whatever was readable.
fn parse_cipher_suites(data: &[u8], oui: [u8; 3]) -> Suites {
    let mut suites = Suites::default();
    // version(2) + group cipher(4)
    let mut offset = 6;

    let read_list = |offset: &mut usize, on_suite: &mut dyn FnMut(u8)| {
        if data.len() < *offset + 2 {
            return;
        }
        let count = u16::from_le_bytes([data[*offset], data[*offset + 1]]) as usize;
        *offset += 2;
        for _ in 0..count {
            if data.len() < *offset + 4 {
                return;
            }
            if data[*offset..*offset + 3] == oui {
                on_suite(data[*offset + 3]);
            }
            *offset += 4;
        }
    };

    read_list(&mut offset, &mut |suite: u8| match suite {
        CIPHER_CCMP => suites.ciphers.ccmp = true,
        CIPHER_TKIP => suites.ciphers.tkip = true,
        _ => {}
    });
    read_list(&mut offset, &mut |suite: u8| {
        if suite == AKM_SAE || suite == AKM_SAE_EXT {
            suites.sae = true;
        }
    });

    suites
}

// ==================================================================
// Link frames
// ==================================================================

/// A frame addressed to our station by the target AP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkFrame {
    Auth { status: u16 },
    AssocResponse { status: u16 },
    Deauth { reason: u16 },
    Disassoc { reason: u16 },
    Eapol(Vec<u8>),
}

/// Picks out frames from `bssid` to `station`. Anything else is `Ok(None)`.
pub fn parse_link_frame(
    bytes: &[u8],
    bssid: Bssid,
    station: MacAddr,
) -> Result<Option<LinkFrame>, ScanParseError> {
    let frame = split_frame(bytes)?;
    if frame.addr1 != station || frame.addr2 != bssid {
        return Ok(None);
    }

    let body = frame.body;
    let read_u16 = |offset: usize| -> Result<u16, ScanParseError> {
        if body.len() < offset + 2 {
            return Err(ScanParseError::Truncated {
                what: "management body",
                needed: offset + 2,
                got: body.len(),
            });
        }
        Ok(u16::from_le_bytes([body[offset], body[offset + 1]]))
    };

    let parsed = match (frame.frame_type, frame.subtype) {
        (TYPE_MGMT, SUBTYPE_AUTH) => Some(LinkFrame::Auth { status: read_u16(4)? }),
        (TYPE_MGMT, SUBTYPE_ASSOC_RESP) => Some(LinkFrame::AssocResponse { status: read_u16(2)? }),
        (TYPE_MGMT, SUBTYPE_DEAUTH) => Some(LinkFrame::Deauth { reason: read_u16(0)? }),
        (TYPE_MGMT, SUBTYPE_DISASSOC) => Some(LinkFrame::Disassoc { reason: read_u16(0)? }),
        (TYPE_DATA, _)
            if frame.flags & FLAG_FROM_DS != 0
                && frame.flags & FLAG_PROTECTED == 0
                && body.starts_with(&LLC_SNAP_EAPOL) =>
        {
            Some(LinkFrame::Eapol(body[LLC_SNAP_EAPOL.len()..].to_vec()))
        }
        _ => None,
    };
    Ok(parsed)
}

fn header(subtype: u8, frame_type: u8, flags: u8, addrs: [MacAddr; 3], seq: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(128);
    out.extend_from_slice(&radiotap::injection_header());
    out.push((subtype << 4) | (frame_type << 2));
    out.push(flags);
    out.extend_from_slice(&[0x3a, 0x01]);
    for addr in addrs {
        out.extend_from_slice(&addr.octets());
    }
    out.extend_from_slice(&((seq & 0x0fff) << 4).to_le_bytes());
    out
}

/// Open System authentication request.
pub fn build_auth(bssid: Bssid, station: MacAddr, seq: u16) -> Vec<u8> {
    let mut out = header(SUBTYPE_AUTH, TYPE_MGMT, 0, [bssid, station, bssid], seq);
    // algorithm 0, transaction 1, status 0
    out.extend_from_slice(&[0x00, 0x00, 0x01, 0x00, 0x00, 0x00]);
    out
}

/// Association request that advertises WPS so the AP will speak EAP-WSC.
pub fn build_assoc_request(bssid: Bssid, station: MacAddr, essid: &str, seq: u16) -> Vec<u8> {
    let mut out = header(SUBTYPE_ASSOC_REQ, TYPE_MGMT, 0, [bssid, station, bssid], seq);
    // capability: ESS, short preamble; listen interval 10
    out.extend_from_slice(&[0x21, 0x00, 0x0a, 0x00]);

    let ssid = &essid.as_bytes()[..essid.len().min(32)];
    push_element(&mut out, IE_SSID, ssid);
    push_element(&mut out, IE_RATES, &[0x82, 0x84, 0x8b, 0x96, 0x0c, 0x12, 0x18, 0x24]);

    let mut wps = Vec::with_capacity(13);
    wps.extend_from_slice(&MS_OUI);
    wps.push(MS_TYPE_WPS);
    let mut attrs = AttrWriter::new();
    attrs
        .put_u8(id::VERSION, wps::message::WPS_VERSION)
        .put_u8(id::REQUEST_TYPE, 0x01);
    wps.extend_from_slice(attrs.as_bytes());
    push_element(&mut out, IE_VENDOR, &wps);
    out
}

/// Data frame to the AP carrying one EAPOL frame.
pub fn build_eapol_data(bssid: Bssid, station: MacAddr, seq: u16, eapol: &[u8]) -> Vec<u8> {
    let mut out = header(0, TYPE_DATA, FLAG_TO_DS, [bssid, station, bssid], seq);
    out.extend_from_slice(&LLC_SNAP_EAPOL);
    out.extend_from_slice(eapol);
    out
}

pub fn build_deauth(bssid: Bssid, station: MacAddr, seq: u16, reason: u16) -> Vec<u8> {
    let mut out = header(SUBTYPE_DEAUTH, TYPE_MGMT, 0, [bssid, station, bssid], seq);
    out.extend_from_slice(&reason.to_le_bytes());
    out
}

fn push_element(out: &mut Vec<u8>, id: u8, data: &[u8]) {
    out.push(id);
    out.push(data.len() as u8);
    out.extend_from_slice(data);
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

    const AP: MacAddr = MacAddr(0x00, 0x11, 0x22, 0x33, 0x44, 0x55);
    const STA: MacAddr = MacAddr(0x02, 0x00, 0x00, 0x00, 0x00, 0x01);

    /// Radiotap with flags + dBm signal, optionally marking a trailing FCS.
    fn radiotap(fcs: bool, signal: i8) -> Vec<u8> {
        vec![
            0x00,
            0x00,
            0x0a,
            0x00,
            0x22,
            0x00,
            0x00,
            0x00,
            if fcs { 0x10 } else { 0x00 },
            signal as u8,
        ]
    }

    fn beacon(elements: &[(u8, Vec<u8>)], privacy: bool) -> Vec<u8> {
        let mut frame = radiotap(false, -47);
        frame.extend_from_slice(&[0x80, 0x00, 0x00, 0x00]);
        frame.extend_from_slice(&[0xff; 6]);
        frame.extend_from_slice(&AP.octets());
        frame.extend_from_slice(&AP.octets());
        frame.extend_from_slice(&[0x00, 0x00]);
        frame.extend_from_slice(&[0u8; 8]);
        frame.extend_from_slice(&[0x64, 0x00]);
        frame.extend_from_slice(&(if privacy { 0x0411u16 } else { 0x0401 }).to_le_bytes());
        for (id, data) in elements {
            push_element(&mut frame, *id, data);
        }
        frame
    }

    fn rsn(akm: u8) -> Vec<u8> {
        vec![
            0x01, 0x00, // version
            0x00, 0x0f, 0xac, 0x04, // group CCMP
            0x01, 0x00, 0x00, 0x0f, 0xac, 0x04, // one pairwise: CCMP
            0x01, 0x00, 0x00, 0x0f, 0xac, akm, // one AKM
            0x00, 0x00,
        ]
    }

    fn wps_ie(locked: bool) -> Vec<u8> {
        let mut data = vec![0x00, 0x50, 0xf2, 0x04];
        let mut w = AttrWriter::new();
        w.put_u8(id::VERSION, 0x10).put_u8(id::WPS_STATE, 0x02);
        if locked {
            w.put_u8(id::AP_SETUP_LOCKED, 0x01);
        }
        w.put(id::DEVICE_NAME, b"Home AP");
        data.extend_from_slice(w.as_bytes());
        data
    }

    #[test]
    fn parses_wpa2_beacon_with_unlocked_wps() {
        let frame = beacon(
            &[
                (IE_SSID, b"CoffeeShop".to_vec()),
                (IE_DS_PARAMS, vec![6]),
                (IE_RSN, rsn(2)),
                (IE_VENDOR, wps_ie(false)),
            ],
            true,
        );
        let sighting = parse_sighting(&frame).unwrap();
        assert_eq!(sighting.bssid, AP);
        assert_eq!(sighting.essid, "CoffeeShop");
        assert_eq!(sighting.channel, 6);
        assert_eq!(sighting.rssi, -47);
        assert_eq!(sighting.encryption, Encryption::Wpa2);
        assert!(sighting.ciphers.ccmp && !sighting.ciphers.tkip);
        assert_eq!(sighting.wps_state, WpsState::Unlocked);
        assert_eq!(
            sighting.wps_device.and_then(|d| d.device_name).as_deref(),
            Some("Home AP")
        );
    }

    #[test]
    fn sae_akm_means_wpa3_and_locked_wps_is_reported() {
        let frame = beacon(
            &[(IE_SSID, b"Modern".to_vec()), (IE_RSN, rsn(AKM_SAE)), (IE_VENDOR, wps_ie(true))],
            true,
        );
        let sighting = parse_sighting(&frame).unwrap();
        assert_eq!(sighting.encryption, Encryption::Wpa3);
        assert_eq!(sighting.wps_state, WpsState::Locked);
    }

    #[test]
    fn hidden_open_network_without_wps() {
        let frame = beacon(&[(IE_SSID, vec![0, 0, 0]), (IE_HT_OPERATION, vec![11, 0])], false);
        let sighting = parse_sighting(&frame).unwrap();
        assert_eq!(sighting.essid, "");
        assert_eq!(sighting.channel, 11);
        assert_eq!(sighting.encryption, Encryption::Open);
        assert_eq!(sighting.wps_state, WpsState::None);
    }

    #[test]
    fn privacy_bit_alone_is_wep_and_wpa_vendor_element_is_wpa() {
        let frame = beacon(&[(IE_SSID, b"old".to_vec())], true);
        assert_eq!(parse_sighting(&frame).unwrap().encryption, Encryption::Wep);

        let wpa = vec![
            0x00, 0x50, 0xf2, 0x01, 0x01, 0x00, 0x00, 0x50, 0xf2, 0x02, 0x01, 0x00, 0x00, 0x50,
            0xf2, 0x02, 0x01, 0x00, 0x00, 0x50, 0xf2, 0x02,
        ];
        let frame = beacon(&[(IE_SSID, b"old".to_vec()), (IE_VENDOR, wpa)], true);
        let sighting = parse_sighting(&frame).unwrap();
        assert_eq!(sighting.encryption, Encryption::Wpa);
        assert!(sighting.ciphers.tkip);
    }

    #[test]
    fn strips_fcs_before_reading_elements() {
        let mut frame = beacon(&[(IE_SSID, b"fcs".to_vec())], false);
        frame[8] = 0x10;
        frame.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(parse_sighting(&frame).unwrap().essid, "fcs");
    }

    #[test]
    fn rejects_non_ap_frames_and_short_bodies() {
        let auth = build_auth(AP, STA, 1);
        assert!(matches!(
            parse_sighting(&auth),
            Err(ScanParseError::NotApFrame { frame_type: 0, subtype: 11 })
        ));

        let mut short = beacon(&[], false);
        short.truncate(10 + HDR_LEN + 4);
        assert!(matches!(parse_sighting(&short), Err(ScanParseError::Truncated { .. })));
    }

    #[test]
    fn element_walk_stops_at_truncation() {
        let bytes = [0x00, 0x02, b'h', b'i', 0x03, 0x05, 0x01];
        let found: Vec<_> = elements(&bytes).collect();
        assert_eq!(found, vec![Element { id: 0, data: b"hi" }]);
    }

    #[test]
    fn eapol_data_frame_layout() {
        let frame = build_eapol_data(AP, STA, 3, &[0x01, 0x01, 0x00, 0x00]);
        let dot11 = &frame[8..];
        assert_eq!(dot11[0], 0x08);
        assert_eq!(dot11[1], FLAG_TO_DS);
        assert_eq!(&dot11[4..10], &AP.octets());
        assert_eq!(&dot11[10..16], &STA.octets());
        assert_eq!(&dot11[22..24], &[0x30, 0x00]);
        assert_eq!(&dot11[24..32], &LLC_SNAP_EAPOL);
        assert_eq!(&dot11[32..], &[0x01, 0x01, 0x00, 0x00]);
    }

    #[test]
    fn assoc_request_advertises_wps() {
        let frame = build_assoc_request(AP, STA, "CoffeeShop", 2);
        let body = &frame[8 + HDR_LEN + 4..];
        let found: Vec<_> = elements(body).collect();
        assert_eq!(found[0], Element { id: IE_SSID, data: b"CoffeeShop" });
        assert_eq!(found[2].id, IE_VENDOR);
        assert_eq!(&found[2].data[..4], &[0x00, 0x50, 0xf2, 0x04]);
    }

    fn from_ap(fc: [u8; 2], body: &[u8]) -> Vec<u8> {
        let mut frame = radiotap(false, -50);
        frame.extend_from_slice(&fc);
        frame.extend_from_slice(&[0, 0]);
        frame.extend_from_slice(&STA.octets());
        frame.extend_from_slice(&AP.octets());
        frame.extend_from_slice(&AP.octets());
        frame.extend_from_slice(&[0, 0]);
        frame.extend_from_slice(body);
        frame
    }

    #[test]
    fn link_frames_from_the_ap_are_recognised() {
        let auth = from_ap([0xb0, 0x00], &[0, 0, 2, 0, 0, 0]);
        assert_eq!(parse_link_frame(&auth, AP, STA), Ok(Some(LinkFrame::Auth { status: 0 })));

        let assoc = from_ap([0x10, 0x00], &[0x21, 0x00, 0x11, 0x00, 0x01, 0xc0]);
        assert_eq!(
            parse_link_frame(&assoc, AP, STA),
            Ok(Some(LinkFrame::AssocResponse { status: 17 }))
        );

        let deauth = from_ap([0xc0, 0x00], &[0x07, 0x00]);
        assert_eq!(parse_link_frame(&deauth, AP, STA), Ok(Some(LinkFrame::Deauth { reason: 7 })));

        let mut eapol = LLC_SNAP_EAPOL.to_vec();
        eapol.extend_from_slice(&[0x01, 0x00, 0x00, 0x00]);
        let data = from_ap([0x08, FLAG_FROM_DS], &eapol);
        assert_eq!(
            parse_link_frame(&data, AP, STA),
            Ok(Some(LinkFrame::Eapol(vec![0x01, 0x00, 0x00, 0x00])))
        );
    }

    #[test]
    fn frames_for_other_stations_are_ignored() {
        let other = MacAddr(0x02, 0, 0, 0, 0, 0x99);
        let deauth = from_ap([0xc0, 0x00], &[0x07, 0x00]);
        assert_eq!(parse_link_frame(&deauth, AP, other), Ok(None));
    }
}
