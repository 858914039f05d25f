use crate::terminal::colors;
use colored::*;
use harvestr_common::models::ap::{ApRecord, WpsState};
use harvestr_common::models::crypto::{HarvestAttempt, WpsCryptoMaterial};
use harvestr_common::network::mac::{self, Bssid};

pub type Detail = (String, ColoredString);

/// Hex shown in trees is cut after this many bytes.
const HEX_PREVIEW: usize = 16;

pub fn essid(name: &str) -> ColoredString {
    if name.is_empty() {
        "<hidden>".italic().color(colors::SEPARATOR)
    } else {
        name.color(colors::ESSID)
    }
}

pub fn wps_state(state: WpsState) -> ColoredString {
    let label = state.to_string();
    match state {
        WpsState::Unlocked => label.color(colors::WPS_UNLOCKED).bold(),
        WpsState::Locked => label.color(colors::WPS_LOCKED),
        WpsState::None | WpsState::Unknown => label.color(colors::WPS_OTHER),
    }
}

/// Five-step signal meter followed by the reading.
pub fn rssi(dbm: i16) -> ColoredString {
    let bars = match dbm {
        i16::MIN..=-90 => 1,
        -89..=-80 => 2,
        -79..=-70 => 3,
        -69..=-60 => 4,
        _ => 5,
    };
    let meter: String = "▂▃▄▆█".chars().take(bars).collect();
    let padded = format!("{meter:<5} {dbm} dBm");
    match bars {
        1 | 2 => padded.red(),
        3 => padded.yellow(),
        _ => padded.green(),
    }
}

pub fn hex_preview(bytes: &[u8]) -> ColoredString {
    let shown: String = bytes.iter().take(HEX_PREVIEW).map(|b| format!("{b:02x}")).collect();
    let text = if bytes.len() > HEX_PREVIEW {
        format!("{shown}… ({} bytes)", bytes.len())
    } else {
        shown
    };
    text.color(colors::HEX)
}

pub fn mac_to_detail(label: &str, mac: Bssid) -> Detail {
    (label.to_string(), mac.to_string().color(colors::MAC_ADDR))
}

pub fn vendor_to_detail(mac: Bssid) -> Option<Detail> {
    mac::get_vendor(mac).map(|vendor| ("Vendor".to_string(), vendor.color(colors::VENDOR)))
}

pub fn ap_details(record: &ApRecord) -> Vec<Detail> {
    let mut details: Vec<Detail> = vec![mac_to_detail("BSSID", record.bssid)];
    if let Some(vendor) = vendor_to_detail(record.bssid) {
        details.push(vendor);
    }
    details.push(("Channel".into(), record.channel.to_string().color(colors::CHANNEL)));
    details.push(("Signal".into(), rssi(record.rssi)));
    details.push((
        "Security".into(),
        format!("{} {}", record.encryption, record.ciphers).normal(),
    ));
    details.push(("WPS".into(), wps_state(record.wps_state)));

    if let Some(device) = &record.wps_device {
        let name: Vec<&str> = [&device.manufacturer, &device.model_name, &device.model_number]
            .into_iter()
            .filter_map(|part| part.as_deref())
            .collect();
        if !name.is_empty() {
            details.push(("Device".into(), name.join(" ").normal()));
        }
    }

    details.push(("Score".into(), format!("{:.1}", record.score).bold()));
    details
}

pub fn capture_details(capture: &WpsCryptoMaterial) -> Vec<Detail> {
    vec![
        mac_to_detail("Enrollee", capture.enrollee_mac()),
        ("PKE".into(), hex_preview(capture.pke())),
        ("PKR".into(), hex_preview(capture.pkr())),
        ("E-Hash1".into(), hex_preview(capture.e_hash1())),
        ("E-Hash2".into(), hex_preview(capture.e_hash2())),
        ("AuthKey".into(), hex_preview(capture.auth_key())),
        ("E-Nonce".into(), hex_preview(capture.e_nonce())),
        ("R-Nonce".into(), hex_preview(capture.r_nonce())),
        (
            "Captured".into(),
            capture.captured_at().format("%Y-%m-%d %H:%M:%S UTC").to_string().normal(),
        ),
    ]
}

pub fn attempt_line(attempt: &HarvestAttempt) -> String {
    format!(
        "{} {} {} {}",
        attempt.attempted_at.format("%H:%M:%S").to_string().color(colors::SEPARATOR),
        attempt.bssid.to_string().color(colors::MAC_ADDR),
        format!("{:?}", attempt.outcome).to_uppercase().yellow(),
        attempt.reason
    )
}
