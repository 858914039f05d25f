//! Parser for the text printed by `iw dev <if> scan`.
//!
//! Each `BSS` line opens a block. Top-level keys sit on their own line; list items
//! under `RSN:`, `WPA:`, `WPS:` and `HT operation:` start with `*`.

use std::str::FromStr;

use harvestr_common::error::ScanParseError;
use harvestr_common::models::ap::{Encryption, Sighting, WpsDevice, WpsState};
use pnet::util::MacAddr;

use crate::radiotap::frequency_to_channel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Other,
    Rsn,
    Wpa,
    Wps,
    HtOperation,
}

#[derive(Debug)]
struct Block {
    sighting: Sighting,
    privacy: bool,
    wpa: bool,
    rsn: bool,
    sae: bool,
    wps: bool,
    locked: bool,
    ds_channel: Option<u8>,
    primary_channel: Option<u8>,
    freq: Option<u16>,
    device: WpsDevice,
}

impl Block {
    fn new(bssid: MacAddr) -> Self {
        Self {
            sighting: Sighting::new(bssid),
            privacy: false,
            wpa: false,
            rsn: false,
            sae: false,
            wps: false,
            locked: false,
            ds_channel: None,
            primary_channel: None,
            freq: None,
            device: WpsDevice::default(),
        }
    }

    fn finish(mut self) -> Sighting {
        self.sighting.channel = self
            .ds_channel
            .or(self.primary_channel)
            .or_else(|| self.freq.and_then(frequency_to_channel))
            .unwrap_or(0);
        self.sighting.encryption = Encryption::classify(self.privacy, self.wpa, self.rsn, self.sae);
        self.sighting.wps_state = match (self.wps, self.locked) {
            (false, _) => WpsState::None,
            (true, true) => WpsState::Locked,
            (true, false) => WpsState::Unlocked,
        };
        if !self.device.is_empty() {
            self.sighting.wps_device = Some(self.device);
        }
        self.sighting
    }
}

/// Parses a full scan dump. One entry per `BSS` block; a block whose BSSID does not
/// parse becomes an error and its lines are skipped.
pub fn parse_scan(output: &str) -> Vec<Result<Sighting, ScanParseError>> {
    let mut results = Vec::new();
    let mut current: Option<Block> = None;
    let mut section = Section::Other;

    for raw in output.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix("BSS ") {
            if let Some(block) = current.take() {
                results.push(Ok(block.finish()));
            }
            section = Section::Other;
            let candidate = rest.split('(').next().unwrap_or_default().trim();
            match MacAddr::from_str(candidate) {
                Ok(bssid) => current = Some(Block::new(bssid)),
                Err(_) => results.push(Err(ScanParseError::Malformed(format!(
                    "BSS line with bad address: {line}"
                )))),
            }
            continue;
        }

        let Some(block) = current.as_mut() else {
            continue;
        };

        if let Some(item) = line.strip_prefix('*') {
            apply_item(block, section, item.trim());
            continue;
        }

        let (key, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.trim();
        section = Section::Other;
        match key {
            "SSID" => block.sighting.essid = value.to_string(),
            "freq" => block.freq = value.parse::<f64>().ok().map(|f| f as u16),
            "signal" => {
                if let Some(dbm) = value.split_whitespace().next().and_then(|v| v.parse::<f64>().ok())
                {
                    block.sighting.rssi = dbm.round() as i16;
                }
            }
            "capability" => block.privacy = value.contains("Privacy"),
            "DS Parameter set" => {
                block.ds_channel = value.strip_prefix("channel").and_then(|c| c.trim().parse().ok())
            }
            "RSN" => {
                block.rsn = true;
                section = Section::Rsn;
                // iw prints the first item on the header line.
                if let Some(item) = value.strip_prefix('*') {
                    apply_item(block, section, item.trim());
                }
            }
            "WPA" => {
                block.wpa = true;
                section = Section::Wpa;
                if let Some(item) = value.strip_prefix('*') {
                    apply_item(block, section, item.trim());
                }
            }
            "WPS" => {
                block.wps = true;
                section = Section::Wps;
                if let Some(item) = value.strip_prefix('*') {
                    apply_item(block, section, item.trim());
                }
            }
            "HT operation" => section = Section::HtOperation,
            _ => {}
        }
    }

    if let Some(block) = current {
        results.push(Ok(block.finish()));
    }
    results
}

fn apply_item(block: &mut Block, section: Section, item: &str) {
    let (key, value) = item.split_once(':').unwrap_or((item, ""));
    let value = value.trim();
    let text = (!value.is_empty()).then(|| value.to_string());

    match section {
        Section::Rsn | Section::Wpa => {
            if key.contains("cipher") {
                block.sighting.ciphers.ccmp |= value.contains("CCMP");
                block.sighting.ciphers.tkip |= value.contains("TKIP");
            }
            if section == Section::Rsn && key.starts_with("Authentication suites") {
                block.sae |= value.split_whitespace().any(|suite| suite.starts_with("SAE"));
            }
        }
        Section::Wps => match key {
            "AP setup locked" => block.locked = matches!(value, "0x01" | "1" | "yes"),
            "Manufacturer" => block.device.manufacturer = text,
            "Model" => block.device.model_name = text,
            "Model Number" => block.device.model_number = text,
            "Device name" => block.device.device_name = text,
            _ => {}
        },
        Section::HtOperation => {
            if key == "primary channel" {
                block.primary_channel = value.parse().ok();
            }
        }
        Section::Other => {}
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
