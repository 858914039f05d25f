//! # Access Point Model
//!
//! A [`Sighting`] is one observation of an access point as reported by a frame
//! source. The registry folds sightings into one canonical [`ApRecord`] per BSSID;
//! [`ApSnapshot`] is the serializable, wall-clock view of a record that goes to disk.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::network::mac::{self, Bssid, Oui, serde_mac};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Encryption {
    Open,
    Wep,
    Wpa,
    Wpa2,
    Wpa3,
}

impl Encryption {
    /// Derives the strongest advertised class from the raw capability flags.
    pub fn classify(privacy: bool, wpa: bool, rsn: bool, sae: bool) -> Self {
        match (privacy, wpa, rsn, sae) {
            (_, _, true, true) => Encryption::Wpa3,
            (_, _, true, false) => Encryption::Wpa2,
            (_, true, false, _) => Encryption::Wpa,
            (true, false, false, _) => Encryption::Wep,
            _ => Encryption::Open,
        }
    }
}

impl fmt::Display for Encryption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Encryption::Open => "OPEN",
            Encryption::Wep => "WEP",
            Encryption::Wpa => "WPA",
            Encryption::Wpa2 => "WPA2",
            Encryption::Wpa3 => "WPA3",
        };
        f.write_str(label)
    }
}

/// What the beacon says about WiFi Protected Setup.
///
/// `Unknown` means the observation carried no WPS information either way,
/// not that the access point lacks WPS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WpsState {
    None,
    Locked,
    Unlocked,
    Unknown,
}

impl WpsState {
    pub fn is_observed(self) -> bool {
        self != WpsState::Unknown
    }
}

impl fmt::Display for WpsState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WpsState::None => "NONE",
            WpsState::Locked => "LOCKED",
            WpsState::Unlocked => "UNLOCKED",
            WpsState::Unknown => "UNKNOWN",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ciphers {
    pub ccmp: bool,
    pub tkip: bool,
}

impl fmt::Display for Ciphers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.ccmp, self.tkip) {
            (true, true) => f.write_str("CCMP+TKIP"),
            (true, false) => f.write_str("CCMP"),
            (false, true) => f.write_str("TKIP"),
            (false, false) => f.write_str("-"),
        }
    }
}

/// Device strings advertised inside the WPS information element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WpsDevice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
}

impl WpsDevice {
    pub fn is_empty(&self) -> bool {
        self.manufacturer.is_none()
            && self.model_name.is_none()
            && self.model_number.is_none()
            && self.device_name.is_none()
    }
}

/// One observation of an access point.
#[derive(Debug, Clone, PartialEq)]
pub struct Sighting {
    pub bssid: Bssid,
    /// Empty for hidden networks.
    pub essid: String,
    pub channel: u8,
    pub rssi: i16,
    pub encryption: Encryption,
    pub ciphers: Ciphers,
    pub wps_state: WpsState,
    pub wps_device: Option<WpsDevice>,
}

impl Sighting {
    pub fn new(bssid: Bssid) -> Self {
        Self {
            bssid,
            essid: String::new(),
            channel: 0,
            rssi: -100,
            encryption: Encryption::Open,
            ciphers: Ciphers::default(),
            wps_state: WpsState::Unknown,
            wps_device: None,
        }
    }
}

/// The canonical, merged view of one access point in the active registry.
#[derive(Debug, Clone, PartialEq)]
pub struct ApRecord {
    pub bssid: Bssid,
    pub essid: String,
    pub channel: u8,
    pub encryption: Encryption,
    pub ciphers: Ciphers,
    /// Signal strength in dBm, possibly smoothed across sightings.
    pub rssi: i16,
    pub wps_state: WpsState,
    pub wps_device: Option<WpsDevice>,
    pub first_seen: Instant,
    pub last_seen: Instant,
    /// Registry-wide discovery order, used to break score ties.
    pub discovered: u64,
    pub sightings: u64,
    pub score: f64,
}

impl ApRecord {
    pub fn from_sighting(sighting: Sighting, discovered: u64, now: Instant) -> Self {
        Self {
            bssid: sighting.bssid,
            essid: sighting.essid,
            channel: sighting.channel,
            encryption: sighting.encryption,
            ciphers: sighting.ciphers,
            rssi: sighting.rssi,
            wps_state: sighting.wps_state,
            wps_device: sighting.wps_device,
            first_seen: now,
            last_seen: now,
            discovered,
            sightings: 1,
            score: 0.0,
        }
    }

    pub fn oui(&self) -> Oui {
        Oui::of(self.bssid)
    }

    pub fn is_hidden(&self) -> bool {
        self.essid.is_empty()
    }

    pub fn snapshot(&self) -> ApSnapshot {
        ApSnapshot {
            bssid: self.bssid,
            essid: self.essid.clone(),
            channel: self.channel,
            encryption: self.encryption,
            ciphers: self.ciphers,
            rssi: self.rssi,
            wps_state: self.wps_state,
            wps_device: self.wps_device.clone(),
            oui: self.oui(),
            vendor: mac::get_vendor(self.bssid),
            score: self.score,
            observed_at: Utc::now(),
        }
    }
}

/// The persisted form of an [`ApRecord`] at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApSnapshot {
    #[serde(with = "serde_mac")]
    pub bssid: Bssid,
    pub essid: String,
    pub channel: u8,
    pub encryption: Encryption,
    pub ciphers: Ciphers,
    pub rssi: i16,
    pub wps_state: WpsState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wps_device: Option<WpsDevice>,
    pub oui: Oui,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    pub score: f64,
    pub observed_at: DateTime<Utc>,
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
    fn classify_prefers_strongest_suite() {
        assert_eq!(Encryption::classify(true, true, true, true), Encryption::Wpa3);
        assert_eq!(Encryption::classify(true, true, true, false), Encryption::Wpa2);
        assert_eq!(Encryption::classify(true, true, false, false), Encryption::Wpa);
        assert_eq!(Encryption::classify(true, false, false, false), Encryption::Wep);
        assert_eq!(Encryption::classify(false, false, false, false), Encryption::Open);
    }

    #[test]
    fn snapshot_serializes_with_text_addresses() {
        let bssid = Bssid::new(0x00, 0x11, 0x22, 0x33, 0x44, 0x55);
        let mut sighting = Sighting::new(bssid);
        sighting.essid = "lab".into();
        sighting.wps_state = WpsState::Unlocked;
        let record = ApRecord::from_sighting(sighting, 0, Instant::now());

        let json = serde_json::to_value(record.snapshot()).unwrap();
        assert_eq!(json["bssid"], "00:11:22:33:44:55");
        assert_eq!(json["oui"], "00:11:22");
        assert_eq!(json["wps_state"], "UNLOCKED");
        assert_eq!(json["encryption"], "OPEN");
    }
}
