use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use mac_oui::Oui as OuiDb;
use pnet::util::MacAddr;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Hardware address of an access point.
pub type Bssid = MacAddr;

static OUI_DB: OnceLock<Option<OuiDb>> = OnceLock::new();

/// Retrieves or initializes the **Organizationally unique identifier** database.
///
/// A database that fails to load is remembered as missing; vendor names are
/// cosmetic and never worth failing a scan over.
fn get_oui_db() -> Option<&'static OuiDb> {
    OUI_DB.get_or_init(|| OuiDb::default().ok()).as_ref()
}

/// Identify the vendor of a MAC address.
pub fn get_vendor(mac: MacAddr) -> Option<String> {
    let db = get_oui_db()?;
    let mac_str = mac.to_string();
    match db.lookup_by_mac(&mac_str) {
        Ok(Some(entry)) => Some(entry.company_name.clone()),
        _ => None,
    }
}

/// The vendor prefix of a hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Oui(pub [u8; 3]);

impl Oui {
    pub fn of(mac: MacAddr) -> Self {
        Oui([mac.0, mac.1, mac.2])
    }
}

impl fmt::Display for Oui {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}:{:02X}:{:02X}", self.0[0], self.0[1], self.0[2])
    }
}

impl FromStr for Oui {
    type Err = String;

    /// Accepts `AA:BB:CC`, `AA-BB-CC` and bare `AABBCC`, case-insensitive.
    /// A full MAC address is accepted too; only its first three octets are kept.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, ':' | '-' | '.'))
            .collect();

        if digits.len() != 6 && digits.len() != 12 {
            return Err(format!("invalid OUI: {s}"));
        }

        let mut octets = [0u8; 3];
        for (idx, octet) in octets.iter_mut().enumerate() {
            let pair = &digits[idx * 2..idx * 2 + 2];
            *octet = u8::from_str_radix(pair, 16).map_err(|e| format!("invalid OUI '{s}': {e}"))?;
        }
        Ok(Oui(octets))
    }
}

impl Serialize for Oui {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Oui {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Serde adapter storing a [`MacAddr`] as its `aa:bb:cc:dd:ee:ff` text form.
pub mod serde_mac {
    use super::*;

    pub fn serialize<S: Serializer>(mac: &MacAddr, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(mac)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<MacAddr, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(|e| serde::de::Error::custom(format!("invalid MAC '{raw}': {e:?}")))
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
