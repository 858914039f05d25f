//! # Target Registry
//!
//! The active set of access points, one [`ApRecord`] per BSSID. Sightings are folded
//! in as they arrive; records that go quiet for longer than the silence window are
//! evicted. Eviction only touches this in-memory view, never the store.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::time::Duration;

use harvestr_common::config::RegistryConfig;
use harvestr_common::models::ap::{ApRecord, Sighting};
use harvestr_common::network::mac::Bssid;
use tokio::time::Instant;

/// What an upsert did to the registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Change {
    pub created: bool,
    pub wps_changed: bool,
}

#[derive(Debug)]
pub struct Registry {
    records: HashMap<Bssid, ApRecord>,
    next_seq: u64,
    silence_window: Duration,
    smoothing: f32,
}

impl Registry {
    pub fn new(config: &RegistryConfig) -> Self {
        Self {
            records: HashMap::new(),
            next_seq: 0,
            silence_window: config.silence_window,
            smoothing: config.rssi_smoothing,
        }
    }

    /// Creates or merges the record for `sighting.bssid`.
    ///
    /// Merging keeps the most recent observation, with three exceptions: an empty ESSID
    /// or a zero channel never replace known values, and a sighting without WPS
    /// information leaves the WPS state alone.
    pub fn upsert(&mut self, sighting: Sighting, now: Instant) -> (&mut ApRecord, Change) {
        match self.records.entry(sighting.bssid) {
            Entry::Vacant(slot) => {
                let seq = self.next_seq;
                self.next_seq += 1;
                let record = slot.insert(ApRecord::from_sighting(sighting, seq, now));
                (
                    record,
                    Change {
                        created: true,
                        wps_changed: false,
                    },
                )
            }
            Entry::Occupied(slot) => {
                let record = slot.into_mut();
                let wps_changed = merge(record, sighting, now, self.smoothing);
                (
                    record,
                    Change {
                        created: false,
                        wps_changed,
                    },
                )
            }
        }
    }

    /// Drops every record not heard from within the silence window.
    pub fn evict_silent(&mut self, now: Instant) -> Vec<Bssid> {
        let window = self.silence_window;
        let mut evicted = Vec::new();
        self.records.retain(|bssid, record| {
            let keep = now.saturating_duration_since(record.last_seen) <= window;
            if !keep {
                evicted.push(*bssid);
            }
            keep
        });
        evicted
    }

    pub fn get(&self, bssid: &Bssid) -> Option<&ApRecord> {
        self.records.get(bssid)
    }

    pub fn get_mut(&mut self, bssid: &Bssid) -> Option<&mut ApRecord> {
        self.records.get_mut(bssid)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ApRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Returns true when the WPS state changed.
fn merge(record: &mut ApRecord, sighting: Sighting, now: Instant, smoothing: f32) -> bool {
    record.rssi = smooth_rssi(record.rssi, sighting.rssi, smoothing);
    if !sighting.essid.is_empty() {
        record.essid = sighting.essid;
    }
    if sighting.channel != 0 {
        record.channel = sighting.channel;
    }
    record.encryption = sighting.encryption;
    record.ciphers = sighting.ciphers;

    let before = record.wps_state;
    if sighting.wps_state.is_observed() {
        record.wps_state = sighting.wps_state;
    }
    if sighting.wps_device.is_some() {
        record.wps_device = sighting.wps_device;
    }

    record.last_seen = record.last_seen.max(now);
    record.sightings += 1;
    before != record.wps_state
}

fn smooth_rssi(previous: i16, latest: i16, alpha: f32) -> i16 {
    if alpha <= 0.0 {
        return latest;
    }
    (alpha * f32::from(previous) + (1.0 - alpha) * f32::from(latest)).round() as i16
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
    use harvestr_common::models::ap::{Encryption, WpsDevice, WpsState};

    fn bssid(last: u8) -> Bssid {
        Bssid::new(0x00, 0x11, 0x22, 0x33, 0x44, last)
    }

    fn sighting(last: u8, essid: &str, rssi: i16, wps: WpsState) -> Sighting {
        let mut s = Sighting::new(bssid(last));
        s.essid = essid.into();
        s.channel = 6;
        s.rssi = rssi;
        s.encryption = Encryption::Wpa2;
        s.wps_state = wps;
        s
    }

    fn registry() -> Registry {
        Registry::new(&RegistryConfig {
            silence_window: Duration::from_secs(60),
            rssi_smoothing: 0.0,
        })
    }

    #[test]
    fn one_record_per_bssid() {
        let mut reg = registry();
        let now = Instant::now();

        let (_, change) = reg.upsert(sighting(1, "a", -60, WpsState::Unlocked), now);
        assert!(change.created);
        let (record, change) = reg.upsert(sighting(1, "a", -50, WpsState::Unlocked), now);
        assert!(!change.created);
        assert_eq!(record.sightings, 2);
        reg.upsert(sighting(2, "b", -70, WpsState::None), now);

        assert_eq!(reg.len(), 2);
        assert_eq!(reg.get(&bssid(1)).unwrap().discovered, 0);
        assert_eq!(reg.get(&bssid(2)).unwrap().discovered, 1);
    }

    #[test]
    fn latest_observation_wins_except_for_gaps() {
        let mut reg = registry();
        let now = Instant::now();
        reg.upsert(sighting(1, "home", -60, WpsState::Unlocked), now);

        let mut hidden = sighting(1, "", -45, WpsState::Unknown);
        hidden.channel = 0;
        hidden.encryption = Encryption::Wpa3;
        let (record, change) = reg.upsert(hidden, now);

        assert_eq!(record.essid, "home");
        assert_eq!(record.channel, 6);
        assert_eq!(record.rssi, -45);
        assert_eq!(record.encryption, Encryption::Wpa3);
        assert_eq!(record.wps_state, WpsState::Unlocked);
        assert!(!change.wps_changed);
    }

    #[test]
    fn wps_changes_are_reported() {
        let mut reg = registry();
        let now = Instant::now();
        reg.upsert(sighting(1, "x", -60, WpsState::Unknown), now);

        let mut with_device = sighting(1, "x", -60, WpsState::Unlocked);
        with_device.wps_device = Some(WpsDevice {
            manufacturer: Some("Acme".into()),
            ..WpsDevice::default()
        });
        let (record, change) = reg.upsert(with_device, now);
        assert!(change.wps_changed);
        assert!(record.wps_device.is_some());

        let (record, change) = reg.upsert(sighting(1, "x", -60, WpsState::Locked), now);
        assert!(change.wps_changed);
        assert_eq!(record.wps_state, WpsState::Locked);
        assert!(record.wps_device.is_some());
    }

    #[test]
    fn smoothing_blends_readings() {
        let mut reg = Registry::new(&RegistryConfig {
            silence_window: Duration::from_secs(60),
            rssi_smoothing: 0.5,
        });
        let now = Instant::now();
        reg.upsert(sighting(1, "x", -80, WpsState::None), now);
        let (record, _) = reg.upsert(sighting(1, "x", -40, WpsState::None), now);
        assert_eq!(record.rssi, -60);
    }

    #[test]
    fn evicts_only_silent_records() {
        let mut reg = registry();
        let start = Instant::now();
        reg.upsert(sighting(1, "old", -60, WpsState::None), start);
        reg.upsert(sighting(2, "fresh", -60, WpsState::None), start + Duration::from_secs(50));

        assert!(reg.evict_silent(start + Duration::from_secs(60)).is_empty());

        let evicted = reg.evict_silent(start + Duration::from_secs(61));
        assert_eq!(evicted, vec![bssid(1)]);
        assert_eq!(reg.len(), 1);
        assert!(reg.get(&bssid(2)).is_some());

        // A returning AP starts over with a new discovery number.
        let (record, change) = reg.upsert(sighting(1, "old", -60, WpsState::None), start);
        assert!(change.created);
        assert_eq!(record.discovered, 2);
    }
}
