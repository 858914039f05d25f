//! # Configuration
//!
//! Everything the pipeline needs to know up front: which radio to use, how to score
//! targets, how long to wait at each step. Loaded from TOML; every field has a
//! default so an empty file is a valid configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::network::channels::ChannelPlan;
use crate::network::mac::Oui;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Wireless interface to drive. Detected automatically when absent.
    pub interface: Option<String>,
    pub backend: ScanBackend,
    pub scan: ScanConfig,
    pub registry: RegistryConfig,
    pub scheduler: SchedulerConfig,
    pub scoring: ScoringRule,
    pub timeouts: Timeouts,
    pub store: StoreConfig,
}

/// Where sightings come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ScanBackend {
    /// Raw capture of beacons and probe responses in monitor mode.
    #[default]
    Monitor,
    /// Active `iw dev <if> scan` in managed mode.
    Iw,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanConfig {
    pub channels: ChannelPlan,
    /// Time spent on one channel per scan cycle.
    #[serde(with = "humantime_duration")]
    pub dwell: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            channels: ChannelPlan::default(),
            dwell: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
    /// Records not heard from for this long leave the active registry.
    #[serde(with = "humantime_duration")]
    pub silence_window: Duration,
    /// Weight of the previous RSSI when merging a new reading. 0 keeps the latest.
    pub rssi_smoothing: f32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            silence_window: Duration::from_secs(300),
            rssi_smoothing: 0.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// How long a target rests after any attempt.
    #[serde(with = "humantime_duration")]
    pub cooldown: Duration,
    /// Skip targets that advertise no WPS or a locked WPS.
    pub require_wps: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(600),
            require_wps: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Weights {
    pub oui: f64,
    pub rssi: f64,
    pub wps_unlocked: f64,
    pub essid: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            oui: 40.0,
            rssi: 30.0,
            wps_unlocked: 20.0,
            essid: 10.0,
        }
    }
}

/// Inputs of the scoring function.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScoringRule {
    pub weights: Weights,
    pub vulnerable_ouis: Vec<Oui>,
    /// Extra vulnerable OUIs, one per line, `#` starts a comment.
    pub vulnerable_oui_file: Option<PathBuf>,
    pub essid_patterns: Vec<String>,
    /// Readings at or below this map to 0.
    pub rssi_floor: i16,
    /// Readings at or above this map to 1.
    pub rssi_ceiling: i16,
}

impl Default for ScoringRule {
    fn default() -> Self {
        Self {
            weights: Weights::default(),
            vulnerable_ouis: Vec::new(),
            vulnerable_oui_file: None,
            essid_patterns: Vec::new(),
            rssi_floor: -100,
            rssi_ceiling: -30,
        }
    }
}

impl ScoringRule {
    /// Merges the entries of `vulnerable_oui_file` into `vulnerable_ouis`.
    pub fn load_oui_file(&mut self) -> Result<(), ConfigError> {
        let Some(path) = self.vulnerable_oui_file.clone() else {
            return Ok(());
        };

        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;

        for (idx, line) in content.lines().enumerate() {
            let entry = line.split('#').next().unwrap_or_default().trim();
            if entry.is_empty() {
                continue;
            }
            let token = entry.split_whitespace().next().unwrap_or(entry);
            let oui: Oui = token.parse().map_err(|_| ConfigError::OuiEntry {
                path: path.clone(),
                line: idx + 1,
                entry: entry.to_string(),
            })?;
            if !self.vulnerable_ouis.contains(&oui) {
                self.vulnerable_ouis.push(oui);
            }
        }
        Ok(())
    }
}

/// Upper bounds on every wait in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Timeouts {
    #[serde(with = "humantime_duration")]
    pub lease: Duration,
    #[serde(with = "humantime_duration")]
    pub associate: Duration,
    #[serde(with = "humantime_duration")]
    pub m1: Duration,
    #[serde(with = "humantime_duration")]
    pub m3: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            lease: Duration::from_secs(30),
            associate: Duration::from_secs(5),
            m1: Duration::from_secs(10),
            m3: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub path: PathBuf,
    /// Attempts per append before the write is declared lost.
    pub retries: u32,
    /// Delay before the first retry; doubled after each failure.
    #[serde(with = "humantime_duration")]
    pub backoff: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("harvestr.jsonl"),
            retries: 5,
            backoff: Duration::from_millis(100),
        }
    }
}

impl Config {
    /// Loads `path` if given, otherwise the defaults, then validates.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut cfg = match path {
            Some(path) => {
                let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                let mut cfg: Config = toml::from_str(&raw)?;
                cfg.resolve_relative_paths(path.parent());
                cfg
            }
            None => Config::default(),
        };

        cfg.scoring.load_oui_file()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(name) = &self.interface
            && name.trim().is_empty()
        {
            return Err(ConfigError::Invalid("interface name is empty".into()));
        }
        if self.scan.channels.is_empty() {
            return Err(ConfigError::Invalid("channel plan is empty".into()));
        }
        if !(0.0..1.0).contains(&self.registry.rssi_smoothing) {
            return Err(ConfigError::Invalid(format!(
                "rssi_smoothing must be in [0, 1), got {}",
                self.registry.rssi_smoothing
            )));
        }
        if self.scoring.rssi_floor >= self.scoring.rssi_ceiling {
            return Err(ConfigError::Invalid(format!(
                "rssi_floor ({}) must be below rssi_ceiling ({})",
                self.scoring.rssi_floor, self.scoring.rssi_ceiling
            )));
        }
        for pattern in &self.scoring.essid_patterns {
            regex::Regex::new(pattern).map_err(|source| ConfigError::Pattern {
                pattern: pattern.clone(),
                source,
            })?;
        }

        let t = &self.timeouts;
        let waits = [
            ("timeouts.lease", t.lease),
            ("timeouts.associate", t.associate),
            ("timeouts.m1", t.m1),
            ("timeouts.m3", t.m3),
            ("scan.dwell", self.scan.dwell),
        ];
        if let Some((name, _)) = waits.iter().find(|(_, d)| d.is_zero()) {
            return Err(ConfigError::Invalid(format!("{name} must be greater than zero")));
        }
        if self.store.retries == 0 {
            return Err(ConfigError::Invalid("store.retries must be at least 1".into()));
        }
        Ok(())
    }

    fn resolve_relative_paths(&mut self, base: Option<&Path>) {
        let Some(base) = base else { return };
        if let Some(file) = &self.scoring.vulnerable_oui_file
            && file.is_relative()
        {
            self.scoring.vulnerable_oui_file = Some(base.join(file));
        }
    }
}

/// Durations are written the human way in the config file: `250ms`, `90s`, `10m`.
mod humantime_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
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
    use std::io::Write;

    #[test]
    fn empty_file_yields_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert!(cfg.interface.is_none());
        assert_eq!(cfg.backend, ScanBackend::Monitor);
        assert_eq!(cfg.scheduler.cooldown, Duration::from_secs(600));
        assert_eq!(cfg.timeouts.m1, Duration::from_secs(10));
        assert_eq!(cfg.scoring.weights, Weights::default());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn parses_durations_and_sections() {
        let raw = r#"
            interface = "wlan1"
            backend = "iw"

            [scan]
            channels = "1,6,11"
            dwell = "400ms"

            [scheduler]
            cooldown = "90s"

            [scoring]
            vulnerable_ouis = ["00:1A:2B", "c8-3a-35"]
            essid_patterns = ["^NETGEAR", "(?i)linksys"]

            [scoring.weights]
            oui = 50.0

            [timeouts]
            m3 = "2s"
        "#;
        let cfg: Config = toml::from_str(raw).unwrap();
        assert_eq!(cfg.interface.as_deref(), Some("wlan1"));
        assert_eq!(cfg.backend, ScanBackend::Iw);
        assert_eq!(cfg.scan.channels.channels(), &[1, 6, 11]);
        assert_eq!(cfg.scan.dwell, Duration::from_millis(400));
        assert_eq!(cfg.scheduler.cooldown, Duration::from_secs(90));
        assert_eq!(cfg.scoring.vulnerable_ouis.len(), 2);
        assert_eq!(cfg.scoring.weights.oui, 50.0);
        assert_eq!(cfg.scoring.weights.rssi, 30.0);
        assert_eq!(cfg.timeouts.m3, Duration::from_secs(2));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(toml::from_str::<Config>("colour = \"blue\"").is_err());
    }

    #[test]
    fn validate_catches_bad_values() {
        let mut cfg = Config::default();
        cfg.scoring.essid_patterns.push("(unclosed".into());
        assert!(matches!(cfg.validate(), Err(ConfigError::Pattern { .. })));

        let mut cfg = Config::default();
        cfg.registry.rssi_smoothing = 1.0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));

        let mut cfg = Config::default();
        cfg.timeouts.m1 = Duration::ZERO;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));

        let mut cfg = Config::default();
        cfg.scoring.rssi_floor = -20;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn loads_vulnerable_oui_file_relative_to_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut list = fs::File::create(dir.path().join("vulnwsc.txt")).unwrap();
        writeln!(list, "# vendors with known-weak WPS").unwrap();
        writeln!(list, "00:1A:2B  SomeVendor").unwrap();
        writeln!(list).unwrap();
        writeln!(list, "C83A35 # trailing comment").unwrap();

        let cfg_path = dir.path().join("harvestr.toml");
        fs::write(
            &cfg_path,
            "[scoring]\nvulnerable_ouis = [\"00:1A:2B\"]\nvulnerable_oui_file = \"vulnwsc.txt\"\n",
        )
        .unwrap();

        let cfg = Config::load(Some(&cfg_path)).unwrap();
        assert_eq!(
            cfg.scoring.vulnerable_ouis,
            vec![Oui([0x00, 0x1A, 0x2B]), Oui([0xC8, 0x3A, 0x35])]
        );
    }

    #[test]
    fn bad_oui_entry_reports_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ouis.txt");
        fs::write(&path, "00:1A:2B\nnot-an-oui\n").unwrap();

        let mut rule = ScoringRule {
            vulnerable_oui_file: Some(path),
            ..ScoringRule::default()
        };
        match rule.load_oui_file() {
            Err(ConfigError::OuiEntry { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected OuiEntry error, got {other:?}"),
        }
    }
}
