//! # Channel Plan Model
//!
//! Defines which 802.11 channels the scanner hops across.
//!
//! A plan is parsed from a string and can be:
//! * A keyword: `2ghz` (1–13), `5ghz` (UNII-1 to UNII-3) or `all`.
//! * A single channel (e.g., `6`).
//! * A range (e.g., `1-11`).
//! * A comma separated mix of the above (e.g., `1,6,11,36-48`).

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer};

const CHANNELS_2GHZ: &[u8] = &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13];
const CHANNELS_5GHZ: &[u8] = &[
    36, 40, 44, 48, 52, 56, 60, 64, 100, 104, 108, 112, 116, 120, 124, 128, 132, 136, 140, 144,
    149, 153, 157, 161, 165,
];

/// An ordered, duplicate-free list of channels to hop across.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPlan {
    channels: Vec<u8>,
}

impl ChannelPlan {
    pub fn new(channels: impl IntoIterator<Item = u8>) -> Self {
        let set: BTreeSet<u8> = channels.into_iter().collect();
        Self { channels: set.into_iter().collect() }
    }

    pub fn channels(&self) -> &[u8] {
        &self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }
}

impl Default for ChannelPlan {
    fn default() -> Self {
        Self::new(CHANNELS_2GHZ.iter().copied())
    }
}

impl fmt::Display for ChannelPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self.channels.iter().map(u8::to_string).collect();
        write!(f, "{}", joined.join(","))
    }
}

impl FromStr for ChannelPlan {
    type Err = String;

    /// Parses a string into a `ChannelPlan`.
    ///
    /// Supported formats:
    /// * **Keywords**: "2ghz", "5ghz", "all" (case-insensitive).
    /// * **Channel**: a single number between 1 and 196.
    /// * **Range**: "Start-End" (e.g., "1-11").
    /// * **List**: any of the above separated by commas.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut channels: Vec<u8> = Vec::new();

        for part in s.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            channels.extend(parse_part(part)?);
        }

        if channels.is_empty() {
            return Err(format!("channel plan is empty: '{s}'"));
        }

        Ok(ChannelPlan::new(channels))
    }
}

impl<'de> Deserialize<'de> for ChannelPlan {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

fn parse_part(part: &str) -> Result<Vec<u8>, String> {
    if let Some(keyword) = parse_keyword(&part.to_ascii_lowercase()) {
        return Ok(keyword);
    }

    if let Some((start_str, end_str)) = part.split_once('-') {
        let start = parse_channel(start_str)?;
        let end = parse_channel(end_str)?;
        if start > end {
            return Err(format!("channel range is reversed: '{part}'"));
        }
        return Ok((start..=end).collect());
    }

    Ok(vec![parse_channel(part)?])
}

/// Parses special keywords like "2ghz" or "all".
fn parse_keyword(s_lower: &str) -> Option<Vec<u8>> {
    match s_lower {
        "2ghz" | "2.4ghz" | "bg" => Some(CHANNELS_2GHZ.to_vec()),
        "5ghz" | "a" => Some(CHANNELS_5GHZ.to_vec()),
        "all" => Some(CHANNELS_2GHZ.iter().chain(CHANNELS_5GHZ).copied().collect()),
        _ => None,
    }
}

fn parse_channel(s: &str) -> Result<u8, String> {
    let channel = s
        .trim()
        .parse::<u8>()
        .map_err(|e| format!("invalid channel '{s}': {e}"))?;
    if channel == 0 || channel > 196 {
        return Err(format!("channel out of range: {channel}"));
    }
    Ok(channel)
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
    fn test_from_str_full_parsing() {
        // Keywords (case-insensitive)
        assert_eq!(ChannelPlan::from_str("2GHz").unwrap().len(), 13);
        assert_eq!(ChannelPlan::from_str("5ghz").unwrap().channels()[0], 36);
        assert_eq!(ChannelPlan::from_str("all").unwrap().len(), 13 + CHANNELS_5GHZ.len());

        // Single channel
        assert_eq!(ChannelPlan::from_str("6").unwrap().channels(), &[6]);

        // Range
        assert_eq!(ChannelPlan::from_str("1-4").unwrap().channels(), &[1, 2, 3, 4]);

        // Mixed list, sorted and deduplicated
        assert_eq!(
            ChannelPlan::from_str("11, 1,6,6, 36-37").unwrap().channels(),
            &[1, 6, 11, 36, 37]
        );

        // Invalid
        assert!(ChannelPlan::from_str("").is_err());
        assert!(ChannelPlan::from_str("0").is_err());
        assert!(ChannelPlan::from_str("197").is_err());
        assert!(ChannelPlan::from_str("11-1").is_err());
        assert!(ChannelPlan::from_str("six").is_err());
    }

    #[test]
    fn default_plan_covers_2ghz() {
        let plan = ChannelPlan::default();
        assert_eq!(plan.channels().first(), Some(&1));
        assert_eq!(plan.channels().last(), Some(&13));
        assert_eq!(plan.to_string(), "1,2,3,4,5,6,7,8,9,10,11,12,13");
    }
}
