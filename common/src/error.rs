//! # Error Taxonomy
//!
//! Failures are split by blast radius. Interface and store errors belong to shared
//! infrastructure and travel up to the binary; parse and transaction errors belong to
//! a single frame or a single target and are contained where they happen.

use std::path::PathBuf;

use thiserror::Error;

use crate::models::harvest::{HarvestState, TransactionOutcome};

/// Failure of the radio or of the privileged mode switch. Never retried silently.
#[derive(Debug, Error)]
pub enum InterfaceError {
    #[error("interface '{0}' not found")]
    DeviceMissing(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("interface busy: {0}")]
    Busy(String),

    #[error("`{command}` exited with {status}: {stderr}")]
    Command {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("capture on '{interface}' failed: {reason}")]
    Capture { interface: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A frame that could not be turned into a sighting. Counted and dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanParseError {
    #[error("{what} truncated: need {needed} bytes, got {got}")]
    Truncated {
        what: &'static str,
        needed: usize,
        got: usize,
    },

    #[error("unsupported radiotap version {0}")]
    RadiotapVersion(u8),

    #[error("not a beacon or probe response (type {frame_type}, subtype {subtype})")]
    NotApFrame { frame_type: u8, subtype: u8 },

    #[error("malformed {0}")]
    Malformed(String),
}

/// A per-target harvest failure. Always ends in cooldown, never halts the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HarvestTransactionError {
    #[error("no valid response in {state}")]
    Timeout { state: HarvestState },

    #[error("rejected in {state}: {reason}")]
    Rejected { state: HarvestState, reason: String },

    #[error("failed in {state}: {reason}")]
    Error { state: HarvestState, reason: String },
}

impl HarvestTransactionError {
    pub fn outcome(&self) -> TransactionOutcome {
        match self {
            HarvestTransactionError::Timeout { .. } => TransactionOutcome::Timeout,
            HarvestTransactionError::Rejected { .. } => TransactionOutcome::Rejected,
            HarvestTransactionError::Error { .. } => TransactionOutcome::Error,
        }
    }

    /// The non-terminal state the transaction was in when it failed.
    pub fn state(&self) -> HarvestState {
        match self {
            HarvestTransactionError::Timeout { state }
            | HarvestTransactionError::Rejected { state, .. }
            | HarvestTransactionError::Error { state, .. } => *state,
        }
    }

    /// The terminal state this failure maps to.
    pub fn terminal(&self) -> HarvestState {
        match self {
            HarvestTransactionError::Timeout { .. } => HarvestState::Timeout,
            HarvestTransactionError::Rejected { .. } => HarvestState::Rejected,
            HarvestTransactionError::Error { .. } => HarvestState::Error,
        }
    }
}

/// A store append that kept failing after every retry.
#[derive(Debug, Error)]
#[error("writing to {path} failed after {attempts} attempts")]
pub struct StoreWriteError {
    pub path: PathBuf,
    pub attempts: u32,
    #[source]
    pub source: std::io::Error,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing config file")]
    Parse(#[from] toml::de::Error),

    #[error("invalid ESSID pattern '{pattern}'")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid vulnerable OUI entry '{entry}' in {path}:{line}")]
    OuiEntry {
        path: PathBuf,
        line: usize,
        entry: String,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
