use std::fmt;

use serde::{Deserialize, Serialize};

/// States of one WPS registration transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarvestState {
    Idle,
    Associating,
    EapolStart,
    AwaitM1,
    SentM2,
    AwaitM3,
    Complete,
    Timeout,
    Rejected,
    Error,
}

impl fmt::Display for HarvestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HarvestState::Idle => "IDLE",
            HarvestState::Associating => "ASSOCIATING",
            HarvestState::EapolStart => "EAPOL_START",
            HarvestState::AwaitM1 => "AWAIT_M1",
            HarvestState::SentM2 => "SENT_M2",
            HarvestState::AwaitM3 => "AWAIT_M3",
            HarvestState::Complete => "COMPLETE",
            HarvestState::Timeout => "TIMEOUT",
            HarvestState::Rejected => "REJECTED",
            HarvestState::Error => "ERROR",
        };
        f.write_str(label)
    }
}

/// How a harvest attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionOutcome {
    CompleteM3,
    Timeout,
    Rejected,
    Error,
}

impl fmt::Display for TransactionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransactionOutcome::CompleteM3 => "COMPLETE_M3",
            TransactionOutcome::Timeout => "TIMEOUT",
            TransactionOutcome::Rejected => "REJECTED",
            TransactionOutcome::Error => "ERROR",
        };
        f.write_str(label)
    }
}
