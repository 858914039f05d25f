use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceMode {
    Managed,
    Monitor,
    Transitioning,
}

impl fmt::Display for InterfaceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            InterfaceMode::Managed => "managed",
            InterfaceMode::Monitor => "monitor",
            InterfaceMode::Transitioning => "transitioning",
        };
        f.write_str(label)
    }
}

/// What a lease is requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LeaseKind {
    Scan,
    Harvest,
}

impl fmt::Display for LeaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeaseKind::Scan => f.write_str("scan"),
            LeaseKind::Harvest => f.write_str("harvest"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LeaseHolder {
    None,
    Scan,
    Harvest,
}

impl From<LeaseKind> for LeaseHolder {
    fn from(kind: LeaseKind) -> Self {
        match kind {
            LeaseKind::Scan => LeaseHolder::Scan,
            LeaseKind::Harvest => LeaseHolder::Harvest,
        }
    }
}

/// Mode and ownership of the radio. Owned by the interface manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceState {
    pub mode: InterfaceMode,
    pub holder: LeaseHolder,
    /// Harvest lease requests currently waiting.
    pub pending_harvests: usize,
}

impl InterfaceState {
    pub fn new(mode: InterfaceMode) -> Self {
        Self {
            mode,
            holder: LeaseHolder::None,
            pending_harvests: 0,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.holder == LeaseHolder::None && self.mode != InterfaceMode::Transitioning
    }
}
