//! # Captured WPS Material
//!
//! The transcript pulled out of a registration exchange that reached M3, and the
//! record left behind by an attempt that did not.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::harvest::{HarvestState, TransactionOutcome};
use crate::network::mac::{Bssid, serde_mac};

/// Transcript of an M1 → M2 → M3 exchange.
///
/// Only ever built for [`TransactionOutcome::CompleteM3`]; fields are private so a
/// value cannot be altered after capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WpsCryptoMaterial {
    #[serde(with = "serde_mac")]
    bssid: Bssid,
    #[serde(with = "serde_mac")]
    enrollee_mac: Bssid,
    #[serde(with = "hex::serde")]
    pke: Vec<u8>,
    #[serde(with = "hex::serde")]
    pkr: Vec<u8>,
    #[serde(with = "hex::serde")]
    e_hash1: Vec<u8>,
    #[serde(with = "hex::serde")]
    e_hash2: Vec<u8>,
    #[serde(with = "hex::serde")]
    auth_key: Vec<u8>,
    #[serde(with = "hex::serde")]
    e_nonce: Vec<u8>,
    #[serde(with = "hex::serde")]
    r_nonce: Vec<u8>,
    captured_at: DateTime<Utc>,
    outcome: TransactionOutcome,
}

/// Field-by-field input for [`WpsCryptoMaterial::new`].
#[derive(Debug, Clone)]
pub struct Transcript {
    pub enrollee_mac: Bssid,
    pub pke: Vec<u8>,
    pub pkr: Vec<u8>,
    pub e_hash1: Vec<u8>,
    pub e_hash2: Vec<u8>,
    pub auth_key: Vec<u8>,
    pub e_nonce: Vec<u8>,
    pub r_nonce: Vec<u8>,
}

impl WpsCryptoMaterial {
    pub fn new(bssid: Bssid, transcript: Transcript, captured_at: DateTime<Utc>) -> Self {
        Self {
            bssid,
            enrollee_mac: transcript.enrollee_mac,
            pke: transcript.pke,
            pkr: transcript.pkr,
            e_hash1: transcript.e_hash1,
            e_hash2: transcript.e_hash2,
            auth_key: transcript.auth_key,
            e_nonce: transcript.e_nonce,
            r_nonce: transcript.r_nonce,
            captured_at,
            outcome: TransactionOutcome::CompleteM3,
        }
    }

    pub fn bssid(&self) -> Bssid {
        self.bssid
    }

    pub fn enrollee_mac(&self) -> Bssid {
        self.enrollee_mac
    }

    pub fn pke(&self) -> &[u8] {
        &self.pke
    }

    pub fn pkr(&self) -> &[u8] {
        &self.pkr
    }

    pub fn e_hash1(&self) -> &[u8] {
        &self.e_hash1
    }

    pub fn e_hash2(&self) -> &[u8] {
        &self.e_hash2
    }

    pub fn auth_key(&self) -> &[u8] {
        &self.auth_key
    }

    pub fn e_nonce(&self) -> &[u8] {
        &self.e_nonce
    }

    pub fn r_nonce(&self) -> &[u8] {
        &self.r_nonce
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn outcome(&self) -> TransactionOutcome {
        self.outcome
    }
}

/// A harvest attempt that ended without material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestAttempt {
    #[serde(with = "serde_mac")]
    pub bssid: Bssid,
    pub outcome: TransactionOutcome,
    /// The state the transaction was in when it failed.
    pub state: HarvestState,
    pub reason: String,
    pub attempted_at: DateTime<Utc>,
}
