//! # Store
//!
//! Append-only JSON Lines file. Every line is one [`StoreEntry`], written with a single
//! `write_all` on a file opened in append mode, so concurrent readers see either the
//! whole line or none of it. A crash can leave a partial last line; [`StoreReader`]
//! ignores it.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use harvestr_common::config::StoreConfig;
use harvestr_common::error::StoreWriteError;
use harvestr_common::models::ap::ApSnapshot;
use harvestr_common::models::crypto::{HarvestAttempt, WpsCryptoMaterial};
use harvestr_common::network::mac::Bssid;
use serde::{Deserialize, Serialize};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreEntry {
    Snapshot(ApSnapshot),
    Capture(WpsCryptoMaterial),
    Attempt(HarvestAttempt),
}

impl StoreEntry {
    pub fn bssid(&self) -> Bssid {
        match self {
            StoreEntry::Snapshot(s) => s.bssid,
            StoreEntry::Capture(c) => c.bssid(),
            StoreEntry::Attempt(a) => a.bssid,
        }
    }
}

#[derive(Debug)]
pub struct Store {
    path: PathBuf,
    file: File,
    retries: u32,
    backoff: Duration,
}

impl Store {
    pub async fn open(config: &StoreConfig) -> Result<Self, StoreWriteError> {
        let path = config.path.clone();
        let file = open_append(&path).await.map_err(|source| StoreWriteError {
            path: path.clone(),
            attempts: 1,
            source,
        })?;

        Ok(Self {
            path,
            file,
            retries: config.retries.max(1),
            backoff: config.backoff,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes one entry. Failed writes are retried with a doubling delay; the error
    /// only comes back once every attempt has failed.
    pub async fn append(&mut self, entry: &StoreEntry) -> Result<(), StoreWriteError> {
        let mut line = serde_json::to_vec(entry).map_err(|e| StoreWriteError {
            path: self.path.clone(),
            attempts: 0,
            source: e.into(),
        })?;
        line.push(b'\n');

        let mut delay = self.backoff;
        let mut attempt = 1;
        loop {
            match self.write_line(&line).await {
                Ok(()) => return Ok(()),
                Err(source) if attempt >= self.retries => {
                    return Err(StoreWriteError {
                        path: self.path.clone(),
                        attempts: attempt,
                        source,
                    });
                }
                Err(e) => {
                    warn!(path = %self.path.display(), "store write failed (attempt {attempt}): {e}");
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                    attempt += 1;

                    // A failed write may have left half a line behind.
                    if line.first() != Some(&b'\n') {
                        line.insert(0, b'\n');
                    }
                }
            }
        }
    }

    /// Makes everything appended so far durable.
    pub async fn flush(&mut self) -> Result<(), StoreWriteError> {
        let result = async {
            self.file.flush().await?;
            self.file.sync_data().await
        }
        .await;

        result.map_err(|source| StoreWriteError {
            path: self.path.clone(),
            attempts: 1,
            source,
        })
    }

    async fn write_line(&mut self, line: &[u8]) -> std::io::Result<()> {
        self.file.write_all(line).await?;
        self.file.flush().await
    }
}

async fn open_append(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    OpenOptions::new().create(true).append(true).open(path).await
}

/// Read-only view of a store file. Safe to use while a [`Store`] is writing to it.
#[derive(Debug, Clone)]
pub struct StoreReader {
    path: PathBuf,
}

impl StoreReader {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Every complete entry in write order. A missing file reads as empty.
    pub fn entries(&self) -> std::io::Result<Vec<StoreEntry>> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let content = String::from_utf8_lossy(&raw);

        // Anything after the last newline is a write still in progress.
        let complete = match content.rfind('\n') {
            Some(end) => &content[..end],
            None => "",
        };

        let mut entries = Vec::new();
        for (idx, line) in complete.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<StoreEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => debug!(path = %self.path.display(), line = idx + 1, "skipping unreadable entry: {e}"),
            }
        }
        Ok(entries)
    }

    pub fn captures(&self) -> std::io::Result<Vec<WpsCryptoMaterial>> {
        Ok(self
            .entries()?
            .into_iter()
            .filter_map(|entry| match entry {
                StoreEntry::Capture(c) => Some(c),
                _ => None,
            })
            .collect())
    }

    pub fn captures_for(&self, bssid: Bssid) -> std::io::Result<Vec<WpsCryptoMaterial>> {
        Ok(self.captures()?.into_iter().filter(|c| c.bssid() == bssid).collect())
    }

    pub fn attempts(&self) -> std::io::Result<Vec<HarvestAttempt>> {
        Ok(self
            .entries()?
            .into_iter()
            .filter_map(|entry| match entry {
                StoreEntry::Attempt(a) => Some(a),
                _ => None,
            })
            .collect())
    }

    pub fn snapshots(&self) -> std::io::Result<Vec<ApSnapshot>> {
        Ok(self
            .entries()?
            .into_iter()
            .filter_map(|entry| match entry {
                StoreEntry::Snapshot(s) => Some(s),
                _ => None,
            })
            .collect())
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
