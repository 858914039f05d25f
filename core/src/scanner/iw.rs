//! Active scanning through `iw dev <if> scan`, for cards that cannot capture.

use std::time::Duration;

use async_trait::async_trait;
use harvestr_common::error::{InterfaceError, ScanParseError};
use harvestr_common::models::ap::Sighting;
use harvestr_protocols::iw::parse_scan;
use tokio::process::Command;
use tracing::debug;

use super::FrameSource;
use crate::interface::classify_failure;

pub struct IwScanSource {
    interface: String,
}

impl IwScanSource {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
        }
    }
}

#[async_trait]
impl FrameSource for IwScanSource {
    /// One `iw` scan covers every channel the driver supports, so `channel` is unused.
    async fn collect(
        &mut self,
        _channel: u8,
        dwell: Duration,
    ) -> Result<Vec<Result<Sighting, ScanParseError>>, InterfaceError> {
        let output = Command::new("iw")
            .args(["dev", self.interface.as_str(), "scan"])
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.contains("Device or resource busy") {
                debug!(interface = %self.interface, "driver busy, skipping scan cycle");
                tokio::time::sleep(dwell).await;
                return Ok(Vec::new());
            }
            return Err(classify_failure(
                format!("iw dev {} scan", self.interface),
                output.status.code().unwrap_or(-1),
                stderr,
            ));
        }

        Ok(parse_scan(&String::from_utf8_lossy(&output.stdout)))
    }

    fn hops_channels(&self) -> bool {
        false
    }
}
