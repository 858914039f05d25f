//! Passive capture of beacons and probe responses on a monitor interface.

use std::time::Duration;

use async_trait::async_trait;
use harvestr_common::error::{InterfaceError, ScanParseError};
use harvestr_common::models::ap::Sighting;
use harvestr_protocols::ieee80211;

use super::FrameSource;
use crate::radio::{self, RadioHandle};

pub struct MonitorCapture {
    interface: String,
    radio: Option<RadioHandle>,
}

impl MonitorCapture {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            radio: None,
        }
    }
}

#[async_trait]
impl FrameSource for MonitorCapture {
    async fn collect(
        &mut self,
        _channel: u8,
        dwell: Duration,
    ) -> Result<Vec<Result<Sighting, ScanParseError>>, InterfaceError> {
        let mut radio = match self.radio.take() {
            Some(radio) => radio,
            None => radio::open(&self.interface)?,
        };
        // Queued frames were heard before the hop.
        radio.drain();

        let deadline = tokio::time::sleep(dwell);
        tokio::pin!(deadline);

        let mut heard = Vec::new();
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                frame = radio.recv() => {
                    let Some(bytes) = frame else {
                        return Err(InterfaceError::Capture {
                            interface: self.interface.clone(),
                            reason: "capture thread stopped".into(),
                        });
                    };
                    match ieee80211::parse_sighting(&bytes) {
                        // Data and control traffic is expected on a busy channel.
                        Err(ScanParseError::NotApFrame { .. }) => {}
                        parsed => heard.push(parsed),
                    }
                }
            }
        }

        self.radio = Some(radio);
        Ok(heard)
    }

    fn reset(&mut self) {
        self.radio = None;
    }
}
