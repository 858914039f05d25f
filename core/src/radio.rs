//! Raw 802.11 frame access on a monitor-mode interface.
//!
//! Reads happen on a dedicated thread, since the pnet receiver blocks; frames are
//! handed to the async side through an unbounded queue.

use std::io::ErrorKind;
use std::time::Duration;

use harvestr_common::error::InterfaceError;
use harvestr_common::network::interface::find_interface;
use pnet::datalink::{self, Channel, Config, DataLinkSender};
use pnet::util::MacAddr;
use tokio::sync::mpsc;
use tracing::debug;

const READ_TIMEOUT: Duration = Duration::from_millis(100);

pub struct RadioHandle {
    interface: String,
    mac: MacAddr,
    tx: Box<dyn DataLinkSender>,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

/// Opens a layer 2 channel on `interface` and starts the reader thread.
///
/// The thread stops on its own once the handle is dropped.
pub fn open(interface: &str) -> Result<RadioHandle, InterfaceError> {
    let intf = find_interface(interface).ok_or_else(|| InterfaceError::DeviceMissing(interface.to_string()))?;
    let mac = intf.mac.ok_or_else(|| InterfaceError::Capture {
        interface: interface.to_string(),
        reason: "no hardware address".into(),
    })?;

    let config = Config {
        read_timeout: Some(READ_TIMEOUT),
        ..Config::default()
    };
    let (tx, mut rx) = match datalink::channel(&intf, config) {
        Ok(Channel::Ethernet(tx, rx)) => (tx, rx),
        Ok(_) => {
            return Err(InterfaceError::Capture {
                interface: interface.to_string(),
                reason: "unsupported channel type".into(),
            });
        }
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            return Err(InterfaceError::PermissionDenied(format!("raw socket on {interface}: {e}")));
        }
        Err(e) => return Err(e.into()),
    };

    let (queue_tx, queue_rx) = mpsc::unbounded_channel();
    let name = interface.to_string();
    std::thread::spawn(move || {
        loop {
            match rx.next() {
                Ok(frame) => {
                    if queue_tx.send(frame.to_vec()).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == ErrorKind::TimedOut => {
                    if queue_tx.is_closed() {
                        break;
                    }
                }
                Err(e) => {
                    debug!(interface = %name, "capture stopped: {e}");
                    break;
                }
            }
        }
    });

    Ok(RadioHandle {
        interface: interface.to_string(),
        mac,
        tx,
        rx: queue_rx,
    })
}

impl RadioHandle {
    pub fn mac(&self) -> MacAddr {
        self.mac
    }

    /// Next captured frame. `None` once the reader thread has stopped.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }

    /// Throws away everything captured so far.
    pub fn drain(&mut self) -> usize {
        let mut dropped = 0;
        while self.rx.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }

    pub fn send(&mut self, frame: &[u8]) -> Result<(), InterfaceError> {
        match self.tx.send_to(frame, None) {
            Some(Ok(())) => Ok(()),
            Some(Err(e)) => Err(e.into()),
            None => Err(InterfaceError::Capture {
                interface: self.interface.clone(),
                reason: "sender refused the frame".into(),
            }),
        }
    }
}
