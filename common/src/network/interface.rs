use pnet::datalink::{self, NetworkInterface};
#[cfg(target_os = "linux")]
use linux_impl::is_wireless;
#[cfg(not(target_os = "linux"))]
use fallback_impl::is_wireless;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ViabilityError {
    /// The interface is a loopback device.
    IsLoopback,
    /// The interface has no 802.11 capability.
    NotWireless,
    /// The interface does not have a MAC address.
    NoMacAddress,
}

/// Looks up an interface by its kernel name.
pub fn find_interface(name: &str) -> Option<NetworkInterface> {
    datalink::interfaces().into_iter().find(|intf| intf.name == name)
}

/// Picks the wireless interface best suited for capture when none was given.
pub fn get_radio_interface() -> Option<NetworkInterface> {
    let candidates: Vec<NetworkInterface> = datalink::interfaces()
        .into_iter()
        .filter(|intf| is_viable_radio_interface(intf, is_wireless).is_ok())
        .collect();

    select_best_radio_interface(candidates)
}

fn is_viable_radio_interface(
    interface: &NetworkInterface,
    is_wireless: impl Fn(&NetworkInterface) -> bool,
) -> Result<(), ViabilityError> {
    if interface.is_loopback() {
        return Err(ViabilityError::IsLoopback);
    }
    if !is_wireless(interface) {
        return Err(ViabilityError::NotWireless);
    }
    if interface.mac.is_none() {
        return Err(ViabilityError::NoMacAddress);
    }
    Ok(())
}

/// Prefers an interface that is already a monitor VIF (`wlan0mon`), then one that is up.
fn select_best_radio_interface(interfaces: Vec<NetworkInterface>) -> Option<NetworkInterface> {
    interfaces
        .iter()
        .find(|intf| intf.name.ends_with("mon"))
        .or_else(|| interfaces.iter().find(|intf| intf.is_up()))
        .or(interfaces.first())
        .cloned()
}

#[cfg(target_os = "linux")]
mod linux_impl {
    use super::*;
    use std::path::Path;

    pub fn is_wireless(interface: &NetworkInterface) -> bool {
        Path::new(&format!("/sys/class/net/{}/wireless", interface.name)).exists()
            || Path::new(&format!("/sys/class/net/{}/phy80211", interface.name)).exists()
    }
}

#[cfg(not(target_os = "linux"))]
mod fallback_impl {
    use super::*;

    pub fn is_wireless(interface: &NetworkInterface) -> bool {
        interface.name.starts_with("wl") || interface.name.starts_with("en")
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
