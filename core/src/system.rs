//! # Conflicting Services
//!
//! Network managers and supplicants grab wireless interfaces back from monitor mode and
//! hop channels under our feet. This module finds them, optionally stops them, and
//! brings the usual ones back afterwards.

use std::collections::BTreeSet;

use anyhow::Context;
use sysinfo::{Pid, ProcessExt, Signal, System, SystemExt};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Process names known to interfere with monitor mode.
pub const PROCESSES: &[&str] = &[
    "wpa_action",
    "wpa_supplicant",
    "wpa_cli",
    "dhclient",
    "ifplugd",
    "dhcdbd",
    "dhcpcd",
    "udhcpc",
    "NetworkManager",
    "knetworkmanager",
    "avahi-autoipd",
    "avahi-daemon",
    "wlassistant",
    "wifibox",
    "net_applet",
    "wicd-daemon",
    "wicd-client",
    "iwd",
    "hostapd",
];

/// systemd units that respawn the processes above.
pub const SERVICES: &[&str] = &["wicd", "network-manager", "avahi-daemon", "NetworkManager", "wpa_supplicant"];

/// Units `restore` brings back when they are enabled.
const RESTORE: &[&str] = &["NetworkManager", "avahi-daemon", "wicd", "wpa_supplicant"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictProcess {
    pub pid: u32,
    pub name: String,
    /// Whether SIGTERM was delivered. Always false when only checking.
    pub signalled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictReport {
    /// Active units, in check order.
    pub services: Vec<String>,
    /// Units that `systemctl stop` accepted.
    pub stopped: Vec<String>,
    pub processes: Vec<ConflictProcess>,
}

impl ConflictReport {
    pub fn is_clear(&self) -> bool {
        self.services.is_empty() && self.processes.is_empty()
    }
}

/// Whether a process called `name` is one of [`PROCESSES`].
pub fn is_conflicting(name: &str) -> bool {
    PROCESSES.contains(&name)
}

/// Picks the conflicting processes out of `(pid, name)` pairs, ordered by name then pid.
pub fn conflicting_processes<'a>(running: impl IntoIterator<Item = (u32, &'a str)>) -> Vec<(u32, String)> {
    let found: BTreeSet<(String, u32)> = running
        .into_iter()
        .filter(|(_, name)| is_conflicting(name))
        .map(|(pid, name)| (name.to_string(), pid))
        .collect();
    found.into_iter().map(|(name, pid)| (pid, name)).collect()
}

/// Lists conflicting services and processes. With `kill`, stops the services and sends
/// SIGTERM to the processes.
pub async fn check(kill: bool) -> anyhow::Result<ConflictReport> {
    let mut report = ConflictReport::default();

    for &service in SERVICES {
        if !systemctl(&["status", service]).await? {
            continue;
        }
        report.services.push(service.to_string());
        if kill {
            if systemctl(&["stop", service]).await? {
                info!(service, "stopped service");
                report.stopped.push(service.to_string());
            } else {
                warn!(service, "could not stop service");
            }
        }
    }

    let mut sys = System::new();
    sys.refresh_processes();
    let running: Vec<(u32, String)> = sys
        .processes()
        .iter()
        .map(|(pid, process)| (pid_u32(*pid), process.name().to_string()))
        .collect();

    for (pid, name) in conflicting_processes(running.iter().map(|(pid, name)| (*pid, name.as_str()))) {
        let signalled = kill && terminate(&sys, pid, &name);
        report.processes.push(ConflictProcess { pid, name, signalled });
    }

    Ok(report)
}

/// Restarts the enabled network services from the usual set. Returns the ones restarted.
pub async fn restore() -> anyhow::Result<Vec<String>> {
    let mut restored = Vec::new();
    for &service in RESTORE {
        if !systemctl(&["is-enabled", service]).await? {
            debug!(service, "not enabled, leaving it alone");
            continue;
        }
        if systemctl(&["restart", service]).await? {
            info!(service, "restored service");
            restored.push(service.to_string());
        } else {
            warn!(service, "could not restart service");
        }
    }
    Ok(restored)
}

fn terminate(sys: &System, pid: u32, name: &str) -> bool {
    let Some(process) = sys.process(Pid::from(pid as usize)) else {
        return false;
    };
    match process.kill_with(Signal::Term) {
        Some(true) => {
            info!(pid, name, "sent SIGTERM");
            true
        }
        _ => {
            warn!(pid, name, "could not signal process, are you root?");
            false
        }
    }
}

fn pid_u32(pid: Pid) -> u32 {
    usize::from(pid) as u32
}

/// Runs `systemctl` and reports whether it exited with 0.
async fn systemctl(args: &[&str]) -> anyhow::Result<bool> {
    let output = Command::new("systemctl")
        .args(args)
        .output()
        .await
        .with_context(|| format!("failed to run `systemctl {}`", args.join(" ")))?;
    Ok(output.status.success())
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
    fn matches_exact_names_only() {
        assert!(is_conflicting("wpa_supplicant"));
        assert!(is_conflicting("NetworkManager"));
        assert!(!is_conflicting("networkmanager"));
        assert!(!is_conflicting("wpa_supplicant2"));
        assert!(!is_conflicting("sshd"));
    }

    #[test]
    fn picks_and_orders_conflicts() {
        let running = [
            (900, "sshd"),
            (412, "wpa_supplicant"),
            (37, "dhclient"),
            (15, "wpa_supplicant"),
            (2, "systemd"),
        ];
        assert_eq!(
            conflicting_processes(running),
            vec![
                (37, "dhclient".to_string()),
                (15, "wpa_supplicant".to_string()),
                (412, "wpa_supplicant".to_string()),
            ]
        );
    }

    #[test]
    fn empty_report_is_clear() {
        assert!(ConflictReport::default().is_clear());
        let report = ConflictReport {
            services: vec!["NetworkManager".into()],
            ..ConflictReport::default()
        };
        assert!(!report.is_clear());
    }
}
