use std::sync::Arc;

use colored::*;
use harvestr_common::models::interface::InterfaceMode;
use harvestr_common::success;
use harvestr_core::interface::{InterfaceManager, IwModeControl, LeasePolicy};
use harvestr_core::system;
use tracing::info;

use crate::commands::{GlobalArgs, resolve_interface};
use crate::terminal::print;

/// Switches the interface to monitor mode, optionally clearing conflicts first.
pub async fn monitor(global: &GlobalArgs, kill: bool) -> anyhow::Result<()> {
    let cfg = global.load_config()?;
    let interface = resolve_interface(&cfg)?;
    IwModeControl::preflight(&interface)?;

    if kill {
        let report = system::check(true).await?;
        info!(
            "stopped {} services, signalled {} processes",
            report.stopped.len(),
            report.processes.iter().filter(|p| p.signalled).count()
        );
    }

    switch(&interface, InterfaceMode::Monitor, cfg.timeouts.lease).await
}

/// Switches the interface back to managed mode, optionally restarting network services.
pub async fn managed(global: &GlobalArgs, restart: bool) -> anyhow::Result<()> {
    let cfg = global.load_config()?;
    let interface = resolve_interface(&cfg)?;
    IwModeControl::preflight(&interface)?;

    switch(&interface, InterfaceMode::Managed, cfg.timeouts.lease).await?;

    if restart {
        let restored = system::restore().await?;
        if restored.is_empty() {
            print::print_status("No enabled network services to restore");
        }
        for service in restored {
            print::aligned_line(&service, "restarted".green());
        }
    }
    Ok(())
}

async fn switch(interface: &str, mode: InterfaceMode, timeout: std::time::Duration) -> anyhow::Result<()> {
    let policy = LeasePolicy {
        scan_mode: mode,
        timeout,
    };
    let manager = InterfaceManager::connect(interface, Arc::new(IwModeControl), policy).await?;
    let before = manager.state().mode;
    manager.set_mode(mode).await?;

    if before == mode {
        print::print_status(format!("{interface} is already in {mode} mode"));
    } else {
        success!("{interface} is now in {mode} mode");
    }
    Ok(())
}
