use colored::*;
use harvestr_core::system;

use crate::terminal::{colors, print};

pub async fn check(kill: bool) -> anyhow::Result<()> {
    if kill && !is_root::is_root() {
        anyhow::bail!("stopping services and processes requires root");
    }

    let report = system::check(kill).await?;
    if report.is_clear() {
        print::print_status("Nothing is competing for the interface".green().to_string());
        return Ok(());
    }

    for service in &report.services {
        let state = match (kill, report.stopped.contains(service)) {
            (false, _) => "running".yellow(),
            (true, true) => "stopped".green(),
            (true, false) => "still running".red(),
        };
        print::aligned_line(service, state);
    }

    if !report.processes.is_empty() {
        print::header("processes", 0);
        for process in &report.processes {
            let state = match (kill, process.signalled) {
                (false, _) => "running".yellow(),
                (true, true) => "terminated".green(),
                (true, false) => "not signalled".red(),
            };
            print::print_status(format!(
                "{} {} {}",
                process.pid.to_string().color(colors::ACCENT),
                process.name.color(colors::PRIMARY),
                state
            ));
        }
    }

    if !kill {
        print::print_status("Run `harvestr check --kill` to stop them, `harvestr restore` to bring them back");
    }
    Ok(())
}

pub async fn restore() -> anyhow::Result<()> {
    if !is_root::is_root() {
        anyhow::bail!("restarting services requires root");
    }
    let restored = system::restore().await?;
    if restored.is_empty() {
        print::print_status("No enabled network services to restore");
    }
    for service in restored {
        print::aligned_line(&service, "restarted".green());
    }
    Ok(())
}
