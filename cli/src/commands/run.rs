use std::time::{Duration, Instant};

use colored::*;
use harvestr_common::config::Config;
use harvestr_common::network::mac::Bssid;
use harvestr_common::success;
use harvestr_core::pipeline::{Pipeline, PipelineReport};
use harvestr_core::system;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::commands::{GlobalArgs, resolve_interface};
use crate::hprint;
use crate::terminal::{colors, format, print, spinner};

pub async fn run(global: &GlobalArgs, kill: bool) -> anyhow::Result<()> {
    let cfg = global.load_config()?;

    if kill {
        let report = system::check(true).await?;
        if !report.is_clear() {
            info!(
                "stopped {} services, signalled {} processes",
                report.stopped.len(),
                report.processes.iter().filter(|p| p.signalled).count()
            );
        }
    }

    let start = Instant::now();
    let report = execute(&cfg, true, Scope::default(), global.quiet).await?;
    harvest_ends(&report, start.elapsed(), &cfg, global.quiet);
    Ok(())
}

/// Bounds on a run beyond Ctrl-C.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Scope {
    /// Stop after this many full channel sweeps.
    pub sweeps: Option<u64>,
    pub only: Option<Bssid>,
}

/// Builds the pipeline on the chosen interface and runs it until Ctrl-C or `scope` ends it.
pub async fn execute(cfg: &Config, harvest: bool, scope: Scope, q_level: u8) -> anyhow::Result<PipelineReport> {
    let interface = resolve_interface(cfg)?;
    print::aligned_line("Interface", interface.clone());
    print::aligned_line("Backend", format!("{:?}", cfg.backend).to_lowercase());
    print::aligned_line("Channels", cfg.scan.channels.len().to_string());
    if let Some(sweeps) = scope.sweeps {
        print::aligned_line("Sweeps", sweeps.to_string());
    }
    if let Some(bssid) = scope.only {
        print::aligned_line("Target", bssid.to_string());
    }
    print::aligned_line("Store", cfg.store.path.display().to_string());
    print::header(if harvest { "harvesting" } else { "surveying" }, q_level);

    let pipeline = Pipeline::for_interface(cfg.clone(), &interface, harvest)
        .await?
        .sweeps(scope.sweeps)
        .only(scope.only);

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let span = spinner::start("pipeline", "Listening for access points...");
    spinner::hint(&span, "Press Ctrl-C to stop and print the results");
    let report = pipeline.run(cancel).await;
    drop(span);
    interrupt.abort();

    Ok(report?)
}

fn harvest_ends(report: &PipelineReport, total_time: Duration, cfg: &Config, q_level: u8) {
    if q_level > 0 {
        hprint!();
    }

    print::header("captures", q_level);
    if report.captures.is_empty() {
        print::no_results();
    }
    for (idx, capture) in report.captures.iter().enumerate() {
        let name = report
            .records
            .iter()
            .find(|r| r.bssid == capture.bssid())
            .map(|r| r.essid.clone())
            .filter(|essid| !essid.is_empty())
            .unwrap_or_else(|| capture.bssid().to_string());
        print::tree_head(idx, &name);
        print::as_tree_one_level(format::capture_details(capture));
    }

    if !report.attempts.is_empty() {
        print::header("failed attempts", q_level);
        for attempt in &report.attempts {
            print::print_status(format::attempt_line(attempt));
        }
    }

    print_summary(report, total_time, cfg, q_level);
}

pub fn print_summary(report: &PipelineReport, total_time: Duration, cfg: &Config, q_level: u8) {
    let aps: ColoredString = format!("{} access points", report.records.len()).bold().green();
    let captures: ColoredString = format!("{} captures", report.captures.len()).bold().green();
    let total_time: ColoredString = format!("{:.2}s", total_time.as_secs_f64()).bold().yellow();
    let output = format!("Done: {aps}, {captures} in {total_time}").color(colors::TEXT_DEFAULT);

    match q_level {
        0 => {
            print::fat_separator();
            print::centerln(&output);
            print::aligned_line("Frames", report.scan.frames.to_string());
            print::aligned_line("Dropped", report.scan.dropped.to_string());
            print::aligned_line("Stored in", cfg.store.path.display().to_string());
        }
        _ => {
            hprint!();
            success!("{}", output)
        }
    }

    if report.scan.frames > 0 && report.scan.dropped * 2 > report.scan.frames {
        warn!("more than half of the captured frames could not be parsed");
    }
}
