use std::str::FromStr;

use harvestr_common::network::mac::Bssid;
use harvestr_core::store::StoreReader;

use crate::commands::GlobalArgs;
use crate::hprint;
use crate::terminal::{format, print};

/// Lists what the store holds. Safe to run while a pipeline is writing to it.
pub fn captures(global: &GlobalArgs, bssid: Option<&str>) -> anyhow::Result<()> {
    let cfg = global.load_config()?;
    let filter = match bssid {
        Some(raw) => Some(Bssid::from_str(raw).map_err(|e| anyhow::anyhow!("invalid BSSID '{raw}': {e}"))?),
        None => None,
    };

    let reader = StoreReader::open(&cfg.store.path);
    let captures: Vec<_> = reader
        .captures()?
        .into_iter()
        .filter(|c| filter.is_none_or(|b| c.bssid() == b))
        .collect();
    let attempts: Vec<_> = reader
        .attempts()?
        .into_iter()
        .filter(|a| filter.is_none_or(|b| a.bssid == b))
        .collect();

    print::aligned_line("Store", cfg.store.path.display().to_string());
    print::header("captures", global.quiet);
    if captures.is_empty() {
        print::no_results();
    }
    for (idx, capture) in captures.iter().enumerate() {
        print::tree_head(idx, &capture.bssid().to_string());
        print::as_tree_one_level(format::capture_details(capture));
        if idx + 1 != captures.len() {
            hprint!();
        }
    }

    if !attempts.is_empty() {
        print::header("failed attempts", global.quiet);
        for attempt in &attempts {
            print::print_status(format::attempt_line(attempt));
        }
    }
    Ok(())
}
