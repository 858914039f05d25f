use std::str::FromStr;
use std::time::Instant;

use harvestr_common::network::mac::Bssid;

use crate::commands::GlobalArgs;
use crate::commands::run::{Scope, execute, print_summary};
use crate::hprint;
use crate::terminal::{format, print};

pub async fn scan(global: &GlobalArgs, loops: u64, no_stop: bool, bssid: Option<&str>) -> anyhow::Result<()> {
    let cfg = global.load_config()?;
    let scope = scope(loops, no_stop, bssid)?;
    let start = Instant::now();
    let report = execute(&cfg, false, scope, global.quiet).await?;

    if report.records.is_empty() {
        print::header("zero access points", global.quiet);
        print::no_results();
        return Ok(());
    }

    if global.quiet > 0 {
        hprint!();
    }
    print::header("access points by score", global.quiet);
    for (idx, record) in report.records.iter().enumerate() {
        if global.quiet < 2 {
            print::tree_head(idx, &format::essid(&record.essid).to_string());
            print::as_tree_one_level(format::ap_details(record));
        }
        if idx + 1 != report.records.len() {
            hprint!();
        }
    }

    print_summary(&report, start.elapsed(), &cfg, global.quiet);
    Ok(())
}

fn scope(loops: u64, no_stop: bool, bssid: Option<&str>) -> anyhow::Result<Scope> {
    let only = match bssid {
        Some(raw) => Some(Bssid::from_str(raw).map_err(|e| anyhow::anyhow!("invalid BSSID '{raw}': {e}"))?),
        None => None,
    };
    Ok(Scope {
        sweeps: (!no_stop).then_some(loops),
        only,
    })
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
    fn loops_bound_the_sweeps() {
        assert_eq!(scope(3, false, None).unwrap().sweeps, Some(3));
        assert_eq!(scope(3, true, None).unwrap().sweeps, None);
    }

    #[test]
    fn bssid_is_parsed() {
        let scope = scope(1, false, Some("00:1a:2b:10:20:40")).unwrap();
        assert_eq!(scope.only, Some(Bssid::new(0x00, 0x1a, 0x2b, 0x10, 0x20, 0x40)));
        assert!(super::scope(1, false, Some("not-a-mac")).is_err());
    }
}
