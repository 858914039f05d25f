pub mod captures;
pub mod check;
pub mod mode;
pub mod run;
pub mod scan;

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use harvestr_common::config::{Config, ScanBackend};
use harvestr_common::network::interface::get_radio_interface;

#[derive(Parser)]
#[command(name = "harvestr")]
#[command(version, about = "Find WPS access points and collect their M1/M3 material.")]
pub struct CommandLine {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Wireless interface, overrides the configuration
    #[arg(short, long, global = true)]
    pub interface: Option<String>,

    /// Scan backend, overrides the configuration
    #[arg(short, long, global = true, value_enum)]
    pub backend: Option<ScanBackend>,

    /// Store file, overrides the configuration
    #[arg(short, long, global = true)]
    pub store: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Less output (-q hides headers, -qq keeps warnings only)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub quiet: u8,

    /// Skip the banner
    #[arg(long, global = true)]
    pub no_banner: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan and harvest until interrupted
    #[command(alias = "r")]
    Run {
        /// Stop conflicting services and processes first
        #[arg(short, long)]
        kill: bool,
    },
    /// Survey access points without harvesting
    #[command(alias = "s")]
    Scan {
        /// Full channel sweeps to perform
        #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
        loops: u64,

        /// Keep sweeping until interrupted
        #[arg(short, long)]
        no_stop: bool,

        /// Only survey this access point
        #[arg(long)]
        bssid: Option<String>,
    },
    /// List stored captures and failed attempts
    #[command(alias = "c")]
    Captures {
        /// Only show this access point
        #[arg(long)]
        bssid: Option<String>,
    },
    /// Look for processes that fight over the interface
    Check {
        /// Stop them
        #[arg(short, long)]
        kill: bool,
    },
    /// Restart the network services stopped by `check --kill`
    Restore,
    /// Put the interface into monitor mode
    Monitor {
        /// Stop conflicting services and processes first
        #[arg(short, long)]
        kill: bool,
    },
    /// Put the interface back into managed mode
    Managed {
        /// Restart the network services afterwards
        #[arg(short, long)]
        restart: bool,
    },
}

impl CommandLine {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl GlobalArgs {
    /// The configuration file with command line overrides applied.
    pub fn load_config(&self) -> anyhow::Result<Config> {
        let mut cfg = Config::load(self.config.as_deref())?;
        if let Some(interface) = &self.interface {
            cfg.interface = Some(interface.clone());
        }
        if let Some(backend) = self.backend {
            cfg.backend = backend;
        }
        if let Some(store) = &self.store {
            cfg.store.path = store.clone();
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

/// The interface to drive: configured, or the best wireless one found.
pub fn resolve_interface(cfg: &Config) -> anyhow::Result<String> {
    if let Some(name) = &cfg.interface {
        return Ok(name.clone());
    }
    match get_radio_interface() {
        Some(intf) => Ok(intf.name),
        None => anyhow::bail!("no wireless interface found, pass one with --interface"),
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

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CommandLine {
        CommandLine::try_parse_from(std::iter::once("harvestr").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn scan_defaults_to_one_sweep() {
        match parse(&["scan"]).command {
            Commands::Scan { loops, no_stop, bssid } => {
                assert_eq!(loops, 1);
                assert!(!no_stop);
                assert!(bssid.is_none());
            }
            _ => panic!("expected scan"),
        }
    }

    #[test]
    fn scan_takes_loops_and_bssid() {
        let cli = parse(&["s", "-l", "3", "--bssid", "00:1a:2b:10:20:40", "-i", "wlan1"]);
        assert_eq!(cli.global.interface.as_deref(), Some("wlan1"));
        match cli.command {
            Commands::Scan { loops, bssid, .. } => {
                assert_eq!(loops, 3);
                assert_eq!(bssid.as_deref(), Some("00:1a:2b:10:20:40"));
            }
            _ => panic!("expected scan"),
        }
    }

    #[test]
    fn zero_loops_is_rejected() {
        assert!(CommandLine::try_parse_from(["harvestr", "scan", "--loops", "0"]).is_err());
    }

    #[test]
    fn mode_switches_parse() {
        assert!(matches!(parse(&["monitor", "-k"]).command, Commands::Monitor { kill: true }));
        assert!(matches!(parse(&["managed", "--restart"]).command, Commands::Managed { restart: true }));
        assert!(matches!(parse(&["managed"]).command, Commands::Managed { restart: false }));
    }
}
