mod commands;
mod terminal;

use commands::{CommandLine, Commands, captures, check, mode, run, scan};
use terminal::{logging, print};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let commands = CommandLine::parse_args();
    let global = &commands.global;

    logging::init(global.verbose, global.quiet);
    print::banner(global.no_banner, global.quiet);

    let result = match commands.command {
        Commands::Run { kill } => {
            print::header("getting ready to harvest", global.quiet);
            run::run(global, kill).await
        }
        Commands::Scan { loops, no_stop, bssid } => {
            print::header("getting ready to survey", global.quiet);
            scan::scan(global, loops, no_stop, bssid.as_deref()).await
        }
        Commands::Captures { bssid } => {
            print::header("stored material", global.quiet);
            captures::captures(global, bssid.as_deref())
        }
        Commands::Check { kill } => {
            print::header("conflicting processes", global.quiet);
            check::check(kill).await
        }
        Commands::Restore => {
            print::header("restoring network services", global.quiet);
            check::restore().await
        }
        Commands::Monitor { kill } => {
            print::header("switching to monitor mode", global.quiet);
            mode::monitor(global, kill).await
        }
        Commands::Managed { restart } => {
            print::header("switching to managed mode", global.quiet);
            mode::managed(global, restart).await
        }
    };

    if result.is_ok() {
        print::end_of_program();
    }
    result
}
