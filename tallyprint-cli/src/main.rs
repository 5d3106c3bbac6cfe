//! tallyprint — print-job daemon client.
//!
//! # Usage
//!
//! ```text
//! tallyprint daemon start|stop|status
//! tallyprint logs [--limit <n>] [--json]
//! tallyprint print <definition.json> [--printer <name>] [--name <base>] [--keep]
//! tallyprint watch
//! tallyprint locate [--json]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    daemon::DaemonCommand, locate::LocateArgs, logs::LogsArgs, print::PrintArgs,
    watch::WatchArgs,
};

#[derive(Parser, Debug)]
#[command(
    name = "tallyprint",
    version,
    about = "Generate and print documents through the tallyprint daemon",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage the background daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },

    /// Show recent application log entries.
    Logs(LogsArgs),

    /// Print a document definition through the daemon.
    Print(PrintArgs),

    /// Stream status notices and log updates from the daemon.
    Watch(WatchArgs),

    /// Resolve the print helper binary and show every probed directory.
    Locate(LocateArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Daemon { command } => commands::daemon::run(command),
        Commands::Logs(args) => args.run(),
        Commands::Print(args) => args.run(),
        Commands::Watch(args) => args.run(),
        Commands::Locate(args) => args.run(),
    }
}
