//! `tallyprint watch` — follow daemon notifications.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use tallyprint_core::HostEvent;
use tallyprint_daemon::subscribe;

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Emit each event as a JSON line.
    #[arg(long)]
    pub json: bool,
}

impl WatchArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home()?;
        subscribe(&home, |event| {
            if self.json {
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(err) => eprintln!("failed to encode event: {err}"),
                }
            } else {
                println!("{}", describe(&event));
            }
            true
        })
        .context("lost connection to daemon")?;
        println!("daemon closed the connection");
        Ok(())
    }
}

fn describe(event: &HostEvent) -> String {
    match event {
        HostEvent::LogUpdate => "log updated".bright_black().to_string(),
        HostEvent::Status { channel, notice } => {
            let mark = if notice.success {
                "✓".green().bold()
            } else {
                "✗".red().bold()
            };
            format!("{mark} [{channel}] {}", notice.message)
        }
    }
}
