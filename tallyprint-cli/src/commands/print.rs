//! `tallyprint print` — send a document definition to the `print-summary` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde_json::{json, Value};

use tallyprint_daemon::{invoke, DaemonError};

#[derive(Args, Debug)]
pub struct PrintArgs {
    /// JSON document definition (`{"source": ..}` or `{"content": ..}`).
    pub definition: PathBuf,

    /// Target printer; the system default when omitted.
    #[arg(long)]
    pub printer: Option<String>,

    /// Base name for the temporary artifact.
    #[arg(long)]
    pub name: Option<String>,

    /// Keep the temporary artifact after printing.
    #[arg(long)]
    pub keep: bool,
}

impl PrintArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home()?;
        let raw = std::fs::read_to_string(&self.definition)
            .with_context(|| format!("read {}", self.definition.display()))?;
        let document: Value = serde_json::from_str(&raw)
            .with_context(|| format!("parse {}", self.definition.display()))?;

        let args = json!({
            "document": document,
            "options": {
                "base_name": self.name,
                "printer": self.printer,
                "cleanup": !self.keep,
            },
        });

        let response = match invoke(&home, "print-summary", args) {
            Ok(response) => response,
            Err(DaemonError::DaemonNotRunning { .. }) => {
                anyhow::bail!("daemon is not running; start it with `tallyprint daemon start`")
            }
            Err(err) => return Err(err).context("failed to reach daemon"),
        };

        if response.success {
            println!("{} print job sent", "✓".green().bold());
            Ok(())
        } else {
            anyhow::bail!(
                "print failed: {}",
                response.error.unwrap_or_else(|| "unknown error".to_string())
            )
        }
    }
}
