//! `tallyprint logs` — recent application log entries, newest first.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde_json::json;
use tabled::{settings::Style, Table, Tabled};

use tallyprint_core::{Config, LogEntry, LogLevel, LogStore};
use tallyprint_daemon::{invoke, DaemonError};

#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Maximum number of entries to show.
    #[arg(long, default_value_t = 20)]
    pub limit: usize,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct LogRow {
    #[tabled(rename = "time")]
    time: String,
    #[tabled(rename = "level")]
    level: String,
    #[tabled(rename = "message")]
    message: String,
}

impl LogsArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home()?;
        let entries = match fetch_from_daemon(&home, self.limit) {
            Ok(entries) => entries,
            Err(err) if is_not_running(&err) => read_from_disk(&home, self.limit)?,
            Err(err) => return Err(err),
        };

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&entries).context("failed to render logs JSON")?
            );
            return Ok(());
        }

        if entries.is_empty() {
            println!("No log entries.");
            return Ok(());
        }
        let rows: Vec<LogRow> = entries
            .into_iter()
            .map(|entry| LogRow {
                time: entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                level: level_label(entry.level),
                message: entry.message,
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}

fn fetch_from_daemon(home: &std::path::Path, limit: usize) -> Result<Vec<LogEntry>> {
    let response = invoke(home, "get-logs", json!({ "limit": limit }))?;
    if !response.success {
        anyhow::bail!(
            "get-logs failed: {}",
            response.error.unwrap_or_else(|| "unknown error".to_string())
        );
    }
    let data = response.data.unwrap_or_default();
    serde_json::from_value(data).context("daemon returned malformed log entries")
}

/// The daemon is down: parse today's log file directly.
fn read_from_disk(home: &std::path::Path, limit: usize) -> Result<Vec<LogEntry>> {
    let config = Config::load_at(home).context("failed to load config")?;
    let store = LogStore::open(config.log_dir_at(home), config.log_store_options())
        .context("failed to open log directory")?;
    Ok(store.recent_logs(limit))
}

fn is_not_running(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<DaemonError>(),
        Some(DaemonError::DaemonNotRunning { .. })
    )
}

fn level_label(level: LogLevel) -> String {
    let label = level.to_string();
    match level {
        LogLevel::Info => label.green().to_string(),
        LogLevel::Warn => label.yellow().bold().to_string(),
        LogLevel::Error => label.red().bold().to_string(),
    }
}
