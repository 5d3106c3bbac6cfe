//! `tallyprint locate` — run the helper-binary probe locally.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use tallyprint_core::Config;
use tallyprint_locator::{probe, ProbeOutcome, SearchLayout, ToolPattern};

#[derive(Args, Debug)]
pub struct LocateArgs {
    /// Emit the probe report as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct AttemptRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "directory")]
    dir: String,
    #[tabled(rename = "result")]
    outcome: String,
}

impl LocateArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home()?;
        let config = Config::load_at(&home).context("failed to load config")?;
        let locator = &config.locator;

        let pattern = ToolPattern::new(&locator.tool_name, &locator.extension)
            .context("invalid locator configuration")?;
        let layout = SearchLayout::current(locator.extra_dirs.clone(), locator.project_root.clone());
        let report = probe(&layout.candidates(&locator.tool_name), &pattern);

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to render probe JSON")?
            );
        } else {
            let rows: Vec<AttemptRow> = report
                .attempts
                .iter()
                .enumerate()
                .map(|(i, attempt)| AttemptRow {
                    index: i + 1,
                    dir: attempt.dir.display().to_string(),
                    outcome: outcome_label(attempt.outcome, attempt.detail.as_deref()),
                })
                .collect();
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{table}");
        }

        let tool = report.tool.clone();
        let resolved = report
            .into_result()
            .with_context(|| format!("{tool} could not be located"))?;
        if !self.json {
            println!("{} {}", "resolved:".green().bold(), resolved.display());
        }
        Ok(())
    }
}

fn outcome_label(outcome: ProbeOutcome, detail: Option<&str>) -> String {
    let label = match detail {
        Some(detail) => format!("{outcome} ({detail})"),
        None => outcome.to_string(),
    };
    match outcome {
        ProbeOutcome::Found => label.green().bold().to_string(),
        ProbeOutcome::NoMatch => label.yellow().to_string(),
        ProbeOutcome::Missing | ProbeOutcome::Unreadable => label.bright_black().to_string(),
    }
}
