//! The application's command handlers.

use std::sync::Arc;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use tallyprint_core::LogStore;
use tallyprint_print::{DocumentGenerator, PrintOptions, PrintPipeline, PrinterBackend};

use crate::registry::{CommandRegistry, RegisterOptions};

pub const GET_LOGS: &str = "get-logs";
pub const PRINT_SUMMARY: &str = "print-summary";

const DEFAULT_LOG_LIMIT: usize = 100;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GetLogsArgs {
    limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PrintArgs {
    document: Value,
    options: PrintOptions,
}

pub fn register_all_handlers<G, B>(
    registry: &CommandRegistry,
    logs: &Arc<LogStore>,
    pipeline: &Arc<PrintPipeline<G, B>>,
) where
    G: DocumentGenerator + 'static,
    B: PrinterBackend + 'static,
{
    register_get_logs(registry, Arc::clone(logs));
    register_print_summary(registry, Arc::clone(pipeline));
}

/// `get-logs {limit?}` → recent log entries, newest first.
pub fn register_get_logs(registry: &CommandRegistry, logs: Arc<LogStore>) -> bool {
    registry.register(
        GET_LOGS,
        move |args| {
            let logs = Arc::clone(&logs);
            async move {
                let args: GetLogsArgs = parse_args(args)?;
                let entries = logs.recent_logs(args.limit.unwrap_or(DEFAULT_LOG_LIMIT));
                Ok(serde_json::to_value(entries)?)
            }
        },
        RegisterOptions::quiet(),
    )
}

/// `print-summary {document, options}` → `{success: true}`.
pub fn register_print_summary<G, B>(
    registry: &CommandRegistry,
    pipeline: Arc<PrintPipeline<G, B>>,
) -> bool
where
    G: DocumentGenerator + 'static,
    B: PrinterBackend + 'static,
{
    registry.register(
        PRINT_SUMMARY,
        move |args| {
            let pipeline = Arc::clone(&pipeline);
            async move {
                let args: PrintArgs = parse_args(args)?;
                let outcome = pipeline.print_document(&args.document, &args.options).await?;
                Ok(serde_json::to_value(outcome)?)
            }
        },
        RegisterOptions::default(),
    )
}

/// `null` means "no arguments".
fn parse_args<T: DeserializeOwned + Default>(args: Value) -> anyhow::Result<T> {
    if args.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(args).context("invalid command arguments")
}
