//! Printer backend seam and the SumatraPDF command-line backend.

use std::ffi::OsString;
use std::future::Future;
use std::path::Path;

use tokio::process::Command;

use crate::error::PrintError;

/// One invocation of the helper binary.
#[derive(Debug, Clone, Copy)]
pub struct InvocationRequest<'a> {
    pub file: &'a Path,
    pub printer: &'a str,
    pub tool: &'a Path,
    /// Suppress any UI the helper would show.
    pub silent: bool,
}

pub trait PrinterBackend: Send + Sync {
    /// The system default printer, `None` if there is none.
    fn default_printer(&self) -> impl Future<Output = Result<Option<String>, PrintError>> + Send;

    /// Send `request.file` to `request.printer` and wait for the helper to exit.
    fn print(&self, request: InvocationRequest<'_>) -> impl Future<Output = Result<(), PrintError>> + Send;
}

/// Drives `SumatraPDF -print-to <printer> [-silent] <file>`.
#[derive(Debug, Clone, Default)]
pub struct SumatraBackend;

impl PrinterBackend for SumatraBackend {
    async fn default_printer(&self) -> Result<Option<String>, PrintError> {
        let (program, args) = default_printer_query();
        let output = match Command::new(program).args(args).output().await {
            Ok(output) => output,
            Err(err) => {
                tracing::warn!(program, error = %err, "default printer query failed to start");
                return Ok(None);
            }
        };
        if !output.status.success() {
            tracing::warn!(program, status = %output.status, "default printer query failed");
            return Ok(None);
        }
        Ok(parse_default_printer(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn print(&self, request: InvocationRequest<'_>) -> Result<(), PrintError> {
        let output = Command::new(request.tool)
            .args(sumatra_args(&request))
            .output()
            .await
            .map_err(|err| PrintError::Invocation {
                tool: request.tool.to_path_buf(),
                detail: err.to_string(),
            })?;

        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Err(PrintError::Invocation {
            tool: request.tool.to_path_buf(),
            detail: if stderr.is_empty() {
                format!("exited with {}", output.status)
            } else {
                format!("exited with {}: {stderr}", output.status)
            },
        })
    }
}

pub(crate) fn sumatra_args(request: &InvocationRequest<'_>) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-print-to".into(), request.printer.into()];
    if request.silent {
        args.push("-silent".into());
    }
    args.push(request.file.as_os_str().to_owned());
    args
}

#[cfg(windows)]
fn default_printer_query() -> (&'static str, &'static [&'static str]) {
    (
        "powershell.exe",
        &[
            "-NoProfile",
            "-NonInteractive",
            "-Command",
            "Get-CimInstance Win32_Printer -Filter \"Default=true\" | Select-Object -ExpandProperty Name",
        ],
    )
}

#[cfg(not(windows))]
fn default_printer_query() -> (&'static str, &'static [&'static str]) {
    ("lpstat", &["-d"])
}

/// Accepts either a bare printer name (PowerShell) or `lpstat -d` output.
pub(crate) fn parse_default_printer(stdout: &str) -> Option<String> {
    let line = stdout.lines().map(str::trim).find(|l| !l.is_empty())?;
    if line.starts_with("no system default destination") {
        return None;
    }
    let name = match line.split_once("default destination:") {
        Some((_, name)) => name.trim(),
        None => line,
    };
    (!name.is_empty()).then(|| name.to_string())
}
