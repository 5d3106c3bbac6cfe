//! Print job lifecycle and temp-artifact management.
//!
//! Artifacts are named `<base>-<unix-ms>.<ext>`. Creation uses
//! `create_new`, so two jobs started in the same millisecond bump the suffix
//! instead of sharing a file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::json;

use tallyprint_core::LogStore;

use crate::error::{io_err, PrintError};

pub const DEFAULT_BASE_NAME: &str = "document";

const MAX_NAME_ATTEMPTS: u32 = 1000;

#[derive(Debug)]
pub struct PrintJob {
    pub artifact: PathBuf,
    pub printer: Option<String>,
    pub cleanup: bool,
}

impl PrintJob {
    /// Create a fresh empty artifact under `dir` and the job that owns it.
    pub async fn create(
        dir: &Path,
        base_name: Option<&str>,
        extension: &str,
        cleanup: bool,
    ) -> Result<Self, PrintError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| io_err(dir, e))?;

        let base = sanitize_base_name(base_name.unwrap_or(DEFAULT_BASE_NAME));
        let mut stamp = Utc::now().timestamp_millis();
        for _ in 0..MAX_NAME_ATTEMPTS {
            let path = artifact_path(dir, &base, stamp, extension);
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(_) => {
                    return Ok(Self {
                        artifact: path,
                        printer: None,
                        cleanup,
                    })
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => stamp += 1,
                Err(err) => return Err(io_err(&path, err)),
            }
        }
        Err(PrintError::Generation(format!(
            "could not allocate a unique artifact name for '{base}' in {}",
            dir.display()
        )))
    }

    /// Remove the artifact unless the caller opted out. Never fails.
    pub async fn finish(self, logs: &LogStore) {
        if !self.cleanup {
            return;
        }
        match tokio::fs::remove_file(&self.artifact).await {
            Ok(()) => logs.info(
                "Temporary document cleaned up",
                Some(json!({ "filepath": self.artifact })),
            ),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => logs.warn(
                "Error cleaning up temp file",
                Some(json!({ "error": err.to_string(), "filepath": self.artifact })),
            ),
        }
    }
}

pub(crate) fn artifact_path(dir: &Path, base: &str, unix_ms: i64, extension: &str) -> PathBuf {
    let ext = extension.trim_start_matches('.');
    if ext.is_empty() {
        dir.join(format!("{base}-{unix_ms}"))
    } else {
        dir.join(format!("{base}-{unix_ms}.{ext}"))
    }
}

/// Keep caller-supplied names inside the temp directory.
fn sanitize_base_name(base: &str) -> String {
    let cleaned: String = base
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        DEFAULT_BASE_NAME.to_string()
    } else {
        cleaned
    }
}
