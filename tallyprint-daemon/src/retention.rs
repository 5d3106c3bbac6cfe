//! Age-based pruning of daily application log files.
//!
//! Files are named `app-YYYY-MM-DD.log`; anything dated more than
//! `keep_days` before today is removed. Other files are never touched.

use std::fs;
use std::io;
use std::path::Path;

use chrono::{Days, NaiveDate, Utc};

use tallyprint_core::paths::parse_log_file_date;

/// Remove daily log files older than `keep_days` relative to `today`.
///
/// Returns the number of files removed. A missing directory is not an error.
pub fn prune_daily_logs(dir: &Path, keep_days: u32, today: NaiveDate) -> io::Result<usize> {
    let Some(cutoff) = today.checked_sub_days(Days::new(u64::from(keep_days))) else {
        return Ok(0);
    };

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(err),
    };

    let mut removed = 0;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(date) = name.to_str().and_then(parse_log_file_date) else {
            continue;
        };
        if date < cutoff && entry.file_type()?.is_file() {
            fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Prune `dir` against today's UTC date. Failures are logged, not returned.
pub fn prune_logs(dir: &Path, keep_days: u32) {
    match prune_daily_logs(dir, keep_days, Utc::now().date_naive()) {
        Ok(0) => {}
        Ok(removed) => tracing::info!(dir = %dir.display(), removed, "old log files pruned"),
        Err(err) => tracing::warn!(dir = %dir.display(), error = %err, "log retention failed"),
    }
}
