//! Helper-binary resolution for `tallyprint-locator`.
//!
//! [`locate`] walks an ordered list of candidate directories and returns the
//! first regular file named `<Tool>-<version>.<ext>` (case-insensitive). The
//! first directory holding a match wins; later directories are not consulted.
//! Missing or unreadable directories count as "no match here" and the probe
//! moves on.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use regex::{Regex, RegexBuilder};
use serde::Serialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// File-name pattern for a versioned helper binary.
#[derive(Debug, Clone)]
pub struct ToolPattern {
    tool_name: String,
    regex: Regex,
}

impl ToolPattern {
    /// `ToolPattern::new("SumatraPDF", "exe")` matches `SumatraPDF-3.5.2-64.exe`.
    /// An empty extension matches extension-less binaries.
    pub fn new(tool_name: &str, extension: &str) -> Result<Self, LocateError> {
        let ext = extension.trim_start_matches('.');
        let source = if ext.is_empty() {
            format!("^{}-.+$", regex::escape(tool_name))
        } else {
            format!("^{}-.+\\.{}$", regex::escape(tool_name), regex::escape(ext))
        };
        let regex = RegexBuilder::new(&source)
            .case_insensitive(true)
            .build()
            .map_err(|source| LocateError::InvalidPattern {
                tool: tool_name.to_string(),
                source,
            })?;
        Ok(Self {
            tool_name: tool_name.to_string(),
            regex,
        })
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    pub fn matches(&self, file_name: &str) -> bool {
        self.regex.is_match(file_name)
    }
}

/// What probing one candidate directory produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeOutcome {
    Missing,
    Unreadable,
    NoMatch,
    Found,
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProbeOutcome::Missing => "missing",
            ProbeOutcome::Unreadable => "unreadable",
            ProbeOutcome::NoMatch => "no match",
            ProbeOutcome::Found => "found",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeAttempt {
    pub dir: PathBuf,
    pub outcome: ProbeOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Full record of a probe run, successful or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    pub tool: String,
    pub resolved: Option<PathBuf>,
    pub attempts: Vec<ProbeAttempt>,
}

impl ProbeReport {
    pub fn into_result(self) -> Result<PathBuf, LocateError> {
        match self.resolved {
            Some(path) => Ok(path),
            None => Err(LocateError::NotFound {
                tool: self.tool,
                attempts: self.attempts,
            }),
        }
    }
}

#[derive(Debug, Error)]
pub enum LocateError {
    #[error("{tool} not found in any of the {} candidate directories", attempts.len())]
    NotFound {
        tool: String,
        attempts: Vec<ProbeAttempt>,
    },

    #[error("invalid file pattern for {tool}: {source}")]
    InvalidPattern {
        tool: String,
        #[source]
        source: regex::Error,
    },
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Resolve the helper binary, or [`LocateError::NotFound`].
pub fn locate(candidates: &[PathBuf], pattern: &ToolPattern) -> Result<PathBuf, LocateError> {
    probe(candidates, pattern).into_result()
}

/// Probe `candidates` in order, stopping at the first directory with a match.
pub fn probe(candidates: &[PathBuf], pattern: &ToolPattern) -> ProbeReport {
    let mut attempts = Vec::with_capacity(candidates.len());
    let mut resolved = None;
    for dir in candidates {
        let (attempt, found) = probe_dir(dir, pattern);
        attempts.push(attempt);
        if let Some(found) = found {
            tracing::info!(path = %found.display(), tool = pattern.tool_name(), "found helper binary");
            resolved = Some(found);
            break;
        }
    }
    ProbeReport {
        tool: pattern.tool_name().to_string(),
        resolved,
        attempts,
    }
}

// ---------------------------------------------------------------------------
// Candidate directories
// ---------------------------------------------------------------------------

/// Inputs for the built-in candidate list.
#[derive(Debug, Clone, Default)]
pub struct SearchLayout {
    /// Configured directories, probed first.
    pub extra_dirs: Vec<PathBuf>,
    /// Directory holding the running executable.
    pub exe_dir: Option<PathBuf>,
    /// Source checkout root, for development runs.
    pub project_root: Option<PathBuf>,
}

impl SearchLayout {
    /// Layout for the current process: exe directory plus working directory.
    pub fn current(extra_dirs: Vec<PathBuf>, project_root: Option<PathBuf>) -> Self {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf));
        let project_root = project_root.or_else(|| std::env::current_dir().ok());
        Self {
            extra_dirs,
            exe_dir,
            project_root,
        }
    }

    /// Ordered, de-duplicated candidate list:
    /// configured → bundled resources → development → platform fallbacks.
    pub fn candidates(&self, tool_name: &str) -> Vec<PathBuf> {
        let mut dirs = self.extra_dirs.clone();
        if let Some(exe_dir) = &self.exe_dir {
            dirs.push(exe_dir.join("resources"));
            dirs.push(exe_dir.join("..").join("resources"));
        }
        if let Some(root) = &self.project_root {
            dirs.push(root.join("resources"));
            dirs.push(root.join("vendor").join(tool_name.to_lowercase()));
        }
        dirs.extend(platform_fallbacks(tool_name));

        let mut seen = std::collections::HashSet::new();
        dirs.retain(|dir| seen.insert(dir.clone()));
        dirs
    }
}

#[cfg(windows)]
fn platform_fallbacks(tool_name: &str) -> Vec<PathBuf> {
    ["LOCALAPPDATA", "ProgramFiles", "ProgramFiles(x86)"]
        .iter()
        .filter_map(|var| std::env::var_os(var))
        .map(|base| PathBuf::from(base).join(tool_name))
        .collect()
}

#[cfg(not(windows))]
fn platform_fallbacks(_tool_name: &str) -> Vec<PathBuf> {
    vec![
        PathBuf::from("/usr/local/lib/tallyprint"),
        PathBuf::from("/usr/lib/tallyprint"),
        PathBuf::from("/opt/tallyprint"),
    ]
}

// ---------------------------------------------------------------------------
// Directory probing
// ---------------------------------------------------------------------------

fn probe_dir(dir: &Path, pattern: &ToolPattern) -> (ProbeAttempt, Option<PathBuf>) {
    let attempt = |outcome, detail| ProbeAttempt {
        dir: dir.to_path_buf(),
        outcome,
        detail,
    };

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return (attempt(ProbeOutcome::Missing, None), None);
        }
        Err(err) => {
            tracing::warn!(dir = %dir.display(), error = %err, "error reading candidate directory");
            return (attempt(ProbeOutcome::Unreadable, Some(err.to_string())), None);
        }
    };

    let mut names: Vec<_> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| pattern.matches(name))
        .collect();
    names.sort();

    match names.into_iter().map(|name| dir.join(name)).find(|path| path.is_file()) {
        Some(found) => (
            attempt(ProbeOutcome::Found, Some(found.display().to_string())),
            Some(found),
        ),
        None => (
            attempt(
                ProbeOutcome::NoMatch,
                Some(format!("no {}-<version> file", pattern.tool_name())),
            ),
            None,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sumatra() -> ToolPattern {
        ToolPattern::new("SumatraPDF", "exe").expect("pattern")
    }

    #[test]
    fn pattern_is_anchored_and_case_insensitive() {
        let p = sumatra();
        assert!(p.matches("SumatraPDF-3.5.2-64.exe"));
        assert!(p.matches("sumatrapdf-3.4.EXE"));
        assert!(!p.matches("SumatraPDF.exe"));
        assert!(!p.matches("SumatraPDF-3.5.exe.bak"));
        assert!(!p.matches("old-SumatraPDF-3.5.exe"));
    }

    #[test]
    fn extensionless_pattern() {
        let p = ToolPattern::new("printhelper", "").unwrap();
        assert!(p.matches("printhelper-1.0"));
        assert!(!p.matches("printhelper"));
    }

    #[test]
    fn directory_named_like_tool_is_skipped() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("SumatraPDF-1.0.exe")).unwrap();
        fs::write(dir.path().join("SumatraPDF-2.0.exe"), b"").unwrap();
        let found = locate(&[dir.path().to_path_buf()], &sumatra()).unwrap();
        assert_eq!(found, dir.path().join("SumatraPDF-2.0.exe"));
    }

    #[test]
    fn report_records_each_outcome() {
        let empty = TempDir::new().unwrap();
        let hit = TempDir::new().unwrap();
        fs::write(hit.path().join("SumatraPDF-3.5.exe"), b"").unwrap();
        let missing = empty.path().join("nope");

        let report = probe(
            &[missing.clone(), empty.path().to_path_buf(), hit.path().to_path_buf()],
            &sumatra(),
        );
        let outcomes: Vec<_> = report.attempts.iter().map(|a| a.outcome).collect();
        assert_eq!(
            outcomes,
            vec![ProbeOutcome::Missing, ProbeOutcome::NoMatch, ProbeOutcome::Found]
        );
        assert_eq!(report.resolved, Some(hit.path().join("SumatraPDF-3.5.exe")));
    }

    #[test]
    fn candidates_are_ordered_and_deduplicated() {
        let layout = SearchLayout {
            extra_dirs: vec![PathBuf::from("/custom"), PathBuf::from("/app/resources")],
            exe_dir: Some(PathBuf::from("/app")),
            project_root: Some(PathBuf::from("/src/tally")),
        };
        let dirs = layout.candidates("SumatraPDF");
        assert_eq!(dirs[0], PathBuf::from("/custom"));
        assert_eq!(dirs[1], PathBuf::from("/app/resources"));
        assert_eq!(dirs[2], PathBuf::from("/app/../resources"));
        assert_eq!(dirs[3], PathBuf::from("/src/tally/resources"));
        assert_eq!(dirs[4], PathBuf::from("/src/tally/vendor/sumatrapdf"));
        assert_eq!(
            dirs.iter().filter(|d| **d == PathBuf::from("/app/resources")).count(),
            1
        );
    }
}
