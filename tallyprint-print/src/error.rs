//! Error types for tallyprint-print.

use std::path::PathBuf;

use thiserror::Error;

use tallyprint_locator::LocateError;

/// Every way a print job can fail. All of them are raised only after the
/// job's temp artifact has been cleaned up.
#[derive(Debug, Error)]
pub enum PrintError {
    /// The generator could not produce the document.
    #[error("document generation failed: {0}")]
    Generation(String),

    /// Generation reported success but left no file behind.
    #[error("generated document not found at {path}")]
    ArtifactMissing { path: PathBuf },

    /// Generation reported success but wrote nothing.
    #[error("generated document is empty at {path}")]
    ArtifactEmpty { path: PathBuf },

    /// The helper binary could not be resolved.
    #[error(transparent)]
    Locator(#[from] LocateError),

    /// The background lookup of the helper binary did not finish.
    #[error("helper lookup task failed: {0}")]
    LocatorTask(String),

    #[error("no printer specified and no system default printer found")]
    NoPrinterFound,

    /// The helper binary failed to start or exited unsuccessfully.
    #[error("print invocation via {tool} failed: {detail}")]
    Invocation { tool: PathBuf, detail: String },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience constructor for [`PrintError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> PrintError {
    PrintError::Io {
        path: path.into(),
        source,
    }
}
