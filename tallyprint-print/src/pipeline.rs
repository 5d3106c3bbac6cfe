//! The print pipeline.
//!
//! 1. Create `<temp>/<base>-<unix-ms>.<ext>` and generate the document into it.
//! 2. Verify the artifact exists.
//! 3. Resolve the helper binary (cached across jobs).
//! 4. Resolve the printer: explicit name, else the system default.
//! 5. Invoke the helper.
//! 6. Delete the artifact unless `cleanup` is off, whatever happened above.
//! 7. Return `{success: true}` or the original error.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use tallyprint_core::{Config, LocatorConfig, LogStore};
use tallyprint_locator::{self as locator, SearchLayout, ToolPattern};

use crate::error::PrintError;
use crate::generator::{DocumentGenerator, PassthroughGenerator};
use crate::job::PrintJob;
use crate::printer::{InvocationRequest, PrinterBackend, SumatraBackend};

/// Caller options for one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrintOptions {
    /// Artifact file-name prefix; `document` when absent.
    pub base_name: Option<String>,
    /// Target printer; the system default when absent.
    pub printer: Option<String>,
    /// Delete the artifact after the job.
    pub cleanup: bool,
    pub silent: bool,
}

impl Default for PrintOptions {
    fn default() -> Self {
        Self {
            base_name: None,
            printer: None,
            cleanup: true,
            silent: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintOutcome {
    pub success: bool,
}

// ---------------------------------------------------------------------------
// Tool resolution
// ---------------------------------------------------------------------------

/// Locator front-end that remembers the last successful resolution.
///
/// A remembered path that no longer exists is dropped and re-probed.
pub struct ToolResolver {
    candidates: Vec<PathBuf>,
    pattern: ToolPattern,
    cached: Mutex<Option<PathBuf>>,
}

impl ToolResolver {
    pub fn new(candidates: Vec<PathBuf>, pattern: ToolPattern) -> Self {
        Self {
            candidates,
            pattern,
            cached: Mutex::new(None),
        }
    }

    /// Build the standard candidate list for the configured tool.
    pub fn from_config(config: &LocatorConfig) -> Result<Self, PrintError> {
        let pattern = ToolPattern::new(&config.tool_name, &config.extension)?;
        let layout = SearchLayout::current(config.extra_dirs.clone(), config.project_root.clone());
        Ok(Self::new(layout.candidates(&config.tool_name), pattern))
    }

    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }

    pub async fn resolve(&self) -> Result<PathBuf, PrintError> {
        if let Some(path) = self.cached() {
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Ok(path);
            }
            tracing::warn!(path = %path.display(), "cached helper binary vanished, probing again");
        }

        let candidates = self.candidates.clone();
        let pattern = self.pattern.clone();
        let found = tokio::task::spawn_blocking(move || locator::locate(&candidates, &pattern))
            .await
            .map_err(lookup_join_error)??;

        *self.cached.lock().unwrap_or_else(PoisonError::into_inner) = Some(found.clone());
        Ok(found)
    }

    fn cached(&self) -> Option<PathBuf> {
        self.cached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn lookup_join_error(err: tokio::task::JoinError) -> PrintError {
    PrintError::LocatorTask(err.to_string())
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// The production wiring: passthrough generation and the Sumatra helper.
pub type DefaultPipeline = PrintPipeline<PassthroughGenerator, SumatraBackend>;

pub struct PrintPipeline<G, B> {
    generator: G,
    backend: B,
    tool: ToolResolver,
    temp_dir: PathBuf,
    logs: Arc<LogStore>,
}

impl DefaultPipeline {
    pub fn from_config(config: &Config, logs: Arc<LogStore>) -> Result<Self, PrintError> {
        Ok(Self::new(
            PassthroughGenerator::default(),
            SumatraBackend,
            ToolResolver::from_config(&config.locator)?,
            config.temp_dir(),
            logs,
        ))
    }
}

impl<G: DocumentGenerator, B: PrinterBackend> PrintPipeline<G, B> {
    pub fn new(
        generator: G,
        backend: B,
        tool: ToolResolver,
        temp_dir: impl Into<PathBuf>,
        logs: Arc<LogStore>,
    ) -> Self {
        Self {
            generator,
            backend,
            tool,
            temp_dir: temp_dir.into(),
            logs,
        }
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn tool(&self) -> &ToolResolver {
        &self.tool
    }

    /// Run one job end to end. The artifact is gone (unless `cleanup` is
    /// off) before this returns, on success and on failure alike.
    pub async fn print_document(
        &self,
        definition: &Value,
        options: &PrintOptions,
    ) -> Result<PrintOutcome, PrintError> {
        self.logs.info(
            "Print operation started",
            Some(json!({ "base_name": options.base_name, "printer": options.printer })),
        );

        let mut job = match PrintJob::create(
            &self.temp_dir,
            options.base_name.as_deref(),
            self.generator.extension(),
            options.cleanup,
        )
        .await
        {
            Ok(job) => job,
            Err(err) => {
                self.logs.error_from("Print operation failed", &err);
                return Err(err);
            }
        };

        let result = self.run(&mut job, definition, options).await;
        job.finish(&self.logs).await;

        match result {
            Ok(()) => {
                self.logs.info("Print job completed successfully", None);
                Ok(PrintOutcome { success: true })
            }
            Err(err) => {
                self.logs.error_from("Print operation failed", &err);
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        job: &mut PrintJob,
        definition: &Value,
        options: &PrintOptions,
    ) -> Result<(), PrintError> {
        self.logs.info(
            "Creating document file",
            Some(json!({ "filepath": job.artifact })),
        );
        self.generator.generate(definition, &job.artifact).await?;
        match tokio::fs::metadata(&job.artifact).await {
            Ok(meta) if meta.len() > 0 => {}
            Ok(_) => {
                return Err(PrintError::ArtifactEmpty {
                    path: job.artifact.clone(),
                })
            }
            Err(_) => {
                return Err(PrintError::ArtifactMissing {
                    path: job.artifact.clone(),
                })
            }
        }
        self.logs.info(
            "Document created successfully",
            Some(json!({ "filepath": job.artifact })),
        );

        let tool = self.tool.resolve().await?;
        let printer = self.resolve_printer(options).await?;
        self.logs.info("Using printer", Some(json!({ "printerName": printer })));
        job.printer = Some(printer.clone());

        self.backend
            .print(InvocationRequest {
                file: &job.artifact,
                printer: &printer,
                tool: &tool,
                silent: options.silent,
            })
            .await
    }

    async fn resolve_printer(&self, options: &PrintOptions) -> Result<String, PrintError> {
        if let Some(name) = options.printer.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            return Ok(name.to_string());
        }
        self.backend
            .default_printer()
            .await?
            .ok_or(PrintError::NoPrinterFound)
    }
}
