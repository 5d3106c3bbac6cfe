//! Document generation seam.
//!
//! Laying out document content is the job of an external collaborator; the
//! pipeline only needs the result on disk. [`PassthroughGenerator`] accepts a
//! definition that either points at a pre-rendered file or carries the
//! content inline:
//!
//! ```json
//! { "source": "/tmp/render/summary.pdf" }
//! { "content": "plain text body" }
//! ```

use std::future::Future;
use std::path::Path;

use serde_json::Value;

use crate::error::{io_err, PrintError};

pub trait DocumentGenerator: Send + Sync {
    /// File extension of produced artifacts, without the dot.
    fn extension(&self) -> &str;

    /// Write the document described by `definition` to `dest`, which already
    /// exists and is empty.
    fn generate(
        &self,
        definition: &Value,
        dest: &Path,
    ) -> impl Future<Output = Result<(), PrintError>> + Send;
}

#[derive(Debug, Clone)]
pub struct PassthroughGenerator {
    extension: String,
}

impl PassthroughGenerator {
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
        }
    }
}

impl Default for PassthroughGenerator {
    fn default() -> Self {
        Self::new("pdf")
    }
}

impl DocumentGenerator for PassthroughGenerator {
    fn extension(&self) -> &str {
        &self.extension
    }

    async fn generate(&self, definition: &Value, dest: &Path) -> Result<(), PrintError> {
        if let Some(source) = definition.get("source").and_then(Value::as_str) {
            tokio::fs::copy(source, dest)
                .await
                .map_err(|e| io_err(source, e))?;
            return Ok(());
        }
        if let Some(content) = definition.get("content").and_then(Value::as_str) {
            tokio::fs::write(dest, content)
                .await
                .map_err(|e| io_err(dest, e))?;
            return Ok(());
        }
        Err(PrintError::Generation(
            "document definition needs a `source` path or inline `content`".to_string(),
        ))
    }
}
