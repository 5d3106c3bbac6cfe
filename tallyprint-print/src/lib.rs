//! # tallyprint-print
//!
//! Generate → resolve → invoke → clean up.
//!
//! Call [`PrintPipeline::print_document`] with an opaque document definition;
//! the pipeline writes it to a fresh temp artifact through a
//! [`DocumentGenerator`], resolves the helper binary and the target printer,
//! hands the artifact to a [`PrinterBackend`], and removes the artifact
//! whatever the outcome.

pub mod error;
pub mod generator;
pub mod job;
pub mod pipeline;
pub mod printer;

pub use error::PrintError;
pub use generator::{DocumentGenerator, PassthroughGenerator};
pub use job::PrintJob;
pub use pipeline::{DefaultPipeline, PrintOptions, PrintOutcome, PrintPipeline, ToolResolver};
pub use printer::{InvocationRequest, PrinterBackend, SumatraBackend};
