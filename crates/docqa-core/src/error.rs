//! Error taxonomy shared by every stage of the pipeline.

use thiserror::Error;

/// Convenience alias used across the core crate.
pub type Result<T> = std::result::Result<T, RagError>;

/// Failures the ingestion and query paths can report.
///
/// The orchestrator converts these into per-file skip reports during
/// ingestion and into answer text during queries; callers never see them
/// as panics.
#[derive(Debug, Error)]
pub enum RagError {
    /// Bad chunking or retrieval parameters.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The declared file type is not one of pdf, txt, docx.
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// A single file could not be turned into text.
    #[error("failed to load document '{name}': {reason}")]
    DocumentLoad { name: String, reason: String },

    #[error("embedding failed: {0}")]
    Embedding(String),

    /// Vector or batch lengths disagree with what the index expects.
    #[error("dimension mismatch ({context}): expected {expected}, got {actual}")]
    DimensionMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    #[error("answer generation failed: {0}")]
    Generation(String),

    /// Rejected user input, e.g. an empty question.
    #[error("{0}")]
    Validation(String),

    /// The index storage itself failed (I/O, locked database).
    #[error("knowledge base storage error: {0}")]
    Storage(String),
}

impl RagError {
    pub fn document_load(name: impl Into<String>, reason: impl ToString) -> Self {
        RagError::DocumentLoad {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn dimension_mismatch(context: impl Into<String>, expected: usize, actual: usize) -> Self {
        RagError::DimensionMismatch {
            context: context.into(),
            expected,
            actual,
        }
    }
}
