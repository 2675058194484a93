//! Document loader seam.
//!
//! Text extraction from PDF and DOCX lives in the app crate; the core only
//! fixes the contract the orchestrator relies on.

use crate::error::Result;
use crate::models::Document;

/// Converts an uploaded file into one or more documents.
///
/// # Errors
///
/// - [`RagError::UnsupportedFormat`](crate::RagError::UnsupportedFormat)
///   when `declared_type` is not `pdf`, `txt` or `docx`.
/// - [`RagError::DocumentLoad`](crate::RagError::DocumentLoad) carrying the
///   file name when the bytes cannot be turned into text.
///
/// Both are per-file failures: the orchestrator skips the file and carries on
/// with the rest of the batch.
pub trait DocumentLoader: Send + Sync {
    fn load(&self, bytes: &[u8], file_name: &str, declared_type: &str) -> Result<Vec<Document>>;
}
