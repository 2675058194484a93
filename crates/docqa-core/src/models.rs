//! Core data models that flow through ingestion and querying.
//!
//! A [`Document`] is what a loader produces, a [`Chunk`] is the unit of
//! retrieval, and a [`QueryResult`] is what the caller gets back for a
//! question.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RagError;

/// Declared kind of an ingested document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileType {
    #[serde(rename = "pdf")]
    Pdf,
    #[serde(rename = "txt")]
    Txt,
    #[serde(rename = "docx")]
    Docx,
    /// Text typed or pasted in directly, no loader involved.
    #[serde(rename = "manual-text")]
    ManualText,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Pdf => "pdf",
            FileType::Txt => "txt",
            FileType::Docx => "docx",
            FileType::ManualText => "manual-text",
        }
    }

    /// Parse a loadable file type from a declared extension.
    ///
    /// Accepts `pdf`, `txt` and `docx` (case-insensitive, optional leading
    /// dot). `manual-text` is not a file format and is rejected here.
    pub fn from_extension(ext: &str) -> Result<Self, RagError> {
        let normalized = ext.trim().trim_start_matches('.').to_ascii_lowercase();
        match normalized.as_str() {
            "pdf" => Ok(FileType::Pdf),
            "txt" => Ok(FileType::Txt),
            "docx" => Ok(FileType::Docx),
            _ => Err(RagError::UnsupportedFormat(ext.to_string())),
        }
    }

    /// Derive the declared type from a file name's extension.
    pub fn from_file_name(name: &str) -> Result<Self, RagError> {
        match name.rsplit_once('.') {
            Some((_, ext)) => Self::from_extension(ext),
            None => Err(RagError::UnsupportedFormat(name.to_string())),
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileType {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "manual-text" {
            return Ok(FileType::ManualText);
        }
        Self::from_extension(s)
    }
}

/// A named unit of ingested content. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub source_name: String,
    pub file_type: FileType,
    pub raw_text: String,
}

impl Document {
    pub fn new(source_name: impl Into<String>, file_type: FileType, raw_text: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            file_type,
            raw_text: raw_text.into(),
        }
    }
}

/// A bounded, contiguous passage of a document's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub source_name: String,
    pub file_type: FileType,
    /// Position among the chunks of the same document, starting at 0.
    pub sequence_index: usize,
}

/// Characters of chunk text shown when citing a source.
pub const EXCERPT_CHARS: usize = 200;

impl Chunk {
    /// The first `max_chars` characters of the text, with `...` appended
    /// when anything was cut.
    pub fn excerpt(&self, max_chars: usize) -> String {
        match self.text.char_indices().nth(max_chars) {
            Some((cut, _)) => format!("{}...", &self.text[..cut]),
            None => self.text.clone(),
        }
    }
}

/// A chunk returned from the index together with its similarity.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// How a query was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryOutcome {
    /// The generator produced an answer from retrieved context.
    Answered,
    /// The question was empty or otherwise rejected before retrieval.
    Invalid,
    /// The knowledge base has nothing to retrieve from.
    NoDocuments,
    /// No answer generator is configured (e.g. missing credentials).
    Unavailable,
    /// Embedding, retrieval or generation failed; `answer` explains why.
    Failed,
}

/// Ephemeral result of a question. `cited_chunks` are in descending
/// relevance order and are exactly what the generator was shown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub answer: String,
    pub outcome: QueryOutcome,
    pub cited_chunks: Vec<Chunk>,
}

impl QueryResult {
    pub fn answered(answer: String, cited_chunks: Vec<Chunk>) -> Self {
        Self {
            answer,
            outcome: QueryOutcome::Answered,
            cited_chunks,
        }
    }

    /// A result with no citations, used for every non-answer outcome.
    pub fn without_citations(outcome: QueryOutcome, answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            outcome,
            cited_chunks: Vec::new(),
        }
    }

    /// Distinct source names in citation order.
    pub fn cited_sources(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for c in &self.cited_chunks {
            if !seen.contains(&c.source_name.as_str()) {
                seen.push(c.source_name.as_str());
            }
        }
        seen
    }
}

/// Aggregate view of the knowledge base.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KnowledgeBaseStats {
    pub total_chunks: usize,
    pub distinct_sources: BTreeSet<String>,
}

/// Bookkeeping entry for one successfully ingested document.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentRecord {
    pub source_name: String,
    pub file_type: FileType,
    pub chunk_count: usize,
    pub ingested_at: DateTime<Utc>,
}

/// A file submitted for ingestion: raw bytes plus what the caller says it is.
#[derive(Debug, Clone)]
pub struct IngestFile {
    pub bytes: Vec<u8>,
    pub name: String,
    pub declared_type: String,
}

impl IngestFile {
    pub fn new(bytes: Vec<u8>, name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        Self {
            bytes,
            name: name.into(),
            declared_type: declared_type.into(),
        }
    }

    /// Build an upload whose declared type is taken from the name's extension.
    pub fn from_name(bytes: Vec<u8>, name: impl Into<String>) -> Self {
        let name = name.into();
        let declared_type = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_string())
            .unwrap_or_default();
        Self {
            bytes,
            name,
            declared_type,
        }
    }
}

/// A file that did not make it into the knowledge base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub name: String,
    pub reason: String,
}

/// Outcome of a batch ingestion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Files that went through load, chunk, embed and index end-to-end.
    pub ingested: usize,
    pub chunks_added: usize,
    pub skipped: Vec<SkippedFile>,
    /// Files ignored because the session had already ingested that name.
    pub already_ingested: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type_from_extension() {
        assert_eq!(FileType::from_extension("PDF").unwrap(), FileType::Pdf);
        assert_eq!(FileType::from_extension(".txt").unwrap(), FileType::Txt);
        assert_eq!(FileType::from_extension("docx").unwrap(), FileType::Docx);
    }

    #[test]
    fn test_file_type_rejects_unknown() {
        let err = FileType::from_extension("pptx").unwrap_err();
        assert!(matches!(err, RagError::UnsupportedFormat(ref e) if e == "pptx"));
        assert!(FileType::from_extension("manual-text").is_err());
    }

    #[test]
    fn test_file_type_from_file_name() {
        assert_eq!(FileType::from_file_name("notes.final.TXT").unwrap(), FileType::Txt);
        assert!(FileType::from_file_name("Makefile").is_err());
    }

    #[test]
    fn test_file_type_serde_names() {
        let json = serde_json::to_string(&FileType::ManualText).unwrap();
        assert_eq!(json, "\"manual-text\"");
        let parsed: FileType = "manual-text".parse().unwrap();
        assert_eq!(parsed, FileType::ManualText);
    }

    #[test]
    fn test_ingest_file_from_name() {
        let f = IngestFile::from_name(b"x".to_vec(), "a.docx");
        assert_eq!(f.declared_type, "docx");
        let f = IngestFile::from_name(b"x".to_vec(), "README");
        assert_eq!(f.declared_type, "");
    }

    #[test]
    fn test_excerpt_cuts_on_char_boundary() {
        let c = Chunk {
            text: "héllo wörld".into(),
            source_name: "s".into(),
            file_type: FileType::Txt,
            sequence_index: 0,
        };
        assert_eq!(c.excerpt(5), "héllo...");
        assert_eq!(c.excerpt(11), "héllo wörld");
        assert_eq!(c.excerpt(50), "héllo wörld");
    }

    #[test]
    fn test_cited_sources_dedup_in_order() {
        let mk = |src: &str, i| Chunk {
            text: "t".into(),
            source_name: src.into(),
            file_type: FileType::Txt,
            sequence_index: i,
        };
        let r = QueryResult::answered("a".into(), vec![mk("b", 0), mk("a", 0), mk("b", 1)]);
        assert_eq!(r.cited_sources(), vec!["b", "a"]);
    }
}
