//! File loader backed by [`crate::extract`].

use docqa_core::loader::DocumentLoader;
use docqa_core::models::{Document, FileType};
use docqa_core::{RagError, Result};

/// Loads PDF, DOCX and UTF-8 text uploads into a single [`Document`] each.
#[derive(Debug, Clone)]
pub struct FileLoader {
    max_file_bytes: u64,
}

impl FileLoader {
    pub fn new(max_file_bytes: u64) -> Self {
        Self { max_file_bytes }
    }
}

impl Default for FileLoader {
    fn default() -> Self {
        Self::new(50 * 1024 * 1024)
    }
}

impl DocumentLoader for FileLoader {
    fn load(&self, bytes: &[u8], file_name: &str, declared_type: &str) -> Result<Vec<Document>> {
        let file_type = FileType::from_extension(declared_type)?;
        if bytes.len() as u64 > self.max_file_bytes {
            return Err(RagError::document_load(
                file_name,
                format!(
                    "file is {} bytes, limit is {}",
                    bytes.len(),
                    self.max_file_bytes
                ),
            ));
        }
        let text = crate::extract::extract_text(bytes, file_type)
            .map_err(|e| RagError::document_load(file_name, e.to_string()))?;
        Ok(vec![Document::new(file_name, file_type, text)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_txt_with_name_and_type() {
        let docs = FileLoader::default()
            .load(b"Paris is the capital of France.", "doc1.txt", "txt")
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source_name, "doc1.txt");
        assert_eq!(docs[0].file_type, FileType::Txt);
        assert_eq!(docs[0].raw_text, "Paris is the capital of France.");
    }

    #[test]
    fn rejects_unsupported_declared_type() {
        let err = FileLoader::default()
            .load(b"x", "slides.pptx", "pptx")
            .unwrap_err();
        assert!(matches!(err, RagError::UnsupportedFormat(_)));
    }

    #[test]
    fn rejects_manual_text_as_declared_type() {
        let err = FileLoader::default()
            .load(b"x", "typed", "manual-text")
            .unwrap_err();
        assert!(matches!(err, RagError::UnsupportedFormat(_)));
    }

    #[test]
    fn corrupt_pdf_names_the_file() {
        let err = FileLoader::default()
            .load(b"definitely not a pdf", "broken.pdf", "pdf")
            .unwrap_err();
        match err {
            RagError::DocumentLoad { name, .. } => assert_eq!(name, "broken.pdf"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn enforces_size_limit() {
        let err = FileLoader::new(4).load(b"12345", "big.txt", "txt").unwrap_err();
        assert!(matches!(err, RagError::DocumentLoad { .. }));
    }
}
