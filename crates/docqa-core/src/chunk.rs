//! Boundary-aware text splitter with overlapping windows.
//!
//! Splits document text into passages of at most `chunk_size` characters,
//! each window after the first repeating up to `chunk_overlap` characters
//! of its predecessor's tail.
//!
//! # Algorithm
//!
//! 1. Pick the coarsest separator present in the text, trying paragraph
//!    breaks (`\n\n`), then line breaks, then sentence ends (`. `), then
//!    spaces, then single characters.
//! 2. Cut the text at that separator. Whitespace stays attached to the start
//!    of the following piece and a sentence's full stop to the end of its
//!    own, so pieces concatenate back to the input.
//! 3. Pieces shorter than `chunk_size` are packed greedily into a window.
//!    When the next piece would overflow, the window is emitted and pieces
//!    are dropped from its front until at most `chunk_overlap` characters
//!    remain; those carry over into the next window.
//! 4. Pieces too long to fit are split again with the next finer separator.
//!    Packing single characters is the hard cut; a lone character always
//!    fits because `chunk_size >= 2`.
//! 5. Emitted windows are trimmed of surrounding whitespace. A window is only
//!    emitted when it gained non-whitespace text since the previous one, so
//!    a carried-over tail is never repeated on its own.
//!
//! Lengths are counted in characters, not bytes. The output is a pure
//! function of `(text, chunk_size, chunk_overlap)`.
//!
//! # Example
//!
//! ```rust
//! use docqa_core::chunk::TextSplitter;
//!
//! let splitter = TextSplitter::new(1000, 200).unwrap();
//! let chunks = splitter.split_text("Hello world.\n\nSecond paragraph.");
//! assert_eq!(chunks, vec!["Hello world.\n\nSecond paragraph.".to_string()]);
//! ```

use std::collections::VecDeque;

use crate::error::{RagError, Result};
use crate::models::{Chunk, Document};

/// Default window size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default overlap between neighbouring windows in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Separators from coarsest to finest, each with the byte offset inside it
/// where the cut falls. The empty string means "any char".
const SEPARATORS: [(&str, usize); 5] = [("\n\n", 0), ("\n", 0), (". ", 1), (" ", 0), ("", 0)];

/// Validated splitter parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    /// Create a splitter.
    ///
    /// # Errors
    ///
    /// [`RagError::Configuration`] unless `0 < chunk_overlap < chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_overlap == 0 || chunk_overlap >= chunk_size {
            return Err(RagError::Configuration(format!(
                "chunk_overlap must satisfy 0 < chunk_overlap < chunk_size (got chunk_size={}, chunk_overlap={})",
                chunk_size, chunk_overlap
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split raw text into ordered passages. Empty input yields no passages.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let mut out = Vec::new();
        if text.is_empty() {
            return out;
        }
        self.split_recursive(text, &SEPARATORS, &mut out);
        out
    }

    /// Split a document into [`Chunk`]s that inherit its source metadata.
    ///
    /// `sequence_index` values are contiguous from 0 in document order.
    pub fn split_document(&self, doc: &Document) -> Vec<Chunk> {
        self.split_text(&doc.raw_text)
            .into_iter()
            .enumerate()
            .map(|(i, text)| Chunk {
                text,
                source_name: doc.source_name.clone(),
                file_type: doc.file_type,
                sequence_index: i,
            })
            .collect()
    }

    fn split_recursive(&self, text: &str, separators: &[(&str, usize)], out: &mut Vec<String>) {
        let (level, separator) = separators
            .iter()
            .enumerate()
            .find(|(_, (sep, _))| sep.is_empty() || text.contains(*sep))
            .map(|(i, sep)| (i, *sep))
            .unwrap_or((separators.len(), ("", 0)));
        let finer = separators.get(level + 1..).unwrap_or(&[]);

        let mut fitting: Vec<&str> = Vec::new();
        for piece in split_at_separator(text, separator) {
            if char_len(piece) < self.chunk_size || finer.is_empty() {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                self.merge(&fitting, out);
                fitting.clear();
            }
            self.split_recursive(piece, finer, out);
        }
        if !fitting.is_empty() {
            self.merge(&fitting, out);
        }
    }

    /// Greedily pack pieces into windows, carrying an overlap tail forward.
    fn merge(&self, pieces: &[&str], out: &mut Vec<String>) {
        let mut window: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0usize;
        // Whether the window holds text not yet part of an emitted chunk.
        let mut fresh = false;

        for &piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                if fresh {
                    emit(&window, out);
                    fresh = false;
                }
                while total > self.chunk_overlap || (total > 0 && total + len > self.chunk_size) {
                    match window.pop_front() {
                        Some((_, dropped)) => total -= dropped,
                        None => break,
                    }
                }
            }
            window.push_back((piece, len));
            total += len;
            fresh |= !piece.trim().is_empty();
        }
        if fresh {
            emit(&window, out);
        }
    }
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// Split `raw_text` with the given parameters.
///
/// Shorthand for [`TextSplitter::new`] followed by [`TextSplitter::split_text`].
pub fn split_text(raw_text: &str, chunk_size: usize, chunk_overlap: usize) -> Result<Vec<String>> {
    Ok(TextSplitter::new(chunk_size, chunk_overlap)?.split_text(raw_text))
}

fn emit(window: &VecDeque<(&str, usize)>, out: &mut Vec<String>) {
    let joined: String = window.iter().map(|(piece, _)| *piece).collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

/// Cut `text` at every occurrence of `separator`, `offset` bytes into it.
/// The rest of the separator starts the following piece. An empty separator
/// yields one piece per character.
fn split_at_separator<'a>(text: &'a str, (separator, offset): (&str, usize)) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }
    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        let cut = idx + offset;
        if cut > start {
            pieces.push(&text[start..cut]);
            start = cut;
        }
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileType;

    /// Locate each chunk in `text` in order and return byte ranges.
    fn locate(text: &str, chunks: &[String]) -> Vec<(usize, usize)> {
        let mut ranges = Vec::new();
        let mut from = 0;
        for c in chunks {
            let pos = text[from..]
                .find(c.as_str())
                .map(|p| p + from)
                .unwrap_or_else(|| panic!("chunk not found in order: {:?}", c));
            ranges.push((pos, pos + c.len()));
            from = pos + text[pos..].chars().next().map(|ch| ch.len_utf8()).unwrap_or(1);
        }
        ranges
    }

    fn numbered_words(n: usize) -> String {
        (0..n).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_rejects_bad_parameters() {
        assert!(matches!(TextSplitter::new(100, 0), Err(RagError::Configuration(_))));
        assert!(matches!(TextSplitter::new(100, 100), Err(RagError::Configuration(_))));
        assert!(matches!(TextSplitter::new(100, 150), Err(RagError::Configuration(_))));
        assert!(split_text("abc", 0, 0).is_err());
    }

    #[test]
    fn test_empty_text() {
        let s = TextSplitter::new(10, 2).unwrap();
        assert!(s.split_text("").is_empty());
        assert!(s.split_text("   \n\n  ").is_empty());
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = split_text("Paris is the capital of France.", 1000, 200).unwrap();
        assert_eq!(chunks, vec!["Paris is the capital of France.".to_string()]);
    }

    #[test]
    fn test_lengths_bounded() {
        let text = format!(
            "{}\n\n{}\n{}",
            numbered_words(300),
            "x".repeat(250),
            numbered_words(40)
        );
        for (size, overlap) in [(50, 10), (64, 63), (100, 20), (7, 1)] {
            let chunks = split_text(&text, size, overlap).unwrap();
            assert!(!chunks.is_empty());
            for c in &chunks {
                assert!(
                    c.chars().count() <= size,
                    "chunk of {} chars exceeds {}",
                    c.chars().count(),
                    size
                );
            }
        }
    }

    #[test]
    fn test_chunks_cover_all_text() {
        let text = format!("Intro line.\n\n{}\n\nOutro.\nLast line here", numbered_words(120));
        let chunks = split_text(&text, 60, 15).unwrap();
        let ranges = locate(&text, &chunks);
        for (i, ch) in text.char_indices() {
            if ch.is_whitespace() {
                continue;
            }
            assert!(
                ranges.iter().any(|&(s, e)| i >= s && i < e),
                "byte {} ({:?}) not covered",
                i,
                ch
            );
        }
    }

    #[test]
    fn test_overlap_never_exceeds_limit() {
        let text = numbered_words(200);
        let overlap = 12;
        let chunks = split_text(&text, 50, overlap).unwrap();
        assert!(chunks.len() > 1);
        let ranges = locate(&text, &chunks);
        let mut saw_overlap = false;
        for pair in ranges.windows(2) {
            let (_, prev_end) = pair[0];
            let (next_start, _) = pair[1];
            if next_start < prev_end {
                saw_overlap = true;
                assert!(prev_end - next_start <= overlap);
            }
        }
        assert!(saw_overlap, "adjacent windows should share a tail");
    }

    #[test]
    fn test_prefers_word_boundaries() {
        let text = numbered_words(80);
        let chunks = split_text(&text, 30, 8).unwrap();
        let ranges = locate(&text, &chunks);
        for (start, end) in ranges {
            assert!(start == 0 || text.as_bytes()[start - 1] == b' ');
            assert!(end == text.len() || text.as_bytes()[end] == b' ');
        }
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let text = "First paragraph here.\n\nSecond paragraph here.\n\nThird paragraph here.";
        let chunks = split_text(text, 30, 5).unwrap();
        assert_eq!(
            chunks,
            vec![
                "First paragraph here.".to_string(),
                "Second paragraph here.".to_string(),
                "Third paragraph here.".to_string(),
            ]
        );
    }

    #[test]
    fn test_character_windows_without_separators() {
        let text = "a".repeat(25);
        let chunks = split_text(&text, 10, 3).unwrap();
        assert_eq!(chunks.len(), 4);
        assert!(chunks.iter().all(|c| c.len() <= 10));
        assert_eq!(chunks[0].len(), 10);
    }

    #[test]
    fn test_prefers_sentence_boundaries() {
        let text = "One two three. Four five six. Seven eight nine.";
        let chunks = split_text(text, 20, 5).unwrap();
        assert_eq!(
            chunks,
            vec![
                "One two three.".to_string(),
                "Four five six.".to_string(),
                "Seven eight nine.".to_string(),
            ]
        );
    }

    #[test]
    fn test_carried_tail_is_not_repeated() {
        // The tail kept after ".a e." is followed only by whitespace.
        let chunks = split_text("xyz\n\n\n.a e.\n  \n\na\ne", 9, 6).unwrap();
        assert_eq!(chunks, vec!["xyz".to_string(), ".a e.".to_string(), "a\ne".to_string()]);
        for pair in chunks.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
    }

    #[test]
    fn test_multibyte_utf8_chars() {
        let text = "┌──────────────────┐\n│ Hello wörld      │\n└──────────────────┘";
        let chunks = split_text(text, 8, 2).unwrap();
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(c.chars().count() <= 8);
        }
    }

    #[test]
    fn test_deterministic() {
        let text = format!("Alpha\n\nBeta\n\n{}", numbered_words(60));
        let s = TextSplitter::new(25, 6).unwrap();
        assert_eq!(s.split_text(&text), s.split_text(&text));
    }

    #[test]
    fn test_split_document_inherits_metadata() {
        let doc = Document::new("notes.txt", FileType::Txt, numbered_words(50));
        let chunks = TextSplitter::new(40, 10).unwrap().split_document(&doc);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.sequence_index, i);
            assert_eq!(c.source_name, "notes.txt");
            assert_eq!(c.file_type, FileType::Txt);
        }
    }
}
