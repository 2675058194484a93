//! Answer generator seam and prompt assembly.
//!
//! The generator receives the question and the retrieved chunks in
//! descending relevance order, and every chunk is placed in the prompt
//! ("stuff" strategy).

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Chunk;

/// Produces a natural-language answer grounded in retrieved chunks.
///
/// Never called with an empty context: the orchestrator answers "no
/// documents" itself in that case.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Returns the model identifier (e.g. `"gemini-1.5-flash"`).
    fn model_name(&self) -> &str;

    /// # Errors
    ///
    /// [`RagError::Generation`](crate::RagError::Generation) when the model
    /// or service is unavailable, over quota, or times out.
    async fn generate(&self, question: &str, context: &[Chunk]) -> Result<String>;
}

const PROMPT_PREAMBLE: &str = "Use the following pieces of context to answer the question at the end. \
If you don't know the answer, just say that you don't know, don't try to make up an answer.";

/// Join chunk texts with blank lines, in the order given.
pub fn format_context(context: &[Chunk]) -> String {
    context
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Build the single-turn prompt sent to text-completion style models.
///
/// # Example
///
/// ```rust
/// use docqa_core::generation::build_prompt;
/// use docqa_core::models::{Chunk, FileType};
///
/// let ctx = vec![Chunk {
///     text: "Paris is the capital of France.".into(),
///     source_name: "doc1".into(),
///     file_type: FileType::ManualText,
///     sequence_index: 0,
/// }];
/// let prompt = build_prompt("What is the capital of France?", &ctx);
/// assert!(prompt.contains("Paris is the capital of France."));
/// assert!(prompt.ends_with("Helpful Answer:"));
/// ```
pub fn build_prompt(question: &str, context: &[Chunk]) -> String {
    format!(
        "{}\n\n{}\n\nQuestion: {}\nHelpful Answer:",
        PROMPT_PREAMBLE,
        format_context(context),
        question.trim()
    )
}
