//! The question-answering session: ingestion and query orchestration.
//!
//! A [`Session`] owns the knowledge base for its whole lifetime and is the
//! only thing that mutates it. It composes the collaborators:
//!
//! ```text
//! ingest: bytes → DocumentLoader → TextSplitter → EmbeddingProvider → VectorIndex::add
//! query:  question → EmbeddingProvider → VectorIndex::search → AnswerGenerator
//! ```
//!
//! Neither path fails as a whole for expected problems. A bad file becomes
//! a [`SkippedFile`] entry in the [`IngestReport`]; a failed query becomes a
//! [`QueryResult`] whose answer explains what went wrong.
//!
//! Sessions are shared behind an `Arc` by the CLI and the HTTP server.
//! Ingests and resets run one at a time; queries share read access to the
//! index and never observe a half-finished clear.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};

use docqa_core::chunk::TextSplitter;
use docqa_core::embedding::EmbeddingProvider;
use docqa_core::generation::AnswerGenerator;
use docqa_core::index::{ClearOutcome, InMemoryIndex, VectorIndex};
use docqa_core::loader::DocumentLoader;
use docqa_core::models::{
    Chunk, Document, DocumentRecord, FileType, IngestFile, IngestReport, KnowledgeBaseStats,
    QueryOutcome, QueryResult, SkippedFile,
};
use docqa_core::{RagError, Result};

use crate::config::Config;
use crate::embedding::create_provider;
use crate::generation::create_generator;
use crate::loader::FileLoader;
use crate::sqlite_index::SqliteIndex;

pub const INVALID_QUESTION_ANSWER: &str = "Please enter a question.";
pub const NO_DOCUMENTS_ANSWER: &str =
    "No documents in knowledge base. Please upload some documents first.";
pub const NOT_INITIALIZED_ANSWER: &str =
    "QA system not initialized. Please check your API key.";

/// Chunking and retrieval parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            chunk_size: docqa_core::chunk::DEFAULT_CHUNK_SIZE,
            chunk_overlap: docqa_core::chunk::DEFAULT_CHUNK_OVERLAP,
            top_k: 3,
        }
    }
}

#[derive(Default)]
struct Bookkeeping {
    documents: Vec<DocumentRecord>,
    ingested_names: HashSet<String>,
}

pub struct Session {
    loader: Arc<dyn DocumentLoader>,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Option<Arc<dyn AnswerGenerator>>,
    index: RwLock<Box<dyn VectorIndex>>,
    splitter: TextSplitter,
    top_k: usize,
    /// Held for the whole of every ingest and reset.
    writer: Mutex<()>,
    books: Mutex<Bookkeeping>,
}

impl Session {
    /// Assemble a session. Fails on invalid chunking parameters, `top_k == 0`
    /// or an index whose dimensionality differs from the embedder's.
    pub fn new(
        loader: Arc<dyn DocumentLoader>,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Option<Arc<dyn AnswerGenerator>>,
        index: Box<dyn VectorIndex>,
        settings: SessionSettings,
    ) -> Result<Self> {
        let splitter = TextSplitter::new(settings.chunk_size, settings.chunk_overlap)?;
        if settings.top_k == 0 {
            return Err(RagError::Configuration("top_k must be >= 1".to_string()));
        }
        if index.dims() != embedder.dims() {
            return Err(RagError::dimension_mismatch(
                "index vs embedding model",
                index.dims(),
                embedder.dims(),
            ));
        }
        Ok(Self {
            loader,
            embedder,
            generator,
            index: RwLock::new(index),
            splitter,
            top_k: settings.top_k,
            writer: Mutex::new(()),
            books: Mutex::new(Bookkeeping::default()),
        })
    }

    pub fn embedding_model(&self) -> &str {
        self.embedder.model_name()
    }

    /// Model answering questions, `None` when answering is unavailable.
    pub fn generation_model(&self) -> Option<&str> {
        self.generator.as_deref().map(|g| g.model_name())
    }

    /// Ingest files in order, skipping (not failing on) bad ones.
    pub async fn ingest(&self, files: &[IngestFile]) -> IngestReport {
        let _writer = self.writer.lock().await;
        let mut report = IngestReport::default();
        for file in files {
            self.ingest_one(file, &mut report).await;
        }
        report
    }

    /// Like [`ingest`](Self::ingest), but files whose name was already
    /// ingested in this session are listed in `already_ingested` instead.
    pub async fn ingest_new(&self, files: &[IngestFile]) -> IngestReport {
        let _writer = self.writer.lock().await;
        let mut report = IngestReport::default();
        for file in files {
            let seen = self.books.lock().await.ingested_names.contains(&file.name);
            if seen {
                tracing::debug!(name = %file.name, "already ingested, skipping");
                report.already_ingested.push(file.name.clone());
                continue;
            }
            self.ingest_one(file, &mut report).await;
        }
        report
    }

    /// Ingest typed or pasted text as one `manual-text` document.
    pub async fn ingest_text(&self, text: &str, name: &str) -> bool {
        let _writer = self.writer.lock().await;
        let doc = Document::new(name, FileType::ManualText, text);
        match self.index_documents(name, vec![doc]).await {
            Ok(chunks) => {
                tracing::info!(name, chunks, "ingested text");
                true
            }
            Err(e) => {
                tracing::warn!(name, error = %e, "text not ingested");
                false
            }
        }
    }

    async fn ingest_one(&self, file: &IngestFile, report: &mut IngestReport) {
        match self.load_and_index(file).await {
            Ok(chunks) => {
                tracing::info!(name = %file.name, chunks, "ingested file");
                report.ingested += 1;
                report.chunks_added += chunks;
            }
            Err(e) => {
                tracing::warn!(name = %file.name, error = %e, "skipping file");
                report.skipped.push(SkippedFile {
                    name: file.name.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    async fn load_and_index(&self, file: &IngestFile) -> Result<usize> {
        let loader = Arc::clone(&self.loader);
        let (bytes, name, declared) = (
            file.bytes.clone(),
            file.name.clone(),
            file.declared_type.clone(),
        );
        let documents = tokio::task::spawn_blocking(move || loader.load(&bytes, &name, &declared))
            .await
            .map_err(|e| RagError::document_load(&file.name, e))??;
        self.index_documents(&file.name, documents).await
    }

    /// Chunk, embed and add every document of one source, all or nothing.
    async fn index_documents(&self, name: &str, documents: Vec<Document>) -> Result<usize> {
        let chunks: Vec<Chunk> = documents
            .iter()
            .filter(|d| !d.raw_text.trim().is_empty())
            .flat_map(|d| self.splitter.split_document(d))
            .collect();
        if chunks.is_empty() {
            return Err(RagError::document_load(name, "no extractable text"));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        self.index.write().await.add(&chunks, &vectors).await?;

        let mut books = self.books.lock().await;
        books.ingested_names.insert(name.to_string());
        for doc in &documents {
            let chunk_count = chunks
                .iter()
                .filter(|c| c.source_name == doc.source_name)
                .count();
            if chunk_count > 0 {
                books.documents.push(DocumentRecord {
                    source_name: doc.source_name.clone(),
                    file_type: doc.file_type,
                    chunk_count,
                    ingested_at: Utc::now(),
                });
            }
        }
        Ok(chunks.len())
    }

    /// Answer a question from the knowledge base. Never fails; problems are
    /// reported through [`QueryResult::outcome`] and the answer text.
    pub async fn query(&self, question: &str) -> QueryResult {
        let question = question.trim();
        if question.is_empty() {
            return QueryResult::without_citations(QueryOutcome::Invalid, INVALID_QUESTION_ANSWER);
        }

        match self.index.read().await.count().await {
            Ok(0) => {
                return QueryResult::without_citations(QueryOutcome::NoDocuments, NO_DOCUMENTS_ANSWER)
            }
            Ok(_) => {}
            Err(e) => return failed(&e),
        }
        let Some(generator) = &self.generator else {
            return QueryResult::without_citations(QueryOutcome::Unavailable, NOT_INITIALIZED_ANSWER);
        };

        // Embedding may sit on network retries; the index lock is only taken
        // for the search itself.
        let hits = match self.retrieve(question).await {
            Ok(hits) => hits,
            Err(e) => return failed(&e),
        };
        if hits.is_empty() {
            return QueryResult::without_citations(QueryOutcome::NoDocuments, NO_DOCUMENTS_ANSWER);
        }

        match generator.generate(question, &hits).await {
            Ok(answer) => QueryResult::answered(answer, hits),
            Err(e) => failed(&e),
        }
    }

    async fn retrieve(&self, question: &str) -> Result<Vec<Chunk>> {
        let query_vector = self.embedder.embed(question).await?;
        let hits = self.index.read().await.search(&query_vector, self.top_k).await?;
        tracing::debug!(
            hits = hits.len(),
            top_score = hits.first().map(|h| h.score),
            "retrieved context"
        );
        Ok(hits.into_iter().map(|h| h.chunk).collect())
    }

    pub async fn stats(&self) -> KnowledgeBaseStats {
        let index = self.index.read().await;
        match (index.count().await, index.sources().await) {
            (Ok(total_chunks), Ok(distinct_sources)) => KnowledgeBaseStats {
                total_chunks,
                distinct_sources,
            },
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(error = %e, "index stats unavailable, using session records");
                let books = self.books.lock().await;
                KnowledgeBaseStats {
                    total_chunks: books.documents.iter().map(|d| d.chunk_count).sum(),
                    distinct_sources: books
                        .documents
                        .iter()
                        .map(|d| d.source_name.clone())
                        .collect(),
                }
            }
        }
    }

    /// Documents ingested since the session started or was last reset.
    pub async fn documents(&self) -> Vec<DocumentRecord> {
        self.books.lock().await.documents.clone()
    }

    /// Empty the knowledge base and forget which files were ingested.
    ///
    /// A clear that had to rebuild storage is reported as
    /// [`ClearOutcome::Rebuilt`], not as an error. `Err` means not even an
    /// in-memory index could be created.
    pub async fn reset(&self) -> Result<ClearOutcome> {
        let _writer = self.writer.lock().await;
        let outcome = self.index.write().await.clear().await?;
        *self.books.lock().await = Bookkeeping::default();
        tracing::info!(?outcome, "knowledge base reset");
        Ok(outcome)
    }
}

fn failed(e: &RagError) -> QueryResult {
    tracing::error!(error = %e, "query failed");
    QueryResult::without_citations(
        QueryOutcome::Failed,
        format!("Error processing your question: {}", e),
    )
}

/// Build a session from configuration: providers, index backend and loader.
pub async fn build_session(config: &Config) -> anyhow::Result<Session> {
    let embedder = create_provider(&config.embedding)?;
    let generator = create_generator(&config.generation)?;

    let index: Box<dyn VectorIndex> = match config.knowledge_base.backend.as_str() {
        "memory" => Box::new(InMemoryIndex::new(embedder.dims())),
        _ => Box::new(
            SqliteIndex::open(
                &config.knowledge_base.path,
                embedder.dims(),
                embedder.model_name(),
                config.knowledge_base.fresh_start,
            )
            .await
            .with_context(|| {
                format!(
                    "Failed to open knowledge base at {}",
                    config.knowledge_base.path.display()
                )
            })?,
        ),
    };

    let settings = SessionSettings {
        chunk_size: config.chunking.chunk_size,
        chunk_overlap: config.chunking.chunk_overlap,
        top_k: config.retrieval.top_k,
    };
    let session = Session::new(
        Arc::new(FileLoader::new(config.ingest.max_file_bytes)),
        embedder,
        generator,
        index,
        settings,
    )?;
    Ok(session)
}
