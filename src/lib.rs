//! # docqa
//!
//! A document question-answering assistant. Upload PDF, DOCX and text
//! files, then ask questions; answers are generated from the most relevant
//! passages and cite them.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌────────────┐
//! │  Uploads    │──▶│   Session    │──▶│   SQLite   │
//! │ PDF/DOCX/TXT│   │ Chunk+Embed  │   │ vector idx │
//! └─────────────┘   └──────┬───────┘   └────────────┘
//!                          │ retrieve top-k
//!                          ▼
//!                   ┌──────────────┐
//!                   │  Generator   │  Gemini / OpenAI / Ollama
//!                   └──────┬───────┘
//!             ┌────────────┴────────────┐
//!             ▼                         ▼
//!        ┌──────────┐             ┌──────────┐
//!        │   CLI    │             │   HTTP   │
//!        │ (docqa)  │             │  (axum)  │
//!        └──────────┘             └──────────┘
//! ```
//!
//! The data model, error taxonomy, chunker and collaborator traits live in
//! the `docqa-core` crate; this crate supplies the native implementations.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`extract`] | PDF, DOCX and text extraction |
//! | [`loader`] | File loader over [`extract`] |
//! | [`embedding`] | OpenAI, Ollama and local embedding providers |
//! | [`generation`] | Gemini, OpenAI, Ollama and extractive answer generators |
//! | [`http`] | Retrying JSON client shared by the providers |
//! | [`db`] | Database connection and schema |
//! | [`sqlite_index`] | SQLite-backed vector index |
//! | [`session`] | Ingestion and query orchestration |
//! | [`files`] | Reading uploads from disk |
//! | [`server`] | JSON HTTP API |

pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod files;
pub mod generation;
pub mod http;
pub mod loader;
pub mod server;
pub mod session;
pub mod sqlite_index;
