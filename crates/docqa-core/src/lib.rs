//! # docqa core
//!
//! Runtime-agnostic building blocks for document question answering:
//! data models, the error taxonomy, the text splitter, and the traits the
//! application implements for embedding, indexing, loading, and answer
//! generation.
//!
//! This crate contains no tokio, network, or filesystem code. The native
//! application (`docqa`) supplies the HTTP providers and the SQLite index.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod index;
pub mod loader;
pub mod models;

pub use error::{RagError, Result};
