//! # Scout Chunker
//!
//! Decomposes source files into chunks with stable identity.
//!
//! ## Pipeline
//!
//! ```text
//! File content
//!     │
//!     ├──> Language detection (extension)
//!     │
//!     ├──> Tree-sitter parse (AST languages)
//!     │      └─> Definition chunks + gap blocks
//!     │
//!     └──> Fallback: whole-file chunk
//! ```
//!
//! A chunk's `chunk_id` is derived from its file path and structural slot,
//! so an unmodified definition keeps its identity across re-extraction even
//! when surrounding code shifts.

mod chunk;
mod error;
mod extractor;
mod language;

pub use chunk::{Chunk, ChunkId, ChunkKind};
pub use error::{ChunkerError, Result};
pub use extractor::{ChunkExtractor, ExtractorConfig};
pub use language::Language;
