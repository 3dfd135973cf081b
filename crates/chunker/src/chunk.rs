use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// Structural category of a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Function,
    Method,
    Struct,
    Enum,
    Trait,
    Impl,
    Class,
    Interface,
    Module,
    TypeAlias,
    Macro,
    /// Top-level text between definitions
    Block,
    /// Whole-file fallback for unparseable or unsupported content
    File,
}

impl ChunkKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::Struct => "struct",
            Self::Enum => "enum",
            Self::Trait => "trait",
            Self::Impl => "impl",
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Module => "module",
            Self::TypeAlias => "type_alias",
            Self::Macro => "macro",
            Self::Block => "block",
            Self::File => "file",
        }
    }
}

/// Stable chunk identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(String);

impl ChunkId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive the id for a named definition.
    ///
    /// Named chunks hash only path + structural slot, so an in-place body
    /// edit keeps the id and shows up as a content change.
    #[must_use]
    pub fn for_named(file_path: &str, kind: ChunkKind, symbol_path: &str) -> Self {
        Self(slot_hash(&format!(
            "{file_path}\u{0}{}\u{0}{symbol_path}",
            kind.as_str()
        )))
    }

    /// Derive the id for an anonymous chunk (gap block, whole-file fallback).
    ///
    /// Without a symbol to anchor the slot, the ordinal and content hash
    /// participate in identity; a shifted or edited block is a new chunk.
    #[must_use]
    pub fn for_anonymous(
        file_path: &str,
        kind: ChunkKind,
        ordinal: usize,
        content_hash: &str,
    ) -> Self {
        Self(slot_hash(&format!(
            "{file_path}\u{0}{}\u{0}{ordinal}\u{0}{content_hash}",
            kind.as_str()
        )))
    }

    /// Derive a distinct id for the nth occupant of an already-taken slot.
    ///
    /// Deterministic: the same base id and ordinal always produce the same
    /// derived id, so repeated extraction of the same file agrees with the
    /// stored index.
    #[must_use]
    pub fn disambiguated(&self, ordinal: usize) -> Self {
        Self(slot_hash(&format!("{}\u{0}{ordinal}", self.0)))
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn slot_hash(repr: &str) -> String {
    let hash = blake3::hash(repr.as_bytes());
    hash.to_hex()[..32].to_string()
}

/// Hash chunk text for change detection
#[must_use]
pub fn content_hash(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

/// A semantically meaningful unit of source text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: ChunkId,
    pub file_path: String,
    pub kind: ChunkKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol_path: Option<String>,
    pub start_byte: usize,
    pub end_byte: usize,
    pub start_line: usize,
    pub end_line: usize,
    pub content_hash: String,
    pub language: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model_id: Option<String>,
}

impl Chunk {
    /// Create a named definition chunk
    pub fn named(
        file_path: impl Into<String>,
        kind: ChunkKind,
        symbol_path: impl Into<String>,
        byte_range: Range<usize>,
        line_range: Range<usize>,
        language: &str,
        text: impl Into<String>,
    ) -> Self {
        let file_path = file_path.into();
        let symbol_path = symbol_path.into();
        let text = text.into();
        let content_hash = content_hash(&text);
        let chunk_id = ChunkId::for_named(&file_path, kind, &symbol_path);
        Self {
            chunk_id,
            file_path,
            kind,
            symbol_path: Some(symbol_path),
            start_byte: byte_range.start,
            end_byte: byte_range.end,
            start_line: line_range.start,
            end_line: line_range.end,
            content_hash,
            language: language.to_string(),
            text,
            embedding: None,
            embedding_model_id: None,
        }
    }

    /// Create an anonymous chunk (gap block or whole-file fallback)
    pub fn anonymous(
        file_path: impl Into<String>,
        kind: ChunkKind,
        ordinal: usize,
        byte_range: Range<usize>,
        line_range: Range<usize>,
        language: &str,
        text: impl Into<String>,
    ) -> Self {
        let file_path = file_path.into();
        let text = text.into();
        let content_hash = content_hash(&text);
        let chunk_id = ChunkId::for_anonymous(&file_path, kind, ordinal, &content_hash);
        Self {
            chunk_id,
            file_path,
            kind,
            symbol_path: None,
            start_byte: byte_range.start,
            end_byte: byte_range.end,
            start_line: line_range.start,
            end_line: line_range.end,
            content_hash,
            language: language.to_string(),
            text,
            embedding: None,
            embedding_model_id: None,
        }
    }

    #[must_use]
    pub fn byte_range(&self) -> Range<usize> {
        self.start_byte..self.end_byte
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn named_id_survives_body_edit() {
        let a = Chunk::named("a.rs", ChunkKind::Function, "foo", 0..10, 1..3, "rust", "fn foo() {}");
        let b = Chunk::named(
            "a.rs",
            ChunkKind::Function,
            "foo",
            5..20,
            2..5,
            "rust",
            "fn foo() { 1 }",
        );
        assert_eq!(a.chunk_id, b.chunk_id);
        assert_ne!(a.content_hash, b.content_hash);
    }

    #[test]
    fn named_id_differs_by_path_and_symbol() {
        let a = Chunk::named("a.rs", ChunkKind::Function, "foo", 0..10, 1..3, "rust", "x");
        let b = Chunk::named("b.rs", ChunkKind::Function, "foo", 0..10, 1..3, "rust", "x");
        let c = Chunk::named("a.rs", ChunkKind::Function, "bar", 0..10, 1..3, "rust", "x");
        assert_ne!(a.chunk_id, b.chunk_id);
        assert_ne!(a.chunk_id, c.chunk_id);
    }

    #[test]
    fn anonymous_id_tracks_content() {
        let a = Chunk::anonymous("a.rs", ChunkKind::Block, 0, 0..4, 1..1, "rust", "abcd");
        let b = Chunk::anonymous("a.rs", ChunkKind::Block, 0, 0..4, 1..1, "rust", "abcd");
        let c = Chunk::anonymous("a.rs", ChunkKind::Block, 0, 0..4, 1..1, "rust", "efgh");
        assert_eq!(a.chunk_id, b.chunk_id);
        assert_ne!(a.chunk_id, c.chunk_id);
    }

    #[test]
    fn content_hash_matches_text() {
        let chunk = Chunk::named("a.rs", ChunkKind::Function, "f", 0..1, 1..1, "rust", "body");
        assert_eq!(chunk.content_hash, content_hash("body"));
    }
}
