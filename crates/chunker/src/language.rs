use crate::error::{ChunkerError, Result};
use std::path::Path;

/// Source language recognized by the extractor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Unknown,
}

impl Language {
    /// Detect language from file extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "rs" => Self::Rust,
            "py" | "pyw" => Self::Python,
            "js" | "mjs" | "cjs" | "jsx" => Self::JavaScript,
            "ts" | "tsx" => Self::TypeScript,
            _ => Self::Unknown,
        }
    }

    /// Detect language from file path
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or(Self::Unknown, Self::from_extension)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rust => "rust",
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Unknown => "unknown",
        }
    }

    /// Whether tree-sitter decomposition is available for this language
    pub const fn supports_ast(self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Get Tree-sitter grammar instance
    pub fn tree_sitter_language(self) -> Result<tree_sitter::Language> {
        match self {
            Self::Rust => Ok(tree_sitter_rust::LANGUAGE.into()),
            Self::Python => Ok(tree_sitter_python::LANGUAGE.into()),
            Self::JavaScript => Ok(tree_sitter_javascript::LANGUAGE.into()),
            Self::TypeScript => Ok(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            Self::Unknown => Err(ChunkerError::unsupported_language(self.as_str())),
        }
    }

    /// Node kinds treated as top-level definitions for this grammar
    pub const fn definition_node_kinds(self) -> &'static [&'static str] {
        match self {
            Self::Rust => &[
                "function_item",
                "struct_item",
                "enum_item",
                "trait_item",
                "impl_item",
                "mod_item",
                "macro_definition",
            ],
            Self::Python => &["function_definition", "class_definition", "decorated_definition"],
            Self::JavaScript => &[
                "function_declaration",
                "generator_function_declaration",
                "class_declaration",
                "method_definition",
            ],
            Self::TypeScript => &[
                "function_declaration",
                "generator_function_declaration",
                "class_declaration",
                "method_definition",
                "interface_declaration",
                "enum_declaration",
                "type_alias_declaration",
            ],
            Self::Unknown => &[],
        }
    }
}
