use crate::chunk::{Chunk, ChunkKind};
use crate::error::{ChunkerError, Result};
use crate::language::Language;
use tree_sitter::{Node, Parser};

/// Extraction tuning knobs
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Emit top-level text between definitions as `Block` chunks
    pub include_blocks: bool,
    /// Files larger than this skip AST parsing and become one `File` chunk
    pub max_parse_bytes: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            include_blocks: true,
            max_parse_bytes: 2 * 1024 * 1024,
        }
    }
}

/// Parses file content into an ordered sequence of chunks with stable identity.
///
/// Deterministic: identical content at identical structural positions yields
/// identical `content_hash` and `chunk_id` across runs.
pub struct ChunkExtractor {
    config: ExtractorConfig,
}

impl ChunkExtractor {
    #[must_use]
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    /// Extract chunks, degrading to a single whole-file chunk when the
    /// content cannot be structurally decomposed. Unparseable files must
    /// stay searchable, so this never drops a file.
    #[must_use]
    pub fn extract(&self, file_path: &str, content: &str) -> Vec<Chunk> {
        match self.extract_structured(file_path, content) {
            Ok(chunks) => chunks,
            Err(err) => {
                log::debug!("Falling back to whole-file chunk for {file_path}: {err}");
                vec![whole_file_chunk(file_path, content)]
            }
        }
    }

    /// Extract via the AST, failing when the content is unparseable or the
    /// language has no grammar. Most callers want [`extract`] instead.
    pub fn extract_structured(&self, file_path: &str, content: &str) -> Result<Vec<Chunk>> {
        let language = Language::from_path(file_path);
        if !language.supports_ast() {
            return Err(ChunkerError::unsupported_language(language.as_str()));
        }
        if content.len() > self.config.max_parse_bytes {
            return Err(ChunkerError::parse_failed(
                file_path,
                format!("file exceeds {} bytes", self.config.max_parse_bytes),
            ));
        }

        let mut parser = Parser::new();
        parser
            .set_language(&language.tree_sitter_language()?)
            .map_err(|e| ChunkerError::Grammar(e.to_string()))?;
        let tree = parser
            .parse(content, None)
            .ok_or_else(|| ChunkerError::parse_failed(file_path, "parser returned no tree"))?;

        let mut walk = Walk {
            file_path,
            content,
            language,
            include_blocks: self.config.include_blocks,
            chunks: Vec::new(),
            block_ordinal: 0,
        };
        walk.top_level(tree.root_node());

        if walk.chunks.is_empty() {
            // No recognizable structure (e.g. a script of bare statements);
            // one whole-file chunk keeps it searchable.
            return Ok(vec![whole_file_chunk(file_path, content)]);
        }
        Ok(walk.chunks)
    }
}

fn whole_file_chunk(file_path: &str, content: &str) -> Chunk {
    let end_line = content.lines().count().max(1);
    Chunk::anonymous(
        file_path,
        ChunkKind::File,
        0,
        0..content.len(),
        1..end_line,
        Language::from_path(file_path).as_str(),
        content,
    )
}

fn node_text<'t>(content: &'t str, node: Node<'_>) -> Option<&'t str> {
    content.get(node.start_byte()..node.end_byte())
}

fn name_of<'t>(content: &'t str, node: Node<'_>) -> Option<&'t str> {
    node.child_by_field_name("name")
        .and_then(|n| node_text(content, n))
}

struct Walk<'a> {
    file_path: &'a str,
    content: &'a str,
    language: Language,
    include_blocks: bool,
    chunks: Vec<Chunk>,
    block_ordinal: usize,
}

impl Walk<'_> {
    fn top_level(&mut self, root: Node<'_>) {
        let mut gap_start = 0usize;
        let mut cursor = root.walk();
        let children: Vec<Node<'_>> = root.named_children(&mut cursor).collect();
        for node in children {
            if self.language.definition_node_kinds().contains(&node.kind()) {
                self.emit_gap(gap_start, node.start_byte());
                self.definition(node, None);
                gap_start = node.end_byte();
            }
        }
        self.emit_gap(gap_start, self.content.len());
    }

    fn definition(&mut self, node: Node<'_>, parent: Option<&str>) {
        let content = self.content;
        match (self.language, node.kind()) {
            // Rust impl/mod shells are not semantic units themselves; their
            // items are chunked individually under a qualified slot.
            (Language::Rust, "impl_item") => {
                let target = node
                    .child_by_field_name("type")
                    .and_then(|n| node_text(content, n))
                    .unwrap_or("impl");
                if let Some(body) = node.child_by_field_name("body") {
                    self.container_items(body, target);
                }
            }
            (Language::Rust, "mod_item") => {
                let name = name_of(content, node).unwrap_or("mod");
                if let Some(body) = node.child_by_field_name("body") {
                    self.container_items(body, name);
                }
            }
            // Python decorators belong to the definition they wrap: span the
            // whole decorated node but name it after the inner definition.
            (Language::Python, "decorated_definition") => {
                if let Some(inner) = node.child_by_field_name("definition") {
                    let kind = self.leaf_kind(inner.kind(), parent.is_some());
                    self.emit_named(node, inner, kind, parent);
                }
            }
            (_, kind_str) => {
                let kind = self.leaf_kind(kind_str, parent.is_some());
                self.emit_named(node, node, kind, parent);
            }
        }
    }

    fn container_items(&mut self, body: Node<'_>, parent: &str) {
        let mut cursor = body.walk();
        let children: Vec<Node<'_>> = body.named_children(&mut cursor).collect();
        for child in children {
            if self.language.definition_node_kinds().contains(&child.kind()) {
                self.definition(child, Some(parent));
            }
        }
    }

    fn leaf_kind(&self, node_kind: &str, nested: bool) -> ChunkKind {
        match node_kind {
            "function_item" | "function_definition" | "function_declaration"
            | "generator_function_declaration" => {
                if nested {
                    ChunkKind::Method
                } else {
                    ChunkKind::Function
                }
            }
            "method_definition" => ChunkKind::Method,
            "struct_item" => ChunkKind::Struct,
            "enum_item" | "enum_declaration" => ChunkKind::Enum,
            "trait_item" => ChunkKind::Trait,
            "class_definition" | "class_declaration" => ChunkKind::Class,
            "interface_declaration" => ChunkKind::Interface,
            "type_alias_declaration" => ChunkKind::TypeAlias,
            "macro_definition" => ChunkKind::Macro,
            _ => ChunkKind::Block,
        }
    }

    fn emit_named(
        &mut self,
        span: Node<'_>,
        named: Node<'_>,
        kind: ChunkKind,
        parent: Option<&str>,
    ) {
        let content = self.content;
        let Some(text) = node_text(content, span) else {
            return;
        };
        let name = name_of(content, named).unwrap_or("_");
        let symbol_path = match parent {
            Some(prefix) => format!("{prefix}::{name}"),
            None => name.to_string(),
        };
        self.chunks.push(Chunk::named(
            self.file_path,
            kind,
            symbol_path,
            span.start_byte()..span.end_byte(),
            (span.start_position().row + 1)..(span.end_position().row + 1),
            self.language.as_str(),
            text,
        ));
    }

    fn emit_gap(&mut self, start: usize, end: usize) {
        if !self.include_blocks || end <= start {
            return;
        }
        let content = self.content;
        let Some(raw) = content.get(start..end) else {
            return;
        };
        if raw.trim().is_empty() {
            return;
        }
        let start_line = content[..start].lines().count().max(1);
        let end_line = start_line + raw.trim_end().lines().count().saturating_sub(1);
        let ordinal = self.block_ordinal;
        self.block_ordinal += 1;
        self.chunks.push(Chunk::anonymous(
            self.file_path,
            ChunkKind::Block,
            ordinal,
            start..end,
            start_line..end_line.max(start_line),
            self.language.as_str(),
            raw,
        ));
    }
}
