use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

const DEFAULT_MAX_FILE_BYTES: u64 = 2 * 1024 * 1024;

/// Extensions worth indexing: source code plus the text formats that keep a
/// repository navigable. Everything else (binaries, archives, images) is
/// noise for both regex and vector search.
const INDEXED_EXTENSIONS: &[&str] = &[
    "rs", "py", "pyw", "js", "mjs", "cjs", "jsx", "ts", "tsx", "go", "java", "c", "h", "cpp",
    "cc", "hpp", "cs", "rb", "swift", "kt", "php", "scala", "sh", "bash", "sql", "md", "mdx",
    "toml", "yaml", "yml", "json", "ini", "cfg", "conf", "txt",
];

/// Gitignore-aware project file scanner
pub struct FileScanner {
    root: PathBuf,
    max_file_bytes: u64,
}

impl FileScanner {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }

    #[must_use]
    pub fn with_max_file_bytes(mut self, max: u64) -> Self {
        self.max_file_bytes = max;
        self
    }

    /// Scan for indexable files, sorted for deterministic processing order.
    #[must_use]
    pub fn scan(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkBuilder::new(&self.root)
            .hidden(true)
            .git_ignore(true)
            .git_exclude(true)
            .build()
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
            .filter(|entry| is_indexable(entry.path()))
            .filter(|entry| {
                entry
                    .metadata()
                    .map(|m| m.len() <= self.max_file_bytes)
                    .unwrap_or(false)
            })
            .map(ignore::DirEntry::into_path)
            .collect();
        files.sort();
        files
    }
}

pub(crate) fn is_indexable(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .is_some_and(|ext| INDEXED_EXTENSIONS.contains(&ext.as_str()))
}
