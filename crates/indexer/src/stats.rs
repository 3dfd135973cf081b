use serde::{Deserialize, Serialize};

/// Aggregated result of one indexing pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexStats {
    pub files: usize,
    pub chunks_added: usize,
    pub chunks_updated: usize,
    pub chunks_removed: usize,
    pub files_unchanged: usize,
    pub files_removed: usize,
    pub errors: Vec<String>,
    pub time_ms: u64,
}

impl IndexStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_commit(&mut self, result: &crate::coordinator::CommitResult) {
        self.files += 1;
        if result.no_op {
            self.files_unchanged += 1;
        }
        self.chunks_added += result.added;
        self.chunks_updated += result.updated;
        self.chunks_removed += result.removed;
    }

    pub fn record_removal(&mut self, result: &crate::coordinator::CommitResult) {
        self.files_removed += 1;
        self.chunks_removed += result.removed;
    }

    pub fn add_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    #[must_use]
    pub fn total_mutations(&self) -> usize {
        self.chunks_added + self.chunks_updated + self.chunks_removed
    }
}
