use crate::fingerprints::{ChunkFingerprint, FileSnapshot};
use scout_chunker::{Chunk, ChunkId};
use std::collections::HashMap;

/// Minimal add/update/remove set bringing one file's indexed state up to
/// date. Constructed by [`diff`], consumed exactly once by the Coordinator.
#[derive(Debug, Clone)]
pub struct Changeset {
    pub file_path: String,
    /// Chunks whose id did not exist in the previous snapshot
    pub adds: Vec<Chunk>,
    /// Chunks whose id existed but whose content changed (full replacement
    /// under the same id)
    pub updates: Vec<Chunk>,
    /// Ids present previously and gone now
    pub removes: Vec<ChunkId>,
    /// File fingerprint the diff was computed against; `None` for a
    /// first-time index. Must still match the Fingerprint Store at commit
    /// time or the changeset is stale.
    pub base_fingerprint: Option<String>,
    /// Fingerprint of the current content; `None` when the file was deleted.
    pub new_fingerprint: Option<String>,
    /// Full ordered fingerprint list of the current chunk set, recorded so
    /// the Coordinator can write the post-commit snapshot without re-reading
    /// unchanged chunk bodies.
    pub current_chunks: Vec<ChunkFingerprint>,
}

impl Changeset {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adds.is_empty() && self.updates.is_empty() && self.removes.is_empty()
    }

    #[must_use]
    pub fn is_deletion(&self) -> bool {
        self.new_fingerprint.is_none()
    }
}

/// Compare freshly extracted chunks against the last committed snapshot.
///
/// Ids only in `current` become adds; only in `previous` become removes;
/// in both with differing content hashes become updates. Equal hashes are
/// excluded entirely, so unchanged code is never re-embedded.
#[must_use]
pub fn diff(
    file_path: &str,
    previous: Option<&FileSnapshot>,
    current: Vec<Chunk>,
    new_fingerprint: Option<String>,
) -> Changeset {
    let current = disambiguate_ids(file_path, current);

    let previous_hashes: HashMap<&ChunkId, &str> = previous
        .map(|snap| {
            snap.chunks
                .iter()
                .map(|fp| (&fp.chunk_id, fp.content_hash.as_str()))
                .collect()
        })
        .unwrap_or_default();

    let mut adds = Vec::new();
    let mut updates = Vec::new();
    for chunk in &current {
        match previous_hashes.get(&chunk.chunk_id) {
            None => adds.push(chunk.clone()),
            Some(prev_hash) if *prev_hash != chunk.content_hash => updates.push(chunk.clone()),
            Some(_) => {}
        }
    }

    let removes: Vec<ChunkId> = previous
        .map(|snap| {
            snap.chunks
                .iter()
                .filter(|fp| !current.iter().any(|c| c.chunk_id == fp.chunk_id))
                .map(|fp| fp.chunk_id.clone())
                .collect()
        })
        .unwrap_or_default();

    Changeset {
        file_path: file_path.to_string(),
        adds,
        updates,
        removes,
        base_fingerprint: previous.map(|snap| snap.file_fingerprint.clone()),
        new_fingerprint,
        current_chunks: current.iter().map(ChunkFingerprint::from).collect(),
    }
}

/// Within one committed snapshot chunk ids must be unique. When a slot is
/// occupied more than once (e.g. a symbol defined twice in the same file),
/// later occurrences get a derived id folding in their occurrence ordinal.
/// Source order is stable across extractions, so the derived ids are too,
/// and every occurrence stays searchable.
fn disambiguate_ids(file_path: &str, current: Vec<Chunk>) -> Vec<Chunk> {
    let mut counts: HashMap<ChunkId, usize> = HashMap::new();
    let mut out: Vec<Chunk> = Vec::with_capacity(current.len());
    for mut chunk in current {
        let seen = counts.entry(chunk.chunk_id.clone()).or_insert(0);
        *seen += 1;
        if *seen > 1 {
            log::warn!(
                "Duplicate chunk id in {file_path} for {:?}; assigning occurrence {}",
                chunk.symbol_path,
                *seen
            );
            chunk.chunk_id = chunk.chunk_id.disambiguated(*seen - 1);
        }
        out.push(chunk);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprints::file_fingerprint;
    use pretty_assertions::assert_eq;
    use scout_chunker::ChunkKind;

    fn chunk(symbol: &str, text: &str) -> Chunk {
        Chunk::named("a.py", ChunkKind::Function, symbol, 0..text.len(), 1..2, "python", text)
    }

    fn snapshot(content: &str, chunks: &[Chunk]) -> FileSnapshot {
        FileSnapshot::from_chunks(file_fingerprint(content), chunks)
    }

    #[test]
    fn first_index_is_all_adds() {
        let current = vec![chunk("f", "def f(): pass"), chunk("g", "def g(): pass")];
        let out = diff("a.py", None, current, Some(file_fingerprint("v1")));

        assert_eq!(out.adds.len(), 2);
        assert!(out.updates.is_empty());
        assert!(out.removes.is_empty());
        assert_eq!(out.base_fingerprint, None);
        assert_eq!(out.current_chunks.len(), 2);
    }

    #[test]
    fn unchanged_file_yields_empty_changeset() {
        let chunks = vec![chunk("f", "def f(): pass")];
        let prev = snapshot("v1", &chunks);
        let out = diff("a.py", Some(&prev), chunks, Some(file_fingerprint("v1")));

        assert!(out.is_empty());
        assert!(!out.is_deletion());
    }

    #[test]
    fn edited_body_is_one_update_with_same_id() {
        let before = chunk("f", "def f(): return 1");
        let after = chunk("f", "def f(): return 2");
        assert_eq!(before.chunk_id, after.chunk_id);

        let prev = snapshot("v1", &[before]);
        let out = diff("a.py", Some(&prev), vec![after.clone()], Some(file_fingerprint("v2")));

        assert!(out.adds.is_empty());
        assert!(out.removes.is_empty());
        assert_eq!(out.updates.len(), 1);
        assert_eq!(out.updates[0].chunk_id, after.chunk_id);
    }

    #[test]
    fn deleted_function_is_a_remove() {
        let f = chunk("f", "def f(): pass");
        let g = chunk("g", "def g(): pass");
        let prev = snapshot("v1", &[f.clone(), g.clone()]);

        let out = diff("a.py", Some(&prev), vec![f], Some(file_fingerprint("v2")));

        assert!(out.adds.is_empty());
        assert!(out.updates.is_empty());
        assert_eq!(out.removes, vec![g.chunk_id]);
    }

    #[test]
    fn deleted_file_removes_every_chunk()  {
        let f = chunk("f", "def f(): pass");
        let g = chunk("g", "def g(): pass");
        let prev = snapshot("v1", &[f.clone(), g.clone()]);

        let out = diff("a.py", Some(&prev), vec![], None);

        assert!(out.adds.is_empty());
        assert!(out.updates.is_empty());
        assert_eq!(out.removes.len(), 2);
        assert!(out.is_deletion());
        assert!(out.current_chunks.is_empty());
    }

    #[test]
    fn mixed_edit_produces_minimal_changeset() {
        let f = chunk("f", "def f(): return 1");
        let g = chunk("g", "def g(): pass");
        let prev = snapshot("v1", &[f.clone(), g.clone()]);

        let f_edited = chunk("f", "def f(): return 99");
        let h_new = chunk("h", "def h(): pass");
        let out = diff(
            "a.py",
            Some(&prev),
            vec![f_edited, g.clone(), h_new.clone()],
            Some(file_fingerprint("v2")),
        );

        assert_eq!(out.adds.len(), 1);
        assert_eq!(out.adds[0].chunk_id, h_new.chunk_id);
        assert_eq!(out.updates.len(), 1);
        assert_eq!(out.updates[0].chunk_id, f.chunk_id);
        assert!(out.removes.is_empty());
        // Unchanged g appears in the snapshot but not in the changeset.
        assert_eq!(out.current_chunks.len(), 3);
    }

    #[test]
    fn redefined_symbol_keeps_both_bodies_under_distinct_ids() {
        let a = chunk("f", "def f(): return 1");
        let b = chunk("f", "def f(): return 2");
        let out = diff(
            "a.py",
            None,
            vec![a.clone(), b.clone()],
            Some(file_fingerprint("v1")),
        );

        assert_eq!(out.adds.len(), 2);
        assert_eq!(out.current_chunks.len(), 2);
        assert_eq!(out.adds[0].chunk_id, a.chunk_id);
        assert_ne!(out.adds[1].chunk_id, a.chunk_id);
        assert_eq!(out.adds[1].content_hash, b.content_hash);

        // Re-extracting the same source yields the same derived ids, so a
        // no-change pass still diffs to empty.
        let snap = FileSnapshot::from_fingerprints(
            file_fingerprint("v1"),
            out.current_chunks.clone(),
        );
        let again = diff("a.py", Some(&snap), vec![a, b], Some(file_fingerprint("v1")));
        assert!(again.is_empty());
    }
}
