//! Reindex operation (`spec.md` §4.5, §6 `reindex()`): the C1+C4+C5
//! pipeline that re-derives embeddings for notes whose content changed and
//! upserts them into the [`SemanticIndex`].

use crate::embeddings::Embedder;
use crate::error::Result;
use crate::exclusions::ExclusionRegistry;
use crate::semantic_index::SemanticIndex;
use crate::vault::{Category, NoteId, VaultReader};

use std::path::Path;

/// `spec.md` §6: `reindex() → ReindexReport`.
#[derive(Debug, Clone, Default)]
pub struct ReindexReport {
    pub scanned: usize,
    pub embedded: usize,
    pub skipped_excluded: usize,
    pub failed: usize,
}

pub struct Reindexer<'a> {
    pub reader: &'a VaultReader,
    pub embedder: &'a dyn Embedder,
    pub index: &'a SemanticIndex,
}

impl<'a> Reindexer<'a> {
    /// Walks the vault (C1) skipping excluded subtrees, embeds every
    /// note's body (C4), and upserts the embedding keyed by note id (C5).
    /// A single note's embedding failure is logged and does not abort the
    /// sweep (`spec.md` §7 degrade-on-embedder-failure applies per-note
    /// here, same as during planning).
    pub fn reindex(&self, vault_root: &Path, exclusions: &ExclusionRegistry) -> Result<ReindexReport> {
        // `list_notes(.., false)` already omits excluded paths, so
        // `skipped_excluded` stays informational rather than load-bearing.
        let (notes, _warnings) = self.reader.list_notes(vault_root, exclusions, false)?;
        let mut report = ReindexReport {
            scanned: notes.len(),
            ..Default::default()
        };

        for note in &notes {
            match self.embedder.embed(&note.raw_text) {
                Ok(embedding) => {
                    let category = locate_category(note.path.as_path(), vault_root)
                        .unwrap_or(Category::Unknown);
                    if let Err(e) = self.index.upsert(
                        note.id,
                        Some(&embedding),
                        "",
                        category,
                        note.current_folder_name.as_deref(),
                    ) {
                        tracing::warn!(note_id = %note.id, error = %e, "failed to upsert reindexed entry");
                        report.failed += 1;
                    } else {
                        report.embedded += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!(note_id = %note.id, error = %e, "embedder failed during reindex, leaving stale entry");
                    report.failed += 1;
                    let _ = mark_needs_reembed(self.index, note.id);
                }
            }
        }

        Ok(report)
    }
}

fn mark_needs_reembed(index: &SemanticIndex, note_id: NoteId) -> Result<()> {
    if let Some(existing) = index.get(note_id)? {
        index.upsert(
            note_id,
            None,
            "",
            existing.assigned_category,
            existing.folder_name.as_deref(),
        )?;
    }
    Ok(())
}

fn locate_category(path: &Path, vault_root: &Path) -> Option<Category> {
    let relative = path.strip_prefix(vault_root).ok()?;
    let top = relative.components().next()?;
    Category::from_folder_prefix(top.as_os_str().to_str()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::NullEmbedder;

    #[test]
    fn reindex_embeds_all_unexcluded_notes() {
        let vault = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(vault.path().join("00-Inbox")).unwrap();
        std::fs::write(vault.path().join("00-Inbox/a.md"), "hello world").unwrap();
        std::fs::write(vault.path().join("00-Inbox/b.md"), "goodbye world").unwrap();

        let reader = VaultReader::default();
        let embedder = NullEmbedder::default();
        let index = SemanticIndex::open_in_memory(embedder.dimensions()).unwrap();
        let exclusions = ExclusionRegistry::new_in_memory();

        let reindexer = Reindexer {
            reader: &reader,
            embedder: &embedder,
            index: &index,
        };

        let report = reindexer.reindex(vault.path(), &exclusions).unwrap();
        assert_eq!(report.scanned, 2);
        assert_eq!(report.embedded, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(index.len().unwrap(), 2);
    }

    #[test]
    fn reindex_skips_excluded_paths() {
        let vault = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(vault.path().join("00-Inbox")).unwrap();
        std::fs::write(vault.path().join("00-Inbox/a.md"), "hello world").unwrap();

        let reader = VaultReader::default();
        let embedder = NullEmbedder::default();
        let index = SemanticIndex::open_in_memory(embedder.dimensions()).unwrap();
        let mut exclusions = ExclusionRegistry::new_in_memory();
        exclusions
            .add(&vault.path().join("00-Inbox/a.md"), "test")
            .unwrap();

        let reindexer = Reindexer {
            reader: &reader,
            embedder: &embedder,
            index: &index,
        };

        let report = reindexer.reindex(vault.path(), &exclusions).unwrap();
        assert_eq!(report.scanned, 0);
        assert_eq!(report.embedded, 0);
        assert_eq!(index.len().unwrap(), 0);
    }
}
