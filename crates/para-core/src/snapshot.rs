//! Snapshot Store (C11, `spec.md` §4.11 rollback, §3 "Snapshot").

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::exclusions::ExclusionRegistry;

/// `spec.md` §3: "Contains a complete copy of the vault tree (excluding
/// excluded subtrees) plus a manifest: id, created_at, reason, file_count,
/// size_bytes, source_vault_path."
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub reason: String,
    pub file_count: usize,
    pub size_bytes: u64,
    pub source_vault_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct RestoreReport {
    pub snapshot_id: String,
    pub files_restored: usize,
}

/// `spec.md` §6: "Stored as a directory per id with a `manifest.json` and
/// the copied tree. Ids are stable strings `<timestamp>_<reason>`."
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn snapshot_id(now: DateTime<Utc>, reason: &str) -> String {
        let slug: String = reason
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '-' })
            .collect();
        format!("{}_{}", now.format("%Y%m%dT%H%M%SZ"), slug)
    }

    /// `spec.md` §4.11 step 1 and §8 P2: the caller must create the
    /// snapshot strictly before any move in the plan it guards.
    pub fn create(
        &self,
        vault_root: &Path,
        reason: &str,
        exclusions: &ExclusionRegistry,
    ) -> Result<SnapshotManifest> {
        let created_at = Utc::now();
        let id = Self::snapshot_id(created_at, reason);
        let snapshot_dir = self.root.join(&id);
        std::fs::create_dir_all(&snapshot_dir)?;

        let (file_count, size_bytes) =
            copy_tree_excluding(vault_root, &snapshot_dir.join("tree"), exclusions)?;

        let manifest = SnapshotManifest {
            id: id.clone(),
            created_at,
            reason: reason.to_string(),
            file_count,
            size_bytes,
            source_vault_path: vault_root.to_path_buf(),
        };

        let manifest_json = serde_json::to_string_pretty(&manifest)
            .map_err(|e| CoreError::integrity(format!("cannot serialize manifest: {e}")))?;
        std::fs::write(snapshot_dir.join("manifest.json"), manifest_json)?;

        Ok(manifest)
    }

    pub fn manifest(&self, id: &str) -> Result<SnapshotManifest> {
        let path = self.root.join(id).join("manifest.json");
        let text = std::fs::read_to_string(&path).map_err(|_| {
            CoreError::integrity(format!("no such snapshot: {id}"))
        })?;
        serde_json::from_str(&text)
            .map_err(|e| CoreError::integrity(format!("corrupt manifest for {id}: {e}")))
    }

    pub fn list(&self) -> Result<Vec<SnapshotManifest>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut manifests = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    if let Ok(manifest) = self.manifest(name) {
                        manifests.push(manifest);
                    }
                }
            }
        }
        manifests.sort_by_key(|m| m.created_at);
        Ok(manifests)
    }

    /// `spec.md` §4.11: "Rollback: restoring a snapshot is a file-level
    /// copy back to the source vault path; the semantic index is
    /// invalidated for affected notes and re-upserted on the next sweep."
    /// Index invalidation is the caller's responsibility (it owns the
    /// `SemanticIndex` handle); this restores the tree only.
    pub fn restore(&self, id: &str) -> Result<RestoreReport> {
        let manifest = self.manifest(id)?;
        let tree_path = self.root.join(id).join("tree");
        let files_restored = copy_tree_plain(&tree_path, &manifest.source_vault_path)?;
        Ok(RestoreReport {
            snapshot_id: id.to_string(),
            files_restored,
        })
    }
}

fn copy_tree_excluding(
    source: &Path,
    dest: &Path,
    exclusions: &ExclusionRegistry,
) -> Result<(usize, u64)> {
    std::fs::create_dir_all(dest)?;
    let mut file_count = 0usize;
    let mut size_bytes = 0u64;

    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        let path = entry.path();
        let absolute = path.canonicalize().unwrap_or_else(|_| path.clone());
        if exclusions.contains(&absolute) {
            continue;
        }
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            let (sub_count, sub_size) = copy_tree_excluding(&path, &target, exclusions)?;
            file_count += sub_count;
            size_bytes += sub_size;
        } else {
            std::fs::copy(&path, &target)?;
            file_count += 1;
            size_bytes += entry.metadata()?.len();
        }
    }

    Ok((file_count, size_bytes))
}

fn copy_tree_plain(source: &Path, dest: &Path) -> Result<usize> {
    std::fs::create_dir_all(dest)?;
    let mut file_count = 0usize;
    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        let path = entry.path();
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            file_count += copy_tree_plain(&path, &target)?;
        } else {
            std::fs::copy(&path, &target)?;
            file_count += 1;
        }
    }
    Ok(file_count)
}
