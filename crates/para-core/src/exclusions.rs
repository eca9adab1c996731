//! Exclusion Registry (C2, `spec.md` §4.2).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, ErrorKind, Result};

/// `spec.md` §3, "Exclusion Entry".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExclusionEntry {
    pub path: PathBuf,
    pub added_at: DateTime<Utc>,
    pub reason: String,
}

/// Persisted as a single JSON document (`spec.md` §4.2). Keyed by the
/// normalized-absolute-path string so `contains` can prefix-match without
/// rescanning a list on every call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RegistryDocument {
    entries: BTreeMap<String, ExclusionEntry>,
    /// Set once the caller has explicitly confirmed the registry state for
    /// this vault, even if `entries` is empty (`spec.md` §4.2: "either
    /// non-empty or explicitly confirmed empty by the caller").
    confirmed_empty: bool,
}

pub struct ExclusionRegistry {
    doc: RegistryDocument,
    backing_path: Option<PathBuf>,
}

fn normalize(path: &Path) -> PathBuf {
    let resolved = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if cfg!(target_os = "windows") || cfg!(target_os = "macos") {
        PathBuf::from(resolved.to_string_lossy().to_lowercase())
    } else {
        resolved
    }
}

fn normalize_key(path: &Path) -> String {
    normalize(path).to_string_lossy().into_owned()
}

impl ExclusionRegistry {
    /// Loads the registry document from `path`, or starts an empty
    /// (unconfirmed) registry if no document exists yet.
    pub fn load(path: &Path) -> Result<Self> {
        let doc = if path.exists() {
            let text = std::fs::read_to_string(path)?;
            serde_json::from_str(&text).map_err(|e| {
                CoreError::integrity(format!("corrupt exclusion registry: {e}"))
            })?
        } else {
            RegistryDocument::default()
        };
        Ok(Self {
            doc,
            backing_path: Some(path.to_path_buf()),
        })
    }

    /// An unpersisted registry, useful for tests and for sessions that
    /// manage their own persistence cadence.
    pub fn new_in_memory() -> Self {
        Self {
            doc: RegistryDocument::default(),
            backing_path: None,
        }
    }

    fn persist(&self) -> Result<()> {
        let Some(path) = &self.backing_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(&self.doc)
            .map_err(|e| CoreError::integrity(format!("cannot serialize exclusions: {e}")))?;
        std::fs::write(path, text)?;
        Ok(())
    }

    pub fn add(&mut self, path: &Path, reason: impl Into<String>) -> Result<()> {
        let key = normalize_key(path);
        self.doc.entries.insert(
            key,
            ExclusionEntry {
                path: normalize(path),
                added_at: Utc::now(),
                reason: reason.into(),
            },
        );
        self.persist()
    }

    pub fn remove(&mut self, path: &Path) -> Result<bool> {
        let key = normalize_key(path);
        let removed = self.doc.entries.remove(&key).is_some();
        if removed {
            self.persist()?;
        }
        Ok(removed)
    }

    pub fn clear(&mut self) -> Result<()> {
        self.doc.entries.clear();
        self.persist()
    }

    pub fn list(&self) -> impl Iterator<Item = &ExclusionEntry> {
        self.doc.entries.values()
    }

    /// Prefix-match: `path` is excluded iff it equals or descends an entry.
    pub fn contains(&self, path: &Path) -> bool {
        let key = normalize_key(path);
        self.doc.entries.keys().any(|entry_key| {
            key == *entry_key
                || key
                    .strip_prefix(entry_key)
                    .map(|rest| rest.starts_with(std::path::MAIN_SEPARATOR))
                    .unwrap_or(false)
        })
    }

    /// Marks the registry as explicitly configured for this session even
    /// with zero entries.
    pub fn confirm_empty(&mut self) -> Result<()> {
        self.doc.confirmed_empty = true;
        self.persist()
    }

    /// `spec.md` §4.2: "Before any classification run the registry must be
    /// 'configured'... the planner raises `ExclusionsNotConfigured`
    /// otherwise."
    pub fn ensure_configured(&self) -> Result<()> {
        if self.doc.entries.is_empty() && !self.doc.confirmed_empty {
            return Err(CoreError::new(
                ErrorKind::PreconditionFailure,
                "exclusion registry is not configured",
            )
            .with_remediation(
                "add at least one exclusion, or call confirm_empty() to proceed with none",
            ));
        }
        Ok(())
    }

    /// Pure suggestion heuristic: common personal-data folder name patterns
    /// worth excluding, never auto-applied. A caller decides whether to
    /// `add` any of these.
    pub fn suggest_defaults(vault_path: &Path) -> Vec<PathBuf> {
        const PATTERNS: &[&str] = &[
            "Templates",
            "Attachments",
            "attachments",
            ".obsidian",
            ".trash",
            "Daily",
            "Dailies",
            "Personal",
            "Private",
            "Journal",
        ];

        let mut suggestions = Vec::new();
        let Ok(entries) = std::fs::read_dir(vault_path) else {
            return suggestions;
        };
        for entry in entries.flatten() {
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if !file_type.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let matches = PATTERNS.iter().any(|pattern| {
                name.eq_ignore_ascii_case(pattern)
                    || name
                        .to_lowercase()
                        .starts_with(&pattern.to_lowercase())
            });
            if matches {
                suggestions.push(entry.path());
            }
        }
        suggestions.sort();
        suggestions
    }
}
