//! Single-document JSON configuration (`spec.md` §6).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, ErrorKind, Result};

/// The recognized configuration options from `spec.md` §6, "Configuration".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub vault_path: Option<PathBuf>,
    pub index_path: Option<PathBuf>,
    pub snapshot_path: Option<PathBuf>,
    pub embedding_model: String,
    pub llm_model: String,
    pub llm_endpoint: String,
    pub auto_backup: bool,
    pub exclusions: Vec<PathBuf>,
    pub max_notes_per_run: Option<usize>,
    pub neighbor_k: usize,
    pub recent_history_n: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vault_path: None,
            index_path: None,
            snapshot_path: None,
            embedding_model: "nomic-ai/nomic-embed-text-v1.5".to_string(),
            llm_model: "llama3.1:8b".to_string(),
            llm_endpoint: "http://localhost:11434/api/chat".to_string(),
            auto_backup: true,
            exclusions: Vec::new(),
            max_notes_per_run: None,
            neighbor_k: 5,
            recent_history_n: 1000,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| {
            CoreError::new(ErrorKind::PreconditionFailure, format!("invalid config: {e}"))
                .with_remediation(format!("fix or remove {}", path.display()))
        })
    }

    /// Loads from `path` if it exists, otherwise returns the default configuration.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self).map_err(|e| {
            CoreError::new(ErrorKind::PreconditionFailure, format!("cannot serialize config: {e}"))
        })?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Resolves the vault root, failing with `PreconditionFailure` if unset.
    ///
    /// Autodiscovery of an unset `vault_path` is a CLI collaborator concern
    /// (`spec.md` §1 lists "interactive vault-discovery UI" as out of scope).
    pub fn require_vault_path(&self) -> Result<&Path> {
        self.vault_path.as_deref().ok_or_else(|| {
            CoreError::precondition("no vault_path configured")
                .with_remediation("set vault_path in the configuration document")
        })
    }

    pub fn index_path(&self, vault: &Path) -> PathBuf {
        self.index_path
            .clone()
            .unwrap_or_else(|| vault.join(".para").join("index"))
    }

    pub fn snapshot_path(&self, vault: &Path) -> PathBuf {
        self.snapshot_path
            .clone()
            .unwrap_or_else(|| vault.join(".para").join("snapshots"))
    }
}
