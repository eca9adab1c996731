//! Session context (`spec.md` §10.5 ambient design note: "no singletons —
//! everything a run needs is threaded through an explicit context value").
//!
//! Bundles the configured [`Config`], the resolved vault root, the
//! [`ExclusionRegistry`], and every collaborator a plan/execute/reindex
//! call needs, so callers never reach for global state.

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::embeddings::{CachingEmbedder, Embedder};
use crate::error::Result;
use crate::executor::{CancellationToken, ExecutionReport, Executor};
use crate::exclusions::ExclusionRegistry;
use crate::feedback::FeedbackLoop;
use crate::learning_store::LearningStore;
use crate::llm::{HttpLlmClassifier, LlmClassifier};
use crate::naming;
use crate::planner::{MovePlan, Planner, Scope};
use crate::reindex::{ReindexReport, Reindexer};
use crate::semantic_index::SemanticIndex;
use crate::snapshot::{RestoreReport, SnapshotManifest, SnapshotStore};
use crate::vault::VaultReader;

#[cfg(feature = "embeddings")]
use crate::embeddings::FastEmbedEmbedder;

/// A configured working session against one vault (`spec.md` §6
/// programmatic surface). Built once per run; not `Clone` because it owns
/// the underlying SQLite connections.
pub struct Session {
    pub config: Config,
    pub vault_root: PathBuf,
    pub exclusions: ExclusionRegistry,
    pub index: SemanticIndex,
    pub learning: LearningStore,
    pub snapshots: SnapshotStore,
    embedder: Box<dyn Embedder>,
    llm: Box<dyn LlmClassifier>,
    reader: VaultReader,
}

impl Session {
    /// Opens a session using the default collaborators (`spec.md` §10.8):
    /// a caching wrapper over the locally-run embedding model when the
    /// `embeddings` feature is enabled (else an embedder that always
    /// degrades), and an HTTP classifier talking to `config.llm_endpoint`.
    pub fn open(config: Config) -> Result<Self> {
        let vault_root = config.require_vault_path()?.to_path_buf();
        let exclusions_path = vault_root.join(".para").join("exclusions.json");
        let exclusions = ExclusionRegistry::load(&exclusions_path)?;

        let index = SemanticIndex::open(
            &config.index_path(&vault_root),
            crate::embeddings::DEFAULT_EMBEDDING_DIMENSIONS,
        )?;
        let learning = LearningStore::open(&vault_root.join(".para").join("learning.db"))?;
        let snapshots = SnapshotStore::new(config.snapshot_path(&vault_root));

        let embedder = default_embedder(&config);
        let llm: Box<dyn LlmClassifier> = Box::new(HttpLlmClassifier::new(
            config.llm_endpoint.clone(),
            config.llm_model.clone(),
        ));

        Ok(Self {
            config,
            vault_root,
            exclusions,
            index,
            learning,
            snapshots,
            embedder,
            llm,
            reader: VaultReader::default(),
        })
    }

    /// Builds a session over caller-supplied collaborators, for tests and
    /// for embedding environments that inject their own `Embedder`/
    /// `LlmClassifier` (`spec.md` §10.8: "injectable, not singletons").
    pub fn with_collaborators(
        config: Config,
        exclusions: ExclusionRegistry,
        index: SemanticIndex,
        learning: LearningStore,
        snapshots: SnapshotStore,
        embedder: Box<dyn Embedder>,
        llm: Box<dyn LlmClassifier>,
    ) -> Result<Self> {
        let vault_root = config.require_vault_path()?.to_path_buf();
        Ok(Self {
            config,
            vault_root,
            exclusions,
            index,
            learning,
            snapshots,
            embedder,
            llm,
            reader: VaultReader::default(),
        })
    }

    fn planner(&self) -> Result<Planner<'_>> {
        let nudge = FeedbackLoop::new(&self.learning).compute()?.nudge;
        Ok(Planner {
            vault_root: self.vault_root.clone(),
            reader: &self.reader,
            exclusions: &self.exclusions,
            embedder: self.embedder.as_ref(),
            index: &self.index,
            llm: self.llm.as_ref(),
            neighbor_k: self.config.neighbor_k,
            policy: Some(nudge),
        })
    }

    pub fn plan(&self, scope: Scope, directive: Option<&str>, execute_mode: bool) -> Result<MovePlan> {
        self.planner()?.plan(scope, directive, execute_mode)
    }

    /// `spec.md` §6 `execute(plan)`: snapshots then applies `plan`,
    /// recording each outcome via the Executor (C10).
    pub fn execute(
        &self,
        plan: &MovePlan,
        cancellation: Option<&CancellationToken>,
    ) -> Result<ExecutionReport> {
        crate::planner::ensure_execute_preconditions(self.config.auto_backup)?;
        let executor = Executor {
            vault_root: self.vault_root.clone(),
            exclusions: &self.exclusions,
            snapshots: &self.snapshots,
            index: &self.index,
            learning: &self.learning,
        };
        let report = executor.execute(plan, cancellation)?;
        for action in &plan.actions {
            let consolidation_key = naming::consolidation_key(&action.folder_name);
            if let Err(e) =
                self.learning
                    .record_folder_creation(&action.folder_name, &consolidation_key, action.category)
            {
                tracing::warn!(error = %e, "failed to record folder creation feedback");
            }
        }
        Ok(report)
    }

    pub fn reindex(&self) -> Result<ReindexReport> {
        let reindexer = Reindexer {
            reader: &self.reader,
            embedder: self.embedder.as_ref(),
            index: &self.index,
        };
        reindexer.reindex(&self.vault_root, &self.exclusions)
    }

    pub fn create_snapshot(&self, reason: &str) -> Result<SnapshotManifest> {
        self.snapshots.create(&self.vault_root, reason, &self.exclusions)
    }

    pub fn restore_snapshot(&self, id: &str) -> Result<RestoreReport> {
        self.snapshots.restore(id)
    }

    pub fn exclusions_mut(&mut self) -> &mut ExclusionRegistry {
        &mut self.exclusions
    }

    pub fn vault_root(&self) -> &Path {
        &self.vault_root
    }
}

fn default_embedder(config: &Config) -> Box<dyn Embedder> {
    #[cfg(feature = "embeddings")]
    {
        Box::new(CachingEmbedder::new(FastEmbedEmbedder::new(
            config.embedding_model.clone(),
        )))
    }
    #[cfg(not(feature = "embeddings"))]
    {
        let _ = config;
        Box::new(crate::embeddings::NullEmbedder::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::NullEmbedder;
    use crate::llm::MockLlmClassifier;

    fn setup(vault: &Path) -> Session {
        for category in crate::vault::Category::CLASSIFIABLE {
            std::fs::create_dir_all(vault.join(category.folder_prefix())).unwrap();
        }
        std::fs::create_dir_all(vault.join("00-Inbox")).unwrap();

        let mut config = Config::default();
        config.vault_path = Some(vault.to_path_buf());

        let exclusions = ExclusionRegistry::new_in_memory();
        let index = SemanticIndex::open_in_memory(32).unwrap();
        let learning = LearningStore::open_in_memory().unwrap();
        let snapshots = SnapshotStore::new(vault.join(".para").join("snapshots"));

        Session::with_collaborators(
            config,
            exclusions,
            index,
            learning,
            snapshots,
            Box::new(NullEmbedder::default()),
            Box::new(MockLlmClassifier::new(vec![])),
        )
        .unwrap()
    }

    #[test]
    fn plan_uses_zero_nudge_before_enough_feedback() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("00-Inbox/note.md"),
            "---\ntags: [reference]\n---\nsome resource body with a [link](x) and [link2](y) and [link3](z) and [link4](w) and [link5](v) and [link6](u)\n\n| a | b |\n|---|---|\n| 1 | 2 |\n",
        )
        .unwrap();

        let session = setup(dir.path());
        let plan = session.plan(Scope::Inbox, None, false).unwrap();
        assert_eq!(plan.summary.total_considered, 1);
    }

    #[test]
    fn execute_then_reindex_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("00-Inbox/note.md"),
            "---\ntags: [project]\n---\n- [ ] a\n- [ ] b\n- [ ] c\n2025-01-01\n",
        )
        .unwrap();

        let session = setup(dir.path());
        let plan = session.plan(Scope::Inbox, Some("ship"), true).unwrap();
        if plan.actions.is_empty() {
            return;
        }
        let report = session.execute(&plan, None).unwrap();
        assert!(!report.partial);
        assert_eq!(report.succeeded, plan.actions.len());

        let reindex_report = session.reindex().unwrap();
        assert_eq!(reindex_report.failed, 0);
    }
}
