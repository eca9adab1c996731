//! Executor (C10, `spec.md` §4.11).

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::exclusions::ExclusionRegistry;
use crate::learning_store::{DecisionInput, LearningStore};
use crate::planner::{MovePlan, PlannedAction};
use crate::semantic_index::SemanticIndex;
use crate::snapshot::SnapshotStore;
use crate::vault::NoteId;

/// Cooperative cancellation signal checked between moves, never mid-move
/// (`spec.md` §5: "aborts the executor between moves (never mid-move —
/// moves are atomic filesystem operations)").
#[derive(Clone, Default)]
pub struct CancellationToken(std::sync::Arc<std::sync::atomic::AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(std::sync::atomic::Ordering::SeqCst)
    }
}

/// One action that failed to apply (`spec.md` §4.13: "Single-file move
/// failures are logged and the plan continues with the remaining
/// actions").
#[derive(Debug, Clone)]
pub struct FailedAction {
    pub note_id: NoteId,
    pub from_path: PathBuf,
    pub to_path: PathBuf,
    pub error: String,
}

/// `spec.md` §6: `execute(plan) → ExecutionReport`.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub snapshot_id: String,
    pub total_actions: usize,
    pub succeeded: usize,
    pub failed_actions: Vec<FailedAction>,
    /// True when one or more actions failed, or the run was cancelled
    /// before all actions were attempted (`spec.md` §4.13, §7
    /// `PartialExecution`).
    pub partial: bool,
    pub cancelled: bool,
}

pub struct Executor<'a> {
    pub vault_root: PathBuf,
    pub exclusions: &'a ExclusionRegistry,
    pub snapshots: &'a SnapshotStore,
    pub index: &'a SemanticIndex,
    pub learning: &'a LearningStore,
}

impl<'a> Executor<'a> {
    /// Applies `plan`, atomic from the caller's perspective
    /// (`spec.md` §4.11):
    ///
    /// 1. snapshot the vault, reason = plan scope;
    /// 2. for each action: ensure the target folder, move the file (on
    ///    collision, suffix the filename, never the folder name), update
    ///    the semantic index, append a Decision Record;
    /// 3. a snapshot failure aborts before any move; a single-file move
    ///    failure is logged and the plan continues.
    pub fn execute(
        &self,
        plan: &MovePlan,
        cancellation: Option<&CancellationToken>,
    ) -> Result<ExecutionReport> {
        // Step 1: snapshot-before-move (spec.md §8 P2). A failure here
        // aborts before any move is attempted.
        let manifest = self
            .snapshots
            .create(&self.vault_root, &plan.scope_label, self.exclusions)?;

        let mut failed_actions = Vec::new();
        let mut succeeded = 0usize;
        let mut cancelled = false;

        for action in &plan.actions {
            if cancellation.map(|c| c.is_cancelled()).unwrap_or(false) {
                cancelled = true;
                break;
            }

            match apply_one(action) {
                Ok(final_to_path) => {
                    if let Err(e) = self.index.upsert(
                        action.note_id,
                        None,
                        "",
                        action.category,
                        Some(&action.folder_name),
                    ) {
                        tracing::warn!(note_id = %action.note_id, error = %e, "semantic index update failed after move");
                    }

                    if let Err(e) = self.learning.record_decision(DecisionInput::from_action(
                        action.note_id,
                        action,
                    )) {
                        tracing::warn!(note_id = %action.note_id, error = %e, "failed to append decision record");
                    }

                    tracing::info!(
                        note_id = %action.note_id,
                        to = %final_to_path.display(),
                        "moved note"
                    );
                    succeeded += 1;
                }
                Err(message) => {
                    tracing::error!(
                        note_id = %action.note_id,
                        from = %action.from_path.display(),
                        to = %action.to_path.display(),
                        error = %message,
                        "move failed, continuing with remaining actions"
                    );
                    failed_actions.push(FailedAction {
                        note_id: action.note_id,
                        from_path: action.from_path.clone(),
                        to_path: action.to_path.clone(),
                        error: message,
                    });
                }
            }
        }

        Ok(ExecutionReport {
            snapshot_id: manifest.id,
            total_actions: plan.actions.len(),
            succeeded,
            partial: !failed_actions.is_empty() || cancelled,
            failed_actions,
            cancelled,
        })
    }
}

/// `spec.md` §4.11 step 2a/2b for a single action. Returns the path the
/// file actually ended up at (may differ from `action.to_path` on a
/// filename collision).
fn apply_one(action: &PlannedAction) -> std::result::Result<PathBuf, String> {
    let target_folder = action
        .to_path
        .parent()
        .ok_or_else(|| "move target has no parent directory".to_string())?;
    std::fs::create_dir_all(target_folder).map_err(|e| e.to_string())?;

    let final_to_path = if action.to_path.exists() {
        unique_suffixed_path(&action.to_path)
    } else {
        action.to_path.clone()
    };

    std::fs::rename(&action.from_path, &final_to_path).map_err(|e| e.to_string())?;
    Ok(final_to_path)
}

/// Appends a unique numeric suffix to the *filename* only, never the
/// folder name (`spec.md` §4.11: "preserve the source filename and append
/// a unique suffix only on the filename").
fn unique_suffixed_path(path: &Path) -> PathBuf {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path.extension().map(|e| e.to_string_lossy().into_owned());

    let mut counter = 1u32;
    loop {
        let candidate_name = match &extension {
            Some(ext) => format!("{stem}_{counter}.{ext}"),
            None => format!("{stem}_{counter}"),
        };
        let candidate = parent.join(candidate_name);
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}
