//! Planner (C9, `spec.md` §4.10).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::embeddings::Embedder;
use crate::error::{CoreError, ErrorKind, Result};
use crate::exclusions::ExclusionRegistry;
use crate::features;
use crate::fusion::{self, Decision, Method, PolicyNudge, SemanticVotes, Weights};
use crate::llm::{LlmClassifier, PromptVariant};
use crate::naming;
use crate::rules;
use crate::semantic_index::SemanticIndex;
use crate::vault::{Category, Note, NoteId, VaultReader};

/// `spec.md` §4.10: "Authorization scopes: `classify-inbox` (source =
/// Inbox), `refactor-archive` (source = Archive), `reclassify-all` (source
/// = whole vault)." Plus a path-scoped variant for targeted reruns.
#[derive(Debug, Clone)]
pub enum Scope {
    Inbox,
    Archive,
    All,
    Path(PathBuf),
}

impl Scope {
    fn prompt_variant(&self) -> PromptVariant {
        match self {
            Scope::Archive => PromptVariant::ArchiveRefactor,
            _ => PromptVariant::InboxClassify,
        }
    }

    fn source_root(&self, vault_root: &Path) -> PathBuf {
        match self {
            Scope::Inbox => vault_root.join(Category::Inbox.folder_prefix()),
            Scope::Archive => vault_root.join(Category::Archive.folder_prefix()),
            Scope::All => vault_root.to_path_buf(),
            Scope::Path(p) => p.clone(),
        }
    }
}

/// `spec.md` §3, "Move Plan" single action.
#[derive(Debug, Clone)]
pub struct PlannedAction {
    pub note_id: NoteId,
    pub from_path: PathBuf,
    pub to_path: PathBuf,
    pub create_folder: bool,
    pub category: Category,
    pub confidence: f64,
    pub method: Method,
    pub folder_name: String,
    pub reasoning: String,
    pub semantic_score: f64,
    pub llm_score: f64,
    pub rule_score: f64,
    pub weights: Weights,
    pub factors_applied: Vec<&'static str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Default)]
pub struct PlanSummary {
    pub by_category: HashMap<Category, usize>,
    pub low_confidence: usize,
    pub medium_confidence: usize,
    pub high_confidence: usize,
    pub by_method: HashMap<&'static str, usize>,
    pub risk_level: Option<RiskLevel>,
    pub cross_category_moves: usize,
    pub total_considered: usize,
}

#[derive(Debug, Clone)]
pub struct MovePlan {
    pub scope_label: String,
    pub actions: Vec<PlannedAction>,
    pub summary: PlanSummary,
    pub backup_required: bool,
    pub degraded_llm: bool,
}

pub struct Planner<'a> {
    pub vault_root: PathBuf,
    pub reader: &'a VaultReader,
    pub exclusions: &'a ExclusionRegistry,
    pub embedder: &'a dyn Embedder,
    pub index: &'a SemanticIndex,
    pub llm: &'a dyn LlmClassifier,
    pub neighbor_k: usize,
    /// Weight nudge from the feedback loop (C13), or `None` for an
    /// unadjusted baseline (`spec.md` §4.12).
    pub policy: Option<PolicyNudge>,
}

impl<'a> Planner<'a> {
    /// Unifies the `inbox`/`archive`/`all`/`path` planning paths into one
    /// operation parameterized by scope and prompt variant, per the design
    /// note against duplicating near-identical planning code.
    pub fn plan(&self, scope: Scope, directive: Option<&str>, execute_mode: bool) -> Result<MovePlan> {
        if execute_mode {
            self.exclusions.ensure_configured()?;
        }

        let source_root = scope.source_root(&self.vault_root);
        let (notes, _warnings) = self.reader.list_notes(&source_root, self.exclusions, false)?;

        let mut actions = Vec::new();
        let mut summary = PlanSummary::default();
        let mut degraded_llm = false;

        for note in &notes {
            summary.total_considered += 1;
            let decision = self.decide(note, directive, scope.prompt_variant(), &mut degraded_llm);
            tally(&mut summary, &decision);

            let proposed_category_differs = note.current_category != decision.category;
            let folder_name_invalid = naming::validate(&decision.folder_name).is_err();

            if !proposed_category_differs && !folder_name_invalid {
                continue;
            }

            let target_folder = self
                .vault_root
                .join(decision.category.folder_prefix())
                .join(&decision.folder_name);
            let to_path = target_folder.join(note.file_name());
            let create_folder = !target_folder.is_dir();

            if note.current_category != decision.category {
                summary.cross_category_moves += 1;
            }

            actions.push(PlannedAction {
                note_id: note.id,
                from_path: note.path.clone(),
                to_path,
                create_folder,
                category: decision.category,
                confidence: decision.confidence,
                method: decision.method,
                folder_name: decision.folder_name,
                reasoning: decision.reasoning,
                semantic_score: decision.semantic_score,
                llm_score: decision.llm_score,
                rule_score: decision.rule_score,
                weights: decision.weights,
                factors_applied: decision.factors_applied,
            });
        }

        summary.risk_level = Some(assess_risk(&summary));

        Ok(MovePlan {
            scope_label: scope_label(&scope).to_string(),
            actions,
            summary,
            backup_required: execute_mode,
            degraded_llm,
        })
    }

    fn decide(
        &self,
        note: &Note,
        directive: Option<&str>,
        variant: PromptVariant,
        degraded_llm: &mut bool,
    ) -> Decision {
        let fv = features::extract(note, directive);
        let rule_votes = rules::evaluate(note, &fv);

        let embedding = match self.embedder.embed(&note.raw_text) {
            Ok(e) => Some(e),
            Err(_) => {
                tracing::warn!(note_id = %note.id, "embedder unavailable, degrading to rules+llm");
                None
            }
        };

        let semantic_votes = match &embedding {
            Some(e) => {
                let neighbor_categories = self
                    .index
                    .category_of_neighbors(e, self.neighbor_k)
                    .unwrap_or_default();
                SemanticVotes {
                    neighbor_categories,
                    k: self.neighbor_k,
                }
            }
            None => SemanticVotes::empty(),
        };

        let llm_result = match self.llm.classify(&note.raw_text, directive, variant) {
            Ok(classification) => Some(classification),
            Err(_) => {
                *degraded_llm = true;
                tracing::warn!(note_id = %note.id, "llm classifier degraded, falling back to semantic+rule");
                None
            }
        };

        let indexed_count = self.index.len().unwrap_or(0);

        fusion::fuse(
            &fv,
            &semantic_votes,
            llm_result.as_ref(),
            &rule_votes,
            indexed_count,
            note.body_without_header(),
            features::is_empty_daily_note(note),
            self.policy.as_ref(),
        )
    }
}

fn scope_label(scope: &Scope) -> &'static str {
    match scope {
        Scope::Inbox => "inbox",
        Scope::Archive => "archive",
        Scope::All => "all",
        Scope::Path(_) => "path",
    }
}

fn tally(summary: &mut PlanSummary, decision: &Decision) {
    *summary.by_category.entry(decision.category).or_insert(0) += 1;
    *summary.by_method.entry(decision.method.as_str()).or_insert(0) += 1;
    if decision.confidence < 0.4 {
        summary.low_confidence += 1;
    } else if decision.confidence <= 0.7 {
        summary.medium_confidence += 1;
    } else {
        summary.high_confidence += 1;
    }
}

/// `spec.md` §4.10 risk scoring.
fn assess_risk(summary: &PlanSummary) -> RiskLevel {
    if summary.total_considered == 0 {
        return RiskLevel::Low;
    }
    let total = summary.total_considered as f64;
    let low_confidence_ratio = summary.low_confidence as f64 / total;
    let fallback_ratio = *summary.by_method.get("fallback").unwrap_or(&0) as f64 / total;
    let consensus_ratio = *summary.by_method.get("consensus").unwrap_or(&0) as f64 / total;
    let cross_category_ratio = summary.cross_category_moves as f64 / total;

    let high_criteria = [
        low_confidence_ratio > 0.5,
        fallback_ratio > 0.5,
        consensus_ratio < 0.3,
        cross_category_ratio > 0.3,
    ];
    let high_count = high_criteria.iter().filter(|c| **c).count();

    if high_count >= 1 {
        RiskLevel::High
    } else if low_confidence_ratio > 0.25
        || fallback_ratio > 0.25
        || consensus_ratio < 0.5
        || cross_category_ratio > 0.15
    {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Raised when a precondition for an execute-mode plan is not met.
pub fn ensure_execute_preconditions(auto_backup: bool) -> Result<()> {
    if !auto_backup {
        return Err(CoreError::new(
            ErrorKind::PreconditionFailure,
            "auto_backup is disabled; the executor refuses to run without it",
        ));
    }
    Ok(())
}
