//! Feedback Loop (C13, `spec.md` §4.12/§4.13).
//!
//! Reads accumulated [`LearningStore`] state and produces a bounded
//! weight nudge for the next planning run, plus folder-naming preferences.
//! One-way: Learning Store → Feedback Loop → Decision Fusion. Nothing
//! downstream ever writes back into the Learning Store through this path.

use crate::fusion::{PolicyNudge, Weights};
use crate::learning_store::{FolderPatternStats, LearningStore};

/// Maximum magnitude of any single weight nudge
/// (`spec.md` §4.12: "weight nudges ... bounded so that the feedback loop
/// can shift emphasis but never take over the vote").
pub const MAX_NUDGE: f64 = 0.1;

/// Decisions need at least this many judged (accepted/corrected) records
/// before the feedback loop acts; too little feedback is noise.
const MIN_JUDGED_DECISIONS: usize = 10;

/// A folder name pattern worth preferring or avoiding, derived from
/// historical acceptance (`spec.md` §4.12, consumed by
/// [`crate::naming`]/[`crate::planner`]).
#[derive(Debug, Clone)]
pub struct NamingPreference {
    pub consolidation_key: String,
    pub acceptance_rate: f64,
    pub sample_size: usize,
}

#[derive(Debug, Clone)]
pub struct FeedbackLoopReport {
    pub nudge: PolicyNudge,
    pub naming_preferences: Vec<NamingPreference>,
    pub judged_decisions: usize,
}

/// Reads `store` and derives the current policy nudge and naming
/// preferences (`spec.md` §6 surface: implicitly consumed by `plan()`
/// through [`crate::session::Session`]).
pub struct FeedbackLoop<'a> {
    store: &'a LearningStore,
}

impl<'a> FeedbackLoop<'a> {
    pub fn new(store: &'a LearningStore) -> Self {
        Self { store }
    }

    pub fn compute(&self) -> crate::error::Result<FeedbackLoopReport> {
        let decisions = self.store.decisions()?;
        let judged: Vec<_> = decisions
            .iter()
            .filter(|d| d.user_feedback.is_some())
            .collect();
        let judged_decisions = judged.len();

        let nudge = if judged_decisions < MIN_JUDGED_DECISIONS {
            Weights {
                semantic: 0.0,
                llm: 0.0,
                rule: 0.0,
            }
        } else {
            compute_nudge(&judged)
        };

        let pattern_stats = self.store.folder_pattern_stats()?;
        let naming_preferences = pattern_stats
            .into_iter()
            .filter(|s| s.times_created >= 2)
            .map(|s: FolderPatternStats| NamingPreference {
                acceptance_rate: s.acceptance_rate(),
                sample_size: s.times_created,
                consolidation_key: s.consolidation_key,
            })
            .collect();

        Ok(FeedbackLoopReport {
            nudge,
            naming_preferences,
            judged_decisions,
        })
    }
}

/// Compares per-source accuracy (how often a source's highest-weighted
/// method type correlated with an accepted decision) and nudges weight
/// toward whichever source has been most often right, bounded by
/// [`MAX_NUDGE`].
fn compute_nudge(judged: &[&crate::learning_store::DecisionRecord]) -> PolicyNudge {
    use crate::fusion::Method;

    let mut semantic_hits = 0usize;
    let mut semantic_total = 0usize;
    let mut llm_hits = 0usize;
    let mut llm_total = 0usize;
    let mut rule_hits = 0usize;
    let mut rule_total = 0usize;

    for d in judged {
        let accepted = matches!(
            d.user_feedback,
            Some(crate::learning_store::UserFeedback::Accepted)
        );
        match d.method {
            Method::SemanticOnly | Method::SemanticWeighted => {
                semantic_total += 1;
                if accepted {
                    semantic_hits += 1;
                }
            }
            Method::LlmOnly | Method::LlmWeighted => {
                llm_total += 1;
                if accepted {
                    llm_hits += 1;
                }
            }
            Method::RuleOnly | Method::RuleWeighted => {
                rule_total += 1;
                if accepted {
                    rule_hits += 1;
                }
            }
            Method::Consensus | Method::Fallback => {}
        }
    }

    let semantic_rate = rate(semantic_hits, semantic_total);
    let llm_rate = rate(llm_hits, llm_total);
    let rule_rate = rate(rule_hits, rule_total);

    let overall = [semantic_rate, llm_rate, rule_rate]
        .iter()
        .filter_map(|r| *r)
        .sum::<f64>()
        / [semantic_rate, llm_rate, rule_rate]
            .iter()
            .filter(|r| r.is_some())
            .count()
            .max(1) as f64;

    PolicyNudge {
        semantic: nudge_from_rate(semantic_rate, overall),
        llm: nudge_from_rate(llm_rate, overall),
        rule: nudge_from_rate(rule_rate, overall),
    }
}

fn rate(hits: usize, total: usize) -> Option<f64> {
    if total == 0 {
        None
    } else {
        Some(hits as f64 / total as f64)
    }
}

fn nudge_from_rate(rate: Option<f64>, overall: f64) -> f64 {
    match rate {
        None => 0.0,
        Some(r) => ((r - overall) * MAX_NUDGE / 0.5).clamp(-MAX_NUDGE, MAX_NUDGE),
    }
}
