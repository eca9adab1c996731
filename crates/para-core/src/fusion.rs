//! Decision Fusion (C8, `spec.md` §4.8).

use std::collections::HashMap;

use crate::features::FeatureVector;
use crate::llm::LlmClassification;
use crate::naming;
use crate::rules::RuleVote;
use crate::vault::Category;

/// `spec.md` §3, Decision Record's `method` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Consensus,
    SemanticWeighted,
    LlmWeighted,
    RuleWeighted,
    SemanticOnly,
    LlmOnly,
    RuleOnly,
    Fallback,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Consensus => "consensus",
            Method::SemanticWeighted => "semantic_weighted",
            Method::LlmWeighted => "llm_weighted",
            Method::RuleWeighted => "rule_weighted",
            Method::SemanticOnly => "semantic_only",
            Method::LlmOnly => "llm_only",
            Method::RuleOnly => "rule_only",
            Method::Fallback => "fallback",
        }
    }
}

/// `spec.md` §4.8 step 1.
const BASE_WEIGHT_SEMANTIC: f64 = 0.5;
const BASE_WEIGHT_LLM: f64 = 0.3;
const BASE_WEIGHT_RULE: f64 = 0.2;

const WEIGHT_MIN: f64 = 0.1;
const WEIGHT_MAX: f64 = 0.9;

/// Below this winner score the decision is forced to Archive
/// (`spec.md` §4.8 step 5, §8 P6).
const FALLBACK_FLOOR: f64 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weights {
    pub semantic: f64,
    pub llm: f64,
    pub rule: f64,
}

impl Weights {
    /// Clamps each weight into `[WEIGHT_MIN, WEIGHT_MAX]` and renormalizes
    /// so the three sum to 1 (`spec.md` §8 P7). Public so the invariant can
    /// be exercised directly with randomized inputs, not just through
    /// `fuse`.
    pub fn clamp_and_renormalize(self) -> Self {
        let clamp = |w: f64| w.clamp(WEIGHT_MIN, WEIGHT_MAX);
        let (s, l, r) = (clamp(self.semantic), clamp(self.llm), clamp(self.rule));
        let sum = s + l + r;
        Weights {
            semantic: s / sum,
            llm: l / sum,
            rule: r / sum,
        }
    }
}

/// Input the semantic index supplies: neighbor category counts and the k
/// used for the query (`spec.md` §4.5's `category_of_neighbors`).
#[derive(Debug, Clone)]
pub struct SemanticVotes {
    pub neighbor_categories: HashMap<Category, usize>,
    pub k: usize,
}

impl SemanticVotes {
    pub fn empty() -> Self {
        Self {
            neighbor_categories: HashMap::new(),
            k: 0,
        }
    }

    fn total_neighbors(&self) -> usize {
        self.neighbor_categories.values().sum()
    }

    fn top_category(&self) -> Option<(Category, usize)> {
        self.neighbor_categories
            .iter()
            .max_by_key(|(_, count)| **count)
            .map(|(c, n)| (*c, *n))
    }

    /// Fraction of neighbors agreeing with the top category.
    fn confidence(&self) -> f64 {
        let total = self.total_neighbors();
        if total == 0 {
            return 0.0;
        }
        self.top_category()
            .map(|(_, n)| n as f64 / total as f64)
            .unwrap_or(0.0)
    }

    /// S[c]: fraction of neighbors in category c.
    fn fraction_for(&self, category: Category) -> f64 {
        let total = self.total_neighbors();
        if total == 0 {
            return 0.0;
        }
        *self.neighbor_categories.get(&category).unwrap_or(&0) as f64 / total as f64
    }
}

/// The final fused decision for one note (feeds the Decision Record,
/// `spec.md` §3).
#[derive(Debug, Clone)]
pub struct Decision {
    pub category: Category,
    pub folder_name: String,
    pub confidence: f64,
    pub method: Method,
    pub semantic_score: f64,
    pub llm_score: f64,
    pub rule_score: f64,
    pub weights: Weights,
    pub reasoning: String,
    pub factors_applied: Vec<&'static str>,
}

/// Additive nudges to the base weights, produced by the feedback loop
/// (C13) from accumulated corrections (`spec.md` §4.12: "weight nudges
/// that C8 consumes on the next run"). Not normalized on their own — they
/// are applied before the step-2 adjustments and the final
/// clamp-and-renormalize, so a nudge can never itself violate the
/// `spec.md` §8 P7 weight bounds.
pub type PolicyNudge = Weights;

/// `spec.md` §4.8: fuses feature vector, semantic neighbor votes, an
/// optional LLM result, and rule votes into a single decision.
pub fn fuse(
    features: &FeatureVector,
    semantic: &SemanticVotes,
    llm: Option<&LlmClassification>,
    rule_votes: &[RuleVote],
    indexed_note_count: usize,
    note_body: &str,
    is_empty_daily_note: bool,
    policy: Option<&PolicyNudge>,
) -> Decision {
    let mut weights = Weights {
        semantic: BASE_WEIGHT_SEMANTIC,
        llm: BASE_WEIGHT_LLM,
        rule: BASE_WEIGHT_RULE,
    };
    let mut applied_factors: Vec<&'static str> = Vec::new();

    if let Some(nudge) = policy {
        weights.semantic += nudge.semantic;
        weights.llm += nudge.llm;
        weights.rule += nudge.rule;
        if nudge.semantic != 0.0 || nudge.llm != 0.0 || nudge.rule != 0.0 {
            applied_factors.push("feedback-loop weight nudge");
        }
    }

    let semantic_confidence = semantic.confidence();
    if semantic_confidence > 0.8 {
        weights.semantic += 0.2;
        applied_factors.push("high semantic agreement");
    } else if semantic_confidence < 0.3 && semantic.total_neighbors() > 0 {
        weights.semantic -= 0.2;
        applied_factors.push("low semantic agreement");
    }

    if features.word_count > 500 {
        weights.llm += 0.1;
        applied_factors.push("long note favors llm");
    } else if features.word_count < 50 {
        weights.semantic += 0.1;
        applied_factors.push("short note favors semantic");
    }

    let strong_rule_present = rule_votes.iter().any(|v| v.weight >= 0.9);
    if strong_rule_present {
        weights.rule += 0.2;
        applied_factors.push("strong rule vote present");
    }

    let sparse_index = indexed_note_count < 20;
    if sparse_index {
        weights.llm += 0.15;
        weights.semantic -= 0.15;
        applied_factors.push("sparse semantic index");
    }

    let directive_has_category_keyword = features.directive_keywords.iter().any(|kw| {
        matches!(
            kw.as_str(),
            "project" | "area" | "resource" | "archive" | "inbox"
        )
    });
    if directive_has_category_keyword {
        weights.llm += 0.2;
        applied_factors.push("directive names a category");
    }

    let weights = weights.clamp_and_renormalize();

    let rule_totals = aggregate_rule_votes(rule_votes);

    let mut scores: HashMap<Category, f64> = HashMap::new();
    for category in Category::CLASSIFIABLE {
        let semantic_term = weights.semantic * semantic.fraction_for(category);
        let llm_term = weights.llm
            * if llm.map(|l| l.category) == Some(category) {
                1.0
            } else {
                0.0
            }
            * 0.9;
        let rule_term = weights.rule * rule_totals.get(&category).copied().unwrap_or(0.0);
        scores.insert(category, semantic_term + llm_term + rule_term);
    }

    let (winner, winner_score) = argmax_with_tiebreak(&scores);

    let semantic_score = semantic.fraction_for(winner);
    let llm_score = if llm.map(|l| l.category) == Some(winner) {
        1.0
    } else {
        0.0
    };
    let rule_score = rule_totals.get(&winner).copied().unwrap_or(0.0);

    let semantic_term = weights.semantic * semantic_score;
    let llm_term = weights.llm * llm_score * 0.9;
    let rule_term = weights.rule * rule_score;

    let has_semantic = semantic.total_neighbors() > 0;
    let has_llm = llm.is_some();
    let has_rule = !rule_votes.is_empty();

    let agree_semantic = has_semantic && semantic.top_category().map(|(c, _)| c) == Some(winner);
    let agree_llm = has_llm && llm.map(|l| l.category) == Some(winner);
    let agree_rule = has_rule && rule_totals.get(&winner).copied().unwrap_or(0.0) > 0.0;

    let (category, confidence, method) = if winner_score < FALLBACK_FLOOR {
        (Category::Archive, winner_score, Method::Fallback)
    } else if agree_semantic && agree_llm && agree_rule {
        (winner, winner_score, Method::Consensus)
    } else {
        let method = classify_method(
            has_semantic,
            has_llm,
            has_rule,
            semantic_term,
            llm_term,
            rule_term,
        );
        (winner, winner_score, method)
    };

    let folder_name = naming::select_folder_name(
        category,
        llm.map(|l| l.category),
        llm.map(|l| l.folder_name.as_str()),
        note_body,
        is_empty_daily_note,
    );

    let reasoning = build_reasoning(
        method,
        semantic_term,
        llm_term,
        rule_term,
        rule_votes,
        &applied_factors,
    );

    Decision {
        category,
        folder_name,
        confidence: confidence.clamp(0.0, 1.0),
        method,
        semantic_score,
        llm_score,
        rule_score,
        weights,
        reasoning,
        factors_applied: applied_factors,
    }
}

fn aggregate_rule_votes(votes: &[RuleVote]) -> HashMap<Category, f64> {
    let mut totals: HashMap<Category, f64> = HashMap::new();
    for vote in votes {
        *totals.entry(vote.category).or_insert(0.0) += vote.weight;
    }
    totals
}

fn argmax_with_tiebreak(scores: &HashMap<Category, f64>) -> (Category, f64) {
    Category::CLASSIFIABLE
        .iter()
        .map(|c| (*c, *scores.get(c).unwrap_or(&0.0)))
        .fold(None, |best: Option<(Category, f64)>, (category, score)| {
            match best {
                None => Some((category, score)),
                Some((best_category, best_score)) => {
                    if score > best_score
                        || (score == best_score
                            && category.tie_break_rank() < best_category.tie_break_rank())
                    {
                        Some((category, score))
                    } else {
                        Some((best_category, best_score))
                    }
                }
            }
        })
        .unwrap_or((Category::Archive, 0.0))
}

/// "otherwise `{semantic|llm|rule}_weighted` based on which contributed the
/// largest term to the winner; `*_only` if the others were absent or null."
fn classify_method(
    has_semantic: bool,
    has_llm: bool,
    has_rule: bool,
    semantic_term: f64,
    llm_term: f64,
    rule_term: f64,
) -> Method {
    let present_count = [has_semantic, has_llm, has_rule]
        .iter()
        .filter(|p| **p)
        .count();

    if present_count <= 1 {
        if has_semantic {
            return Method::SemanticOnly;
        }
        if has_llm {
            return Method::LlmOnly;
        }
        if has_rule {
            return Method::RuleOnly;
        }
        return Method::Fallback;
    }

    let terms = [
        (Method::SemanticWeighted, semantic_term),
        (Method::LlmWeighted, llm_term),
        (Method::RuleWeighted, rule_term),
    ];
    terms
        .into_iter()
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(method, _)| method)
        .unwrap_or(Method::Fallback)
}

fn build_reasoning(
    method: Method,
    semantic_term: f64,
    llm_term: f64,
    rule_term: f64,
    rule_votes: &[RuleVote],
    applied_factors: &[&'static str],
) -> String {
    let mut contributors = vec![
        ("semantic", semantic_term),
        ("llm", llm_term),
        ("rule", rule_term),
    ];
    contributors.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut parts = vec![format!("method={}", method.as_str())];
    parts.push(format!(
        "top contributors: {} ({:.2}), {} ({:.2})",
        contributors[0].0, contributors[0].1, contributors[1].0, contributors[1].1
    ));

    let strong_rationales: Vec<&str> = rule_votes
        .iter()
        .filter(|v| v.weight >= 0.9)
        .map(|v| v.rationale)
        .collect();
    if !strong_rationales.is_empty() {
        parts.push(format!("strong rules: {}", strong_rationales.join(", ")));
    }

    if !applied_factors.is_empty() {
        parts.push(format!("weight factors: {}", applied_factors.join(", ")));
    }

    parts.join("; ")
}
