//! Rule Engine (C6, `spec.md` §4.6).

use crate::features::{is_empty_daily_note, ContentPattern, FeatureVector, Recency};
use crate::vault::{Category, Note};

/// One rule emission: `(category, weight ∈ [0,1], rationale)`.
#[derive(Debug, Clone)]
pub struct RuleVote {
    pub category: Category,
    pub weight: f64,
    pub rationale: &'static str,
}

/// Evaluates all mandatory rules against a note's Feature Vector. Order of
/// emission is irrelevant; C8 aggregates (`spec.md` §4.6).
pub fn evaluate(note: &Note, features: &FeatureVector) -> Vec<RuleVote> {
    let mut votes = Vec::new();

    explicit_tag_rule(features, &mut votes);
    todo_date_recent_rule(features, &mut votes);
    many_links_resources_rule(features, &mut votes);
    completion_status_rule(features, &mut votes);
    empty_daily_note_rule(note, &mut votes);

    votes
}

/// "Explicit tag: any `#project|#area|#resource|#archive|#inbox` tag
/// contributes a strong vote (weight 0.9) for that category."
fn explicit_tag_rule(features: &FeatureVector, votes: &mut Vec<RuleVote>) {
    for tag in &features.obsidian_tags {
        let category = match tag.as_str() {
            "project" => Category::Projects,
            "area" => Category::Areas,
            "resource" => Category::Resources,
            "archive" => Category::Archive,
            "inbox" => Category::Inbox,
            _ => continue,
        };
        votes.push(RuleVote {
            category,
            weight: 0.9,
            rationale: "explicit category tag",
        });
    }
}

/// "TODO+date combination with recent modification contributes a medium
/// vote for Projects (weight 0.6)."
fn todo_date_recent_rule(features: &FeatureVector, votes: &mut Vec<RuleVote>) {
    let is_recent = matches!(features.recency, Recency::VeryRecent | Recency::Recent);
    if features.has_todos && features.has_dates && is_recent {
        votes.push(RuleVote {
            category: Category::Projects,
            weight: 0.6,
            rationale: "todo + date combination with recent modification",
        });
    }
}

/// "Many outgoing links (>5) and tables/code blocks contribute a medium
/// vote for Resources (weight 0.5)."
fn many_links_resources_rule(features: &FeatureVector, votes: &mut Vec<RuleVote>) {
    let has_structured_content = features.content_patterns.contains(&ContentPattern::Tables)
        || features.content_patterns.contains(&ContentPattern::Code);
    if features.link_count > 5 && has_structured_content {
        votes.push(RuleVote {
            category: Category::Resources,
            weight: 0.5,
            rationale: "many outgoing links with tables or code blocks",
        });
    }
}

/// "Past-tense completion markers in header (`status: done|archived|
/// completed`) contribute a strong vote for Archive."
fn completion_status_rule(features: &FeatureVector, votes: &mut Vec<RuleVote>) {
    let is_completed = features
        .status
        .as_deref()
        .map(|s| matches!(s, "done" | "archived" | "completed"))
        .unwrap_or(false);
    if is_completed {
        votes.push(RuleVote {
            category: Category::Archive,
            weight: 0.9,
            rationale: "completion marker in header status",
        });
    }
}

/// "Empty/near-empty daily-style notes (filename matches a year-month-day
/// pattern; body < 10 non-whitespace characters) contribute a strong vote
/// for Archive."
fn empty_daily_note_rule(note: &Note, votes: &mut Vec<RuleVote>) {
    if is_empty_daily_note(note) {
        votes.push(RuleVote {
            category: Category::Archive,
            weight: 0.9,
            rationale: "empty daily note",
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features;
    use crate::vault::NoteId;
    use chrono::Utc;
    use std::path::PathBuf;

    fn note_with_tags(tags: Vec<&str>) -> Note {
        let path = PathBuf::from("/vault/00-Inbox/n.md");
        Note {
            id: NoteId::from_path(&path),
            path,
            raw_text: "body text".to_string(),
            header: Default::default(),
            tags: tags.into_iter().map(String::from).collect(),
            links: Vec::new(),
            attachments: Vec::new(),
            created: Utc::now(),
            modified: Utc::now(),
            word_count: 2,
            current_category: Category::Inbox,
            current_folder_name: None,
        }
    }

    #[test]
    fn explicit_tag_produces_strong_vote() {
        let note = note_with_tags(vec!["project"]);
        let fv = features::extract(&note, None);
        let votes = evaluate(&note, &fv);
        assert!(votes
            .iter()
            .any(|v| v.category == Category::Projects && v.weight == 0.9));
    }

    #[test]
    fn completion_status_votes_archive() {
        let mut note = note_with_tags(vec![]);
        note.header.insert(
            "status".to_string(),
            crate::vault::HeaderValue::Scalar("done".to_string()),
        );
        let fv = features::extract(&note, None);
        let votes = evaluate(&note, &fv);
        assert!(votes.iter().any(|v| v.category == Category::Archive));
    }

    #[test]
    fn empty_daily_note_votes_archive() {
        let path = PathBuf::from("/vault/00-Inbox/2024-11-03.md");
        let note = Note {
            id: NoteId::from_path(&path),
            path,
            raw_text: String::new(),
            header: Default::default(),
            tags: Vec::new(),
            links: Vec::new(),
            attachments: Vec::new(),
            created: Utc::now(),
            modified: Utc::now(),
            word_count: 0,
            current_category: Category::Inbox,
            current_folder_name: None,
        };
        let fv = features::extract(&note, None);
        let votes = evaluate(&note, &fv);
        assert!(votes
            .iter()
            .any(|v| v.category == Category::Archive && v.rationale.contains("daily")));
    }

    #[test]
    fn plain_note_with_no_signals_yields_no_votes() {
        let note = note_with_tags(vec![]);
        let fv = features::extract(&note, None);
        let votes = evaluate(&note, &fv);
        assert!(votes.is_empty());
    }
}
