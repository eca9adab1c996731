//! Feature Extractor (C3, `spec.md` §4.3).

use std::collections::BTreeSet;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::vault::{HeaderValue, Note};

/// `spec.md` §3, "recency ∈ {very_recent,recent,moderate,old,very_old}".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recency {
    VeryRecent,
    Recent,
    Moderate,
    Old,
    VeryOld,
}

impl Recency {
    fn classify(age_days: i64) -> Self {
        if age_days <= 7 {
            Recency::VeryRecent
        } else if age_days <= 30 {
            Recency::Recent
        } else if age_days <= 90 {
            Recency::Moderate
        } else if age_days <= 365 {
            Recency::Old
        } else {
            Recency::VeryOld
        }
    }
}

/// `spec.md` §3, "content_patterns (set of {headers, lists, code, tables,
/// quotes, emphasis, strikethrough, footnotes})".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ContentPattern {
    Headers,
    Lists,
    Code,
    Tables,
    Quotes,
    Emphasis,
    Strikethrough,
    Footnotes,
}

/// The directive keywords §4.8 weight adjustments key off of.
pub const DIRECTIVE_VOCABULARY: [&str; 8] = [
    "project", "area", "resource", "archive", "inbox", "urgent", "priority", "ship",
];

/// `spec.md` §3, "Feature Vector".
#[derive(Debug, Clone)]
pub struct FeatureVector {
    pub word_count: usize,
    pub has_todos: bool,
    pub has_dates: bool,
    pub has_links: bool,
    pub has_attachments: bool,
    pub todo_count: usize,
    pub link_count: usize,
    pub obsidian_tags: BTreeSet<String>,
    pub generic_tags: BTreeSet<String>,
    pub header_present: bool,
    pub status: Option<String>,
    pub recency: Recency,
    pub content_patterns: BTreeSet<ContentPattern>,
    pub directive_keywords: BTreeSet<String>,
    pub info_density: f64,
}

fn todo_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?im)(?:^\s*-\s*\[ \]|TODO:|#todo\b)").unwrap())
}

fn date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:\d{4}-\d{2}-\d{2}|\d{1,2}/\d{1,2}/\d{2,4}|(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+\d{1,2}(?:st|nd|rd|th)?,?\s*\d{0,4})\b",
        )
        .unwrap()
    })
}

fn daily_filename_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}").unwrap())
}

fn code_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```").unwrap())
}

fn table_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*\|.+\|\s*$").unwrap())
}

fn quote_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*>").unwrap())
}

fn emphasis_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\*\*[^*]+\*\*|\*[^*]+\*|_[^_]+_").unwrap())
}

fn strikethrough_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"~~[^~]+~~").unwrap())
}

fn footnote_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\^[^\]]+\]").unwrap())
}

fn header_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^#{1,6}\s").unwrap())
}

fn list_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*(?:-|\*|\d+\.)\s").unwrap())
}

/// Extracts the Feature Vector for one note. Pure over `note` content and
/// filesystem timestamps; `directive` is the optional user free-text input.
///
/// `spec.md` §4.3: "Determinism required: same content + same mtime ⇒ same
/// vector" — this function takes no other input.
pub fn extract(note: &Note, directive: Option<&str>) -> FeatureVector {
    let body = note.body_without_header();

    let todo_count = todo_re().find_iter(body).count();
    let has_dates = date_re().is_match(body);
    let link_count = note.links.len();
    let has_attachments = !note.attachments.is_empty();

    let mut obsidian_tags = BTreeSet::new();
    let mut generic_tags = BTreeSet::new();
    for tag in &note.tags {
        if matches!(
            tag.as_str(),
            "project" | "area" | "resource" | "archive" | "inbox"
        ) {
            obsidian_tags.insert(tag.clone());
        } else {
            generic_tags.insert(tag.clone());
        }
    }

    let status = note.header.get("status").and_then(|v| match v {
        HeaderValue::Scalar(s) => Some(s.to_lowercase()),
        HeaderValue::List(_) => None,
    });

    let now = Utc::now();
    let age_days = age_in_days(note.modified, now);
    let recency = Recency::classify(age_days);

    let mut content_patterns = BTreeSet::new();
    if header_line_re().is_match(body) {
        content_patterns.insert(ContentPattern::Headers);
    }
    if list_line_re().is_match(body) {
        content_patterns.insert(ContentPattern::Lists);
    }
    if code_block_re().is_match(body) {
        content_patterns.insert(ContentPattern::Code);
    }
    if table_re().is_match(body) {
        content_patterns.insert(ContentPattern::Tables);
    }
    if quote_re().is_match(body) {
        content_patterns.insert(ContentPattern::Quotes);
    }
    if emphasis_re().is_match(body) {
        content_patterns.insert(ContentPattern::Emphasis);
    }
    if strikethrough_re().is_match(body) {
        content_patterns.insert(ContentPattern::Strikethrough);
    }
    if footnote_re().is_match(body) {
        content_patterns.insert(ContentPattern::Footnotes);
    }

    let directive_keywords: BTreeSet<String> = directive
        .map(|d| d.to_lowercase())
        .map(|lower| {
            DIRECTIVE_VOCABULARY
                .iter()
                .filter(|kw| lower.contains(*kw))
                .map(|kw| kw.to_string())
                .collect()
        })
        .unwrap_or_default();

    let word_count = note.word_count;
    let info_density = (link_count + todo_count) as f64 / (word_count.max(1) as f64);

    FeatureVector {
        word_count,
        has_todos: todo_count > 0,
        has_dates,
        has_links: link_count > 0,
        has_attachments,
        todo_count,
        link_count,
        obsidian_tags,
        generic_tags,
        header_present: !note.header.is_empty(),
        status,
        recency,
        content_patterns,
        directive_keywords,
        info_density,
    }
}

fn age_in_days(modified: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - modified).num_days().max(0)
}

/// `spec.md` §4.6, "Empty/near-empty daily-style notes (filename matches a
/// year-month-day pattern; body < 10 non-whitespace characters)".
pub fn is_empty_daily_note(note: &Note) -> bool {
    let is_daily_name = daily_filename_re().is_match(&note.file_name());
    let non_whitespace: usize = note
        .body_without_header()
        .chars()
        .filter(|c| !c.is_whitespace())
        .count();
    is_daily_name && non_whitespace < 10
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::{Category, NoteId};
    use std::path::PathBuf;

    fn note(raw_text: &str, file_name: &str, modified: DateTime<Utc>) -> Note {
        let path = PathBuf::from(format!("/vault/00-Inbox/{file_name}"));
        Note {
            id: NoteId::from_path(&path),
            path,
            raw_text: raw_text.to_string(),
            header: Default::default(),
            tags: extract_tags_for_test(raw_text),
            links: Vec::new(),
            attachments: Vec::new(),
            created: modified,
            modified,
            word_count: raw_text.split_whitespace().count(),
            current_category: Category::Inbox,
            current_folder_name: None,
        }
    }

    fn extract_tags_for_test(raw: &str) -> Vec<String> {
        raw.split_whitespace()
            .filter_map(|w| w.strip_prefix('#'))
            .map(|s| s.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    #[test]
    fn detects_todo_and_date() {
        let n = note(
            "- [ ] ship it\nDeadline 2025-03-01\n",
            "todo.md",
            Utc::now(),
        );
        let fv = extract(&n, None);
        assert!(fv.has_todos);
        assert!(fv.has_dates);
        assert_eq!(fv.todo_count, 1);
    }

    #[test]
    fn classifies_recency_buckets() {
        let old = note("text", "old.md", Utc::now() - chrono::Duration::days(400));
        let fv = extract(&old, None);
        assert_eq!(fv.recency, Recency::VeryOld);

        let recent = note("text", "recent.md", Utc::now() - chrono::Duration::days(3));
        let fv = extract(&recent, None);
        assert_eq!(fv.recency, Recency::VeryRecent);
    }

    #[test]
    fn directive_keywords_are_extracted() {
        let n = note("plain note", "n.md", Utc::now());
        let fv = extract(&n, Some("please ship fast, this is urgent"));
        assert!(fv.directive_keywords.contains("ship"));
        assert!(fv.directive_keywords.contains("urgent"));
        assert!(!fv.directive_keywords.contains("archive"));
    }

    #[test]
    fn empty_daily_note_detection() {
        let empty = note("", "2024-11-03.md", Utc::now());
        assert!(is_empty_daily_note(&empty));

        let populated = note(
            "A fairly long reflection on today.",
            "2024-11-03.md",
            Utc::now(),
        );
        assert!(!is_empty_daily_note(&populated));
    }

    #[test]
    fn content_patterns_detect_code_and_tables() {
        let n = note(
            "# Title\n```rust\nfn main() {}\n```\n| a | b |\n|---|---|\n> quoted\n",
            "n.md",
            Utc::now(),
        );
        let fv = extract(&n, None);
        assert!(fv.content_patterns.contains(&ContentPattern::Headers));
        assert!(fv.content_patterns.contains(&ContentPattern::Code));
        assert!(fv.content_patterns.contains(&ContentPattern::Tables));
        assert!(fv.content_patterns.contains(&ContentPattern::Quotes));
    }
}
