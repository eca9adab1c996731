//! Folder naming rules (`spec.md` §4.9, sub-capability of C8/C9).

use std::sync::OnceLock;

use regex::Regex;

use crate::vault::Category;

const MIN_LENGTH: usize = 3;
const MAX_LENGTH: usize = 50;
const PREFERRED_MIN: usize = 5;
const PREFERRED_MAX: usize = 30;

const HOSTILE_CHARS: [char; 9] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

fn trailing_numeric_suffix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[_ ]\d+$").unwrap())
}

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^#{1,6}\s+(.+)$").unwrap())
}

/// Why a candidate name failed `validate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamingViolation {
    TooShort,
    TooLong,
    HostileCharacter,
    ControlCharacter,
    TrailingNumericSuffix,
    Empty,
}

/// `spec.md` §4.9 rules, checked in order. Returns `Ok(())` when `name`
/// would be accepted verbatim (normalization has already happened).
pub fn validate(name: &str) -> Result<(), NamingViolation> {
    if name.is_empty() {
        return Err(NamingViolation::Empty);
    }
    if name.chars().count() < MIN_LENGTH {
        return Err(NamingViolation::TooShort);
    }
    if name.chars().count() > MAX_LENGTH {
        return Err(NamingViolation::TooLong);
    }
    if name.chars().any(|c| HOSTILE_CHARS.contains(&c)) {
        return Err(NamingViolation::HostileCharacter);
    }
    if name.chars().any(|c| c.is_control()) {
        return Err(NamingViolation::ControlCharacter);
    }
    if trailing_numeric_suffix_re().is_match(name) {
        return Err(NamingViolation::TrailingNumericSuffix);
    }
    Ok(())
}

/// `spec.md` §4.9: "Normalize whitespace, strip tags, strip quotation
/// marks, title-case by default."
pub fn normalize(raw: &str) -> String {
    let no_tags: String = raw
        .split_whitespace()
        .filter(|word| !word.starts_with('#'))
        .collect::<Vec<_>>()
        .join(" ");
    let no_quotes: String = no_tags.chars().filter(|c| *c != '"' && *c != '\'').collect();
    let collapsed: String = no_quotes.split_whitespace().collect::<Vec<_>>().join(" ");
    title_case(collapsed.trim())
}

fn title_case(s: &str) -> String {
    s.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Preferred length is a soft target; `validate` is the hard gate. A name
/// within the preferred range is favored when choosing between otherwise
/// equally valid candidates.
pub fn is_preferred_length(name: &str) -> bool {
    let len = name.chars().count();
    (PREFERRED_MIN..=PREFERRED_MAX).contains(&len)
}

/// `spec.md` §4.9: "Fallback chain: first heading → first non-empty,
/// non-header line → category keyword (e.g., 'New Project')."
pub fn fallback_chain(body: &str, category: Category) -> String {
    for line in body.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(captures) = heading_re().captures(trimmed) {
            let candidate = normalize(&captures[1]);
            if validate(&candidate).is_ok() {
                return candidate;
            }
        }
    }

    for line in body.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || heading_re().is_match(trimmed) {
            continue;
        }
        let candidate = normalize(trimmed);
        if validate(&candidate).is_ok() {
            return candidate;
        }
    }

    category_keyword_fallback(category)
}

fn category_keyword_fallback(category: Category) -> String {
    match category {
        Category::Projects => "New Project".to_string(),
        Category::Areas => "New Area".to_string(),
        Category::Resources => "New Resource".to_string(),
        Category::Archive => "Archived Notes".to_string(),
        Category::Inbox | Category::Unknown => "Unsorted Notes".to_string(),
    }
}

/// Chooses the final folder name for a decision: an empty daily note
/// landing in Archive always gets the structural "Daily Notes" bucket
/// (`spec.md` §8 scenario S2); otherwise prefer the LLM suggestion when
/// the winning category matches what the LLM proposed and the suggestion
/// validates; otherwise derive from content.
pub fn select_folder_name(
    winner: Category,
    llm_category: Option<Category>,
    llm_folder_name: Option<&str>,
    body: &str,
    is_empty_daily_note: bool,
) -> String {
    if is_empty_daily_note && winner == Category::Archive {
        return "Daily Notes".to_string();
    }

    if llm_category == Some(winner) {
        if let Some(suggested) = llm_folder_name {
            let normalized = normalize(suggested);
            if validate(&normalized).is_ok() {
                return normalized;
            }
        }
    }
    fallback_chain(body, winner)
}

/// `spec.md` §11 / consolidation (§4.10): strip trailing numeric suffixes,
/// strip "Related", normalize whitespace and case.
pub fn consolidation_key(folder_name: &str) -> String {
    let without_suffix = trailing_numeric_suffix_re().replace(folder_name, "");
    let without_related = without_suffix.replace("Related", "").replace("related", "");
    without_related
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_trailing_numeric_suffix() {
        assert_eq!(
            validate("Project Plans_2"),
            Err(NamingViolation::TrailingNumericSuffix)
        );
        assert_eq!(
            validate("Project Plans 3"),
            Err(NamingViolation::TrailingNumericSuffix)
        );
        assert!(validate("Project Plans").is_ok());
    }

    #[test]
    fn validate_rejects_hostile_characters() {
        assert_eq!(
            validate("Bad/Name"),
            Err(NamingViolation::HostileCharacter)
        );
    }

    #[test]
    fn validate_enforces_length_bounds() {
        assert_eq!(validate("ab"), Err(NamingViolation::TooShort));
        assert_eq!(validate(&"a".repeat(51)), Err(NamingViolation::TooLong));
    }

    #[test]
    fn normalize_strips_tags_and_quotes_and_title_cases() {
        let normalized = normalize("  \"launch\" #project   plan  ");
        assert_eq!(normalized, "Launch Plan");
    }

    #[test]
    fn fallback_chain_prefers_first_heading() {
        let body = "Intro line\n# Ship It Fast\nMore text\n";
        let name = fallback_chain(body, Category::Projects);
        assert_eq!(name, "Ship It Fast");
    }

    #[test]
    fn fallback_chain_falls_back_to_category_keyword() {
        let name = fallback_chain("", Category::Archive);
        assert_eq!(name, "Archived Notes");
    }

    #[test]
    fn consolidation_key_normalizes_variants() {
        assert_eq!(
            consolidation_key("Client Work Related_2"),
            consolidation_key("client work")
        );
    }
}
