//! Vault Reader (C1, `spec.md` §4.1).

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use walkdir::WalkDir;

use crate::error::{CoreError, ErrorKind};
use crate::exclusions::ExclusionRegistry;

use super::note::{Category, HeaderMap, HeaderValue, Note, NoteId};

/// Default extension accepted as a "note" (`spec.md` §4.1: "the configured
/// note-extension set (default: the canonical plain-text note extension)").
pub const DEFAULT_NOTE_EXTENSION: &str = "md";

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)(?:^|[\s(])#([A-Za-z0-9_/-]+)").unwrap())
}

fn link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\[([^\]|#]+)(?:[|#][^\]]*)?\]\]").unwrap())
}

fn attachment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"!\[[^\]]*\]\(([^)]+)\)").unwrap())
}

/// One unreadable-file warning emitted during a sweep (`spec.md` §4.1: "Fails
/// with `IOError(path)` on unreadable files and continues").
#[derive(Debug, Clone)]
pub struct ReadWarning {
    pub path: PathBuf,
    pub message: String,
}

pub struct VaultReader {
    note_extensions: Vec<String>,
}

impl Default for VaultReader {
    fn default() -> Self {
        Self {
            note_extensions: vec![DEFAULT_NOTE_EXTENSION.to_string()],
        }
    }
}

impl VaultReader {
    pub fn new(note_extensions: Vec<String>) -> Self {
        Self { note_extensions }
    }

    /// Enumerates and parses every note under `root`.
    ///
    /// `spec.md` §4.1: "Produces a lazy, non-restartable sequence; callers
    /// that need two passes buffer." We return a materialized `Vec` here
    /// (the single-process, single-sweep core always buffers — see
    /// `Planner`), but keep the warnings channel separate from the result so
    /// a caller can still distinguish "skipped" from "fatal".
    pub fn list_notes(
        &self,
        root: &Path,
        exclusions: &ExclusionRegistry,
        include_excluded: bool,
    ) -> crate::error::Result<(Vec<Note>, Vec<ReadWarning>)> {
        if !root.is_dir() {
            return Err(CoreError::new(
                ErrorKind::PreconditionFailure,
                format!("vault root does not exist: {}", root.display()),
            ));
        }

        let mut notes = Vec::new();
        let mut warnings = Vec::new();

        let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
            // "Hidden directories starting with `.` are never traversed by C1."
            let is_hidden_dir = entry.file_type().is_dir()
                && entry
                    .file_name()
                    .to_str()
                    .map(|s| s.starts_with('.'))
                    .unwrap_or(false);
            !is_hidden_dir
        });

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warnings.push(ReadWarning {
                        path: e.path().map(Path::to_path_buf).unwrap_or_default(),
                        message: e.to_string(),
                    });
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let has_note_ext = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|ext| self.note_extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
                .unwrap_or(false);
            if !has_note_ext {
                continue;
            }

            let absolute = path
                .canonicalize()
                .unwrap_or_else(|_| path.to_path_buf());

            if !include_excluded && exclusions.contains(&absolute) {
                continue;
            }

            match self.read_note(&absolute, root) {
                Ok(note) => notes.push(note),
                Err(message) => {
                    tracing::warn!(path = %absolute.display(), %message, "skipping unreadable note");
                    warnings.push(ReadWarning {
                        path: absolute,
                        message,
                    });
                }
            }
        }

        Ok((notes, warnings))
    }

    fn read_note(&self, path: &Path, vault_root: &Path) -> Result<Note, String> {
        let raw_text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
        let metadata = std::fs::metadata(path).map_err(|e| e.to_string())?;

        let created = metadata
            .created()
            .ok()
            .map(chrono::DateTime::<chrono::Utc>::from)
            .unwrap_or_else(chrono::Utc::now);
        let modified = metadata
            .modified()
            .ok()
            .map(chrono::DateTime::<chrono::Utc>::from)
            .unwrap_or_else(chrono::Utc::now);

        let (header_block, body) = super::note::strip_header(&raw_text);
        let header = header_block.map(parse_header).unwrap_or_default();

        let tags = extract_tags(body);
        let links = extract_links(body);
        let attachments = extract_attachments(body);
        let word_count = body.split_whitespace().count();

        let (current_category, current_folder_name) = locate_in_vault(path, vault_root);

        Ok(Note {
            id: NoteId::from_path(path),
            path: path.to_path_buf(),
            raw_text,
            header,
            tags,
            links,
            attachments,
            created,
            modified,
            word_count,
            current_category,
            current_folder_name,
        })
    }
}

/// Determines a note's current category and immediate-parent folder name
/// from its position in the vault tree (`spec.md` I1: "filesystem location
/// is ground truth").
fn locate_in_vault(path: &Path, vault_root: &Path) -> (Category, Option<String>) {
    let Ok(relative) = path.strip_prefix(vault_root) else {
        return (Category::Unknown, None);
    };
    let mut components = relative.components();
    let Some(top) = components.next() else {
        return (Category::Unknown, None);
    };
    let top_name = top.as_os_str().to_string_lossy();
    let category = Category::from_folder_prefix(&top_name).unwrap_or(Category::Unknown);

    // Notes live directly in the category folder or one level deeper
    // (`spec.md` §6: "Notes are files directly in those folders or one
    // level deeper (a sub-folder per project/area/resource)").
    let remaining: Vec<_> = components.collect();
    let folder_name = if remaining.len() >= 2 {
        Some(remaining[0].as_os_str().to_string_lossy().into_owned())
    } else {
        None
    };

    (category, folder_name)
}

fn extract_tags(body: &str) -> Vec<String> {
    let mut tags: Vec<String> = tag_re()
        .captures_iter(body)
        .map(|c| c[1].to_string())
        .collect();
    tags.sort();
    tags.dedup();
    tags
}

fn extract_links(body: &str) -> Vec<String> {
    let mut links: Vec<String> = link_re()
        .captures_iter(body)
        .map(|c| c[1].trim().to_string())
        .collect();
    links.sort();
    links.dedup();
    links
}

fn extract_attachments(body: &str) -> Vec<String> {
    attachment_re()
        .captures_iter(body)
        .map(|c| c[1].trim().to_string())
        .collect()
}

/// Parses the common subset of the metadata header: `key: scalar` and
/// `key:\n  - item\n  - item` sequences. On malformed input returns an
/// empty map and continues (`spec.md` §4.3).
fn parse_header(block: &str) -> HeaderMap {
    let mut map = HeaderMap::new();
    let mut pending_key: Option<String> = None;
    let mut pending_list: Vec<String> = Vec::new();

    fn flush(map: &mut HeaderMap, key: Option<String>, list: &mut Vec<String>) {
        if let Some(key) = key {
            if !list.is_empty() {
                map.insert(key, HeaderValue::List(std::mem::take(list)));
            }
        }
        list.clear();
    }

    for line in block.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let trimmed = line.trim_start();
        if let Some(item) = trimmed.strip_prefix("- ") {
            pending_list.push(item.trim().trim_matches('"').to_string());
            continue;
        }

        flush(&mut map, pending_key.take(), &mut pending_list);

        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_string();
        let value = value.trim();

        if value.is_empty() {
            pending_key = Some(key);
        } else if let Some(inline_list) = value.strip_prefix('[').and_then(|v| v.strip_suffix(']')) {
            let items: Vec<String> = inline_list
                .split(',')
                .map(|s| s.trim().trim_matches('"').to_string())
                .filter(|s| !s.is_empty())
                .collect();
            map.insert(key, HeaderValue::List(items));
        } else {
            map.insert(key, HeaderValue::Scalar(value.trim_matches('"').to_string()));
        }
    }
    flush(&mut map, pending_key, &mut pending_list);

    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::note::strip_header;

    #[test]
    fn parses_scalar_and_sequence_header() {
        let block = "tags: [project, urgent]\nstatus: active\nextra:\n  - one\n  - two\n";
        let map = parse_header(block);
        assert_eq!(
            map.get("tags"),
            Some(&HeaderValue::List(vec!["project".into(), "urgent".into()]))
        );
        assert_eq!(
            map.get("status"),
            Some(&HeaderValue::Scalar("active".into()))
        );
        assert_eq!(
            map.get("extra"),
            Some(&HeaderValue::List(vec!["one".into(), "two".into()]))
        );
    }

    #[test]
    fn strips_fenced_header_from_body() {
        let raw = "---\ntags: [x]\n---\nBody text here\n";
        let (header, body) = strip_header(raw);
        assert!(header.unwrap().contains("tags: [x]"));
        assert_eq!(body.trim(), "Body text here");
    }

    #[test]
    fn missing_header_keeps_whole_body() {
        let raw = "Just a plain note with no header.\n";
        let (header, body) = strip_header(raw);
        assert!(header.is_none());
        assert_eq!(body, raw);
    }

    #[test]
    fn extracts_tags_links_and_attachments() {
        let body = "Working on #project and linking to [[Other Note]]. See ![diagram](img.png) and a mail#not-a-tag";
        assert_eq!(extract_tags(body), vec!["project".to_string()]);
        assert_eq!(extract_links(body), vec!["Other Note".to_string()]);
        assert_eq!(extract_attachments(body), vec!["img.png".to_string()]);
    }

    #[test]
    fn locates_category_and_subfolder() {
        let root = Path::new("/vault");
        let (cat, folder) = locate_in_vault(Path::new("/vault/01-Projects/Ship It/todo.md"), root);
        assert_eq!(cat, Category::Projects);
        assert_eq!(folder.as_deref(), Some("Ship It"));

        let (cat, folder) = locate_in_vault(Path::new("/vault/00-Inbox/draft.md"), root);
        assert_eq!(cat, Category::Inbox);
        assert_eq!(folder, None);
    }

    #[test]
    fn list_notes_skips_hidden_dirs_and_excluded_paths() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("00-Inbox")).unwrap();
        std::fs::create_dir_all(root.join(".para")).unwrap();
        std::fs::create_dir_all(root.join("02-Areas/Personal")).unwrap();
        std::fs::write(root.join("00-Inbox/a.md"), "hello world").unwrap();
        std::fs::write(root.join(".para/ignored.md"), "should not be read").unwrap();
        std::fs::write(root.join("02-Areas/Personal/diary.md"), "secret").unwrap();

        let mut exclusions = ExclusionRegistry::new_in_memory();
        exclusions
            .add(&root.join("02-Areas/Personal"), "privacy")
            .unwrap();

        let reader = VaultReader::default();
        let (notes, warnings) = reader.list_notes(root, &exclusions, false).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].file_name(), "a.md");
    }
}
