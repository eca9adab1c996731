//! The Note data model (`spec.md` §3).

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The four PARA buckets plus the two staging states a note can occupy
/// before or outside classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    Projects,
    Areas,
    Resources,
    Archive,
    Inbox,
    Unknown,
}

impl Category {
    /// Priority order used to break ties in Decision Fusion (`spec.md` §4.8
    /// step 4): Projects > Areas > Resources > Archive.
    pub fn tie_break_rank(self) -> u8 {
        match self {
            Category::Projects => 0,
            Category::Areas => 1,
            Category::Resources => 2,
            Category::Archive => 3,
            Category::Inbox => 4,
            Category::Unknown => 5,
        }
    }

    /// The four classifiable categories, in tie-break priority order.
    pub const CLASSIFIABLE: [Category; 4] = [
        Category::Projects,
        Category::Areas,
        Category::Resources,
        Category::Archive,
    ];

    /// The on-disk top-level folder name (`spec.md` §6 vault layout).
    pub fn folder_prefix(self) -> &'static str {
        match self {
            Category::Inbox => "00-Inbox",
            Category::Projects => "01-Projects",
            Category::Areas => "02-Areas",
            Category::Resources => "03-Resources",
            Category::Archive => "04-Archive",
            Category::Unknown => "",
        }
    }

    pub fn from_folder_prefix(name: &str) -> Option<Category> {
        match name {
            "00-Inbox" => Some(Category::Inbox),
            "01-Projects" => Some(Category::Projects),
            "02-Areas" => Some(Category::Areas),
            "03-Resources" => Some(Category::Resources),
            "04-Archive" => Some(Category::Archive),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Projects => "Projects",
            Category::Areas => "Areas",
            Category::Resources => "Resources",
            Category::Archive => "Archive",
            Category::Inbox => "Inbox",
            Category::Unknown => "Unknown",
        }
    }

    /// Inverse of [`Category::as_str`], used by the learning store and
    /// knowledge export/import to round-trip categories through SQLite
    /// text columns and JSON.
    pub fn parse(s: &str) -> Option<Category> {
        match s {
            "Projects" => Some(Category::Projects),
            "Areas" => Some(Category::Areas),
            "Resources" => Some(Category::Resources),
            "Archive" => Some(Category::Archive),
            "Inbox" => Some(Category::Inbox),
            "Unknown" => Some(Category::Unknown),
            _ => None,
        }
    }
}

/// Identity = a stable hash of the note's absolute path (`spec.md` §3,
/// "Note ... Identity = absolute file path's stable hash"). A newtype
/// rather than a bare `u64` so callers cannot accidentally mix note ids
/// with other numeric fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NoteId(pub u64);

impl NoteId {
    pub fn from_path(absolute_path: &Path) -> Self {
        use std::collections::hash_map::DefaultHasher;
        let mut hasher = DefaultHasher::new();
        absolute_path.hash(&mut hasher);
        NoteId(hasher.finish())
    }
}

impl std::fmt::Display for NoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Header scalar/list value (`spec.md` §4.3: "Header parsing accepts the
/// common subset: scalars, sequences").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderValue {
    Scalar(String),
    List(Vec<String>),
}

pub type HeaderMap = BTreeMap<String, HeaderValue>;

/// A single note file (`spec.md` §3).
#[derive(Debug, Clone)]
pub struct Note {
    pub id: NoteId,
    pub path: PathBuf,
    pub raw_text: String,
    pub header: HeaderMap,
    pub tags: Vec<String>,
    pub links: Vec<String>,
    pub attachments: Vec<String>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub word_count: usize,
    pub current_category: Category,
    pub current_folder_name: Option<String>,
}

impl Note {
    /// Content hash used to invalidate the Feature Vector cache
    /// (`spec.md` §3: "Computed by C3, cached by Note id + content hash,
    /// invalidated on content change").
    pub fn content_hash(&self) -> u64 {
        use std::collections::hash_map::DefaultHasher;
        let mut hasher = DefaultHasher::new();
        self.raw_text.hash(&mut hasher);
        hasher.finish()
    }

    pub fn body_without_header(&self) -> &str {
        strip_header(&self.raw_text).1
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Splits a note's raw text into `(header_block, body)`. The header block
/// is `None` when no leading `---`/`---` fence is present.
pub fn strip_header(raw: &str) -> (Option<&str>, &str) {
    let trimmed_start = raw.trim_start_matches('\u{feff}');
    let mut lines = trimmed_start.lines();
    let Some(first) = lines.next() else {
        return (None, raw);
    };
    if first.trim() != "---" {
        return (None, raw);
    }

    // Find the closing fence and the byte offset where the body starts.
    let mut offset = first.len() + 1; // +1 for the newline after the first fence
    for line in lines.clone() {
        if line.trim() == "---" {
            let header = &trimmed_start[first.len() + 1..offset];
            let body_start = (offset + line.len() + 1).min(trimmed_start.len());
            return (Some(header), &trimmed_start[body_start..]);
        }
        offset += line.len() + 1;
    }
    // No closing fence: treat the whole thing as body, no header.
    (None, raw)
}
