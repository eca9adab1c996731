//! The Note data model and vault-tree reader (C1, `spec.md` §4.1, §3).

mod note;
mod reader;

pub use note::{strip_header, Category, HeaderMap, HeaderValue, Note, NoteId};
pub use reader::{ReadWarning, VaultReader, DEFAULT_NOTE_EXTENSION};
