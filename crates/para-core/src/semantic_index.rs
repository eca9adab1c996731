//! Semantic Index (C5, `spec.md` §4.5).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::embeddings::{cosine_similarity, Embedding};
use crate::error::{CoreError, Result};
use crate::vault::{Category, NoteId};

const MIGRATIONS: &str = "
CREATE TABLE IF NOT EXISTS entries (
    note_id TEXT PRIMARY KEY,
    embedding BLOB,
    metadata TEXT NOT NULL,
    assigned_category TEXT NOT NULL,
    folder_name TEXT,
    first_seen TEXT NOT NULL,
    last_updated TEXT NOT NULL,
    needs_reembed INTEGER NOT NULL DEFAULT 0
);
";

/// One row of the semantic index (`spec.md` §4.5).
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub note_id: NoteId,
    pub embedding: Option<Embedding>,
    pub metadata: String,
    pub assigned_category: Category,
    pub folder_name: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub needs_reembed: bool,
}

/// `spec.md` §4.5: "Persisted under the vault in a hidden subdirectory;
/// concurrent access from multiple processes is not supported — a file
/// lock serializes writers." `rusqlite`'s own connection mutex gives us the
/// in-process half of that; cross-process exclusion is provided by SQLite's
/// native file locking on the same path.
pub struct SemanticIndex {
    conn: Mutex<Connection>,
    dimensions: usize,
}

impl SemanticIndex {
    pub fn open(path: &Path, dimensions: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(MIGRATIONS)?;
        Ok(Self {
            conn: Mutex::new(conn),
            dimensions,
        })
    }

    pub fn open_in_memory(dimensions: usize) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(MIGRATIONS)?;
        Ok(Self {
            conn: Mutex::new(conn),
            dimensions,
        })
    }

    pub fn upsert(
        &self,
        note_id: NoteId,
        embedding: Option<&Embedding>,
        metadata: &str,
        assigned_category: Category,
        folder_name: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now();
        let conn = self.conn.lock().unwrap();
        let existing_first_seen: Option<String> = conn
            .query_row(
                "SELECT first_seen FROM entries WHERE note_id = ?1",
                params![note_id.to_string()],
                |row| row.get(0),
            )
            .ok();
        let first_seen = existing_first_seen
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(now);

        let embedding_bytes = embedding.map(|e| encode_embedding(&e.vector));
        let needs_reembed = embedding.is_none();

        conn.execute(
            "INSERT INTO entries (note_id, embedding, metadata, assigned_category, folder_name, first_seen, last_updated, needs_reembed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(note_id) DO UPDATE SET
                embedding = excluded.embedding,
                metadata = excluded.metadata,
                assigned_category = excluded.assigned_category,
                folder_name = excluded.folder_name,
                last_updated = excluded.last_updated,
                needs_reembed = excluded.needs_reembed",
            params![
                note_id.to_string(),
                embedding_bytes,
                metadata,
                assigned_category.as_str(),
                folder_name,
                first_seen.to_rfc3339(),
                now.to_rfc3339(),
                needs_reembed as i64,
            ],
        )?;
        Ok(())
    }

    pub fn delete(&self, note_id: NoteId) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM entries WHERE note_id = ?1",
            params![note_id.to_string()],
        )?;
        Ok(())
    }

    pub fn get(&self, note_id: NoteId) -> Result<Option<IndexEntry>> {
        let conn = self.conn.lock().unwrap();
        let result = conn.query_row(
            "SELECT note_id, embedding, metadata, assigned_category, folder_name, first_seen, last_updated, needs_reembed
             FROM entries WHERE note_id = ?1",
            params![note_id.to_string()],
            row_to_entry,
        );
        match result {
            Ok(entry) => Ok(Some(entry)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(CoreError::from(e)),
        }
    }

    fn all_entries(&self) -> Result<Vec<IndexEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT note_id, embedding, metadata, assigned_category, folder_name, first_seen, last_updated, needs_reembed FROM entries",
        )?;
        let rows = stmt.query_map([], row_to_entry)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Brute-force cosine-distance k-NN, appropriate at personal-vault
    /// scale (`spec.md` §4.5). Ties broken by more recent `last_updated`.
    pub fn knn(&self, embedding: &Embedding, k: usize) -> Result<Vec<(NoteId, f32)>> {
        let mut scored: Vec<(NoteId, f32, DateTime<Utc>)> = self
            .all_entries()?
            .into_iter()
            .filter_map(|entry| {
                let candidate = entry.embedding.as_ref()?;
                let similarity = cosine_similarity(&embedding.vector, &candidate.vector);
                let distance = 1.0 - similarity;
                Some((entry.note_id, distance, entry.last_updated))
            })
            .collect();

        scored.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.2.cmp(&a.2))
        });
        scored.truncate(k);
        Ok(scored.into_iter().map(|(id, dist, _)| (id, dist)).collect())
    }

    pub fn category_distribution(&self) -> Result<HashMap<Category, usize>> {
        let mut distribution = HashMap::new();
        for entry in self.all_entries()? {
            *distribution.entry(entry.assigned_category).or_insert(0) += 1;
        }
        Ok(distribution)
    }

    /// `spec.md` §4.5: "category_of_neighbors(embedding, k) → map<category,
    /// count>" — feeds C8's semantic neighbor vote distribution.
    pub fn category_of_neighbors(
        &self,
        embedding: &Embedding,
        k: usize,
    ) -> Result<HashMap<Category, usize>> {
        let neighbors = self.knn(embedding, k)?;
        let mut counts = HashMap::new();
        for (note_id, _) in neighbors {
            if let Some(entry) = self.get(note_id)? {
                *counts.entry(entry.assigned_category).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.all_entries()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }
}

fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes(chunk.try_into().unwrap()))
        .collect()
}

fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<IndexEntry> {
    let note_id_str: String = row.get(0)?;
    let embedding_bytes: Option<Vec<u8>> = row.get(1)?;
    let metadata: String = row.get(2)?;
    let category_str: String = row.get(3)?;
    let folder_name: Option<String> = row.get(4)?;
    let first_seen: String = row.get(5)?;
    let last_updated: String = row.get(6)?;
    let needs_reembed: i64 = row.get(7)?;

    let note_id = NoteId(u64::from_str_radix(&note_id_str, 16).unwrap_or(0));
    let embedding = embedding_bytes.map(|b| Embedding::new(decode_embedding(&b)));
    let assigned_category = category_from_str(&category_str);
    let first_seen = DateTime::parse_from_rfc3339(&first_seen)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());
    let last_updated = DateTime::parse_from_rfc3339(&last_updated)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    Ok(IndexEntry {
        note_id,
        embedding,
        metadata,
        assigned_category,
        folder_name,
        first_seen,
        last_updated,
        needs_reembed: needs_reembed != 0,
    })
}

fn category_from_str(s: &str) -> Category {
    match s {
        "Projects" => Category::Projects,
        "Areas" => Category::Areas,
        "Resources" => Category::Resources,
        "Archive" => Category::Archive,
        "Inbox" => Category::Inbox,
        _ => Category::Unknown,
    }
}
