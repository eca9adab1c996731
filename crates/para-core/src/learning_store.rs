//! Learning Store (C12, `spec.md` §4.12).
//!
//! Persists append-only Decision Records and folder-creation feedback, and
//! derives the metrics the Feedback Loop (C13) and the programmatic
//! surface (`spec.md` §6 `learning.*`) read back. Schema evolves through a
//! `Migration` array, matching the teacher's storage migration style
//! rather than the single-`CREATE TABLE IF NOT EXISTS` string used by
//! [`crate::semantic_index`] — deliberately varied texture, same idiom.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, ErrorKind, Result};
use crate::fusion::{Method, Weights};
use crate::planner::PlannedAction;
use crate::vault::{Category, NoteId};

struct Migration {
    version: i64,
    description: &'static str,
    up: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "initial decisions, folder_creation_feedback, learning_snapshots tables",
        up: "
        CREATE TABLE IF NOT EXISTS decisions (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            note_id             TEXT NOT NULL,
            decided_at          TEXT NOT NULL,
            category            TEXT NOT NULL,
            folder_name         TEXT NOT NULL,
            confidence          REAL NOT NULL,
            method              TEXT NOT NULL,
            semantic_score      REAL NOT NULL,
            llm_score           REAL NOT NULL,
            rule_score          REAL NOT NULL,
            weight_semantic     REAL NOT NULL,
            weight_llm          REAL NOT NULL,
            weight_rule         REAL NOT NULL,
            reasoning           TEXT NOT NULL,
            factors_applied     TEXT NOT NULL,
            user_feedback       TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_decisions_note_id ON decisions(note_id);
        CREATE TABLE IF NOT EXISTS folder_creation_feedback (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            folder_name         TEXT NOT NULL,
            consolidation_key   TEXT NOT NULL,
            category            TEXT NOT NULL,
            created_at          TEXT NOT NULL,
            accepted            INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_folder_feedback_key ON folder_creation_feedback(consolidation_key);
        CREATE TABLE IF NOT EXISTS learning_snapshots (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            taken_at            TEXT NOT NULL,
            accuracy_rate       REAL NOT NULL,
            confidence_correlation REAL NOT NULL,
            category_balance    REAL NOT NULL,
            semantic_coherence  REAL NOT NULL,
            user_satisfaction   REAL NOT NULL,
            learning_velocity   REAL NOT NULL,
            improvement_score   REAL NOT NULL
        );
        ",
    },
    Migration {
        version: 2,
        description: "add total_classifications and system_adaptability to learning_snapshots",
        up: "
        ALTER TABLE learning_snapshots ADD COLUMN total_classifications INTEGER NOT NULL DEFAULT 0;
        ALTER TABLE learning_snapshots ADD COLUMN system_adaptability REAL NOT NULL DEFAULT 0.0;
        ",
    },
];

fn apply_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
    )?;
    let current: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))
        .unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version > current {
            conn.execute_batch(migration.up)?;
            conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                params![migration.version],
            )?;
            tracing::debug!(version = migration.version, description = migration.description, "applied learning store migration");
        }
    }
    Ok(())
}

/// Verdict recorded against a Decision Record by the user
/// (`spec.md` §4.12: "the one mutable field on an otherwise append-only
/// record").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserFeedback {
    Accepted,
    Corrected,
}

impl UserFeedback {
    fn as_str(self) -> &'static str {
        match self {
            UserFeedback::Accepted => "accepted",
            UserFeedback::Corrected => "corrected",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "accepted" => Some(UserFeedback::Accepted),
            "corrected" => Some(UserFeedback::Corrected),
            _ => None,
        }
    }
}

/// What [`Executor`](crate::executor::Executor) appends after each applied
/// move (`spec.md` §4.12 Decision Record fields).
#[derive(Debug, Clone)]
pub struct DecisionInput {
    pub note_id: NoteId,
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

impl DecisionInput {
    pub fn from_action(note_id: NoteId, action: &PlannedAction) -> Self {
        Self {
            note_id,
            category: action.category,
            folder_name: action.folder_name.clone(),
            confidence: action.confidence,
            method: action.method,
            semantic_score: action.semantic_score,
            llm_score: action.llm_score,
            rule_score: action.rule_score,
            weights: action.weights,
            reasoning: action.reasoning.clone(),
            factors_applied: action.factors_applied.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DecisionRecord {
    pub id: i64,
    pub note_id: NoteId,
    pub decided_at: DateTime<Utc>,
    pub category: Category,
    pub folder_name: String,
    pub confidence: f64,
    pub method: Method,
    pub semantic_score: f64,
    pub llm_score: f64,
    pub rule_score: f64,
    pub weights: Weights,
    pub reasoning: String,
    pub factors_applied: Vec<String>,
    pub user_feedback: Option<UserFeedback>,
}

/// `spec.md` §4.12 "aggregate learning metrics" plus `spec.md` §6
/// `learning.metrics()`, and the Learning Snapshot schema of `spec.md` §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningMetrics {
    pub total_classifications: u64,
    pub accuracy_rate: f64,
    pub confidence_correlation: f64,
    pub category_balance: f64,
    pub semantic_coherence: f64,
    pub user_satisfaction: f64,
    pub learning_velocity: f64,
    pub system_adaptability: f64,
    pub improvement_score: f64,
}

/// Folder-name pattern success data consumed by naming/planner heuristics
/// (`spec.md` §4.12: "feeds back into ... folder-naming heuristics").
#[derive(Debug, Clone)]
pub struct FolderPatternStats {
    pub consolidation_key: String,
    pub times_created: usize,
    pub times_accepted: usize,
}

impl FolderPatternStats {
    pub fn acceptance_rate(&self) -> f64 {
        if self.times_created == 0 {
            0.0
        } else {
            self.times_accepted as f64 / self.times_created as f64
        }
    }
}

/// Versioned export document (`spec.md` §4.12 export/import,
/// `spec.md` §6 `learning.export()`/`learning.import()`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeExport {
    pub format_version: u32,
    pub exported_at: DateTime<Utc>,
    pub decisions: Vec<ExportedDecision>,
    pub folder_feedback: Vec<ExportedFolderFeedback>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedDecision {
    pub note_id: String,
    pub decided_at: DateTime<Utc>,
    pub category: String,
    pub folder_name: String,
    pub confidence: f64,
    pub method: String,
    pub semantic_score: f64,
    pub llm_score: f64,
    pub rule_score: f64,
    pub weight_semantic: f64,
    pub weight_llm: f64,
    pub weight_rule: f64,
    pub reasoning: String,
    pub factors_applied: Vec<String>,
    pub user_feedback: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedFolderFeedback {
    pub folder_name: String,
    pub consolidation_key: String,
    pub category: String,
    pub created_at: DateTime<Utc>,
    pub accepted: Option<bool>,
}

const EXPORT_FORMAT_VERSION: u32 = 1;

/// `spec.md` §3 "Learning Store", backed by its own SQLite file
/// (`spec.md` §10.6).
pub struct LearningStore {
    conn: Mutex<Connection>,
}

impl LearningStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        apply_migrations(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_migrations(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn record_decision(&self, input: DecisionInput) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let factors_joined = input.factors_applied.join(",");
        conn.execute(
            "INSERT INTO decisions (
                note_id, decided_at, category, folder_name, confidence, method,
                semantic_score, llm_score, rule_score,
                weight_semantic, weight_llm, weight_rule,
                reasoning, factors_applied, user_feedback
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, NULL)",
            params![
                input.note_id.to_string(),
                Utc::now().to_rfc3339(),
                input.category.as_str(),
                input.folder_name,
                input.confidence,
                input.method.as_str(),
                input.semantic_score,
                input.llm_score,
                input.rule_score,
                input.weights.semantic,
                input.weights.llm,
                input.weights.rule,
                input.reasoning,
                factors_joined,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Records whether a just-created folder was kept (`accepted`) or
    /// immediately consolidated away (`spec.md` §4.9 `suggest_naming`
    /// feedback loop).
    pub fn record_folder_creation(
        &self,
        folder_name: &str,
        consolidation_key: &str,
        category: Category,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO folder_creation_feedback
                (folder_name, consolidation_key, category, created_at, accepted)
             VALUES (?1, ?2, ?3, ?4, NULL)",
            params![
                folder_name,
                consolidation_key,
                category.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn mark_folder_outcome(&self, consolidation_key: &str, accepted: bool) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE folder_creation_feedback SET accepted = ?1
             WHERE id = (SELECT id FROM folder_creation_feedback
                         WHERE consolidation_key = ?2 ORDER BY created_at DESC LIMIT 1)",
            params![accepted as i64, consolidation_key],
        )?;
        Ok(())
    }

    /// `spec.md` §4.12: "the one mutable field on an otherwise append-only
    /// record" (I4/P4). Only `user_feedback` is ever updated in place.
    pub fn apply_feedback(&self, decision_id: i64, feedback: UserFeedback) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE decisions SET user_feedback = ?1 WHERE id = ?2",
            params![feedback.as_str(), decision_id],
        )?;
        if updated == 0 {
            return Err(CoreError::new(
                ErrorKind::PreconditionFailure,
                format!("no decision record with id {decision_id}"),
            ));
        }
        Ok(())
    }

    pub fn decisions(&self) -> Result<Vec<DecisionRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, note_id, decided_at, category, folder_name, confidence, method,
                    semantic_score, llm_score, rule_score,
                    weight_semantic, weight_llm, weight_rule,
                    reasoning, factors_applied, user_feedback
             FROM decisions ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map([], row_to_decision)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn folder_pattern_stats(&self) -> Result<Vec<FolderPatternStats>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT consolidation_key,
                    COUNT(*) as times_created,
                    SUM(CASE WHEN accepted = 1 THEN 1 ELSE 0 END) as times_accepted
             FROM folder_creation_feedback
             GROUP BY consolidation_key",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(FolderPatternStats {
                    consolidation_key: row.get(0)?,
                    times_created: row.get::<_, i64>(1)? as usize,
                    times_accepted: row.get::<_, Option<i64>>(2)?.unwrap_or(0) as usize,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// `spec.md` §4.12 derived metrics. `accuracy_rate` is computed as
    /// `accepted_count / feedback_count` rather than
    /// `corrected_count / feedback_count`, so that a new correction
    /// *lowers* accuracy rather than raising it (resolves the inconsistency
    /// between the literal §4.12 formula and scenario S6's described
    /// direction; recorded in the grounding ledger).
    pub fn compute_metrics(&self) -> Result<LearningMetrics> {
        let decisions = self.decisions()?;
        let total_classifications = decisions.len() as u64;

        let feedback_count = decisions
            .iter()
            .filter(|d| d.user_feedback.is_some())
            .count();
        let accepted_count = decisions
            .iter()
            .filter(|d| matches!(d.user_feedback, Some(UserFeedback::Accepted)))
            .count();
        let accuracy_rate = if feedback_count == 0 {
            1.0
        } else {
            accepted_count as f64 / feedback_count as f64
        };

        let feedback_rate = if decisions.is_empty() {
            0.0
        } else {
            feedback_count as f64 / decisions.len() as f64
        };

        let confidence_correlation = confidence_correlation(&decisions);
        let category_balance = category_balance(&decisions);
        let semantic_coherence = average_score(&decisions, |d| d.semantic_score);
        let user_satisfaction = user_satisfaction(feedback_rate);
        let recent_accuracy = self.recent_snapshot_accuracy(LEARNING_VELOCITY_WINDOW)?;
        let accuracy_slope = linear_slope(&recent_accuracy);
        let learning_velocity = accuracy_slope
            .map(|s| (s.clamp(-1.0, 1.0) + 1.0) / 2.0)
            .unwrap_or(0.5);
        let system_adaptability = accuracy_slope.map(|s| s.abs().min(1.0)).unwrap_or(0.0);
        let improvement_score = (accuracy_rate
            + confidence_correlation
            + category_balance
            + user_satisfaction)
            / 4.0;

        Ok(LearningMetrics {
            total_classifications,
            accuracy_rate,
            confidence_correlation,
            category_balance,
            semantic_coherence,
            user_satisfaction,
            learning_velocity,
            system_adaptability,
            improvement_score,
        })
    }

    /// `accuracy_rate` of the last `limit` snapshots, oldest first, for
    /// [`learning_velocity`]/`system_adaptability`'s slope computation.
    fn recent_snapshot_accuracy(&self, limit: usize) -> Result<Vec<f64>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT accuracy_rate FROM learning_snapshots ORDER BY taken_at DESC LIMIT ?1",
        )?;
        let mut rows = stmt
            .query_map(params![limit as i64], |row| row.get::<_, f64>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.reverse();
        Ok(rows)
    }

    pub fn take_snapshot(&self) -> Result<()> {
        let metrics = self.compute_metrics()?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO learning_snapshots (
                taken_at, accuracy_rate, confidence_correlation, category_balance,
                semantic_coherence, user_satisfaction, learning_velocity, improvement_score,
                total_classifications, system_adaptability
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                Utc::now().to_rfc3339(),
                metrics.accuracy_rate,
                metrics.confidence_correlation,
                metrics.category_balance,
                metrics.semantic_coherence,
                metrics.user_satisfaction,
                metrics.learning_velocity,
                metrics.improvement_score,
                metrics.total_classifications as i64,
                metrics.system_adaptability,
            ],
        )?;
        Ok(())
    }

    pub fn export(&self) -> Result<KnowledgeExport> {
        let decisions = self.decisions()?;
        let exported_decisions = decisions
            .into_iter()
            .map(|d| ExportedDecision {
                note_id: d.note_id.to_string(),
                decided_at: d.decided_at,
                category: d.category.as_str().to_string(),
                folder_name: d.folder_name,
                confidence: d.confidence,
                method: d.method.as_str().to_string(),
                semantic_score: d.semantic_score,
                llm_score: d.llm_score,
                rule_score: d.rule_score,
                weight_semantic: d.weights.semantic,
                weight_llm: d.weights.llm,
                weight_rule: d.weights.rule,
                reasoning: d.reasoning,
                factors_applied: d.factors_applied,
                user_feedback: d.user_feedback.map(|f| f.as_str().to_string()),
            })
            .collect();

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT folder_name, consolidation_key, category, created_at, accepted
             FROM folder_creation_feedback ORDER BY id ASC",
        )?;
        let folder_feedback = stmt
            .query_map([], |row| {
                let accepted: Option<i64> = row.get(4)?;
                Ok(ExportedFolderFeedback {
                    folder_name: row.get(0)?,
                    consolidation_key: row.get(1)?,
                    category: row.get(2)?,
                    created_at: DateTime::parse_from_rfc3339(&row.get::<_, String>(3)?)
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                    accepted: accepted.map(|v| v != 0),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(KnowledgeExport {
            format_version: EXPORT_FORMAT_VERSION,
            exported_at: Utc::now(),
            decisions: exported_decisions,
            folder_feedback,
        })
    }

    /// Imports records from a prior export, skipping anything the version
    /// this store understands cannot represent (`spec.md` §4.12:
    /// "import is additive, never destructive").
    pub fn import(&self, export: &KnowledgeExport) -> Result<usize> {
        if export.format_version > EXPORT_FORMAT_VERSION {
            return Err(CoreError::new(
                ErrorKind::PreconditionFailure,
                format!(
                    "export format version {} is newer than this store supports ({})",
                    export.format_version, EXPORT_FORMAT_VERSION
                ),
            ));
        }

        let conn = self.conn.lock().unwrap();
        let mut imported = 0usize;
        for decision in &export.decisions {
            conn.execute(
                "INSERT INTO decisions (
                    note_id, decided_at, category, folder_name, confidence, method,
                    semantic_score, llm_score, rule_score,
                    weight_semantic, weight_llm, weight_rule,
                    reasoning, factors_applied, user_feedback
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                params![
                    decision.note_id,
                    decision.decided_at.to_rfc3339(),
                    decision.category,
                    decision.folder_name,
                    decision.confidence,
                    decision.method,
                    decision.semantic_score,
                    decision.llm_score,
                    decision.rule_score,
                    decision.weight_semantic,
                    decision.weight_llm,
                    decision.weight_rule,
                    decision.reasoning,
                    decision.factors_applied.join(","),
                    decision.user_feedback,
                ],
            )?;
            imported += 1;
        }
        for feedback in &export.folder_feedback {
            conn.execute(
                "INSERT INTO folder_creation_feedback
                    (folder_name, consolidation_key, category, created_at, accepted)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    feedback.folder_name,
                    feedback.consolidation_key,
                    feedback.category,
                    feedback.created_at.to_rfc3339(),
                    feedback.accepted.map(|v| v as i64),
                ],
            )?;
        }
        Ok(imported)
    }
}

fn row_to_decision(row: &rusqlite::Row) -> rusqlite::Result<DecisionRecord> {
    let note_id_str: String = row.get(1)?;
    let note_id = NoteId(u64::from_str_radix(&note_id_str, 16).unwrap_or(0));
    let decided_at_str: String = row.get(2)?;
    let decided_at = DateTime::parse_from_rfc3339(&decided_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());
    let category_str: String = row.get(3)?;
    let category = Category::parse(&category_str).unwrap_or(Category::Unknown);
    let method_str: String = row.get(6)?;
    let method = parse_method(&method_str);
    let factors_str: String = row.get(14)?;
    let factors_applied = if factors_str.is_empty() {
        Vec::new()
    } else {
        factors_str.split(',').map(|s| s.to_string()).collect()
    };
    let user_feedback: Option<String> = row.get(15)?;

    Ok(DecisionRecord {
        id: row.get(0)?,
        note_id,
        decided_at,
        category,
        folder_name: row.get(4)?,
        confidence: row.get(5)?,
        method,
        semantic_score: row.get(7)?,
        llm_score: row.get(8)?,
        rule_score: row.get(9)?,
        weights: Weights {
            semantic: row.get(10)?,
            llm: row.get(11)?,
            rule: row.get(12)?,
        },
        reasoning: row.get(13)?,
        factors_applied,
        user_feedback: user_feedback.and_then(|s| UserFeedback::parse(&s)),
    })
}

fn parse_method(s: &str) -> Method {
    match s {
        "semantic_only" => Method::SemanticOnly,
        "llm_only" => Method::LlmOnly,
        "rule_only" => Method::RuleOnly,
        "semantic_weighted" => Method::SemanticWeighted,
        "llm_weighted" => Method::LlmWeighted,
        "rule_weighted" => Method::RuleWeighted,
        "consensus" => Method::Consensus,
        _ => Method::Fallback,
    }
}

fn average_score(decisions: &[DecisionRecord], f: impl Fn(&DecisionRecord) -> f64) -> f64 {
    if decisions.is_empty() {
        return 0.0;
    }
    decisions.iter().map(f).sum::<f64>() / decisions.len() as f64
}

/// Number of most recent [`LearningStore::take_snapshot`] rows the
/// `learning_velocity`/`system_adaptability` slope is computed over
/// (`spec.md` §4.12: "slope of accuracy_rate over the last M snapshots").
const LEARNING_VELOCITY_WINDOW: usize = 10;

/// Pearson correlation coefficient between confidence and acceptance
/// (`is_correct` = 1.0 for `Accepted`, 0.0 for `Corrected`), mapped from
/// its native `[-1,1]` range to `[0,1]` via `(ρ+1)/2`; `0.5` when the
/// correlation is undefined (`spec.md` §4.12 `confidence_correlation`).
fn confidence_correlation(decisions: &[DecisionRecord]) -> f64 {
    let pairs: Vec<(f64, f64)> = decisions
        .iter()
        .filter_map(|d| {
            let is_correct = match d.user_feedback {
                Some(UserFeedback::Accepted) => 1.0,
                Some(UserFeedback::Corrected) => 0.0,
                None => return None,
            };
            Some((d.confidence, is_correct))
        })
        .collect();
    match pearson(&pairs) {
        Some(rho) => (rho.clamp(-1.0, 1.0) + 1.0) / 2.0,
        None => 0.5,
    }
}

/// `None` when there are fewer than two samples or either series is
/// constant (zero variance), matching the "undefined" case callers map to
/// a neutral default.
fn pearson(pairs: &[(f64, f64)]) -> Option<f64> {
    let n = pairs.len();
    if n < 2 {
        return None;
    }
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n as f64;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n as f64;
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x <= 1e-12 || var_y <= 1e-12 {
        return None;
    }
    Some(cov / (var_x.sqrt() * var_y.sqrt()))
}

/// Normalized entropy (base 4, one base unit per classifiable category) of
/// the predicted-category distribution; `1.0` is perfectly even, `0.0` is
/// everything in one category (`spec.md` §4.12 `category_balance`).
fn category_balance(decisions: &[DecisionRecord]) -> f64 {
    if decisions.is_empty() {
        return 1.0;
    }
    let total = decisions.len() as f64;
    let mut counts = [0usize; 4];
    for d in decisions {
        if let Some(idx) = Category::CLASSIFIABLE.iter().position(|c| *c == d.category) {
            counts[idx] += 1;
        }
    }
    counts
        .iter()
        .map(|c| {
            if *c == 0 {
                0.0
            } else {
                let p = *c as f64 / total;
                -p * p.log(4.0)
            }
        })
        .sum::<f64>()
        .clamp(0.0, 1.0)
}

/// Monotone in `feedback_rate` (feedback received / decisions made),
/// maximal on `[5%,15%]` and decaying linearly outside that band in both
/// directions (`spec.md` §4.12 `user_satisfaction`). Too little feedback
/// means the system can't tell if users are happy; too much suggests
/// users are having to correct it constantly.
fn user_satisfaction(feedback_rate: f64) -> f64 {
    const PEAK_LOW: f64 = 0.05;
    const PEAK_HIGH: f64 = 0.15;
    if feedback_rate < PEAK_LOW {
        (feedback_rate / PEAK_LOW).clamp(0.0, 1.0)
    } else if feedback_rate <= PEAK_HIGH {
        1.0
    } else {
        (1.0 - (feedback_rate - PEAK_HIGH) / PEAK_HIGH).clamp(0.0, 1.0)
    }
}

/// Ordinary least-squares slope of `series` against its index. `None` for
/// fewer than two points or a constant index variance (can't happen for
/// `len >= 2`, kept as a guard for the degenerate single-point case).
fn linear_slope(series: &[f64]) -> Option<f64> {
    let n = series.len();
    if n < 2 {
        return None;
    }
    let mean_x = (n - 1) as f64 / 2.0;
    let mean_y = series.iter().sum::<f64>() / n as f64;
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, y) in series.iter().enumerate() {
        let dx = i as f64 - mean_x;
        num += dx * (y - mean_y);
        den += dx * dx;
    }
    if den <= 1e-12 {
        return None;
    }
    Some(num / den)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::NoteId;

    fn sample_input(category: Category, confidence: f64) -> DecisionInput {
        DecisionInput {
            note_id: NoteId::from_path(Path::new("/vault/00-Inbox/a.md")),
            category,
            folder_name: "Ship It".to_string(),
            confidence,
            method: Method::Consensus,
            semantic_score: 0.8,
            llm_score: 0.9,
            rule_score: 0.6,
            weights: Weights {
                semantic: 0.5,
                llm: 0.3,
                rule: 0.2,
            },
            reasoning: "test".to_string(),
            factors_applied: vec!["recency"],
        }
    }

    #[test]
    fn record_and_read_back_decision() {
        let store = LearningStore::open_in_memory().unwrap();
        let id = store.record_decision(sample_input(Category::Projects, 0.8)).unwrap();
        let decisions = store.decisions().unwrap();
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].id, id);
        assert_eq!(decisions[0].category, Category::Projects);
        assert!(decisions[0].user_feedback.is_none());
    }

    #[test]
    fn feedback_is_the_only_mutable_field() {
        let store = LearningStore::open_in_memory().unwrap();
        let id = store.record_decision(sample_input(Category::Areas, 0.7)).unwrap();
        store.apply_feedback(id, UserFeedback::Corrected).unwrap();
        let decisions = store.decisions().unwrap();
        assert_eq!(decisions[0].user_feedback, Some(UserFeedback::Corrected));
        assert_eq!(decisions[0].category, Category::Areas);
    }

    #[test]
    fn accuracy_rate_drops_when_a_correction_is_recorded() {
        let store = LearningStore::open_in_memory().unwrap();
        let id1 = store.record_decision(sample_input(Category::Projects, 0.8)).unwrap();
        let id2 = store.record_decision(sample_input(Category::Projects, 0.8)).unwrap();
        store.apply_feedback(id1, UserFeedback::Accepted).unwrap();
        let before = store.compute_metrics().unwrap().accuracy_rate;
        assert_eq!(before, 1.0);

        store.apply_feedback(id2, UserFeedback::Corrected).unwrap();
        let after = store.compute_metrics().unwrap().accuracy_rate;
        assert!(after < before);
        assert!((before - after - 0.5).abs() < 1e-9);
    }

    #[test]
    fn export_then_import_into_fresh_store_round_trips() {
        let store = LearningStore::open_in_memory().unwrap();
        let id = store.record_decision(sample_input(Category::Resources, 0.6)).unwrap();
        store.apply_feedback(id, UserFeedback::Accepted).unwrap();
        store
            .record_folder_creation("Ship It", "ship it", Category::Resources)
            .unwrap();
        store.mark_folder_outcome("ship it", true).unwrap();

        let export = store.export().unwrap();
        assert_eq!(export.decisions.len(), 1);
        assert_eq!(export.folder_feedback.len(), 1);

        let fresh = LearningStore::open_in_memory().unwrap();
        let imported = fresh.import(&export).unwrap();
        assert_eq!(imported, 1);
        assert_eq!(fresh.decisions().unwrap().len(), 1);
        assert_eq!(fresh.folder_pattern_stats().unwrap().len(), 1);
    }

    #[test]
    fn total_classifications_counts_all_decisions() {
        let store = LearningStore::open_in_memory().unwrap();
        store.record_decision(sample_input(Category::Projects, 0.8)).unwrap();
        store.record_decision(sample_input(Category::Areas, 0.5)).unwrap();
        store.record_decision(sample_input(Category::Resources, 0.6)).unwrap();
        assert_eq!(store.compute_metrics().unwrap().total_classifications, 3);
    }

    #[test]
    fn confidence_correlation_is_one_when_high_confidence_is_always_accepted() {
        let store = LearningStore::open_in_memory().unwrap();
        let id1 = store.record_decision(sample_input(Category::Projects, 0.9)).unwrap();
        let id2 = store.record_decision(sample_input(Category::Projects, 0.1)).unwrap();
        store.apply_feedback(id1, UserFeedback::Accepted).unwrap();
        store.apply_feedback(id2, UserFeedback::Corrected).unwrap();
        let metrics = store.compute_metrics().unwrap();
        assert!((metrics.confidence_correlation - 1.0).abs() < 1e-9);
    }

    #[test]
    fn confidence_correlation_is_zero_when_high_confidence_is_always_corrected() {
        let store = LearningStore::open_in_memory().unwrap();
        let id1 = store.record_decision(sample_input(Category::Projects, 0.9)).unwrap();
        let id2 = store.record_decision(sample_input(Category::Projects, 0.1)).unwrap();
        store.apply_feedback(id1, UserFeedback::Corrected).unwrap();
        store.apply_feedback(id2, UserFeedback::Accepted).unwrap();
        let metrics = store.compute_metrics().unwrap();
        assert!(metrics.confidence_correlation.abs() < 1e-9);
    }

    #[test]
    fn confidence_correlation_is_neutral_when_undefined() {
        let store = LearningStore::open_in_memory().unwrap();
        let id = store.record_decision(sample_input(Category::Projects, 0.9)).unwrap();
        store.apply_feedback(id, UserFeedback::Accepted).unwrap();
        let metrics = store.compute_metrics().unwrap();
        assert!((metrics.confidence_correlation - 0.5).abs() < 1e-9);
    }

    #[test]
    fn category_balance_is_one_across_an_even_split() {
        let store = LearningStore::open_in_memory().unwrap();
        for category in Category::CLASSIFIABLE {
            store.record_decision(sample_input(category, 0.7)).unwrap();
        }
        let metrics = store.compute_metrics().unwrap();
        assert!((metrics.category_balance - 1.0).abs() < 1e-9);
    }

    #[test]
    fn category_balance_is_zero_when_every_decision_shares_a_category() {
        let store = LearningStore::open_in_memory().unwrap();
        for _ in 0..4 {
            store.record_decision(sample_input(Category::Projects, 0.7)).unwrap();
        }
        let metrics = store.compute_metrics().unwrap();
        assert!(metrics.category_balance.abs() < 1e-9);
    }

    #[test]
    fn user_satisfaction_peaks_inside_the_five_to_fifteen_percent_band() {
        let store = LearningStore::open_in_memory().unwrap();
        for i in 0..20u64 {
            let id = store
                .record_decision(sample_input(Category::Projects, 0.7))
                .unwrap();
            if i == 0 {
                store.apply_feedback(id, UserFeedback::Accepted).unwrap();
            }
        }
        // feedback_rate = 1/20 = 5%, the low edge of the peak band.
        let metrics = store.compute_metrics().unwrap();
        assert!((metrics.user_satisfaction - 1.0).abs() < 1e-9);
    }

    #[test]
    fn user_satisfaction_decays_below_and_above_the_peak_band() {
        let low = LearningStore::open_in_memory().unwrap();
        for i in 0..100u64 {
            let id = low.record_decision(sample_input(Category::Projects, 0.7)).unwrap();
            if i == 0 {
                low.apply_feedback(id, UserFeedback::Accepted).unwrap();
            }
        }
        // feedback_rate = 1/100 = 1%.
        let low_satisfaction = low.compute_metrics().unwrap().user_satisfaction;
        assert!((low_satisfaction - 0.2).abs() < 1e-9);

        let high = LearningStore::open_in_memory().unwrap();
        for i in 0..20u64 {
            let id = high.record_decision(sample_input(Category::Projects, 0.7)).unwrap();
            if i < 6 {
                high.apply_feedback(id, UserFeedback::Accepted).unwrap();
            }
        }
        // feedback_rate = 6/20 = 30%, where the decay bottoms out at 0.
        let high_satisfaction = high.compute_metrics().unwrap().user_satisfaction;
        assert!(high_satisfaction.abs() < 1e-9);
    }

    #[test]
    fn learning_velocity_and_adaptability_track_an_improving_snapshot_trend() {
        let store = LearningStore::open_in_memory().unwrap();

        let id1 = store.record_decision(sample_input(Category::Projects, 0.7)).unwrap();
        store.apply_feedback(id1, UserFeedback::Corrected).unwrap();
        store.take_snapshot().unwrap(); // accuracy_rate = 0/1 = 0.0

        let id2 = store.record_decision(sample_input(Category::Projects, 0.7)).unwrap();
        store.apply_feedback(id2, UserFeedback::Accepted).unwrap();
        store.take_snapshot().unwrap(); // accuracy_rate = 1/2 = 0.5

        let id3 = store.record_decision(sample_input(Category::Projects, 0.7)).unwrap();
        store.apply_feedback(id3, UserFeedback::Accepted).unwrap();
        store.take_snapshot().unwrap(); // accuracy_rate = 2/3

        let metrics = store.compute_metrics().unwrap();
        assert!((metrics.learning_velocity - 2.0 / 3.0).abs() < 1e-9);
        assert!((metrics.system_adaptability - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn learning_velocity_is_neutral_with_fewer_than_two_snapshots() {
        let store = LearningStore::open_in_memory().unwrap();
        let id = store.record_decision(sample_input(Category::Projects, 0.7)).unwrap();
        store.apply_feedback(id, UserFeedback::Accepted).unwrap();
        let metrics = store.compute_metrics().unwrap();
        assert!((metrics.learning_velocity - 0.5).abs() < 1e-9);
        assert_eq!(metrics.system_adaptability, 0.0);
    }

    #[test]
    fn folder_pattern_stats_track_acceptance_rate() {
        let store = LearningStore::open_in_memory().unwrap();
        store
            .record_folder_creation("Ship It", "ship it", Category::Projects)
            .unwrap();
        store
            .record_folder_creation("Ship It 2", "ship it", Category::Projects)
            .unwrap();
        store.mark_folder_outcome("ship it", true).unwrap();

        let stats = store.folder_pattern_stats().unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].times_created, 2);
        assert_eq!(stats[0].times_accepted, 1);
        assert!((stats[0].acceptance_rate() - 0.5).abs() < 1e-9);
    }
}
