//! # para-core
//!
//! A hybrid classifier for the PARA note-organization method (Projects,
//! Areas, Resources, Archive). Given a vault of Markdown notes, para-core
//! proposes and, on request, applies moves that sort notes into the right
//! bucket by combining three independent signals:
//!
//! - **Rule engine**: deterministic votes from tags, TODOs, dates, and
//!   completion markers.
//! - **Semantic index**: a brute-force k-NN lookup over embeddings of
//!   already-classified notes.
//! - **LLM classifier**: a single categorical judgment plus a suggested
//!   folder name, from a locally- or remotely-hosted model.
//!
//! Decision Fusion combines the three with dynamically adjusted weights,
//! and every classification is recorded as an append-only Decision Record
//! that the Feedback Loop later reads to nudge those weights.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use para_core::{Config, Session, Scope};
//!
//! let mut config = Config::default();
//! config.vault_path = Some("/path/to/vault".into());
//!
//! let session = Session::open(config)?;
//! let plan = session.plan(Scope::Inbox, None, false)?;
//! println!("{} notes would move", plan.actions.len());
//! ```
//!
//! ## Feature Flags
//!
//! - `embeddings` (default): generate embeddings locally with `fastembed`.
//!   Without it, embedding calls degrade to [`EmbeddingError::EmbedderUnavailable`](embeddings::EmbeddingError)
//!   and planning falls back to the LLM and rule signals only.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod config;
pub mod embeddings;
pub mod error;
pub mod executor;
pub mod exclusions;
pub mod feedback;
pub mod features;
pub mod fusion;
pub mod learning_store;
pub mod llm;
pub mod naming;
pub mod planner;
pub mod reindex;
pub mod rules;
pub mod semantic_index;
pub mod session;
pub mod snapshot;
pub mod vault;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

pub use config::Config;
pub use error::{CoreError, ErrorKind, Result};

pub use vault::{Category, HeaderMap, HeaderValue, Note, NoteId, ReadWarning, VaultReader};

pub use features::{ContentPattern, FeatureVector, Recency};

pub use exclusions::{ExclusionEntry, ExclusionRegistry};

pub use embeddings::{CachingEmbedder, Embedder, Embedding, EmbeddingError, NullEmbedder};
#[cfg_attr(docsrs, doc(cfg(feature = "embeddings")))]
pub use embeddings::FastEmbedEmbedder;

pub use llm::{HttpLlmClassifier, LlmClassification, LlmClassifier, LlmError, MockLlmClassifier, PromptVariant};

pub use rules::RuleVote;

pub use semantic_index::{IndexEntry, SemanticIndex};

pub use fusion::{Decision, Method, PolicyNudge, SemanticVotes, Weights};

pub use naming::NamingViolation;

pub use planner::{MovePlan, PlanSummary, Planner, PlannedAction, RiskLevel, Scope};

pub use executor::{CancellationToken, ExecutionReport, Executor, FailedAction};

pub use snapshot::{RestoreReport, SnapshotManifest, SnapshotStore};

pub use learning_store::{
    DecisionInput, DecisionRecord, ExportedDecision, ExportedFolderFeedback, FolderPatternStats,
    KnowledgeExport, LearningMetrics, LearningStore, UserFeedback,
};

pub use feedback::{FeedbackLoop, FeedbackLoopReport, NamingPreference};

pub use reindex::{ReindexReport, Reindexer};

pub use session::Session;

// ============================================================================
// PRELUDE
// ============================================================================

/// The most commonly used types, for a single `use para_core::prelude::*;`.
pub mod prelude {
    pub use crate::{
        Category, Config, CoreError, Decision, ErrorKind, ExclusionRegistry, MovePlan, Note,
        NoteId, Planner, Result, Scope, Session,
    };

    #[cfg(feature = "embeddings")]
    pub use crate::FastEmbedEmbedder;
}
