//! Crate-wide error taxonomy.
//!
//! `spec.md` §7 distinguishes error *kinds*, not type names, and requires
//! that the core "surfaces structured error records (kind, message,
//! cause-chain, remediation hint)" and "never prints; the CLI collaborator
//! renders." [`CoreError`] is that structured record. Subsystem-specific
//! errors (exclusion, embedding, semantic index, LLM, snapshot, learning
//! store) convert into it via `From`, the way `vestige_core::storage`'s
//! `StorageError` wraps `rusqlite::Error`.

use std::fmt;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, CoreError>;

/// The six error kinds named in `spec.md` §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// Vault missing, exclusions not configured, invalid config. Never retried.
    PreconditionFailure,
    /// Embedder/LLM timeout or unavailability. Retried once, then degraded.
    TransientExternal,
    /// Unparseable header or unreadable file. The note is skipped.
    DataError,
    /// Index/snapshot/learning-store corruption (checksum/schema mismatch).
    IntegrityError,
    /// Plan executed but one or more moves failed.
    PartialExecution,
    /// Cooperative cancellation.
    UserCancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::PreconditionFailure => "precondition failure",
            ErrorKind::TransientExternal => "transient external failure",
            ErrorKind::DataError => "data error",
            ErrorKind::IntegrityError => "integrity error",
            ErrorKind::PartialExecution => "partial execution",
            ErrorKind::UserCancelled => "user cancelled",
        };
        f.write_str(s)
    }
}

/// A structured error record. `message` is the human-readable summary,
/// `remediation` an optional actionable hint the CLI collaborator can
/// surface directly (e.g. "run `exclusions add <path>` first").
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct CoreError {
    pub kind: ErrorKind,
    pub message: String,
    pub remediation: Option<String>,
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl CoreError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            remediation: None,
            cause: None,
        }
    }

    pub fn with_remediation(mut self, remediation: impl Into<String>) -> Self {
        self.remediation = Some(remediation.into());
        self
    }

    pub fn with_cause(
        mut self,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PreconditionFailure, message)
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::IntegrityError, message)
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(e: rusqlite::Error) -> Self {
        CoreError::new(ErrorKind::IntegrityError, e.to_string()).with_cause(e)
    }
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::new(ErrorKind::DataError, e.to_string()).with_cause(e)
    }
}
