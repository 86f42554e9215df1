//! Error types for the ladder engine.
//!
//! Every public operation returns [`LadderError`]. The variants follow the
//! engine's failure taxonomy (see [`ErrorKind`]): validation and authorization
//! failures are raised before any state changes, conflicts are raised at the
//! transaction boundary, and only transient storage failures are worth an
//! automatic retry.

use std::fmt;

/// Coarse classification of a [`LadderError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or missing input. No side effects.
    Validation,
    /// The request collides with current state. Safe to retry after re-reading.
    Conflict,
    /// The caller may not act on the resource.
    Authorization,
    /// Unknown id.
    NotFound,
    /// Storage unavailable. The only class eligible for automatic retry.
    Transient,
    /// Stored data violates an invariant the engine relies on.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Authorization => "authorization",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Transient => "transient",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Errors returned by ladder operations.
#[derive(Debug, thiserror::Error)]
pub enum LadderError {
    /// Input rejected before touching storage.
    #[error("invalid request: {reason}")]
    Validation { reason: String },

    /// Duplicate slot, already-accepted challenge, duplicate submission, etc.
    #[error("conflict: {reason}")]
    Conflict { reason: String },

    /// The caller is not a participant (or lacks the required role).
    #[error("not authorized: {reason}")]
    Unauthorized { reason: String },

    /// No record with the given id.
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// A state change that is not in the entity's transition table.
    #[error("{entity} cannot go from {from} via {event}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        event: String,
    },

    /// The storage backend failed. Callers may retry.
    #[error("storage unavailable: {reason}")]
    Transient {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Stored data could not be interpreted.
    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl LadderError {
    pub fn validation(reason: impl Into<String>) -> Self {
        LadderError::Validation {
            reason: reason.into(),
        }
    }

    pub fn conflict(reason: impl Into<String>) -> Self {
        LadderError::Conflict {
            reason: reason.into(),
        }
    }

    pub fn unauthorized(reason: impl Into<String>) -> Self {
        LadderError::Unauthorized {
            reason: reason.into(),
        }
    }

    pub fn not_found(kind: &'static str, id: impl fmt::Display) -> Self {
        LadderError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        LadderError::Internal {
            reason: reason.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LadderError::Validation { .. } => ErrorKind::Validation,
            LadderError::Conflict { .. } | LadderError::InvalidTransition { .. } => {
                ErrorKind::Conflict
            }
            LadderError::Unauthorized { .. } => ErrorKind::Authorization,
            LadderError::NotFound { .. } => ErrorKind::NotFound,
            LadderError::Transient { .. } => ErrorKind::Transient,
            LadderError::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Whether a caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

#[cfg(feature = "sql")]
impl From<sqlx::Error> for LadderError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db) = err.as_database_error() {
            if db.is_unique_violation() {
                return LadderError::Conflict {
                    reason: format!(
                        "unique constraint {} violated",
                        db.constraint().unwrap_or("<unnamed>")
                    ),
                };
            }
        }
        LadderError::Transient {
            reason: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}
