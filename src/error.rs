//! Error types for the database access layer.

use crate::config::ConfigError;


/// Result alias used throughout the crate.
pub type DbResult<T> = Result<T, DbError>;

/// SQLSTATE reported by PostgreSQL for unique constraint violations.
const UNIQUE_VIOLATION: &str = "23505";

/// Database access errors.
///
/// Absence is never an error: lookups return `Option` and deletes return the
/// affected-row count.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// Invalid or missing configuration. Fatal at startup.
    #[error("database configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Error reported by the backend, passed through unmodified.
    #[error(transparent)]
    Backend(#[from] sqlx::Error),

    /// Payload shape the normalizer cannot turn into columns.
    #[error("unsupported payload: {0}")]
    TypeMismatch(String),

    /// A row value could not be converted into the requested type.
    #[error("cannot decode column `{column}`: {message}")]
    Decode {
        /// Column name.
        column: String,
        /// What went wrong.
        message: String,
    },

    /// An insert payload normalized to zero columns.
    #[error("payload for table `{table}` produced no columns")]
    EmptyPayload {
        /// Target table.
        table: String,
    },

    /// Statement text and parameter list disagree.
    #[error("statement expects {expected} parameters, got {actual}")]
    ParameterMismatch {
        /// Placeholders found in the statement.
        expected: usize,
        /// Parameters supplied.
        actual: usize,
    },

    /// The pool has been closed.
    #[error("connection pool is closed")]
    PoolClosed,
}

impl DbError {
    /// Creates a decode error for `column`.
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        DbError::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Returns `true` when the backend rejected a write because of a unique
    /// constraint, so callers can report "already exists".
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        match self {
            DbError::Backend(sqlx::Error::Database(err)) => {
                err.code().as_deref() == Some(UNIQUE_VIOLATION)
            }
            _ => false,
        }
    }

    /// Returns `true` when the error means the session can no longer be used.
    #[must_use]
    pub fn is_connection_loss(&self) -> bool {
        matches!(
            self,
            DbError::Backend(
                sqlx::Error::Io(_)
                    | sqlx::Error::Tls(_)
                    | sqlx::Error::Protocol(_)
                    | sqlx::Error::WorkerCrashed
            )
        )
    }
}
