//! Error taxonomy for the ingestion and query paths.
//!
//! Connectivity and store-level failures are downgraded to a fallback attempt
//! by the services; only [`IngestError`] and [`ReplayError`] ever reach a
//! caller.

use std::path::PathBuf;

use thiserror::Error;

/// Bad or missing input. Never triggers a write.
#[derive(Debug, Error)]
pub enum ValidationError {
    // ---
    #[error("no JSON object received")]
    NotAnObject,

    #[error("missing required fields: {}", .missing.join(", "))]
    MissingFields {
        missing: Vec<&'static str>,
        required: &'static [&'static str],
        received: Vec<String>,
    },

    #[error("field `{field}` {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Failures talking to the primary store.
#[derive(Debug, Error)]
pub enum PrimaryError {
    // ---
    /// Every address variant was tried and none produced a usable connection.
    #[error("primary store unreachable after {attempts} address variant(s)")]
    ConnectionUnavailable { attempts: usize },

    /// The store rejected a well-formed write.
    #[error("primary store rejected the write: {0}")]
    ConstraintViolation(String),

    #[error("primary store query failed: {0}")]
    Query(String),
}

impl From<sqlx::Error> for PrimaryError {
    fn from(err: sqlx::Error) -> Self {
        // SQLSTATE class 23 is integrity constraint violation.
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.code().is_some_and(|code| code.starts_with("23")) {
                return PrimaryError::ConstraintViolation(db_err.message().to_string());
            }
        }
        PrimaryError::Query(err.to_string())
    }
}

/// Failures persisting the local ledger.
#[derive(Debug, Error)]
pub enum FallbackError {
    // ---
    #[error("failed to write fallback ledger {path}: {source}")]
    FallbackWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode fallback ledger: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Outcome of a rejected submission.
#[derive(Debug, Error)]
pub enum IngestError {
    // ---
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Neither store recorded the submission.
    #[error("persistence unavailable (primary: {primary}; fallback: {fallback})")]
    PersistenceUnavailable {
        primary: PrimaryError,
        fallback: FallbackError,
    },
}

/// Failures of the fallback-to-primary replay.
#[derive(Debug, Error)]
pub enum ReplayError {
    // ---
    #[error(transparent)]
    Primary(#[from] PrimaryError),

    #[error(transparent)]
    Fallback(#[from] FallbackError),
}
