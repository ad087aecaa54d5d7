//! Core error types for reclaim-core.
//!
//! This module defines the error hierarchy used across the library,
//! built on thiserror. Transport-level failures (Slack, Sheets, LLM)
//! live next to their clients; everything funnels into [`CoreError`]
//! at the component boundaries.

use std::path::PathBuf;
use thiserror::Error;

use crate::roster::CampaignState;

/// Core error type for reclaim-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Rejected campaign or member state transition
    #[error("Transition error: {0}")]
    Transition(#[from] TransitionError),

    /// Messenger transport errors
    #[error("Messenger error: {0}")]
    Messenger(#[from] crate::messenger::MessengerError),

    /// Ledger transport errors
    #[error("Ledger error: {0}")]
    Ledger(#[from] crate::ledger::LedgerError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Missing required configuration key
    #[error("Missing required configuration key: {0}")]
    MissingKey(String),
}

/// A campaign or member operation was requested in the wrong state.
///
/// These are rejected synchronously with no mutation; retrying the
/// same request is an idempotent no-op.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// Campaign is not in the state the operation requires
    #[error("campaign {id} is in state '{actual}', operation requires '{expected}'")]
    WrongCampaignState {
        id: i64,
        actual: CampaignState,
        expected: CampaignState,
    },

    /// A manager may only run one non-terminal campaign at a time
    #[error("manager '{manager}' already has an active campaign (id {id})")]
    ActiveCampaignExists { manager: String, id: i64 },

    /// The requester's profile does not grant campaign administration
    #[error("only IT team members can run campaigns")]
    NotAuthorized,

    /// Campaign does not exist
    #[error("campaign {0} not found")]
    CampaignNotFound(i64),

    /// Member does not exist
    #[error("member {0} not found")]
    MemberNotFound(i64),

    /// Finalization requires a reachable ledger sheet
    #[error("ledger '{reference}' is not usable: {message}")]
    LedgerUnusable { reference: String, message: String },
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseLocked {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
