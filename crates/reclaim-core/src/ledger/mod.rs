//! External ledger capability: the human-facing spreadsheet mirror of
//! confirmed decisions.
//!
//! Writes here are best-effort. A confirmation is durable the moment
//! the store commits it; a failed mirror write is logged and the next
//! confirmed decision (or an operator) catches the sheet up.

pub mod sheets;

pub use sheets::SheetLedger;

use async_trait::async_trait;

use crate::roster::Decision;

/// Ledger transport errors.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("Malformed API response: {0}")]
    MalformedResponse(String),
}

/// Spreadsheet mirror of confirmed decisions, keyed by email.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Check the reference points at a sheet we can write.
    async fn verify_access(&self, reference: &str) -> Result<(), LedgerError>;

    /// Write the header row.
    async fn initialize(&self, reference: &str) -> Result<(), LedgerError>;

    /// Record a confirmed decision. Idempotent keyed by email: a
    /// retry with the same arguments updates the same row rather than
    /// appending a duplicate.
    async fn upsert_row(
        &self,
        reference: &str,
        email: &str,
        ping_count: u32,
        decision: Decision,
    ) -> Result<(), LedgerError>;
}
