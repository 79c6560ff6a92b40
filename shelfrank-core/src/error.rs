use thiserror::Error;

use crate::types::Tier;

/// Failure reported by a `RankingPersistence` implementation.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum RankingError {
    /// A write could not be completed. The in-memory result is still valid,
    /// so the caller may retry the write without re-running comparisons.
    #[error("failed to save ranking: {0}")]
    Persistence(#[from] PersistenceError),

    /// The stored score read back after a write differs from the computed one.
    #[error("integrity mismatch for book {book_id}: expected {expected}, stored {stored:?}")]
    IntegrityMismatch {
        book_id: String,
        expected: f64,
        stored: Option<f64>,
    },

    /// A score or position that must never reach storage.
    #[error("degenerate ranking input: {0}")]
    DegenerateInput(String),

    #[error("an insertion is already in progress for user {user_id} in tier {tier}")]
    InsertionInProgress { user_id: String, tier: Tier },
}

pub type Result<T> = std::result::Result<T, RankingError>;
