/// Persistence contract and the commit routine.
///
/// The engine never touches storage. Once an insertion is complete the
/// caller hands the result to `commit`, which writes it through a
/// `RankingPersistence` implementation and reads every written row back.
use std::collections::HashMap;

use crate::error::{PersistenceError, RankingError, Result};
use crate::resolver::round_score;
use crate::store::by_score_desc;
use crate::types::{InsertionResult, RankedBook, TierKey};

/// Durable per-book scores, one tier at a time.
pub trait RankingPersistence {
    /// Current books of a tier, in any order.
    fn load_tier(&self, key: &TierKey) -> std::result::Result<Vec<RankedBook>, PersistenceError>;

    /// Create or update exactly one book.
    fn upsert_score(&mut self, key: &TierKey, book: &RankedBook) -> std::result::Result<(), PersistenceError>;

    /// Create or update every book in `books`, or none of them.
    fn upsert_scores_batch(&mut self, key: &TierKey, books: &[RankedBook]) -> std::result::Result<(), PersistenceError>;

    /// Stored score of one book, `None` if the book is not in the tier.
    fn read_score(&self, key: &TierKey, book_id: &str) -> std::result::Result<Option<f64>, PersistenceError>;

    /// Remove a book from the tier. Returns whether it was present.
    fn delete_book(&mut self, key: &TierKey, book_id: &str) -> std::result::Result<bool, PersistenceError>;
}

/// How a result reached storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitReport {
    /// The rewritten tier was written in one batch.
    Batch { rows: usize },
    /// Only the inserted book was written. `fell_back` is set when a batch
    /// was attempted and failed, leaving the other rows on their old scores.
    SingleRow { fell_back: bool },
}

/// Write a completed insertion.
///
/// Rewritten tiers go through the batch path first; if that fails the
/// inserted book alone is written. Every write is read back and compared.
/// Nothing else is retried.
pub fn commit<P>(persistence: &mut P, key: &TierKey, result: &InsertionResult) -> Result<CommitReport>
where
    P: RankingPersistence + ?Sized,
{
    validate(result)?;

    let mut fell_back = false;
    if let Some(batch) = &result.updated_tier_books {
        match persistence.upsert_scores_batch(key, batch) {
            Ok(()) => {
                for book in batch {
                    verify(persistence, key, book)?;
                }
                tracing::info!(
                    user_id = %key.user_id,
                    tier = %key.tier,
                    rows = batch.len(),
                    "committed rewritten tier"
                );
                return Ok(CommitReport::Batch { rows: batch.len() });
            }
            Err(e) => {
                tracing::warn!(
                    user_id = %key.user_id,
                    tier = %key.tier,
                    error = %e,
                    "batch write failed, writing the inserted book alone"
                );
                fell_back = true;
            }
        }
    }

    persistence.upsert_score(key, &result.inserted_book)?;
    verify(persistence, key, &result.inserted_book)?;

    tracing::info!(
        user_id = %key.user_id,
        tier = %key.tier,
        book_id = %result.inserted_book.id,
        score = result.score,
        fell_back,
        "committed ranking"
    );
    Ok(CommitReport::SingleRow { fell_back })
}

/// Reject results that must never reach storage.
pub fn validate(result: &InsertionResult) -> Result<()> {
    if result.position >= result.books.len() {
        return Err(RankingError::DegenerateInput(format!(
            "position {} outside a tier of {} books",
            result.position,
            result.books.len()
        )));
    }
    if result.books[result.position].id != result.inserted_book.id {
        return Err(RankingError::DegenerateInput(format!(
            "book at position {} is not {}",
            result.position, result.inserted_book.id
        )));
    }

    let rows = result.updated_tier_books.iter().flatten().chain(std::iter::once(&result.inserted_book));
    for book in rows {
        if !book.score.is_finite() || book.score < 0.0 {
            return Err(RankingError::DegenerateInput(format!(
                "score {} for book {}",
                book.score, book.id
            )));
        }
    }

    if let Some(pair) = result.books.windows(2).find(|w| w[0].score <= w[1].score) {
        return Err(RankingError::DegenerateInput(format!(
            "books {} ({}) and {} ({}) are not strictly descending",
            pair[0].id, pair[0].score, pair[1].id, pair[1].score
        )));
    }
    Ok(())
}

fn verify<P>(persistence: &P, key: &TierKey, book: &RankedBook) -> Result<()>
where
    P: RankingPersistence + ?Sized,
{
    let stored = persistence.read_score(key, &book.id)?;
    match stored {
        Some(score) if round_score(score) == round_score(book.score) => Ok(()),
        _ => {
            tracing::error!(
                user_id = %key.user_id,
                tier = %key.tier,
                book_id = %book.id,
                expected = book.score,
                ?stored,
                "stored score does not match computed score"
            );
            Err(RankingError::IntegrityMismatch {
                book_id: book.id.clone(),
                expected: book.score,
                stored,
            })
        }
    }
}

/// In-process storage keyed by tier.
#[derive(Debug, Clone, Default)]
pub struct MemoryPersistence {
    tiers: HashMap<TierKey, Vec<RankedBook>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    fn put(rows: &mut Vec<RankedBook>, book: &RankedBook) {
        match rows.iter_mut().find(|b| b.id == book.id) {
            Some(row) => *row = book.clone(),
            None => rows.push(book.clone()),
        }
    }
}

impl RankingPersistence for MemoryPersistence {
    fn load_tier(&self, key: &TierKey) -> std::result::Result<Vec<RankedBook>, PersistenceError> {
        let mut books = self.tiers.get(key).cloned().unwrap_or_default();
        books.sort_by(by_score_desc);
        Ok(books)
    }

    fn upsert_score(&mut self, key: &TierKey, book: &RankedBook) -> std::result::Result<(), PersistenceError> {
        Self::put(self.tiers.entry(key.clone()).or_default(), book);
        Ok(())
    }

    fn upsert_scores_batch(&mut self, key: &TierKey, books: &[RankedBook]) -> std::result::Result<(), PersistenceError> {
        let rows = self.tiers.entry(key.clone()).or_default();
        for book in books {
            Self::put(rows, book);
        }
        Ok(())
    }

    fn read_score(&self, key: &TierKey, book_id: &str) -> std::result::Result<Option<f64>, PersistenceError> {
        Ok(self
            .tiers
            .get(key)
            .and_then(|rows| rows.iter().find(|b| b.id == book_id))
            .map(|b| b.score))
    }

    fn delete_book(&mut self, key: &TierKey, book_id: &str) -> std::result::Result<bool, PersistenceError> {
        let Some(rows) = self.tiers.get_mut(key) else {
            return Ok(false);
        };
        let before = rows.len();
        rows.retain(|b| b.id != book_id);
        Ok(rows.len() != before)
    }
}
