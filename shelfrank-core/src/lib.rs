/// shelfrank-core: Pairwise-comparison ranking engine for a reading shelf.
///
/// A newly finished book is placed into a score-descending tier by asking the
/// reader "which did you prefer?", one binary-search step per answer, and
/// its final position is turned into a 3-decimal score.
/// No IO, no HTTP, no filesystem in the engine. Storage sits behind
/// `RankingPersistence`.
///
/// # Quick start
///
/// ```rust
/// use shelfrank_core::{
///     commit, process_comparison, start_insertion, BookMeta, MemoryPersistence,
///     RankedBook, RankingPersistence, Tier, TierKey, TierLocks,
/// };
///
/// let key = TierKey::new("reader-1", Tier::Liked);
/// let locks = TierLocks::new();
/// let mut storage = MemoryPersistence::new();
///
/// let _guard = locks.try_acquire(&key).unwrap();
/// let existing = storage.load_tier(&key).unwrap();
/// let mut state = start_insertion(existing, BookMeta::new("dune", "Dune"), Tier::Liked);
///
/// while let Some(cmp) = state.current_comparison() {
///     println!("{} or {}?", cmp.book_a.title, cmp.book_b.title);
///     state = process_comparison(state, true);
/// }
///
/// let result = state.result().unwrap();
/// assert_eq!(result.score, 10.0); // first book in an empty tier
/// commit(&mut storage, &key, result).unwrap();
/// ```

pub mod constants;
pub mod engine;
pub mod error;
pub mod lock;
pub mod persistence;
pub mod resolver;
pub mod store;
pub mod types;

// Re-export primary public API at crate root.
pub use engine::{
    get_current_comparison, get_result, max_comparisons, process_comparison, start_insertion,
    Phase, RankingState,
};
pub use error::{PersistenceError, RankingError};
pub use lock::{InsertionGuard, TierLocks};
pub use persistence::{commit, CommitReport, MemoryPersistence, RankingPersistence};
pub use resolver::{redistribute, round_score, Resolution};
pub use store::RankedBookStore;
pub use types::{
    BookMeta, Comparison, ComparisonRecord, InsertionResult, ParseTierError, RankedBook, Tier, TierKey,
};
