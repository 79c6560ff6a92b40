/// A user's books within one tier, best first.
use std::cmp::Ordering;

use crate::resolver::{redistribute, round_score};
use crate::types::{RankedBook, Tier};

/// Score-descending sequence of one user's books within one tier.
///
/// Adjacent books never share a score once rounded to the persisted
/// precision. `initialize` repairs input that breaks this.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RankedBookStore {
    tier: Tier,
    books: Vec<RankedBook>,
    /// Set when `initialize` changed any loaded score.
    repaired: bool,
}

impl RankedBookStore {
    /// An empty tier.
    pub fn new(tier: Tier) -> Self {
        RankedBookStore { tier, books: Vec::new(), repaired: false }
    }

    /// Build a store from books loaded out of persistence.
    ///
    /// Sorts by score descending (ties broken by id so the order is stable
    /// across loads). If two books end up with the same rounded score, or a
    /// score is not finite, the whole tier is redistributed. Either change
    /// marks the store as `repaired`, and the stored rows no longer match it.
    pub fn initialize(tier: Tier, existing_books: Vec<RankedBook>) -> Self {
        let mut repaired = false;
        let mut books: Vec<RankedBook> = existing_books
            .into_iter()
            .map(|mut b| {
                let rounded = round_score(b.score);
                // NaN != NaN, so non-finite input always counts as a change.
                repaired |= rounded != b.score;
                b.score = rounded;
                b
            })
            .collect();

        books.sort_by(|a, b| by_score_desc(a, b).then_with(|| a.id.cmp(&b.id)));

        let mut store = RankedBookStore { tier, books, repaired };
        if !store.is_strictly_descending() {
            tracing::warn!(
                %tier,
                books = store.books.len(),
                "tier has duplicate or invalid scores, redistributing"
            );
            store.books = redistribute(&store.books, tier);
            store.repaired = true;
        }
        store
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    pub fn books(&self) -> &[RankedBook] {
        &self.books
    }

    pub fn get(&self, index: usize) -> Option<&RankedBook> {
        self.books.get(index)
    }

    pub fn position_of(&self, book_id: &str) -> Option<usize> {
        self.books.iter().position(|b| b.id == book_id)
    }

    /// Remove a book from the shelf. Remaining books keep their scores.
    pub fn remove(&mut self, book_id: &str) -> Option<RankedBook> {
        let index = self.position_of(book_id)?;
        Some(self.books.remove(index))
    }

    /// Whether loading changed any score, so the whole tier must be rewritten.
    pub fn repaired(&self) -> bool {
        self.repaired
    }

    /// True if every score is finite and strictly below its predecessor.
    pub fn is_strictly_descending(&self) -> bool {
        self.books.iter().all(|b| b.score.is_finite())
            && self.books.windows(2).all(|w| w[0].score > w[1].score)
    }
}

/// NaN sorts last.
fn rank_key(score: f64) -> f64 {
    if score.is_nan() {
        f64::NEG_INFINITY
    } else {
        score
    }
}

/// Order two books by score, best first.
pub fn by_score_desc(a: &RankedBook, b: &RankedBook) -> Ordering {
    rank_key(b.score).total_cmp(&rank_key(a.score))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(id: &str, score: f64) -> RankedBook {
        RankedBook {
            id: id.to_string(),
            title: format!("Title {id}"),
            authors: vec!["Author".to_string()],
            cover_url: None,
            score,
        }
    }

    fn ids(store: &RankedBookStore) -> Vec<&str> {
        store.books().iter().map(|b| b.id.as_str()).collect()
    }

    #[test]
    fn test_initialize_sorts_descending() {
        let store = RankedBookStore::initialize(
            Tier::Liked,
            vec![book("c", 7.0), book("a", 10.0), book("b", 8.0)],
        );
        assert_eq!(ids(&store), vec!["a", "b", "c"]);
        assert!(store.is_strictly_descending());
        assert!(!store.repaired());
        assert_eq!(store.get(1).map(|b| b.score), Some(8.0));
    }

    #[test]
    fn test_initialize_rounds_scores() {
        let store = RankedBookStore::initialize(Tier::Fine, vec![book("a", 5.12345)]);
        assert_eq!(store.books()[0].score, 5.123);
        assert!(store.repaired());
    }

    #[test]
    fn test_initialize_repairs_duplicates() {
        let store = RankedBookStore::initialize(
            Tier::Liked,
            vec![book("b", 8.0), book("a", 8.0), book("c", 9.0)],
        );
        // Order is score first, then id for the tie.
        assert_eq!(ids(&store), vec!["c", "a", "b"]);
        assert!(store.is_strictly_descending());
        assert!(store.repaired());
        let (lower, upper) = Tier::Liked.bounds();
        assert!(store.books().iter().all(|b| b.score > lower && b.score < upper));
    }

    #[test]
    fn test_initialize_repairs_nan() {
        let store = RankedBookStore::initialize(
            Tier::Disliked,
            vec![book("nan", f64::NAN), book("a", 2.0)],
        );
        assert_eq!(ids(&store), vec!["a", "nan"]);
        assert!(store.is_strictly_descending());
        assert!(store.repaired());
    }

    #[test]
    fn test_remove_keeps_other_scores() {
        let mut store = RankedBookStore::initialize(
            Tier::Liked,
            vec![book("a", 10.0), book("b", 8.0), book("c", 7.0)],
        );
        let removed = store.remove("b").unwrap();
        assert_eq!(removed.id, "b");
        assert_eq!(ids(&store), vec!["a", "c"]);
        assert_eq!(store.books()[1].score, 7.0);
        assert!(store.remove("missing").is_none());
        assert_eq!(store.position_of("c"), Some(1));
    }

    #[test]
    fn test_empty_store() {
        let store = RankedBookStore::new(Tier::Fine);
        assert!(store.is_empty());
        assert!(store.is_strictly_descending());
        assert!(!store.repaired());
        assert_eq!(store.tier(), Tier::Fine);
    }
}
