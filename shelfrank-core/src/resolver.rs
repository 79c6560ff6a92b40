/// Score assignment for insertion points.
///
/// Pure functions over a score-descending slice of books. An insertion index
/// `i` means "the new book will sit at `books[i]` once inserted", so valid
/// indices run from `0` (new best) to `books.len()` (new worst).
use crate::constants::{MIN_SCORE, SCORE_SCALE, SCORE_STEP};
use crate::types::{RankedBook, Tier};

/// Outcome of resolving one insertion point.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Final, rounded score of the new book.
    pub score: f64,
    /// The existing books with fresh scores, when the tier had to be
    /// redistributed. Same order as the input, new book not included.
    pub redistributed: Option<Vec<RankedBook>>,
}

/// Round to the persisted precision (3 decimals, half away from zero).
pub fn round_score(score: f64) -> f64 {
    (score * SCORE_SCALE).round() / SCORE_SCALE
}

fn midpoint(a: f64, b: f64) -> f64 {
    (a + b) / 2.0
}

/// One step below `last`, never below the score floor.
fn extend_below(last: f64) -> f64 {
    let candidate = last - SCORE_STEP;
    if candidate < MIN_SCORE {
        midpoint(last, MIN_SCORE)
    } else {
        candidate
    }
}

/// Score for a new book that beat `books[index]` and lost to `books[index - 1]`.
///
/// At `index == 0` the book extends above the current best.
pub fn before(books: &[RankedBook], index: usize) -> f64 {
    assert!(index < books.len(), "before() index {index} out of range for {} books", books.len());
    if index == 0 {
        round_score(books[0].score + SCORE_STEP)
    } else {
        round_score(midpoint(books[index - 1].score, books[index].score))
    }
}

/// Score for a new book that lost to `books[index]` and beat `books[index + 1]`.
///
/// At the last index the book extends below the current worst.
pub fn after(books: &[RankedBook], index: usize) -> f64 {
    assert!(index < books.len(), "after() index {index} out of range for {} books", books.len());
    if index == books.len() - 1 {
        round_score(extend_below(books[index].score))
    } else {
        round_score(midpoint(books[index].score, books[index + 1].score))
    }
}

/// Score for insertion index `index` in `0..=books.len()`.
pub fn score_at(books: &[RankedBook], tier: Tier, index: usize) -> f64 {
    assert!(index <= books.len(), "insertion index {index} out of range for {} books", books.len());
    if books.is_empty() {
        tier.default_score()
    } else if index == books.len() {
        after(books, index - 1)
    } else {
        before(books, index)
    }
}

/// True if `candidate`, once rounded, would not sit strictly between the
/// neighbours of insertion index `index`.
pub fn collides(books: &[RankedBook], index: usize, candidate: f64) -> bool {
    let candidate = round_score(candidate);
    if !candidate.is_finite() || candidate < MIN_SCORE {
        return true;
    }
    let above = index.checked_sub(1).and_then(|i| books.get(i));
    let below = books.get(index);

    above.is_some_and(|b| candidate >= round_score(b.score))
        || below.is_some_and(|b| candidate <= round_score(b.score))
}

/// Evenly spaced scores for `books` across the tier interval, order preserved.
///
/// With `n` books the spacing is `(upper - lower) / (n + 1)`, so no book
/// lands on a tier edge.
pub fn redistribute(books: &[RankedBook], tier: Tier) -> Vec<RankedBook> {
    let slot = evenly_spaced(tier, books.len());
    books
        .iter()
        .enumerate()
        .map(|(i, book)| book.rescored(slot(i)))
        .collect()
}

/// Score of slot `i` when `count` slots share the tier interval.
fn evenly_spaced(tier: Tier, count: usize) -> impl Fn(usize) -> f64 {
    let (lower, upper) = tier.bounds();
    let gap = (upper - lower) / (count + 1) as f64;
    move |i| round_score(upper - (i + 1) as f64 * gap)
}

/// Resolve the score for insertion index `index`.
pub fn resolve_insertion(books: &[RankedBook], tier: Tier, index: usize) -> Resolution {
    resolve_candidate(books, tier, index, score_at(books, tier, index))
}

/// Resolve a proposed score at `index`.
///
/// Uses `candidate` if it fits between the neighbours, otherwise the regular
/// insertion score for that index, otherwise redistributes the tier and
/// re-runs the insertion against the redistributed baseline.
pub fn resolve_candidate(books: &[RankedBook], tier: Tier, index: usize, candidate: f64) -> Resolution {
    let candidate = round_score(candidate);
    if !collides(books, index, candidate) {
        return Resolution { score: candidate, redistributed: None };
    }

    let regular = score_at(books, tier, index);
    if regular != candidate && !collides(books, index, regular) {
        return Resolution { score: regular, redistributed: None };
    }

    tracing::info!(
        %tier,
        books = books.len(),
        index,
        collided = candidate,
        "score precision exhausted, redistributing tier"
    );

    let spread = redistribute(books, tier);
    let score = score_at(&spread, tier, index);
    if !collides(&spread, index, score) {
        return Resolution { score, redistributed: Some(spread) };
    }

    // Too many books for the interval at this precision: space the new book
    // together with the rest.
    tracing::warn!(%tier, books = books.len(), "tier spacing is at the limit of score precision");
    let slot = evenly_spaced(tier, books.len() + 1);
    let spread = books
        .iter()
        .enumerate()
        .map(|(i, book)| book.rescored(slot(if i < index { i } else { i + 1 })))
        .collect();
    Resolution { score: slot(index), redistributed: Some(spread) }
}
