/// Binary-search insertion driven by the user's answers.
///
/// Pure state machine: no IO, no clock, no suspension points. The caller
/// loads the tier before `start_insertion` and persists the result after the
/// state reaches `Complete`. Dropping a state mid-way is a complete
/// cancellation.
use crate::resolver::{resolve_candidate, resolve_insertion, Resolution};
use crate::store::RankedBookStore;
use crate::types::{BookMeta, Comparison, ComparisonRecord, InsertionResult, RankedBook, Tier};

/// Where an insertion is in its lifecycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Phase {
    /// Constructed but not started.
    #[default]
    Idle,
    /// Waiting for an answer about `store[middle]`.
    Comparing { left: usize, right: usize, middle: usize },
    /// Position and score are final.
    Complete(InsertionResult),
}

/// One in-flight insertion of a new book into a tier.
#[derive(Debug, Clone)]
pub struct RankingState {
    store: RankedBookStore,
    new_book: BookMeta,
    phase: Phase,
    history: Vec<ComparisonRecord>,
}

impl RankingState {
    /// A state in `Idle`. Call `start` to begin comparing.
    pub fn new(store: RankedBookStore, new_book: BookMeta) -> Self {
        RankingState {
            store,
            new_book,
            phase: Phase::Idle,
            history: Vec::new(),
        }
    }

    /// Leave `Idle`: complete immediately on an empty tier, otherwise start
    /// comparing against the middle book.
    pub fn start(&mut self) {
        assert!(
            matches!(self.phase, Phase::Idle),
            "start() called on an insertion that has already started"
        );

        if self.store.is_empty() {
            tracing::debug!(
                tier = %self.store.tier(),
                book_id = %self.new_book.id,
                "empty tier, using default score"
            );
            self.complete(0, resolve_insertion(&[], self.store.tier(), 0));
            return;
        }

        self.compare_within(0, self.store.len() - 1);
    }

    /// Apply one answer. No-op once complete.
    ///
    /// # Panics
    /// If the state was never started.
    pub fn process_comparison(&mut self, user_prefers_new_book: bool) {
        let (left, right, middle) = match self.phase {
            Phase::Idle => panic!("process_comparison() called before start_insertion()"),
            Phase::Complete(_) => return,
            Phase::Comparing { left, right, middle } => (left, right, middle),
        };

        let opponent = &self.store.books()[middle];
        self.history.push(if user_prefers_new_book {
            ComparisonRecord { winner_id: self.new_book.id.clone(), loser_id: opponent.id.clone() }
        } else {
            ComparisonRecord { winner_id: opponent.id.clone(), loser_id: self.new_book.id.clone() }
        });

        let last = self.store.len() - 1;
        let tier = self.store.tier();

        if user_prefers_new_book {
            // The store is score-descending, so winning moves the new book towards index 0.
            if middle == 0 {
                self.complete(0, resolve_insertion(self.store.books(), tier, 0));
                return;
            }
            let right = middle - 1;
            if left > right {
                self.complete(middle, resolve_insertion(self.store.books(), tier, middle));
            } else {
                self.compare_within(left, right);
            }
        } else {
            if middle == last {
                self.complete(last + 1, resolve_insertion(self.store.books(), tier, last + 1));
                return;
            }
            let left = middle + 1;
            if left > right {
                self.complete(middle + 1, resolve_insertion(self.store.books(), tier, middle + 1));
            } else {
                self.compare_within(left, right);
            }
        }
    }

    /// Stop asking and place the book where the tier's default score puts it.
    ///
    /// If the default collides with a neighbour, the book is resolved like a
    /// converged search at that position. No-op once complete.
    ///
    /// # Panics
    /// If the state was never started.
    pub fn skip_comparisons(&mut self) {
        match self.phase {
            Phase::Idle => panic!("skip_comparisons() called before start_insertion()"),
            Phase::Complete(_) => return,
            Phase::Comparing { .. } => {}
        }

        let tier = self.store.tier();
        let default = tier.default_score();
        let books = self.store.books();
        let index = books.iter().position(|b| b.score < default).unwrap_or(books.len());

        tracing::debug!(%tier, book_id = %self.new_book.id, index, "comparisons skipped");
        let resolution = resolve_candidate(books, tier, index, default);
        self.complete(index, resolution);
    }

    /// The pair to show next, or `None` unless comparing.
    pub fn current_comparison(&self) -> Option<Comparison<'_>> {
        match self.phase {
            Phase::Comparing { middle, .. } => Some(Comparison {
                book_a: &self.new_book,
                book_b: &self.store.books()[middle],
            }),
            _ => None,
        }
    }

    /// The final placement, once complete.
    pub fn result(&self) -> Option<&InsertionResult> {
        match &self.phase {
            Phase::Complete(result) => Some(result),
            _ => None,
        }
    }

    pub fn into_result(self) -> Option<InsertionResult> {
        match self.phase {
            Phase::Complete(result) => Some(result),
            _ => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.phase, Phase::Complete(_))
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn tier(&self) -> Tier {
        self.store.tier()
    }

    pub fn store(&self) -> &RankedBookStore {
        &self.store
    }

    pub fn new_book(&self) -> &BookMeta {
        &self.new_book
    }

    /// Answers given so far, oldest first.
    pub fn history(&self) -> &[ComparisonRecord] {
        &self.history
    }

    pub fn comparisons_made(&self) -> usize {
        self.history.len()
    }

    fn compare_within(&mut self, left: usize, right: usize) {
        let middle = (left + right) / 2;
        tracing::debug!(
            tier = %self.store.tier(),
            book_id = %self.new_book.id,
            left,
            right,
            middle,
            opponent = %self.store.books()[middle].id,
            "next comparison"
        );
        self.phase = Phase::Comparing { left, right, middle };
    }

    fn complete(&mut self, position: usize, resolution: Resolution) {
        let Resolution { score, redistributed } = resolution;
        let was_redistributed = redistributed.is_some();
        let rewrite_tier = was_redistributed || self.store.repaired();

        let inserted_book = self.new_book.clone().with_score(score);
        let mut books: Vec<RankedBook> = redistributed.unwrap_or_else(|| self.store.books().to_vec());
        books.insert(position, inserted_book.clone());

        tracing::debug!(
            tier = %self.store.tier(),
            book_id = %inserted_book.id,
            position,
            score,
            comparisons = self.history.len(),
            redistributed = was_redistributed,
            repaired_on_load = self.store.repaired(),
            "insertion complete"
        );

        let updated_tier_books = rewrite_tier.then(|| books.clone());
        self.phase = Phase::Complete(InsertionResult {
            books,
            inserted_book,
            position,
            score,
            updated_tier_books,
        });
    }
}

/// Begin inserting `new_book` into a tier.
///
/// If the tier already holds a book with the same id it is taken out first,
/// so re-ranking a book moves it rather than duplicating it.
pub fn start_insertion(existing_tier_books: Vec<RankedBook>, new_book: BookMeta, tier: Tier) -> RankingState {
    let mut store = RankedBookStore::initialize(tier, existing_tier_books);
    if store.remove(&new_book.id).is_some() {
        tracing::debug!(%tier, book_id = %new_book.id, "re-ranking a book already in the tier");
    }

    let mut state = RankingState::new(store, new_book);
    state.start();
    state
}

/// Apply one answer. `true` means the user preferred the new book.
pub fn process_comparison(mut state: RankingState, user_prefers_new_book: bool) -> RankingState {
    state.process_comparison(user_prefers_new_book);
    state
}

/// The pair to show next, or `None` once complete.
pub fn get_current_comparison(state: &RankingState) -> Option<Comparison<'_>> {
    state.current_comparison()
}

/// The final placement, or `None` while comparisons remain.
pub fn get_result(state: &RankingState) -> Option<&InsertionResult> {
    state.result()
}

/// Upper bound on answers needed to place one book among `n`.
pub fn max_comparisons(n: usize) -> usize {
    // ceil(log2(n + 1))
    (usize::BITS - n.leading_zeros()) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::round_score;

    fn book(id: &str, score: f64) -> RankedBook {
        RankedBook {
            id: id.to_string(),
            title: format!("Title {id}"),
            authors: Vec::new(),
            cover_url: None,
            score,
        }
    }

    fn liked_abc() -> Vec<RankedBook> {
        vec![book("A", 10.0), book("B", 8.0), book("C", 7.0)]
    }

    fn ordered(result: &InsertionResult) -> Vec<(&str, f64)> {
        result.books.iter().map(|b| (b.id.as_str(), b.score)).collect()
    }

    /// Drive an insertion to completion against a hidden position:
    /// the new book beats every existing book at index >= `true_position`.
    fn run_to_position(books: Vec<RankedBook>, tier: Tier, true_position: usize) -> RankingState {
        let ids: Vec<String> = {
            let store = RankedBookStore::initialize(tier, books.clone());
            store.books().iter().map(|b| b.id.clone()).collect()
        };
        let mut state = start_insertion(books, BookMeta::new("new", "New"), tier);
        while let Some(cmp) = state.current_comparison() {
            let opponent_index = ids.iter().position(|id| *id == cmp.book_b.id).unwrap();
            let prefers_new = opponent_index >= true_position;
            state = process_comparison(state, prefers_new);
        }
        state
    }

    #[test]
    fn test_empty_tier_completes_immediately() {
        for (tier, expected) in [(Tier::Liked, 10.0), (Tier::Fine, 6.0), (Tier::Disliked, 4.0)] {
            let state = start_insertion(Vec::new(), BookMeta::new("x", "X"), tier);
            let result = get_result(&state).unwrap();
            assert_eq!(result.score, expected);
            assert_eq!(result.position, 0);
            assert_eq!(result.books.len(), 1);
            assert!(get_current_comparison(&state).is_none());
            assert_eq!(state.comparisons_made(), 0);
        }
    }

    #[test]
    fn test_first_opponent_is_middle_book() {
        let state = start_insertion(liked_abc(), BookMeta::new("D", "D"), Tier::Liked);
        let cmp = get_current_comparison(&state).unwrap();
        assert_eq!(cmp.book_a.id, "D");
        assert_eq!(cmp.book_b.id, "B");
        assert_eq!(state.phase(), &Phase::Comparing { left: 0, right: 2, middle: 1 });
    }

    #[test]
    fn test_new_best_extends_above_top() {
        let mut state = start_insertion(liked_abc(), BookMeta::new("D", "D"), Tier::Liked);
        state = process_comparison(state, true); // D over B
        assert_eq!(get_current_comparison(&state).unwrap().book_b.id, "A");
        state = process_comparison(state, true); // D over A

        let result = get_result(&state).unwrap();
        assert_eq!(result.position, 0);
        assert_eq!(result.score, 10.1);
        assert_eq!(ordered(result), vec![("D", 10.1), ("A", 10.0), ("B", 8.0), ("C", 7.0)]);
        assert!(result.updated_tier_books.is_none());
    }

    #[test]
    fn test_new_worst_extends_below_bottom() {
        let mut state = start_insertion(liked_abc(), BookMeta::new("D", "D"), Tier::Liked);
        state = process_comparison(state, false); // B over D
        assert_eq!(get_current_comparison(&state).unwrap().book_b.id, "C");
        state = process_comparison(state, false); // C over D

        let result = get_result(&state).unwrap();
        assert_eq!(result.position, 3);
        assert_eq!(result.score, 6.9);
        assert_eq!(result.books.last().unwrap().id, "D");
    }

    #[test]
    fn test_converged_between_neighbours_uses_midpoint() {
        let mut state = start_insertion(liked_abc(), BookMeta::new("D", "D"), Tier::Liked);
        state = process_comparison(state, true); // D over B
        state = process_comparison(state, false); // A over D

        let result = get_result(&state).unwrap();
        assert_eq!(result.position, 1);
        assert_eq!(result.score, 9.0);

        let mut state = start_insertion(liked_abc(), BookMeta::new("D", "D"), Tier::Liked);
        state = process_comparison(state, false); // B over D
        state = process_comparison(state, true); // D over C
        let result = get_result(&state).unwrap();
        assert_eq!(result.position, 2);
        assert_eq!(result.score, 7.5);
    }

    #[test]
    fn test_process_after_complete_is_noop() {
        let mut state = start_insertion(vec![book("A", 8.0)], BookMeta::new("D", "D"), Tier::Liked);
        state = process_comparison(state, true);
        let before = state.result().cloned();
        state = process_comparison(state, false);
        state.skip_comparisons();
        assert_eq!(state.result().cloned(), before);
        assert_eq!(state.comparisons_made(), 1);
    }

    #[test]
    #[should_panic(expected = "before start_insertion")]
    fn test_process_on_idle_state_panics() {
        let mut state = RankingState::new(RankedBookStore::new(Tier::Fine), BookMeta::new("x", "X"));
        state.process_comparison(true);
    }

    #[test]
    fn test_history_records_winners() {
        let mut state = start_insertion(liked_abc(), BookMeta::new("D", "D"), Tier::Liked);
        state = process_comparison(state, true);
        state = process_comparison(state, false);
        assert_eq!(
            state.history(),
            &[
                ComparisonRecord { winner_id: "D".into(), loser_id: "B".into() },
                ComparisonRecord { winner_id: "A".into(), loser_id: "D".into() },
            ]
        );
    }

    #[test]
    fn test_reranking_existing_book_moves_it() {
        let mut state = start_insertion(liked_abc(), BookMeta::new("B", "B"), Tier::Liked);
        assert_eq!(state.store().len(), 2);
        state = process_comparison(state, true); // B over A (middle of [A, C] is A)
        let result = get_result(&state).unwrap();
        assert_eq!(ordered(result), vec![("B", 10.1), ("A", 10.0), ("C", 7.0)]);
    }

    #[test]
    fn test_skip_places_at_default_score() {
        let books = vec![book("A", 6.4), book("B", 5.0), book("C", 4.0)];
        let mut state = start_insertion(books, BookMeta::new("D", "D"), Tier::Fine);
        state.skip_comparisons();
        let result = get_result(&state).unwrap();
        assert_eq!(result.position, 1);
        assert_eq!(result.score, 6.0);
    }

    #[test]
    fn test_skip_with_colliding_default_uses_midpoint() {
        let books = vec![book("A", 6.0), book("B", 5.0)];
        let mut state = start_insertion(books, BookMeta::new("D", "D"), Tier::Fine);
        state.skip_comparisons();
        let result = get_result(&state).unwrap();
        assert_eq!(result.position, 1);
        assert_eq!(result.score, 5.5);
    }

    #[test]
    fn test_every_position_reachable_within_bound() {
        for n in 0..40 {
            let books: Vec<RankedBook> = (0..n)
                .map(|i| book(&format!("b{i}"), round_score(9.9 - i as f64 * 0.08)))
                .collect();
            for true_position in 0..=n {
                let state = run_to_position(books.clone(), Tier::Liked, true_position);
                let result = state.result().unwrap();
                assert_eq!(result.position, true_position, "n={n}");
                assert!(state.comparisons_made() <= max_comparisons(n), "n={n}");
                assert_eq!(result.books[true_position].id, "new");
                assert!(result.books.windows(2).all(|w| w[0].score > w[1].score), "n={n} pos={true_position}");
            }
        }
    }

    #[test]
    fn test_exhausted_gap_triggers_redistribution() {
        let books = vec![book("A", 8.001), book("B", 8.0)];
        let mut state = start_insertion(books, BookMeta::new("D", "D"), Tier::Liked);
        // middle = 0 -> A
        state = process_comparison(state, false); // A over D, compare B
        state = process_comparison(state, true); // D over B

        let result = get_result(&state).unwrap();
        assert_eq!(result.position, 1);
        let updated = result.updated_tier_books.as_ref().unwrap();
        assert_eq!(updated, &result.books);
        let ids: Vec<&str> = updated.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "D", "B"]);
        assert!(updated.windows(2).all(|w| w[0].score > w[1].score));
        let (lower, upper) = Tier::Liked.bounds();
        assert!(updated.iter().all(|b| b.score > lower && b.score < upper));
    }

    #[test]
    fn test_tier_repaired_on_load_reports_every_book() {
        let books = vec![book("A", 8.0), book("B", 8.0)];
        let mut state = start_insertion(books, BookMeta::new("D", "D"), Tier::Liked);
        state = process_comparison(state, false); // A over D
        state = process_comparison(state, true); // D over B

        let result = get_result(&state).unwrap();
        assert_eq!(ordered(result), vec![("A", 8.833), ("D", 8.25), ("B", 7.667)]);
        assert_eq!(result.updated_tier_books.as_ref(), Some(&result.books));
    }

    #[test]
    fn test_max_comparisons() {
        assert_eq!(max_comparisons(0), 0);
        assert_eq!(max_comparisons(1), 1);
        assert_eq!(max_comparisons(2), 2);
        assert_eq!(max_comparisons(3), 2);
        assert_eq!(max_comparisons(4), 3);
        assert_eq!(max_comparisons(7), 3);
        assert_eq!(max_comparisons(8), 4);
    }

    /// Insert `count` books one after another, each at a random true position,
    /// and check the tier after every commit-equivalent step.
    fn grow_tier(tier: Tier, count: usize, seed: u64) -> (Vec<RankedBook>, usize) {
        use rand::{rngs::SmallRng, Rng, SeedableRng};

        let mut rng = SmallRng::seed_from_u64(seed);
        let mut books: Vec<RankedBook> = Vec::new();
        let mut redistributions = 0;

        for i in 0..count {
            let true_position = rng.random_range(0..=books.len());
            let before_ids: Vec<String> = books.iter().map(|b| b.id.clone()).collect();

            let state = {
                let mut state = start_insertion(books.clone(), BookMeta::new(format!("n{i}"), "New"), tier);
                while let Some(cmp) = state.current_comparison() {
                    let idx = before_ids.iter().position(|id| *id == cmp.book_b.id).unwrap();
                    state = process_comparison(state, idx >= true_position);
                }
                state
            };
            let result = state.into_result().unwrap();
            assert_eq!(result.position, true_position);
            if result.redistributed() {
                redistributions += 1;
            }

            let mut after_ids: Vec<String> = result.books.iter().map(|b| b.id.clone()).collect();
            after_ids.remove(true_position);
            assert_eq!(after_ids, before_ids, "relative order must survive insertion");
            assert!(result.books.windows(2).all(|w| w[0].score > w[1].score));
            assert!(result.books.iter().all(|b| b.score == round_score(b.score) && b.score >= 0.0));
            books = result.books;
        }
        (books, redistributions)
    }

    #[test]
    fn test_repeated_inserts_between_same_neighbours_redistribute() {
        // Always land just below the top book: the gap under it halves each time.
        let mut books = vec![book("A", 9.0), book("B", 8.0)];
        let mut redistributed = false;
        for i in 0..20 {
            let mut state = start_insertion(books.clone(), BookMeta::new(format!("n{i}"), "New"), Tier::Liked);
            while let Some(cmp) = state.current_comparison() {
                let prefers_new = cmp.book_b.id != "A";
                state = process_comparison(state, prefers_new);
            }
            let result = state.into_result().unwrap();
            assert_eq!(result.position, 1);
            if let Some(updated) = &result.updated_tier_books {
                redistributed = true;
                let (lower, upper) = Tier::Liked.bounds();
                assert!(updated.iter().all(|b| b.score > lower && b.score < upper));
            }
            assert!(result.books.windows(2).all(|w| w[0].score > w[1].score));
            books = result.books;
        }
        assert!(redistributed, "20 halvings of a 1.0 gap must exhaust 3-decimal precision");
    }

    #[test]
    fn test_random_growth_keeps_invariants() {
        for (seed, tier) in [(7, Tier::Liked), (11, Tier::Fine), (23, Tier::Disliked)] {
            let (books, _) = grow_tier(tier, 150, seed);
            assert_eq!(books.len(), 150);
        }
    }

    proptest::proptest! {
        #[test]
        fn prop_insertion_keeps_strict_order(
            gaps in proptest::collection::vec(0.002f64..0.1, 0..30),
            true_position_seed in 0usize..1000,
        ) {
            let mut score = 9.9;
            let books: Vec<RankedBook> = gaps.iter().enumerate().map(|(i, gap)| {
                score = round_score(score - gap);
                book(&format!("b{i}"), score)
            }).collect();
            let n = books.len();
            let true_position = true_position_seed % (n + 1);

            let state = run_to_position(books, Tier::Liked, true_position);
            let result = state.result().unwrap();

            proptest::prop_assert_eq!(result.position, true_position);
            proptest::prop_assert!(state.comparisons_made() <= max_comparisons(n));
            proptest::prop_assert!(result.books.windows(2).all(|w| w[0].score > w[1].score));
            proptest::prop_assert_eq!(result.score, round_score(result.score));
        }
    }
}
