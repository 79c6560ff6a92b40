/// Simulate command: measures comparison counts and redistribution behaviour.
///
/// Builds a tier by inserting books one at a time in random order, answering
/// every comparison from a hidden "true" preference order, then checks the
/// final shelf against that order.
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use shelfrank_core::{max_comparisons, process_comparison, start_insertion, BookMeta, RankedBook, Tier};

/// Outcome of one simulated shelf.
#[derive(Debug, Clone, Serialize)]
pub struct TrialReport {
    pub books: usize,
    pub total_comparisons: usize,
    pub max_comparisons_observed: usize,
    /// Largest `max_comparisons(n)` hit during the trial.
    pub max_comparisons_bound: usize,
    pub redistributions: usize,
    /// Books whose final score classifies into a different tier.
    pub drifted: usize,
    pub order_matches: bool,
    pub top_score: f64,
    pub bottom_score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub tier: Tier,
    pub books_per_trial: usize,
    pub trials: Vec<TrialReport>,
}

/// Run one trial: rank `num_books` books whose hidden quality is their index
/// (0 = best), inserted in random order.
pub fn run_trial(num_books: usize, tier: Tier, rng: &mut SmallRng) -> TrialReport {
    let mut arrival: Vec<usize> = (0..num_books).collect();
    arrival.shuffle(rng);

    let mut shelf: Vec<RankedBook> = Vec::new();
    let mut total_comparisons = 0;
    let mut max_observed = 0;
    let mut max_bound = 0;
    let mut redistributions = 0;

    for quality in arrival {
        let bound = max_comparisons(shelf.len());
        let meta = BookMeta::new(format!("book-{quality:05}"), format!("Book {quality}"));
        let mut state = start_insertion(shelf, meta, tier);

        while let Some(cmp) = state.current_comparison() {
            let opponent_quality = quality_of(&cmp.book_b.id);
            state = process_comparison(state, quality < opponent_quality);
        }

        let comparisons = state.comparisons_made();
        total_comparisons += comparisons;
        max_observed = max_observed.max(comparisons);
        max_bound = max_bound.max(bound);

        let result = state
            .into_result()
            .unwrap_or_else(|| crate::bail("simulation ended without a result"));
        if result.redistributed() {
            redistributions += 1;
        }
        shelf = result.books;
    }

    let order_matches = shelf
        .iter()
        .enumerate()
        .all(|(i, b)| quality_of(&b.id) == i);
    let drifted = shelf.iter().filter(|b| Tier::for_score(b.score) != tier).count();

    TrialReport {
        books: shelf.len(),
        total_comparisons,
        max_comparisons_observed: max_observed,
        max_comparisons_bound: max_bound,
        redistributions,
        drifted,
        order_matches,
        top_score: shelf.first().map_or(0.0, |b| b.score),
        bottom_score: shelf.last().map_or(0.0, |b| b.score),
    }
}

fn quality_of(id: &str) -> usize {
    id.trim_start_matches("book-")
        .parse()
        .unwrap_or_else(|_| crate::bail(format!("unexpected simulated book id {id}")))
}

/// Run the simulation.
pub fn run_simulation(num_books: usize, tier: Tier, trials: usize, seed: Option<u64>) -> SimulationReport {
    let mut rng = match seed {
        Some(seed) => SmallRng::seed_from_u64(seed),
        None => SmallRng::from_rng(&mut rand::rng()),
    };

    let trials = (0..trials)
        .map(|t| {
            let report = run_trial(num_books, tier, &mut rng);
            tracing::debug!(
                trial = t + 1,
                comparisons = report.total_comparisons,
                redistributions = report.redistributions,
                "trial finished"
            );
            report
        })
        .collect();

    SimulationReport { tier, books_per_trial: num_books, trials }
}

/// Print a human-readable summary.
pub fn print_summary(report: &SimulationReport) {
    let n = report.trials.len().max(1) as f64;
    let per_insert = |t: &TrialReport| t.total_comparisons as f64 / t.books.max(1) as f64;

    let mean_per_insert = report.trials.iter().map(per_insert).sum::<f64>() / n;
    let worst = report.trials.iter().map(|t| t.max_comparisons_observed).max().unwrap_or(0);
    let bound = report.trials.iter().map(|t| t.max_comparisons_bound).max().unwrap_or(0);
    let redistributions: usize = report.trials.iter().map(|t| t.redistributions).sum();
    let mismatches = report.trials.iter().filter(|t| !t.order_matches).count();
    let drifted: usize = report.trials.iter().map(|t| t.drifted).sum();

    println!(
        "{} trials x {} books into tier \"{}\"",
        report.trials.len(),
        report.books_per_trial,
        report.tier
    );
    println!("Comparisons per insertion: {mean_per_insert:.2} mean, {worst} worst (bound {bound})");
    println!("Redistributions: {redistributions} total, {:.2} per trial", redistributions as f64 / n);
    if let Some(t) = report.trials.last() {
        println!("Last trial score range: {:.3} .. {:.3}", t.top_score, t.bottom_score);
    }
    if drifted > 0 {
        println!("Scores outside the tier interval: {drifted} book(s) across all trials.");
    }
    if mismatches == 0 {
        println!("Final order matched the hidden order in every trial.");
    } else {
        println!("WARNING: final order differed from the hidden order in {mismatches} trial(s).");
    }
}
