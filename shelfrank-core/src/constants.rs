/// Step used when a new book lands above the current best or below the current worst.
///
/// Extending by a fixed step (rather than squeezing towards the tier edge)
/// keeps room for later insertions at either end of the tier.
pub const SCORE_STEP: f64 = 0.1;

/// Decimal places kept for every persisted score.
pub const SCORE_DECIMALS: u32 = 3;

/// `10^SCORE_DECIMALS`, the rounding scale.
pub const SCORE_SCALE: f64 = 10u32.pow(SCORE_DECIMALS) as f64;

/// Lowest score any book may be persisted with. Downward extension below
/// this floor falls back to a midpoint towards it.
pub const MIN_SCORE: f64 = 0.0;

/// Tier intervals as `(lower, upper)`. Edges are shared between neighbours.
pub const LIKED_RANGE: (f64, f64) = (6.5, 10.0);
pub const FINE_RANGE: (f64, f64) = (3.5, 6.5);
pub const DISLIKED_RANGE: (f64, f64) = (0.0, 3.5);

/// Score given to the first book ranked into an empty tier, and to a book
/// whose comparisons were skipped.
///
/// These are not the interval edges: fine starts at 6.0 rather than 6.5, and
/// disliked starts at 4.0, above its own interval. Later insertions extend
/// from here in either direction.
pub const LIKED_DEFAULT_SCORE: f64 = 10.0;
pub const FINE_DEFAULT_SCORE: f64 = 6.0;
pub const DISLIKED_DEFAULT_SCORE: f64 = 4.0;
