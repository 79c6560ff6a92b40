use std::fmt;
use std::str::FromStr;

use crate::constants::{
    DISLIKED_DEFAULT_SCORE, DISLIKED_RANGE, FINE_DEFAULT_SCORE, FINE_RANGE, LIKED_DEFAULT_SCORE,
    LIKED_RANGE,
};

/// One of the three ordinal buckets a book is rated into before it is ranked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Tier {
    Liked,
    Fine,
    Disliked,
}

impl Tier {
    /// All tiers, best first.
    pub const ALL: [Tier; 3] = [Tier::Liked, Tier::Fine, Tier::Disliked];

    /// Closed score interval `(lower, upper)`.
    pub fn bounds(self) -> (f64, f64) {
        match self {
            Tier::Liked => LIKED_RANGE,
            Tier::Fine => FINE_RANGE,
            Tier::Disliked => DISLIKED_RANGE,
        }
    }

    /// Score for a book that has nothing to be compared against.
    pub fn default_score(self) -> f64 {
        match self {
            Tier::Liked => LIKED_DEFAULT_SCORE,
            Tier::Fine => FINE_DEFAULT_SCORE,
            Tier::Disliked => DISLIKED_DEFAULT_SCORE,
        }
    }

    /// Classify a score. A shared edge belongs to the better tier.
    pub fn for_score(score: f64) -> Tier {
        if score >= LIKED_RANGE.0 {
            Tier::Liked
        } else if score >= FINE_RANGE.0 {
            Tier::Fine
        } else {
            Tier::Disliked
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Liked => "liked",
            Tier::Fine => "fine",
            Tier::Disliked => "disliked",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown tier \"{0}\" (expected liked, fine or disliked)")]
pub struct ParseTierError(pub String);

impl FromStr for Tier {
    type Err = ParseTierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "liked" => Ok(Tier::Liked),
            "fine" => Ok(Tier::Fine),
            "disliked" => Ok(Tier::Disliked),
            _ => Err(ParseTierError(s.to_string())),
        }
    }
}

/// Identifies one ranked store: a single user's books within a single tier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TierKey {
    pub user_id: String,
    pub tier: Tier,
}

impl TierKey {
    pub fn new(user_id: impl Into<String>, tier: Tier) -> Self {
        TierKey { user_id: user_id.into(), tier }
    }
}

/// A book with its position-derived score.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RankedBook {
    pub id: String,
    pub title: String,
    pub authors: Vec<String>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub cover_url: Option<String>,
    pub score: f64,
}

impl RankedBook {
    /// Same book, different score.
    pub fn rescored(&self, score: f64) -> RankedBook {
        RankedBook { score, ..self.clone() }
    }
}

/// A book that has been rated into a tier but not yet ranked.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BookMeta {
    pub id: String,
    pub title: String,
    pub authors: Vec<String>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub cover_url: Option<String>,
}

impl BookMeta {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        BookMeta {
            id: id.into(),
            title: title.into(),
            authors: Vec::new(),
            cover_url: None,
        }
    }

    pub fn with_score(self, score: f64) -> RankedBook {
        RankedBook {
            id: self.id,
            title: self.title,
            authors: self.authors,
            cover_url: self.cover_url,
            score,
        }
    }
}

/// The pair currently shown to the user. `book_a` is always the new book.
#[derive(Debug, Clone, Copy)]
pub struct Comparison<'a> {
    pub book_a: &'a BookMeta,
    pub book_b: &'a RankedBook,
}

/// One head-to-head answer, as it would be appended to a comparison log.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ComparisonRecord {
    pub winner_id: String,
    pub loser_id: String,
}

/// Terminal output of one insertion.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InsertionResult {
    /// The whole tier after insertion, score-descending.
    pub books: Vec<RankedBook>,
    pub inserted_book: RankedBook,
    /// 0-based index of `inserted_book` within `books`.
    pub position: usize,
    pub score: f64,
    /// Every book in the tier with its new score, when the tier had to be
    /// redistributed to make room or was repaired on load. `None` means only
    /// `inserted_book` changed.
    pub updated_tier_books: Option<Vec<RankedBook>>,
}

impl InsertionResult {
    /// Whether other books' scores changed and the whole tier must be written.
    pub fn redistributed(&self) -> bool {
        self.updated_tier_books.is_some()
    }
}
