/// Prompt building for pairwise comparisons.
use shelfrank_core::{BookMeta, RankedBook};

/// "Title by A, B", or just the title when there are no authors.
pub fn describe(title: &str, authors: &[String]) -> String {
    if authors.is_empty() {
        title.to_string()
    } else {
        format!("{title} by {}", authors.join(", "))
    }
}

/// Build the question shown for one comparison.
///
/// Option 1 is always the book being ranked, so the answer maps directly
/// onto "prefers the new book".
pub fn build_prompt(new_book: &BookMeta, existing: &RankedBook, step: usize, max_steps: usize) -> String {
    format!(
        "[{step}/{max_steps}] Which did you prefer?\n  \
         1) {}\n  \
         2) {}\n\
         (1/2, s to skip) > ",
        describe(&new_book.title, &new_book.authors),
        describe(&existing.title, &existing.authors),
    )
}
