/// Parsing the reader's answer to a comparison.

/// What the reader said about one pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    /// Preferred the book being ranked.
    NewBook,
    /// Preferred the book already on the shelf.
    Existing,
    /// Stop comparing; place the book at the tier default.
    Skip,
}

/// Parse one line of input. Returns `None` for anything unrecognised.
///
/// Accepts `1`/`2` (the numbers shown in the prompt), `a`/`b`, `new`/`old`
/// and `s`/`skip`, case-insensitive.
pub fn parse_answer(line: &str) -> Option<Answer> {
    match line.trim().to_ascii_lowercase().as_str() {
        "1" | "a" | "new" => Some(Answer::NewBook),
        "2" | "b" | "old" | "existing" => Some(Answer::Existing),
        "s" | "skip" => Some(Answer::Skip),
        _ => None,
    }
}

/// Parse a yes/no reply. Empty input means no.
pub fn parse_yes(line: &str) -> bool {
    matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
