/// Output formatting: terminal table and JSON.
use serde::Serialize;
use shelfrank_core::{RankedBook, Tier};

use crate::prompt::describe;

#[derive(Serialize)]
struct JsonRankedBook<'a> {
    rank: usize,
    tier: Tier,
    id: &'a str,
    title: &'a str,
    authors: &'a [String],
    score: f64,
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    books: Vec<JsonRankedBook<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inserted: Option<&'a str>,
}

/// Print one or more tiers as a formatted terminal table.
///
/// `highlight` marks a book (the one just ranked) with `*`.
pub fn print_table(tiers: &[(Tier, Vec<RankedBook>)], highlight: Option<&str>) {
    let rows: Vec<(Tier, &RankedBook)> = tiers
        .iter()
        .flat_map(|(tier, books)| books.iter().map(move |b| (*tier, b)))
        .collect();

    if rows.is_empty() {
        println!("Shelf is empty.");
        return;
    }

    let name_width = rows
        .iter()
        .map(|(_, b)| describe(&b.title, &b.authors).len())
        .max()
        .unwrap_or(4)
        .max(4); // at least "Book"

    println!("  # | Tier     | {:<name_width$} |  Score", "Book");
    println!("----|----------|-{}-|-------", "-".repeat(name_width));

    for (i, (tier, book)) in rows.iter().enumerate() {
        let marker = if highlight == Some(book.id.as_str()) { '*' } else { ' ' };
        println!(
            "{marker}{:>2} | {:<8} | {:<name_width$} | {:>6.3}",
            i + 1,
            tier.as_str(),
            describe(&book.title, &book.authors),
            book.score,
        );
    }
}

/// Render tiers as JSON, ranks running across tiers best first.
pub fn render_json(tiers: &[(Tier, Vec<RankedBook>)], highlight: Option<&str>) -> String {
    let books = tiers
        .iter()
        .flat_map(|(tier, books)| books.iter().map(move |b| (*tier, b)))
        .enumerate()
        .map(|(i, (tier, b))| JsonRankedBook {
            rank: i + 1,
            tier,
            id: &b.id,
            title: &b.title,
            authors: &b.authors,
            score: b.score,
        })
        .collect();

    let output = JsonOutput { books, inserted: highlight };
    serde_json::to_string_pretty(&output).unwrap_or_else(|e| crate::bail(format!("Failed to encode JSON: {e}")))
}

/// Print tiers as JSON.
pub fn print_json(tiers: &[(Tier, Vec<RankedBook>)], highlight: Option<&str>) {
    println!("{}", render_json(tiers, highlight));
}
