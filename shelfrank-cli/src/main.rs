mod config;
mod output;
mod parse;
mod prompt;
mod shelf;
mod simulate;

use clap::Parser;
use serde::Serialize;
use shelfrank_core::{
    commit, max_comparisons, start_insertion, BookMeta, CommitReport, ComparisonRecord, InsertionResult,
    PersistenceError, RankingError, RankingPersistence, RankingState, Tier, TierKey,
};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing_subscriber::EnvFilter;

use crate::parse::{parse_answer, parse_yes, Answer};
use crate::shelf::JsonShelf;

pub fn bail(msg: impl std::fmt::Display) -> ! {
    eprintln!("Error: {msg}");
    std::process::exit(1);
}

#[derive(Parser)]
#[command(name = "shelfrank", version, about = "Rank the books you read by answering which-did-you-prefer questions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file (default: ~/.config/shelfrank/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Shelf file (default: ~/.local/share/shelfrank/shelf.json)
    #[arg(long, global = true)]
    shelf: Option<PathBuf>,

    /// Whose shelf to use (default: "me")
    #[arg(long, global = true)]
    user: Option<String>,

    /// Show debug logs on stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Rank a newly finished book into one of your tiers
    Rank(RankArgs),
    /// Print your shelf
    List(ListArgs),
    /// Remove a book from your shelf
    Remove(RemoveArgs),
    /// Insert books against a hidden order and report comparison counts
    Simulate(SimulateArgs),
    /// Create a default config file at ~/.config/shelfrank/config.toml
    Init,
}

#[derive(Parser)]
struct RankArgs {
    /// Tier from the rating step: "liked", "fine" or "disliked"
    #[arg(long)]
    tier: String,

    /// Book id (e.g. ISBN or catalog id)
    #[arg(long)]
    id: String,

    #[arg(long)]
    title: String,

    /// Author (repeatable)
    #[arg(long = "author")]
    authors: Vec<String>,

    #[arg(long)]
    cover_url: Option<String>,

    /// Append every answer to this JSONL file (overrides config)
    #[arg(long)]
    log_comparisons: Option<PathBuf>,

    /// Output JSON instead of table
    #[arg(long)]
    json: bool,
}

#[derive(Parser)]
struct ListArgs {
    /// Only this tier
    #[arg(long)]
    tier: Option<String>,

    /// Output JSON instead of table
    #[arg(long)]
    json: bool,
}

#[derive(Parser)]
struct RemoveArgs {
    /// Book id to remove
    #[arg(long)]
    id: String,
}

#[derive(Parser)]
struct SimulateArgs {
    /// Books to insert per trial
    #[arg(long, default_value_t = 100)]
    books: usize,

    /// Number of independent shelves to build
    #[arg(long, default_value_t = 10)]
    trials: usize,

    /// Tier to simulate
    #[arg(long, default_value = "liked")]
    tier: String,

    /// RNG seed for a reproducible run
    #[arg(long)]
    seed: Option<u64>,

    /// Output JSON instead of a summary
    #[arg(long)]
    json: bool,
}

/// Settings resolved from CLI args and the config file (CLI wins).
struct Settings {
    user: String,
    shelf_path: PathBuf,
    comparison_log: Option<PathBuf>,
}

fn resolve_settings(cli: &Cli) -> Settings {
    let config_path = cli.config.clone().unwrap_or_else(config::config_path);
    let cfg = config::load_config(&config_path);

    Settings {
        user: cli.user.clone().or(cfg.user).unwrap_or_else(|| "me".to_string()),
        shelf_path: cli.shelf.clone().or(cfg.shelf_path).unwrap_or_else(config::default_shelf_path),
        comparison_log: cfg.comparison_log,
    }
}

/// Take the shelf lock or exit, pointing at the lock file.
fn lock_shelf(shelf: &JsonShelf, key: &TierKey) -> shelf::ShelfLock {
    shelf.lock(key).unwrap_or_else(|e| match e {
        RankingError::InsertionInProgress { .. } => bail(format!(
            "{e}. If no other shelfrank is running, delete {}",
            shelf.lock_path().display()
        )),
        other => bail(format!("Failed to lock shelf {}: {other}", shelf.path().display())),
    })
}

fn parse_tier(value: &str) -> Tier {
    value.parse().unwrap_or_else(|e| bail(e))
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Rank(args) => run_rank(&resolve_settings(&cli), args),
        Commands::List(args) => run_list(&resolve_settings(&cli), args),
        Commands::Remove(args) => run_remove(&resolve_settings(&cli), args),
        Commands::Simulate(args) => run_simulate(args),
        Commands::Init => {
            let path = config::create_default_config();
            println!("Created config at {}", path.display());
            println!("Edit it to set your user name, shelf file, etc.");
        }
    }
}

/// Ask comparisons on stderr/stdin until the insertion completes.
///
/// Returns an error message if input ends first. Nothing has been written
/// at that point.
fn ask_until_complete(mut state: RankingState, input: &mut impl BufRead) -> Result<RankingState, String> {
    let max_steps = max_comparisons(state.store().len());
    let mut line = String::new();

    while let Some(cmp) = state.current_comparison() {
        let question = prompt::build_prompt(cmp.book_a, cmp.book_b, state.comparisons_made() + 1, max_steps);
        eprint!("{question}");
        let _ = io::stderr().flush();

        line.clear();
        let read = input
            .read_line(&mut line)
            .map_err(|e| format!("Failed to read answer: {e}"))?;
        if read == 0 {
            return Err("Input closed before ranking finished. Nothing was saved.".to_string());
        }

        match parse_answer(&line) {
            Some(Answer::NewBook) => state.process_comparison(true),
            Some(Answer::Existing) => state.process_comparison(false),
            Some(Answer::Skip) => state.skip_comparisons(),
            None => eprintln!("Please answer 1, 2 or s."),
        }
    }
    Ok(state)
}

#[derive(Serialize)]
struct ComparisonLogLine<'a> {
    timestamp: u64,
    user: &'a str,
    tier: Tier,
    #[serde(flatten)]
    record: &'a ComparisonRecord,
}

fn append_comparison_log(path: &Path, key: &TierKey, records: &[ComparisonRecord]) {
    let timestamp = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap_or_else(|e| bail(format!("Failed to open {}: {e}", path.display())));
    let mut writer = io::BufWriter::new(file);

    for record in records {
        let line = ComparisonLogLine { timestamp, user: &key.user_id, tier: key.tier, record };
        let json = serde_json::to_string(&line).unwrap_or_else(|e| bail(format!("Failed to encode log line: {e}")));
        if let Err(e) = writeln!(writer, "{json}") {
            tracing::warn!(path = %path.display(), error = %e, "failed to append comparison log");
            return;
        }
    }
    if let Err(e) = writer.flush() {
        tracing::warn!(path = %path.display(), error = %e, "failed to flush comparison log");
    }
}

/// Commit, offering retries of the write alone on failure.
fn commit_with_retry(
    shelf: &mut JsonShelf,
    key: &TierKey,
    result: &InsertionResult,
    input: &mut impl BufRead,
) -> Result<CommitReport, String> {
    loop {
        match commit(shelf, key, result) {
            Ok(report) => return Ok(report),
            Err(e) => {
                eprintln!("Failed to save ranking: {e}");
                eprint!("Your answers are kept. Retry saving? [y/N] ");
                let _ = io::stderr().flush();
                let mut line = String::new();
                let _ = input.read_line(&mut line);
                if !parse_yes(&line) {
                    return Err("Ranking not saved.".to_string());
                }
            }
        }
    }
}

/// What one `rank` run produced.
struct RankOutcome {
    result: InsertionResult,
    history: Vec<ComparisonRecord>,
    report: CommitReport,
}

/// Load, compare and commit. Runs with the shelf lock held, so failures are
/// returned rather than exiting.
fn rank_locked(
    shelf: &mut JsonShelf,
    key: &TierKey,
    meta: BookMeta,
    input: &mut impl BufRead,
) -> Result<RankOutcome, String> {
    let read_err = |e: PersistenceError| format!("Failed to read shelf {}: {e}", shelf.path().display());

    // A book already ranked in a different tier is moved, not duplicated.
    let previous = shelf.find_book(&key.user_id, &meta.id).map_err(read_err)?;
    let existing = shelf.load_tier(key).map_err(read_err)?;

    let book_id = meta.id.clone();
    let state = ask_until_complete(start_insertion(existing, meta, key.tier), input)?;
    let history = state.history().to_vec();
    let result = state.into_result().ok_or("Ranking did not complete")?;

    let report = commit_with_retry(shelf, key, &result, input)?;
    tracing::debug!(?report, "ranking saved");

    if let Some((old_tier, _)) = previous.filter(|(old_tier, _)| *old_tier != key.tier) {
        let old_key = TierKey::new(key.user_id.clone(), old_tier);
        if let Err(e) = shelf.delete_book(&old_key, &book_id) {
            eprintln!("Warning: ranked into {}, but failed to remove the old entry from {old_tier}: {e}", key.tier);
        }
    }

    Ok(RankOutcome { result, history, report })
}

fn run_rank(settings: &Settings, args: &RankArgs) {
    let tier = parse_tier(&args.tier);
    let key = TierKey::new(settings.user.clone(), tier);
    let mut shelf = JsonShelf::new(&settings.shelf_path);

    let meta = BookMeta {
        id: args.id.clone(),
        title: args.title.clone(),
        authors: args.authors.clone(),
        cover_url: args.cover_url.clone(),
    };

    let stdin = io::stdin();
    let mut input = stdin.lock();

    let lock = lock_shelf(&shelf, &key);
    let outcome = rank_locked(&mut shelf, &key, meta, &mut input);
    drop(lock);
    let RankOutcome { result, history, report } = outcome.unwrap_or_else(|e| bail(e));

    if let Some(path) = args.log_comparisons.as_ref().or(settings.comparison_log.as_ref()) {
        append_comparison_log(path, &key, &history);
    }

    if let CommitReport::SingleRow { fell_back: true } = report {
        eprintln!("Warning: the rest of the tier could not be rescored; only this book was saved.");
    }

    eprintln!(
        "Ranked \"{}\" at #{} in {} with score {:.3} after {} comparison(s).",
        result.inserted_book.title,
        result.position + 1,
        tier,
        result.score,
        history.len(),
    );

    let tiers = vec![(tier, result.books.clone())];
    if args.json {
        output::print_json(&tiers, Some(&result.inserted_book.id));
    } else {
        output::print_table(&tiers, Some(&result.inserted_book.id));
    }
}

fn run_list(settings: &Settings, args: &ListArgs) {
    let shelf = JsonShelf::new(&settings.shelf_path);
    let tiers: Vec<Tier> = match &args.tier {
        Some(t) => vec![parse_tier(t)],
        None => Tier::ALL.to_vec(),
    };

    let loaded: Vec<(Tier, Vec<_>)> = tiers
        .into_iter()
        .map(|tier| {
            let books = shelf
                .load_tier(&TierKey::new(settings.user.clone(), tier))
                .unwrap_or_else(|e| bail(format!("Failed to read shelf {}: {e}", shelf.path().display())));
            (tier, books)
        })
        .collect();

    if args.json {
        output::print_json(&loaded, None);
    } else {
        output::print_table(&loaded, None);
    }
}

fn run_remove(settings: &Settings, args: &RemoveArgs) {
    let mut shelf = JsonShelf::new(&settings.shelf_path);
    let found = shelf
        .find_book(&settings.user, &args.id)
        .unwrap_or_else(|e| bail(format!("Failed to read shelf {}: {e}", shelf.path().display())));

    let Some((tier, book)) = found else {
        bail(format!("No book with id \"{}\" on {}'s shelf", args.id, settings.user));
    };

    let key = TierKey::new(settings.user.clone(), tier);
    let lock = lock_shelf(&shelf, &key);
    let removed = shelf.delete_book(&key, &args.id);
    drop(lock);

    // Another run may have moved or removed it before the lock was taken.
    let removed = removed.unwrap_or_else(|e| bail(format!("Failed to remove book: {e}")));
    if !removed {
        bail(format!("\"{}\" is no longer in {tier}", book.title));
    }
    println!("Removed \"{}\" from {tier}.", book.title);
}

fn run_simulate(args: &SimulateArgs) {
    if args.books == 0 || args.trials == 0 {
        bail("--books and --trials must be at least 1");
    }
    let tier = parse_tier(&args.tier);
    let report = simulate::run_simulation(args.books, tier, args.trials, args.seed);

    if args.json {
        let json = serde_json::to_string_pretty(&report)
            .unwrap_or_else(|e| bail(format!("Failed to encode JSON: {e}")));
        println!("{json}");
    } else {
        simulate::print_summary(&report);
    }
}
