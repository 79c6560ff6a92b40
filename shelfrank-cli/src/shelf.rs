/// JSON shelf file: the CLI's `RankingPersistence` adapter.
///
/// Every call reads the file from disk, and every write replaces it through
/// a temp file + rename, so a batch either lands completely or not at all
/// and a read-back sees what is actually on disk. Read-modify-write across
/// processes is serialised by a `<shelf>.lock` file taken with `lock`.
use serde::{Deserialize, Serialize};
use shelfrank_core::{PersistenceError, RankedBook, RankingError, RankingPersistence, Tier, TierKey};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Serialize, Deserialize, Default, Debug)]
struct ShelfFile {
    #[serde(default)]
    users: BTreeMap<String, UserShelf>,
}

#[derive(Serialize, Deserialize, Default, Debug)]
struct UserShelf {
    #[serde(default)]
    liked: Vec<RankedBook>,
    #[serde(default)]
    fine: Vec<RankedBook>,
    #[serde(default)]
    disliked: Vec<RankedBook>,
}

impl UserShelf {
    fn tier(&self, tier: Tier) -> &Vec<RankedBook> {
        match tier {
            Tier::Liked => &self.liked,
            Tier::Fine => &self.fine,
            Tier::Disliked => &self.disliked,
        }
    }

    fn tier_mut(&mut self, tier: Tier) -> &mut Vec<RankedBook> {
        match tier {
            Tier::Liked => &mut self.liked,
            Tier::Fine => &mut self.fine,
            Tier::Disliked => &mut self.disliked,
        }
    }
}

pub struct JsonShelf {
    path: PathBuf,
}

impl JsonShelf {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonShelf { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Take the whole shelf file for one insertion or removal.
    ///
    /// The lock file is created with `create_new`, so exactly one process
    /// wins. It is removed when the returned guard drops; a lock left behind
    /// by a crashed run has to be deleted by hand.
    pub fn lock(&self, key: &TierKey) -> Result<ShelfLock, RankingError> {
        let path = self.lock_path();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(PersistenceError::Io)?;
            }
        }

        let mut file = match std::fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                tracing::warn!(
                    user_id = %key.user_id,
                    tier = %key.tier,
                    lock = %path.display(),
                    "shelf is locked by another run"
                );
                return Err(RankingError::InsertionInProgress {
                    user_id: key.user_id.clone(),
                    tier: key.tier,
                });
            }
            Err(e) => return Err(PersistenceError::Io(e).into()),
        };

        // Owner info only helps whoever finds a stale lock.
        if let Err(e) = writeln!(file, "pid={} user={} tier={}", std::process::id(), key.user_id, key.tier) {
            tracing::debug!(lock = %path.display(), error = %e, "could not write lock owner");
        }
        Ok(ShelfLock { path })
    }

    /// Which tier currently holds `book_id` for `user_id`, if any.
    pub fn find_book(&self, user_id: &str, book_id: &str) -> Result<Option<(Tier, RankedBook)>, PersistenceError> {
        let doc = self.read()?;
        let Some(shelf) = doc.users.get(user_id) else {
            return Ok(None);
        };
        Ok(Tier::ALL.into_iter().find_map(|tier| {
            shelf.tier(tier).iter().find(|b| b.id == book_id).map(|b| (tier, b.clone()))
        }))
    }

    fn read(&self) -> Result<ShelfFile, PersistenceError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                PersistenceError::Backend(format!("corrupt shelf file {}: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ShelfFile::default()),
            Err(e) => Err(PersistenceError::Io(e)),
        }
    }

    fn write(&self, doc: &ShelfFile) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(doc)
            .map_err(|e| PersistenceError::Backend(format!("failed to encode shelf: {e}")))?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn modify<F>(&self, key: &TierKey, f: F) -> Result<(), PersistenceError>
    where
        F: FnOnce(&mut Vec<RankedBook>),
    {
        let mut doc = self.read()?;
        let rows = doc.users.entry(key.user_id.clone()).or_default().tier_mut(key.tier);
        f(rows);
        rows.sort_by(|a, b| b.score.total_cmp(&a.score));
        self.write(&doc)
    }
}

/// Removes the shelf's lock file when dropped.
#[derive(Debug)]
pub struct ShelfLock {
    path: PathBuf,
}

impl Drop for ShelfLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(lock = %self.path.display(), error = %e, "failed to remove shelf lock");
        }
    }
}

fn put(rows: &mut Vec<RankedBook>, book: &RankedBook) {
    match rows.iter_mut().find(|b| b.id == book.id) {
        Some(row) => *row = book.clone(),
        None => rows.push(book.clone()),
    }
}

impl RankingPersistence for JsonShelf {
    fn load_tier(&self, key: &TierKey) -> Result<Vec<RankedBook>, PersistenceError> {
        let doc = self.read()?;
        Ok(doc
            .users
            .get(&key.user_id)
            .map(|shelf| shelf.tier(key.tier).clone())
            .unwrap_or_default())
    }

    fn upsert_score(&mut self, key: &TierKey, book: &RankedBook) -> Result<(), PersistenceError> {
        self.modify(key, |rows| put(rows, book))
    }

    fn upsert_scores_batch(&mut self, key: &TierKey, books: &[RankedBook]) -> Result<(), PersistenceError> {
        self.modify(key, |rows| {
            for book in books {
                put(rows, book);
            }
        })
    }

    fn read_score(&self, key: &TierKey, book_id: &str) -> Result<Option<f64>, PersistenceError> {
        Ok(self.load_tier(key)?.into_iter().find(|b| b.id == book_id).map(|b| b.score))
    }

    fn delete_book(&mut self, key: &TierKey, book_id: &str) -> Result<bool, PersistenceError> {
        let mut removed = false;
        self.modify(key, |rows| {
            let before = rows.len();
            rows.retain(|b| b.id != book_id);
            removed = rows.len() != before;
        })?;
        Ok(removed)
    }
}
