//! Match storage.
//!
//! The statistics engine only reads. Both stores expose the same batched row
//! streams through [`MatchSource`]:
//! - SQLite: the relational schema the collector writes to
//! - JSONL: a filesystem data lake with one file per table

pub mod jsonl;
pub mod sqlite;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{CharacterId, MapId, MatchGroupId, MatchId, ModeId, RankCatalog, RankId};

pub use jsonl::{EntityType, JsonlReader, JsonlStore};
pub use sqlite::SqliteStore;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Cannot open store at {path}: {source}")]
    Connection {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Query failed: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),
}

/// Configuration for the JSONL data lake.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl StorageConfig {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    pub fn normalized_dir(&self) -> PathBuf {
        self.data_dir.join("normalized")
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::new(PathBuf::from("./data"))
    }
}

/// Which match groups a load covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowFilter {
    /// Inclusive lower bound compared against match group ids (`YYYYMMDD...`).
    pub since: String,
    /// Inclusive lower bound on the rank tier.
    pub min_rank: RankId,
}

impl WindowFilter {
    pub fn new(since: impl Into<String>, min_rank: RankId) -> Self {
        Self {
            since: since.into(),
            min_rank,
        }
    }

    pub fn admits(&self, group: &MatchGroupRow) -> bool {
        group.rank_id >= self.min_rank && group.id.as_str() >= self.since.as_str()
    }
}

/// A ranked set (`rank_logs`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchGroupRow {
    pub id: MatchGroupId,
    pub map_id: MapId,
    pub rank_id: RankId,
    #[serde(default)]
    pub mode_id: Option<ModeId>,
}

/// A battle and the ranked set it belongs to (`battle_logs`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRow {
    pub id: MatchId,
    #[serde(rename = "rank_log_id")]
    pub group_id: MatchGroupId,
}

/// One winner x loser pairing inside a battle (`win_lose_logs`).
///
/// Either id may be missing when the collector could not identify the
/// character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamLinkRow {
    #[serde(rename = "battle_log_id")]
    pub match_id: MatchId,
    #[serde(rename = "win_brawler_id", default)]
    pub winner: Option<CharacterId>,
    #[serde(rename = "lose_brawler_id", default)]
    pub loser: Option<CharacterId>,
}

/// A star player award for a ranked set (`rank_star_logs`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StarAwardRow {
    #[serde(rename = "rank_log_id")]
    pub group_id: MatchGroupId,
    #[serde(rename = "star_brawler_id")]
    pub character: CharacterId,
}

/// A stream of row batches. Each batch holds at most the requested number of rows.
pub type Batches<'a, T> = Box<dyn Iterator<Item = Result<Vec<T>, StorageError>> + 'a>;

/// Read access to recorded matches.
///
/// `match_groups` must honour the window filter. The child streams
/// (`matches`, `team_links`, `star_awards`) may return rows outside the
/// window; the loader drops anything whose parent was not loaded.
pub trait MatchSource {
    /// Short description for logs.
    fn describe(&self) -> String;

    fn match_groups(&self, filter: &WindowFilter, batch_size: usize) -> Batches<'_, MatchGroupRow>;

    fn matches(&self, filter: &WindowFilter, batch_size: usize) -> Batches<'_, MatchRow>;

    fn team_links(&self, filter: &WindowFilter, batch_size: usize) -> Batches<'_, TeamLinkRow>;

    fn star_awards(&self, filter: &WindowFilter, batch_size: usize) -> Batches<'_, StarAwardRow>;

    fn rank_catalog(&self) -> Result<RankCatalog, StorageError>;

    /// Number of match groups per rank at or above `min_rank`, over all time.
    fn match_group_counts(&self, min_rank: RankId) -> Result<Vec<(RankId, u64)>, StorageError>;
}

/// Groups a fallible row iterator into batches, stopping after the first error.
pub(crate) struct Chunked<I> {
    inner: I,
    size: usize,
    failed: bool,
}

impl<I> Chunked<I> {
    pub(crate) fn new(inner: I, size: usize) -> Self {
        Self {
            inner,
            size: size.max(1),
            failed: false,
        }
    }
}

impl<T, I> Iterator for Chunked<I>
where
    I: Iterator<Item = Result<T, StorageError>>,
{
    type Item = Result<Vec<T>, StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        let mut batch = Vec::with_capacity(self.size.min(4096));
        while batch.len() < self.size {
            match self.inner.next() {
                Some(Ok(item)) => batch.push(item),
                Some(Err(e)) => {
                    self.failed = true;
                    return Some(Err(e));
                }
                None => break,
            }
        }

        if batch.is_empty() {
            None
        } else {
            Some(Ok(batch))
        }
    }
}
