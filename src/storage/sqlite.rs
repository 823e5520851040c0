//! SQLite match store.
//!
//! Same tables the collector writes: `_ranks`, `_maps`, `rank_logs`,
//! `battle_logs`, `win_lose_logs`, `rank_star_logs`. Reads page through
//! each table by rowid (`rowid > :after ORDER BY rowid LIMIT :limit`), so no
//! query ever materialises more than one batch.

use std::path::{Path, PathBuf};

use rusqlite::{named_params, params, Connection, OpenFlags, Row};
use tracing::debug;

use super::{
    Batches, MatchGroupRow, MatchRow, MatchSource, StarAwardRow, StorageError, TeamLinkRow,
    WindowFilter,
};
use crate::models::{RankCatalog, RankEntry, RankId};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS _ranks (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        name_ja TEXT NOT NULL DEFAULT ''
    );
    CREATE TABLE IF NOT EXISTS _maps (
        id INTEGER PRIMARY KEY,
        mode_id INTEGER NULL,
        name TEXT NOT NULL DEFAULT ''
    );
    CREATE TABLE IF NOT EXISTS rank_logs (
        id TEXT PRIMARY KEY,
        map_id INTEGER NOT NULL,
        rank_id INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_rank_logs_rank ON rank_logs(rank_id);
    CREATE TABLE IF NOT EXISTS battle_logs (
        id TEXT PRIMARY KEY,
        rank_log_id TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_battle_logs_rank_log ON battle_logs(rank_log_id);
    CREATE TABLE IF NOT EXISTS win_lose_logs (
        battle_log_id TEXT NOT NULL,
        win_brawler_id INTEGER NULL,
        lose_brawler_id INTEGER NULL,
        UNIQUE (win_brawler_id, lose_brawler_id, battle_log_id)
    );
    CREATE INDEX IF NOT EXISTS idx_win_lose_logs_battle ON win_lose_logs(battle_log_id);
    CREATE TABLE IF NOT EXISTS rank_star_logs (
        rank_log_id TEXT NOT NULL,
        star_brawler_id INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_rank_star_logs_rank_log ON rank_star_logs(rank_log_id);
"#;

const GROUPS_SQL: &str = r#"
    SELECT rl.rowid, rl.id, rl.map_id, rl.rank_id, m.mode_id
    FROM rank_logs rl
    LEFT JOIN _maps m ON rl.map_id = m.id
    WHERE rl.rank_id >= :min_rank AND rl.id >= :since AND rl.rowid > :after
    ORDER BY rl.rowid
    LIMIT :limit
"#;

const MATCHES_SQL: &str = r#"
    SELECT bl.rowid, bl.id, bl.rank_log_id
    FROM battle_logs bl
    JOIN rank_logs rl ON bl.rank_log_id = rl.id
    WHERE rl.rank_id >= :min_rank AND rl.id >= :since AND bl.rowid > :after
    ORDER BY bl.rowid
    LIMIT :limit
"#;

const TEAM_LINKS_SQL: &str = r#"
    SELECT wl.rowid, wl.battle_log_id, wl.win_brawler_id, wl.lose_brawler_id
    FROM win_lose_logs wl
    JOIN battle_logs bl ON wl.battle_log_id = bl.id
    JOIN rank_logs rl ON bl.rank_log_id = rl.id
    WHERE rl.rank_id >= :min_rank AND rl.id >= :since AND wl.rowid > :after
    ORDER BY wl.rowid
    LIMIT :limit
"#;

const STARS_SQL: &str = r#"
    SELECT rsl.rowid, rsl.rank_log_id, rsl.star_brawler_id
    FROM rank_star_logs rsl
    JOIN rank_logs rl ON rsl.rank_log_id = rl.id
    WHERE rl.rank_id >= :min_rank AND rl.id >= :since AND rsl.rowid > :after
    ORDER BY rsl.rowid
    LIMIT :limit
"#;

type RowMapper<T> = fn(&Row<'_>) -> rusqlite::Result<(i64, T)>;

/// Match source backed by a SQLite database.
pub struct SqliteStore {
    conn: Connection,
    path: PathBuf,
}

impl SqliteStore {
    /// Open an existing database read-only.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|source| StorageError::Connection {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// Open (or create) a writable database and make sure the schema exists.
    pub fn create(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|source| StorageError::Connection {
            path: path.to_path_buf(),
            source,
        })?;
        let store = Self {
            conn,
            path: path.to_path_buf(),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// An in-memory database with the schema applied.
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(|source| StorageError::Connection {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        let store = Self {
            conn,
            path: PathBuf::from(":memory:"),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn init_schema(&self) -> Result<(), StorageError> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    pub fn insert_rank(&self, rank: &RankEntry) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO _ranks(id, name, name_ja) VALUES (?1, ?2, ?3)",
            params![rank.id.get(), rank.name, rank.name_ja],
        )?;
        Ok(())
    }

    pub fn insert_map(&self, map_id: u32, mode_id: Option<u32>, name: &str) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO _maps(id, mode_id, name) VALUES (?1, ?2, ?3)",
            params![map_id, mode_id, name],
        )?;
        Ok(())
    }

    pub fn insert_match_group(&self, group: &MatchGroupRow) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO rank_logs(id, map_id, rank_id) VALUES (?1, ?2, ?3)",
            params![group.id.as_str(), group.map_id.get(), group.rank_id.get()],
        )?;
        Ok(())
    }

    pub fn insert_match(&self, row: &MatchRow) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO battle_logs(id, rank_log_id) VALUES (?1, ?2)",
            params![row.id.as_str(), row.group_id.as_str()],
        )?;
        Ok(())
    }

    pub fn insert_team_link(&self, row: &TeamLinkRow) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO win_lose_logs(win_brawler_id, lose_brawler_id, battle_log_id)
             VALUES (?1, ?2, ?3)",
            params![
                row.winner.map(|c| c.get()),
                row.loser.map(|c| c.get()),
                row.match_id.as_str()
            ],
        )?;
        Ok(())
    }

    pub fn insert_star_award(&self, row: &StarAwardRow) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO rank_star_logs(rank_log_id, star_brawler_id) VALUES (?1, ?2)",
            params![row.group_id.as_str(), row.character.get()],
        )?;
        Ok(())
    }

    fn keyset<'a, T: 'a>(
        &'a self,
        sql: &'static str,
        filter: &WindowFilter,
        batch_size: usize,
        map_row: RowMapper<T>,
    ) -> Batches<'a, T> {
        Box::new(KeysetBatches {
            conn: &self.conn,
            sql,
            since: filter.since.clone(),
            min_rank: filter.min_rank.get(),
            after: 0,
            batch_size: batch_size.max(1),
            done: false,
            map_row,
        })
    }
}

/// Pages through a query by rowid, one batch per `next`.
struct KeysetBatches<'a, T> {
    conn: &'a Connection,
    sql: &'static str,
    since: String,
    min_rank: u32,
    after: i64,
    batch_size: usize,
    done: bool,
    map_row: RowMapper<T>,
}

impl<T> KeysetBatches<'_, T> {
    fn fetch(&mut self) -> Result<Vec<T>, StorageError> {
        let conn = self.conn;
        let map_row = self.map_row;
        let mut stmt = conn.prepare_cached(self.sql)?;
        let rows = stmt.query_map(
            named_params! {
                ":min_rank": self.min_rank,
                ":since": self.since,
                ":after": self.after,
                ":limit": self.batch_size as i64,
            },
            map_row,
        )?;

        let mut batch = Vec::with_capacity(self.batch_size.min(4096));
        let mut last = self.after;
        for row in rows {
            let (rowid, item) = row?;
            last = rowid;
            batch.push(item);
        }
        self.after = last;
        Ok(batch)
    }
}

impl<T> Iterator for KeysetBatches<'_, T> {
    type Item = Result<Vec<T>, StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.fetch() {
            Ok(batch) if batch.is_empty() => {
                self.done = true;
                None
            }
            Ok(batch) => {
                if batch.len() < self.batch_size {
                    self.done = true;
                }
                debug!("Fetched batch of {} rows (after rowid {})", batch.len(), self.after);
                Some(Ok(batch))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

fn map_group(row: &Row<'_>) -> rusqlite::Result<(i64, MatchGroupRow)> {
    Ok((
        row.get(0)?,
        MatchGroupRow {
            id: row.get::<_, String>(1)?.into(),
            map_id: row.get::<_, u32>(2)?.into(),
            rank_id: row.get::<_, u32>(3)?.into(),
            mode_id: row.get::<_, Option<u32>>(4)?.map(Into::into),
        },
    ))
}

fn map_match(row: &Row<'_>) -> rusqlite::Result<(i64, MatchRow)> {
    Ok((
        row.get(0)?,
        MatchRow {
            id: row.get::<_, String>(1)?.into(),
            group_id: row.get::<_, String>(2)?.into(),
        },
    ))
}

fn map_team_link(row: &Row<'_>) -> rusqlite::Result<(i64, TeamLinkRow)> {
    Ok((
        row.get(0)?,
        TeamLinkRow {
            match_id: row.get::<_, String>(1)?.into(),
            winner: row.get::<_, Option<u32>>(2)?.map(Into::into),
            loser: row.get::<_, Option<u32>>(3)?.map(Into::into),
        },
    ))
}

fn map_star(row: &Row<'_>) -> rusqlite::Result<(i64, StarAwardRow)> {
    Ok((
        row.get(0)?,
        StarAwardRow {
            group_id: row.get::<_, String>(1)?.into(),
            character: row.get::<_, u32>(2)?.into(),
        },
    ))
}

impl MatchSource for SqliteStore {
    fn describe(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }

    fn match_groups(&self, filter: &WindowFilter, batch_size: usize) -> Batches<'_, MatchGroupRow> {
        self.keyset(GROUPS_SQL, filter, batch_size, map_group)
    }

    fn matches(&self, filter: &WindowFilter, batch_size: usize) -> Batches<'_, MatchRow> {
        self.keyset(MATCHES_SQL, filter, batch_size, map_match)
    }

    fn team_links(&self, filter: &WindowFilter, batch_size: usize) -> Batches<'_, TeamLinkRow> {
        self.keyset(TEAM_LINKS_SQL, filter, batch_size, map_team_link)
    }

    fn star_awards(&self, filter: &WindowFilter, batch_size: usize) -> Batches<'_, StarAwardRow> {
        self.keyset(STARS_SQL, filter, batch_size, map_star)
    }

    fn rank_catalog(&self) -> Result<RankCatalog, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, name_ja FROM _ranks ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(RankEntry {
                id: row.get::<_, u32>(0)?.into(),
                name: row.get(1)?,
                name_ja: row.get(2)?,
            })
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(RankCatalog::new(entries))
    }

    fn match_group_counts(&self, min_rank: RankId) -> Result<Vec<(RankId, u64)>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT rank_id, COUNT(*) FROM rank_logs WHERE rank_id >= ?1 GROUP BY rank_id ORDER BY rank_id",
        )?;
        let rows = stmt.query_map(params![min_rank.get()], |row| {
            Ok((
                RankId(row.get::<_, u32>(0)?),
                row.get::<_, i64>(1)?.max(0) as u64,
            ))
        })?;

        let mut counts = Vec::new();
        for row in rows {
            counts.push(row?);
        }
        Ok(counts)
    }
}
