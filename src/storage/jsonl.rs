//! JSONL (JSON Lines) storage.
//!
//! The data lake keeps one file per table under `normalized/`. Each line is
//! a valid JSON object representing one row. Files are streamed, never read
//! into memory whole, so the lake can grow well past a single batch.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::marker::PhantomData;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use tracing::{debug, info};

use super::{
    Batches, Chunked, MatchGroupRow, MatchRow, MatchSource, StarAwardRow, StorageConfig,
    StorageError, TeamLinkRow, WindowFilter,
};
use crate::models::{RankCatalog, RankEntry, RankId};

/// Tables stored in the lake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityType {
    Rank,
    MatchGroup,
    Match,
    TeamLink,
    StarAward,
}

impl EntityType {
    /// Get the filename for this entity type.
    pub fn filename(&self) -> &'static str {
        match self {
            EntityType::Rank => "ranks.jsonl",
            EntityType::MatchGroup => "rank_logs.jsonl",
            EntityType::Match => "battle_logs.jsonl",
            EntityType::TeamLink => "win_lose_logs.jsonl",
            EntityType::StarAward => "rank_star_logs.jsonl",
        }
    }
}

/// Get the path for an entity file.
pub fn entity_path(config: &StorageConfig, entity: EntityType) -> PathBuf {
    config.normalized_dir().join(entity.filename())
}

/// JSONL file reader.
pub struct JsonlReader<T> {
    path: PathBuf,
    _marker: PhantomData<T>,
}

impl<T: DeserializeOwned> JsonlReader<T> {
    /// Create a new JSONL reader for the given path.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            _marker: PhantomData,
        }
    }

    pub fn for_entity(config: &StorageConfig, entity: EntityType) -> Self {
        Self::new(entity_path(config, entity))
    }

    /// Check if the file exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read all rows from the file. A missing file reads as empty.
    pub fn read_all(&self) -> Result<Vec<T>, StorageError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        self.iter()?.collect()
    }

    /// Create an iterator over the file.
    pub fn iter(&self) -> Result<JsonlIterator<T>, StorageError> {
        if !self.path.exists() {
            return Err(StorageError::PathNotFound(self.path.clone()));
        }

        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);

        Ok(JsonlIterator {
            reader,
            _marker: PhantomData,
        })
    }

    /// Stream the file in batches; a missing file yields no batches.
    fn batches<'a>(&self, batch_size: usize) -> Batches<'a, T>
    where
        T: 'a,
    {
        if !self.exists() {
            debug!("{} missing, reading as empty", self.path.display());
            return Box::new(std::iter::empty());
        }
        match self.iter() {
            Ok(rows) => Box::new(Chunked::new(rows, batch_size)),
            Err(e) => Box::new(std::iter::once(Err(e))),
        }
    }
}

/// Iterator over JSONL file entries.
pub struct JsonlIterator<T> {
    reader: BufReader<File>,
    _marker: PhantomData<T>,
}

impl<T: DeserializeOwned> Iterator for JsonlIterator<T> {
    type Item = Result<T, StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut line = String::new();

        loop {
            line.clear();
            match self.reader.read_line(&mut line) {
                Ok(0) => return None, // EOF
                Ok(_) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    return Some(serde_json::from_str(&line).map_err(StorageError::Json));
                }
                Err(e) => return Some(Err(StorageError::Io(e))),
            }
        }
    }
}

/// Match source backed by the JSONL data lake.
#[derive(Debug, Clone)]
pub struct JsonlStore {
    config: StorageConfig,
}

impl JsonlStore {
    /// Open an existing lake. Fails if the `normalized/` directory is missing.
    pub fn open(config: StorageConfig) -> Result<Self, StorageError> {
        let dir = config.normalized_dir();
        if !dir.is_dir() {
            return Err(StorageError::PathNotFound(dir));
        }
        info!("Opened JSONL lake at {}", dir.display());
        Ok(Self { config })
    }

    fn reader<T: DeserializeOwned>(&self, entity: EntityType) -> JsonlReader<T> {
        JsonlReader::for_entity(&self.config, entity)
    }
}

impl MatchSource for JsonlStore {
    fn describe(&self) -> String {
        format!("jsonl:{}", self.config.normalized_dir().display())
    }

    fn match_groups(&self, filter: &WindowFilter, batch_size: usize) -> Batches<'_, MatchGroupRow> {
        let reader: JsonlReader<MatchGroupRow> = self.reader(EntityType::MatchGroup);
        if !reader.exists() {
            return Box::new(std::iter::empty());
        }
        let filter = filter.clone();
        match reader.iter() {
            Ok(rows) => {
                let admitted = rows.filter(move |row| match row {
                    Ok(group) => filter.admits(group),
                    Err(_) => true,
                });
                Box::new(Chunked::new(admitted, batch_size))
            }
            Err(e) => Box::new(std::iter::once(Err(e))),
        }
    }

    fn matches(&self, _filter: &WindowFilter, batch_size: usize) -> Batches<'_, MatchRow> {
        self.reader::<MatchRow>(EntityType::Match).batches(batch_size)
    }

    fn team_links(&self, _filter: &WindowFilter, batch_size: usize) -> Batches<'_, TeamLinkRow> {
        self.reader::<TeamLinkRow>(EntityType::TeamLink).batches(batch_size)
    }

    fn star_awards(&self, _filter: &WindowFilter, batch_size: usize) -> Batches<'_, StarAwardRow> {
        self.reader::<StarAwardRow>(EntityType::StarAward).batches(batch_size)
    }

    fn rank_catalog(&self) -> Result<RankCatalog, StorageError> {
        let entries: Vec<RankEntry> = self.reader(EntityType::Rank).read_all()?;
        Ok(RankCatalog::new(entries))
    }

    fn match_group_counts(&self, min_rank: RankId) -> Result<Vec<(RankId, u64)>, StorageError> {
        let reader: JsonlReader<MatchGroupRow> = self.reader(EntityType::MatchGroup);
        if !reader.exists() {
            return Ok(Vec::new());
        }

        let mut counts: BTreeMap<RankId, u64> = BTreeMap::new();
        for row in reader.iter()? {
            let row = row?;
            if row.rank_id >= min_rank {
                *counts.entry(row.rank_id).or_default() += 1;
            }
        }
        Ok(counts.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CharacterId, MapId, MatchGroupId};
    use serde::Serialize;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_rows<T: Serialize>(path: &Path, rows: &[T]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut content = String::new();
        for row in rows {
            content.push_str(&serde_json::to_string(row).unwrap());
            content.push('\n');
        }
        fs::write(path, content).unwrap();
    }

    fn test_config(temp_dir: &TempDir) -> StorageConfig {
        StorageConfig::new(temp_dir.path().to_path_buf())
    }

    fn group(id: &str, rank: u32) -> MatchGroupRow {
        MatchGroupRow {
            id: MatchGroupId::from(id),
            map_id: MapId(1),
            rank_id: RankId(rank),
            mode_id: None,
        }
    }

    #[test]
    fn test_jsonl_read_all() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.jsonl");

        let rows = vec![group("20250801000001", 4), group("20250801000002", 5)];
        write_rows(&path, &rows);

        let reader: JsonlReader<MatchGroupRow> = JsonlReader::new(path);
        assert_eq!(reader.read_all().unwrap(), rows);
    }

    #[test]
    fn test_jsonl_skips_blank_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("blank.jsonl");
        fs::write(
            &path,
            "{\"id\":\"20250801000001\",\"map_id\":1,\"rank_id\":4}\n\n  \n",
        )
        .unwrap();

        let reader: JsonlReader<MatchGroupRow> = JsonlReader::new(path);
        assert_eq!(reader.read_all().unwrap(), vec![group("20250801000001", 4)]);
    }

    #[test]
    fn test_jsonl_read_missing_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let reader: JsonlReader<MatchGroupRow> =
            JsonlReader::new(temp_dir.path().join("nonexistent.jsonl"));
        assert!(!reader.exists());
        assert!(reader.read_all().unwrap().is_empty());
        assert!(reader.iter().is_err());
    }

    #[test]
    fn test_jsonl_malformed_line_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.jsonl");
        fs::write(&path, "{\"id\":\"20250801000001\",\"map_id\":1,\"rank_id\":4}\nnot json\n")
            .unwrap();

        let reader: JsonlReader<MatchGroupRow> = JsonlReader::new(path);
        assert!(matches!(reader.read_all(), Err(StorageError::Json(_))));
    }

    #[test]
    fn test_store_open_requires_lake() {
        let temp_dir = TempDir::new().unwrap();
        let err = JsonlStore::open(test_config(&temp_dir)).unwrap_err();
        assert!(matches!(err, StorageError::PathNotFound(_)));
    }

    #[test]
    fn test_store_filters_groups_and_batches() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir);
        write_rows(
            &entity_path(&config, EntityType::MatchGroup),
            &[
                group("20250701000001", 6),
                group("20250801000001", 4),
                group("20250801000002", 3),
                group("20250802000001", 5),
                group("20250803000001", 7),
            ],
        );

        let store = JsonlStore::open(config).unwrap();
        let filter = WindowFilter::new("20250801", RankId(4));
        let batches: Vec<Vec<MatchGroupRow>> = store
            .match_groups(&filter, 2)
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[1].len(), 1);
        assert_eq!(batches[0][0].id.as_str(), "20250801000001");
    }

    #[test]
    fn test_store_missing_tables_are_empty() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir);
        fs::create_dir_all(config.normalized_dir()).unwrap();

        let store = JsonlStore::open(config).unwrap();
        let filter = WindowFilter::new("20250801", RankId(4));
        assert_eq!(store.matches(&filter, 10).count(), 0);
        assert_eq!(store.team_links(&filter, 10).count(), 0);
        assert!(store.rank_catalog().unwrap().is_empty());
        assert!(store.match_group_counts(RankId(1)).unwrap().is_empty());
    }

    #[test]
    fn test_store_team_links_and_counts() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir);
        write_rows(
            &entity_path(&config, EntityType::TeamLink),
            &[TeamLinkRow {
                match_id: "b1".into(),
                winner: Some(CharacterId(1)),
                loser: Some(CharacterId(2)),
            }],
        );
        write_rows(
            &entity_path(&config, EntityType::MatchGroup),
            &[
                group("20240101000001", 4),
                group("20250801000001", 4),
                group("20250801000002", 2),
            ],
        );

        let store = JsonlStore::open(config).unwrap();
        let filter = WindowFilter::new("20250801", RankId(4));
        let links: Vec<_> = store.team_links(&filter, 10).collect();
        assert_eq!(links.len(), 1);

        let counts = store.match_group_counts(RankId(3)).unwrap();
        assert_eq!(counts, vec![(RankId(4), 2)]);
    }
}
