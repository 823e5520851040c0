//! JSON export of computed statistics.
//!
//! Every kind writes into a [`StagedOutput`]; the caller commits once all
//! kinds have succeeded.

pub mod documents;
pub mod stage;

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::calculate::{PairKind, PartitionResults};
use crate::models::{
    CharacterId, Pair, RankMatchCount, ShrinkageResult, StarRate, Trio, TrioMatchup,
};

pub use documents::*;
pub use stage::StagedOutput;

/// Errors that can occur while writing output.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON serialization error for {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Artifact path must be relative and stay inside the output root: {0}")]
    InvalidPath(PathBuf),

    #[error("Staging area lock poisoned")]
    Poisoned,
}

impl ExportError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Names of the artifacts under the output root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    pub win_rates: PathBuf,
    pub star_rates: PathBuf,
    pub rank_match_counts: PathBuf,
    pub pair_dir: PathBuf,
    pub trio_dir: PathBuf,
    pub three_vs_three_dir: PathBuf,
}

impl Default for OutputLayout {
    fn default() -> Self {
        Self {
            win_rates: PathBuf::from("win_rates.json"),
            star_rates: PathBuf::from("star_rates.json"),
            rank_match_counts: PathBuf::from("rank_match_counts.json"),
            pair_dir: PathBuf::from("pair_stats"),
            trio_dir: PathBuf::from("trio_stats"),
            three_vs_three_dir: PathBuf::from("three_vs_three_stats"),
        }
    }
}

impl OutputLayout {
    pub fn pair_kind_dir(&self, kind: PairKind) -> PathBuf {
        self.pair_dir.join(kind.as_str())
    }

    pub fn pair_file(&self, kind: PairKind, partition: &str) -> PathBuf {
        self.pair_kind_dir(kind).join(format!("{}.json", partition))
    }

    pub fn trio_file(&self, partition: &str) -> PathBuf {
        self.trio_dir.join(format!("{}.json", partition))
    }

    pub fn three_vs_three_file(&self, partition: &str) -> PathBuf {
        self.three_vs_three_dir.join(format!("{}.json", partition))
    }
}

pub fn write_win_rates(
    stage: &StagedOutput,
    layout: &OutputLayout,
    results: &PartitionResults<ShrinkageResult<CharacterId>>,
) -> Result<usize, ExportError> {
    stage.write_json(&layout.win_rates, &win_rate_document(results))?;
    info!("Wrote win rates for {} partitions", results.len());
    Ok(1)
}

pub fn write_star_rates(
    stage: &StagedOutput,
    layout: &OutputLayout,
    results: &PartitionResults<StarRate>,
) -> Result<usize, ExportError> {
    stage.write_json(&layout.star_rates, &star_rate_document(results))?;
    info!("Wrote star rates for {} partitions", results.len());
    Ok(1)
}

pub fn write_rank_match_counts(
    stage: &StagedOutput,
    layout: &OutputLayout,
    counts: &[RankMatchCount],
) -> Result<usize, ExportError> {
    stage.write_json(&layout.rank_match_counts, counts)?;
    info!("Wrote match counts for {} ranks", counts.len());
    Ok(1)
}

/// One file per partition under `<pair_dir>/<kind>/`.
pub fn write_pair_stats(
    stage: &StagedOutput,
    layout: &OutputLayout,
    kind: PairKind,
    results: &PartitionResults<ShrinkageResult<Pair>>,
) -> Result<usize, ExportError> {
    stage.create_dir(&layout.pair_kind_dir(kind))?;
    for (partition, rows) in results {
        let path = layout.pair_file(kind, &partition.file_stem());
        stage.write_json(&path, &pair_document(rows, kind))?;
    }
    info!("Wrote {} {} pair files", results.len(), kind);
    Ok(results.len())
}

pub fn write_trio_stats(
    stage: &StagedOutput,
    layout: &OutputLayout,
    results: &PartitionResults<ShrinkageResult<Trio>>,
) -> Result<usize, ExportError> {
    stage.create_dir(&layout.trio_dir)?;
    for (partition, rows) in results {
        let path = layout.trio_file(&partition.file_stem());
        stage.write_json(&path, &trio_document(rows))?;
    }
    info!("Wrote {} trio files", results.len());
    Ok(results.len())
}

pub fn write_three_vs_three_stats(
    stage: &StagedOutput,
    layout: &OutputLayout,
    results: &PartitionResults<ShrinkageResult<TrioMatchup>>,
) -> Result<usize, ExportError> {
    stage.create_dir(&layout.three_vs_three_dir)?;
    for (partition, rows) in results {
        let path = layout.three_vs_three_file(&partition.file_stem());
        stage.write_json(&path, &three_vs_three_document(rows))?;
    }
    info!("Wrote {} 3v3 files", results.len());
    Ok(results.len())
}
