//! Runs aggregation kinds over one shared dataset and publishes the results.
//!
//! The dataset is loaded once on a blocking thread. Each kind then runs as its
//! own blocking task over the same `Arc<StatsDataset>`, writing into one
//! staged output. The stage is committed only after every kind succeeded.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use tokio::task::JoinSet;
use tracing::info;

use crate::calculate::{self, load_dataset, DataQuality, DatasetSummary, PairKind, StatsDataset};
use crate::config::{AppConfig, StatsConfig, StorageBackend, StorageSettings};
use crate::export::{self, OutputLayout, StagedOutput};
use crate::models::RankMatchCount;
use crate::storage::{JsonlStore, MatchSource, SqliteStore, StorageConfig, StorageError};

/// One exported statistic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StatKind {
    WinRates,
    StarRates,
    PairStats,
    TrioStats,
    ThreeVsThree,
    RankMatchCounts,
}

impl StatKind {
    pub const ALL: [StatKind; 6] = [
        StatKind::WinRates,
        StatKind::StarRates,
        StatKind::PairStats,
        StatKind::TrioStats,
        StatKind::ThreeVsThree,
        StatKind::RankMatchCounts,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatKind::WinRates => "win-rates",
            StatKind::StarRates => "star-rates",
            StatKind::PairStats => "pair-stats",
            StatKind::TrioStats => "trio-stats",
            StatKind::ThreeVsThree => "three-vs-three",
            StatKind::RankMatchCounts => "rank-match-counts",
        }
    }

    /// Whether the kind reads the match window (rank counts only read totals).
    pub fn needs_dataset(&self) -> bool {
        !matches!(self, StatKind::RankMatchCounts)
    }
}

impl fmt::Display for StatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub kinds: Vec<StatKind>,
    /// Published top-level artifacts
    pub artifacts: Vec<PathBuf>,
    /// JSON files written across all kinds
    pub files_written: usize,
    pub dataset: DatasetSummary,
    pub quality: DataQuality,
    pub elapsed: Duration,
}

/// Open the configured match store.
pub fn open_source(settings: &StorageSettings) -> Result<Box<dyn MatchSource>, StorageError> {
    match settings.backend {
        StorageBackend::Sqlite => Ok(Box::new(SqliteStore::open(&settings.path)?)),
        StorageBackend::Jsonl => Ok(Box::new(JsonlStore::open(StorageConfig::new(
            settings.path.clone(),
        ))?)),
    }
}

struct Loaded {
    dataset: StatsDataset,
    rank_counts: Option<Vec<RankMatchCount>>,
}

fn load(
    storage: &StorageSettings,
    stats: &StatsConfig,
    now: DateTime<Utc>,
    with_dataset: bool,
    with_rank_counts: bool,
) -> Result<Loaded> {
    let window = stats.window(now)?;
    let source = open_source(storage)
        .with_context(|| format!("Failed to open {} store", storage.path.display()))?;

    let dataset = if with_dataset {
        load_dataset(source.as_ref(), &window, storage.batch_size)
            .context("Failed to load match window")?
    } else {
        StatsDataset::default()
    };

    let rank_counts = if with_rank_counts {
        let catalog = source.rank_catalog().context("Failed to read rank catalog")?;
        let counts = source
            .match_group_counts(stats.min_rank())
            .context("Failed to count match groups")?;
        Some(calculate::rank_match_counts(
            &catalog,
            &counts,
            stats.min_rank(),
        ))
    } else {
        None
    };

    Ok(Loaded {
        dataset,
        rank_counts,
    })
}

fn run_kind(
    kind: StatKind,
    dataset: &StatsDataset,
    stage: &StagedOutput,
    layout: &OutputLayout,
    stats: &StatsConfig,
) -> Result<usize> {
    let start = Instant::now();
    let by = stats.partition_by;

    let files = match kind {
        StatKind::WinRates => {
            let results =
                calculate::win_rates(dataset, by, stats.options(stats.win_rate_min_games))?;
            export::write_win_rates(stage, layout, &results)?
        }
        StatKind::StarRates => {
            let results = calculate::star_rates(dataset, by);
            export::write_star_rates(stage, layout, &results)?
        }
        StatKind::PairStats => {
            let mut files = 0;
            for pair_kind in PairKind::ALL {
                let results = calculate::pair_rates(
                    dataset,
                    pair_kind,
                    by,
                    stats.options(stats.pair_min_games),
                )?;
                files += export::write_pair_stats(stage, layout, pair_kind, &results)?;
            }
            files
        }
        StatKind::TrioStats => {
            let results = calculate::trio_rates(dataset, by, stats.options(stats.trio_min_games))?;
            export::write_trio_stats(stage, layout, &results)?
        }
        StatKind::ThreeVsThree => {
            let results = calculate::three_vs_three_rates(
                dataset,
                by,
                stats.options(stats.three_vs_three_min_games),
            )?;
            export::write_three_vs_three_stats(stage, layout, &results)?
        }
        StatKind::RankMatchCounts => 0,
    };

    info!("{}: {} files in {:?}", kind, files, start.elapsed());
    Ok(files)
}

/// Compute `kinds` for the window ending at `now` and publish them under the
/// configured output root. On any error nothing is published.
pub async fn run(config: &AppConfig, kinds: &[StatKind], now: DateTime<Utc>) -> Result<RunSummary> {
    let start = Instant::now();
    let mut kinds = kinds.to_vec();
    kinds.sort();
    kinds.dedup();
    if kinds.is_empty() {
        return Err(anyhow!("No statistics requested"));
    }

    let with_dataset = kinds.iter().any(StatKind::needs_dataset);
    let with_rank_counts = kinds.contains(&StatKind::RankMatchCounts);

    let storage = config.storage.clone();
    let stats = config.stats.clone();
    let loaded = tokio::task::spawn_blocking(move || {
        load(&storage, &stats, now, with_dataset, with_rank_counts)
    })
    .await
    .context("Dataset loading task failed")??;

    let dataset = Arc::new(loaded.dataset);
    let stage = Arc::new(
        StagedOutput::new(&config.output.root).context("Failed to prepare output staging")?,
    );
    let layout = config.output.layout();

    let mut files_written = 0;
    if let Some(counts) = &loaded.rank_counts {
        files_written += export::write_rank_match_counts(&stage, &layout, counts)?;
    }

    let mut tasks = JoinSet::new();
    for &kind in kinds.iter().filter(|k| k.needs_dataset()) {
        let dataset = Arc::clone(&dataset);
        let stage = Arc::clone(&stage);
        let layout = layout.clone();
        let stats = config.stats.clone();
        tasks.spawn_blocking(move || {
            run_kind(kind, &dataset, &stage, &layout, &stats)
                .with_context(|| format!("Failed to export {}", kind))
        });
    }

    while let Some(joined) = tasks.join_next().await {
        files_written += joined.context("Aggregation task failed")??;
    }

    let stage = Arc::try_unwrap(stage)
        .map_err(|_| anyhow!("Output stage still in use after all tasks finished"))?;
    let artifacts = stage.commit().context("Failed to publish output")?;

    Ok(RunSummary {
        kinds,
        artifacts,
        files_written,
        dataset: dataset.summary(),
        quality: dataset.quality(),
        elapsed: start.elapsed(),
    })
}
