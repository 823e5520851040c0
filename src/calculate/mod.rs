//! Statistics calculation engine.
//!
//! Turns a loaded window of matches into ranked, confidence-bounded statistics:
//! - Character win rates
//! - Matchup and synergy pair rates
//! - Trio and exact 3v3 composition rates
//! - Star player and usage rates
//! - Match counts per rank
//!
//! Every confidence-bounded kind shares the same [`ShrinkageEstimator`].

pub mod dataset;
pub mod grouping;
pub mod ranking;
pub mod shrinkage;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::models::{
    CharacterId, GroupKey, GroupTally, Pair, PartitionBy, PartitionKey, RankCatalog, RankId,
    RankMatchCount, ShrinkageResult, StarRate, Trio, TrioMatchup,
};

pub use dataset::{load_dataset, DataQuality, DatasetBuilder, DatasetSummary, StarAward, StatsDataset};
pub use shrinkage::{beta_quantile, BetaPrior, ShrinkageEstimator};

/// Errors from statistics calculation.
#[derive(Debug, Error)]
pub enum StatsError {
    #[error("Confidence level must lie strictly between 0 and 1, got {0}")]
    InvalidConfidence(f64),
}

/// Results of one kind, one entry per partition with data.
pub type PartitionResults<T> = BTreeMap<PartitionKey, Vec<T>>;

/// Knobs shared by the confidence-bounded kinds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregationOptions {
    pub confidence: f64,
    pub min_games: u64,
}

impl AggregationOptions {
    pub fn new(confidence: f64, min_games: u64) -> Self {
        Self {
            confidence,
            min_games,
        }
    }
}

impl Default for AggregationOptions {
    fn default() -> Self {
        Self::new(0.95, 0)
    }
}

/// The two pair aggregations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PairKind {
    /// Opponents: how the first character fares against the second.
    Matchup,
    /// Teammates: how the two fare together.
    Synergy,
}

impl PairKind {
    pub const ALL: [PairKind; 2] = [PairKind::Matchup, PairKind::Synergy];

    pub fn as_str(&self) -> &'static str {
        match self {
            PairKind::Matchup => "matchup",
            PairKind::Synergy => "synergy",
        }
    }
}

impl fmt::Display for PairKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PairKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "matchup" => Ok(PairKind::Matchup),
            "synergy" => Ok(PairKind::Synergy),
            other => Err(format!("unknown pair kind '{}'", other)),
        }
    }
}

fn shrink_all<K: GroupKey>(
    tallies: BTreeMap<PartitionKey, BTreeMap<K, GroupTally>>,
    estimator: &ShrinkageEstimator,
    min_games: u64,
) -> PartitionResults<ShrinkageResult<K>> {
    let mut out = BTreeMap::new();
    for (partition, groups) in tallies {
        let mut results = estimator.estimate(&groups);
        ranking::retain_min_games(&mut results, min_games);
        ranking::rank(&mut results);
        debug!(
            "Partition {}: {} groups, {} reported",
            partition,
            groups.len(),
            results.len()
        );
        if !results.is_empty() {
            out.insert(partition, results);
        }
    }
    out
}

/// Per-character win rates.
pub fn win_rates(
    dataset: &StatsDataset,
    by: PartitionBy,
    options: AggregationOptions,
) -> Result<PartitionResults<ShrinkageResult<CharacterId>>, StatsError> {
    let estimator = ShrinkageEstimator::new(options.confidence)?;
    let tallies = grouping::single_tallies(dataset, by);
    Ok(shrink_all(tallies, &estimator, options.min_games))
}

/// Matchup or synergy rates. Synergy keys are canonical (`first < second`).
pub fn pair_rates(
    dataset: &StatsDataset,
    kind: PairKind,
    by: PartitionBy,
    options: AggregationOptions,
) -> Result<PartitionResults<ShrinkageResult<Pair>>, StatsError> {
    let estimator = ShrinkageEstimator::new(options.confidence)?;
    let tallies = match kind {
        PairKind::Matchup => grouping::matchup_tallies(dataset, by),
        PairKind::Synergy => grouping::synergy_tallies(dataset, by),
    };
    Ok(shrink_all(tallies, &estimator, options.min_games))
}

/// Whole-team trio rates. The prior is fitted on every trio before
/// `min_games` is applied.
pub fn trio_rates(
    dataset: &StatsDataset,
    by: PartitionBy,
    options: AggregationOptions,
) -> Result<PartitionResults<ShrinkageResult<Trio>>, StatsError> {
    let estimator = ShrinkageEstimator::new(options.confidence)?;
    let tallies = grouping::trio_tallies(dataset, by);
    Ok(shrink_all(tallies, &estimator, options.min_games))
}

/// Fewest combined games a 3v3 pairing needs, whatever the caller asks for.
pub const MIN_THREE_VS_THREE_GAMES: u64 = 4;

/// Exact 3v3 pairing rates. Pairings below `min_games` (at least
/// [`MIN_THREE_VS_THREE_GAMES`]) are dropped before the prior is fitted.
/// Partitions with 3v3 matches but no qualifying pairing report an empty list.
pub fn three_vs_three_rates(
    dataset: &StatsDataset,
    by: PartitionBy,
    options: AggregationOptions,
) -> Result<PartitionResults<ShrinkageResult<TrioMatchup>>, StatsError> {
    let estimator = ShrinkageEstimator::new(options.confidence)?;
    let min_games = options.min_games.max(MIN_THREE_VS_THREE_GAMES);
    let tallies = grouping::three_vs_three_tallies(dataset, by, min_games as f64);
    let partitions: Vec<PartitionKey> = tallies.keys().copied().collect();

    let mut results = shrink_all(tallies, &estimator, 0);
    for partition in partitions {
        results.entry(partition).or_default();
    }
    Ok(results)
}

/// Star player and usage rates, unshrunk. Characters without usage are left out.
pub fn star_rates(dataset: &StatsDataset, by: PartitionBy) -> PartitionResults<StarRate> {
    grouping::star_tallies(dataset, by)
        .into_iter()
        .filter_map(|(partition, tally)| {
            let rates: Vec<StarRate> = tally
                .usage
                .iter()
                .map(|(&character, &usage)| {
                    let stars = tally.stars.get(&character).copied().unwrap_or(0);
                    StarRate::new(character, usage, stars, tally.total_groups)
                })
                .collect();
            (!rates.is_empty()).then_some((partition, rates))
        })
        .collect()
}

/// Every catalog rank at or above `min_rank` with its recorded match group count.
pub fn rank_match_counts(
    catalog: &RankCatalog,
    counts: &[(RankId, u64)],
    min_rank: RankId,
) -> Vec<RankMatchCount> {
    let counts: BTreeMap<RankId, u64> = counts.iter().copied().collect();
    catalog
        .at_or_above(min_rank)
        .map(|rank| RankMatchCount {
            rank_id: rank.id,
            name: rank.name.clone(),
            name_ja: rank.name_ja.clone(),
            match_count: counts.get(&rank.id).copied().unwrap_or(0),
        })
        .collect()
}
