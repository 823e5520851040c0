//! JSON document shapes consumed by the dashboard.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::calculate::{PairKind, PartitionResults};
use crate::models::{CharacterId, Pair, ShrinkageResult, StarRate, Trio, TrioMatchup};

/// One character in `win_rates.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WinRateRecord {
    pub games: u64,
    pub wins: u64,
    pub win_rate: f64,
    pub win_rate_lcb: f64,
}

/// `partition -> character -> record`
pub type WinRateDocument = BTreeMap<String, BTreeMap<CharacterId, WinRateRecord>>;

pub fn win_rate_document(results: &PartitionResults<ShrinkageResult<CharacterId>>) -> WinRateDocument {
    results
        .iter()
        .map(|(partition, rows)| {
            let records: BTreeMap<CharacterId, WinRateRecord> = rows
                .iter()
                .map(|r| {
                    (
                        r.key,
                        WinRateRecord {
                            games: r.rounded_games(),
                            wins: r.rounded_wins(),
                            win_rate: r.win_rate,
                            win_rate_lcb: r.win_rate_lcb,
                        },
                    )
                })
                .collect();
            (partition.file_stem(), records)
        })
        .collect()
}

/// One character in `star_rates.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StarRateRecord {
    pub usage_count: u64,
    pub star_count: u64,
    pub star_rate: f64,
    pub usage_rate: f64,
}

impl From<&StarRate> for StarRateRecord {
    fn from(rate: &StarRate) -> Self {
        Self {
            usage_count: rate.usage_count,
            star_count: rate.star_count,
            star_rate: rate.star_rate,
            usage_rate: rate.usage_rate,
        }
    }
}

/// `partition -> character -> record`
pub type StarRateDocument = BTreeMap<String, BTreeMap<CharacterId, StarRateRecord>>;

pub fn star_rate_document(results: &PartitionResults<StarRate>) -> StarRateDocument {
    results
        .iter()
        .map(|(partition, rows)| {
            let records: BTreeMap<CharacterId, StarRateRecord> = rows
                .iter()
                .map(|r| (r.character, StarRateRecord::from(r)))
                .collect();
            (partition.file_stem(), records)
        })
        .collect()
}

/// One pair in a pair stats file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairRecord {
    pub games: u64,
    pub win_rate: f64,
    pub win_rate_lcb: f64,
}

/// `first -> second -> record` for one partition.
pub type PairDocument = BTreeMap<CharacterId, BTreeMap<CharacterId, PairRecord>>;

/// Synergy records are written under both orders.
pub fn pair_document(rows: &[ShrinkageResult<Pair>], kind: PairKind) -> PairDocument {
    let mut doc = PairDocument::new();
    for r in rows {
        let record = PairRecord {
            games: r.rounded_games(),
            win_rate: r.win_rate,
            win_rate_lcb: r.win_rate_lcb,
        };
        let Pair { first, second } = r.key;
        if kind == PairKind::Synergy && first != second {
            doc.entry(second)
                .or_default()
                .insert(first, record.clone());
        }
        doc.entry(first).or_default().insert(second, record);
    }
    doc
}

/// One team in a trio stats file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrioRecord {
    pub characters: [CharacterId; 3],
    pub wins: u64,
    pub losses: u64,
    pub games: u64,
    pub win_rate: f64,
    pub win_rate_lcb: f64,
}

/// Ranked list for one partition.
pub fn trio_document(rows: &[ShrinkageResult<Trio>]) -> Vec<TrioRecord> {
    rows.iter()
        .map(|r| TrioRecord {
            characters: *r.key.members(),
            wins: r.rounded_wins(),
            losses: r.rounded_losses(),
            games: r.rounded_games(),
            win_rate: r.win_rate,
            win_rate_lcb: r.win_rate_lcb,
        })
        .collect()
}

/// One oriented pairing in a 3v3 stats file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreeVsThreeRecord {
    pub win_characters: [CharacterId; 3],
    pub lose_characters: [CharacterId; 3],
    pub games: u64,
    pub win_rate: f64,
    pub win_rate_lcb: f64,
}

/// Ranked list for one partition.
pub fn three_vs_three_document(rows: &[ShrinkageResult<TrioMatchup>]) -> Vec<ThreeVsThreeRecord> {
    rows.iter()
        .map(|r| ThreeVsThreeRecord {
            win_characters: *r.key.winners.members(),
            lose_characters: *r.key.losers.members(),
            games: r.rounded_games(),
            win_rate: r.win_rate,
            win_rate_lcb: r.win_rate_lcb,
        })
        .collect()
}
