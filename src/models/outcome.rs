//! Match outcomes and the partitions statistics are computed within.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{CharacterId, MapId, MatchGroupId, MatchId, ModeId, RankId};

/// One side of a battle: sorted, without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Team(Vec<CharacterId>);

impl Team {
    pub fn new(members: impl IntoIterator<Item = CharacterId>) -> Self {
        let mut members: Vec<CharacterId> = members.into_iter().collect();
        members.sort_unstable();
        members.dedup();
        Self(members)
    }

    pub fn members(&self) -> &[CharacterId] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, character: CharacterId) -> bool {
        self.0.binary_search(&character).is_ok()
    }

    /// True if any character plays on both teams.
    pub fn overlaps(&self, other: &Team) -> bool {
        self.0.iter().any(|c| other.contains(*c))
    }
}

/// A ranked set and the metadata shared by all of its battles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchGroup {
    pub id: MatchGroupId,
    pub map_id: MapId,
    pub rank_id: RankId,
    pub mode_id: Option<ModeId>,
}

impl MatchGroup {
    pub fn partition(&self, by: PartitionBy) -> PartitionKey {
        PartitionKey {
            map_id: self.map_id,
            mode_id: self.mode_id,
            rank_id: match by {
                PartitionBy::Map => None,
                PartitionBy::MapAndRank => Some(self.rank_id),
            },
        }
    }
}

/// One battle with a known result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchOutcome {
    pub match_id: MatchId,
    pub group_id: MatchGroupId,
    pub map_id: MapId,
    pub rank_id: RankId,
    pub mode_id: Option<ModeId>,
    pub winners: Team,
    pub losers: Team,
}

impl MatchOutcome {
    pub fn partition(&self, by: PartitionBy) -> PartitionKey {
        PartitionKey {
            map_id: self.map_id,
            mode_id: self.mode_id,
            rank_id: match by {
                PartitionBy::Map => None,
                PartitionBy::MapAndRank => Some(self.rank_id),
            },
        }
    }

    /// Every character that took part, winners first.
    pub fn participants(&self) -> impl Iterator<Item = CharacterId> + '_ {
        self.winners
            .members()
            .iter()
            .chain(self.losers.members())
            .copied()
    }
}

/// How matches are split into independent estimation scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PartitionBy {
    #[default]
    Map,
    MapAndRank,
}

impl fmt::Display for PartitionBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionBy::Map => write!(f, "map"),
            PartitionBy::MapAndRank => write!(f, "map-and-rank"),
        }
    }
}

impl FromStr for PartitionBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "map" => Ok(PartitionBy::Map),
            "map-and-rank" | "map_and_rank" | "map-rank" => Ok(PartitionBy::MapAndRank),
            other => Err(format!(
                "unknown partitioning '{}' (expected 'map' or 'map-and-rank')",
                other
            )),
        }
    }
}

/// The scope within which a shrinkage prior is fitted.
///
/// The mode is determined by the map, so it never splits a partition further;
/// it is carried along for consumers that group maps by mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionKey {
    pub map_id: MapId,
    pub mode_id: Option<ModeId>,
    pub rank_id: Option<RankId>,
}

impl PartitionKey {
    /// File stem used when the partition is exported: `<map>` or `<map>-r<rank>`.
    pub fn file_stem(&self) -> String {
        match self.rank_id {
            Some(rank) => format!("{}-r{}", self.map_id, rank),
            None => self.map_id.to_string(),
        }
    }
}

impl Ord for PartitionKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.map_id, self.rank_id, self.mode_id).cmp(&(other.map_id, other.rank_id, other.mode_id))
    }
}

impl PartialOrd for PartitionKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.file_stem())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[u32]) -> Vec<CharacterId> {
        raw.iter().copied().map(CharacterId).collect()
    }

    #[test]
    fn test_team_sorts_and_dedups() {
        let team = Team::new(ids(&[3, 1, 3, 2]));
        assert_eq!(team.members(), ids(&[1, 2, 3]).as_slice());
        assert_eq!(team.len(), 3);
        assert!(team.contains(CharacterId(2)));
        assert!(!team.contains(CharacterId(4)));
    }

    #[test]
    fn test_team_overlap() {
        let a = Team::new(ids(&[1, 2]));
        let b = Team::new(ids(&[2, 3]));
        let c = Team::new(ids(&[4]));
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert!(!Team::default().overlaps(&a));
    }

    #[test]
    fn test_partition_by_rank_component() {
        let group = MatchGroup {
            id: "20250801000001".into(),
            map_id: MapId(10),
            rank_id: RankId(5),
            mode_id: Some(ModeId(2)),
        };

        let by_map = group.partition(PartitionBy::Map);
        assert_eq!(by_map.rank_id, None);
        assert_eq!(by_map.file_stem(), "10");

        let by_rank = group.partition(PartitionBy::MapAndRank);
        assert_eq!(by_rank.rank_id, Some(RankId(5)));
        assert_eq!(by_rank.file_stem(), "10-r5");
    }

    #[test]
    fn test_partition_by_parse() {
        assert_eq!("map".parse::<PartitionBy>().unwrap(), PartitionBy::Map);
        assert_eq!(
            "Map-And-Rank".parse::<PartitionBy>().unwrap(),
            PartitionBy::MapAndRank
        );
        assert!("mode".parse::<PartitionBy>().is_err());
    }

    #[test]
    fn test_partition_by_serde() {
        let json = serde_json::to_string(&PartitionBy::MapAndRank).unwrap();
        assert_eq!(json, "\"map-and-rank\"");
    }

    #[test]
    fn test_participants_chain_both_sides() {
        let outcome = MatchOutcome {
            match_id: "b1".into(),
            group_id: "20250801000001".into(),
            map_id: MapId(1),
            rank_id: RankId(4),
            mode_id: None,
            winners: Team::new(ids(&[2, 1])),
            losers: Team::new(ids(&[3])),
        };
        let all: Vec<_> = outcome.participants().collect();
        assert_eq!(all, ids(&[1, 2, 3]));
    }
}
