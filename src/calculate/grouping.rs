//! Group extraction: turns resolved matches into per-partition tallies.

use std::collections::BTreeMap;

use super::dataset::StatsDataset;
use crate::models::{
    CharacterId, GroupKey, GroupTally, Pair, PartitionBy, PartitionKey, Team, Trio, TrioMatchup,
};

/// Tallies of one kind, keyed by partition then group.
pub type Tallies<K> = BTreeMap<PartitionKey, BTreeMap<K, GroupTally>>;

fn tally<'a, K: GroupKey>(
    tallies: &'a mut Tallies<K>,
    partition: PartitionKey,
    key: K,
) -> &'a mut GroupTally {
    tallies.entry(partition).or_default().entry(key).or_default()
}

/// Every winner +1 win, every loser +1 loss.
pub fn single_tallies(dataset: &StatsDataset, by: PartitionBy) -> Tallies<CharacterId> {
    let mut tallies = Tallies::new();
    for outcome in dataset.matches() {
        let partition = outcome.partition(by);
        for &winner in outcome.winners.members() {
            tally(&mut tallies, partition, winner).record_win();
        }
        for &loser in outcome.losers.members() {
            tally(&mut tallies, partition, loser).record_loss();
        }
    }
    tallies
}

/// Directed winner x loser pairs: `(w, l)` gains a win and `(l, w)` a loss.
pub fn matchup_tallies(dataset: &StatsDataset, by: PartitionBy) -> Tallies<Pair> {
    let mut tallies = Tallies::new();
    for outcome in dataset.matches() {
        let partition = outcome.partition(by);
        for &winner in outcome.winners.members() {
            for &loser in outcome.losers.members() {
                tally(&mut tallies, partition, Pair::directed(winner, loser)).record_win();
                tally(&mut tallies, partition, Pair::directed(loser, winner)).record_loss();
            }
        }
    }
    tallies
}

fn teammate_pairs(team: &Team) -> impl Iterator<Item = Pair> + '_ {
    let members = team.members();
    members.iter().enumerate().flat_map(move |(i, &a)| {
        members[i + 1..]
            .iter()
            .map(move |&b| Pair::unordered(a, b))
    })
}

/// Unordered teammate pairs, one record per pair.
///
/// Keys are canonical (`first < second`); consumers that need both orders
/// read the same record for `(a, b)` and `(b, a)`.
pub fn synergy_tallies(dataset: &StatsDataset, by: PartitionBy) -> Tallies<Pair> {
    let mut tallies = Tallies::new();
    for outcome in dataset.matches() {
        let partition = outcome.partition(by);
        for pair in teammate_pairs(&outcome.winners) {
            tally(&mut tallies, partition, pair).record_win();
        }
        for pair in teammate_pairs(&outcome.losers) {
            tally(&mut tallies, partition, pair).record_loss();
        }
    }
    tallies
}

/// Whole three-character teams. Sides of any other size are skipped.
pub fn trio_tallies(dataset: &StatsDataset, by: PartitionBy) -> Tallies<Trio> {
    let mut tallies = Tallies::new();
    for outcome in dataset.matches() {
        let partition = outcome.partition(by);
        if let Some(trio) = Trio::from_team(&outcome.winners) {
            tally(&mut tallies, partition, trio).record_win();
        }
        if let Some(trio) = Trio::from_team(&outcome.losers) {
            tally(&mut tallies, partition, trio).record_loss();
        }
    }
    tallies
}

/// Wins of each exact 3v3 pairing, oriented winner first.
pub fn three_vs_three_wins(
    dataset: &StatsDataset,
    by: PartitionBy,
) -> BTreeMap<PartitionKey, BTreeMap<TrioMatchup, f64>> {
    let mut wins: BTreeMap<PartitionKey, BTreeMap<TrioMatchup, f64>> = BTreeMap::new();
    for outcome in dataset.matches() {
        let (Some(winners), Some(losers)) = (
            Trio::from_team(&outcome.winners),
            Trio::from_team(&outcome.losers),
        ) else {
            continue;
        };
        *wins
            .entry(outcome.partition(by))
            .or_default()
            .entry(TrioMatchup::new(winners, losers))
            .or_default() += 1.0;
    }
    wins
}

/// Merge each orientation with its mirror: games are its own wins plus the
/// mirror's wins. Orientations with fewer than `min_games` combined games are
/// dropped. Only orientations that won at least once are reported.
pub fn merge_mirrors(
    wins: &BTreeMap<TrioMatchup, f64>,
    min_games: f64,
) -> BTreeMap<TrioMatchup, GroupTally> {
    wins.iter()
        .filter_map(|(&matchup, &won)| {
            let reverse = wins.get(&matchup.mirror()).copied().unwrap_or(0.0);
            let games = won + reverse;
            (games >= min_games).then(|| (matchup, GroupTally::new(won, games)))
        })
        .collect()
}

/// Mirror-merged 3v3 tallies per partition. Every partition with a 3v3 match
/// is present, even when no pairing reaches `min_games`.
pub fn three_vs_three_tallies(
    dataset: &StatsDataset,
    by: PartitionBy,
    min_games: f64,
) -> Tallies<TrioMatchup> {
    three_vs_three_wins(dataset, by)
        .into_iter()
        .map(|(partition, wins)| (partition, merge_mirrors(&wins, min_games)))
        .collect()
}

/// Star and usage counts for one partition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StarTally {
    /// Match groups in the partition.
    pub total_groups: u64,
    /// Match groups each character took part in.
    pub usage: BTreeMap<CharacterId, u64>,
    /// Star awards per character.
    pub stars: BTreeMap<CharacterId, u64>,
}

pub fn star_tallies(dataset: &StatsDataset, by: PartitionBy) -> BTreeMap<PartitionKey, StarTally> {
    let mut tallies: BTreeMap<PartitionKey, StarTally> = BTreeMap::new();
    let participants = dataset.participants_by_group();

    for group in dataset.groups() {
        let entry = tallies.entry(group.partition(by)).or_default();
        entry.total_groups += 1;
        if let Some(characters) = participants.get(&group.id) {
            for &character in characters {
                *entry.usage.entry(character).or_default() += 1;
            }
        }
    }

    for award in dataset.star_awards() {
        let Some(group) = dataset.group(&award.group_id) else {
            continue;
        };
        *tallies
            .entry(group.partition(by))
            .or_default()
            .stars
            .entry(award.character)
            .or_default() += 1;
    }

    tallies
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculate::testing::{c, dataset, push_group, trio};
    use crate::models::MapId;
    use pretty_assertions::assert_eq;

    fn only<K: GroupKey>(tallies: &Tallies<K>) -> &BTreeMap<K, GroupTally> {
        assert_eq!(tallies.len(), 1);
        tallies.values().next().unwrap()
    }

    #[test]
    fn test_single_conservation_of_wins() {
        let ds = dataset(&[
            (1, &[1, 2, 3], &[4, 5, 6]),
            (1, &[1, 4, 7], &[2, 8, 9]),
            (1, &[5], &[6]),
        ]);
        let tallies = single_tallies(&ds, PartitionBy::Map);
        let groups = only(&tallies);

        let total_wins: f64 = groups.values().map(|t| t.wins).sum();
        let winning_slots: usize = ds.matches().map(|m| m.winners.len()).sum();
        assert_eq!(total_wins, winning_slots as f64);
        assert_eq!(groups[&c(1)], GroupTally::new(2.0, 2.0));
        assert_eq!(groups[&c(2)], GroupTally::new(1.0, 2.0));
    }

    #[test]
    fn test_partitions_are_independent() {
        let ds = dataset(&[(1, &[1], &[2]), (2, &[2], &[1])]);
        let tallies = single_tallies(&ds, PartitionBy::Map);
        assert_eq!(tallies.len(), 2);
        let map_one = tallies.keys().find(|k| k.map_id == MapId(1)).unwrap();
        assert_eq!(tallies[map_one][&c(1)], GroupTally::new(1.0, 1.0));
    }

    #[test]
    fn test_matchup_is_directional() {
        let ds = dataset(&[(1, &[1], &[2]), (1, &[1], &[2]), (1, &[2], &[1])]);
        let tallies = matchup_tallies(&ds, PartitionBy::Map);
        let groups = only(&tallies);

        let ab = groups[&Pair::directed(c(1), c(2))];
        let ba = groups[&Pair::directed(c(2), c(1))];
        assert_eq!(ab, GroupTally::new(2.0, 3.0));
        assert_eq!(ba, GroupTally::new(1.0, 3.0));
        assert_ne!(ab.wins, ba.wins);
    }

    #[test]
    fn test_matchup_covers_every_cross_pair() {
        let ds = dataset(&[(1, &[1, 2], &[3, 4])]);
        let tallies = matchup_tallies(&ds, PartitionBy::Map);
        assert_eq!(only(&tallies).len(), 8);
    }

    #[test]
    fn test_synergy_two_wins_one_loss() {
        let ds = dataset(&[
            (1, &[1, 2], &[3, 4]),
            (1, &[2, 1], &[5, 6]),
            (1, &[7, 8], &[1, 2]),
        ]);
        let tallies = synergy_tallies(&ds, PartitionBy::Map);
        let groups = only(&tallies);

        let pair = groups[&Pair::unordered(c(2), c(1))];
        assert_eq!(pair, GroupTally::new(2.0, 3.0));
        assert!(!groups.contains_key(&Pair::directed(c(2), c(1))));
    }

    #[test]
    fn test_synergy_trio_side_yields_three_pairs() {
        let ds = dataset(&[(1, &[1, 2, 3], &[4])]);
        let tallies = synergy_tallies(&ds, PartitionBy::Map);
        let keys: Vec<_> = only(&tallies).keys().copied().collect();
        assert_eq!(
            keys,
            vec![
                Pair::unordered(c(1), c(2)),
                Pair::unordered(c(1), c(3)),
                Pair::unordered(c(2), c(3)),
            ]
        );
    }

    #[test]
    fn test_trio_canonicalisation_and_size_filter() {
        let ds = dataset(&[
            (1, &[3, 1, 2], &[4, 5]),
            (1, &[7, 8, 9], &[1, 2, 3]),
        ]);
        let tallies = trio_tallies(&ds, PartitionBy::Map);
        let groups = only(&tallies);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[&trio(1, 2, 3)], GroupTally::new(1.0, 2.0));
        assert_eq!(groups[&trio(7, 8, 9)], GroupTally::new(1.0, 1.0));
    }

    #[test]
    fn test_three_vs_three_mirror_merge() {
        let forward_row: (u32, &[u32], &[u32]) = (1, &[1, 2, 3], &[4, 5, 6]);
        let mut rows = vec![forward_row; 5];
        rows.push((1, &[4, 5, 6], &[1, 2, 3]));
        let ds = dataset(&rows);

        let tallies = three_vs_three_tallies(&ds, PartitionBy::Map, 4.0);
        let groups = only(&tallies);
        let forward = TrioMatchup::new(trio(1, 2, 3), trio(4, 5, 6));

        assert_eq!(groups[&forward], GroupTally::new(5.0, 6.0));
        assert_eq!(groups[&forward.mirror()], GroupTally::new(1.0, 6.0));
    }

    #[test]
    fn test_three_vs_three_min_games_drops_before_fit() {
        let ds = dataset(&[
            (1, &[1, 2, 3], &[4, 5, 6]),
            (1, &[1, 2, 3], &[4, 5, 6]),
            (1, &[4, 5, 6], &[1, 2, 3]),
            (2, &[1, 2, 3], &[7, 8, 9]),
        ]);
        let sparse = three_vs_three_tallies(&ds, PartitionBy::Map, 4.0);
        assert_eq!(sparse.len(), 2);
        assert!(sparse.values().all(|pairings| pairings.is_empty()));

        let all = three_vs_three_tallies(&ds, PartitionBy::Map, 0.0);
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_star_tallies_usage_per_group() {
        let mut builder = StatsDataset::builder();
        push_group(&mut builder, "g1", 1, &[(&[1, 2], &[3, 4]), (&[1, 2], &[3, 4])]);
        push_group(&mut builder, "g2", 1, &[(&[1, 5], &[6, 7])]);
        push_group(&mut builder, "g3", 1, &[]);
        builder.add_star_award("g1".into(), c(1));
        builder.add_star_award("g2".into(), c(1));
        let ds = builder.finish();

        let tallies = star_tallies(&ds, PartitionBy::Map);
        let star = tallies.values().next().unwrap();

        assert_eq!(star.total_groups, 3);
        assert_eq!(star.usage[&c(1)], 2);
        assert_eq!(star.usage[&c(3)], 1);
        assert_eq!(star.stars[&c(1)], 2);
    }
}
