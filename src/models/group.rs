//! Group keys: the character combinations whose win rates are estimated.

use std::fmt::Debug;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use super::{CharacterId, Team};

/// A key that identifies one group within a partition.
///
/// `Ord` is used as the last tie-breaker when ranking so the output order is
/// total even when two groups share the same bound and sample size.
pub trait GroupKey: Copy + Eq + Hash + Ord + Debug + Send + Sync {}

impl GroupKey for CharacterId {}

/// Two characters. Matchup pairs keep their order (first beat/lost to
/// second); synergy pairs are canonicalised ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Pair {
    pub first: CharacterId,
    pub second: CharacterId,
}

impl Pair {
    /// A pair whose order carries meaning.
    pub fn directed(first: CharacterId, second: CharacterId) -> Self {
        Self { first, second }
    }

    /// A pair where `(a, b)` and `(b, a)` are the same key.
    pub fn unordered(a: CharacterId, b: CharacterId) -> Self {
        if a <= b {
            Self { first: a, second: b }
        } else {
            Self { first: b, second: a }
        }
    }

    pub fn reversed(self) -> Self {
        Self {
            first: self.second,
            second: self.first,
        }
    }
}

impl GroupKey for Pair {}

/// Three distinct characters in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Trio([CharacterId; 3]);

impl Trio {
    /// Build a trio from any ordering; `None` if two ids coincide.
    pub fn new(a: CharacterId, b: CharacterId, c: CharacterId) -> Option<Self> {
        let mut members = [a, b, c];
        members.sort_unstable();
        if members[0] == members[1] || members[1] == members[2] {
            return None;
        }
        Some(Self(members))
    }

    /// The trio fielded by a team, if the team has exactly three members.
    pub fn from_team(team: &Team) -> Option<Self> {
        match team.members() {
            [a, b, c] => Self::new(*a, *b, *c),
            _ => None,
        }
    }

    pub fn members(&self) -> &[CharacterId; 3] {
        &self.0
    }
}

impl GroupKey for Trio {}

/// An exact 3v3 pairing seen from the winning side's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrioMatchup {
    pub winners: Trio,
    pub losers: Trio,
}

impl TrioMatchup {
    pub fn new(winners: Trio, losers: Trio) -> Self {
        Self { winners, losers }
    }

    /// The same pairing with the sides swapped.
    pub fn mirror(self) -> Self {
        Self {
            winners: self.losers,
            losers: self.winners,
        }
    }
}

impl GroupKey for TrioMatchup {}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(id: u32) -> CharacterId {
        CharacterId(id)
    }

    #[test]
    fn test_unordered_pair_canonicalises() {
        assert_eq!(Pair::unordered(c(2), c(1)), Pair::unordered(c(1), c(2)));
        assert_eq!(Pair::unordered(c(2), c(1)).first, c(1));
    }

    #[test]
    fn test_directed_pair_keeps_order() {
        let ab = Pair::directed(c(1), c(2));
        let ba = Pair::directed(c(2), c(1));
        assert_ne!(ab, ba);
        assert_eq!(ab.reversed(), ba);
    }

    #[test]
    fn test_trio_canonicalisation() {
        let shuffled = Trio::new(c(3), c(1), c(2)).unwrap();
        let sorted = Trio::new(c(1), c(2), c(3)).unwrap();
        assert_eq!(shuffled, sorted);
        assert_eq!(sorted.members(), &[c(1), c(2), c(3)]);
    }

    #[test]
    fn test_trio_rejects_duplicates() {
        assert!(Trio::new(c(1), c(1), c(2)).is_none());
        assert!(Trio::new(c(5), c(2), c(5)).is_none());
    }

    #[test]
    fn test_trio_from_team_requires_three() {
        assert!(Trio::from_team(&Team::new([c(1), c(2)])).is_none());
        assert!(Trio::from_team(&Team::new([c(1), c(2), c(3), c(4)])).is_none());
        assert_eq!(
            Trio::from_team(&Team::new([c(9), c(4), c(6)])),
            Trio::new(c(4), c(6), c(9))
        );
    }

    #[test]
    fn test_trio_matchup_mirror() {
        let a = Trio::new(c(1), c(2), c(3)).unwrap();
        let b = Trio::new(c(4), c(5), c(6)).unwrap();
        let m = TrioMatchup::new(a, b);
        assert_eq!(m.mirror(), TrioMatchup::new(b, a));
        assert_eq!(m.mirror().mirror(), m);
    }
}
