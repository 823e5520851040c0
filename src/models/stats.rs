//! Derived statistics models.

use serde::{Deserialize, Serialize};

use super::{CharacterId, RankId};

/// Accumulated results of one group within one partition.
///
/// Counts are floats so that weighted contributions can be accumulated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupTally {
    pub wins: f64,
    pub games: f64,
}

impl GroupTally {
    pub fn new(wins: f64, games: f64) -> Self {
        Self { wins, games }
    }

    pub fn record_win(&mut self) {
        self.wins += 1.0;
        self.games += 1.0;
    }

    pub fn record_loss(&mut self) {
        self.games += 1.0;
    }

    pub fn losses(&self) -> f64 {
        self.games - self.wins
    }

    /// Raw win rate, or `None` when nothing was played.
    pub fn win_rate(&self) -> Option<f64> {
        (self.games > 0.0).then(|| self.wins / self.games)
    }
}

/// Shrunk estimate for one group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShrinkageResult<K> {
    pub key: K,
    pub wins: f64,
    pub games: f64,
    /// Raw `wins / games`
    pub win_rate: f64,
    /// Posterior lower confidence bound
    pub win_rate_lcb: f64,
}

impl<K> ShrinkageResult<K> {
    /// Sample size rounded to the nearest whole game.
    pub fn rounded_games(&self) -> u64 {
        self.games.round().max(0.0) as u64
    }

    pub fn rounded_wins(&self) -> u64 {
        self.wins.round().max(0.0) as u64
    }

    pub fn rounded_losses(&self) -> u64 {
        (self.games - self.wins).round().max(0.0) as u64
    }
}

/// Star player and usage figures for one character within one partition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StarRate {
    pub character: CharacterId,
    /// Match groups the character took part in
    pub usage_count: u64,
    /// Star player awards received
    pub star_count: u64,
    pub star_rate: f64,
    pub usage_rate: f64,
}

impl StarRate {
    pub fn new(character: CharacterId, usage_count: u64, star_count: u64, total_groups: u64) -> Self {
        let star_rate = if usage_count > 0 {
            star_count as f64 / usage_count as f64
        } else {
            0.0
        };
        let usage_rate = if total_groups > 0 {
            usage_count as f64 / total_groups as f64
        } else {
            0.0
        };
        Self {
            character,
            usage_count,
            star_count,
            star_rate,
            usage_rate,
        }
    }
}

/// Number of recorded match groups at one rank tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankMatchCount {
    pub rank_id: RankId,
    pub name: String,
    pub name_ja: String,
    pub match_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tally_records() {
        let mut tally = GroupTally::default();
        tally.record_win();
        tally.record_win();
        tally.record_loss();

        assert_eq!(tally.wins, 2.0);
        assert_eq!(tally.games, 3.0);
        assert_eq!(tally.losses(), 1.0);
        assert!((tally.win_rate().unwrap() - 0.6667).abs() < 0.001);
    }

    #[test]
    fn test_tally_empty_has_no_rate() {
        assert_eq!(GroupTally::default().win_rate(), None);
    }

    #[test]
    fn test_result_rounding() {
        let result = ShrinkageResult {
            key: CharacterId(1),
            wins: 2.4,
            games: 5.6,
            win_rate: 2.4 / 5.6,
            win_rate_lcb: 0.2,
        };
        assert_eq!(result.rounded_games(), 6);
        assert_eq!(result.rounded_wins(), 2);
        assert_eq!(result.rounded_losses(), 3);
    }

    #[test]
    fn test_star_rate_ratios() {
        let rate = StarRate::new(CharacterId(7), 10, 3, 40);
        assert!((rate.star_rate - 0.3).abs() < 1e-12);
        assert!((rate.usage_rate - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_star_rate_zero_denominators() {
        let rate = StarRate::new(CharacterId(7), 0, 0, 0);
        assert_eq!(rate.star_rate, 0.0);
        assert_eq!(rate.usage_rate, 0.0);
    }
}
