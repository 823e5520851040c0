//! Ordering and sample-size filtering of shrunk results.

use std::cmp::Ordering;

use crate::models::{GroupKey, ShrinkageResult};

/// Best first: higher bound, then more games, then the smaller key.
pub fn compare<K: GroupKey>(a: &ShrinkageResult<K>, b: &ShrinkageResult<K>) -> Ordering {
    b.win_rate_lcb
        .total_cmp(&a.win_rate_lcb)
        .then_with(|| b.games.total_cmp(&a.games))
        .then_with(|| a.key.cmp(&b.key))
}

pub fn rank<K: GroupKey>(results: &mut [ShrinkageResult<K>]) {
    results.sort_by(compare);
}

/// Drop groups that played fewer than `min_games`.
pub fn retain_min_games<K>(results: &mut Vec<ShrinkageResult<K>>, min_games: u64) {
    if min_games == 0 {
        return;
    }
    let min_games = min_games as f64;
    results.retain(|r| r.games >= min_games);
}
