//! Empirical-Bayes Beta-Binomial shrinkage.
//!
//! Within one partition the prior is fitted by moments: its mean is the pooled
//! win rate and its strength is the average number of games per group. Each
//! group's posterior is `Beta(alpha + wins, beta + losses)` and its ranking
//! statistic is the posterior quantile at `1 - confidence`.

use std::collections::BTreeMap;

use statrs::function::beta::{beta_reg, ln_beta};

use super::StatsError;
use crate::models::{GroupKey, GroupTally, ShrinkageResult};

/// Smallest value a posterior parameter is allowed to take.
pub const PARAMETER_FLOOR: f64 = 1e-9;

const QUANTILE_TOLERANCE: f64 = 1e-12;
const QUANTILE_MAX_ITERATIONS: usize = 200;

/// A Beta prior fitted to one partition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BetaPrior {
    pub alpha: f64,
    pub beta: f64,
}

impl BetaPrior {
    /// Method-of-moments fit. `None` when there are no groups or no games.
    pub fn fit<'a>(tallies: impl IntoIterator<Item = &'a GroupTally>) -> Option<Self> {
        let (mut wins, mut games, mut groups) = (0.0, 0.0, 0usize);
        for tally in tallies {
            wins += tally.wins;
            games += tally.games;
            groups += 1;
        }

        if groups == 0 || games <= 0.0 {
            return None;
        }

        let mean = wins / games;
        let strength = games / groups as f64;
        Some(Self {
            alpha: mean * strength,
            beta: (1.0 - mean) * strength,
        })
    }

    pub fn mean(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }

    pub fn strength(&self) -> f64 {
        self.alpha + self.beta
    }

    /// Posterior parameters for one group, floored to stay well defined.
    pub fn posterior(&self, tally: &GroupTally) -> (f64, f64) {
        (
            (self.alpha + tally.wins).max(PARAMETER_FLOOR),
            (self.beta + tally.losses()).max(PARAMETER_FLOOR),
        )
    }
}

/// The one estimator every confidence-bounded statistic goes through.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShrinkageEstimator {
    confidence: f64,
}

impl ShrinkageEstimator {
    pub fn new(confidence: f64) -> Result<Self, StatsError> {
        if !(confidence > 0.0 && confidence < 1.0) {
            return Err(StatsError::InvalidConfidence(confidence));
        }
        Ok(Self { confidence })
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Lower confidence bound of one group under `prior`.
    pub fn lower_bound(&self, prior: &BetaPrior, tally: &GroupTally) -> f64 {
        let (alpha, beta) = prior.posterior(tally);
        beta_quantile(1.0 - self.confidence, alpha, beta)
    }

    /// Shrink every group of one partition.
    ///
    /// Returns an empty list when the partition has no games. Groups that
    /// played nothing still count toward the prior but are not reported.
    pub fn estimate<K: GroupKey>(&self, tallies: &BTreeMap<K, GroupTally>) -> Vec<ShrinkageResult<K>> {
        let Some(prior) = BetaPrior::fit(tallies.values()) else {
            return Vec::new();
        };

        tallies
            .iter()
            .filter(|(_, tally)| tally.games > 0.0)
            .map(|(&key, tally)| ShrinkageResult {
                key,
                wins: tally.wins,
                games: tally.games,
                win_rate: tally.wins / tally.games,
                win_rate_lcb: self.lower_bound(&prior, tally),
            })
            .collect()
    }
}

impl Default for ShrinkageEstimator {
    fn default() -> Self {
        Self { confidence: 0.95 }
    }
}

/// Inverse CDF of `Beta(a, b)` at `p`.
///
/// Newton steps on the regularized incomplete beta function, falling back to
/// bisection whenever a step leaves the current bracket.
pub fn beta_quantile(p: f64, a: f64, b: f64) -> f64 {
    if p <= 0.0 {
        return 0.0;
    }
    if p >= 1.0 {
        return 1.0;
    }

    let a = a.max(PARAMETER_FLOOR);
    let b = b.max(PARAMETER_FLOOR);
    let log_norm = ln_beta(a, b);

    let (mut lo, mut hi) = (0.0_f64, 1.0_f64);
    let mut x = a / (a + b);

    for _ in 0..QUANTILE_MAX_ITERATIONS {
        let err = beta_reg(a, b, x) - p;
        if err.abs() < QUANTILE_TOLERANCE {
            break;
        }
        if err < 0.0 {
            lo = x;
        } else {
            hi = x;
        }

        let log_pdf = (a - 1.0) * x.ln() + (b - 1.0) * (1.0 - x).ln() - log_norm;
        let step = err / log_pdf.exp();
        let mut next = x - step;
        if !next.is_finite() || next <= lo || next >= hi {
            next = 0.5 * (lo + hi);
        }

        if (next - x).abs() < QUANTILE_TOLERANCE || hi - lo < QUANTILE_TOLERANCE {
            x = next;
            break;
        }
        x = next;
    }

    x.clamp(0.0, 1.0)
}
