//! Vote maps and plurality aggregation.
//!
//! A [`VoteMap`] is a set of non-negative weights over candidates that sums
//! to one. Directions, rulers and allocations are all expressed this way.
//! [`winner_from_dist`] collapses many voters' maps into one winner.
//!
//! Ties are broken by the lowest candidate key. Keys are totally ordered
//! (identifiers compare by their UUID), so the outcome is deterministic
//! regardless of the order votes were cast in.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{AgentError, ensure_finite};
use crate::math::count_f64;

/// Tolerance used when checking that a map sums to one.
pub const NORMALISATION_TOLERANCE: f64 = 1e-9;

/// Normalised, non-negative weights over candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "K: Ord + Serialize",
    deserialize = "K: Ord + Deserialize<'de>"
))]
pub struct VoteMap<K>(BTreeMap<K, f64>);

impl<K: Ord + Copy> VoteMap<K> {
    /// A vote giving everything to `winner` and nothing to the other candidates.
    pub fn one_hot(winner: K, candidates: impl IntoIterator<Item = K>) -> Self {
        let mut weights: BTreeMap<K, f64> = candidates.into_iter().map(|k| (k, 0.0)).collect();
        weights.insert(winner, 1.0);
        Self(weights)
    }

    /// Equal weight for every candidate, or `None` when there are none.
    pub fn uniform(candidates: impl IntoIterator<Item = K>) -> Option<Self> {
        let keys: Vec<K> = candidates.into_iter().collect();
        if keys.is_empty() {
            return None;
        }
        let share = 1.0 / count_f64(keys.len());
        Some(Self(keys.into_iter().map(|k| (k, share)).collect()))
    }

    /// Divide every score by their sum.
    ///
    /// Returns `Ok(None)` when the scores sum to zero (including the empty
    /// case) so the caller can apply its own fallback. A negative or
    /// non-finite score is rejected.
    pub fn normalize(scores: BTreeMap<K, f64>) -> Result<Option<Self>, AgentError> {
        let mut total = 0.0;
        for score in scores.values() {
            let score = ensure_finite(*score, "vote score")?;
            if score < 0.0 {
                return Err(AgentError::NonFinite {
                    context: format!("negative vote score {score}"),
                });
            }
            total += score;
        }
        let total = ensure_finite(total, "vote total")?;
        if total <= 0.0 {
            return Ok(None);
        }
        Ok(Some(Self(
            scores.into_iter().map(|(k, s)| (k, s / total)).collect(),
        )))
    }

    /// Weight of a candidate; zero when absent.
    pub fn get(&self, candidate: K) -> f64 {
        self.0.get(&candidate).copied().unwrap_or(0.0)
    }

    /// Candidates and weights in key order.
    pub fn iter(&self) -> impl Iterator<Item = (K, f64)> + '_ {
        self.0.iter().map(|(k, w)| (*k, *w))
    }

    /// Candidates in key order.
    pub fn candidates(&self) -> impl Iterator<Item = K> + '_ {
        self.0.keys().copied()
    }

    /// Number of candidates.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the map names no candidates.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sum of all weights.
    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    /// Returns `true` if every weight is in `[0, 1]` and they sum to one.
    pub fn is_normalised(&self) -> bool {
        self.0.values().all(|w| w.is_finite() && (0.0..=1.0).contains(w))
            && (self.total() - 1.0).abs() <= NORMALISATION_TOLERANCE
    }

    /// The candidate with the highest weight, lowest key on ties.
    pub fn winner(&self) -> Option<K> {
        best_by_weight(self.iter())
    }

    /// Consume the map into its weights.
    pub fn into_inner(self) -> BTreeMap<K, f64> {
        self.0
    }
}

/// Pick the highest weight, keeping the first (lowest-key) entry on ties.
fn best_by_weight<K>(entries: impl Iterator<Item = (K, f64)>) -> Option<K> {
    let mut best: Option<(K, f64)> = None;
    for (key, weight) in entries {
        let better = best.as_ref().is_none_or(|(_, top)| weight > *top);
        if better {
            best = Some((key, weight));
        }
    }
    best.map(|(k, _)| k)
}

/// Aggregate voters' maps into a single winner.
///
/// Each voter's map is scaled by its weight (1.0 when the voter has no
/// entry in `weights`) and summed per candidate; the candidate with the
/// largest total wins. Non-finite and negative voter weights are ignored.
/// Returns `None` when no candidate received a vote.
pub fn winner_from_dist<V: Ord, K: Ord + Copy>(
    votes: &BTreeMap<V, VoteMap<K>>,
    weights: &BTreeMap<V, f64>,
) -> Option<K> {
    let mut totals: BTreeMap<K, f64> = BTreeMap::new();
    for (voter, vote) in votes {
        let weight = weights.get(voter).copied().unwrap_or(1.0);
        if !weight.is_finite() || weight < 0.0 {
            warn!(weight, "ignoring voter with unusable weight");
            continue;
        }
        for (candidate, share) in vote.iter() {
            *totals.entry(candidate).or_insert(0.0) += weight * share;
        }
    }
    best_by_weight(totals.into_iter())
}
