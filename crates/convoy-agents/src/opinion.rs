//! Per-agent opinion store.
//!
//! Each agent keeps its own private view of every peer it has encountered:
//! trust (did they steer where the group decided), effort (did they pedal as
//! hard as expected), fairness (did they take more than their share) and
//! relative success (smoothed objective comparison). The composite
//! `opinion` is the weighted mean of trust, effort and fairness.
//!
//! Records are created lazily at a neutral 0.5 on first contact and are
//! never deleted. Every field is clamped to `[0, 1]` after every update.
//! Updates that receive or would produce a non-finite value leave the record
//! untouched and return [`AgentError::NonFinite`].

use std::collections::BTreeMap;

use convoy_types::{AgentId, AgentSnapshot, Colour};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::OpinionConfig;
use crate::error::{AgentError, ensure_finite};
use crate::math::{clamp01, count_f64, relative_to_half};
use crate::view::AgentView;

/// Neutral value for every field of a fresh record.
pub const NEUTRAL: f64 = 0.5;

// ---------------------------------------------------------------------------
// Opinion
// ---------------------------------------------------------------------------

/// One agent's view of one peer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Opinion {
    /// How hard the peer pedals relative to expectations.
    pub effort: f64,
    /// How reliably the peer steers towards the decided target.
    pub trust: f64,
    /// How modestly the peer takes from shared loot.
    pub fairness: f64,
    /// Smoothed objective comparison with the peer.
    pub relative_success: f64,
    /// Composite of trust, effort and fairness.
    pub opinion: f64,
}

impl Opinion {
    /// A record with every field at 0.5.
    pub const fn neutral() -> Self {
        Self {
            effort: NEUTRAL,
            trust: NEUTRAL,
            fairness: NEUTRAL,
            relative_success: NEUTRAL,
            opinion: NEUTRAL,
        }
    }

    /// Returns `true` if every field is finite and in `[0, 1]`.
    pub fn is_in_range(&self) -> bool {
        [
            self.effort,
            self.trust,
            self.fairness,
            self.relative_success,
            self.opinion,
        ]
        .iter()
        .all(|v| v.is_finite() && (0.0..=1.0).contains(v))
    }
}

impl Default for Opinion {
    fn default() -> Self {
        Self::neutral()
    }
}

// ---------------------------------------------------------------------------
// Free scoring functions
// ---------------------------------------------------------------------------

/// Favour-or-penalise score from a peer's success and our relationship.
///
/// Returns 0.5 when `success` and `relationship` agree and moves towards 0
/// or 1 as they diverge.
pub fn selfishness_score(success: f64, relationship: f64) -> f64 {
    clamp01(0.5 + (success - relationship) / 2.0)
}

/// A peer's points relative to ours, mapped onto `[0, 1]`.
///
/// Returns 0.5 when `max_points` is zero.
pub fn relative_points(peer_points: u32, own_points: u32, max_points: u32) -> f64 {
    relative_to_half(
        f64::from(peer_points) - f64::from(own_points),
        f64::from(max_points),
    )
}

/// A peer's energy relative to ours, mapped onto `[0, 1]`.
pub fn relative_energy(peer_energy: f64, own_energy: f64) -> f64 {
    relative_to_half(peer_energy - own_energy, 1.0)
}

/// Objective comparison of agent `a` against agent `b`, in `[0, 1]`.
///
/// Sums a same-colour bonus, the energy difference and the points
/// difference normalised by `max_points` (skipped when zero), then divides
/// the magnitude by the largest possible sum, `2 + colour_bonus`.
pub fn objective_relative_success(
    a: &impl AgentView,
    b: &impl AgentView,
    max_points: u32,
    colour_bonus: f64,
) -> f64 {
    let mut score = if a.colour() == b.colour() { colour_bonus } else { 0.0 };
    score += a.energy() - b.energy();
    if max_points > 0 {
        score += (f64::from(a.points()) - f64::from(b.points())) / f64::from(max_points);
    }
    clamp01((score / (2.0 + colour_bonus)).abs())
}

/// Compatibility of a nominator, as the normalised length of the point
/// `(relative_points, relative_energy, opinion)` in the unit cube.
pub fn cube_score(relative_points: f64, relative_energy: f64, opinion: f64) -> f64 {
    let norm = relative_points.hypot(relative_energy).hypot(opinion);
    clamp01(norm / 3.0_f64.sqrt())
}

/// Expected share of `remaining_force` each member should contribute.
///
/// A member is expected to pedal in proportion to
/// `1 - (colour_mismatch + energy_deficit) / 2`, where the colour mismatch is
/// 0.5 when the member's colour differs from the target's. The weights are
/// normalised over the group, then scaled by the force pedalled by everyone
/// but the observer.
pub fn expected_contributions(
    members: &[&AgentSnapshot],
    target_colour: Colour,
    remaining_force: f64,
) -> BTreeMap<AgentId, f64> {
    let weights: BTreeMap<AgentId, f64> = members
        .iter()
        .map(|m| {
            let mismatch = if m.colour == target_colour { 0.0 } else { 0.5 };
            let p = 1.0 - (mismatch + m.energy_need()) / 2.0;
            (m.id, p.max(0.0))
        })
        .collect();
    let total: f64 = weights.values().sum();
    if total <= 0.0 || !total.is_finite() {
        return weights.into_keys().map(|id| (id, 0.0)).collect();
    }
    weights
        .into_iter()
        .map(|(id, p)| (id, p / total * remaining_force))
        .collect()
}

// ---------------------------------------------------------------------------
// OpinionStore
// ---------------------------------------------------------------------------

/// An agent's private opinions of its peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpinionStore {
    opinions: BTreeMap<AgentId, Opinion>,
    /// Multipliers from messages received this round, folded into the next
    /// recompute of each peer's composite.
    #[serde(default)]
    signals: BTreeMap<AgentId, f64>,
    config: OpinionConfig,
}

impl OpinionStore {
    /// Create an empty store using the given constants.
    pub const fn new(config: OpinionConfig) -> Self {
        Self {
            opinions: BTreeMap::new(),
            signals: BTreeMap::new(),
            config,
        }
    }

    /// The constants this store updates with.
    pub const fn config(&self) -> &OpinionConfig {
        &self.config
    }

    /// Insert a neutral record for `peer` if absent, and return it.
    pub fn ensure(&mut self, peer: AgentId) -> &mut Opinion {
        self.opinions.entry(peer).or_insert_with(|| {
            debug!(peer = %peer, "initialising neutral opinion");
            Opinion::neutral()
        })
    }

    /// The record for `peer`, if one exists.
    pub fn get(&self, peer: AgentId) -> Option<&Opinion> {
        self.opinions.get(&peer)
    }

    /// Composite opinion of `peer`; neutral when unknown.
    pub fn opinion_of(&self, peer: AgentId) -> f64 {
        self.opinions.get(&peer).map_or(NEUTRAL, |o| o.opinion)
    }

    /// Trust in `peer`; neutral when unknown.
    pub fn trust_of(&self, peer: AgentId) -> f64 {
        self.opinions.get(&peer).map_or(NEUTRAL, |o| o.trust)
    }

    /// Returns `true` if trust in `peer` exceeds the trust threshold.
    pub fn is_trusted(&self, peer: AgentId) -> bool {
        self.trust_of(peer) > self.config.trust_threshold
    }

    /// Raise trust if the peer steered as decided, lower it otherwise.
    pub fn update_trust(&mut self, peer: AgentId, aligned: bool) -> f64 {
        let gain = self.config.trust_gain;
        let loss = self.config.trust_loss;
        let record = self.ensure(peer);
        let delta = if aligned { gain } else { -loss };
        record.trust = clamp01(record.trust + delta);
        record.trust
    }

    /// Move effort by the scaled gap between observed and expected pedal force.
    pub fn update_effort(
        &mut self,
        peer: AgentId,
        observed: f64,
        expected: f64,
    ) -> Result<f64, AgentError> {
        let delta = ensure_finite(
            (ensure_finite(observed, "observed effort")? - ensure_finite(expected, "expected effort")?)
                * self.config.effort_scaling,
            "effort delta",
        )?;
        let record = self.ensure(peer);
        record.effort = clamp01(record.effort + delta);
        Ok(record.effort)
    }

    /// Penalise a peer that received more than its fair share; credit half
    /// of any shortfall.
    pub fn update_fairness(
        &mut self,
        peer: AgentId,
        gain: f64,
        fair_share: f64,
    ) -> Result<f64, AgentError> {
        let excess = ensure_finite(gain, "energy gain")? - ensure_finite(fair_share, "fair share")?;
        let delta = if excess > 0.0 {
            -excess * self.config.fairness_scaling
        } else {
            -excess * self.config.fairness_difference * self.config.fairness_scaling
        };
        let delta = ensure_finite(delta, "fairness delta")?;
        let record = self.ensure(peer);
        record.fairness = clamp01(record.fairness + delta);
        Ok(record.fairness)
    }

    /// Smooth relative success one step towards `objective`.
    pub fn update_relative_success(
        &mut self,
        peer: AgentId,
        objective: f64,
    ) -> Result<f64, AgentError> {
        let objective = ensure_finite(objective, "objective relative success")?;
        let smoothing = self.config.relative_success_scaling;
        let record = self.ensure(peer);
        let next = ensure_finite(
            (objective - record.relative_success).mul_add(smoothing, record.relative_success),
            "relative success",
        )?;
        record.relative_success = clamp01(next);
        Ok(record.relative_success)
    }

    /// Recompute the composite opinion of `peer`, scaled by `multiplier`.
    pub fn recompute_composite(
        &mut self,
        peer: AgentId,
        multiplier: f64,
    ) -> Result<f64, AgentError> {
        let multiplier = ensure_finite(multiplier, "opinion multiplier")?;
        let c = &self.config;
        let (wt, we, wf) = (c.trust_weight, c.effort_weight, c.fairness_weight);
        let total_weight = wt + we + wf;
        let record = self.ensure(peer);
        let mean = if total_weight > 0.0 {
            (wt * record.trust + we * record.effort + wf * record.fairness) / total_weight
        } else {
            NEUTRAL
        };
        let composite = ensure_finite(mean * multiplier, "composite opinion")?;
        record.opinion = clamp01(composite);
        Ok(record.opinion)
    }

    /// Scale `peer`'s composite by an external signal.
    ///
    /// The signal takes effect at once and is kept until the next
    /// [`settle_composite`](Self::settle_composite) for that peer, so the
    /// round's own opinion update does not wash it out. Signals for the
    /// same peer compound.
    pub fn apply_signal(&mut self, peer: AgentId, multiplier: f64) -> Result<f64, AgentError> {
        let multiplier = ensure_finite(multiplier, "signal multiplier")?;
        let combined = ensure_finite(
            self.signals.get(&peer).copied().unwrap_or(1.0) * multiplier,
            "signal multiplier",
        )?;
        let opinion = self.recompute_composite(peer, combined)?;
        self.signals.insert(peer, combined);
        Ok(opinion)
    }

    /// The signal still pending for `peer`, if any.
    pub fn pending_signal(&self, peer: AgentId) -> Option<f64> {
        self.signals.get(&peer).copied()
    }

    /// Recompute `peer`'s composite with its pending signal folded in, and
    /// clear the signal.
    pub fn settle_composite(&mut self, peer: AgentId) -> Result<f64, AgentError> {
        let multiplier = self.signals.remove(&peer).unwrap_or(1.0);
        self.recompute_composite(peer, multiplier)
    }

    /// Drop every pending signal.
    pub fn clear_signals(&mut self) {
        self.signals.clear();
    }

    /// How selfishly to treat `peer`, from its points relative to `me`
    /// against our composite opinion of it.
    pub fn selfishness_of(
        &self,
        me: &impl AgentView,
        peer: &impl AgentView,
        max_points_in_group: u32,
    ) -> f64 {
        let success = relative_points(peer.points(), me.points(), max_points_in_group);
        selfishness_score(success, self.opinion_of(peer.id()))
    }

    /// Mean composite opinion over `peers`, or `None` if there are none.
    pub fn mean_opinion(&self, peers: impl IntoIterator<Item = AgentId>) -> Option<f64> {
        let (sum, count) = peers
            .into_iter()
            .fold((0.0, 0_usize), |(sum, n), p| (sum + self.opinion_of(p), n.saturating_add(1)));
        (count > 0).then(|| sum / count_f64(count))
    }

    /// The peer with the lowest opinion strictly below the kick threshold.
    ///
    /// Ties go to the lowest identifier.
    pub fn kick_candidate(&self, members: impl IntoIterator<Item = AgentId>) -> Option<AgentId> {
        let mut worst: Option<(AgentId, f64)> = None;
        for member in members {
            let opinion = self.opinion_of(member);
            if opinion >= self.config.kick_threshold {
                continue;
            }
            let lower = worst
                .as_ref()
                .is_none_or(|(id, w)| opinion < *w || (opinion <= *w && member < *id));
            if lower {
                worst = Some((member, opinion));
            }
        }
        worst.map(|(id, _)| id)
    }

    /// Number of peers with a record.
    pub fn len(&self) -> usize {
        self.opinions.len()
    }

    /// Returns `true` if no peer has a record.
    pub fn is_empty(&self) -> bool {
        self.opinions.is_empty()
    }

    /// Every record, ordered by peer.
    pub fn iter(&self) -> impl Iterator<Item = (AgentId, &Opinion)> {
        self.opinions.iter().map(|(id, o)| (*id, o))
    }

    /// Returns `true` if every stored field is in `[0, 1]`.
    pub fn all_in_range(&self) -> bool {
        self.opinions.values().all(Opinion::is_in_range)
    }
}
