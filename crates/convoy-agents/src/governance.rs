//! Governance regime choice, ruler election and ruler decisions.
//!
//! Every round each rider picks the regime it prefers from how much it
//! likes its peers (`mean_opinion`) and how well it compares to them
//! (`self_reputation`). The group adopts the plurality choice. Under
//! leadership or dictatorship the riders elect a ruler, whose direction
//! decision replaces the group consensus for that round.
//!
//! Nothing here is sticky: the regime and the ruler are recomputed from
//! scratch every round.

use std::collections::BTreeMap;

use convoy_types::{AgentId, Governance, LootBoxId};
use tracing::debug;

use crate::config::GovernanceConfig;
use crate::consensus::propose_direction;
use crate::context::DecisionContext;
use crate::error::{AgentError, ensure_finite};
use crate::math::count_f64;
use crate::opinion::{NEUTRAL, OpinionStore, objective_relative_success};
use crate::voting::{VoteMap, winner_from_dist};

// ---------------------------------------------------------------------------
// Regime choice
// ---------------------------------------------------------------------------

/// The inputs of the transition rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GovernanceInputs {
    /// Mean composite opinion of the relevant population.
    pub mean_opinion: f64,
    /// Mean objective relative success of the agent against that population.
    pub self_reputation: f64,
}

/// Apply the transition rule, most restrictive tier first.
///
/// Democracy is the unconditional fallback.
pub fn decide_governance(inputs: GovernanceInputs, thresholds: &GovernanceConfig) -> Governance {
    let GovernanceInputs {
        mean_opinion,
        self_reputation,
    } = inputs;
    if mean_opinion > thresholds.dictatorship_opinion
        || self_reputation > thresholds.dictatorship_reputation
    {
        Governance::Dictatorship
    } else if mean_opinion > thresholds.leadership_opinion
        || self_reputation > thresholds.leadership_reputation
    {
        Governance::Leadership
    } else {
        Governance::Democracy
    }
}

/// Measure the transition-rule inputs for the deciding agent.
///
/// The population is the agent's fellow riders, or everyone when it is not
/// riding, excluding the agent itself. An empty population is neutral.
pub fn governance_inputs(
    ctx: &DecisionContext<'_>,
    opinions: &OpinionStore,
) -> Result<GovernanceInputs, AgentError> {
    let population = ctx.population();
    if population.is_empty() {
        return Ok(GovernanceInputs {
            mean_opinion: NEUTRAL,
            self_reputation: NEUTRAL,
        });
    }
    let mean_opinion = opinions
        .mean_opinion(population.iter().map(|a| a.id))
        .unwrap_or(NEUTRAL);
    let max_points = ctx.world().max_points();
    let bonus = opinions.config().colour_bonus;
    let total: f64 = population
        .iter()
        .map(|peer| objective_relative_success(ctx.me(), *peer, max_points, bonus))
        .sum();
    let self_reputation = ensure_finite(total / count_f64(population.len()), "self reputation")?;
    Ok(GovernanceInputs {
        mean_opinion: ensure_finite(mean_opinion, "mean opinion")?,
        self_reputation,
    })
}

/// The group's regime: plurality of the members' choices.
///
/// Ties resolve to the less restrictive regime; no choices at all means
/// Democracy.
pub fn group_governance(choices: impl IntoIterator<Item = Governance>) -> Governance {
    let mut tally: BTreeMap<Governance, usize> = BTreeMap::new();
    for choice in choices {
        let count = tally.entry(choice).or_insert(0);
        *count = count.saturating_add(1);
    }
    let mut best = (Governance::Democracy, 0_usize);
    for (regime, count) in tally {
        if count > best.1 {
            best = (regime, count);
        }
    }
    best.0
}

/// Reconcile a rider's own choice with the regimes its peers announced.
///
/// A rider that only fell back to Democracy follows a regime announced by a
/// strict majority of its `peers`. A positive choice is kept.
pub fn follow_announcements(
    own: Governance,
    announced: impl IntoIterator<Item = Governance>,
    peers: usize,
) -> Governance {
    if own != Governance::Democracy || peers == 0 {
        return own;
    }
    let mut tally: BTreeMap<Governance, usize> = BTreeMap::new();
    for regime in announced {
        let count = tally.entry(regime).or_insert(0);
        *count = count.saturating_add(1);
    }
    tally
        .into_iter()
        .find(|(_, count)| count.saturating_mul(2) > peers)
        .map_or(own, |(regime, _)| regime)
}

// ---------------------------------------------------------------------------
// Ruler election
// ---------------------------------------------------------------------------

/// Cast a ruler ballot over fellow riders.
///
/// Each candidate is weighted by our composite opinion of it plus a bonus
/// when it shares our colour. A rider alone on its bike, or one that finds
/// no candidate worth anything, votes for itself.
pub fn vote_ruler(
    ctx: &DecisionContext<'_>,
    opinions: &OpinionStore,
    thresholds: &GovernanceConfig,
) -> Result<VoteMap<AgentId>, AgentError> {
    let me = ctx.me();
    let peers = ctx.peers();
    let scores: BTreeMap<AgentId, f64> = peers
        .iter()
        .map(|peer| {
            let bonus = if peer.colour == me.colour {
                thresholds.ruler_colour_bonus
            } else {
                0.0
            };
            (peer.id, opinions.opinion_of(peer.id) + bonus)
        })
        .collect();
    Ok(VoteMap::normalize(scores)?
        .unwrap_or_else(|| VoteMap::one_hot(me.id, peers.iter().map(|p| p.id))))
}

/// Elect a ruler from every elector's ballot, one vote per elector.
pub fn elect_ruler(ballots: &BTreeMap<AgentId, VoteMap<AgentId>>) -> Option<AgentId> {
    winner_from_dist(ballots, &BTreeMap::new())
}

// ---------------------------------------------------------------------------
// Ruler decisions
// ---------------------------------------------------------------------------

/// The dictator's direction, chosen on its own.
///
/// Every box the ruler can reach scores
/// `colour_weight * (1 + density) * retained_fraction`, where the colour
/// weight sums the cube scores of riders sharing the box's colour (the
/// ruler counts 1.0) and the density is the fraction of all other boxes
/// reachable from the box with the energy retained on arrival. When nothing
/// scores, the ruler falls back to its own nomination.
pub fn dictate_direction(
    ctx: &DecisionContext<'_>,
    opinions: &OpinionStore,
) -> Result<LootBoxId, AgentError> {
    let me = ctx.me();
    let position = ctx.position()?;
    let reach = ctx.reachability();
    let budget = reach.energy_to_reachable_distance(me.energy);
    let boxes = &ctx.world().loot_boxes;

    let mut colour_weight = BTreeMap::new();
    for fellow in ctx.fellows() {
        let weight = if fellow.id == me.id {
            1.0
        } else {
            ctx.cube_score_of(opinions, fellow)
        };
        *colour_weight.entry(fellow.colour).or_insert(0.0) += weight;
    }

    let others = count_f64(boxes.len().saturating_sub(1).max(1));
    let mut best: Option<(LootBoxId, f64)> = None;
    for target in boxes.values() {
        let distance = position.distance_to(target.position);
        if distance > budget {
            continue;
        }
        let Some(weight) = colour_weight.get(&target.colour).copied() else {
            continue;
        };
        let remaining = reach.distance_to_energy(distance, me.energy);
        let onward = reach.energy_to_reachable_distance(remaining);
        let nearby = boxes
            .values()
            .filter(|b| b.id != target.id && target.position.distance_to(b.position) <= onward)
            .count();
        let density = count_f64(nearby) / others;
        let score = ensure_finite(
            weight * (1.0 + density) * reach.retained_fraction(distance, me.energy),
            "dictator score",
        )?;
        if score > 0.0 && best.is_none_or(|(_, top)| score > top) {
            best = Some((target.id, score));
        }
    }

    match best {
        Some((target, score)) => {
            debug!(ruler = %me.id, target = %target, score, "dictating direction");
            Ok(target)
        }
        None => propose_direction(ctx),
    }
}

/// The weight a leader gives each voter: its own opinion of them, 1.0 for
/// itself and neutral for strangers.
pub fn decide_weights(
    opinions: &OpinionStore,
    leader: AgentId,
    voters: impl IntoIterator<Item = AgentId>,
) -> BTreeMap<AgentId, f64> {
    voters
        .into_iter()
        .map(|v| {
            let weight = if v == leader { 1.0 } else { opinions.opinion_of(v) };
            (v, weight)
        })
        .collect()
}

/// The leader's direction: the members' votes re-weighted by the leader's
/// opinion of each voter.
pub fn lead_direction(
    opinions: &OpinionStore,
    leader: AgentId,
    votes: &BTreeMap<AgentId, VoteMap<LootBoxId>>,
) -> Option<LootBoxId> {
    let weights = decide_weights(opinions, leader, votes.keys().copied());
    let winner = winner_from_dist(votes, &weights);
    debug!(leader = %leader, winner = ?winner, "leading direction");
    winner
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use convoy_types::{AgentSnapshot, BikeId, BikeSnapshot, Colour, Coordinates, LootBox, WorldSnapshot};
    use uuid::Uuid;

    use super::*;
    use crate::config::{DecisionConfig, OpinionConfig};

    fn aid(n: u128) -> AgentId {
        AgentId::from(Uuid::from_u128(n))
    }

    fn lid(n: u128) -> LootBoxId {
        LootBoxId::from(Uuid::from_u128(n))
    }

    fn inputs(mean_opinion: f64, self_reputation: f64) -> GovernanceInputs {
        GovernanceInputs {
            mean_opinion,
            self_reputation,
        }
    }

    fn world(colours: &[Colour]) -> WorldSnapshot {
        let bike = BikeId::from(Uuid::from_u128(500));
        let mut w = WorldSnapshot::default();
        let mut members = Vec::new();
        for (i, colour) in (1_u128..).zip(colours) {
            let a = AgentSnapshot {
                id: aid(i),
                colour: *colour,
                energy: 1.0,
                points: 0,
                bike: Some(bike),
                pedal_force: 0.0,
                last_target: None,
            };
            members.push(a.id);
            w.agents.insert(a.id, a);
        }
        w.bikes.insert(
            bike,
            BikeSnapshot {
                id: bike,
                members,
                position: Coordinates::new(0.0, 0.0),
                velocity: 1.0,
                mass: 4.0,
                orientation: 0.0,
                acceleration: 0.0,
            },
        );
        w
    }

    fn add_box(w: &mut WorldSnapshot, n: u128, colour: Colour, x: f64) {
        w.loot_boxes.insert(
            lid(n),
            LootBox {
                id: lid(n),
                colour,
                position: Coordinates::new(x, 0.0),
                energy: 1.0,
            },
        );
    }

    #[test]
    fn transition_rule_tiers() {
        let t = GovernanceConfig::default();
        assert_eq!(decide_governance(inputs(0.95, 0.0), &t), Governance::Dictatorship);
        assert_eq!(decide_governance(inputs(0.0, 0.75), &t), Governance::Dictatorship);
        assert_eq!(decide_governance(inputs(0.8, 0.0), &t), Governance::Leadership);
        assert_eq!(decide_governance(inputs(0.0, 0.6), &t), Governance::Leadership);
        assert_eq!(decide_governance(inputs(0.5, 0.5), &t), Governance::Democracy);
        assert_eq!(decide_governance(inputs(0.0, 0.0), &t), Governance::Democracy);
    }

    #[test]
    fn group_governance_plurality_and_ties() {
        use Governance::{Democracy, Dictatorship, Leadership};
        assert_eq!(group_governance([Leadership, Leadership, Democracy]), Leadership);
        assert_eq!(group_governance([Dictatorship, Leadership]), Leadership);
        assert_eq!(group_governance([Dictatorship, Democracy]), Democracy);
        assert_eq!(group_governance([]), Democracy);
    }

    #[test]
    fn fallback_follows_majority_announcement() {
        use Governance::{Democracy, Dictatorship, Leadership};
        assert_eq!(follow_announcements(Democracy, [Leadership, Leadership], 3), Leadership);
        assert_eq!(follow_announcements(Democracy, [Leadership, Dictatorship], 3), Democracy);
        assert_eq!(follow_announcements(Democracy, [Leadership], 2), Democracy);
        assert_eq!(follow_announcements(Dictatorship, [Leadership, Leadership], 2), Dictatorship);
        assert_eq!(follow_announcements(Democracy, [], 0), Democracy);
    }

    #[test]
    fn lone_agent_inputs_are_neutral() {
        let w = world(&[Colour::Red]);
        let config = DecisionConfig::default();
        let ctx = DecisionContext::new(&w, aid(1), &config).unwrap();
        let store = OpinionStore::new(OpinionConfig::default());
        let got = governance_inputs(&ctx, &store).unwrap();
        assert!((got.mean_opinion - NEUTRAL).abs() < f64::EPSILON);
        assert!((got.self_reputation - NEUTRAL).abs() < f64::EPSILON);
    }

    #[test]
    fn ruler_vote_favours_same_colour() {
        let w = world(&[Colour::Red, Colour::Red, Colour::Blue]);
        let config = DecisionConfig::default();
        let ctx = DecisionContext::new(&w, aid(1), &config).unwrap();
        let store = OpinionStore::new(OpinionConfig::default());
        let ballot = vote_ruler(&ctx, &store, &config.governance).unwrap();
        assert!(ballot.is_normalised());
        assert!(ballot.get(aid(1)).abs() < f64::EPSILON);
        assert!((ballot.get(aid(2)) - 0.75).abs() < 1e-12);
        assert_eq!(ballot.winner(), Some(aid(2)));
    }

    #[test]
    fn lone_rider_votes_for_itself() {
        let w = world(&[Colour::Red]);
        let config = DecisionConfig::default();
        let ctx = DecisionContext::new(&w, aid(1), &config).unwrap();
        let store = OpinionStore::new(OpinionConfig::default());
        let ballot = vote_ruler(&ctx, &store, &config.governance).unwrap();
        assert_eq!(ballot.winner(), Some(aid(1)));
    }

    #[test]
    fn election_is_plurality_with_lowest_id_tie_break() {
        let ballots = BTreeMap::from([
            (aid(1), VoteMap::one_hot(aid(3), [aid(2), aid(3)])),
            (aid(2), VoteMap::one_hot(aid(1), [aid(1), aid(3)])),
            (aid(3), VoteMap::one_hot(aid(1), [aid(1), aid(2)])),
        ]);
        assert_eq!(elect_ruler(&ballots), Some(aid(1)));

        let tied = BTreeMap::from([
            (aid(1), VoteMap::one_hot(aid(3), [aid(2), aid(3)])),
            (aid(3), VoteMap::one_hot(aid(2), [aid(1), aid(2)])),
        ]);
        assert_eq!(elect_ruler(&tied), Some(aid(2)));
        assert_eq!(elect_ruler(&BTreeMap::new()), None);
    }

    #[test]
    fn dictator_prefers_own_colour_cluster() {
        let mut w = world(&[Colour::Red, Colour::Blue]);
        add_box(&mut w, 1, Colour::Blue, 30.0);
        add_box(&mut w, 2, Colour::Red, 30.5);
        add_box(&mut w, 3, Colour::Red, 31.0);
        let config = DecisionConfig::default();
        let ctx = DecisionContext::new(&w, aid(1), &config).unwrap();
        let store = OpinionStore::new(OpinionConfig::default());
        assert_eq!(dictate_direction(&ctx, &store).unwrap(), lid(2));
    }

    #[test]
    fn dictator_falls_back_to_own_nomination() {
        let mut w = world(&[Colour::Red, Colour::Blue]);
        add_box(&mut w, 1, Colour::Green, 90_000.0);
        add_box(&mut w, 2, Colour::Yellow, 80_000.0);
        let config = DecisionConfig::default();
        let ctx = DecisionContext::new(&w, aid(1), &config).unwrap();
        let store = OpinionStore::new(OpinionConfig::default());
        assert_eq!(dictate_direction(&ctx, &store).unwrap(), lid(2));
    }

    #[test]
    fn leader_reweights_votes_by_opinion() {
        let mut store = OpinionStore::new(OpinionConfig::default());
        store.ensure(aid(2)).opinion = 0.1;
        store.ensure(aid(3)).opinion = 0.1;
        let votes = BTreeMap::from([
            (aid(1), VoteMap::one_hot(lid(1), [lid(1), lid(2)])),
            (aid(2), VoteMap::one_hot(lid(2), [lid(1), lid(2)])),
            (aid(3), VoteMap::one_hot(lid(2), [lid(1), lid(2)])),
        ]);
        assert_eq!(lead_direction(&store, aid(1), &votes), Some(lid(1)));

        let weights = decide_weights(&store, aid(1), [aid(1), aid(2), aid(4)]);
        assert!((weights.get(&aid(1)).unwrap() - 1.0).abs() < f64::EPSILON);
        assert!((weights.get(&aid(4)).unwrap() - NEUTRAL).abs() < f64::EPSILON);
    }
}
