//! Direction consensus: nominate, score, normalise.
//!
//! Every rider nominates one loot box, then scores every distinct nominated
//! box from its own perspective and submits a normalised [`VoteMap`]. The
//! group collector aggregates the maps with
//! [`winner_from_dist`](crate::voting::winner_from_dist).
//!
//! # Scoring
//!
//! - A box beyond the voter's reachable distance scores 0.
//! - A reachable box of the voter's colour with strictly more nominations
//!   than every other box wins outright (one-hot).
//! - Otherwise each nomination of a box adds the nominator's cube score plus
//!   `retained_fraction / nomination_count`. The energy term is gated to 0
//!   when no box of the voter's colour is reachable onward from that box.
//! - If every score is 0 the voter falls back to a one-hot vote for its own
//!   nomination.

use std::collections::{BTreeMap, BTreeSet};

use convoy_types::{AgentId, Coordinates, LootBox, LootBoxId};
use tracing::{debug, warn};

use crate::context::DecisionContext;
use crate::error::AgentError;
use crate::math::count_f64;
use crate::opinion::OpinionStore;
use crate::physics::Reachability;
use crate::voting::VoteMap;

/// The nearest box among `boxes` to `from`, lowest id on equal distance.
pub(crate) fn nearest<'a>(
    boxes: impl IntoIterator<Item = &'a LootBox>,
    from: Coordinates,
) -> Option<(&'a LootBox, f64)> {
    let mut best: Option<(&LootBox, f64)> = None;
    for candidate in boxes {
        let distance = from.distance_to(candidate.position);
        if best.is_none_or(|(_, d)| distance < d) {
            best = Some((candidate, distance));
        }
    }
    best
}

/// Returns `true` if a box of the agent's colour can be reached from
/// `target` with the energy retained on arrival there.
pub(crate) fn colour_reachable_onward(
    ctx: &DecisionContext<'_>,
    reach: &Reachability,
    target: &LootBox,
    distance_to_target: f64,
) -> bool {
    let energy = ctx.me().energy;
    let remaining = reach.distance_to_energy(distance_to_target, energy);
    let onward_budget = reach.energy_to_reachable_distance(remaining);
    ctx.world()
        .loot_boxes
        .values()
        .filter(|b| b.colour == ctx.me().colour)
        .any(|b| target.position.distance_to(b.position) <= onward_budget)
}

/// Pick this round's nomination.
///
/// Prefers the nearest reachable box of the agent's own colour, then the
/// nearest reachable box from which an own-colour box is reachable onward,
/// then the globally nearest box.
pub fn propose_direction(ctx: &DecisionContext<'_>) -> Result<LootBoxId, AgentError> {
    let position = ctx.position()?;
    let boxes = &ctx.world().loot_boxes;
    let me = ctx.me();
    let reach = ctx.reachability();
    let budget = reach.energy_to_reachable_distance(me.energy);

    let own_colour = nearest(boxes.values().filter(|b| b.colour == me.colour), position)
        .filter(|(_, distance)| *distance <= budget);
    if let Some((own, distance)) = own_colour {
        debug!(agent = %me.id, target = %own.id, distance, "nominating own-colour box");
        return Ok(own.id);
    }

    let stepping_stone = nearest(
        boxes.values().filter(|b| {
            let distance = position.distance_to(b.position);
            distance <= budget && colour_reachable_onward(ctx, &reach, b, distance)
        }),
        position,
    );
    if let Some((stone, distance)) = stepping_stone {
        debug!(agent = %me.id, target = %stone.id, distance, "nominating stepping stone");
        return Ok(stone.id);
    }

    let (fallback, distance) = nearest(boxes.values(), position).ok_or(AgentError::NoTargets)?;
    debug!(agent = %me.id, target = %fallback.id, distance, "nominating nearest box");
    Ok(fallback.id)
}

/// What a voter knows about one nominated box.
struct Candidate {
    count: usize,
    reachable: bool,
    own_colour: bool,
    energy_term: f64,
}

/// Score every distinct nominated box and return a normalised vote.
///
/// Fails with [`AgentError::NoCandidates`] when `nominations` is empty.
/// Nominated boxes missing from the snapshot score 0.
pub fn final_direction_vote(
    ctx: &DecisionContext<'_>,
    opinions: &OpinionStore,
    nominations: &BTreeMap<AgentId, LootBoxId>,
) -> Result<VoteMap<LootBoxId>, AgentError> {
    if nominations.is_empty() {
        return Err(AgentError::NoCandidates);
    }
    let me = ctx.me();
    let position = ctx.position()?;
    let reach = ctx.reachability();
    let budget = reach.energy_to_reachable_distance(me.energy);
    let distinct: BTreeSet<LootBoxId> = nominations.values().copied().collect();

    let mut counts: BTreeMap<LootBoxId, usize> = BTreeMap::new();
    for target in nominations.values() {
        let count = counts.entry(*target).or_insert(0);
        *count = count.saturating_add(1);
    }

    let candidates: BTreeMap<LootBoxId, Candidate> = distinct
        .iter()
        .map(|id| {
            let count = counts.get(id).copied().unwrap_or(0);
            let candidate = ctx.world().loot_box(*id).map_or(
                Candidate {
                    count,
                    reachable: false,
                    own_colour: false,
                    energy_term: 0.0,
                },
                |target| {
                    let distance = position.distance_to(target.position);
                    let reachable = distance <= budget;
                    let gated = reachable && colour_reachable_onward(ctx, &reach, target, distance);
                    let energy_term = if gated {
                        reach.retained_fraction(distance, me.energy) / count_f64(count.max(1))
                    } else {
                        0.0
                    };
                    Candidate {
                        count,
                        reachable,
                        own_colour: target.colour == me.colour,
                        energy_term,
                    }
                },
            );
            (*id, candidate)
        })
        .collect();

    // Strict majority of an own-colour reachable box short-circuits scoring.
    for (id, candidate) in &candidates {
        let dominant = candidates
            .iter()
            .filter(|(other, _)| *other != id)
            .all(|(_, other)| candidate.count > other.count);
        if candidate.reachable && candidate.own_colour && dominant {
            debug!(agent = %me.id, target = %id, "own-colour box dominates nominations");
            return Ok(VoteMap::one_hot(*id, distinct.iter().copied()));
        }
    }

    let mut scores: BTreeMap<LootBoxId, f64> = distinct.iter().map(|id| (*id, 0.0)).collect();
    for (nominator, target) in nominations {
        let Some(candidate) = candidates.get(target) else {
            continue;
        };
        if !candidate.reachable {
            continue;
        }
        let cube = ctx.world().agent(*nominator).map_or_else(
            || {
                warn!(nominator = %nominator, "nominator missing from snapshot");
                0.0
            },
            |n| ctx.cube_score_of(opinions, n),
        );
        if let Some(score) = scores.get_mut(target) {
            *score += cube + candidate.energy_term;
        }
    }

    if let Some(vote) = VoteMap::normalize(scores)? {
        return Ok(vote);
    }

    let fallback = match nominations.get(&me.id) {
        Some(own) => *own,
        None => nearest_nominated(ctx, position, &distinct).ok_or(AgentError::NoCandidates)?,
    };
    debug!(agent = %me.id, target = %fallback, "no nominated box scored, voting for own nomination");
    Ok(VoteMap::one_hot(fallback, distinct.iter().copied()))
}

/// The nominated box nearest to `position`; unknown boxes come last.
fn nearest_nominated(
    ctx: &DecisionContext<'_>,
    position: Coordinates,
    distinct: &BTreeSet<LootBoxId>,
) -> Option<LootBoxId> {
    nearest(
        distinct.iter().filter_map(|id| ctx.world().loot_box(*id)),
        position,
    )
    .map(|(b, _)| b.id)
    .or_else(|| distinct.first().copied())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use convoy_types::{AgentSnapshot, BikeId, BikeSnapshot, Colour, WorldSnapshot};
    use uuid::Uuid;

    use super::*;
    use crate::config::DecisionConfig;

    fn aid(n: u128) -> AgentId {
        AgentId::from(Uuid::from_u128(n))
    }

    fn lid(n: u128) -> LootBoxId {
        LootBoxId::from(Uuid::from_u128(n))
    }

    struct Fixture {
        world: WorldSnapshot,
        config: DecisionConfig,
    }

    impl Fixture {
        fn new(colours: &[Colour], energy: f64) -> Self {
            let bike = BikeId::from(Uuid::from_u128(999));
            let mut world = WorldSnapshot::default();
            let mut members = Vec::new();
            for (i, colour) in (1_u128..).zip(colours) {
                let agent = AgentSnapshot {
                    id: aid(i),
                    colour: *colour,
                    energy,
                    points: 0,
                    bike: Some(bike),
                    pedal_force: 0.0,
                    last_target: None,
                };
                members.push(agent.id);
                world.agents.insert(agent.id, agent);
            }
            world.bikes.insert(
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
            Self {
                world,
                config: DecisionConfig::default(),
            }
        }

        fn add_box(&mut self, n: u128, colour: Colour, x: f64) {
            self.world.loot_boxes.insert(
                lid(n),
                LootBox {
                    id: lid(n),
                    colour,
                    position: Coordinates::new(x, 0.0),
                    energy: 1.0,
                },
            );
        }

        fn ctx(&self, agent: u128) -> DecisionContext<'_> {
            DecisionContext::new(&self.world, aid(agent), &self.config).unwrap()
        }
    }

    #[test]
    fn nominates_nearest_own_colour_when_reachable() {
        let mut f = Fixture::new(&[Colour::Red], 1.0);
        f.add_box(1, Colour::Blue, 5.0);
        f.add_box(2, Colour::Red, 20.0);
        f.add_box(3, Colour::Red, 40.0);
        assert_eq!(propose_direction(&f.ctx(1)).unwrap(), lid(2));
    }

    #[test]
    fn falls_back_to_globally_nearest() {
        let mut f = Fixture::new(&[Colour::Red], 0.01);
        f.add_box(1, Colour::Blue, 10_000.0);
        f.add_box(2, Colour::Green, 9_000.0);
        assert_eq!(propose_direction(&f.ctx(1)).unwrap(), lid(2));
    }

    #[test]
    fn no_boxes_is_error() {
        let f = Fixture::new(&[Colour::Red], 1.0);
        assert_eq!(propose_direction(&f.ctx(1)), Err(AgentError::NoTargets));
    }

    #[test]
    fn stepping_stone_beats_far_box() {
        let mut f = Fixture::new(&[Colour::Red], 1.0);
        let budget = f.ctx(1).budget();
        // Red box is out of reach from the start but close to the blue one.
        f.add_box(1, Colour::Red, budget * 1.1);
        f.add_box(2, Colour::Blue, budget * 0.9);
        f.add_box(3, Colour::Green, -budget * 0.5);
        assert_eq!(propose_direction(&f.ctx(1)).unwrap(), lid(2));
    }

    #[test]
    fn majority_own_colour_is_one_hot() {
        let mut f = Fixture::new(&[Colour::Red, Colour::Blue, Colour::Red], 1.0);
        f.add_box(1, Colour::Red, 10.0);
        f.add_box(2, Colour::Blue, 12.0);
        let nominations = BTreeMap::from([(aid(1), lid(1)), (aid(2), lid(2)), (aid(3), lid(1))]);
        let store = OpinionStore::new(f.config.opinion.clone());
        let vote = final_direction_vote(&f.ctx(1), &store, &nominations).unwrap();
        assert!((vote.get(lid(1)) - 1.0).abs() < f64::EPSILON);
        assert!(vote.get(lid(2)).abs() < f64::EPSILON);
    }

    #[test]
    fn all_unreachable_is_one_hot_on_own_nomination() {
        let mut f = Fixture::new(&[Colour::Red, Colour::Blue], 0.01);
        f.add_box(1, Colour::Green, 50_000.0);
        f.add_box(2, Colour::Yellow, 60_000.0);
        let nominations = BTreeMap::from([(aid(1), lid(2)), (aid(2), lid(1))]);
        let store = OpinionStore::new(f.config.opinion.clone());
        let vote = final_direction_vote(&f.ctx(1), &store, &nominations).unwrap();
        assert!((vote.get(lid(2)) - 1.0).abs() < f64::EPSILON);
        assert_eq!(vote.len(), 2);
    }

    #[test]
    fn mixed_vote_is_normalised() {
        let mut f = Fixture::new(&[Colour::Red, Colour::Blue, Colour::Green], 1.0);
        f.add_box(1, Colour::Red, 10.0);
        f.add_box(2, Colour::Blue, 12.0);
        f.add_box(3, Colour::Green, 14.0);
        let nominations = BTreeMap::from([(aid(1), lid(1)), (aid(2), lid(2)), (aid(3), lid(3))]);
        let store = OpinionStore::new(f.config.opinion.clone());
        let vote = final_direction_vote(&f.ctx(2), &store, &nominations).unwrap();
        assert!(vote.is_normalised());
        // The voter's own nomination carries its full self-opinion.
        assert_eq!(vote.winner(), Some(lid(2)));
    }

    #[test]
    fn empty_nominations_is_error() {
        let mut f = Fixture::new(&[Colour::Red], 1.0);
        f.add_box(1, Colour::Red, 10.0);
        let store = OpinionStore::new(f.config.opinion.clone());
        assert_eq!(
            final_direction_vote(&f.ctx(1), &store, &BTreeMap::new()),
            Err(AgentError::NoCandidates)
        );
    }

    #[test]
    fn voter_without_nomination_falls_back_to_nearest_nominated() {
        let mut f = Fixture::new(&[Colour::Red, Colour::Blue], 0.01);
        f.add_box(1, Colour::Green, 70_000.0);
        f.add_box(2, Colour::Yellow, 60_000.0);
        let nominations = BTreeMap::from([(aid(2), lid(1)), (aid(9), lid(2))]);
        let store = OpinionStore::new(f.config.opinion.clone());
        let vote = final_direction_vote(&f.ctx(1), &store, &nominations).unwrap();
        assert_eq!(vote.winner(), Some(lid(2)));
    }
}
