//! Property tests for the range and normalisation invariants of the
//! decision engine.
//!
//! Every opinion field stays in `[0, 1]` under arbitrary updates, every
//! vote and allocation map sums to one, and the governance rule never
//! relaxes as its inputs grow. Direction votes stay normalised and dictated
//! directions stay on the map even when no box is reachable.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use convoy_agents::{
    Biker, DecisionConfig, GovernanceConfig, GovernanceInputs, OpinionConfig, OpinionStore,
    PhysicsConfig, Reachability, VoteMap, decide_governance, selfishness_score,
};
use std::collections::BTreeMap;

use convoy_types::{
    AgentId, AgentSnapshot, BikeId, BikeSnapshot, Colour, Coordinates, EnergySnapshot, LootBox,
    LootBoxId, WorldSnapshot,
};
use proptest::prelude::*;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Helpers / Strategies
// ---------------------------------------------------------------------------

/// One opinion store update with arbitrary, possibly hostile, inputs.
#[derive(Debug, Clone)]
enum Update {
    Trust(bool),
    Effort(f64, f64),
    Fairness(f64, f64),
    RelativeSuccess(f64),
    Composite(f64),
}

fn arb_value() -> impl Strategy<Value = f64> {
    prop_oneof![
        8 => -10.0..10.0_f64,
        1 => Just(f64::NAN),
        1 => Just(f64::INFINITY),
    ]
}

fn arb_update() -> impl Strategy<Value = Update> {
    prop_oneof![
        any::<bool>().prop_map(Update::Trust),
        (arb_value(), arb_value()).prop_map(|(a, b)| Update::Effort(a, b)),
        (arb_value(), arb_value()).prop_map(|(a, b)| Update::Fairness(a, b)),
        arb_value().prop_map(Update::RelativeSuccess),
        arb_value().prop_map(Update::Composite),
    ]
}

fn aid(n: u128) -> AgentId {
    AgentId::from(Uuid::from_u128(n))
}

/// A single bike carrying one rider per energy level.
fn bike_world(energies: &[f64], points: &[u32]) -> WorldSnapshot {
    let bike = BikeId::from(Uuid::from_u128(10_000));
    let mut world = WorldSnapshot::default();
    let mut members = Vec::new();
    for (i, energy) in energies.iter().enumerate() {
        let n = u128::try_from(i).unwrap() + 1;
        let agent = AgentSnapshot {
            id: aid(n),
            colour: Colour::ALL[i % Colour::ALL.len()],
            energy: *energy,
            points: points.get(i).copied().unwrap_or(0),
            bike: Some(bike),
            pedal_force: *energy,
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
            position: Coordinates::default(),
            velocity: 0.0,
            mass: 1.0,
            orientation: 0.0,
            acceleration: 0.0,
        },
    );
    world
}

/// One loot box: colour index and position.
type BoxSpec = (usize, f64, f64);

fn arb_boxes(spread: f64) -> impl Strategy<Value = Vec<BoxSpec>> {
    prop::collection::vec((0..Colour::ALL.len(), -spread..spread, -spread..spread), 1..8)
}

/// Place `boxes` in `world`, shifting every box `offset` along the x axis.
fn with_boxes(mut world: WorldSnapshot, boxes: &[BoxSpec], offset: f64) -> WorldSnapshot {
    for (i, (colour, x, y)) in boxes.iter().enumerate() {
        let id = LootBoxId::from(Uuid::from_u128(20_000 + u128::try_from(i).unwrap()));
        world.loot_boxes.insert(
            id,
            LootBox {
                id,
                colour: Colour::ALL[*colour],
                position: Coordinates::new(x + offset, *y),
                energy: 1.0,
            },
        );
    }
    world
}

/// Every rider nominates, then every rider scores the nominations.
fn check_direction_round(world: &WorldSnapshot) -> Result<(), TestCaseError> {
    let mut bikers: Vec<Biker> = world
        .agents
        .keys()
        .map(|id| Biker::new(*id, DecisionConfig::default()))
        .collect();
    let nominations: BTreeMap<AgentId, LootBoxId> = bikers
        .iter()
        .map(|b| (b.id(), b.propose_direction(world).unwrap()))
        .collect();
    for biker in &mut bikers {
        let vote = biker.final_direction_vote(world, &nominations).unwrap();
        prop_assert!(vote.is_normalised());
        prop_assert!(vote.candidates().all(|c| nominations.values().any(|n| *n == c)));

        let dictated = biker.dictate_direction(world).unwrap();
        prop_assert!(world.loot_boxes.contains_key(&dictated));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Property Tests
// ---------------------------------------------------------------------------

proptest! {
    /// No sequence of updates moves an opinion field out of `[0, 1]`.
    #[test]
    fn opinion_fields_stay_in_range(updates in prop::collection::vec((0_u128..4, arb_update()), 1..60)) {
        let mut store = OpinionStore::new(OpinionConfig::default());
        for (peer, update) in updates {
            let peer = aid(peer);
            // Non-finite inputs are rejected; only the range matters here.
            let _ = match update {
                Update::Trust(aligned) => Ok(store.update_trust(peer, aligned)),
                Update::Effort(o, e) => store.update_effort(peer, o, e),
                Update::Fairness(g, f) => store.update_fairness(peer, g, f),
                Update::RelativeSuccess(x) => store.update_relative_success(peer, x),
                Update::Composite(m) => store.recompute_composite(peer, m),
            };
            prop_assert!(store.all_in_range());
        }
    }

    /// Normalising non-negative scores with a positive sum yields weights
    /// in `[0, 1]` summing to one.
    #[test]
    fn normalised_votes_sum_to_one(scores in prop::collection::vec(0.0..100.0_f64, 1..12)) {
        let map = scores.iter().enumerate().map(|(i, s)| (i, *s)).collect();
        match VoteMap::normalize(map).unwrap() {
            Some(vote) => prop_assert!(vote.is_normalised()),
            None => prop_assert!(scores.iter().all(|s| *s <= 0.0)),
        }
    }

    /// Every rider's allocation proposal is normalised, whatever the
    /// energies, points and opinions on the bike.
    #[test]
    fn allocation_proposals_are_normalised(
        energies in prop::collection::vec(0.0..=1.0_f64, 1..=8),
        points in prop::collection::vec(0_u32..50, 8),
        opinions in prop::collection::vec(0.0..=1.0_f64, 8),
    ) {
        let world = bike_world(&energies, &points);
        let snapshot = EnergySnapshot::capture(world.agents.values());
        for agent in world.agents.keys() {
            let mut biker = Biker::new(*agent, DecisionConfig::default());
            for (i, opinion) in opinions.iter().enumerate() {
                let peer = aid(u128::try_from(i).unwrap() + 1);
                if peer != *agent {
                    biker.opinions_mut().ensure(peer).opinion = *opinion;
                }
            }
            let proposal = biker.decide_allocation(&world, &snapshot).unwrap();
            prop_assert!(proposal.is_normalised());
            prop_assert_eq!(proposal.len(), energies.len());
        }
    }

    /// Raising either governance input never relaxes the regime.
    #[test]
    fn governance_is_monotonic(
        opinion in 0.0..=1.0_f64,
        reputation in 0.0..=1.0_f64,
        bump in 0.0..=1.0_f64,
    ) {
        let t = GovernanceConfig::default();
        let base = decide_governance(
            GovernanceInputs { mean_opinion: opinion, self_reputation: reputation },
            &t,
        );
        let more_opinion = decide_governance(
            GovernanceInputs { mean_opinion: opinion + bump, self_reputation: reputation },
            &t,
        );
        let more_reputation = decide_governance(
            GovernanceInputs { mean_opinion: opinion, self_reputation: reputation + bump },
            &t,
        );
        prop_assert!(more_opinion >= base);
        prop_assert!(more_reputation >= base);
    }

    /// Agreement between success and relationship is exactly neutral.
    #[test]
    fn selfishness_is_neutral_on_agreement(x in 0.0..=1.0_f64) {
        prop_assert!((selfishness_score(x, x) - 0.5).abs() < f64::EPSILON);
    }

    /// Reachable distance grows with energy and travelling never creates
    /// energy.
    #[test]
    fn reachability_is_monotonic(
        riders in 1_usize..=8,
        velocity in 0.0..5.0_f64,
        low in 0.0..=1.0_f64,
        high in 0.0..=1.0_f64,
        distance in 0.0..500.0_f64,
    ) {
        let (low, high) = if low <= high { (low, high) } else { (high, low) };
        let reach = Reachability::new(&PhysicsConfig::default(), riders, velocity);
        prop_assert!(reach.energy_to_reachable_distance(low) <= reach.energy_to_reachable_distance(high));
        prop_assert!(reach.distance_to_energy(distance, high) <= high);
    }

    /// Direction votes are normalised and dictated directions name a real
    /// box, whatever the energies, colours and box layout.
    #[test]
    fn direction_votes_are_normalised(
        energies in prop::collection::vec(0.0..=1.0_f64, 1..=6),
        boxes in arb_boxes(300.0),
    ) {
        let world = with_boxes(bike_world(&energies, &[]), &boxes, 0.0);
        check_direction_round(&world)?;
    }

    /// The same holds when every box lies far beyond any rider's reach.
    #[test]
    fn unreachable_boxes_still_give_normalised_votes(
        energies in prop::collection::vec(0.0..=1.0_f64, 1..=6),
        boxes in arb_boxes(50.0),
    ) {
        let world = with_boxes(bike_world(&energies, &[]), &boxes, 1.0e7);
        check_direction_round(&world)?;
    }
}
