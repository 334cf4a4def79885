//! Seat decisions: which bike to move to and whom a dictator removes.

use convoy_types::{AgentId, AgentSnapshot, BikeId, BikeSnapshot, Colour, Coordinates, WorldSnapshot};
use tracing::debug;

use crate::config::MAX_BIKE_RIDERS;
use crate::context::DecisionContext;
use crate::opinion::OpinionStore;

/// Returns `true` if a strict majority of `bike`'s riders wear `colour`.
///
/// An empty bike has no majority.
pub fn colour_majority(world: &WorldSnapshot, bike: &BikeSnapshot, colour: Colour) -> bool {
    let matching = bike
        .members
        .iter()
        .filter_map(|m| world.agent(*m))
        .filter(|a| a.colour == colour)
        .count();
    matching.saturating_mul(2) > bike.members.len()
}

/// The bike `me` should move to.
///
/// Only bikes with a free seat other than `leaving` qualify. The nearest one
/// whose crew is mostly `me`'s colour wins; failing that, the nearest one.
/// Without a known position every bike is equally near and the lowest id
/// wins. Returns `None` when no bike has a free seat.
pub fn choose_bike(
    world: &WorldSnapshot,
    me: &AgentSnapshot,
    from: Option<Coordinates>,
    leaving: Option<BikeId>,
) -> Option<BikeId> {
    let mut open: Vec<(&BikeSnapshot, f64)> = world
        .bikes
        .values()
        .filter(|b| Some(b.id) != leaving && b.members.len() < MAX_BIKE_RIDERS)
        .map(|b| (b, from.map_or(0.0, |p| p.distance_to(b.position))))
        .filter(|(_, distance)| distance.is_finite())
        .collect();
    open.sort_by(|(a, da), (b, db)| da.total_cmp(db).then(a.id.cmp(&b.id)));

    let choice = open
        .iter()
        .find(|(b, _)| colour_majority(world, b, me.colour))
        .or_else(|| open.first())
        .map(|(b, _)| b.id);
    debug!(agent = %me.id, choice = ?choice, open = open.len(), "chose bike");
    choice
}

/// The riders a dictator removes: the peer it likes least, when that peer
/// is below the kick threshold.
pub fn dictate_kickout(ctx: &DecisionContext<'_>, opinions: &OpinionStore) -> Vec<AgentId> {
    opinions
        .kick_candidate(ctx.peers().iter().map(|p| p.id))
        .into_iter()
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::config::DecisionConfig;

    fn aid(n: u128) -> AgentId {
        AgentId::from(Uuid::from_u128(n))
    }

    fn bid(n: u128) -> BikeId {
        BikeId::from(Uuid::from_u128(n))
    }

    /// Bike 1 at the origin carries riders 1 (red) and 2 (blue). Bike 2 at
    /// x = 10 carries two blues, bike 3 at x = 40 carries two reds.
    fn world() -> WorldSnapshot {
        let mut w = WorldSnapshot::default();
        let crews = [
            (1, 0.0, vec![(1, Colour::Red), (2, Colour::Blue)]),
            (2, 10.0, vec![(3, Colour::Blue), (4, Colour::Blue)]),
            (3, 40.0, vec![(5, Colour::Red), (6, Colour::Red)]),
        ];
        for (bike, x, crew) in crews {
            for (n, colour) in &crew {
                let agent = AgentSnapshot {
                    id: aid(*n),
                    colour: *colour,
                    energy: 0.5,
                    points: 0,
                    bike: Some(bid(bike)),
                    pedal_force: 0.5,
                    last_target: None,
                };
                w.agents.insert(agent.id, agent);
            }
            w.bikes.insert(
                bid(bike),
                BikeSnapshot {
                    id: bid(bike),
                    members: crew.iter().map(|(n, _)| aid(*n)).collect(),
                    position: Coordinates::new(x, 0.0),
                    velocity: 0.0,
                    mass: 3.0,
                    orientation: 0.0,
                    acceleration: 0.0,
                },
            );
        }
        w
    }

    #[test]
    fn prefers_own_colour_over_nearer_bike() {
        let w = world();
        let me = w.agent(aid(1)).unwrap();
        let origin = Some(Coordinates::new(0.0, 0.0));
        assert_eq!(choose_bike(&w, me, origin, Some(bid(1))), Some(bid(3)));
    }

    #[test]
    fn falls_back_to_nearest_open_bike() {
        let mut w = world();
        let me = w.agent(aid(2)).unwrap().clone();
        // Rider 2 is blue: bike 2 is both nearest and blue.
        assert_eq!(choose_bike(&w, &me, Some(Coordinates::new(0.0, 0.0)), Some(bid(1))), Some(bid(2)));

        let green = AgentSnapshot {
            colour: Colour::Green,
            ..me
        };
        w.agents.insert(green.id, green.clone());
        assert_eq!(choose_bike(&w, &green, Some(Coordinates::new(0.0, 0.0)), Some(bid(1))), Some(bid(2)));
    }

    #[test]
    fn full_bikes_are_skipped() {
        let mut w = world();
        let extra: Vec<AgentId> = (100..106).map(aid).collect();
        if let Some(bike) = w.bikes.get_mut(&bid(3)) {
            bike.members.extend(extra);
        }
        let me = w.agent(aid(1)).unwrap().clone();
        assert_eq!(
            choose_bike(&w, &me, Some(Coordinates::new(0.0, 0.0)), Some(bid(1))),
            Some(bid(2))
        );
        for bike in w.bikes.values_mut() {
            bike.members.resize(MAX_BIKE_RIDERS, aid(999));
        }
        assert_eq!(choose_bike(&w, &me, None, None), None);
    }

    #[test]
    fn majority_needs_more_than_half() {
        let w = world();
        assert!(!colour_majority(&w, w.bike(bid(1)).unwrap(), Colour::Red));
        assert!(colour_majority(&w, w.bike(bid(3)).unwrap(), Colour::Red));
        let empty = BikeSnapshot {
            id: bid(9),
            members: Vec::new(),
            position: Coordinates::default(),
            velocity: 0.0,
            mass: 1.0,
            orientation: 0.0,
            acceleration: 0.0,
        };
        assert!(!colour_majority(&w, &empty, Colour::Red));
    }

    #[test]
    fn dictator_removes_least_liked_peer_below_threshold() {
        let w = world();
        let config = DecisionConfig::default();
        let ctx = DecisionContext::new(&w, aid(5), &config).unwrap();
        let mut opinions = OpinionStore::new(config.opinion.clone());
        assert!(dictate_kickout(&ctx, &opinions).is_empty());

        opinions.ensure(aid(6)).opinion = 0.01;
        assert_eq!(dictate_kickout(&ctx, &opinions), vec![aid(6)]);
    }
}
