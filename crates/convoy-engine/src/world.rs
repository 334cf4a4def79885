//! The world the engine drives: bikes riding towards loot boxes on a flat
//! field.
//!
//! One call to [`Environment::apply`] is one step of the same discrete
//! physics the riders use to judge reachability: every crew pedals once
//! towards the box it chose and pays `force * moving_depletion` for it. A
//! box within the collection radius is split by the bike's allocation and
//! replaced by a fresh one.
//!
//! # Round application
//!
//! 1. Deliver each rider's messages to its bike-mates
//! 2. Move every bike and collect reached boxes
//! 3. Apply kicks, departures and accepted applicants
//! 4. Remove exhausted riders
//! 5. Rest riderless agents and file their join requests
//! 6. Replace collected boxes and advance the round

use std::collections::BTreeMap;

use convoy_agents::{AllocationFeedback, MAX_BIKE_RIDERS, PhysicsConfig, join_message};
use convoy_core::config::WorldConfig;
use convoy_core::environment::{Environment, EnvironmentError, RoundOutcome};
use convoy_core::round::{BikeDecision, RoundSummary};
use convoy_types::{
    AgentId, AgentSnapshot, BikeId, BikeSnapshot, BikerAction, Coordinates, InboundMessage,
    LootBox, LootBoxId, WorldSnapshot,
};
use rand::Rng;
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use crate::spawner::{self, Population};

/// Energy at or below this level counts as exhausted.
const EXHAUSTED: f64 = 1e-9;

/// A seeded world holding every rider, bike and loot box.
#[derive(Debug)]
pub struct ConvoyWorld {
    settings: WorldConfig,
    physics: PhysicsConfig,
    rng: StdRng,
    round: u64,
    agents: BTreeMap<AgentId, AgentSnapshot>,
    bikes: BTreeMap<BikeId, BikeSnapshot>,
    loot_boxes: BTreeMap<LootBoxId, LootBox>,
}

impl ConvoyWorld {
    /// Build a world around a spawned population and stock it with loot.
    pub fn new(
        settings: WorldConfig,
        physics: PhysicsConfig,
        rng: StdRng,
        population: Population,
    ) -> Self {
        let mut world = Self {
            settings,
            physics,
            rng,
            round: 0,
            agents: population.agents,
            bikes: population.bikes,
            loot_boxes: BTreeMap::new(),
        };
        world.replenish_loot();
        world
    }

    /// Number of agents still in the world.
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Points scored by every surviving agent together.
    pub fn total_points(&self) -> u64 {
        self.agents.values().map(|a| u64::from(a.points)).sum()
    }

    // -------------------------------------------------------------------
    // Messages
    // -------------------------------------------------------------------

    /// Fan each outbound message out to the sender's bike-mates.
    fn deliver(&self, summary: &RoundSummary) -> Vec<InboundMessage> {
        let mut delivered = Vec::new();
        for outbound in &summary.messages {
            let Some(bike) = self
                .agents
                .get(&outbound.sender)
                .and_then(|a| a.bike)
                .and_then(|b| self.bikes.get(&b))
            else {
                continue;
            };
            for recipient in bike.members.iter().filter(|m| **m != outbound.sender) {
                delivered.push(InboundMessage {
                    sender: outbound.sender,
                    recipient: *recipient,
                    message: outbound.message.clone(),
                });
            }
        }
        delivered
    }

    // -------------------------------------------------------------------
    // Movement
    // -------------------------------------------------------------------

    /// Pedal one bike towards its chosen box, returning what it collected.
    fn ride(&mut self, decision: &BikeDecision) -> Option<AllocationFeedback> {
        let bike = self.bikes.get(&decision.bike)?;
        let position = bike.position;
        let velocity = bike.velocity;
        let forces: BTreeMap<AgentId, f64> = bike
            .members
            .iter()
            .filter_map(|id| self.agents.get(id))
            .map(|a| (a.id, self.physics.max_force * a.energy.clamp(0.0, 1.0)))
            .collect();
        let riders = f64::from(u32::try_from(forces.len()).unwrap_or(u32::MAX));
        let mass = riders.mul_add(self.physics.mass_biker, self.physics.mass_bike);
        let target = decision
            .direction
            .and_then(|id| self.loot_boxes.get(&id))
            .map(|b| b.position);

        let Some(target) = target else {
            // Nothing to head for: the crew rests and the bike stops.
            for id in forces.keys() {
                if let Some(agent) = self.agents.get_mut(id) {
                    agent.pedal_force = 0.0;
                    agent.last_target = None;
                }
            }
            if let Some(bike) = self.bikes.get_mut(&decision.bike) {
                bike.velocity = 0.0;
                bike.acceleration = 0.0;
                bike.mass = mass;
            }
            return None;
        };

        let total_force: f64 = forces.values().sum();
        let drag = self.physics.drag * velocity * velocity;
        let acceleration = if mass > 0.0 {
            (total_force - drag) / mass
        } else {
            0.0
        };
        let step = acceleration.mul_add(0.5, velocity).max(0.0);
        let arrived = advance(position, target, step);

        for (id, force) in &forces {
            if let Some(agent) = self.agents.get_mut(id) {
                agent.energy = force
                    .mul_add(-self.physics.moving_depletion, agent.energy)
                    .max(0.0);
                agent.pedal_force = *force;
                agent.last_target = decision.direction;
            }
        }
        if let Some(bike) = self.bikes.get_mut(&decision.bike) {
            bike.orientation = position.heading_to(target);
            bike.position = arrived;
            bike.velocity = (velocity + acceleration).max(0.0);
            bike.acceleration = acceleration;
            bike.mass = mass;
        }

        if arrived.distance_to(target) > self.settings.collection_radius {
            return None;
        }
        let loot = self.loot_boxes.remove(&decision.direction?)?;
        Some(self.collect(&loot, decision))
    }

    /// Split a collected box by the bike's allocation.
    ///
    /// Riders whose colour matches the box score a point.
    fn collect(&mut self, loot: &LootBox, decision: &BikeDecision) -> AllocationFeedback {
        let mut received = BTreeMap::new();
        for (id, share) in decision.allocation.iter() {
            let Some(agent) = self.agents.get_mut(&id) else {
                continue;
            };
            let gain = share * loot.energy;
            agent.energy = (agent.energy + gain).min(1.0);
            if agent.colour == loot.colour {
                agent.points = agent.points.saturating_add(1);
            }
            received.insert(id, gain);
        }
        info!(
            round = self.round,
            bike = %decision.bike,
            loot_box = %loot.id,
            colour = ?loot.colour,
            energy = loot.energy,
            "Loot box collected"
        );
        AllocationFeedback {
            received,
            total: loot.energy,
        }
    }

    // -------------------------------------------------------------------
    // Membership
    // -------------------------------------------------------------------

    /// Apply kicks, voluntary departures and accepted applicants.
    ///
    /// Returns the bike each departing rider left.
    fn update_membership(&mut self, summary: &RoundSummary) -> BTreeMap<AgentId, BikeId> {
        let mut departed = BTreeMap::new();
        for decision in summary.bikes.values() {
            for id in &decision.kicked {
                if let Some(bike) = self.unseat(*id) {
                    info!(round = self.round, agent_id = %id, bike = %bike, "Rider kicked off");
                    departed.insert(*id, bike);
                }
            }
        }
        let leaving = summary
            .actions
            .iter()
            .filter(|(_, action)| matches!(action, BikerAction::LeaveBike))
            .map(|(id, _)| *id);
        for id in leaving {
            if let Some(bike) = self.unseat(id) {
                info!(round = self.round, agent_id = %id, bike = %bike, "Rider left bike");
                departed.insert(id, bike);
            }
        }
        for decision in summary.bikes.values() {
            for id in &decision.accepted {
                if self.seat(*id, decision.bike) {
                    info!(round = self.round, agent_id = %id, bike = %decision.bike, "Rider joined bike");
                }
            }
        }
        departed
    }

    fn unseat(&mut self, id: AgentId) -> Option<BikeId> {
        let bike_id = self.agents.get_mut(&id)?.bike.take()?;
        if let Some(bike) = self.bikes.get_mut(&bike_id) {
            bike.members.retain(|m| *m != id);
        }
        Some(bike_id)
    }

    /// Seat a riderless agent on a bike with a free seat.
    fn seat(&mut self, id: AgentId, bike_id: BikeId) -> bool {
        let Some(bike) = self.bikes.get_mut(&bike_id) else {
            return false;
        };
        if bike.members.len() >= MAX_BIKE_RIDERS {
            return false;
        }
        let Some(agent) = self.agents.get_mut(&id) else {
            return false;
        };
        if agent.bike.is_some() {
            return false;
        }
        agent.bike = Some(bike_id);
        bike.members.push(id);
        true
    }

    fn remove_exhausted(&mut self) {
        let exhausted: Vec<AgentId> = self
            .agents
            .values()
            .filter(|a| a.energy <= EXHAUSTED)
            .map(|a| a.id)
            .collect();
        for id in exhausted {
            self.unseat(id);
            self.agents.remove(&id);
            info!(round = self.round, agent_id = %id, "Rider exhausted");
        }
    }

    /// Rest every riderless agent and send it looking for a bike.
    ///
    /// Each one heads for the bike it chose, or a random bike when it chose
    /// none or its choice has no free seat, never the one it just left. It
    /// asks that bike's crew to take it on. An empty bike has nobody to ask,
    /// so the agent simply climbs on.
    fn seek_bikes(
        &mut self,
        departed: &BTreeMap<AgentId, BikeId>,
        choices: &BTreeMap<AgentId, BikeId>,
    ) -> (BTreeMap<BikeId, Vec<AgentId>>, Vec<InboundMessage>) {
        let mut applicants: BTreeMap<BikeId, Vec<AgentId>> = BTreeMap::new();
        let mut requests = Vec::new();
        let riderless: Vec<AgentId> = self
            .agents
            .values()
            .filter(|a| a.bike.is_none())
            .map(|a| a.id)
            .collect();

        for id in riderless {
            if let Some(agent) = self.agents.get_mut(&id) {
                agent.energy = (agent.energy + self.settings.resting_recovery).min(1.0);
                agent.pedal_force = 0.0;
            }
            let open: Vec<BikeId> = self
                .bikes
                .values()
                .filter(|b| b.members.len() < MAX_BIKE_RIDERS)
                .filter(|b| departed.get(&id) != Some(&b.id))
                .map(|b| b.id)
                .collect();
            if open.is_empty() {
                continue;
            }
            let chosen = choices.get(&id).copied().filter(|c| open.contains(c));
            let Some(bike_id) = chosen.or_else(|| {
                let idx = self.rng.random_range(0..open.len());
                open.get(idx).copied()
            }) else {
                continue;
            };
            let Some(bike) = self.bikes.get(&bike_id) else {
                continue;
            };
            if bike.members.is_empty() {
                if self.seat(id, bike_id) {
                    info!(round = self.round, agent_id = %id, bike = %bike_id, "Rider took an empty bike");
                }
                continue;
            }
            for member in &bike.members {
                requests.push(InboundMessage {
                    sender: id,
                    recipient: *member,
                    message: join_message(bike_id),
                });
            }
            debug!(round = self.round, agent_id = %id, bike = %bike_id, "Rider applied to join");
            applicants.entry(bike_id).or_default().push(id);
        }
        (applicants, requests)
    }

    // -------------------------------------------------------------------
    // Loot
    // -------------------------------------------------------------------

    fn replenish_loot(&mut self) {
        let wanted = usize::try_from(self.settings.loot_boxes).unwrap_or(usize::MAX);
        while self.loot_boxes.len() < wanted {
            match spawner::spawn_loot_box(&mut self.rng, &self.settings) {
                Ok(loot) => {
                    self.loot_boxes.insert(loot.id, loot);
                }
                Err(e) => {
                    warn!(error = %e, "Failed to spawn loot box");
                    break;
                }
            }
        }
    }
}

/// Move from `from` towards `to` by at most `step`.
fn advance(from: Coordinates, to: Coordinates, step: f64) -> Coordinates {
    let distance = from.distance_to(to);
    if distance <= step || distance <= 0.0 {
        return to;
    }
    let t = step / distance;
    Coordinates::new((to.x - from.x).mul_add(t, from.x), (to.y - from.y).mul_add(t, from.y))
}

impl Environment for ConvoyWorld {
    fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            round: self.round,
            agents: self.agents.clone(),
            bikes: self.bikes.clone(),
            loot_boxes: self.loot_boxes.clone(),
        }
    }

    fn apply(&mut self, summary: &RoundSummary) -> Result<RoundOutcome, EnvironmentError> {
        if summary.round != self.round {
            return Err(EnvironmentError::RoundMismatch {
                expected: self.round,
                actual: summary.round,
            });
        }

        // --- Phase 1: Messages travel within the crews that sent them ---
        let mut delivered = self.deliver(summary);

        // --- Phase 2: Movement and collection ---
        let mut feedback = BTreeMap::new();
        for decision in summary.bikes.values() {
            if let Some(collected) = self.ride(decision) {
                feedback.insert(decision.bike, collected);
            }
        }
        for bike in self.bikes.values_mut() {
            if !summary.bikes.contains_key(&bike.id) {
                bike.velocity = 0.0;
                bike.acceleration = 0.0;
            }
        }

        // --- Phase 3: Membership ---
        let departed = self.update_membership(summary);

        // --- Phase 4: Exhaustion ---
        self.remove_exhausted();

        // --- Phase 5: Resting and join requests ---
        let (applicants, requests) = self.seek_bikes(&departed, &summary.bike_choices);
        delivered.extend(requests);

        // --- Phase 6: Advance ---
        self.replenish_loot();
        debug!(
            round = self.round,
            collected = feedback.len(),
            delivered = delivered.len(),
            applicants = applicants.values().map(Vec::len).sum::<usize>(),
            "World round applied"
        );
        self.round = self.round.saturating_add(1);

        Ok(RoundOutcome {
            feedback,
            delivered,
            applicants,
        })
    }
}
