//! Read-only snapshots of the world as committed at the start of a round.
//!
//! The physics and world collaborators own the live state; the decision
//! engine only ever sees these snapshots. Every phase of a round reads the
//! same [`WorldSnapshot`], which is what makes per-agent evaluation inside a
//! phase order-independent.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::enums::Colour;
use crate::geometry::Coordinates;
use crate::ids::{AgentId, BikeId, LootBoxId};

// ---------------------------------------------------------------------------
// AgentSnapshot
// ---------------------------------------------------------------------------

/// One agent as observed at the start of a round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    /// The agent's identifier.
    pub id: AgentId,
    /// The agent's colour.
    pub colour: Colour,
    /// Current energy level in `[0, 1]`.
    pub energy: f64,
    /// Cumulative points.
    pub points: u32,
    /// The bike the agent rides, if any.
    pub bike: Option<BikeId>,
    /// Pedal force the agent applied during the previous round.
    pub pedal_force: f64,
    /// The target the agent actually steered towards during the previous round.
    pub last_target: Option<LootBoxId>,
}

// ---------------------------------------------------------------------------
// BikeSnapshot
// ---------------------------------------------------------------------------

/// A group-owned bike as observed at the start of a round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BikeSnapshot {
    /// The bike's identifier.
    pub id: BikeId,
    /// Riders currently on the bike, in identifier order.
    pub members: Vec<AgentId>,
    /// Current position.
    pub position: Coordinates,
    /// Current scalar velocity.
    pub velocity: f64,
    /// Total mass of bike plus riders.
    pub mass: f64,
    /// Current orientation, normalised to `[-1, 1]`.
    pub orientation: f64,
    /// Acceleration observed during the previous round.
    pub acceleration: f64,
}

// ---------------------------------------------------------------------------
// LootBox
// ---------------------------------------------------------------------------

/// A travel target scattered across the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LootBox {
    /// The loot box's identifier.
    pub id: LootBoxId,
    /// The loot box's colour.
    pub colour: Colour,
    /// Where the loot box sits.
    pub position: Coordinates,
    /// Total energy the box yields when collected.
    pub energy: f64,
}

// ---------------------------------------------------------------------------
// EnergySnapshot
// ---------------------------------------------------------------------------

/// Per-agent energy captured once at the start of a round.
///
/// Fairness and allocation math read energy from here so that changes made
/// while the round is being evaluated never leak into the attribution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnergySnapshot(BTreeMap<AgentId, f64>);

impl EnergySnapshot {
    /// Create an empty snapshot.
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Capture the energy of every listed agent.
    pub fn capture<'a>(agents: impl IntoIterator<Item = &'a AgentSnapshot>) -> Self {
        Self(agents.into_iter().map(|a| (a.id, a.energy)).collect())
    }

    /// Energy of an agent at capture time, if it was captured.
    pub fn get(&self, agent: AgentId) -> Option<f64> {
        self.0.get(&agent).copied()
    }

    /// Record an agent's energy.
    pub fn insert(&mut self, agent: AgentId, energy: f64) {
        self.0.insert(agent, energy);
    }

    /// Captured agents in identifier order.
    pub fn agents(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.0.keys().copied()
    }

    /// Number of captured agents.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ---------------------------------------------------------------------------
// WorldSnapshot
// ---------------------------------------------------------------------------

/// The committed state of the world for one round.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    /// The round this snapshot belongs to.
    pub round: u64,
    /// Every agent in the world, riding or not.
    pub agents: BTreeMap<AgentId, AgentSnapshot>,
    /// Every bike in the world.
    pub bikes: BTreeMap<BikeId, BikeSnapshot>,
    /// Every loot box in the world.
    pub loot_boxes: BTreeMap<LootBoxId, LootBox>,
}

impl WorldSnapshot {
    /// Look up an agent.
    pub fn agent(&self, id: AgentId) -> Option<&AgentSnapshot> {
        self.agents.get(&id)
    }

    /// Look up a bike.
    pub fn bike(&self, id: BikeId) -> Option<&BikeSnapshot> {
        self.bikes.get(&id)
    }

    /// Look up a loot box.
    pub fn loot_box(&self, id: LootBoxId) -> Option<&LootBox> {
        self.loot_boxes.get(&id)
    }

    /// The riders of a bike that are present in this snapshot.
    ///
    /// Unknown member identifiers are skipped; an unknown bike yields an
    /// empty list.
    pub fn members_of(&self, bike: BikeId) -> Vec<&AgentSnapshot> {
        self.bikes
            .get(&bike)
            .map(|b| b.members.iter().filter_map(|m| self.agents.get(m)).collect())
            .unwrap_or_default()
    }

    /// The agents an agent should consider as its peers: fellow riders when
    /// it is on a bike, otherwise the whole population.
    pub fn context_of(&self, agent: AgentId) -> Vec<&AgentSnapshot> {
        match self.agents.get(&agent).and_then(|a| a.bike) {
            Some(bike) => self.members_of(bike),
            None => self.agents.values().collect(),
        }
    }

    /// Highest point total across the whole population.
    pub fn max_points(&self) -> u32 {
        self.agents.values().map(|a| a.points).max().unwrap_or(0)
    }
}
