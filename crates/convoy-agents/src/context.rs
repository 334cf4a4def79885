//! The read-only view an agent decides from.
//!
//! A [`DecisionContext`] binds one agent to the committed [`WorldSnapshot`]
//! of the round and the decision tunables. It answers the questions every
//! decision module asks: who rides with me, where are we, how far can we go.

use convoy_types::{AgentId, AgentSnapshot, BikeSnapshot, Coordinates, WorldSnapshot};
use tracing::warn;

use crate::config::DecisionConfig;
use crate::error::AgentError;
use crate::opinion::{OpinionStore, cube_score, relative_energy, relative_points};
use crate::physics::Reachability;

/// One agent's view of the committed world for a round.
#[derive(Debug, Clone, Copy)]
pub struct DecisionContext<'a> {
    world: &'a WorldSnapshot,
    me: &'a AgentSnapshot,
    config: &'a DecisionConfig,
}

impl<'a> DecisionContext<'a> {
    /// Bind `agent` to the snapshot.
    ///
    /// Fails if the agent is absent from the snapshot or reports a
    /// non-finite energy. Fellow riders with non-finite readings are left
    /// out of [`fellows`](Self::fellows) with a warning.
    pub fn new(
        world: &'a WorldSnapshot,
        agent: AgentId,
        config: &'a DecisionConfig,
    ) -> Result<Self, AgentError> {
        let me = world.agent(agent).ok_or(AgentError::UnknownAgent(agent))?;
        if !me.energy.is_finite() {
            return Err(AgentError::NonFinite {
                context: format!("energy of agent {}", me.id),
            });
        }
        let ctx = Self { world, me, config };
        for bad in ctx.members().filter(|a| a.id != me.id && !is_sound(a)) {
            warn!(
                agent = %me.id,
                fellow = %bad.id,
                energy = bad.energy,
                pedal_force = bad.pedal_force,
                "skipping fellow with non-finite readings"
            );
        }
        Ok(ctx)
    }

    /// The committed world.
    pub const fn world(&self) -> &'a WorldSnapshot {
        self.world
    }

    /// The deciding agent.
    pub const fn me(&self) -> &'a AgentSnapshot {
        self.me
    }

    /// The decision tunables.
    pub const fn config(&self) -> &'a DecisionConfig {
        self.config
    }

    /// The bike the agent rides, if it exists in the snapshot.
    pub fn bike(&self) -> Option<&'a BikeSnapshot> {
        self.me.bike.and_then(|b| self.world.bike(b))
    }

    /// Where the agent's bike is.
    pub fn position(&self) -> Result<Coordinates, AgentError> {
        self.bike()
            .map(|b| b.position)
            .ok_or(AgentError::NotRiding(self.me.id))
    }

    /// Every bike member present in the snapshot.
    fn members(&self) -> impl Iterator<Item = &'a AgentSnapshot> + use<'a> {
        let world = self.world;
        self.bike()
            .into_iter()
            .flat_map(|b| b.members.iter())
            .filter_map(move |m| world.agent(*m))
    }

    /// Everyone on the agent's bike, the agent included.
    ///
    /// An agent without a bike is its own group of one. Fellows reporting a
    /// non-finite energy or pedal force are skipped.
    pub fn fellows(&self) -> Vec<&'a AgentSnapshot> {
        let me = self.me.id;
        let mut fellows: Vec<_> = self
            .members()
            .filter(|a| a.id == me || is_sound(a))
            .collect();
        if !fellows.iter().any(|f| f.id == self.me.id) {
            fellows.push(self.me);
            fellows.sort_by_key(|f| f.id);
        }
        fellows
    }

    /// Fellow riders other than the agent.
    pub fn peers(&self) -> Vec<&'a AgentSnapshot> {
        self.fellows()
            .into_iter()
            .filter(|f| f.id != self.me.id)
            .collect()
    }

    /// The population relevant to governance: fellow riders when on a bike,
    /// otherwise everyone. The agent itself is excluded.
    pub fn population(&self) -> Vec<&'a AgentSnapshot> {
        self.world
            .context_of(self.me.id)
            .into_iter()
            .filter(|a| a.id != self.me.id)
            .collect()
    }

    /// Highest point total among the agent's fellows.
    pub fn max_points_in_group(&self) -> u32 {
        self.fellows().iter().map(|f| f.points).max().unwrap_or(0)
    }

    /// The reachability model for the agent's bike, using the bike's
    /// reported mass when it has a usable one.
    pub fn reachability(&self) -> Reachability {
        let model = Reachability::new(
            &self.config.physics,
            self.fellows().len(),
            self.bike().map_or(0.0, |b| b.velocity),
        );
        match self.bike() {
            Some(bike) => model.with_mass(bike.mass),
            None => model,
        }
    }

    /// How far the agent can travel on its current energy.
    pub fn budget(&self) -> f64 {
        self.reachability().energy_to_reachable_distance(self.me.energy)
    }

    /// Compatibility of `other` from the agent's perspective.
    ///
    /// The agent's own opinion of itself counts as full.
    pub fn cube_score_of(&self, opinions: &OpinionStore, other: &AgentSnapshot) -> f64 {
        let opinion = if other.id == self.me.id {
            1.0
        } else {
            opinions.opinion_of(other.id)
        };
        cube_score(
            relative_points(other.points, self.me.points, self.max_points_in_group()),
            relative_energy(other.energy, self.me.energy),
            opinion,
        )
    }
}

/// Returns `true` if the readings other riders decide from are finite.
fn is_sound(agent: &AgentSnapshot) -> bool {
    agent.energy.is_finite() && agent.pedal_force.is_finite()
}
