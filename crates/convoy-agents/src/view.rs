//! Read-only capability interface over an agent.
//!
//! Decision code never needs more than an agent's identity, colour, energy,
//! points and bike. Anything that can answer these questions can take part
//! in a decision, whatever strategy it runs.

use convoy_types::{AgentId, AgentSnapshot, BikeId, Colour};

/// The observable attributes of an agent.
pub trait AgentView {
    /// The agent's identifier.
    fn id(&self) -> AgentId;
    /// The agent's colour.
    fn colour(&self) -> Colour;
    /// Energy level in `[0, 1]`.
    fn energy(&self) -> f64;
    /// Cumulative points.
    fn points(&self) -> u32;
    /// The bike the agent rides, if any.
    fn bike(&self) -> Option<BikeId>;

    /// Energy still missing to a full tank, clamped to `[0, 1]`.
    fn energy_need(&self) -> f64 {
        1.0 - self.energy().clamp(0.0, 1.0)
    }
}

impl AgentView for AgentSnapshot {
    fn id(&self) -> AgentId {
        self.id
    }

    fn colour(&self) -> Colour {
        self.colour
    }

    fn energy(&self) -> f64 {
        self.energy
    }

    fn points(&self) -> u32 {
        self.points
    }

    fn bike(&self) -> Option<BikeId> {
        self.bike
    }
}

impl<T: AgentView + ?Sized> AgentView for &T {
    fn id(&self) -> AgentId {
        (**self).id()
    }

    fn colour(&self) -> Colour {
        (**self).colour()
    }

    fn energy(&self) -> f64 {
        (**self).energy()
    }

    fn points(&self) -> u32 {
        (**self).points()
    }

    fn bike(&self) -> Option<BikeId> {
        (**self).bike()
    }
}
