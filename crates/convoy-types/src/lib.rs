//! Shared type definitions for the Convoy simulation.
//!
//! This crate is the single source of truth for the identifiers, enums and
//! read-only world snapshots that flow between the decision engine and its
//! collaborators (physics, world, messaging).
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for agents, bikes and loot boxes
//! - [`enums`] -- Colours, governance regimes and rider actions
//! - [`geometry`] -- Coordinates and the distance function
//! - [`structs`] -- Agent, bike, loot box and world snapshots
//! - [`messages`] -- Payloads exchanged between riders

pub mod enums;
pub mod geometry;
pub mod ids;
pub mod messages;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{BikerAction, Colour, Governance};
pub use geometry::Coordinates;
pub use ids::{AgentId, BikeId, LootBoxId};
pub use messages::{InboundMessage, Message};
pub use structs::{AgentSnapshot, BikeSnapshot, EnergySnapshot, LootBox, WorldSnapshot};
