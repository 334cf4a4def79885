//! The collective decision engine for the Convoy simulation.
//!
//! This crate holds everything an agent decides, with no I/O and no shared
//! mutable state. It sits between `convoy-types` (which defines the
//! snapshots it reads) and `convoy-core` (which orchestrates rounds).
//!
//! # Modules
//!
//! - [`allocation`] -- Helpful/selfish blend of collected energy
//! - [`biker`] -- A rider composing its opinion store and round memory ([`Biker`])
//! - [`config`] -- Decision tunables ([`DecisionConfig`])
//! - [`consensus`] -- Direction nomination and scored voting
//! - [`context`] -- The per-agent view of a round ([`DecisionContext`])
//! - [`error`] -- Error types for all decisions ([`AgentError`])
//! - [`governance`] -- Regime choice, ruler election and ruler decisions
//! - [`membership`] -- Bike choice and dictated kick-outs
//! - [`messages`] -- Message payload producers and handlers
//! - [`opinion`] -- Per-agent opinion store ([`OpinionStore`])
//! - [`physics`] -- Reachability simulation ([`Reachability`])
//! - [`view`] -- Read-only agent capability ([`AgentView`])
//! - [`voting`] -- Vote maps and plurality aggregation ([`VoteMap`])

pub mod allocation;
pub mod biker;
pub mod config;
pub mod consensus;
pub mod context;
pub mod error;
pub mod governance;
mod math;
pub mod membership;
pub mod messages;
pub mod opinion;
pub mod physics;
pub mod view;
pub mod voting;

// Re-export primary types at crate root for convenience.
pub use allocation::{decide_allocation, group_allocation, helpful_allocation, selfish_allocation};
pub use biker::{AllocationFeedback, Biker};
pub use config::{DecisionConfig, GovernanceConfig, MAX_BIKE_RIDERS, OpinionConfig, PhysicsConfig};
pub use consensus::{final_direction_vote, propose_direction};
pub use context::DecisionContext;
pub use error::AgentError;
pub use governance::{
    GovernanceInputs, decide_governance, decide_weights, dictate_direction, elect_ruler,
    follow_announcements, governance_inputs, group_governance, lead_direction, vote_ruler,
};
pub use membership::{choose_bike, colour_majority, dictate_kickout};
pub use messages::{MessageEffect, apply_message, is_verified, join_message};
pub use opinion::{
    Opinion, OpinionStore, cube_score, expected_contributions, objective_relative_success,
    selfishness_score,
};
pub use physics::Reachability;
pub use view::AgentView;
pub use voting::{NORMALISATION_TOLERANCE, VoteMap, winner_from_dist};
