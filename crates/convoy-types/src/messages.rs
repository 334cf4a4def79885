//! Message payloads exchanged between riders.
//!
//! The decision engine produces and consumes these payloads; wrapping them
//! in envelopes, choosing recipients and delivering them is the messaging
//! collaborator's job.

use serde::{Deserialize, Serialize};

use crate::enums::Governance;
use crate::ids::{AgentId, BikeId};

/// A payload one rider sends to others.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// The sender's view of a third agent, expressed as an opinion multiplier.
    ReputationShare {
        /// The agent being described.
        subject: AgentId,
        /// Multiplier the recipient should apply to its composite opinion.
        multiplier: f64,
    },
    /// The sender's intent to have a rider removed from the bike.
    KickOff {
        /// The rider the sender wants removed.
        subject: AgentId,
        /// Whether the sender actually wants the removal.
        kick: bool,
    },
    /// The sender's intent to join a bike.
    Join {
        /// The bike the sender wants to join.
        bike: BikeId,
    },
    /// The sender's preferred regime for a bike.
    Governance {
        /// The bike the preference applies to.
        bike: BikeId,
        /// The preferred regime.
        governance: Governance,
    },
}

/// A payload as delivered to one recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Who sent the payload.
    pub sender: AgentId,
    /// Who received it.
    pub recipient: AgentId,
    /// The payload itself.
    pub message: Message,
}
