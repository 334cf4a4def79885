//! Producing and consuming the four message payloads.
//!
//! Addressing and delivery belong to the messaging collaborator. This
//! module only turns decisions into payloads and applies the payloads an
//! agent received to its opinion store.
//!
//! A sender is *verified* when it rides the recipient's bike and the
//! recipient trusts it above the trust threshold.

use convoy_types::{AgentId, BikeId, Governance, InboundMessage, Message, WorldSnapshot};
use tracing::{debug, warn};

use crate::context::DecisionContext;
use crate::error::AgentError;
use crate::opinion::{NEUTRAL, OpinionStore};

/// What applying a message changed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MessageEffect {
    /// The message was not believed or changed nothing.
    Ignored,
    /// A composite opinion was recomputed.
    OpinionAdjusted {
        /// Whose opinion changed.
        subject: AgentId,
        /// The new composite opinion.
        opinion: f64,
    },
    /// A record now exists for a would-be joiner.
    PeerRecorded(AgentId),
    /// A fellow rider announced its preferred regime.
    GovernancePreference {
        /// The announcing rider.
        sender: AgentId,
        /// Its preferred regime.
        governance: Governance,
    },
}

/// Returns `true` if `sender` shares `recipient`'s bike and is trusted.
pub fn is_verified(
    opinions: &OpinionStore,
    world: &WorldSnapshot,
    recipient: AgentId,
    sender: AgentId,
) -> bool {
    let bike_of = |id| world.agent(id).and_then(|a| a.bike);
    let same_bike = matches!((bike_of(recipient), bike_of(sender)), (Some(a), Some(b)) if a == b);
    same_bike && opinions.is_trusted(sender)
}

/// Apply one delivered message to the recipient's opinion store.
pub fn apply_message(
    opinions: &mut OpinionStore,
    world: &WorldSnapshot,
    inbound: &InboundMessage,
) -> Result<MessageEffect, AgentError> {
    let InboundMessage {
        sender,
        recipient,
        message,
    } = inbound;
    let verified = is_verified(opinions, world, *recipient, *sender);
    let effect = match message {
        Message::ReputationShare {
            subject,
            multiplier,
        } => {
            if !verified {
                MessageEffect::Ignored
            } else if *multiplier < 0.0 {
                warn!(sender = %sender, multiplier, "ignoring negative reputation multiplier");
                MessageEffect::Ignored
            } else {
                let opinion = opinions.apply_signal(*subject, *multiplier)?;
                MessageEffect::OpinionAdjusted {
                    subject: *subject,
                    opinion,
                }
            }
        }
        Message::KickOff { kick, .. } => {
            if verified && *kick {
                let penalty = opinions.config().kick_off_penalty;
                let opinion = opinions.apply_signal(*sender, penalty)?;
                MessageEffect::OpinionAdjusted {
                    subject: *sender,
                    opinion,
                }
            } else {
                MessageEffect::Ignored
            }
        }
        Message::Join { .. } => {
            if opinions.is_trusted(*sender) {
                opinions.ensure(*sender);
                MessageEffect::PeerRecorded(*sender)
            } else {
                MessageEffect::Ignored
            }
        }
        Message::Governance { governance, .. } => {
            if verified {
                MessageEffect::GovernancePreference {
                    sender: *sender,
                    governance: *governance,
                }
            } else {
                MessageEffect::Ignored
            }
        }
    };
    debug!(recipient = %recipient, sender = %sender, effect = ?effect, "applied message");
    Ok(effect)
}

/// One reputation share per fellow rider.
///
/// The multiplier is centred on 1.0 and moves by `reputation_share_weight`
/// for every unit our opinion sits above or below neutral.
pub fn reputation_shares(ctx: &DecisionContext<'_>, opinions: &OpinionStore) -> Vec<Message> {
    let weight = opinions.config().reputation_share_weight;
    ctx.peers()
        .iter()
        .map(|peer| Message::ReputationShare {
            subject: peer.id,
            multiplier: (opinions.opinion_of(peer.id) - NEUTRAL).mul_add(weight, 1.0),
        })
        .collect()
}

/// A kick-off request for the least liked fellow rider, if any is below
/// the kick threshold.
pub fn kick_off_message(ctx: &DecisionContext<'_>, opinions: &OpinionStore) -> Option<Message> {
    opinions
        .kick_candidate(ctx.peers().iter().map(|p| p.id))
        .map(|subject| Message::KickOff {
            subject,
            kick: true,
        })
}

/// Announce a preferred regime for the agent's bike.
pub fn governance_message(ctx: &DecisionContext<'_>, governance: Governance) -> Option<Message> {
    ctx.me().bike.map(|bike| Message::Governance { bike, governance })
}

/// Announce the intent to join `bike`.
pub const fn join_message(bike: BikeId) -> Message {
    Message::Join { bike }
}
