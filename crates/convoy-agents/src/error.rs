//! Error types for the convoy-agents crate.
//!
//! Degenerate inputs (empty groups, zero need, zero points) are not errors:
//! they have defined fallback values. The variants here cover caller-contract
//! violations and numeric results that must never propagate.

use convoy_types::{AgentId, LootBoxId};

/// Errors that can occur while an agent makes a decision.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AgentError {
    /// The deciding agent or a referenced peer is not in the world snapshot.
    #[error("agent not found in snapshot: {0}")]
    UnknownAgent(AgentId),

    /// A referenced loot box is not in the world snapshot.
    #[error("loot box not found in snapshot: {0}")]
    UnknownLootBox(LootBoxId),

    /// The agent is not riding a bike, so it has no position to decide from.
    #[error("agent {0} is not riding a bike")]
    NotRiding(AgentId),

    /// The world holds no loot boxes to travel to.
    #[error("no loot boxes in the world")]
    NoTargets,

    /// A vote or aggregation was requested over an empty candidate set.
    #[error("no candidates to vote on")]
    NoCandidates,

    /// A computation produced or received a NaN or infinite value.
    #[error("non-finite value in {context}")]
    NonFinite {
        /// Description of what was being computed.
        context: String,
    },

    /// A tunable is outside its valid range.
    #[error("invalid decision config: {reason}")]
    InvalidConfig {
        /// Description of the offending tunable.
        reason: String,
    },
}

/// Reject a non-finite value, naming the computation it came from.
pub(crate) fn ensure_finite(value: f64, context: &str) -> Result<f64, AgentError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(AgentError::NonFinite {
            context: String::from(context),
        })
    }
}
