//! The seam between the round controller and the world.
//!
//! Physics, loot spawning, message delivery and bike membership are all
//! owned by the world. The controller only ever sees a committed
//! [`WorldSnapshot`] and hands back a [`RoundSummary`]; the world answers
//! with a [`RoundOutcome`] describing what it did with those decisions.
//!
//! [`ScriptedEnvironment`] replays fixed snapshots so the round controller
//! can be exercised end-to-end in tests.

use std::collections::BTreeMap;

use convoy_agents::AllocationFeedback;
use convoy_types::{AgentId, BikeId, InboundMessage, WorldSnapshot};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::round::RoundSummary;

/// Errors a world can report when applying a round.
#[derive(Debug, thiserror::Error)]
pub enum EnvironmentError {
    /// The summary was computed for a different round than the world is in.
    #[error("summary is for round {actual}, world is at round {expected}")]
    RoundMismatch {
        /// The round the world expected.
        expected: u64,
        /// The round the summary carries.
        actual: u64,
    },

    /// A scripted environment was built without any frames.
    #[error("scripted environment needs at least one frame")]
    NoFrames,
}

/// What the world did with one round's decisions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoundOutcome {
    /// Energy actually handed out on each bike.
    pub feedback: BTreeMap<BikeId, AllocationFeedback>,
    /// Payloads delivered, one entry per recipient.
    pub delivered: Vec<InboundMessage>,
    /// Riders asking to join each bike next round.
    pub applicants: BTreeMap<BikeId, Vec<AgentId>>,
}

/// A world the round controller can drive.
pub trait Environment {
    /// The committed state of the current round.
    fn snapshot(&self) -> WorldSnapshot;

    /// Apply the round's decisions and advance to the next round.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironmentError`] if the summary cannot be applied.
    fn apply(&mut self, summary: &RoundSummary) -> Result<RoundOutcome, EnvironmentError>;
}

/// Replays a fixed list of snapshots, one per round.
///
/// After the last frame the world stays on that frame. Outcomes are taken
/// from the scripted list in the same order, defaulting to an empty
/// outcome. Every applied summary is kept for inspection.
#[derive(Debug, Clone)]
pub struct ScriptedEnvironment {
    frames: Vec<WorldSnapshot>,
    outcomes: Vec<RoundOutcome>,
    cursor: usize,
    applied: Vec<RoundSummary>,
}

impl ScriptedEnvironment {
    /// Create an environment replaying `frames`.
    pub fn new(frames: Vec<WorldSnapshot>) -> Result<Self, EnvironmentError> {
        if frames.is_empty() {
            return Err(EnvironmentError::NoFrames);
        }
        Ok(Self {
            frames,
            outcomes: Vec::new(),
            cursor: 0,
            applied: Vec::new(),
        })
    }

    /// Script the outcome returned after each round.
    #[must_use]
    pub fn with_outcomes(mut self, outcomes: Vec<RoundOutcome>) -> Self {
        self.outcomes = outcomes;
        self
    }

    /// Every summary applied so far.
    pub fn applied(&self) -> &[RoundSummary] {
        &self.applied
    }

    fn current(&self) -> Option<&WorldSnapshot> {
        self.frames.get(self.cursor).or_else(|| self.frames.last())
    }
}

impl Environment for ScriptedEnvironment {
    fn snapshot(&self) -> WorldSnapshot {
        self.current().cloned().unwrap_or_default()
    }

    fn apply(&mut self, summary: &RoundSummary) -> Result<RoundOutcome, EnvironmentError> {
        let expected = self.current().map_or(0, |f| f.round);
        if summary.round != expected {
            return Err(EnvironmentError::RoundMismatch {
                expected,
                actual: summary.round,
            });
        }
        let outcome = self.outcomes.get(self.cursor).cloned().unwrap_or_default();
        self.applied.push(summary.clone());
        let last = self.frames.len().saturating_sub(1);
        self.cursor = self.cursor.saturating_add(1).min(last);
        debug!(round = summary.round, frame = self.cursor, "scripted round applied");
        Ok(outcome)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn frame(round: u64) -> WorldSnapshot {
        WorldSnapshot {
            round,
            ..WorldSnapshot::default()
        }
    }

    fn summary(round: u64) -> RoundSummary {
        RoundSummary {
            round,
            ..RoundSummary::default()
        }
    }

    #[test]
    fn empty_script_is_rejected() {
        assert!(matches!(
            ScriptedEnvironment::new(Vec::new()),
            Err(EnvironmentError::NoFrames)
        ));
    }

    #[test]
    fn frames_advance_and_stick_on_last() {
        let mut env = ScriptedEnvironment::new(vec![frame(0), frame(1)]).unwrap();
        assert_eq!(env.snapshot().round, 0);
        env.apply(&summary(0)).unwrap();
        assert_eq!(env.snapshot().round, 1);
        env.apply(&summary(1)).unwrap();
        assert_eq!(env.snapshot().round, 1);
        assert_eq!(env.applied().len(), 2);
    }

    #[test]
    fn mismatched_round_is_rejected() {
        let mut env = ScriptedEnvironment::new(vec![frame(3)]).unwrap();
        let result = env.apply(&summary(4));
        assert!(matches!(
            result,
            Err(EnvironmentError::RoundMismatch {
                expected: 3,
                actual: 4
            })
        ));
        assert!(env.applied().is_empty());
    }

    #[test]
    fn scripted_outcomes_are_returned_in_order() {
        let bike = BikeId::new();
        let scripted = RoundOutcome {
            feedback: BTreeMap::from([(bike, AllocationFeedback::default())]),
            ..RoundOutcome::default()
        };
        let mut env = ScriptedEnvironment::new(vec![frame(0), frame(1)])
            .unwrap()
            .with_outcomes(vec![scripted.clone()]);
        assert_eq!(env.apply(&summary(0)).unwrap(), scripted);
        assert_eq!(env.apply(&summary(1)).unwrap(), RoundOutcome::default());
    }
}
