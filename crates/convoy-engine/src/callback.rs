//! Round callback that reports each round through tracing.
//!
//! Every bike's decision is logged at `info`. When `debug` is enabled the
//! whole [`RoundSummary`] is also emitted as one JSON line so a run can be
//! replayed or inspected offline.

use convoy_core::round::{RoundSummary, SimulationState};
use convoy_core::runner::RoundCallback;
use tracing::{Level, debug, info, warn};

/// Callback that logs every completed round.
#[derive(Debug, Default)]
pub struct LoggingCallback {
    collected_rounds: u64,
}

impl LoggingCallback {
    /// Rounds in which at least one bike was heading somewhere.
    pub const fn collected_rounds(&self) -> u64 {
        self.collected_rounds
    }
}

impl RoundCallback for LoggingCallback {
    fn on_round(&mut self, summary: &RoundSummary, state: &SimulationState) {
        for decision in summary.bikes.values() {
            info!(
                round = summary.round,
                bike = %decision.bike,
                governance = ?decision.governance,
                ruler = ?decision.ruler,
                direction = ?decision.direction,
                riders = decision.allocation.len(),
                kicked = decision.kicked.len(),
                accepted = decision.accepted.len(),
                "Bike decided"
            );
        }
        if summary.bikes.values().any(|d| d.direction.is_some()) {
            self.collected_rounds = self.collected_rounds.saturating_add(1);
        }

        let opinions: usize = state.bikers.values().map(|b| b.opinions().len()).sum();
        info!(
            round = summary.round,
            bikers = state.bikers.len(),
            opinions,
            messages = summary.messages.len(),
            "Round completed"
        );

        if tracing::enabled!(Level::DEBUG) {
            match serde_json::to_string(summary) {
                Ok(line) => debug!(round = summary.round, summary = %line, "Round summary"),
                Err(e) => warn!(round = summary.round, error = %e, "Failed to serialise round summary"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use convoy_agents::DecisionConfig;

    use super::*;

    #[test]
    fn counts_rounds_with_a_direction() {
        let state = SimulationState::new(DecisionConfig::default());
        let mut callback = LoggingCallback::default();
        callback.on_round(&RoundSummary::default(), &state);
        assert_eq!(callback.collected_rounds(), 0);
    }
}
