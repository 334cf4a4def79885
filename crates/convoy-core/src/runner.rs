//! Bounded simulation loop.
//!
//! [`run_simulation`] drives [`run_round`](crate::round::run_round) until
//! the round limit is reached or the world has no agents left, invoking a
//! [`RoundCallback`] after every round.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::environment::Environment;
use crate::round::{self, RoundError, RoundSummary, SimulationState};

/// Errors that can occur during the simulation run.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// A round failed.
    #[error("round error: {source}")]
    Round {
        /// The underlying round error.
        #[from]
        source: RoundError,
    },
}

/// Why a simulation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimulationEndReason {
    /// The configured number of rounds ran.
    MaxRoundsReached,
    /// The world had no agents left.
    Depopulated,
}

/// Result of the simulation run.
#[derive(Debug)]
pub struct SimulationResult {
    /// The reason the simulation ended.
    pub end_reason: SimulationEndReason,
    /// The last round summary, if any round completed.
    pub final_summary: Option<RoundSummary>,
    /// Total number of rounds executed.
    pub total_rounds: u64,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
}

/// Callback invoked after each round completes.
pub trait RoundCallback {
    /// Called after a round completes successfully.
    fn on_round(&mut self, summary: &RoundSummary, state: &SimulationState);
}

/// A no-op round callback.
pub struct NoOpCallback;

impl RoundCallback for NoOpCallback {
    fn on_round(&mut self, _summary: &RoundSummary, _state: &SimulationState) {}
}

/// Run rounds until `max_rounds` have run or the world empties.
///
/// # Errors
///
/// Returns [`RunnerError`] if a round fails.
pub fn run_simulation(
    state: &mut SimulationState,
    environment: &mut dyn Environment,
    max_rounds: u64,
    callback: &mut dyn RoundCallback,
) -> Result<SimulationResult, RunnerError> {
    let started_at = Utc::now();
    let mut final_summary: Option<RoundSummary> = None;
    let mut total_rounds: u64 = 0;

    info!(max_rounds, "Simulation starting");

    let end_reason = loop {
        if total_rounds >= max_rounds {
            info!(total_rounds, max_rounds, "Round limit reached");
            break SimulationEndReason::MaxRoundsReached;
        }
        if environment.snapshot().agents.is_empty() {
            info!(total_rounds, "No agents left");
            break SimulationEndReason::Depopulated;
        }

        let summary = round::run_round(state, environment)?;
        total_rounds = total_rounds.saturating_add(1);
        callback.on_round(&summary, state);
        final_summary = Some(summary);
    };

    Ok(SimulationResult {
        end_reason,
        final_summary,
        total_rounds,
        started_at,
        finished_at: Utc::now(),
    })
}

/// Log the simulation end.
pub fn log_simulation_end(result: &SimulationResult) {
    let elapsed_ms = result
        .finished_at
        .signed_duration_since(result.started_at)
        .num_milliseconds();
    info!(
        reason = ?result.end_reason,
        total_rounds = result.total_rounds,
        final_round = result.final_summary.as_ref().map(|s| s.round),
        elapsed_ms,
        "Simulation ended"
    );
}
