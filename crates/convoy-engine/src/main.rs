//! Simulation binary for Convoy.
//!
//! Wires the round controller to a seeded world: loads configuration,
//! spawns the riders and runs rounds until the limit is reached or every
//! rider is exhausted.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `convoy-config.yaml` (or `CONVOY_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Seed the generator and spawn the population
//! 4. Build the world and the round state
//! 5. Run the simulation loop
//! 6. Log the result

mod callback;
mod error;
mod spawner;
mod world;

use std::path::PathBuf;

use convoy_core::config::{LoggingConfig, SimulationConfig};
use convoy_core::round::SimulationState;
use convoy_core::runner;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::callback::LoggingCallback;
use crate::error::EngineError;
use crate::world::ConvoyWorld;

/// Configuration file read when `CONVOY_CONFIG` is not set.
const DEFAULT_CONFIG_PATH: &str = "convoy-config.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, spawning or the simulation fails.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration. A missing file means defaults.
    let (config, source) = load_config()?;

    // 2. Initialize structured logging.
    init_logging(&config.logging)?;
    info!("convoy-engine starting");
    match &source {
        Some(path) => info!(path = %path.display(), "Configuration file loaded"),
        None => info!("Config file not found, using defaults"),
    }
    info!(
        world_name = config.world.name,
        seed = config.world.seed,
        max_rounds = config.world.max_rounds,
        bikes = config.population.bikes,
        riders_per_bike = config.population.riders_per_bike,
        loot_boxes = config.world.loot_boxes,
        "Configuration loaded"
    );

    // 3. Seed the generator and spawn the population.
    let mut rng = StdRng::seed_from_u64(config.world.seed);
    let population = spawner::spawn_population(&mut rng, &config)?;

    // 4. Build the world and the round state.
    let mut world = ConvoyWorld::new(
        config.world.clone(),
        config.physics.clone(),
        rng,
        population,
    );
    let mut state = SimulationState::new(config.decision_config());
    let mut callback = LoggingCallback::default();

    // 5. Run the simulation loop.
    let result = runner::run_simulation(
        &mut state,
        &mut world,
        config.world.max_rounds,
        &mut callback,
    )
    .map_err(EngineError::from)?;

    // 6. Log the result.
    runner::log_simulation_end(&result);
    info!(
        surviving_agents = world.agent_count(),
        total_points = world.total_points(),
        rounds_with_direction = callback.collected_rounds(),
        "convoy-engine shutdown complete"
    );

    Ok(())
}

/// Load the simulation config, falling back to defaults if the file is
/// missing.
fn load_config() -> Result<(SimulationConfig, Option<PathBuf>), EngineError> {
    let path = std::env::var_os("CONVOY_CONFIG")
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    if path.exists() {
        let config = SimulationConfig::from_file(&path)?;
        Ok((config, Some(path)))
    } else {
        Ok((SimulationConfig::default(), None))
    }
}

/// Install the tracing subscriber. `RUST_LOG` overrides the configured
/// level.
fn init_logging(logging: &LoggingConfig) -> Result<(), EngineError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let installed = if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
    };
    installed.map_err(|e| EngineError::Logging {
        message: e.to_string(),
    })
}
