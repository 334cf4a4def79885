//! Configuration loading and typed config structures for the Convoy simulation.
//!
//! The canonical configuration lives in `convoy-config.yaml` at the project
//! root. Every section is optional; a missing section or field takes the
//! documented default.

use std::path::Path;

use convoy_agents::{DecisionConfig, GovernanceConfig, MAX_BIKE_RIDERS, OpinionConfig, PhysicsConfig};
use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The configuration parsed but describes an impossible simulation.
    #[error("invalid config: {reason}")]
    Invalid {
        /// What is wrong with it.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

impl From<convoy_agents::AgentError> for ConfigError {
    fn from(source: convoy_agents::AgentError) -> Self {
        Self::Invalid {
            reason: source.to_string(),
        }
    }
}

/// Top-level simulation configuration.
///
/// Mirrors the structure of `convoy-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SimulationConfig {
    /// World-level settings (name, seed, size, loot).
    #[serde(default)]
    pub world: WorldConfig,

    /// How many bikes and riders to spawn.
    #[serde(default)]
    pub population: PopulationConfig,

    /// Opinion and governance tunables for every agent.
    #[serde(default)]
    pub agents: AgentsConfig,

    /// Step model shared by reachability and the world.
    #[serde(default)]
    pub physics: PhysicsConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SimulationConfig {
    /// Load and validate configuration from a YAML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// The tunables handed to every [`convoy_agents::Biker`].
    pub fn decision_config(&self) -> DecisionConfig {
        DecisionConfig {
            opinion: self.agents.opinion.clone(),
            governance: self.agents.governance.clone(),
            physics: self.physics.clone(),
        }
    }

    /// Reject configurations the simulation cannot run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let riders = usize::try_from(self.population.riders_per_bike).unwrap_or(usize::MAX);
        if riders == 0 || riders > MAX_BIKE_RIDERS {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "population.riders_per_bike must be between 1 and {MAX_BIKE_RIDERS}, got {riders}"
                ),
            });
        }
        let w = &self.world;
        for (name, value) in [
            ("world.width", w.width),
            ("world.height", w.height),
            ("world.loot_box_energy", w.loot_box_energy),
            ("world.collection_radius", w.collection_radius),
            ("world.resting_recovery", w.resting_recovery),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid {
                    reason: format!("{name} must be finite and non-negative, got {value}"),
                });
            }
        }
        if w.width <= 0.0 || w.height <= 0.0 {
            return Err(ConfigError::Invalid {
                reason: String::from("world.width and world.height must be positive"),
            });
        }
        self.decision_config().validate()?;
        Ok(())
    }
}

/// World-level configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WorldConfig {
    /// Human-readable simulation name.
    #[serde(default = "default_world_name")]
    pub name: String,

    /// Random seed for reproducibility.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Rounds to run before stopping.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u64,

    /// Width of the playing field.
    #[serde(default = "default_extent")]
    pub width: f64,

    /// Height of the playing field.
    #[serde(default = "default_extent")]
    pub height: f64,

    /// Loot boxes kept on the field at all times.
    #[serde(default = "default_loot_boxes")]
    pub loot_boxes: u32,

    /// Energy a loot box yields when collected.
    #[serde(default = "default_loot_box_energy")]
    pub loot_box_energy: f64,

    /// How close a bike must get to a box to collect it.
    #[serde(default = "default_collection_radius")]
    pub collection_radius: f64,

    /// Energy regained per round by agents without a bike.
    #[serde(default = "default_resting_recovery")]
    pub resting_recovery: f64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            name: default_world_name(),
            seed: default_seed(),
            max_rounds: default_max_rounds(),
            width: default_extent(),
            height: default_extent(),
            loot_boxes: default_loot_boxes(),
            loot_box_energy: default_loot_box_energy(),
            collection_radius: default_collection_radius(),
            resting_recovery: default_resting_recovery(),
        }
    }
}

/// Population configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PopulationConfig {
    /// Number of bikes at simulation start.
    #[serde(default = "default_bikes")]
    pub bikes: u32,

    /// Riders seated on each bike at simulation start.
    #[serde(default = "default_riders_per_bike")]
    pub riders_per_bike: u32,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            bikes: default_bikes(),
            riders_per_bike: default_riders_per_bike(),
        }
    }
}

/// Per-agent decision tunables.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AgentsConfig {
    /// Opinion model constants.
    #[serde(default)]
    pub opinion: OpinionConfig,

    /// Governance thresholds.
    #[serde(default)]
    pub governance: GovernanceConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_world_name() -> String {
    String::from("Convoy")
}

const fn default_seed() -> u64 {
    42
}

const fn default_max_rounds() -> u64 {
    100
}

const fn default_extent() -> f64 {
    200.0
}

const fn default_loot_boxes() -> u32 {
    12
}

const fn default_loot_box_energy() -> f64 {
    1.5
}

const fn default_collection_radius() -> f64 {
    5.0
}

const fn default_resting_recovery() -> f64 {
    0.05
}

const fn default_bikes() -> u32 {
    3
}

const fn default_riders_per_bike() -> u32 {
    4
}

fn default_log_level() -> String {
    String::from("info")
}
