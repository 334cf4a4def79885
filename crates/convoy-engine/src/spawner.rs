//! Population and loot spawner for seeding the world.
//!
//! At simulation start the spawner creates the configured number of bikes,
//! seats a full crew of riders with random colours on each one and scatters
//! the bikes across the field. Loot boxes are spawned here too, both at
//! start and whenever a collected box is replaced.
//!
//! Every identifier is drawn from the caller's generator, so a fixed seed
//! reproduces the same world.

use std::collections::BTreeMap;

use convoy_agents::MAX_BIKE_RIDERS;
use convoy_core::config::{SimulationConfig, WorldConfig};
use convoy_types::{
    AgentId, AgentSnapshot, BikeId, BikeSnapshot, Colour, Coordinates, LootBox, LootBoxId,
};
use rand::Rng;
use tracing::{debug, info};

use crate::error::EngineError;

/// The riders and bikes the world starts with.
#[derive(Debug, Default)]
pub struct Population {
    /// Every rider keyed by id.
    pub agents: BTreeMap<AgentId, AgentSnapshot>,
    /// Every bike keyed by id.
    pub bikes: BTreeMap<BikeId, BikeSnapshot>,
}

// -----------------------------------------------------------------------
// Population
// -----------------------------------------------------------------------

/// Spawn the starting population described by `config`.
///
/// # Errors
///
/// Returns [`EngineError::Spawner`] if a bike would carry more riders than
/// it has seats.
pub fn spawn_population(
    rng: &mut impl Rng,
    config: &SimulationConfig,
) -> Result<Population, EngineError> {
    let riders = usize::try_from(config.population.riders_per_bike).unwrap_or(usize::MAX);
    if riders > MAX_BIKE_RIDERS {
        return Err(EngineError::Spawner {
            message: format!("{riders} riders per bike exceeds the {MAX_BIKE_RIDERS} seats"),
        });
    }

    let mut population = Population::default();
    let mass = f64::from(config.population.riders_per_bike)
        .mul_add(config.physics.mass_biker, config.physics.mass_bike);

    for _ in 0..config.population.bikes {
        let bike_id = BikeId::from_random_bytes(rng.random());
        let mut members = Vec::with_capacity(riders);
        for _ in 0..riders {
            let agent = AgentSnapshot {
                id: AgentId::from_random_bytes(rng.random()),
                colour: random_colour(rng)?,
                energy: 1.0,
                points: 0,
                bike: Some(bike_id),
                pedal_force: 0.0,
                last_target: None,
            };
            debug!(agent_id = %agent.id, colour = ?agent.colour, bike = %bike_id, "Rider spawned");
            members.push(agent.id);
            population.agents.insert(agent.id, agent);
        }
        population.bikes.insert(
            bike_id,
            BikeSnapshot {
                id: bike_id,
                members,
                position: random_position(rng, &config.world),
                velocity: 0.0,
                mass,
                orientation: 0.0,
                acceleration: 0.0,
            },
        );
    }

    info!(
        bikes = population.bikes.len(),
        riders = population.agents.len(),
        "Population spawned"
    );
    Ok(population)
}

// -----------------------------------------------------------------------
// Loot
// -----------------------------------------------------------------------

/// Spawn one loot box at a random position with a random colour.
///
/// # Errors
///
/// Returns [`EngineError::Spawner`] if no colour could be drawn.
pub fn spawn_loot_box(rng: &mut impl Rng, world: &WorldConfig) -> Result<LootBox, EngineError> {
    Ok(LootBox {
        id: LootBoxId::from_random_bytes(rng.random()),
        colour: random_colour(rng)?,
        position: random_position(rng, world),
        energy: world.loot_box_energy,
    })
}

fn random_colour(rng: &mut impl Rng) -> Result<Colour, EngineError> {
    let idx = rng.random_range(0..Colour::ALL.len());
    Colour::ALL
        .get(idx)
        .copied()
        .ok_or_else(|| EngineError::Spawner {
            message: String::from("failed to select random colour"),
        })
}

/// A uniform point on the field. A degenerate field collapses to the origin.
fn random_position(rng: &mut impl Rng, world: &WorldConfig) -> Coordinates {
    let x: f64 = rng.random();
    let y: f64 = rng.random();
    Coordinates::new(x * world.width.max(0.0), y * world.height.max(0.0))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn spawns_full_crews() {
        let mut rng = StdRng::seed_from_u64(42);
        let config = SimulationConfig::default();
        let population = spawn_population(&mut rng, &config).unwrap();

        assert_eq!(population.bikes.len(), 3);
        assert_eq!(population.agents.len(), 12);
        for bike in population.bikes.values() {
            assert_eq!(bike.members.len(), 4);
            for member in &bike.members {
                assert_eq!(population.agents[member].bike, Some(bike.id));
            }
            assert!(bike.position.x >= 0.0 && bike.position.x < config.world.width);
            assert!(bike.position.y >= 0.0 && bike.position.y < config.world.height);
        }
    }

    #[test]
    fn same_seed_same_world() {
        let config = SimulationConfig::default();
        let a = spawn_population(&mut StdRng::seed_from_u64(7), &config).unwrap();
        let b = spawn_population(&mut StdRng::seed_from_u64(7), &config).unwrap();
        assert_eq!(a.agents, b.agents);
        assert_eq!(a.bikes, b.bikes);
    }

    #[test]
    fn oversized_crews_are_rejected() {
        let mut config = SimulationConfig::default();
        config.population.riders_per_bike = 9;
        let result = spawn_population(&mut StdRng::seed_from_u64(1), &config);
        assert!(matches!(result, Err(EngineError::Spawner { .. })));
    }

    #[test]
    fn loot_lands_on_the_field() {
        let mut rng = StdRng::seed_from_u64(3);
        let world = WorldConfig::default();
        for _ in 0..20 {
            let loot = spawn_loot_box(&mut rng, &world).unwrap();
            assert!(loot.position.x >= 0.0 && loot.position.x < world.width);
            assert!((loot.energy - world.loot_box_energy).abs() < f64::EPSILON);
        }
    }
}
