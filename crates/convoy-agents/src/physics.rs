//! Reachability: how far a bike can travel on a given amount of energy.
//!
//! Both directions share one discrete step model. Each rider pedals with a
//! constant force proportional to the energy it started with:
//!
//! ```text
//! force        = max_force * initial_energy          (per rider)
//! acceleration = (force * riders - drag * v^2) / mass
//! distance    += v + acceleration / 2
//! energy      -= force * moving_depletion
//! ```
//!
//! The mass defaults to `mass_bike + riders * mass_biker`; a bike's reported
//! mass replaces it through [`Reachability::with_mass`].
//!
//! Because the force is held constant, [`Reachability::distance_to_energy`]
//! inverts [`Reachability::energy_to_reachable_distance`] up to a single
//! step of depletion. Every loop is bounded by `max_simulation_steps`, so a
//! zero depletion rate still terminates.

use crate::config::PhysicsConfig;
use crate::math::count_f64;

/// Energy at or below this level counts as exhausted.
const EXHAUSTED: f64 = 1e-9;

/// The reachability model for one bike at its current velocity.
#[derive(Debug, Clone, PartialEq)]
pub struct Reachability {
    physics: PhysicsConfig,
    riders: f64,
    velocity: f64,
    mass: f64,
}

impl Reachability {
    /// Build the model for a bike with `riders` riders moving at `velocity`.
    ///
    /// A rider count of zero is treated as one: the deciding agent always
    /// pedals for itself. A non-finite or negative velocity is treated as 0.
    pub fn new(physics: &PhysicsConfig, riders: usize, velocity: f64) -> Self {
        let velocity = if velocity.is_finite() { velocity.max(0.0) } else { 0.0 };
        let riders = count_f64(riders.max(1));
        Self {
            physics: physics.clone(),
            riders,
            velocity,
            mass: riders.mul_add(physics.mass_biker, physics.mass_bike),
        }
    }

    /// Use a measured total mass instead of the configured estimate.
    ///
    /// A non-finite or non-positive mass keeps the estimate.
    #[must_use]
    pub fn with_mass(mut self, mass: f64) -> Self {
        if mass.is_finite() && mass > 0.0 {
            self.mass = mass;
        }
        self
    }

    /// The total mass being moved.
    pub const fn mass(&self) -> f64 {
        self.mass
    }

    /// Per-rider pedal force for an agent starting with `energy`.
    pub fn pedal_force(&self, energy: f64) -> f64 {
        self.physics.max_force * energy.clamp(0.0, 1.0)
    }

    /// Distance covered in one step with every rider pedalling `force`.
    fn step_distance(&self, force: f64) -> f64 {
        if self.mass <= 0.0 {
            return self.velocity;
        }
        let drag = self.physics.drag * self.velocity * self.velocity;
        let acceleration = force.mul_add(self.riders, -drag) / self.mass;
        acceleration.mul_add(0.5, self.velocity).max(0.0)
    }

    /// Total distance coverable before `energy` runs out.
    ///
    /// Zero, negative or non-finite energy reaches nothing; so does a zero
    /// pedal force.
    pub fn energy_to_reachable_distance(&self, energy: f64) -> f64 {
        if !energy.is_finite() || energy <= 0.0 {
            return 0.0;
        }
        let force = self.pedal_force(energy);
        if force <= 0.0 {
            return 0.0;
        }
        let per_step = self.step_distance(force);
        let depletion = force * self.physics.moving_depletion;
        let mut remaining = energy;
        let mut distance = 0.0;
        let mut steps = 0_u32;
        while remaining > EXHAUSTED && steps < self.physics.max_simulation_steps {
            distance += per_step;
            remaining -= depletion;
            steps = steps.saturating_add(1);
        }
        distance
    }

    /// Energy left after travelling `distance` from `initial_energy`.
    ///
    /// A zero, negative or non-finite distance costs nothing. If the
    /// distance cannot be covered the result is 0.
    pub fn distance_to_energy(&self, distance: f64, initial_energy: f64) -> f64 {
        if !initial_energy.is_finite() || initial_energy <= 0.0 {
            return 0.0;
        }
        if !distance.is_finite() || distance <= 0.0 {
            return initial_energy;
        }
        let force = self.pedal_force(initial_energy);
        if force <= 0.0 {
            return 0.0;
        }
        let per_step = self.step_distance(force);
        let depletion = force * self.physics.moving_depletion;
        let mut remaining = initial_energy;
        let mut travelled = 0.0;
        let mut steps = 0_u32;
        while travelled < distance && remaining > EXHAUSTED && steps < self.physics.max_simulation_steps {
            travelled += per_step;
            remaining -= depletion;
            steps = steps.saturating_add(1);
        }
        if travelled < distance {
            return 0.0;
        }
        remaining.max(0.0)
    }

    /// Fraction of `initial_energy` still held after travelling `distance`.
    pub fn retained_fraction(&self, distance: f64, initial_energy: f64) -> f64 {
        if !initial_energy.is_finite() || initial_energy <= 0.0 {
            return 0.0;
        }
        (self.distance_to_energy(distance, initial_energy) / initial_energy).clamp(0.0, 1.0)
    }

    /// Returns `true` if `distance` can be covered starting from `energy`.
    pub fn can_reach(&self, distance: f64, energy: f64) -> bool {
        distance <= self.energy_to_reachable_distance(energy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(riders: usize, velocity: f64) -> Reachability {
        Reachability::new(&PhysicsConfig::default(), riders, velocity)
    }

    #[test]
    fn zero_energy_reaches_nothing() {
        let reach = model(2, 1.0);
        assert!(reach.energy_to_reachable_distance(0.0).abs() < f64::EPSILON);
        assert!(reach.energy_to_reachable_distance(-0.3).abs() < f64::EPSILON);
        assert!(reach.energy_to_reachable_distance(f64::NAN).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_distance_costs_nothing() {
        let reach = model(2, 1.0);
        assert!((reach.distance_to_energy(0.0, 0.6) - 0.6).abs() < f64::EPSILON);
        assert!((reach.distance_to_energy(-5.0, 0.6) - 0.6).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_force_terminates() {
        let physics = PhysicsConfig {
            max_force: 0.0,
            ..PhysicsConfig::default()
        };
        let reach = Reachability::new(&physics, 3, 0.0);
        assert!(reach.energy_to_reachable_distance(1.0).abs() < f64::EPSILON);
        assert!(reach.distance_to_energy(10.0, 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_depletion_is_bounded() {
        let physics = PhysicsConfig {
            moving_depletion: 0.0,
            max_simulation_steps: 50,
            ..PhysicsConfig::default()
        };
        let reach = Reachability::new(&physics, 1, 0.0);
        let distance = reach.energy_to_reachable_distance(1.0);
        assert!(distance.is_finite());
        assert!(distance > 0.0);
    }

    #[test]
    fn distance_is_monotonic_in_energy() {
        let reach = model(3, 1.5);
        let mut last = 0.0;
        for step in 1..=10 {
            let energy = f64::from(step) / 10.0;
            let distance = reach.energy_to_reachable_distance(energy);
            assert!(distance >= last);
            last = distance;
        }
    }

    #[test]
    fn remaining_energy_is_monotonic_in_distance() {
        let reach = model(2, 1.0);
        let mut last = 1.0;
        for step in 0..20 {
            let remaining = reach.distance_to_energy(f64::from(step) * 10.0, 1.0);
            assert!(remaining <= last);
            last = remaining;
        }
    }

    #[test]
    fn unreachable_distance_leaves_nothing() {
        let reach = model(1, 0.0);
        let budget = reach.energy_to_reachable_distance(0.5);
        assert!(reach.distance_to_energy(budget * 2.0, 0.5).abs() < f64::EPSILON);
        assert!(reach.can_reach(budget, 0.5));
        assert!(!reach.can_reach(budget * 2.0, 0.5));
    }

    #[test]
    fn heavier_bike_reaches_less() {
        let light = model(2, 0.0);
        let heavy = model(2, 0.0).with_mass(light.mass() * 4.0);
        assert!(heavy.energy_to_reachable_distance(0.8) < light.energy_to_reachable_distance(0.8));
    }

    #[test]
    fn unusable_mass_keeps_estimate() {
        let estimate = model(3, 1.0);
        assert!((estimate.clone().with_mass(f64::NAN).mass() - estimate.mass()).abs() < f64::EPSILON);
        assert!((estimate.clone().with_mass(0.0).mass() - estimate.mass()).abs() < f64::EPSILON);
        assert!((estimate.clone().with_mass(-2.0).mass() - estimate.mass()).abs() < f64::EPSILON);
    }

    #[test]
    fn retained_fraction_halfway() {
        let reach = model(2, 1.0);
        let budget = reach.energy_to_reachable_distance(0.8);
        let fraction = reach.retained_fraction(budget / 2.0, 0.8);
        assert!((fraction - 0.5).abs() < 0.05);
    }
}
