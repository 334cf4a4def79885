//! Tunables for the decision engine.
//!
//! Every section deserialises with `#[serde(default)]` so a YAML file only
//! needs to name the values it changes. Defaults reproduce the reference
//! constants of the opinion model and governance thresholds.

use serde::{Deserialize, Serialize};

use crate::error::AgentError;

/// Maximum number of riders a bike can carry.
pub const MAX_BIKE_RIDERS: usize = 8;

// ---------------------------------------------------------------------------
// OpinionConfig
// ---------------------------------------------------------------------------

/// Constants of the opinion model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpinionConfig {
    /// Trust added when a peer steered towards the decided target.
    pub trust_gain: f64,
    /// Trust removed when a peer steered elsewhere.
    pub trust_loss: f64,
    /// Scale applied to the observed-minus-expected pedal force.
    pub effort_scaling: f64,
    /// Scale applied to the received-minus-fair energy.
    pub fairness_scaling: f64,
    /// Fraction of a shortfall credited back to fairness.
    pub fairness_difference: f64,
    /// Smoothing factor for relative success.
    pub relative_success_scaling: f64,
    /// Weight of trust in the composite opinion.
    pub trust_weight: f64,
    /// Weight of effort in the composite opinion.
    pub effort_weight: f64,
    /// Weight of fairness in the composite opinion.
    pub fairness_weight: f64,
    /// Same-colour bonus in the objective relative success.
    pub colour_bonus: f64,
    /// Trust above which a peer's messages are believed.
    pub trust_threshold: f64,
    /// Composite opinion below which a peer is a kick-off candidate.
    pub kick_threshold: f64,
    /// Composite opinion above which an applicant of another colour is accepted.
    pub join_threshold: f64,
    /// Mean opinion of fellow riders below which the agent leaves its bike.
    pub leave_threshold: f64,
    /// Own vote weight for the winner below which the vote counts as disliked.
    pub voting_alignment_threshold: f64,
    /// Multiplier applied to a peer that asks for a kick-off.
    pub kick_off_penalty: f64,
    /// Multiplier applied to a same-colour applicant.
    pub same_colour_join_reward: f64,
    /// Multiplier applied to an accepted applicant of another colour.
    pub other_colour_join_penalty: f64,
    /// How strongly a shared opinion moves a recipient's composite.
    pub reputation_share_weight: f64,
}

impl Default for OpinionConfig {
    fn default() -> Self {
        Self {
            trust_gain: 0.1,
            trust_loss: 0.2,
            effort_scaling: 0.1,
            fairness_scaling: 0.1,
            fairness_difference: 0.5,
            relative_success_scaling: 0.1,
            trust_weight: 1.0,
            effort_weight: 1.0,
            fairness_weight: 1.0,
            colour_bonus: 0.2,
            trust_threshold: 0.7,
            kick_threshold: 0.2,
            join_threshold: 0.8,
            leave_threshold: 0.15,
            voting_alignment_threshold: 0.1,
            kick_off_penalty: 0.9,
            same_colour_join_reward: 1.05,
            other_colour_join_penalty: 0.9,
            reputation_share_weight: 0.2,
        }
    }
}

// ---------------------------------------------------------------------------
// GovernanceConfig
// ---------------------------------------------------------------------------

/// Thresholds of the governance transition rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    /// Mean opinion above which a dictatorship is preferred.
    pub dictatorship_opinion: f64,
    /// Self reputation above which a dictatorship is preferred.
    pub dictatorship_reputation: f64,
    /// Mean opinion above which a leadership is preferred.
    pub leadership_opinion: f64,
    /// Self reputation above which a leadership is preferred.
    pub leadership_reputation: f64,
    /// Bonus added to a same-colour ruler candidate.
    pub ruler_colour_bonus: f64,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            dictatorship_opinion: 0.9,
            dictatorship_reputation: 0.7,
            leadership_opinion: 0.7,
            leadership_reputation: 0.5,
            ruler_colour_bonus: 1.0,
        }
    }
}

// ---------------------------------------------------------------------------
// PhysicsConfig
// ---------------------------------------------------------------------------

/// Step model used by the reachability simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Mass of an empty bike.
    pub mass_bike: f64,
    /// Mass of one rider.
    pub mass_biker: f64,
    /// Pedal force of a rider at full energy.
    pub max_force: f64,
    /// Quadratic drag coefficient.
    pub drag: f64,
    /// Energy spent per unit of pedal force per step.
    pub moving_depletion: f64,
    /// Upper bound on simulated steps.
    pub max_simulation_steps: u32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            mass_bike: 1.0,
            mass_biker: 1.0,
            max_force: 1.0,
            drag: 0.5,
            moving_depletion: 0.01,
            max_simulation_steps: 10_000,
        }
    }
}

// ---------------------------------------------------------------------------
// DecisionConfig
// ---------------------------------------------------------------------------

/// All tunables an agent consults when deciding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// Opinion model constants.
    pub opinion: OpinionConfig,
    /// Governance thresholds.
    pub governance: GovernanceConfig,
    /// Reachability step model.
    pub physics: PhysicsConfig,
}

impl DecisionConfig {
    /// Reject non-finite or negative tunables and non-positive masses.
    pub fn validate(&self) -> Result<(), AgentError> {
        let o = &self.opinion;
        let g = &self.governance;
        let p = &self.physics;
        let named = [
            ("opinion.trust_gain", o.trust_gain),
            ("opinion.trust_loss", o.trust_loss),
            ("opinion.effort_scaling", o.effort_scaling),
            ("opinion.fairness_scaling", o.fairness_scaling),
            ("opinion.fairness_difference", o.fairness_difference),
            ("opinion.relative_success_scaling", o.relative_success_scaling),
            ("opinion.trust_weight", o.trust_weight),
            ("opinion.effort_weight", o.effort_weight),
            ("opinion.fairness_weight", o.fairness_weight),
            ("opinion.colour_bonus", o.colour_bonus),
            ("opinion.trust_threshold", o.trust_threshold),
            ("opinion.kick_threshold", o.kick_threshold),
            ("opinion.join_threshold", o.join_threshold),
            ("opinion.leave_threshold", o.leave_threshold),
            ("opinion.voting_alignment_threshold", o.voting_alignment_threshold),
            ("opinion.kick_off_penalty", o.kick_off_penalty),
            ("opinion.same_colour_join_reward", o.same_colour_join_reward),
            ("opinion.other_colour_join_penalty", o.other_colour_join_penalty),
            ("opinion.reputation_share_weight", o.reputation_share_weight),
            ("governance.dictatorship_opinion", g.dictatorship_opinion),
            ("governance.dictatorship_reputation", g.dictatorship_reputation),
            ("governance.leadership_opinion", g.leadership_opinion),
            ("governance.leadership_reputation", g.leadership_reputation),
            ("governance.ruler_colour_bonus", g.ruler_colour_bonus),
            ("physics.mass_bike", p.mass_bike),
            ("physics.mass_biker", p.mass_biker),
            ("physics.max_force", p.max_force),
            ("physics.drag", p.drag),
            ("physics.moving_depletion", p.moving_depletion),
        ];
        for (name, value) in named {
            if !value.is_finite() || value < 0.0 {
                return Err(AgentError::InvalidConfig {
                    reason: format!("{name} must be finite and non-negative, got {value}"),
                });
            }
        }
        if o.trust_weight + o.effort_weight + o.fairness_weight <= 0.0 {
            return Err(AgentError::InvalidConfig {
                reason: String::from("composite weights must not all be zero"),
            });
        }
        if p.mass_bike + p.mass_biker <= 0.0 {
            return Err(AgentError::InvalidConfig {
                reason: String::from("bike plus rider mass must be positive"),
            });
        }
        Ok(())
    }
}
