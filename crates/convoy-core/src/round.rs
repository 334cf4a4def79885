//! Round cycle: the phase loop that drives every rider once per round.
//!
//! Each round runs through these phases, with a barrier between them:
//!
//! 1. **Inbox** -- apply the payloads delivered after the previous round.
//!
//! 2. **Opinion update** -- every rider updates trust, effort, fairness and
//!    relative success for its fellow riders from last round's outcome.
//!
//! 3. **Direction** -- per bike, every rider nominates a loot box, then
//!    scores all nominations into a normalised vote.
//!
//! 4. **Governance** -- per bike, every rider picks a regime; the plurality
//!    regime is adopted. Under leadership or dictatorship a ruler is
//!    elected and decides the direction; under democracy the votes do.
//!
//! 5. **Allocation** -- per bike, every rider proposes a split of collected
//!    energy from the energy snapshot taken at round start. A dictator's
//!    proposal is final; otherwise proposals are averaged.
//!
//! 6. **Membership** -- per bike, kick-out votes and join decisions. A
//!    dictator decides the kick-outs alone.
//!
//! 7. **Actions and messages** -- every rider decides whether to keep its
//!    seat and what payloads to send. Riders about to be off a bike pick
//!    the bike they want to move to.
//!
//! 8. **Apply** -- the [`RoundSummary`] is handed to the [`Environment`].
//!
//! Within a phase riders only read the committed [`WorldSnapshot`] and
//! mutate their own [`Biker`]. Riders and bikes are visited in identifier
//! order, so a round is deterministic for a given snapshot.

use std::collections::{BTreeMap, BTreeSet};

use convoy_agents::{
    AgentError, Biker, DecisionConfig, MAX_BIKE_RIDERS, VoteMap, elect_ruler, group_allocation,
    group_governance, winner_from_dist,
};
use convoy_types::{
    AgentId, BikeId, BikerAction, EnergySnapshot, Governance, LootBoxId, Message, WorldSnapshot,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::environment::{Environment, EnvironmentError, RoundOutcome};

/// Errors that can occur during round execution.
#[derive(Debug, thiserror::Error)]
pub enum RoundError {
    /// A rider's decision failed.
    #[error("agent error for {agent_id}: {source}")]
    Agent {
        /// The rider whose decision failed.
        agent_id: AgentId,
        /// The underlying decision error.
        source: AgentError,
    },

    /// A bike-level aggregation failed.
    #[error("bike error for {bike_id}: {source}")]
    Bike {
        /// The bike whose aggregation failed.
        bike_id: BikeId,
        /// The underlying decision error.
        source: AgentError,
    },

    /// The world rejected the round.
    #[error("environment error: {source}")]
    Environment {
        /// The underlying environment error.
        #[from]
        source: EnvironmentError,
    },
}

/// A payload and the rider that wants it sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// The sending rider.
    pub sender: AgentId,
    /// The payload.
    pub message: Message,
}

/// Everything one bike decided this round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BikeDecision {
    /// The bike.
    pub bike: BikeId,
    /// The regime each rider preferred.
    pub preferences: BTreeMap<AgentId, Governance>,
    /// The regime adopted for this round.
    pub governance: Governance,
    /// The elected ruler, if the regime has one.
    pub ruler: Option<AgentId>,
    /// Each rider's nomination.
    pub nominations: BTreeMap<AgentId, LootBoxId>,
    /// Each rider's normalised direction vote.
    pub votes: BTreeMap<AgentId, VoteMap<LootBoxId>>,
    /// Where the bike heads; `None` when there is nothing to head for.
    pub direction: Option<LootBoxId>,
    /// How collected energy is split between the riders.
    pub allocation: VoteMap<AgentId>,
    /// Riders to remove: the dictator's choice, otherwise those a strict
    /// majority voted out.
    pub kicked: Vec<AgentId>,
    /// Applicants a strict majority accepted.
    pub accepted: Vec<AgentId>,
}

/// Summary of a single round's decisions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoundSummary {
    /// The round that was executed.
    pub round: u64,
    /// Decisions for every bike with at least one rider.
    pub bikes: BTreeMap<BikeId, BikeDecision>,
    /// Every agent's seat decision.
    pub actions: BTreeMap<AgentId, BikerAction>,
    /// Payloads to deliver before the next round.
    pub messages: Vec<OutboundMessage>,
    /// The bike each rider leaving, kicked off or already off a bike wants
    /// to move to.
    #[serde(default)]
    pub bike_choices: BTreeMap<AgentId, BikeId>,
}

/// The mutable state carried between rounds.
#[derive(Debug)]
pub struct SimulationState {
    /// Tunables for newly seen agents.
    pub config: DecisionConfig,
    /// Every known agent's decision state.
    pub bikers: BTreeMap<AgentId, Biker>,
    /// What the world reported after the previous round.
    pub last_outcome: RoundOutcome,
    /// Rounds executed so far.
    pub rounds_completed: u64,
}

impl SimulationState {
    /// Create an empty state; agents are picked up from the first snapshot.
    pub const fn new(config: DecisionConfig) -> Self {
        Self {
            config,
            bikers: BTreeMap::new(),
            last_outcome: RoundOutcome {
                feedback: BTreeMap::new(),
                delivered: Vec::new(),
                applicants: BTreeMap::new(),
            },
            rounds_completed: 0,
        }
    }

    /// Add a [`Biker`] for every new agent and drop departed ones.
    fn sync_population(&mut self, world: &WorldSnapshot) {
        self.bikers.retain(|id, _| world.agents.contains_key(id));
        for id in world.agents.keys() {
            if !self.bikers.contains_key(id) {
                debug!(agent = %id, "new agent");
                self.bikers.insert(*id, Biker::new(*id, self.config.clone()));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Rider lookup
// ---------------------------------------------------------------------------

fn agent_error(agent_id: AgentId) -> impl FnOnce(AgentError) -> RoundError {
    move |source| RoundError::Agent { agent_id, source }
}

fn rider(bikers: &BTreeMap<AgentId, Biker>, id: AgentId) -> Result<&Biker, RoundError> {
    bikers
        .get(&id)
        .ok_or_else(|| agent_error(id)(AgentError::UnknownAgent(id)))
}

fn rider_mut(bikers: &mut BTreeMap<AgentId, Biker>, id: AgentId) -> Result<&mut Biker, RoundError> {
    bikers
        .get_mut(&id)
        .ok_or_else(|| agent_error(id)(AgentError::UnknownAgent(id)))
}

/// Entries of `tally` backed by a strict majority of `electorate`.
fn majority(tally: BTreeMap<AgentId, usize>, electorate: usize) -> Vec<AgentId> {
    tally
        .into_iter()
        .filter(|(_, count)| count.saturating_mul(2) > electorate)
        .map(|(id, _)| id)
        .collect()
}

// ---------------------------------------------------------------------------
// Round
// ---------------------------------------------------------------------------

/// Execute one complete round.
///
/// # Phases
///
/// 1. Inbox
/// 2. Opinion update
/// 3. Direction
/// 4. Governance
/// 5. Allocation
/// 6. Membership
/// 7. Actions and messages
/// 8. Apply
pub fn run_round(
    state: &mut SimulationState,
    environment: &mut dyn Environment,
) -> Result<RoundSummary, RoundError> {
    let world = environment.snapshot();
    let round = world.round;
    info!(
        round,
        agents = world.agents.len(),
        bikes = world.bikes.len(),
        loot_boxes = world.loot_boxes.len(),
        "Round started"
    );
    state.sync_population(&world);
    let outcome = std::mem::take(&mut state.last_outcome);

    // --- Phase 1: Inbox ---
    for biker in state.bikers.values_mut() {
        biker.receive(&world, &outcome.delivered);
    }

    // --- Phase 2: Opinion update ---
    for (id, biker) in &mut state.bikers {
        let feedback = world
            .agent(*id)
            .and_then(|a| a.bike)
            .and_then(|bike| outcome.feedback.get(&bike));
        biker.update_opinions(&world, feedback).map_err(agent_error(*id))?;
    }

    // --- Phases 3-6: per bike ---
    let energy = EnergySnapshot::capture(world.agents.values());
    let mut bikes = BTreeMap::new();
    for bike in world.bikes.values() {
        let members: Vec<AgentId> = bike
            .members
            .iter()
            .copied()
            .filter(|m| state.bikers.contains_key(m))
            .collect();
        if members.is_empty() {
            continue;
        }
        let applicants = outcome
            .applicants
            .get(&bike.id)
            .map_or(&[][..], Vec::as_slice);
        let decision = decide_bike(
            &mut state.bikers,
            &world,
            &BikeRound {
                bike: bike.id,
                members: &members,
                energy: &energy,
                applicants,
            },
        )?;
        bikes.insert(bike.id, decision);
    }

    // --- Phase 7: Actions and messages ---
    let mut actions = BTreeMap::new();
    let mut messages = Vec::new();
    for (id, biker) in &mut state.bikers {
        actions.insert(*id, biker.decide_action(&world).map_err(agent_error(*id))?);
        let preference = bikes
            .values()
            .find_map(|d| d.preferences.get(id).copied())
            .unwrap_or(Governance::Democracy);
        let outgoing = biker
            .outgoing_messages(&world, preference)
            .map_err(agent_error(*id))?;
        messages.extend(outgoing.into_iter().map(|message| OutboundMessage {
            sender: *id,
            message,
        }));
    }

    let unseated: BTreeSet<AgentId> = bikes
        .values()
        .flat_map(|d| d.kicked.iter().copied())
        .chain(
            actions
                .iter()
                .filter(|(_, a)| **a == BikerAction::LeaveBike)
                .map(|(id, _)| *id),
        )
        .chain(
            world
                .agents
                .values()
                .filter(|a| a.bike.is_none())
                .map(|a| a.id),
        )
        .collect();
    let mut bike_choices = BTreeMap::new();
    for id in unseated {
        let choice = rider(&state.bikers, id)?
            .choose_bike(&world)
            .map_err(agent_error(id))?;
        if let Some(bike) = choice {
            bike_choices.insert(id, bike);
        }
    }

    let summary = RoundSummary {
        round,
        bikes,
        actions,
        messages,
        bike_choices,
    };

    // --- Phase 8: Apply ---
    state.last_outcome = environment.apply(&summary)?;
    state.rounds_completed = state.rounds_completed.saturating_add(1);

    let leaving = summary
        .actions
        .values()
        .filter(|a| **a == BikerAction::LeaveBike)
        .count();
    info!(
        round,
        bikes_decided = summary.bikes.len(),
        leaving,
        messages = summary.messages.len(),
        "Round complete"
    );
    Ok(summary)
}

/// The per-bike inputs of one round.
struct BikeRound<'a> {
    bike: BikeId,
    members: &'a [AgentId],
    energy: &'a EnergySnapshot,
    applicants: &'a [AgentId],
}

fn decide_bike(
    bikers: &mut BTreeMap<AgentId, Biker>,
    world: &WorldSnapshot,
    input: &BikeRound<'_>,
) -> Result<BikeDecision, RoundError> {
    let (nominations, votes) = phase_direction(bikers, world, input.members)?;
    let (preferences, governance, ruler) = phase_governance(bikers, world, input.members)?;

    let democratic = winner_from_dist(&votes, &BTreeMap::new());
    let direction = match (governance, ruler) {
        (Governance::Dictatorship, Some(r)) if !world.loot_boxes.is_empty() => Some(
            rider(bikers, r)?
                .dictate_direction(world)
                .map_err(agent_error(r))?,
        ),
        (Governance::Leadership, Some(r)) => rider(bikers, r)?.lead_direction(&votes).or(democratic),
        _ => democratic,
    };
    if let Some(direction) = direction {
        for id in input.members {
            rider_mut(bikers, *id)?.observe_decision(direction);
        }
    }

    let allocation = phase_allocation(bikers, world, input, governance, ruler)?;
    let (kicked, accepted) = phase_membership(bikers, world, input, governance, ruler)?;

    debug!(
        bike = %input.bike,
        governance = ?governance,
        ruler = ?ruler,
        direction = ?direction,
        kicked = kicked.len(),
        accepted = accepted.len(),
        "Bike decided"
    );
    Ok(BikeDecision {
        bike: input.bike,
        preferences,
        governance,
        ruler,
        nominations,
        votes,
        direction,
        allocation,
        kicked,
        accepted,
    })
}

type Nominations = BTreeMap<AgentId, LootBoxId>;
type DirectionVotes = BTreeMap<AgentId, VoteMap<LootBoxId>>;

/// Nominate, then vote. A field without loot boxes skips both.
fn phase_direction(
    bikers: &mut BTreeMap<AgentId, Biker>,
    world: &WorldSnapshot,
    members: &[AgentId],
) -> Result<(Nominations, DirectionVotes), RoundError> {
    let mut nominations = BTreeMap::new();
    let mut votes = BTreeMap::new();
    if world.loot_boxes.is_empty() {
        return Ok((nominations, votes));
    }
    for id in members {
        let nomination = rider(bikers, *id)?
            .propose_direction(world)
            .map_err(agent_error(*id))?;
        nominations.insert(*id, nomination);
    }
    for id in members {
        let vote = rider_mut(bikers, *id)?
            .final_direction_vote(world, &nominations)
            .map_err(agent_error(*id))?;
        votes.insert(*id, vote);
    }
    Ok((nominations, votes))
}

fn phase_governance(
    bikers: &BTreeMap<AgentId, Biker>,
    world: &WorldSnapshot,
    members: &[AgentId],
) -> Result<(BTreeMap<AgentId, Governance>, Governance, Option<AgentId>), RoundError> {
    let mut preferences = BTreeMap::new();
    for id in members {
        let choice = rider(bikers, *id)?
            .decide_governance(world)
            .map_err(agent_error(*id))?;
        preferences.insert(*id, choice);
    }
    let governance = group_governance(preferences.values().copied());
    if governance == Governance::Democracy {
        return Ok((preferences, governance, None));
    }
    let mut ballots = BTreeMap::new();
    for id in members {
        let ballot = rider(bikers, *id)?.vote_ruler(world).map_err(agent_error(*id))?;
        ballots.insert(*id, ballot);
    }
    let ruler = elect_ruler(&ballots);
    Ok((preferences, governance, ruler))
}

fn phase_allocation(
    bikers: &mut BTreeMap<AgentId, Biker>,
    world: &WorldSnapshot,
    input: &BikeRound<'_>,
    governance: Governance,
    ruler: Option<AgentId>,
) -> Result<VoteMap<AgentId>, RoundError> {
    let mut proposals = BTreeMap::new();
    for id in input.members {
        let proposal = rider_mut(bikers, *id)?
            .decide_allocation(world, input.energy)
            .map_err(agent_error(*id))?;
        proposals.insert(*id, proposal);
    }
    let dictated = match (governance, ruler) {
        (Governance::Dictatorship, Some(r)) => proposals.get(&r).cloned(),
        _ => None,
    };
    match dictated {
        Some(allocation) => Ok(allocation),
        None => group_allocation(&proposals).map_err(|source| RoundError::Bike {
            bike_id: input.bike,
            source,
        }),
    }
}

fn phase_membership(
    bikers: &mut BTreeMap<AgentId, Biker>,
    world: &WorldSnapshot,
    input: &BikeRound<'_>,
    governance: Governance,
    ruler: Option<AgentId>,
) -> Result<(Vec<AgentId>, Vec<AgentId>), RoundError> {
    let electorate = input.members.len();

    let kicked = match (governance, ruler) {
        (Governance::Dictatorship, Some(r)) => rider(bikers, r)?
            .dictate_kickout(world)
            .map_err(agent_error(r))?,
        _ => {
            let mut kick_tally: BTreeMap<AgentId, usize> = BTreeMap::new();
            for id in input.members {
                let ballot = rider(bikers, *id)?
                    .vote_for_kickout(world)
                    .map_err(agent_error(*id))?;
                for (subject, vote) in ballot {
                    if vote > 0 {
                        let count = kick_tally.entry(subject).or_insert(0);
                        *count = count.saturating_add(1);
                    }
                }
            }
            majority(kick_tally, electorate)
        }
    };

    if input.applicants.is_empty() {
        return Ok((kicked, Vec::new()));
    }
    let mut join_tally: BTreeMap<AgentId, usize> = BTreeMap::new();
    for id in input.members {
        let decisions = rider_mut(bikers, *id)?
            .decide_joining(world, input.applicants)
            .map_err(agent_error(*id))?;
        for (applicant, accept) in decisions {
            let count = join_tally.entry(applicant).or_insert(0);
            if accept {
                *count = count.saturating_add(1);
            }
        }
    }
    let space = MAX_BIKE_RIDERS.saturating_sub(electorate);
    let accepted = majority(join_tally, electorate)
        .into_iter()
        .take(space)
        .collect();
    Ok((kicked, accepted))
}
