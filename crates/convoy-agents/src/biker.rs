//! A rider: one opinion store plus the memory it keeps between rounds.
//!
//! [`Biker`] is the unit the round controller drives. It owns its
//! [`OpinionStore`] exclusively and exposes every decision as a method over
//! the committed [`WorldSnapshot`]. Besides opinions it remembers:
//!
//! - the direction its group last decided on (for trust updates);
//! - its own last direction vote and whether it disliked the outcome;
//! - the energy snapshot its last allocation was based on (for fairness);
//! - the regimes fellow riders announced.

use std::collections::BTreeMap;

use convoy_types::{
    AgentId, BikeId, BikerAction, EnergySnapshot, Governance, InboundMessage, LootBoxId, Message,
    WorldSnapshot,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::allocation::{decide_allocation, helpful_allocation};
use crate::config::DecisionConfig;
use crate::consensus::{final_direction_vote, propose_direction};
use crate::context::DecisionContext;
use crate::error::AgentError;
use crate::governance::{
    decide_governance, decide_weights, dictate_direction, follow_announcements, governance_inputs,
    lead_direction, vote_ruler,
};
use crate::membership::{choose_bike, dictate_kickout};
use crate::messages::{
    MessageEffect, apply_message, governance_message, kick_off_message, reputation_shares,
};
use crate::opinion::{OpinionStore, expected_contributions, objective_relative_success};
use crate::voting::VoteMap;

/// Energy actually handed out to a bike's riders in the previous round.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllocationFeedback {
    /// Energy each rider received.
    pub received: BTreeMap<AgentId, f64>,
    /// Total energy distributed to the bike.
    pub total: f64,
}

/// One autonomous rider.
#[derive(Debug, Clone)]
pub struct Biker {
    id: AgentId,
    config: DecisionConfig,
    opinions: OpinionStore,
    last_decision: Option<LootBoxId>,
    last_vote: Option<VoteMap<LootBoxId>>,
    disliked_vote: bool,
    allocation_basis: EnergySnapshot,
    peer_governance: BTreeMap<AgentId, Governance>,
}

impl Biker {
    /// Create a rider with no opinions and no memory.
    pub fn new(id: AgentId, config: DecisionConfig) -> Self {
        let opinions = OpinionStore::new(config.opinion.clone());
        Self {
            id,
            config,
            opinions,
            last_decision: None,
            last_vote: None,
            disliked_vote: false,
            allocation_basis: EnergySnapshot::new(),
            peer_governance: BTreeMap::new(),
        }
    }

    /// The rider's identifier.
    pub const fn id(&self) -> AgentId {
        self.id
    }

    /// The rider's opinions of its peers.
    pub const fn opinions(&self) -> &OpinionStore {
        &self.opinions
    }

    /// The direction the rider's group last decided on.
    pub const fn last_decision(&self) -> Option<LootBoxId> {
        self.last_decision
    }

    /// Mutable access to the rider's opinions, for signals that arrive
    /// outside the message inbox.
    pub const fn opinions_mut(&mut self) -> &mut OpinionStore {
        &mut self.opinions
    }

    /// The rider's last direction vote.
    pub const fn last_vote(&self) -> Option<&VoteMap<LootBoxId>> {
        self.last_vote.as_ref()
    }

    /// Whether the rider disliked its group's last decision.
    pub const fn disliked_vote(&self) -> bool {
        self.disliked_vote
    }

    /// Regimes announced by verified fellow riders.
    pub const fn peer_governance(&self) -> &BTreeMap<AgentId, Governance> {
        &self.peer_governance
    }

    fn context<'a>(&'a self, world: &'a WorldSnapshot) -> Result<DecisionContext<'a>, AgentError> {
        DecisionContext::new(world, self.id, &self.config)
    }

    // -----------------------------------------------------------------------
    // Inbox and opinion update
    // -----------------------------------------------------------------------

    /// Apply every delivered message addressed to this rider.
    ///
    /// A message that cannot be applied is logged and skipped. Regime
    /// announcements from earlier rounds are forgotten first.
    pub fn receive(&mut self, world: &WorldSnapshot, inbox: &[InboundMessage]) -> Vec<MessageEffect> {
        self.peer_governance.clear();
        let mut effects = Vec::new();
        for inbound in inbox.iter().filter(|m| m.recipient == self.id) {
            match apply_message(&mut self.opinions, world, inbound) {
                Ok(effect) => {
                    if let MessageEffect::GovernancePreference { sender, governance } = effect {
                        self.peer_governance.insert(sender, governance);
                    }
                    effects.push(effect);
                }
                Err(e) => warn!(agent = %self.id, sender = %inbound.sender, error = %e, "rejected message"),
            }
        }
        effects
    }

    /// Update trust, effort, fairness, relative success and the composite
    /// opinion of every fellow rider from what happened last round.
    ///
    /// Signals received from messages this round are folded into the
    /// composite and then cleared.
    pub fn update_opinions(
        &mut self,
        world: &WorldSnapshot,
        feedback: Option<&AllocationFeedback>,
    ) -> Result<(), AgentError> {
        let ctx = DecisionContext::new(world, self.id, &self.config)?;
        let me = ctx.me();
        let fellows = ctx.fellows();
        let peers = ctx.peers();
        let remaining_force: f64 = peers.iter().map(|p| p.pedal_force).sum();
        let expected = self
            .last_decision
            .and_then(|d| world.loot_box(d))
            .map(|target| expected_contributions(&fellows, target.colour, remaining_force));

        let fair_shares = match feedback {
            Some(fb) if fb.total > 0.0 && !self.allocation_basis.is_empty() => {
                let basis: Vec<AgentId> = self.allocation_basis.agents().collect();
                Some(helpful_allocation(&basis, &self.allocation_basis)?)
            }
            _ => None,
        };

        let max_points = world.max_points();
        let bonus = self.config.opinion.colour_bonus;
        for peer in &peers {
            self.opinions.ensure(peer.id);
            if let (Some(decided), Some(steered)) = (self.last_decision, peer.last_target) {
                self.opinions.update_trust(peer.id, decided == steered);
            }
            if let Some(expected_force) = expected.as_ref().and_then(|e| e.get(&peer.id)) {
                self.opinions
                    .update_effort(peer.id, peer.pedal_force, *expected_force)?;
            }
            let fair = feedback
                .zip(fair_shares.as_ref())
                .and_then(|(fb, shares)| shares.get(&peer.id).map(|share| (fb, *share)));
            if let Some((fb, share)) = fair {
                let gain = fb.received.get(&peer.id).copied().unwrap_or(0.0);
                self.opinions.update_fairness(peer.id, gain, share * fb.total)?;
            }
            let objective = objective_relative_success(me, *peer, max_points, bonus);
            self.opinions.update_relative_success(peer.id, objective)?;
            self.opinions.settle_composite(peer.id)?;
        }
        self.opinions.clear_signals();
        debug!(agent = %self.id, peers = peers.len(), "updated opinions");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Direction
    // -----------------------------------------------------------------------

    /// This round's nomination.
    pub fn propose_direction(&self, world: &WorldSnapshot) -> Result<LootBoxId, AgentError> {
        propose_direction(&self.context(world)?)
    }

    /// Score the group's nominations; the vote is remembered for
    /// [`Biker::observe_decision`].
    pub fn final_direction_vote(
        &mut self,
        world: &WorldSnapshot,
        nominations: &BTreeMap<AgentId, LootBoxId>,
    ) -> Result<VoteMap<LootBoxId>, AgentError> {
        let vote = final_direction_vote(&self.context(world)?, &self.opinions, nominations)?;
        self.last_vote = Some(vote.clone());
        Ok(vote)
    }

    /// Record the direction the group settled on and whether this rider's
    /// own vote for it fell below the alignment threshold.
    pub fn observe_decision(&mut self, direction: LootBoxId) {
        self.last_decision = Some(direction);
        let threshold = self.config.opinion.voting_alignment_threshold;
        self.disliked_vote = self
            .last_vote
            .as_ref()
            .is_some_and(|v| v.get(direction) < threshold);
        if self.disliked_vote {
            debug!(agent = %self.id, direction = %direction, "disliked group decision");
        }
    }

    /// Keep pedalling or leave the bike.
    ///
    /// The rider leaves when its mean opinion of its fellow riders is below
    /// the leave threshold or it disliked the last decision. The dislike is
    /// consumed either way.
    pub fn decide_action(&mut self, world: &WorldSnapshot) -> Result<BikerAction, AgentError> {
        let disliked = std::mem::take(&mut self.disliked_vote);
        let ctx = self.context(world)?;
        if ctx.me().bike.is_none() {
            return Ok(BikerAction::Pedal);
        }
        let unhappy = self
            .opinions
            .mean_opinion(ctx.peers().iter().map(|p| p.id))
            .is_some_and(|m| m < self.config.opinion.leave_threshold);
        if unhappy || disliked {
            info!(agent = %self.id, unhappy, disliked, "leaving bike");
            return Ok(BikerAction::LeaveBike);
        }
        Ok(BikerAction::Pedal)
    }

    // -----------------------------------------------------------------------
    // Governance
    // -----------------------------------------------------------------------

    /// The regime this rider prefers this round.
    ///
    /// A rider with no preference of its own follows a regime announced by
    /// a majority of its current fellow riders.
    pub fn decide_governance(&self, world: &WorldSnapshot) -> Result<Governance, AgentError> {
        let ctx = self.context(world)?;
        let inputs = governance_inputs(&ctx, &self.opinions)?;
        let own = decide_governance(inputs, &self.config.governance);
        let peers = ctx.peers();
        let announced = peers
            .iter()
            .filter_map(|p| self.peer_governance.get(&p.id).copied());
        let choice = follow_announcements(own, announced, peers.len());
        debug!(
            agent = %self.id,
            mean_opinion = inputs.mean_opinion,
            self_reputation = inputs.self_reputation,
            own = ?own,
            choice = ?choice,
            "decided governance"
        );
        Ok(choice)
    }

    /// This rider's ruler ballot.
    pub fn vote_ruler(&self, world: &WorldSnapshot) -> Result<VoteMap<AgentId>, AgentError> {
        vote_ruler(&self.context(world)?, &self.opinions, &self.config.governance)
    }

    /// As dictator, choose the bike's direction alone.
    pub fn dictate_direction(&self, world: &WorldSnapshot) -> Result<LootBoxId, AgentError> {
        dictate_direction(&self.context(world)?, &self.opinions)
    }

    /// As leader, choose the bike's direction from the members' votes.
    pub fn lead_direction(&self, votes: &BTreeMap<AgentId, VoteMap<LootBoxId>>) -> Option<LootBoxId> {
        lead_direction(&self.opinions, self.id, votes)
    }

    /// As leader, how much each voter's direction vote counts.
    pub fn decide_weights(&self, voters: impl IntoIterator<Item = AgentId>) -> BTreeMap<AgentId, f64> {
        decide_weights(&self.opinions, self.id, voters)
    }

    // -----------------------------------------------------------------------
    // Allocation
    // -----------------------------------------------------------------------

    /// This rider's proposed split of collected energy.
    ///
    /// The snapshot is remembered so next round's fairness update compares
    /// what riders received against the needs the split was based on.
    pub fn decide_allocation(
        &mut self,
        world: &WorldSnapshot,
        energy: &EnergySnapshot,
    ) -> Result<VoteMap<AgentId>, AgentError> {
        let ctx = DecisionContext::new(world, self.id, &self.config)?;
        let proposal = decide_allocation(&ctx, &self.opinions, energy)?;
        let mut basis = EnergySnapshot::new();
        for member in proposal.candidates() {
            if let Some(level) = energy.get(member) {
                basis.insert(member, level);
            }
        }
        self.allocation_basis = basis;
        Ok(proposal)
    }

    // -----------------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------------

    /// 1 for every fellow rider this rider wants removed, 0 otherwise.
    pub fn vote_for_kickout(&self, world: &WorldSnapshot) -> Result<BTreeMap<AgentId, u8>, AgentError> {
        let ctx = self.context(world)?;
        let threshold = self.config.opinion.kick_threshold;
        Ok(ctx
            .peers()
            .iter()
            .map(|p| (p.id, u8::from(self.opinions.opinion_of(p.id) < threshold)))
            .collect())
    }

    /// As dictator, the riders to remove from the bike.
    pub fn dictate_kickout(&self, world: &WorldSnapshot) -> Result<Vec<AgentId>, AgentError> {
        Ok(dictate_kickout(&self.context(world)?, &self.opinions))
    }

    /// The bike to move to once off the current one, judged from where the
    /// current bike stands.
    pub fn choose_bike(&self, world: &WorldSnapshot) -> Result<Option<BikeId>, AgentError> {
        let ctx = self.context(world)?;
        let from = ctx.bike().map(|b| b.position);
        Ok(choose_bike(world, ctx.me(), from, ctx.me().bike))
    }

    /// Accept or reject riders asking to join this rider's bike.
    ///
    /// Same-colour applicants are accepted and rewarded; others only when
    /// already liked above the join threshold, at a small penalty. Unknown
    /// applicants are rejected.
    pub fn decide_joining(
        &mut self,
        world: &WorldSnapshot,
        pending: &[AgentId],
    ) -> Result<BTreeMap<AgentId, bool>, AgentError> {
        let me = world.agent(self.id).ok_or(AgentError::UnknownAgent(self.id))?;
        let max_points = world.max_points();
        let o = self.config.opinion.clone();
        let mut decisions = BTreeMap::new();
        for applicant_id in pending {
            let Some(applicant) = world.agent(*applicant_id) else {
                warn!(agent = %self.id, applicant = %applicant_id, "unknown applicant");
                decisions.insert(*applicant_id, false);
                continue;
            };
            let objective = objective_relative_success(me, applicant, max_points, o.colour_bonus);
            self.opinions.update_relative_success(applicant.id, objective)?;
            let accept = if applicant.colour == me.colour {
                self.opinions
                    .recompute_composite(applicant.id, o.same_colour_join_reward)?;
                true
            } else if self.opinions.opinion_of(applicant.id) > o.join_threshold {
                self.opinions
                    .recompute_composite(applicant.id, o.other_colour_join_penalty)?;
                true
            } else {
                false
            };
            decisions.insert(applicant.id, accept);
        }
        Ok(decisions)
    }

    // -----------------------------------------------------------------------
    // Messaging
    // -----------------------------------------------------------------------

    /// The payloads this rider wants delivered after the round: a
    /// reputation share per fellow rider, a kick-off request when someone
    /// falls below the kick threshold, and its preferred regime.
    pub fn outgoing_messages(
        &self,
        world: &WorldSnapshot,
        governance: Governance,
    ) -> Result<Vec<Message>, AgentError> {
        let ctx = self.context(world)?;
        let mut messages = reputation_shares(&ctx, &self.opinions);
        messages.extend(kick_off_message(&ctx, &self.opinions));
        messages.extend(governance_message(&ctx, governance));
        Ok(messages)
    }
}
