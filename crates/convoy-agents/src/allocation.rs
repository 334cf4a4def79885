//! Allocation of collected energy between riders.
//!
//! Each rider proposes a split that blends two extremes:
//!
//! - **helpful**: shares proportional to each rider's energy need;
//! - **selfish**: the proposer keeps its full need, and the others share
//!   the remaining need scaled by the proposer's own energy.
//!
//! Per peer, the blend leans towards the selfish split by how selfishly the
//! proposer wants to treat that peer; the proposer's own share uses the mean
//! of those scores. The result is renormalised to sum to one.
//!
//! Energies are always read from the [`EnergySnapshot`] captured at the
//! start of the round.

use std::collections::BTreeMap;

use convoy_types::{AgentId, EnergySnapshot};
use tracing::debug;

use crate::context::DecisionContext;
use crate::error::{AgentError, ensure_finite};
use crate::math::count_f64;
use crate::opinion::OpinionStore;
use crate::voting::VoteMap;

/// Energy need of `member` from the snapshot.
fn need_of(energy: &EnergySnapshot, member: AgentId) -> Result<f64, AgentError> {
    let level = energy.get(member).ok_or(AgentError::UnknownAgent(member))?;
    let level = ensure_finite(level, "snapshot energy")?;
    Ok(1.0 - level.clamp(0.0, 1.0))
}

/// Needs-proportional shares.
///
/// When nobody needs anything the split is equal.
pub fn helpful_allocation(
    members: &[AgentId],
    energy: &EnergySnapshot,
) -> Result<BTreeMap<AgentId, f64>, AgentError> {
    let needs = members
        .iter()
        .map(|m| need_of(energy, *m).map(|n| (*m, n)))
        .collect::<Result<BTreeMap<_, _>, _>>()?;
    let total: f64 = needs.values().sum();
    if total <= 0.0 {
        let share = 1.0 / count_f64(needs.len().max(1));
        return Ok(needs.into_keys().map(|m| (m, share)).collect());
    }
    Ok(needs.into_iter().map(|(m, n)| (m, n / total)).collect())
}

/// The proposer keeps its full need; the others split the rest of the need
/// in proportion, scaled by the proposer's own energy.
///
/// When the other riders need nothing they get nothing.
pub fn selfish_allocation(
    me: AgentId,
    members: &[AgentId],
    energy: &EnergySnapshot,
) -> Result<BTreeMap<AgentId, f64>, AgentError> {
    let needs = members
        .iter()
        .map(|m| need_of(energy, *m).map(|n| (*m, n)))
        .collect::<Result<BTreeMap<_, _>, _>>()?;
    let own_energy = 1.0 - need_of(energy, me)?;
    let others_need: f64 = needs
        .iter()
        .filter(|(m, _)| **m != me)
        .map(|(_, n)| n)
        .sum();
    Ok(needs
        .into_iter()
        .map(|(m, need)| {
            let share = if m == me {
                need
            } else if others_need > 0.0 {
                need / others_need * own_energy
            } else {
                0.0
            };
            (m, share)
        })
        .collect())
}

/// The deciding agent's proposed split for its bike.
///
/// A rider alone gets everything without blending. If the blend sums to
/// zero the split is equal.
pub fn decide_allocation(
    ctx: &DecisionContext<'_>,
    opinions: &OpinionStore,
    energy: &EnergySnapshot,
) -> Result<VoteMap<AgentId>, AgentError> {
    let me = ctx.me();
    let fellows = ctx.fellows();
    if fellows.len() <= 1 {
        return Ok(VoteMap::one_hot(me.id, [me.id]));
    }
    let members: Vec<AgentId> = fellows.iter().map(|f| f.id).collect();
    let helpful = helpful_allocation(&members, energy)?;
    let selfish = selfish_allocation(me.id, &members, energy)?;

    let max_points = ctx.max_points_in_group();
    let mut selfishness: BTreeMap<AgentId, f64> = fellows
        .iter()
        .filter(|f| f.id != me.id)
        .map(|f| (f.id, opinions.selfishness_of(me, *f, max_points)))
        .collect();
    let own_score = selfishness.values().sum::<f64>() / count_f64(selfishness.len().max(1));
    selfishness.insert(me.id, own_score);

    let mut blended = BTreeMap::new();
    for member in &members {
        let s = selfishness.get(member).copied().unwrap_or(own_score);
        let h = helpful.get(member).copied().unwrap_or(0.0);
        let x = selfish.get(member).copied().unwrap_or(0.0);
        let share = ensure_finite(s.mul_add(x, (1.0 - s) * h), "blended allocation")?;
        blended.insert(*member, share.max(0.0));
    }

    let proposal = match VoteMap::normalize(blended)? {
        Some(vote) => vote,
        None => VoteMap::uniform(members.iter().copied()).ok_or(AgentError::NoCandidates)?,
    };
    debug!(agent = %me.id, own_share = proposal.get(me.id), "proposed allocation");
    Ok(proposal)
}

/// Combine the riders' proposals into the bike's allocation by averaging
/// each rider's share across proposals.
pub fn group_allocation(
    proposals: &BTreeMap<AgentId, VoteMap<AgentId>>,
) -> Result<VoteMap<AgentId>, AgentError> {
    if proposals.is_empty() {
        return Err(AgentError::NoCandidates);
    }
    let mut sums: BTreeMap<AgentId, f64> = BTreeMap::new();
    for proposal in proposals.values() {
        for (member, share) in proposal.iter() {
            *sums.entry(member).or_insert(0.0) += share;
        }
    }
    let count = count_f64(proposals.len());
    let means = sums.into_iter().map(|(m, s)| (m, s / count)).collect();
    match VoteMap::normalize(means)? {
        Some(vote) => Ok(vote),
        None => VoteMap::uniform(proposals.keys().copied()).ok_or(AgentError::NoCandidates),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn aid(n: u128) -> AgentId {
        AgentId::from(Uuid::from_u128(n))
    }

    fn snapshot(levels: &[(u128, f64)]) -> EnergySnapshot {
        let mut s = EnergySnapshot::new();
        for (n, e) in levels {
            s.insert(aid(*n), *e);
        }
        s
    }

    #[test]
    fn helpful_is_inverse_energy() {
        let energy = snapshot(&[(1, 0.2), (2, 0.8)]);
        let helpful = helpful_allocation(&[aid(1), aid(2)], &energy).unwrap();
        assert!((helpful.get(&aid(1)).unwrap() - 0.8).abs() < 1e-12);
        assert!((helpful.get(&aid(2)).unwrap() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn helpful_zero_need_is_equal_split() {
        let energy = snapshot(&[(1, 1.0), (2, 1.0), (3, 1.0), (4, 1.0)]);
        let helpful = helpful_allocation(&[aid(1), aid(2), aid(3), aid(4)], &energy).unwrap();
        assert!(helpful.values().all(|s| (s - 0.25).abs() < f64::EPSILON));
    }

    #[test]
    fn selfish_keeps_own_need() {
        let energy = snapshot(&[(1, 0.2), (2, 0.8)]);
        let selfish = selfish_allocation(aid(1), &[aid(1), aid(2)], &energy).unwrap();
        assert!((selfish.get(&aid(1)).unwrap() - 0.8).abs() < 1e-12);
        assert!((selfish.get(&aid(2)).unwrap() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn selfish_others_without_need_get_nothing() {
        let energy = snapshot(&[(1, 0.3), (2, 1.0)]);
        let selfish = selfish_allocation(aid(1), &[aid(1), aid(2)], &energy).unwrap();
        assert!(selfish.get(&aid(2)).unwrap().abs() < f64::EPSILON);
    }

    #[test]
    fn missing_or_nan_energy_is_error() {
        let energy = snapshot(&[(1, 0.2)]);
        assert_eq!(
            helpful_allocation(&[aid(1), aid(2)], &energy),
            Err(AgentError::UnknownAgent(aid(2)))
        );
        let energy = snapshot(&[(1, f64::NAN)]);
        assert!(matches!(
            helpful_allocation(&[aid(1)], &energy),
            Err(AgentError::NonFinite { .. })
        ));
    }

    #[test]
    fn group_allocation_is_mean_of_proposals() {
        let proposals = BTreeMap::from([
            (aid(1), VoteMap::one_hot(aid(1), [aid(1), aid(2)])),
            (aid(2), VoteMap::one_hot(aid(2), [aid(1), aid(2)])),
        ]);
        let group = group_allocation(&proposals).unwrap();
        assert!(group.is_normalised());
        assert!((group.get(aid(1)) - 0.5).abs() < 1e-12);
        assert_eq!(group_allocation(&BTreeMap::new()), Err(AgentError::NoCandidates));
    }
}
