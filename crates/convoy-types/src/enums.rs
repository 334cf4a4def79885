//! Enumeration types for the Convoy simulation.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Colour
// ---------------------------------------------------------------------------

/// The colour of an agent or a loot box.
///
/// Agents score points only from loot boxes of their own colour, so colour
/// drives nomination, voting and the objective relative-success metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Colour {
    /// Red.
    Red,
    /// Green.
    Green,
    /// Blue.
    Blue,
    /// Yellow.
    Yellow,
    /// Orange.
    Orange,
    /// Pink.
    Pink,
    /// Purple.
    Purple,
    /// White.
    White,
}

impl Colour {
    /// Every colour, in declaration order.
    pub const ALL: [Self; 8] = [
        Self::Red,
        Self::Green,
        Self::Blue,
        Self::Yellow,
        Self::Orange,
        Self::Pink,
        Self::Purple,
        Self::White,
    ];
}

// ---------------------------------------------------------------------------
// Governance
// ---------------------------------------------------------------------------

/// The governance regime of a bike for one round.
///
/// Variants are declared from least to most restrictive, so the derived
/// ordering is the restrictiveness ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Governance {
    /// Every rider votes; the weighted plurality decides.
    Democracy,
    /// An elected leader re-weights the riders' votes.
    Leadership,
    /// An elected dictator decides alone.
    Dictatorship,
}

impl Governance {
    /// Returns `true` if this regime elects a ruler.
    pub const fn has_ruler(self) -> bool {
        matches!(self, Self::Leadership | Self::Dictatorship)
    }
}

// ---------------------------------------------------------------------------
// BikerAction
// ---------------------------------------------------------------------------

/// What a rider intends to do with its seat for the coming round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BikerAction {
    /// Stay on the bike and pedal.
    Pedal,
    /// Leave the bike at the end of the round.
    LeaveBike,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn governance_order_is_restrictiveness() {
        assert!(Governance::Democracy < Governance::Leadership);
        assert!(Governance::Leadership < Governance::Dictatorship);
    }

    #[test]
    fn only_non_democratic_regimes_have_rulers() {
        assert!(!Governance::Democracy.has_ruler());
        assert!(Governance::Leadership.has_ruler());
        assert!(Governance::Dictatorship.has_ruler());
    }

    #[test]
    fn all_colours_are_distinct() {
        let set: std::collections::BTreeSet<Colour> = Colour::ALL.into_iter().collect();
        assert_eq!(set.len(), Colour::ALL.len());
    }
}
