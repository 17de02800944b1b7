//! Derived per-parent counters.
//!
//! Counters are never authoritative: at any moment they must equal the sum
//! over the parent's live (non-reorged) child events. `apply` folds one new
//! child in; `recompute` rebuilds from scratch after a reorg sweep. Both
//! store backends share this module so they cannot drift apart.

use serde::{Deserialize, Serialize};

use crate::events::{DomainEvent, ParentId, VoteSupport};

// ─── Per-parent aggregates ────────────────────────────────────────────────────

/// Vote tallies and lifecycle flags for a governance proposal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalTally {
    pub for_votes: u128,
    pub against_votes: u128,
    pub abstain_votes: u128,
    pub slashed_total: u128,
    pub executed: bool,
    pub canceled: bool,
}

/// Approval tallies for a wiki edit suggestion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionTally {
    pub approvals: u128,
    pub rejections: u128,
}

/// Trade volume and resolution state for a prediction market.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketStats {
    pub trade_count: u64,
    pub total_volume: u128,
    pub total_redeemed: u128,
    pub resolved: bool,
    pub winning_outcome: Option<u8>,
}

/// Aggregate state for one parent, whichever kind it is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParentAggregate {
    Proposal(ProposalTally),
    Suggestion(SuggestionTally),
    Market(MarketStats),
}

impl ParentAggregate {
    /// Zeroed aggregate of the right shape for `parent`.
    pub fn empty_for(parent: ParentId) -> Self {
        match parent {
            ParentId::Proposal(_) => Self::Proposal(ProposalTally::default()),
            ParentId::Suggestion(_) => Self::Suggestion(SuggestionTally::default()),
            ParentId::Market(_) => Self::Market(MarketStats::default()),
        }
    }

    /// Fold one child event into the counters.
    ///
    /// Must be called exactly once per first-time insert — the store only
    /// applies this when the idempotent insert actually took.
    pub fn apply(&mut self, event: &DomainEvent) {
        match (self, event) {
            (Self::Proposal(t), DomainEvent::VoteCast(v)) => match v.support {
                VoteSupport::For => t.for_votes += v.weight,
                VoteSupport::Against => t.against_votes += v.weight,
                VoteSupport::Abstain => t.abstain_votes += v.weight,
            },
            (Self::Proposal(t), DomainEvent::ProposalExecuted(_)) => t.executed = true,
            (Self::Proposal(t), DomainEvent::ProposalCanceled(_)) => t.canceled = true,
            (Self::Proposal(t), DomainEvent::StakeSlashed(s)) => t.slashed_total += s.amount,
            (Self::Suggestion(t), DomainEvent::SuggestionVoted(v)) => {
                if v.approve {
                    t.approvals += v.weight;
                } else {
                    t.rejections += v.weight;
                }
            }
            (Self::Market(m), DomainEvent::TradePlaced(t)) => {
                m.trade_count += 1;
                m.total_volume += t.amount;
            }
            (Self::Market(m), DomainEvent::MarketResolved(r)) => {
                m.resolved = true;
                m.winning_outcome = Some(r.winning_outcome);
            }
            (Self::Market(m), DomainEvent::CollateralRedeemed(r)) => {
                m.total_redeemed += r.amount;
            }
            // Created events carry no counters; mismatched kinds are impossible
            // for events routed by ParentId.
            _ => {}
        }
    }

    /// Rebuild the aggregate from the parent's live children.
    pub fn recompute<'a>(
        parent: ParentId,
        children: impl Iterator<Item = &'a DomainEvent>,
    ) -> Self {
        let mut agg = Self::empty_for(parent);
        for event in children {
            agg.apply(event);
        }
        agg
    }
}
