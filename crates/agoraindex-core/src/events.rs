//! The closed set of domain events emitted by the tracked contracts.
//!
//! Each event carries a typed payload and names the parent aggregate it
//! belongs to (a proposal, an edit suggestion, or a market). Parents are
//! created by their "created" event; child events feed the parent's derived
//! counters.

use serde::{Deserialize, Serialize};

// ─── Parents ──────────────────────────────────────────────────────────────────

/// Key of the aggregate a domain event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ParentId {
    Proposal(u64),
    Suggestion(u64),
    Market(u64),
}

impl std::fmt::Display for ParentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Proposal(id) => write!(f, "proposal/{id}"),
            Self::Suggestion(id) => write!(f, "suggestion/{id}"),
            Self::Market(id) => write!(f, "market/{id}"),
        }
    }
}

// ─── Payloads ─────────────────────────────────────────────────────────────────

/// How a governance vote was cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteSupport {
    Against,
    For,
    Abstain,
}

impl VoteSupport {
    /// Map the on-chain `support` byte (Governor convention).
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Against),
            1 => Some(Self::For),
            2 => Some(Self::Abstain),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalCreated {
    pub proposal_id: u64,
    pub proposer: String,
    pub description_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCast {
    pub proposal_id: u64,
    pub voter: String,
    pub support: VoteSupport,
    pub weight: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalExecuted {
    pub proposal_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalCanceled {
    pub proposal_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeSlashed {
    pub proposal_id: u64,
    pub staker: String,
    pub amount: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditSuggested {
    pub suggestion_id: u64,
    pub author: String,
    pub content_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionVoted {
    pub suggestion_id: u64,
    pub voter: String,
    pub approve: bool,
    pub weight: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketCreated {
    pub market_id: u64,
    pub creator: String,
    pub question_hash: String,
    pub outcome_count: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradePlaced {
    pub market_id: u64,
    pub trader: String,
    pub outcome: u8,
    pub amount: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketResolved {
    pub market_id: u64,
    pub winning_outcome: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralRedeemed {
    pub market_id: u64,
    pub redeemer: String,
    pub amount: u128,
}

// ─── DomainEvent ──────────────────────────────────────────────────────────────

/// Tag for each event kind, used for per-kind reorg counts and store routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventKind {
    ProposalCreated,
    VoteCast,
    ProposalExecuted,
    ProposalCanceled,
    StakeSlashed,
    EditSuggested,
    SuggestionVoted,
    MarketCreated,
    TradePlaced,
    MarketResolved,
    CollateralRedeemed,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ProposalCreated => "proposal_created",
            Self::VoteCast => "vote_cast",
            Self::ProposalExecuted => "proposal_executed",
            Self::ProposalCanceled => "proposal_canceled",
            Self::StakeSlashed => "stake_slashed",
            Self::EditSuggested => "edit_suggested",
            Self::SuggestionVoted => "suggestion_voted",
            Self::MarketCreated => "market_created",
            Self::TradePlaced => "trade_placed",
            Self::MarketResolved => "market_resolved",
            Self::CollateralRedeemed => "collateral_redeemed",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded event from one of the tracked contracts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomainEvent {
    ProposalCreated(ProposalCreated),
    VoteCast(VoteCast),
    ProposalExecuted(ProposalExecuted),
    ProposalCanceled(ProposalCanceled),
    StakeSlashed(StakeSlashed),
    EditSuggested(EditSuggested),
    SuggestionVoted(SuggestionVoted),
    MarketCreated(MarketCreated),
    TradePlaced(TradePlaced),
    MarketResolved(MarketResolved),
    CollateralRedeemed(CollateralRedeemed),
}

impl DomainEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ProposalCreated(_) => EventKind::ProposalCreated,
            Self::VoteCast(_) => EventKind::VoteCast,
            Self::ProposalExecuted(_) => EventKind::ProposalExecuted,
            Self::ProposalCanceled(_) => EventKind::ProposalCanceled,
            Self::StakeSlashed(_) => EventKind::StakeSlashed,
            Self::EditSuggested(_) => EventKind::EditSuggested,
            Self::SuggestionVoted(_) => EventKind::SuggestionVoted,
            Self::MarketCreated(_) => EventKind::MarketCreated,
            Self::TradePlaced(_) => EventKind::TradePlaced,
            Self::MarketResolved(_) => EventKind::MarketResolved,
            Self::CollateralRedeemed(_) => EventKind::CollateralRedeemed,
        }
    }

    /// The aggregate this event belongs to. "Created" events name the parent
    /// they bring into existence.
    pub fn parent(&self) -> ParentId {
        match self {
            Self::ProposalCreated(e) => ParentId::Proposal(e.proposal_id),
            Self::VoteCast(e) => ParentId::Proposal(e.proposal_id),
            Self::ProposalExecuted(e) => ParentId::Proposal(e.proposal_id),
            Self::ProposalCanceled(e) => ParentId::Proposal(e.proposal_id),
            Self::StakeSlashed(e) => ParentId::Proposal(e.proposal_id),
            Self::EditSuggested(e) => ParentId::Suggestion(e.suggestion_id),
            Self::SuggestionVoted(e) => ParentId::Suggestion(e.suggestion_id),
            Self::MarketCreated(e) => ParentId::Market(e.market_id),
            Self::TradePlaced(e) => ParentId::Market(e.market_id),
            Self::MarketResolved(e) => ParentId::Market(e.market_id),
            Self::CollateralRedeemed(e) => ParentId::Market(e.market_id),
        }
    }
}
