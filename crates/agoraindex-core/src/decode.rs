//! Log decoding — binds raw logs to typed domain events.
//!
//! Each tracked contract registers an ordered list of event shapes. Decoding
//! tries the shapes in priority order and returns the first match; no two
//! shapes of the same contract share a signature, so the result is
//! deterministic — exactly zero or one shape matches. A log that matches no
//! shape is "unrecognized", which is not an error: the caller skips it.

use crate::events::{
    CollateralRedeemed, DomainEvent, EditSuggested, MarketCreated, MarketResolved,
    ProposalCanceled, ProposalCreated, ProposalExecuted, StakeSlashed, SuggestionVoted,
    TradePlaced, VoteCast, VoteSupport,
};
use crate::types::RawLog;

// ─── Tracked contracts ────────────────────────────────────────────────────────

/// The fixed set of contracts the indexer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ContractKind {
    /// Governor: proposals, votes, execution, cancellation, slashing.
    Governance,
    /// Wiki forum: edit suggestions and suggestion votes.
    Forum,
    /// Prediction market: market creation, trades, resolution, redemption.
    Market,
}

impl ContractKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Governance => "governance",
            Self::Forum => "forum",
            Self::Market => "market",
        }
    }
}

impl std::fmt::Display for ContractKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Event signature hashes (topic0) ──────────────────────────────────────────

pub const PROPOSAL_CREATED_TOPIC: &str =
    "0x7d84a6263ae0d98d3329bd7b46bb4e8d6f98cd35a7adb45c274c8b7fd5ebd5e0";
pub const VOTE_CAST_TOPIC: &str =
    "0xb8e138887d0aa13bab447e82de9d5c1777041ecd21ca36ba824ff1e6c07ddda4";
pub const PROPOSAL_EXECUTED_TOPIC: &str =
    "0x712ae1383f79ac853f8d882153778e0260ef8f03b504e2866e0593e04d2b291f";
pub const PROPOSAL_CANCELED_TOPIC: &str =
    "0x789cf55be980739dad1d0699b93b58e806b51c9d96619bfa8fe0a28abaa7b30c";
pub const STAKE_SLASHED_TOPIC: &str =
    "0x0e54e0485cda2c2d8bb03d06cf0e4b5bd3ee7e226d0fb8b270e119d4a11b2f60";
pub const EDIT_SUGGESTED_TOPIC: &str =
    "0x3134e8a2e6d97e929a7e54011ea5485d7d196dd5f0ba4d4ef95803e8e3fc257f";
pub const SUGGESTION_VOTED_TOPIC: &str =
    "0x4d99b957a2bc29a30ebd96a7be8e68fe50a3c701db28a3436cf9a63781ac10f3";
pub const MARKET_CREATED_TOPIC: &str =
    "0x8be0079c531659141344cd1fd0a4f28419497f9722a3daafe3b4186f6b6457e0";
pub const TRADE_PLACED_TOPIC: &str =
    "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";
pub const MARKET_RESOLVED_TOPIC: &str =
    "0x1b3be1097f1a4b8cb32cafd6b22e22e8c1eb4b4f0e03dfb5834b4e6e32e5e06a";
pub const COLLATERAL_REDEEMED_TOPIC: &str =
    "0x884edad9ce6fa2440d8a54cc123490eb96d2768479d49ff9c7366125a9424364";

// ─── Hex helpers ──────────────────────────────────────────────────────────────

/// Parse a hex quantity (with or without `0x`) into `u64`.
pub fn parse_hex_u64(s: &str) -> Option<u64> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(s, 16).ok()
}

/// Parse a hex quantity (with or without `0x`) into `u128`.
pub fn parse_hex_u128(s: &str) -> Option<u128> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    u128::from_str_radix(s, 16).ok()
}

/// The `i`-th 32-byte word of the log's data section, `0x`-prefixed.
pub fn data_word(data: &str, i: usize) -> Option<String> {
    let hex = data.strip_prefix("0x").unwrap_or(data);
    let start = i * 64;
    let end = start + 64;
    if hex.len() < end {
        return None;
    }
    Some(format!("0x{}", &hex[start..end]))
}

/// Topic `i` interpreted as a u64 quantity.
fn topic_u64(log: &RawLog, i: usize) -> Option<u64> {
    parse_hex_u64(log.topics.get(i)?)
}

/// Topic `i` interpreted as an address (low 20 bytes of the word).
fn topic_address(log: &RawLog, i: usize) -> Option<String> {
    let word = log.topics.get(i)?;
    let hex = word.strip_prefix("0x").unwrap_or(word);
    if hex.len() < 40 {
        return None;
    }
    Some(format!("0x{}", &hex[hex.len() - 40..]))
}

// ─── Shapes ───────────────────────────────────────────────────────────────────

/// One candidate event layout for a contract.
pub struct EventShape {
    /// Human-readable shape name for skip logging.
    pub name: &'static str,
    /// Attempt to bind the log's topics/data to a typed payload.
    pub decode: fn(&RawLog) -> Option<DomainEvent>,
}

fn decode_proposal_created(log: &RawLog) -> Option<DomainEvent> {
    if log.topic0()? != PROPOSAL_CREATED_TOPIC {
        return None;
    }
    Some(DomainEvent::ProposalCreated(ProposalCreated {
        proposal_id: topic_u64(log, 1)?,
        proposer: topic_address(log, 2)?,
        description_hash: data_word(&log.data, 0)?,
    }))
}

fn decode_vote_cast(log: &RawLog) -> Option<DomainEvent> {
    if log.topic0()? != VOTE_CAST_TOPIC {
        return None;
    }
    let support = parse_hex_u64(&data_word(&log.data, 0)?)?;
    Some(DomainEvent::VoteCast(VoteCast {
        proposal_id: topic_u64(log, 1)?,
        voter: topic_address(log, 2)?,
        support: VoteSupport::from_u8(u8::try_from(support).ok()?)?,
        weight: parse_hex_u128(&data_word(&log.data, 1)?)?,
    }))
}

fn decode_proposal_executed(log: &RawLog) -> Option<DomainEvent> {
    if log.topic0()? != PROPOSAL_EXECUTED_TOPIC {
        return None;
    }
    Some(DomainEvent::ProposalExecuted(ProposalExecuted {
        proposal_id: topic_u64(log, 1)?,
    }))
}

fn decode_proposal_canceled(log: &RawLog) -> Option<DomainEvent> {
    if log.topic0()? != PROPOSAL_CANCELED_TOPIC {
        return None;
    }
    Some(DomainEvent::ProposalCanceled(ProposalCanceled {
        proposal_id: topic_u64(log, 1)?,
    }))
}

fn decode_stake_slashed(log: &RawLog) -> Option<DomainEvent> {
    if log.topic0()? != STAKE_SLASHED_TOPIC {
        return None;
    }
    Some(DomainEvent::StakeSlashed(StakeSlashed {
        proposal_id: topic_u64(log, 1)?,
        staker: topic_address(log, 2)?,
        amount: parse_hex_u128(&data_word(&log.data, 0)?)?,
    }))
}

fn decode_edit_suggested(log: &RawLog) -> Option<DomainEvent> {
    if log.topic0()? != EDIT_SUGGESTED_TOPIC {
        return None;
    }
    Some(DomainEvent::EditSuggested(EditSuggested {
        suggestion_id: topic_u64(log, 1)?,
        author: topic_address(log, 2)?,
        content_hash: data_word(&log.data, 0)?,
    }))
}

fn decode_suggestion_voted(log: &RawLog) -> Option<DomainEvent> {
    if log.topic0()? != SUGGESTION_VOTED_TOPIC {
        return None;
    }
    let approve = parse_hex_u64(&data_word(&log.data, 0)?)?;
    Some(DomainEvent::SuggestionVoted(SuggestionVoted {
        suggestion_id: topic_u64(log, 1)?,
        voter: topic_address(log, 2)?,
        approve: approve != 0,
        weight: parse_hex_u128(&data_word(&log.data, 1)?)?,
    }))
}

fn decode_market_created(log: &RawLog) -> Option<DomainEvent> {
    if log.topic0()? != MARKET_CREATED_TOPIC {
        return None;
    }
    let outcome_count = parse_hex_u64(&data_word(&log.data, 1)?)?;
    Some(DomainEvent::MarketCreated(MarketCreated {
        market_id: topic_u64(log, 1)?,
        creator: topic_address(log, 2)?,
        question_hash: data_word(&log.data, 0)?,
        outcome_count: u8::try_from(outcome_count).ok()?,
    }))
}

fn decode_trade_placed(log: &RawLog) -> Option<DomainEvent> {
    if log.topic0()? != TRADE_PLACED_TOPIC {
        return None;
    }
    let outcome = parse_hex_u64(&data_word(&log.data, 0)?)?;
    Some(DomainEvent::TradePlaced(TradePlaced {
        market_id: topic_u64(log, 1)?,
        trader: topic_address(log, 2)?,
        outcome: u8::try_from(outcome).ok()?,
        amount: parse_hex_u128(&data_word(&log.data, 1)?)?,
    }))
}

fn decode_market_resolved(log: &RawLog) -> Option<DomainEvent> {
    if log.topic0()? != MARKET_RESOLVED_TOPIC {
        return None;
    }
    let outcome = parse_hex_u64(&data_word(&log.data, 0)?)?;
    Some(DomainEvent::MarketResolved(MarketResolved {
        market_id: topic_u64(log, 1)?,
        winning_outcome: u8::try_from(outcome).ok()?,
    }))
}

fn decode_collateral_redeemed(log: &RawLog) -> Option<DomainEvent> {
    if log.topic0()? != COLLATERAL_REDEEMED_TOPIC {
        return None;
    }
    Some(DomainEvent::CollateralRedeemed(CollateralRedeemed {
        market_id: topic_u64(log, 1)?,
        redeemer: topic_address(log, 2)?,
        amount: parse_hex_u128(&data_word(&log.data, 0)?)?,
    }))
}

const GOVERNANCE_SHAPES: &[EventShape] = &[
    EventShape { name: "ProposalCreated", decode: decode_proposal_created },
    EventShape { name: "VoteCast", decode: decode_vote_cast },
    EventShape { name: "ProposalExecuted", decode: decode_proposal_executed },
    EventShape { name: "ProposalCanceled", decode: decode_proposal_canceled },
    EventShape { name: "StakeSlashed", decode: decode_stake_slashed },
];

const FORUM_SHAPES: &[EventShape] = &[
    EventShape { name: "EditSuggested", decode: decode_edit_suggested },
    EventShape { name: "SuggestionVoted", decode: decode_suggestion_voted },
];

const MARKET_SHAPES: &[EventShape] = &[
    EventShape { name: "MarketCreated", decode: decode_market_created },
    EventShape { name: "TradePlaced", decode: decode_trade_placed },
    EventShape { name: "MarketResolved", decode: decode_market_resolved },
    EventShape { name: "CollateralRedeemed", decode: decode_collateral_redeemed },
];

/// The fixed-priority shape list for a contract.
pub fn shapes(contract: ContractKind) -> &'static [EventShape] {
    match contract {
        ContractKind::Governance => GOVERNANCE_SHAPES,
        ContractKind::Forum => FORUM_SHAPES,
        ContractKind::Market => MARKET_SHAPES,
    }
}

/// Try each shape registered for `contract` in priority order.
///
/// Returns the first successful decode, or `None` for an unrecognized log.
pub fn decode_log(contract: ContractKind, log: &RawLog) -> Option<DomainEvent> {
    shapes(contract).iter().find_map(|shape| (shape.decode)(log))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    fn word_u64(v: u64) -> String {
        format!("{v:064x}")
    }

    fn topic_word(v: u64) -> String {
        format!("0x{v:064x}")
    }

    fn addr_topic(addr: &str) -> String {
        let hex = addr.strip_prefix("0x").unwrap_or(addr);
        format!("0x{hex:0>64}")
    }

    fn log(topics: Vec<String>, data: String) -> RawLog {
        RawLog {
            address: "0xc0ffee".into(),
            topics,
            data,
            tx_hash: "0xtx".into(),
            log_index: 0,
            block_number: 100,
            block_hash: "0xb100".into(),
        }
    }

    #[test]
    fn decodes_vote_cast() {
        let l = log(
            vec![
                VOTE_CAST_TOPIC.into(),
                topic_word(7),
                addr_topic("0x1111111111111111111111111111111111111111"),
            ],
            format!("0x{}{}", word_u64(1), word_u64(250)),
        );
        let ev = decode_log(ContractKind::Governance, &l).expect("should decode");
        assert_eq!(ev.kind(), EventKind::VoteCast);
        let DomainEvent::VoteCast(v) = ev else { panic!() };
        assert_eq!(v.proposal_id, 7);
        assert_eq!(v.voter, "0x1111111111111111111111111111111111111111");
        assert_eq!(v.support, VoteSupport::For);
        assert_eq!(v.weight, 250);
    }

    #[test]
    fn decodes_trade_placed() {
        let l = log(
            vec![
                TRADE_PLACED_TOPIC.into(),
                topic_word(3),
                addr_topic("0x2222222222222222222222222222222222222222"),
            ],
            format!("0x{}{}", word_u64(1), word_u64(5000)),
        );
        let ev = decode_log(ContractKind::Market, &l).expect("should decode");
        let DomainEvent::TradePlaced(t) = ev else { panic!() };
        assert_eq!(t.market_id, 3);
        assert_eq!(t.outcome, 1);
        assert_eq!(t.amount, 5000);
    }

    #[test]
    fn unknown_topic_is_unrecognized_not_error() {
        let l = log(vec!["0xdeadbeef".into(), topic_word(1)], "0x".into());
        assert!(decode_log(ContractKind::Governance, &l).is_none());
        assert!(decode_log(ContractKind::Forum, &l).is_none());
        assert!(decode_log(ContractKind::Market, &l).is_none());
    }

    #[test]
    fn shape_from_other_contract_does_not_match() {
        // A vote-cast log handed to the Market decoder must not bind.
        let l = log(
            vec![VOTE_CAST_TOPIC.into(), topic_word(7), addr_topic("0x11")],
            format!("0x{}{}", word_u64(1), word_u64(250)),
        );
        assert!(decode_log(ContractKind::Market, &l).is_none());
    }

    #[test]
    fn truncated_data_fails_to_bind() {
        // VoteCast needs two data words; one word must not half-decode.
        let l = log(
            vec![
                VOTE_CAST_TOPIC.into(),
                topic_word(7),
                addr_topic("0x1111111111111111111111111111111111111111"),
            ],
            format!("0x{}", word_u64(1)),
        );
        assert!(decode_log(ContractKind::Governance, &l).is_none());
    }

    #[test]
    fn data_word_extraction() {
        let data = format!("0x{}{}", word_u64(0xaa), word_u64(0xbb));
        assert_eq!(parse_hex_u64(&data_word(&data, 0).unwrap()), Some(0xaa));
        assert_eq!(parse_hex_u64(&data_word(&data, 1).unwrap()), Some(0xbb));
        assert!(data_word(&data, 2).is_none());
    }
}
