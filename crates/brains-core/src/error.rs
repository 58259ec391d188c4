use thiserror::Error;

use crate::position::{PositionKind, Round};
use crate::types::{Address, Amount, PositionId, Timestamp};

/// Broad class of a rejected call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller lacks a capability or does not own the position.
    Authorization,
    /// The call breaks a business rule.
    Policy,
    /// The call refers to data that does not have the required shape.
    Invariant,
    /// Deployment or schedule parameters are malformed.
    Configuration,
    /// Persistence failed.
    Storage,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrainsError {
    // ── Authorization ────────────────────────────────────────────────────────
    #[error("unauthorized: {caller} does not hold the {capability} capability")]
    Unauthorized { caller: Address, capability: &'static str },

    #[error("{caller} is neither the owner nor an approved delegate of chunk {position_id}")]
    NotPositionOwner { caller: Address, position_id: PositionId },

    // ── Policy ───────────────────────────────────────────────────────────────
    #[error("round mismatch: accumulator holds {existing} stake, deposit is {incoming}")]
    RoundMismatch { existing: Round, incoming: Round },

    #[error("cannot withdraw: {round} stake is still obligatory ({months_elapsed} months elapsed)")]
    StillObligatory { round: Round, months_elapsed: u64 },

    #[error("stake not matured: {round} withdrawal would still carry a {fee_bps} bps fee")]
    NotMatured { round: Round, fee_bps: u16 },

    #[error("insufficient collected fees: requested {requested}, available {available}")]
    InsufficientCollectedFees { requested: Amount, available: Amount },

    #[error("mint period ended at {ended_at}")]
    MintPeriodEnded { ended_at: Timestamp },

    #[error("mint limit exceeded: requested {requested}, remaining in window {remaining}")]
    MintLimitExceeded { requested: Amount, remaining: Amount },

    // ── Invariant ────────────────────────────────────────────────────────────
    #[error("no such {kind} position: {position_id}")]
    NoSuchPosition { kind: PositionKind, position_id: PositionId },

    #[error("no accumulator position for {0}")]
    NoAccumulator(Address),

    #[error("{owner} already holds a {kind} position")]
    PositionExists { kind: PositionKind, owner: Address },

    #[error("amount must be greater than zero")]
    ZeroAmount,

    #[error("insufficient balance: need {need}, have {have}")]
    InsufficientBalance { need: Amount, have: Amount },

    #[error("insufficient allowance: need {need}, have {have}")]
    InsufficientAllowance { need: Amount, have: Amount },

    #[error("length mismatch: {recipients} recipients, {amounts} amounts")]
    LengthMismatch { recipients: usize, amounts: usize },

    #[error("the null address cannot receive tokens or positions")]
    InvalidRecipient,

    #[error("arithmetic overflow")]
    ArithmeticOverflow,

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    // ── Configuration ────────────────────────────────────────────────────────
    #[error("invalid fee schedule: {0}")]
    InvalidFeeSchedule(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Serialization / storage ──────────────────────────────────────────────
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl BrainsError {
    pub fn kind(&self) -> ErrorKind {
        use BrainsError::*;
        match self {
            Unauthorized { .. } | NotPositionOwner { .. } => ErrorKind::Authorization,

            RoundMismatch { .. }
            | StillObligatory { .. }
            | NotMatured { .. }
            | InsufficientCollectedFees { .. }
            | MintPeriodEnded { .. }
            | MintLimitExceeded { .. } => ErrorKind::Policy,

            NoSuchPosition { .. }
            | NoAccumulator(_)
            | PositionExists { .. }
            | ZeroAmount
            | InsufficientBalance { .. }
            | InsufficientAllowance { .. }
            | LengthMismatch { .. }
            | InvalidRecipient
            | ArithmeticOverflow
            | InvalidAddress(_) => ErrorKind::Invariant,

            InvalidFeeSchedule(_) | InvalidConfig(_) => ErrorKind::Configuration,

            Serialization(_) | Storage(_) => ErrorKind::Storage,
        }
    }
}
