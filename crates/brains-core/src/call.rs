use serde::{Deserialize, Serialize};

use crate::position::{PositionKind, Round};
use crate::types::{Address, Amount, Height, PositionId, Timestamp};

// ── Call ─────────────────────────────────────────────────────────────────────

/// Every state-changing entry point of the ledger is one of these variants.
/// The caller is supplied alongside the call, never inside it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Call {
    // ── Staking ──────────────────────────────────────────────────────────────

    /// Pull `amount` from the caller (who must have approved the ledger) and
    /// stake it for `beneficiary`.
    Deposit {
        beneficiary: Address,
        amount: Amount,
        round: Round,
    },

    /// Withdraw the caller's accumulator in full. Requires a zero fee.
    WithdrawAccumulator,

    /// Withdraw the caller's accumulator, paying the current early-exit fee.
    WithdrawAccumulatorWithFee,

    /// Withdraw a chunk owned by the caller. Requires a zero fee.
    WithdrawChunk { position_id: PositionId },

    /// Withdraw a chunk owned by the caller, paying the current early-exit fee.
    WithdrawChunkWithFee { position_id: PositionId },

    // ── Chunk ownership ──────────────────────────────────────────────────────

    /// Move a chunk to `to`. The caller must own it or be an approved delegate.
    TransferChunk { position_id: PositionId, to: Address },

    /// Approve (or clear, with `None`) a single-chunk delegate.
    ApproveChunk { position_id: PositionId, delegate: Option<Address> },

    /// Allow or revoke `operator` acting on every chunk the caller owns.
    SetChunkOperator { operator: Address, approved: bool },

    // ── Manager ──────────────────────────────────────────────────────────────

    /// Change the chunk size for future deposits.
    SetLiquidStakeThreshold { threshold: Amount },

    /// Pay out of the collected-fee pool.
    WithdrawCollectedFees { to: Address, amount: Amount },

    // ── Token ────────────────────────────────────────────────────────────────

    /// Issue new tokens under the yearly ceiling. Owner only.
    Mint { to: Address, amount: Amount },

    /// Destroy tokens from the caller's own balance.
    Burn { amount: Amount },

    Transfer { to: Address, amount: Amount },

    Approve { spender: Address, amount: Amount },

    /// Pairwise transfers from the caller. All or nothing.
    BatchTransfer { recipients: Vec<Address>, amounts: Vec<Amount> },
}

impl Call {
    /// Short stable name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Call::Deposit { .. } => "deposit",
            Call::WithdrawAccumulator => "withdraw_accumulator",
            Call::WithdrawAccumulatorWithFee => "withdraw_accumulator_with_fee",
            Call::WithdrawChunk { .. } => "withdraw_chunk",
            Call::WithdrawChunkWithFee { .. } => "withdraw_chunk_with_fee",
            Call::TransferChunk { .. } => "transfer_chunk",
            Call::ApproveChunk { .. } => "approve_chunk",
            Call::SetChunkOperator { .. } => "set_chunk_operator",
            Call::SetLiquidStakeThreshold { .. } => "set_liquid_stake_threshold",
            Call::WithdrawCollectedFees { .. } => "withdraw_collected_fees",
            Call::Mint { .. } => "mint",
            Call::Burn { .. } => "burn",
            Call::Transfer { .. } => "transfer",
            Call::Approve { .. } => "approve",
            Call::BatchTransfer { .. } => "batch_transfer",
        }
    }
}

// ── LedgerEvent ──────────────────────────────────────────────────────────────

/// Observable effect of a committed call.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum LedgerEvent {
    Staked { beneficiary: Address, amount: Amount, round: Round },
    AccumulatorCreated { owner: Address, position_id: PositionId, amount: Amount, round: Round },
    AccumulatorUpdated { owner: Address, position_id: PositionId, amount: Amount },
    AccumulatorBurned { owner: Address, position_id: PositionId },
    ChunkMinted { owner: Address, position_id: PositionId, amount: Amount, round: Round },
    ChunkTransferred { from: Address, to: Address, position_id: PositionId },
    ChunkApproved { owner: Address, position_id: PositionId, delegate: Option<Address> },
    OperatorSet { owner: Address, operator: Address, approved: bool },
    Unstaked {
        kind: PositionKind,
        position_id: PositionId,
        to: Address,
        returned: Amount,
        fee: Amount,
    },
    FeesWithdrawn { to: Address, amount: Amount },
    ThresholdChanged { previous: Amount, threshold: Amount },
    MintWindowReset { window_start: Timestamp },
    Minted { to: Address, amount: Amount },
    Burned { holder: Address, amount: Amount },
    Transferred { from: Address, to: Address, amount: Amount },
    Approved { owner: Address, spender: Address, amount: Amount },
}

/// Result of a committed call.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Receipt {
    /// Height the call was committed at.
    pub height: Height,
    pub events: Vec<LedgerEvent>,
}
