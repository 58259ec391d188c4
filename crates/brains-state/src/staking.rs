use brains_core::call::LedgerEvent;
use brains_core::error::BrainsError;
use brains_core::position::{PositionKind, Round, StakePosition};
use brains_core::types::{Address, Amount, PositionId, Timestamp};
use brains_fees::{split_fee, FeeTable, WithdrawalDecision};
use brains_token::BrainsToken;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::registry::{AccumulatorRegistry, ChunkRegistry};

/// Mutable views of the stores a staking operation touches.
///
/// The ledger itself owns none of them; `LedgerState` lends them out for the
/// duration of one call.
pub struct StakeStores<'a> {
    pub token: &'a mut BrainsToken,
    pub accumulators: &'a mut AccumulatorRegistry,
    pub chunks: &'a mut ChunkRegistry,
}

/// Whether a withdrawal may charge an early-exit fee.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ExitPath {
    /// Only a fully matured position may leave.
    Clean,
    /// Any position past its lockup may leave, paying the current fee.
    WithFee,
}

/// Moves stake between the token ledger and the two position registries.
///
/// `address` is the custody account: deposits are pulled into it, and
/// withdrawals and fee payouts are paid out of it. It must hold the manager
/// capability on both registries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingLedger {
    address: Address,
    admin: Address,
    threshold: Amount,
    fee_table: FeeTable,
    collected_fees: Amount,
}

impl StakingLedger {
    pub fn new(address: Address, admin: Address, threshold: Amount, fee_table: FeeTable) -> Self {
        Self { address, admin, threshold, fee_table, collected_fees: 0 }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn admin(&self) -> &Address {
        &self.admin
    }

    /// Chunk size for future deposits. Zero means no ceiling.
    pub fn threshold(&self) -> Amount {
        self.threshold
    }

    pub fn fee_table(&self) -> &FeeTable {
        &self.fee_table
    }

    pub fn collected_fees(&self) -> Amount {
        self.collected_fees
    }

    /// What a withdrawal of `position` at `now` would be subject to.
    pub fn decision_for(&self, position: &StakePosition, now: Timestamp) -> WithdrawalDecision {
        self.fee_table
            .evaluate(position.round, now.saturating_sub(position.start_time))
    }

    // ── Deposit ──────────────────────────────────────────────────────────────

    /// Pull `amount` from `caller` and stake it for `beneficiary`.
    ///
    /// The sum of the beneficiary's accumulator and the deposit is cut into
    /// as many `threshold`-sized chunks as fit, tagged with the incoming
    /// round. A non-zero residual stays in the accumulator under the round
    /// it already had (or the incoming round, for a fresh accumulator).
    pub fn deposit(
        &self,
        stores: StakeStores<'_>,
        caller: &Address,
        beneficiary: &Address,
        amount: Amount,
        round: Round,
        now: Timestamp,
    ) -> Result<Vec<LedgerEvent>, BrainsError> {
        if amount == 0 {
            return Err(BrainsError::ZeroAmount);
        }
        if beneficiary.is_null() {
            return Err(BrainsError::InvalidRecipient);
        }

        let existing = stores
            .accumulators
            .position_of(beneficiary)
            .map(|p| (p.id, p.amount, p.round));
        let held = existing.map(|(_, a, _)| a).unwrap_or(0);
        let total = held.checked_add(amount).ok_or(BrainsError::ArithmeticOverflow)?;

        if let Some((_, _, existing_round)) = existing {
            if existing_round != round && (self.threshold == 0 || total < self.threshold) {
                return Err(BrainsError::RoundMismatch { existing: existing_round, incoming: round });
            }
        }

        stores
            .token
            .transfer_from(&self.address, caller, &self.address, amount)?;

        let (chunk_count, residual) = match self.threshold {
            0 => (0, total),
            t => (total / t, total % t),
        };

        let mut events = vec![LedgerEvent::Staked { beneficiary: *beneficiary, amount, round }];

        match existing {
            None if residual > 0 => {
                let id = stores
                    .accumulators
                    .create(&self.address, beneficiary, residual, round, now)?;
                events.push(LedgerEvent::AccumulatorCreated {
                    owner: *beneficiary,
                    position_id: id,
                    amount: residual,
                    round,
                });
            }
            None => {}
            Some((id, _, _)) if residual > 0 => {
                stores.accumulators.set_amount(&self.address, id, residual)?;
                events.push(LedgerEvent::AccumulatorUpdated {
                    owner: *beneficiary,
                    position_id: id,
                    amount: residual,
                });
            }
            Some((id, _, _)) => {
                stores.accumulators.burn(&self.address, id)?;
                events.push(LedgerEvent::AccumulatorBurned { owner: *beneficiary, position_id: id });
            }
        }

        for _ in 0..chunk_count {
            let id = stores
                .chunks
                .create(&self.address, beneficiary, self.threshold, round, now)?;
            events.push(LedgerEvent::ChunkMinted {
                owner: *beneficiary,
                position_id: id,
                amount: self.threshold,
                round,
            });
        }

        info!(
            %beneficiary,
            amount,
            %round,
            chunks = chunk_count as u64,
            accumulator = residual,
            "stake deposited"
        );
        Ok(events)
    }

    // ── Withdrawals ──────────────────────────────────────────────────────────

    /// Withdraw `caller`'s whole accumulator. The position must be fully
    /// matured.
    pub fn withdraw_accumulator(
        &mut self,
        stores: StakeStores<'_>,
        caller: &Address,
        now: Timestamp,
    ) -> Result<Vec<LedgerEvent>, BrainsError> {
        self.exit_accumulator(stores, caller, now, ExitPath::Clean)
    }

    /// Withdraw `caller`'s whole accumulator, paying the current fee.
    pub fn withdraw_accumulator_with_fee(
        &mut self,
        stores: StakeStores<'_>,
        caller: &Address,
        now: Timestamp,
    ) -> Result<Vec<LedgerEvent>, BrainsError> {
        self.exit_accumulator(stores, caller, now, ExitPath::WithFee)
    }

    /// Withdraw one of `caller`'s chunks. The chunk must be fully matured.
    pub fn withdraw_chunk(
        &mut self,
        stores: StakeStores<'_>,
        caller: &Address,
        id: PositionId,
        now: Timestamp,
    ) -> Result<Vec<LedgerEvent>, BrainsError> {
        self.exit_chunk(stores, caller, id, now, ExitPath::Clean)
    }

    /// Withdraw one of `caller`'s chunks, paying the current fee.
    pub fn withdraw_chunk_with_fee(
        &mut self,
        stores: StakeStores<'_>,
        caller: &Address,
        id: PositionId,
        now: Timestamp,
    ) -> Result<Vec<LedgerEvent>, BrainsError> {
        self.exit_chunk(stores, caller, id, now, ExitPath::WithFee)
    }

    fn exit_accumulator(
        &mut self,
        stores: StakeStores<'_>,
        caller: &Address,
        now: Timestamp,
        path: ExitPath,
    ) -> Result<Vec<LedgerEvent>, BrainsError> {
        let position = stores
            .accumulators
            .position_of(caller)
            .cloned()
            .ok_or(BrainsError::NoAccumulator(*caller))?;
        let (returned, fee) = self.quote(&position, now, path)?;

        stores.accumulators.burn(&self.address, position.id)?;
        self.settle(stores.token, caller, PositionKind::Accumulator, position, returned, fee)
    }

    fn exit_chunk(
        &mut self,
        stores: StakeStores<'_>,
        caller: &Address,
        id: PositionId,
        now: Timestamp,
        path: ExitPath,
    ) -> Result<Vec<LedgerEvent>, BrainsError> {
        let position = stores.chunks.position(id)?.clone();
        if position.owner != *caller {
            return Err(BrainsError::NotPositionOwner { caller: *caller, position_id: id });
        }
        let (returned, fee) = self.quote(&position, now, path)?;

        stores.chunks.burn(&self.address, id)?;
        self.settle(stores.token, caller, PositionKind::Chunk, position, returned, fee)
    }

    /// Split a position into `(returned, fee)` or refuse the exit.
    fn quote(
        &self,
        position: &StakePosition,
        now: Timestamp,
        path: ExitPath,
    ) -> Result<(Amount, Amount), BrainsError> {
        match (self.decision_for(position, now), path) {
            (WithdrawalDecision::Forbidden { months_elapsed }, _) => Err(BrainsError::StillObligatory {
                round: position.round,
                months_elapsed,
            }),
            (WithdrawalDecision::Allowed { fee_bps: 0 }, _) => Ok((position.amount, 0)),
            (WithdrawalDecision::Allowed { fee_bps }, ExitPath::Clean) => Err(BrainsError::NotMatured {
                round: position.round,
                fee_bps,
            }),
            (WithdrawalDecision::Allowed { fee_bps }, ExitPath::WithFee) => split_fee(position.amount, fee_bps),
        }
    }

    /// Book the fee, then pay the holder. The position is already burned.
    fn settle(
        &mut self,
        token: &mut BrainsToken,
        to: &Address,
        kind: PositionKind,
        position: StakePosition,
        returned: Amount,
        fee: Amount,
    ) -> Result<Vec<LedgerEvent>, BrainsError> {
        self.collected_fees = self
            .collected_fees
            .checked_add(fee)
            .ok_or(BrainsError::ArithmeticOverflow)?;
        if returned > 0 {
            token.transfer(&self.address, to, returned)?;
        }

        info!(
            %kind,
            position_id = position.id,
            %to,
            returned,
            fee,
            collected_fees = self.collected_fees,
            "stake withdrawn"
        );
        Ok(vec![LedgerEvent::Unstaked { kind, position_id: position.id, to: *to, returned, fee }])
    }

    // ── Manager ──────────────────────────────────────────────────────────────

    fn ensure_admin(&self, caller: &Address) -> Result<(), BrainsError> {
        if *caller != self.admin {
            return Err(BrainsError::Unauthorized { caller: *caller, capability: "staking manager" });
        }
        Ok(())
    }

    /// Change the chunk size. Existing positions keep their shape.
    pub fn set_liquid_stake_threshold(
        &mut self,
        caller: &Address,
        threshold: Amount,
    ) -> Result<Vec<LedgerEvent>, BrainsError> {
        self.ensure_admin(caller)?;
        let previous = self.threshold;
        self.threshold = threshold;
        info!(previous, threshold, "liquid stake threshold changed");
        Ok(vec![LedgerEvent::ThresholdChanged { previous, threshold }])
    }

    /// Pay `amount` out of the collected-fee pool.
    pub fn withdraw_collected_fees(
        &mut self,
        token: &mut BrainsToken,
        caller: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<Vec<LedgerEvent>, BrainsError> {
        self.ensure_admin(caller)?;
        if amount == 0 {
            return Err(BrainsError::ZeroAmount);
        }
        if to.is_null() {
            return Err(BrainsError::InvalidRecipient);
        }
        if amount > self.collected_fees {
            return Err(BrainsError::InsufficientCollectedFees {
                requested: amount,
                available: self.collected_fees,
            });
        }

        self.collected_fees -= amount;
        token.transfer(&self.address, to, amount)?;

        info!(%to, amount, collected_fees = self.collected_fees, "collected fees withdrawn");
        Ok(vec![LedgerEvent::FeesWithdrawn { to: *to, amount }])
    }
}
