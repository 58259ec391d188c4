use std::sync::Arc;

use brains_core::call::{Call, LedgerEvent, Receipt};
use brains_core::error::BrainsError;
use brains_core::types::{Address, Height, Timestamp};
use brains_token::BrainsToken;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::db::StateDb;
use crate::registry::{AccumulatorRegistry, ChunkRegistry};
use crate::staking::{StakeStores, StakingLedger};

// ── LedgerState ──────────────────────────────────────────────────────────────

/// Everything the ledger knows at one height.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    /// Number of calls committed so far. Deployment is height 0.
    pub height: Height,
    /// Clock reading of the call that produced this height.
    pub committed_at: Timestamp,
    pub token: BrainsToken,
    pub accumulators: AccumulatorRegistry,
    pub chunks: ChunkRegistry,
    pub staking: StakingLedger,
}

impl LedgerState {
    pub fn new(
        token: BrainsToken,
        accumulators: AccumulatorRegistry,
        chunks: ChunkRegistry,
        staking: StakingLedger,
    ) -> Self {
        Self { height: 0, committed_at: 0, token, accumulators, chunks, staking }
    }

    /// Lend the stores out alongside the staking ledger.
    fn split(&mut self) -> (StakeStores<'_>, &mut StakingLedger) {
        let stores = StakeStores {
            token: &mut self.token,
            accumulators: &mut self.accumulators,
            chunks: &mut self.chunks,
        };
        (stores, &mut self.staking)
    }

    /// Run one call against this state. Leaves partial effects behind on
    /// error; `StateEngine` only ever calls this on a staged copy.
    fn execute(&mut self, caller: &Address, call: &Call, now: Timestamp) -> Result<Vec<LedgerEvent>, BrainsError> {
        // Custody only ever moves tokens as a side effect of staking calls.
        if caller == self.staking.address() {
            return Err(BrainsError::Unauthorized { caller: *caller, capability: "external caller" });
        }
        match call {
            // ── Staking ──────────────────────────────────────────────────────
            Call::Deposit { beneficiary, amount, round } => {
                let (stores, staking) = self.split();
                staking.deposit(stores, caller, beneficiary, *amount, *round, now)
            }
            Call::WithdrawAccumulator => {
                let (stores, staking) = self.split();
                staking.withdraw_accumulator(stores, caller, now)
            }
            Call::WithdrawAccumulatorWithFee => {
                let (stores, staking) = self.split();
                staking.withdraw_accumulator_with_fee(stores, caller, now)
            }
            Call::WithdrawChunk { position_id } => {
                let (stores, staking) = self.split();
                staking.withdraw_chunk(stores, caller, *position_id, now)
            }
            Call::WithdrawChunkWithFee { position_id } => {
                let (stores, staking) = self.split();
                staking.withdraw_chunk_with_fee(stores, caller, *position_id, now)
            }

            // ── Chunk ownership ──────────────────────────────────────────────
            Call::TransferChunk { position_id, to } => {
                let from = self.chunks.transfer(caller, *position_id, to)?;
                info!(position_id, %from, %to, "chunk transferred");
                Ok(vec![LedgerEvent::ChunkTransferred { from, to: *to, position_id: *position_id }])
            }
            Call::ApproveChunk { position_id, delegate } => {
                let owner = self.chunks.approve(caller, *position_id, *delegate)?;
                Ok(vec![LedgerEvent::ChunkApproved {
                    owner,
                    position_id: *position_id,
                    delegate: *delegate,
                }])
            }
            Call::SetChunkOperator { operator, approved } => {
                self.chunks.set_operator(caller, *operator, *approved)?;
                Ok(vec![LedgerEvent::OperatorSet {
                    owner: *caller,
                    operator: *operator,
                    approved: *approved,
                }])
            }

            // ── Manager ──────────────────────────────────────────────────────
            Call::SetLiquidStakeThreshold { threshold } => {
                self.staking.set_liquid_stake_threshold(caller, *threshold)
            }
            Call::WithdrawCollectedFees { to, amount } => {
                self.staking
                    .withdraw_collected_fees(&mut self.token, caller, to, *amount)
            }

            // ── Token ────────────────────────────────────────────────────────
            Call::Mint { to, amount } => {
                let outcome = self.token.mint(caller, to, *amount, now)?;
                let mut events = Vec::with_capacity(2);
                if let Some(window_start) = outcome.window_reset {
                    events.push(LedgerEvent::MintWindowReset { window_start });
                }
                events.push(LedgerEvent::Minted { to: *to, amount: *amount });
                Ok(events)
            }
            Call::Burn { amount } => {
                self.token.burn(caller, *amount)?;
                Ok(vec![LedgerEvent::Burned { holder: *caller, amount: *amount }])
            }
            Call::Transfer { to, amount } => {
                self.token.transfer(caller, to, *amount)?;
                Ok(vec![LedgerEvent::Transferred { from: *caller, to: *to, amount: *amount }])
            }
            Call::Approve { spender, amount } => {
                self.token.approve(caller, spender, *amount)?;
                Ok(vec![LedgerEvent::Approved { owner: *caller, spender: *spender, amount: *amount }])
            }
            Call::BatchTransfer { recipients, amounts } => {
                self.token.batch_transfer(caller, recipients, amounts)?;
                Ok(recipients
                    .iter()
                    .zip(amounts)
                    .map(|(to, amount)| LedgerEvent::Transferred { from: *caller, to: *to, amount: *amount })
                    .collect())
            }
        }
    }
}

// ── StateEngine ──────────────────────────────────────────────────────────────

/// The state transition engine.
///
/// Calls are applied one at a time. Each `apply` runs against a staged copy
/// of the state and commits only if the whole call succeeds, so a rejected
/// call leaves no trace.
pub struct StateEngine {
    state: LedgerState,
    db: Option<Arc<StateDb>>,
}

impl StateEngine {
    /// In-memory engine with no history.
    pub fn new(state: LedgerState) -> Self {
        Self { state, db: None }
    }

    /// Engine that persists every committed height to `db`, starting with
    /// `state` itself.
    pub fn with_db(state: LedgerState, db: Arc<StateDb>) -> Result<Self, BrainsError> {
        db.put_state(&state)?;
        db.flush()?;
        Ok(Self { state, db: Some(db) })
    }

    /// Resume from the head of an existing database.
    pub fn open(db: Arc<StateDb>) -> Result<Self, BrainsError> {
        let state = db
            .latest_state()?
            .ok_or_else(|| BrainsError::Storage("no committed state; deploy first".into()))?;
        Ok(Self { state, db: Some(db) })
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    pub fn height(&self) -> Height {
        self.state.height
    }

    pub fn db(&self) -> Option<&Arc<StateDb>> {
        self.db.as_ref()
    }

    /// Apply `call` on behalf of `caller` at time `now`.
    pub fn apply(&mut self, caller: &Address, call: Call, now: Timestamp) -> Result<Receipt, BrainsError> {
        let mut staged = self.state.clone();
        let events = match staged.execute(caller, &call, now) {
            Ok(events) => events,
            Err(e) => {
                warn!(call = call.name(), %caller, error = %e, "call rejected");
                return Err(e);
            }
        };

        staged.height += 1;
        staged.committed_at = now;
        if let Some(db) = &self.db {
            db.put_state(&staged)?;
        }
        self.state = staged;

        info!(
            call = call.name(),
            %caller,
            height = self.state.height,
            events = events.len(),
            "applied call"
        );
        Ok(Receipt { height: self.state.height, events })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brains_core::constants::{MINT_HORIZON_SECS, SECONDS_PER_MONTH, SECONDS_PER_YEAR};
    use brains_core::position::Round;
    use brains_core::types::Amount;
    use brains_core::ErrorKind;
    use brains_fees::FeeTable;
    use brains_token::SupplyGuard;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use crate::query::StakeQuery;

    const T0: Timestamp = 1_700_000_000;

    fn addr(label: &str) -> Address {
        Address::from_label(label)
    }

    fn owner() -> Address {
        addr("owner")
    }

    fn staking_addr() -> Address {
        addr("staking")
    }

    fn month(n: i64) -> Timestamp {
        T0 + n * SECONDS_PER_MONTH
    }

    fn genesis(threshold: Amount) -> LedgerState {
        let owner = owner();
        let token = BrainsToken::new(owner, 1_000_000, SupplyGuard::new(T0, 100_000, MINT_HORIZON_SECS))
            .unwrap();
        let mut accumulators = AccumulatorRegistry::new(owner);
        accumulators.grant_manager(&owner, staking_addr()).unwrap();
        let mut chunks = ChunkRegistry::new(owner);
        chunks.grant_manager(&owner, staking_addr()).unwrap();
        let staking = StakingLedger::new(staking_addr(), owner, threshold, FeeTable::default());
        let mut state = LedgerState::new(token, accumulators, chunks, staking);
        state.committed_at = T0;
        state
    }

    /// Engine with `stakers` funded and approved for the staking ledger.
    fn engine(threshold: Amount, stakers: &[Address]) -> StateEngine {
        let mut e = StateEngine::new(genesis(threshold));
        for s in stakers {
            e.apply(&owner(), Call::Transfer { to: *s, amount: 10_000 }, T0).unwrap();
            e.apply(s, Call::Approve { spender: staking_addr(), amount: 10_000 }, T0).unwrap();
        }
        e
    }

    fn deposit(e: &mut StateEngine, who: &Address, amount: Amount, round: Round, now: Timestamp) -> Result<Receipt, BrainsError> {
        e.apply(who, Call::Deposit { beneficiary: *who, amount, round }, now)
    }

    fn acc_amount(e: &StateEngine, who: &Address) -> Amount {
        e.state().accumulators.position_of(who).map(|p| p.amount).unwrap_or(0)
    }

    fn chunk_ids(e: &StateEngine, who: &Address) -> Vec<u64> {
        e.state().chunks.positions_of(who).map(|p| p.id).collect()
    }

    // ── Deposits ─────────────────────────────────────────────────────────────

    #[test]
    fn deposits_split_into_chunks_at_threshold() {
        let alice = addr("alice");
        let mut e = engine(100, &[alice]);

        deposit(&mut e, &alice, 150, Round::Public, T0).unwrap();
        assert_eq!(chunk_ids(&e, &alice).len(), 1);
        assert_eq!(acc_amount(&e, &alice), 50);

        deposit(&mut e, &alice, 60, Round::Public, T0).unwrap();
        assert_eq!(chunk_ids(&e, &alice).len(), 2);
        assert_eq!(acc_amount(&e, &alice), 10);

        let receipt = deposit(&mut e, &alice, 90, Round::Public, T0).unwrap();
        assert_eq!(chunk_ids(&e, &alice).len(), 3);
        assert!(e.state().accumulators.position_of(&alice).is_none());
        assert!(receipt
            .events
            .iter()
            .any(|ev| matches!(ev, LedgerEvent::AccumulatorBurned { .. })));
        assert_eq!(e.state().accumulators.holders_count(), 0);

        for chunk in e.state().chunks.positions_of(&alice) {
            assert_eq!(chunk.amount, 100);
        }
        assert_eq!(e.state().token.balance_of(&staking_addr()), 300);
        assert_eq!(e.state().token.balance_of(&alice), 10_000 - 300);
    }

    #[test]
    fn large_deposit_mints_several_chunks() {
        let alice = addr("alice");
        let mut e = engine(100, &[alice]);
        let receipt = deposit(&mut e, &alice, 450, Round::Seed, T0).unwrap();
        let minted = receipt
            .events
            .iter()
            .filter(|ev| matches!(ev, LedgerEvent::ChunkMinted { .. }))
            .count();
        assert_eq!(minted, 4);
        assert_eq!(acc_amount(&e, &alice), 50);
    }

    #[test]
    fn deposit_for_another_beneficiary() {
        let (alice, bob) = (addr("alice"), addr("bob"));
        let mut e = engine(100, &[alice]);
        e.apply(&alice, Call::Deposit { beneficiary: bob, amount: 120, round: Round::Public }, T0)
            .unwrap();
        assert_eq!(acc_amount(&e, &bob), 20);
        assert_eq!(chunk_ids(&e, &bob).len(), 1);
        assert_eq!(e.state().token.balance_of(&alice), 10_000 - 120);
    }

    #[test]
    fn round_mismatch_below_threshold_rejected() {
        let alice = addr("alice");
        let mut e = engine(100, &[alice]);
        deposit(&mut e, &alice, 50, Round::Seed, T0).unwrap();
        let before = e.state().clone();

        let err = deposit(&mut e, &alice, 20, Round::Public, T0).unwrap_err();
        assert_eq!(err, BrainsError::RoundMismatch { existing: Round::Seed, incoming: Round::Public });
        assert_eq!(err.kind(), ErrorKind::Policy);
        assert_eq!(e.state(), &before);

        deposit(&mut e, &alice, 20, Round::Seed, T0).unwrap();
        assert_eq!(acc_amount(&e, &alice), 70);
    }

    #[test]
    fn round_mismatch_with_no_threshold_rejected() {
        let alice = addr("alice");
        let mut e = engine(0, &[alice]);
        deposit(&mut e, &alice, 5_000, Round::Seed, T0).unwrap();
        assert!(matches!(
            deposit(&mut e, &alice, 4_000, Round::Public, T0).unwrap_err(),
            BrainsError::RoundMismatch { .. }
        ));
    }

    #[test]
    fn crossing_threshold_tags_chunk_with_incoming_round() {
        let alice = addr("alice");
        let mut e = engine(100, &[alice]);
        deposit(&mut e, &alice, 50, Round::Seed, T0).unwrap();
        deposit(&mut e, &alice, 60, Round::Public, month(1)).unwrap();

        let chunk = e.state().chunks.positions_of(&alice).next().unwrap().clone();
        assert_eq!((chunk.amount, chunk.round, chunk.start_time), (100, Round::Public, month(1)));
        let acc = e.state().accumulators.position_of(&alice).unwrap();
        assert_eq!((acc.amount, acc.round, acc.start_time), (10, Round::Seed, T0));
    }

    #[test]
    fn zero_threshold_keeps_everything_in_accumulator() {
        let alice = addr("alice");
        let mut e = engine(0, &[alice]);
        deposit(&mut e, &alice, 1_000, Round::Public, T0).unwrap();
        deposit(&mut e, &alice, 5_000, Round::Public, T0).unwrap();
        assert_eq!(acc_amount(&e, &alice), 6_000);
        assert!(e.state().chunks.is_empty());
    }

    #[test]
    fn deposit_needs_allowance() {
        let (alice, bob) = (addr("alice"), addr("bob"));
        let mut e = engine(100, &[alice]);
        e.apply(&owner(), Call::Transfer { to: bob, amount: 500 }, T0).unwrap();
        assert!(matches!(
            deposit(&mut e, &bob, 100, Round::Public, T0).unwrap_err(),
            BrainsError::InsufficientAllowance { need: 100, have: 0 }
        ));
        assert_eq!(deposit(&mut e, &alice, 0, Round::Public, T0).unwrap_err(), BrainsError::ZeroAmount);
    }

    #[test]
    fn threshold_change_is_prospective() {
        let alice = addr("alice");
        let mut e = engine(0, &[alice]);
        deposit(&mut e, &alice, 250, Round::Public, T0).unwrap();

        assert!(matches!(
            e.apply(&alice, Call::SetLiquidStakeThreshold { threshold: 100 }, T0).unwrap_err(),
            BrainsError::Unauthorized { .. }
        ));
        e.apply(&owner(), Call::SetLiquidStakeThreshold { threshold: 100 }, T0).unwrap();
        assert_eq!(acc_amount(&e, &alice), 250);
        assert!(e.state().chunks.is_empty());

        deposit(&mut e, &alice, 10, Round::Public, T0).unwrap();
        assert_eq!(chunk_ids(&e, &alice).len(), 2);
        assert_eq!(acc_amount(&e, &alice), 60);
    }

    // ── Withdrawals ──────────────────────────────────────────────────────────

    #[test]
    fn public_accumulator_withdraws_clean() {
        let alice = addr("alice");
        let mut e = engine(100, &[alice]);
        deposit(&mut e, &alice, 50, Round::Public, T0).unwrap();
        let receipt = e.apply(&alice, Call::WithdrawAccumulator, T0).unwrap();
        assert_eq!(
            receipt.events,
            vec![LedgerEvent::Unstaked {
                kind: brains_core::position::PositionKind::Accumulator,
                position_id: 1,
                to: alice,
                returned: 50,
                fee: 0,
            }]
        );
        assert_eq!(e.state().token.balance_of(&alice), 10_000);
        assert!(e.state().accumulators.is_empty());
    }

    #[test]
    fn withdraw_without_accumulator() {
        let alice = addr("alice");
        let mut e = engine(100, &[alice]);
        assert_eq!(
            e.apply(&alice, Call::WithdrawAccumulator, T0).unwrap_err(),
            BrainsError::NoAccumulator(alice)
        );
    }

    #[test]
    fn seed_lockup_then_fee_then_free() {
        let alice = addr("alice");
        let mut e = engine(0, &[alice]);
        deposit(&mut e, &alice, 1_000, Round::Seed, T0).unwrap();

        for call in [Call::WithdrawAccumulator, Call::WithdrawAccumulatorWithFee] {
            assert!(matches!(
                e.apply(&alice, call, month(12)).unwrap_err(),
                BrainsError::StillObligatory { round: Round::Seed, months_elapsed: 12 }
            ));
        }
        assert_eq!(
            e.apply(&alice, Call::WithdrawAccumulator, month(13)).unwrap_err(),
            BrainsError::NotMatured { round: Round::Seed, fee_bps: 6_500 }
        );

        let before = e.state().clone();
        e.apply(&alice, Call::WithdrawAccumulator, month(26)).unwrap();
        assert_eq!(e.state().token.balance_of(&alice), 10_000);

        // Same position, early exit at month 14 instead.
        let mut e = StateEngine::new(before);
        e.apply(&alice, Call::WithdrawAccumulatorWithFee, month(14)).unwrap();
        assert_eq!(e.state().staking.collected_fees(), 600);
        assert_eq!(e.state().token.balance_of(&alice), 9_000 + 400);
    }

    #[test]
    fn fee_returned_plus_fee_equals_amount() {
        let alice = addr("alice");
        let mut e = engine(0, &[alice]);
        deposit(&mut e, &alice, 999, Round::PreSale, T0).unwrap();
        let receipt = e.apply(&alice, Call::WithdrawAccumulatorWithFee, T0).unwrap();
        let LedgerEvent::Unstaked { returned, fee, .. } = receipt.events[0].clone() else {
            panic!("expected an unstake event");
        };
        assert_eq!(fee, 999 * 8_500 / 10_000);
        assert_eq!(returned + fee, 999);
        assert_eq!(e.state().token.balance_of(&staking_addr()), fee);
    }

    #[test]
    fn founder_cannot_leave_for_two_years() {
        let alice = addr("alice");
        let mut e = engine(100, &[alice]);
        deposit(&mut e, &alice, 100, Round::Founder, T0).unwrap();
        let id = chunk_ids(&e, &alice)[0];
        assert!(matches!(
            e.apply(&alice, Call::WithdrawChunkWithFee { position_id: id }, month(24)).unwrap_err(),
            BrainsError::StillObligatory { round: Round::Founder, .. }
        ));
        e.apply(&alice, Call::WithdrawChunkWithFee { position_id: id }, month(25)).unwrap();
        assert_eq!(e.state().staking.collected_fees(), 75);
    }

    #[test]
    fn chunk_withdraw_owner_only() {
        let (alice, bob) = (addr("alice"), addr("bob"));
        let mut e = engine(100, &[alice]);
        deposit(&mut e, &alice, 100, Round::Public, T0).unwrap();
        let id = chunk_ids(&e, &alice)[0];

        assert_eq!(
            e.apply(&bob, Call::WithdrawChunk { position_id: id }, T0).unwrap_err(),
            BrainsError::NotPositionOwner { caller: bob, position_id: id }
        );
        assert!(matches!(
            e.apply(&alice, Call::WithdrawChunk { position_id: 99 }, T0).unwrap_err(),
            BrainsError::NoSuchPosition { position_id: 99, .. }
        ));
        e.apply(&alice, Call::WithdrawChunk { position_id: id }, T0).unwrap();
        assert_eq!(e.state().chunks.holders_count(), 0);
    }

    #[test]
    fn collected_fee_pool_never_negative() {
        let (alice, treasury) = (addr("alice"), addr("treasury"));
        let mut e = engine(0, &[alice]);
        deposit(&mut e, &alice, 1_000, Round::PreSale, T0).unwrap();
        e.apply(&alice, Call::WithdrawAccumulatorWithFee, T0).unwrap();
        assert_eq!(e.state().staking.collected_fees(), 850);

        assert_eq!(
            e.apply(&owner(), Call::WithdrawCollectedFees { to: treasury, amount: 851 }, T0)
                .unwrap_err(),
            BrainsError::InsufficientCollectedFees { requested: 851, available: 850 }
        );
        assert!(matches!(
            e.apply(&alice, Call::WithdrawCollectedFees { to: alice, amount: 1 }, T0).unwrap_err(),
            BrainsError::Unauthorized { .. }
        ));

        e.apply(&owner(), Call::WithdrawCollectedFees { to: treasury, amount: 800 }, T0).unwrap();
        e.apply(&owner(), Call::WithdrawCollectedFees { to: treasury, amount: 50 }, T0).unwrap();
        assert_eq!(e.state().staking.collected_fees(), 0);
        assert_eq!(e.state().token.balance_of(&treasury), 850);
        assert!(e
            .apply(&owner(), Call::WithdrawCollectedFees { to: treasury, amount: 1 }, T0)
            .is_err());
    }

    // ── Chunk ownership ──────────────────────────────────────────────────────

    #[test]
    fn chunk_transfer_updates_holder_enumeration() {
        let (alice, bob) = (addr("alice"), addr("bob"));
        let mut e = engine(100, &[alice]);
        deposit(&mut e, &alice, 100, Round::Seed, T0).unwrap();
        let id = chunk_ids(&e, &alice)[0];

        e.apply(&alice, Call::TransferChunk { position_id: id, to: bob }, month(3)).unwrap();
        let chunks = &e.state().chunks;
        assert_eq!(chunks.holders_count(), 1);
        assert_eq!(chunks.holder_at(0), Some(&bob));
        assert!(!chunks.is_holder(&alice));

        // The receiver inherits the start time and round.
        let pos = chunks.get(id).unwrap();
        assert_eq!((pos.round, pos.start_time), (Round::Seed, T0));
        e.apply(&bob, Call::WithdrawChunkWithFee { position_id: id }, month(13)).unwrap();
        assert_eq!(e.state().token.balance_of(&bob), 35);
    }

    #[test]
    fn delegate_moves_approved_chunk() {
        let (alice, bob) = (addr("alice"), addr("bob"));
        let mut e = engine(100, &[alice]);
        deposit(&mut e, &alice, 100, Round::Public, T0).unwrap();
        let id = chunk_ids(&e, &alice)[0];

        assert!(e.apply(&bob, Call::TransferChunk { position_id: id, to: bob }, T0).is_err());
        e.apply(&alice, Call::ApproveChunk { position_id: id, delegate: Some(bob) }, T0).unwrap();
        e.apply(&bob, Call::TransferChunk { position_id: id, to: bob }, T0).unwrap();
        assert_eq!(chunk_ids(&e, &bob), vec![id]);
    }

    // ── Token ────────────────────────────────────────────────────────────────

    #[test]
    fn mint_reports_window_reset() {
        let alice = addr("alice");
        let mut e = engine(100, &[]);
        e.apply(&owner(), Call::Mint { to: alice, amount: 100_000 }, T0).unwrap();
        assert!(matches!(
            e.apply(&owner(), Call::Mint { to: alice, amount: 1 }, T0 + 10).unwrap_err(),
            BrainsError::MintLimitExceeded { .. }
        ));

        let later = T0 + SECONDS_PER_YEAR;
        let receipt = e.apply(&owner(), Call::Mint { to: alice, amount: 1 }, later).unwrap();
        assert_eq!(
            receipt.events,
            vec![
                LedgerEvent::MintWindowReset { window_start: later },
                LedgerEvent::Minted { to: alice, amount: 1 },
            ]
        );
    }

    #[test]
    fn batch_transfer_emits_per_recipient() {
        let (a, b) = (addr("a"), addr("b"));
        let mut e = engine(100, &[]);
        let receipt = e
            .apply(&owner(), Call::BatchTransfer { recipients: vec![a, b], amounts: vec![3, 4] }, T0)
            .unwrap();
        assert_eq!(receipt.events.len(), 2);
        assert!(e
            .apply(&owner(), Call::BatchTransfer { recipients: vec![a], amounts: vec![3, 4] }, T0)
            .is_err());
    }

    // ── Atomicity ────────────────────────────────────────────────────────────

    #[test]
    fn rejected_call_leaves_state_untouched() {
        let alice = addr("alice");
        let mut e = engine(100, &[alice]);
        deposit(&mut e, &alice, 150, Round::Seed, T0).unwrap();
        let before = e.state().clone();

        assert!(e.apply(&alice, Call::WithdrawAccumulatorWithFee, month(1)).is_err());
        assert!(deposit(&mut e, &alice, 20_000, Round::Seed, T0).is_err());
        assert_eq!(e.state(), &before);
        assert_eq!(e.height(), before.height);
    }

    #[test]
    fn custody_cannot_originate_calls() {
        let (alice, mallory) = (addr("alice"), addr("mallory"));
        let custody = staking_addr();
        let mut e = engine(100, &[alice]);
        deposit(&mut e, &alice, 500, Round::Public, T0).unwrap();
        let before = e.state().clone();

        let calls = [
            Call::Approve { spender: custody, amount: 500 },
            Call::Deposit { beneficiary: mallory, amount: 500, round: Round::Public },
            Call::Transfer { to: mallory, amount: 500 },
            Call::Burn { amount: 500 },
        ];
        for call in calls {
            let err = e.apply(&custody, call, T0).unwrap_err();
            assert_eq!(err, BrainsError::Unauthorized { caller: custody, capability: "external caller" });
        }
        assert_eq!(e.state(), &before);

        let state = e.state();
        assert_eq!(StakeQuery::new(state).total_staked(&mallory), 0);
        assert_eq!(
            state.token.balance_of(&custody),
            state.accumulators.total_amount() + state.chunks.total_amount() + state.staking.collected_fees()
        );
    }

    #[test]
    fn heights_count_committed_calls() {
        let alice = addr("alice");
        let mut e = engine(100, &[alice]);
        assert_eq!(e.height(), 2);
        let r = deposit(&mut e, &alice, 10, Round::Public, T0).unwrap();
        assert_eq!(r.height, 3);
        assert!(deposit(&mut e, &alice, 0, Round::Public, T0).is_err());
        assert_eq!(e.height(), 3);
    }

    #[test]
    fn random_sequences_conserve_stake() {
        let stakers = [addr("s0"), addr("s1"), addr("s2")];
        let threshold: Amount = 100;
        let mut e = engine(threshold, &stakers);
        let mut net = [0u128; 3];
        let mut rng = StdRng::seed_from_u64(0x5eed);

        for _ in 0..400 {
            let i = rng.gen_range(0..stakers.len());
            let who = stakers[i];
            match rng.gen_range(0..4) {
                0 | 1 => {
                    let amount = rng.gen_range(1..=250u128);
                    if deposit(&mut e, &who, amount, Round::Public, T0).is_ok() {
                        net[i] += amount;
                    }
                }
                2 => {
                    let held = acc_amount(&e, &who);
                    if e.apply(&who, Call::WithdrawAccumulator, T0).is_ok() {
                        net[i] -= held;
                    }
                }
                _ => {
                    if let Some(&id) = chunk_ids(&e, &who).first() {
                        e.apply(&who, Call::WithdrawChunk { position_id: id }, T0).unwrap();
                        net[i] -= threshold;
                    }
                }
            }

            let state = e.state();
            let query = StakeQuery::new(state);
            for (j, s) in stakers.iter().enumerate() {
                assert!(acc_amount(&e, s) < threshold);
                assert_eq!(query.total_staked(s), net[j]);
            }
            let custody = state.token.balance_of(&staking_addr());
            assert_eq!(
                custody,
                state.accumulators.total_amount() + state.chunks.total_amount() + state.staking.collected_fees()
            );
        }
    }

    // ── Persistence ──────────────────────────────────────────────────────────

    fn temp_db(name: &str) -> (std::path::PathBuf, Arc<StateDb>) {
        let dir = std::env::temp_dir().join(format!("brains_engine_test_{}", name));
        let _ = std::fs::remove_dir_all(&dir);
        let db = StateDb::open(&dir).expect("open temp db");
        (dir, Arc::new(db))
    }

    #[test]
    fn committed_heights_survive_reopen() {
        let alice = addr("alice");
        let (dir, db) = temp_db("reopen");
        {
            let mut e = StateEngine::with_db(genesis(100), db.clone()).unwrap();
            e.apply(&owner(), Call::Transfer { to: alice, amount: 500 }, T0).unwrap();
            e.apply(&alice, Call::Approve { spender: staking_addr(), amount: 500 }, T0).unwrap();
            deposit(&mut e, &alice, 150, Round::Public, T0).unwrap();
            assert!(deposit(&mut e, &alice, 1_000, Round::Public, T0).is_err());
            db.flush().unwrap();
        }

        assert_eq!(db.height().unwrap(), Some(3));
        let e = StateEngine::open(db.clone()).unwrap();
        assert_eq!(e.height(), 3);
        assert_eq!(acc_amount(&e, &alice), 50);

        // Historical reads see the ledger as it was.
        let at_genesis = db.state_at(0).unwrap().unwrap();
        assert_eq!(at_genesis.token.balance_of(&alice), 0);
        let before_deposit = db.state_at(2).unwrap().unwrap();
        assert!(before_deposit.accumulators.is_empty());
        assert_eq!(db.state_at(99).unwrap().unwrap().height, 3);

        drop(e);
        drop(db);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn head_height_matches_latest_snapshot() {
        let alice = addr("alice");
        let (dir, db) = temp_db("head");
        fn agree(db: &StateDb) {
            let latest = db.latest_state().unwrap().map(|s| s.height);
            assert_eq!(db.height().unwrap(), latest);
        }
        agree(&db);

        let mut e = StateEngine::with_db(genesis(100), db.clone()).unwrap();
        agree(&db);
        e.apply(&owner(), Call::Transfer { to: alice, amount: 500 }, T0).unwrap();
        agree(&db);
        assert!(e.apply(&alice, Call::Transfer { to: owner(), amount: 9_999 }, T0).is_err());
        agree(&db);
        assert_eq!(db.height().unwrap(), Some(e.height()));

        drop(e);
        drop(db);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn snapshots_readable_by_commit_time() {
        let alice = addr("alice");
        let (dir, db) = temp_db("by_time");
        let mut e = StateEngine::with_db(genesis(100), db.clone()).unwrap();
        e.apply(&owner(), Call::Transfer { to: alice, amount: 500 }, month(1)).unwrap();
        e.apply(&alice, Call::Approve { spender: staking_addr(), amount: 500 }, month(2)).unwrap();
        deposit(&mut e, &alice, 150, Round::Public, month(3)).unwrap();
        assert_eq!(e.state().committed_at, month(3));

        assert!(db.state_at_time(T0 - 1).unwrap().is_none());
        assert_eq!(db.state_at_time(T0).unwrap().unwrap().height, 0);
        let mid = db.state_at_time(month(2) + 5).unwrap().unwrap();
        assert_eq!((mid.height, mid.committed_at), (2, month(2)));
        assert!(mid.accumulators.is_empty());
        let head = db.state_at_time(month(12)).unwrap().unwrap();
        assert_eq!(StakeQuery::new(&head).total_staked(&alice), 150);

        drop(e);
        drop(db);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn open_empty_db_fails() {
        let (dir, db) = temp_db("empty");
        assert_eq!(StateEngine::open(db.clone()).err().map(|e| e.kind()), Some(ErrorKind::Storage));
        assert!(db.state_at(5).unwrap().is_none());
        drop(db);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
