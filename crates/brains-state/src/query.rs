use std::collections::BTreeSet;

use brains_core::position::{PositionKind, StakePosition};
use brains_core::types::{Address, Amount, PositionId, Timestamp};
use brains_fees::{months_elapsed, split_fee, WithdrawalDecision};
use once_cell::unsync::OnceCell;

use crate::engine::LedgerState;

/// A position together with what withdrawing it right now would mean.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PositionView {
    pub kind: PositionKind,
    pub position: StakePosition,
    pub months_elapsed: u64,
    pub decision: WithdrawalDecision,
    /// `(returned, fee)` for a fee-paying exit, when one is allowed.
    pub early_exit: Option<(Amount, Amount)>,
}

/// Read accessors over one `LedgerState` snapshot.
///
/// Holder indices are only stable within one snapshot, so enumerate
/// `staker_at(0..stakers_count())` against the same `StakeQuery`. The
/// combined staker list is built on first use and reused after that.
#[derive(Clone)]
pub struct StakeQuery<'a> {
    state: &'a LedgerState,
    stakers: OnceCell<Vec<Address>>,
}

impl<'a> StakeQuery<'a> {
    pub fn new(state: &'a LedgerState) -> Self {
        Self { state, stakers: OnceCell::new() }
    }

    pub fn height(&self) -> u64 {
        self.state.height
    }

    // ── Positions ────────────────────────────────────────────────────────────

    pub fn accumulator_of(&self, owner: &Address) -> Option<&'a StakePosition> {
        self.state.accumulators.position_of(owner)
    }

    pub fn chunk(&self, id: PositionId) -> Option<&'a StakePosition> {
        self.state.chunks.get(id)
    }

    pub fn chunks_of(&self, owner: &Address) -> Vec<&'a StakePosition> {
        self.state.chunks.positions_of(owner).collect()
    }

    pub fn chunk_count_of(&self, owner: &Address) -> usize {
        self.state.chunks.count_of(owner)
    }

    /// Accumulator plus every chunk `who` owns.
    pub fn total_staked(&self, who: &Address) -> Amount {
        self.state.accumulators.total_of(who) + self.state.chunks.total_of(who)
    }

    // ── Holder enumeration ───────────────────────────────────────────────────

    pub fn accumulator_holders_count(&self) -> usize {
        self.state.accumulators.holders_count()
    }

    pub fn accumulator_holder_at(&self, index: usize) -> Option<&'a Address> {
        self.state.accumulators.holder_at(index)
    }

    pub fn chunk_holders_count(&self) -> usize {
        self.state.chunks.holders_count()
    }

    pub fn chunk_holder_at(&self, index: usize) -> Option<&'a Address> {
        self.state.chunks.holder_at(index)
    }

    fn union(&self) -> &[Address] {
        self.stakers.get_or_init(|| {
            let mut out: Vec<Address> = self.state.accumulators.holders().copied().collect();
            let seen: BTreeSet<Address> = out.iter().copied().collect();
            out.extend(self.state.chunks.holders().filter(|a| !seen.contains(*a)).copied());
            out
        })
    }

    /// Every address with any stake: accumulator holders in index order,
    /// then holders of chunks only.
    pub fn stakers(&self) -> Vec<Address> {
        self.union().to_vec()
    }

    pub fn stakers_count(&self) -> usize {
        self.union().len()
    }

    pub fn staker_at(&self, index: usize) -> Option<Address> {
        self.union().get(index).copied()
    }

    // ── Pool & quotes ────────────────────────────────────────────────────────

    pub fn collected_fees(&self) -> Amount {
        self.state.staking.collected_fees()
    }

    pub fn threshold(&self) -> Amount {
        self.state.staking.threshold()
    }

    /// Principal in custody across both registries.
    pub fn total_locked(&self) -> Amount {
        self.state.accumulators.total_amount() + self.state.chunks.total_amount()
    }

    pub fn describe(&self, kind: PositionKind, position: &StakePosition, now: Timestamp) -> PositionView {
        let decision = self.state.staking.decision_for(position, now);
        let early_exit = match decision {
            WithdrawalDecision::Allowed { fee_bps } => split_fee(position.amount, fee_bps).ok(),
            WithdrawalDecision::Forbidden { .. } => None,
        };
        PositionView {
            kind,
            position: position.clone(),
            months_elapsed: months_elapsed(now.saturating_sub(position.start_time)),
            decision,
            early_exit,
        }
    }

    /// Views of everything `owner` holds, accumulator first.
    pub fn positions_of(&self, owner: &Address, now: Timestamp) -> Vec<PositionView> {
        let acc = self
            .accumulator_of(owner)
            .map(|p| self.describe(PositionKind::Accumulator, p, now));
        acc.into_iter()
            .chain(
                self.state
                    .chunks
                    .positions_of(owner)
                    .map(|p| self.describe(PositionKind::Chunk, p, now)),
            )
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brains_core::constants::{MINT_HORIZON_SECS, SECONDS_PER_MONTH};
    use brains_core::position::Round;
    use brains_fees::FeeTable;
    use brains_token::{BrainsToken, SupplyGuard};

    use crate::registry::{AccumulatorRegistry, ChunkRegistry};
    use crate::staking::{StakeStores, StakingLedger};

    const T0: Timestamp = 1_700_000_000;

    fn addr(label: &str) -> Address {
        Address::from_label(label)
    }

    /// State where each `(who, amount, round)` has been deposited at T0
    /// with a threshold of 100.
    fn staked(deposits: &[(Address, Amount, Round)]) -> LedgerState {
        let admin = addr("admin");
        let ledger = addr("ledger");
        let mut token = BrainsToken::new(admin, 1_000_000, SupplyGuard::new(T0, 0, MINT_HORIZON_SECS))
            .unwrap();
        let mut accumulators = AccumulatorRegistry::new(admin);
        let mut chunks = ChunkRegistry::new(admin);
        accumulators.grant_manager(&admin, ledger).unwrap();
        chunks.grant_manager(&admin, ledger).unwrap();
        let staking = StakingLedger::new(ledger, admin, 100, FeeTable::default());

        for (who, amount, round) in deposits {
            token.transfer(&admin, who, *amount).unwrap();
            token.approve(who, &ledger, *amount).unwrap();
            let stores = StakeStores {
                token: &mut token,
                accumulators: &mut accumulators,
                chunks: &mut chunks,
            };
            staking.deposit(stores, who, who, *amount, *round, T0).unwrap();
        }
        LedgerState::new(token, accumulators, chunks, staking)
    }

    #[test]
    fn total_staked_sums_both_registries() {
        let alice = addr("alice");
        let state = staked(&[(alice, 250, Round::Public)]);
        let q = StakeQuery::new(&state);
        assert_eq!(q.total_staked(&alice), 250);
        assert_eq!(q.chunk_count_of(&alice), 2);
        assert_eq!(q.accumulator_of(&alice).map(|p| p.amount), Some(50));
        assert_eq!(q.total_locked(), 250);
    }

    #[test]
    fn stakers_are_a_union() {
        let (alice, bob, carol) = (addr("alice"), addr("bob"), addr("carol"));
        let state = staked(&[
            (alice, 150, Round::Public),
            (bob, 100, Round::Public),
            (carol, 40, Round::Public),
        ]);
        let q = StakeQuery::new(&state);
        assert_eq!(q.accumulator_holders_count(), 2);
        assert_eq!(q.chunk_holders_count(), 2);
        assert_eq!(q.stakers_count(), 3);
        assert_eq!(q.stakers(), vec![alice, carol, bob]);
        assert_eq!(q.staker_at(2), Some(bob));
        assert_eq!(q.staker_at(3), None);
    }

    #[test]
    fn indexed_enumeration_matches_list() {
        let stakers: Vec<Address> = (0..40).map(|i| addr(&format!("s{i}"))).collect();
        let deposits: Vec<(Address, Amount, Round)> = stakers
            .iter()
            .enumerate()
            .map(|(i, s)| (*s, [40, 100, 160][i % 3], Round::Public))
            .collect();
        let state = staked(&deposits);
        let q = StakeQuery::new(&state);

        let listed = q.stakers();
        assert_eq!(q.stakers_count(), stakers.len());
        let indexed: Vec<Address> = (0..q.stakers_count()).filter_map(|i| q.staker_at(i)).collect();
        assert_eq!(indexed, listed);
        // Accumulator holders (40 and 160) come first, then chunk-only (100).
        assert_eq!(q.staker_at(0), Some(stakers[0]));
        assert_eq!(listed.last(), Some(&stakers[37]));
    }

    #[test]
    fn describe_quotes_early_exit() {
        let alice = addr("alice");
        let state = staked(&[(alice, 100, Round::Seed)]);
        let q = StakeQuery::new(&state);

        let locked = q.positions_of(&alice, T0);
        assert_eq!(locked.len(), 1);
        assert!(matches!(locked[0].decision, WithdrawalDecision::Forbidden { .. }));
        assert_eq!(locked[0].early_exit, None);

        let later = q.positions_of(&alice, T0 + 14 * SECONDS_PER_MONTH);
        assert_eq!(later[0].months_elapsed, 14);
        assert_eq!(later[0].early_exit, Some((40, 60)));
    }
}
