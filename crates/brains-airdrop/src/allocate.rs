use std::collections::BTreeMap;

use brains_core::constants::ONE_TOKEN;
use brains_core::types::{Address, Amount};
use brains_state::StakeQuery;
use brains_token::TokenLedger;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::math::mul_div;

// ── Inputs ───────────────────────────────────────────────────────────────────

/// The staking ledger's read interface, as the allocator sees it.
pub trait StakeSnapshot {
    fn stakers_count(&self) -> usize;
    fn staker_at(&self, index: usize) -> Option<Address>;
    fn total_staked(&self, who: &Address) -> Amount;

    /// All stakers in index order.
    fn stakers(&self) -> Vec<Address> {
        (0..self.stakers_count()).filter_map(|i| self.staker_at(i)).collect()
    }
}

impl StakeSnapshot for StakeQuery<'_> {
    fn stakers_count(&self) -> usize {
        StakeQuery::stakers_count(self)
    }

    fn staker_at(&self, index: usize) -> Option<Address> {
        StakeQuery::staker_at(self, index)
    }

    fn total_staked(&self, who: &Address) -> Amount {
        StakeQuery::total_staked(self, who)
    }

    fn stakers(&self) -> Vec<Address> {
        StakeQuery::stakers(self)
    }
}

/// Per-staker multiplier source, scaled by 1e18.
pub trait AuxBalances {
    fn aux_balance(&self, who: &Address) -> Amount;
}

impl AuxBalances for TokenLedger {
    fn aux_balance(&self, who: &Address) -> Amount {
        self.balance_of(who)
    }
}

impl AuxBalances for BTreeMap<Address, Amount> {
    fn aux_balance(&self, who: &Address) -> Amount {
        self.get(who).copied().unwrap_or(0)
    }
}

// ── Output ───────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub staker: Address,
    pub staked: Amount,
    /// 1e18 is 1x.
    pub multiplier: Amount,
    pub weight: Amount,
    pub amount: Amount,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AllocationError {
    #[error("nothing is staked; cannot split {total}")]
    NoStake { total: Amount },

    #[error("weight of {0} does not fit in 128 bits")]
    Overflow(Address),
}

/// Split `total` across every staker in `snapshot` by multiplied stake.
pub fn allocate<S, A>(snapshot: &S, aux: &A, total: Amount) -> Result<Vec<Allocation>, AllocationError>
where
    S: StakeSnapshot + ?Sized,
    A: AuxBalances + ?Sized,
{
    let mut rows = Vec::new();
    let mut total_weight: Amount = 0;

    for staker in snapshot.stakers() {
        let staked = snapshot.total_staked(&staker);
        let multiplier = match aux.aux_balance(&staker) {
            0 => ONE_TOKEN,
            m => m,
        };
        let weight = mul_div(staked, multiplier, ONE_TOKEN).ok_or(AllocationError::Overflow(staker))?;
        total_weight = total_weight
            .checked_add(weight)
            .ok_or(AllocationError::Overflow(staker))?;
        rows.push(Allocation { staker, staked, multiplier, weight, amount: 0 });
    }

    if total_weight == 0 {
        return Err(AllocationError::NoStake { total });
    }
    for row in &mut rows {
        // weight <= total_weight, so the share never exceeds `total`.
        row.amount = mul_div(total, row.weight, total_weight).ok_or(AllocationError::Overflow(row.staker))?;
        debug!(staker = %row.staker, weight = row.weight, amount = row.amount, "airdrop share");
    }
    Ok(rows)
}
