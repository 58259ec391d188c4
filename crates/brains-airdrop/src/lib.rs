//! brains-airdrop
//!
//! Proportional distribution over a staking snapshot. Lives outside the
//! ledger and reads only its public interface: the enumerable staker list,
//! each staker's total stake, and a balance in an auxiliary token that acts
//! as a per-staker multiplier.
//!
//! ```text
//! multiplier = aux balance, or 1.0 (1e18) when the balance is zero
//! weight     = staked * multiplier / 1e18
//! share      = total * weight / sum(weight)
//! ```
//!
//! All divisions round down, so the shares sum to at most `total`.

pub mod allocate;
pub mod math;

pub use allocate::{allocate, Allocation, AllocationError, AuxBalances, StakeSnapshot};
pub use math::mul_div;
