//! brains-fees
//!
//! Withdrawal policy for staked positions. Pure functions only: given the
//! round a position was acquired in and how long it has existed, decide
//! whether it may be withdrawn and at what fee.
//!
//! Each round carries its own step table of `(month, fee_bps)` pairs.
//! Obligatory rounds forbid any withdrawal before their first step;
//! the others charge the first step's fee from day one.

pub mod schedule;

pub use schedule::{
    months_elapsed, split_fee, FeeStep, FeeTable, RoundSchedule, WithdrawalDecision,
};
