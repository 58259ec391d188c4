use std::collections::BTreeMap;

use brains_core::constants::{BASIS_POINTS_DENOMINATOR, MAX_FEE_BPS, SECONDS_PER_MONTH};
use brains_core::error::BrainsError;
use brains_core::position::Round;
use brains_core::types::Amount;
use serde::{Deserialize, Serialize};

/// One breakpoint: from `month` onwards the fee is `fee_bps`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeStep {
    pub month: u32,
    pub fee_bps: u16,
}

/// Outcome of evaluating a schedule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WithdrawalDecision {
    /// No withdrawal of any kind yet.
    Forbidden { months_elapsed: u64 },
    /// Withdrawal permitted at this fee.
    Allowed { fee_bps: u16 },
}

impl WithdrawalDecision {
    pub fn is_fee_free(&self) -> bool {
        matches!(self, WithdrawalDecision::Allowed { fee_bps: 0 })
    }
}

/// Whole 30-day months between a position's start and `now`.
/// Negative spans (clock skew) count as zero.
pub fn months_elapsed(elapsed_secs: i64) -> u64 {
    if elapsed_secs <= 0 {
        0
    } else {
        (elapsed_secs / SECONDS_PER_MONTH) as u64
    }
}

/// Split `amount` into `(returned, fee)` at `fee_bps`, rounding the fee down.
/// `returned + fee == amount` always holds.
pub fn split_fee(amount: Amount, fee_bps: u16) -> Result<(Amount, Amount), BrainsError> {
    let fee = amount
        .checked_mul(fee_bps as u128)
        .ok_or(BrainsError::ArithmeticOverflow)?
        / BASIS_POINTS_DENOMINATOR;
    Ok((amount - fee, fee))
}

// ── RoundSchedule ────────────────────────────────────────────────────────────

/// Withdrawal policy of one round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSchedule {
    /// Before the first step nothing may be withdrawn.
    pub obligatory: bool,
    /// Ascending by month, fees non-increasing, ending at zero.
    pub steps: Vec<FeeStep>,
}

impl RoundSchedule {
    /// Always withdrawable, never charged.
    pub fn unrestricted() -> Self {
        Self { obligatory: false, steps: Vec::new() }
    }

    /// Steps for `from_month..=zero_month`, starting at `from_bps` and
    /// dropping `step_bps` a month, with the fee at `zero_month` pinned to 0.
    pub fn declining(from_month: u32, from_bps: u16, step_bps: u16, zero_month: u32) -> Vec<FeeStep> {
        (from_month..=zero_month)
            .map(|month| {
                let fee_bps = if month == zero_month {
                    0
                } else {
                    from_bps.saturating_sub(step_bps.saturating_mul((month - from_month) as u16))
                };
                FeeStep { month, fee_bps }
            })
            .collect()
    }

    pub fn evaluate(&self, elapsed_secs: i64) -> WithdrawalDecision {
        let months = months_elapsed(elapsed_secs);
        match self.steps.iter().rev().find(|s| s.month as u64 <= months) {
            Some(step) => WithdrawalDecision::Allowed { fee_bps: step.fee_bps },
            None if self.obligatory => WithdrawalDecision::Forbidden { months_elapsed: months },
            None => WithdrawalDecision::Allowed {
                fee_bps: self.steps.first().map(|s| s.fee_bps).unwrap_or(0),
            },
        }
    }

    /// First month at which withdrawal is free, if the schedule ever gets there.
    pub fn maturity_month(&self) -> Option<u32> {
        if self.steps.is_empty() && !self.obligatory {
            return Some(0);
        }
        self.steps.iter().find(|s| s.fee_bps == 0).map(|s| s.month)
    }

    pub fn validate(&self, round: Round) -> Result<(), BrainsError> {
        let bad = |msg: String| Err(BrainsError::InvalidFeeSchedule(format!("{round}: {msg}")));

        if self.steps.is_empty() {
            if self.obligatory {
                return bad("obligatory round needs at least one step".into());
            }
            return Ok(());
        }
        for step in &self.steps {
            if step.fee_bps > MAX_FEE_BPS {
                return bad(format!("fee {} bps above {MAX_FEE_BPS}", step.fee_bps));
            }
        }
        for pair in self.steps.windows(2) {
            if pair[1].month <= pair[0].month {
                return bad(format!("month {} does not follow month {}", pair[1].month, pair[0].month));
            }
            if pair[1].fee_bps > pair[0].fee_bps {
                return bad(format!("fee rises at month {}", pair[1].month));
            }
        }
        if self.steps.last().map(|s| s.fee_bps) != Some(0) {
            return bad("schedule must end at a zero fee".into());
        }
        Ok(())
    }
}

// ── FeeTable ─────────────────────────────────────────────────────────────────

/// Withdrawal schedules for every round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeTable {
    pub schedules: BTreeMap<Round, RoundSchedule>,
}

impl Default for FeeTable {
    /// The production schedules.
    ///
    /// | round                | lockup      | fee steps                                   |
    /// |----------------------|-------------|---------------------------------------------|
    /// | public               | none        | none                                        |
    /// | pre_sale             | none        | 85% M0, 80% M3, 75% M6, 70% M9, 65% M12, −5%/month, 0% M25 |
    /// | seed                 | until M13   | 65% M13, −5%/month, 0% M26                  |
    /// | strategic_or_private | until M13   | 70% M13, −5%/month to 15% M24, 0% M25       |
    /// | founder              | until M25   | 75% M25, −5%/month, 0% M40                  |
    fn default() -> Self {
        let mut pre_sale = vec![
            FeeStep { month: 0, fee_bps: 8_500 },
            FeeStep { month: 3, fee_bps: 8_000 },
            FeeStep { month: 6, fee_bps: 7_500 },
            FeeStep { month: 9, fee_bps: 7_000 },
        ];
        pre_sale.extend(RoundSchedule::declining(12, 6_500, 500, 25));

        let schedules = BTreeMap::from([
            (Round::Public, RoundSchedule::unrestricted()),
            (Round::PreSale, RoundSchedule { obligatory: false, steps: pre_sale }),
            (
                Round::Seed,
                RoundSchedule { obligatory: true, steps: RoundSchedule::declining(13, 6_500, 500, 26) },
            ),
            (
                Round::StrategicOrPrivate,
                RoundSchedule { obligatory: true, steps: RoundSchedule::declining(13, 7_000, 500, 25) },
            ),
            (
                Round::Founder,
                RoundSchedule { obligatory: true, steps: RoundSchedule::declining(25, 7_500, 500, 40) },
            ),
        ]);
        Self { schedules }
    }
}

impl FeeTable {
    /// Schedule for `round`. A round missing from a hand-written table is
    /// treated as unrestricted; `validate` rejects such tables up front.
    pub fn schedule(&self, round: Round) -> RoundSchedule {
        self.schedules
            .get(&round)
            .cloned()
            .unwrap_or_else(RoundSchedule::unrestricted)
    }

    pub fn evaluate(&self, round: Round, elapsed_secs: i64) -> WithdrawalDecision {
        match self.schedules.get(&round) {
            Some(s) => s.evaluate(elapsed_secs),
            None => WithdrawalDecision::Allowed { fee_bps: 0 },
        }
    }

    pub fn validate(&self) -> Result<(), BrainsError> {
        for round in Round::ALL {
            match self.schedules.get(&round) {
                Some(s) => s.validate(round)?,
                None => {
                    return Err(BrainsError::InvalidFeeSchedule(format!("{round}: missing")));
                }
            }
        }
        Ok(())
    }
}
