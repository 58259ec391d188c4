use brains_core::constants::SECONDS_PER_YEAR;
use brains_core::error::BrainsError;
use brains_core::types::{Amount, Timestamp};
use serde::{Deserialize, Serialize};

/// Issuance inside the current rolling year.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintWindow {
    pub window_start: Timestamp,
    pub minted_in_window: Amount,
}

impl MintWindow {
    fn expired(&self, now: Timestamp) -> bool {
        now >= self.window_start.saturating_add(SECONDS_PER_YEAR)
    }
}

/// Caps issuance at `yearly_limit` per rolling year and ends it entirely
/// `horizon_secs` after deployment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyGuard {
    pub deployed_at: Timestamp,
    pub horizon_secs: i64,
    pub yearly_limit: Amount,
    pub window: MintWindow,
}

impl SupplyGuard {
    /// The first window opens at deployment.
    pub fn new(deployed_at: Timestamp, yearly_limit: Amount, horizon_secs: i64) -> Self {
        Self {
            deployed_at,
            horizon_secs,
            yearly_limit,
            window: MintWindow { window_start: deployed_at, minted_in_window: 0 },
        }
    }

    pub fn mint_ends_at(&self) -> Timestamp {
        self.deployed_at.saturating_add(self.horizon_secs)
    }

    /// Allowance left at `now`, counting a window reset that would happen.
    pub fn remaining(&self, now: Timestamp) -> Amount {
        if now >= self.mint_ends_at() {
            return 0;
        }
        let minted = if self.window.expired(now) { 0 } else { self.window.minted_in_window };
        self.yearly_limit.saturating_sub(minted)
    }

    /// Record a mint of `amount` at `now`.
    ///
    /// Returns the new window start when this mint opened a fresh window.
    /// On error the guard is left exactly as it was, window included.
    pub fn authorize(&mut self, amount: Amount, now: Timestamp) -> Result<Option<Timestamp>, BrainsError> {
        let ended_at = self.mint_ends_at();
        if now >= ended_at {
            return Err(BrainsError::MintPeriodEnded { ended_at });
        }

        let mut window = self.window.clone();
        let reset = window.expired(now);
        if reset {
            window = MintWindow { window_start: now, minted_in_window: 0 };
        }

        let minted = window
            .minted_in_window
            .checked_add(amount)
            .ok_or(BrainsError::ArithmeticOverflow)?;
        if minted > self.yearly_limit {
            return Err(BrainsError::MintLimitExceeded {
                requested: amount,
                remaining: self.yearly_limit.saturating_sub(window.minted_in_window),
            });
        }

        window.minted_in_window = minted;
        self.window = window;
        Ok(reset.then_some(now))
    }
}
