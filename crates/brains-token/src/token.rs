use brains_core::constants::{TOKEN_DECIMALS, TOKEN_NAME, TOKEN_SYMBOL};
use brains_core::error::BrainsError;
use brains_core::types::{Address, Amount, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::ledger::TokenLedger;
use crate::supply::SupplyGuard;

/// What a successful `mint` did besides crediting the recipient.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MintOutcome {
    /// Start of the fresh window, when this mint opened one.
    pub window_reset: Option<Timestamp>,
}

/// The staked token: a `TokenLedger` owned by one address whose only
/// privilege is guarded minting.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrainsToken {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    owner: Address,
    ledger: TokenLedger,
    supply: SupplyGuard,
}

impl BrainsToken {
    /// Deploy with `initial_supply` credited to `owner`. The initial supply
    /// does not count against the first mint window.
    pub fn new(owner: Address, initial_supply: Amount, supply: SupplyGuard) -> Result<Self, BrainsError> {
        let mut ledger = TokenLedger::new();
        if initial_supply > 0 {
            ledger.mint(&owner, initial_supply)?;
        }
        Ok(Self {
            name: TOKEN_NAME.to_string(),
            symbol: TOKEN_SYMBOL.to_string(),
            decimals: TOKEN_DECIMALS,
            owner,
            ledger,
            supply,
        })
    }

    pub fn with_metadata(mut self, name: impl Into<String>, symbol: impl Into<String>) -> Self {
        self.name = name.into();
        self.symbol = symbol.into();
        self
    }

    pub fn owner(&self) -> &Address {
        &self.owner
    }

    pub fn ledger(&self) -> &TokenLedger {
        &self.ledger
    }

    pub fn supply(&self) -> &SupplyGuard {
        &self.supply
    }

    pub fn balance_of(&self, who: &Address) -> Amount {
        self.ledger.balance_of(who)
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.ledger.allowance(owner, spender)
    }

    pub fn total_supply(&self) -> Amount {
        self.ledger.total_supply()
    }

    // ── Guarded issuance ─────────────────────────────────────────────────────

    pub fn mint(
        &mut self,
        caller: &Address,
        to: &Address,
        amount: Amount,
        now: Timestamp,
    ) -> Result<MintOutcome, BrainsError> {
        if *caller != self.owner {
            return Err(BrainsError::Unauthorized { caller: *caller, capability: "token owner" });
        }
        if to.is_null() {
            return Err(BrainsError::InvalidRecipient);
        }
        let mut supply = self.supply.clone();
        let window_reset = supply.authorize(amount, now)?;
        self.ledger.mint(to, amount)?;
        self.supply = supply;

        if let Some(start) = window_reset {
            info!(window_start = start, "mint window reset");
        }
        info!(
            %to,
            amount,
            minted_in_window = self.supply.window.minted_in_window,
            "minted"
        );
        Ok(MintOutcome { window_reset })
    }

    // ── Unrestricted holder operations ───────────────────────────────────────

    pub fn burn(&mut self, holder: &Address, amount: Amount) -> Result<(), BrainsError> {
        self.ledger.burn(holder, amount)
    }

    pub fn transfer(&mut self, from: &Address, to: &Address, amount: Amount) -> Result<(), BrainsError> {
        self.ledger.transfer(from, to, amount)
    }

    pub fn approve(&mut self, owner: &Address, spender: &Address, amount: Amount) -> Result<(), BrainsError> {
        self.ledger.approve(owner, spender, amount)
    }

    pub fn transfer_from(
        &mut self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), BrainsError> {
        self.ledger.transfer_from(spender, from, to, amount)
    }

    pub fn batch_transfer(
        &mut self,
        from: &Address,
        recipients: &[Address],
        amounts: &[Amount],
    ) -> Result<(), BrainsError> {
        self.ledger.batch_transfer(from, recipients, amounts)
    }
}
