use std::collections::BTreeMap;

use brains_core::error::BrainsError;
use brains_core::types::{Address, Amount};
use serde::{Deserialize, Serialize};

/// Balances and allowances of one fungible token.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenLedger {
    balances: BTreeMap<Address, Amount>,
    /// owner → spender → remaining allowance
    allowances: BTreeMap<Address, BTreeMap<Address, Amount>>,
    total_supply: Amount,
}

impl TokenLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance_of(&self, who: &Address) -> Amount {
        self.balances.get(who).copied().unwrap_or(0)
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.allowances
            .get(owner)
            .and_then(|m| m.get(spender))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    /// Every address with a non-zero balance.
    pub fn holders(&self) -> impl Iterator<Item = (&Address, &Amount)> {
        self.balances.iter()
    }

    /// Create `amount` new tokens for `to`. Unrestricted: gating is the
    /// wrapper's job.
    pub fn mint(&mut self, to: &Address, amount: Amount) -> Result<(), BrainsError> {
        if to.is_null() {
            return Err(BrainsError::InvalidRecipient);
        }
        let supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(BrainsError::ArithmeticOverflow)?;
        self.total_supply = supply;
        self.set_balance(to, self.balance_of(to) + amount);
        Ok(())
    }

    /// Destroy `amount` of `holder`'s own balance.
    pub fn burn(&mut self, holder: &Address, amount: Amount) -> Result<(), BrainsError> {
        let have = self.balance_of(holder);
        if have < amount {
            return Err(BrainsError::InsufficientBalance { need: amount, have });
        }
        self.set_balance(holder, have - amount);
        self.total_supply -= amount;
        Ok(())
    }

    pub fn transfer(&mut self, from: &Address, to: &Address, amount: Amount) -> Result<(), BrainsError> {
        if to.is_null() {
            return Err(BrainsError::InvalidRecipient);
        }
        let have = self.balance_of(from);
        if have < amount {
            return Err(BrainsError::InsufficientBalance { need: amount, have });
        }
        if from != to {
            self.set_balance(from, have - amount);
            self.set_balance(to, self.balance_of(to) + amount);
        }
        Ok(())
    }

    pub fn approve(&mut self, owner: &Address, spender: &Address, amount: Amount) -> Result<(), BrainsError> {
        if spender.is_null() {
            return Err(BrainsError::InvalidRecipient);
        }
        let entry = self.allowances.entry(*owner).or_default();
        if amount == 0 {
            entry.remove(spender);
            if entry.is_empty() {
                self.allowances.remove(owner);
            }
        } else {
            entry.insert(*spender, amount);
        }
        Ok(())
    }

    /// Move `amount` from `from` to `to` on the strength of `spender`'s
    /// allowance. Nothing changes unless both allowance and balance suffice.
    pub fn transfer_from(
        &mut self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), BrainsError> {
        let allowed = self.allowance(from, spender);
        if allowed < amount {
            return Err(BrainsError::InsufficientAllowance { need: amount, have: allowed });
        }
        self.transfer(from, to, amount)?;
        self.approve(from, spender, allowed - amount)
    }

    /// Pairwise transfers out of `from`. Validated in full before the first
    /// balance moves, so a failing entry leaves every balance untouched.
    pub fn batch_transfer(
        &mut self,
        from: &Address,
        recipients: &[Address],
        amounts: &[Amount],
    ) -> Result<(), BrainsError> {
        if recipients.len() != amounts.len() {
            return Err(BrainsError::LengthMismatch {
                recipients: recipients.len(),
                amounts: amounts.len(),
            });
        }
        if recipients.iter().any(Address::is_null) {
            return Err(BrainsError::InvalidRecipient);
        }
        let need = amounts
            .iter()
            .try_fold(0u128, |acc, a| acc.checked_add(*a))
            .ok_or(BrainsError::ArithmeticOverflow)?;
        let have = self.balance_of(from);
        if have < need {
            return Err(BrainsError::InsufficientBalance { need, have });
        }
        for (to, amount) in recipients.iter().zip(amounts) {
            self.transfer(from, to, *amount)?;
        }
        Ok(())
    }

    fn set_balance(&mut self, who: &Address, amount: Amount) {
        if amount == 0 {
            self.balances.remove(who);
        } else {
            self.balances.insert(*who, amount);
        }
    }
}
