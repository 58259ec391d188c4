//! brains-token
//!
//! The staked fungible token. `TokenLedger` is a plain balance/allowance
//! ledger; `BrainsToken` wraps one with an owner and the `SupplyGuard`,
//! which caps issuance per rolling year and stops it entirely once the
//! mint horizon has passed.

pub mod ledger;
pub mod supply;
pub mod token;

pub use ledger::TokenLedger;
pub use supply::{MintWindow, SupplyGuard};
pub use token::{BrainsToken, MintOutcome};
