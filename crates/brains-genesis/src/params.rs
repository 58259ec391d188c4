use brains_core::constants::{
    DEFAULT_INITIAL_SUPPLY, DEFAULT_LIQUID_STAKE_THRESHOLD, DEFAULT_YEARLY_MINT_LIMIT,
    MINT_HORIZON_SECS, TOKEN_NAME, TOKEN_SYMBOL,
};
use brains_core::error::BrainsError;
use brains_core::types::{Address, Amount, Timestamp};
use brains_fees::FeeTable;
use serde::{Deserialize, Serialize};

/// Everything fixed at deployment.
///
/// Every field has a default, so a config file only names what differs
/// from the production deployment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentConfig {
    /// Token owner, registry admin and staking manager.
    pub owner: Address,
    /// Custody account of the staking ledger.
    pub staking_address: Address,
    pub name: String,
    pub symbol: String,
    /// Credited to `owner` at deployment, outside any mint window.
    pub initial_supply: Amount,
    pub yearly_mint_limit: Amount,
    pub mint_horizon_secs: i64,
    /// Zero leaves every deposit in the accumulator.
    pub liquid_stake_threshold: Amount,
    /// Deployment time. `None` means "when `deploy` runs".
    pub deployed_at: Option<Timestamp>,
    pub fee_table: FeeTable,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            owner: Address::from_label("brains-owner"),
            staking_address: Address::from_label("brains-staking"),
            name: TOKEN_NAME.to_string(),
            symbol: TOKEN_SYMBOL.to_string(),
            initial_supply: DEFAULT_INITIAL_SUPPLY,
            yearly_mint_limit: DEFAULT_YEARLY_MINT_LIMIT,
            mint_horizon_secs: MINT_HORIZON_SECS,
            liquid_stake_threshold: DEFAULT_LIQUID_STAKE_THRESHOLD,
            deployed_at: None,
            fee_table: FeeTable::default(),
        }
    }
}

impl DeploymentConfig {
    pub fn from_json(json: &str) -> Result<Self, BrainsError> {
        serde_json::from_str(json).map_err(|e| BrainsError::InvalidConfig(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, BrainsError> {
        serde_json::to_string_pretty(self).map_err(|e| BrainsError::Serialization(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), BrainsError> {
        let bad = |msg: &str| Err(BrainsError::InvalidConfig(msg.to_string()));

        if self.owner.is_null() {
            return bad("owner must not be the null address");
        }
        if self.staking_address.is_null() {
            return bad("staking address must not be the null address");
        }
        if self.staking_address == self.owner {
            return bad("staking custody must be separate from the owner");
        }
        if self.yearly_mint_limit == 0 {
            return bad("yearly mint limit must be greater than zero");
        }
        if self.mint_horizon_secs <= 0 {
            return bad("mint horizon must be positive");
        }
        self.fee_table
            .validate()
            .map_err(|e| BrainsError::InvalidConfig(e.to_string()))
    }
}
