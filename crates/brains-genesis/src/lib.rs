//! brains-genesis
//!
//! Builds the height-0 `LedgerState` for a fresh deployment:
//!
//! 1. The BRAINS token, with the initial supply credited to the owner and
//!    the first mint window opened at the deployment time.
//! 2. The accumulator and chunk registries, both administered by the owner.
//! 3. The staking ledger, with its custody address granted the manager
//!    capability on both registries. This grant is the one-time wiring
//!    step; nothing can be staked without it.

pub mod params;

pub use params::DeploymentConfig;

use brains_core::error::BrainsError;
use brains_core::types::Timestamp;
use brains_state::{AccumulatorRegistry, ChunkRegistry, LedgerState, StakingLedger};
use brains_token::{BrainsToken, SupplyGuard};
use tracing::info;

/// Deploy from `config`. `now` is used when the config does not pin a
/// deployment time.
pub fn deploy(config: &DeploymentConfig, now: Timestamp) -> Result<LedgerState, BrainsError> {
    config.validate()?;
    let deployed_at = config.deployed_at.unwrap_or(now);
    let owner = config.owner;
    info!(%owner, deployed_at, "deploying BRAINS staking ledger");

    // ── 1. Token ─────────────────────────────────────────────────────────────
    let supply = SupplyGuard::new(deployed_at, config.yearly_mint_limit, config.mint_horizon_secs);
    let token = BrainsToken::new(owner, config.initial_supply, supply)?
        .with_metadata(config.name.clone(), config.symbol.clone());
    info!(
        symbol = %token.symbol,
        initial_supply = config.initial_supply,
        yearly_mint_limit = config.yearly_mint_limit,
        "genesis: token deployed"
    );

    // ── 2. Registries ────────────────────────────────────────────────────────
    let mut accumulators = AccumulatorRegistry::new(owner);
    let mut chunks = ChunkRegistry::new(owner);

    // ── 3. Staking ledger and manager wiring ─────────────────────────────────
    let custody = config.staking_address;
    accumulators.grant_manager(&owner, custody)?;
    chunks.grant_manager(&owner, custody)?;
    let staking = StakingLedger::new(
        custody,
        owner,
        config.liquid_stake_threshold,
        config.fee_table.clone(),
    );
    info!(
        %custody,
        threshold = config.liquid_stake_threshold,
        "genesis: staking ledger wired as registry manager"
    );

    let mut state = LedgerState::new(token, accumulators, chunks, staking);
    state.committed_at = deployed_at;
    Ok(state)
}
