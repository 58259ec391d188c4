/// ─── Brains Staking Protocol Constants ─────────────────────────────────────
///
/// Token:      BRAINS (18 decimals)
/// Base unit:  1 BRAINS = 10^18 base units
///
/// All durations are plain second counts. Months and years are fixed-length
/// spans, not calendar months.

// ── Time ─────────────────────────────────────────────────────────────────────

pub const SECONDS_PER_DAY: i64 = 86_400;

/// Fee schedules step on 30-day months.
pub const SECONDS_PER_MONTH: i64 = 30 * SECONDS_PER_DAY;

/// Length of one mint window.
pub const SECONDS_PER_YEAR: i64 = 365 * SECONDS_PER_DAY;

// ── Fees ─────────────────────────────────────────────────────────────────────

/// Basis points denominator (100% = 10000 basis points).
pub const BASIS_POINTS_DENOMINATOR: u128 = 10_000;

pub const MAX_FEE_BPS: u16 = 10_000;

// ── Token ────────────────────────────────────────────────────────────────────

pub const TOKEN_NAME: &str = "Brains";
pub const TOKEN_SYMBOL: &str = "BRAINS";
pub const TOKEN_DECIMALS: u8 = 18;

/// 1 BRAINS expressed in base units.
pub const ONE_TOKEN: u128 = 1_000_000_000_000_000_000;

/// Supply minted to the owner at deployment (1,000,000,000 BRAINS).
pub const DEFAULT_INITIAL_SUPPLY: u128 = 1_000_000_000 * ONE_TOKEN;

/// Ceiling on tokens minted inside one rolling window (100,000 BRAINS).
pub const DEFAULT_YEARLY_MINT_LIMIT: u128 = 100_000 * ONE_TOKEN;

/// Minting is permanently disabled this long after deployment.
pub const MINT_HORIZON_SECS: i64 = 5 * SECONDS_PER_YEAR;

// ── Staking ──────────────────────────────────────────────────────────────────

/// Chunk size at deployment. Zero means no ceiling: every deposit stays in
/// the accumulator until the manager sets a threshold.
pub const DEFAULT_LIQUID_STAKE_THRESHOLD: u128 = 0;

/// First id handed out by a position registry.
pub const FIRST_POSITION_ID: u64 = 1;
