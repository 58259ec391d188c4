//! brains-state
//!
//! The staking ledger proper: the two position registries, the
//! `StakingLedger` that moves stake between them, and the `StateEngine`
//! that applies calls atomically and persists each committed height to
//! `StateDb`.

pub mod db;
pub mod engine;
pub mod holders;
pub mod query;
pub mod registry;
pub mod staking;

pub use db::StateDb;
pub use engine::{LedgerState, StateEngine};
pub use holders::HolderIndex;
pub use query::{PositionView, StakeQuery};
pub use registry::{
    Accumulator, AccumulatorRegistry, Chunk, ChunkRegistry, OwnershipPolicy, PositionRegistry,
};
pub use staking::{StakeStores, StakingLedger};
