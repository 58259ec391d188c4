use std::collections::{BTreeMap, BTreeSet};
use std::marker::PhantomData;

use brains_core::constants::FIRST_POSITION_ID;
use brains_core::error::BrainsError;
use brains_core::position::{PositionKind, Round, StakePosition};
use brains_core::types::{Address, Amount, PositionId, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::holders::HolderIndex;

// ── Ownership policies ───────────────────────────────────────────────────────

/// Distinguishes the two registries sharing `PositionRegistry`.
pub trait OwnershipPolicy {
    const KIND: PositionKind;
    /// At most one position per owner.
    const SINGLETON: bool;
    /// Capability name reported in authorization failures.
    const CAPABILITY: &'static str;
}

/// One sub-threshold position per address, resized in place.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Accumulator;

/// Any number of fixed-size, transferable positions per address.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Chunk;

impl OwnershipPolicy for Accumulator {
    const KIND: PositionKind = PositionKind::Accumulator;
    const SINGLETON: bool = true;
    const CAPABILITY: &'static str = "accumulator manager";
}

impl OwnershipPolicy for Chunk {
    const KIND: PositionKind = PositionKind::Chunk;
    const SINGLETON: bool = false;
    const CAPABILITY: &'static str = "chunk manager";
}

pub type AccumulatorRegistry = PositionRegistry<Accumulator>;
pub type ChunkRegistry = PositionRegistry<Chunk>;

// ── PositionRegistry ─────────────────────────────────────────────────────────

/// Capability-gated store of stake positions, indexed by owner.
///
/// Mutations other than chunk transfers and approvals require the caller
/// to hold the manager capability, which only the registry admin grants.
/// Every stored position has a non-zero amount, so the holder index is
/// exactly the set of owners with at least one entry in `owned`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct PositionRegistry<P> {
    admin: Address,
    managers: BTreeSet<Address>,
    positions: BTreeMap<PositionId, StakePosition>,
    owned: BTreeMap<Address, BTreeSet<PositionId>>,
    holders: HolderIndex,
    /// Single-position delegates (chunks only).
    approvals: BTreeMap<PositionId, Address>,
    /// owner → operators allowed to move all of the owner's chunks.
    operators: BTreeMap<Address, BTreeSet<Address>>,
    next_id: PositionId,
    #[serde(skip)]
    _policy: PhantomData<P>,
}

impl<P: OwnershipPolicy> PositionRegistry<P> {
    pub fn new(admin: Address) -> Self {
        Self {
            admin,
            managers: BTreeSet::new(),
            positions: BTreeMap::new(),
            owned: BTreeMap::new(),
            holders: HolderIndex::new(),
            approvals: BTreeMap::new(),
            operators: BTreeMap::new(),
            next_id: FIRST_POSITION_ID,
            _policy: PhantomData,
        }
    }

    pub fn kind(&self) -> PositionKind {
        P::KIND
    }

    pub fn admin(&self) -> &Address {
        &self.admin
    }

    // ── Capability ───────────────────────────────────────────────────────────

    pub fn grant_manager(&mut self, caller: &Address, grantee: Address) -> Result<(), BrainsError> {
        self.ensure_admin(caller)?;
        if self.managers.insert(grantee) {
            debug!(kind = %P::KIND, %grantee, "manager granted");
        }
        Ok(())
    }

    pub fn revoke_manager(&mut self, caller: &Address, grantee: &Address) -> Result<(), BrainsError> {
        self.ensure_admin(caller)?;
        if self.managers.remove(grantee) {
            debug!(kind = %P::KIND, %grantee, "manager revoked");
        }
        Ok(())
    }

    pub fn is_manager(&self, who: &Address) -> bool {
        self.managers.contains(who)
    }

    fn ensure_admin(&self, caller: &Address) -> Result<(), BrainsError> {
        if *caller != self.admin {
            return Err(BrainsError::Unauthorized { caller: *caller, capability: "registry admin" });
        }
        Ok(())
    }

    fn ensure_manager(&self, caller: &Address) -> Result<(), BrainsError> {
        if !self.managers.contains(caller) {
            return Err(BrainsError::Unauthorized { caller: *caller, capability: P::CAPABILITY });
        }
        Ok(())
    }

    // ── Manager mutations ────────────────────────────────────────────────────

    /// Record a new position for `owner`, starting now.
    pub fn create(
        &mut self,
        caller: &Address,
        owner: &Address,
        amount: Amount,
        round: Round,
        now: Timestamp,
    ) -> Result<PositionId, BrainsError> {
        self.ensure_manager(caller)?;
        if owner.is_null() {
            return Err(BrainsError::InvalidRecipient);
        }
        if amount == 0 {
            return Err(BrainsError::ZeroAmount);
        }
        if P::SINGLETON && self.owned.contains_key(owner) {
            return Err(BrainsError::PositionExists { kind: P::KIND, owner: *owner });
        }

        let id = self.next_id;
        self.next_id += 1;
        self.positions.insert(
            id,
            StakePosition { id, owner: *owner, amount, round, start_time: now },
        );
        self.attach(owner, id);
        Ok(id)
    }

    /// Add `amount` to an existing position. Returns the new amount.
    pub fn increase(&mut self, caller: &Address, id: PositionId, amount: Amount) -> Result<Amount, BrainsError> {
        self.ensure_manager(caller)?;
        let pos = self.positions.get_mut(&id).ok_or(BrainsError::NoSuchPosition {
            kind: P::KIND,
            position_id: id,
        })?;
        pos.amount = pos.amount.checked_add(amount).ok_or(BrainsError::ArithmeticOverflow)?;
        Ok(pos.amount)
    }

    /// Remove a position. Returns the record as it was.
    pub fn burn(&mut self, caller: &Address, id: PositionId) -> Result<StakePosition, BrainsError> {
        self.ensure_manager(caller)?;
        let pos = self
            .positions
            .remove(&id)
            .ok_or(BrainsError::NoSuchPosition { kind: P::KIND, position_id: id })?;
        self.approvals.remove(&id);
        self.detach(&pos.owner, id);
        Ok(pos)
    }

    // ── Reads ────────────────────────────────────────────────────────────────

    pub fn get(&self, id: PositionId) -> Option<&StakePosition> {
        self.positions.get(&id)
    }

    /// Like `get`, but a missing position is an error.
    pub fn position(&self, id: PositionId) -> Result<&StakePosition, BrainsError> {
        self.positions
            .get(&id)
            .ok_or(BrainsError::NoSuchPosition { kind: P::KIND, position_id: id })
    }

    pub fn holders_count(&self) -> usize {
        self.holders.len()
    }

    pub fn holder_at(&self, index: usize) -> Option<&Address> {
        self.holders.get(index)
    }

    pub fn holders(&self) -> impl Iterator<Item = &Address> {
        self.holders.iter()
    }

    pub fn is_holder(&self, who: &Address) -> bool {
        self.holders.contains(who)
    }

    /// Positions owned by `owner`, ascending by id.
    pub fn positions_of(&self, owner: &Address) -> impl Iterator<Item = &StakePosition> {
        self.owned
            .get(owner)
            .into_iter()
            .flatten()
            .filter_map(|id| self.positions.get(id))
    }

    pub fn count_of(&self, owner: &Address) -> usize {
        self.owned.get(owner).map(BTreeSet::len).unwrap_or(0)
    }

    /// Sum of every position owned by `owner`.
    pub fn total_of(&self, owner: &Address) -> Amount {
        self.positions_of(owner).map(|p| p.amount).sum()
    }

    /// Number of live positions.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Principal held across all positions.
    pub fn total_amount(&self) -> Amount {
        self.positions.values().map(|p| p.amount).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StakePosition> {
        self.positions.values()
    }

    // ── Owner index ──────────────────────────────────────────────────────────

    fn attach(&mut self, owner: &Address, id: PositionId) {
        self.owned.entry(*owner).or_default().insert(id);
        self.holders.insert(*owner);
    }

    fn detach(&mut self, owner: &Address, id: PositionId) {
        if let Some(ids) = self.owned.get_mut(owner) {
            ids.remove(&id);
            if ids.is_empty() {
                self.owned.remove(owner);
                self.holders.remove(owner);
            }
        }
    }
}

// ── Accumulator-only operations ──────────────────────────────────────────────

impl PositionRegistry<Accumulator> {
    /// Overwrite the amount of an accumulator. Zero is rejected: an emptied
    /// accumulator must be burned.
    pub fn set_amount(&mut self, caller: &Address, id: PositionId, amount: Amount) -> Result<(), BrainsError> {
        self.ensure_manager(caller)?;
        if amount == 0 {
            return Err(BrainsError::ZeroAmount);
        }
        let pos = self.positions.get_mut(&id).ok_or(BrainsError::NoSuchPosition {
            kind: PositionKind::Accumulator,
            position_id: id,
        })?;
        pos.amount = amount;
        Ok(())
    }

    pub fn position_id_of(&self, owner: &Address) -> Option<PositionId> {
        self.owned.get(owner).and_then(|ids| ids.iter().next().copied())
    }

    pub fn position_of(&self, owner: &Address) -> Option<&StakePosition> {
        self.position_id_of(owner).and_then(|id| self.positions.get(&id))
    }
}

// ── Chunk-only operations ────────────────────────────────────────────────────

impl PositionRegistry<Chunk> {
    /// Move a chunk to `to`. Only `owner` changes; amount, round and start
    /// time travel with the position. Clears any single-chunk approval.
    /// Returns the previous owner.
    pub fn transfer(&mut self, caller: &Address, id: PositionId, to: &Address) -> Result<Address, BrainsError> {
        if to.is_null() {
            return Err(BrainsError::InvalidRecipient);
        }
        let from = self.position(id)?.owner;
        if !self.may_move(caller, id, &from) {
            return Err(BrainsError::NotPositionOwner { caller: *caller, position_id: id });
        }

        self.approvals.remove(&id);
        if from == *to {
            return Ok(from);
        }
        self.detach(&from, id);
        if let Some(pos) = self.positions.get_mut(&id) {
            pos.owner = *to;
        }
        self.attach(to, id);
        Ok(from)
    }

    /// Let `delegate` move one chunk, or clear the approval with `None`.
    /// Caller must be the owner or one of the owner's operators.
    pub fn approve(&mut self, caller: &Address, id: PositionId, delegate: Option<Address>) -> Result<Address, BrainsError> {
        let owner = self.position(id)?.owner;
        if *caller != owner && !self.is_operator(&owner, caller) {
            return Err(BrainsError::NotPositionOwner { caller: *caller, position_id: id });
        }
        match delegate {
            Some(d) => {
                self.approvals.insert(id, d);
            }
            None => {
                self.approvals.remove(&id);
            }
        }
        Ok(owner)
    }

    pub fn set_operator(&mut self, owner: &Address, operator: Address, approved: bool) -> Result<(), BrainsError> {
        if operator.is_null() {
            return Err(BrainsError::InvalidRecipient);
        }
        let ops = self.operators.entry(*owner).or_default();
        if approved {
            ops.insert(operator);
        } else {
            ops.remove(&operator);
            if ops.is_empty() {
                self.operators.remove(owner);
            }
        }
        Ok(())
    }

    pub fn approved(&self, id: PositionId) -> Option<&Address> {
        self.approvals.get(&id)
    }

    pub fn is_operator(&self, owner: &Address, operator: &Address) -> bool {
        self.operators.get(owner).is_some_and(|ops| ops.contains(operator))
    }

    fn may_move(&self, caller: &Address, id: PositionId, owner: &Address) -> bool {
        caller == owner || self.approvals.get(&id) == Some(caller) || self.is_operator(owner, caller)
    }
}
