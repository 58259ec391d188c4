use std::path::Path;

use brains_core::error::BrainsError;
use brains_core::types::{Height, Timestamp};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;

use crate::engine::LedgerState;

/// Persistent ledger history backed by sled.
///
/// Named trees:
///   history  : big-endian Height → bincode(LedgerState)
///   timeline : big-endian Height → big-endian committed_at
///
/// Every committed height gets a full snapshot, so `state_at` can answer
/// reads "as of" any past height without replaying calls. The head is
/// always the last `history` key; there is no separately stored height.
pub struct StateDb {
    _db: sled::Db,
    history: sled::Tree,
    timeline: sled::Tree,
}

fn storage(e: sled::Error) -> BrainsError {
    BrainsError::Storage(e.to_string())
}

impl StateDb {
    /// Open or create the state database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, BrainsError> {
        let db = sled::open(path).map_err(storage)?;
        let history  = db.open_tree("history").map_err(storage)?;
        let timeline = db.open_tree("timeline").map_err(storage)?;
        Ok(Self { _db: db, history, timeline })
    }

    // ── History ──────────────────────────────────────────────────────────────

    /// Store the snapshot for `state.height`. The snapshot and its timeline
    /// entry land together or not at all.
    pub fn put_state(&self, state: &LedgerState) -> Result<(), BrainsError> {
        let bytes = bincode::serialize(state)
            .map_err(|e| BrainsError::Serialization(e.to_string()))?;
        let key = state.height.to_be_bytes();
        let stamp = state.committed_at.to_be_bytes();

        (&self.history, &self.timeline)
            .transaction(|(history, timeline)| {
                history.insert(&key[..], bytes.as_slice())?;
                timeline.insert(&key[..], &stamp[..])?;
                Ok::<_, ConflictableTransactionError<()>>(())
            })
            .map_err(|e| match e {
                TransactionError::Storage(e) => storage(e),
                TransactionError::Abort(()) => BrainsError::Storage("snapshot write aborted".into()),
            })
    }

    /// Snapshot at the head, if anything has been committed.
    pub fn latest_state(&self) -> Result<Option<LedgerState>, BrainsError> {
        match self.history.last().map_err(storage)? {
            Some((_, bytes)) => decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Snapshot as committed at the greatest height `<= height`.
    pub fn state_at(&self, height: Height) -> Result<Option<LedgerState>, BrainsError> {
        match self
            .history
            .range(..=height.to_be_bytes())
            .next_back()
            .transpose()
            .map_err(storage)?
        {
            Some((_, bytes)) => decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Snapshot of the newest height committed at or before `at`.
    pub fn state_at_time(&self, at: Timestamp) -> Result<Option<LedgerState>, BrainsError> {
        for entry in self.timeline.iter().rev() {
            let (key, stamp) = entry.map_err(storage)?;
            if Timestamp::from_be_bytes(be8(&stamp, "timestamp")?) <= at {
                return self.state_at(Height::from_be_bytes(be8(&key, "height")?));
            }
        }
        Ok(None)
    }

    /// Head height, or `None` on a fresh database.
    pub fn height(&self) -> Result<Option<Height>, BrainsError> {
        match self.history.last().map_err(storage)? {
            Some((key, _)) => Ok(Some(Height::from_be_bytes(be8(&key, "height")?))),
            None => Ok(None),
        }
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<(), BrainsError> {
        self._db.flush().map_err(storage)?;
        Ok(())
    }
}

fn be8(raw: &[u8], what: &str) -> Result<[u8; 8], BrainsError> {
    raw.try_into()
        .map_err(|_| BrainsError::Serialization(format!("corrupt {what}")))
}

fn decode(bytes: &[u8]) -> Result<LedgerState, BrainsError> {
    bincode::deserialize(bytes).map_err(|e| BrainsError::Serialization(e.to_string()))
}
