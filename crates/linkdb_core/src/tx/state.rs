//! Transaction state.

use crate::document::{Document, DocumentSnapshot};
use crate::error::{CoreError, CoreResult};
use crate::index::IndexKey;
use crate::ridbag::BagSaveOutcome;
use crate::types::{TransactionId, Version};
use linkdb_storage::{Rid, TreeHandle};
use std::collections::{BTreeMap, HashMap};

/// State of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Operations buffer into the write-set.
    Active,
    /// The write-set was applied atomically. Terminal.
    Committed,
    /// The write-set was discarded and every effect reverted. Terminal.
    RolledBack,
}

/// A buffered record operation.
#[derive(Debug, Clone)]
pub(crate) enum RecordOp {
    /// First save of a transient record.
    Create,
    /// Save of a persistent record, checked against `base` at commit.
    Update {
        /// Version observed at checkout, or an explicit override.
        base: Version,
    },
    /// Deletion of a record.
    Delete {
        /// Version observed at checkout.
        base: Version,
        /// True when the record was created inside this same transaction
        /// and never reached storage.
        was_created: bool,
    },
}

/// One record in the write-set.
#[derive(Debug)]
pub(crate) struct TouchedRecord {
    /// The session's handle, updated in place at commit or rollback.
    pub(crate) document: Document,
    pub(crate) op: RecordOp,
    /// Record image staged at save time. None for deletes.
    pub(crate) payload: Option<Vec<u8>>,
    /// Pre-transaction state, for total revert.
    pub(crate) snapshot: DocumentSnapshot,
}

/// A session-scoped transaction: the buffered write-set, the staged index
/// deltas, and the bookkeeping needed to validate and revert them.
///
/// Mutations buffered here are visible to reads in the same session
/// (read-your-writes) and invisible to every other session until commit.
#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,
    state: TransactionState,
    pub(crate) records: Vec<TouchedRecord>,
    by_rid: HashMap<Rid, usize>,
    /// Net keys each record contributes per index after the staged saves.
    pub(crate) contributions: HashMap<(String, Rid), Vec<IndexKey>>,
    /// Per-index, per-key net entry deltas: +1 put, -1 remove.
    pub(crate) index_net: HashMap<String, BTreeMap<IndexKey, HashMap<Rid, i64>>>,
    /// Counted deltas to apply to persisted trees at commit.
    pub(crate) tree_deltas: HashMap<TreeHandle, Vec<(Rid, i64)>>,
    /// Trees allocated by this transaction; dropped on rollback.
    pub(crate) created_trees: Vec<TreeHandle>,
    /// Trees released by bag conversions; dropped at commit.
    pub(crate) dropped_trees: Vec<TreeHandle>,
}

impl Transaction {
    pub(crate) fn new(id: TransactionId) -> Self {
        Self {
            id,
            state: TransactionState::Active,
            records: Vec::new(),
            by_rid: HashMap::new(),
            contributions: HashMap::new(),
            index_net: HashMap::new(),
            tree_deltas: HashMap::new(),
            created_trees: Vec::new(),
            dropped_trees: Vec::new(),
        }
    }

    /// Returns the transaction id.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Returns true if operations can still be buffered.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// Returns the number of records in the write-set.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn ensure_active(&self) -> CoreResult<()> {
        match self.state {
            TransactionState::Active => Ok(()),
            TransactionState::Committed => Err(CoreError::invalid_operation(
                "transaction already committed",
            )),
            TransactionState::RolledBack => Err(CoreError::invalid_operation(
                "transaction already rolled back",
            )),
        }
    }

    pub(crate) fn mark_committed(&mut self) {
        self.state = TransactionState::Committed;
    }

    pub(crate) fn mark_rolled_back(&mut self) {
        self.state = TransactionState::RolledBack;
    }

    /// Finds the write-set slot of a rid, if touched.
    pub(crate) fn touched_index_of(&self, rid: Rid) -> Option<usize> {
        self.by_rid.get(&rid).copied()
    }

    /// Registers a record in the write-set, keyed by its (now allocated)
    /// rid.
    pub(crate) fn push_record(&mut self, record: TouchedRecord, rid: Rid) -> usize {
        let slot = self.records.len();
        self.records.push(record);
        self.by_rid.insert(rid, slot);
        slot
    }

    /// Folds staged adds and removes into the per-key net deltas.
    pub(crate) fn stage_index_delta(
        &mut self,
        index_name: &str,
        rid: Rid,
        adds: &[IndexKey],
        removes: &[IndexKey],
    ) {
        let per_index = self.index_net.entry(index_name.to_string()).or_default();
        for key in removes {
            *per_index
                .entry(key.clone())
                .or_default()
                .entry(rid)
                .or_insert(0) -= 1;
        }
        for key in adds {
            *per_index
                .entry(key.clone())
                .or_default()
                .entry(rid)
                .or_insert(0) += 1;
        }
    }

    /// Returns this transaction's net delta for one (index, key, rid).
    pub(crate) fn net_for(&self, index_name: &str, key: &IndexKey, rid: Rid) -> i64 {
        self.index_net
            .get(index_name)
            .and_then(|keys| keys.get(key))
            .and_then(|net| net.get(&rid))
            .copied()
            .unwrap_or(0)
    }

    /// Records what a bag's save-time representation check decided.
    pub(crate) fn record_bag_outcome(&mut self, outcome: BagSaveOutcome) {
        match outcome {
            BagSaveOutcome::Unchanged => {}
            BagSaveOutcome::TreeDeltas { handle, deltas } => {
                self.tree_deltas.entry(handle).or_default().extend(deltas);
            }
            BagSaveOutcome::ConvertedToTree { handle, deltas } => {
                self.created_trees.push(handle);
                self.tree_deltas.entry(handle).or_default().extend(deltas);
            }
            BagSaveOutcome::ConvertedToEmbedded { dropped } => {
                self.tree_deltas.remove(&dropped);
                self.dropped_trees.push(dropped);
            }
        }
    }
}
