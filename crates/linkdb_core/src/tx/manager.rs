//! Commit and rollback machinery.
//!
//! Commit is two-phase: validate every buffered record's version and every
//! staged unique constraint under the store's commit lock, then apply
//! record images, index deltas and tree transitions. Nothing is applied
//! before everything validated, so a failed commit only has to restore the
//! in-memory handles. Rollback is unconditional and total.

use crate::database::DatabaseShared;
use crate::document::{encode_document, Document};
use crate::error::{CoreError, CoreResult};
use crate::index::updater;
use crate::index::{Index, IndexKey, IndexType};
use crate::tx::state::{RecordOp, TouchedRecord, Transaction};
use crate::types::Version;
use linkdb_storage::{Rid, VersionedRecord};

/// Buffers a save into the transaction's write-set.
///
/// On first touch the record's pre-transaction snapshot is captured and,
/// for a transient record, a rid is allocated. Link bags evaluate their
/// representation thresholds, every covering index stages its deltas, the
/// record image is staged, and the document's diff window resets.
pub(crate) fn save_record(
    tx: &mut Transaction,
    shared: &DatabaseShared,
    doc: &Document,
    cluster: i32,
    version_override: Option<Version>,
) -> CoreResult<()> {
    tx.ensure_active()?;

    let rid_at_entry = doc.rid();
    let existing = if rid_at_entry.is_persistent() {
        tx.touched_index_of(rid_at_entry)
    } else {
        None
    };

    let (slot, first_touch) = match existing {
        Some(slot) => {
            if matches!(tx.records[slot].op, RecordOp::Delete { .. }) {
                return Err(CoreError::invalid_operation(format!(
                    "record {rid_at_entry} was deleted in this transaction"
                )));
            }
            if let Some(version) = version_override {
                if let RecordOp::Update { base } = &mut tx.records[slot].op {
                    *base = version;
                }
            }
            tx.records[slot].document = doc.clone();
            (slot, false)
        }
        None => {
            let was_new = rid_at_entry.is_tentative();
            let snapshot = doc.original_snapshot(was_new);
            let (rid, op) = if was_new {
                let rid = shared.storage.allocate(cluster)?;
                doc.set_rid(rid);
                (rid, RecordOp::Create)
            } else {
                (
                    rid_at_entry,
                    RecordOp::Update {
                        base: version_override.unwrap_or_else(|| doc.version()),
                    },
                )
            };
            let slot = tx.push_record(
                TouchedRecord {
                    document: doc.clone(),
                    op,
                    payload: None,
                    snapshot,
                },
                rid,
            );
            (slot, true)
        }
    };
    let rid = doc.rid();

    // representation thresholds are evaluated only here, at save time
    let mut bags = Vec::new();
    doc.collect_link_bags(&mut bags);
    for bag in bags {
        let outcome = bag.prepare_save(shared.storage.as_ref())?;
        tx.record_bag_outcome(outcome);
    }

    if let Some(class) = doc.class_name() {
        let is_create = matches!(tx.records[slot].op, RecordOp::Create);
        for index in shared.indexes.class_indexes(&class) {
            let contribution_key = (index.name().to_string(), rid);
            let (old_keys, timeline_usable) = match tx.contributions.get(&contribution_key) {
                Some(keys) => (keys.clone(), false),
                None if is_create => (Vec::new(), false),
                None => (
                    updater::original_keys(index.definition(), doc)?,
                    first_touch,
                ),
            };
            let update = updater::stage_save(index.definition(), doc, &old_keys, timeline_usable)?;
            for key in &update.adds {
                check_unique_staged(tx, &index, key, rid)?;
            }
            tx.stage_index_delta(index.name(), rid, &update.adds, &update.removes);
            tx.contributions.insert(contribution_key, update.new_keys);
        }
    }

    tx.records[slot].payload = Some(encode_document(doc));
    doc.rebaseline();
    tracing::trace!(%rid, "save buffered");
    Ok(())
}

/// Buffers a delete into the transaction's write-set and stages the
/// removal of every index entry the record contributed.
pub(crate) fn delete_record(
    tx: &mut Transaction,
    shared: &DatabaseShared,
    doc: &Document,
) -> CoreResult<()> {
    tx.ensure_active()?;
    let rid = doc.rid();
    if rid.is_tentative() {
        return Err(CoreError::invalid_operation(
            "cannot delete a record that was never saved",
        ));
    }
    let existing = tx.touched_index_of(rid);
    if let Some(slot) = existing {
        if matches!(tx.records[slot].op, RecordOp::Delete { .. }) {
            return Err(CoreError::invalid_operation(format!(
                "record {rid} was already deleted in this transaction"
            )));
        }
    }

    if let Some(class) = doc.class_name() {
        for index in shared.indexes.class_indexes(&class) {
            let contribution_key = (index.name().to_string(), rid);
            let old_keys = match tx.contributions.get(&contribution_key) {
                Some(keys) => keys.clone(),
                None => updater::original_keys(index.definition(), doc)?,
            };
            tx.stage_index_delta(index.name(), rid, &[], &old_keys);
            tx.contributions.insert(contribution_key, Vec::new());
        }
    }

    match existing {
        Some(slot) => {
            let (base, was_created) = match tx.records[slot].op {
                RecordOp::Create => (Version::default(), true),
                RecordOp::Update { base } => (base, false),
                RecordOp::Delete { base, was_created } => (base, was_created),
            };
            tx.records[slot].op = RecordOp::Delete { base, was_created };
            tx.records[slot].payload = None;
            tx.records[slot].document = doc.clone();
        }
        None => {
            let snapshot = doc.original_snapshot(false);
            tx.push_record(
                TouchedRecord {
                    document: doc.clone(),
                    op: RecordOp::Delete {
                        base: doc.version(),
                        was_created: false,
                    },
                    payload: None,
                    snapshot,
                },
                rid,
            );
        }
    }
    tracing::trace!(%rid, "delete buffered");
    Ok(())
}

/// Validates and applies the transaction atomically.
///
/// Any version mismatch or unique violation aborts the whole transaction:
/// nothing is applied and every touched handle is restored to its
/// pre-transaction snapshot.
pub(crate) fn commit(tx: &mut Transaction, shared: &DatabaseShared) -> CoreResult<()> {
    tx.ensure_active()?;
    let _guard = shared.commit_lock.lock();

    if let Some(err) = validate_versions(tx, shared) {
        return Err(abort(tx, shared, err));
    }
    if let Some(err) = validate_unique(tx, shared) {
        return Err(abort(tx, shared, err));
    }

    // tree deltas land before the record images that reference them, so a
    // concurrent reader never hydrates a half-filled tree
    for (handle, deltas) in &tx.tree_deltas {
        shared.storage.tree_apply(*handle, deltas)?;
    }

    // apply record images; validated operations on the substrate cannot
    // fail past this point
    for record in &tx.records {
        let rid = record.document.rid();
        match &record.op {
            RecordOp::Create => {
                let payload = record.payload.clone().unwrap_or_default();
                shared.storage.insert(rid, VersionedRecord::new(payload, 1))?;
            }
            RecordOp::Update { base } => {
                let payload = record.payload.clone().unwrap_or_default();
                shared
                    .storage
                    .update(rid, VersionedRecord::new(payload, base.next().as_u32()))?;
            }
            RecordOp::Delete {
                was_created: true, ..
            } => {}
            RecordOp::Delete { .. } => {
                shared.storage.remove(rid)?;
            }
        }
    }

    // apply index deltas: removals first so a key can change hands within
    // one transaction
    for (index_name, keys) in &tx.index_net {
        let Some(index) = shared.indexes.get_index(index_name) else {
            continue;
        };
        for (key, net) in keys {
            for (&rid, &delta) in net.iter() {
                if delta < 0 {
                    index.remove_entry(key, rid);
                }
            }
            for (&rid, &delta) in net.iter() {
                if delta > 0 {
                    index.put_unchecked(key.clone(), rid);
                }
            }
        }
    }

    // trees released by bag conversions go away only after the new record
    // images stopped referencing them
    for handle in &tx.dropped_trees {
        shared.storage.drop_tree(*handle)?;
    }

    for record in &tx.records {
        match &record.op {
            RecordOp::Create => record.document.finalize_commit(Version::new(1)),
            RecordOp::Update { base } => record.document.finalize_commit(base.next()),
            RecordOp::Delete { .. } => record.document.finalize_delete(),
        }
    }

    tx.mark_committed();
    tracing::debug!(id = %tx.id(), records = tx.record_count(), "transaction committed");
    Ok(())
}

/// Discards the write-set and restores every touched record, unconditionally.
pub(crate) fn rollback(tx: &mut Transaction, shared: &DatabaseShared) {
    revert(tx, shared);
    tx.mark_rolled_back();
    tracing::debug!(id = %tx.id(), "transaction rolled back");
}

fn validate_versions(tx: &Transaction, shared: &DatabaseShared) -> Option<CoreError> {
    for record in &tx.records {
        let rid = record.document.rid();
        let base = match &record.op {
            RecordOp::Create => continue,
            RecordOp::Delete {
                was_created: true, ..
            } => continue,
            RecordOp::Update { base } | RecordOp::Delete { base, .. } => *base,
        };
        let stored = match shared.storage.version_of(rid) {
            Ok(stored) => stored,
            Err(err) => return Some(err.into()),
        };
        let Some(stored) = stored else {
            return Some(CoreError::record_not_found(rid));
        };
        if stored != base.as_u32() {
            return Some(CoreError::concurrent_modification(
                rid,
                base,
                Version::new(stored),
            ));
        }
    }
    None
}

fn validate_unique(tx: &Transaction, shared: &DatabaseShared) -> Option<CoreError> {
    for (index_name, keys) in &tx.index_net {
        let Some(index) = shared.indexes.get_index(index_name) else {
            continue;
        };
        if index.index_type() != IndexType::Unique {
            continue;
        }
        for (key, net) in keys {
            let mut holders: Vec<Rid> = index
                .rids(key)
                .filter(|rid| net.get(rid).copied().unwrap_or(0) >= 0)
                .collect();
            for (&rid, &delta) in net.iter() {
                if delta > 0 && !holders.contains(&rid) {
                    holders.push(rid);
                }
            }
            if holders.len() > 1 {
                return Some(CoreError::duplicate_key(index_name.clone(), key.to_string()));
            }
        }
    }
    None
}

fn check_unique_staged(
    tx: &Transaction,
    index: &Index,
    key: &IndexKey,
    rid: Rid,
) -> CoreResult<()> {
    if index.index_type() != IndexType::Unique {
        return Ok(());
    }
    for holder in index.rids(key) {
        if holder != rid && tx.net_for(index.name(), key, holder) >= 0 {
            return Err(CoreError::duplicate_key(index.name(), key.to_string()));
        }
    }
    if let Some(net) = tx
        .index_net
        .get(index.name())
        .and_then(|keys| keys.get(key))
    {
        for (&other, &delta) in net.iter() {
            if other != rid && delta > 0 {
                return Err(CoreError::duplicate_key(index.name(), key.to_string()));
            }
        }
    }
    Ok(())
}

fn abort(tx: &mut Transaction, shared: &DatabaseShared, err: CoreError) -> CoreError {
    revert(tx, shared);
    tx.mark_rolled_back();
    tracing::debug!(id = %tx.id(), error = %err, "transaction aborted at commit");
    err
}

fn revert(tx: &Transaction, shared: &DatabaseShared) {
    for record in &tx.records {
        record.document.restore_snapshot(&record.snapshot);
    }
    for handle in &tx.created_trees {
        let _ = shared.storage.drop_tree(*handle);
    }
}
