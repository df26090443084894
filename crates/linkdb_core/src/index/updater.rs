//! The save-time index update protocol.
//!
//! Once per document mutation, prior to commit, each covering index stages
//! the symmetric difference between the entries the record contributed
//! before and the entries its current values contribute. Simple fields
//! diff original-vs-current value; tracked collection fields replay the
//! change timeline instead of re-extracting everything, with paired
//! add/remove events cancelling out.

use crate::document::{ChangeKind, Document, Value};
use crate::error::CoreResult;
use crate::index::definition::{IndexBy, IndexDefinition};
use crate::index::key::{IndexKey, KeyPart};
use std::collections::HashMap;

/// Outcome of staging one index against one saved document.
#[derive(Debug, Clone)]
pub(crate) struct StagedUpdate {
    /// Keys gaining this record's rid.
    pub(crate) adds: Vec<IndexKey>,
    /// Keys losing this record's rid.
    pub(crate) removes: Vec<IndexKey>,
    /// The record's net contributed keys after this save.
    pub(crate) new_keys: Vec<IndexKey>,
}

/// Stages the index deltas for a saved document.
///
/// `old_keys` is what the record currently contributes: the keys staged by
/// an earlier save in the same transaction, or - on first touch - the keys
/// built from the record's reconstructed original values.
/// `timeline_usable` is true only on first touch, when `old_keys` still
/// corresponds to the state the timelines diff against.
pub(crate) fn stage_save(
    definition: &IndexDefinition,
    doc: &Document,
    old_keys: &[IndexKey],
    timeline_usable: bool,
) -> CoreResult<StagedUpdate> {
    if timeline_usable {
        if let Some(update) = try_timeline_path(definition, doc, old_keys)? {
            return Ok(update);
        }
    }

    let new_keys = definition.keys_with(&|name| doc.field_or_null(name))?;
    let adds = new_keys
        .iter()
        .filter(|&key| !old_keys.contains(key))
        .cloned()
        .collect();
    let removes = old_keys
        .iter()
        .filter(|&key| !new_keys.contains(key))
        .cloned()
        .collect();
    Ok(StagedUpdate {
        adds,
        removes,
        new_keys,
    })
}

/// Builds the keys a record contributes from its reconstructed original
/// values, for first-touch diffs and for deletes.
pub(crate) fn original_keys(
    definition: &IndexDefinition,
    doc: &Document,
) -> CoreResult<Vec<IndexKey>> {
    definition.keys_with(&|name| doc.original_field_or_null(name))
}

/// Incremental path for single-property collection indexes: fold the
/// change timeline into counted key deltas so that an add immediately
/// undone by a remove stages nothing.
///
/// Only applies when nulls are ignored - with nulls kept, emptying the
/// collection must swap the per-element keys for a null placeholder, which
/// the events alone cannot express.
fn try_timeline_path(
    definition: &IndexDefinition,
    doc: &Document,
    old_keys: &[IndexKey],
) -> CoreResult<Option<StagedUpdate>> {
    if definition.is_composite() || !definition.is_null_ignored() {
        return Ok(None);
    }
    let property = &definition.properties()[0];
    if !matches!(property.mode(), IndexBy::Value | IndexBy::Element) {
        return Ok(None);
    }
    let field = property.field();
    let Some(timeline) = doc.collection_timeline(field) else {
        return Ok(None);
    };
    if timeline.is_empty() {
        return Ok(None);
    }

    let mut folded: HashMap<IndexKey, (i64, Value)> = HashMap::new();
    let mut fold = |value: &Value, delta: i64| {
        let part = KeyPart::from_value(value);
        if part.is_null() {
            return;
        }
        let entry = folded
            .entry(IndexKey::single(part))
            .or_insert((0, value.clone()));
        entry.0 += delta;
    };
    for event in timeline.events() {
        match event.kind {
            ChangeKind::Add => fold(&event.value, 1),
            ChangeKind::Remove => fold(&event.value, -1),
            ChangeKind::Update => {
                if let Some(old) = &event.old_value {
                    fold(old, -1);
                }
                fold(&event.value, 1);
            }
        }
    }

    let current = doc.field_or_null(field);
    let mut adds = Vec::new();
    let mut removes = Vec::new();
    for (key, (net, value)) in folded {
        if net > 0 && !old_keys.contains(&key) {
            adds.push(key);
        } else if net < 0
            && old_keys.contains(&key)
            && !collection_contains(&current, &value)
        {
            // a duplicate instance may remain; the entry stays live then
            removes.push(key);
        }
    }

    let mut new_keys: Vec<IndexKey> = old_keys
        .iter()
        .filter(|&key| !removes.contains(key))
        .cloned()
        .collect();
    for key in &adds {
        if !new_keys.contains(key) {
            new_keys.push(key.clone());
        }
    }
    Ok(Some(StagedUpdate {
        adds,
        removes,
        new_keys,
    }))
}

fn collection_contains(collection: &Value, value: &Value) -> bool {
    match collection {
        Value::List(list) => list.contains(value),
        Value::Set(set) => set.contains(value),
        Value::LinkBag(bag) => value.as_link().is_some_and(|rid| bag.contains(rid)),
        _ => false,
    }
}
