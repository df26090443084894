//! Tracked collection wrappers.
//!
//! Lists, sets and maps stored in document fields are wrapped so that
//! structural mutations mark the owning document dirty and, while tracking
//! is enabled, append events to the field's change timeline. Wrappers are
//! cheap handles; cloning shares the underlying collection.
//!
//! A wrapper invalidated by a field-type coercion or reassignment rejects
//! further mutation with `UnsupportedOperation`.

use crate::document::timeline::{ChangeEvent, ChangeKind, ChangeTimeline, EventKey};
use crate::document::value::Value;
use crate::document::{notify_structural_change, OwnerRef};
use crate::error::{CoreError, CoreResult};
use parking_lot::RwLock;
use std::sync::Arc;

fn invalidated_error(kind: &str) -> CoreError {
    CoreError::unsupported_operation(format!(
        "this {kind} view was detached by a field coercion or reassignment"
    ))
}

// ---------------------------------------------------------------------------
// TrackedList
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ListState {
    items: Vec<Value>,
    timeline: ChangeTimeline,
    owner: Option<OwnerRef>,
    invalidated: bool,
}

/// A tracked, ordered list of values.
#[derive(Debug, Clone, Default)]
pub struct TrackedList {
    state: Arc<RwLock<ListState>>,
}

impl TrackedList {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a list holding the given values.
    #[must_use]
    pub fn from_values(values: Vec<Value>) -> Self {
        let list = Self::new();
        list.state.write().items = values;
        list
    }

    /// Returns the number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().items.len()
    }

    /// Returns true if the list has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().items.is_empty()
    }

    /// Returns a copy of the element at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Value> {
        self.state.read().items.get(index).cloned()
    }

    /// Returns copies of all elements in order.
    #[must_use]
    pub fn values(&self) -> Vec<Value> {
        self.state.read().items.clone()
    }

    /// Returns true if the list contains a content-equal value.
    #[must_use]
    pub fn contains(&self, value: &Value) -> bool {
        self.state.read().items.iter().any(|item| item == value)
    }

    /// Appends a value.
    pub fn push(&self, value: Value) -> CoreResult<()> {
        let (owner, position) = {
            let mut state = self.state.write();
            if state.invalidated {
                return Err(invalidated_error("list"));
            }
            let position = state.items.len();
            state.items.push(value.clone());
            (state.owner.clone(), position)
        };
        self.record(owner, ChangeEvent::added(EventKey::Position(position), value));
        Ok(())
    }

    /// Inserts a value at `index`.
    pub fn insert(&self, index: usize, value: Value) -> CoreResult<()> {
        let owner = {
            let mut state = self.state.write();
            if state.invalidated {
                return Err(invalidated_error("list"));
            }
            if index > state.items.len() {
                return Err(CoreError::validation(format!(
                    "list insert position {index} out of bounds (len {})",
                    state.items.len()
                )));
            }
            state.items.insert(index, value.clone());
            state.owner.clone()
        };
        self.record(owner, ChangeEvent::added(EventKey::Position(index), value));
        Ok(())
    }

    /// Replaces the value at `index`, returning the previous one.
    pub fn set(&self, index: usize, value: Value) -> CoreResult<Value> {
        let (owner, old) = {
            let mut state = self.state.write();
            if state.invalidated {
                return Err(invalidated_error("list"));
            }
            let slot = state.items.get_mut(index).ok_or_else(|| {
                CoreError::validation(format!("list position {index} out of bounds"))
            })?;
            let old = std::mem::replace(slot, value.clone());
            (state.owner.clone(), old)
        };
        self.record(
            owner,
            ChangeEvent::updated(EventKey::Position(index), value, old.clone()),
        );
        Ok(old)
    }

    /// Removes and returns the value at `index`.
    pub fn remove(&self, index: usize) -> CoreResult<Value> {
        let (owner, removed) = {
            let mut state = self.state.write();
            if state.invalidated {
                return Err(invalidated_error("list"));
            }
            if index >= state.items.len() {
                return Err(CoreError::validation(format!(
                    "list position {index} out of bounds"
                )));
            }
            let removed = state.items.remove(index);
            (state.owner.clone(), removed)
        };
        self.record(
            owner,
            ChangeEvent::removed(EventKey::Position(index), removed.clone()),
        );
        Ok(removed)
    }

    /// Removes the first content-equal occurrence of a value.
    ///
    /// Returns true if an element was removed.
    pub fn remove_value(&self, value: &Value) -> CoreResult<bool> {
        let position = self.state.read().items.iter().position(|item| item == value);
        match position {
            Some(index) => {
                self.remove(index)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Removes all elements.
    pub fn clear(&self) -> CoreResult<()> {
        loop {
            let len = self.state.read().items.len();
            if len == 0 {
                return Ok(());
            }
            self.remove(len - 1)?;
        }
    }

    /// Returns true if both handles hold content-equal elements.
    #[must_use]
    pub fn content_eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.state, &other.state) {
            return true;
        }
        let a = self.state.read().items.clone();
        let b = other.state.read().items.clone();
        a == b
    }

    /// Returns a copy of the field's change timeline.
    #[must_use]
    pub fn timeline(&self) -> ChangeTimeline {
        self.state.read().timeline.clone()
    }

    /// Reconstructs the element sequence from before the recorded changes.
    #[must_use]
    pub(crate) fn original_values(&self) -> Vec<Value> {
        let state = self.state.read();
        let mut items = state.items.clone();
        for event in state.timeline.events().iter().rev() {
            match (event.kind, &event.key) {
                (ChangeKind::Add, EventKey::Position(i)) => {
                    if *i < items.len() {
                        items.remove(*i);
                    }
                }
                (ChangeKind::Remove, EventKey::Position(i)) => {
                    let at = (*i).min(items.len());
                    items.insert(at, event.value.clone());
                }
                (ChangeKind::Update, EventKey::Position(i)) => {
                    if let (Some(slot), Some(old)) = (items.get_mut(*i), event.old_value.clone()) {
                        *slot = old;
                    }
                }
                _ => {}
            }
        }
        items
    }

    pub(crate) fn set_owner(&self, owner: OwnerRef) {
        let mut state = self.state.write();
        state.owner = Some(owner);
        state.timeline.clear();
    }

    pub(crate) fn clear_owner(&self) {
        let mut state = self.state.write();
        state.owner = None;
        state.timeline.clear();
    }

    pub(crate) fn invalidate(&self) {
        let mut state = self.state.write();
        state.invalidated = true;
        state.owner = None;
        state.timeline.clear();
    }

    pub(crate) fn clear_timeline(&self) {
        self.state.write().timeline.clear();
    }

    fn record(&self, owner: Option<OwnerRef>, event: ChangeEvent) {
        if let Some(owner) = owner {
            if notify_structural_change(&owner) {
                self.state.write().timeline.push(event);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TrackedSet
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct SetState {
    items: Vec<Value>,
    timeline: ChangeTimeline,
    owner: Option<OwnerRef>,
    invalidated: bool,
}

/// A tracked set of values.
///
/// Membership is by content equality; insertion order is preserved for
/// iteration and serialization.
#[derive(Debug, Clone, Default)]
pub struct TrackedSet {
    state: Arc<RwLock<SetState>>,
}

impl TrackedSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set holding the given values, dropping duplicates.
    #[must_use]
    pub fn from_values(values: Vec<Value>) -> Self {
        let set = Self::new();
        {
            let mut state = set.state.write();
            for value in values {
                if !state.items.iter().any(|item| item == &value) {
                    state.items.push(value);
                }
            }
        }
        set
    }

    /// Returns the number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().items.len()
    }

    /// Returns true if the set has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().items.is_empty()
    }

    /// Returns true if the set contains a content-equal value.
    #[must_use]
    pub fn contains(&self, value: &Value) -> bool {
        self.state.read().items.iter().any(|item| item == value)
    }

    /// Returns copies of all elements in insertion order.
    #[must_use]
    pub fn values(&self) -> Vec<Value> {
        self.state.read().items.clone()
    }

    /// Adds a value. Returns false if it was already present.
    pub fn add(&self, value: Value) -> CoreResult<bool> {
        let owner = {
            let mut state = self.state.write();
            if state.invalidated {
                return Err(invalidated_error("set"));
            }
            if state.items.iter().any(|item| item == &value) {
                return Ok(false);
            }
            state.items.push(value.clone());
            state.owner.clone()
        };
        self.record(owner, ChangeEvent::added(EventKey::Element, value));
        Ok(true)
    }

    /// Removes a content-equal value. Returns false if absent.
    pub fn remove(&self, value: &Value) -> CoreResult<bool> {
        let owner = {
            let mut state = self.state.write();
            if state.invalidated {
                return Err(invalidated_error("set"));
            }
            let Some(index) = state.items.iter().position(|item| item == value) else {
                return Ok(false);
            };
            state.items.remove(index);
            state.owner.clone()
        };
        self.record(owner, ChangeEvent::removed(EventKey::Element, value.clone()));
        Ok(true)
    }

    /// Returns true if both handles hold the same elements.
    #[must_use]
    pub fn content_eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.state, &other.state) {
            return true;
        }
        let a = self.state.read().items.clone();
        let b = other.state.read().items.clone();
        a.len() == b.len() && a.iter().all(|item| b.iter().any(|o| o == item))
    }

    /// Returns a copy of the field's change timeline.
    #[must_use]
    pub fn timeline(&self) -> ChangeTimeline {
        self.state.read().timeline.clone()
    }

    /// Reconstructs the element set from before the recorded changes.
    #[must_use]
    pub(crate) fn original_values(&self) -> Vec<Value> {
        let state = self.state.read();
        let mut items = state.items.clone();
        for event in state.timeline.events().iter().rev() {
            match event.kind {
                ChangeKind::Add => {
                    if let Some(index) = items.iter().position(|item| item == &event.value) {
                        items.remove(index);
                    }
                }
                ChangeKind::Remove => {
                    if !items.iter().any(|item| item == &event.value) {
                        items.push(event.value.clone());
                    }
                }
                ChangeKind::Update => {}
            }
        }
        items
    }

    pub(crate) fn set_owner(&self, owner: OwnerRef) {
        let mut state = self.state.write();
        state.owner = Some(owner);
        state.timeline.clear();
    }

    pub(crate) fn clear_owner(&self) {
        let mut state = self.state.write();
        state.owner = None;
        state.timeline.clear();
    }

    pub(crate) fn invalidate(&self) {
        let mut state = self.state.write();
        state.invalidated = true;
        state.owner = None;
        state.timeline.clear();
    }

    pub(crate) fn clear_timeline(&self) {
        self.state.write().timeline.clear();
    }

    fn record(&self, owner: Option<OwnerRef>, event: ChangeEvent) {
        if let Some(owner) = owner {
            if notify_structural_change(&owner) {
                self.state.write().timeline.push(event);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TrackedMap
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MapState {
    entries: Vec<(String, Value)>,
    timeline: ChangeTimeline,
    owner: Option<OwnerRef>,
    invalidated: bool,
}

/// A tracked, string-keyed map of values.
///
/// Insertion order is preserved for iteration and serialization.
#[derive(Debug, Clone, Default)]
pub struct TrackedMap {
    state: Arc<RwLock<MapState>>,
}

impl TrackedMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a map holding the given entries; later duplicates win.
    #[must_use]
    pub fn from_entries(entries: Vec<(String, Value)>) -> Self {
        let map = Self::new();
        {
            let mut state = map.state.write();
            for (key, value) in entries {
                if let Some(slot) = state.entries.iter_mut().find(|(k, _)| k == &key) {
                    slot.1 = value;
                } else {
                    state.entries.push((key, value));
                }
            }
        }
        map
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    /// Returns true if the map has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    /// Returns a copy of the value under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.state
            .read()
            .entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /// Returns true if the map holds an entry under `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.state.read().entries.iter().any(|(k, _)| k == key)
    }

    /// Returns the keys in insertion order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.state
            .read()
            .entries
            .iter()
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Returns copies of all entries in insertion order.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.state.read().entries.clone()
    }

    /// Inserts or replaces the value under `key`, returning the previous one.
    pub fn put(&self, key: impl Into<String>, value: Value) -> CoreResult<Option<Value>> {
        let key = key.into();
        let (owner, old) = {
            let mut state = self.state.write();
            if state.invalidated {
                return Err(invalidated_error("map"));
            }
            let old = match state.entries.iter_mut().find(|(k, _)| k == &key) {
                Some(slot) => Some(std::mem::replace(&mut slot.1, value.clone())),
                None => {
                    state.entries.push((key.clone(), value.clone()));
                    None
                }
            };
            (state.owner.clone(), old)
        };
        let event = match &old {
            Some(previous) => {
                ChangeEvent::updated(EventKey::Key(key), value, previous.clone())
            }
            None => ChangeEvent::added(EventKey::Key(key), value),
        };
        self.record(owner, event);
        Ok(old)
    }

    /// Removes and returns the value under `key`.
    pub fn remove(&self, key: &str) -> CoreResult<Option<Value>> {
        let (owner, removed) = {
            let mut state = self.state.write();
            if state.invalidated {
                return Err(invalidated_error("map"));
            }
            let Some(index) = state.entries.iter().position(|(k, _)| k == key) else {
                return Ok(None);
            };
            let (_, value) = state.entries.remove(index);
            (state.owner.clone(), value)
        };
        self.record(
            owner,
            ChangeEvent::removed(EventKey::Key(key.to_string()), removed.clone()),
        );
        Ok(Some(removed))
    }

    /// Returns true if both handles hold the same entries.
    #[must_use]
    pub fn content_eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.state, &other.state) {
            return true;
        }
        let a = self.state.read().entries.clone();
        let b = other.state.read().entries.clone();
        a.len() == b.len()
            && a.iter()
                .all(|(k, v)| b.iter().any(|(ok, ov)| ok == k && ov == v))
    }

    /// Returns a copy of the field's change timeline.
    #[must_use]
    pub fn timeline(&self) -> ChangeTimeline {
        self.state.read().timeline.clone()
    }

    /// Reconstructs the entries from before the recorded changes.
    #[must_use]
    pub(crate) fn original_entries(&self) -> Vec<(String, Value)> {
        let state = self.state.read();
        let mut entries = state.entries.clone();
        for event in state.timeline.events().iter().rev() {
            let EventKey::Key(key) = &event.key else {
                continue;
            };
            match event.kind {
                ChangeKind::Add => {
                    if let Some(index) = entries.iter().position(|(k, _)| k == key) {
                        entries.remove(index);
                    }
                }
                ChangeKind::Remove => {
                    entries.push((key.clone(), event.value.clone()));
                }
                ChangeKind::Update => {
                    if let (Some(slot), Some(old)) = (
                        entries.iter_mut().find(|(k, _)| k == key),
                        event.old_value.clone(),
                    ) {
                        slot.1 = old;
                    }
                }
            }
        }
        entries
    }

    pub(crate) fn set_owner(&self, owner: OwnerRef) {
        let mut state = self.state.write();
        state.owner = Some(owner);
        state.timeline.clear();
    }

    pub(crate) fn clear_owner(&self) {
        let mut state = self.state.write();
        state.owner = None;
        state.timeline.clear();
    }

    pub(crate) fn invalidate(&self) {
        let mut state = self.state.write();
        state.invalidated = true;
        state.owner = None;
        state.timeline.clear();
    }

    pub(crate) fn clear_timeline(&self) {
        self.state.write().timeline.clear();
    }

    fn record(&self, owner: Option<OwnerRef>, event: ChangeEvent) {
        if let Some(owner) = owner {
            if notify_structural_change(&owner) {
                self.state.write().timeline.push(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_push_set_remove() {
        let list = TrackedList::from_values(vec![Value::Integer(1)]);
        list.push(Value::Integer(2)).unwrap();
        list.set(0, Value::Integer(10)).unwrap();
        assert_eq!(list.values(), vec![Value::Integer(10), Value::Integer(2)]);

        let removed = list.remove(0).unwrap();
        assert_eq!(removed, Value::Integer(10));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn unowned_list_records_no_timeline() {
        let list = TrackedList::new();
        list.push(Value::Integer(1)).unwrap();
        assert!(list.timeline().is_empty());
    }

    #[test]
    fn invalidated_list_rejects_mutation() {
        let list = TrackedList::from_values(vec![Value::Integer(1)]);
        list.invalidate();
        assert!(matches!(
            list.push(Value::Integer(2)),
            Err(CoreError::UnsupportedOperation { .. })
        ));
        assert!(matches!(
            list.remove(0),
            Err(CoreError::UnsupportedOperation { .. })
        ));
    }

    #[test]
    fn list_remove_value_removes_first_occurrence() {
        let list = TrackedList::from_values(vec![
            Value::Integer(1),
            Value::Integer(2),
            Value::Integer(1),
        ]);
        assert!(list.remove_value(&Value::Integer(1)).unwrap());
        assert_eq!(list.values(), vec![Value::Integer(2), Value::Integer(1)]);
        assert!(!list.remove_value(&Value::Integer(9)).unwrap());
    }

    #[test]
    fn set_deduplicates() {
        let set = TrackedSet::new();
        assert!(set.add(Value::Integer(1)).unwrap());
        assert!(!set.add(Value::Integer(1)).unwrap());
        assert_eq!(set.len(), 1);

        assert!(set.remove(&Value::Integer(1)).unwrap());
        assert!(!set.remove(&Value::Integer(1)).unwrap());
    }

    #[test]
    fn map_put_updates_in_place() {
        let map = TrackedMap::new();
        assert!(map.put("a", Value::Integer(1)).unwrap().is_none());
        assert_eq!(
            map.put("a", Value::Integer(2)).unwrap(),
            Some(Value::Integer(1))
        );
        assert_eq!(map.get("a"), Some(Value::Integer(2)));
        assert_eq!(map.remove("a").unwrap(), Some(Value::Integer(2)));
        assert!(map.remove("a").unwrap().is_none());
    }

    #[test]
    fn content_equality_ignores_handle_identity() {
        let a = TrackedList::from_values(vec![Value::Integer(1)]);
        let b = TrackedList::from_values(vec![Value::Integer(1)]);
        assert!(a.content_eq(&b));
        assert!(a.content_eq(&a.clone()));

        let s1 = TrackedSet::from_values(vec![Value::Integer(1), Value::Integer(2)]);
        let s2 = TrackedSet::from_values(vec![Value::Integer(2), Value::Integer(1)]);
        assert!(s1.content_eq(&s2));
    }
}
