//! Per-field change timelines for tracked collections.
//!
//! Every structural mutation of a tracked collection appends one event to
//! the field's timeline. The index updater replays timelines to compute
//! incremental index deltas, and reverse replay reconstructs the collection
//! state from before the changes. A timeline is a replaceable log: it is
//! discarded wholesale when the field is reassigned to a different
//! collection instance.

use crate::document::value::Value;

/// Kind of a structural change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// An element or entry was added.
    Add,
    /// An element or entry was replaced.
    Update,
    /// An element or entry was removed.
    Remove,
}

/// Locates the changed element within its collection.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKey {
    /// List position.
    Position(usize),
    /// Map key.
    Key(String),
    /// Sets and bags: the value itself identifies the element.
    Element,
}

/// One structural change to a tracked collection.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    /// What happened.
    pub kind: ChangeKind,
    /// Where it happened.
    pub key: EventKey,
    /// The added, new, or removed value.
    pub value: Value,
    /// The replaced value, for [`ChangeKind::Update`].
    pub old_value: Option<Value>,
}

impl ChangeEvent {
    /// Creates an add event.
    #[must_use]
    pub fn added(key: EventKey, value: Value) -> Self {
        Self {
            kind: ChangeKind::Add,
            key,
            value,
            old_value: None,
        }
    }

    /// Creates an update event.
    #[must_use]
    pub fn updated(key: EventKey, value: Value, old_value: Value) -> Self {
        Self {
            kind: ChangeKind::Update,
            key,
            value,
            old_value: Some(old_value),
        }
    }

    /// Creates a remove event.
    #[must_use]
    pub fn removed(key: EventKey, value: Value) -> Self {
        Self {
            kind: ChangeKind::Remove,
            key,
            value,
            old_value: None,
        }
    }
}

/// Append-only log of structural changes to one tracked collection field.
#[derive(Debug, Clone, Default)]
pub struct ChangeTimeline {
    events: Vec<ChangeEvent>,
}

impl ChangeTimeline {
    /// Creates an empty timeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event.
    pub fn push(&mut self, event: ChangeEvent) {
        self.events.push(event);
    }

    /// Returns the recorded events in order.
    #[must_use]
    pub fn events(&self) -> &[ChangeEvent] {
        &self.events
    }

    /// Returns the number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true if no events are recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Discards all events.
    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_events_in_order() {
        let mut timeline = ChangeTimeline::new();
        assert!(timeline.is_empty());

        timeline.push(ChangeEvent::added(
            EventKey::Position(0),
            Value::Text("a".to_string()),
        ));
        timeline.push(ChangeEvent::removed(
            EventKey::Position(0),
            Value::Text("a".to_string()),
        ));

        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline.events()[0].kind, ChangeKind::Add);
        assert_eq!(timeline.events()[1].kind, ChangeKind::Remove);
    }

    #[test]
    fn update_carries_old_value() {
        let event = ChangeEvent::updated(
            EventKey::Key("k".to_string()),
            Value::Integer(2),
            Value::Integer(1),
        );
        assert_eq!(event.old_value, Some(Value::Integer(1)));
    }

    #[test]
    fn clear_discards_everything() {
        let mut timeline = ChangeTimeline::new();
        timeline.push(ChangeEvent::added(EventKey::Element, Value::Integer(1)));
        timeline.clear();
        assert!(timeline.is_empty());
    }
}
