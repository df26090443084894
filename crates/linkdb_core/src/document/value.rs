//! Dynamic field values.

use crate::document::tracked::{TrackedList, TrackedMap, TrackedSet};
use crate::document::Document;
use crate::ridbag::RidBag;
use linkdb_storage::Rid;

/// A dynamic field value.
///
/// Documents hold runtime-tagged values instead of statically typed fields.
/// Collection variants wrap tracked containers that record structural
/// changes for dirty-checking and incremental index maintenance.
///
/// Floats are intentionally not part of the value model: index keys must be
/// totally ordered and hashable, and the record image encoding is
/// canonical.
///
/// Equality is content-based: embedded documents compare field-by-field and
/// link bags compare as multisets, regardless of internal representation.
#[derive(Debug, Clone)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer (full i64 range).
    Integer(i64),
    /// Text string (UTF-8).
    Text(String),
    /// Byte string.
    Bytes(Vec<u8>),
    /// Reference to another record by rid.
    Link(Rid),
    /// Sub-document stored inline, with no identity of its own.
    Embedded(Document),
    /// Tracked list of values.
    List(TrackedList),
    /// Tracked set of values.
    Set(TrackedSet),
    /// Tracked string-keyed map of values.
    Map(TrackedMap),
    /// Adaptive multiset of links.
    LinkBag(RidBag),
}

/// Declared type of a document field, used for coercive reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Boolean scalar.
    Boolean,
    /// Integer scalar.
    Integer,
    /// Text scalar.
    String,
    /// Byte string.
    Binary,
    /// Link to another record.
    Link,
    /// Embedded sub-document.
    Embedded,
    /// List of embedded values.
    EmbeddedList,
    /// Set of embedded values.
    EmbeddedSet,
    /// Map of embedded values.
    EmbeddedMap,
    /// List of links.
    LinkList,
    /// Set of links.
    LinkSet,
    /// Map of links.
    LinkMap,
    /// Adaptive multiset of links.
    LinkBag,
}

impl FieldType {
    /// Infers the field type of a value, when unambiguous.
    ///
    /// Collections of links cannot be told apart from collections of
    /// embedded values when empty; the embedded kind is reported.
    #[must_use]
    pub fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(Self::Boolean),
            Value::Integer(_) => Some(Self::Integer),
            Value::Text(_) => Some(Self::String),
            Value::Bytes(_) => Some(Self::Binary),
            Value::Link(_) => Some(Self::Link),
            Value::Embedded(_) => Some(Self::Embedded),
            Value::List(_) => Some(Self::EmbeddedList),
            Value::Set(_) => Some(Self::EmbeddedSet),
            Value::Map(_) => Some(Self::EmbeddedMap),
            Value::LinkBag(_) => Some(Self::LinkBag),
        }
    }

    /// Returns true if this type names a tracked collection kind.
    #[must_use]
    pub const fn is_collection(self) -> bool {
        matches!(
            self,
            Self::EmbeddedList
                | Self::EmbeddedSet
                | Self::EmbeddedMap
                | Self::LinkList
                | Self::LinkSet
                | Self::LinkMap
                | Self::LinkBag
        )
    }
}

impl Value {
    /// Returns a short name of the value's kind, for diagnostics.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Link(_) => "link",
            Value::Embedded(_) => "embedded",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Map(_) => "map",
            Value::LinkBag(_) => "linkbag",
        }
    }

    /// Check if this value is null.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get this value as a boolean, if it is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as an integer, if it is one.
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a string, if it is text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as bytes, if it is a byte string.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Get this value as a rid, if it is a link.
    #[must_use]
    pub fn as_link(&self) -> Option<Rid> {
        match self {
            Value::Link(rid) => Some(*rid),
            _ => None,
        }
    }

    /// Get this value as an embedded document, if it is one.
    #[must_use]
    pub fn as_embedded(&self) -> Option<&Document> {
        match self {
            Value::Embedded(doc) => Some(doc),
            _ => None,
        }
    }

    /// Get this value as a tracked list, if it is one.
    #[must_use]
    pub fn as_list(&self) -> Option<&TrackedList> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    /// Get this value as a tracked set, if it is one.
    #[must_use]
    pub fn as_set(&self) -> Option<&TrackedSet> {
        match self {
            Value::Set(set) => Some(set),
            _ => None,
        }
    }

    /// Get this value as a tracked map, if it is one.
    #[must_use]
    pub fn as_map(&self) -> Option<&TrackedMap> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Get this value as a link bag, if it is one.
    #[must_use]
    pub fn as_link_bag(&self) -> Option<&RidBag> {
        match self {
            Value::LinkBag(bag) => Some(bag),
            _ => None,
        }
    }

    /// Deep-copies this value.
    ///
    /// Collection variants become fresh, unowned wrappers with empty
    /// timelines; embedded documents are copied transitively.
    #[must_use]
    pub fn deep_copy(&self) -> Value {
        match self {
            Value::Null => Value::Null,
            Value::Bool(b) => Value::Bool(*b),
            Value::Integer(n) => Value::Integer(*n),
            Value::Text(s) => Value::Text(s.clone()),
            Value::Bytes(b) => Value::Bytes(b.clone()),
            Value::Link(rid) => Value::Link(*rid),
            Value::Embedded(doc) => Value::Embedded(doc.copy()),
            Value::List(list) => Value::List(TrackedList::from_values(
                list.values().iter().map(Value::deep_copy).collect(),
            )),
            Value::Set(set) => Value::Set(TrackedSet::from_values(
                set.values().iter().map(Value::deep_copy).collect(),
            )),
            Value::Map(map) => Value::Map(TrackedMap::from_entries(
                map.entries()
                    .into_iter()
                    .map(|(k, v)| (k, v.deep_copy()))
                    .collect(),
            )),
            Value::LinkBag(bag) => Value::LinkBag(bag.copy()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Link(a), Value::Link(b)) => a == b,
            (Value::Embedded(a), Value::Embedded(b)) => a.has_same_content_of(b),
            (Value::List(a), Value::List(b)) => a.content_eq(b),
            (Value::Set(a), Value::Set(b)) => a.content_eq(b),
            (Value::Map(a), Value::Map(b)) => a.content_eq(b),
            (Value::LinkBag(a), Value::LinkBag(b)) => a.content_eq(b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<Rid> for Value {
    fn from(rid: Rid) -> Self {
        Value::Link(rid)
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        Value::Embedded(doc)
    }
}

impl From<TrackedList> for Value {
    fn from(list: TrackedList) -> Self {
        Value::List(list)
    }
}

impl From<TrackedSet> for Value {
    fn from(set: TrackedSet) -> Self {
        Value::Set(set)
    }
}

impl From<TrackedMap> for Value {
    fn from(map: TrackedMap) -> Self {
        Value::Map(map)
    }
}

impl From<RidBag> for Value {
    fn from(bag: RidBag) -> Self {
        Value::LinkBag(bag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_equality() {
        assert_eq!(Value::from(42i64), Value::Integer(42));
        assert_eq!(Value::from("hello"), Value::Text("hello".to_string()));
        assert_ne!(Value::Integer(1), Value::Text("1".to_string()));
        assert_eq!(Value::from(Rid::new(1, 2)), Value::Link(Rid::new(1, 2)));
    }

    #[test]
    fn list_equality_is_content_based() {
        let a = TrackedList::from_values(vec![Value::Integer(1), Value::Integer(2)]);
        let b = TrackedList::from_values(vec![Value::Integer(1), Value::Integer(2)]);
        assert_eq!(Value::List(a), Value::List(b));
    }

    #[test]
    fn deep_copy_detaches_collections() {
        let list = TrackedList::from_values(vec![Value::Integer(1)]);
        let copy = Value::List(list.clone()).deep_copy();

        list.push(Value::Integer(2)).unwrap();
        let copied = copy.as_list().unwrap();
        assert_eq!(copied.len(), 1);
    }

    #[test]
    fn type_inference() {
        assert_eq!(FieldType::of(&Value::Bool(true)), Some(FieldType::Boolean));
        assert_eq!(FieldType::of(&Value::Null), None);
        assert_eq!(
            FieldType::of(&Value::Link(Rid::new(0, 0))),
            Some(FieldType::Link)
        );
        assert!(FieldType::EmbeddedList.is_collection());
        assert!(!FieldType::Integer.is_collection());
    }
}
