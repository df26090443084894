//! Index key types.

use crate::document::Value;
use linkdb_storage::Rid;
use std::fmt;

/// One scalar component of an index key.
///
/// Field values are runtime-tagged, so key components are too. Components
/// order by kind first, then by value, giving every key a total order.
/// Values that cannot be indexed inline (embedded documents, nested
/// collections) contribute a null component.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyPart {
    /// Null component.
    Null,
    /// Boolean component.
    Bool(bool),
    /// Integer component.
    Integer(i64),
    /// Text component.
    Text(String),
    /// Byte-string component.
    Bytes(Vec<u8>),
    /// Link component.
    Link(Rid),
}

impl KeyPart {
    /// Converts a scalar value into a key component.
    #[must_use]
    pub fn from_value(value: &Value) -> KeyPart {
        match value {
            Value::Bool(b) => KeyPart::Bool(*b),
            Value::Integer(n) => KeyPart::Integer(*n),
            Value::Text(s) => KeyPart::Text(s.clone()),
            Value::Bytes(b) => KeyPart::Bytes(b.clone()),
            Value::Link(rid) => KeyPart::Link(*rid),
            _ => KeyPart::Null,
        }
    }

    /// Returns true if this is the null component.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, KeyPart::Null)
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Null => write!(f, "null"),
            KeyPart::Bool(b) => write!(f, "{b}"),
            KeyPart::Integer(n) => write!(f, "{n}"),
            KeyPart::Text(s) => write!(f, "{s}"),
            KeyPart::Bytes(b) => write!(f, "{}b", b.len()),
            KeyPart::Link(rid) => write!(f, "{rid}"),
        }
    }
}

/// A full index key: an ordered tuple of components.
///
/// Single-property indexes use one-component keys; composite indexes use
/// one component per property, in definition order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexKey(Vec<KeyPart>);

impl IndexKey {
    /// Creates a key from its components.
    #[must_use]
    pub fn new(parts: Vec<KeyPart>) -> Self {
        Self(parts)
    }

    /// Creates a single-component key.
    #[must_use]
    pub fn single(part: KeyPart) -> Self {
        Self(vec![part])
    }

    /// Returns the components in order.
    #[must_use]
    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    /// Returns the number of components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the key has no components.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{part}")?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parts_order_by_kind_then_value() {
        assert!(KeyPart::Null < KeyPart::Bool(false));
        assert!(KeyPart::Integer(5) < KeyPart::Integer(6));
        assert!(KeyPart::Integer(i64::MAX) < KeyPart::Text(String::new()));
        assert!(KeyPart::Text("a".to_string()) < KeyPart::Text("b".to_string()));
    }

    #[test]
    fn keys_compare_componentwise() {
        let a = IndexKey::new(vec![KeyPart::Text("x".to_string()), KeyPart::Integer(1)]);
        let b = IndexKey::new(vec![KeyPart::Text("x".to_string()), KeyPart::Integer(2)]);
        assert!(a < b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn from_value_maps_scalars() {
        assert_eq!(
            KeyPart::from_value(&Value::Integer(3)),
            KeyPart::Integer(3)
        );
        assert_eq!(KeyPart::from_value(&Value::Null), KeyPart::Null);
        assert_eq!(
            KeyPart::from_value(&Value::Link(Rid::new(1, 2))),
            KeyPart::Link(Rid::new(1, 2))
        );
    }

    #[test]
    fn display() {
        let key = IndexKey::new(vec![KeyPart::Text("test1".to_string()), KeyPart::Integer(2)]);
        assert_eq!(format!("{key}"), "[test1, 2]");
    }
}
