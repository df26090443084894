//! Handles for persisted tree collections.
//!
//! A tree collection is an ordered, counted multiset of rids persisted
//! outside any single record. Link bags reference one through a
//! [`TreeHandle`] once they outgrow their inline representation.

use std::fmt;

/// Opaque handle naming a persisted tree collection.
///
/// Handles are allocated by the storage substrate, are stable for the
/// lifetime of the collection, and are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TreeHandle(pub u64);

impl TreeHandle {
    /// Creates a handle from its raw value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw handle value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TreeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tree:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let handle = TreeHandle::new(9);
        assert_eq!(handle.as_u64(), 9);
        assert_eq!(format!("{handle}"), "tree:9");
    }
}
