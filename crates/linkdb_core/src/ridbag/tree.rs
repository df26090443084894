//! Tree-backed representation of a link bag.

use linkdb_storage::{Rid, TreeHandle};

/// Link bag content backed by a persisted tree collection.
///
/// The logical multiset is kept materialized in `entries`; the pending
/// deltas accumulated by the owning bag are applied to the persisted tree
/// only when the owning record commits.
#[derive(Debug, Clone)]
pub(crate) struct TreeBag {
    pub(crate) handle: TreeHandle,
    pub(crate) entries: Vec<Rid>,
}

impl TreeBag {
    pub(crate) fn new(handle: TreeHandle, entries: Vec<Rid>) -> Self {
        Self { handle, entries }
    }

    /// Expands (rid, count) pairs read from the persisted tree.
    pub(crate) fn from_counted(handle: TreeHandle, counted: Vec<(Rid, u64)>) -> Self {
        let mut entries = Vec::new();
        for (rid, count) in counted {
            for _ in 0..count {
                entries.push(rid);
            }
        }
        Self { handle, entries }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn contains(&self, rid: Rid) -> bool {
        self.entries.contains(&rid)
    }

    pub(crate) fn add(&mut self, rid: Rid) {
        self.entries.push(rid);
    }

    /// Removes one instance of `rid`, returning its former index.
    pub(crate) fn remove_one(&mut self, rid: Rid) -> Option<usize> {
        let index = self.entries.iter().position(|&r| r == rid)?;
        self.entries.remove(index);
        Some(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counted_expansion() {
        let a = Rid::new(1, 0);
        let b = Rid::new(1, 1);
        let bag = TreeBag::from_counted(TreeHandle::new(0), vec![(a, 2), (b, 1)]);
        assert_eq!(bag.len(), 3);
        assert!(bag.contains(a));
        assert!(bag.contains(b));
    }
}
