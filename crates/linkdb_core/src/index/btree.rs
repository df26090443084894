//! Secondary index storage.

use crate::error::{CoreError, CoreResult};
use crate::index::definition::IndexDefinition;
use crate::index::key::IndexKey;
use linkdb_storage::Rid;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};

/// Uniqueness mode of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    /// Each key maps to at most one record.
    Unique,
    /// Each key maps to any number of records.
    NotUnique,
}

#[derive(Debug, Default)]
struct IndexState {
    entries: BTreeMap<IndexKey, HashSet<Rid>>,
    entry_count: usize,
}

/// A named secondary index: an ordered mapping from keys to the rids of
/// the records contributing them.
///
/// The entry count equals the number of live (key, rid) contributions;
/// after any committed mutation it is exactly the function of current
/// record values defined by the index definition and its null policy.
#[derive(Debug)]
pub struct Index {
    name: String,
    index_type: IndexType,
    definition: IndexDefinition,
    clusters: Vec<i32>,
    state: RwLock<IndexState>,
}

impl Index {
    pub(crate) fn new(
        name: String,
        index_type: IndexType,
        definition: IndexDefinition,
        clusters: Vec<i32>,
    ) -> Self {
        Self {
            name,
            index_type,
            definition,
            clusters,
            state: RwLock::new(IndexState::default()),
        }
    }

    /// Returns the index name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the uniqueness mode.
    #[must_use]
    pub fn index_type(&self) -> IndexType {
        self.index_type
    }

    /// Returns the definition.
    #[must_use]
    pub fn definition(&self) -> &IndexDefinition {
        &self.definition
    }

    /// Returns the clusters the index covers.
    #[must_use]
    pub fn clusters(&self) -> &[i32] {
        &self.clusters
    }

    /// Returns the total number of (key, rid) entries.
    #[must_use]
    pub fn size(&self) -> usize {
        self.state.read().entry_count
    }

    /// Returns true if a key has at least one entry.
    #[must_use]
    pub fn contains_key(&self, key: &IndexKey) -> bool {
        self.state.read().entries.contains_key(key)
    }

    /// Returns the rids stored under a key.
    ///
    /// Each call takes a fresh snapshot; the returned iterator is finite
    /// and unaffected by later mutations.
    #[must_use]
    pub fn rids(&self, key: &IndexKey) -> RidStream {
        let mut rids: Vec<Rid> = self
            .state
            .read()
            .entries
            .get(key)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        rids.sort_unstable();
        RidStream {
            inner: rids.into_iter(),
        }
    }

    /// Returns the keys in order.
    ///
    /// Each call takes a fresh snapshot; the returned iterator is finite
    /// and unaffected by later mutations.
    #[must_use]
    pub fn key_stream(&self) -> KeyStream {
        let keys: Vec<IndexKey> = self.state.read().entries.keys().cloned().collect();
        KeyStream {
            inner: keys.into_iter(),
        }
    }

    /// Inserts an entry, enforcing the uniqueness mode.
    pub(crate) fn put(&self, key: IndexKey, rid: Rid) -> CoreResult<()> {
        let mut state = self.state.write();
        if self.index_type == IndexType::Unique {
            if let Some(existing) = state.entries.get(&key) {
                if !existing.is_empty() && !existing.contains(&rid) {
                    return Err(CoreError::duplicate_key(&self.name, key.to_string()));
                }
            }
        }
        if state.entries.entry(key).or_default().insert(rid) {
            state.entry_count += 1;
        }
        Ok(())
    }

    /// Inserts an entry without a uniqueness check.
    ///
    /// Used by commit apply, after the whole batch validated.
    pub(crate) fn put_unchecked(&self, key: IndexKey, rid: Rid) {
        let mut state = self.state.write();
        if state.entries.entry(key).or_default().insert(rid) {
            state.entry_count += 1;
        }
    }

    /// Removes an entry. Returns true if it was present.
    pub(crate) fn remove_entry(&self, key: &IndexKey, rid: Rid) -> bool {
        let mut state = self.state.write();
        let (removed, now_empty) = match state.entries.get_mut(key) {
            Some(set) => (set.remove(&rid), set.is_empty()),
            None => return false,
        };
        if removed {
            state.entry_count -= 1;
            if now_empty {
                state.entries.remove(key);
            }
        }
        removed
    }

    /// Removes every entry.
    pub(crate) fn clear(&self) {
        let mut state = self.state.write();
        state.entries.clear();
        state.entry_count = 0;
    }
}

/// A finite, restartable snapshot of the rids under one key.
pub struct RidStream {
    inner: std::vec::IntoIter<Rid>,
}

impl Iterator for RidStream {
    type Item = Rid;

    fn next(&mut self) -> Option<Rid> {
        self.inner.next()
    }
}

impl ExactSizeIterator for RidStream {
    fn len(&self) -> usize {
        self.inner.len()
    }
}

/// A finite, restartable snapshot of an index's keys, in order.
pub struct KeyStream {
    inner: std::vec::IntoIter<IndexKey>,
}

impl Iterator for KeyStream {
    type Item = IndexKey;

    fn next(&mut self) -> Option<IndexKey> {
        self.inner.next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::definition::PropertyDefinition;
    use crate::index::key::KeyPart;

    fn test_index(index_type: IndexType) -> Index {
        let definition =
            IndexDefinition::new("person", vec![PropertyDefinition::new("name")]).unwrap();
        Index::new("person.name".to_string(), index_type, definition, vec![0])
    }

    fn key(text: &str) -> IndexKey {
        IndexKey::single(KeyPart::Text(text.to_string()))
    }

    #[test]
    fn put_and_lookup() {
        let index = test_index(IndexType::NotUnique);
        index.put(key("a"), Rid::new(0, 1)).unwrap();
        index.put(key("a"), Rid::new(0, 2)).unwrap();
        index.put(key("b"), Rid::new(0, 3)).unwrap();

        assert_eq!(index.size(), 3);
        let rids: Vec<Rid> = index.rids(&key("a")).collect();
        assert_eq!(rids, vec![Rid::new(0, 1), Rid::new(0, 2)]);
        assert!(index.rids(&key("missing")).next().is_none());
    }

    #[test]
    fn duplicate_put_is_idempotent() {
        let index = test_index(IndexType::NotUnique);
        index.put(key("a"), Rid::new(0, 1)).unwrap();
        index.put(key("a"), Rid::new(0, 1)).unwrap();
        assert_eq!(index.size(), 1);
    }

    #[test]
    fn unique_rejects_second_rid() {
        let index = test_index(IndexType::Unique);
        index.put(key("a"), Rid::new(0, 1)).unwrap();
        // same rid again is fine
        index.put(key("a"), Rid::new(0, 1)).unwrap();

        let err = index.put(key("a"), Rid::new(0, 2)).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateKey { .. }));
        assert_eq!(index.size(), 1);
    }

    #[test]
    fn remove_entry_prunes_empty_keys() {
        let index = test_index(IndexType::NotUnique);
        index.put(key("a"), Rid::new(0, 1)).unwrap();

        assert!(index.remove_entry(&key("a"), Rid::new(0, 1)));
        assert!(!index.remove_entry(&key("a"), Rid::new(0, 1)));
        assert_eq!(index.size(), 0);
        assert!(!index.contains_key(&key("a")));
    }

    #[test]
    fn key_stream_is_ordered() {
        let index = test_index(IndexType::NotUnique);
        index.put(key("b"), Rid::new(0, 1)).unwrap();
        index.put(key("a"), Rid::new(0, 2)).unwrap();

        let keys: Vec<IndexKey> = index.key_stream().collect();
        assert_eq!(keys, vec![key("a"), key("b")]);
    }
}
