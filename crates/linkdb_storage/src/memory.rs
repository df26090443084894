//! In-memory storage substrate.

use crate::backend::{RecordStorage, VersionedRecord};
use crate::error::{StorageError, StorageResult};
use crate::rid::Rid;
use crate::tree::TreeHandle;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};

/// An in-memory storage substrate.
///
/// Suitable for:
/// - Unit and integration tests
/// - Ephemeral embedded databases that don't need persistence
///
/// # Thread Safety
///
/// All state sits behind `parking_lot` locks; the substrate can be shared
/// across sessions on different threads.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    clusters: RwLock<HashMap<String, i32>>,
    next_cluster: AtomicI32,
    positions: RwLock<HashMap<i32, i64>>,
    records: RwLock<BTreeMap<Rid, VersionedRecord>>,
    trees: RwLock<HashMap<TreeHandle, BTreeMap<Rid, u64>>>,
    next_tree: AtomicU64,
}

impl MemoryStorage {
    /// Creates an empty in-memory substrate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored records across all clusters.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.records.read().len()
    }

    /// Returns the number of live tree collections.
    #[must_use]
    pub fn tree_count(&self) -> usize {
        self.trees.read().len()
    }
}

impl RecordStorage for MemoryStorage {
    fn create_cluster(&self, name: &str) -> StorageResult<i32> {
        let mut clusters = self.clusters.write();
        if clusters.contains_key(name) {
            return Err(StorageError::ClusterExists {
                name: name.to_string(),
            });
        }
        let id = self.next_cluster.fetch_add(1, Ordering::SeqCst);
        clusters.insert(name.to_string(), id);
        self.positions.write().insert(id, 0);
        Ok(id)
    }

    fn cluster_id(&self, name: &str) -> Option<i32> {
        self.clusters.read().get(name).copied()
    }

    fn allocate(&self, cluster: i32) -> StorageResult<Rid> {
        let mut positions = self.positions.write();
        let next = positions
            .get_mut(&cluster)
            .ok_or(StorageError::ClusterIdNotFound { id: cluster })?;
        let position = *next;
        *next += 1;
        Ok(Rid::new(cluster, position))
    }

    fn insert(&self, rid: Rid, record: VersionedRecord) -> StorageResult<()> {
        let mut records = self.records.write();
        if records.contains_key(&rid) {
            return Err(StorageError::RecordExists { rid });
        }
        records.insert(rid, record);
        Ok(())
    }

    fn read(&self, rid: Rid) -> StorageResult<Option<VersionedRecord>> {
        Ok(self.records.read().get(&rid).cloned())
    }

    fn version_of(&self, rid: Rid) -> StorageResult<Option<u32>> {
        Ok(self.records.read().get(&rid).map(|r| r.version))
    }

    fn update(&self, rid: Rid, record: VersionedRecord) -> StorageResult<()> {
        let mut records = self.records.write();
        match records.get_mut(&rid) {
            Some(stored) => {
                *stored = record;
                Ok(())
            }
            None => Err(StorageError::RecordNotFound { rid }),
        }
    }

    fn remove(&self, rid: Rid) -> StorageResult<()> {
        match self.records.write().remove(&rid) {
            Some(_) => Ok(()),
            None => Err(StorageError::RecordNotFound { rid }),
        }
    }

    fn contains(&self, rid: Rid) -> bool {
        self.records.read().contains_key(&rid)
    }

    fn scan_cluster(&self, cluster: i32) -> StorageResult<Vec<(Rid, VersionedRecord)>> {
        if !self.positions.read().contains_key(&cluster) {
            return Err(StorageError::ClusterIdNotFound { id: cluster });
        }
        let records = self.records.read();
        Ok(records
            .range(Rid::new(cluster, 0)..=Rid::new(cluster, i64::MAX))
            .map(|(rid, record)| (*rid, record.clone()))
            .collect())
    }

    fn create_tree(&self) -> StorageResult<TreeHandle> {
        let handle = TreeHandle::new(self.next_tree.fetch_add(1, Ordering::SeqCst));
        self.trees.write().insert(handle, BTreeMap::new());
        Ok(handle)
    }

    fn tree_apply(&self, handle: TreeHandle, deltas: &[(Rid, i64)]) -> StorageResult<()> {
        let mut trees = self.trees.write();
        let tree = trees
            .get_mut(&handle)
            .ok_or(StorageError::TreeNotFound { handle })?;
        for &(rid, delta) in deltas {
            let current = tree.get(&rid).copied().unwrap_or(0) as i64;
            let updated = (current + delta).max(0);
            if updated == 0 {
                tree.remove(&rid);
            } else {
                tree.insert(rid, updated as u64);
            }
        }
        Ok(())
    }

    fn tree_entries(&self, handle: TreeHandle) -> StorageResult<Vec<(Rid, u64)>> {
        let trees = self.trees.read();
        let tree = trees
            .get(&handle)
            .ok_or(StorageError::TreeNotFound { handle })?;
        Ok(tree.iter().map(|(rid, count)| (*rid, *count)).collect())
    }

    fn tree_size(&self, handle: TreeHandle) -> StorageResult<u64> {
        let trees = self.trees.read();
        let tree = trees
            .get(&handle)
            .ok_or(StorageError::TreeNotFound { handle })?;
        Ok(tree.values().sum())
    }

    fn drop_tree(&self, handle: TreeHandle) -> StorageResult<()> {
        self.trees.write().remove(&handle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_registration() {
        let storage = MemoryStorage::new();
        let id = storage.create_cluster("person").unwrap();
        assert_eq!(storage.cluster_id("person"), Some(id));
        assert!(storage.cluster_id("missing").is_none());
        assert!(storage.create_cluster("person").is_err());
    }

    #[test]
    fn allocation_is_monotonic() {
        let storage = MemoryStorage::new();
        let cluster = storage.create_cluster("person").unwrap();
        let a = storage.allocate(cluster).unwrap();
        let b = storage.allocate(cluster).unwrap();
        assert_eq!(a.position() + 1, b.position());
        assert!(storage.allocate(99).is_err());
    }

    #[test]
    fn record_crud() {
        let storage = MemoryStorage::new();
        let cluster = storage.create_cluster("person").unwrap();
        let rid = storage.allocate(cluster).unwrap();

        assert!(storage.read(rid).unwrap().is_none());
        storage
            .insert(rid, VersionedRecord::new(vec![1, 2, 3], 1))
            .unwrap();
        assert!(storage
            .insert(rid, VersionedRecord::new(vec![], 1))
            .is_err());

        let stored = storage.read(rid).unwrap().unwrap();
        assert_eq!(stored.payload, vec![1, 2, 3]);
        assert_eq!(storage.version_of(rid).unwrap(), Some(1));

        storage
            .update(rid, VersionedRecord::new(vec![4], 2))
            .unwrap();
        assert_eq!(storage.version_of(rid).unwrap(), Some(2));

        storage.remove(rid).unwrap();
        assert!(storage.remove(rid).is_err());
        assert!(!storage.contains(rid));
    }

    #[test]
    fn scan_is_cluster_scoped() {
        let storage = MemoryStorage::new();
        let c1 = storage.create_cluster("a").unwrap();
        let c2 = storage.create_cluster("b").unwrap();

        for cluster in [c1, c2, c1] {
            let rid = storage.allocate(cluster).unwrap();
            storage
                .insert(rid, VersionedRecord::new(vec![], 1))
                .unwrap();
        }

        assert_eq!(storage.scan_cluster(c1).unwrap().len(), 2);
        assert_eq!(storage.scan_cluster(c2).unwrap().len(), 1);
    }

    #[test]
    fn tree_counted_deltas() {
        let storage = MemoryStorage::new();
        let handle = storage.create_tree().unwrap();
        let a = Rid::new(1, 0);
        let b = Rid::new(1, 1);

        storage
            .tree_apply(handle, &[(a, 2), (b, 1)])
            .unwrap();
        assert_eq!(storage.tree_size(handle).unwrap(), 3);

        storage.tree_apply(handle, &[(a, -1)]).unwrap();
        assert_eq!(
            storage.tree_entries(handle).unwrap(),
            vec![(a, 1), (b, 1)]
        );

        storage.tree_apply(handle, &[(a, -1)]).unwrap();
        assert_eq!(storage.tree_entries(handle).unwrap(), vec![(b, 1)]);

        storage.drop_tree(handle).unwrap();
        assert!(storage.tree_entries(handle).is_err());
        // second drop is a no-op
        storage.drop_tree(handle).unwrap();
    }
}
