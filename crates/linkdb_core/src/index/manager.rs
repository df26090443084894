//! Index registry and lifecycle.

use crate::config::Config;
use crate::document::decode_document;
use crate::error::{CoreError, CoreResult};
use crate::index::btree::{Index, IndexType};
use crate::index::definition::IndexDefinition;
use crate::types::Version;
use linkdb_storage::RecordStorage;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Receives progress callbacks from index builds and rebuilds.
pub trait ProgressListener: Send + Sync {
    /// Called once before the build starts.
    fn on_begin(&self, total: u64) {
        let _ = total;
    }

    /// Called after each processed record.
    fn on_progress(&self, processed: u64, total: u64) {
        let _ = (processed, total);
    }

    /// Called once after the build finishes or fails.
    fn on_completion(&self, success: bool) {
        let _ = success;
    }
}

/// Maintains every secondary index of a database.
///
/// The manager owns index lifecycle (create, drop, rebuild) and the
/// class-scoped query surface; the per-save update protocol lives with the
/// transaction machinery, which applies staged deltas here at commit.
pub struct IndexManager {
    storage: Arc<dyn RecordStorage>,
    config: Config,
    indexes: RwLock<HashMap<String, Arc<Index>>>,
}

impl IndexManager {
    pub(crate) fn new(storage: Arc<dyn RecordStorage>, config: Config) -> Self {
        Self {
            storage,
            config,
            indexes: RwLock::new(HashMap::new()),
        }
    }

    /// Creates an index and builds it from the stored records of the given
    /// clusters.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidOperation` if the name is taken and with
    /// `DuplicateKey` if existing records violate a UNIQUE constraint.
    pub fn create_index(
        &self,
        name: impl Into<String>,
        index_type: IndexType,
        definition: IndexDefinition,
        cluster_ids: Vec<i32>,
        listener: Option<&dyn ProgressListener>,
    ) -> CoreResult<Arc<Index>> {
        let name = name.into();
        if name.is_empty() {
            return Err(CoreError::validation("index name cannot be empty"));
        }
        {
            let indexes = self.indexes.read();
            if indexes.contains_key(&name) {
                return Err(CoreError::invalid_operation(format!(
                    "index '{name}' already exists"
                )));
            }
        }

        let index = Arc::new(Index::new(
            name.clone(),
            index_type,
            definition,
            cluster_ids,
        ));
        self.populate(&index, listener)?;
        self.indexes.write().insert(name.clone(), Arc::clone(&index));
        tracing::debug!(index = %name, "index created");
        Ok(index)
    }

    /// Returns an index by name.
    #[must_use]
    pub fn get_index(&self, name: &str) -> Option<Arc<Index>> {
        self.indexes.read().get(name).cloned()
    }

    /// Returns an index by name, scoped to a schema class.
    #[must_use]
    pub fn get_class_index(&self, class_name: &str, name: &str) -> Option<Arc<Index>> {
        self.get_index(name)
            .filter(|index| index.definition().class_name() == class_name)
    }

    /// Drops an index. Returns true if it existed.
    pub fn drop_index(&self, name: &str) -> bool {
        let removed = self.indexes.write().remove(name).is_some();
        if removed {
            tracing::debug!(index = %name, "index dropped");
        }
        removed
    }

    /// Returns every index covering a schema class.
    #[must_use]
    pub fn class_indexes(&self, class_name: &str) -> Vec<Arc<Index>> {
        self.indexes
            .read()
            .values()
            .filter(|index| index.definition().class_name() == class_name)
            .cloned()
            .collect()
    }

    /// Returns every index of a class whose property set matches the
    /// requested set exactly - same count, same membership, any order.
    #[must_use]
    pub fn class_involved_indexes(
        &self,
        class_name: &str,
        properties: &[&str],
    ) -> Vec<Arc<Index>> {
        self.class_indexes(class_name)
            .into_iter()
            .filter(|index| {
                let fields = index.definition().fields();
                fields.len() == properties.len()
                    && properties.iter().all(|p| fields.contains(p))
                    && fields.iter().all(|f| properties.contains(f))
            })
            .collect()
    }

    /// Returns true if the class has an index over exactly these
    /// properties.
    #[must_use]
    pub fn are_indexed(&self, class_name: &str, properties: &[&str]) -> bool {
        !self.class_involved_indexes(class_name, properties).is_empty()
    }

    /// Returns the registered index names.
    #[must_use]
    pub fn index_names(&self) -> Vec<String> {
        self.indexes.read().keys().cloned().collect()
    }

    /// Rebuilds an index from the stored records of its clusters.
    ///
    /// Returns the number of records processed.
    pub fn rebuild_index(
        &self,
        name: &str,
        listener: Option<&dyn ProgressListener>,
    ) -> CoreResult<u64> {
        let index = self
            .get_index(name)
            .ok_or_else(|| CoreError::invalid_operation(format!("index '{name}' does not exist")))?;
        index.clear();
        let processed = self.populate(&index, listener)?;
        tracing::debug!(index = %name, processed, "index rebuilt");
        Ok(processed)
    }

    fn populate(
        &self,
        index: &Arc<Index>,
        listener: Option<&dyn ProgressListener>,
    ) -> CoreResult<u64> {
        let mut records = Vec::new();
        for &cluster in index.clusters() {
            records.extend(self.storage.scan_cluster(cluster)?);
        }
        let total = records.len() as u64;
        if let Some(listener) = listener {
            listener.on_begin(total);
        }

        let mut processed = 0u64;
        for (rid, record) in records {
            let result = (|| -> CoreResult<()> {
                let doc = decode_document(
                    &record.payload,
                    rid,
                    Version::new(record.version),
                    self.storage.as_ref(),
                    &self.config,
                )?;
                if doc.class_name().as_deref() != Some(index.definition().class_name()) {
                    return Ok(());
                }
                let keys = index
                    .definition()
                    .keys_with(&|name| doc.field_or_null(name))?;
                for key in keys {
                    index.put(key, rid)?;
                }
                Ok(())
            })();
            if let Err(err) = result {
                if let Some(listener) = listener {
                    listener.on_completion(false);
                }
                index.clear();
                return Err(err);
            }
            processed += 1;
            if let Some(listener) = listener {
                listener.on_progress(processed, total);
            }
        }
        if let Some(listener) = listener {
            listener.on_completion(true);
        }
        Ok(processed)
    }
}

impl std::fmt::Debug for IndexManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexManager")
            .field("indexes", &self.index_names())
            .finish()
    }
}
