//! Database facade.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::index::IndexManager;
use crate::session::DatabaseSession;
use linkdb_storage::{MemoryStorage, RecordStorage};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

/// A registered schema class: a name plus the clusters holding its
/// records.
///
/// The full schema layer (property types, validation rules) is a
/// collaborator; the core only needs the class-to-cluster association for
/// record placement and class-scoped index queries.
#[derive(Debug, Clone)]
pub struct ClassDescriptor {
    /// Class name.
    pub name: String,
    /// Clusters storing this class's records.
    pub cluster_ids: Vec<i32>,
}

/// State shared by every session of one database.
pub(crate) struct DatabaseShared {
    pub(crate) storage: Arc<dyn RecordStorage>,
    pub(crate) indexes: Arc<IndexManager>,
    pub(crate) config: Config,
    /// Serializes the validate+apply phase of commits. Nothing else locks
    /// across sessions.
    pub(crate) commit_lock: Mutex<()>,
    pub(crate) classes: RwLock<HashMap<String, ClassDescriptor>>,
    pub(crate) default_cluster: i32,
    pub(crate) next_txid: AtomicU64,
}

/// The main database handle.
///
/// A `Database` owns the storage substrate, the index manager and the
/// class registry. Sessions opened from it run concurrent transactions
/// with no cross-session locking before commit.
///
/// # Example
///
/// ```rust,ignore
/// let db = Database::open()?;
/// db.create_class("person")?;
///
/// let mut session = db.open_session();
/// session.begin()?;
/// let doc = Document::with_class("person");
/// doc.set_field("name", "Alice")?;
/// session.save(&doc)?;
/// session.commit()?;
/// ```
#[derive(Clone)]
pub struct Database {
    shared: Arc<DatabaseShared>,
}

impl Database {
    /// Opens an in-memory database with default configuration.
    pub fn open() -> CoreResult<Self> {
        Self::open_with_config(Config::default())
    }

    /// Opens an in-memory database with custom configuration.
    pub fn open_with_config(config: Config) -> CoreResult<Self> {
        Self::open_on(Arc::new(MemoryStorage::new()), config)
    }

    /// Opens a database on an existing storage substrate.
    pub fn open_on(storage: Arc<dyn RecordStorage>, config: Config) -> CoreResult<Self> {
        let default_cluster = match storage.cluster_id("default") {
            Some(id) => id,
            None => storage.create_cluster("default")?,
        };
        let indexes = Arc::new(IndexManager::new(Arc::clone(&storage), config.clone()));
        Ok(Self {
            shared: Arc::new(DatabaseShared {
                storage,
                indexes,
                config,
                commit_lock: Mutex::new(()),
                classes: RwLock::new(HashMap::new()),
                default_cluster,
                next_txid: AtomicU64::new(1),
            }),
        })
    }

    /// Registers a schema class, creating a cluster for its records.
    pub fn create_class(&self, name: &str) -> CoreResult<ClassDescriptor> {
        if name.is_empty() {
            return Err(CoreError::validation("class name cannot be empty"));
        }
        {
            let classes = self.shared.classes.read();
            if classes.contains_key(name) {
                return Err(CoreError::invalid_operation(format!(
                    "class '{name}' already exists"
                )));
            }
        }
        let cluster = self.shared.storage.create_cluster(&name.to_lowercase())?;
        let descriptor = ClassDescriptor {
            name: name.to_string(),
            cluster_ids: vec![cluster],
        };
        self.shared
            .classes
            .write()
            .insert(name.to_string(), descriptor.clone());
        tracing::debug!(class = %name, cluster, "class registered");
        Ok(descriptor)
    }

    /// Returns a registered class.
    #[must_use]
    pub fn class(&self, name: &str) -> Option<ClassDescriptor> {
        self.shared.classes.read().get(name).cloned()
    }

    /// Returns the registered class names.
    #[must_use]
    pub fn class_names(&self) -> Vec<String> {
        self.shared.classes.read().keys().cloned().collect()
    }

    /// Returns the index manager.
    #[must_use]
    pub fn indexes(&self) -> Arc<IndexManager> {
        Arc::clone(&self.shared.indexes)
    }

    /// Returns the storage substrate.
    #[must_use]
    pub fn storage(&self) -> Arc<dyn RecordStorage> {
        Arc::clone(&self.shared.storage)
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Opens a new session.
    ///
    /// Sessions are independent: each runs its own transactions, and
    /// records bound to one session are never shared with another.
    #[must_use]
    pub fn open_session(&self) -> DatabaseSession {
        DatabaseSession::new(Arc::clone(&self.shared))
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("classes", &self.class_names())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_default_cluster() {
        let db = Database::open().unwrap();
        assert!(db.storage().cluster_id("default").is_some());
    }

    #[test]
    fn class_registration() {
        let db = Database::open().unwrap();
        let descriptor = db.create_class("Person").unwrap();
        assert_eq!(descriptor.name, "Person");
        assert_eq!(descriptor.cluster_ids.len(), 1);
        assert!(db.storage().cluster_id("person").is_some());

        assert!(db.class("Person").is_some());
        assert!(db.class("Animal").is_none());
        assert!(db.create_class("Person").is_err());
    }
}
