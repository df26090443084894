//! Adaptive link collection.
//!
//! A [`RidBag`] is an unordered multiset of rids with two representations:
//! a small inline vector (EMBEDDED) and a persisted tree collection plus an
//! in-memory pending-delta buffer (TREE). The representation converts only
//! at save time, governed by the configured thresholds; logical content is
//! representation-independent, and so is bag equality.

mod embedded;
mod tree;

use crate::config::Config;
use crate::document::OwnerRef;
use crate::error::{CoreError, CoreResult};
use embedded::EmbeddedBag;
use linkdb_storage::{RecordStorage, Rid, TreeHandle};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tree::TreeBag;
use uuid::Uuid;

#[derive(Debug, Clone)]
enum Delegate {
    Embedded(EmbeddedBag),
    Tree(TreeBag),
}

impl Delegate {
    fn entries(&self) -> &Vec<Rid> {
        match self {
            Delegate::Embedded(bag) => &bag.entries,
            Delegate::Tree(bag) => &bag.entries,
        }
    }

    fn len(&self) -> usize {
        match self {
            Delegate::Embedded(bag) => bag.len(),
            Delegate::Tree(bag) => bag.len(),
        }
    }
}

#[derive(Debug)]
struct BagInner {
    delegate: Delegate,
    /// Net instance-count changes since the last save baseline. For a tree
    /// bag these become the deltas applied to the persisted tree at commit;
    /// for both representations they reconstruct the pre-change content.
    changes: BTreeMap<Rid, i64>,
    owner: Option<OwnerRef>,
    invalidated: bool,
    uuid: Uuid,
    top_threshold: i32,
    bottom_threshold: i32,
    cursors: Vec<Weak<Mutex<usize>>>,
}

/// What a save-time representation check decided for one bag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BagSaveOutcome {
    /// Embedded bag, or tree bag with no pending deltas.
    Unchanged,
    /// Tree bag with pending deltas to apply at commit.
    TreeDeltas {
        /// The persisted tree.
        handle: TreeHandle,
        /// Counted deltas to apply.
        deltas: Vec<(Rid, i64)>,
    },
    /// The bag crossed the up-threshold; a tree was allocated and the full
    /// content becomes its initial delta batch.
    ConvertedToTree {
        /// The freshly allocated tree.
        handle: TreeHandle,
        /// Counted deltas seeding the tree.
        deltas: Vec<(Rid, i64)>,
    },
    /// The bag fell to the down-threshold; the tree is dropped at commit.
    ConvertedToEmbedded {
        /// The tree to drop.
        dropped: TreeHandle,
    },
}

/// How a bag is written into its owning record's image.
#[derive(Debug, Clone)]
pub(crate) enum BagRepr {
    /// Inline rids.
    Embedded(Vec<Rid>),
    /// Reference to a persisted tree.
    Tree {
        /// The persisted tree.
        handle: TreeHandle,
        /// Logical size at save time.
        size: u64,
    },
}

/// An unordered, duplicate-permitting collection of rids that adapts its
/// representation to its size.
///
/// Bags are cheap handles; clones share content. Equality for concurrency
/// purposes is multiset content equality, independent of representation.
#[derive(Clone)]
pub struct RidBag {
    inner: Arc<RwLock<BagInner>>,
}

impl RidBag {
    /// Creates an empty bag with default thresholds.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(&Config::default())
    }

    /// Creates an empty bag with thresholds from a configuration.
    #[must_use]
    pub fn with_config(config: &Config) -> Self {
        Self::with_thresholds(
            config.ridbag_embedded_to_tree_threshold,
            config.ridbag_tree_to_embedded_threshold,
        )
    }

    /// Creates an empty bag with explicit thresholds.
    ///
    /// A negative down-threshold disables the tree-to-embedded conversion.
    #[must_use]
    pub fn with_thresholds(top: i32, bottom: i32) -> Self {
        Self::from_inner_parts(
            Delegate::Embedded(EmbeddedBag::new()),
            Uuid::new_v4(),
            top,
            bottom,
        )
    }

    /// Creates an embedded bag holding the given rids.
    #[must_use]
    pub fn from_rids(rids: Vec<Rid>) -> Self {
        let bag = Self::new();
        bag.inner.write().delegate = Delegate::Embedded(EmbeddedBag::from_rids(rids));
        bag
    }

    fn from_inner_parts(delegate: Delegate, uuid: Uuid, top: i32, bottom: i32) -> Self {
        Self {
            inner: Arc::new(RwLock::new(BagInner {
                delegate,
                changes: BTreeMap::new(),
                owner: None,
                invalidated: false,
                uuid,
                top_threshold: top,
                bottom_threshold: bottom,
                cursors: Vec::new(),
            })),
        }
    }

    /// Returns the number of instances held, duplicates included.
    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.read().delegate.len()
    }

    /// Returns true if the bag holds no rids.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Returns true if the bag currently uses the inline representation.
    #[must_use]
    pub fn is_embedded(&self) -> bool {
        matches!(self.inner.read().delegate, Delegate::Embedded(_))
    }

    /// Returns true if at least one instance of `rid` is present.
    #[must_use]
    pub fn contains(&self, rid: Rid) -> bool {
        match &self.inner.read().delegate {
            Delegate::Embedded(bag) => bag.contains(rid),
            Delegate::Tree(bag) => bag.contains(rid),
        }
    }

    /// Returns a copy of the held rids, duplicates included.
    #[must_use]
    pub fn rids(&self) -> Vec<Rid> {
        self.inner.read().delegate.entries().clone()
    }

    /// Adds one instance of `rid`.
    pub fn add(&self, rid: Rid) -> CoreResult<()> {
        let owner = {
            let mut inner = self.inner.write();
            if inner.invalidated {
                return Err(detached_error());
            }
            match &mut inner.delegate {
                Delegate::Embedded(bag) => bag.add(rid),
                Delegate::Tree(bag) => bag.add(rid),
            }
            *inner.changes.entry(rid).or_insert(0) += 1;
            inner.owner.clone()
        };
        self.notify(owner);
        Ok(())
    }

    /// Adds every rid from the iterator.
    pub fn add_all(&self, rids: impl IntoIterator<Item = Rid>) -> CoreResult<()> {
        for rid in rids {
            self.add(rid)?;
        }
        Ok(())
    }

    /// Removes one instance of `rid`. Returns false if absent.
    ///
    /// Removal is safe during iteration by the same call stack: cursors
    /// positioned after the removed element shift back so that no element
    /// is skipped or repeated; removing an already-visited element does not
    /// disturb the remaining iteration.
    pub fn remove(&self, rid: Rid) -> CoreResult<bool> {
        let owner = {
            let mut inner = self.inner.write();
            if inner.invalidated {
                return Err(detached_error());
            }
            let index = match &mut inner.delegate {
                Delegate::Embedded(bag) => bag.remove_one(rid),
                Delegate::Tree(bag) => bag.remove_one(rid),
            };
            let Some(index) = index else {
                return Ok(false);
            };
            *inner.changes.entry(rid).or_insert(0) -= 1;
            inner.cursors.retain(|weak| weak.strong_count() > 0);
            for weak in &inner.cursors {
                if let Some(cursor) = weak.upgrade() {
                    let mut position = cursor.lock();
                    if index < *position {
                        *position -= 1;
                    }
                }
            }
            inner.owner.clone()
        };
        self.notify(owner);
        Ok(true)
    }

    /// Returns an iterator over the held rids.
    #[must_use]
    pub fn iter(&self) -> RidBagIter {
        let cursor = Arc::new(Mutex::new(0usize));
        self.inner.write().cursors.push(Arc::downgrade(&cursor));
        RidBagIter {
            bag: self.clone(),
            cursor,
        }
    }

    /// Returns true if both bags hold the same multiset of rids,
    /// regardless of representation.
    #[must_use]
    pub fn content_eq(&self, other: &RidBag) -> bool {
        if Arc::ptr_eq(&self.inner, &other.inner) {
            return true;
        }
        let mut a = self.rids();
        let mut b = other.rids();
        a.sort_unstable();
        b.sort_unstable();
        a == b
    }

    /// Copies this bag: same content, representation and pending deltas,
    /// detached from any owner.
    #[must_use]
    pub fn copy(&self) -> RidBag {
        let inner = self.inner.read();
        let bag = Self::from_inner_parts(
            inner.delegate.clone(),
            inner.uuid,
            inner.top_threshold,
            inner.bottom_threshold,
        );
        bag.inner.write().changes = inner.changes.clone();
        bag
    }

    // --- crate-internal surface ---------------------------------------

    /// Reconstructs the bag as it was at the last save baseline.
    pub(crate) fn original_copy(&self) -> RidBag {
        let inner = self.inner.read();
        let mut counts: BTreeMap<Rid, i64> = BTreeMap::new();
        for &rid in inner.delegate.entries() {
            *counts.entry(rid).or_insert(0) += 1;
        }
        for (rid, delta) in &inner.changes {
            *counts.entry(*rid).or_insert(0) -= delta;
        }
        let mut original = Vec::new();
        for (rid, count) in counts {
            for _ in 0..count.max(0) {
                original.push(rid);
            }
        }
        let delegate = match &inner.delegate {
            Delegate::Embedded(_) => Delegate::Embedded(EmbeddedBag::from_rids(original)),
            Delegate::Tree(bag) => Delegate::Tree(TreeBag::new(bag.handle, original)),
        };
        Self::from_inner_parts(
            delegate,
            inner.uuid,
            inner.top_threshold,
            inner.bottom_threshold,
        )
    }

    /// Evaluates the representation thresholds and drains pending deltas.
    ///
    /// Called once per owning-record save; this is the only place the
    /// representation converts. Tree writes implied by the outcome are
    /// applied by the committing transaction, never here.
    pub(crate) fn prepare_save(&self, storage: &dyn RecordStorage) -> CoreResult<BagSaveOutcome> {
        enum Plan {
            ToTree,
            StayEmbedded,
            ToEmbedded(TreeHandle),
            FlushTree(TreeHandle),
        }

        let mut inner = self.inner.write();
        let size = inner.delegate.len() as i32;
        let plan = match &inner.delegate {
            Delegate::Embedded(_) if size >= inner.top_threshold => Plan::ToTree,
            Delegate::Embedded(_) => Plan::StayEmbedded,
            Delegate::Tree(bag)
                if inner.bottom_threshold >= 0 && size <= inner.bottom_threshold =>
            {
                Plan::ToEmbedded(bag.handle)
            }
            Delegate::Tree(bag) => Plan::FlushTree(bag.handle),
        };

        match plan {
            Plan::ToTree => {
                let handle = storage.create_tree()?;
                let entries = inner.delegate.entries().clone();
                let mut counts: BTreeMap<Rid, i64> = BTreeMap::new();
                for &rid in &entries {
                    *counts.entry(rid).or_insert(0) += 1;
                }
                inner.delegate = Delegate::Tree(TreeBag::new(handle, entries));
                inner.changes.clear();
                tracing::trace!(%handle, size, "link bag converts to tree representation");
                Ok(BagSaveOutcome::ConvertedToTree {
                    handle,
                    deltas: counts.into_iter().collect(),
                })
            }
            Plan::StayEmbedded => {
                inner.changes.clear();
                Ok(BagSaveOutcome::Unchanged)
            }
            Plan::ToEmbedded(dropped) => {
                let entries = inner.delegate.entries().clone();
                inner.delegate = Delegate::Embedded(EmbeddedBag::from_rids(entries));
                inner.changes.clear();
                tracing::trace!(handle = %dropped, size, "link bag converts back to embedded representation");
                Ok(BagSaveOutcome::ConvertedToEmbedded { dropped })
            }
            Plan::FlushTree(handle) => {
                let deltas: Vec<(Rid, i64)> = inner
                    .changes
                    .iter()
                    .filter(|(_, delta)| **delta != 0)
                    .map(|(rid, delta)| (*rid, *delta))
                    .collect();
                inner.changes.clear();
                if deltas.is_empty() {
                    Ok(BagSaveOutcome::Unchanged)
                } else {
                    Ok(BagSaveOutcome::TreeDeltas { handle, deltas })
                }
            }
        }
    }

    pub(crate) fn encoding_parts(&self) -> (Uuid, BagRepr) {
        let inner = self.inner.read();
        let repr = match &inner.delegate {
            Delegate::Embedded(bag) => BagRepr::Embedded(bag.entries.clone()),
            Delegate::Tree(bag) => BagRepr::Tree {
                handle: bag.handle,
                size: bag.len() as u64,
            },
        };
        (inner.uuid, repr)
    }

    pub(crate) fn decoded_embedded(rids: Vec<Rid>, uuid: Uuid, config: &Config) -> RidBag {
        Self::from_inner_parts(
            Delegate::Embedded(EmbeddedBag::from_rids(rids)),
            uuid,
            config.ridbag_embedded_to_tree_threshold,
            config.ridbag_tree_to_embedded_threshold,
        )
    }

    pub(crate) fn decoded_tree(
        handle: TreeHandle,
        counted: Vec<(Rid, u64)>,
        uuid: Uuid,
        config: &Config,
    ) -> RidBag {
        Self::from_inner_parts(
            Delegate::Tree(TreeBag::from_counted(handle, counted)),
            uuid,
            config.ridbag_embedded_to_tree_threshold,
            config.ridbag_tree_to_embedded_threshold,
        )
    }

    pub(crate) fn set_owner(&self, owner: OwnerRef) {
        self.inner.write().owner = Some(owner);
    }

    pub(crate) fn clear_owner(&self) {
        self.inner.write().owner = None;
    }

    pub(crate) fn invalidate(&self) {
        let mut inner = self.inner.write();
        inner.invalidated = true;
        inner.owner = None;
    }

    fn notify(&self, owner: Option<OwnerRef>) {
        if let Some(owner) = owner {
            crate::document::notify_structural_change(&owner);
        }
    }
}

impl Default for RidBag {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RidBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("RidBag")
            .field("size", &inner.delegate.len())
            .field("embedded", &matches!(inner.delegate, Delegate::Embedded(_)))
            .finish()
    }
}

impl fmt::Display for RidBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, rid) in self.rids().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{rid}")?;
        }
        write!(f, "]")
    }
}

fn detached_error() -> CoreError {
    CoreError::unsupported_operation(
        "this link bag view was detached by a field coercion or reassignment",
    )
}

/// Iterator over a bag's rids.
///
/// The iterator observes removals made through the owning bag while it is
/// live: removing a not-yet-visited element neither skips nor repeats any
/// other element, and removing an already-visited element leaves the
/// remaining iteration untouched.
pub struct RidBagIter {
    bag: RidBag,
    cursor: Arc<Mutex<usize>>,
}

impl Iterator for RidBagIter {
    type Item = Rid;

    fn next(&mut self) -> Option<Rid> {
        let inner = self.bag.inner.read();
        let mut position = self.cursor.lock();
        let entries = inner.delegate.entries();
        if *position < entries.len() {
            let rid = entries[*position];
            *position += 1;
            Some(rid)
        } else {
            None
        }
    }
}
