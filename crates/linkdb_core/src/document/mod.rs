//! Document model: dynamic fields, dirty tracking, owner chains.

mod codec;
mod timeline;
mod tracked;
mod value;

pub use timeline::{ChangeEvent, ChangeKind, ChangeTimeline, EventKey};
pub use tracked::{TrackedList, TrackedMap, TrackedSet};
pub use value::{FieldType, Value};

pub(crate) use codec::{decode_document, encode_document};

use crate::error::{CoreError, CoreResult};
use crate::ridbag::RidBag;
use crate::types::Version;
use linkdb_storage::Rid;
use parking_lot::RwLock;
use std::fmt;
use std::sync::{Arc, Weak};

pub(crate) type DocCell = Arc<RwLock<DocumentInner>>;
pub(crate) type DocWeak = Weak<RwLock<DocumentInner>>;

/// Back-reference from a tracked value to the document field owning it.
#[derive(Debug, Clone)]
pub(crate) struct OwnerRef {
    pub(crate) doc: DocWeak,
    pub(crate) field: String,
}

/// Field state captured when the field first changes within a diff window.
#[derive(Debug, Clone)]
pub(crate) enum OriginalState {
    /// The field did not exist at the window start.
    Absent,
    /// The field held this value (plain copy) at the window start.
    Present(Value, Option<FieldType>),
}

#[derive(Debug, Clone)]
pub(crate) struct FieldEntry {
    value: Value,
    field_type: Option<FieldType>,
    exists: bool,
    changed: bool,
    original: Option<OriginalState>,
}

#[derive(Debug)]
pub(crate) struct DocumentInner {
    rid: Rid,
    class_name: Option<String>,
    version: Version,
    fields: Vec<(String, FieldEntry)>,
    dirty: bool,
    tracking: bool,
    owners: Vec<DocWeak>,
}

/// State of a record captured before a transaction first touches it,
/// used for total rollback.
#[derive(Debug, Clone)]
pub(crate) struct DocumentSnapshot {
    pub(crate) rid: Rid,
    pub(crate) class_name: Option<String>,
    pub(crate) version: Version,
    pub(crate) was_new: bool,
    pub(crate) fields: Vec<(String, Option<FieldType>, Value)>,
}

/// A document: an ordered mapping of field names to dynamic values.
///
/// Documents are cheap handles; clones share state. A document is transient
/// (tentative rid, version 0) until its first save inside a transaction.
/// Mutations mark it dirty, record the changed field names, and - for
/// tracked collection fields - append events to the field's change
/// timeline. Embedded sub-documents keep weak back-references to their
/// owners, and marking a sub-document dirty transitively dirties every
/// owner up the chain.
#[derive(Clone)]
pub struct Document {
    inner: DocCell,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Creates an empty transient document with no schema class.
    #[must_use]
    pub fn new() -> Self {
        Self::build(Rid::tentative(), Version::default(), None, Vec::new())
    }

    /// Creates an empty transient document bound to a schema class.
    #[must_use]
    pub fn with_class(class_name: impl Into<String>) -> Self {
        Self::build(
            Rid::tentative(),
            Version::default(),
            Some(class_name.into()),
            Vec::new(),
        )
    }

    fn build(
        rid: Rid,
        version: Version,
        class_name: Option<String>,
        fields: Vec<(String, FieldEntry)>,
    ) -> Self {
        Self {
            inner: Arc::new(RwLock::new(DocumentInner {
                rid,
                class_name,
                version,
                fields,
                dirty: false,
                tracking: true,
                owners: Vec::new(),
            })),
        }
    }

    /// Builds a clean document from decoded parts and attaches its wrappers.
    pub(crate) fn from_parts(
        rid: Rid,
        version: Version,
        class_name: Option<String>,
        fields: Vec<(String, Option<FieldType>, Value)>,
    ) -> Self {
        let entries = fields
            .iter()
            .map(|(name, field_type, value)| {
                (
                    name.clone(),
                    FieldEntry {
                        value: value.clone(),
                        field_type: *field_type,
                        exists: true,
                        changed: false,
                        original: None,
                    },
                )
            })
            .collect();
        let doc = Self::build(rid, version, class_name, entries);
        for (name, _, value) in &fields {
            doc.attach_value(name, value);
        }
        doc
    }

    /// Returns the record identifier.
    #[must_use]
    pub fn rid(&self) -> Rid {
        self.inner.read().rid
    }

    /// Returns the record version.
    #[must_use]
    pub fn version(&self) -> Version {
        self.inner.read().version
    }

    /// Returns the schema class this document is bound to, if any.
    #[must_use]
    pub fn class_name(&self) -> Option<String> {
        self.inner.read().class_name.clone()
    }

    /// Returns true if the document carries uncommitted changes.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.inner.read().dirty
    }

    /// Explicitly marks the document dirty, propagating along the owner
    /// chain.
    pub fn set_dirty(&self) {
        let owners = {
            let mut inner = self.inner.write();
            inner.dirty = true;
            inner.owners.clone()
        };
        propagate_dirty(owners);
    }

    /// Returns true if structural changes are being recorded to timelines.
    #[must_use]
    pub fn is_tracking_changes(&self) -> bool {
        self.inner.read().tracking
    }

    /// Enables or disables change timelines.
    ///
    /// Disabling freezes existing timelines (mutations still mark the
    /// document dirty); re-enabling starts fresh, empty timelines.
    pub fn set_tracking_changes(&self, enabled: bool) {
        let wrappers = {
            let mut inner = self.inner.write();
            let was_enabled = inner.tracking;
            inner.tracking = enabled;
            if enabled && !was_enabled {
                inner
                    .fields
                    .iter()
                    .filter(|(_, e)| e.exists)
                    .map(|(_, e)| e.value.clone())
                    .collect()
            } else {
                Vec::new()
            }
        };
        for value in wrappers {
            clear_value_timeline(&value);
        }
    }

    /// Returns the names of directly-dirtied fields.
    #[must_use]
    pub fn dirty_fields(&self) -> Vec<String> {
        self.inner
            .read()
            .fields
            .iter()
            .filter(|(_, e)| e.changed)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Returns the change timeline of a tracked collection field, if the
    /// field holds one.
    #[must_use]
    pub fn collection_timeline(&self, name: &str) -> Option<ChangeTimeline> {
        let value = self.field(name)?;
        match value {
            Value::List(list) => Some(list.timeline()),
            Value::Set(set) => Some(set.timeline()),
            Value::Map(map) => Some(map.timeline()),
            _ => None,
        }
    }

    /// Returns a copy of the value stored under `name`.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<Value> {
        self.inner
            .read()
            .fields
            .iter()
            .find(|(n, e)| n == name && e.exists)
            .map(|(_, e)| e.value.clone())
    }

    /// Returns the value stored under `name`, or null when absent.
    #[must_use]
    pub(crate) fn field_or_null(&self, name: &str) -> Value {
        self.field(name).unwrap_or(Value::Null)
    }

    /// Returns true if a field named `name` exists.
    #[must_use]
    pub fn contains_field(&self, name: &str) -> bool {
        self.inner
            .read()
            .fields
            .iter()
            .any(|(n, e)| n == name && e.exists)
    }

    /// Returns the field names in insertion order.
    #[must_use]
    pub fn field_names(&self) -> Vec<String> {
        self.inner
            .read()
            .fields
            .iter()
            .filter(|(_, e)| e.exists)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Returns true if the document has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.inner.read().fields.iter().any(|(_, e)| e.exists)
    }

    /// Sets a field value, replacing any previous value.
    ///
    /// Reassigning a collection field discards the old wrapper's timeline
    /// and detaches the wrapper from this document. Field names containing
    /// `:` or `,` are rejected.
    pub fn set_field(&self, name: &str, value: impl Into<Value>) -> CoreResult<()> {
        self.replace_field(name, value.into(), None, false)
    }

    /// Sets a field value together with its declared type.
    pub fn set_field_with_type(
        &self,
        name: &str,
        value: impl Into<Value>,
        field_type: FieldType,
    ) -> CoreResult<()> {
        let value = value.into();
        if !kind_matches(&value, field_type) {
            return Err(CoreError::validation(format!(
                "value of kind {} does not match declared type {field_type:?}",
                value.kind_name()
            )));
        }
        self.replace_field(name, value, Some(field_type), false)
    }

    /// Reads a field, coercing it to the requested type.
    ///
    /// A successful coercion replaces the stored value and invalidates the
    /// previous wrapper: further mutation through it fails with
    /// `UnsupportedOperation`. Impossible conversions fail with
    /// `Validation`.
    pub fn field_with_type(&self, name: &str, field_type: FieldType) -> CoreResult<Option<Value>> {
        validate_field_name(name)?;
        let Some(current) = self.field(name) else {
            return Ok(None);
        };
        if current.is_null() {
            return Ok(Some(Value::Null));
        }
        if kind_matches(&current, field_type) {
            let mut inner = self.inner.write();
            if let Some((_, entry)) = inner.fields.iter_mut().find(|(n, _)| n == name) {
                entry.field_type = Some(field_type);
            }
            return Ok(Some(current));
        }
        let coerced = coerce_value(&current, field_type)?;
        self.replace_field(name, coerced.clone(), Some(field_type), true)?;
        Ok(Some(coerced))
    }

    /// Removes a field, returning its value.
    pub fn remove_field(&self, name: &str) -> CoreResult<Option<Value>> {
        validate_field_name(name)?;
        let (old, owners) = {
            let mut inner = self.inner.write();
            let Some((_, entry)) = inner
                .fields
                .iter_mut()
                .find(|(n, e)| n == name && e.exists)
            else {
                return Ok(None);
            };
            if entry.original.is_none() {
                entry.original = Some(OriginalState::Present(
                    original_plain_of(&entry.value),
                    entry.field_type,
                ));
            }
            entry.exists = false;
            entry.changed = true;
            let old = std::mem::replace(&mut entry.value, Value::Null);
            inner.dirty = true;
            (old, inner.owners.clone())
        };
        self.detach_value(&old);
        propagate_dirty(owners);
        Ok(Some(old))
    }

    /// Returns true if both documents hold the same fields with
    /// content-equal values.
    #[must_use]
    pub fn has_same_content_of(&self, other: &Document) -> bool {
        if Arc::ptr_eq(&self.inner, &other.inner) {
            return true;
        }
        let mine = self.field_names();
        let theirs = other.field_names();
        if mine.len() != theirs.len() {
            return false;
        }
        mine.iter().all(|name| {
            match (self.field(name), other.field(name)) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
        })
    }

    /// Merges another document's fields into this one.
    ///
    /// Fields absent here are always copied in. For fields present on both
    /// sides, `merge_collections` unions collection contents in place and
    /// `merge_single` replaces everything else; fields not covered by
    /// either flag keep their current value.
    pub fn merge(
        &self,
        other: &Document,
        merge_single: bool,
        merge_collections: bool,
    ) -> CoreResult<()> {
        for name in other.field_names() {
            let incoming = other.field_or_null(&name);
            if !self.contains_field(&name) {
                self.set_field(&name, incoming.deep_copy())?;
                continue;
            }
            let current = self.field_or_null(&name);
            let merged_as_collection = match (&current, &incoming) {
                (Value::List(mine), Value::List(theirs)) if merge_collections => {
                    for item in theirs.values() {
                        mine.push(item.deep_copy())?;
                    }
                    true
                }
                (Value::Set(mine), Value::Set(theirs)) if merge_collections => {
                    for item in theirs.values() {
                        mine.add(item.deep_copy())?;
                    }
                    true
                }
                (Value::Map(mine), Value::Map(theirs)) if merge_collections => {
                    for (key, item) in theirs.entries() {
                        mine.put(key, item.deep_copy())?;
                    }
                    true
                }
                _ => false,
            };
            if !merged_as_collection && merge_single {
                self.set_field(&name, incoming.deep_copy())?;
            }
        }
        Ok(())
    }

    /// Deep-copies this document: same identity and content, fresh
    /// wrappers, clean diff state.
    #[must_use]
    pub fn copy(&self) -> Document {
        let (rid, version, class_name, fields, dirty) = {
            let inner = self.inner.read();
            (
                inner.rid,
                inner.version,
                inner.class_name.clone(),
                inner
                    .fields
                    .iter()
                    .filter(|(_, e)| e.exists)
                    .map(|(n, e)| (n.clone(), e.field_type, e.value.deep_copy()))
                    .collect::<Vec<_>>(),
                inner.dirty,
            )
        };
        let doc = Self::from_parts(rid, version, class_name, fields);
        doc.inner.write().dirty = dirty;
        doc
    }

    /// Clears all change bookkeeping: dirty flag, dirty-field set, captured
    /// originals and timelines.
    pub fn reset_tracking(&self) {
        let wrappers = {
            let mut inner = self.inner.write();
            inner.dirty = false;
            inner.fields.retain(|(_, e)| e.exists);
            for (_, entry) in &mut inner.fields {
                entry.changed = false;
                entry.original = None;
            }
            inner
                .fields
                .iter()
                .map(|(_, e)| e.value.clone())
                .collect::<Vec<_>>()
        };
        for value in wrappers {
            clear_value_timeline(&value);
        }
    }

    // --- crate-internal surface ---------------------------------------

    pub(crate) fn downgrade(&self) -> DocWeak {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn add_owner(&self, owner: DocWeak) {
        let mut inner = self.inner.write();
        if !inner.owners.iter().any(|w| w.ptr_eq(&owner)) {
            inner.owners.push(owner);
        }
    }

    pub(crate) fn remove_owner(&self, owner: &DocWeak) {
        self.inner.write().owners.retain(|w| !w.ptr_eq(owner));
    }

    pub(crate) fn set_rid(&self, rid: Rid) {
        self.inner.write().rid = rid;
    }

    /// Reconstructs the value a field held at the diff-window start.
    pub(crate) fn original_field_or_null(&self, name: &str) -> Value {
        let inner = self.inner.read();
        let Some((_, entry)) = inner.fields.iter().find(|(n, _)| n == name) else {
            return Value::Null;
        };
        match &entry.original {
            Some(OriginalState::Absent) => Value::Null,
            Some(OriginalState::Present(value, _)) => value.clone(),
            None => {
                if !entry.exists {
                    Value::Null
                } else if entry.changed {
                    original_plain_of(&entry.value)
                } else {
                    entry.value.clone()
                }
            }
        }
    }

    pub(crate) fn fields_for_encode(&self) -> Vec<(String, Option<FieldType>, Value)> {
        self.inner
            .read()
            .fields
            .iter()
            .filter(|(_, e)| e.exists)
            .map(|(n, e)| (n.clone(), e.field_type, e.value.clone()))
            .collect()
    }

    /// Collects every link bag reachable through this document's fields,
    /// including those of embedded sub-documents.
    pub(crate) fn collect_link_bags(&self, out: &mut Vec<RidBag>) {
        let values: Vec<Value> = self
            .inner
            .read()
            .fields
            .iter()
            .filter(|(_, e)| e.exists)
            .map(|(_, e)| e.value.clone())
            .collect();
        for value in values {
            match value {
                Value::LinkBag(bag) => out.push(bag),
                Value::Embedded(doc) => doc.collect_link_bags(out),
                _ => {}
            }
        }
    }

    /// Captures the pre-transaction state of this record.
    pub(crate) fn original_snapshot(&self, was_new: bool) -> DocumentSnapshot {
        let inner = self.inner.read();
        let fields = if was_new {
            inner
                .fields
                .iter()
                .filter(|(_, e)| e.exists)
                .map(|(n, e)| (n.clone(), e.field_type, e.value.deep_copy()))
                .collect()
        } else {
            inner
                .fields
                .iter()
                .filter_map(|(n, e)| match &e.original {
                    Some(OriginalState::Absent) => None,
                    Some(OriginalState::Present(value, field_type)) => {
                        Some((n.clone(), *field_type, value.deep_copy()))
                    }
                    None => {
                        if !e.exists {
                            None
                        } else {
                            Some((n.clone(), e.field_type, original_plain_of(&e.value)))
                        }
                    }
                })
                .collect()
        };
        DocumentSnapshot {
            rid: if was_new { Rid::tentative() } else { inner.rid },
            class_name: inner.class_name.clone(),
            version: inner.version,
            was_new,
            fields,
        }
    }

    /// Restores this handle from a pre-transaction snapshot.
    pub(crate) fn restore_snapshot(&self, snapshot: &DocumentSnapshot) {
        let old_values: Vec<Value> = {
            let inner = self.inner.read();
            inner.fields.iter().map(|(_, e)| e.value.clone()).collect()
        };
        for value in &old_values {
            self.detach_value(value);
        }
        {
            let mut inner = self.inner.write();
            inner.rid = snapshot.rid;
            inner.class_name = snapshot.class_name.clone();
            inner.version = snapshot.version;
            inner.dirty = snapshot.was_new;
            inner.fields = snapshot
                .fields
                .iter()
                .map(|(name, field_type, value)| {
                    (
                        name.clone(),
                        FieldEntry {
                            value: value.deep_copy(),
                            field_type: *field_type,
                            exists: true,
                            changed: snapshot.was_new,
                            original: if snapshot.was_new {
                                Some(OriginalState::Absent)
                            } else {
                                None
                            },
                        },
                    )
                })
                .collect();
        }
        for (name, _, _) in &snapshot.fields {
            if let Some(value) = self.field(name) {
                self.attach_value(name, &value);
            }
        }
    }

    /// Resets the diff window after a save staged its deltas: captured
    /// originals and timelines are dropped, the dirty flag stays set until
    /// commit.
    pub(crate) fn rebaseline(&self) {
        let wrappers = {
            let mut inner = self.inner.write();
            inner.fields.retain(|(_, e)| e.exists);
            for (_, entry) in &mut inner.fields {
                entry.changed = false;
                entry.original = None;
            }
            inner
                .fields
                .iter()
                .map(|(_, e)| e.value.clone())
                .collect::<Vec<_>>()
        };
        for value in wrappers {
            clear_value_timeline(&value);
        }
    }

    /// Applies the outcome of a successful commit to this handle.
    pub(crate) fn finalize_commit(&self, version: Version) {
        self.rebaseline();
        let mut inner = self.inner.write();
        inner.version = version;
        inner.dirty = false;
    }

    /// Applies the outcome of a committed delete: identity is invalidated
    /// and embedded children are released.
    pub(crate) fn finalize_delete(&self) {
        let values: Vec<Value> = {
            let mut inner = self.inner.write();
            inner.rid = Rid::tentative();
            inner.version = Version::default();
            inner.dirty = false;
            for (_, entry) in &mut inner.fields {
                entry.changed = false;
                entry.original = None;
            }
            inner.fields.iter().map(|(_, e)| e.value.clone()).collect()
        };
        for value in values {
            self.detach_value(&value);
        }
    }

    // --- internals ----------------------------------------------------

    fn replace_field(
        &self,
        name: &str,
        value: Value,
        declared: Option<FieldType>,
        invalidate_old: bool,
    ) -> CoreResult<()> {
        validate_field_name(name)?;
        let (old, owners) = {
            let mut inner = self.inner.write();
            let field_type = declared.or_else(|| FieldType::of(&value));
            match inner.fields.iter_mut().find(|(n, _)| n == name) {
                Some((_, entry)) => {
                    if entry.exists && !invalidate_old && entry.value == value {
                        return Ok(());
                    }
                    if entry.original.is_none() {
                        entry.original = Some(if entry.exists {
                            OriginalState::Present(
                                original_plain_of(&entry.value),
                                entry.field_type,
                            )
                        } else {
                            OriginalState::Absent
                        });
                    }
                    let old = std::mem::replace(&mut entry.value, value.clone());
                    let old = entry.exists.then_some(old);
                    entry.field_type = field_type;
                    entry.exists = true;
                    entry.changed = true;
                    inner.dirty = true;
                    (old, inner.owners.clone())
                }
                None => {
                    inner.fields.push((
                        name.to_string(),
                        FieldEntry {
                            value: value.clone(),
                            field_type,
                            exists: true,
                            changed: true,
                            original: Some(OriginalState::Absent),
                        },
                    ));
                    inner.dirty = true;
                    (None, inner.owners.clone())
                }
            }
        };
        if let Some(old) = old {
            if invalidate_old {
                invalidate_value(&old);
            } else {
                self.detach_value(&old);
            }
        }
        self.attach_value(name, &value);
        propagate_dirty(owners);
        Ok(())
    }

    fn attach_value(&self, name: &str, value: &Value) {
        let owner = OwnerRef {
            doc: self.downgrade(),
            field: name.to_string(),
        };
        match value {
            Value::List(list) => list.set_owner(owner),
            Value::Set(set) => set.set_owner(owner),
            Value::Map(map) => map.set_owner(owner),
            Value::LinkBag(bag) => bag.set_owner(owner),
            Value::Embedded(doc) => doc.add_owner(self.downgrade()),
            _ => {}
        }
    }

    fn detach_value(&self, value: &Value) {
        match value {
            Value::List(list) => list.clear_owner(),
            Value::Set(set) => set.clear_owner(),
            Value::Map(map) => map.clear_owner(),
            Value::LinkBag(bag) => bag.clear_owner(),
            Value::Embedded(doc) => doc.remove_owner(&self.downgrade()),
            _ => {}
        }
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("Document")
            .field("rid", &inner.rid)
            .field("version", &inner.version)
            .field("class", &inner.class_name)
            .field("dirty", &inner.dirty)
            .field(
                "fields",
                &inner.fields.iter().filter(|(_, e)| e.exists).count(),
            )
            .finish()
    }
}

/// Marks the owning field changed and the owner chain dirty after a
/// structural change to a tracked value. Returns true if the owning
/// document currently records timelines.
pub(crate) fn notify_structural_change(owner: &OwnerRef) -> bool {
    let Some(cell) = owner.doc.upgrade() else {
        return false;
    };
    let (tracking, owners) = {
        let mut inner = cell.write();
        inner.dirty = true;
        if let Some((_, entry)) = inner.fields.iter_mut().find(|(n, _)| n == &owner.field) {
            entry.changed = true;
        }
        (inner.tracking, inner.owners.clone())
    };
    propagate_dirty(owners);
    tracking
}

fn propagate_dirty(owners: Vec<DocWeak>) {
    let mut queue = owners;
    let mut visited: Vec<usize> = Vec::new();
    while let Some(weak) = queue.pop() {
        let Some(cell) = weak.upgrade() else {
            continue;
        };
        let key = Arc::as_ptr(&cell) as usize;
        if visited.contains(&key) {
            continue;
        }
        visited.push(key);
        let next = {
            let mut inner = cell.write();
            inner.dirty = true;
            inner.owners.clone()
        };
        queue.extend(next);
    }
}

/// Plain reconstruction of a value as it was before its recorded changes.
fn original_plain_of(value: &Value) -> Value {
    match value {
        Value::List(list) => Value::List(TrackedList::from_values(
            list.original_values().iter().map(Value::deep_copy).collect(),
        )),
        Value::Set(set) => Value::Set(TrackedSet::from_values(
            set.original_values().iter().map(Value::deep_copy).collect(),
        )),
        Value::Map(map) => Value::Map(TrackedMap::from_entries(
            map.original_entries()
                .into_iter()
                .map(|(k, v)| (k, v.deep_copy()))
                .collect(),
        )),
        Value::LinkBag(bag) => Value::LinkBag(bag.original_copy()),
        other => other.deep_copy(),
    }
}

fn clear_value_timeline(value: &Value) {
    match value {
        Value::List(list) => list.clear_timeline(),
        Value::Set(set) => set.clear_timeline(),
        Value::Map(map) => map.clear_timeline(),
        _ => {}
    }
}

fn invalidate_value(value: &Value) {
    match value {
        Value::List(list) => list.invalidate(),
        Value::Set(set) => set.invalidate(),
        Value::Map(map) => map.invalidate(),
        Value::LinkBag(bag) => bag.invalidate(),
        _ => {}
    }
}

fn validate_field_name(name: &str) -> CoreResult<()> {
    if name.is_empty() {
        return Err(CoreError::validation("field name cannot be empty"));
    }
    if let Some(c) = name.chars().find(|c| *c == ':' || *c == ',') {
        return Err(CoreError::validation(format!(
            "invalid field name '{name}': character '{c}' is reserved"
        )));
    }
    Ok(())
}

fn kind_matches(value: &Value, field_type: FieldType) -> bool {
    match (value, field_type) {
        (Value::Bool(_), FieldType::Boolean)
        | (Value::Integer(_), FieldType::Integer)
        | (Value::Text(_), FieldType::String)
        | (Value::Bytes(_), FieldType::Binary)
        | (Value::Link(_), FieldType::Link)
        | (Value::Embedded(_), FieldType::Embedded)
        | (Value::List(_), FieldType::EmbeddedList)
        | (Value::Set(_), FieldType::EmbeddedSet)
        | (Value::Map(_), FieldType::EmbeddedMap | FieldType::LinkMap)
        | (Value::LinkBag(_), FieldType::LinkBag) => true,
        (Value::List(list), FieldType::LinkList) => {
            list.values().iter().all(|v| matches!(v, Value::Link(_)))
        }
        (Value::Set(set), FieldType::LinkSet) => {
            set.values().iter().all(|v| matches!(v, Value::Link(_)))
        }
        _ => false,
    }
}

fn coerce_value(value: &Value, field_type: FieldType) -> CoreResult<Value> {
    let incompatible = || {
        CoreError::validation(format!(
            "cannot convert {} value to {field_type:?}",
            value.kind_name()
        ))
    };
    match (value, field_type) {
        (Value::List(list), FieldType::EmbeddedSet | FieldType::LinkSet) => {
            let values = list.values();
            if field_type == FieldType::LinkSet
                && !values.iter().all(|v| matches!(v, Value::Link(_)))
            {
                return Err(incompatible());
            }
            Ok(Value::Set(TrackedSet::from_values(values)))
        }
        (Value::Set(set), FieldType::EmbeddedList | FieldType::LinkList) => {
            let values = set.values();
            if field_type == FieldType::LinkList
                && !values.iter().all(|v| matches!(v, Value::Link(_)))
            {
                return Err(incompatible());
            }
            Ok(Value::List(TrackedList::from_values(values)))
        }
        (Value::List(list), FieldType::LinkBag) => {
            let mut rids = Vec::new();
            for item in list.values() {
                match item {
                    Value::Link(rid) => rids.push(rid),
                    _ => return Err(incompatible()),
                }
            }
            Ok(Value::LinkBag(RidBag::from_rids(rids)))
        }
        (Value::LinkBag(bag), FieldType::LinkList) => Ok(Value::List(TrackedList::from_values(
            bag.rids().into_iter().map(Value::Link).collect(),
        ))),
        (Value::Integer(n), FieldType::String) => Ok(Value::Text(n.to_string())),
        (Value::Bool(b), FieldType::String) => Ok(Value::Text(b.to_string())),
        (Value::Text(s), FieldType::Integer) => s
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|_| incompatible()),
        _ => Err(incompatible()),
    }
}
