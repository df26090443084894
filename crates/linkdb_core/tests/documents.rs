//! Document tracking semantics across save and reload boundaries.

use linkdb_core::{
    ChangeKind, Database, Document, EventKey, FieldType, TrackedList, Value,
};

#[test]
fn reloaded_document_tracks_fresh_changes() {
    let db = Database::open().unwrap();
    let mut session = db.open_session();

    session.begin().unwrap();
    let doc = Document::new();
    doc.set_field(
        "embeddedlist",
        TrackedList::from_values(vec![Value::from("value1")]),
    )
    .unwrap();
    session.save(&doc).unwrap();
    session.commit().unwrap();

    let loaded = session.load(doc.rid()).unwrap();
    assert!(!loaded.is_dirty());
    assert!(loaded.dirty_fields().is_empty());

    let list = loaded
        .field("embeddedlist")
        .unwrap()
        .as_list()
        .unwrap()
        .clone();
    list.push(Value::from("value2")).unwrap();

    assert!(loaded.is_dirty());
    assert_eq!(loaded.dirty_fields(), vec!["embeddedlist"]);

    let timeline = loaded.collection_timeline("embeddedlist").unwrap();
    assert_eq!(timeline.len(), 1);
    let event = &timeline.events()[0];
    assert_eq!(event.kind, ChangeKind::Add);
    assert_eq!(event.key, EventKey::Position(1));
    assert_eq!(event.value, Value::from("value2"));
}

#[test]
fn rebinding_produces_independent_wrappers() {
    let db = Database::open().unwrap();
    let mut session_a = db.open_session();

    session_a.begin().unwrap();
    let doc = Document::new();
    doc.set_field("items", TrackedList::from_values(vec![Value::Integer(1)]))
        .unwrap();
    session_a.save(&doc).unwrap();
    session_a.commit().unwrap();

    let session_b = db.open_session();
    let in_a = session_a.bind_to_session(&doc).unwrap();
    let in_b = session_b.bind_to_session(&doc).unwrap();

    // no shared mutable state across sessions
    let list_a = in_a.field("items").unwrap().as_list().unwrap().clone();
    list_a.push(Value::Integer(2)).unwrap();

    assert!(in_a.is_dirty());
    assert!(!in_b.is_dirty());
    assert_eq!(in_b.field("items").unwrap().as_list().unwrap().len(), 1);
}

#[test]
fn handle_after_rollback_rereads_committed_state() {
    let db = Database::open().unwrap();
    let mut session = db.open_session();

    session.begin().unwrap();
    let doc = Document::new();
    doc.set_field("status", "committed").unwrap();
    session.save(&doc).unwrap();
    session.commit().unwrap();

    session.begin().unwrap();
    doc.set_field("status", "interim").unwrap();
    session.save(&doc).unwrap();
    session.rollback().unwrap();

    let reread = session.bind_to_session(&doc).unwrap();
    assert_eq!(
        reread.field("status"),
        Some(Value::Text("committed".to_string()))
    );
}

#[test]
fn coerced_field_survives_the_save_boundary() {
    let db = Database::open().unwrap();
    let mut session = db.open_session();

    session.begin().unwrap();
    let doc = Document::new();
    doc.set_field(
        "tags",
        TrackedList::from_values(vec![Value::Integer(1), Value::Integer(1), Value::Integer(2)]),
    )
    .unwrap();
    session.save(&doc).unwrap();
    session.commit().unwrap();

    let loaded = session.load(doc.rid()).unwrap();
    let stale = loaded.field("tags").unwrap().as_list().unwrap().clone();

    session.begin().unwrap();
    let coerced = loaded
        .field_with_type("tags", FieldType::EmbeddedSet)
        .unwrap()
        .unwrap();
    assert_eq!(coerced.as_set().unwrap().len(), 2);
    // the wrapper read before the coercion is dead now
    assert!(stale.push(Value::Integer(3)).is_err());

    session.save(&loaded).unwrap();
    session.commit().unwrap();

    let reloaded = session.load(doc.rid()).unwrap();
    let set = reloaded.field("tags").unwrap();
    assert_eq!(set.as_set().unwrap().len(), 2);
}

#[test]
fn merge_and_content_equality_roundtrip() {
    let db = Database::open().unwrap();
    let mut session = db.open_session();

    session.begin().unwrap();
    let doc = Document::new();
    doc.set_field("a", 1i64).unwrap();
    doc.set_field("items", TrackedList::from_values(vec![Value::Integer(1)]))
        .unwrap();
    session.save(&doc).unwrap();
    session.commit().unwrap();

    let other = Document::new();
    other.set_field("b", 2i64).unwrap();
    other
        .set_field("items", TrackedList::from_values(vec![Value::Integer(2)]))
        .unwrap();

    let loaded = session.load(doc.rid()).unwrap();
    loaded.merge(&other, false, true).unwrap();

    session.begin().unwrap();
    session.save(&loaded).unwrap();
    session.commit().unwrap();

    let reloaded = session.load(doc.rid()).unwrap();
    assert!(reloaded.has_same_content_of(&loaded));
    assert_eq!(reloaded.field("b"), Some(Value::Integer(2)));
    assert_eq!(
        reloaded.field("items").unwrap().as_list().unwrap().values(),
        vec![Value::Integer(1), Value::Integer(2)]
    );
}

#[test]
fn embedded_subdocument_dirties_the_saved_root() {
    let db = Database::open().unwrap();
    let mut session = db.open_session();

    session.begin().unwrap();
    let root = Document::new();
    let child = Document::new();
    child.set_field("x", 1i64).unwrap();
    root.set_field("child", child).unwrap();
    session.save(&root).unwrap();
    session.commit().unwrap();

    let loaded = session.load(root.rid()).unwrap();
    assert!(!loaded.is_dirty());

    let value = loaded.field("child").unwrap();
    let child = value.as_embedded().unwrap();
    child.set_field("x", 2i64).unwrap();
    assert!(loaded.is_dirty());

    session.begin().unwrap();
    session.save(&loaded).unwrap();
    session.commit().unwrap();

    let reloaded = session.load(root.rid()).unwrap();
    let reread = reloaded.field("child").unwrap();
    assert_eq!(
        reread.as_embedded().unwrap().field("x"),
        Some(Value::Integer(2))
    );
}
