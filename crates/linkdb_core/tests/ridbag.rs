//! Adaptive link bag behavior through save, reload and rollback.

use linkdb_core::{Config, Database, Document, Rid};
use proptest::prelude::*;

fn db_with_thresholds(top: i32, bottom: i32) -> Database {
    Database::open_with_config(
        Config::default()
            .ridbag_embedded_to_tree_threshold(top)
            .ridbag_tree_to_embedded_threshold(bottom),
    )
    .unwrap()
}

fn link(position: i64) -> Rid {
    Rid::new(9, position)
}

fn sorted_rids(doc: &Document, field: &str) -> Vec<Rid> {
    let value = doc.field(field).unwrap();
    let mut rids = value.as_link_bag().unwrap().rids();
    rids.sort_unstable();
    rids
}

#[test]
fn roundtrip_preserves_multiset_in_embedded_form() {
    let db = db_with_thresholds(40, 30);
    let mut session = db.open_session();

    session.begin().unwrap();
    let doc = Document::new();
    let bag = session.new_ridbag();
    bag.add_all([link(1), link(1), link(2)]).unwrap();
    doc.set_field("links", bag).unwrap();
    session.save(&doc).unwrap();
    session.commit().unwrap();

    let loaded = session.load(doc.rid()).unwrap();
    assert_eq!(sorted_rids(&loaded, "links"), vec![link(1), link(1), link(2)]);
    let value = loaded.field("links").unwrap();
    assert!(value.as_link_bag().unwrap().is_embedded());
}

#[test]
fn crossing_the_up_threshold_converts_to_tree_on_save() {
    let db = db_with_thresholds(5, 2);
    let mut session = db.open_session();

    session.begin().unwrap();
    let doc = Document::new();
    let bag = session.new_ridbag();
    for position in 0..6 {
        bag.add(link(position)).unwrap();
    }
    doc.set_field("links", bag.clone()).unwrap();
    assert!(bag.is_embedded());
    session.save(&doc).unwrap();
    // conversion happens at save, never mid-mutation
    assert!(!bag.is_embedded());
    session.commit().unwrap();

    let loaded = session.load(doc.rid()).unwrap();
    let value = loaded.field("links").unwrap();
    let loaded_bag = value.as_link_bag().unwrap();
    assert!(!loaded_bag.is_embedded());
    assert_eq!(loaded_bag.size(), 6);
}

#[test]
fn falling_to_the_down_threshold_converts_back() {
    let db = db_with_thresholds(5, 2);
    let mut session = db.open_session();

    session.begin().unwrap();
    let doc = Document::new();
    let bag = session.new_ridbag();
    for position in 0..6 {
        bag.add(link(position)).unwrap();
    }
    doc.set_field("links", bag).unwrap();
    session.save(&doc).unwrap();
    session.commit().unwrap();

    let loaded = session.load(doc.rid()).unwrap();
    let value = loaded.field("links").unwrap();
    let loaded_bag = value.as_link_bag().unwrap().clone();
    assert!(!loaded_bag.is_embedded());

    session.begin().unwrap();
    for position in 0..4 {
        assert!(loaded_bag.remove(link(position)).unwrap());
    }
    session.save(&loaded).unwrap();
    assert!(loaded_bag.is_embedded());
    session.commit().unwrap();

    let reloaded = session.load(doc.rid()).unwrap();
    assert_eq!(sorted_rids(&reloaded, "links"), vec![link(4), link(5)]);
    let value = reloaded.field("links").unwrap();
    assert!(value.as_link_bag().unwrap().is_embedded());
}

#[test]
fn disabled_down_threshold_keeps_the_tree() {
    let db = db_with_thresholds(3, -1);
    let mut session = db.open_session();

    session.begin().unwrap();
    let doc = Document::new();
    let bag = session.new_ridbag();
    bag.add_all([link(1), link(2), link(3)]).unwrap();
    doc.set_field("links", bag).unwrap();
    session.save(&doc).unwrap();
    session.commit().unwrap();

    let loaded = session.load(doc.rid()).unwrap();
    let value = loaded.field("links").unwrap();
    let loaded_bag = value.as_link_bag().unwrap().clone();

    session.begin().unwrap();
    loaded_bag.remove(link(1)).unwrap();
    loaded_bag.remove(link(2)).unwrap();
    loaded_bag.remove(link(3)).unwrap();
    session.save(&loaded).unwrap();
    assert!(!loaded_bag.is_embedded());
    session.commit().unwrap();

    let reloaded = session.load(doc.rid()).unwrap();
    let value = reloaded.field("links").unwrap();
    let reloaded_bag = value.as_link_bag().unwrap();
    assert!(!reloaded_bag.is_embedded());
    assert!(reloaded_bag.is_empty());
}

#[test]
fn tree_deltas_survive_repeated_transactions() {
    let db = db_with_thresholds(2, -1);
    let mut session = db.open_session();

    session.begin().unwrap();
    let doc = Document::new();
    let bag = session.new_ridbag();
    bag.add_all([link(1), link(2)]).unwrap();
    doc.set_field("links", bag).unwrap();
    session.save(&doc).unwrap();
    session.commit().unwrap();

    for round in 0..3 {
        let loaded = session.load(doc.rid()).unwrap();
        let value = loaded.field("links").unwrap();
        let loaded_bag = value.as_link_bag().unwrap().clone();
        session.begin().unwrap();
        loaded_bag.add(link(10 + round)).unwrap();
        session.save(&loaded).unwrap();
        session.commit().unwrap();
    }

    let final_doc = session.load(doc.rid()).unwrap();
    assert_eq!(
        sorted_rids(&final_doc, "links"),
        vec![link(1), link(2), link(10), link(11), link(12)]
    );
}

#[test]
fn rollback_reverts_content_and_representation() {
    let db = db_with_thresholds(5, 2);
    let mut session = db.open_session();

    session.begin().unwrap();
    let doc = Document::new();
    let bag = session.new_ridbag();
    bag.add_all([link(1), link(2), link(3)]).unwrap();
    doc.set_field("links", bag.clone()).unwrap();
    session.save(&doc).unwrap();
    session.commit().unwrap();
    assert!(bag.is_embedded());

    session.begin().unwrap();
    // push it over the threshold and save: the bag converts in memory
    for position in 10..16 {
        bag.add(link(position)).unwrap();
    }
    session.save(&doc).unwrap();
    assert!(!bag.is_embedded());
    session.rollback().unwrap();

    // content and representation both reverted
    assert_eq!(sorted_rids(&doc, "links"), vec![link(1), link(2), link(3)]);
    let value = doc.field("links").unwrap();
    assert!(value.as_link_bag().unwrap().is_embedded());

    // and committed state never changed
    let reloaded = session.load(doc.rid()).unwrap();
    assert_eq!(sorted_rids(&reloaded, "links"), vec![link(1), link(2), link(3)]);
}

#[test]
fn content_equality_is_representation_independent() {
    let db = db_with_thresholds(3, -1);
    let mut session = db.open_session();

    session.begin().unwrap();
    let doc = Document::new();
    let big = session.new_ridbag();
    big.add_all([link(1), link(2), link(3)]).unwrap();
    doc.set_field("links", big).unwrap();
    session.save(&doc).unwrap();
    session.commit().unwrap();

    let loaded = session.load(doc.rid()).unwrap();
    let value = loaded.field("links").unwrap();
    let tree_bag = value.as_link_bag().unwrap();
    assert!(!tree_bag.is_embedded());

    let inline = session.new_ridbag();
    inline.add_all([link(3), link(2), link(1)]).unwrap();
    assert!(inline.is_embedded());
    assert!(tree_bag.content_eq(&inline));
}

proptest! {
    /// Any sequence of adds and removes, saved and reloaded, yields the
    /// same multiset regardless of the representation chosen on either
    /// side of the boundary.
    #[test]
    fn roundtrip_preserves_any_multiset(
        ops in proptest::collection::vec((any::<bool>(), 0i64..6), 1..50),
        top in 2i32..10,
        bottom in -1i32..2,
    ) {
        let db = db_with_thresholds(top, bottom);
        let mut session = db.open_session();

        session.begin().unwrap();
        let doc = Document::new();
        let bag = session.new_ridbag();
        doc.set_field("links", bag.clone()).unwrap();
        for (is_add, position) in &ops {
            if *is_add {
                bag.add(link(*position)).unwrap();
            } else {
                let _ = bag.remove(link(*position)).unwrap();
            }
        }
        let mut expected = bag.rids();
        expected.sort_unstable();

        session.save(&doc).unwrap();
        session.commit().unwrap();

        let loaded = session.load(doc.rid()).unwrap();
        let value = loaded.field("links").unwrap();
        let mut actual = value.as_link_bag().unwrap().rids();
        actual.sort_unstable();
        prop_assert_eq!(&expected, &actual);

        // a second boundary crossing with further edits stays exact
        let more = value.as_link_bag().unwrap().clone();
        session.begin().unwrap();
        more.add(link(0)).unwrap();
        let _ = more.remove(link(5)).unwrap();
        session.save(&loaded).unwrap();
        session.commit().unwrap();

        let mut expected2 = more.rids();
        expected2.sort_unstable();
        let reloaded = session.load(doc.rid()).unwrap();
        let value2 = reloaded.field("links").unwrap();
        let mut actual2 = value2.as_link_bag().unwrap().rids();
        actual2.sort_unstable();
        prop_assert_eq!(expected2, actual2);
    }
}
