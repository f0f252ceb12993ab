use std::sync::Arc;
use std::thread;

use pretty_assertions::assert_eq;
use thread_core::{
    Author, ChildItemData, Cursor, ItemContent, ItemId, MergeOutcome, ResultStore, StoreError,
    TopLevelInsert, TopLevelItemData,
};

fn init_logging() {
    engine_logging::initialize_for_tests();
}

fn content(text: &str) -> ItemContent {
    ItemContent {
        author: Author {
            id: "UC1".to_string(),
            name: "someone".to_string(),
            avatar_url: "https://img.example/a.jpg".to_string(),
        },
        text: text.to_string(),
        published: "2 days ago".to_string(),
        like_count: 4,
        is_hearted: false,
    }
}

fn top(id: &str, child_cursor: Option<&str>) -> TopLevelItemData {
    TopLevelItemData {
        id: ItemId::from(id),
        content: content(id),
        child_cursor: child_cursor.map(Cursor::from),
    }
}

fn child(id: &str) -> ChildItemData {
    ChildItemData {
        id: ItemId::from(id),
        content: content(id),
    }
}

fn insert(store: &ResultStore, data: TopLevelItemData) -> TopLevelInsert {
    let (item, _) = data.into_parts();
    store.insert_top_level(item)
}

#[test]
fn top_level_items_keep_fetch_order() {
    init_logging();
    let store = ResultStore::new();
    for id in ["c", "a", "b"] {
        assert_eq!(insert(&store, top(id, None)), TopLevelInsert::Inserted);
    }

    let ids: Vec<_> = store
        .snapshot()
        .items
        .iter()
        .map(|item| item.id.as_str().to_string())
        .collect();
    assert_eq!(ids, vec!["c", "a", "b"]);
}

#[test]
fn into_parts_returns_child_stream_cursor() {
    let (item, cursor) = top("a", Some("r1")).into_parts();
    assert_eq!(item.id, ItemId::from("a"));
    assert!(item.children().is_empty());
    assert_eq!(cursor, Some(Cursor::from("r1")));
}

#[test]
fn duplicate_top_level_keeps_first_record_and_children() {
    init_logging();
    let store = ResultStore::new();
    insert(&store, top("a", Some("r1")));
    store
        .merge_children(&ItemId::from("a"), vec![child("a.1")])
        .unwrap();

    let mut replay = top("a", None);
    replay.content.text = "edited".to_string();
    assert_eq!(insert(&store, replay), TopLevelInsert::Duplicate);

    let snapshot = store.snapshot();
    assert_eq!(snapshot.top_level_count(), 1);
    assert_eq!(snapshot.items[0].content.text, "a");
    assert_eq!(snapshot.items[0].children().len(), 1);
}

#[test]
fn replaying_a_child_page_does_not_double_count() {
    init_logging();
    let store = ResultStore::new();
    insert(&store, top("a", Some("r1")));
    let page = vec![child("a.1"), child("a.2")];

    let first = store.merge_children(&ItemId::from("a"), page.clone()).unwrap();
    let second = store.merge_children(&ItemId::from("a"), page).unwrap();

    assert_eq!(
        first,
        MergeOutcome {
            inserted: 2,
            duplicates: 0,
            conflicts: 0
        }
    );
    assert_eq!(
        second,
        MergeOutcome {
            inserted: 0,
            duplicates: 2,
            conflicts: 0
        }
    );
    assert_eq!(store.child_count(), 2);
    assert_eq!(store.children_of(&ItemId::from("a")).unwrap().len(), 2);
}

#[test]
fn child_id_is_never_assigned_to_two_parents() {
    init_logging();
    let store = ResultStore::new();
    insert(&store, top("a", Some("r1")));
    insert(&store, top("b", Some("r2")));

    store
        .merge_children(&ItemId::from("a"), vec![child("shared")])
        .unwrap();
    let outcome = store
        .merge_children(&ItemId::from("b"), vec![child("shared"), child("b.1")])
        .unwrap();

    assert_eq!(outcome.inserted, 1);
    assert_eq!(outcome.conflicts, 1);
    assert_eq!(store.parent_of(&ItemId::from("shared")), Some(ItemId::from("a")));
    assert!(store
        .children_of(&ItemId::from("b"))
        .unwrap()
        .iter()
        .all(|c| c.id != ItemId::from("shared")));
}

#[test]
fn merging_under_unknown_parent_fails() {
    let store = ResultStore::new();
    let err = store
        .merge_children(&ItemId::from("ghost"), vec![child("x")])
        .unwrap_err();
    assert_eq!(err, StoreError::UnknownParent(ItemId::from("ghost")));
    assert_eq!(store.child_count(), 0);
}

#[test]
fn children_keep_page_order() {
    let store = ResultStore::new();
    insert(&store, top("a", Some("r1")));
    store
        .merge_children(&ItemId::from("a"), vec![child("a.2"), child("a.1")])
        .unwrap();
    store
        .merge_children(&ItemId::from("a"), vec![child("a.3")])
        .unwrap();

    let ids: Vec<_> = store
        .children_of(&ItemId::from("a"))
        .unwrap()
        .into_iter()
        .map(|c| c.id.as_str().to_string())
        .collect();
    assert_eq!(ids, vec!["a.2", "a.1", "a.3"]);
}

#[test]
fn concurrent_merges_for_different_parents_are_all_kept() {
    init_logging();
    let store = Arc::new(ResultStore::new());
    let parents: Vec<String> = (0..8).map(|p| format!("p{p}")).collect();
    for parent in &parents {
        insert(&store, top(parent, Some("r")));
    }

    let handles: Vec<_> = parents
        .iter()
        .cloned()
        .map(|parent| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for page in 0..10 {
                    let batch = (0..5)
                        .map(|n| child(&format!("{parent}.{page}.{n}")))
                        .collect();
                    store.merge_children(&ItemId::new(parent.clone()), batch).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.child_count(), 8 * 10 * 5);
    let snapshot = store.snapshot();
    for item in &snapshot.items {
        assert_eq!(item.children().len(), 50);
        assert!(item
            .children()
            .iter()
            .all(|c| c.id.as_str().starts_with(&format!("{}.", item.id))));
    }
}

#[test]
fn snapshot_serializes_replies_under_each_item() {
    let store = ResultStore::new();
    insert(&store, top("a", Some("r1")));
    store
        .merge_children(&ItemId::from("a"), vec![child("a.1")])
        .unwrap();

    let json = serde_json::to_value(store.snapshot()).unwrap();
    assert_eq!(json["items"][0]["id"], "a");
    assert_eq!(json["items"][0]["like_count"], 4);
    assert_eq!(json["items"][0]["author"]["name"], "someone");
    assert_eq!(json["items"][0]["replies"][0]["id"], "a.1");
}

#[test]
fn into_snapshot_counts_match_store() {
    let store = ResultStore::new();
    insert(&store, top("a", Some("r1")));
    insert(&store, top("b", None));
    store
        .merge_children(&ItemId::from("a"), vec![child("a.1"), child("a.2")])
        .unwrap();

    let snapshot = store.into_snapshot();
    assert_eq!(snapshot.top_level_count(), 2);
    assert_eq!(snapshot.child_count(), 2);
    assert_eq!(snapshot.total_count(), 4);
    assert!(snapshot.get(&ItemId::from("b")).unwrap().children().is_empty());
}

#[test]
fn store_rebuilt_from_snapshot_matches_original() {
    let store = ResultStore::new();
    insert(&store, top("a", Some("r1")));
    insert(&store, top("b", None));
    store
        .merge_children(&ItemId::from("a"), vec![child("a.1"), child("a.2")])
        .unwrap();
    let snapshot = store.snapshot();

    let rebuilt = ResultStore::from_snapshot(snapshot.clone());
    assert_eq!(rebuilt.snapshot(), snapshot);
    assert_eq!(rebuilt.parent_of(&ItemId::from("a.2")), Some(ItemId::from("a")));
}
