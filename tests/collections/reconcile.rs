use observable_mvc::{
    Collection, CollectionSetOptions, Comparator, DestroyOptions, Model, SaveOptions, Schema,
    SetOptions,
};
use serde_json::{json, Value};

use crate::support::{EventLog, ScriptedTransport};

fn names(collection: &Collection) -> Vec<Value> {
    collection.pluck("name")
}

#[test]
fn set_merges_adds_and_removes_in_one_pass() {
    let collection = Collection::new(json!([
        { "id": 1, "name": "a" },
        { "id": 2, "name": "b" }
    ]));
    let log = EventLog::attach(&collection);

    let resolved = collection.set(
        json!([{ "id": 2, "name": "B" }, { "id": 3, "name": "c" }]),
        &CollectionSetOptions::new(),
    );

    assert_eq!(resolved.len(), 2);
    assert_eq!(names(&collection), vec![json!("B"), json!("c")]);
    assert_eq!(log.names(), vec!["change:name", "change", "remove", "add"]);
    assert_eq!(log.values("remove"), vec![json!({ "index": 0 })]);
    assert!(collection.get(1).is_none());
    assert_eq!(collection.index_size(), 4);
}

#[test]
fn keep_missing_and_no_merge() {
    let collection = Collection::new(json!([{ "id": 1, "name": "a" }]));
    let log = EventLog::attach(&collection);

    collection.add(
        json!([{ "id": 1, "name": "ignored" }, { "id": 2, "name": "b" }]),
        &CollectionSetOptions::adding(),
    );

    assert_eq!(names(&collection), vec![json!("a"), json!("b")]);
    assert_eq!(log.names(), vec!["add"]);

    collection.set(
        json!([{ "id": 2, "name": "B" }]),
        &CollectionSetOptions::new().keep_missing(),
    );
    assert_eq!(names(&collection), vec![json!("a"), json!("B")]);
}

#[test]
fn numeric_and_string_ids_share_a_slot() {
    let collection = Collection::new(json!([{ "id": 1, "name": "a" }]));

    collection.add(json!({ "id": "1", "name": "again" }), &CollectionSetOptions::new());

    assert_eq!(collection.len(), 1);
    assert_eq!(collection.get("1"), collection.get(1));
    assert_eq!(collection.get(1).and_then(|m| m.get("name")), Some(json!("again")));
}

#[test]
fn lookup_by_cid_and_model() {
    let model = Model::new(json!({ "name": "draft" }));
    let collection = Collection::new(vec![model.clone()]);

    assert_eq!(collection.get(model.cid()), Some(model.clone()));
    assert_eq!(collection.get(&model), Some(model.clone()));
    assert_eq!(collection.index_size(), 1);

    model.set_key("id", json!(10), &SetOptions::new());
    assert_eq!(collection.get(10), Some(model.clone()));
    assert_eq!(collection.index_size(), 2);
    assert_eq!(model.collection(), Some(collection));
}

#[test]
fn splices_at_an_index() {
    let collection = Collection::new(json!([{ "name": "a" }, { "name": "d" }]));

    collection.add(
        json!([{ "name": "b" }, { "name": "c" }]),
        &CollectionSetOptions::new().at(1),
    );
    collection.unshift(json!({ "name": "start" }), &CollectionSetOptions::new());
    collection.push(json!({ "name": "end" }), &CollectionSetOptions::new());

    assert_eq!(
        names(&collection),
        vec![
            json!("start"),
            json!("a"),
            json!("b"),
            json!("c"),
            json!("d"),
            json!("end")
        ]
    );

    let last = collection.pop(&CollectionSetOptions::new());
    let first = collection.shift(&CollectionSetOptions::new());
    assert_eq!(last.and_then(|m| m.get("name")), Some(json!("end")));
    assert_eq!(first.and_then(|m| m.get("name")), Some(json!("start")));
    assert_eq!(collection.len(), 4);
}

#[test]
fn reordering_held_models_fires_sort() {
    let collection = Collection::new(json!([{ "id": 1 }, { "id": 2 }, { "id": 3 }]));
    let log = EventLog::attach(&collection);

    collection.set(json!([{ "id": 3 }, { "id": 1 }, { "id": 2 }]), &CollectionSetOptions::new());

    assert_eq!(collection.pluck("id"), vec![json!(3), json!(1), json!(2)]);
    assert_eq!(log.names(), vec!["sort"]);

    log.clear();
    collection.set(json!([{ "id": 3 }, { "id": 1 }, { "id": 2 }]), &CollectionSetOptions::new());
    assert!(log.names().is_empty());
}

#[test]
fn comparator_keeps_order_on_add_and_merge() {
    let collection = Collection::builder()
        .comparator(Comparator::attribute("rank"))
        .models(json!([
            { "id": 1, "rank": 3 },
            { "id": 2, "rank": 1 }
        ]))
        .build();
    assert_eq!(collection.pluck("id"), vec![json!(2), json!(1)]);
    let log = EventLog::attach(&collection);

    collection.add(json!({ "id": 3, "rank": 2 }), &CollectionSetOptions::new());
    assert_eq!(collection.pluck("id"), vec![json!(2), json!(3), json!(1)]);
    assert_eq!(log.names(), vec!["add", "sort"]);

    log.clear();
    collection.set(json!({ "id": 1, "rank": 0 }), &CollectionSetOptions::new().keep_missing());
    assert_eq!(collection.pluck("id"), vec![json!(1), json!(2), json!(3)]);
    assert!(log.names().contains(&"sort".to_string()));
}

#[test]
fn derived_and_two_model_comparators() {
    let by_length = Collection::builder()
        .comparator(Comparator::sort_by(|m| {
            json!(m.get("name").and_then(|n| n.as_str().map(str::len)).unwrap_or(0))
        }))
        .models(json!([{ "name": "ccc" }, { "name": "a" }, { "name": "bb" }]))
        .build();
    assert_eq!(
        by_length.pluck("name"),
        vec![json!("a"), json!("bb"), json!("ccc")]
    );

    let descending = Collection::builder()
        .comparator(Comparator::compare(|a, b| {
            observable_mvc::compare_values(
                &b.get("n").unwrap_or(Value::Null),
                &a.get("n").unwrap_or(Value::Null),
            )
        }))
        .models(json!([{ "n": 1 }, { "n": 3 }, { "n": 2 }]))
        .build();
    assert_eq!(descending.pluck("n"), vec![json!(3), json!(2), json!(1)]);
}

#[test]
fn sort_needs_a_comparator() {
    let collection = Collection::new(json!([{ "id": 1 }]));
    assert!(collection.sort(&CollectionSetOptions::new()).is_err());

    collection.set_comparator(Some(Comparator::attribute("id")));
    assert!(collection.sort(&CollectionSetOptions::new()).is_ok());
}

#[test]
fn reset_replaces_with_a_single_event() {
    let collection = Collection::new(json!([{ "id": 1 }, { "id": 2 }]));
    let before = collection.models();
    let log = EventLog::attach(&collection);

    collection.reset(json!([{ "id": 3 }]), &CollectionSetOptions::new());

    assert_eq!(log.names(), vec!["reset"]);
    assert_eq!(collection.pluck("id"), vec![json!(3)]);
    assert_eq!(collection.previous_models(), before);
    assert!(before.iter().all(|m| m.collection().is_none()));
    assert_eq!(collection.index_size(), 2);
}

#[test]
fn invalid_members_are_dropped_and_reported() {
    let schema = Schema::builder("task")
        .validate(|attrs, _| {
            if attrs.contains_key("title") {
                None
            } else {
                Some(json!("title required"))
            }
        })
        .build();
    let collection = Collection::builder().schema(schema).build();
    let log = EventLog::attach(&collection);

    collection.add(
        json!([{ "title": "ok" }, { "done": true }]),
        &CollectionSetOptions::new().validate(),
    );

    assert_eq!(collection.len(), 1);
    assert_eq!(log.names(), vec!["invalid", "add"]);
    assert_eq!(
        log.values("invalid"),
        vec![json!({ "attributes": { "done": true }, "error": "title required" })]
    );
}

#[test]
fn member_events_are_relayed_once_per_collection() {
    let model = Model::new(json!({ "id": 1 }));
    let owner = Collection::new(vec![model.clone()]);
    let other = Collection::new(vec![model.clone()]);
    let owner_log = EventLog::attach(&owner);
    let other_log = EventLog::attach(&other);

    model.set_key("name", json!("shared"), &SetOptions::new());
    assert_eq!(owner_log.names(), vec!["change:name", "change"]);
    assert_eq!(other_log.names(), vec!["change:name", "change"]);

    owner_log.clear();
    other.remove(&model, &CollectionSetOptions::new());
    assert!(owner_log.names().is_empty());
    assert_eq!(model.collection(), Some(owner.clone()));

    owner_log.clear();
    model.set_key("name", json!("solo"), &SetOptions::new());
    assert_eq!(owner_log.count("change"), 1);
    assert_eq!(other_log.count("change"), 1);
}

#[test]
fn query_helpers() {
    let collection = Collection::new(json!([
        { "id": 1, "kind": "book", "year": 1965 },
        { "id": 2, "kind": "film", "year": 1984 },
        { "id": 3, "kind": "book", "year": 1969 }
    ]));

    assert_eq!(collection.where_attrs(&json!({ "kind": "book" })).len(), 2);
    assert!(collection.where_attrs(&json!({})).is_empty());
    assert_eq!(
        collection
            .find_where(&json!({ "kind": "book", "year": 1969 }))
            .and_then(|m| m.id()),
        Some(json!(3))
    );
    assert_eq!(collection.slice(1, 10).len(), 2);
    assert_eq!(
        collection
            .filter(|m| m.get("year").and_then(|y| y.as_i64()) > Some(1966))
            .len(),
        2
    );
    assert_eq!(collection.to_json()[1]["kind"], json!("film"));
}

#[tokio::test]
async fn destroyed_members_leave_the_collection() {
    let transport = ScriptedTransport::new();
    let collection = Collection::builder()
        .url("/books")
        .transport(transport.shared())
        .models(json!([{ "id": 1 }, { "id": 2 }]))
        .build();
    let log = EventLog::attach(&collection);
    let doomed = collection.get(1).unwrap();

    doomed.destroy(&DestroyOptions::new()).await.unwrap();

    assert_eq!(log.names(), vec!["remove", "destroy"]);
    assert_eq!(collection.pluck("id"), vec![json!(2)]);
    assert_eq!(transport.last().map(|s| s.url), Some("/books/1".to_string()));
}

#[tokio::test]
async fn create_adds_and_indexes_the_saved_model() {
    let transport = ScriptedTransport::new();
    transport.reply(json!({ "id": 5 }));
    let collection = Collection::builder()
        .url("/books")
        .transport(transport.shared())
        .build();
    let log = EventLog::attach(&collection);

    let model = collection
        .create(json!({ "title": "Dune" }), &SaveOptions::new())
        .await
        .unwrap();

    assert_eq!(
        log.names(),
        vec!["add", "request", "change:id", "change", "sync", "create"]
    );
    assert_eq!(collection.get(5), Some(model));
    assert_eq!(collection.index_size(), 2);
}
