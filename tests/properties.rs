mod support;

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::future;
use observable_mvc::{
    Action, ActionError, Collection, CollectionSetOptions, Comparator, Dispatcher, Model,
    Observable, Schema, SetOptions, Store,
};
use serde_json::{json, Value};
use support::EventLog;

fn counter(model: &Model, name: &str) -> Arc<AtomicUsize> {
    let calls = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&calls);
    model.on(name, move |_| {
        sink.fetch_add(1, Ordering::SeqCst);
    });
    calls
}

/// No duplicate ids or cids, and `2n - u` index entries.
fn assert_unique(collection: &Collection) {
    let models = collection.models();
    let cids: HashSet<&str> = models.iter().map(Model::cid).collect();
    assert_eq!(cids.len(), models.len(), "duplicate cid");

    let ids: Vec<String> = models.iter().filter_map(Model::id_key).collect();
    let distinct: HashSet<&String> = ids.iter().collect();
    assert_eq!(distinct.len(), ids.len(), "duplicate id");

    let without_id = models.len() - ids.len();
    assert_eq!(collection.index_size(), 2 * models.len() - without_id);
}

#[test]
fn set_then_get_returns_what_was_set() {
    let fixtures = [
        json!({ "a": 1 }),
        json!({ "a": null, "b": "two", "c": [1, 2] }),
        json!({ "nested": { "x": true }, "n": 1.5 }),
        json!({}),
    ];
    for attrs in fixtures {
        let model = Model::new(json!({ "a": "seed" }));
        assert!(model.set(attrs.clone(), &SetOptions::new()));
        for (key, value) in attrs.as_object().unwrap() {
            assert_eq!(model.get(key).as_ref(), Some(value), "key {}", key);
        }
    }
}

#[test]
fn identical_set_fires_nothing_the_second_time() {
    let model = Model::new(json!({}));
    let log = EventLog::attach(&model);
    let attrs = json!({ "title": "Dune", "year": 1965 });

    model.set(attrs.clone(), &SetOptions::new());
    let first = log.names();
    log.clear();
    model.set(attrs, &SetOptions::new());

    assert_eq!(first, vec!["change:title", "change:year", "change"]);
    assert!(log.names().is_empty());
}

#[test]
fn changed_attributes_follow_the_batch_start() {
    let model = Model::new(json!({ "a": 1, "b": 2, "c": 3 }));
    let seen = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);
    model.on("change", move |event| {
        if let Some(model) = &event.model {
            let snapshot = (model.changed_attributes(None), model.previous_attributes());
            *sink.lock().unwrap() = Some(snapshot);
        }
    });

    model.set(json!({ "a": 1, "b": 20, "d": 4 }), &SetOptions::new());

    let (changed, previous) = seen.lock().unwrap().clone().unwrap();
    assert_eq!(changed.map(Value::Object), Some(json!({ "b": 20, "d": 4 })));
    assert_eq!(Value::Object(previous), json!({ "a": 1, "b": 2, "c": 3 }));
    assert_eq!(
        model.changed_attributes(Some(&json!({ "a": 1, "c": 30 }))).map(Value::Object),
        Some(json!({ "c": 30 }))
    );
}

#[test]
fn collection_index_stays_unique_through_mixed_operations() {
    let collection = Collection::new(json!([{ "id": 1 }, { "name": "draft" }, { "id": 2 }]));
    assert_unique(&collection);

    collection.add(
        json!([{ "id": 2 }, { "id": 3 }, { "name": "another" }, { "id": 3 }]),
        &CollectionSetOptions::new(),
    );
    assert_unique(&collection);

    collection.remove(1, &CollectionSetOptions::new());
    assert_unique(&collection);

    collection.set(
        json!([{ "id": 3, "name": "z" }, { "id": 4 }]),
        &CollectionSetOptions::new().keep_missing(),
    );
    assert_unique(&collection);

    let held = collection.at(0).unwrap();
    collection.add(&held, &CollectionSetOptions::new());
    let draft = collection.find_where(&json!({ "name": "draft" })).unwrap();
    draft.set_key("id", json!(99), &SetOptions::new());
    assert_unique(&collection);

    collection.set(json!([{ "id": 99 }, { "id": 4 }]), &CollectionSetOptions::new());
    assert_unique(&collection);
    assert_eq!(collection.len(), 2);
}

#[test]
fn quiet_id_changes_keep_the_index_consistent() {
    let collection = Collection::new(json!([{ "name": "draft" }, { "id": 1 }]));
    let draft = collection.at(0).unwrap();

    draft.set_key("id", json!(9), &SetOptions::new().silent());
    assert_unique(&collection);
    assert_eq!(collection.get(9), Some(draft.clone()));

    draft.unset("id", &SetOptions::new().silent());
    assert_unique(&collection);
    assert!(collection.get(9).is_none());
}

#[test]
fn equal_sort_keys_keep_insertion_order() {
    let collection = Collection::builder()
        .comparator(Comparator::attribute("rank"))
        .build();
    collection.add(
        json!([
            { "label": "first", "rank": 2 },
            { "label": "second", "rank": 1 },
            { "label": "third", "rank": 2 },
            { "label": "fourth", "rank": 1 }
        ]),
        &CollectionSetOptions::new(),
    );
    collection.sort(&CollectionSetOptions::new()).unwrap();

    assert_eq!(
        collection.pluck("label"),
        vec![json!("second"), json!("fourth"), json!("first"), json!("third")]
    );
}

#[tokio::test]
async fn action_events_fire_scoped_then_generic_then_change() {
    let dispatcher = Dispatcher::new();
    let store = Store::builder("todos")
        .action("toggle", |store, _, responder| {
            store.set(json!({ "done": true }), &SetOptions::new());
            responder.change(None);
            Ok(())
        })
        .register(&dispatcher);
    let log = EventLog::attach(&store);

    dispatcher.dispatch("todos:toggle", json!(null)).promise.await.unwrap();

    assert_eq!(log.names(), vec!["actionSuccess:toggle", "actionSuccess", "change"]);
}

#[test]
fn dispatch_indexes_strictly_increase() {
    let dispatcher = Dispatcher::new();
    dispatcher.register("todos:add", |_: &Action| future::ready(Ok(Value::Null)));

    let indexes: Vec<u64> = (0..20)
        .map(|n| {
            let action_type = match n % 3 {
                0 => "todos:add",
                1 => "refresh",
                _ => "todos:missing",
            };
            dispatcher.dispatch(action_type, json!(n)).index
        })
        .collect();

    assert!(indexes.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn scenario_seeded_collection() {
    let collection = Collection::new(json!([
        { "id": 1, "name": "a" },
        { "id": 2, "name": "b" }
    ]));

    assert_eq!(collection.len(), 2);
    assert_eq!(collection.pluck("name"), vec![json!("a"), json!("b")]);
}

#[test]
fn scenario_repeated_set_notifies_once() {
    let model = Model::new(json!({}));
    let calls = counter(&model, "change");

    model.set_key("x", json!(1), &SetOptions::new());
    model.set_key("x", json!(1), &SetOptions::new());

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn scenario_deep_path_notifies_each_name_once() {
    let model = Schema::builder("deep").deep().build().create(json!({}));
    let leaf = counter(&model, "change:a.b");
    let wildcard = counter(&model, "change:a.*");
    let change = counter(&model, "change");

    model.set_key("a.b", json!(1), &SetOptions::new());

    assert_eq!(leaf.load(Ordering::SeqCst), 1);
    assert_eq!(wildcard.load(Ordering::SeqCst), 1);
    assert_eq!(change.load(Ordering::SeqCst), 1);
    assert_eq!(model.to_json(), json!({ "a": { "b": 1 } }));
}

#[tokio::test]
async fn scenario_unregistered_action_rejects() {
    let dispatcher = Dispatcher::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&calls);
    dispatcher.register("store:knownAction", move |_: &Action| {
        counted.fetch_add(1, Ordering::SeqCst);
        future::ready(Ok(Value::Null))
    });

    let result = dispatcher.dispatch("store:unknownAction", json!(null)).promise.await;

    assert_eq!(
        result,
        Err(ActionError::Unregistered("store:unknownAction".to_string()))
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn scenario_removal_clears_both_index_slots() {
    let collection = Collection::new(json!([{ "id": 1 }, { "id": 2 }]));
    let model = collection.get(1).unwrap();
    let cid = model.cid().to_string();

    collection.remove(&model, &CollectionSetOptions::new());

    assert!(collection.get(1).is_none());
    assert!(collection.get(cid.as_str()).is_none());
    assert_eq!(collection.index_size(), 2);
}
