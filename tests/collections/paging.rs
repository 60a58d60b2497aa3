use std::sync::Arc;

use observable_mvc::{
    Collection, FetchOptions, PageMeta, PageMetaExtractor, SyncError, SyncResponse,
    TransportError,
};
use serde_json::{json, Value};

use crate::support::{init_tracing, EventLog, ScriptedTransport};

/// Reads `{"items": [...], "next": n}` envelopes.
struct EnvelopeMeta;

impl PageMetaExtractor for EnvelopeMeta {
    fn extract(&self, response: &SyncResponse) -> PageMeta {
        let next_page = response.body.get("next").and_then(Value::as_u64);
        PageMeta {
            total_count: response.body.get("total").and_then(Value::as_u64),
            has_more: next_page.is_some(),
            next_page,
            ..PageMeta::default()
        }
    }
}

fn feed(transport: &ScriptedTransport) -> Collection {
    Collection::builder()
        .url("/feed")
        .transport(transport.shared())
        .page_meta(Arc::new(EnvelopeMeta))
        .parse(|body| body.get("items").cloned().unwrap_or(Value::Null))
        .build()
}

#[tokio::test]
async fn fetch_paints_and_syncs() {
    init_tracing();
    let transport = ScriptedTransport::new();
    transport.reply(json!({ "items": [{ "id": 1 }, { "id": 2 }] }));
    let collection = feed(&transport);
    let log = EventLog::attach(&collection);

    collection.fetch(&FetchOptions::new()).await.unwrap();

    assert_eq!(log.names(), vec!["request", "add", "add", "sync"]);
    assert_eq!(collection.pluck("id"), vec![json!(1), json!(2)]);
}

#[tokio::test]
async fn fetch_reconciles_or_resets() {
    let transport = ScriptedTransport::new();
    transport
        .reply(json!({ "items": [{ "id": 1 }, { "id": 2 }] }))
        .reply(json!({ "items": [{ "id": 2 }, { "id": 3 }] }))
        .reply(json!({ "items": [{ "id": 4 }] }));
    let collection = feed(&transport);

    collection.fetch(&FetchOptions::new()).await.unwrap();
    collection.fetch(&FetchOptions::new()).await.unwrap();
    assert_eq!(collection.pluck("id"), vec![json!(2), json!(3)]);

    let log = EventLog::attach(&collection);
    collection.fetch(&FetchOptions::new().reset()).await.unwrap();
    assert_eq!(log.names(), vec!["request", "reset", "sync"]);
    assert_eq!(collection.pluck("id"), vec![json!(4)]);
}

#[tokio::test]
async fn fetch_all_walks_announced_pages() {
    let transport = ScriptedTransport::new();
    transport
        .reply(json!({ "items": [{ "id": 1 }], "next": 2, "total": 3 }))
        .reply(json!({ "items": [{ "id": 2 }], "next": 3, "total": 3 }))
        .reply(json!({ "items": [{ "id": 3 }], "total": 3 }));
    let collection = feed(&transport);

    let pages = collection.fetch_all().await.unwrap();

    assert_eq!(pages, 3);
    assert_eq!(collection.pluck("id"), vec![json!(1), json!(2), json!(3)]);
    let requested: Vec<Option<String>> = transport
        .seen()
        .iter()
        .map(|s| s.query_value("page").map(str::to_string))
        .collect();
    assert_eq!(
        requested,
        vec![Some("1".to_string()), Some("2".to_string()), Some("3".to_string())]
    );
    let meta = collection.meta();
    assert_eq!(meta.total_count, Some(3));
    assert!(!meta.has_more);
}

#[tokio::test]
async fn header_pages_merge_into_existing_members() {
    let transport = ScriptedTransport::new();
    transport
        .respond(
            SyncResponse::new(json!([{ "id": 1, "v": 1 }]))
                .with_header("X-Page", 1)
                .with_header("X-Remainder", 1),
        )
        .respond(
            SyncResponse::new(json!([{ "id": 1, "v": 2 }, { "id": 2 }])).with_header("X-Page", 2),
        );
    let collection = Collection::builder()
        .url("/items")
        .transport(transport.shared())
        .build();

    assert_eq!(collection.fetch_next().await, Ok(true));
    assert_eq!(collection.meta().remainder, Some(1));
    assert_eq!(collection.fetch_next().await, Ok(false));

    assert_eq!(collection.len(), 2);
    assert_eq!(collection.get(1).and_then(|m| m.get("v")), Some(json!(2)));
    let last_page = transport
        .last()
        .and_then(|s| s.query_value("page").map(str::to_string));
    assert_eq!(last_page, Some("2".to_string()));
}

#[tokio::test]
async fn failed_page_releases_the_guard() {
    let transport = ScriptedTransport::new();
    transport
        .fail(TransportError::new("offline"))
        .reply(json!({ "items": [{ "id": 1 }] }));
    let collection = feed(&transport);
    let log = EventLog::attach(&collection);

    let failed = collection.fetch_next().await;
    assert!(matches!(failed, Err(SyncError::Transport(_))));
    assert_eq!(
        log.values("error"),
        vec![json!({ "message": "offline", "status": null })]
    );

    assert_eq!(collection.fetch_next().await, Ok(false));
    assert_eq!(collection.len(), 1);
}

#[tokio::test]
async fn fetch_without_a_url_is_a_config_error() {
    let transport = ScriptedTransport::new();
    let collection = Collection::builder().transport(transport.shared()).build();

    let result = collection.fetch(&FetchOptions::new()).await;

    assert!(matches!(result, Err(SyncError::Config(_))));
    assert!(transport.seen().is_empty());
}
