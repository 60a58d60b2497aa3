//! Shared helpers for the integration suites.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use observable_mvc::{
    Event, Method, Observable, SyncRequest, SyncResponse, Transport, TransportError,
};
use serde_json::{json, Value};

/// Route `tracing` output to the test harness. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Records every event fired on an observable, in order.
#[derive(Clone, Default)]
pub struct EventLog {
    entries: Arc<Mutex<Vec<(String, Value)>>>,
}

impl EventLog {
    pub fn attach<O: Observable>(target: &O) -> Self {
        let log = Self::default();
        let sink = Arc::clone(&log.entries);
        target.on("all", move |event: &Event| {
            sink.lock()
                .unwrap()
                .push((event.name.clone(), event.value.clone()));
        });
        log
    }

    pub fn names(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn values(&self, name: &str) -> Vec<Value> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, value)| value.clone())
            .collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.values(name).len()
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

/// What a [`ScriptedTransport`] saw.
#[derive(Debug, Clone, PartialEq)]
pub struct Seen {
    pub method: Method,
    pub url: String,
    pub body: Option<Value>,
    pub query: Vec<(String, String)>,
}

impl Seen {
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Answers requests from a queue; an empty queue answers `{}`.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    replies: Arc<Mutex<VecDeque<Result<SyncResponse, TransportError>>>>,
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(&self) -> Arc<dyn Transport> {
        Arc::new(self.clone())
    }

    pub fn reply(&self, body: Value) -> &Self {
        self.respond(SyncResponse::new(body))
    }

    pub fn respond(&self, response: SyncResponse) -> &Self {
        self.replies.lock().unwrap().push_back(Ok(response));
        self
    }

    pub fn fail(&self, error: TransportError) -> &Self {
        self.replies.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<Seen> {
        self.seen.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn sync(&self, request: SyncRequest) -> Result<SyncResponse, TransportError> {
        self.seen.lock().unwrap().push(Seen {
            method: request.method,
            url: request.url.clone(),
            body: request.body.clone(),
            query: request.query.clone(),
        });
        let next = self.replies.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(SyncResponse::new(json!({}))))
    }
}
