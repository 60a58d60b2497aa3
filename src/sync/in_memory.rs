//! InMemoryTransport - a REST-shaped in-memory backend for tests and demos.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{json, Map, Value};

use super::{Method, SyncRequest, SyncResponse, Transport};
use crate::error::TransportError;
use crate::model::key_of;

/// A request as the transport saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<Value>,
    pub query: Vec<(String, String)>,
}

#[derive(Default)]
struct Backend {
    /// Records per collection URL, in insertion order.
    resources: HashMap<String, Vec<Value>>,
    next_id: u64,
    requests: Vec<RecordedRequest>,
    failures: VecDeque<TransportError>,
    page_size: Option<usize>,
}

/// Serves `create/read/update/patch/delete` against JSON records kept in
/// memory, keyed by collection URL (`/books`) and record URL (`/books/1`).
///
/// Clone-friendly via Arc; clones share the same records.
#[derive(Clone)]
pub struct InMemoryTransport {
    backend: Arc<RwLock<Backend>>,
    id_attribute: String,
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self {
            backend: Arc::new(RwLock::new(Backend::default())),
            id_attribute: "id".to_string(),
        }
    }

    pub fn with_id_attribute(mut self, name: impl Into<String>) -> Self {
        self.id_attribute = name.into();
        self
    }

    /// Serve collection reads in pages of `size`, honouring a `page` query.
    pub fn with_page_size(self, size: usize) -> Self {
        self.backend.write().page_size = Some(size);
        self
    }

    /// Replace the records stored under `url`.
    pub fn seed(&self, url: &str, records: Vec<Value>) {
        let mut backend = self.backend.write();
        for record in &records {
            if let Some(n) = record.get(&self.id_attribute).and_then(Value::as_u64) {
                backend.next_id = backend.next_id.max(n);
            }
        }
        backend.resources.insert(url.to_string(), records);
    }

    /// Make the next call fail with `error`.
    pub fn fail_next(&self, error: TransportError) {
        self.backend.write().failures.push_back(error);
    }

    pub fn records(&self, url: &str) -> Vec<Value> {
        self.backend
            .read()
            .resources
            .get(url)
            .cloned()
            .unwrap_or_default()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.backend.read().requests.clone()
    }

    fn not_found(url: &str) -> TransportError {
        TransportError::new(format!("no record at {}", url))
            .with_status(404)
            .with_body(json!({ "error": "not found" }))
    }

    fn handle(&self, request: &SyncRequest) -> Result<SyncResponse, TransportError> {
        let mut backend = self.backend.write();
        backend.requests.push(RecordedRequest {
            method: request.method,
            url: request.url.clone(),
            body: request.body.clone(),
            query: request.query.clone(),
        });
        if let Some(error) = backend.failures.pop_front() {
            return Err(error);
        }

        let url = request.url.as_str();
        if backend.resources.contains_key(url) || !self.is_record_url(&backend, url) {
            return match request.method {
                Method::Read => Ok(self.list(&backend, url, &request.query)),
                Method::Create => self.create(&mut backend, url, request.body.clone()),
                _ => Err(Self::not_found(url)),
            };
        }

        let (base, raw_id) = url.rsplit_once('/').ok_or_else(|| Self::not_found(url))?;
        let id = urlencoding::decode(raw_id)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| raw_id.to_string());
        let id_attribute = self.id_attribute.clone();
        let records = backend
            .resources
            .get_mut(base)
            .ok_or_else(|| Self::not_found(url))?;
        let position = records
            .iter()
            .position(|r| r.get(&id_attribute).and_then(key_of).as_deref() == Some(id.as_str()))
            .ok_or_else(|| Self::not_found(url))?;

        match request.method {
            Method::Read => Ok(SyncResponse::new(records[position].clone())),
            Method::Update => {
                let mut record = as_object(request.body.clone());
                if let Some(id) = records[position].get(&id_attribute).cloned() {
                    record.insert(id_attribute, id);
                }
                records[position] = Value::Object(record);
                Ok(SyncResponse::new(records[position].clone()))
            }
            Method::Patch => {
                if let Value::Object(stored) = &mut records[position] {
                    stored.extend(as_object(request.body.clone()));
                }
                Ok(SyncResponse::new(records[position].clone()))
            }
            Method::Delete => {
                records.remove(position);
                Ok(SyncResponse::new(json!({})))
            }
            Method::Create => Err(TransportError::new("cannot create at a record url").with_status(405)),
        }
    }

    fn is_record_url(&self, backend: &Backend, url: &str) -> bool {
        url.rsplit_once('/')
            .map(|(base, _)| backend.resources.contains_key(base))
            .unwrap_or(false)
    }

    fn list(&self, backend: &Backend, url: &str, query: &[(String, String)]) -> SyncResponse {
        let records = backend.resources.get(url).cloned().unwrap_or_default();
        let Some(size) = backend.page_size else {
            return SyncResponse::new(Value::Array(records));
        };

        let page = query
            .iter()
            .find(|(k, _)| k == "page")
            .and_then(|(_, v)| v.parse::<usize>().ok())
            .unwrap_or(1)
            .max(1);
        let total = records.len();
        let start = ((page - 1) * size).min(total);
        let end = (start + size).min(total);
        let remainder = total - end;

        let mut response = SyncResponse::new(Value::Array(records[start..end].to_vec()))
            .with_header("X-Page", page)
            .with_header("X-Per-Page", size)
            .with_header("X-Total-Count", total)
            .with_header("X-Remainder", remainder);
        if remainder > 0 {
            response = response.with_header("X-Next-Page", page + 1);
        }
        response
    }

    fn create(
        &self,
        backend: &mut Backend,
        url: &str,
        body: Option<Value>,
    ) -> Result<SyncResponse, TransportError> {
        let mut record = as_object(body);
        if record.get(&self.id_attribute).map(Value::is_null).unwrap_or(true) {
            backend.next_id += 1;
            record.insert(self.id_attribute.clone(), json!(backend.next_id));
        }
        let record = Value::Object(record);
        backend
            .resources
            .entry(url.to_string())
            .or_default()
            .push(record.clone());
        Ok(SyncResponse::new(record))
    }
}

fn as_object(body: Option<Value>) -> Map<String, Value> {
    match body {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn sync(&self, request: SyncRequest) -> Result<SyncResponse, TransportError> {
        tracing::debug!(method = %request.method, url = %request.url, "in-memory sync");
        self.handle(&request)
    }
}
