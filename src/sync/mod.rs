//! Sync - the transport seam between models/collections and remote state.
//!
//! The core never performs I/O. `fetch`, `save` and `destroy` build a
//! [`SyncRequest`] and hand it to a [`Transport`]; pagination metadata is read
//! from responses through a [`PageMetaExtractor`].
//!
//! ## Architecture
//!
//! ```text
//! Model::save / Collection::fetch
//!            │  SyncRequest { method, url, body, query, target }
//!            ▼
//! ┌─────────────────────────┐
//! │    Transport (trait)    │  InMemoryTransport (included), HTTP (external)
//! └─────────────────────────┘
//!            │  SyncResponse { body, headers }
//!            ▼
//!    set / reset / PageMeta
//! ```

mod in_memory;
mod page_meta;

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::collection::Collection;
use crate::error::TransportError;
use crate::model::Model;

pub use in_memory::{InMemoryTransport, RecordedRequest};
pub use page_meta::{HeaderPageMeta, PageMeta, PageMetaExtractor};

/// CRUD verb of a sync call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Create,
    Read,
    Update,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Create => "create",
            Method::Read => "read",
            Method::Update => "update",
            Method::Patch => "patch",
            Method::Delete => "delete",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The entity a sync call is made on behalf of.
#[derive(Debug, Clone)]
pub enum SyncTarget {
    Model(Model),
    Collection(Collection),
}

#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub method: Method,
    pub url: String,
    /// JSON body for `create`, `update` and `patch`.
    pub body: Option<Value>,
    pub query: Vec<(String, String)>,
    pub target: SyncTarget,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncResponse {
    pub body: Value,
    pub headers: HashMap<String, String>,
}

impl SyncResponse {
    pub fn new(body: Value) -> Self {
        Self {
            body,
            headers: HashMap::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.headers.insert(name.into(), value.to_string());
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Performs the actual I/O for `fetch`, `save` and `destroy`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn sync(&self, request: SyncRequest) -> Result<SyncResponse, TransportError>;
}
