//! Error taxonomy for models, collections, transports and actions.
//!
//! Validation failures are deliberately absent: `set` reports them through
//! its boolean result and the `invalid` event, never through `Err`.

use serde_json::{json, Value};
use thiserror::Error;

/// Programmer errors: something the application forgot to configure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Neither the schema's `url_root` nor an owning collection's `url` is set.
    #[error("a \"url\" property or function must be specified")]
    MissingUrl,
    /// `sort()` was called on a collection without a comparator.
    #[error("cannot sort a set without a comparator")]
    MissingComparator,
    /// A sync operation was attempted without a transport.
    #[error("no transport configured for {0}")]
    MissingTransport(String),
    /// A `"store:action"` pair was dispatched that nobody registered.
    #[error("unknown action: {0}")]
    UnknownAction(String),
}

/// Failure reported by a [`Transport`](crate::Transport).
#[derive(Debug, Clone, PartialEq, Error)]
#[error("transport error{}: {message}", .status.map(|s| format!(" ({})", s)).unwrap_or_default())]
pub struct TransportError {
    /// HTTP-style status code, when the transport has one.
    pub status: Option<u16>,
    /// Structured error body returned by the remote end, if any.
    pub body: Option<Value>,
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            body: None,
            message: message.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// The error payload handed to `invalid` listeners.
    ///
    /// A JSON object body from the remote end is used as-is; anything else is
    /// wrapped as `{"message": ..., "status": ...}`.
    pub fn normalized(&self) -> Value {
        match &self.body {
            Some(body @ Value::Object(_)) => body.clone(),
            _ => json!({
                "message": self.message,
                "status": self.status,
            }),
        }
    }
}

/// Error type for `fetch`, `save`, `destroy` and collection paging.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    /// Local validation rejected the attributes before or after the request.
    #[error("validation failed: {0}")]
    Invalid(Value),
    /// The transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A page fetch is already in flight for this collection.
    #[error("a page fetch is already in flight")]
    Busy,
}

impl SyncError {
    /// Normalized error payload, as fired with `invalid`.
    pub fn payload(&self) -> Value {
        match self {
            SyncError::Invalid(error) => error.clone(),
            SyncError::Transport(err) => err.normalized(),
            other => json!({ "message": other.to_string() }),
        }
    }
}

/// Error settling a dispatched action.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActionError {
    /// A store handler reported failure through its responder.
    #[error("action failed: {0}")]
    Failed(Value),
    /// `"store:action"` was dispatched but never registered.
    #[error("unregistered action: {0}")]
    Unregistered(String),
    /// One or more broadcast callbacks failed. All of them were awaited.
    #[error("{} broadcast handler(s) failed", .0.len())]
    Broadcast(Vec<ActionError>),
    /// A handler panicked while running synchronously.
    #[error("action handler panicked: {0}")]
    Panicked(String),
    /// The responder was dropped without answering.
    #[error("action handler dropped its responder without answering")]
    Abandoned,
}

impl ActionError {
    /// Map this error to an HTTP-style status code.
    pub fn status_code(&self) -> u16 {
        match self {
            ActionError::Failed(_) => 422,
            ActionError::Unregistered(_) => 404,
            ActionError::Broadcast(_) => 207,
            ActionError::Panicked(_) => 500,
            ActionError::Abandoned => 500,
        }
    }

    /// JSON form used as the `value` of `actionError` events. Handler
    /// failures pass their value through; the rest carry a message and code.
    pub fn payload(&self) -> Value {
        match self {
            ActionError::Failed(value) => value.clone(),
            other => json!({ "message": other.to_string(), "status": other.status_code() }),
        }
    }
}

impl From<ConfigError> for ActionError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::UnknownAction(name) => ActionError::Unregistered(name),
            other => ActionError::Failed(json!({ "message": other.to_string() })),
        }
    }
}
