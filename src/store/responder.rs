use std::sync::Arc;

use futures::channel::oneshot;
use parking_lot::Mutex;
use serde_json::Value;

use super::Store;
use crate::error::ActionError;
use crate::events::{Event, Observable};

type Settle = oneshot::Sender<Result<Value, ActionError>>;

/// Handed to a store's action handler to settle the dispatch.
///
/// Clones share one settlement: the first `change` or `error` decides the
/// promise, later calls only emit their events. Dropping every clone
/// without answering rejects with [`ActionError::Abandoned`].
#[derive(Clone)]
pub struct Responder {
    store: Store,
    action_id: Option<String>,
    settle: Arc<Mutex<Option<Settle>>>,
}

impl Responder {
    pub(super) fn new(store: Store, action_id: Option<String>, settle: Settle) -> Self {
        Self {
            store,
            action_id,
            settle: Arc::new(Mutex::new(Some(settle))),
        }
    }

    pub fn action_id(&self) -> Option<&str> {
        self.action_id.as_deref()
    }

    pub fn is_settled(&self) -> bool {
        self.settle.lock().is_none()
    }

    /// Resolve with the store's state, then emit `actionSuccess:<id>`,
    /// `actionSuccess`, `change:<attr>` (when given) and `change`.
    pub fn change(&self, attr: Option<&str>) {
        let state = self.store.to_json();
        self.resolve(Ok(state.clone()));

        if let Some(id) = &self.action_id {
            self.emit(format!("actionSuccess:{}", id), state.clone());
        }
        self.emit("actionSuccess".to_string(), state.clone());
        if let Some(attr) = attr {
            let value = self.store.get(attr).unwrap_or(Value::Null);
            self.emit(format!("change:{}", attr), value);
        }
        self.emit("change".to_string(), state);
    }

    /// Reject with `error`, then emit `actionError:<id>` and `actionError`.
    pub fn error(&self, error: impl Into<Value>) {
        self.fail(ActionError::Failed(error.into()));
    }

    pub(super) fn fail(&self, error: ActionError) {
        let payload = error.payload();
        tracing::debug!(store = %self.store.key(), action = ?self.action_id, %error, "action failed");
        self.resolve(Err(error));

        if let Some(id) = &self.action_id {
            self.emit(format!("actionError:{}", id), payload.clone());
        }
        self.emit("actionError".to_string(), payload);
    }

    /// Settle unless already settled.
    pub(super) fn resolve(&self, result: Result<Value, ActionError>) {
        if let Some(settle) = self.settle.lock().take() {
            // the caller may have dropped the promise
            let _ = settle.send(result);
        }
    }

    fn emit(&self, name: String, value: Value) {
        self.store.trigger(&Event::new(name).with_value(value));
    }
}
