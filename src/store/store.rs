use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures::channel::oneshot;
use futures::future::FutureExt;
use serde_json::Value;

use super::Responder;
use crate::dispatcher::{panicked, Action, ActionFuture, Dispatcher};
use crate::error::ActionError;
use crate::events::{Events, Observable};
use crate::model::{Model, Schema};
use crate::options::SetOptions;

/// Table entry: receives the store, the payload and a responder.
pub type ActionHandler = Arc<dyn Fn(&Store, Value, Responder) -> Result<(), ActionError> + Send + Sync>;

/// Receives every action that matches no table entry.
pub type FallbackHandler = Arc<dyn Fn(&Store, &Action, Responder) -> Result<(), ActionError> + Send + Sync>;

struct StoreInner {
    key: String,
    events: Events,
    state: Model,
    actions: HashMap<String, ActionHandler>,
    fallback: Option<FallbackHandler>,
}

/// A dispatcher-driven state container.
///
/// State lives in a [`Model`], so attribute events fire on [`Store::state`];
/// the store's own emitter carries `actionSuccess`, `actionError` and the
/// `change` notifications sent through a [`Responder`].
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("key", &self.inner.key)
            .field("actions", &self.supported_actions())
            .field("state", &self.inner.state)
            .finish()
    }
}

impl Observable for Store {
    fn events(&self) -> &Events {
        &self.inner.events
    }
}

impl Store {
    pub fn builder(key: impl Into<String>) -> StoreBuilder {
        StoreBuilder::new(key)
    }

    pub fn key(&self) -> &str {
        &self.inner.key
    }

    pub fn state(&self) -> &Model {
        &self.inner.state
    }

    pub fn get(&self, attr: &str) -> Option<Value> {
        self.inner.state.get(attr)
    }

    pub fn set(&self, attrs: Value, options: &SetOptions) -> bool {
        self.inner.state.set(attrs, options)
    }

    pub fn to_json(&self) -> Value {
        self.inner.state.to_json()
    }

    /// `"key:action"` for every table entry, sorted.
    pub fn supported_actions(&self) -> Vec<String> {
        let mut actions: Vec<String> = self
            .inner
            .actions
            .keys()
            .map(|id| format!("{}:{}", self.inner.key, id))
            .collect();
        actions.sort();
        actions
    }

    fn handle(&self, action: &Action) -> ActionFuture {
        let (settle, settled) = oneshot::channel();
        let responder = Responder::new(self.clone(), action.action_id.clone(), settle);
        let promise = settled
            .map(|result| result.unwrap_or_else(|_| Err(ActionError::Abandoned)))
            .boxed();

        let entry = action
            .action_id
            .as_ref()
            .filter(|_| action.store_key.as_deref() == Some(self.key()))
            .and_then(|id| self.inner.actions.get(id))
            .cloned();

        match entry {
            Some(handler) => {
                let payload = action.payload.clone();
                let outcome =
                    panic::catch_unwind(AssertUnwindSafe(|| handler(self, payload, responder.clone())));
                self.settle_outcome(&responder, outcome);
            }
            None => {
                if let Some(fallback) = &self.inner.fallback {
                    let outcome =
                        panic::catch_unwind(AssertUnwindSafe(|| fallback(self, action, responder.clone())));
                    self.settle_outcome(&responder, outcome);
                }
                if !responder.is_settled() {
                    tracing::trace!(store = %self.key(), action = %action.action_type, "left unanswered");
                    responder.resolve(Ok(Value::Null));
                }
            }
        }
        promise
    }

    fn settle_outcome(
        &self,
        responder: &Responder,
        outcome: std::thread::Result<Result<(), ActionError>>,
    ) {
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(error)) => responder.fail(error),
            Err(panic) => responder.fail(panicked(panic.as_ref())),
        }
    }
}

/// Builder for [`Store`]. The action table is fixed once the store is built.
pub struct StoreBuilder {
    key: String,
    schema: Schema,
    state: Value,
    actions: HashMap<String, ActionHandler>,
    fallback: Option<FallbackHandler>,
}

impl StoreBuilder {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            schema: Schema::builder(key.clone()).build(),
            key,
            state: Value::Null,
            actions: HashMap::new(),
            fallback: None,
        }
    }

    /// Add a table entry for `"<key>:<id>"`.
    pub fn action<F>(mut self, id: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Store, Value, Responder) -> Result<(), ActionError> + Send + Sync + 'static,
    {
        self.actions.insert(id.into(), Arc::new(handler));
        self
    }

    /// Hook for actions that match no table entry, broadcasts included.
    /// The dispatch resolves on its own unless the hook settles it first.
    pub fn on_action<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Store, &Action, Responder) -> Result<(), ActionError> + Send + Sync + 'static,
    {
        self.fallback = Some(Arc::new(handler));
        self
    }

    pub fn state(mut self, state: Value) -> Self {
        self.state = state;
        self
    }

    /// Schema for the state model (defaults, validation).
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    /// Build the store without registering it anywhere.
    pub fn build(self) -> Store {
        Store {
            inner: Arc::new(StoreInner {
                state: self.schema.create(self.state),
                key: self.key,
                events: Events::new(),
                actions: self.actions,
                fallback: self.fallback,
            }),
        }
    }

    /// Build the store and register its table entries and broadcast callback.
    pub fn register(self, dispatcher: &Dispatcher) -> Store {
        let store = self.build();
        for action_type in store.supported_actions() {
            let target = store.clone();
            dispatcher.register(action_type, move |action: &Action| target.handle(action));
        }
        let target = store.clone();
        dispatcher.register_callback(move |action: &Action| target.handle(action));
        tracing::debug!(store = %store.key(), actions = store.inner.actions.len(), "store registered");
        store
    }
}
