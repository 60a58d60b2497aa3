use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::RwLock;
use serde_json::Value;

use super::Action;
use crate::error::{ActionError, ConfigError};

/// Settlement of one dispatch.
pub type ActionFuture = BoxFuture<'static, Result<Value, ActionError>>;

pub type Handler = Arc<dyn Fn(&Action) -> ActionFuture + Send + Sync>;

/// Returned synchronously by [`Dispatcher::dispatch`].
pub struct Dispatched {
    pub index: u64,
    pub promise: ActionFuture,
}

struct DispatcherInner {
    next_index: AtomicU64,
    handlers: RwLock<HashMap<String, Handler>>,
    callbacks: RwLock<Vec<Handler>>,
}

/// Routes actions to stores.
///
/// `"store:action"` types go to the one handler registered for that pair.
/// Types without a colon are broadcast to every generic callback and settle
/// once all of them have. Clones share the same registries.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                next_index: AtomicU64::new(1),
                handlers: RwLock::new(HashMap::new()),
                callbacks: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Register the handler for a `"store:action"` type, replacing any
    /// previous one.
    pub fn register<F, Fut>(&self, action_type: impl Into<String>, handler: F)
    where
        F: Fn(&Action) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ActionError>> + Send + 'static,
    {
        let action_type = action_type.into();
        tracing::debug!(action = %action_type, "handler registered");
        let handler: Handler = Arc::new(move |action: &Action| handler(action).boxed());
        self.inner.handlers.write().insert(action_type, handler);
    }

    /// Register a callback for broadcast actions.
    pub fn register_callback<F, Fut>(&self, callback: F)
    where
        F: Fn(&Action) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ActionError>> + Send + 'static,
    {
        let callback: Handler = Arc::new(move |action: &Action| callback(action).boxed());
        self.inner.callbacks.write().push(callback);
    }

    /// Registered `"store:action"` types, sorted.
    pub fn supported_actions(&self) -> Vec<String> {
        let mut actions: Vec<String> = self.inner.handlers.read().keys().cloned().collect();
        actions.sort();
        actions
    }

    pub fn is_registered(&self, action_type: &str) -> bool {
        self.inner.handlers.read().contains_key(action_type)
    }

    /// Build the action record and deliver it.
    ///
    /// Handlers run before this returns; only their settlement is deferred.
    /// Dispatching an unregistered pair invokes nothing and yields a rejected
    /// promise.
    pub fn dispatch(&self, action_type: &str, payload: Value) -> Dispatched {
        let index = self.inner.next_index.fetch_add(1, Ordering::SeqCst);
        let action = Action::new(action_type, index, payload);
        let promise = if action.is_specific() {
            self.route(&action)
        } else {
            self.broadcast(&action)
        };
        Dispatched { index, promise }
    }

    fn route(&self, action: &Action) -> ActionFuture {
        let handler = self.inner.handlers.read().get(&action.action_type).cloned();
        match handler {
            Some(handler) => {
                tracing::debug!(action = %action.action_type, index = action.index, "dispatch");
                invoke(&handler, action)
            }
            None => {
                tracing::warn!(action = %action.action_type, "dispatch to unregistered action");
                future::ready(Err(ActionError::from(ConfigError::UnknownAction(
                    action.action_type.clone(),
                ))))
                .boxed()
            }
        }
    }

    fn broadcast(&self, action: &Action) -> ActionFuture {
        let callbacks = self.inner.callbacks.read().clone();
        tracing::debug!(
            action = %action.action_type,
            index = action.index,
            callbacks = callbacks.len(),
            "broadcast"
        );
        let pending: Vec<ActionFuture> = callbacks.iter().map(|cb| invoke(cb, action)).collect();

        async move {
            let mut values = Vec::with_capacity(pending.len());
            let mut errors = Vec::new();
            for result in future::join_all(pending).await {
                match result {
                    Ok(value) => values.push(value),
                    Err(error) => errors.push(error),
                }
            }
            if errors.is_empty() {
                Ok(Value::Array(values))
            } else {
                Err(ActionError::Broadcast(errors))
            }
        }
        .boxed()
    }
}

/// Run a handler, turning a panic (while invoking or while polling its
/// future) into `ActionError::Panicked`.
fn invoke(handler: &Handler, action: &Action) -> ActionFuture {
    match panic::catch_unwind(AssertUnwindSafe(|| handler(action))) {
        Ok(settlement) => AssertUnwindSafe(settlement)
            .catch_unwind()
            .map(|result| result.unwrap_or_else(|panic| Err(panicked(panic.as_ref()))))
            .boxed(),
        Err(panic) => future::ready(Err(panicked(panic.as_ref()))).boxed(),
    }
}

pub(crate) fn panicked(panic: &(dyn Any + Send)) -> ActionError {
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    tracing::warn!(%message, "action handler panicked");
    ActionError::Panicked(message)
}
