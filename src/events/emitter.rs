use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use super::Event;

/// Name under which a listener receives every event.
pub const ALL: &str = "all";

pub type Callback = Arc<dyn Fn(&Event) + Send + Sync>;

static NEXT_LISTENER: AtomicU64 = AtomicU64::new(1);

/// Handle returned by `on`, usable with `off` to remove exactly that listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    fn next() -> Self {
        ListenerId(NEXT_LISTENER.fetch_add(1, Ordering::Relaxed))
    }
}

struct Listener {
    id: ListenerId,
    name: String,
    callback: Callback,
    once: bool,
}

/// Subscription this emitter made on another emitter via `listen_to`.
struct Subscription {
    target: Weak<Registry>,
    id: ListenerId,
}

#[derive(Default)]
struct Registry {
    listeners: RwLock<Vec<Listener>>,
    listening: Mutex<Vec<Subscription>>,
}

/// Named-event pub/sub.
///
/// Listeners for an event run in registration order, followed by listeners
/// registered for [`ALL`]. The listener list is snapshotted before any
/// callback runs, so callbacks may register, remove or trigger freely.
#[derive(Clone, Default)]
pub struct Events {
    registry: Arc<Registry>,
}

impl Events {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for each space-separated name in `names`.
    pub fn on<F>(&self, names: &str, callback: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.add(names, Arc::new(callback), false)
    }

    /// Like `on`, but the listener is removed before its first invocation.
    pub fn once<F>(&self, names: &str, callback: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.add(names, Arc::new(callback), true)
    }

    fn add(&self, names: &str, callback: Callback, once: bool) -> ListenerId {
        let id = ListenerId::next();
        let mut listeners = self.registry.listeners.write();
        for name in names.split_whitespace() {
            listeners.push(Listener {
                id,
                name: name.to_string(),
                callback: Arc::clone(&callback),
                once,
            });
        }
        id
    }

    /// Remove listeners matching `name` and/or `id`. `off(None, None)` removes
    /// every listener.
    pub fn off(&self, name: Option<&str>, id: Option<ListenerId>) {
        self.registry.listeners.write().retain(|listener| {
            let name_matches = name.map(|n| listener.name == n).unwrap_or(true);
            let id_matches = id.map(|i| listener.id == i).unwrap_or(true);
            !(name_matches && id_matches)
        });
    }

    pub fn trigger(&self, event: &Event) {
        let callbacks: Vec<Callback> = {
            let mut listeners = self.registry.listeners.write();
            let mut named = Vec::new();
            let mut catch_all = Vec::new();
            for listener in listeners.iter() {
                if listener.name == event.name {
                    named.push((listener.id, Arc::clone(&listener.callback), listener.once));
                } else if listener.name == ALL {
                    catch_all.push((listener.id, Arc::clone(&listener.callback), listener.once));
                }
            }
            named.extend(catch_all);
            let spent: Vec<ListenerId> = named
                .iter()
                .filter(|(_, _, once)| *once)
                .map(|(id, _, _)| *id)
                .collect();
            if !spent.is_empty() {
                listeners.retain(|l| !spent.contains(&l.id));
            }
            named.into_iter().map(|(_, cb, _)| cb).collect()
        };

        tracing::trace!(event = %event.name, listeners = callbacks.len(), "trigger");

        for callback in callbacks {
            callback(event);
        }
    }

    /// Subscribe to `other` and remember the subscription for `stop_listening`.
    pub fn listen_to<F>(&self, other: &Events, names: &str, callback: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = other.on(names, callback);
        self.remember(other, id);
        id
    }

    pub fn listen_to_once<F>(&self, other: &Events, names: &str, callback: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = other.once(names, callback);
        self.remember(other, id);
        id
    }

    fn remember(&self, other: &Events, id: ListenerId) {
        self.registry.listening.lock().push(Subscription {
            target: Arc::downgrade(&other.registry),
            id,
        });
    }

    /// Tear down subscriptions made with `listen_to`, either all of them or
    /// only those on `other`.
    pub fn stop_listening(&self, other: Option<&Events>) {
        let dropped: Vec<Subscription> = {
            let mut listening = self.registry.listening.lock();
            let (dropped, kept): (Vec<_>, Vec<_>) = listening.drain(..).partition(|sub| match other {
                Some(other) => sub.target.ptr_eq(&Arc::downgrade(&other.registry)),
                None => true,
            });
            *listening = kept;
            dropped
        };

        for sub in dropped {
            if let Some(target) = sub.target.upgrade() {
                (Events { registry: target }).off(None, Some(sub.id));
            }
        }
    }

    /// Number of listeners registered for `name` (or in total).
    pub fn listener_count(&self, name: Option<&str>) -> usize {
        self.registry
            .listeners
            .read()
            .iter()
            .filter(|l| name.map(|n| l.name == n).unwrap_or(true))
            .count()
    }

    /// Number of live `listen_to` subscriptions this emitter holds.
    pub fn listening_count(&self) -> usize {
        self.registry.listening.lock().len()
    }
}
