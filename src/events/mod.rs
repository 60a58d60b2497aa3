//! Events - named pub/sub shared by models, collections and stores.
//!
//! Every observable type owns an [`Events`] emitter and exposes it through the
//! [`Observable`] trait, which supplies the delegating `on`/`off`/`trigger`
//! surface.
//!
//! ## Example
//!
//! ```ignore
//! use observable_mvc::{Model, Observable};
//!
//! let model = Model::new(json!({ "title": "Dune" }));
//! model.on("change:title", |event| println!("title is now {}", event.value));
//! model.set_key("title", json!("Children of Dune"), &SetOptions::new());
//! ```

mod emitter;
mod event;

pub use emitter::{Callback, Events, ListenerId, ALL};
pub use event::Event;

/// Types that own an event emitter.
pub trait Observable {
    fn events(&self) -> &Events;

    fn on<F>(&self, names: &str, callback: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.events().on(names, callback)
    }

    fn once<F>(&self, names: &str, callback: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.events().once(names, callback)
    }

    fn off(&self, name: Option<&str>, id: Option<ListenerId>) {
        self.events().off(name, id)
    }

    fn trigger(&self, event: &Event) {
        self.events().trigger(event)
    }

    fn listen_to<O, F>(&self, other: &O, names: &str, callback: F) -> ListenerId
    where
        O: Observable + ?Sized,
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.events().listen_to(other.events(), names, callback)
    }

    fn listen_to_once<O, F>(&self, other: &O, names: &str, callback: F) -> ListenerId
    where
        O: Observable + ?Sized,
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.events().listen_to_once(other.events(), names, callback)
    }

    fn stop_listening(&self) {
        self.events().stop_listening(None)
    }

    fn stop_listening_to<O>(&self, other: &O)
    where
        O: Observable + ?Sized,
    {
        self.events().stop_listening(Some(other.events()))
    }
}

impl Observable for Events {
    fn events(&self) -> &Events {
        self
    }
}
