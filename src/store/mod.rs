//! Stores - state containers fed by the dispatcher.
//!
//! A [`Store`] registers one handler per action-table entry under
//! `"<key>:<id>"` plus a broadcast callback. Table handlers settle their
//! dispatch through a [`Responder`].
//!
//! ## Example
//!
//! ```ignore
//! use observable_mvc::{Dispatcher, Store};
//!
//! let dispatcher = Dispatcher::new();
//! let todos = Store::builder("todos")
//!     .state(json!({ "count": 0 }))
//!     .action("increment", |store, _payload, responder| {
//!         let count = store.get("count").and_then(|c| c.as_i64()).unwrap_or(0);
//!         store.set(json!({ "count": count + 1 }), &SetOptions::new());
//!         responder.change(Some("count"));
//!         Ok(())
//!     })
//!     .register(&dispatcher);
//!
//! todos.on("change:count", |event| println!("count is {}", event.value));
//! dispatcher.dispatch("todos:increment", json!(null)).promise.await?;
//! ```

mod responder;
mod store;

pub use responder::Responder;
pub use store::{ActionHandler, FallbackHandler, Store, StoreBuilder};
