//! Dispatcher - Flux-style action routing.
//!
//! Each dispatch allocates an index, builds an [`Action`] and returns a
//! [`Dispatched`] handle synchronously. `"store:action"` types route to a single
//! registered handler; bare types are broadcast to every generic callback.
//!
//! ## Example
//!
//! ```ignore
//! use observable_mvc::Dispatcher;
//!
//! let dispatcher = Dispatcher::new();
//! dispatcher.register("todos:add", |action| {
//!     let title = action.payload.clone();
//!     async move { Ok(title) }
//! });
//!
//! let Dispatched { index, promise } = dispatcher.dispatch("todos:add", json!("milk"));
//! let result = promise.await?;
//! ```

mod action;
mod dispatcher;

pub use action::Action;
pub(crate) use dispatcher::panicked;
pub use dispatcher::{ActionFuture, Dispatched, Dispatcher, Handler};
