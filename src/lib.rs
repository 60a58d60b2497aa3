mod collection;
mod dispatcher;
mod error;
mod events;
mod model;
mod options;
mod store;
mod sync;

pub use collection::{
    compare_values, Collection, CollectionBuilder, CompareFn, Comparator, Lookup, Member, Members,
    SortKey,
};
pub use dispatcher::{Action, ActionFuture, Dispatched, Dispatcher, Handler};
pub use error::{ActionError, ConfigError, SyncError, TransportError};
pub use events::{Callback, Event, Events, ListenerId, Observable, ALL};
pub use model::{Attributes, Initializer, KeyPath, Model, Parser, Schema, SchemaBuilder, Validator};
pub use options::{CollectionSetOptions, DestroyOptions, FetchOptions, SaveOptions, SetOptions};
pub use store::{ActionHandler, FallbackHandler, Responder, Store, StoreBuilder};
pub use sync::{
    HeaderPageMeta, InMemoryTransport, Method, PageMeta, PageMetaExtractor, RecordedRequest,
    SyncRequest, SyncResponse, SyncTarget, Transport,
};
