//! Collections - ordered, uniquely indexed sets of models.
//!
//! [`Collection::set`] is the reconciliation primitive under `add`, `remove`
//! and `reset`: incoming items are matched against held members through a
//! dual index (id and cid), merged, staged, spliced and optionally sorted.
//! Member events are relayed onto the collection.
//!
//! ## Example
//!
//! ```ignore
//! use observable_mvc::{Collection, CollectionSetOptions, Comparator};
//!
//! let people = Collection::builder()
//!     .comparator(Comparator::attribute("name"))
//!     .models(json!([{ "id": 1, "name": "b" }, { "id": 2, "name": "a" }]))
//!     .build();
//!
//! people.on("add", |event| println!("added {:?}", event.model));
//! people.add(json!({ "id": 3, "name": "c" }), &CollectionSetOptions::adding());
//! assert_eq!(people.pluck("name"), vec![json!("a"), json!("b"), json!("c")]);
//! ```

mod collection;
mod comparator;
mod members;
mod paging;

pub use collection::{Collection, CollectionBuilder};
pub(crate) use collection::CollectionInner;
pub use comparator::{compare_values, CompareFn, Comparator, SortKey};
pub use members::{Lookup, Member, Members};
