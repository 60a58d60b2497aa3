//! Models - observable attribute maps with change tracking.
//!
//! A [`Model`] holds a JSON attribute map and tracks what each mutation batch
//! changed. A [`Schema`] describes one kind of model: defaults, id attribute,
//! validation, parsing, transport and initializers. Deep schemas treat keys
//! as dot-delimited paths into nested objects.
//!
//! ## Example
//!
//! ```ignore
//! use observable_mvc::{Model, Schema, SetOptions};
//!
//! let profile = Schema::builder("profile").deep().build();
//! let model = profile.create(json!({ "address": { "city": "Oslo" } }));
//!
//! model.on("change:address.*", |event| println!("address now {}", event.value));
//! model.set_key("address.city", json!("Bergen"), &SetOptions::new());
//! ```

mod model;
mod path;
mod persist;
mod schema;

use serde_json::{Map, Value};

pub use model::Model;
pub use path::KeyPath;
pub use schema::{Initializer, Parser, Schema, SchemaBuilder, Validator};

/// A model's attribute map.
pub type Attributes = Map<String, Value>;

pub(crate) fn into_attributes(value: Value) -> Attributes {
    match value {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            tracing::debug!(value = %other, "ignoring non-object attributes");
            Map::new()
        }
    }
}

/// Index key for an id value. Strings are used verbatim so that `1` and
/// `"1"` address the same slot.
pub(crate) fn key_of(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
