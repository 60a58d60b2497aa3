use serde_json::Value;

use crate::collection::Collection;
use crate::model::Model;

/// A single notification delivered to listeners.
///
/// `value` carries whatever the event is about: the new attribute value for
/// `change:<key>`, the error for `invalid`, the response body for `sync`,
/// the removal index for `remove`.
#[derive(Debug, Clone)]
pub struct Event {
    pub name: String,
    pub model: Option<Model>,
    pub collection: Option<Collection>,
    pub value: Value,
}

impl Event {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: None,
            collection: None,
            value: Value::Null,
        }
    }

    pub fn with_model(mut self, model: &Model) -> Self {
        self.model = Some(model.clone());
        self
    }

    pub fn with_collection(mut self, collection: &Collection) -> Self {
        self.collection = Some(collection.clone());
        self
    }

    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = value.into();
        self
    }

    /// True when this event names `collection` as its collection.
    pub fn is_for(&self, collection: &Collection) -> bool {
        self.collection
            .as_ref()
            .map(|c| c.same_as(collection))
            .unwrap_or(false)
    }
}
