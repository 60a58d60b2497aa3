use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The record built for every dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    #[serde(rename = "type")]
    pub action_type: String,
    /// `store` in `"store:action"`; absent for broadcasts.
    pub store_key: Option<String>,
    /// `action` in `"store:action"`; absent for broadcasts.
    pub action_id: Option<String>,
    /// Allocation order; strictly increasing for a dispatcher's lifetime.
    pub index: u64,
    pub payload: Value,
}

impl Action {
    pub fn new(action_type: impl Into<String>, index: u64, payload: Value) -> Self {
        let action_type = action_type.into();
        let (store_key, action_id) = match action_type.split_once(':') {
            Some((store, action)) => (Some(store.to_string()), Some(action.to_string())),
            None => (None, None),
        };
        Self {
            action_type,
            store_key,
            action_id,
            index,
            payload,
        }
    }

    /// True for `"store:action"` types, which route to one handler.
    pub fn is_specific(&self) -> bool {
        self.store_key.is_some()
    }
}
