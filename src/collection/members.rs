use serde_json::Value;

use crate::model::{key_of, Model};

/// One item handed to `set`/`add`/`reset`.
#[derive(Debug, Clone)]
pub enum Member {
    Model(Model),
    Attrs(Value),
}

/// Input to the reconciliation calls: raw JSON (an array, a single object or
/// null) or an explicit list of members.
#[derive(Debug, Clone)]
pub enum Members {
    Raw(Value),
    List(Vec<Member>),
}

impl Members {
    /// Flattens into individual members. Raw arrays are split; null is empty.
    pub(crate) fn into_list(self) -> Vec<Member> {
        match self {
            Members::List(list) => list,
            Members::Raw(Value::Null) => Vec::new(),
            Members::Raw(Value::Array(items)) => items.into_iter().map(Member::Attrs).collect(),
            Members::Raw(item) => vec![Member::Attrs(item)],
        }
    }
}

impl From<Value> for Members {
    fn from(value: Value) -> Self {
        Members::Raw(value)
    }
}

impl From<Model> for Members {
    fn from(model: Model) -> Self {
        Members::List(vec![Member::Model(model)])
    }
}

impl From<&Model> for Members {
    fn from(model: &Model) -> Self {
        Members::List(vec![Member::Model(model.clone())])
    }
}

impl From<Vec<Model>> for Members {
    fn from(models: Vec<Model>) -> Self {
        Members::List(models.into_iter().map(Member::Model).collect())
    }
}

impl From<Vec<Value>> for Members {
    fn from(items: Vec<Value>) -> Self {
        Members::List(items.into_iter().map(Member::Attrs).collect())
    }
}

impl From<Vec<Member>> for Members {
    fn from(list: Vec<Member>) -> Self {
        Members::List(list)
    }
}

/// What `get` and `remove` accept: an id value, a cid, or a model.
#[derive(Debug, Clone)]
pub enum Lookup {
    Key(String),
    Model(Model),
    Missing,
}

impl From<&str> for Lookup {
    fn from(key: &str) -> Self {
        Lookup::Key(key.to_string())
    }
}

impl From<String> for Lookup {
    fn from(key: String) -> Self {
        Lookup::Key(key)
    }
}

impl From<i32> for Lookup {
    fn from(id: i32) -> Self {
        Lookup::Key(id.to_string())
    }
}

impl From<i64> for Lookup {
    fn from(id: i64) -> Self {
        Lookup::Key(id.to_string())
    }
}

impl From<u64> for Lookup {
    fn from(id: u64) -> Self {
        Lookup::Key(id.to_string())
    }
}

impl From<&Value> for Lookup {
    fn from(id: &Value) -> Self {
        key_of(id).map(Lookup::Key).unwrap_or(Lookup::Missing)
    }
}

impl From<Value> for Lookup {
    fn from(id: Value) -> Self {
        Lookup::from(&id)
    }
}

impl From<&Model> for Lookup {
    fn from(model: &Model) -> Self {
        Lookup::Model(model.clone())
    }
}

impl From<Model> for Lookup {
    fn from(model: Model) -> Self {
        Lookup::Model(model)
    }
}
