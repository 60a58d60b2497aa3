use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::model::Model;

pub type SortKey = Arc<dyn Fn(&Model) -> Value + Send + Sync>;
pub type CompareFn = Arc<dyn Fn(&Model, &Model) -> Ordering + Send + Sync>;

/// How a collection keeps its models ordered.
///
/// All three forms sort stably: models that compare equal keep their
/// relative insertion order.
#[derive(Clone)]
pub enum Comparator {
    /// Ascending by one attribute.
    Attribute(String),
    /// Ascending by a derived key.
    SortBy(SortKey),
    /// A direct two-model comparison.
    Compare(CompareFn),
}

impl fmt::Debug for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparator::Attribute(name) => f.debug_tuple("Attribute").field(name).finish(),
            Comparator::SortBy(_) => f.write_str("SortBy(..)"),
            Comparator::Compare(_) => f.write_str("Compare(..)"),
        }
    }
}

impl Comparator {
    pub fn attribute(name: impl Into<String>) -> Self {
        Comparator::Attribute(name.into())
    }

    pub fn sort_by<F>(key: F) -> Self
    where
        F: Fn(&Model) -> Value + Send + Sync + 'static,
    {
        Comparator::SortBy(Arc::new(key))
    }

    pub fn compare<F>(compare: F) -> Self
    where
        F: Fn(&Model, &Model) -> Ordering + Send + Sync + 'static,
    {
        Comparator::Compare(Arc::new(compare))
    }

    /// The attribute whose change forces a re-sort, for attribute comparators.
    pub fn sort_attribute(&self) -> Option<&str> {
        match self {
            Comparator::Attribute(name) => Some(name),
            _ => None,
        }
    }

    pub(crate) fn sort(&self, models: &mut Vec<Model>) {
        match self {
            Comparator::Attribute(name) => {
                sort_by_key(models, |m| m.get(name).unwrap_or(Value::Null))
            }
            Comparator::SortBy(key) => sort_by_key(models, |m| key(m)),
            Comparator::Compare(compare) => models.sort_by(|a, b| compare(a, b)),
        }
    }
}

/// Decorate, stable-sort, undecorate; the key runs once per model.
fn sort_by_key(models: &mut Vec<Model>, key: impl Fn(&Model) -> Value) {
    let mut keyed: Vec<(Value, Model)> = models.drain(..).map(|m| (key(&m), m)).collect();
    keyed.sort_by(|(a, _), (b, _)| compare_values(a, b));
    models.extend(keyed.into_iter().map(|(_, m)| m));
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values: null < bool < number < string < array <
/// object. Objects compare equal to each other.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => {
            let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Array(a), Value::Array(b)) => a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| compare_values(x, y))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or_else(|| a.len().cmp(&b.len())),
        (a, b) => rank(a).cmp(&rank(b)),
    }
}
