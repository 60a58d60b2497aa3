//! Schema - the shared configuration every model of one kind is built from.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use super::{path, Attributes, Model};
use crate::options::SetOptions;
use crate::sync::Transport;

pub type Validator = Arc<dyn Fn(&Attributes, &SetOptions) -> Option<Value> + Send + Sync>;
pub type Parser = Arc<dyn Fn(Value) -> Value + Send + Sync>;
pub type Initializer = Arc<dyn Fn(&Model) + Send + Sync>;

struct SchemaInner {
    name: String,
    defaults: Attributes,
    id_attribute: String,
    url_root: Option<String>,
    validate: Option<Validator>,
    parse: Option<Parser>,
    transport: Option<Arc<dyn Transport>>,
    deep: bool,
    initializers: Vec<Initializer>,
}

/// Immutable, cheaply cloned description of a model kind.
///
/// Collections hold one to build members from bare attribute maps.
#[derive(Clone)]
pub struct Schema {
    inner: Arc<SchemaInner>,
}

impl Default for Schema {
    fn default() -> Self {
        Schema::builder("model").build()
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.inner.name)
            .field("id_attribute", &self.inner.id_attribute)
            .field("url_root", &self.inner.url_root)
            .field("deep", &self.inner.deep)
            .field("initializers", &self.inner.initializers.len())
            .finish()
    }
}

impl Schema {
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn id_attribute(&self) -> &str {
        &self.inner.id_attribute
    }

    pub fn url_root(&self) -> Option<&str> {
        self.inner.url_root.as_deref()
    }

    pub fn is_deep(&self) -> bool {
        self.inner.deep
    }

    pub fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.inner.transport.clone()
    }

    pub fn has_validator(&self) -> bool {
        self.inner.validate.is_some()
    }

    /// Build a model of this kind from `attrs`.
    pub fn create(&self, attrs: Value) -> Model {
        Model::with_schema(self.clone(), attrs, &SetOptions::new())
    }

    pub(crate) fn validate(&self, attrs: &Attributes, options: &SetOptions) -> Option<Value> {
        self.inner
            .validate
            .as_ref()
            .and_then(|validate| validate(attrs, options))
    }

    pub(crate) fn parse(&self, response: Value) -> Value {
        match &self.inner.parse {
            Some(parse) => parse(response),
            None => response,
        }
    }

    /// Defaults with `attrs` laid over them; deep schemas merge recursively.
    pub(crate) fn with_defaults(&self, attrs: Attributes) -> Attributes {
        let mut merged = self.inner.defaults.clone();
        if self.inner.deep {
            path::deep_merge(&mut merged, &attrs);
        } else {
            merged.extend(attrs);
        }
        merged
    }

    pub(crate) fn initializers(&self) -> &[Initializer] {
        &self.inner.initializers
    }
}

/// Builder for [`Schema`].
pub struct SchemaBuilder {
    name: String,
    defaults: Attributes,
    id_attribute: String,
    url_root: Option<String>,
    validate: Option<Validator>,
    parse: Option<Parser>,
    transport: Option<Arc<dyn Transport>>,
    deep: bool,
    initializers: Vec<Initializer>,
}

impl SchemaBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            defaults: Map::new(),
            id_attribute: "id".to_string(),
            url_root: None,
            validate: None,
            parse: None,
            transport: None,
            deep: false,
            initializers: Vec::new(),
        }
    }

    pub fn defaults(mut self, defaults: Value) -> Self {
        if let Value::Object(map) = defaults {
            self.defaults = map;
        }
        self
    }

    pub fn id_attribute(mut self, name: impl Into<String>) -> Self {
        self.id_attribute = name.into();
        self
    }

    pub fn url_root(mut self, url: impl Into<String>) -> Self {
        self.url_root = Some(url.into());
        self
    }

    /// Validation hook. Returning `Some(error)` rejects the mutation.
    pub fn validate<F>(mut self, validate: F) -> Self
    where
        F: Fn(&Attributes, &SetOptions) -> Option<Value> + Send + Sync + 'static,
    {
        self.validate = Some(Arc::new(validate));
        self
    }

    /// Converts a raw server response into an attribute map.
    pub fn parse<F>(mut self, parse: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.parse = Some(Arc::new(parse));
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Treat keys as dot-delimited paths into nested objects.
    pub fn deep(mut self) -> Self {
        self.deep = true;
        self
    }

    /// Append an initializer. Initializers run once per model, after the
    /// initial attributes are applied, in the order they were added.
    pub fn initializer<F>(mut self, init: F) -> Self
    where
        F: Fn(&Model) + Send + Sync + 'static,
    {
        self.initializers.push(Arc::new(init));
        self
    }

    pub fn build(self) -> Schema {
        Schema {
            inner: Arc::new(SchemaInner {
                name: self.name,
                defaults: self.defaults,
                id_attribute: self.id_attribute,
                url_root: self.url_root,
                validate: self.validate,
                parse: self.parse,
                transport: self.transport,
                deep: self.deep,
                initializers: self.initializers,
            }),
        }
    }
}
