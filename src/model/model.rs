use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde_json::{Map, Value};

use super::path::{self, KeyPath};
use super::{into_attributes, key_of, Attributes, Schema};
use crate::collection::{Collection, CollectionInner};
use crate::error::ConfigError;
use crate::events::{Event, Events, Observable};
use crate::options::SetOptions;

static NEXT_CID: AtomicU64 = AtomicU64::new(1);

/// Bookkeeping for the mutation batch currently in flight.
///
/// `depth` counts nested `set` calls; only the outermost one (depth 1)
/// snapshots `previous` and drains `pending` into trailing `change` events.
#[derive(Debug, Default)]
struct ChangeBatch {
    depth: usize,
    pending: bool,
}

impl ChangeBatch {
    /// Returns true when this call opens the batch.
    fn enter(&mut self) -> bool {
        self.depth += 1;
        self.depth == 1
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        if self.depth == 0 {
            self.pending = false;
        }
    }

    fn is_open(&self) -> bool {
        self.depth > 0
    }

    fn take_pending(&mut self) -> bool {
        std::mem::take(&mut self.pending)
    }
}

/// Leaves the change batch on drop, so a panicking listener cannot keep it open.
struct BatchGuard<'a> {
    state: &'a RwLock<ModelState>,
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        self.state.write().batch.leave();
    }
}

#[derive(Default)]
struct ModelState {
    attributes: Attributes,
    previous: Attributes,
    changed: Attributes,
    server: Attributes,
    id: Option<Value>,
    validation_error: Option<Value>,
    batch: ChangeBatch,
}

impl ModelState {
    /// Apply top-level keys; returns the keys whose value actually moved.
    fn apply_flat(&mut self, attrs: &Attributes, unset: bool) -> Vec<String> {
        let mut changes = Vec::new();
        for (key, value) in attrs {
            let incoming = if unset { None } else { Some(value) };
            if self.attributes.get(key) != incoming {
                changes.push(key.clone());
            }
            if self.previous.get(key) != incoming {
                self.changed
                    .insert(key.clone(), incoming.cloned().unwrap_or(Value::Null));
            } else {
                self.changed.shift_remove(key);
            }
            if unset {
                self.attributes.shift_remove(key);
            } else {
                self.attributes.insert(key.clone(), value.clone());
            }
        }
        changes
    }

    /// Path-keyed counterpart of `apply_flat`.
    fn apply_deep(&mut self, attrs: &Attributes, unset: bool) -> Vec<KeyPath> {
        let mut changes = Vec::new();
        for (raw, value) in path::flatten(attrs) {
            let key = KeyPath::parse(&raw);
            let segments = key.segments();
            let incoming = if unset { None } else { Some(&value) };
            if path::get(&self.attributes, segments) != incoming {
                changes.push(key.clone());
            }
            if path::get(&self.previous, segments) != incoming {
                path::set(
                    &mut self.changed,
                    segments,
                    incoming.cloned().unwrap_or(Value::Null),
                );
            } else {
                path::remove(&mut self.changed, segments, true);
            }
            if unset {
                path::remove(&mut self.attributes, segments, false);
            } else {
                path::set(&mut self.attributes, segments, value.clone());
            }
        }
        changes
    }

    fn flat_notices(&self, changes: Vec<String>) -> Vec<(String, Value)> {
        changes
            .into_iter()
            .map(|key| {
                let value = self.attributes.get(&key).cloned().unwrap_or(Value::Null);
                (format!("change:{}", key), value)
            })
            .collect()
    }

    /// `change:<path>` for each changed leaf plus `change:<ancestor>.*` for
    /// every ancestor, each name at most once per call.
    fn deep_notices(&self, changes: Vec<KeyPath>) -> Vec<(String, Value)> {
        let mut seen = HashSet::new();
        let mut notices = Vec::new();
        for key in &changes {
            if seen.insert(key.as_str().to_string()) {
                let value = path::get(&self.attributes, key.segments())
                    .cloned()
                    .unwrap_or(Value::Null);
                notices.push((format!("change:{}", key.as_str()), value));
            }
            for (parent, wildcard) in key.wildcard_ancestors() {
                if seen.insert(wildcard.clone()) {
                    let value = path::get(&self.attributes, parent)
                        .cloned()
                        .unwrap_or(Value::Null);
                    notices.push((format!("change:{}", wildcard), value));
                }
            }
        }
        notices
    }

    fn lookup(&self, map: &Attributes, key: &str, deep: bool) -> Option<Value> {
        if deep {
            path::get(map, KeyPath::parse(key).segments()).cloned()
        } else {
            map.get(key).cloned()
        }
    }
}

struct ModelInner {
    cid: String,
    schema: Schema,
    events: Events,
    state: RwLock<ModelState>,
    collection: RwLock<Weak<CollectionInner>>,
    memberships: RwLock<Vec<Weak<CollectionInner>>>,
}

/// An observable, versioned attribute map.
///
/// `Model` is a handle: clones share the same state, and equality is
/// identity.
#[derive(Clone)]
pub struct Model {
    inner: Arc<ModelInner>,
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Model {}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("Model")
            .field("cid", &self.inner.cid)
            .field("id", &state.id)
            .field("attributes", &state.attributes)
            .finish()
    }
}

impl Observable for Model {
    fn events(&self) -> &Events {
        &self.inner.events
    }

    /// Every `sync` also refreshes the server snapshot before listeners run.
    fn trigger(&self, event: &Event) {
        if event.name == "sync" {
            let mut state = self.inner.state.write();
            state.server = state.attributes.clone();
        }
        self.inner.events.trigger(event)
    }
}

impl Model {
    /// A model with the default schema.
    pub fn new(attrs: Value) -> Self {
        Self::with_schema(Schema::default(), attrs, &SetOptions::new())
    }

    pub fn with_schema(schema: Schema, attrs: Value, options: &SetOptions) -> Self {
        Self::build(schema, attrs, options, None)
    }

    pub(crate) fn build(
        schema: Schema,
        attrs: Value,
        options: &SetOptions,
        collection: Option<&Collection>,
    ) -> Self {
        let cid = format!("c{}", NEXT_CID.fetch_add(1, Ordering::Relaxed));
        let model = Model {
            inner: Arc::new(ModelInner {
                cid,
                schema,
                events: Events::new(),
                state: RwLock::new(ModelState::default()),
                collection: RwLock::new(Weak::new()),
                memberships: RwLock::new(Vec::new()),
            }),
        };
        if let Some(collection) = collection {
            model.attach_to(collection);
        }

        let raw = if options.parse {
            model.schema().parse(attrs)
        } else {
            attrs
        };
        let attrs = model.schema().with_defaults(into_attributes(raw));
        let initial = SetOptions {
            parse: false,
            ..options.clone()
        };
        model.set(Value::Object(attrs), &initial);
        model.inner.state.write().changed = Map::new();

        for init in model.schema().initializers() {
            init(&model);
        }

        tracing::trace!(cid = %model.cid(), schema = %model.schema().name(), "model created");
        model
    }

    pub fn cid(&self) -> &str {
        &self.inner.cid
    }

    pub fn schema(&self) -> &Schema {
        &self.inner.schema
    }

    pub fn id(&self) -> Option<Value> {
        self.inner.state.read().id.clone()
    }

    /// The id as an index key (strings verbatim, numbers in decimal).
    pub fn id_key(&self) -> Option<String> {
        self.inner.state.read().id.as_ref().and_then(key_of)
    }

    /// A model without a value in its id attribute has never been persisted.
    pub fn is_new(&self) -> bool {
        !self.has(self.schema().id_attribute())
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let state = self.inner.state.read();
        state.lookup(&state.attributes, key, self.schema().is_deep())
    }

    /// True when `key` holds a non-null value.
    pub fn has(&self, key: &str) -> bool {
        self.get(key).map(|v| !v.is_null()).unwrap_or(false)
    }

    /// HTML-escaped string form of an attribute.
    pub fn escape(&self, key: &str) -> String {
        let text = match self.get(key) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
        };
        escape_html(&text)
    }

    pub fn attributes(&self) -> Attributes {
        self.inner.state.read().attributes.clone()
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.attributes())
    }

    pub fn set_key(&self, key: &str, value: Value, options: &SetOptions) -> bool {
        let mut attrs = Map::new();
        attrs.insert(key.to_string(), value);
        self.set(Value::Object(attrs), options)
    }

    /// Merge `attrs` into the model.
    ///
    /// Returns false, with nothing applied, when validation rejects the
    /// change. Reentrant calls from change listeners join the batch that is
    /// already in flight; the outermost call fires one trailing `change` per
    /// wave of pending changes.
    pub fn set(&self, attrs: Value, options: &SetOptions) -> bool {
        let attrs = into_attributes(attrs);
        if !self.run_validation(&attrs, options) {
            return false;
        }

        let deep = self.schema().is_deep();
        let id_attribute = self.schema().id_attribute();

        let (outermost, id_moved, notices) = {
            let mut state = self.inner.state.write();
            let outermost = state.batch.enter();
            if outermost {
                state.previous = state.attributes.clone();
                state.changed = Map::new();
            }

            let touches_id = attrs.contains_key(id_attribute);
            let notices = if deep {
                let changes = state.apply_deep(&attrs, options.unset);
                if !options.silent && !changes.is_empty() {
                    state.batch.pending = true;
                }
                state.deep_notices(changes)
            } else {
                let changes = state.apply_flat(&attrs, options.unset);
                if !options.silent && !changes.is_empty() {
                    state.batch.pending = true;
                }
                state.flat_notices(changes)
            };
            let mut id_moved = false;
            if touches_id {
                let id = state
                    .attributes
                    .get(id_attribute)
                    .filter(|v| !v.is_null())
                    .cloned();
                id_moved = id != state.id;
                state.id = id;
            }

            (
                outermost,
                id_moved,
                if options.silent { Vec::new() } else { notices },
            )
        };
        let guard = BatchGuard {
            state: &self.inner.state,
        };

        if id_moved {
            for collection in self.memberships() {
                collection.reindex(self);
            }
        }

        for (name, value) in notices {
            self.trigger(&Event::new(name).with_model(self).with_value(value));
        }

        if !outermost {
            return true;
        }

        if !options.silent {
            while self.take_pending() {
                self.trigger(&Event::new("change").with_model(self));
            }
        }

        drop(guard);
        tracing::trace!(cid = %self.cid(), "change batch closed");
        true
    }

    fn take_pending(&self) -> bool {
        self.inner.state.write().batch.take_pending()
    }

    pub fn unset(&self, key: &str, options: &SetOptions) -> bool {
        let options = SetOptions {
            unset: true,
            ..options.clone()
        };
        self.set_key(key, Value::Null, &options)
    }

    /// Unset every key (every leaf path for deep schemas) in one batch.
    pub fn clear(&self, options: &SetOptions) -> bool {
        let keys: Attributes = {
            let state = self.inner.state.read();
            let source = if self.schema().is_deep() {
                path::flatten(&state.attributes)
            } else {
                state.attributes.clone()
            };
            source.into_iter().map(|(k, _)| (k, Value::Null)).collect()
        };
        let options = SetOptions {
            unset: true,
            ..options.clone()
        };
        self.set(Value::Object(keys), &options)
    }

    /// Whether anything (or `key`) changed in the last batch.
    pub fn has_changed(&self, key: Option<&str>) -> bool {
        let state = self.inner.state.read();
        match key {
            None => !state.changed.is_empty(),
            Some(key) => state
                .lookup(&state.changed, key, self.schema().is_deep())
                .is_some(),
        }
    }

    /// Without `diff`: the last batch's changes, or `None` when nothing
    /// changed. With `diff`: the entries of `diff` that differ from the
    /// model's attributes (batch-start attributes while a batch is open).
    pub fn changed_attributes(&self, diff: Option<&Value>) -> Option<Attributes> {
        let state = self.inner.state.read();
        let deep = self.schema().is_deep();

        let Some(diff) = diff else {
            if state.changed.is_empty() {
                return None;
            }
            return Some(if deep {
                path::flatten(&state.changed)
            } else {
                state.changed.clone()
            });
        };

        let old = if state.batch.is_open() {
            &state.previous
        } else {
            &state.attributes
        };
        let diff = into_attributes(diff.clone());
        let (diff, old) = if deep {
            (path::flatten(&diff), path::flatten(old))
        } else {
            (diff, old.clone())
        };

        let changed: Attributes = diff
            .into_iter()
            .filter(|(key, value)| old.get(key) != Some(value))
            .collect();
        if changed.is_empty() {
            None
        } else {
            Some(changed)
        }
    }

    /// The raw change map recorded by the last batch.
    pub fn changed(&self) -> Attributes {
        self.inner.state.read().changed.clone()
    }

    pub fn previous(&self, key: &str) -> Option<Value> {
        let state = self.inner.state.read();
        state.lookup(&state.previous, key, self.schema().is_deep())
    }

    pub fn previous_attributes(&self) -> Attributes {
        self.inner.state.read().previous.clone()
    }

    /// Attributes as of the last `sync` event.
    pub fn server_attributes(&self) -> Attributes {
        self.inner.state.read().server.clone()
    }

    pub fn validation_error(&self) -> Option<Value> {
        self.inner.state.read().validation_error.clone()
    }

    pub(crate) fn set_validation_error(&self, error: Option<Value>) {
        self.inner.state.write().validation_error = error;
    }

    /// Validate the current attributes, firing `invalid` on failure.
    pub fn is_valid(&self) -> bool {
        self.run_validation(&Map::new(), &SetOptions::new().validate())
    }

    /// Runs the schema validator over the attributes as they would be after
    /// applying `attrs`.
    pub(crate) fn run_validation(&self, attrs: &Attributes, options: &SetOptions) -> bool {
        if !options.validate || !self.schema().has_validator() {
            return true;
        }

        let candidate = {
            let state = self.inner.state.read();
            let mut candidate = state.attributes.clone();
            if self.schema().is_deep() {
                for (raw, value) in path::flatten(attrs) {
                    let key = KeyPath::parse(&raw);
                    if options.unset {
                        path::remove(&mut candidate, key.segments(), false);
                    } else {
                        path::set(&mut candidate, key.segments(), value);
                    }
                }
            } else {
                for (key, value) in attrs {
                    if options.unset {
                        candidate.shift_remove(key);
                    } else {
                        candidate.insert(key.clone(), value.clone());
                    }
                }
            }
            candidate
        };

        let error = self.schema().validate(&candidate, options);
        self.set_validation_error(error.clone());
        match error {
            None => true,
            Some(error) => {
                tracing::warn!(cid = %self.cid(), %error, "validation failed");
                self.trigger(&Event::new("invalid").with_model(self).with_value(error));
                false
            }
        }
    }

    /// A new model with the same schema and attributes and a fresh cid.
    pub fn clone_model(&self) -> Model {
        Model::with_schema(self.schema().clone(), self.to_json(), &SetOptions::new())
    }

    /// The collection this model was first added to, if it is still alive.
    pub fn collection(&self) -> Option<Collection> {
        self.inner
            .collection
            .read()
            .upgrade()
            .map(Collection::from_inner)
    }

    /// Record `collection` as owner unless the model already has a live one.
    pub(crate) fn attach_to(&self, collection: &Collection) {
        let mut owner = self.inner.collection.write();
        if owner.upgrade().is_none() {
            *owner = collection.downgrade();
        }
    }

    pub(crate) fn detach_from(&self, collection: &Collection) {
        let mut owner = self.inner.collection.write();
        if let Some(current) = owner.upgrade() {
            if Collection::from_inner(current).same_as(collection) {
                *owner = Weak::new();
            }
        }
    }

    /// Collections currently holding this model, whose id index follows it.
    pub(crate) fn enroll(&self, collection: &Collection) {
        let mut memberships = self.inner.memberships.write();
        memberships.retain(|c| c.strong_count() > 0);
        memberships.push(collection.downgrade());
    }

    pub(crate) fn unenroll(&self, collection: &Collection) {
        let target = collection.downgrade();
        self.inner
            .memberships
            .write()
            .retain(|c| c.strong_count() > 0 && !c.ptr_eq(&target));
    }

    fn memberships(&self) -> Vec<Collection> {
        self.inner
            .memberships
            .read()
            .iter()
            .filter_map(Weak::upgrade)
            .map(Collection::from_inner)
            .collect()
    }

    /// Drop every listener on this model and every `listen_to` it holds.
    pub(crate) fn orphan(&self) {
        self.inner.events.off(None, None);
        self.inner.events.stop_listening(None);
    }

    /// Resource URL: `url_root` (or the owning collection's `url`), plus the
    /// url-encoded id once the model is persisted.
    pub fn url(&self) -> Result<String, ConfigError> {
        let base = match self.schema().url_root() {
            Some(root) => root.to_string(),
            None => self
                .collection()
                .and_then(|c| c.url())
                .ok_or(ConfigError::MissingUrl)?,
        };
        if self.is_new() {
            return Ok(base);
        }
        let id = self
            .get(self.schema().id_attribute())
            .as_ref()
            .and_then(key_of)
            .unwrap_or_default();
        let separator = if base.ends_with('/') { "" } else { "/" };
        Ok(format!("{}{}{}", base, separator, urlencoding::encode(&id)))
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '`' => out.push_str("&#x60;"),
            c => out.push(c),
        }
    }
    out
}
