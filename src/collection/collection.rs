use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde_json::{json, Value};

use super::{Comparator, Lookup, Member, Members};
use crate::error::ConfigError;
use crate::events::{Event, Events, ListenerId, Observable, ALL};
use crate::model::{key_of, Model, Parser, Schema};
use crate::options::{CollectionSetOptions, SetOptions};
use crate::sync::{HeaderPageMeta, PageMeta, PageMetaExtractor, Transport};

pub(super) struct CollectionConfig {
    pub(super) schema: Schema,
    pub(super) url: Option<String>,
    pub(super) parse: Option<Parser>,
    pub(super) transport: Option<Arc<dyn Transport>>,
    pub(super) page_meta: Arc<dyn PageMetaExtractor>,
}

#[derive(Default)]
pub(super) struct CollectionState {
    pub(super) models: Vec<Model>,
    /// Dual index: every member under its cid, and under its id key if any.
    by_id: HashMap<String, Model>,
    /// cid -> id key the member is currently indexed under.
    id_keys: HashMap<String, String>,
    /// cid -> relay listener registered on the member.
    relays: HashMap<String, ListenerId>,
    pub(super) meta: PageMeta,
    previous_models: Vec<Model>,
}

pub(crate) struct CollectionInner {
    events: Events,
    pub(super) config: CollectionConfig,
    pub(super) state: RwLock<CollectionState>,
    comparator: RwLock<Option<Comparator>>,
    pub(super) paging: AtomicBool,
}

/// An ordered, uniquely indexed set of models.
///
/// Member events are relayed onto the collection. Like `Model`, this is a
/// shared handle and equality is identity.
#[derive(Clone)]
pub struct Collection {
    pub(super) inner: Arc<CollectionInner>,
}

impl PartialEq for Collection {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl Eq for Collection {}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("Collection")
            .field("schema", &self.inner.config.schema.name())
            .field("url", &self.inner.config.url)
            .field("len", &state.models.len())
            .finish()
    }
}

impl Observable for Collection {
    fn events(&self) -> &Events {
        &self.inner.events
    }
}

impl Default for Collection {
    fn default() -> Self {
        Collection::builder().build()
    }
}

impl Collection {
    pub fn builder() -> CollectionBuilder {
        CollectionBuilder::default()
    }

    /// A collection of default-schema models seeded silently from `models`.
    pub fn new(models: impl Into<Members>) -> Self {
        Collection::builder().models(models).build()
    }

    pub(crate) fn from_inner(inner: Arc<CollectionInner>) -> Self {
        Collection { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<CollectionInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn same_as(&self, other: &Collection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn schema(&self) -> &Schema {
        &self.inner.config.schema
    }

    pub fn url(&self) -> Option<String> {
        self.inner.config.url.clone()
    }

    pub(crate) fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.inner
            .config
            .transport
            .clone()
            .or_else(|| self.schema().transport())
    }

    pub fn comparator(&self) -> Option<Comparator> {
        self.inner.comparator.read().clone()
    }

    pub fn set_comparator(&self, comparator: Option<Comparator>) {
        *self.inner.comparator.write() = comparator;
    }

    /// Pagination state from the last fetched response.
    pub fn meta(&self) -> PageMeta {
        self.inner.state.read().meta.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.state.read().models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn models(&self) -> Vec<Model> {
        self.inner.state.read().models.clone()
    }

    /// Number of entries in the id/cid index.
    pub fn index_size(&self) -> usize {
        self.inner.state.read().by_id.len()
    }

    /// Members held before the last `reset`.
    pub fn previous_models(&self) -> Vec<Model> {
        self.inner.state.read().previous_models.clone()
    }

    pub fn at(&self, index: usize) -> Option<Model> {
        self.inner.state.read().models.get(index).cloned()
    }

    /// Look a member up by id value, cid or model.
    pub fn get(&self, target: impl Into<Lookup>) -> Option<Model> {
        let state = self.inner.state.read();
        match target.into() {
            Lookup::Key(key) => state.by_id.get(&key).cloned(),
            Lookup::Model(model) => model
                .id_key()
                .and_then(|key| state.by_id.get(&key))
                .or_else(|| state.by_id.get(model.cid()))
                .cloned(),
            Lookup::Missing => None,
        }
    }

    pub fn index_of(&self, model: &Model) -> Option<usize> {
        self.inner.state.read().models.iter().position(|m| m == model)
    }

    pub fn contains(&self, model: &Model) -> bool {
        self.index_of(model).is_some()
    }

    /// Each member's value for `attr`, `null` where it is missing.
    pub fn pluck(&self, attr: &str) -> Vec<Value> {
        self.models()
            .iter()
            .map(|m| m.get(attr).unwrap_or(Value::Null))
            .collect()
    }

    pub fn filter<F>(&self, predicate: F) -> Vec<Model>
    where
        F: Fn(&Model) -> bool,
    {
        self.models().into_iter().filter(|m| predicate(m)).collect()
    }

    /// Members whose attributes contain every entry of `attrs`. An empty
    /// `attrs` matches nothing.
    pub fn where_attrs(&self, attrs: &Value) -> Vec<Model> {
        let Some(wanted) = attrs.as_object().filter(|w| !w.is_empty()) else {
            return Vec::new();
        };
        self.filter(|m| wanted.iter().all(|(k, v)| m.get(k).as_ref() == Some(v)))
    }

    pub fn find_where(&self, attrs: &Value) -> Option<Model> {
        self.where_attrs(attrs).into_iter().next()
    }

    pub fn slice(&self, start: usize, end: usize) -> Vec<Model> {
        let state = self.inner.state.read();
        let end = end.min(state.models.len());
        let start = start.min(end);
        state.models[start..end].to_vec()
    }

    pub fn to_json(&self) -> Value {
        Value::Array(self.models().iter().map(Model::to_json).collect())
    }

    /// Add members without removing any. Pass `CollectionSetOptions::adding()`
    /// to skip merging into members that are already held.
    pub fn add(&self, input: impl Into<Members>, options: &CollectionSetOptions) -> Vec<Model> {
        let options = CollectionSetOptions {
            add: true,
            remove: false,
            ..options.clone()
        };
        self.set(input, &options)
    }

    pub fn push(&self, input: impl Into<Members>, options: &CollectionSetOptions) -> Vec<Model> {
        let options = CollectionSetOptions {
            at: Some(self.len()),
            ..options.clone()
        };
        self.add(input, &options)
    }

    pub fn unshift(&self, input: impl Into<Members>, options: &CollectionSetOptions) -> Vec<Model> {
        let options = CollectionSetOptions {
            at: Some(0),
            ..options.clone()
        };
        self.add(input, &options)
    }

    pub fn pop(&self, options: &CollectionSetOptions) -> Option<Model> {
        let last = self.inner.state.read().models.last().cloned()?;
        self.remove(&last, options)
    }

    pub fn shift(&self, options: &CollectionSetOptions) -> Option<Model> {
        let first = self.at(0)?;
        self.remove(&first, options)
    }

    /// Reconcile the collection against `input`.
    ///
    /// Incoming items are matched against held members through the id/cid
    /// index. Matches are kept (and merged into with `options.merge`),
    /// unmatched items become new members (with `options.add`) and, with
    /// `options.remove`, held members that were not matched are removed. New
    /// members are spliced in at `options.at` or appended, then the collection
    /// is re-sorted silently if it has a comparator. Unless silent, `add`
    /// fires on each new member, `sort` fires once if the order changed, and
    /// every held member receives `sync`.
    ///
    /// Returns the models the input resolved to, in input order.
    pub fn set(&self, input: impl Into<Members>, options: &CollectionSetOptions) -> Vec<Model> {
        let mut input = input.into();
        if options.parse {
            if let (Members::Raw(raw), Some(parse)) = (&mut input, &self.inner.config.parse) {
                *raw = parse(std::mem::take(raw));
            }
        }
        let items = input.into_list();

        let comparator = self.comparator();
        let sortable = comparator.is_some() && options.at.is_none() && options.sort;
        let sort_attr = comparator
            .as_ref()
            .and_then(Comparator::sort_attribute)
            .map(str::to_string);
        let track_order = !sortable && options.add && options.remove;
        let model_options = options.model_options();
        let merge_options = SetOptions {
            parse: false,
            ..model_options.clone()
        };
        let id_attribute = self.schema().id_attribute().to_string();

        let mut resolved = Vec::with_capacity(items.len());
        let mut to_add: Vec<Model> = Vec::new();
        let mut kept: HashSet<String> = HashSet::new();
        let mut order: Vec<Model> = Vec::new();
        let mut ordered: HashSet<String> = HashSet::new();
        let mut needs_sort = false;

        for item in items {
            let existing = match &item {
                Member::Model(model) => self.get(model),
                Member::Attrs(attrs) => attrs
                    .get(&id_attribute)
                    .and_then(key_of)
                    .and_then(|key| self.get(key)),
            };

            let model = match existing {
                Some(existing) => {
                    if options.remove {
                        kept.insert(existing.cid().to_string());
                    }
                    if options.merge {
                        let attrs = match item {
                            Member::Model(model) if model == existing => None,
                            Member::Model(model) => Some(model.to_json()),
                            Member::Attrs(attrs) if options.parse => Some(existing.schema().parse(attrs)),
                            Member::Attrs(attrs) => Some(attrs),
                        };
                        if let Some(attrs) = attrs {
                            existing.set(attrs, &merge_options);
                            if sortable && !needs_sort && existing.has_changed(sort_attr.as_deref()) {
                                needs_sort = true;
                            }
                        }
                    }
                    existing
                }
                None if options.add => {
                    let Some(model) = self.prepare_model(item, &model_options) else {
                        continue;
                    };
                    self.add_reference(&model);
                    to_add.push(model.clone());
                    model
                }
                None => continue,
            };

            if track_order && ordered.insert(model.cid().to_string()) {
                order.push(model.clone());
            }
            resolved.push(model);
        }

        if options.remove {
            let stale: Vec<Model> = self
                .inner
                .state
                .read()
                .models
                .iter()
                .filter(|m| !kept.contains(m.cid()))
                .cloned()
                .collect();
            if !stale.is_empty() {
                self.remove_models(&stale, options.silent);
            }
        }

        let mut reordered = false;
        if !to_add.is_empty() || !order.is_empty() {
            if sortable {
                needs_sort = true;
            }
            let mut state = self.inner.state.write();
            match options.at {
                Some(at) => {
                    let at = at.min(state.models.len());
                    let tail = state.models.split_off(at);
                    state.models.extend(to_add.iter().cloned());
                    state.models.extend(tail);
                }
                None if track_order => {
                    let fresh: HashSet<&str> = to_add.iter().map(Model::cid).collect();
                    reordered = order
                        .iter()
                        .filter(|m| !fresh.contains(m.cid()))
                        .ne(state.models.iter());
                    state.models = order;
                }
                None => state.models.extend(to_add.iter().cloned()),
            }
        }

        if needs_sort {
            if let Some(comparator) = &comparator {
                self.sort_with(comparator);
            }
        }

        tracing::debug!(
            added = to_add.len(),
            size = self.len(),
            sorted = needs_sort,
            "collection set"
        );

        if !options.silent {
            for model in &to_add {
                model.trigger(&Event::new("add").with_model(model).with_collection(self));
            }
            if needs_sort || reordered {
                self.trigger(&Event::new("sort").with_collection(self));
            }
            for model in self.models() {
                model.trigger(&Event::new("sync").with_model(&model).with_collection(self));
            }
        }

        resolved
    }

    /// Remove one member; returns it if it was held.
    pub fn remove(&self, target: impl Into<Lookup>, options: &CollectionSetOptions) -> Option<Model> {
        let model = self.get(target)?;
        self.remove_models(std::slice::from_ref(&model), options.silent)
            .pop()
    }

    pub fn remove_many<I, L>(&self, targets: I, options: &CollectionSetOptions) -> Vec<Model>
    where
        I: IntoIterator<Item = L>,
        L: Into<Lookup>,
    {
        let models: Vec<Model> = targets.into_iter().filter_map(|t| self.get(t)).collect();
        self.remove_models(&models, options.silent)
    }

    /// Replace every member with `input` and fire a single `reset`.
    pub fn reset(&self, input: impl Into<Members>, options: &CollectionSetOptions) -> Vec<Model> {
        let previous = self.models();
        for model in &previous {
            self.remove_reference(model);
        }
        {
            let mut state = self.inner.state.write();
            state.models.clear();
            state.by_id.clear();
            state.id_keys.clear();
            state.relays.clear();
            state.previous_models = previous;
        }

        let add = CollectionSetOptions {
            add: true,
            remove: false,
            merge: false,
            silent: true,
            ..options.clone()
        };
        let models = self.set(input, &add);
        if !options.silent {
            self.trigger(&Event::new("reset").with_collection(self));
        }
        models
    }

    /// Re-sort with the configured comparator and fire `sort` unless silent.
    pub fn sort(&self, options: &CollectionSetOptions) -> Result<(), ConfigError> {
        let comparator = self.comparator().ok_or(ConfigError::MissingComparator)?;
        self.sort_with(&comparator);
        if !options.silent {
            self.trigger(&Event::new("sort").with_collection(self));
        }
        Ok(())
    }

    fn sort_with(&self, comparator: &Comparator) {
        let mut models = self.models();
        comparator.sort(&mut models);
        self.inner.state.write().models = models;
    }

    /// Build a member from bare attributes. A model that fails validation is
    /// dropped and reported with `invalid` on the collection.
    pub(super) fn prepare_model(&self, item: Member, options: &SetOptions) -> Option<Model> {
        let attrs = match item {
            Member::Model(model) => return Some(model),
            Member::Attrs(attrs) => attrs,
        };
        let model = Model::build(self.schema().clone(), attrs.clone(), options, Some(self));
        match model.validation_error() {
            None => Some(model),
            Some(error) => {
                tracing::warn!(%error, "dropping invalid member");
                self.trigger(
                    &Event::new("invalid")
                        .with_collection(self)
                        .with_value(json!({ "attributes": attrs, "error": error })),
                );
                None
            }
        }
    }

    fn add_reference(&self, model: &Model) {
        model.attach_to(self);
        model.enroll(self);
        let collection = self.downgrade();
        let relay = model.on(ALL, move |event| {
            if let Some(inner) = collection.upgrade() {
                Collection::from_inner(inner).on_model_event(event);
            }
        });

        let cid = model.cid().to_string();
        let mut state = self.inner.state.write();
        state.by_id.insert(cid.clone(), model.clone());
        if let Some(key) = model.id_key() {
            state.by_id.insert(key.clone(), model.clone());
            state.id_keys.insert(cid.clone(), key);
        }
        state.relays.insert(cid, relay);
        tracing::trace!(cid = %model.cid(), "member indexed");
    }

    /// Sever the back-reference and the relay subscription.
    fn remove_reference(&self, model: &Model) {
        let relay = self.inner.state.write().relays.remove(model.cid());
        model.detach_from(self);
        model.unenroll(self);
        if let Some(relay) = relay {
            model.off(None, Some(relay));
        }
    }

    fn remove_models(&self, models: &[Model], silent: bool) -> Vec<Model> {
        let mut removed = Vec::with_capacity(models.len());
        for model in models {
            let index = {
                let mut state = self.inner.state.write();
                let Some(index) = state.models.iter().position(|m| m == model) else {
                    continue;
                };
                state.models.remove(index);
                state.by_id.remove(model.cid());
                if let Some(key) = state.id_keys.remove(model.cid()) {
                    if state.by_id.get(&key) == Some(model) {
                        state.by_id.remove(&key);
                    }
                }
                index
            };
            if !silent {
                model.trigger(
                    &Event::new("remove")
                        .with_model(model)
                        .with_collection(self)
                        .with_value(json!({ "index": index })),
                );
            }
            self.remove_reference(model);
            tracing::trace!(cid = %model.cid(), index, "member removed");
            removed.push(model.clone());
        }
        removed
    }

    pub(crate) fn reindex(&self, model: &Model) {
        let cid = model.cid().to_string();
        let mut state = self.inner.state.write();
        if let Some(old) = state.id_keys.remove(&cid) {
            if state.by_id.get(&old) == Some(model) {
                state.by_id.remove(&old);
            }
        }
        if let Some(key) = model.id_key() {
            state.by_id.insert(key.clone(), model.clone());
            state.id_keys.insert(cid, key);
        }
        tracing::trace!(cid = %model.cid(), id = ?model.id(), "member re-indexed");
    }

    /// Relay for every event a member fires. Reconciliation `sync`
    /// broadcasts (those carrying a collection) are not echoed.
    fn on_model_event(&self, event: &Event) {
        match event.name.as_str() {
            "add" | "remove" if !event.is_for(self) => return,
            "sync" if event.collection.is_some() => return,
            _ => {}
        }
        if let Some(model) = &event.model {
            if event.name == "destroy" {
                self.remove(model, &CollectionSetOptions::new());
            }
        }
        self.trigger(event);
    }
}

/// Builder for [`Collection`].
pub struct CollectionBuilder {
    schema: Schema,
    url: Option<String>,
    comparator: Option<Comparator>,
    parse: Option<Parser>,
    transport: Option<Arc<dyn Transport>>,
    page_meta: Arc<dyn PageMetaExtractor>,
    models: Option<Members>,
}

impl Default for CollectionBuilder {
    fn default() -> Self {
        Self {
            schema: Schema::default(),
            url: None,
            comparator: None,
            parse: None,
            transport: None,
            page_meta: Arc::new(HeaderPageMeta),
            models: None,
        }
    }
}

impl CollectionBuilder {
    /// The schema members are built from.
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn comparator(mut self, comparator: Comparator) -> Self {
        self.comparator = Some(comparator);
        self
    }

    /// Converts a raw fetch response into member data.
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

    pub fn page_meta(mut self, extractor: Arc<dyn PageMetaExtractor>) -> Self {
        self.page_meta = extractor;
        self
    }

    /// Initial members, added silently.
    pub fn models(mut self, models: impl Into<Members>) -> Self {
        self.models = Some(models.into());
        self
    }

    pub fn build(self) -> Collection {
        let collection = Collection {
            inner: Arc::new(CollectionInner {
                events: Events::new(),
                config: CollectionConfig {
                    schema: self.schema,
                    url: self.url,
                    parse: self.parse,
                    transport: self.transport,
                    page_meta: self.page_meta,
                },
                state: RwLock::new(CollectionState::default()),
                comparator: RwLock::new(self.comparator),
                paging: AtomicBool::new(false),
            }),
        };
        if let Some(models) = self.models {
            collection.reset(models, &CollectionSetOptions::new().silent());
        }
        collection
    }
}
