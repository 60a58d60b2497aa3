//! Collection-level sync: `fetch`, `create` and sequential page merging.

use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;

use super::{Collection, Member, Members};
use crate::error::{ConfigError, SyncError};
use crate::events::{Event, Observable};
use crate::model::Model;
use crate::options::{CollectionSetOptions, FetchOptions, SaveOptions, SetOptions};
use crate::sync::{Method, SyncRequest, SyncResponse, SyncTarget};

/// Holds the collection's paging flag for the duration of a page fetch.
struct PageGuard<'a> {
    paging: &'a AtomicBool,
}

impl<'a> PageGuard<'a> {
    fn acquire(paging: &'a AtomicBool) -> Option<Self> {
        paging
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| PageGuard { paging })
    }
}

impl Drop for PageGuard<'_> {
    fn drop(&mut self) {
        self.paging.store(false, Ordering::Release);
    }
}

impl Collection {
    async fn read(&self, query: Vec<(String, String)>) -> Result<SyncResponse, SyncError> {
        let transport = self
            .transport()
            .ok_or_else(|| ConfigError::MissingTransport(self.schema().name().to_string()))?;
        let url = self.url().ok_or(ConfigError::MissingUrl)?;

        tracing::debug!(%url, ?query, "collection fetch");
        self.trigger(
            &Event::new("request")
                .with_collection(self)
                .with_value(Method::Read.as_str()),
        );
        let request = SyncRequest {
            method: Method::Read,
            url,
            body: None,
            query,
            target: SyncTarget::Collection(self.clone()),
        };
        match transport.sync(request).await {
            Ok(response) => {
                self.inner.state.write().meta = self.inner.config.page_meta.extract(&response);
                Ok(response)
            }
            Err(error) => {
                tracing::warn!(%error, "collection fetch failed");
                self.trigger(
                    &Event::new("error")
                        .with_collection(self)
                        .with_value(error.normalized()),
                );
                Err(error.into())
            }
        }
    }

    /// Load the collection's url and reconcile with the response.
    ///
    /// The body goes through `set` (or `reset` with `options.reset`), then
    /// `sync` fires on the collection. Resolves with the raw body.
    pub async fn fetch(&self, options: &FetchOptions) -> Result<Value, SyncError> {
        let response = self.read(options.query.clone()).await?;
        let set_options = CollectionSetOptions {
            parse: options.parse,
            remove: options.remove,
            silent: options.silent,
            ..CollectionSetOptions::new()
        };
        let members = Members::Raw(response.body.clone());
        if options.reset {
            self.reset(members, &set_options);
        } else {
            self.set(members, &set_options);
        }
        self.trigger(
            &Event::new("sync")
                .with_collection(self)
                .with_value(response.body.clone()),
        );
        Ok(response.body)
    }

    /// Build a member from `attrs`, add it and save it.
    ///
    /// With `options.wait` the model joins the collection only after the
    /// server has accepted it.
    pub async fn create(&self, attrs: Value, options: &SaveOptions) -> Result<Model, SyncError> {
        let model = self
            .prepare_model(Member::Attrs(attrs), &SetOptions::new())
            .ok_or(SyncError::Invalid(Value::Null))?;
        let add = CollectionSetOptions {
            silent: options.silent,
            ..CollectionSetOptions::adding()
        };
        if !options.wait {
            self.add(&model, &add);
        }
        model.save(None, options).await?;
        if options.wait {
            self.add(&model, &add);
        }
        Ok(model)
    }

    /// Fetch the next page and merge it in. Resolves with whether more pages
    /// remain.
    pub async fn fetch_next(&self) -> Result<bool, SyncError> {
        let _guard = PageGuard::acquire(&self.inner.paging).ok_or(SyncError::Busy)?;
        self.fetch_page().await
    }

    /// Fetch pages one after another until none remain. Resolves with the
    /// number of pages fetched.
    pub async fn fetch_all(&self) -> Result<usize, SyncError> {
        let _guard = PageGuard::acquire(&self.inner.paging).ok_or(SyncError::Busy)?;
        let mut pages = 0;
        loop {
            pages += 1;
            if !self.fetch_page().await? {
                return Ok(pages);
            }
        }
    }

    async fn fetch_page(&self) -> Result<bool, SyncError> {
        let page = {
            let state = self.inner.state.read();
            state
                .meta
                .next_page
                .or_else(|| state.meta.page.map(|p| p + 1))
                .unwrap_or(1)
        };

        let response = self.read(vec![("page".to_string(), page.to_string())]).await?;
        let has_more = {
            let mut state = self.inner.state.write();
            state.meta.page.get_or_insert(page);
            state.meta.has_more
        };
        tracing::debug!(page, has_more, "page merged");

        self.add(
            Members::Raw(response.body.clone()),
            &CollectionSetOptions::adding().merge().parse(),
        );
        self.trigger(
            &Event::new("sync")
                .with_collection(self)
                .with_value(response.body),
        );
        Ok(has_more)
    }
}
