//! fetch / save / destroy: the model side of the sync lifecycle.

use std::sync::Arc;

use serde_json::{Map, Value};

use super::{into_attributes, Model};
use crate::error::{ConfigError, SyncError, TransportError};
use crate::events::{Event, Observable};
use crate::options::{DestroyOptions, FetchOptions, SaveOptions, SetOptions};
use crate::sync::{Method, SyncRequest, SyncResponse, SyncTarget, Transport};

impl Model {
    /// The schema's transport, else the owning collection's.
    pub fn transport(&self) -> Result<Arc<dyn Transport>, ConfigError> {
        self.schema()
            .transport()
            .or_else(|| self.collection().and_then(|c| c.transport()))
            .ok_or_else(|| ConfigError::MissingTransport(self.schema().name().to_string()))
    }

    async fn send(
        &self,
        transport: Arc<dyn Transport>,
        method: Method,
        url: String,
        body: Option<Value>,
        query: Vec<(String, String)>,
    ) -> Result<SyncResponse, TransportError> {
        tracing::debug!(cid = %self.cid(), %method, %url, "model sync");
        self.trigger(
            &Event::new("request")
                .with_model(self)
                .with_value(method.as_str()),
        );
        transport
            .sync(SyncRequest {
                method,
                url,
                body,
                query,
                target: SyncTarget::Model(self.clone()),
            })
            .await
    }

    fn failed(&self, event: &str, error: TransportError) -> SyncError {
        let payload = error.normalized();
        tracing::warn!(cid = %self.cid(), %error, "sync failed");
        if event == "invalid" {
            self.set_validation_error(Some(payload.clone()));
        }
        self.trigger(&Event::new(event).with_model(self).with_value(payload));
        SyncError::Transport(error)
    }

    fn invalid(&self) -> SyncError {
        SyncError::Invalid(self.validation_error().unwrap_or(Value::Null))
    }

    /// Read remote state and merge it in. Resolves with the raw response body.
    pub async fn fetch(&self, options: &FetchOptions) -> Result<Value, SyncError> {
        let transport = self.transport()?;
        let url = self.url()?;
        let response = match self
            .send(transport, Method::Read, url, None, options.query.clone())
            .await
        {
            Ok(response) => response,
            Err(error) => return Err(self.failed("error", error)),
        };

        let attrs = if options.parse {
            self.schema().parse(response.body.clone())
        } else {
            response.body.clone()
        };
        let set_options = SetOptions {
            silent: options.silent,
            ..SetOptions::new()
        };
        if !self.set(attrs, &set_options) {
            return Err(self.invalid());
        }
        self.trigger(
            &Event::new("sync")
                .with_model(self)
                .with_value(response.body.clone()),
        );
        Ok(response.body)
    }

    /// Persist the model, optionally applying `attrs` first.
    ///
    /// The method is `create` for new models, otherwise `patch` (with
    /// `options.patch`) or `update`. With `options.wait`, `attrs` are only
    /// applied once the server has answered, merged under its response.
    ///
    /// The returned future is lazy: a missing url or transport surfaces as
    /// `SyncError::Config` on its first poll, before any `request` fires.
    pub async fn save(&self, attrs: Option<Value>, options: &SaveOptions) -> Result<Value, SyncError> {
        let set_options = options.set_options();
        let attrs: Option<Map<String, Value>> = attrs.map(into_attributes);

        match (&attrs, options.wait) {
            (Some(attrs), false) => {
                if !self.set(Value::Object(attrs.clone()), &set_options) {
                    return Err(self.invalid());
                }
            }
            (attrs, _) => {
                let pending = attrs.clone().unwrap_or_default();
                if !self.run_validation(&pending, &set_options) {
                    return Err(self.invalid());
                }
            }
        }

        let transport = self.transport()?;
        let created = self.is_new();
        let method = if created {
            Method::Create
        } else if options.patch {
            Method::Patch
        } else {
            Method::Update
        };
        let url = self.url()?;

        let body = match method {
            Method::Patch => Value::Object(attrs.clone().unwrap_or_default()),
            _ => {
                let mut body = self.attributes();
                if options.wait {
                    if let Some(attrs) = &attrs {
                        body.extend(attrs.clone());
                    }
                }
                Value::Object(body)
            }
        };

        let response = match self.send(transport, method, url, Some(body), Vec::new()).await {
            Ok(response) => response,
            Err(error) => return Err(self.failed("invalid", error)),
        };

        let parsed = if options.parse {
            self.schema().parse(response.body.clone())
        } else {
            response.body.clone()
        };
        let mut server = into_attributes(parsed);
        if options.wait {
            let mut merged = attrs.unwrap_or_default();
            merged.extend(server);
            server = merged;
        }
        if !server.is_empty() && !self.set(Value::Object(server), &set_options) {
            return Err(self.invalid());
        }

        self.trigger(
            &Event::new("sync")
                .with_model(self)
                .with_value(response.body.clone()),
        );
        let outcome = if created { "create" } else { "update" };
        self.trigger(
            &Event::new(outcome)
                .with_model(self)
                .with_value(response.body.clone()),
        );
        Ok(response.body)
    }

    /// Delete the remote record and orphan the model.
    ///
    /// A model that was never persisted skips the transport and resolves with
    /// `None`. `destroy` fires before the request, or after it with
    /// `options.wait`; once the call completes every subscription is dropped.
    pub async fn destroy(&self, options: &DestroyOptions) -> Result<Option<Value>, SyncError> {
        if self.is_new() {
            self.fire_destroy();
            self.orphan();
            return Ok(None);
        }

        let transport = self.transport()?;
        let url = self.url()?;
        if !options.wait {
            self.fire_destroy();
        }

        let response = match self.send(transport, Method::Delete, url, None, Vec::new()).await {
            Ok(response) => response,
            Err(error) => return Err(self.failed("error", error)),
        };

        if options.wait {
            self.fire_destroy();
        }
        self.trigger(
            &Event::new("sync")
                .with_model(self)
                .with_value(response.body.clone()),
        );
        self.orphan();
        Ok(Some(response.body))
    }

    fn fire_destroy(&self) {
        let mut event = Event::new("destroy").with_model(self);
        if let Some(collection) = self.collection() {
            event = event.with_collection(&collection);
        }
        self.trigger(&event);
    }
}
