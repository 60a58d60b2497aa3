//! Option structs passed to mutation and sync calls.
//!
//! All of them deserialize with missing fields filled from `Default`, so an
//! application can keep presets in JSON or TOML next to its other settings.

use serde::{Deserialize, Serialize};

/// Options for `Model::set` and friends.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SetOptions {
    /// Suppress `change:<key>` and `change` events.
    pub silent: bool,
    /// Delete the given keys instead of assigning them.
    pub unset: bool,
    /// Run the schema's validator before applying anything.
    pub validate: bool,
    /// Run the schema's parse hook over incoming attributes (construction only).
    pub parse: bool,
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    pub fn unset(mut self) -> Self {
        self.unset = true;
        self
    }

    pub fn validate(mut self) -> Self {
        self.validate = true;
        self
    }

    pub fn parse(mut self) -> Self {
        self.parse = true;
        self
    }
}

/// Options for `Collection::set`, `add`, `remove` and `reset`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionSetOptions {
    pub add: bool,
    pub remove: bool,
    pub merge: bool,
    /// Splice new models in at this index instead of appending.
    pub at: Option<usize>,
    /// Re-sort after adding when a comparator is configured.
    pub sort: bool,
    pub silent: bool,
    pub parse: bool,
    pub validate: bool,
}

impl Default for CollectionSetOptions {
    fn default() -> Self {
        Self {
            add: true,
            remove: true,
            merge: true,
            at: None,
            sort: true,
            silent: false,
            parse: false,
            validate: false,
        }
    }
}

impl CollectionSetOptions {
    /// Full reconciliation: add, remove and merge.
    pub fn new() -> Self {
        Self::default()
    }

    /// Options used by `add`: nothing is removed or merged.
    pub fn adding() -> Self {
        Self {
            remove: false,
            merge: false,
            ..Self::default()
        }
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    pub fn at(mut self, index: usize) -> Self {
        self.at = Some(index);
        self
    }

    pub fn merge(mut self) -> Self {
        self.merge = true;
        self
    }

    pub fn keep_missing(mut self) -> Self {
        self.remove = false;
        self
    }

    pub fn no_sort(mut self) -> Self {
        self.sort = false;
        self
    }

    pub fn parse(mut self) -> Self {
        self.parse = true;
        self
    }

    pub fn validate(mut self) -> Self {
        self.validate = true;
        self
    }

    /// The subset that applies to individual model mutations.
    pub fn model_options(&self) -> SetOptions {
        SetOptions {
            silent: self.silent,
            unset: false,
            validate: self.validate,
            parse: self.parse,
        }
    }
}

/// Options for `Model::save` and `Collection::create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveOptions {
    /// Apply attributes only once the server has answered.
    pub wait: bool,
    /// Send only the given attributes with method `patch`.
    pub patch: bool,
    pub validate: bool,
    pub parse: bool,
    pub silent: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            wait: false,
            patch: false,
            validate: true,
            parse: true,
            silent: false,
        }
    }
}

impl SaveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wait(mut self) -> Self {
        self.wait = true;
        self
    }

    pub fn patch(mut self) -> Self {
        self.patch = true;
        self
    }

    pub fn skip_validation(mut self) -> Self {
        self.validate = false;
        self
    }

    pub(crate) fn set_options(&self) -> SetOptions {
        SetOptions {
            silent: self.silent,
            unset: false,
            validate: self.validate,
            parse: false,
        }
    }
}

/// Options for `fetch` on models and collections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchOptions {
    pub parse: bool,
    /// Collections only: replace contents with `reset` instead of `set`.
    pub reset: bool,
    /// Collections only: drop models missing from the response.
    pub remove: bool,
    pub silent: bool,
    /// Extra query parameters handed to the transport.
    pub query: Vec<(String, String)>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            parse: true,
            reset: false,
            remove: true,
            silent: false,
            query: Vec::new(),
        }
    }
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(mut self) -> Self {
        self.reset = true;
        self
    }

    pub fn keep_missing(mut self) -> Self {
        self.remove = false;
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}

/// Options for `Model::destroy`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DestroyOptions {
    /// Fire `destroy` only after the server confirms.
    pub wait: bool,
}

impl DestroyOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wait(mut self) -> Self {
        self.wait = true;
        self
    }
}
