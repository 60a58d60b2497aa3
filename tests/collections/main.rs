//! Collection integration tests.

#[path = "../support/mod.rs"]
mod support;

mod paging;
mod reconcile;
