use serde::{Deserialize, Serialize};

use super::SyncResponse;

/// Pagination bookkeeping derived from a transport response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PageMeta {
    /// The last page fetched.
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub total_count: Option<u64>,
    /// Records left after the last page.
    pub remainder: Option<u64>,
    pub has_more: bool,
    pub next_page: Option<u64>,
}

/// Reads pagination metadata out of a response.
pub trait PageMetaExtractor: Send + Sync {
    fn extract(&self, response: &SyncResponse) -> PageMeta;
}

/// Reads `X-Page`, `X-Per-Page`, `X-Total-Count`, `X-Remainder` and
/// `X-Next-Page`. There are more pages when a next page is announced or the
/// remainder is positive.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderPageMeta;

impl PageMetaExtractor for HeaderPageMeta {
    fn extract(&self, response: &SyncResponse) -> PageMeta {
        let number = |name: &str| response.header(name).and_then(|v| v.trim().parse::<u64>().ok());

        let next_page = number("x-next-page");
        let remainder = number("x-remainder");
        PageMeta {
            page: number("x-page"),
            per_page: number("x-per-page"),
            total_count: number("x-total-count"),
            remainder,
            has_more: next_page.is_some() || remainder.map(|r| r > 0).unwrap_or(false),
            next_page,
        }
    }
}
