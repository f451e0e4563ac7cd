//! Paginated search over CBC `_search` endpoints.
//!
//! CBC caps the number of rows per search call, so a full scan is:
//!
//! 1. A zero-row query to learn `num_found`.
//! 2. One query per page, `start` advancing by exactly `page_size`, the
//!    last page holding the remainder.
//!
//! The scan is generic over the criteria and record types; both the device
//! search and the alert search run through it. Any non-success reply aborts
//! the scan; there is no retry.

use serde::{Serialize, de::DeserializeOwned};

use crate::client::CbcClient;
use crate::devices::{SearchRequest, SearchResponse};
use crate::error::{CbcError, Result};

/// One page of a scan: rows `start .. start + rows`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub start: u64,
    pub rows: u64,
}

/// Splits `total` matches into pages of at most `page_size` rows.
///
/// Produces exactly `ceil(total / page_size)` pages covering every row once.
/// A zero `page_size` yields no pages.
pub fn page_plan(total: u64, page_size: u64) -> Vec<Page> {
    let mut pages = Vec::new();
    if page_size == 0 {
        return pages;
    }
    let mut start = 0;
    while start < total {
        let rows = page_size.min(total - start);
        pages.push(Page { start, rows });
        start += rows;
    }
    pages
}

/// Issues the zero-row query and returns the number of matches.
pub async fn count_matches<C: Serialize>(
    client: &CbcClient,
    path: &str,
    criteria: &C,
) -> Result<u64> {
    let request = SearchRequest {
        criteria,
        start: 0,
        rows: 0,
    };
    let response: SearchResponse<serde::de::IgnoredAny> = client.post(path, &request).await?;
    Ok(response.num_found)
}

/// Fetches one page.
pub async fn fetch_page<C: Serialize, T: DeserializeOwned>(
    client: &CbcClient,
    path: &str,
    criteria: &C,
    page: Page,
) -> Result<Vec<T>> {
    let request = SearchRequest {
        criteria,
        start: page.start,
        rows: page.rows,
    };
    let response: SearchResponse<T> = client.post(path, &request).await?;
    Ok(response.results)
}

/// Runs a full scan and returns every matching record in API order.
///
/// # Errors
///
/// - `CbcError::Config` — `page_size` is zero.
/// - `CbcError::Api` — the count query or any page returned a non-success
///   status (400 usually means the page size is too large).
/// - `CbcError::Network` / `CbcError::Parse` — transport or body failure.
pub async fn scan<C: Serialize, T: DeserializeOwned>(
    client: &CbcClient,
    path: &str,
    criteria: &C,
    page_size: u64,
) -> Result<Vec<T>> {
    if page_size == 0 {
        return Err(CbcError::Config("page_size must be at least 1".to_string()));
    }

    let total = count_matches(client, path, criteria).await?;
    tracing::info!(total, page_size, "search matched records");

    let mut records = Vec::new();
    for page in page_plan(total, page_size) {
        tracing::info!(start = page.start, rows = page.rows, "fetching page");
        let mut batch: Vec<T> = fetch_page(client, path, criteria, page).await?;
        if batch.len() as u64 != page.rows {
            tracing::warn!(
                start = page.start,
                expected = page.rows,
                received = batch.len(),
                "page size differs from plan"
            );
        }
        records.append(&mut batch);
    }
    Ok(records)
}
