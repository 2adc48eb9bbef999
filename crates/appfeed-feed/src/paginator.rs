//! Offset/count pagination over the vendor list endpoint.
//!
//! A [`Paginator`] walks pages in order and is not restartable. It stops
//! for good once the item limit is reached, a page comes back empty, or a
//! fetch/decode error occurs; every later call returns `Ok(None)`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use appfeed_core::{FeedConfig, ImportConfig, Limit};

use crate::client::{Fetch, RetryableRequest};
use crate::error::FeedError;

/// Object fields checked first when a page body is an object, not an array.
const ARRAY_FIELDS: [&str; 3] = ["items", "data", "list"];

#[derive(Debug, Clone)]
pub struct PageConfig {
    pub list_url: String,
    pub secret: String,
    pub page_size: u64,
    pub limit: Limit,
    /// Pages `1..=skip_to_page` are not fetched.
    pub skip_to_page: u64,
    pub sort_key: String,
}

impl PageConfig {
    /// # Errors
    ///
    /// Returns [`FeedError::MissingSecret`] when no feed secret is configured.
    pub fn from_config(feed: &FeedConfig, import: &ImportConfig) -> Result<Self, FeedError> {
        let secret = feed.secret.clone().ok_or(FeedError::MissingSecret)?;
        Ok(Self {
            list_url: feed.list_url.clone(),
            secret,
            page_size: import.page_size,
            limit: import.limit,
            skip_to_page: import.skip_to_page,
            sort_key: import.sort_key.clone(),
        })
    }
}

/// Shared flag checked between pages; set from a Ctrl-C handler.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One decoded page.
#[derive(Debug, Clone)]
pub struct FeedPage {
    /// 1-based page number.
    pub page: u64,
    /// Offset sent as `{START}`.
    pub start: u64,
    /// Count sent as `{PAGE_SIZE}`.
    pub requested: u64,
    pub items: Vec<Value>,
    pub response_header: Option<String>,
}

/// A single item together with its place in the feed.
#[derive(Debug, Clone)]
pub struct PagedItem {
    pub page: u64,
    /// Items consumed so far, this one included.
    pub position: u64,
    pub item: Value,
}

pub struct Paginator<'a, F: Fetch + ?Sized> {
    fetcher: &'a F,
    config: PageConfig,
    cancel: CancelToken,
    deadline: Option<Instant>,
    page: u64,
    position: u64,
    finished: bool,
    buffer: VecDeque<PagedItem>,
}

impl<'a, F: Fetch + ?Sized> Paginator<'a, F> {
    #[must_use]
    pub fn new(fetcher: &'a F, config: PageConfig) -> Self {
        Self {
            fetcher,
            config,
            cancel: CancelToken::new(),
            deadline: None,
            page: 0,
            position: 0,
            finished: false,
            buffer: VecDeque::new(),
        }
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Items consumed so far, skipped pages included.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Number of the last page fetched or skipped.
    #[must_use]
    pub fn page(&self) -> u64 {
        self.page
    }

    /// Fetches the next page.
    ///
    /// Returns `Ok(None)` once the feed is exhausted or the limit reached.
    ///
    /// # Errors
    ///
    /// Fetch, decode, template, or cancellation errors. The paginator is
    /// finished after any error.
    pub async fn next_page(&mut self) -> Result<Option<FeedPage>, FeedError> {
        let result = self.advance().await;
        if !matches!(result, Ok(Some(_))) {
            self.finished = true;
        }
        result
    }

    /// Yields the next item, fetching pages as needed.
    ///
    /// # Errors
    ///
    /// Same as [`Paginator::next_page`].
    pub async fn next_item(&mut self) -> Result<Option<PagedItem>, FeedError> {
        if self.buffer.is_empty() {
            let Some(page) = self.next_page().await? else {
                return Ok(None);
            };
            let number = page.page;
            self.buffer
                .extend(page.items.into_iter().enumerate().map(|(i, item)| PagedItem {
                    page: number,
                    position: page.start + i as u64 + 1,
                    item,
                }));
        }
        Ok(self.buffer.pop_front())
    }

    async fn advance(&mut self) -> Result<Option<FeedPage>, FeedError> {
        loop {
            if self.finished || self.config.limit.is_reached(self.position) {
                return Ok(None);
            }

            self.page += 1;
            if self.page <= self.config.skip_to_page {
                self.position += self.config.page_size;
                tracing::debug!(page = self.page, position = self.position, "skipping page");
                continue;
            }

            self.check_cancelled()?;

            let count = self
                .config
                .limit
                .remaining(self.position)
                .map_or(self.config.page_size, |r| r.min(self.config.page_size));
            let request = RetryableRequest::page(
                &self.config.list_url,
                &self.config.secret,
                self.position,
                count,
            )
            .with_sort_key(&self.config.sort_key);
            let url = request.render()?;

            tracing::debug!(page = self.page, start = self.position, count, "fetching page");
            let response = self.fetcher.fetch(&url, &request.options).await?;
            if let Some(header) = response.response_header.as_deref() {
                tracing::debug!(page = self.page, header, "response header");
            }

            let mut items = decode_page(&response.body, self.page)?;
            if items.is_empty() {
                tracing::info!(page = self.page, "empty page, end of feed");
                return Ok(None);
            }
            items.truncate(usize::try_from(count).unwrap_or(usize::MAX));

            let start = self.position;
            self.position += items.len() as u64;

            return Ok(Some(FeedPage {
                page: self.page,
                start,
                requested: count,
                items,
                response_header: response.response_header,
            }));
        }
    }

    fn check_cancelled(&self) -> Result<(), FeedError> {
        let timed_out = self.deadline.is_some_and(|d| Instant::now() >= d);
        if self.cancel.is_cancelled() || timed_out {
            tracing::warn!(page = self.page, timed_out, "pagination cancelled");
            return Err(FeedError::Cancelled { page: self.page });
        }
        Ok(())
    }
}

/// Decodes a page body: a JSON array, or an object holding one.
///
/// # Errors
///
/// Returns [`FeedError::Decode`] for an empty body, invalid JSON, or JSON
/// without an item array.
pub(crate) fn decode_page(body: &[u8], page: u64) -> Result<Vec<Value>, FeedError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(FeedError::Decode {
            page,
            reason: "empty response body".to_owned(),
        });
    }
    let value = serde_json::from_slice::<Value>(body).map_err(|e| FeedError::Decode {
        page,
        reason: e.to_string(),
    })?;
    items_from_value(value, page)
}

pub(crate) fn items_from_value(value: Value, page: u64) -> Result<Vec<Value>, FeedError> {
    let decode_error = |reason: String| FeedError::Decode { page, reason };

    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => ARRAY_FIELDS
            .iter()
            .find_map(|key| match map.remove(*key) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            })
            .ok_or_else(|| decode_error(format!("object holds none of {ARRAY_FIELDS:?}"))),
        other => Err(decode_error(format!("expected an array, got {other}"))),
    }
}

#[cfg(test)]
#[path = "paginator_test.rs"]
mod tests;
