use serde_json::Value;

use crate::error::FeedError;
use crate::paginator::items_from_value;

use super::{Fetch, RetryableRequest};

/// Fetches one item from the detail endpoint.
///
/// The endpoint returns either the record itself or a list holding it.
///
/// # Errors
///
/// Fetch failures, or [`FeedError::Decode`] when the body holds no record.
pub async fn fetch_detail<F: Fetch + ?Sized>(
    fetcher: &F,
    detail_template: &str,
    secret: &str,
    item_id: &str,
) -> Result<Value, FeedError> {
    let request = RetryableRequest::item(detail_template, secret, item_id);
    let url = request.render()?;
    let response = fetcher.fetch(&url, &request.options).await?;

    let value: Value = serde_json::from_slice(&response.body).map_err(|e| FeedError::Decode {
        page: 1,
        reason: e.to_string(),
    })?;
    if value.get("appId").is_some() {
        return Ok(value);
    }

    items_from_value(value, 1)?
        .into_iter()
        .next()
        .ok_or_else(|| FeedError::Decode {
            page: 1,
            reason: format!("no record for item {item_id}"),
        })
}
