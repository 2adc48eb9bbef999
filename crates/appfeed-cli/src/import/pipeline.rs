//! Per-item transform and persist loop over the paginated feed.
//!
//! Item-level failures are logged and counted here and never leave
//! [`process_item`]. Page-level failures end the loop and come back as a
//! [`StopReason`] for the caller to map onto the run status.

use serde_json::Value;
use tracing::Level;

use appfeed_db::{persist, PersistOutcome, ProductStore};
use appfeed_feed::{
    item_id_of, transform_with_images, Fetch, FeedError, ImageStore, Paginator,
    TransformContext, TransformError,
};

use crate::progress::ProgressReporter;

/// Collaborators every item goes through.
pub(crate) struct ItemSink<'a> {
    pub ctx: &'a TransformContext,
    pub images: &'a dyn ImageStore,
    pub store: &'a dyn ProductStore,
    pub check_existing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ItemOutcome {
    Inserted {
        id: i64,
        product_id: String,
        title: String,
        category: String,
    },
    Skipped,
    Failed,
}

/// Why the item loop ended.
#[derive(Debug)]
pub(crate) enum StopReason {
    /// Feed exhausted or item limit reached.
    Exhausted,
    /// A page body could not be decoded; treated as the end of the feed.
    Undecodable(FeedError),
    /// Cancelled by signal or the runtime deadline.
    Cancelled(FeedError),
    /// A page could not be fetched.
    Fatal(FeedError),
}

impl StopReason {
    fn from_error(err: FeedError) -> Self {
        match err {
            FeedError::Decode { .. } => Self::Undecodable(err),
            FeedError::Cancelled { .. } => Self::Cancelled(err),
            other => Self::Fatal(other),
        }
    }

    /// Whether the run counts as completed.
    pub(crate) fn is_completed(&self) -> bool {
        matches!(self, Self::Exhausted | Self::Undecodable(_))
    }

    /// The error that stopped the run, if any.
    pub(crate) fn error(&self) -> Option<&FeedError> {
        match self {
            Self::Exhausted => None,
            Self::Undecodable(err) | Self::Cancelled(err) | Self::Fatal(err) => Some(err),
        }
    }
}

/// Drains `paginator`, running every item through `sink`.
pub(crate) async fn run_pipeline<F: Fetch + ?Sized>(
    paginator: &mut Paginator<'_, F>,
    sink: &ItemSink<'_>,
    reporter: &mut ProgressReporter,
) -> StopReason {
    loop {
        let paged = match paginator.next_item().await {
            Ok(Some(paged)) => paged,
            Ok(None) => {
                tracing::info!(
                    page = paginator.page(),
                    position = paginator.position(),
                    "feed exhausted"
                );
                return StopReason::Exhausted;
            }
            Err(err) => {
                tracing::error!(
                    page = paginator.page(),
                    position = paginator.position(),
                    error = %err,
                    "stopping import"
                );
                return StopReason::from_error(err);
            }
        };

        reporter.set_position(paged.position);
        let event = reporter.advance(&format!("page {}", paged.page));
        reporter.emit(&event);

        let outcome = process_item(&paged.item, sink).await;
        record_outcome(reporter, &outcome);
    }
}

/// Counts one finished item.
pub(crate) fn record_outcome(reporter: &mut ProgressReporter, outcome: &ItemOutcome) {
    match outcome {
        ItemOutcome::Inserted {
            product_id,
            title,
            category,
            ..
        } => reporter.record_inserted(product_id, title, category),
        ItemOutcome::Skipped => reporter.record_skipped(),
        ItemOutcome::Failed => reporter.record_failed(),
    }
}

/// Transforms, stores images for, and persists one raw item.
pub(crate) async fn process_item(raw: &Value, sink: &ItemSink<'_>) -> ItemOutcome {
    let (product, stored) = match transform_with_images(raw, sink.ctx, sink.images).await {
        Ok(result) => result,
        Err(err) => {
            log_item_error(item_id_of(raw).as_deref().unwrap_or("?"), &err);
            return ItemOutcome::Failed;
        }
    };
    tracing::debug!(
        item_id = %product.provider_product_id,
        images = stored.locations.len(),
        "item transformed"
    );

    match persist(sink.store, &product, sink.check_existing).await {
        Ok(PersistOutcome::Inserted { id }) => ItemOutcome::Inserted {
            id,
            product_id: product.provider_product_id,
            title: product.title,
            category: product.category.name,
        },
        Ok(PersistOutcome::SkippedDuplicate) => ItemOutcome::Skipped,
        Err(err) => {
            tracing::error!(
                item_id = %product.provider_product_id,
                error = %err,
                "failed to persist item"
            );
            ItemOutcome::Failed
        }
    }
}

fn log_item_error(item_id: &str, err: &TransformError) {
    let severity = err.severity();
    if severity == Level::DEBUG {
        tracing::debug!(item_id, error = %err, "item skipped");
    } else if severity == Level::INFO {
        tracing::info!(item_id, error = %err, "item skipped");
    } else {
        tracing::warn!(item_id, error = %err, "item skipped");
    }
}

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod tests;
