use super::*;

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;

use appfeed_core::{ImageSpec, Limit, NormalizedProduct};
use appfeed_db::{DbError, MemoryProductStore};
use appfeed_feed::{
    CancelToken, FetchResponse, ImageError, NoopImageStore, PageConfig, RequestOptions,
    StoredImages,
};

/// Serves the queued bodies in order, then empty pages.
struct ScriptedFeed {
    bodies: Mutex<Vec<Result<Vec<u8>, ()>>>,
    calls: Mutex<usize>,
}

impl ScriptedFeed {
    fn new(bodies: Vec<Result<Vec<u8>, ()>>) -> Self {
        Self {
            bodies: Mutex::new(bodies.into_iter().rev().collect()),
            calls: Mutex::new(0),
        }
    }

    fn pages(pages: &[Value]) -> Self {
        Self::new(
            pages
                .iter()
                .map(|p| Ok(serde_json::to_vec(p).unwrap()))
                .collect(),
        )
    }

    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl Fetch for ScriptedFeed {
    async fn fetch(
        &self,
        url: &str,
        _options: &RequestOptions,
    ) -> Result<FetchResponse, FeedError> {
        *self.calls.lock().unwrap() += 1;
        let next = self
            .bodies
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| Ok(b"[]".to_vec()));
        match next {
            Ok(body) => Ok(FetchResponse {
                status: 200,
                response_header: None,
                body: Bytes::from(body),
            }),
            Err(()) => Err(FeedError::RetriesExhausted {
                url: url.to_owned(),
                attempts: 11,
                last_error: "unexpected HTTP status 503".to_owned(),
            }),
        }
    }
}

/// Fails for icons whose URL contains `broken`.
struct SelectiveImageStore;

#[async_trait]
impl ImageStore for SelectiveImageStore {
    async fn store(&self, spec: &ImageSpec) -> Result<StoredImages, ImageError> {
        if spec.source_url.contains("broken") {
            return Err(ImageError::Download {
                url: spec.source_url.clone(),
                status: 404,
            });
        }
        Ok(StoredImages {
            locations: spec.targets.iter().map(|t| t.file_name.clone()).collect(),
        })
    }
}

/// Accepts lookups, rejects writes for one product id.
struct RejectingStore {
    inner: MemoryProductStore,
    reject_id: &'static str,
}

#[async_trait]
impl ProductStore for RejectingStore {
    async fn exists(&self, provider_id: i64, provider_product_id: &str) -> Result<bool, DbError> {
        self.inner.exists(provider_id, provider_product_id).await
    }

    async fn insert(&self, product: &NormalizedProduct) -> Result<i64, DbError> {
        if product.provider_product_id == self.reject_id {
            return Err(DbError::NotFound);
        }
        self.inner.insert(product).await
    }
}

fn ctx() -> TransformContext {
    TransformContext {
        provider_id: 18,
        images_dir: PathBuf::from("/srv/images"),
        tmp_images_dir: PathBuf::from("/srv/images/tmp"),
        image_ttl_secs: 60,
    }
}

fn page_config(page_size: u64, limit: Limit) -> PageConfig {
    PageConfig {
        list_url: "http://feed.test/list/start/{START}/count/{PAGE_SIZE}/a/{SECRET}".to_owned(),
        secret: "s3cret".to_owned(),
        page_size,
        limit,
        skip_to_page: 0,
        sort_key: "id".to_owned(),
    }
}

fn item(id: u64) -> Value {
    json!({
        "appId": id,
        "company": "Rovio",
        "clientPlatform": 1,
        "currency": "EUR",
        "price": 99,
        "category": {
            "parentCategory": 7,
            "parentCategoryName": "Games",
            "subCategory": 12,
            "subCategoryName": "Puzzle"
        },
        "imageUri": { "icon": format!("http://cdn.feed.test/icons/{id}.png") },
        "description": {
            "en": {
                "title": format!("App {id}"),
                "shortDescription": "Short.",
                "description": "Long."
            }
        }
    })
}

async fn drain(
    feed: &ScriptedFeed,
    config: PageConfig,
    sink: &ItemSink<'_>,
) -> (StopReason, ProgressReporter) {
    let mut paginator = Paginator::new(feed, config);
    let mut reporter = ProgressReporter::quiet();
    let stop = run_pipeline(&mut paginator, sink, &mut reporter).await;
    (stop, reporter)
}

fn stored_ids(store: &MemoryProductStore) -> Vec<String> {
    store
        .products()
        .into_iter()
        .map(|p| p.provider_product_id)
        .collect()
}

#[tokio::test]
async fn malformed_description_skips_only_that_item() {
    let mut bad = item(1);
    bad["description"] = json!("not-an-array");
    let feed = ScriptedFeed::pages(&[json!([bad, item(2)])]);
    let store = MemoryProductStore::new();
    let ctx = ctx();
    let sink = ItemSink {
        ctx: &ctx,
        images: &NoopImageStore,
        store: &store,
        check_existing: true,
    };

    let (stop, reporter) = drain(&feed, page_config(10, Limit::Unlimited), &sink).await;

    assert!(matches!(stop, StopReason::Exhausted));
    assert_eq!(stored_ids(&store), vec!["2"]);
    let stats = reporter.stats();
    assert_eq!(stats.processed, 2);
    assert_eq!(stats.inserted, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.added, vec!["2 App 2"]);
    assert_eq!(stats.categories, vec!["Games"]);
}

#[tokio::test]
async fn bad_currency_and_platform_do_not_stop_the_page() {
    let mut bad_currency = item(1);
    bad_currency["currency"] = json!("xyz");
    let mut bad_platform = item(2);
    bad_platform["clientPlatform"] = json!("x");
    let feed = ScriptedFeed::pages(&[json!([bad_currency, bad_platform, item(3)])]);
    let store = MemoryProductStore::new();
    let ctx = ctx();
    let sink = ItemSink {
        ctx: &ctx,
        images: &NoopImageStore,
        store: &store,
        check_existing: true,
    };

    let (_, reporter) = drain(&feed, page_config(10, Limit::Unlimited), &sink).await;

    assert_eq!(stored_ids(&store), vec!["3"]);
    assert_eq!(reporter.stats().failed, 2);
}

#[tokio::test]
async fn image_failure_skips_item_and_batch_continues() {
    let mut broken = item(1);
    broken["imageUri"] = json!({ "icon": "http://cdn.feed.test/broken.png" });
    let feed = ScriptedFeed::pages(&[json!([broken, item(2)])]);
    let store = MemoryProductStore::new();
    let ctx = ctx();
    let sink = ItemSink {
        ctx: &ctx,
        images: &SelectiveImageStore,
        store: &store,
        check_existing: true,
    };

    let (_, reporter) = drain(&feed, page_config(10, Limit::Unlimited), &sink).await;

    assert_eq!(stored_ids(&store), vec!["2"]);
    assert_eq!(reporter.stats().failed, 1);
    assert_eq!(reporter.stats().inserted, 1);
}

#[tokio::test]
async fn persistence_failure_is_counted_per_item() {
    let feed = ScriptedFeed::pages(&[json!([item(1), item(2), item(3)])]);
    let store = RejectingStore {
        inner: MemoryProductStore::new(),
        reject_id: "2",
    };
    let ctx = ctx();
    let sink = ItemSink {
        ctx: &ctx,
        images: &NoopImageStore,
        store: &store,
        check_existing: true,
    };

    let (stop, reporter) = drain(&feed, page_config(10, Limit::Unlimited), &sink).await;

    assert!(stop.is_completed());
    assert_eq!(stored_ids(&store.inner), vec!["1", "3"]);
    assert_eq!(reporter.stats().failed, 1);
}

#[tokio::test]
async fn repeated_items_are_skipped_when_checking_existing() {
    let feed = ScriptedFeed::pages(&[json!([item(1), item(2)]), json!([item(1), item(3)])]);
    let store = MemoryProductStore::new();
    let ctx = ctx();
    let sink = ItemSink {
        ctx: &ctx,
        images: &NoopImageStore,
        store: &store,
        check_existing: true,
    };

    let (_, reporter) = drain(&feed, page_config(2, Limit::Unlimited), &sink).await;

    assert_eq!(stored_ids(&store), vec!["1", "2", "3"]);
    assert_eq!(reporter.stats().skipped, 1);
    assert_eq!(reporter.stats().inserted, 3);
    assert_eq!(reporter.stats().page, "page 2");
    assert_eq!(reporter.stats().position, 4);
}

#[tokio::test]
async fn without_existence_check_duplicates_are_inserted() {
    let feed = ScriptedFeed::pages(&[json!([item(1), item(1)])]);
    let store = MemoryProductStore::new();
    let ctx = ctx();
    let sink = ItemSink {
        ctx: &ctx,
        images: &NoopImageStore,
        store: &store,
        check_existing: false,
    };

    drain(&feed, page_config(10, Limit::Unlimited), &sink).await;

    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn fetch_exhaustion_is_fatal_and_keeps_earlier_items() {
    let feed = ScriptedFeed::new(vec![
        Ok(serde_json::to_vec(&json!([item(1), item(2)])).unwrap()),
        Err(()),
    ]);
    let store = MemoryProductStore::new();
    let ctx = ctx();
    let sink = ItemSink {
        ctx: &ctx,
        images: &NoopImageStore,
        store: &store,
        check_existing: true,
    };

    let (stop, _) = drain(&feed, page_config(2, Limit::Unlimited), &sink).await;

    assert!(matches!(
        stop,
        StopReason::Fatal(FeedError::RetriesExhausted { .. })
    ));
    assert!(!stop.is_completed());
    assert_eq!(store.len(), 2);
    assert_eq!(feed.calls(), 2);
}

#[tokio::test]
async fn undecodable_page_ends_unlimited_run_as_completed() {
    let feed = ScriptedFeed::new(vec![
        Ok(serde_json::to_vec(&json!([item(1), item(2)])).unwrap()),
        Ok(serde_json::to_vec(&json!([item(3), item(4)])).unwrap()),
        Ok(b"<html>maintenance</html>".to_vec()),
    ]);
    let store = MemoryProductStore::new();
    let ctx = ctx();
    let sink = ItemSink {
        ctx: &ctx,
        images: &NoopImageStore,
        store: &store,
        check_existing: true,
    };

    let (stop, _) = drain(&feed, page_config(2, Limit::Unlimited), &sink).await;

    assert!(matches!(stop, StopReason::Undecodable(FeedError::Decode { page: 3, .. })));
    assert!(stop.is_completed());
    assert!(stop.error().is_some());
    assert_eq!(store.len(), 4);
    assert_eq!(feed.calls(), 3);
}

#[tokio::test]
async fn limit_caps_processed_items() {
    let feed = ScriptedFeed::pages(&[
        json!([item(1), item(2)]),
        json!([item(3), item(4)]),
    ]);
    let store = MemoryProductStore::new();
    let ctx = ctx();
    let sink = ItemSink {
        ctx: &ctx,
        images: &NoopImageStore,
        store: &store,
        check_existing: true,
    };

    let (stop, reporter) = drain(&feed, page_config(2, Limit::Items(3)), &sink).await;

    assert!(matches!(stop, StopReason::Exhausted));
    assert_eq!(stored_ids(&store), vec!["1", "2", "3"]);
    assert_eq!(reporter.stats().processed, 3);
    assert_eq!(feed.calls(), 2);
}

#[tokio::test]
async fn cancelled_token_stops_before_first_fetch() {
    let feed = ScriptedFeed::pages(&[json!([item(1)])]);
    let store = MemoryProductStore::new();
    let ctx = ctx();
    let sink = ItemSink {
        ctx: &ctx,
        images: &NoopImageStore,
        store: &store,
        check_existing: true,
    };
    let cancel = CancelToken::new();
    cancel.cancel();

    let mut paginator =
        Paginator::new(&feed, page_config(10, Limit::Unlimited)).with_cancel(cancel);
    let mut reporter = ProgressReporter::quiet();
    let stop = run_pipeline(&mut paginator, &sink, &mut reporter).await;

    assert!(matches!(stop, StopReason::Cancelled(_)));
    assert!(!stop.is_completed());
    assert_eq!(feed.calls(), 0);
    assert!(store.is_empty());
}

#[tokio::test]
async fn process_item_reports_inserted_product() {
    let store = MemoryProductStore::new();
    let ctx = ctx();
    let sink = ItemSink {
        ctx: &ctx,
        images: &NoopImageStore,
        store: &store,
        check_existing: true,
    };

    let outcome = process_item(&item(19_002), &sink).await;

    assert_eq!(
        outcome,
        ItemOutcome::Inserted {
            id: 1,
            product_id: "19002".to_owned(),
            title: "App 19002".to_owned(),
            category: "Games".to_owned(),
        }
    );
    assert_eq!(process_item(&item(19_002), &sink).await, ItemOutcome::Skipped);
    assert_eq!(process_item(&json!("garbage"), &sink).await, ItemOutcome::Failed);
}
