//! Import command handlers for the CLI.
//!
//! `import run` walks the whole feed and records an `import_runs` row;
//! `import item` fetches and imports one record by id. Both share the
//! per-item pipeline in [`pipeline`].

mod pipeline;

use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Args, Subcommand};

use appfeed_core::{AppConfig, ConfigError, ImportConfig, Limit};
use appfeed_db::{ImportRunCounts, MemoryProductStore, PgProductStore, ProductStore};
use appfeed_feed::{
    fetch_detail, CancelToken, FeedClient, FeedError, FfmpegImageStore, ImageStore,
    NoopImageStore, PageConfig, Paginator, TransformContext,
};

use crate::fail_run_best_effort;
use crate::progress::{ProgressReporter, RunSummary};
use pipeline::{process_item, record_outcome, run_pipeline, ItemOutcome, ItemSink, StopReason};

/// Exit status when the run completed but some items failed.
const EXIT_ITEM_ERRORS: u8 = 2;
/// Exit status for fetch, config, and database failures.
pub(crate) const EXIT_FATAL: u8 = 1;

/// Sub-commands available under `import`.
#[derive(Debug, Subcommand)]
pub enum ImportCommands {
    /// Import the vendor catalog page by page
    Run(RunArgs),
    /// Fetch and import a single catalog item by its vendor id
    Item {
        /// Vendor item id (`appId`)
        id: String,

        /// Transform the item and print it without storing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Show recent import runs
    Runs {
        /// Maximum number of runs to list
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
}

/// Per-run overrides for the env-derived import settings.
#[derive(Debug, Default, Args)]
#[allow(clippy::struct_excessive_bools)] // Each flag is an independent operator toggle.
pub struct RunArgs {
    /// Items requested per page
    #[arg(long)]
    pub page_size: Option<u64>,

    /// Maximum items to consume; -1 means unlimited
    #[arg(long, allow_negative_numbers = true)]
    pub limit: Option<i64>,

    /// Skip pages 1..=N without fetching them
    #[arg(long)]
    pub skip_to_page: Option<u64>,

    /// Retries after the first failed request
    #[arg(long)]
    pub retries: Option<u32>,

    /// Insert every item without looking for an existing copy
    #[arg(long)]
    pub no_check_existing: bool,

    /// Skip icon download and resizing
    #[arg(long)]
    pub no_images: bool,

    /// Keep resized icons on the local filesystem instead of uploading
    #[arg(long)]
    pub no_upload: bool,

    /// Fetch and transform without touching the database or image storage
    #[arg(long)]
    pub dry_run: bool,

    /// Stop fetching new pages after this many seconds
    #[arg(long)]
    pub max_runtime_secs: Option<u64>,
}

impl RunArgs {
    /// Applies the flags on top of `base`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] for a bad `--limit` or a zero
    /// `--page-size`.
    pub(crate) fn apply(&self, base: &ImportConfig) -> Result<ImportConfig, ConfigError> {
        let mut import = base.clone();
        if let Some(page_size) = self.page_size {
            import.page_size = page_size;
        }
        if let Some(limit) = self.limit {
            import.limit = Limit::from_signed(limit)?;
        }
        if let Some(skip) = self.skip_to_page {
            import.skip_to_page = skip;
        }
        if let Some(retries) = self.retries {
            import.retry_limit = retries;
        }
        if self.no_check_existing {
            import.check_existing = false;
        }
        if self.no_images || self.dry_run {
            import.download_images = false;
        }
        if self.no_upload {
            import.save_to_remote_storage = false;
        }
        import.validate()?;
        Ok(import)
    }
}

/// Imports the catalog feed.
///
/// Returns the process exit code: success when the feed was exhausted,
/// [`EXIT_ITEM_ERRORS`] when some items failed, and [`EXIT_FATAL`] when a
/// page fetch failed or the run was cancelled.
///
/// # Errors
///
/// Returns an error if configuration is invalid or the database cannot be
/// reached. The import run is marked failed when it was already created.
pub(crate) async fn run_import(
    config: &AppConfig,
    args: &RunArgs,
    cancel: CancelToken,
) -> anyhow::Result<ExitCode> {
    run_import_reporting(config, args, cancel, RunSummary::new(ProgressReporter::new())).await
}

/// [`run_import`] with the summary guard supplied by the caller. The
/// summary is written when this returns, on success and on every error.
async fn run_import_reporting(
    config: &AppConfig,
    args: &RunArgs,
    cancel: CancelToken,
    mut summary: RunSummary,
) -> anyhow::Result<ExitCode> {
    let import = args.apply(&config.import)?;
    let client = FeedClient::from_config(&config.feed, import.retry_limit)?;
    let page_config = PageConfig::from_config(&config.feed, &import)?;
    let ctx = TransformContext::from_config(&config.feed, &import, &config.storage);
    let images = build_image_store(config, &import)?;
    let deadline = args
        .max_runtime_secs
        .or(config.max_runtime_secs)
        .map(|secs| Instant::now() + Duration::from_secs(secs));

    tracing::info!(
        page_size = import.page_size,
        limit = %import.limit,
        skip_to_page = import.skip_to_page,
        retry_limit = import.retry_limit,
        check_existing = import.check_existing,
        download_images = import.download_images,
        dry_run = args.dry_run,
        "starting import"
    );

    if args.dry_run {
        let store = MemoryProductStore::new();
        let sink = ItemSink {
            ctx: &ctx,
            images: images.as_ref(),
            store: &store,
            check_existing: import.check_existing,
        };
        let paginator = Paginator::new(&client, page_config)
            .with_cancel(cancel)
            .with_deadline(deadline);
        let (stop, counts) = execute(paginator, &sink, &mut summary).await;
        println!("dry-run: {} items would be inserted", store.len());
        return Ok(ExitCode::from(exit_status(&stop, counts)));
    }

    let pool = appfeed_db::connect_pool_from_config(config).await?;
    let store = PgProductStore::new(pool.clone());

    let run = appfeed_db::create_import_run(&pool, "cli").await?;
    if let Err(e) = appfeed_db::start_import_run(&pool, run.id).await {
        fail_run_best_effort(&pool, run.id, format!("{e:#}"), ImportRunCounts::default()).await;
        return Err(e.into());
    }

    let sink = ItemSink {
        ctx: &ctx,
        images: images.as_ref(),
        store: &store,
        check_existing: import.check_existing,
    };
    let paginator = Paginator::new(&client, page_config)
        .with_cancel(cancel)
        .with_deadline(deadline);
    let (stop, counts) = execute(paginator, &sink, &mut summary).await;

    if stop.is_completed() {
        if let Err(err) = appfeed_db::complete_import_run(&pool, run.id, counts).await {
            fail_run_best_effort(&pool, run.id, format!("{err:#}"), counts).await;
            return Err(err.into());
        }
    } else {
        let message = stop
            .error()
            .map_or_else(|| "import stopped".to_owned(), ToString::to_string);
        fail_run_best_effort(&pool, run.id, message, counts).await;
    }

    println!(
        "import run {} finished: {} inserted, {} skipped, {} failed",
        run.public_id, counts.inserted, counts.skipped, counts.failed
    );
    Ok(ExitCode::from(exit_status(&stop, counts)))
}

/// Fetches one item from the detail endpoint and runs it through the
/// pipeline.
///
/// # Errors
///
/// Returns an error if the item cannot be fetched or the database cannot be
/// reached.
pub(crate) async fn run_import_item(
    config: &AppConfig,
    item_id: &str,
    dry_run: bool,
) -> anyhow::Result<ExitCode> {
    let mut summary = RunSummary::new(ProgressReporter::new());
    let import = &config.import;
    let secret = config
        .feed
        .secret
        .as_deref()
        .ok_or(FeedError::MissingSecret)?;
    let client = FeedClient::from_config(&config.feed, import.retry_limit)?;
    let raw = fetch_detail(&client, &config.feed.detail_url, secret, item_id).await?;
    summary.advance(&format!("item {item_id}"));
    let ctx = TransformContext::from_config(&config.feed, import, &config.storage);

    if dry_run {
        let store = MemoryProductStore::new();
        let outcome = import_one(&raw, &ctx, &NoopImageStore, &store, false).await;
        record_outcome(&mut summary, &outcome);
        for product in store.products() {
            println!("{}", serde_json::to_string_pretty(&product)?);
        }
        return Ok(ExitCode::from(item_exit_status(&outcome)));
    }

    let images = build_image_store(config, import)?;
    let pool = appfeed_db::connect_pool_from_config(config).await?;
    let store = PgProductStore::new(pool);
    let outcome = import_one(&raw, &ctx, images.as_ref(), &store, import.check_existing).await;
    record_outcome(&mut summary, &outcome);
    match &outcome {
        ItemOutcome::Inserted { id, title, .. } => println!("inserted {item_id} ({title}) as {id}"),
        ItemOutcome::Skipped => println!("{item_id} is already imported"),
        ItemOutcome::Failed => println!("{item_id} could not be imported; see log"),
    }
    Ok(ExitCode::from(item_exit_status(&outcome)))
}

/// Prints the most recent import runs.
///
/// # Errors
///
/// Returns an error if the database cannot be reached.
pub(crate) async fn run_list_runs(config: &AppConfig, limit: i64) -> anyhow::Result<()> {
    let pool = appfeed_db::connect_pool_from_config(config).await?;
    let runs = appfeed_db::list_import_runs(&pool, limit).await?;
    if runs.is_empty() {
        println!("no import runs recorded; run `import run` first");
        return Ok(());
    }

    for run in runs {
        let started = run
            .started_at
            .map_or_else(|| "-".to_owned(), |t| t.format("%Y-%m-%d %H:%M:%S").to_string());
        println!(
            "{:>6}  {:<9}  {}  processed={} inserted={} skipped={} failed={}{}",
            run.id,
            run.status,
            started,
            run.items_processed,
            run.items_inserted,
            run.items_skipped,
            run.items_failed,
            run.error_message
                .map(|m| format!("  error: {m}"))
                .unwrap_or_default()
        );
    }
    Ok(())
}

async fn import_one(
    raw: &serde_json::Value,
    ctx: &TransformContext,
    images: &dyn ImageStore,
    store: &dyn ProductStore,
    check_existing: bool,
) -> ItemOutcome {
    let sink = ItemSink {
        ctx,
        images,
        store,
        check_existing,
    };
    process_item(raw, &sink).await
}

/// Drives the pipeline to completion, counting into `reporter`.
async fn execute<F: appfeed_feed::Fetch + ?Sized>(
    mut paginator: Paginator<'_, F>,
    sink: &ItemSink<'_>,
    reporter: &mut ProgressReporter,
) -> (StopReason, ImportRunCounts) {
    let stop = run_pipeline(&mut paginator, sink, reporter).await;
    let stats = reporter.stats();
    let counts = ImportRunCounts {
        processed: stats.processed,
        inserted: stats.inserted,
        skipped: stats.skipped,
        failed: stats.failed,
    };
    (stop, counts)
}

fn build_image_store(
    config: &AppConfig,
    import: &ImportConfig,
) -> anyhow::Result<Box<dyn ImageStore>> {
    if !import.download_images {
        return Ok(Box::new(NoopImageStore));
    }
    if import.save_to_remote_storage && config.storage.storage_base_url.is_none() {
        tracing::warn!("APPFEED_STORAGE_BASE_URL is not set; keeping images on local disk");
    }
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.feed.request_timeout_secs))
        .user_agent(config.feed.user_agent.as_str())
        .build()?;
    let store = FfmpegImageStore::new(
        client,
        config.storage.storage_base_url.clone(),
        import.save_to_remote_storage,
    )
    .with_ffmpeg(config.storage.ffmpeg_path.clone());
    Ok(Box::new(store))
}

fn exit_status(stop: &StopReason, counts: ImportRunCounts) -> u8 {
    if !stop.is_completed() {
        EXIT_FATAL
    } else if counts.failed > 0 {
        EXIT_ITEM_ERRORS
    } else {
        0
    }
}

fn item_exit_status(outcome: &ItemOutcome) -> u8 {
    match outcome {
        ItemOutcome::Failed => EXIT_ITEM_ERRORS,
        ItemOutcome::Inserted { .. } | ItemOutcome::Skipped => 0,
    }
}

#[cfg(test)]
#[path = "import_test.rs"]
mod tests;
