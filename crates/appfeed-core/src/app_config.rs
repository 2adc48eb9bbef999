use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::ConfigError;

/// Default page size for feed requests.
pub const DEFAULT_PAGE_SIZE: u64 = 100;
/// Default number of retries after the first failed request.
pub const DEFAULT_RETRY_LIMIT: u32 = 10;
/// Cached temp images stay valid for 70 days.
pub const DEFAULT_IMAGE_TTL_SECS: u64 = 70 * 24 * 60 * 60;

/// Upper bound on how many feed items a run may consume.
///
/// The env/CLI representation is a signed integer where `-1` means
/// unlimited; any other negative value is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Unlimited,
    Items(u64),
}

impl Limit {
    /// Parses the signed representation used by configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] for negative values other than `-1`.
    pub fn from_signed(value: i64) -> Result<Self, ConfigError> {
        match value {
            -1 => Ok(Self::Unlimited),
            v if v >= 0 => Ok(Self::Items(v.unsigned_abs())),
            v => Err(ConfigError::Validation(format!(
                "limit must be -1 (unlimited) or >= 0, got {v}"
            ))),
        }
    }

    /// Items still allowed after `position` items were consumed, or `None`
    /// when unlimited.
    #[must_use]
    pub fn remaining(self, position: u64) -> Option<u64> {
        match self {
            Self::Unlimited => None,
            Self::Items(limit) => Some(limit.saturating_sub(position)),
        }
    }

    #[must_use]
    pub fn is_reached(self, position: u64) -> bool {
        match self {
            Self::Unlimited => false,
            Self::Items(limit) => position >= limit,
        }
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unlimited => write!(f, "-1"),
            Self::Items(n) => write!(f, "{n}"),
        }
    }
}

impl FromStr for Limit {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s
            .trim()
            .parse::<i64>()
            .map_err(|e| ConfigError::Validation(format!("invalid limit \"{s}\": {e}")))?;
        Self::from_signed(value)
    }
}

/// Per-run import behaviour. Passed explicitly into each pipeline component.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)] // Each flag is an independent operator toggle.
pub struct ImportConfig {
    pub page_size: u64,
    pub limit: Limit,
    /// `0` processes every page; `K` skips pages `1..=K` without fetching.
    pub skip_to_page: u64,
    /// Retries after the first attempt; total attempts are `retry_limit + 1`.
    pub retry_limit: u32,
    pub check_existing: bool,
    pub download_images: bool,
    pub save_to_remote_storage: bool,
    pub image_ttl_secs: u64,
    /// Informational; passed to the feed as-is.
    pub sort_key: String,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            limit: Limit::Unlimited,
            skip_to_page: 0,
            retry_limit: DEFAULT_RETRY_LIMIT,
            check_existing: true,
            download_images: true,
            save_to_remote_storage: true,
            image_ttl_secs: DEFAULT_IMAGE_TTL_SECS,
            sort_key: "id".to_string(),
        }
    }
}

impl ImportConfig {
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] when `page_size` is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::Validation(
                "page size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Vendor feed endpoint and HTTP client settings.
#[derive(Clone)]
pub struct FeedConfig {
    /// Page-detail URL template with `{START}`, `{PAGE_SIZE}` and `{SECRET}`.
    pub list_url: String,
    /// Single-item URL template with `{ITEM_ID}` and `{SECRET}`.
    pub detail_url: String,
    pub secret: Option<String>,
    pub provider_id: i64,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    /// Keep the raw response header block on each fetched page.
    pub echo_headers: bool,
    pub retry_backoff_base_ms: u64,
    pub retry_backoff_max_ms: u64,
}

impl fmt::Debug for FeedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedConfig")
            .field("list_url", &self.list_url)
            .field("detail_url", &self.detail_url)
            .field("secret", &self.secret.as_ref().map(|_| "[redacted]"))
            .field("provider_id", &self.provider_id)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("user_agent", &self.user_agent)
            .field("echo_headers", &self.echo_headers)
            .field("retry_backoff_base_ms", &self.retry_backoff_base_ms)
            .field("retry_backoff_max_ms", &self.retry_backoff_max_ms)
            .finish()
    }
}

/// Where processed images end up.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub images_dir: PathBuf,
    pub tmp_images_dir: PathBuf,
    /// Base URL of the object store; resized images are `PUT` below it.
    pub storage_base_url: Option<String>,
    /// Binary used to resize icons.
    pub ffmpeg_path: PathBuf,
}

#[derive(Clone)]
pub struct AppConfig {
    /// Only required for runs that write to Postgres.
    pub database_url: Option<String>,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub max_runtime_secs: Option<u64>,
    pub feed: FeedConfig,
    pub import: ImportConfig,
    pub storage: StorageConfig,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[redacted]"),
            )
            .field("log_level", &self.log_level)
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("max_runtime_secs", &self.max_runtime_secs)
            .field("feed", &self.feed)
            .field("import", &self.import)
            .field("storage", &self.storage)
            .finish()
    }
}
