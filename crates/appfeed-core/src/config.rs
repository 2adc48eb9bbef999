use std::path::PathBuf;

use crate::app_config::{
    AppConfig, FeedConfig, ImportConfig, Limit, StorageConfig, DEFAULT_IMAGE_TTL_SECS,
    DEFAULT_PAGE_SIZE, DEFAULT_RETRY_LIMIT,
};
use crate::ConfigError;

const DEFAULT_LIST_URL: &str = "http://feed.appland.se/api/feed/c/listDetailV1/store/TFC/start/{START}/count/{PAGE_SIZE}/p/simpleListV1/imageUriFullSizeV1/tfcListV1/a/tfc/{SECRET}";
const DEFAULT_DETAIL_URL: &str =
    "http://feed.appland.se/api/feed/c/detailV1/store/TFC/id/{ITEM_ID}/p/clone/a/tfc/{SECRET}";

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u32 = |var: &str, default: u32| -> Result<u32, ConfigError> {
        match lookup(var) {
            Ok(raw) => raw.parse::<u32>().map_err(|e| invalid(var, e.to_string())),
            Err(_) => Ok(default),
        }
    };

    let parse_u64 = |var: &str, default: u64| -> Result<u64, ConfigError> {
        match lookup(var) {
            Ok(raw) => raw.parse::<u64>().map_err(|e| invalid(var, e.to_string())),
            Err(_) => Ok(default),
        }
    };

    let parse_i64 = |var: &str, default: i64| -> Result<i64, ConfigError> {
        match lookup(var) {
            Ok(raw) => raw.parse::<i64>().map_err(|e| invalid(var, e.to_string())),
            Err(_) => Ok(default),
        }
    };

    let parse_bool = |var: &str, default: bool| -> Result<bool, ConfigError> {
        match lookup(var) {
            Ok(raw) => parse_flag(&raw).ok_or_else(|| {
                invalid(var, format!("expected true/false/1/0/yes/no, got \"{raw}\""))
            }),
            Err(_) => Ok(default),
        }
    };

    let database_url = lookup("DATABASE_URL").ok();
    let log_level = or_default("APPFEED_LOG_LEVEL", "info");

    let db_max_connections = parse_u32("APPFEED_DB_MAX_CONNECTIONS", 10)?;
    let db_min_connections = parse_u32("APPFEED_DB_MIN_CONNECTIONS", 1)?;
    let db_acquire_timeout_secs = parse_u64("APPFEED_DB_ACQUIRE_TIMEOUT_SECS", 10)?;

    let max_runtime_secs = match lookup("APPFEED_MAX_RUNTIME_SECS") {
        Ok(raw) => Some(
            raw.parse::<u64>()
                .map_err(|e| invalid("APPFEED_MAX_RUNTIME_SECS", e.to_string()))?,
        ),
        Err(_) => None,
    };

    let feed = FeedConfig {
        list_url: or_default("APPFEED_FEED_LIST_URL", DEFAULT_LIST_URL),
        detail_url: or_default("APPFEED_FEED_DETAIL_URL", DEFAULT_DETAIL_URL),
        secret: lookup("APPFEED_FEED_SECRET").ok().filter(|s| !s.is_empty()),
        provider_id: parse_i64("APPFEED_PROVIDER_ID", 18)?,
        request_timeout_secs: parse_u64("APPFEED_REQUEST_TIMEOUT_SECS", 30)?,
        user_agent: or_default("APPFEED_USER_AGENT", "appfeed/0.1 (catalog-import)"),
        echo_headers: parse_bool("APPFEED_ECHO_HEADERS", true)?,
        retry_backoff_base_ms: parse_u64("APPFEED_RETRY_BACKOFF_BASE_MS", 500)?,
        retry_backoff_max_ms: parse_u64("APPFEED_RETRY_BACKOFF_MAX_MS", 30_000)?,
    };

    let limit = Limit::from_signed(parse_i64("APPFEED_LIMIT", -1)?)
        .map_err(|e| invalid("APPFEED_LIMIT", e.to_string()))?;

    let import = ImportConfig {
        page_size: parse_u64("APPFEED_PAGE_SIZE", DEFAULT_PAGE_SIZE)?,
        limit,
        skip_to_page: parse_u64("APPFEED_SKIP_TO_PAGE", 0)?,
        retry_limit: parse_u32("APPFEED_RETRY_LIMIT", DEFAULT_RETRY_LIMIT)?,
        check_existing: parse_bool("APPFEED_CHECK_EXISTING", true)?,
        download_images: parse_bool("APPFEED_DOWNLOAD_IMAGES", true)?,
        save_to_remote_storage: parse_bool("APPFEED_SAVE_TO_REMOTE_STORAGE", true)?,
        image_ttl_secs: parse_u64("APPFEED_IMAGE_TTL_SECS", DEFAULT_IMAGE_TTL_SECS)?,
        sort_key: or_default("APPFEED_SORT_KEY", "id"),
    };
    import
        .validate()
        .map_err(|e| invalid("APPFEED_PAGE_SIZE", e.to_string()))?;

    let images_dir = PathBuf::from(or_default("APPFEED_IMAGES_DIR", "./images"));
    let tmp_images_dir = lookup("APPFEED_TMP_IMAGES_DIR")
        .map_or_else(|_| images_dir.join("tmp"), PathBuf::from);
    let storage = StorageConfig {
        images_dir,
        tmp_images_dir,
        storage_base_url: lookup("APPFEED_STORAGE_BASE_URL")
            .ok()
            .filter(|s| !s.is_empty()),
        ffmpeg_path: PathBuf::from(or_default("APPFEED_FFMPEG_PATH", "ffmpeg")),
    };

    Ok(AppConfig {
        database_url,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        max_runtime_secs,
        feed,
        import,
        storage,
    })
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
