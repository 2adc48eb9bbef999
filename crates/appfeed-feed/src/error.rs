use appfeed_core::CoreError;
use thiserror::Error;

/// Page- and request-level failures. Any of these stops pagination.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("unable to retrieve {url} after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },

    #[error("unable to decode feed page {page}: {reason}")]
    Decode { page: u64, reason: String },

    #[error("invalid URL template \"{template}\": {reason}")]
    InvalidTemplate { template: String, reason: String },

    #[error("feed secret is not configured")]
    MissingSecret,

    #[error("pagination cancelled before page {page}")]
    Cancelled { page: u64 },
}

/// Per-item failures. The batch always continues with the next item.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("item is not a valid feed record: {0}")]
    InvalidRecord(String),

    #[error("item {item_id}: description is not an object")]
    DescriptionNotObject { item_id: String },

    #[error("item {item_id}: first description entry is empty")]
    EmptyDescription { item_id: String },

    #[error("item {item_id}: description entry for locale \"{locale}\" is malformed")]
    InvalidDescriptionEntry { item_id: String, locale: String },

    #[error("item {item_id}: platform id must be an integer, got {value}")]
    InvalidPlatform { item_id: String, value: String },

    #[error("item {item_id}: unknown currency type: {code}")]
    UnknownCurrency { item_id: String, code: String },

    #[error("item {item_id}: invalid price {value}")]
    InvalidPrice { item_id: String, value: String },

    #[error("item {item_id}: invalid lastModified {value}")]
    InvalidReleaseDate { item_id: String, value: String },

    #[error("item {item_id}: no icon image URI")]
    MissingIcon { item_id: String },

    #[error("item {item_id}: {source}")]
    Domain {
        item_id: String,
        #[source]
        source: CoreError,
    },

    #[error("item {item_id}: image processing failed: {source}")]
    Image {
        item_id: String,
        #[source]
        source: ImageError,
    },
}

impl TransformError {
    /// Log level matching how expected the failure is: description problems
    /// are routine, image failures more so, everything else is worth a warning.
    #[must_use]
    pub fn severity(&self) -> tracing::Level {
        match self {
            Self::DescriptionNotObject { .. }
            | Self::EmptyDescription { .. }
            | Self::InvalidDescriptionEntry { .. } => tracing::Level::INFO,
            Self::Image { .. } | Self::MissingIcon { .. } => tracing::Level::DEBUG,
            _ => tracing::Level::WARN,
        }
    }
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("download of {url} failed with status {status}")]
    Download { url: String, status: u16 },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("resize to {file} failed: {reason}")]
    Resize { file: String, reason: String },

    #[error("upload of {key} failed with status {status}")]
    Upload { key: String, status: u16 },
}
