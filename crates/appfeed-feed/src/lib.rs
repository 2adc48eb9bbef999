pub mod client;
pub mod error;
pub mod images;
pub mod paginator;
pub mod transform;
pub mod types;

mod retry;

pub use client::{
    fetch_detail, Fetch, FeedClient, FetchResponse, RequestOptions, RetryPolicy, RetryableRequest,
};
pub use error::{FeedError, ImageError, TransformError};
pub use images::{FfmpegImageStore, ImageStore, NoopImageStore, StoredImages};
pub use paginator::{CancelToken, FeedPage, PageConfig, PagedItem, Paginator};
pub use transform::{
    item_id_of, sharded_dir, transform_item, transform_with_images, TransformContext,
};
pub use types::RawItem;
