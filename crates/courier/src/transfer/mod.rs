//! Cached downloads and uploads layered on the dispatch manager.

mod manager;
mod metadata;
mod observers;
mod record;
mod schema;

pub use manager::{DownloadOptions, TransferManager, UploadMode, UploadOptions};
pub use metadata::RemoteMetadata;
pub use record::{TransferCallback, TransferOutcome, UpdateCallback};
pub use schema::{CacheSchema, FileCacheSchema};
