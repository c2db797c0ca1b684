//! bw-core: Core library for the bucketwalk CLI
//!
//! This crate provides the core functionality for bucketwalk, including:
//! - Configuration and alias management
//! - Path parsing and bucket-architecture aware location
//! - The `ListingService` trait for paginated listing calls
//! - Retry with randomized backoff
//! - Recursive traversal, key filtering and bulk restore
//!
//! This crate is designed to be independent of any specific S3 SDK,
//! so the traversal engine can be tested against an in-memory service.

pub mod alias;
pub mod config;
pub mod error;
pub mod filter;
pub mod listing;
pub mod path;
pub mod restore;
pub mod retry;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use alias::{Alias, AliasManager, RetryConfig};
pub use config::{Config, ConfigManager, Defaults};
pub use error::{Error, Result};
pub use filter::FilterSpec;
pub use listing::{Item, Limit, Strategy, TraversalStats, Traverser, Visitor};
pub use path::{Location, RemotePath, parse_path};
pub use restore::{FailureLog, RestoreJob, RestoreOptions, RestoreSummary};
pub use retry::{RetryBuilder, is_retryable_error, retry_with_backoff};
pub use traits::{
    ARCHIVE_CLASSES, BucketArch, DeleteMarkerEntry, ListObjectsRequest, ListPartsRequest,
    ListUploadsRequest, ListVersionsRequest, ListingService, ObjectEntry, ObjectPage, PartEntry,
    PartPage, RestoreTier, UploadEntry, UploadPage, VersionEntry, VersionPage, parse_timestamp,
};
