//! Listing data model and the remote service contract
//!
//! `ListingService` is the only seam between the traversal engine and the
//! storage SDK. Every listing call returns one page; pagination, retry,
//! key decoding and filtering all happen above it.

use async_trait::async_trait;
use jiff::Timestamp;
use serde::Serialize;

use crate::error::{Error, Result};

/// Storage classes that must be restored before they can be read
pub const ARCHIVE_CLASSES: [&str; 3] = ["ARCHIVE", "MAZ_ARCHIVE", "DEEP_ARCHIVE"];

/// Bucket architecture reported by the capability check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketArch {
    /// Flat key namespace with prefix-only grouping
    Flat,
    /// Hierarchical ("OFS") namespace with real directories
    Tree,
}

/// One object returned by a flat or tree listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectEntry {
    pub key: String,
    pub storage_class: String,
    pub size_bytes: i64,
    /// RFC 3339 timestamp as returned by the service
    pub last_modified: String,
    pub etag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restore_status: Option<String>,
}

impl ObjectEntry {
    pub fn modified_at(&self) -> Result<Timestamp> {
        parse_timestamp(&self.last_modified)
    }

    /// Whether the object sits in one of the archival tiers
    pub fn is_restorable(&self) -> bool {
        ARCHIVE_CLASSES.contains(&self.storage_class.as_str())
    }
}

/// A live object version
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionEntry {
    pub key: String,
    pub version_id: String,
    pub is_latest: bool,
    pub storage_class: String,
    pub size_bytes: i64,
    pub last_modified: String,
    pub etag: String,
}

impl VersionEntry {
    pub fn modified_at(&self) -> Result<Timestamp> {
        parse_timestamp(&self.last_modified)
    }
}

/// A delete marker; carries no size, checksum or storage class
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteMarkerEntry {
    pub key: String,
    pub version_id: String,
    pub is_latest: bool,
    pub last_modified: String,
}

impl DeleteMarkerEntry {
    pub fn modified_at(&self) -> Result<Timestamp> {
        parse_timestamp(&self.last_modified)
    }
}

/// An in-progress multipart upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadEntry {
    pub key: String,
    pub upload_id: String,
    pub initiated: String,
}

/// One uploaded part of a multipart upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartEntry {
    pub part_number: i32,
    pub size_bytes: i64,
    pub etag: String,
    pub last_modified: String,
}

/// Parse an RFC 3339 timestamp from a listing response
pub fn parse_timestamp(value: &str) -> Result<Timestamp> {
    value.parse::<Timestamp>().map_err(|e| Error::TimeParse {
        value: value.to_string(),
        message: e.to_string(),
    })
}

/// One page of a flat or tree listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectPage {
    pub entries: Vec<ObjectEntry>,
    pub common_prefixes: Vec<String>,
    pub truncated: bool,
    pub next_marker: Option<String>,
}

/// One page of a version listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionPage {
    pub versions: Vec<VersionEntry>,
    pub delete_markers: Vec<DeleteMarkerEntry>,
    pub common_prefixes: Vec<String>,
    pub truncated: bool,
    pub next_key_marker: Option<String>,
    pub next_version_id_marker: Option<String>,
}

/// One page of a multipart upload listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadPage {
    pub uploads: Vec<UploadEntry>,
    pub common_prefixes: Vec<String>,
    pub truncated: bool,
    pub next_key_marker: Option<String>,
    pub next_upload_id_marker: Option<String>,
}

/// One page of a part listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartPage {
    pub parts: Vec<PartEntry>,
    pub truncated: bool,
    pub next_part_number_marker: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListObjectsRequest {
    pub bucket: String,
    pub prefix: String,
    /// `None` lists every key under the prefix
    pub delimiter: Option<String>,
    pub marker: Option<String>,
    pub max_keys: i32,
    /// Ask the service to percent-encode keys in the response
    pub encode_keys: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListVersionsRequest {
    pub bucket: String,
    pub prefix: String,
    pub delimiter: Option<String>,
    pub key_marker: Option<String>,
    pub version_id_marker: Option<String>,
    pub max_keys: i32,
    pub encode_keys: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListUploadsRequest {
    pub bucket: String,
    pub prefix: String,
    pub delimiter: Option<String>,
    pub key_marker: Option<String>,
    pub upload_id_marker: Option<String>,
    pub max_uploads: i32,
    pub encode_keys: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPartsRequest {
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
    pub part_number_marker: Option<String>,
    pub max_parts: i32,
}

/// Retrieval speed for a restore request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum RestoreTier {
    Expedited,
    #[default]
    Standard,
    Bulk,
}

impl std::fmt::Display for RestoreTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RestoreTier::Expedited => write!(f, "Expedited"),
            RestoreTier::Standard => write!(f, "Standard"),
            RestoreTier::Bulk => write!(f, "Bulk"),
        }
    }
}

impl std::str::FromStr for RestoreTier {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "expedited" => Ok(RestoreTier::Expedited),
            "standard" => Ok(RestoreTier::Standard),
            "bulk" => Ok(RestoreTier::Bulk),
            _ => Err(format!(
                "Invalid restore mode: {s} (expected Expedited, Standard or Bulk)"
            )),
        }
    }
}

/// Remote object storage as seen by the traversal engine
///
/// Implementations must report throttling and temporary unavailability as
/// [`Error::ServiceUnavailable`] so the retry wrapper can tell it apart from
/// every other failure.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ListingService: Send + Sync {
    /// Probe the bucket architecture (HEAD bucket)
    async fn bucket_arch(&self, bucket: &str) -> Result<BucketArch>;

    async fn list_objects(&self, request: &ListObjectsRequest) -> Result<ObjectPage>;

    async fn list_object_versions(&self, request: &ListVersionsRequest) -> Result<VersionPage>;

    async fn list_multipart_uploads(&self, request: &ListUploadsRequest) -> Result<UploadPage>;

    async fn list_parts(&self, request: &ListPartsRequest) -> Result<PartPage>;

    /// Request rehydration of an archived object
    async fn restore_object(
        &self,
        bucket: &str,
        key: &str,
        days: u32,
        tier: RestoreTier,
    ) -> Result<()>;
}
