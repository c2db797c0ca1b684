//! Paginated listing and traversal
//!
//! Page fetchers issue exactly one retry-wrapped call and normalize the
//! response (keys percent-decoded, a usable next cursor). The [`Traverser`]
//! drives fetchers until the listing is exhausted or the caller's limit is
//! met, filters every discovered item and hands survivors to a [`Visitor`].
//!
//! Flat buckets recurse by dropping the delimiter. Tree buckets are always
//! listed one directory at a time and the traverser descends into each
//! common prefix with a fresh cursor.

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::alias::RetryConfig;
use crate::error::{Error, Result};
use crate::filter::FilterSpec;
use crate::path::Location;
use crate::retry::{is_retryable_error, retry_with_backoff};
use crate::traits::{
    BucketArch, DeleteMarkerEntry, ListObjectsRequest, ListPartsRequest, ListUploadsRequest,
    ListVersionsRequest, ListingService, ObjectEntry, ObjectPage, PartEntry, PartPage,
    UploadEntry, UploadPage, VersionEntry, VersionPage,
};

/// Largest page the service will return
pub const MAX_PAGE_SIZE: i32 = 1000;

/// Directory separator used for one-level listings
pub const DELIMITER: &str = "/";

/// Overall cap on delivered items; zero means unbounded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Limit(u32);

impl Limit {
    pub fn new(max: u32) -> Self {
        Self(max)
    }

    pub fn unbounded() -> Self {
        Self(0)
    }

    pub fn is_bounded(&self) -> bool {
        self.0 > 0
    }

    /// Whether `delivered` items already satisfy the cap
    pub fn reached(&self, delivered: u64) -> bool {
        self.is_bounded() && delivered >= u64::from(self.0)
    }

    /// Page size for the next request given what was already delivered
    pub fn page_size(&self, delivered: u64) -> i32 {
        if !self.is_bounded() {
            return MAX_PAGE_SIZE;
        }
        let remaining = u64::from(self.0).saturating_sub(delivered);
        remaining.min(MAX_PAGE_SIZE as u64) as i32
    }
}

/// How a location is traversed, chosen once per command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Flat,
    Versions,
    Tree,
}

impl Strategy {
    pub fn select(arch: BucketArch, all_versions: bool) -> Result<Self> {
        match (arch, all_versions) {
            (BucketArch::Flat, false) => Ok(Strategy::Flat),
            (BucketArch::Flat, true) => Ok(Strategy::Versions),
            (BucketArch::Tree, false) => Ok(Strategy::Tree),
            (BucketArch::Tree, true) => Err(Error::UnsupportedFeature(
                "Version listing is not available on hierarchical buckets".to_string(),
            )),
        }
    }
}

/// Something discovered by a traversal
#[derive(Debug, Clone, Copy)]
pub enum Item<'a> {
    Prefix(&'a str),
    Object(&'a ObjectEntry),
    Version(&'a VersionEntry),
    DeleteMarker(&'a DeleteMarkerEntry),
    Upload(&'a UploadEntry),
    Part(&'a PartEntry),
}

impl Item<'_> {
    /// The key the filter is applied to; parts belong to a fixed key
    pub fn key(&self) -> Option<&str> {
        match self {
            Item::Prefix(p) => Some(p),
            Item::Object(o) => Some(&o.key),
            Item::Version(v) => Some(&v.key),
            Item::DeleteMarker(m) => Some(&m.key),
            Item::Upload(u) => Some(&u.key),
            Item::Part(_) => None,
        }
    }
}

/// Consumer of traversal results
#[async_trait]
pub trait Visitor: Send {
    /// Receive one item that passed the filter
    async fn visit(&mut self, item: Item<'_>) -> Result<()>;

    /// Called after every item of a fetched page has been visited
    async fn end_page(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Counters threaded through one traversal, including every recursive descent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraversalStats {
    /// Items handed to the visitor
    pub delivered: u64,
    /// Successful page fetches
    pub fetches: u64,
}

/// Percent-decode a key returned with URL encoding
///
/// `+` stands for a space. Undecodable input is kept as-is.
pub fn decode_key(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => raw.to_string(),
    }
}

/// A truncated page that carries no cursor would restart the listing
fn missing_cursor(listing: &str, bucket: &str, prefix: &str) -> Error {
    Error::General(format!(
        "Truncated {listing} listing of {bucket}/{prefix} returned no continuation marker"
    ))
}

/// Fetch one page of a flat listing
pub async fn fetch_object_page<S>(
    service: &S,
    retry: &RetryConfig,
    bucket: &str,
    prefix: &str,
    delimiter: Option<&str>,
    marker: Option<&str>,
    page_size: i32,
) -> Result<ObjectPage>
where
    S: ListingService + ?Sized,
{
    let request = ListObjectsRequest {
        bucket: bucket.to_string(),
        prefix: prefix.to_string(),
        delimiter: delimiter.map(str::to_string),
        marker: marker.map(str::to_string),
        max_keys: page_size,
        encode_keys: true,
    };

    tracing::debug!(bucket, prefix, ?marker, page_size, "Fetching object page");
    let mut page =
        retry_with_backoff(retry, || service.list_objects(&request), is_retryable_error).await?;

    for entry in &mut page.entries {
        entry.key = decode_key(&entry.key);
    }
    page.common_prefixes = page.common_prefixes.iter().map(|p| decode_key(p)).collect();
    page.next_marker = page.next_marker.as_deref().map(decode_key);

    // Without a delimiter the service may omit the next marker; the last key
    // returned is the cursor in that case.
    if page.truncated && page.next_marker.is_none() {
        let last_key = page.entries.last().map(|e| e.key.as_str());
        let last_prefix = page.common_prefixes.last().map(String::as_str);
        page.next_marker = last_key.max(last_prefix).map(str::to_string);
    }
    if page.truncated && page.next_marker.is_none() {
        return Err(missing_cursor("object", bucket, prefix));
    }

    Ok(page)
}

/// Fetch the entries and subdirectories of exactly one directory of a tree bucket
pub async fn fetch_tree_page<S>(
    service: &S,
    retry: &RetryConfig,
    bucket: &str,
    dir: &str,
    marker: Option<&str>,
    page_size: i32,
) -> Result<ObjectPage>
where
    S: ListingService + ?Sized,
{
    fetch_object_page(service, retry, bucket, dir, Some(DELIMITER), marker, page_size).await
}

/// Fetch one page of a version listing
#[allow(clippy::too_many_arguments)]
pub async fn fetch_version_page<S>(
    service: &S,
    retry: &RetryConfig,
    bucket: &str,
    prefix: &str,
    delimiter: Option<&str>,
    key_marker: Option<&str>,
    version_id_marker: Option<&str>,
    page_size: i32,
) -> Result<VersionPage>
where
    S: ListingService + ?Sized,
{
    let request = ListVersionsRequest {
        bucket: bucket.to_string(),
        prefix: prefix.to_string(),
        delimiter: delimiter.map(str::to_string),
        key_marker: key_marker.map(str::to_string),
        version_id_marker: version_id_marker.map(str::to_string),
        max_keys: page_size,
        encode_keys: true,
    };

    tracing::debug!(bucket, prefix, ?key_marker, ?version_id_marker, page_size, "Fetching version page");
    let mut page = retry_with_backoff(
        retry,
        || service.list_object_versions(&request),
        is_retryable_error,
    )
    .await?;

    for version in &mut page.versions {
        version.key = decode_key(&version.key);
    }
    for marker in &mut page.delete_markers {
        marker.key = decode_key(&marker.key);
    }
    page.common_prefixes = page.common_prefixes.iter().map(|p| decode_key(p)).collect();
    page.next_key_marker = page.next_key_marker.as_deref().map(decode_key);

    // Versions of one key are listed newest first, so the last version
    // entry only wins a tie on key when no delete marker shares that key.
    if page.truncated && page.next_key_marker.is_none() {
        let last_version = page.versions.last().map(|v| (&v.key, &v.version_id));
        let last_marker = page.delete_markers.last().map(|m| (&m.key, &m.version_id));
        let last = match (last_version, last_marker) {
            (Some(v), Some(m)) if v.0 == m.0 => None,
            (Some(v), Some(m)) => Some(if v.0 > m.0 { v } else { m }),
            (v, m) => v.or(m),
        };
        if let Some((key, version_id)) = last {
            page.next_key_marker = Some(key.clone());
            page.next_version_id_marker = Some(version_id.clone());
        }
    }
    if page.truncated && page.next_key_marker.is_none() {
        return Err(missing_cursor("version", bucket, prefix));
    }

    Ok(page)
}

/// Fetch one page of in-progress multipart uploads
pub async fn fetch_upload_page<S>(
    service: &S,
    retry: &RetryConfig,
    bucket: &str,
    prefix: &str,
    key_marker: Option<&str>,
    upload_id_marker: Option<&str>,
    page_size: i32,
) -> Result<UploadPage>
where
    S: ListingService + ?Sized,
{
    let request = ListUploadsRequest {
        bucket: bucket.to_string(),
        prefix: prefix.to_string(),
        delimiter: None,
        key_marker: key_marker.map(str::to_string),
        upload_id_marker: upload_id_marker.map(str::to_string),
        max_uploads: page_size,
        encode_keys: true,
    };

    tracing::debug!(bucket, prefix, ?key_marker, page_size, "Fetching upload page");
    let mut page = retry_with_backoff(
        retry,
        || service.list_multipart_uploads(&request),
        is_retryable_error,
    )
    .await?;

    for upload in &mut page.uploads {
        upload.key = decode_key(&upload.key);
    }
    page.common_prefixes = page.common_prefixes.iter().map(|p| decode_key(p)).collect();
    page.next_key_marker = page.next_key_marker.as_deref().map(decode_key);

    if page.truncated && page.next_key_marker.is_none() {
        if let Some(last) = page.uploads.last() {
            page.next_key_marker = Some(last.key.clone());
            page.next_upload_id_marker = Some(last.upload_id.clone());
        } else {
            return Err(missing_cursor("upload", bucket, prefix));
        }
    }

    Ok(page)
}

/// Fetch one page of the parts of a multipart upload
pub async fn fetch_part_page<S>(
    service: &S,
    retry: &RetryConfig,
    bucket: &str,
    key: &str,
    upload_id: &str,
    part_number_marker: Option<&str>,
    page_size: i32,
) -> Result<PartPage>
where
    S: ListingService + ?Sized,
{
    let request = ListPartsRequest {
        bucket: bucket.to_string(),
        key: key.to_string(),
        upload_id: upload_id.to_string(),
        part_number_marker: part_number_marker.map(str::to_string),
        max_parts: page_size,
    };

    tracing::debug!(bucket, key, upload_id, ?part_number_marker, "Fetching part page");
    let mut page =
        retry_with_backoff(retry, || service.list_parts(&request), is_retryable_error).await?;

    if page.truncated && page.next_part_number_marker.is_none() {
        match page.parts.last() {
            Some(last) => page.next_part_number_marker = Some(last.part_number.to_string()),
            None => return Err(missing_cursor("part", bucket, key)),
        }
    }

    Ok(page)
}

/// Drives page fetchers over one traversal root
pub struct Traverser<'a, S: ?Sized> {
    service: &'a S,
    retry: RetryConfig,
    filter: &'a FilterSpec,
    limit: Limit,
    descend_all: bool,
}

impl<'a, S> Traverser<'a, S>
where
    S: ListingService + ?Sized,
{
    pub fn new(service: &'a S, retry: RetryConfig, filter: &'a FilterSpec) -> Self {
        Self {
            service,
            retry,
            filter,
            limit: Limit::unbounded(),
            descend_all: false,
        }
    }

    pub fn with_limit(mut self, limit: Limit) -> Self {
        self.limit = limit;
        self
    }

    /// Descend into every subdirectory of a tree bucket, not only those the
    /// filter keeps. Bulk operations filter object keys, so a directory name
    /// that fails the pattern may still hold matching objects.
    pub fn descend_all_prefixes(mut self, descend_all: bool) -> Self {
        self.descend_all = descend_all;
        self
    }

    /// Traverse a location with the given strategy
    pub async fn run(
        &self,
        strategy: Strategy,
        location: &Location,
        recursive: bool,
        visitor: &mut dyn Visitor,
    ) -> Result<TraversalStats> {
        let (bucket, prefix) = (location.bucket(), location.prefix());
        match (strategy, location.is_tree()) {
            (Strategy::Flat, false) => self.walk_flat(bucket, prefix, recursive, visitor).await,
            (Strategy::Versions, false) => {
                self.walk_versions(bucket, prefix, recursive, visitor).await
            }
            (Strategy::Tree, true) => self.walk_tree(bucket, prefix, recursive, visitor).await,
            (strategy, is_tree) => Err(Error::General(format!(
                "Strategy {strategy:?} does not apply to a {} bucket",
                if is_tree { "hierarchical" } else { "flat" }
            ))),
        }
    }

    /// Filter an item and deliver it; returns false once the limit is met
    async fn offer(
        &self,
        item: Item<'_>,
        stats: &mut TraversalStats,
        visitor: &mut dyn Visitor,
    ) -> Result<bool> {
        if self.limit.reached(stats.delivered) {
            return Ok(false);
        }
        if item.key().is_none_or(|key| self.filter.matches(key)) {
            visitor.visit(item).await?;
            stats.delivered += 1;
        }
        Ok(true)
    }

    /// Whether another page should be requested after `page_truncated`
    ///
    /// A bounded listing is a preview: its first page is final.
    fn continues(&self, page_truncated: bool, stats: &TraversalStats) -> bool {
        page_truncated && !self.limit.is_bounded() && !self.limit.reached(stats.delivered)
    }

    /// Flat listing; recursive means no delimiter
    pub async fn walk_flat(
        &self,
        bucket: &str,
        prefix: &str,
        recursive: bool,
        visitor: &mut dyn Visitor,
    ) -> Result<TraversalStats> {
        let delimiter = (!recursive).then_some(DELIMITER);
        let mut stats = TraversalStats::default();
        let mut marker: Option<String> = None;

        loop {
            let page = fetch_object_page(
                self.service,
                &self.retry,
                bucket,
                prefix,
                delimiter,
                marker.as_deref(),
                self.limit.page_size(stats.delivered),
            )
            .await?;
            stats.fetches += 1;

            'page: {
                for p in &page.common_prefixes {
                    if !self.offer(Item::Prefix(p), &mut stats, visitor).await? {
                        break 'page;
                    }
                }
                for entry in &page.entries {
                    if !self.offer(Item::Object(entry), &mut stats, visitor).await? {
                        break 'page;
                    }
                }
            }
            visitor.end_page().await?;

            if !self.continues(page.truncated, &stats) {
                break;
            }
            marker = page.next_marker;
        }

        Ok(stats)
    }

    /// Version listing; both cursors are threaded into the next request
    pub async fn walk_versions(
        &self,
        bucket: &str,
        prefix: &str,
        recursive: bool,
        visitor: &mut dyn Visitor,
    ) -> Result<TraversalStats> {
        let delimiter = (!recursive).then_some(DELIMITER);
        let mut stats = TraversalStats::default();
        let mut key_marker: Option<String> = None;
        let mut version_id_marker: Option<String> = None;

        loop {
            let page = fetch_version_page(
                self.service,
                &self.retry,
                bucket,
                prefix,
                delimiter,
                key_marker.as_deref(),
                version_id_marker.as_deref(),
                self.limit.page_size(stats.delivered),
            )
            .await?;
            stats.fetches += 1;

            'page: {
                for p in &page.common_prefixes {
                    if !self.offer(Item::Prefix(p), &mut stats, visitor).await? {
                        break 'page;
                    }
                }
                for version in &page.versions {
                    if !self.offer(Item::Version(version), &mut stats, visitor).await? {
                        break 'page;
                    }
                }
                for marker in &page.delete_markers {
                    if !self.offer(Item::DeleteMarker(marker), &mut stats, visitor).await? {
                        break 'page;
                    }
                }
            }
            visitor.end_page().await?;

            if !self.continues(page.truncated, &stats) {
                break;
            }
            key_marker = page.next_key_marker;
            version_id_marker = page.next_version_id_marker;
        }

        Ok(stats)
    }

    /// Tree listing rooted at `prefix`
    pub async fn walk_tree(
        &self,
        bucket: &str,
        prefix: &str,
        recursive: bool,
        visitor: &mut dyn Visitor,
    ) -> Result<TraversalStats> {
        let mut stats = TraversalStats::default();
        self.walk_tree_dir(bucket, prefix.to_string(), recursive, &mut stats, visitor)
            .await?;
        Ok(stats)
    }

    /// List one directory to exhaustion, descending into subdirectories
    /// as they are discovered. Each directory starts from an empty cursor.
    fn walk_tree_dir<'b>(
        &'b self,
        bucket: &'b str,
        dir: String,
        recursive: bool,
        stats: &'b mut TraversalStats,
        visitor: &'b mut dyn Visitor,
    ) -> BoxFuture<'b, Result<()>> {
        Box::pin(async move {
            let mut marker: Option<String> = None;

            loop {
                if self.limit.reached(stats.delivered) {
                    return Ok(());
                }

                let page = fetch_tree_page(
                    self.service,
                    &self.retry,
                    bucket,
                    &dir,
                    marker.as_deref(),
                    self.limit.page_size(stats.delivered),
                )
                .await?;
                stats.fetches += 1;

                for entry in &page.entries {
                    if !self.offer(Item::Object(entry), stats, visitor).await? {
                        return Ok(());
                    }
                }

                for sub in &page.common_prefixes {
                    let kept = self.filter.matches(sub);
                    if !self.offer(Item::Prefix(sub), stats, visitor).await? {
                        return Ok(());
                    }
                    if recursive && (kept || self.descend_all) {
                        self.walk_tree_dir(bucket, sub.clone(), recursive, stats, visitor)
                            .await?;
                    }
                }
                visitor.end_page().await?;

                if !page.truncated {
                    return Ok(());
                }
                marker = page.next_marker;
            }
        })
    }

    /// Multipart upload listing under a prefix
    pub async fn walk_uploads(
        &self,
        bucket: &str,
        prefix: &str,
        visitor: &mut dyn Visitor,
    ) -> Result<TraversalStats> {
        let mut stats = TraversalStats::default();
        let mut key_marker: Option<String> = None;
        let mut upload_id_marker: Option<String> = None;

        loop {
            let page = fetch_upload_page(
                self.service,
                &self.retry,
                bucket,
                prefix,
                key_marker.as_deref(),
                upload_id_marker.as_deref(),
                self.limit.page_size(stats.delivered),
            )
            .await?;
            stats.fetches += 1;

            for upload in &page.uploads {
                if !self.offer(Item::Upload(upload), &mut stats, visitor).await? {
                    break;
                }
            }
            visitor.end_page().await?;

            if !self.continues(page.truncated, &stats) {
                break;
            }
            key_marker = page.next_key_marker;
            upload_id_marker = page.next_upload_id_marker;
        }

        Ok(stats)
    }

    /// Parts of one multipart upload
    pub async fn walk_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        visitor: &mut dyn Visitor,
    ) -> Result<TraversalStats> {
        let mut stats = TraversalStats::default();
        let mut part_marker: Option<String> = None;

        loop {
            let page = fetch_part_page(
                self.service,
                &self.retry,
                bucket,
                key,
                upload_id,
                part_marker.as_deref(),
                self.limit.page_size(stats.delivered),
            )
            .await?;
            stats.fetches += 1;

            for part in &page.parts {
                if !self.offer(Item::Part(part), &mut stats, visitor).await? {
                    break;
                }
            }
            visitor.end_page().await?;

            if !self.continues(page.truncated, &stats) {
                break;
            }
            part_marker = page.next_part_number_marker;
        }

        Ok(stats)
    }
}
