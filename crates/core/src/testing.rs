//! In-memory listing service for tests
//!
//! Simulates marker pagination, delimiter grouping, percent-encoded keys and
//! injected throttling over a fixed, sorted set of objects.

use std::collections::{BTreeSet, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::listing::{Item, Visitor};
use crate::traits::{
    BucketArch, DeleteMarkerEntry, ListObjectsRequest, ListPartsRequest, ListUploadsRequest,
    ListVersionsRequest, ListingService, ObjectEntry, ObjectPage, PartEntry, PartPage,
    RestoreTier, UploadEntry, UploadPage, VersionEntry, VersionPage,
};

pub(crate) const MODIFIED: &str = "2024-05-01T12:00:00.000Z";

pub(crate) fn object(key: &str, class: &str, size: i64) -> ObjectEntry {
    ObjectEntry {
        key: key.to_string(),
        storage_class: class.to_string(),
        size_bytes: size,
        last_modified: MODIFIED.to_string(),
        etag: format!("\"{:x}\"", key.len()),
        restore_status: None,
    }
}

#[derive(Debug, Clone)]
enum VersionRecord {
    Live(VersionEntry),
    Marker(DeleteMarkerEntry),
}

impl VersionRecord {
    fn key(&self) -> &str {
        match self {
            VersionRecord::Live(v) => &v.key,
            VersionRecord::Marker(m) => &m.key,
        }
    }

    fn version_id(&self) -> &str {
        match self {
            VersionRecord::Live(v) => &v.version_id,
            VersionRecord::Marker(m) => &m.version_id,
        }
    }
}

enum Slot<'a, T> {
    Item(&'a T),
    Prefix(String),
}

/// Group `items[start..]` under `prefix` into at most `max` slots
fn page_slots<'a, T>(
    items: &'a [T],
    start: usize,
    key_of: impl Fn(&T) -> &str,
    prefix: &str,
    delimiter: Option<&str>,
    key_marker: Option<&str>,
    max: i32,
) -> (Vec<Slot<'a, T>>, bool) {
    let max = if max <= 0 { 1000 } else { max as usize };
    let mut slots = Vec::new();
    let mut seen = BTreeSet::new();

    for item in items.iter().skip(start) {
        let key = key_of(item);
        let Some(rest) = key.strip_prefix(prefix) else {
            continue;
        };

        let grouped = delimiter.and_then(|d| rest.find(d).map(|pos| (pos, d.len())));
        let slot = match grouped {
            Some((pos, len)) => {
                let common = format!("{prefix}{}", &rest[..pos + len]);
                if key_marker.is_some_and(|m| common.as_str() <= m) || !seen.insert(common.clone())
                {
                    continue;
                }
                Slot::Prefix(common)
            }
            None => Slot::Item(item),
        };

        if slots.len() == max {
            return (slots, true);
        }
        slots.push(slot);
    }

    (slots, false)
}

fn encode(key: &str, enabled: bool) -> String {
    if enabled {
        urlencoding::encode(key).into_owned()
    } else {
        key.to_string()
    }
}

/// Scripted remote service
pub(crate) struct FakeService {
    arch: BucketArch,
    objects: Vec<ObjectEntry>,
    versions: Vec<VersionRecord>,
    uploads: Vec<UploadEntry>,
    parts: Vec<PartEntry>,
    failing_restores: HashSet<String>,
    unavailable: AtomicU32,
    object_requests: Mutex<Vec<ListObjectsRequest>>,
    version_requests: Mutex<Vec<ListVersionsRequest>>,
    restored: Mutex<Vec<(String, u32, RestoreTier)>>,
}

impl FakeService {
    fn new(arch: BucketArch) -> Self {
        Self {
            arch,
            objects: Vec::new(),
            versions: Vec::new(),
            uploads: Vec::new(),
            parts: Vec::new(),
            failing_restores: HashSet::new(),
            unavailable: AtomicU32::new(0),
            object_requests: Mutex::new(Vec::new()),
            version_requests: Mutex::new(Vec::new()),
            restored: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn flat() -> Self {
        Self::new(BucketArch::Flat)
    }

    pub(crate) fn tree() -> Self {
        Self::new(BucketArch::Tree)
    }

    pub(crate) fn with_object(self, key: &str, class: &str, size: i64) -> Self {
        self.with_entry(object(key, class, size))
    }

    pub(crate) fn with_entry(mut self, entry: ObjectEntry) -> Self {
        let at = self.objects.partition_point(|o| o.key <= entry.key);
        self.objects.insert(at, entry);
        self
    }

    fn push_version(&mut self, record: VersionRecord) {
        let at = self.versions.partition_point(|r| r.key() <= record.key());
        self.versions.insert(at, record);
    }

    pub(crate) fn with_version(mut self, key: &str, version_id: &str, is_latest: bool) -> Self {
        self.push_version(VersionRecord::Live(VersionEntry {
            key: key.to_string(),
            version_id: version_id.to_string(),
            is_latest,
            storage_class: "STANDARD".to_string(),
            size_bytes: 100,
            last_modified: MODIFIED.to_string(),
            etag: "\"v\"".to_string(),
        }));
        self
    }

    pub(crate) fn with_delete_marker(mut self, key: &str, version_id: &str, is_latest: bool) -> Self {
        self.push_version(VersionRecord::Marker(DeleteMarkerEntry {
            key: key.to_string(),
            version_id: version_id.to_string(),
            is_latest,
            last_modified: MODIFIED.to_string(),
        }));
        self
    }

    pub(crate) fn with_upload(mut self, key: &str, upload_id: &str) -> Self {
        self.uploads.push(UploadEntry {
            key: key.to_string(),
            upload_id: upload_id.to_string(),
            initiated: MODIFIED.to_string(),
        });
        self.uploads.sort_by(|a, b| a.key.cmp(&b.key));
        self
    }

    pub(crate) fn with_part(mut self, part_number: i32) -> Self {
        self.parts.push(PartEntry {
            part_number,
            size_bytes: 5 * 1024 * 1024,
            etag: format!("\"p{part_number}\""),
            last_modified: MODIFIED.to_string(),
        });
        self
    }

    /// Fail the next `n` listing calls with a throttling error
    pub(crate) fn unavailable_for(self, n: u32) -> Self {
        self.unavailable.store(n, Ordering::SeqCst);
        self
    }

    pub(crate) fn failing_restore(mut self, key: &str) -> Self {
        self.failing_restores.insert(key.to_string());
        self
    }

    pub(crate) fn object_requests(&self) -> Vec<ListObjectsRequest> {
        self.object_requests.lock().unwrap().clone()
    }

    pub(crate) fn version_requests(&self) -> Vec<ListVersionsRequest> {
        self.version_requests.lock().unwrap().clone()
    }

    pub(crate) fn restored_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .restored
            .lock()
            .unwrap()
            .iter()
            .map(|(k, _, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    pub(crate) fn restore_requests(&self) -> Vec<(String, u32, RestoreTier)> {
        self.restored.lock().unwrap().clone()
    }

    fn throttle(&self) -> Result<()> {
        let remaining = self.unavailable.load(Ordering::SeqCst);
        if remaining > 0 {
            self.unavailable.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::ServiceUnavailable(
                "503 Service Unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ListingService for FakeService {
    async fn bucket_arch(&self, _bucket: &str) -> Result<BucketArch> {
        Ok(self.arch)
    }

    async fn list_objects(&self, request: &ListObjectsRequest) -> Result<ObjectPage> {
        self.object_requests.lock().unwrap().push(request.clone());
        self.throttle()?;

        let marker = request.marker.as_deref();
        let start = marker.map_or(0, |m| self.objects.partition_point(|o| o.key.as_str() <= m));
        let (slots, truncated) = page_slots(
            &self.objects,
            start,
            |o| o.key.as_str(),
            &request.prefix,
            request.delimiter.as_deref(),
            marker,
            request.max_keys,
        );

        let mut page = ObjectPage {
            truncated,
            ..Default::default()
        };
        let mut last = None;
        for slot in slots {
            match slot {
                Slot::Item(o) => {
                    last = Some(o.key.clone());
                    let mut entry = o.clone();
                    entry.key = encode(&o.key, request.encode_keys);
                    page.entries.push(entry);
                }
                Slot::Prefix(p) => {
                    page.common_prefixes.push(encode(&p, request.encode_keys));
                    last = Some(p);
                }
            }
        }

        // Like the service, only report a next marker for delimited listings
        if truncated && request.delimiter.is_some() {
            page.next_marker = last.map(|k| encode(&k, request.encode_keys));
        }
        Ok(page)
    }

    async fn list_object_versions(&self, request: &ListVersionsRequest) -> Result<VersionPage> {
        self.version_requests.lock().unwrap().push(request.clone());
        self.throttle()?;

        let key_marker = request.key_marker.as_deref();
        let start = match (key_marker, request.version_id_marker.as_deref()) {
            (Some(k), Some(v)) => self
                .versions
                .iter()
                .position(|r| r.key() == k && r.version_id() == v)
                .map_or(0, |i| i + 1),
            (Some(k), None) => self.versions.partition_point(|r| r.key() <= k),
            _ => 0,
        };

        let (slots, truncated) = page_slots(
            &self.versions,
            start,
            |r| r.key(),
            &request.prefix,
            request.delimiter.as_deref(),
            key_marker,
            request.max_keys,
        );

        let mut page = VersionPage {
            truncated,
            ..Default::default()
        };
        let mut last: Option<(String, String)> = None;
        for slot in slots {
            match slot {
                Slot::Item(VersionRecord::Live(v)) => {
                    last = Some((v.key.clone(), v.version_id.clone()));
                    let mut v = v.clone();
                    v.key = encode(&v.key, request.encode_keys);
                    page.versions.push(v);
                }
                Slot::Item(VersionRecord::Marker(m)) => {
                    last = Some((m.key.clone(), m.version_id.clone()));
                    let mut m = m.clone();
                    m.key = encode(&m.key, request.encode_keys);
                    page.delete_markers.push(m);
                }
                Slot::Prefix(p) => {
                    page.common_prefixes.push(encode(&p, request.encode_keys));
                }
            }
        }

        if truncated && let Some((key, version_id)) = last {
            page.next_key_marker = Some(encode(&key, request.encode_keys));
            page.next_version_id_marker = Some(version_id);
        }
        Ok(page)
    }

    async fn list_multipart_uploads(&self, request: &ListUploadsRequest) -> Result<UploadPage> {
        self.throttle()?;

        let start = match (
            request.key_marker.as_deref(),
            request.upload_id_marker.as_deref(),
        ) {
            (Some(k), Some(u)) => self
                .uploads
                .iter()
                .position(|x| x.key == k && x.upload_id == u)
                .map_or(0, |i| i + 1),
            (Some(k), None) => self.uploads.partition_point(|x| x.key.as_str() <= k),
            _ => 0,
        };

        let (slots, truncated) = page_slots(
            &self.uploads,
            start,
            |u| u.key.as_str(),
            &request.prefix,
            request.delimiter.as_deref(),
            request.key_marker.as_deref(),
            request.max_uploads,
        );

        let mut page = UploadPage {
            truncated,
            ..Default::default()
        };
        for slot in slots {
            match slot {
                Slot::Item(u) => {
                    let mut u = u.clone();
                    u.key = encode(&u.key, request.encode_keys);
                    page.uploads.push(u);
                }
                Slot::Prefix(p) => page.common_prefixes.push(p),
            }
        }
        if truncated && let Some(last) = page.uploads.last() {
            page.next_key_marker = Some(last.key.clone());
            page.next_upload_id_marker = Some(last.upload_id.clone());
        }
        Ok(page)
    }

    async fn list_parts(&self, request: &ListPartsRequest) -> Result<PartPage> {
        self.throttle()?;

        let after: i32 = request
            .part_number_marker
            .as_deref()
            .map_or(Ok(0), |m| m.parse::<i32>())
            .map_err(|_| Error::General("bad part marker".to_string()))?;
        let max = if request.max_parts <= 0 {
            1000
        } else {
            request.max_parts as usize
        };

        let remaining: Vec<&PartEntry> = self
            .parts
            .iter()
            .filter(|p| p.part_number > after)
            .collect();
        let truncated = remaining.len() > max;
        let parts: Vec<PartEntry> = remaining.into_iter().take(max).cloned().collect();
        let next_part_number_marker = if truncated {
            parts.last().map(|p| p.part_number.to_string())
        } else {
            None
        };

        Ok(PartPage {
            parts,
            truncated,
            next_part_number_marker,
        })
    }

    async fn restore_object(
        &self,
        _bucket: &str,
        key: &str,
        days: u32,
        tier: RestoreTier,
    ) -> Result<()> {
        if self.failing_restores.contains(key) {
            return Err(Error::Network(format!(
                "InvalidObjectState: restore of {key} rejected"
            )));
        }
        self.restored
            .lock()
            .unwrap()
            .push((key.to_string(), days, tier));
        Ok(())
    }
}

/// Visitor that records a compact description of every item
#[derive(Debug, Default)]
pub(crate) struct Recorder {
    pub(crate) items: Vec<String>,
    pub(crate) pages: usize,
}

#[async_trait]
impl Visitor for Recorder {
    async fn visit(&mut self, item: Item<'_>) -> Result<()> {
        let line = match item {
            Item::Prefix(p) => format!("P:{p}"),
            Item::Object(o) => format!("O:{}", o.key),
            Item::Version(v) => format!("V:{}@{}", v.key, v.version_id),
            Item::DeleteMarker(m) => format!("D:{}@{}", m.key, m.version_id),
            Item::Upload(u) => format!("U:{}#{}", u.key, u.upload_id),
            Item::Part(p) => format!("#{}", p.part_number),
        };
        self.items.push(line);
        Ok(())
    }

    async fn end_page(&mut self) -> Result<()> {
        self.pages += 1;
        Ok(())
    }
}
