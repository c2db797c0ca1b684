//! Canned listing service for command tests

use std::sync::Mutex;

use async_trait::async_trait;
use bw_core::{
    BucketArch, Error, ListObjectsRequest, ListPartsRequest, ListUploadsRequest,
    ListVersionsRequest, ListingService, ObjectEntry, ObjectPage, PartPage, RestoreTier, Result,
    UploadPage, VersionPage,
};

pub(crate) fn object(key: &str, class: &str, size: i64) -> ObjectEntry {
    ObjectEntry {
        key: key.to_string(),
        storage_class: class.to_string(),
        size_bytes: size,
        last_modified: "2024-05-01T12:00:00Z".to_string(),
        etag: "\"abc\"".to_string(),
        restore_status: None,
    }
}

/// Serves pre-built pages in order; the prefix of each request is recorded
pub(crate) struct CannedService {
    pub arch: BucketArch,
    pub object_pages: Mutex<Vec<ObjectPage>>,
    pub version_pages: Mutex<Vec<VersionPage>>,
    pub upload_pages: Mutex<Vec<UploadPage>>,
    pub part_pages: Mutex<Vec<PartPage>>,
    pub prefixes: Mutex<Vec<String>>,
}

impl CannedService {
    pub(crate) fn new(arch: BucketArch) -> Self {
        Self {
            arch,
            object_pages: Mutex::new(Vec::new()),
            version_pages: Mutex::new(Vec::new()),
            upload_pages: Mutex::new(Vec::new()),
            part_pages: Mutex::new(Vec::new()),
            prefixes: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_objects(self, page: ObjectPage) -> Self {
        self.object_pages.lock().unwrap().push(page);
        self
    }

    pub(crate) fn with_versions(self, page: VersionPage) -> Self {
        self.version_pages.lock().unwrap().push(page);
        self
    }

    pub(crate) fn with_uploads(self, page: UploadPage) -> Self {
        self.upload_pages.lock().unwrap().push(page);
        self
    }

    pub(crate) fn with_parts(self, page: PartPage) -> Self {
        self.part_pages.lock().unwrap().push(page);
        self
    }
}

fn next<T: Default>(pages: &Mutex<Vec<T>>) -> T {
    let mut pages = pages.lock().unwrap();
    if pages.is_empty() {
        T::default()
    } else {
        pages.remove(0)
    }
}

#[async_trait]
impl ListingService for CannedService {
    async fn bucket_arch(&self, _bucket: &str) -> Result<BucketArch> {
        Ok(self.arch)
    }

    async fn list_objects(&self, request: &ListObjectsRequest) -> Result<ObjectPage> {
        self.prefixes.lock().unwrap().push(request.prefix.clone());
        Ok(next(&self.object_pages))
    }

    async fn list_object_versions(&self, _request: &ListVersionsRequest) -> Result<VersionPage> {
        Ok(next(&self.version_pages))
    }

    async fn list_multipart_uploads(&self, _request: &ListUploadsRequest) -> Result<UploadPage> {
        Ok(next(&self.upload_pages))
    }

    async fn list_parts(&self, _request: &ListPartsRequest) -> Result<PartPage> {
        Ok(next(&self.part_pages))
    }

    async fn restore_object(
        &self,
        _bucket: &str,
        key: &str,
        _days: u32,
        _tier: RestoreTier,
    ) -> Result<()> {
        Err(Error::General(format!("unexpected restore of {key}")))
    }
}
