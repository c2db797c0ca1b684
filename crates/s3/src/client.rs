//! S3 client implementation
//!
//! Wraps aws-sdk-s3 and implements the ListingService trait from bw-core.
//! Listing uses the v1 marker API so that flat, version and upload listings
//! all paginate the same way.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::types::{
    EncodingType, GlacierJobParameters, OptionalObjectAttributes, RestoreRequest, RestoreStatus,
    Tier,
};
use aws_smithy_runtime_api::client::orchestrator::HttpResponse;
use aws_smithy_types::DateTime;
use aws_smithy_types::date_time::Format;
use bw_core::{
    Alias, BucketArch, DeleteMarkerEntry, Error, ListObjectsRequest, ListPartsRequest,
    ListUploadsRequest, ListVersionsRequest, ListingService, ObjectEntry, ObjectPage, PartEntry,
    PartPage, RestoreTier, Result, UploadEntry, UploadPage, VersionEntry, VersionPage,
};

/// Response header carrying the bucket architecture
const BUCKET_ARCH_HEADER: &str = "x-cos-bucket-arch";

/// S3 client wrapper
pub struct S3Client {
    inner: aws_sdk_s3::Client,
}

impl S3Client {
    /// Create a new S3 client from an alias configuration
    pub async fn new(alias: Alias) -> Result<Self> {
        let credentials = aws_credential_types::Credentials::new(
            alias.access_key.clone(),
            alias.secret_key.clone(),
            None, // session token
            None, // expiry
            "bw-static-credentials",
        );

        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(aws_config::Region::new(alias.region.clone()))
            .endpoint_url(&alias.endpoint)
            .load()
            .await;

        // Path-style addressing unless the alias asks for virtual hosts
        let s3_config = aws_sdk_s3::config::Builder::from(&config)
            .force_path_style(alias.bucket_lookup == "path" || alias.bucket_lookup == "auto")
            .build();

        tracing::debug!(alias = %alias.name, endpoint = %alias.endpoint, "Created S3 client");

        Ok(Self {
            inner: aws_sdk_s3::Client::from_conf(s3_config),
        })
    }

    /// Get the underlying aws-sdk-s3 client
    pub fn inner(&self) -> &aws_sdk_s3::Client {
        &self.inner
    }

    /// Format AWS SDK error into a detailed error message
    fn format_sdk_error<E: std::fmt::Display>(error: &SdkError<E, HttpResponse>) -> String {
        match error {
            SdkError::ServiceError(service_err) => {
                let err = service_err.err();
                let meta = service_err.raw();
                let mut msg = format!("Service error: {err} (status: {})", meta.status().as_u16());
                if let Some(code) = meta.headers().get("x-amz-error-code") {
                    msg.push_str(&format!(" (code: {code})"));
                }
                msg
            }
            SdkError::ConstructionFailure(err) => {
                format!("Request construction failed: {err:?}")
            }
            SdkError::TimeoutError(_) => "Request timeout".to_string(),
            SdkError::DispatchFailure(err) => format!("Network dispatch error: {err:?}"),
            SdkError::ResponseError(err) => format!("Response error: {err:?}"),
            _ => error.to_string(),
        }
    }

    /// Map an SDK failure onto the error taxonomy
    fn classify<E>(operation: &str, error: SdkError<E, HttpResponse>) -> Error
    where
        E: ProvideErrorMetadata + std::fmt::Display,
    {
        let status = error.raw_response().map(|r| r.status().as_u16());
        let code = error.code().map(str::to_string);
        let message = format!("{operation}: {}", Self::format_sdk_error(&error));
        classify_status(status, code.as_deref(), message)
    }
}

/// Throttling and unavailability are the only retryable class
pub(crate) fn classify_status(status: Option<u16>, code: Option<&str>, message: String) -> Error {
    match (status, code) {
        (Some(503 | 429), _)
        | (_, Some("SlowDown" | "ServiceUnavailable" | "RequestLimitExceeded")) => {
            Error::ServiceUnavailable(message)
        }
        (Some(401 | 403), _)
        | (_, Some("AccessDenied" | "InvalidAccessKeyId" | "SignatureDoesNotMatch")) => {
            Error::Auth(message)
        }
        (Some(404), _) | (_, Some("NoSuchBucket" | "NoSuchKey" | "NoSuchUpload")) => {
            Error::NotFound(message)
        }
        _ => Error::Network(message),
    }
}

pub(crate) fn parse_arch(header: Option<&str>) -> BucketArch {
    match header {
        Some(value) if value.trim().eq_ignore_ascii_case("OFS") => BucketArch::Tree,
        _ => BucketArch::Flat,
    }
}

/// Render a service timestamp as RFC 3339
pub(crate) fn timestamp(value: Option<&DateTime>) -> Result<String> {
    let Some(value) = value else {
        return Ok(String::new());
    };
    value.fmt(Format::DateTime).map_err(|e| Error::TimeParse {
        value: value.secs().to_string(),
        message: e.to_string(),
    })
}

pub(crate) fn format_restore_status(status: &RestoreStatus) -> String {
    if status.is_restore_in_progress().unwrap_or(false) {
        return "ongoing-request=\"true\"".to_string();
    }
    match status.restore_expiry_date().and_then(|d| d.fmt(Format::HttpDate).ok()) {
        Some(expiry) => format!("ongoing-request=\"false\", expiry-date=\"{expiry}\""),
        None => "ongoing-request=\"false\"".to_string(),
    }
}

fn etag(value: Option<&str>) -> String {
    value.unwrap_or_default().to_string()
}

fn encoding(encode_keys: bool) -> Option<EncodingType> {
    encode_keys.then_some(EncodingType::Url)
}

fn restore_tier(tier: RestoreTier) -> Tier {
    match tier {
        RestoreTier::Expedited => Tier::Expedited,
        RestoreTier::Standard => Tier::Standard,
        RestoreTier::Bulk => Tier::Bulk,
    }
}

#[async_trait]
impl ListingService for S3Client {
    async fn bucket_arch(&self, bucket: &str) -> Result<BucketArch> {
        let captured: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
        let sink = captured.clone();

        self.inner
            .head_bucket()
            .bucket(bucket)
            .customize()
            .mutate_response(move |response| {
                if let Some(value) = response.headers().get(BUCKET_ARCH_HEADER)
                    && let Ok(mut slot) = sink.lock()
                {
                    *slot = Some(value.to_string());
                }
            })
            .send()
            .await
            .map_err(|e| Self::classify("head bucket", e))?;

        let header = captured.lock().ok().and_then(|slot| slot.clone());
        let arch = parse_arch(header.as_deref());
        tracing::debug!(bucket, ?arch, "Probed bucket architecture");
        Ok(arch)
    }

    async fn list_objects(&self, request: &ListObjectsRequest) -> Result<ObjectPage> {
        let response = self
            .inner
            .list_objects()
            .bucket(&request.bucket)
            .prefix(&request.prefix)
            .set_delimiter(request.delimiter.clone())
            .set_marker(request.marker.clone())
            .max_keys(request.max_keys)
            .set_encoding_type(encoding(request.encode_keys))
            .optional_object_attributes(OptionalObjectAttributes::RestoreStatus)
            .send()
            .await
            .map_err(|e| Self::classify("list objects", e))?;

        let mut entries = Vec::with_capacity(response.contents().len());
        for object in response.contents() {
            entries.push(ObjectEntry {
                key: object.key().unwrap_or_default().to_string(),
                storage_class: object
                    .storage_class()
                    .map_or("STANDARD", |c| c.as_str())
                    .to_string(),
                size_bytes: object.size().unwrap_or(0),
                last_modified: timestamp(object.last_modified())?,
                etag: etag(object.e_tag()),
                restore_status: object.restore_status().map(format_restore_status),
            });
        }

        Ok(ObjectPage {
            entries,
            common_prefixes: response
                .common_prefixes()
                .iter()
                .filter_map(|p| p.prefix().map(str::to_string))
                .collect(),
            truncated: response.is_truncated().unwrap_or(false),
            next_marker: response.next_marker().map(str::to_string),
        })
    }

    async fn list_object_versions(&self, request: &ListVersionsRequest) -> Result<VersionPage> {
        let response = self
            .inner
            .list_object_versions()
            .bucket(&request.bucket)
            .prefix(&request.prefix)
            .set_delimiter(request.delimiter.clone())
            .set_key_marker(request.key_marker.clone())
            .set_version_id_marker(request.version_id_marker.clone())
            .max_keys(request.max_keys)
            .set_encoding_type(encoding(request.encode_keys))
            .send()
            .await
            .map_err(|e| Self::classify("list object versions", e))?;

        let mut versions = Vec::with_capacity(response.versions().len());
        for v in response.versions() {
            versions.push(VersionEntry {
                key: v.key().unwrap_or_default().to_string(),
                version_id: v.version_id().unwrap_or("null").to_string(),
                is_latest: v.is_latest().unwrap_or(false),
                storage_class: v
                    .storage_class()
                    .map_or("STANDARD", |c| c.as_str())
                    .to_string(),
                size_bytes: v.size().unwrap_or(0),
                last_modified: timestamp(v.last_modified())?,
                etag: etag(v.e_tag()),
            });
        }

        let mut delete_markers = Vec::with_capacity(response.delete_markers().len());
        for m in response.delete_markers() {
            delete_markers.push(DeleteMarkerEntry {
                key: m.key().unwrap_or_default().to_string(),
                version_id: m.version_id().unwrap_or("null").to_string(),
                is_latest: m.is_latest().unwrap_or(false),
                last_modified: timestamp(m.last_modified())?,
            });
        }

        Ok(VersionPage {
            versions,
            delete_markers,
            common_prefixes: response
                .common_prefixes()
                .iter()
                .filter_map(|p| p.prefix().map(str::to_string))
                .collect(),
            truncated: response.is_truncated().unwrap_or(false),
            next_key_marker: response.next_key_marker().map(str::to_string),
            next_version_id_marker: response.next_version_id_marker().map(str::to_string),
        })
    }

    async fn list_multipart_uploads(&self, request: &ListUploadsRequest) -> Result<UploadPage> {
        let response = self
            .inner
            .list_multipart_uploads()
            .bucket(&request.bucket)
            .prefix(&request.prefix)
            .set_delimiter(request.delimiter.clone())
            .set_key_marker(request.key_marker.clone())
            .set_upload_id_marker(request.upload_id_marker.clone())
            .max_uploads(request.max_uploads)
            .set_encoding_type(encoding(request.encode_keys))
            .send()
            .await
            .map_err(|e| Self::classify("list multipart uploads", e))?;

        let mut uploads = Vec::with_capacity(response.uploads().len());
        for upload in response.uploads() {
            uploads.push(UploadEntry {
                key: upload.key().unwrap_or_default().to_string(),
                upload_id: upload.upload_id().unwrap_or_default().to_string(),
                initiated: timestamp(upload.initiated())?,
            });
        }

        Ok(UploadPage {
            uploads,
            common_prefixes: response
                .common_prefixes()
                .iter()
                .filter_map(|p| p.prefix().map(str::to_string))
                .collect(),
            truncated: response.is_truncated().unwrap_or(false),
            next_key_marker: response.next_key_marker().map(str::to_string),
            next_upload_id_marker: response.next_upload_id_marker().map(str::to_string),
        })
    }

    async fn list_parts(&self, request: &ListPartsRequest) -> Result<PartPage> {
        let response = self
            .inner
            .list_parts()
            .bucket(&request.bucket)
            .key(&request.key)
            .upload_id(&request.upload_id)
            .set_part_number_marker(request.part_number_marker.clone())
            .max_parts(request.max_parts)
            .send()
            .await
            .map_err(|e| Self::classify("list parts", e))?;

        let mut parts = Vec::with_capacity(response.parts().len());
        for part in response.parts() {
            parts.push(PartEntry {
                part_number: part.part_number().unwrap_or(0),
                size_bytes: part.size().unwrap_or(0),
                etag: etag(part.e_tag()),
                last_modified: timestamp(part.last_modified())?,
            });
        }

        Ok(PartPage {
            parts,
            truncated: response.is_truncated().unwrap_or(false),
            next_part_number_marker: response.next_part_number_marker().map(str::to_string),
        })
    }

    async fn restore_object(
        &self,
        bucket: &str,
        key: &str,
        days: u32,
        tier: RestoreTier,
    ) -> Result<()> {
        let job = GlacierJobParameters::builder()
            .tier(restore_tier(tier))
            .build()
            .map_err(|e| Error::General(format!("restore request: {e}")))?;
        let days = i32::try_from(days)
            .map_err(|_| Error::General(format!("restore days out of range: {days}")))?;
        let restore = RestoreRequest::builder()
            .days(days)
            .glacier_job_parameters(job)
            .build();

        self.inner
            .restore_object()
            .bucket(bucket)
            .key(key)
            .restore_request(restore)
            .send()
            .await
            .map_err(|e| Self::classify("restore object", e))?;

        Ok(())
    }
}
