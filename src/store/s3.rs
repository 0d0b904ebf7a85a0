use async_trait::async_trait;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CompletedMultipartUpload, CompletedPart, CreateBucketConfiguration,
};
use aws_sdk_s3::Client;
use bytes::Bytes;
use futures::{stream, StreamExt, TryStreamExt};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{ObjectStore, StoredObject};
use crate::error::StoreError;

/// Default size of one multipart upload part (8 MiB).
pub const DEFAULT_UPLOAD_PART_SIZE: usize = 8 * 1024 * 1024;

/// Smallest part S3 accepts for every part except the last (5 MiB).
pub const MIN_UPLOAD_PART_SIZE: usize = 5 * 1024 * 1024;

/// Default number of parts uploaded concurrently.
pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 4;

/// S3-backed implementation of [`ObjectStore`].
///
/// Large bodies are written with a multipart upload: the body is split into
/// fixed-size parts and at most `upload_concurrency` parts are in flight at
/// once. The object only appears at its key when the upload is completed,
/// and a failed or abandoned upload is aborted.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    public_base_url: String,
    upload_part_size: usize,
    upload_concurrency: usize,
}

impl S3ObjectStore {
    /// Create a store for the given bucket with default upload settings.
    pub fn new(client: Client, bucket: String) -> Self {
        let public_base_url = format!("https://{}.s3.amazonaws.com", bucket);
        Self {
            client,
            bucket,
            public_base_url,
            upload_part_size: DEFAULT_UPLOAD_PART_SIZE,
            upload_concurrency: DEFAULT_UPLOAD_CONCURRENCY,
        }
    }

    /// Set the base URL used to build object locations.
    pub fn with_public_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.public_base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the multipart part size and the number of concurrent part uploads.
    pub fn with_upload_parts(mut self, part_size: usize, concurrency: usize) -> Self {
        self.upload_part_size = part_size.max(MIN_UPLOAD_PART_SIZE);
        self.upload_concurrency = concurrency.max(1);
        self
    }

    /// Get the bucket name.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Create the bucket if it does not exist yet.
    pub async fn ensure_bucket(&self, region: &str) -> Result<(), StoreError> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => return Ok(()),
            Err(e) => {
                let missing = e
                    .as_service_error()
                    .map(|se| se.is_not_found())
                    .unwrap_or(false)
                    || status_is_404(&e);
                if !missing {
                    return Err(sdk_error(&e));
                }
            }
        }

        info!(bucket = %self.bucket, "Bucket does not exist, creating it");

        let mut request = self.client.create_bucket().bucket(&self.bucket);
        // us-east-1 rejects an explicit location constraint
        if region != "us-east-1" {
            let config = CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(region))
                .build();
            request = request.create_bucket_configuration(config);
        }
        request.send().await.map_err(|e| sdk_error(&e))?;

        Ok(())
    }

    async fn put_multipart(
        &self,
        key: &str,
        body: Bytes,
        content_type: Option<&str>,
    ) -> Result<(), StoreError> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .set_content_type(content_type.map(str::to_string))
            .send()
            .await
            .map_err(|e| sdk_error(&e))?;

        let upload_id = created
            .upload_id()
            .ok_or_else(|| StoreError::S3(format!("no upload id returned for {}", key)))?
            .to_string();

        let mut pending = PendingUpload::new(self, key, &upload_id);

        let parts = match self.upload_parts(key, &upload_id, &body).await {
            Ok(parts) => parts,
            Err(e) => {
                self.abort_multipart(key, &upload_id).await;
                pending.disarm();
                return Err(e);
            }
        };

        let completed = self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(&upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await;

        if let Err(e) = completed {
            self.abort_multipart(key, &upload_id).await;
            pending.disarm();
            return Err(sdk_error(&e));
        }

        pending.disarm();
        Ok(())
    }

    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        body: &Bytes,
    ) -> Result<Vec<CompletedPart>, StoreError> {
        let part_size = self.upload_part_size;
        let part_count = body.len().div_ceil(part_size);

        debug!(
            key = key,
            parts = part_count,
            concurrency = self.upload_concurrency,
            "Starting multipart upload"
        );

        let mut parts: Vec<CompletedPart> = stream::iter(0..part_count)
            .map(|index| {
                let start = index * part_size;
                let end = (start + part_size).min(body.len());
                let chunk = body.slice(start..end);
                // Part numbers are 1-based
                let part_number = index as i32 + 1;

                async move {
                    let uploaded = self
                        .client
                        .upload_part()
                        .bucket(&self.bucket)
                        .key(key)
                        .upload_id(upload_id)
                        .part_number(part_number)
                        .body(ByteStream::from(chunk))
                        .send()
                        .await
                        .map_err(|e| sdk_error(&e))?;

                    Ok::<_, StoreError>(
                        CompletedPart::builder()
                            .set_e_tag(uploaded.e_tag().map(str::to_string))
                            .part_number(part_number)
                            .build(),
                    )
                }
            })
            .buffer_unordered(self.upload_concurrency)
            .try_collect()
            .await?;

        parts.sort_by_key(|part| part.part_number());
        Ok(parts)
    }

    async fn abort_multipart(&self, key: &str, upload_id: &str) {
        let aborted = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await;

        if let Err(e) = aborted {
            warn!(key = key, "Failed to abort multipart upload: {}", DisplayErrorContext(&e));
        }
    }
}

/// An open multipart upload that is aborted unless it is disarmed.
///
/// Dropping it armed (the `put` future was dropped mid-upload) spawns the
/// abort onto the current runtime so no orphaned parts stay in the bucket.
struct PendingUpload {
    store: Option<S3ObjectStore>,
    key: String,
    upload_id: String,
}

impl PendingUpload {
    fn new(store: &S3ObjectStore, key: &str, upload_id: &str) -> Self {
        Self {
            store: Some(store.clone()),
            key: key.to_string(),
            upload_id: upload_id.to_string(),
        }
    }

    fn disarm(&mut self) {
        self.store = None;
    }

    fn spawn_abort(&mut self) -> Option<JoinHandle<()>> {
        let store = self.store.take()?;
        let runtime = Handle::try_current().ok()?;
        let key = self.key.clone();
        let upload_id = self.upload_id.clone();

        debug!(key = %key, "Aborting abandoned multipart upload");
        Some(runtime.spawn(async move {
            store.abort_multipart(&key, &upload_id).await;
        }))
    }
}

impl Drop for PendingUpload {
    fn drop(&mut self) {
        self.spawn_abort();
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(
        &self,
        key: &str,
        body: Bytes,
        content_type: Option<&str>,
    ) -> Result<(), StoreError> {
        if body.len() > self.upload_part_size {
            return self.put_multipart(key, body, content_type).await;
        }

        debug!(key = key, size = body.len(), "Storing object");
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .set_content_type(content_type.map(str::to_string))
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| sdk_error(&e))?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<StoredObject, StoreError> {
        debug!(key = key, "Retrieving object");
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let is_missing = e
                    .as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false)
                    || status_is_404(&e);

                if is_missing {
                    StoreError::NotFound(format!("s3://{}/{}", self.bucket, key))
                } else {
                    sdk_error(&e)
                }
            })?;

        let content_type = resp.content_type().map(str::to_string);
        let body = resp
            .body
            .collect()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?
            .into_bytes();

        Ok(StoredObject { body, content_type })
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let head = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match head {
            Ok(_) => Ok(true),
            Err(e) => {
                let is_missing = e
                    .as_service_error()
                    .map(|se| se.is_not_found())
                    .unwrap_or(false)
                    || status_is_404(&e);

                if is_missing {
                    Ok(false)
                } else {
                    Err(sdk_error(&e))
                }
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        debug!(key = key, "Deleting object");
        // S3 reports success for keys that do not exist
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| sdk_error(&e))?;

        Ok(())
    }

    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .max_keys(1000);

            if let Some(token) = continuation_token {
                request = request.continuation_token(token);
            }

            let result = request.send().await.map_err(|e| sdk_error(&e))?;

            keys.extend(
                result
                    .contents()
                    .iter()
                    .filter_map(|obj| obj.key().map(str::to_string)),
            );

            if result.is_truncated() == Some(true) {
                continuation_token = result.next_continuation_token().map(str::to_string);
            } else {
                break;
            }
        }

        Ok(keys)
    }

    fn url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, urlencoding::encode(key))
    }
}

/// Map an SDK failure onto the gateway error kinds.
fn sdk_error<E, R>(err: &SdkError<E, R>) -> StoreError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let message = DisplayErrorContext(err).to_string();
    match err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => StoreError::Connection(message),
        _ => StoreError::S3(message),
    }
}

fn status_is_404<E>(err: &SdkError<E, aws_sdk_s3::config::http::HttpResponse>) -> bool {
    err.raw_response()
        .map(|r| r.status().as_u16() == 404)
        .unwrap_or(false)
}

/// Base URL under which objects of `bucket` are publicly addressable.
///
/// Custom endpoints (MinIO, etc.) use path-style addressing, matching the
/// client built by [`create_s3_client`].
pub fn default_public_url(bucket: &str, region: &str, endpoint: Option<&str>) -> String {
    match endpoint {
        Some(endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), bucket),
        None => format!("https://{}.s3.{}.amazonaws.com", bucket, region),
    }
}

/// Create an S3 client with optional custom endpoint and region.
///
/// Use a custom endpoint for S3-compatible services like MinIO:
/// ```ignore
/// let client = create_s3_client(Some("http://localhost:9000"), "us-east-1").await;
/// ```
pub async fn create_s3_client(endpoint_url: Option<&str>, region: &str) -> Client {
    let region = aws_config::Region::new(region.to_string());
    let mut config_loader =
        aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region);

    if let Some(endpoint) = endpoint_url {
        config_loader = config_loader.endpoint_url(endpoint);
    }

    let sdk_config = config_loader.load().await;

    // S3-compatible services usually need path-style addressing
    let s3_config = if endpoint_url.is_some() {
        aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build()
    } else {
        aws_sdk_s3::config::Builder::from(&sdk_config).build()
    };

    Client::from_conf(s3_config)
}
