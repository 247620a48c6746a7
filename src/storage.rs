use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::presigning::PresigningConfig;
use std::sync::Arc;
use std::time::Duration;

/// StorageService
///
/// Contract for the cover-image storage layer. Administrators upload covers
/// directly to object storage via presigned URLs; only the resulting object
/// key is stored on the book record. The trait lets tests swap the real S3
/// client for the in-memory mock.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Ensures the cover bucket exists. Used at startup in `Env::Local` to
    /// provision the bucket in MinIO automatically. No-op in production.
    async fn ensure_bucket_exists(&self);

    /// Generates a temporary, signed URL allowing a direct PUT of a cover
    /// image into the bucket, constrained by expiry and content type.
    ///
    /// # Arguments
    /// * `key`: the final object key (e.g. `covers/<uuid>.jpg`).
    /// * `content_type`: the MIME type the upload must carry.
    async fn presign_cover_upload(&self, key: &str, content_type: &str)
    -> Result<String, String>;
}

/// S3CoverStorage
///
/// Production implementation over the AWS SDK. S3 compatibility covers both
/// the local Dockerized MinIO and a hosted bucket in production;
/// `force_path_style(true)` is what makes the MinIO endpoint work.
#[derive(Clone)]
pub struct S3CoverStorage {
    client: s3::Client,
    bucket_name: String,
}

impl S3CoverStorage {
    /// Builds the client from the credentials resolved by AppConfig.
    pub async fn new(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
    ) -> Self {
        let credentials =
            s3::config::Credentials::new(access_key, secret_key, None, None, "static");

        let config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .region(s3::config::Region::new(region.to_string()))
            .behavior_version_latest()
            // Path-style addressing (http://endpoint/bucket/key) is required
            // for MinIO.
            .force_path_style(true)
            .build();

        let client = s3::Client::from_conf(config);

        Self {
            client,
            bucket_name: bucket.to_string(),
        }
    }
}

#[async_trait]
impl StorageService for S3CoverStorage {
    /// CreateBucket is idempotent, so this is safe to call at every startup.
    async fn ensure_bucket_exists(&self) {
        let _ = self
            .client
            .create_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await;
    }

    async fn presign_cover_upload(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<String, String> {
        // Ten minutes is plenty for a cover image upload.
        let expires_in = Duration::from_secs(600);

        let presigned_req = self
            .client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            // The signed URL only accepts uploads with this Content-Type.
            .content_type(content_type)
            .presigned(PresigningConfig::expires_in(expires_in).unwrap())
            .await
            .map_err(|e| e.to_string())?;

        Ok(presigned_req.uri().to_string())
    }
}

/// Strips directory navigation components (`..`, `.`) out of a user-provided
/// key segment to prevent path traversal.
fn sanitize_key(key: &str) -> String {
    key.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".." && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// MockStorageService
///
/// Test double for `StorageService`. Lets the presigned-upload handler be
/// exercised without a network connection to S3/MinIO.
#[derive(Clone)]
pub struct MockStorageService {
    /// When true, all operations return a simulated failure.
    pub should_fail: bool,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self { should_fail: false }
    }

    pub fn new_failing() -> Self {
        Self { should_fail: true }
    }
}

impl Default for MockStorageService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn ensure_bucket_exists(&self) {
        // No-op in the mock.
    }

    async fn presign_cover_upload(
        &self,
        key: &str,
        _content_type: &str,
    ) -> Result<String, String> {
        if self.should_fail {
            return Err("Mock Storage Error: simulated failure".to_string());
        }

        let sanitized_key = sanitize_key(key);

        // Deterministic local-style URL for assertions.
        Ok(format!(
            "http://localhost:9000/mock-covers/{}?signature=fake",
            sanitized_key
        ))
    }
}

/// StorageState
///
/// The concrete type used to share the storage service across the
/// application state.
pub type StorageState = Arc<dyn StorageService>;
