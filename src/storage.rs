use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{Credentials, Region},
    presigning::PresigningConfig,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::StorageError;

/// Lifetime of a presigned logo upload URL.
const UPLOAD_URL_TTL: Duration = Duration::from_secs(600);

/// Prefix of every logo object in the bucket.
const LOGO_PREFIX: &str = "logos";

/// StorageService
///
/// The binary-object store that holds publisher logos. File bytes never pass through the
/// console: the client gets a presigned URL, uploads directly, then saves `public_url(key)` on
/// the publisher record.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Creates the logo bucket if missing. Only called for the local MinIO setup.
    async fn ensure_bucket(&self);

    /// A short-lived URL that accepts a single PUT of `key` with exactly `content_type`.
    async fn presign_upload(&self, key: &str, content_type: &str) -> Result<String, StorageError>;

    /// The public, stable reference to an uploaded object.
    fn public_url(&self, key: &str) -> String;
}

/// StorageState
pub type StorageState = Arc<dyn StorageService>;

/// logo_key
///
/// Object key for a new logo: `logos/<uuid>.<ext>`. The extension of the uploaded file name is
/// kept (lowercased) when it is plain alphanumeric, otherwise `bin` is used.
pub fn logo_key(filename: &str) -> String {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| "bin".to_string());
    format!("{}/{}.{}", LOGO_PREFIX, Uuid::new_v4(), extension)
}

/// Drops empty, `.` and `..` segments so a key always stays inside the bucket.
fn clean_key(key: &str) -> String {
    key.split('/')
        .filter(|part| !matches!(*part, "" | "." | ".."))
        .collect::<Vec<_>>()
        .join("/")
}

// --- S3 / Supabase Storage ---

/// S3StorageClient
///
/// `StorageService` over the AWS SDK, pointed at MinIO locally and at the Supabase Storage S3
/// gateway in production. Both require path-style addressing.
#[derive(Clone)]
pub struct S3StorageClient {
    client: Client,
    bucket: String,
    // Root serving public objects, e.g. https://xyz.supabase.co/storage/v1
    public_root: String,
}

impl S3StorageClient {
    pub async fn new(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
        public_root: &str,
    ) -> Self {
        let credentials = Credentials::new(access_key, secret_key, None, None, "publisher-console");
        let sdk_config = aws_sdk_s3::Config::builder()
            .behavior_version_latest()
            .endpoint_url(endpoint)
            .region(Region::new(region.to_string()))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(sdk_config),
            bucket: bucket.to_string(),
            public_root: public_root.trim_end_matches('/').to_string(),
        }
    }

    pub async fn from_config(config: &AppConfig) -> Self {
        Self::new(
            &config.s3_endpoint,
            &config.s3_region,
            &config.s3_key,
            &config.s3_secret,
            &config.s3_bucket,
            &config.public_storage_url,
        )
        .await
    }
}

#[async_trait]
impl StorageService for S3StorageClient {
    async fn ensure_bucket(&self) {
        match self.client.create_bucket().bucket(&self.bucket).send().await {
            Ok(_) => tracing::info!(bucket = %self.bucket, "created logo bucket"),
            // Usually BucketAlreadyOwnedByYou.
            Err(e) => tracing::debug!(bucket = %self.bucket, "bucket not created: {}", e),
        }
    }

    async fn presign_upload(&self, key: &str, content_type: &str) -> Result<String, StorageError> {
        let presigning = PresigningConfig::expires_in(UPLOAD_URL_TTL)
            .map_err(|e| StorageError::Presign(e.to_string()))?;

        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(clean_key(key))
            .content_type(content_type)
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::Presign(e.to_string()))?;

        Ok(request.uri().to_string())
    }

    fn public_url(&self, key: &str) -> String {
        format!(
            "{}/object/public/{}/{}",
            self.public_root,
            self.bucket,
            clean_key(key)
        )
    }
}

// --- Test Double ---

const MOCK_ROOT: &str = "http://localhost:9000";
const MOCK_BUCKET: &str = "mock-bucket";

/// MockStorageService
///
/// Offline `StorageService` with fake signatures. `unavailable()` makes every presign fail.
#[derive(Clone, Default)]
pub struct MockStorageService {
    pub unavailable: bool,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unavailable() -> Self {
        Self { unavailable: true }
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn ensure_bucket(&self) {}

    async fn presign_upload(&self, key: &str, _content_type: &str) -> Result<String, StorageError> {
        if self.unavailable {
            return Err(StorageError::Presign("mock storage unavailable".to_string()));
        }
        Ok(format!(
            "{}/{}/{}?signature=fake",
            MOCK_ROOT,
            MOCK_BUCKET,
            clean_key(key)
        ))
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/object/public/{}/{}", MOCK_ROOT, MOCK_BUCKET, clean_key(key))
    }
}
