use async_trait::async_trait;
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::error::PortalError;

/// Private blob storage for evidence files.
#[async_trait]
pub trait EvidenceObjectStore: Send + Sync {
    /// Stores a new object. Fails if `key` is already taken.
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), PortalError>;

    /// A URL that grants read access to `key` for `ttl` and nothing else.
    async fn signed_url(&self, key: &str, ttl: Duration) -> Result<String, PortalError>;
}

pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl EvidenceObjectStore for S3ObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), PortalError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .if_none_match("*")
            .send()
            .await
            .map_err(|e| {
                let taken = e
                    .as_service_error()
                    .and_then(|se| se.code())
                    .is_some_and(|code| code == "PreconditionFailed");
                if taken {
                    PortalError::Upstream(format!("Object {key} already exists"))
                } else {
                    PortalError::Upstream(format!("Failed to store {key}: {e}"))
                }
            })?;
        Ok(())
    }

    async fn signed_url(&self, key: &str, ttl: Duration) -> Result<String, PortalError> {
        let presigning = PresigningConfig::expires_in(ttl)
            .map_err(|e| PortalError::Internal(format!("Invalid signed URL lifetime: {e}")))?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| PortalError::Upstream(format!("Failed to sign {key}: {e}")))?;
        Ok(request.uri().to_string())
    }
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Object store kept in memory. Writes to keys containing a registered
/// fragment fail, which lets callers exercise partial upload failures.
#[derive(Debug, Clone, Default)]
pub struct InMemoryObjectStore {
    objects: Arc<RwLock<HashMap<String, StoredObject>>>,
    failing_fragments: Arc<RwLock<Vec<String>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_writes_containing(&self, fragment: impl Into<String>) {
        self.failing_fragments.write().await.push(fragment.into());
    }

    pub async fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.read().await.get(key).cloned()
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl EvidenceObjectStore for InMemoryObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), PortalError> {
        let failing = self.failing_fragments.read().await;
        if failing.iter().any(|f| key.contains(f.as_str())) {
            return Err(PortalError::Upstream(format!("Failed to store {key}")));
        }
        drop(failing);
        let mut objects = self.objects.write().await;
        if objects.contains_key(key) {
            return Err(PortalError::Upstream(format!("Object {key} already exists")));
        }
        objects.insert(
            key.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn signed_url(&self, key: &str, ttl: Duration) -> Result<String, PortalError> {
        if !self.objects.read().await.contains_key(key) {
            return Err(PortalError::Upstream(format!("No such object: {key}")));
        }
        Ok(format!("memory://evidence/{key}?expires_in={}", ttl.as_secs()))
    }
}
