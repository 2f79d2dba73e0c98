use super::{prefixed_urls, strip_prefixes, CdnBackend, ObjectStore, PutOutcome, PutRequest};
use crate::hosting::Acl;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Customer or managed bucket served through CDN prefixes.
pub struct ObjectStoreBackend {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    acl: Acl,
    cdn_prefixes: Vec<String>,
}

impl ObjectStoreBackend {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bucket: &str,
        acl: Acl,
        cdn_prefixes: Vec<String>,
    ) -> Self {
        Self {
            store,
            bucket: bucket.to_string(),
            acl,
            cdn_prefixes,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Shared put path for the object-store drivers.
    pub(crate) async fn put_with_acl(&self, request: PutRequest<'_>, acl: Acl) -> Result<PutOutcome> {
        if !request.overwrite && self.store.exists(&self.bucket, request.key).await? {
            debug!("{} already in {}; not overwriting", request.key, self.bucket);
            return Ok(PutOutcome::AlreadyPresent { location: None });
        }

        self.store
            .put_object(
                &self.bucket,
                request.key,
                request.body,
                request.content_type,
                acl,
            )
            .await?;
        Ok(PutOutcome::Stored { location: None })
    }

    pub(crate) async fn delete_key(&self, key: &str) -> Result<()> {
        self.store.delete_object(&self.bucket, key).await
    }
}

#[async_trait]
impl CdnBackend for ObjectStoreBackend {
    fn name(&self) -> &'static str {
        "s3"
    }

    async fn put(&self, request: PutRequest<'_>) -> Result<PutOutcome> {
        self.put_with_acl(request, self.acl).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.delete_key(key).await
    }

    fn resolve_public_urls(&self, key: &str) -> Vec<String> {
        prefixed_urls(&self.cdn_prefixes, key)
    }

    fn key_for_url(&self, url: &str) -> Option<String> {
        strip_prefixes(&self.cdn_prefixes, url)
    }
}
