use super::{CdnBackend, ObjectStore, ObjectStoreBackend, PutOutcome, PutRequest};
use crate::hosting::Acl;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Primary copy of every rendition: always public-read, addressed directly
/// at `http://s3.<host>/<bucket>/<key>`.
pub struct PrimaryOriginBackend {
    inner: ObjectStoreBackend,
    origin: String,
}

impl PrimaryOriginBackend {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: &str, s3_host: &str) -> Self {
        let origin = format!("http://s3.{}/{}", s3_host, bucket);
        Self {
            inner: ObjectStoreBackend::new(store, bucket, Acl::PublicRead, vec![origin.clone()]),
            origin,
        }
    }
}

#[async_trait]
impl CdnBackend for PrimaryOriginBackend {
    fn name(&self) -> &'static str {
        "primary-origin"
    }

    async fn put(&self, request: PutRequest<'_>) -> Result<PutOutcome> {
        self.inner.put_with_acl(request, Acl::PublicRead).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete_key(key).await
    }

    fn resolve_public_urls(&self, key: &str) -> Vec<String> {
        vec![format!("{}/{}", self.origin, key)]
    }

    fn key_for_url(&self, url: &str) -> Option<String> {
        self.inner.key_for_url(url)
    }
}
