use super::store::ObjectStore;
use crate::hosting::Acl;
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: String,
    pub acl: Acl,
    /// MD5 of the body, hex encoded, like an S3 single-part ETag.
    pub etag: String,
    pub redirect: Option<String>,
}

/// Failure injected into the next calls of a [`MemoryObjectStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreFault {
    Permission,
    Service,
    Transient,
}

impl StoreFault {
    fn to_error(self, key: &str) -> Error {
        match self {
            StoreFault::Permission => Error::permission("s3", key, "Access Denied"),
            StoreFault::Service => Error::service("s3", key, "Internal Error"),
            StoreFault::Transient => Error::transient("s3", key, "connection reset"),
        }
    }
}

type Buckets = HashMap<String, HashMap<String, StoredObject>>;

/// In-memory object store with call counters and fault injection.
#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    buckets: Arc<Mutex<Buckets>>,
    faults: Arc<Mutex<Vec<StoreFault>>>,
    put_count: Arc<Mutex<usize>>,
    exists_count: Arc<Mutex<usize>>,
    delete_count: Arc<Mutex<usize>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(self, bucket: &str, key: &str, body: &[u8]) -> Self {
        self.insert(bucket, key, body, "application/octet-stream", Acl::Private, None);
        self
    }

    /// Fail the next writes, in order, with the given faults.
    pub fn with_faults(self, faults: &[StoreFault]) -> Self {
        self.faults.lock().unwrap().extend_from_slice(faults);
        self
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.buckets
            .lock()
            .unwrap()
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .cloned()
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .buckets
            .lock()
            .unwrap()
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    pub fn get_put_count(&self) -> usize {
        *self.put_count.lock().unwrap()
    }

    pub fn get_exists_count(&self) -> usize {
        *self.exists_count.lock().unwrap()
    }

    pub fn get_delete_count(&self) -> usize {
        *self.delete_count.lock().unwrap()
    }

    fn insert(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
        content_type: &str,
        acl: Acl,
        redirect: Option<String>,
    ) {
        let object = StoredObject {
            body: body.to_vec(),
            content_type: content_type.to_string(),
            acl,
            etag: format!("{:x}", md5::compute(body)),
            redirect,
        };
        self.buckets
            .lock()
            .unwrap()
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), object);
    }

    fn take_fault(&self, key: &str) -> Result<()> {
        let mut faults = self.faults.lock().unwrap();
        if faults.is_empty() {
            return Ok(());
        }
        Err(faults.remove(0).to_error(key))
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
        content_type: &str,
        acl: Acl,
    ) -> Result<()> {
        *self.put_count.lock().unwrap() += 1;
        self.take_fault(key)?;
        self.insert(bucket, key, body, content_type, acl, None);
        Ok(())
    }

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        *self.exists_count.lock().unwrap() += 1;
        Ok(self.get(bucket, key).is_some())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        *self.delete_count.lock().unwrap() += 1;
        self.take_fault(key)?;
        if let Some(objects) = self.buckets.lock().unwrap().get_mut(bucket) {
            objects.remove(key);
        }
        Ok(())
    }

    async fn put_redirect(&self, bucket: &str, key: &str, location: &str) -> Result<()> {
        *self.put_count.lock().unwrap() += 1;
        self.take_fault(key)?;
        self.insert(bucket, key, b"", "", Acl::Private, Some(location.to_string()));
        Ok(())
    }
}
