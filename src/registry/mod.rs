//! Serving-URL registry
//!
//! Maps an asset id to the `(width, height) -> url` pairs readers resolve.
//! Writes are an optimistic read-modify-write against a [`MetadataStore`],
//! retried when another writer for the same asset lands first.

pub mod store;

pub use store::{MemoryMetadataStore, MetadataStore, Versioned};

use crate::models::RenditionSize;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

const DEFAULT_MAX_ATTEMPTS: usize = 5;

/// Serving URLs of one asset, ordered by size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredSet", into = "StoredSet")]
pub struct ServingUrlSet {
    pub asset_id: String,
    urls: BTreeMap<RenditionSize, String>,
}

// JSON object keys must be strings, so sizes are persisted as a list of pairs.
#[derive(Serialize, Deserialize)]
struct StoredSet {
    asset_id: String,
    entries: Vec<(RenditionSize, String)>,
}

impl From<StoredSet> for ServingUrlSet {
    fn from(stored: StoredSet) -> Self {
        Self {
            asset_id: stored.asset_id,
            urls: stored.entries.into_iter().collect(),
        }
    }
}

impl From<ServingUrlSet> for StoredSet {
    fn from(set: ServingUrlSet) -> Self {
        Self {
            asset_id: set.asset_id,
            entries: set.urls.into_iter().collect(),
        }
    }
}

impl ServingUrlSet {
    pub fn new(asset_id: &str) -> Self {
        Self {
            asset_id: asset_id.to_string(),
            urls: BTreeMap::new(),
        }
    }

    /// Exact-size lookup; there is no nearest-size fallback.
    pub fn get_serving_url(&self, width: u32, height: u32) -> Result<&str> {
        self.urls
            .get(&RenditionSize::new(width, height))
            .map(String::as_str)
            .ok_or(Error::SizeNotFound { width, height })
    }

    pub fn add(&mut self, size: RenditionSize, url: &str) {
        self.urls.insert(size, url.to_string());
    }

    pub fn remove(&mut self, size: RenditionSize) -> Option<String> {
        self.urls.remove(&size)
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RenditionSize, &str)> {
        self.urls.iter().map(|(size, url)| (*size, url.as_str()))
    }

    pub fn is_valid_size(&self, width: u32, height: u32) -> bool {
        self.urls.contains_key(&RenditionSize::new(width, height))
    }

    pub fn find_size_for_url(&self, url: &str) -> Option<RenditionSize> {
        self.urls
            .iter()
            .find(|(_, stored)| stored.as_str() == url)
            .map(|(size, _)| *size)
    }
}

pub struct ServingUrlRegistry {
    store: Arc<dyn MetadataStore>,
    max_attempts: usize,
}

impl ServingUrlRegistry {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self {
            store,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    fn storage_key(asset_id: &str) -> String {
        format!("serving_urls/{}", asset_id)
    }

    pub async fn get(&self, asset_id: &str) -> Result<Option<ServingUrlSet>> {
        Ok(self
            .load(asset_id)
            .await?
            .map(|versioned| versioned.value))
    }

    async fn load(&self, asset_id: &str) -> Result<Option<Versioned<ServingUrlSet>>> {
        match self.store.get(&Self::storage_key(asset_id)).await? {
            Some(stored) => Ok(Some(Versioned {
                value: serde_json::from_str(&stored.value)?,
                version: stored.version,
            })),
            None => Ok(None),
        }
    }

    /// Merge `updates` into the asset's set, or replace the set outright
    /// when `overwrite` is true.
    pub async fn put(
        &self,
        asset_id: &str,
        updates: &[(RenditionSize, String)],
        overwrite: bool,
    ) -> Result<ServingUrlSet> {
        let updated = self
            .modify(asset_id, |current| {
                let mut set = match current {
                    Some(existing) if !overwrite => existing,
                    _ => ServingUrlSet::new(asset_id),
                };
                for (size, url) in updates {
                    set.add(*size, url);
                }
                Some(set)
            })
            .await?;

        updated.ok_or_else(|| Error::Invariant(format!("put for {} wrote nothing", asset_id)))
    }

    /// Drop the entry for `size`, but only while it still points at `url`.
    /// Returns whether an entry was removed.
    pub async fn remove_url(&self, asset_id: &str, size: RenditionSize, url: &str) -> Result<bool> {
        let mut removed = false;
        self.modify(asset_id, |current| {
            removed = false;
            let mut set = current?;
            if set.get_serving_url(size.width, size.height).ok() != Some(url) {
                return None;
            }
            set.remove(size);
            removed = true;
            Some(set)
        })
        .await?;
        Ok(removed)
    }

    /// Read-modify-write loop. `change` returning `None` leaves the stored
    /// value untouched.
    async fn modify<F>(&self, asset_id: &str, mut change: F) -> Result<Option<ServingUrlSet>>
    where
        F: FnMut(Option<ServingUrlSet>) -> Option<ServingUrlSet>,
    {
        let key = Self::storage_key(asset_id);

        for attempt in 1..=self.max_attempts {
            let current = self.load(asset_id).await?;
            let expected = current.as_ref().map(|v| v.version);

            let Some(next) = change(current.map(|v| v.value)) else {
                return Ok(None);
            };

            let encoded = serde_json::to_string(&next)?;
            if self.store.compare_and_swap(&key, expected, encoded).await? {
                debug!("[{}] Serving urls written ({} sizes)", asset_id, next.len());
                return Ok(Some(next));
            }

            warn!(
                "[{}] Serving url update conflicted (attempt {}/{})",
                asset_id, attempt, self.max_attempts
            );
        }

        Err(Error::Conflict(format!(
            "serving urls for {} changed {} times during update",
            asset_id, self.max_attempts
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn registry(store: MemoryMetadataStore) -> ServingUrlRegistry {
        ServingUrlRegistry::new(Arc::new(store))
    }

    fn updates(pairs: &[((u32, u32), &str)]) -> Vec<(RenditionSize, String)> {
        pairs
            .iter()
            .map(|(size, url)| (RenditionSize::from(*size), url.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_merge_accumulates_disjoint_sizes() {
        let registry = registry(MemoryMetadataStore::new());

        registry
            .put("acct1_vid1_tid1", &updates(&[((640, 480), "http://a/640")]), false)
            .await
            .unwrap();
        registry
            .put("acct1_vid1_tid1", &updates(&[((160, 90), "http://a/160")]), false)
            .await
            .unwrap();

        let set = registry.get("acct1_vid1_tid1").await.unwrap().unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.get_serving_url(640, 480).unwrap(), "http://a/640");
        assert_eq!(set.get_serving_url(160, 90).unwrap(), "http://a/160");
    }

    #[tokio::test]
    async fn test_overwrite_replaces_set() {
        let registry = registry(MemoryMetadataStore::new());
        registry
            .put("a_v_t", &updates(&[((640, 480), "http://a/640")]), false)
            .await
            .unwrap();
        registry
            .put("a_v_t", &updates(&[((120, 90), "http://a/120")]), true)
            .await
            .unwrap();

        let set = registry.get("a_v_t").await.unwrap().unwrap();
        assert_eq!(set.len(), 1);
        assert!(matches!(
            set.get_serving_url(640, 480),
            Err(Error::SizeNotFound {
                width: 640,
                height: 480
            })
        ));
    }

    #[tokio::test]
    async fn test_put_retries_on_conflict() {
        let store = MemoryMetadataStore::new().with_conflicts(2);
        let registry = registry(store.clone());

        registry
            .put("a_v_t", &updates(&[((1, 1), "http://a/1")]), false)
            .await
            .unwrap();
        assert_eq!(store.get_cas_count(), 3);
    }

    #[tokio::test]
    async fn test_put_gives_up_after_max_attempts() {
        let store = MemoryMetadataStore::new().with_conflicts(10);
        let registry = registry(store).with_max_attempts(3);

        let err = registry
            .put("a_v_t", &updates(&[((1, 1), "http://a/1")]), false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert!(registry.get("a_v_t").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_url_requires_matching_url() {
        let registry = registry(MemoryMetadataStore::new());
        registry
            .put("a_v_t", &updates(&[((640, 480), "http://a/new")]), false)
            .await
            .unwrap();

        let size = RenditionSize::new(640, 480);
        assert!(!registry.remove_url("a_v_t", size, "http://a/old").await.unwrap());
        assert!(registry.remove_url("a_v_t", size, "http://a/new").await.unwrap());
        assert!(!registry.remove_url("missing", size, "http://a/new").await.unwrap());

        let set = registry.get("a_v_t").await.unwrap().unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_set_json_and_lookups() {
        let mut set = ServingUrlSet::new("a_v_t");
        set.add(RenditionSize::new(640, 480), "http://a/640");
        set.add(RenditionSize::new(160, 90), "http://a/160");

        let json = serde_json::to_string(&set).unwrap();
        let back: ServingUrlSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);

        let sizes: Vec<RenditionSize> = set.iter().map(|(size, _)| size).collect();
        assert_eq!(
            sizes,
            vec![RenditionSize::new(160, 90), RenditionSize::new(640, 480)]
        );
        assert!(set.is_valid_size(160, 90));
        assert!(!set.is_valid_size(90, 160));
        assert_eq!(
            set.find_size_for_url("http://a/640"),
            Some(RenditionSize::new(640, 480))
        );
    }
}
