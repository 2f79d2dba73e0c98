//! CDN backend drivers
//!
//! Every hosting backend stores rendition bytes under a computed key and
//! maps keys to the public URLs they are served from. [`create_backend`]
//! turns a [`HostingConfig`] into the matching driver.

pub mod akamai;
pub mod cloudinary;
pub mod mock;
pub mod primary;
pub mod redirect;
pub mod s3;
pub mod store;

pub use akamai::AkamaiBackend;
pub use cloudinary::CloudinaryBackend;
pub use mock::MemoryObjectStore;
pub use primary::PrimaryOriginBackend;
pub use redirect::create_redirect;
pub use s3::ObjectStoreBackend;
pub use store::{ObjectStore, S3ObjectStore};

use crate::entropy::Entropy;
use crate::hosting::{Backend, HostingConfig};
use crate::models::Config;
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// One rendition handed to a backend.
#[derive(Debug, Clone, Copy)]
pub struct PutRequest<'a> {
    pub key: &'a str,
    pub body: &'a [u8],
    pub content_type: &'a str,
    /// When false, an object already stored under `key` is left untouched.
    pub overwrite: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    /// `location` is set when the backend reports where it serves the object.
    Stored { location: Option<String> },
    AlreadyPresent { location: Option<String> },
}

impl PutOutcome {
    pub fn location(&self) -> Option<&str> {
        match self {
            PutOutcome::Stored { location } | PutOutcome::AlreadyPresent { location } => {
                location.as_deref()
            }
        }
    }
}

#[async_trait]
pub trait CdnBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn put(&self, request: PutRequest<'_>) -> Result<PutOutcome>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Candidate public URLs for `key`, one per CDN prefix, in prefix order.
    fn resolve_public_urls(&self, key: &str) -> Vec<String>;

    /// Inverse of [`CdnBackend::resolve_public_urls`].
    fn key_for_url(&self, url: &str) -> Option<String>;
}

/// Shared collaborators for building drivers.
#[derive(Clone)]
pub struct BackendContext {
    pub http: reqwest::Client,
    pub entropy: Arc<dyn Entropy>,
    pub config: Config,
    /// Replaces the S3 connection for object-store backed drivers.
    pub object_store: Option<Arc<dyn ObjectStore>>,
}

impl BackendContext {
    pub fn new(http: reqwest::Client, entropy: Arc<dyn Entropy>, config: Config) -> Self {
        Self {
            http,
            entropy,
            config,
            object_store: None,
        }
    }

    pub fn with_object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.object_store = Some(store);
        self
    }

    async fn store_for(
        &self,
        credentials: &crate::hosting::Credentials,
        endpoint: Option<&str>,
        region: Option<&str>,
    ) -> Result<Arc<dyn ObjectStore>> {
        match &self.object_store {
            Some(store) => Ok(store.clone()),
            None => Ok(Arc::new(
                S3ObjectStore::connect(credentials, endpoint, region, &self.config).await?,
            )),
        }
    }
}

/// Build the driver for `hosting`. The config is validated first so a bad
/// config never reaches the network.
pub async fn create_backend(
    hosting: &HostingConfig,
    ctx: &BackendContext,
) -> Result<Arc<dyn CdnBackend>> {
    hosting.validate()?;

    let backend: Arc<dyn CdnBackend> = match &hosting.backend {
        Backend::ObjectStore(store) => {
            let object_store = ctx
                .store_for(
                    &store.credentials,
                    store.endpoint.as_deref(),
                    store.region.as_deref(),
                )
                .await?;
            Arc::new(ObjectStoreBackend::new(
                object_store,
                &store.bucket,
                store.acl,
                hosting.cdn_prefixes.clone(),
            ))
        }
        Backend::PrimaryOrigin(primary) => {
            let object_store = ctx.store_for(&primary.credentials, None, None).await?;
            Arc::new(PrimaryOriginBackend::new(
                object_store,
                &primary.bucket,
                &ctx.config.s3_host,
            ))
        }
        Backend::Akamai(akamai) => Arc::new(AkamaiBackend::new(
            ctx.http.clone(),
            akamai,
            hosting.cdn_prefixes.clone(),
            ctx.entropy.clone(),
        )?),
        Backend::Cloudinary(cloudinary) => Arc::new(CloudinaryBackend::new(
            ctx.http.clone(),
            cloudinary,
            ctx.entropy.clone(),
        )),
    };

    tracing::debug!("Created {} backend", backend.name());
    Ok(backend)
}

/// Public URLs under each prefix.
pub(crate) fn prefixed_urls(prefixes: &[String], key: &str) -> Vec<String> {
    prefixes
        .iter()
        .map(|prefix| format!("{}/{}", prefix, key))
        .collect()
}

/// Object key behind a serving url. Nested prefixes resolve to the longest
/// one that matches.
pub(crate) fn strip_prefixes(prefixes: &[String], url: &str) -> Option<String> {
    let mut ordered: Vec<&String> = prefixes.iter().collect();
    ordered.sort_by_key(|prefix| std::cmp::Reverse(prefix.len()));
    ordered.into_iter().find_map(|prefix| {
        url.strip_prefix(prefix.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|key| !key.is_empty())
            .map(|key| key.split(['?', '#']).next().unwrap_or(key).to_string())
    })
}

/// Network failures and timeouts are retried; anything else the HTTP client
/// reports is a service failure.
pub(crate) fn transport_error(backend: &'static str, key: &str, err: reqwest::Error) -> Error {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        Error::transient(backend, key, err)
    } else {
        Error::service(backend, key, err)
    }
}

/// 403 is a permission failure, 5xx is retried, the rest are terminal.
pub(crate) fn status_error(
    backend: &'static str,
    key: &str,
    status: reqwest::StatusCode,
    body: &str,
) -> Error {
    let message = format!("HTTP {}: {}", status.as_u16(), body.trim());
    if status == reqwest::StatusCode::FORBIDDEN || status == reqwest::StatusCode::UNAUTHORIZED {
        Error::permission(backend, key, message)
    } else if status.is_server_error() {
        Error::transient(backend, key, message)
    } else {
        Error::service(backend, key, message)
    }
}
