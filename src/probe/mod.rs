//! CDN reachability checks
//!
//! A freshly produced serving URL is fetched once before it is committed to
//! the registry.

pub mod mock;

pub use mock::MockUrlProbe;

use crate::{Error, Result};
use async_trait::async_trait;
use tracing::debug;

const BACKEND: &str = "probe";

#[async_trait]
pub trait UrlProbe: Send + Sync {
    /// `Ok` for a 2xx response. 5xx and network failures are transient;
    /// any other status makes the URL invalid.
    async fn check(&self, url: &str) -> Result<()>;
}

pub struct HttpUrlProbe {
    http: reqwest::Client,
}

impl HttpUrlProbe {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl UrlProbe for HttpUrlProbe {
    async fn check(&self, url: &str) -> Result<()> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::transient(BACKEND, url, e))?;

        let status = response.status();
        debug!("Probed {} -> {}", url, status);
        if status.is_success() {
            Ok(())
        } else if status.is_server_error() {
            Err(Error::transient(BACKEND, url, format!("HTTP {}", status.as_u16())))
        } else {
            Err(Error::InvalidCdnUrl {
                url: url.to_string(),
                reason: format!("HTTP {}", status.as_u16()),
            })
        }
    }
}
