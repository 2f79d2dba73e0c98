//! Data models and structures
//!
//! Rendition sizes, containers, per-rendition upload outcomes and the
//! process-level configuration read from the environment.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Width and height of one rendition, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "(u32, u32)", into = "(u32, u32)")]
pub struct RenditionSize {
    pub width: u32,
    pub height: u32,
}

impl RenditionSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl From<(u32, u32)> for RenditionSize {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

impl From<RenditionSize> for (u32, u32) {
    fn from(size: RenditionSize) -> Self {
        (size.width, size.height)
    }
}

impl fmt::Display for RenditionSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    #[serde(alias = "jpeg")]
    Jpg,
    Mp4,
    Gif,
}

impl Container {
    pub fn extension(&self) -> &'static str {
        match self {
            Container::Jpg => "jpg",
            Container::Mp4 => "mp4",
            Container::Gif => "gif",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Container::Jpg => "image/jpeg",
            Container::Mp4 => "video/mp4",
            Container::Gif => "image/gif",
        }
    }

    /// Codec used when a video format does not name one.
    pub fn default_codec(&self) -> Option<&'static str> {
        match self {
            Container::Mp4 => Some("libx264"),
            Container::Jpg | Container::Gif => None,
        }
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// One requested video rendition. A missing dimension keeps the source's
/// aspect ratio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoFormat {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub container: Container,
    #[serde(default)]
    pub codec: Option<String>,
}

impl VideoFormat {
    pub fn new(
        width: Option<u32>,
        height: Option<u32>,
        container: Container,
        codec: Option<&str>,
    ) -> Self {
        Self {
            width,
            height,
            container,
            codec: codec.map(str::to_string),
        }
    }

    pub fn effective_codec(&self) -> Option<String> {
        self.codec
            .clone()
            .or_else(|| self.container.default_codec().map(str::to_string))
    }
}

/// Result for a single rendition of an upload batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadOutcome {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub container: Container,
    pub codec: Option<String>,
    pub error: Option<String>,
}

impl UploadOutcome {
    pub fn size(&self) -> RenditionSize {
        RenditionSize::new(self.width, self.height)
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

// Configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub transient_retries: usize,
    pub retry_interval: Duration,
    pub hosting_bucket: String,
    pub s3_host: String,
    pub validate_urls: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            transient_retries: 2,
            retry_interval: Duration::from_millis(0),
            hosting_bucket: "host-thumbnails".to_string(),
            s3_host: "amazonaws.com".to_string(),
            validate_urls: true,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> crate::Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| {
            crate::Error::InvalidConfiguration(format!("{} has invalid value '{}'", name, raw))
        }),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> crate::Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Ok(Self {
            connect_timeout: Duration::from_secs(env_parse(
                "CDN_CONNECT_TIMEOUT_SECS",
                defaults.connect_timeout.as_secs(),
            )?),
            request_timeout: Duration::from_secs(env_parse(
                "CDN_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )?),
            transient_retries: env_parse("CDN_TRANSIENT_RETRIES", defaults.transient_retries)?,
            retry_interval: Duration::from_millis(env_parse("CDN_RETRY_INTERVAL_MS", 0u64)?),
            hosting_bucket: std::env::var("CDN_HOSTING_BUCKET")
                .unwrap_or(defaults.hosting_bucket),
            s3_host: std::env::var("CDN_S3_HOST").unwrap_or(defaults.s3_host),
            validate_urls: env_parse("CDN_VALIDATE_URLS", defaults.validate_urls)?,
        })
    }

    /// HTTP client shared by the legacy backend, the media CDN and the
    /// reachability probe.
    pub fn http_client(&self) -> crate::Result<reqwest::Client> {
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout)
            .build()
            .map_err(crate::Error::Http)
    }
}
