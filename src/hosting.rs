//! Hosting configuration
//!
//! A [`HostingConfig`] names exactly one backend plus the settings shared by
//! every backend: CDN prefixes, folder prefix, salting, rendition sizes and
//! registry policy. Configurations are plain JSON documents.

use crate::keys::KeyLayout;
use crate::models::{RenditionSize, VideoFormat};
use crate::signing::G2oVersion;
use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

/// Sizes generated when a resizing backend is configured without an
/// explicit list.
pub const DEFAULT_RENDITION_SIZES: [(u32, u32); 12] = [
    (120, 67),
    (120, 90),
    (160, 90),
    (160, 120),
    (210, 118),
    (320, 180),
    (320, 240),
    (480, 270),
    (480, 360),
    (640, 360),
    (640, 480),
    (1280, 720),
];

const DEFAULT_CLOUDINARY_API: &str = "https://api.cloudinary.com";
const DEFAULT_G2O_VERSION: u8 = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Acl {
    /// No canned ACL is sent; the bucket policy decides.
    #[default]
    Private,
    PublicRead,
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Credentials {
    /// Ambient AWS credential chain.
    #[default]
    Environment,
    Static {
        access_key: String,
        secret_key: String,
    },
    /// Temporary credentials obtained by assuming a role in the customer's
    /// account, authenticated with the static keys.
    AssumeRole {
        access_key: String,
        secret_key: String,
        role_account: String,
        role_name: String,
        #[serde(default)]
        external_id: Option<String>,
    },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Environment => f.write_str("Environment"),
            Credentials::Static { access_key, .. } => f
                .debug_struct("Static")
                .field("access_key", access_key)
                .finish_non_exhaustive(),
            Credentials::AssumeRole {
                access_key,
                role_account,
                role_name,
                external_id,
                ..
            } => f
                .debug_struct("AssumeRole")
                .field("access_key", access_key)
                .field("role_account", role_account)
                .field("role_name", role_name)
                .field("external_id", external_id)
                .finish_non_exhaustive(),
        }
    }
}

impl Credentials {
    pub fn role_arn(&self) -> Option<String> {
        match self {
            Credentials::AssumeRole {
                role_account,
                role_name,
                ..
            } => Some(format!("arn:aws:iam::{}:role/{}", role_account, role_name)),
            _ => None,
        }
    }

    fn validate(&self) -> Result<()> {
        let missing = |what: &str| {
            Err(Error::InvalidConfiguration(format!(
                "object store credentials are missing {}",
                what
            )))
        };
        match self {
            Credentials::Environment => Ok(()),
            Credentials::Static {
                access_key,
                secret_key,
            } => {
                if access_key.is_empty() || secret_key.is_empty() {
                    return missing("an access or secret key");
                }
                Ok(())
            }
            Credentials::AssumeRole {
                access_key,
                secret_key,
                role_account,
                role_name,
                ..
            } => {
                if access_key.is_empty() || secret_key.is_empty() {
                    return missing("an access or secret key");
                }
                if role_account.is_empty() || role_name.is_empty() {
                    return missing("the role account or role name");
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectStoreHosting {
    pub bucket: String,
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default)]
    pub acl: Acl,
    /// Custom endpoint for S3-compatible stores.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct AkamaiHosting {
    /// Upload host; a scheme is optional.
    pub host: String,
    /// G2O shared secret.
    pub key: String,
    /// G2O nonce (key name).
    pub name: String,
    pub cpcode: String,
    #[serde(default = "default_g2o_version")]
    pub g2o_version: u8,
}

impl std::fmt::Debug for AkamaiHosting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AkamaiHosting")
            .field("host", &self.host)
            .field("name", &self.name)
            .field("cpcode", &self.cpcode)
            .field("g2o_version", &self.g2o_version)
            .finish_non_exhaustive()
    }
}

fn default_g2o_version() -> u8 {
    DEFAULT_G2O_VERSION
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudinaryHosting {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    #[serde(default = "default_cloudinary_api")]
    pub api_base_url: String,
}

impl std::fmt::Debug for CloudinaryHosting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudinaryHosting")
            .field("cloud_name", &self.cloud_name)
            .field("api_base_url", &self.api_base_url)
            .finish_non_exhaustive()
    }
}

fn default_cloudinary_api() -> String {
    DEFAULT_CLOUDINARY_API.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryOriginHosting {
    pub bucket: String,
    #[serde(default)]
    pub credentials: Credentials,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Backend {
    ObjectStore(ObjectStoreHosting),
    Akamai(AkamaiHosting),
    Cloudinary(CloudinaryHosting),
    PrimaryOrigin(PrimaryOriginHosting),
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::ObjectStore(_) => "s3",
            Backend::Akamai(_) => "akamai",
            Backend::Cloudinary(_) => "cloudinary",
            Backend::PrimaryOrigin(_) => "primary-origin",
        }
    }
}

/// Region of the source image kept before resizing.
///
/// Serialized as a list of 1, 2 or 4 fractions:
/// - `[x]`: keep the centre `x` of both axes.
/// - `[v, h]`: keep the centre `v` vertically and `h` horizontally.
/// - `[top, right, bottom, left]`: remove these fractions from each side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub enum SourceCrop {
    Center(f64),
    Axes { vertical: f64, horizontal: f64 },
    Sides {
        top: f64,
        right: f64,
        bottom: f64,
        left: f64,
    },
}

impl SourceCrop {
    /// Crop box `(x, y, width, height)` inside a `width`x`height` image.
    pub fn region(&self, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let (top, right, bottom, left) = match *self {
            SourceCrop::Center(keep) => {
                let cut = (1.0 - keep) / 2.0;
                (cut, cut, cut, cut)
            }
            SourceCrop::Axes {
                vertical,
                horizontal,
            } => {
                let v = (1.0 - vertical) / 2.0;
                let h = (1.0 - horizontal) / 2.0;
                (v, h, v, h)
            }
            SourceCrop::Sides {
                top,
                right,
                bottom,
                left,
            } => (top, right, bottom, left),
        };

        let w = width as f64;
        let h = height as f64;
        let x0 = (w * left).round().clamp(0.0, w - 1.0) as u32;
        let y0 = (h * top).round().clamp(0.0, h - 1.0) as u32;
        let x1 = (w * (1.0 - right)).round().clamp(x0 as f64 + 1.0, w) as u32;
        let y1 = (h * (1.0 - bottom)).round().clamp(y0 as f64 + 1.0, h) as u32;
        (x0, y0, x1 - x0, y1 - y0)
    }
}

impl TryFrom<Vec<f64>> for SourceCrop {
    type Error = Error;

    fn try_from(values: Vec<f64>) -> Result<Self> {
        let keep = |v: f64| v > 0.0 && v <= 1.0;
        let cut = |v: f64| (0.0..1.0).contains(&v);
        match values.as_slice() {
            [x] if keep(*x) => Ok(SourceCrop::Center(*x)),
            [v, h] if keep(*v) && keep(*h) => Ok(SourceCrop::Axes {
                vertical: *v,
                horizontal: *h,
            }),
            [t, r, b, l]
                if [*t, *r, *b, *l].iter().all(|v| cut(*v)) && t + b < 1.0 && l + r < 1.0 =>
            {
                Ok(SourceCrop::Sides {
                    top: *t,
                    right: *r,
                    bottom: *b,
                    left: *l,
                })
            }
            other => Err(Error::InvalidConfiguration(format!(
                "source_crop {:?} must be 1, 2 or 4 fractions in range",
                other
            ))),
        }
    }
}

impl From<SourceCrop> for Vec<f64> {
    fn from(crop: SourceCrop) -> Self {
        match crop {
            SourceCrop::Center(x) => vec![x],
            SourceCrop::Axes {
                vertical,
                horizontal,
            } => vec![vertical, horizontal],
            SourceCrop::Sides {
                top,
                right,
                bottom,
                left,
            } => vec![top, right, bottom, left],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredHostingConfig")]
pub struct HostingConfig {
    pub backend: Backend,
    pub cdn_prefixes: Vec<String>,
    pub folder_prefix: Option<String>,
    /// Defaults to on for S3 buckets and Akamai when absent from JSON.
    pub do_salt: bool,
    /// Use `<account>/<video>/<thumb>/` folders instead of a flat name.
    pub make_tid_folders: bool,
    /// Empty means the source dimensions are used unmodified.
    pub rendition_sizes: Vec<RenditionSize>,
    pub overwrite: bool,
    pub update_serving_urls: bool,
    pub source_crop: Option<SourceCrop>,
    pub video_rendition_formats: Vec<VideoFormat>,
}

/// On-disk shape of [`HostingConfig`]; `do_salt` falls back per backend.
#[derive(Deserialize)]
struct StoredHostingConfig {
    backend: Backend,
    #[serde(default, deserialize_with = "deserialize_prefixes")]
    cdn_prefixes: Vec<String>,
    #[serde(default)]
    folder_prefix: Option<String>,
    #[serde(default)]
    do_salt: Option<bool>,
    #[serde(default)]
    make_tid_folders: bool,
    #[serde(default)]
    rendition_sizes: Vec<RenditionSize>,
    #[serde(default = "default_true")]
    overwrite: bool,
    #[serde(default)]
    update_serving_urls: bool,
    #[serde(default)]
    source_crop: Option<SourceCrop>,
    #[serde(default)]
    video_rendition_formats: Vec<VideoFormat>,
}

impl From<StoredHostingConfig> for HostingConfig {
    fn from(stored: StoredHostingConfig) -> Self {
        let salted_backend = matches!(stored.backend, Backend::ObjectStore(_) | Backend::Akamai(_));
        Self {
            do_salt: stored.do_salt.unwrap_or(salted_backend),
            backend: stored.backend,
            cdn_prefixes: stored.cdn_prefixes,
            folder_prefix: stored.folder_prefix,
            make_tid_folders: stored.make_tid_folders,
            rendition_sizes: stored.rendition_sizes,
            overwrite: stored.overwrite,
            update_serving_urls: stored.update_serving_urls,
            source_crop: stored.source_crop,
            video_rendition_formats: stored.video_rendition_formats,
        }
    }
}

fn default_true() -> bool {
    true
}

fn deserialize_prefixes<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Vec<String> = Vec::deserialize(deserializer)?;
    Ok(raw.iter().map(|p| normalize_cdn_prefix(p)).collect())
}

/// Give a prefix a scheme (`http://` when absent) and drop trailing slashes.
pub fn normalize_cdn_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim();
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed.trim_start_matches('/'))
    };
    with_scheme.trim_end_matches('/').to_string()
}

fn default_sizes() -> Vec<RenditionSize> {
    DEFAULT_RENDITION_SIZES
        .iter()
        .map(|&size| RenditionSize::from(size))
        .collect()
}

impl HostingConfig {
    fn base(backend: Backend, cdn_prefixes: &[&str]) -> Self {
        Self {
            backend,
            cdn_prefixes: cdn_prefixes
                .iter()
                .map(|p| normalize_cdn_prefix(p))
                .collect(),
            folder_prefix: None,
            do_salt: false,
            make_tid_folders: false,
            rendition_sizes: Vec::new(),
            overwrite: true,
            update_serving_urls: false,
            source_crop: None,
            video_rendition_formats: Vec::new(),
        }
    }

    /// Customer bucket served through the given CDN prefixes. Objects stay
    /// private under salted keys; nothing is resized or registered unless
    /// asked for.
    pub fn object_store(bucket: &str, credentials: Credentials, cdn_prefixes: &[&str]) -> Self {
        let mut config = Self::base(
            Backend::ObjectStore(ObjectStoreHosting {
                bucket: bucket.to_string(),
                credentials,
                acl: Acl::Private,
                endpoint: None,
                region: None,
            }),
            cdn_prefixes,
        );
        config.do_salt = true;
        config
    }

    /// Our own public bucket: public-read, salted, every default size,
    /// serving URLs registered.
    pub fn managed_cdn(bucket: &str, cdn_prefixes: &[&str]) -> Self {
        let mut config = Self::base(
            Backend::ObjectStore(ObjectStoreHosting {
                bucket: bucket.to_string(),
                credentials: Credentials::Environment,
                acl: Acl::PublicRead,
                endpoint: None,
                region: None,
            }),
            cdn_prefixes,
        );
        config.do_salt = true;
        config.update_serving_urls = true;
        config.rendition_sizes = default_sizes();
        config
    }

    /// Legacy signed-upload storage. Always salted, always registered.
    pub fn akamai(host: &str, key: &str, name: &str, cpcode: &str, cdn_prefixes: &[&str]) -> Self {
        let mut config = Self::base(
            Backend::Akamai(AkamaiHosting {
                host: host.to_string(),
                key: key.to_string(),
                name: name.to_string(),
                cpcode: cpcode.to_string(),
                g2o_version: DEFAULT_G2O_VERSION,
            }),
            cdn_prefixes,
        );
        config.do_salt = true;
        config.update_serving_urls = true;
        config.rendition_sizes = default_sizes();
        config
    }

    pub fn cloudinary(cloud_name: &str, api_key: &str, api_secret: &str) -> Self {
        Self::base(
            Backend::Cloudinary(CloudinaryHosting {
                cloud_name: cloud_name.to_string(),
                api_key: api_key.to_string(),
                api_secret: api_secret.to_string(),
                api_base_url: default_cloudinary_api(),
            }),
            &[],
        )
    }

    /// Primary copy of every thumbnail, public-read under per-asset folders.
    pub fn primary_origin(bucket: &str) -> Self {
        let mut config = Self::base(
            Backend::PrimaryOrigin(PrimaryOriginHosting {
                bucket: bucket.to_string(),
                credentials: Credentials::Environment,
            }),
            &[],
        );
        config.make_tid_folders = true;
        config
    }

    pub fn with_folder_prefix(mut self, folder_prefix: &str) -> Self {
        self.folder_prefix = Some(folder_prefix.to_string());
        self
    }

    pub fn with_rendition_sizes(mut self, sizes: &[(u32, u32)]) -> Self {
        self.rendition_sizes = sizes.iter().map(|&s| RenditionSize::from(s)).collect();
        self
    }

    pub fn with_salt(mut self, do_salt: bool) -> Self {
        self.do_salt = do_salt;
        self
    }

    pub fn with_tid_folders(mut self, make_tid_folders: bool) -> Self {
        self.make_tid_folders = make_tid_folders;
        self
    }

    pub fn with_serving_urls(mut self, update_serving_urls: bool) -> Self {
        self.update_serving_urls = update_serving_urls;
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_source_crop(mut self, crop: SourceCrop) -> Self {
        self.source_crop = Some(crop);
        self
    }

    pub fn with_video_formats(mut self, formats: Vec<VideoFormat>) -> Self {
        self.video_rendition_formats = formats;
        self
    }

    pub fn with_cdn_prefixes(mut self, cdn_prefixes: &[&str]) -> Self {
        self.cdn_prefixes = cdn_prefixes
            .iter()
            .map(|p| normalize_cdn_prefix(p))
            .collect();
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn layout(&self) -> KeyLayout {
        if self.make_tid_folders {
            KeyLayout::AssetFolders
        } else if matches!(self.backend, Backend::Akamai(_)) {
            KeyLayout::AccountFolder
        } else {
            KeyLayout::Flat
        }
    }

    /// Folder prefix without leading or trailing slashes; `None` when empty.
    pub fn folder(&self) -> Option<&str> {
        self.folder_prefix
            .as_deref()
            .map(|f| f.trim_matches('/'))
            .filter(|f| !f.is_empty())
    }

    /// Fail fast on anything that would otherwise surface mid-upload.
    pub fn validate(&self) -> Result<()> {
        let require = |value: &str, what: &str| {
            if value.trim().is_empty() {
                Err(Error::InvalidConfiguration(format!(
                    "{} hosting requires {}",
                    self.backend_name(),
                    what
                )))
            } else {
                Ok(())
            }
        };

        match &self.backend {
            Backend::ObjectStore(hosting) => {
                require(&hosting.bucket, "a bucket")?;
                hosting.credentials.validate()?;
                if self.cdn_prefixes.is_empty() {
                    return Err(Error::InvalidConfiguration(
                        "s3 hosting requires at least one cdn prefix".to_string(),
                    ));
                }
            }
            Backend::Akamai(hosting) => {
                require(&hosting.host, "a host")?;
                require(&hosting.key, "a G2O key")?;
                require(&hosting.name, "a G2O key name")?;
                require(&hosting.cpcode, "a cpcode")?;
                G2oVersion::try_from(hosting.g2o_version)?;
                if self.cdn_prefixes.is_empty() {
                    return Err(Error::InvalidConfiguration(
                        "akamai hosting requires at least one cdn prefix".to_string(),
                    ));
                }
            }
            Backend::Cloudinary(hosting) => {
                require(&hosting.cloud_name, "a cloud name")?;
                require(&hosting.api_key, "an api key")?;
                require(&hosting.api_secret, "an api secret")?;
            }
            Backend::PrimaryOrigin(hosting) => {
                require(&hosting.bucket, "a bucket")?;
                hosting.credentials.validate()?;
            }
        }

        if let Some(size) = self
            .rendition_sizes
            .iter()
            .find(|s| s.width == 0 || s.height == 0)
        {
            return Err(Error::InvalidConfiguration(format!(
                "rendition size {} has a zero dimension",
                size
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Container;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_normalize_cdn_prefix() {
        assert_eq!(normalize_cdn_prefix("cdn1.cdn.com"), "http://cdn1.cdn.com");
        assert_eq!(normalize_cdn_prefix("cdn1.cdn.com/"), "http://cdn1.cdn.com");
        assert_eq!(
            normalize_cdn_prefix("https://cdn1.cdn.com/neon/"),
            "https://cdn1.cdn.com/neon"
        );
        assert_eq!(
            normalize_cdn_prefix("cdn1.cdn.com/neon"),
            "http://cdn1.cdn.com/neon"
        );
    }

    #[test]
    fn test_backend_defaults() {
        let akamai = HostingConfig::akamai("akamai", "akey", "aname", "168974", &["cdn1.akamai.com"]);
        assert!(akamai.do_salt);
        assert!(akamai.update_serving_urls);
        assert_eq!(akamai.layout(), KeyLayout::AccountFolder);
        assert_eq!(akamai.rendition_sizes.len(), DEFAULT_RENDITION_SIZES.len());

        let primary = HostingConfig::primary_origin("hosting-bucket");
        assert!(!primary.do_salt);
        assert!(!primary.update_serving_urls);
        assert_eq!(primary.layout(), KeyLayout::AssetFolders);

        let store = HostingConfig::object_store("b", Credentials::Environment, &["cdn.com"]);
        assert!(store.do_salt);
        assert_eq!(store.layout(), KeyLayout::Flat);
        assert!(store.rendition_sizes.is_empty());
        assert!(store.overwrite);
    }

    #[test]
    fn test_validate_rejects_bad_configs() {
        let akamai = HostingConfig::akamai("akamai", "", "aname", "168974", &["cdn"]);
        assert!(matches!(akamai.validate(), Err(Error::InvalidConfiguration(_))));

        let mut old_protocol = HostingConfig::akamai("akamai", "k", "n", "1", &["cdn"]);
        if let Backend::Akamai(hosting) = &mut old_protocol.backend {
            hosting.g2o_version = 3;
        }
        assert!(matches!(
            old_protocol.validate(),
            Err(Error::InvalidProtocolVersion(3))
        ));

        let no_prefix = HostingConfig::object_store("b", Credentials::Environment, &[]);
        assert!(no_prefix.validate().is_err());

        let missing_role = HostingConfig::object_store(
            "b",
            Credentials::AssumeRole {
                access_key: "a".to_string(),
                secret_key: "s".to_string(),
                role_account: String::new(),
                role_name: "Role".to_string(),
                external_id: None,
            },
            &["cdn"],
        );
        assert!(missing_role.validate().is_err());

        let zero = HostingConfig::primary_origin("b").with_rendition_sizes(&[(0, 10)]);
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_role_arn() {
        let creds = Credentials::AssumeRole {
            access_key: "a".to_string(),
            secret_key: "s".to_string(),
            role_account: "12345".to_string(),
            role_name: "Uploader".to_string(),
            external_id: Some("ext".to_string()),
        };
        assert_eq!(
            creds.role_arn().as_deref(),
            Some("arn:aws:iam::12345:role/Uploader")
        );
        assert_eq!(Credentials::Environment.role_arn(), None);
    }

    #[test]
    fn test_source_crop_shapes() {
        let center = SourceCrop::try_from(vec![0.5]).unwrap();
        assert_eq!(center.region(100, 200), (25, 50, 50, 100));

        let axes = SourceCrop::try_from(vec![1.0, 0.5]).unwrap();
        assert_eq!(axes.region(100, 100), (25, 0, 50, 100));

        let sides = SourceCrop::try_from(vec![0.0, 0.0, 0.25, 0.0]).unwrap();
        assert_eq!(sides.region(640, 480), (0, 0, 640, 360));

        assert!(SourceCrop::try_from(vec![0.1, 0.2, 0.3]).is_err());
        assert!(SourceCrop::try_from(vec![0.0]).is_err());
        assert!(SourceCrop::try_from(vec![0.6, 0.0, 0.5, 0.0]).is_err());
    }

    #[test]
    fn test_missing_salt_flag_follows_backend() {
        let bucket = serde_json::json!({
            "backend": {"type": "object_store", "bucket": "customer-bucket"},
            "cdn_prefixes": ["cdn.com"]
        });
        let config = HostingConfig::from_json(&bucket.to_string()).unwrap();
        assert!(config.do_salt);

        let mut unsalted = bucket.clone();
        unsalted["do_salt"] = serde_json::json!(false);
        let config = HostingConfig::from_json(&unsalted.to_string()).unwrap();
        assert!(!config.do_salt);

        let primary = serde_json::json!({
            "backend": {"type": "primary_origin", "bucket": "hosting-bucket"}
        });
        let config = HostingConfig::from_json(&primary.to_string()).unwrap();
        assert!(!config.do_salt);
    }

    #[test]
    fn test_load_from_file() {
        let json = serde_json::json!({
            "backend": {
                "type": "akamai",
                "host": "http://akamai.com/",
                "key": "akey",
                "name": "aname",
                "cpcode": "168974"
            },
            "cdn_prefixes": ["cdn1.akamai.com/", "https://cdn2.akamai.com"],
            "folder_prefix": "/neon/prod/",
            "do_salt": true,
            "update_serving_urls": true,
            "rendition_sizes": [[640, 480], [160, 90]],
            "source_crop": [0.0, 0.33, 0.0, 0.0],
            "video_rendition_formats": [
                {"width": null, "height": 100, "container": "mp4"}
            ]
        });

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.to_string().as_bytes()).unwrap();

        let config = HostingConfig::from_file(file.path()).unwrap();
        assert_eq!(
            config.cdn_prefixes,
            vec!["http://cdn1.akamai.com", "https://cdn2.akamai.com"]
        );
        assert_eq!(config.folder(), Some("neon/prod"));
        assert!(config.overwrite);
        assert_eq!(
            config.rendition_sizes,
            vec![RenditionSize::new(640, 480), RenditionSize::new(160, 90)]
        );
        assert_eq!(config.video_rendition_formats[0].container, Container::Mp4);
        match &config.backend {
            Backend::Akamai(hosting) => assert_eq!(hosting.g2o_version, 5),
            other => panic!("unexpected backend {:?}", other),
        }
    }

    #[test]
    fn test_debug_hides_secrets() {
        let config = HostingConfig::cloudinary("neon-labs", "key", "topsecret");
        assert!(!format!("{:?}", config).contains("topsecret"));
        let config = HostingConfig::akamai("akamai", "g2osecret", "n", "1", &["cdn"]);
        assert!(!format!("{:?}", config).contains("g2osecret"));

        let config = HostingConfig::object_store(
            "bucket",
            Credentials::Static {
                access_key: "AKID".into(),
                secret_key: "s3secret".into(),
            },
            &["cdn"],
        );
        let printed = format!("{:?}", config);
        assert!(printed.contains("AKID"));
        assert!(!printed.contains("s3secret"));

        let role = Credentials::AssumeRole {
            access_key: "AKID".into(),
            secret_key: "rolesecret".into(),
            role_account: "123456789012".into(),
            role_name: "uploader".into(),
            external_id: Some("ext".into()),
        };
        let printed = format!("{:?}", role);
        assert!(printed.contains("uploader"));
        assert!(!printed.contains("rolesecret"));
    }
}
