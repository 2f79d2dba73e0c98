//! Storage key and serving URL construction
//!
//! Image filenames are `neontn<asset>_w<W>_h<H>.jpg`, video filenames
//! `neonvr<video>_<clip>_w<W>_h<H>.<ext>`. Per-asset folder layouts drop the
//! prefix and use `w<W>_h<H>.<ext>` under `<account>/<video>/<thumb>/`.

use crate::entropy::Entropy;
use crate::hosting::HostingConfig;
use crate::models::{Container, RenditionSize};
use crate::{Error, Result};

const IMAGE_PREFIX: &str = "neontn";
const VIDEO_PREFIX: &str = "neonvr";
const SALT_SEGMENTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyLayout {
    /// `<folder>/<salt>/neontn<asset>_w<W>_h<H>.jpg`
    Flat,
    /// `<folder>/<account>/<video>/<thumb>/<salt>/w<W>_h<H>.jpg`
    AssetFolders,
    /// `<folder>/<account>/<salt>/neontn<asset>_w<W>_h<H>.jpg`
    AccountFolder,
}

/// Three random single-letter path segments shared by every rendition of
/// one upload batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Salt(String);

impl Salt {
    pub fn generate(entropy: &dyn Entropy) -> Self {
        let segments: Vec<String> = (0..SALT_SEGMENTS)
            .map(|_| entropy.random_letter().to_string())
            .collect();
        Salt(segments.join("/"))
    }

    pub fn as_path(&self) -> &str {
        &self.0
    }
}

/// Parts of a thumbnail id `<account>_<video ref...>_<thumb>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailId<'a> {
    pub account: &'a str,
    pub video: &'a str,
    pub thumb: &'a str,
}

impl<'a> ThumbnailId<'a> {
    pub fn parse(asset_id: &'a str) -> Result<Self> {
        let (account, rest) = asset_id
            .split_once('_')
            .ok_or_else(|| malformed(asset_id))?;
        let (video, thumb) = rest.rsplit_once('_').ok_or_else(|| malformed(asset_id))?;
        if account.is_empty() || video.is_empty() || thumb.is_empty() {
            return Err(malformed(asset_id));
        }
        Ok(Self {
            account,
            video,
            thumb,
        })
    }
}

/// Parts of an internal video id `<account>_<external ref>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoId<'a> {
    pub account: &'a str,
    pub external: &'a str,
}

impl<'a> VideoId<'a> {
    pub fn parse(video_id: &'a str) -> Result<Self> {
        match video_id.split_once('_') {
            Some((account, external)) if !account.is_empty() && !external.is_empty() => {
                Ok(Self { account, external })
            }
            _ => Err(malformed(video_id)),
        }
    }
}

fn malformed(id: &str) -> Error {
    Error::Invariant(format!("Malformed asset id '{}'", id))
}

/// Builds keys for one batch: layout, folder and salt are fixed at
/// construction.
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    layout: KeyLayout,
    folder: Option<String>,
    salt: Option<Salt>,
}

impl KeyBuilder {
    pub fn new(config: &HostingConfig, salt: Option<Salt>) -> Self {
        Self {
            layout: config.layout(),
            folder: config.folder().map(str::to_string),
            salt,
        }
    }

    /// Builder for a batch: draws a salt when the config asks for one.
    pub fn for_batch(config: &HostingConfig, entropy: &dyn Entropy) -> Self {
        let salt = config.do_salt.then(|| Salt::generate(entropy));
        Self::new(config, salt)
    }

    pub fn salt(&self) -> Option<&Salt> {
        self.salt.as_ref()
    }

    pub fn image_key(&self, asset_id: &str, size: RenditionSize) -> Result<String> {
        let dims = format!("w{}_h{}", size.width, size.height);
        let ext = Container::Jpg.extension();
        match self.layout {
            KeyLayout::Flat => Ok(self.join(&[], &format!("{IMAGE_PREFIX}{asset_id}_{dims}.{ext}"))),
            KeyLayout::AccountFolder => {
                let id = ThumbnailId::parse(asset_id)?;
                Ok(self.join(
                    &[id.account],
                    &format!("{IMAGE_PREFIX}{asset_id}_{dims}.{ext}"),
                ))
            }
            KeyLayout::AssetFolders => {
                let id = ThumbnailId::parse(asset_id)?;
                Ok(self.join(&[id.account, id.video, id.thumb], &format!("{dims}.{ext}")))
            }
        }
    }

    pub fn video_key(
        &self,
        video_id: &str,
        clip_id: &str,
        size: RenditionSize,
        container: Container,
    ) -> Result<String> {
        let dims = format!("w{}_h{}", size.width, size.height);
        let ext = container.extension();
        match self.layout {
            KeyLayout::Flat => Ok(self.join(
                &[],
                &format!("{VIDEO_PREFIX}{video_id}_{clip_id}_{dims}.{ext}"),
            )),
            KeyLayout::AccountFolder => {
                let id = VideoId::parse(video_id)?;
                Ok(self.join(
                    &[id.account],
                    &format!("{VIDEO_PREFIX}{video_id}_{clip_id}_{dims}.{ext}"),
                ))
            }
            KeyLayout::AssetFolders => {
                let id = VideoId::parse(video_id)?;
                Ok(self.join(&[id.account, id.external, clip_id], &format!("{dims}.{ext}")))
            }
        }
    }

    fn join(&self, folders: &[&str], filename: &str) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(folders.len() + 3);
        if let Some(folder) = &self.folder {
            parts.push(folder);
        }
        parts.extend_from_slice(folders);
        if let Some(salt) = &self.salt {
            parts.push(salt.as_path());
        }
        parts.push(filename);
        parts.join("/")
    }
}

/// Single-shot form of [`KeyBuilder::image_key`].
pub fn build_key(
    asset_id: &str,
    size: RenditionSize,
    config: &HostingConfig,
    salt: Option<&Salt>,
) -> Result<String> {
    KeyBuilder::new(config, salt.cloned()).image_key(asset_id, size)
}

/// Resolve a requested size against the source. A missing side is scaled to
/// keep the source aspect ratio; both missing means the source size.
pub fn resolve_dimensions(
    width: Option<u32>,
    height: Option<u32>,
    source: RenditionSize,
) -> RenditionSize {
    let scale = |target: u32, from: u32, other: u32| -> u32 {
        if from == 0 {
            return other;
        }
        ((target as f64 * other as f64 / from as f64).round() as u32).max(1)
    };

    match (width, height) {
        (Some(w), Some(h)) => RenditionSize::new(w, h),
        (Some(w), None) => RenditionSize::new(w, scale(w, source.width, source.height)),
        (None, Some(h)) => RenditionSize::new(scale(h, source.height, source.width), h),
        (None, None) => source,
    }
}

/// Recover the asset id and size from an image key in any layout.
pub fn parse_image_key(key: &str) -> Option<(String, RenditionSize)> {
    let (dirs, filename) = key.rsplit_once('/').unwrap_or(("", key));
    let stem = filename.strip_suffix(".jpg")?;

    let (rest, height) = stem.rsplit_once("_h")?;
    let height: u32 = height.parse().ok()?;

    if let Some(named) = rest.strip_prefix(IMAGE_PREFIX) {
        let (asset_id, width) = named.rsplit_once("_w")?;
        let width: u32 = width.parse().ok()?;
        return Some((asset_id.to_string(), RenditionSize::new(width, height)));
    }

    // Per-asset folders: <account>/<video>/<thumb>/[salt/]w<W>_h<H>.jpg
    let width: u32 = rest.strip_prefix('w')?.parse().ok()?;
    let dirs: Vec<&str> = dirs.split('/').filter(|s| !s.is_empty()).collect();
    let folders: [&str; 3] = match dirs.as_slice() {
        [.., a, v, t, s1, s2, s3] if [*s1, *s2, *s3].into_iter().all(is_salt_segment) => {
            [*a, *v, *t]
        }
        [.., a, v, t] => [*a, *v, *t],
        _ => return None,
    };
    Some((folders.join("_"), RenditionSize::new(width, height)))
}

fn is_salt_segment(segment: &str) -> bool {
    segment.len() == 1 && segment.chars().all(|c| c.is_ascii_alphabetic())
}

/// Prefix used for an asset's serving URLs. Stable per asset so every size
/// of one asset shares a host.
pub fn select_prefix<'a>(prefixes: &'a [String], asset_id: &str) -> Option<&'a str> {
    if prefixes.is_empty() {
        return None;
    }
    let digest = md5::compute(asset_id.as_bytes());
    let bucket = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize;
    prefixes.get(bucket % prefixes.len()).map(String::as_str)
}
