//! Video rendition handoff
//!
//! Transcoding happens behind [`VideoEncoder`]; the dispatcher only decides
//! sizes, containers and keys.

pub mod mock;

pub use mock::MockVideoEncoder;

use crate::models::{Container, RenditionSize};
use crate::Result;
use async_trait::async_trait;
use std::path::PathBuf;

/// One clip of a video, located on local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoClip {
    /// Internal video id, `<account>_<external ref>`.
    pub video_id: String,
    pub clip_id: String,
    pub source_size: RenditionSize,
    pub path: PathBuf,
}

impl VideoClip {
    pub fn new(video_id: &str, clip_id: &str, source_size: RenditionSize, path: PathBuf) -> Self {
        Self {
            video_id: video_id.to_string(),
            clip_id: clip_id.to_string(),
            source_size,
            path,
        }
    }

    /// Asset id used in logs and errors.
    pub fn asset_id(&self) -> String {
        format!("{}_{}", self.video_id, self.clip_id)
    }
}

#[async_trait]
pub trait VideoEncoder: Send + Sync {
    async fn encode(
        &self,
        clip: &VideoClip,
        size: RenditionSize,
        container: Container,
        codec: Option<&str>,
    ) -> Result<Vec<u8>>;
}
