use super::{VideoClip, VideoEncoder};
use crate::models::{Container, RenditionSize};
use crate::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Records each encode request and returns a small tagged payload.
#[derive(Clone, Default)]
pub struct MockVideoEncoder {
    requests: Arc<Mutex<Vec<(RenditionSize, Container, Option<String>)>>>,
    should_fail: Arc<Mutex<bool>>,
}

impl MockVideoEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure(self, should_fail: bool) -> Self {
        *self.should_fail.lock().unwrap() = should_fail;
        self
    }

    pub fn get_requests(&self) -> Vec<(RenditionSize, Container, Option<String>)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl VideoEncoder for MockVideoEncoder {
    async fn encode(
        &self,
        clip: &VideoClip,
        size: RenditionSize,
        container: Container,
        codec: Option<&str>,
    ) -> Result<Vec<u8>> {
        if *self.should_fail.lock().unwrap() {
            return Err(crate::Error::Io(std::io::Error::other("Mock encoder failure")));
        }

        self.requests
            .lock()
            .unwrap()
            .push((size, container, codec.map(str::to_string)));
        Ok(format!("{}:{}:{}", clip.asset_id(), size, container).into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_mock_encoder_records_requests() {
        let encoder = MockVideoEncoder::new();
        let clip = VideoClip::new(
            "aid0_extvid0",
            "cid0",
            RenditionSize::new(640, 480),
            PathBuf::from("/tmp/clip.mov"),
        );

        let bytes = encoder
            .encode(&clip, RenditionSize::new(320, 240), Container::Gif, None)
            .await
            .unwrap();
        assert_eq!(bytes, b"aid0_extvid0_cid0:320x240:gif");
        assert_eq!(
            encoder.get_requests(),
            vec![(RenditionSize::new(320, 240), Container::Gif, None)]
        );

        let failing = MockVideoEncoder::new().with_failure(true);
        assert!(failing
            .encode(&clip, RenditionSize::new(1, 1), Container::Mp4, Some("libx264"))
            .await
            .is_err());
    }
}
