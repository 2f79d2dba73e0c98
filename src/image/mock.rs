use super::ImageService;
use crate::hosting::SourceCrop;
use crate::models::RenditionSize;
use crate::Result;
use async_trait::async_trait;
use image::DynamicImage;
use std::sync::{Arc, Mutex};

/// Renders `WxH:<md5 of source pixels>` instead of a JPEG, so different
/// sources give different bytes without encoding anything.
pub struct MockImageProcessor {
    render_count: Arc<Mutex<usize>>,
    should_fail: Arc<Mutex<bool>>,
}

impl MockImageProcessor {
    pub fn new() -> Self {
        Self {
            render_count: Arc::new(Mutex::new(0)),
            should_fail: Arc::new(Mutex::new(false)),
        }
    }

    pub fn with_failure(self, should_fail: bool) -> Self {
        *self.should_fail.lock().unwrap() = should_fail;
        self
    }

    pub fn get_render_count(&self) -> usize {
        *self.render_count.lock().unwrap()
    }
}

impl Default for MockImageProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageService for MockImageProcessor {
    async fn render(
        &self,
        source: Arc<DynamicImage>,
        size: RenditionSize,
        _crop: Option<SourceCrop>,
    ) -> Result<Vec<u8>> {
        if *self.should_fail.lock().unwrap() {
            return Err(crate::Error::Image(image::ImageError::IoError(
                std::io::Error::other("Mock failure"),
            )));
        }

        *self.render_count.lock().unwrap() += 1;
        let digest = md5::compute(source.as_bytes());
        Ok(format!("{}:{:x}", size, digest).into_bytes())
    }
}
