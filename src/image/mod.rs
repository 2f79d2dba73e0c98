//! Rendition rendering
//!
//! Crops and resizes a source image to one rendition size and encodes it as
//! JPEG for upload.

pub mod mock;
pub mod processor;

pub use mock::MockImageProcessor;
pub use processor::ImageProcessor;

use crate::hosting::SourceCrop;
use crate::models::RenditionSize;
use crate::Result;
use async_trait::async_trait;
use image::DynamicImage;
use std::sync::Arc;

#[async_trait]
pub trait ImageService: Send + Sync {
    /// JPEG bytes of `source`, cropped by `crop` and filled to `size`.
    async fn render(
        &self,
        source: Arc<DynamicImage>,
        size: RenditionSize,
        crop: Option<SourceCrop>,
    ) -> Result<Vec<u8>>;
}

/// Decode an encoded image (any format the `image` crate reads).
pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    Ok(image::load_from_memory(bytes)?)
}
