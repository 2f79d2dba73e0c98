use super::ImageService;
use crate::hosting::SourceCrop;
use crate::models::RenditionSize;
use crate::{Error, Result};
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use std::sync::Arc;

const DEFAULT_QUALITY: u8 = 90;

pub struct ImageProcessor {
    quality: u8,
}

impl ImageProcessor {
    pub fn new() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
        }
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(1, 100);
        self
    }

    fn render_sync(
        source: &DynamicImage,
        size: RenditionSize,
        crop: Option<SourceCrop>,
        quality: u8,
    ) -> Result<Vec<u8>> {
        let cropped = match crop {
            Some(crop) => {
                let (x, y, w, h) = crop.region(source.width(), source.height());
                source.crop_imm(x, y, w, h)
            }
            None => source.clone(),
        };

        let resized = if cropped.width() == size.width && cropped.height() == size.height {
            cropped
        } else {
            cropped.resize_to_fill(size.width, size.height, FilterType::Lanczos3)
        };

        // JPEG has no alpha channel
        let rgb = DynamicImage::ImageRgb8(resized.to_rgb8());
        let mut bytes = Vec::new();
        rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut bytes, quality))?;
        Ok(bytes)
    }
}

impl Default for ImageProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageService for ImageProcessor {
    async fn render(
        &self,
        source: Arc<DynamicImage>,
        size: RenditionSize,
        crop: Option<SourceCrop>,
    ) -> Result<Vec<u8>> {
        if size.width == 0 || size.height == 0 {
            return Err(Error::InvalidConfiguration(format!(
                "cannot render a {} rendition",
                size
            )));
        }

        let quality = self.quality;
        tokio::task::spawn_blocking(move || Self::render_sync(&source, size, crop, quality))
            .await
            .map_err(|e| Error::Invariant(format!("Image processing task join error: {}", e)))?
    }
}
