//! Downscale, re-encode and upload article images.

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

use image::imageops::FilterType;
use image::{DynamicImage, ImageOutputFormat};
use storage::repository::ObjectStore;
use uuid::Uuid;

use crate::error::ImageUploadError;

/// Images wider than this are scaled down, keeping the aspect ratio.
pub const MAX_IMAGE_WIDTH: u32 = 1200;

/// JPEG quality used for every uploaded image.
pub const JPEG_QUALITY: u8 = 80;

const JPEG_CONTENT_TYPE: &str = "image/jpeg";

/// Where a picked image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

#[derive(Clone)]
pub struct ImageUploader {
    objects: Arc<dyn ObjectStore>,
    max_width: u32,
    quality: u8,
}

impl ImageUploader {
    #[must_use]
    pub fn new(objects: Arc<dyn ObjectStore>) -> Self {
        Self {
            objects,
            max_width: MAX_IMAGE_WIDTH,
            quality: JPEG_QUALITY,
        }
    }

    /// Prepare and upload an image, returning its public URL.
    ///
    /// Any failure is logged and reported as `None`; saving an article never
    /// fails because of its image.
    pub async fn upload(&self, source: &ImageSource) -> Option<String> {
        match self.try_upload(source).await {
            Ok(url) => Some(url),
            Err(err) => {
                tracing::warn!(error = %err, "image upload failed; continuing without image");
                None
            }
        }
    }

    async fn try_upload(&self, source: &ImageSource) -> Result<String, ImageUploadError> {
        let raw = match source {
            ImageSource::Path(path) => tokio::fs::read(path).await?,
            ImageSource::Bytes(bytes) => bytes.clone(),
        };
        let (max_width, quality) = (self.max_width, self.quality);
        let jpeg = tokio::task::spawn_blocking(move || encode_jpeg(&raw, max_width, quality))
            .await
            .map_err(|e| ImageUploadError::Task(e.to_string()))??;

        let key = format!("{}.jpg", Uuid::new_v4());
        let size = jpeg.len();
        self.objects
            .upload(&key, jpeg, JPEG_CONTENT_TYPE, false)
            .await?;
        tracing::debug!(%key, size, "image uploaded");
        Ok(self.objects.public_url(&key))
    }
}

/// Decode any supported format, cap the width and re-encode as JPEG.
pub(crate) fn encode_jpeg(
    raw: &[u8],
    max_width: u32,
    quality: u8,
) -> Result<Vec<u8>, ImageUploadError> {
    let mut img = image::load_from_memory(raw)?;
    if img.width() > max_width {
        img = img.resize(max_width, u32::MAX, FilterType::Triangle);
    }
    // JPEG has no alpha channel
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut out = Cursor::new(Vec::new());
    rgb.write_to(&mut out, ImageOutputFormat::Jpeg(quality))?;
    Ok(out.into_inner())
}
