use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

use crate::models::ImageData;

#[derive(Debug, thiserror::Error)]
pub enum ImagingError {
    #[error("Failed to decode or encode image: {0}")]
    Codec(#[from] image::ImageError),

    #[error("Re-encoded image was not recognized")]
    Unrecognized,

    #[error("Image worker panicked")]
    Worker,
}

/// Downscale an image so its longest side is at most `max_dimension`.
///
/// Images already within bounds are returned unchanged. Larger ones are
/// re-encoded as JPEG, which the vision model accepts and which keeps
/// request bodies small.
pub fn fit_within(image: &ImageData, max_dimension: u32) -> Result<ImageData, ImagingError> {
    let decoded = image::load_from_memory(image.bytes())?;
    if decoded.width() <= max_dimension && decoded.height() <= max_dimension {
        return Ok(image.clone());
    }

    let resized = decoded.resize(max_dimension, max_dimension, FilterType::Triangle);
    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgb8(resized.to_rgb8());

    let mut buf = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)?;

    tracing::debug!(
        from_width = decoded.width(),
        from_height = decoded.height(),
        to_width = rgb.width(),
        to_height = rgb.height(),
        bytes = buf.len(),
        "Downscaled image for analysis"
    );

    ImageData::from_bytes(buf).map_err(|_| ImagingError::Unrecognized)
}

/// [`fit_within`] for a whole set, off the async executor.
pub async fn fit_all(
    images: &[ImageData],
    max_dimension: u32,
) -> Result<Vec<ImageData>, ImagingError> {
    let images = images.to_vec();
    tokio::task::spawn_blocking(move || {
        images
            .iter()
            .map(|img| fit_within(img, max_dimension))
            .collect::<Result<Vec<_>, _>>()
    })
    .await
    .map_err(|_| ImagingError::Worker)?
}
