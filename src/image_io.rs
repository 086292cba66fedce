//! Image decoding, cropping and wire encoding.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

use crate::detect::BoundingBox;

/// Upper bound for uploaded image payloads.
pub const MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024;
const JPEG_QUALITY: u8 = 90;

/// Decode an uploaded jpg/png payload into RGB.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage> {
    if bytes.is_empty() {
        return Err(anyhow!("image payload is empty"));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(anyhow!(
            "image payload is {} bytes; limit is {}",
            bytes.len(),
            MAX_IMAGE_BYTES
        ));
    }
    let image = image::load_from_memory(bytes).context("decode image")?;
    Ok(image.into_rgb8())
}

pub fn load_image(path: &Path) -> Result<RgbImage> {
    let bytes =
        std::fs::read(path).with_context(|| format!("read image {}", path.display()))?;
    decode_image(&bytes).with_context(|| format!("load image {}", path.display()))
}

/// Crop `bbox` out of `image`, clamped to the image bounds.
///
/// Returns `None` when nothing of the box lies inside the image.
pub fn crop_region(image: &RgbImage, bbox: &BoundingBox) -> Option<RgbImage> {
    let (w, h) = (image.width() as i64, image.height() as i64);
    let x1 = (bbox.x1 as i64).clamp(0, w);
    let y1 = (bbox.y1 as i64).clamp(0, h);
    let x2 = (bbox.x2 as i64).clamp(0, w);
    let y2 = (bbox.y2 as i64).clamp(0, h);
    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    let view = image::imageops::crop_imm(
        image,
        x1 as u32,
        y1 as u32,
        (x2 - x1) as u32,
        (y2 - y1) as u32,
    );
    Some(view.to_image())
}

pub fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY)
        .encode_image(image)
        .context("encode jpeg")?;
    Ok(bytes)
}

/// JPEG-encode and base64 the image for JSON request bodies.
pub fn encode_jpeg_base64(image: &RgbImage) -> Result<String> {
    Ok(STANDARD.encode(encode_jpeg(image)?))
}
