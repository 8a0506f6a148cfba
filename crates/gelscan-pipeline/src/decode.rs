//! Image decoding.
//!
//! Accepts raw image bytes (PNG, JPEG, TIFF, BMP, WebP) and produces a
//! [`GelImage`] with the source's channel count and bit depth preserved.
//!
//! This is the entry point of the pipeline: raw bytes in, `GelImage` out.

use image::DynamicImage;

use crate::types::{BitDepth, GelImage, ImageParameters, PipelineError};

/// Decode raw image bytes into a [`GelImage`].
///
/// Grey sources become single-channel images and color sources become
/// three-channel images. 8-bit and 16-bit sources keep their depth; float
/// sources are converted to 16-bit RGB. Alpha planes are dropped but
/// recorded via [`GelImage::has_alpha`].
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the image format is
/// unrecognized or the data is corrupt.
pub fn decode(bytes: &[u8]) -> Result<GelImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let image = image::load_from_memory(bytes)?;
    from_dynamic(&image)
}

/// Convert an already-decoded [`DynamicImage`].
///
/// # Errors
///
/// Returns [`PipelineError::BufferSize`] only if the `image` crate hands
/// back an inconsistent buffer.
pub fn from_dynamic(image: &DynamicImage) -> Result<GelImage, PipelineError> {
    let (w, h) = (image.width(), image.height());
    let has_alpha = image.color().has_alpha();

    let converted = match image {
        DynamicImage::ImageLuma8(buf) => widen(w, h, 1, BitDepth::Eight, buf.as_raw()),
        DynamicImage::ImageLumaA8(_) => {
            widen(w, h, 1, BitDepth::Eight, image.to_luma8().as_raw())
        }
        DynamicImage::ImageRgb8(buf) => widen(w, h, 3, BitDepth::Eight, buf.as_raw()),
        DynamicImage::ImageRgba8(_) => widen(w, h, 3, BitDepth::Eight, image.to_rgb8().as_raw()),
        DynamicImage::ImageLuma16(buf) => {
            GelImage::from_samples(w, h, 1, BitDepth::Sixteen, buf.as_raw().clone())
        }
        DynamicImage::ImageLumaA16(_) => {
            GelImage::from_samples(w, h, 1, BitDepth::Sixteen, image.to_luma16().into_raw())
        }
        DynamicImage::ImageRgb16(buf) => {
            GelImage::from_samples(w, h, 3, BitDepth::Sixteen, buf.as_raw().clone())
        }
        // Float and any future layouts go through 16-bit RGB.
        _ => GelImage::from_samples(w, h, 3, BitDepth::Sixteen, image.to_rgb16().into_raw()),
    }?;

    Ok(converted.with_alpha(has_alpha))
}

/// Summarize a decoded image for the host.
#[must_use]
pub const fn image_parameters(image: &GelImage) -> ImageParameters {
    ImageParameters {
        size: image.dimensions(),
        channel_count: image.channels(),
        has_alpha: image.has_alpha(),
        bit_depth: image.bit_depth(),
    }
}

fn widen(
    width: u32,
    height: u32,
    channels: u8,
    depth: BitDepth,
    raw: &[u8],
) -> Result<GelImage, PipelineError> {
    GelImage::from_samples(
        width,
        height,
        channels,
        depth,
        raw.iter().copied().map(u16::from).collect(),
    )
}
