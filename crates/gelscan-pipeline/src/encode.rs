//! PNG encoding of displayable rasters.

use image::{ExtendedColorType, ImageEncoder};

use crate::types::{BitDepth, GelImage, PipelineError};

/// Encode `image` as PNG, keeping its channel count and bit depth.
///
/// # Errors
///
/// Returns [`PipelineError::ImageEncode`] if the image has a channel
/// count PNG cannot represent without alpha, or the encoder fails.
pub fn encode_png(image: &GelImage) -> Result<Vec<u8>, PipelineError> {
    let color = match (image.channels(), image.bit_depth()) {
        (1, BitDepth::Eight) => ExtendedColorType::L8,
        (1, BitDepth::Sixteen) => ExtendedColorType::L16,
        (3, BitDepth::Eight) => ExtendedColorType::Rgb8,
        (3, BitDepth::Sixteen) => ExtendedColorType::Rgb16,
        (channels, _) => {
            return Err(PipelineError::ImageEncode(format!(
                "cannot encode {channels}-channel image as PNG"
            )));
        }
    };

    let raw: Vec<u8> = match image.bit_depth() {
        BitDepth::Eight => image
            .samples()
            .iter()
            .map(|&v| u8::try_from(v).unwrap_or(u8::MAX))
            .collect(),
        BitDepth::Sixteen => image
            .samples()
            .iter()
            .flat_map(|v| v.to_ne_bytes())
            .collect(),
    };

    let mut png_bytes = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut png_bytes);
    encoder
        .write_image(&raw, image.width(), image.height(), color)
        .map_err(|err| PipelineError::ImageEncode(err.to_string()))?;

    Ok(png_bytes)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::decode::decode;

    #[test]
    fn grey_png_decodes_back_to_the_same_samples() {
        let img = GelImage::from_fn(5, 4, 1, BitDepth::Eight, |x, y, _| {
            u16::try_from(x * 40 + y).unwrap()
        });
        let png = encode_png(&img).unwrap();
        assert_eq!(&png[1..4], b"PNG");
        assert_eq!(decode(&png).unwrap(), img);
    }

    #[test]
    fn sixteen_bit_color_keeps_depth() {
        let img = GelImage::from_fn(2, 2, 3, BitDepth::Sixteen, |x, _, c| {
            if x == 0 { 300 } else { 60000 + u16::try_from(c).unwrap() }
        });
        let back = decode(&encode_png(&img).unwrap()).unwrap();
        assert_eq!(back.bit_depth(), BitDepth::Sixteen);
        assert_eq!(back.sample(1, 1, 2), 60002);
        assert_eq!(back.sample(0, 0, 0), 300);
    }

    #[test]
    fn two_channel_image_is_rejected() {
        let img = GelImage::from_fn(1, 1, 2, BitDepth::Eight, |_, _, _| 0);
        assert!(matches!(
            encode_png(&img),
            Err(PipelineError::ImageEncode(_))
        ));
    }
}
