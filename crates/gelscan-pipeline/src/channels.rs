//! Channel selection, grey merging and channel splitting.

use crate::types::{ChannelSelection, GelImage, PipelineError};

/// Number of channels an image must have for [`split_channels`] to apply.
pub const RGB_CHANNELS: u8 = 3;

/// Resolve a selection against an image with `channel_count` channels.
///
/// A single-channel image always uses its only channel. Otherwise the
/// selected indices that exist in the image are returned in ascending
/// order.
///
/// # Errors
///
/// Returns [`PipelineError::NoActiveChannels`] if no selected channel
/// exists in the image.
pub fn effective_channels(
    selection: &ChannelSelection,
    channel_count: u8,
) -> Result<Vec<usize>, PipelineError> {
    if channel_count == 1 {
        return Ok(vec![0]);
    }
    let active: Vec<usize> = (0..usize::from(channel_count))
        .filter(|&c| selection.is_selected(c))
        .collect();
    if active.is_empty() {
        return Err(PipelineError::NoActiveChannels);
    }
    Ok(active)
}

/// Merge the `channels` of `image` into a single grey plane by averaging.
///
/// A single-channel image is returned unchanged.
#[must_use = "returns the grey image"]
pub fn grey_preview(image: &GelImage, channels: &[usize]) -> GelImage {
    if image.channels() == 1 || channels.is_empty() {
        return image.clone();
    }
    let count = channels.len() as u32;
    GelImage::from_fn(image.width(), image.height(), 1, image.bit_depth(), |x, y, _| {
        let sum: u32 = channels
            .iter()
            .map(|&c| u32::from(image.sample(x, y, c)))
            .sum();
        u16::try_from(sum / count).unwrap_or(u16::MAX)
    })
}

/// Split a three-channel image into its three grey planes.
///
/// Returns `None` for any other channel count.
#[must_use]
pub fn split_channels(image: &GelImage) -> Option<[GelImage; 3]> {
    if image.channels() != RGB_CHANNELS {
        return None;
    }
    Some(std::array::from_fn(|c| {
        GelImage::from_fn(image.width(), image.height(), 1, image.bit_depth(), |x, y, _| {
            image.sample(x, y, c)
        })
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::BitDepth;

    fn rgb() -> GelImage {
        GelImage::from_fn(2, 2, 3, BitDepth::Eight, |_, _, c| [30, 60, 91][c])
    }

    #[test]
    fn single_channel_always_uses_channel_zero() {
        let none = ChannelSelection::new(vec![false, true]);
        assert_eq!(effective_channels(&none, 1).unwrap(), vec![0]);
    }

    #[test]
    fn selection_is_filtered_to_existing_channels() {
        let selection = ChannelSelection::new(vec![true, false, true, true]);
        assert_eq!(effective_channels(&selection, 3).unwrap(), vec![0, 2]);
    }

    #[test]
    fn missing_selection_is_rejected() {
        let selection = ChannelSelection::new(vec![false, false, false, true]);
        assert!(matches!(
            effective_channels(&selection, 3),
            Err(PipelineError::NoActiveChannels)
        ));
    }

    #[test]
    fn grey_averages_selected_channels() {
        let grey = grey_preview(&rgb(), &[0, 1, 2]);
        assert_eq!(grey.channels(), 1);
        assert!(grey.samples().iter().all(|&v| v == 60));

        let partial = grey_preview(&rgb(), &[0, 2]);
        assert!(partial.samples().iter().all(|&v| v == 60));

        let only_green = grey_preview(&rgb(), &[1]);
        assert!(only_green.samples().iter().all(|&v| v == 60));

        let red_green = grey_preview(&rgb(), &[0, 1]);
        assert!(red_green.samples().iter().all(|&v| v == 45));
    }

    #[test]
    fn grey_of_single_channel_is_identity() {
        let img = GelImage::from_fn(3, 1, 1, BitDepth::Eight, |x, _, _| u16::try_from(x).unwrap());
        assert_eq!(grey_preview(&img, &[0]), img);
    }

    #[test]
    fn split_produces_three_planes() {
        let [r, g, b] = split_channels(&rgb()).unwrap();
        assert!(r.samples().iter().all(|&v| v == 30));
        assert!(g.samples().iter().all(|&v| v == 60));
        assert!(b.samples().iter().all(|&v| v == 91));
        assert_eq!(r.channels(), 1);
        assert_eq!(b.dimensions(), rgb().dimensions());
    }

    #[test]
    fn split_skips_non_rgb_images() {
        let grey = GelImage::from_fn(2, 2, 1, BitDepth::Eight, |_, _, _| 0);
        assert!(split_channels(&grey).is_none());
    }
}
