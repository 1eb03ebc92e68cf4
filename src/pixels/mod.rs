//! Stateless pixel-buffer passes shared by the renderer and background jobs.
//!
//! Every function here works on explicit `RgbaImage` buffers and holds no state, so the
//! same code runs on the interaction thread or inside a worker job.

mod blend;
mod codec;
mod color;
mod feather;
mod mask;
mod resize;
mod smudge;
mod tiles;

use thiserror::Error;

pub(crate) use blend::blend_pixel;
pub use blend::{composite_over, crop_region, fill_circle, paste_region, stamp_line};
pub use codec::{decode_image, encode_image, EncodeFormat};
pub use color::{average_color, balance_colors};
pub use feather::{default_feather_width, feather_edges, feather_edges_with, FeatherEdges};
pub use mask::{derive_alpha_mask, erasure_to_mask, invert_rgb, soft_erase, MaskReading};
pub use resize::{fix_image_size, resize_to};
pub use smudge::{smudge_dab, smudge_line};
pub use tiles::{merge_tiles, split_image, Tile, TileGrid, TileLayout};

pub use image::{Rgba, RgbaImage};

use crate::geometry::{ImageBounds, Rect};

#[derive(Debug, Error)]
pub enum PixelError {
    #[error("{operation}: expected {expected_width}x{expected_height} pixels, got {actual_width}x{actual_height}")]
    DimensionMismatch {
        operation: &'static str,
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },
    #[error("{operation}: region is empty")]
    EmptyRegion { operation: &'static str },
    #[error("image codec error: {0}")]
    Codec(#[from] image::ImageError),
}

pub type PixelResult<T> = std::result::Result<T, PixelError>;

pub(crate) fn ensure_dimensions(
    operation: &'static str,
    image: &RgbaImage,
    width: u32,
    height: u32,
) -> PixelResult<()> {
    if image.width() == width && image.height() == height {
        return Ok(());
    }
    Err(PixelError::DimensionMismatch {
        operation,
        expected_width: width,
        expected_height: height,
        actual_width: image.width(),
        actual_height: image.height(),
    })
}

/// Where the alpha of a post-processed variant comes from.
#[derive(Debug, Clone)]
pub enum AlphaSource {
    None,
    /// Base-layer pixels after erasing; erased pixels have alpha below 255.
    Erasure(RgbaImage),
    /// A painted mask layer; white marks editable pixels.
    Painted(RgbaImage),
}

/// One generated variant waiting to be fitted into its selection.
#[derive(Debug, Clone)]
pub struct VariantJob {
    pub pixels: RgbaImage,
    pub region: Rect,
    pub image: ImageBounds,
    pub feather_width: Option<u32>,
    pub feather: bool,
    pub alpha: AlphaSource,
    pub spread: u32,
    /// Original pixels of the region; the variant's mean color is pulled toward them.
    pub color_reference: Option<RgbaImage>,
}

/// Resize a decoded variant to its selection, then apply color balance, the alpha mask
/// and feathering.
pub fn process_variant(job: VariantJob) -> PixelResult<RgbaImage> {
    let VariantJob {
        pixels,
        region,
        image,
        feather_width,
        feather,
        alpha,
        spread,
        color_reference,
    } = job;
    if region.is_empty() {
        return Err(PixelError::EmptyRegion {
            operation: "process_variant",
        });
    }

    let mut fitted = if pixels.dimensions() == (region.width, region.height) {
        pixels
    } else {
        resize_to(&pixels, region.width, region.height)
    };

    if let Some(reference) = color_reference {
        balance_colors(&reference, &mut fitted);
    }

    match alpha {
        AlphaSource::None => {}
        AlphaSource::Erasure(mask) => {
            derive_alpha_mask(&mut fitted, &mask, spread, MaskReading::Alpha)?;
        }
        AlphaSource::Painted(mask) => {
            derive_alpha_mask(&mut fitted, &mask, spread, MaskReading::Painted)?;
        }
    }

    if feather {
        feather_edges(&mut fitted, region, image, feather_width)?;
    }

    Ok(fitted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_variant_resizes_to_selection_before_feathering() {
        let job = VariantJob {
            pixels: RgbaImage::from_pixel(64, 64, Rgba([10, 20, 30, 255])),
            region: Rect::new(100, 100, 128, 128),
            image: ImageBounds::new(512, 512),
            feather_width: Some(10),
            feather: true,
            alpha: AlphaSource::None,
            spread: 10,
            color_reference: None,
        };

        let result = process_variant(job).expect("variant should process");
        assert_eq!(result.dimensions(), (128, 128));
        assert_eq!(result.get_pixel(0, 64)[3], 0);
        assert_eq!(result.get_pixel(64, 64)[3], 255);
    }

    #[test]
    fn process_variant_feathers_after_the_alpha_mask() {
        let job = VariantJob {
            pixels: RgbaImage::from_pixel(64, 64, Rgba([10, 20, 30, 255])),
            region: Rect::new(100, 100, 64, 64),
            image: ImageBounds::new(512, 512),
            feather_width: Some(8),
            feather: true,
            alpha: AlphaSource::Erasure(RgbaImage::new(64, 64)),
            spread: 4,
            color_reference: None,
        };

        let result = process_variant(job).expect("variant should process");
        assert_eq!(result.get_pixel(0, 32)[3], 0);
        assert_eq!(result.get_pixel(32, 32)[3], 255);
    }

    #[test]
    fn process_variant_balances_colors_against_the_reference() {
        let job = VariantJob {
            pixels: RgbaImage::from_pixel(32, 32, Rgba([20, 40, 60, 255])),
            region: Rect::new(0, 0, 32, 32),
            image: ImageBounds::new(32, 32),
            feather_width: None,
            feather: false,
            alpha: AlphaSource::None,
            spread: 0,
            color_reference: Some(RgbaImage::from_pixel(32, 32, Rgba([40, 80, 130, 255]))),
        };

        let result = process_variant(job).expect("variant should process");
        assert_eq!(*result.get_pixel(5, 5), Rgba([40, 80, 120, 255]));
    }

    #[test]
    fn process_variant_rejects_mask_of_wrong_size() {
        let job = VariantJob {
            pixels: RgbaImage::from_pixel(32, 32, Rgba([0, 0, 0, 255])),
            region: Rect::new(0, 0, 32, 32),
            image: ImageBounds::new(32, 32),
            feather_width: None,
            feather: false,
            alpha: AlphaSource::Erasure(RgbaImage::new(16, 16)),
            spread: 4,
            color_reference: None,
        };

        let err = process_variant(job).expect_err("mask size mismatch should fail");
        assert!(matches!(err, PixelError::DimensionMismatch { .. }));
    }

    #[test]
    fn process_variant_rejects_empty_region() {
        let job = VariantJob {
            pixels: RgbaImage::new(4, 4),
            region: Rect::new(0, 0, 0, 4),
            image: ImageBounds::new(4, 4),
            feather_width: None,
            feather: false,
            alpha: AlphaSource::None,
            spread: 0,
            color_reference: None,
        };
        assert!(matches!(
            process_variant(job),
            Err(PixelError::EmptyRegion { .. })
        ));
    }
}
