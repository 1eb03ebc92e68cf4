use image::RgbaImage;

use super::{ensure_dimensions, PixelResult};
use crate::geometry::{ImageBounds, Rect};

/// Which edges of a buffer receive an alpha ramp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeatherEdges {
    pub left: bool,
    pub top: bool,
    pub right: bool,
    pub bottom: bool,
}

impl FeatherEdges {
    pub const NONE: FeatherEdges = FeatherEdges::new(false, false, false, false);
    pub const ALL: FeatherEdges = FeatherEdges::new(true, true, true, true);

    pub const fn new(left: bool, top: bool, right: bool, bottom: bool) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Edges of `region` that sit inside the image; flush edges have nothing to blend into.
    pub fn interior(region: Rect, image: ImageBounds) -> Self {
        let (left, top, right, bottom) = region.flush_edges(image);
        Self::new(!left, !top, !right, !bottom)
    }

    pub const fn any(&self) -> bool {
        self.left || self.top || self.right || self.bottom
    }
}

pub fn default_feather_width(region: Rect) -> u32 {
    region.width.min(region.height) / 8
}

/// Feathers the interior edges of `pixels`, which holds the content of `region`.
///
/// `width` defaults to an eighth of the region's shorter side.
pub fn feather_edges(
    pixels: &mut RgbaImage,
    region: Rect,
    image: ImageBounds,
    width: Option<u32>,
) -> PixelResult<()> {
    ensure_dimensions("feather_edges", pixels, region.width, region.height)?;
    let width = width.unwrap_or_else(|| default_feather_width(region));
    feather_edges_with(pixels, FeatherEdges::interior(region, image), width);
    Ok(())
}

/// Linear alpha ramp from 0 on each selected edge to opaque `width` pixels in.
/// Alpha is only ever lowered.
pub fn feather_edges_with(pixels: &mut RgbaImage, edges: FeatherEdges, width: u32) {
    if width == 0 || !edges.any() {
        return;
    }
    let (buffer_width, buffer_height) = pixels.dimensions();
    let ramp = |distance: u32| -> u8 {
        ((f64::from(distance) / f64::from(width)) * 255.0).round() as u8
    };

    for (x, y, pixel) in pixels.enumerate_pixels_mut() {
        let mut alpha = pixel[3];
        if edges.left && x < width {
            alpha = alpha.min(ramp(x));
        }
        if edges.top && y < width {
            alpha = alpha.min(ramp(y));
        }
        let from_right = buffer_width - 1 - x;
        if edges.right && from_right < width {
            alpha = alpha.min(ramp(from_right));
        }
        let from_bottom = buffer_height - 1 - y;
        if edges.bottom && from_bottom < width {
            alpha = alpha.min(ramp(from_bottom));
        }
        pixel[3] = alpha;
    }
}
