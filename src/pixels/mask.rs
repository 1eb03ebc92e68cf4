use image::{Rgba, RgbaImage};

use super::{ensure_dimensions, PixelResult};
use crate::geometry::CanvasPoint;

/// How a reference mask marks the editable pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskReading {
    /// Any alpha below 255 (an erased base layer).
    Alpha,
    /// Bright pixels (a mask layer painted white over black).
    Painted,
}

impl MaskReading {
    fn is_seed(self, pixel: &Rgba<u8>) -> bool {
        match self {
            Self::Alpha => pixel[3] < 255,
            Self::Painted => pixel[3] > 0 && pixel[0] >= 128,
        }
    }
}

/// Dilates the editable area of `mask` by a disc of radius `spread` and writes it into
/// the alpha channel of `pixels`: opaque near an edit, transparent elsewhere.
pub fn derive_alpha_mask(
    pixels: &mut RgbaImage,
    mask: &RgbaImage,
    spread: u32,
    reading: MaskReading,
) -> PixelResult<()> {
    ensure_dimensions("derive_alpha_mask", mask, pixels.width(), pixels.height())?;
    let (width, height) = mask.dimensions();
    let seeds: Vec<bool> = mask.pixels().map(|pixel| reading.is_seed(pixel)).collect();
    let index = |x: u32, y: u32| (y * width + x) as usize;

    let mut covered = seeds.clone();
    let spread_sq = i64::from(spread) * i64::from(spread);
    let reach = i64::from(spread);

    for y in 0..height {
        for x in 0..width {
            if !seeds[index(x, y)] || !is_seed_boundary(&seeds, width, height, x, y) {
                continue;
            }
            for dy in -reach..=reach {
                let ny = i64::from(y) + dy;
                if ny < 0 || ny >= i64::from(height) {
                    continue;
                }
                for dx in -reach..=reach {
                    let nx = i64::from(x) + dx;
                    if nx < 0 || nx >= i64::from(width) || dx * dx + dy * dy > spread_sq {
                        continue;
                    }
                    covered[index(nx as u32, ny as u32)] = true;
                }
            }
        }
    }

    for (x, y, pixel) in pixels.enumerate_pixels_mut() {
        pixel[3] = if covered[index(x, y)] { 255 } else { 0 };
    }
    Ok(())
}

/// A seed with at least one non-seed neighbour; interior seeds add no extra coverage.
fn is_seed_boundary(seeds: &[bool], width: u32, height: u32, x: u32, y: u32) -> bool {
    for dy in -1i64..=1 {
        for dx in -1i64..=1 {
            let nx = i64::from(x) + dx;
            let ny = i64::from(y) + dy;
            if nx < 0 || ny < 0 || nx >= i64::from(width) || ny >= i64::from(height) {
                continue;
            }
            if !seeds[(ny as u32 * width + nx as u32) as usize] {
                return true;
            }
        }
    }
    false
}

/// Erased pixels (alpha below 255) become opaque white, everything else opaque black.
pub fn erasure_to_mask(image: &RgbaImage) -> RgbaImage {
    let mut mask = RgbaImage::new(image.width(), image.height());
    for (source, target) in image.pixels().zip(mask.pixels_mut()) {
        *target = if source[3] < 255 {
            Rgba([255, 255, 255, 255])
        } else {
            Rgba([0, 0, 0, 255])
        };
    }
    mask
}

pub fn invert_rgb(image: &mut RgbaImage) {
    for pixel in image.pixels_mut() {
        pixel[0] = 255 - pixel[0];
        pixel[1] = 255 - pixel[1];
        pixel[2] = 255 - pixel[2];
    }
}

/// Lowers alpha in a disc of `radius` around `center`. The ramp runs from fully
/// transparent at the middle to the existing alpha at the rim; `core_modifier` above 1
/// widens the fully transparent core. Alpha is never raised.
pub fn soft_erase(image: &mut RgbaImage, center: CanvasPoint, radius: f64, core_modifier: f64) {
    if radius <= 0.0 {
        return;
    }
    let start_x = (center.x - radius).max(0.0).floor() as u32;
    let start_y = (center.y - radius).max(0.0).floor() as u32;
    let end_x = (center.x + radius).min(f64::from(image.width())).max(0.0).ceil() as u32;
    let end_y = (center.y + radius).min(f64::from(image.height())).max(0.0).ceil() as u32;

    for y in start_y..end_y.min(image.height()) {
        for x in start_x..end_x.min(image.width()) {
            let distance = (f64::from(x) - center.x).hypot(f64::from(y) - center.y);
            if distance >= radius {
                continue;
            }
            let ramp = (distance / radius) * core_modifier - (core_modifier - 1.0);
            let alpha = (ramp * 255.0).floor().clamp(0.0, 255.0) as u8;
            let pixel = image.get_pixel_mut(x, y);
            pixel[3] = pixel[3].min(alpha);
        }
    }
}
