use image::{Rgba, RgbaImage};

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Base,
    Edit,
    Mask,
}

/// Which pixels a brush stroke lands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BrushTarget {
    #[default]
    Edit,
    Mask,
}

/// How an encoded mask is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskSource {
    /// Erased base-layer pixels become white.
    Erasure,
    /// The painted mask layer as-is.
    MaskLayer,
}

/// One offscreen RGBA buffer owned by the renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterLayer {
    pixels: RgbaImage,
}

impl RasterLayer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: RgbaImage::new(width, height),
        }
    }

    pub fn filled(width: u32, height: u32, color: Rgba<u8>) -> Self {
        Self {
            pixels: RgbaImage::from_pixel(width, height, color),
        }
    }

    pub fn from_pixels(pixels: RgbaImage) -> Self {
        Self { pixels }
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut RgbaImage {
        &mut self.pixels
    }

    pub fn replace(&mut self, pixels: RgbaImage) {
        self.pixels = pixels;
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// Clears to transparent, reallocating when the size changes.
    pub fn reset(&mut self, width: u32, height: u32) {
        if self.pixels.dimensions() == (width, height) {
            self.clear();
        } else {
            self.pixels = RgbaImage::new(width, height);
        }
    }

    pub fn clear(&mut self) {
        self.pixels.pixels_mut().for_each(|pixel| *pixel = TRANSPARENT);
    }

    pub fn is_blank(&self) -> bool {
        self.pixels.pixels().all(|pixel| pixel[3] == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_clears_and_resizes() {
        let mut layer = RasterLayer::filled(4, 4, Rgba([1, 2, 3, 255]));
        layer.reset(4, 4);
        assert!(layer.is_blank());

        layer.reset(8, 2);
        assert_eq!(layer.dimensions(), (8, 2));
        assert!(layer.is_blank());
    }
}
