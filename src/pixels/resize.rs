use image::{imageops, RgbaImage};

use crate::geometry::round_up_to_multiple;

pub fn resize_to(image: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    if image.dimensions() == (width, height) {
        return image.clone();
    }
    imageops::resize(image, width, height, imageops::FilterType::Triangle)
}

/// Stretches `image` so both sides are multiples of `multiple`, rounding up.
pub fn fix_image_size(image: &RgbaImage, multiple: u32) -> RgbaImage {
    let width = round_up_to_multiple(image.width(), multiple);
    let height = round_up_to_multiple(image.height(), multiple);
    if (width, height) != image.dimensions() {
        tracing::debug!(
            from_width = image.width(),
            from_height = image.height(),
            width,
            height,
            "resizing image to model size multiple"
        );
    }
    resize_to(image, width, height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn fix_image_size_rounds_both_sides_up() {
        let image = RgbaImage::from_pixel(500, 129, Rgba([1, 1, 1, 255]));
        assert_eq!(fix_image_size(&image, 64).dimensions(), (512, 192));
    }

    #[test]
    fn fix_image_size_leaves_aligned_image_untouched() {
        let image = RgbaImage::from_pixel(128, 64, Rgba([7, 8, 9, 255]));
        assert_eq!(fix_image_size(&image, 64), image);
    }
}
