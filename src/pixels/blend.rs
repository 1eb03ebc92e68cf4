use image::{Rgba, RgbaImage};

use crate::geometry::{CanvasPoint, Color, Rect};

/// Source-over blend of one non-premultiplied pixel onto another.
pub(crate) fn blend_pixel(dst: Rgba<u8>, src: Rgba<u8>, opacity: f32) -> Rgba<u8> {
    let src_alpha = f32::from(src[3]) / 255.0 * opacity.clamp(0.0, 1.0);
    if src_alpha <= 0.0 {
        return dst;
    }
    if src_alpha >= 1.0 {
        return src;
    }
    let dst_alpha = f32::from(dst[3]) / 255.0;
    let out_alpha = src_alpha + dst_alpha * (1.0 - src_alpha);
    if out_alpha <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let channel = |index: usize| {
        let value = (f32::from(src[index]) * src_alpha
            + f32::from(dst[index]) * dst_alpha * (1.0 - src_alpha))
            / out_alpha;
        value.round().clamp(0.0, 255.0) as u8
    };
    Rgba([
        channel(0),
        channel(1),
        channel(2),
        (out_alpha * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}

/// Draws `src` onto `dst` with its top-left corner at (`x`, `y`), clipping to `dst`.
pub fn composite_over(dst: &mut RgbaImage, src: &RgbaImage, x: i64, y: i64, opacity: f32) {
    for_each_overlap(dst, src, x, y, |dst_pixel, src_pixel| {
        *dst_pixel = blend_pixel(*dst_pixel, src_pixel, opacity);
    });
}

/// Overwrites the pixels of `dst` covered by `src`, alpha included.
pub fn paste_region(dst: &mut RgbaImage, src: &RgbaImage, x: i64, y: i64) {
    for_each_overlap(dst, src, x, y, |dst_pixel, src_pixel| {
        *dst_pixel = src_pixel;
    });
}

fn for_each_overlap<F>(dst: &mut RgbaImage, src: &RgbaImage, x: i64, y: i64, mut apply: F)
where
    F: FnMut(&mut Rgba<u8>, Rgba<u8>),
{
    let dst_width = i64::from(dst.width());
    let dst_height = i64::from(dst.height());
    let start_x = x.max(0);
    let start_y = y.max(0);
    let end_x = (x + i64::from(src.width())).min(dst_width);
    let end_y = (y + i64::from(src.height())).min(dst_height);

    for dy in start_y..end_y {
        for dx in start_x..end_x {
            let src_pixel = *src.get_pixel((dx - x) as u32, (dy - y) as u32);
            apply(dst.get_pixel_mut(dx as u32, dy as u32), src_pixel);
        }
    }
}

/// Copies `region` out of `src`; parts outside the source read as transparent black.
pub fn crop_region(src: &RgbaImage, region: Rect) -> RgbaImage {
    let mut out = RgbaImage::new(region.width, region.height);
    paste_region(&mut out, src, -i64::from(region.x), -i64::from(region.y));
    out
}

/// Paints a filled disc centered on a sub-pixel position.
pub fn fill_circle(image: &mut RgbaImage, center: CanvasPoint, radius: f64, color: Color) {
    if radius <= 0.0 {
        return;
    }
    let paint = color.to_rgba();
    let min_x = (center.x - radius).floor().max(0.0) as i64;
    let min_y = (center.y - radius).floor().max(0.0) as i64;
    let max_x = ((center.x + radius).ceil() as i64).min(i64::from(image.width()));
    let max_y = ((center.y + radius).ceil() as i64).min(i64::from(image.height()));

    for py in min_y..max_y {
        for px in min_x..max_x {
            let dx = px as f64 + 0.5 - center.x;
            let dy = py as f64 + 0.5 - center.y;
            if dx.hypot(dy) <= radius {
                let pixel = image.get_pixel_mut(px as u32, py as u32);
                *pixel = blend_pixel(*pixel, paint, 1.0);
            }
        }
    }
}

/// Round-capped thick line built from discs at most one pixel apart.
pub fn stamp_line(
    image: &mut RgbaImage,
    from: CanvasPoint,
    to: CanvasPoint,
    width: f64,
    color: Color,
) {
    let radius = width / 2.0;
    let length = from.distance_to(to);
    let steps = length.ceil().max(1.0) as u32;
    for step in 0..=steps {
        let t = f64::from(step) / f64::from(steps);
        let point = CanvasPoint::new(
            from.x + (to.x - from.x) * t,
            from.y + (to.y - from.y) * t,
        );
        fill_circle(image, point, radius, color);
    }
}
