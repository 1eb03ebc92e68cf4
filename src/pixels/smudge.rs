use image::RgbaImage;

use crate::geometry::CanvasPoint;

/// Smudges along a segment, one dab per unit step starting at `from`.
pub fn smudge_line(
    image: &mut RgbaImage,
    from: CanvasPoint,
    to: CanvasPoint,
    brush_size: u32,
    opacity: f32,
) {
    let length = from.distance_to(to);
    if length < f64::EPSILON {
        return;
    }
    let unit_x = (to.x - from.x) / length;
    let unit_y = (to.y - from.y) / length;

    let mut step = 0.0;
    while step < length {
        let center = CanvasPoint::new(from.x + unit_x * step, from.y + unit_y * step);
        smudge_dab(image, center, brush_size, opacity);
        step += 1.0;
    }
}

/// Pulls every pixel inside the circular footprint toward the footprint's mean color.
pub fn smudge_dab(image: &mut RgbaImage, center: CanvasPoint, brush_size: u32, opacity: f32) {
    if brush_size == 0 {
        return;
    }
    let radius = f64::from(brush_size) / 2.0;
    let left = (center.x - radius).floor() as i64;
    let top = (center.y - radius).floor() as i64;
    let (width, height) = (i64::from(image.width()), i64::from(image.height()));

    let mut footprint = Vec::with_capacity((brush_size * brush_size) as usize);
    for j in 0..i64::from(brush_size) {
        for i in 0..i64::from(brush_size) {
            let (x, y) = (left + i, top + j);
            if x < 0 || y < 0 || x >= width || y >= height {
                continue;
            }
            let dx = i as f64 - radius;
            let dy = j as f64 - radius;
            if dx.hypot(dy) <= radius {
                footprint.push((x as u32, y as u32));
            }
        }
    }
    if footprint.is_empty() {
        return;
    }

    let mut sums = [0u64; 3];
    for &(x, y) in &footprint {
        let pixel = image.get_pixel(x, y);
        for (sum, value) in sums.iter_mut().zip(&pixel.0[..3]) {
            *sum += u64::from(*value);
        }
    }
    let count = footprint.len() as f32;
    let average = sums.map(|sum| sum as f32 / count);
    let opacity = opacity.clamp(0.0, 1.0);

    for (x, y) in footprint {
        let pixel = image.get_pixel_mut(x, y);
        for (channel, mean) in average.iter().enumerate() {
            let current = f32::from(pixel[channel]);
            pixel[channel] = (current + (mean - current) * opacity).round().clamp(0.0, 255.0) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn smudge_on_uniform_image_changes_nothing() {
        let original = RgbaImage::from_pixel(32, 32, Rgba([120, 60, 30, 255]));
        let mut image = original.clone();

        smudge_line(
            &mut image,
            CanvasPoint::new(4.0, 4.0),
            CanvasPoint::new(28.0, 20.0),
            10,
            0.5,
        );

        assert_eq!(image, original);
    }

    #[test]
    fn smudge_dab_blends_toward_footprint_mean_and_spares_outside() {
        let mut image = RgbaImage::from_pixel(20, 20, Rgba([0, 0, 0, 255]));
        for y in 0..20 {
            for x in 10..20 {
                image.put_pixel(x, y, Rgba([200, 200, 200, 255]));
            }
        }

        smudge_dab(&mut image, CanvasPoint::new(10.0, 10.0), 6, 1.0);

        let left = image.get_pixel(8, 10)[0];
        let right = image.get_pixel(11, 10)[0];
        assert_eq!(left, right);
        assert!(left > 0 && left < 200);
        assert_eq!(image.get_pixel(2, 10)[0], 0);
        assert_eq!(image.get_pixel(18, 10)[0], 200);
    }

    #[test]
    fn zero_length_stroke_is_noop() {
        let mut image = RgbaImage::from_pixel(8, 8, Rgba([1, 2, 3, 255]));
        image.put_pixel(4, 4, Rgba([255, 255, 255, 255]));
        let before = image.clone();

        smudge_line(&mut image, CanvasPoint::new(4.0, 4.0), CanvasPoint::new(4.0, 4.0), 4, 1.0);

        assert_eq!(image, before);
    }

    #[test]
    fn smudge_leaves_alpha_alone() {
        let mut image = RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 90]));
        image.put_pixel(5, 5, Rgba([255, 255, 255, 90]));

        smudge_dab(&mut image, CanvasPoint::new(5.0, 5.0), 4, 0.5);

        assert!(image.pixels().all(|pixel| pixel[3] == 90));
    }
}
