use image::RgbaImage;

/// Mean RGB over pixels with non-zero alpha, or `None` when every pixel is transparent.
pub fn average_color(image: &RgbaImage) -> Option<[f64; 3]> {
    let mut sums = [0u64; 3];
    let mut count = 0u64;
    for pixel in image.pixels().filter(|pixel| pixel[3] > 0) {
        for (sum, value) in sums.iter_mut().zip(pixel.0) {
            *sum += u64::from(value);
        }
        count += 1;
    }
    if count == 0 {
        return None;
    }
    Some(sums.map(|sum| sum as f64 / count as f64))
}

/// Scales each channel of `target` by the integer-truncated ratio between the mean
/// color of `reference` and its own mean color.
///
/// The truncation means drifts smaller than 2x leave a channel untouched and a
/// brighter target collapses that channel to zero. Channels whose target mean is zero
/// are skipped. Returns the multipliers applied.
pub fn balance_colors(reference: &RgbaImage, target: &mut RgbaImage) -> Option<[u32; 3]> {
    let reference_mean = average_color(reference)?;
    let target_mean = average_color(target)?;

    let mut multipliers = [1u32; 3];
    for (channel, multiplier) in multipliers.iter_mut().enumerate() {
        if target_mean[channel] > 0.0 {
            *multiplier = (reference_mean[channel] / target_mean[channel]).floor() as u32;
        }
    }

    for pixel in target.pixels_mut() {
        for (channel, multiplier) in multipliers.iter().enumerate() {
            let scaled = u32::from(pixel[channel]).saturating_mul(*multiplier);
            pixel[channel] = scaled.min(255) as u8;
        }
    }
    tracing::debug!(?multipliers, "balanced generated colors against reference");
    Some(multipliers)
}
