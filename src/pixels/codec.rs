use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, RgbaImage};

use super::PixelResult;

const JPEG_QUALITY: u8 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncodeFormat {
    /// Lossless, keeps alpha. Used for masks and confirmed saves.
    #[default]
    Png,
    /// Lossy baseline compression; alpha is dropped.
    Jpeg,
}

impl EncodeFormat {
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
        }
    }

    pub const fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }
}

pub fn encode_image(image: &RgbaImage, format: EncodeFormat) -> PixelResult<Vec<u8>> {
    let mut bytes = Vec::new();
    match format {
        EncodeFormat::Png => {
            PngEncoder::new(&mut bytes).write_image(
                image.as_raw(),
                image.width(),
                image.height(),
                ExtendedColorType::Rgba8,
            )?;
        }
        EncodeFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY).write_image(
                rgb.as_raw(),
                rgb.width(),
                rgb.height(),
                ExtendedColorType::Rgb8,
            )?;
        }
    }
    Ok(bytes)
}

pub fn decode_image(bytes: &[u8]) -> PixelResult<RgbaImage> {
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn png_encoding_preserves_transparency() {
        let mut image = RgbaImage::from_pixel(8, 8, Rgba([200, 10, 10, 255]));
        image.put_pixel(3, 3, Rgba([0, 0, 0, 0]));

        let bytes = encode_image(&image, EncodeFormat::Png).expect("png encode should work");
        let decoded = decode_image(&bytes).expect("png decode should work");

        assert_eq!(decoded, image);
    }

    #[test]
    fn jpeg_encoding_produces_opaque_image_of_same_size() {
        let image = RgbaImage::from_pixel(16, 12, Rgba([90, 160, 40, 128]));

        let bytes = encode_image(&image, EncodeFormat::Jpeg).expect("jpeg encode should work");
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        let decoded = decode_image(&bytes).expect("jpeg decode should work");

        assert_eq!(decoded.dimensions(), (16, 12));
        assert!(decoded.pixels().all(|pixel| pixel[3] == 255));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_image(b"not an image").is_err());
    }
}
