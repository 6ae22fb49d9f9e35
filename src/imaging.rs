//! Image decoding, resizing and re-encoding.

use crate::error::Result;
use crate::formats::jxl as jxl_decoder;
use crate::library::ImageType;
use image::DynamicImage;
use std::io::Cursor;

/// Media types the decoder can read.
const READ_MEDIA_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp", "image/jxl"];

/// Media types the encoder can write.
const WRITE_MEDIA_TYPES: &[&str] = &["image/jpeg", "image/png"];

/// Image codec used for thumbnails and page conversion.
pub trait ImageConverter: Send + Sync {
    /// Media types that can be decoded.
    fn supported_read_media_types(&self) -> &[&'static str];

    /// Media types that can be encoded.
    fn supported_write_media_types(&self) -> &[&'static str];

    /// Decode `bytes`, fit them within `size`x`size` and encode as `format`.
    fn resize_image(&self, bytes: &[u8], format: ImageType, size: u32) -> Result<Vec<u8>>;

    /// Decode `bytes` and encode as `format`.
    fn convert_image(&self, bytes: &[u8], format: ImageType) -> Result<Vec<u8>>;
}

/// Converter backed by the `image` crate, with JPEG XL decoding.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageCrateConverter;

impl ImageCrateConverter {
    fn decode(bytes: &[u8]) -> Result<DynamicImage> {
        if jxl_decoder::is_jxl(bytes) {
            jxl_decoder::decode_to_image(bytes)
        } else {
            Ok(image::load_from_memory(bytes)?)
        }
    }

    fn encode(img: DynamicImage, format: ImageType) -> Result<Vec<u8>> {
        // JPEG has no alpha channel.
        let img = match format {
            ImageType::Jpeg => DynamicImage::ImageRgb8(img.to_rgb8()),
            ImageType::Png => img,
        };

        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), format.image_format())?;
        Ok(out)
    }
}

impl ImageConverter for ImageCrateConverter {
    fn supported_read_media_types(&self) -> &[&'static str] {
        READ_MEDIA_TYPES
    }

    fn supported_write_media_types(&self) -> &[&'static str] {
        WRITE_MEDIA_TYPES
    }

    fn resize_image(&self, bytes: &[u8], format: ImageType, size: u32) -> Result<Vec<u8>> {
        let img = Self::decode(bytes)?;
        Self::encode(img.thumbnail(size, size), format)
    }

    fn convert_image(&self, bytes: &[u8], format: ImageType) -> Result<Vec<u8>> {
        Self::encode(Self::decode(bytes)?, format)
    }
}

/// Sniff the media type of encoded image bytes.
pub fn detect_media_type(bytes: &[u8]) -> Option<String> {
    if jxl_decoder::is_jxl(bytes) {
        return Some("image/jxl".to_string());
    }
    image::guess_format(bytes)
        .ok()
        .map(|f| f.to_mime_type().to_string())
}

/// Read image dimensions from the header without decoding pixels.
pub fn dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    if jxl_decoder::is_jxl(bytes) {
        return jxl_decoder::dimensions(bytes);
    }
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Encode a solid image of the given size.
    pub fn sample_image(width: u32, height: u32, format: ImageType) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            width,
            height,
            image::Rgb([200, 30, 30]),
        ));
        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), format.image_format())
            .unwrap();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::testing::sample_image;
    use super::*;

    #[test]
    fn test_detect_media_type() {
        assert_eq!(
            detect_media_type(&sample_image(4, 4, ImageType::Png)).as_deref(),
            Some("image/png")
        );
        assert_eq!(
            detect_media_type(&sample_image(4, 4, ImageType::Jpeg)).as_deref(),
            Some("image/jpeg")
        );
        assert_eq!(detect_media_type(b"not an image"), None);
    }

    #[test]
    fn test_dimensions() {
        assert_eq!(
            dimensions(&sample_image(12, 7, ImageType::Png)),
            Some((12, 7))
        );
    }

    #[test]
    fn test_resize_fits_within_bounds_and_encodes_jpeg() {
        let converter = ImageCrateConverter;
        let png = sample_image(100, 50, ImageType::Png);

        let resized = converter.resize_image(&png, ImageType::Jpeg, 20).unwrap();
        assert_eq!(detect_media_type(&resized).as_deref(), Some("image/jpeg"));
        let (w, h) = dimensions(&resized).unwrap();
        assert!(w <= 20 && h <= 20);
    }

    #[test]
    fn test_convert_png_to_jpeg() {
        let converter = ImageCrateConverter;
        let png = sample_image(8, 8, ImageType::Png);
        let jpeg = converter.convert_image(&png, ImageType::Jpeg).unwrap();
        assert_eq!(detect_media_type(&jpeg).as_deref(), Some("image/jpeg"));
    }

    #[test]
    fn test_convert_garbage_fails() {
        assert!(
            ImageCrateConverter
                .convert_image(b"garbage", ImageType::Png)
                .is_err()
        );
    }
}
