//! JPEG XL page decoding backed by jxl-rs.

use crate::error::{AppError, Result};
use jxl::api::{
    JxlColorType, JxlDataFormat, JxlDecoder, JxlDecoderOptions, JxlOutputBuffer, JxlPixelFormat,
    ProcessingResult,
};
use jxl::headers::extra_channels::ExtraChannel;
use jxl::image::{OwnedRawImage, Rect};

/// Check if data is a JPEG XL file by examining its signature.
pub fn is_jxl(data: &[u8]) -> bool {
    use jxl::api::{JxlSignatureType, check_signature};

    match check_signature(data) {
        ProcessingResult::Complete { result } => matches!(
            result,
            Some(JxlSignatureType::Codestream) | Some(JxlSignatureType::Container)
        ),
        ProcessingResult::NeedsMoreInput { .. } => false,
    }
}

/// Unwrap a completed decoder step or return a format error.
macro_rules! complete {
    ($stage:literal, $step:expr) => {
        match $step {
            Ok(ProcessingResult::Complete { result }) => result,
            Ok(ProcessingResult::NeedsMoreInput { .. }) => {
                return Err(AppError::InvalidFormat(concat!("Truncated JXL ", $stage).into()));
            }
            Err(e) => {
                return Err(AppError::InvalidFormat(format!(
                    concat!("JXL ", $stage, " error: {}"),
                    e
                )));
            }
        }
    };
}

/// Image size from the codestream header, without decoding pixels.
pub fn dimensions(data: &[u8]) -> Option<(u32, u32)> {
    let decoder = JxlDecoder::<jxl::api::states::Initialized>::new(JxlDecoderOptions::default());
    let mut input = data;
    let decoder = match decoder.process(&mut input) {
        Ok(ProcessingResult::Complete { result }) => result,
        _ => return None,
    };
    let (width, height) = decoder.basic_info().size;
    Some((width as u32, height as u32))
}

/// Decode a JPEG XL image to interleaved RGBA8 pixels.
fn decode_rgba(data: &[u8]) -> Result<(u32, u32, Vec<u8>)> {
    let decoder = JxlDecoder::<jxl::api::states::Initialized>::new(JxlDecoderOptions::default());
    let mut input = data;
    let mut decoder = complete!("header", decoder.process(&mut input));

    let info = decoder.basic_info();
    let (width, height) = info.size;
    let has_alpha = info
        .extra_channels
        .iter()
        .any(|ec| ec.ec_type == ExtraChannel::Alpha);

    let color_type = if has_alpha {
        JxlColorType::Rgba
    } else {
        JxlColorType::Rgb
    };
    let samples_per_pixel = color_type.samples_per_pixel();
    decoder.set_pixel_format(JxlPixelFormat {
        color_type,
        color_data_format: Some(JxlDataFormat::U8 { bit_depth: 8 }),
        extra_channel_format: vec![],
    });

    let decoder = complete!("frame", decoder.process(&mut input));

    let bytes_per_row = width * samples_per_pixel;
    let mut raw_image =
        OwnedRawImage::new_zeroed_with_padding((bytes_per_row, height), (0, 0), (0, 0))
            .map_err(|e| AppError::Internal(format!("Failed to create image buffer: {}", e)))?;
    let rect = Rect {
        origin: (0, 0),
        size: (bytes_per_row, height),
    };
    let mut buffers = vec![JxlOutputBuffer::from_image_rect_mut(
        raw_image.get_rect_mut(rect),
    )];
    complete!("pixel", decoder.process(&mut input, &mut buffers));

    let mut pixels = Vec::with_capacity(width * height * 4);
    for y in 0..height {
        let row = raw_image.row(y);
        if has_alpha {
            pixels.extend_from_slice(row);
        } else {
            for rgb in row.chunks(3) {
                pixels.extend_from_slice(rgb);
                pixels.push(255);
            }
        }
    }

    Ok((width as u32, height as u32, pixels))
}

/// Decode a JPEG XL image directly to a DynamicImage.
pub fn decode_to_image(data: &[u8]) -> Result<image::DynamicImage> {
    let (width, height, rgba) = decode_rgba(data)?;

    image::RgbaImage::from_raw(width, height, rgba)
        .map(image::DynamicImage::ImageRgba8)
        .ok_or_else(|| AppError::Internal("Failed to create image from JXL data".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_png_is_not_jxl() {
        assert!(!is_jxl(b"\x89PNG\r\n\x1a\n"));
        assert!(dimensions(b"\x89PNG\r\n\x1a\n").is_none());
    }
}
