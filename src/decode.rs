//! Single-image decoding

use std::io::Cursor;

use image::imageops::FilterType;
use image::{ColorType, DynamicImage, ImageReader};
use tracing::debug;

use crate::config::DecodeOptions;
use crate::error::{DecodeError, Result};
use crate::formats::{self, FrameScan};
use crate::signatures;
use crate::types::{DecodedImage, EncodedBlob, ImageFormat, ReadMode};

/// Decodes one encoded image.
///
/// The declared format wins over magic-byte detection. Bytes that are
/// empty, unrecognised, structurally cut short or rejected by the codec
/// all fail with [`DecodeError::InvalidFormat`].
pub fn decode(blob: &EncodedBlob, options: &DecodeOptions) -> Result<DecodedImage> {
    if blob.is_empty() {
        return Err(DecodeError::invalid("empty buffer"));
    }

    let format = resolve_format(blob)?;
    let data = blob.bytes().as_ref();

    if let FrameScan::Incomplete = formats::frame_length(format, data) {
        return Err(DecodeError::invalid(format!(
            "{format} data is truncated ({} bytes)",
            data.len()
        )));
    }

    let mut reader = ImageReader::new(Cursor::new(data));
    reader.set_format(format.codec());
    reader.limits(options.limits.to_image_limits());
    let img = reader.decode()?;

    debug!(
        "Decoded {} {}x{} ({:?}) with {:?}",
        format,
        img.width(),
        img.height(),
        img.color(),
        options.mode
    );

    DecodedImage::from_dynamic(apply_mode(img, options.mode))
}

pub(crate) fn resolve_format(blob: &EncodedBlob) -> Result<ImageFormat> {
    match blob.format() {
        Some(format) => Ok(format),
        None => signatures::registry()
            .detect(blob.bytes())
            .ok_or_else(|| DecodeError::invalid("unrecognised image signature")),
    }
}

/// Converts decoded pixels to the layout `mode` asks for.
pub(crate) fn apply_mode(img: DynamicImage, mode: ReadMode) -> DynamicImage {
    match mode {
        ReadMode::Unchanged => img,
        ReadMode::Grayscale => DynamicImage::ImageLuma8(img.to_luma8()),
        ReadMode::Color => DynamicImage::ImageRgb8(img.to_rgb8()),
        ReadMode::AnyDepth => match img.color() {
            ColorType::L16 | ColorType::La16 | ColorType::Rgb16 | ColorType::Rgba16 => {
                DynamicImage::ImageRgb16(img.to_rgb16())
            }
            ColorType::Rgb32F | ColorType::Rgba32F => DynamicImage::ImageRgb32F(img.to_rgb32f()),
            _ => DynamicImage::ImageRgb8(img.to_rgb8()),
        },
        ReadMode::AnyColor => match img.color().channel_count() {
            1 => DynamicImage::ImageLuma8(img.to_luma8()),
            2 => DynamicImage::ImageLumaA8(img.to_luma_alpha8()),
            3 => DynamicImage::ImageRgb8(img.to_rgb8()),
            _ => DynamicImage::ImageRgba8(img.to_rgba8()),
        },
        ReadMode::ReducedGrayscale(r) => {
            reduce(DynamicImage::ImageLuma8(img.to_luma8()), r.factor())
        }
        ReadMode::ReducedColor(r) => reduce(DynamicImage::ImageRgb8(img.to_rgb8()), r.factor()),
    }
}

fn reduce(img: DynamicImage, factor: u32) -> DynamicImage {
    let width = img.width().div_ceil(factor);
    let height = img.height().div_ceil(factor);
    if width == 0 || height == 0 {
        return img;
    }
    img.resize_exact(width, height, FilterType::Triangle)
}
