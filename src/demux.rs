//! Multi-frame containers
//!
//! TIFF pages, GIF animation frames and APNG frames are decoded in file
//! order. A failure on any frame fails the whole container; there are no
//! partial sequences.

use std::io::Cursor;

use image::codecs::gif::GifDecoder;
use image::codecs::png::PngDecoder;
use image::{AnimationDecoder, DynamicImage, Frames, ImageBuffer, ImageDecoder, Pixel};
use tiff::decoder::{Decoder as TiffDecoder, DecodingResult, Limits as TiffLimits};
use tracing::debug;

use crate::config::{DecodeLimits, DecodeOptions};
use crate::decode::{apply_mode, resolve_format};
use crate::error::{DecodeError, Result};
use crate::formats::png;
use crate::types::{
    DecodedImage, ElementType, EncodedBlob, FrameSequence, ImageFormat, f32_bytes, f64_bytes,
    u16_bytes,
};

pub fn demux(blob: &EncodedBlob, options: &DecodeOptions) -> Result<FrameSequence> {
    if blob.is_empty() {
        return Err(DecodeError::invalid("empty buffer"));
    }

    let format = resolve_format(blob)?;
    let data = blob.bytes().as_ref();

    let frames = match format {
        ImageFormat::Tiff => tiff_pages(data, options)?,
        ImageFormat::Gif => {
            let mut decoder = GifDecoder::new(Cursor::new(data))?;
            decoder.set_limits(options.limits.to_image_limits())?;
            animation_frames(decoder.into_frames(), options)?
        }
        ImageFormat::Png if png::is_animated(data) => {
            let decoder =
                PngDecoder::with_limits(Cursor::new(data), options.limits.to_image_limits())?;
            animation_frames(decoder.apng()?.into_frames(), options)?
        }
        other => {
            return Err(DecodeError::Unsupported(format!(
                "{other} data holds a single image"
            )));
        }
    };

    debug!("Demuxed {} frames from {} bytes of {}", frames.len(), data.len(), format);
    Ok(FrameSequence::new(frames))
}

fn animation_frames(frames: Frames<'_>, options: &DecodeOptions) -> Result<Vec<DecodedImage>> {
    frames
        .collect_frames()?
        .into_iter()
        .map(|frame| {
            let img = DynamicImage::ImageRgba8(frame.into_buffer());
            DecodedImage::from_dynamic(apply_mode(img, options.mode))
        })
        .collect()
}

fn tiff_limits(limits: &DecodeLimits) -> TiffLimits {
    match limits.max_alloc {
        Some(max) => {
            let max = usize::try_from(max).unwrap_or(usize::MAX);
            let mut tiff = TiffLimits::default();
            tiff.decoding_buffer_size = max;
            tiff.intermediate_buffer_size = max;
            tiff
        }
        None => TiffLimits::unlimited(),
    }
}

fn tiff_pages(data: &[u8], options: &DecodeOptions) -> Result<Vec<DecodedImage>> {
    let mut decoder =
        TiffDecoder::new(Cursor::new(data))?.with_limits(tiff_limits(&options.limits));
    let mut pages = Vec::new();

    loop {
        let (width, height) = decoder.dimensions()?;
        if options.limits.exceeds(width, height) {
            return Err(DecodeError::invalid(format!(
                "TIFF page {} is {width}x{height}, over the configured limit",
                pages.len()
            )));
        }

        let color = decoder.colortype()?;
        let samples = decoder.read_image()?;
        pages.push(tiff_page(width, height, color, samples, options)?);

        if !decoder.more_images() {
            break;
        }
        decoder.next_image()?;
    }

    Ok(pages)
}

fn tiff_page(
    width: u32,
    height: u32,
    color: tiff::ColorType,
    samples: DecodingResult,
    options: &DecodeOptions,
) -> Result<DecodedImage> {
    use tiff::ColorType as T;

    let img = match (color, samples) {
        (T::Gray(8), DecodingResult::U8(v)) => DynamicImage::ImageLuma8(pixels(width, height, v)?),
        (T::GrayA(8), DecodingResult::U8(v)) => {
            DynamicImage::ImageLumaA8(pixels(width, height, v)?)
        }
        (T::RGB(8), DecodingResult::U8(v)) => DynamicImage::ImageRgb8(pixels(width, height, v)?),
        (T::RGBA(8), DecodingResult::U8(v)) => DynamicImage::ImageRgba8(pixels(width, height, v)?),
        (T::Gray(16), DecodingResult::U16(v)) => {
            DynamicImage::ImageLuma16(pixels(width, height, v)?)
        }
        (T::GrayA(16), DecodingResult::U16(v)) => {
            DynamicImage::ImageLumaA16(pixels(width, height, v)?)
        }
        (T::RGB(16), DecodingResult::U16(v)) => {
            DynamicImage::ImageRgb16(pixels(width, height, v)?)
        }
        (T::RGBA(16), DecodingResult::U16(v)) => {
            DynamicImage::ImageRgba16(pixels(width, height, v)?)
        }
        (T::RGB(32), DecodingResult::F32(v)) => {
            DynamicImage::ImageRgb32F(pixels(width, height, v)?)
        }
        (T::RGBA(32), DecodingResult::F32(v)) => {
            DynamicImage::ImageRgba32F(pixels(width, height, v)?)
        }
        // No pixel type for this layout: hand the samples back as stored.
        (_, DecodingResult::U8(v)) => return raw_page(width, height, ElementType::U8, v),
        (_, DecodingResult::U16(v)) => {
            return raw_page(width, height, ElementType::U16, u16_bytes(&v));
        }
        (_, DecodingResult::F32(v)) => {
            return raw_page(width, height, ElementType::F32, f32_bytes(&v));
        }
        (_, DecodingResult::F64(v)) => {
            return raw_page(width, height, ElementType::F64, f64_bytes(&v));
        }
        (color, _) => {
            return Err(DecodeError::Unsupported(format!(
                "TIFF sample format of {color:?} page"
            )));
        }
    };

    DecodedImage::from_dynamic(apply_mode(img, options.mode))
}

fn pixels<P: Pixel>(
    width: u32,
    height: u32,
    samples: Vec<P::Subpixel>,
) -> Result<ImageBuffer<P, Vec<P::Subpixel>>> {
    ImageBuffer::from_raw(width, height, samples).ok_or_else(|| {
        DecodeError::invalid(format!("TIFF page {width}x{height} sample count mismatch"))
    })
}

fn raw_page(
    width: u32,
    height: u32,
    element_type: ElementType,
    data: Vec<u8>,
) -> Result<DecodedImage> {
    let pixels = width as usize * height as usize;
    let per_pixel = pixels * element_type.size();
    if per_pixel == 0 || data.len() % per_pixel != 0 {
        return Err(DecodeError::invalid(format!(
            "TIFF page {width}x{height} holds {} sample bytes",
            data.len()
        )));
    }
    let channels = u8::try_from(data.len() / per_pixel)
        .map_err(|_| DecodeError::invalid("TIFF page has too many samples per pixel"))?;
    DecodedImage::from_raw(width, height, channels, element_type, data)
}
