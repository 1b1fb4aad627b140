use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{DecodeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Bmp,
    WebP,
    Tiff,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::Gif => "gif",
            ImageFormat::Bmp => "bmp",
            ImageFormat::WebP => "webp",
            ImageFormat::Tiff => "tiff",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "JPEG",
            ImageFormat::Png => "PNG",
            ImageFormat::Gif => "GIF",
            ImageFormat::Bmp => "BMP",
            ImageFormat::WebP => "WebP",
            ImageFormat::Tiff => "TIFF",
        }
    }

    pub(crate) fn codec(&self) -> image::ImageFormat {
        match self {
            ImageFormat::Jpeg => image::ImageFormat::Jpeg,
            ImageFormat::Png => image::ImageFormat::Png,
            ImageFormat::Gif => image::ImageFormat::Gif,
            ImageFormat::Bmp => image::ImageFormat::Bmp,
            ImageFormat::WebP => image::ImageFormat::WebP,
            ImageFormat::Tiff => image::ImageFormat::Tiff,
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ImageFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(ImageFormat::Jpeg),
            "png" => Ok(ImageFormat::Png),
            "gif" => Ok(ImageFormat::Gif),
            "bmp" => Ok(ImageFormat::Bmp),
            "webp" => Ok(ImageFormat::WebP),
            "tiff" | "tif" => Ok(ImageFormat::Tiff),
            other => Err(format!("unknown image format '{other}'")),
        }
    }
}

/// Storage type of a single channel sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    U8,
    U16,
    F32,
    F64,
}

impl ElementType {
    #[inline]
    pub fn size(&self) -> usize {
        match self {
            ElementType::U8 => 1,
            ElementType::U16 => 2,
            ElementType::F32 => 4,
            ElementType::F64 => 8,
        }
    }

    fn tag(&self) -> u8 {
        match self {
            ElementType::U8 => 0,
            ElementType::U16 => 1,
            ElementType::F32 => 2,
            ElementType::F64 => 3,
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementType::U8 => write!(f, "u8"),
            ElementType::U16 => write!(f, "u16"),
            ElementType::F32 => write!(f, "f32"),
            ElementType::F64 => write!(f, "f64"),
        }
    }
}

/// Reduction factor for the `Reduced*` read modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reduction {
    Half,
    Quarter,
    Eighth,
}

impl Reduction {
    pub fn factor(&self) -> u32 {
        match self {
            Reduction::Half => 2,
            Reduction::Quarter => 4,
            Reduction::Eighth => 8,
        }
    }

    fn from_factor(factor: u32) -> Option<Self> {
        match factor {
            2 => Some(Reduction::Half),
            4 => Some(Reduction::Quarter),
            8 => Some(Reduction::Eighth),
            _ => None,
        }
    }
}

/// How decoded pixels are converted before they are handed to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadMode {
    /// Native channel count and depth, alpha included.
    Unchanged,
    /// Single 8-bit channel.
    Grayscale,
    /// Three 8-bit channels.
    Color,
    /// Three channels, native depth.
    AnyDepth,
    /// Native channel count, 8-bit depth.
    #[default]
    AnyColor,
    ReducedGrayscale(Reduction),
    ReducedColor(Reduction),
}

impl ReadMode {
    /// Maps the conventional `IMREAD_*` integer flags.
    pub fn from_flag(flag: i64) -> Option<Self> {
        let mode = match flag {
            -1 => ReadMode::Unchanged,
            0 => ReadMode::Grayscale,
            1 => ReadMode::Color,
            2 => ReadMode::AnyDepth,
            4 => ReadMode::AnyColor,
            16 => ReadMode::ReducedGrayscale(Reduction::Half),
            17 => ReadMode::ReducedColor(Reduction::Half),
            32 => ReadMode::ReducedGrayscale(Reduction::Quarter),
            33 => ReadMode::ReducedColor(Reduction::Quarter),
            64 => ReadMode::ReducedGrayscale(Reduction::Eighth),
            65 => ReadMode::ReducedColor(Reduction::Eighth),
            _ => return None,
        };
        Some(mode)
    }
}

impl FromStr for ReadMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.to_lowercase();
        let mode = match s.as_str() {
            "unchanged" => ReadMode::Unchanged,
            "grayscale" | "gray" => ReadMode::Grayscale,
            "color" => ReadMode::Color,
            "any-depth" => ReadMode::AnyDepth,
            "any-color" => ReadMode::AnyColor,
            other => {
                let (kind, factor) = other
                    .rsplit_once('-')
                    .ok_or_else(|| format!("unknown read mode '{other}'"))?;
                let reduction = factor
                    .parse::<u32>()
                    .ok()
                    .and_then(Reduction::from_factor)
                    .ok_or_else(|| format!("reduction factor must be 2, 4 or 8 in '{other}'"))?;
                match kind {
                    "reduced-grayscale" => ReadMode::ReducedGrayscale(reduction),
                    "reduced-color" => ReadMode::ReducedColor(reduction),
                    _ => return Err(format!("unknown read mode '{other}'")),
                }
            }
        };
        Ok(mode)
    }
}

/// Encoded image bytes plus an optional declared format.
#[derive(Debug, Clone)]
pub struct EncodedBlob {
    bytes: Bytes,
    format: Option<ImageFormat>,
}

impl EncodedBlob {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            format: None,
        }
    }

    /// Declares the container format; decoding uses it instead of sniffing.
    pub fn with_format(mut self, format: Option<ImageFormat>) -> Self {
        self.format = format;
        self
    }

    #[inline]
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    #[inline]
    pub fn format(&self) -> Option<ImageFormat> {
        self.format
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// A dense, interleaved, row-major pixel buffer.
///
/// `data.len() == width * height * channels * element_type.size()` holds for
/// every value; dimensions cannot change after construction.
#[derive(Clone, PartialEq)]
pub struct DecodedImage {
    width: u32,
    height: u32,
    channels: u8,
    element_type: ElementType,
    data: Vec<u8>,
}

impl DecodedImage {
    pub fn from_raw(
        width: u32,
        height: u32,
        channels: u8,
        element_type: ElementType,
        data: Vec<u8>,
    ) -> Result<Self> {
        let expected = width as usize * height as usize * channels as usize * element_type.size();
        if channels == 0 {
            return Err(DecodeError::invalid("image has no channels"));
        }
        if data.len() != expected {
            return Err(DecodeError::invalid(format!(
                "pixel buffer holds {} bytes, {}x{}x{} {} needs {}",
                data.len(),
                width,
                height,
                channels,
                element_type,
                expected
            )));
        }
        Ok(Self {
            width,
            height,
            channels,
            element_type,
            data,
        })
    }

    pub(crate) fn from_dynamic(img: DynamicImage) -> Result<Self> {
        let (width, height) = (img.width(), img.height());
        let (channels, element_type, data) = match img {
            DynamicImage::ImageLuma8(buf) => (1, ElementType::U8, buf.into_raw()),
            DynamicImage::ImageLumaA8(buf) => (2, ElementType::U8, buf.into_raw()),
            DynamicImage::ImageRgb8(buf) => (3, ElementType::U8, buf.into_raw()),
            DynamicImage::ImageRgba8(buf) => (4, ElementType::U8, buf.into_raw()),
            DynamicImage::ImageLuma16(buf) => (1, ElementType::U16, u16_bytes(&buf.into_raw())),
            DynamicImage::ImageLumaA16(buf) => (2, ElementType::U16, u16_bytes(&buf.into_raw())),
            DynamicImage::ImageRgb16(buf) => (3, ElementType::U16, u16_bytes(&buf.into_raw())),
            DynamicImage::ImageRgba16(buf) => (4, ElementType::U16, u16_bytes(&buf.into_raw())),
            DynamicImage::ImageRgb32F(buf) => (3, ElementType::F32, f32_bytes(&buf.into_raw())),
            DynamicImage::ImageRgba32F(buf) => (4, ElementType::F32, f32_bytes(&buf.into_raw())),
            other => (4, ElementType::U8, other.to_rgba8().into_raw()),
        };
        Self::from_raw(width, height, channels, element_type, data)
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn channels(&self) -> u8 {
        self.channels
    }

    #[inline]
    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    #[inline]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Pixel bytes may be edited in place; the geometry stays fixed.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Hex SHA-256 over geometry and pixel bytes.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.width.to_le_bytes());
        hasher.update(self.height.to_le_bytes());
        hasher.update([self.channels, self.element_type.tag()]);
        hasher.update(&self.data);
        hex::encode(hasher.finalize())
    }
}

impl fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("channels", &self.channels)
            .field("element_type", &self.element_type)
            .field("bytes", &self.data.len())
            .finish()
    }
}

pub(crate) fn u16_bytes(samples: &[u16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_ne_bytes()).collect()
}

pub(crate) fn f32_bytes(samples: &[f32]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_ne_bytes()).collect()
}

pub(crate) fn f64_bytes(samples: &[f64]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_ne_bytes()).collect()
}

/// Frames of one container, in on-disk order.
#[derive(Debug, Clone, Default)]
pub struct FrameSequence {
    frames: Vec<DecodedImage>,
}

impl FrameSequence {
    pub fn new(frames: Vec<DecodedImage>) -> Self {
        Self { frames }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&DecodedImage> {
        self.frames.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DecodedImage> {
        self.frames.iter()
    }

    pub fn into_vec(self) -> Vec<DecodedImage> {
        self.frames
    }

    /// True when every frame shares width, height, channels and element type.
    pub fn is_homogeneous(&self) -> bool {
        let Some(first) = self.frames.first() else {
            return true;
        };
        self.frames.iter().all(|f| {
            f.size() == first.size()
                && f.channels == first.channels
                && f.element_type == first.element_type
        })
    }
}

impl IntoIterator for FrameSequence {
    type Item = DecodedImage;
    type IntoIter = std::vec::IntoIter<DecodedImage>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.into_iter()
    }
}

impl<'a> IntoIterator for &'a FrameSequence {
    type Item = &'a DecodedImage;
    type IntoIter = std::slice::Iter<'a, DecodedImage>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_checks_buffer_length() {
        let ok = DecodedImage::from_raw(2, 3, 4, ElementType::U8, vec![0; 24]);
        assert!(ok.is_ok());

        let short = DecodedImage::from_raw(2, 3, 4, ElementType::U16, vec![0; 24]);
        assert!(matches!(short, Err(DecodeError::InvalidFormat(_))));
    }

    #[test]
    fn test_from_raw_rejects_zero_channels() {
        let img = DecodedImage::from_raw(0, 0, 0, ElementType::U8, Vec::new());
        assert!(img.is_err());
    }

    #[test]
    fn test_digest_covers_geometry() {
        let a = DecodedImage::from_raw(2, 1, 1, ElementType::U8, vec![7, 7]).unwrap();
        let b = DecodedImage::from_raw(1, 2, 1, ElementType::U8, vec![7, 7]).unwrap();
        assert_ne!(a.digest(), b.digest());
        assert_eq!(a.digest(), a.clone().digest());
    }

    #[test]
    fn test_read_mode_parsing() {
        assert_eq!("gray".parse::<ReadMode>(), Ok(ReadMode::Grayscale));
        assert_eq!(
            "reduced-color-4".parse::<ReadMode>(),
            Ok(ReadMode::ReducedColor(Reduction::Quarter))
        );
        assert!("reduced-color-3".parse::<ReadMode>().is_err());
        assert_eq!(ReadMode::from_flag(64), Some(ReadMode::ReducedGrayscale(Reduction::Eighth)));
        assert_eq!(ReadMode::from_flag(3), None);
    }

    #[test]
    fn test_image_format_parsing() {
        assert_eq!("JPG".parse::<ImageFormat>(), Ok(ImageFormat::Jpeg));
        assert_eq!("tif".parse::<ImageFormat>(), Ok(ImageFormat::Tiff));
        assert!("heic".parse::<ImageFormat>().is_err());
    }
}
