//! Frame boundary detection.
//!
//! Each scanner walks the container structure of one format and reports
//! where the first complete image ends. Scanners are resumable: calling
//! `advance` again with the same buffer grown at the end continues from
//! where the previous call stopped instead of rescanning.

pub mod gif;
pub mod jpeg;
pub mod png;
pub mod sized;

use crate::types::ImageFormat;

pub use gif::GifScanner;
pub use jpeg::JpegScanner;
pub use png::PngScanner;
pub use sized::SizedScanner;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameScan {
    /// The first frame occupies `data[..len]`.
    Complete(usize),
    /// Structure is valid so far; more bytes are needed.
    Incomplete,
    /// The format has no trailer; the frame runs to the end of the input.
    Unbounded,
    Invalid(String),
}

#[derive(Debug, Clone)]
pub enum FrameScanner {
    Jpeg(JpegScanner),
    Png(PngScanner),
    Gif(GifScanner),
    Sized(SizedScanner),
    Unbounded,
}

impl FrameScanner {
    pub fn for_format(format: ImageFormat) -> Self {
        match format {
            ImageFormat::Jpeg => FrameScanner::Jpeg(JpegScanner::new()),
            ImageFormat::Png => FrameScanner::Png(PngScanner::new()),
            ImageFormat::Gif => FrameScanner::Gif(GifScanner::new()),
            ImageFormat::Bmp | ImageFormat::WebP => FrameScanner::Sized(SizedScanner::new(format)),
            ImageFormat::Tiff => FrameScanner::Unbounded,
        }
    }

    /// `data` must start at the frame's first byte and only ever grow at the end
    /// between calls.
    pub fn advance(&mut self, data: &[u8]) -> FrameScan {
        match self {
            FrameScanner::Jpeg(s) => s.advance(data),
            FrameScanner::Png(s) => s.advance(data),
            FrameScanner::Gif(s) => s.advance(data),
            FrameScanner::Sized(s) => s.advance(data),
            FrameScanner::Unbounded => FrameScan::Unbounded,
        }
    }
}

/// One-shot boundary scan of `data` as `format`.
pub fn frame_length(format: ImageFormat, data: &[u8]) -> FrameScan {
    FrameScanner::for_format(format).advance(data)
}
