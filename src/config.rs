//! Service configuration

use std::fs;
use std::path::Path;
use std::str::FromStr;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::ArgumentError;
use crate::types::{ImageFormat, ReadMode};

const DEFAULT_MAX_ALLOC: u64 = 512 * 1024 * 1024;
const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;
const DEFAULT_READ_CHUNK: usize = 64 * 1024;

/// Options for an [`Ingest`](crate::Ingest) service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestOptions {
    /// Size of the decode worker pool
    pub workers: usize,
    /// Read mode used when a request does not name one
    pub read_mode: ReadMode,
    pub limits: DecodeLimits,
    pub stream: StreamOptions,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(4),
            read_mode: ReadMode::default(),
            limits: DecodeLimits::default(),
            stream: StreamOptions::default(),
        }
    }
}

impl IngestOptions {
    /// Reads options from a JSON file; absent fields keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let options: IngestOptions = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        options.validate()?;
        Ok(options)
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_read_mode(mut self, mode: ReadMode) -> Self {
        self.read_mode = mode;
        self
    }

    pub fn with_limits(mut self, limits: DecodeLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_stream(mut self, stream: StreamOptions) -> Self {
        self.stream = stream;
        self
    }

    pub fn validate(&self) -> Result<(), ArgumentError> {
        if self.workers == 0 {
            return Err(ArgumentError::InvalidOption {
                name: "workers",
                reason: "must be at least 1".into(),
            });
        }
        self.limits.validate()?;
        self.stream.validate()
    }

    pub(crate) fn decode_options(&self, mode: Option<ReadMode>) -> DecodeOptions {
        DecodeOptions {
            mode: mode.unwrap_or(self.read_mode),
            limits: self.limits.clone(),
        }
    }
}

/// Upper bounds applied by the pixel decoders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeLimits {
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
    /// Largest single allocation a decoder may make, in bytes
    pub max_alloc: Option<u64>,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_width: None,
            max_height: None,
            max_alloc: Some(DEFAULT_MAX_ALLOC),
        }
    }
}

impl DecodeLimits {
    pub fn unlimited() -> Self {
        Self {
            max_width: None,
            max_height: None,
            max_alloc: None,
        }
    }

    fn validate(&self) -> Result<(), ArgumentError> {
        if self.max_width == Some(0) || self.max_height == Some(0) {
            return Err(ArgumentError::InvalidOption {
                name: "limits",
                reason: "dimension limits must be non-zero".into(),
            });
        }
        Ok(())
    }

    pub(crate) fn to_image_limits(&self) -> image::Limits {
        let mut limits = image::Limits::default();
        limits.max_image_width = self.max_width;
        limits.max_image_height = self.max_height;
        limits.max_alloc = self.max_alloc;
        limits
    }

    pub(crate) fn exceeds(&self, width: u32, height: u32) -> bool {
        self.max_width.is_some_and(|w| width > w) || self.max_height.is_some_and(|h| height > h)
    }
}

/// Per-call decode parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    pub mode: ReadMode,
    pub limits: DecodeLimits,
}

impl DecodeOptions {
    pub fn new(mode: ReadMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    pub fn with_limits(mut self, limits: DecodeLimits) -> Self {
        self.limits = limits;
        self
    }
}

/// How a byte stream is split into encoded images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StreamMode {
    /// Frame boundaries are found from each container's structure.
    #[default]
    Framed,
    /// The whole stream is one image, decoded at end of stream.
    WholeStream,
    /// Every write carries exactly one encoded image.
    PerWrite,
}

impl FromStr for StreamMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "framed" => Ok(StreamMode::Framed),
            "whole" | "whole-stream" => Ok(StreamMode::WholeStream),
            "per-write" => Ok(StreamMode::PerWrite),
            other => Err(format!("unknown stream mode '{other}'")),
        }
    }
}

/// What a stream session does after a frame fails to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameErrorPolicy {
    /// Report the error and keep reading frames.
    #[default]
    Continue,
    /// Report the error, then end and close the session.
    Abort,
}

impl FromStr for FrameErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "continue" => Ok(FrameErrorPolicy::Continue),
            "abort" => Ok(FrameErrorPolicy::Abort),
            other => Err(format!("unknown frame error policy '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamOptions {
    pub mode: StreamMode,
    pub on_frame_error: FrameErrorPolicy,
    /// Frames (or whole streams) larger than this are rejected
    pub max_frame_bytes: usize,
    /// Read size used by the stream drivers
    pub read_chunk_size: usize,
    /// Skip detection and treat every frame as this format
    pub format: Option<ImageFormat>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            mode: StreamMode::default(),
            on_frame_error: FrameErrorPolicy::default(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            read_chunk_size: DEFAULT_READ_CHUNK,
            format: None,
        }
    }
}

impl StreamOptions {
    pub fn with_mode(mut self, mode: StreamMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_policy(mut self, policy: FrameErrorPolicy) -> Self {
        self.on_frame_error = policy;
        self
    }

    pub fn with_max_frame_bytes(mut self, max: usize) -> Self {
        self.max_frame_bytes = max;
        self
    }

    pub fn with_read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size;
        self
    }

    pub fn with_format(mut self, format: Option<ImageFormat>) -> Self {
        self.format = format;
        self
    }

    fn validate(&self) -> Result<(), ArgumentError> {
        if self.max_frame_bytes == 0 {
            return Err(ArgumentError::InvalidOption {
                name: "stream.max_frame_bytes",
                reason: "must be non-zero".into(),
            });
        }
        if self.read_chunk_size == 0 {
            return Err(ArgumentError::InvalidOption {
                name: "stream.read_chunk_size",
                reason: "must be non-zero".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let options = IngestOptions::default();
        assert!(options.workers >= 1);
        assert!(options.validate().is_ok());
        assert_eq!(options.stream.mode, StreamMode::Framed);
        assert_eq!(options.stream.on_frame_error, FrameErrorPolicy::Continue);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let err = IngestOptions::default().with_workers(0).validate().unwrap_err();
        assert!(matches!(err, ArgumentError::InvalidOption { name: "workers", .. }));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let options: IngestOptions =
            serde_json::from_str(r#"{"workers": 2, "stream": {"mode": "per-write"}}"#).unwrap();
        assert_eq!(options.workers, 2);
        assert_eq!(options.stream.mode, StreamMode::PerWrite);
        assert_eq!(options.stream.max_frame_bytes, DEFAULT_MAX_FRAME_BYTES);
        assert_eq!(options.limits, DecodeLimits::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("imgest.json");
        fs::write(&path, r#"{"read_mode": "grayscale", "limits": {"max_width": 640}}"#).unwrap();

        let options = IngestOptions::load(&path).unwrap();
        assert_eq!(options.read_mode, ReadMode::Grayscale);
        assert_eq!(options.limits.max_width, Some(640));
        assert!(options.limits.exceeds(641, 1));
        assert!(!options.limits.exceeds(640, 10_000));
    }

    #[test]
    fn test_stream_mode_names() {
        assert_eq!("whole".parse::<StreamMode>(), Ok(StreamMode::WholeStream));
        assert_eq!("per-write".parse::<StreamMode>(), Ok(StreamMode::PerWrite));
        assert!("chunked".parse::<StreamMode>().is_err());
        assert_eq!("ABORT".parse::<FrameErrorPolicy>(), Ok(FrameErrorPolicy::Abort));
    }
}
