use std::io;

use thiserror::Error;

/// Coarse classification shared by every error the crate reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Argument,
    Io,
    InvalidFormat,
    Truncated,
    Unsupported,
    WorkerLost,
}

/// Errors delivered through a completion channel (callback, future or stream event).
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("I/O error on {origin}: {source}")]
    Io {
        origin: String,
        #[source]
        source: io::Error,
    },

    #[error("Invalid image data: {0}")]
    InvalidFormat(String),

    #[error("Stream ended mid-frame with {buffered} bytes left undecoded")]
    Truncated { buffered: usize },

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Decode worker exited before producing a result")]
    WorkerLost,
}

impl DecodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DecodeError::Io { .. } => ErrorKind::Io,
            DecodeError::InvalidFormat(_) => ErrorKind::InvalidFormat,
            DecodeError::Truncated { .. } => ErrorKind::Truncated,
            DecodeError::Unsupported(_) => ErrorKind::Unsupported,
            DecodeError::WorkerLost => ErrorKind::WorkerLost,
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        DecodeError::InvalidFormat(message.into())
    }
}

impl From<image::ImageError> for DecodeError {
    fn from(err: image::ImageError) -> Self {
        DecodeError::InvalidFormat(err.to_string())
    }
}

impl From<tiff::TiffError> for DecodeError {
    fn from(err: tiff::TiffError) -> Self {
        DecodeError::InvalidFormat(format!("TIFF: {err}"))
    }
}

/// Errors raised synchronously while validating a call, before any work is scheduled.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgumentError {
    #[error("{function}() requires at least {min} arguments")]
    TooFewArguments { function: &'static str, min: usize },

    #[error("{function}() accepts at most {max} arguments")]
    TooManyArguments { function: &'static str, max: usize },

    #[error("Argument {position} must be {expected}")]
    InvalidType {
        position: usize,
        expected: &'static str,
    },

    #[error("Unknown read mode flag: {0}")]
    UnknownReadMode(i64),

    #[error("Invalid option {name}: {reason}")]
    InvalidOption { name: &'static str, reason: String },
}

impl ArgumentError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Argument
    }
}

/// Errors building an [`Ingest`](crate::Ingest) service.
#[derive(Error, Debug)]
pub enum SetupError {
    #[error(transparent)]
    Options(#[from] ArgumentError),

    #[error("Failed to start decode workers: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, DecodeError>;
