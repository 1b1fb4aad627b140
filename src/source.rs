use std::fs;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::debug;

use crate::error::{DecodeError, Result};
use crate::types::EncodedBlob;

/// Where encoded bytes for a single read come from.
#[derive(Debug, Clone)]
pub enum ImageSource {
    Path(PathBuf),
    Buffer(Bytes),
}

impl ImageSource {
    /// Produces the encoded bytes. Paths are read in full on the calling thread.
    pub fn load(&self) -> Result<EncodedBlob> {
        match self {
            ImageSource::Path(path) => {
                let bytes = fs::read(path).map_err(|source| DecodeError::Io {
                    origin: path.display().to_string(),
                    source,
                })?;
                debug!("Read {} bytes from {}", bytes.len(), path.display());
                Ok(EncodedBlob::new(bytes))
            }
            // Bytes clones share the allocation
            ImageSource::Buffer(bytes) => Ok(EncodedBlob::new(bytes.clone())),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ImageSource::Path(path) => path.display().to_string(),
            ImageSource::Buffer(bytes) => format!("<buffer: {} bytes>", bytes.len()),
        }
    }
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        ImageSource::Path(path)
    }
}

impl From<&Path> for ImageSource {
    fn from(path: &Path) -> Self {
        ImageSource::Path(path.to_path_buf())
    }
}

impl From<Bytes> for ImageSource {
    fn from(bytes: Bytes) -> Self {
        ImageSource::Buffer(bytes)
    }
}

impl From<Vec<u8>> for ImageSource {
    fn from(bytes: Vec<u8>) -> Self {
        ImageSource::Buffer(Bytes::from(bytes))
    }
}
