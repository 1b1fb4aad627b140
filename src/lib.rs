pub mod args;
pub mod bridge;
pub mod config;
pub mod decode;
pub mod demux;
pub mod error;
pub mod formats;
pub mod ingest;
pub mod signatures;
pub mod source;
pub mod stream;
pub mod types;

pub use bridge::{Completion, Pending, WorkerPool};
pub use config::{
    DecodeLimits, DecodeOptions, FrameErrorPolicy, IngestOptions, StreamMode, StreamOptions,
};
pub use decode::decode;
pub use demux::demux;
pub use error::{ArgumentError, DecodeError, ErrorKind, Result, SetupError};
pub use ingest::{Ingest, ReadRequest};
pub use source::ImageSource;
pub use stream::{EventStream, FrameReader, SessionState, StreamEvent, StreamSession, StreamWriter};
pub use types::{
    DecodedImage, ElementType, EncodedBlob, FrameSequence, ImageFormat, ReadMode, Reduction,
};
