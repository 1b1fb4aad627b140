use std::io::Read;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::io::AsyncRead;
use tracing::{debug, info};

use crate::args::{self, Arg};
use crate::bridge::{Completion, Pending, WorkerPool};
use crate::config::{DecodeOptions, IngestOptions, StreamOptions};
use crate::decode::decode;
use crate::demux::demux;
use crate::error::{ArgumentError, Result, SetupError};
use crate::source::ImageSource;
use crate::stream::{self, EventStream, FrameReader, StreamSession, StreamWriter};
use crate::types::{DecodedImage, EncodedBlob, FrameSequence, ImageFormat, ReadMode};

/// One read: a source plus optional format and mode overrides.
#[derive(Debug, Clone)]
pub struct ReadRequest {
    source: ImageSource,
    format: Option<ImageFormat>,
    mode: Option<ReadMode>,
}

impl ReadRequest {
    pub fn new(source: ImageSource) -> Self {
        Self {
            source,
            format: None,
            mode: None,
        }
    }

    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::new(ImageSource::Path(path.into()))
    }

    pub fn buffer(bytes: impl Into<Bytes>) -> Self {
        Self::new(ImageSource::Buffer(bytes.into()))
    }

    /// Decode as `format` regardless of the magic bytes.
    pub fn with_format(mut self, format: ImageFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_mode(mut self, mode: ReadMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn source(&self) -> &ImageSource {
        &self.source
    }

    pub fn format(&self) -> Option<ImageFormat> {
        self.format
    }

    pub fn mode(&self) -> Option<ReadMode> {
        self.mode
    }

    fn load(&self) -> Result<EncodedBlob> {
        Ok(self.source.load()?.with_format(self.format))
    }
}

impl From<ImageSource> for ReadRequest {
    fn from(source: ImageSource) -> Self {
        Self::new(source)
    }
}

impl From<&Path> for ReadRequest {
    fn from(path: &Path) -> Self {
        Self::path(path)
    }
}

impl From<PathBuf> for ReadRequest {
    fn from(path: PathBuf) -> Self {
        Self::path(path)
    }
}

impl From<&str> for ReadRequest {
    fn from(path: &str) -> Self {
        Self::path(path)
    }
}

impl From<Bytes> for ReadRequest {
    fn from(bytes: Bytes) -> Self {
        Self::buffer(bytes)
    }
}

impl From<Vec<u8>> for ReadRequest {
    fn from(bytes: Vec<u8>) -> Self {
        Self::buffer(bytes)
    }
}

/// Image ingestion service.
///
/// Owns the decode worker pool. Asynchronous reads return immediately and
/// deliver exactly one result, either to a callback (run on a worker
/// thread) or to a [`Pending`] future. `*_sync` variants decode on the
/// calling thread.
pub struct Ingest {
    pool: WorkerPool,
    options: IngestOptions,
}

impl Ingest {
    pub fn new(options: IngestOptions) -> std::result::Result<Self, SetupError> {
        options.validate()?;
        let pool = WorkerPool::new(options.workers)?;
        info!(
            "Ingest ready: {} workers, default mode {:?}",
            pool.workers(),
            options.read_mode
        );
        Ok(Self { pool, options })
    }

    pub fn options(&self) -> &IngestOptions {
        &self.options
    }

    fn decode_options(&self, request: &ReadRequest) -> DecodeOptions {
        self.options.decode_options(request.mode)
    }

    pub fn read_image(&self, request: impl Into<ReadRequest>) -> Pending<DecodedImage> {
        let (completion, pending) = Completion::cell();
        self.submit_image(request.into(), completion);
        pending
    }

    pub fn read_image_with<F>(&self, request: impl Into<ReadRequest>, callback: F)
    where
        F: FnOnce(Result<DecodedImage>) + Send + 'static,
    {
        self.submit_image(request.into(), Completion::callback(callback));
    }

    pub fn read_image_sync(&self, request: impl Into<ReadRequest>) -> Result<DecodedImage> {
        let request = request.into();
        decode(&request.load()?, &self.decode_options(&request))
    }

    pub fn read_multi(&self, request: impl Into<ReadRequest>) -> Pending<FrameSequence> {
        let (completion, pending) = Completion::cell();
        self.submit_multi(request.into(), completion);
        pending
    }

    pub fn read_multi_with<F>(&self, request: impl Into<ReadRequest>, callback: F)
    where
        F: FnOnce(Result<FrameSequence>) + Send + 'static,
    {
        self.submit_multi(request.into(), Completion::callback(callback));
    }

    pub fn read_multi_sync(&self, request: impl Into<ReadRequest>) -> Result<FrameSequence> {
        let request = request.into();
        demux(&request.load()?, &self.decode_options(&request))
    }

    fn submit_image(&self, request: ReadRequest, completion: Completion<DecodedImage>) {
        let options = self.decode_options(&request);
        debug!("Queueing read of {}", request.source.describe());
        self.pool
            .submit(move || decode(&request.load()?, &options), completion);
    }

    fn submit_multi(&self, request: ReadRequest, completion: Completion<FrameSequence>) {
        let options = self.decode_options(&request);
        debug!("Queueing multi-frame read of {}", request.source.describe());
        self.pool
            .submit(move || demux(&request.load()?, &options), completion);
    }

    /// A new session using the configured stream options.
    pub fn stream_session(&self) -> StreamSession {
        self.stream_session_with(self.options.stream.clone())
    }

    pub fn stream_session_with(&self, options: StreamOptions) -> StreamSession {
        StreamSession::new(options, self.options.decode_options(None))
    }

    /// Drives a session from a blocking reader.
    pub fn frame_reader<R: Read>(&self, reader: R) -> FrameReader<R> {
        FrameReader::new(reader, self.stream_session(), self.options.stream.read_chunk_size)
    }

    /// Push-style stream: write chunks, then `end`; frames arrive on the
    /// event side. Must be called from within a tokio runtime.
    pub fn open_stream(&self) -> Result<(StreamWriter, EventStream)> {
        stream::channel::open(self.stream_session())
    }

    /// Streams an async reader to EOF. Must be called from within a tokio
    /// runtime.
    pub fn decode_stream<R>(&self, reader: R) -> Result<EventStream>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        stream::channel::pump(
            self.stream_session(),
            reader,
            self.options.stream.read_chunk_size,
        )
    }

    /// `readImage` with binding-style arguments. Returns a future when no
    /// callback was passed.
    pub fn invoke_read_image(
        &self,
        args: Vec<Arg<DecodedImage>>,
    ) -> std::result::Result<Option<Pending<DecodedImage>>, ArgumentError> {
        let call = args::parse_read_image(args)?;
        Ok(match call.callback {
            Some(callback) => {
                self.submit_image(call.request, Completion::Callback(callback));
                None
            }
            None => Some(self.read_image(call.request)),
        })
    }

    /// `readImageMulti` with binding-style arguments.
    pub fn invoke_read_multi(
        &self,
        args: Vec<Arg<FrameSequence>>,
    ) -> std::result::Result<Option<Pending<FrameSequence>>, ArgumentError> {
        let call = args::parse_read_multi(args)?;
        Ok(match call.callback {
            Some(callback) => {
                self.submit_multi(call.request, Completion::Callback(callback));
                None
            }
            None => Some(self.read_multi(call.request)),
        })
    }
}
