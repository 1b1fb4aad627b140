//! Incremental decoding of byte streams.
//!
//! A [`StreamSession`] accumulates pushed bytes and emits one
//! [`StreamEvent::Frame`] per complete encoded image. Sessions are plain
//! synchronous state machines; [`FrameReader`] drives one from a blocking
//! reader and [`channel`] drives one from async producers.

pub mod channel;
pub mod reader;

use bytes::{Buf, BytesMut};
use tracing::{debug, trace, warn};

use crate::config::{DecodeOptions, FrameErrorPolicy, StreamMode, StreamOptions};
use crate::decode::decode;
use crate::error::{DecodeError, Result};
use crate::formats::{FrameScan, FrameScanner};
use crate::signatures::{self, Sniff};
use crate::types::{DecodedImage, EncodedBlob, ImageFormat};

pub use channel::{EventStream, StreamWriter};
pub use reader::FrameReader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing written yet.
    Empty,
    Accumulating,
    /// A complete frame has been cut and is being decoded.
    FrameReady,
    /// `end` was called, or the session aborted on a frame error.
    Closed,
}

#[derive(Debug)]
pub enum StreamEvent {
    Frame(DecodedImage),
    Error(DecodeError),
    /// Emitted exactly once, as the last event of a session.
    End,
}

impl StreamEvent {
    pub fn is_end(&self) -> bool {
        matches!(self, StreamEvent::End)
    }
}

pub struct StreamSession {
    options: StreamOptions,
    decode: DecodeOptions,
    state: SessionState,
    buffer: BytesMut,
    /// Format and boundary scanner of the frame at the head of `buffer`.
    current: Option<(ImageFormat, FrameScanner)>,
    /// Candidate frame found inside a weakly identified one: offset,
    /// format and scanner.
    candidate: Option<(usize, ImageFormat, FrameScanner)>,
    /// Where the next search for a strong signature inside a weakly
    /// identified frame starts.
    search_from: usize,
    /// Unrecognised bytes dropped since the last report.
    skipped: usize,
    frames_emitted: usize,
}

impl StreamSession {
    pub fn new(options: StreamOptions, decode: DecodeOptions) -> Self {
        Self {
            options,
            decode,
            state: SessionState::Empty,
            buffer: BytesMut::new(),
            current: None,
            candidate: None,
            search_from: 0,
            skipped: 0,
            frames_emitted: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Bytes held that have not been emitted as a frame yet.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn frames_emitted(&self) -> usize {
        self.frames_emitted
    }

    /// Appends a chunk and returns the events it completes.
    pub fn write(&mut self, chunk: &[u8]) -> Result<Vec<StreamEvent>> {
        self.ensure_open()?;
        let mut events = Vec::new();
        if chunk.is_empty() {
            return Ok(events);
        }
        self.state = SessionState::Accumulating;

        match self.options.mode {
            StreamMode::Framed => {
                self.buffer.extend_from_slice(chunk);
                self.drain(&mut events);
            }
            StreamMode::PerWrite => {
                if chunk.len() > self.options.max_frame_bytes {
                    let err = self.oversized(chunk.len());
                    self.report(err, &mut events);
                } else {
                    let blob = EncodedBlob::new(chunk.to_vec()).with_format(self.options.format);
                    self.emit(&blob, &mut events);
                }
            }
            StreamMode::WholeStream => {
                if self.buffer.len() + chunk.len() > self.options.max_frame_bytes {
                    let err = self.oversized(self.buffer.len() + chunk.len());
                    events.push(StreamEvent::Error(err));
                    self.close(&mut events);
                } else {
                    self.buffer.extend_from_slice(chunk);
                }
            }
        }

        Ok(events)
    }

    /// Flushes what is left, emits [`StreamEvent::End`] and closes the session.
    ///
    /// In framed mode, leftover bytes that began a recognised frame are
    /// reported as [`DecodeError::Truncated`]. Leftover bytes that match no
    /// signature at all were never part of a frame; they are reported as
    /// [`DecodeError::InvalidFormat`] ("skipped N bytes"), like garbage
    /// between frames.
    pub fn end(&mut self) -> Result<Vec<StreamEvent>> {
        self.ensure_open()?;
        let mut events = Vec::new();

        match self.options.mode {
            StreamMode::Framed => {
                if self.finish_framed(&mut events) {
                    return Ok(events);
                }
            }
            StreamMode::WholeStream if !self.buffer.is_empty() => {
                let blob = EncodedBlob::new(self.buffer.split().freeze())
                    .with_format(self.options.format);
                match decode(&blob, &self.decode) {
                    Ok(img) => {
                        self.frames_emitted += 1;
                        events.push(StreamEvent::Frame(img));
                    }
                    Err(err) => {
                        warn!("Stream decode failed: {}", err);
                        events.push(StreamEvent::Error(err));
                    }
                }
            }
            StreamMode::WholeStream | StreamMode::PerWrite => {}
        }

        self.close(&mut events);
        Ok(events)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(DecodeError::Unsupported("stream session is closed".into()));
        }
        Ok(())
    }

    /// Cuts and decodes every complete frame at the head of the buffer.
    fn drain(&mut self, events: &mut Vec<StreamEvent>) {
        loop {
            if self.current.is_none() && !self.lock_on_frame(events) {
                return;
            }
            if self.is_closed() {
                return;
            }
            let Some((format, scanner)) = self.current.as_mut() else {
                return;
            };
            let format = *format;

            match scanner.advance(&self.buffer) {
                FrameScan::Complete(len) => {
                    self.current = None;
                    if len > self.options.max_frame_bytes {
                        let err = self.oversized(len);
                        self.buffer.advance(len);
                        if self.report(err, events) {
                            return;
                        }
                        continue;
                    }
                    self.state = SessionState::FrameReady;
                    let frame = self.buffer.split_to(len).freeze();
                    trace!("Cut {} frame of {} bytes", format, len);
                    let blob = EncodedBlob::new(frame).with_format(Some(format));
                    self.emit(&blob, events);
                    if self.is_closed() {
                        return;
                    }
                    self.state = SessionState::Accumulating;
                }
                FrameScan::Incomplete | FrameScan::Unbounded => {
                    if self.buffer.len() > self.options.max_frame_bytes {
                        let err = self.oversized(self.buffer.len());
                        self.buffer.clear();
                        self.current = None;
                        self.report(err, events);
                        return;
                    }
                    let Some(offset) = self.interrupted_at() else {
                        return;
                    };
                    self.buffer.advance(offset);
                    debug!("Abandoned {} frame after {} bytes", format, offset);
                    let err = DecodeError::InvalidFormat(format!(
                        "{format} frame of {offset} bytes cut short by the next image"
                    ));
                    if self.report(err, events) {
                        return;
                    }
                }
                FrameScan::Invalid(reason) => {
                    self.current = None;
                    let dropped = self.discard_until_signature();
                    debug!("Dropped {} bytes of malformed {} frame", dropped, format);
                    if self.report(DecodeError::InvalidFormat(reason), events) {
                        return;
                    }
                }
            }
        }
    }

    /// Identifies the frame at the head of the buffer, skipping bytes that
    /// cannot start one. Returns false when more input is needed.
    fn lock_on_frame(&mut self, events: &mut Vec<StreamEvent>) -> bool {
        loop {
            if self.buffer.is_empty() {
                return false;
            }
            let format = match self.options.format {
                Some(format) => format,
                None => match signatures::registry().sniff(&self.buffer) {
                    Sniff::Match(format) => format,
                    Sniff::NeedMore => return false,
                    Sniff::NoMatch => {
                        self.skipped += self.discard_until_signature();
                        continue;
                    }
                },
            };

            self.current = Some((format, FrameScanner::for_format(format)));
            self.candidate = None;
            self.search_from = 0;
            if self.skipped > 0 {
                let err = self.skip_error();
                self.report(err, events);
            }
            return true;
        }
    }

    /// Checks a weakly identified frame that is still incomplete for a
    /// strong signature whose own frame already scans complete. On a hit
    /// that frame becomes current and its offset is returned; the caller
    /// drops the bytes before it.
    fn interrupted_at(&mut self) -> Option<usize> {
        let registry = signatures::registry();
        let (format, _) = self.current.as_ref()?;
        if self.options.format.is_some() || registry.has_strong_signature(*format) {
            return None;
        }

        loop {
            let Some((offset, found, scanner)) = self.candidate.as_mut() else {
                let from = self.search_from.max(1);
                let Some(offset) = registry.find_next(&self.buffer, from) else {
                    self.search_from = self
                        .buffer
                        .len()
                        .saturating_sub(registry.max_required_len())
                        .max(from);
                    return None;
                };
                match registry.sniff(&self.buffer[offset..]) {
                    Sniff::Match(found) => {
                        self.candidate = Some((offset, found, FrameScanner::for_format(found)));
                    }
                    Sniff::NeedMore => {
                        self.search_from = offset;
                        return None;
                    }
                    Sniff::NoMatch => self.search_from = offset + 1,
                }
                continue;
            };

            let (offset, found) = (*offset, *found);
            match scanner.advance(&self.buffer[offset..]) {
                FrameScan::Complete(_) => {
                    let (_, _, scanner) = self.candidate.take()?;
                    trace!("{} frame found {} bytes into a weak frame", found, offset);
                    self.current = Some((found, scanner));
                    self.search_from = 0;
                    return Some(offset);
                }
                FrameScan::Incomplete => return None,
                // no trailer to confirm it, or not a frame after all
                FrameScan::Unbounded | FrameScan::Invalid(_) => {
                    self.candidate = None;
                    self.search_from = offset + 1;
                }
            }
        }
    }

    /// Drops bytes up to the next strong signature after the first byte, or
    /// all but a possible partial signature at the end. Returns the count.
    fn discard_until_signature(&mut self) -> usize {
        let registry = signatures::registry();
        let drop = match registry.find_next(&self.buffer, 1) {
            Some(offset) => offset,
            None => self.buffer.len() - registry.partial_suffix_len(&self.buffer[1..]),
        };
        self.buffer.advance(drop);
        drop
    }

    /// End-of-stream handling for framed mode. Returns true when an abort
    /// already closed the session.
    fn finish_framed(&mut self, events: &mut Vec<StreamEvent>) -> bool {
        let mut truncated = None;

        match self.current.take() {
            Some((format, FrameScanner::Unbounded)) => {
                let blob = EncodedBlob::new(self.buffer.split().freeze()).with_format(Some(format));
                self.emit(&blob, events);
                if self.is_closed() {
                    return true;
                }
            }
            Some(_) => {
                truncated = Some(self.buffer.len());
            }
            None if self.buffer.is_empty() => {}
            None => match signatures::registry().sniff(&self.buffer) {
                Sniff::NoMatch => self.skipped += self.buffer.len(),
                _ => truncated = Some(self.buffer.len()),
            },
        }
        self.buffer.clear();

        if self.skipped > 0 {
            let err = self.skip_error();
            if self.report(err, events) {
                return true;
            }
        }
        if let Some(buffered) = truncated {
            warn!("Stream ended mid-frame with {} bytes buffered", buffered);
            events.push(StreamEvent::Error(DecodeError::Truncated { buffered }));
        }
        false
    }

    fn emit(&mut self, blob: &EncodedBlob, events: &mut Vec<StreamEvent>) {
        match decode(blob, &self.decode) {
            Ok(img) => {
                self.frames_emitted += 1;
                events.push(StreamEvent::Frame(img));
            }
            Err(err) => {
                self.report(err, events);
            }
        }
    }

    /// Pushes an error event and applies the frame error policy.
    /// Returns true when the session aborted.
    fn report(&mut self, err: DecodeError, events: &mut Vec<StreamEvent>) -> bool {
        warn!("Stream frame error after {} frames: {}", self.frames_emitted, err);
        events.push(StreamEvent::Error(err));
        match self.options.on_frame_error {
            FrameErrorPolicy::Continue => false,
            FrameErrorPolicy::Abort => {
                self.buffer.clear();
                self.current = None;
                self.close(events);
                true
            }
        }
    }

    fn close(&mut self, events: &mut Vec<StreamEvent>) {
        self.state = SessionState::Closed;
        self.buffer.clear();
        events.push(StreamEvent::End);
        debug!("Stream session closed after {} frames", self.frames_emitted);
    }

    fn skip_error(&mut self) -> DecodeError {
        let skipped = std::mem::take(&mut self.skipped);
        DecodeError::InvalidFormat(format!("skipped {skipped} bytes of unrecognised data"))
    }

    fn oversized(&self, len: usize) -> DecodeError {
        DecodeError::InvalidFormat(format!(
            "frame of {len} bytes exceeds the {} byte limit",
            self.options.max_frame_bytes
        ))
    }
}
