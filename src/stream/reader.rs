use std::collections::VecDeque;
use std::io::{self, Read};

use super::{StreamEvent, StreamSession};
use crate::error::DecodeError;

/// Lazily pulls a blocking reader through a [`StreamSession`].
///
/// Yields the session's events in order and stops after
/// [`StreamEvent::End`]. Read errors end the stream with an
/// [`DecodeError::Io`] event.
pub struct FrameReader<R> {
    reader: R,
    session: StreamSession,
    chunk: Vec<u8>,
    pending: VecDeque<StreamEvent>,
    done: bool,
}

impl<R: Read> FrameReader<R> {
    pub fn new(reader: R, session: StreamSession, chunk_size: usize) -> Self {
        Self {
            reader,
            session,
            chunk: vec![0; chunk_size.max(1)],
            pending: VecDeque::new(),
            done: false,
        }
    }

    pub fn session(&self) -> &StreamSession {
        &self.session
    }

    fn fill(&mut self) {
        let result = match self.reader.read(&mut self.chunk) {
            Ok(0) => self.session.end(),
            Ok(n) => self.session.write(&self.chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return,
            Err(source) => {
                self.pending.push_back(StreamEvent::Error(DecodeError::Io {
                    origin: "stream".into(),
                    source,
                }));
                self.pending.push_back(StreamEvent::End);
                self.done = true;
                return;
            }
        };

        match result {
            Ok(events) => self.pending.extend(events),
            Err(err) => {
                self.pending.push_back(StreamEvent::Error(err));
                self.pending.push_back(StreamEvent::End);
            }
        }
        self.done = self.session.is_closed() || self.done;
    }
}

impl<R: Read> Iterator for FrameReader<R> {
    type Item = StreamEvent;

    fn next(&mut self) -> Option<StreamEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            if self.done {
                return None;
            }
            self.fill();
        }
    }
}
