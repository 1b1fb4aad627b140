//! Async push interface over a [`StreamSession`].
//!
//! Chunks travel to a driver task over a bounded channel (writers wait
//! when it is full); events come back unbounded. The driver
//! moves the session into `spawn_blocking` for every chunk so scanning
//! and decoding never run on the async workers.

use std::io;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, error};

use super::{StreamEvent, StreamSession};
use crate::error::{DecodeError, Result};

const CHANNEL_DEPTH: usize = 16;

type Input = io::Result<Bytes>;

/// Producer half returned by [`Ingest::open_stream`](crate::Ingest::open_stream).
pub struct StreamWriter {
    tx: mpsc::Sender<Input>,
}

impl StreamWriter {
    /// Queues a chunk. Fails once the session has closed.
    pub async fn write(&self, chunk: impl Into<Bytes>) -> Result<()> {
        self.tx
            .send(Ok(chunk.into()))
            .await
            .map_err(|_| DecodeError::Unsupported("stream session is closed".into()))
    }

    /// Signals end of stream. Remaining frames and `End` follow on the
    /// event side.
    pub fn end(self) {
        drop(self.tx);
    }
}

/// Consumer half: the session's events in order, ending with `End`.
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<StreamEvent>,
}

impl EventStream {
    pub async fn next(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }

    /// Blocking variant for callers outside the runtime.
    pub fn blocking_next(&mut self) -> Option<StreamEvent> {
        self.rx.blocking_recv()
    }

    /// Drains every remaining event.
    pub async fn collect(mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.rx.recv().await {
            events.push(event);
        }
        events
    }
}

fn current_runtime() -> Result<Handle> {
    Handle::try_current()
        .map_err(|_| DecodeError::Unsupported("stream drivers need a tokio runtime".into()))
}

pub(crate) fn open(session: StreamSession) -> Result<(StreamWriter, EventStream)> {
    let handle = current_runtime()?;
    let (tx, input) = mpsc::channel(CHANNEL_DEPTH);
    let (events_tx, rx) = mpsc::unbounded_channel();
    handle.spawn(drive(session, input, events_tx));
    Ok((StreamWriter { tx }, EventStream { rx }))
}

/// Feeds `reader` into a new session until EOF.
pub(crate) fn pump<R>(
    session: StreamSession,
    mut reader: R,
    chunk_size: usize,
) -> Result<EventStream>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let handle = current_runtime()?;
    let (tx, input) = mpsc::channel(CHANNEL_DEPTH);
    let (events_tx, rx) = mpsc::unbounded_channel();
    handle.spawn(drive(session, input, events_tx));

    handle.spawn(async move {
        let mut buf = BytesMut::with_capacity(chunk_size);
        loop {
            buf.reserve(chunk_size);
            let input = match reader.read_buf(&mut buf).await {
                Ok(0) => break,
                Ok(_) => Ok(buf.split().freeze()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => Err(e),
            };
            let failed = input.is_err();
            if tx.send(input).await.is_err() || failed {
                break;
            }
        }
    });

    Ok(EventStream { rx })
}

async fn drive(
    mut session: StreamSession,
    mut input: mpsc::Receiver<Input>,
    events: mpsc::UnboundedSender<StreamEvent>,
) {
    loop {
        let chunk = match input.recv().await {
            Some(Ok(bytes)) => Some(bytes),
            Some(Err(source)) => {
                let _ = events.send(StreamEvent::Error(DecodeError::Io {
                    origin: "stream".into(),
                    source,
                }));
                let _ = events.send(StreamEvent::End);
                return;
            }
            None => None,
        };
        let finished = chunk.is_none();

        let joined = tokio::task::spawn_blocking(move || {
            let result = match &chunk {
                Some(bytes) => session.write(bytes),
                None => session.end(),
            };
            (session, result)
        })
        .await;

        let result = match joined {
            Ok((returned, result)) => {
                session = returned;
                result
            }
            Err(e) => {
                error!("Stream worker failed: {}", e);
                let _ = events.send(StreamEvent::Error(DecodeError::WorkerLost));
                let _ = events.send(StreamEvent::End);
                return;
            }
        };

        match result {
            Ok(batch) => {
                for event in batch {
                    if events.send(event).is_err() {
                        debug!("Event receiver dropped; stopping stream driver");
                        return;
                    }
                }
            }
            Err(err) => {
                let _ = events.send(StreamEvent::Error(err));
                let _ = events.send(StreamEvent::End);
                return;
            }
        }

        if finished || session.is_closed() {
            return;
        }
    }
}
