//! Completion bridge between decode workers and callers.
//!
//! Jobs run on a fixed rayon pool. Each job owns one [`Completion`],
//! which is consumed when the result is delivered, so a result reaches
//! its consumer exactly once whether that consumer is a callback or a
//! [`Pending`] future.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context, Poll};

use rayon::{ThreadPool, ThreadPoolBuilder};
use tokio::sync::oneshot;
use tracing::{debug, error};

use crate::error::{DecodeError, Result, SetupError};

/// Consumer-side callback, invoked on a worker thread.
pub type Callback<T> = Box<dyn FnOnce(Result<T>) + Send + 'static>;

pub enum Completion<T> {
    Callback(Callback<T>),
    Cell(oneshot::Sender<Result<T>>),
}

impl<T: Send + 'static> Completion<T> {
    pub fn callback<F>(f: F) -> Self
    where
        F: FnOnce(Result<T>) + Send + 'static,
    {
        Completion::Callback(Box::new(f))
    }

    /// A single-assignment cell and the future that observes it.
    pub fn cell() -> (Self, Pending<T>) {
        let (tx, rx) = oneshot::channel();
        (Completion::Cell(tx), Pending { rx })
    }

    pub fn complete(self, result: Result<T>) {
        match self {
            Completion::Callback(f) => f(result),
            Completion::Cell(tx) => {
                // Receiver gone means nobody is waiting any more
                if tx.send(result).is_err() {
                    debug!("Dropping result: pending handle was released");
                }
            }
        }
    }
}

/// Future side of [`Completion::cell`].
#[must_use = "a pending result does nothing unless awaited or waited on"]
pub struct Pending<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> Pending<T> {
    /// Blocks the current thread until the result arrives.
    ///
    /// Must not be called from inside an async runtime.
    pub fn wait(self) -> Result<T> {
        self.rx.blocking_recv().unwrap_or(Err(DecodeError::WorkerLost))
    }
}

impl<T> Future for Pending<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or(Err(DecodeError::WorkerLost)))
    }
}

pub struct WorkerPool {
    pool: ThreadPool,
}

impl WorkerPool {
    pub fn new(workers: usize) -> std::result::Result<Self, SetupError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("decode-{i}"))
            .panic_handler(|_| error!("Decode worker panicked outside a job"))
            .build()?;
        debug!("Started {} decode workers", workers);
        Ok(Self { pool })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Runs `job` on a worker and delivers its result to `completion`.
    ///
    /// Returns immediately; delivery always happens on a worker thread.
    pub fn submit<T, F>(&self, job: F, completion: Completion<T>)
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        self.pool.spawn(move || {
            let result = match panic::catch_unwind(AssertUnwindSafe(job)) {
                Ok(result) => result,
                Err(_) => {
                    error!("Decode job panicked; reporting WorkerLost");
                    Err(DecodeError::WorkerLost)
                }
            };
            completion.complete(result);
        });
    }
}
