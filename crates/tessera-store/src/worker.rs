//! Background worker loop shared by the pooler and the swapper.
//!
//! Each worker owns the receiving end of a bounded channel. A `Kick`
//! runs a pass immediately and resets the backoff; a timeout runs a pass
//! and doubles the sleep if it found nothing to do; `Shutdown` (or a
//! disconnected channel) ends the thread.

use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};

/// Messages understood by a store worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum WorkerMessage {
    Kick,
    Shutdown,
}

/// Exponential backoff between two bounds.
#[derive(Clone, Debug)]
pub(crate) struct Backoff {
    min: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub(crate) fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max,
            current: min,
        }
    }

    pub(crate) fn current(&self) -> Duration {
        self.current
    }

    pub(crate) fn reset(&mut self) {
        self.current = self.min;
    }

    pub(crate) fn grow(&mut self) {
        self.current = self.current.saturating_mul(2).min(self.max);
    }
}

/// Spawn a named worker running `pass` until told to stop.
///
/// `pass` returns whether it did any work.
pub(crate) fn spawn_worker<F>(
    name: &'static str,
    rx: Receiver<WorkerMessage>,
    mut backoff: Backoff,
    mut pass: F,
) -> io::Result<JoinHandle<()>>
where
    F: FnMut() -> bool + Send + 'static,
{
    thread::Builder::new().name(name.into()).spawn(move || {
        tracing::debug!(worker = name, "store worker started");
        loop {
            match rx.recv_timeout(backoff.current()) {
                Ok(WorkerMessage::Kick) => {
                    backoff.reset();
                    pass();
                }
                Err(RecvTimeoutError::Timeout) => {
                    if pass() {
                        backoff.reset();
                    } else {
                        backoff.grow();
                    }
                }
                Ok(WorkerMessage::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        tracing::debug!(worker = name, "store worker stopped");
    })
}
