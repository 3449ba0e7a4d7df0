//! Output capture with live, line-delimited reporting
//!
//! Every byte a command prints is appended to one in-memory buffer. When the
//! reporter is live, the first write starts a background task that reports
//! new complete lines with an adaptive period: the period grows while there
//! is output and shrinks while there is none. [`Writer::end`] stops the task
//! after a final, undelimited report, so every byte is reported exactly once.

use crate::command::reporter::{Reporter, Verbosity};
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::sleep;

pub const BACKOFF_STEP: Duration = Duration::from_millis(100);
pub const BACKOFF_MIN: Duration = Duration::from_millis(100);
pub const BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Captured bytes and the reported prefix length
#[derive(Debug, Default)]
pub struct Buffer {
    bytes: Vec<u8>,
    index: usize,
}

impl Buffer {
    pub fn extend(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Length of the already reported prefix.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Take the unreported tail and mark it reported.
    ///
    /// Delimited takes stop after the last newline; `None` when there is
    /// nothing to take.
    pub fn take(&mut self, delimited: bool) -> Option<Vec<u8>> {
        let tail = &self.bytes[self.index..];
        let len = if delimited {
            tail.iter().rposition(|b| *b == b'\n')? + 1
        } else {
            tail.len()
        };
        if len == 0 {
            return None;
        }
        let chunk = tail[..len].to_vec();
        self.index += len;
        Some(chunk)
    }
}

/// Adaptive report period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    delay: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self { delay: BACKOFF_MIN }
    }
}

impl Backoff {
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Lengthen the period after a report with output, shorten it otherwise.
    pub fn adjust(&mut self, reported: usize) {
        self.delay = if reported > 0 {
            (self.delay + BACKOFF_STEP).min(BACKOFF_MAX)
        } else {
            self.delay.saturating_sub(BACKOFF_STEP).max(BACKOFF_MIN)
        };
    }
}

struct Drain {
    end: oneshot::Sender<()>,
    ended: oneshot::Receiver<()>,
}

enum State {
    Idle,
    Draining(Drain),
    Ended,
}

/// Output sink shared by a command's stdout and stderr
pub struct Writer {
    reporter: Reporter,
    buffer: Arc<Mutex<Buffer>>,
    state: Mutex<State>,
}

impl Writer {
    pub fn new(reporter: Reporter) -> Self {
        Self {
            reporter,
            buffer: Arc::new(Mutex::new(Buffer::default())),
            state: Mutex::new(State::Idle),
        }
    }

    /// Append output; starts live reporting on first use.
    pub fn write(&self, bytes: &[u8]) {
        lock(&self.buffer).extend(bytes);
        if self.reporter.verbosity() == Verbosity::LiveOutput {
            self.start();
        }
    }

    fn start(&self) {
        let mut state = lock(&self.state);
        if !matches!(*state, State::Idle) {
            return;
        }
        let (end_tx, end_rx) = oneshot::channel();
        let (ended_tx, ended_rx) = oneshot::channel();
        tokio::spawn(report(
            self.reporter.clone(),
            self.buffer.clone(),
            end_rx,
            ended_tx,
        ));
        *state = State::Draining(Drain {
            end: end_tx,
            ended: ended_rx,
        });
    }

    /// Stop live reporting and wait for the final report.
    ///
    /// Later calls return immediately.
    pub async fn end(&self) {
        let previous = mem::replace(&mut *lock(&self.state), State::Ended);
        if let State::Draining(drain) = previous {
            let _ = drain.end.send(());
            let _ = drain.ended.await;
        }
    }

    /// Everything captured so far, unmasked.
    pub fn bytes(&self) -> Vec<u8> {
        lock(&self.buffer).bytes().to_vec()
    }

    /// Number of bytes already reported.
    pub fn reported(&self) -> usize {
        lock(&self.buffer).index()
    }
}

async fn report(
    reporter: Reporter,
    buffer: Arc<Mutex<Buffer>>,
    mut end: oneshot::Receiver<()>,
    ended: oneshot::Sender<()>,
) {
    let mut backoff = Backoff::default();
    loop {
        tokio::select! {
            _ = &mut end => break,
            _ = sleep(backoff.delay()) => {
                let reported = reporter.output(&buffer, true).await;
                backoff.adjust(reported);
            }
        }
    }
    reporter.output(&buffer, false).await;
    let _ = ended.send(());
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
