//! Cancellation signal for running commands

use tokio::sync::watch;

/// Create a linked canceller and token.
pub fn cancel_channel() -> (Canceller, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (Canceller { tx }, CancelToken { rx })
}

/// Sending half; cancels every token cloned from its pair.
#[derive(Debug)]
pub struct Canceller {
    tx: watch::Sender<bool>,
}

impl Canceller {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Receiving half passed to [`crate::command::Command::run_with`]
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancelled. Never resolves if the canceller is dropped
    /// without cancelling.
    pub async fn cancelled(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}
