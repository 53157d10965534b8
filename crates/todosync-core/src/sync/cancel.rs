//! Cancellation signal for sync and write operations
//!
//! A `CancelHandle` flips a watch channel; every `Cancellation` clone
//! observes it. Remote calls race against the signal. Local transactions
//! never check it once they have started.

use std::time::Duration;

use tokio::sync::watch;

use super::error::{SyncError, SyncResult};
use crate::remote::{RemoteClient, RemoteError, SyncRequest, SyncResponse};

/// Sending side of a cancellation signal
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Signal cancellation to every linked `Cancellation`
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Receiving side of a cancellation signal
#[derive(Debug, Clone)]
pub struct Cancellation {
    rx: watch::Receiver<bool>,
}

impl Cancellation {
    /// A signal that never fires
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is signalled; pending forever if the
    /// handle is dropped without cancelling
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Create a linked handle/signal pair
pub fn cancellation() -> (CancelHandle, Cancellation) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, Cancellation { rx })
}

/// Run one remote call bounded by `timeout` and `cancel`.
///
/// Returns `Cancelled` if the signal fires before or during the call, and
/// also if it fired while the response was in flight, so callers never
/// start a local write after cancellation.
pub(crate) async fn call_remote<R: RemoteClient>(
    remote: &R,
    request: SyncRequest,
    cancel: &Cancellation,
    timeout: Duration,
) -> SyncResult<SyncResponse> {
    if cancel.is_cancelled() {
        return Err(SyncError::Cancelled);
    }

    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(SyncError::Cancelled),
        result = tokio::time::timeout(timeout, remote.sync(request)) => match result {
            Ok(response) => response?,
            Err(_) => return Err(SyncError::Remote(RemoteError::Timeout(timeout))),
        },
    };

    if cancel.is_cancelled() {
        return Err(SyncError::Cancelled);
    }
    Ok(response)
}
