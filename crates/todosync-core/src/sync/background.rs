//! Background sync task
//!
//! Runs incremental syncs on a fixed interval, or on demand through
//! [`BackgroundSyncHandle::trigger`]. The task owns its own engine and
//! store connection; the store's transactions keep it from interleaving
//! with foreground writes.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::cancel::{cancellation, CancelHandle, Cancellation};
use super::engine::SyncEngine;
use super::error::SyncError;
use crate::models::SyncReport;
use crate::remote::RemoteClient;
use crate::storage::CacheStore;

/// Commands sent to the sync task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncCommand {
    /// Sync now instead of waiting for the next tick
    SyncNow,
    /// Stop the task
    Shutdown,
}

/// Events emitted by the sync task
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A sync committed (or found nothing to do)
    Synced(SyncReport),
    /// A sync failed; the cache is unchanged
    Failed(String),
}

/// Handle to control the background sync task
pub struct BackgroundSyncHandle {
    command_tx: mpsc::Sender<SyncCommand>,
    event_rx: Option<mpsc::Receiver<SyncEvent>>,
    cancel: CancelHandle,
    task: JoinHandle<()>,
}

impl BackgroundSyncHandle {
    /// Request an immediate sync.
    ///
    /// Returns false if a request is already queued or the task has stopped.
    pub fn trigger(&self) -> bool {
        self.command_tx.try_send(SyncCommand::SyncNow).is_ok()
    }

    /// Take the event receiver; only the first call gets it
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<SyncEvent>> {
        self.event_rx.take()
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the task and wait for it to exit.
    ///
    /// A remote call in flight is cancelled; a cache transaction in
    /// progress runs to completion first.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.command_tx.send(SyncCommand::Shutdown).await;
        if let Err(e) = self.task.await {
            warn!("Background sync task ended abnormally: {}", e);
        }
    }
}

/// Spawn a task running `engine` every `interval`
pub fn spawn_background_sync<R, S>(
    engine: SyncEngine<R, S>,
    interval: Duration,
) -> BackgroundSyncHandle
where
    R: RemoteClient + 'static,
    S: CacheStore + 'static,
{
    let (command_tx, command_rx) = mpsc::channel(1);
    let (event_tx, event_rx) = mpsc::channel(64);
    let (cancel, signal) = cancellation();

    let task = tokio::spawn(sync_loop(engine, interval, command_rx, event_tx, signal));

    BackgroundSyncHandle {
        command_tx,
        event_rx: Some(event_rx),
        cancel,
        task,
    }
}

async fn sync_loop<R: RemoteClient, S: CacheStore>(
    mut engine: SyncEngine<R, S>,
    interval: Duration,
    mut command_rx: mpsc::Receiver<SyncCommand>,
    event_tx: mpsc::Sender<SyncEvent>,
    cancel: Cancellation,
) {
    info!("Background sync started (every {:?})", interval);

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                debug!("Background sync tick");
            }
            cmd = command_rx.recv() => {
                match cmd {
                    Some(SyncCommand::SyncNow) => debug!("Background sync requested"),
                    Some(SyncCommand::Shutdown) | None => break,
                }
            }
        }

        let event = match engine.incremental_sync(&cancel).await {
            Ok(report) => SyncEvent::Synced(report),
            Err(SyncError::Cancelled) => {
                debug!("Background sync cancelled");
                continue;
            }
            Err(e) => {
                warn!("Background sync failed: {}", e);
                SyncEvent::Failed(e.to_string())
            }
        };
        // Nobody listening is fine
        let _ = event_tx.try_send(event);
    }

    if let Err(e) = engine.store_mut().close() {
        warn!("Failed to close background sync store: {}", e);
    }
    info!("Background sync stopped");
}
