//! Presence watchers.
//!
//! Each watcher runs as its own task and reports changes as [`WatchEvent`]s
//! on a channel drained by a single dispatcher. Watchers never touch the
//! registry or mount anything themselves.

mod device;
mod remote;
mod zfs;

pub use device::{DeviceTracker, DeviceWatcher};
pub use remote::{RemoteTracker, RemoteWatcher};
pub use zfs::{PoolTracker, UNMOUNTED, ZfsWatcher};

use crate::platform::common::SHUTDOWN_JOIN_TIMEOUT;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchSource {
    Device,
    Remote,
    Pool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchKind {
    Added,
    Removed,
}

/// A presence change. `key` is a canonical device path, a URL or a pool name;
/// `payload` carries the computed health for pools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub source: WatchSource,
    pub kind: WatchKind,
    pub key: String,
    pub payload: Option<String>,
}

impl WatchEvent {
    pub fn added(source: WatchSource, key: impl Into<String>) -> Self {
        Self {
            source,
            kind: WatchKind::Added,
            key: key.into(),
            payload: None,
        }
    }

    pub fn removed(source: WatchSource, key: impl Into<String>) -> Self {
        Self {
            source,
            kind: WatchKind::Removed,
            key: key.into(),
            payload: None,
        }
    }

    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }
}

pub type EventSender = mpsc::UnboundedSender<WatchEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<WatchEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Common lifecycle of a watcher.
#[async_trait]
pub trait PresenceWatcher: Send {
    fn name(&self) -> &'static str;

    /// Begin observing. No-op while already active.
    fn start(&mut self);

    /// Cancel observation and wait (bounded) for the task to end.
    async fn stop(&mut self);

    /// False once stopped or after the loop gave up on a failure.
    fn is_active(&self) -> bool;
}

/// A cancellable background task with an activity flag.
#[derive(Default)]
pub(crate) struct TaskHandle {
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
    active: Arc<AtomicBool>,
}

impl TaskHandle {
    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub(crate) fn spawn<F, Fut>(&mut self, run: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.is_active() {
            return;
        }
        let token = CancellationToken::new();
        let active = Arc::clone(&self.active);
        active.store(true, Ordering::SeqCst);
        let fut = run(token.clone());
        self.task = Some(tokio::spawn(async move {
            fut.await;
            active.store(false, Ordering::SeqCst);
        }));
        self.cancel = Some(token);
    }

    pub(crate) async fn stop(&mut self, name: &str) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        if let Some(task) = self.task.take()
            && tokio::time::timeout(SHUTDOWN_JOIN_TIMEOUT, task).await.is_err()
        {
            warn!("{} watcher did not stop within {:?}", name, SHUTDOWN_JOIN_TIMEOUT);
        }
        self.active.store(false, Ordering::SeqCst);
    }
}
