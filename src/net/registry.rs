//! Registry of open channels.
//!
//! # Responsibilities
//! - Track the listener and every accepted connection
//! - Remove entries automatically when their owner goes away
//! - Signal every tracked channel to close, once, from any thread
//! - Optionally abort the tasks serving those channels
//!
//! # Design Decisions
//! - Registration is an RAII guard: dropping it deregisters the channel
//! - Each entry owns a `watch` sender so a late registrant after `close`
//!   still observes the closed state
//! - A plain `std::sync::Mutex` guards the map; no lock is held across `.await`

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{watch, Notify};
use tokio::task::{AbortHandle, JoinHandle};

use crate::net::connection::{ChannelKind, ConnectionId};
use crate::observability::metrics;

struct Entry {
    kind: ChannelKind,
    close_tx: watch::Sender<bool>,
}

#[derive(Default)]
struct Inner {
    entries: Mutex<HashMap<ConnectionId, Entry>>,
    tasks: Mutex<Vec<AbortHandle>>,
    closed: AtomicBool,
    /// Woken whenever the last connection deregisters.
    idle: Notify,
}

impl Inner {
    fn entries(&self) -> MutexGuard<'_, HashMap<ConnectionId, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tasks(&self) -> MutexGuard<'_, Vec<AbortHandle>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Shared handle to the set of open channels. Cloning is cheap.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<Inner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a channel until the returned guard is dropped.
    pub fn add(&self, kind: ChannelKind) -> Registration {
        let id = ConnectionId::new();
        let close_rx = {
            // Read the flag under the lock so a concurrent `close` cannot miss us.
            let mut entries = self.inner.entries();
            let (close_tx, close_rx) = watch::channel(self.is_closed());
            entries.insert(id, Entry { kind, close_tx });
            close_rx
        };
        if kind.is_connection() {
            metrics::connection_opened();
        }
        tracing::trace!(connection_id = %id, kind = %kind, "Channel registered");
        Registration {
            id,
            kind,
            close_rx,
            registry: Arc::clone(&self.inner),
        }
    }

    /// Spawn a task whose lifetime is bound to the registry.
    ///
    /// `close(true)` aborts every task spawned here that is still running.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let handle = tokio::spawn(future);
        let mut tasks = self.inner.tasks();
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle.abort_handle());
        handle
    }

    /// Signal every tracked channel to close.
    ///
    /// With `shutdown_tasks`, tasks started through [`spawn`](Self::spawn) are
    /// aborted as well. Only the first call has an effect.
    pub fn close(&self, shutdown_tasks: bool) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let signalled = {
            let entries = self.inner.entries();
            for entry in entries.values() {
                entry.close_tx.send_replace(true);
            }
            entries.len()
        };
        let aborted = if shutdown_tasks {
            let tasks = std::mem::take(&mut *self.inner.tasks());
            let running = tasks.iter().filter(|task| !task.is_finished()).count();
            for task in tasks {
                task.abort();
            }
            running
        } else {
            0
        };
        tracing::debug!(signalled, aborted, "Connection registry closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// True when nothing at all is registered.
    pub fn is_empty(&self) -> bool {
        self.inner.entries().is_empty()
    }

    /// Number of registered channels, listener included.
    pub fn len(&self) -> usize {
        self.inner.entries().len()
    }

    /// Number of registered client connections.
    pub fn connection_count(&self) -> usize {
        self.inner
            .entries()
            .values()
            .filter(|entry| entry.kind.is_connection())
            .count()
    }

    /// Wait until no client connection is registered.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.connection_count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Guard for one registered channel; deregisters on drop.
pub struct Registration {
    id: ConnectionId,
    kind: ChannelKind,
    close_rx: watch::Receiver<bool>,
    registry: Arc<Inner>,
}

impl Registration {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    /// Future-friendly view of the close request for this channel.
    pub fn close_signal(&self) -> CloseSignal {
        CloseSignal {
            rx: self.close_rx.clone(),
        }
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        let remaining = {
            let mut entries = self.registry.entries();
            entries.remove(&self.id);
            entries.values().filter(|e| e.kind.is_connection()).count()
        };
        if self.kind.is_connection() {
            metrics::connection_closed();
            if remaining == 0 {
                self.registry.idle.notify_waiters();
            }
        }
        tracing::trace!(connection_id = %self.id, "Channel deregistered");
    }
}

/// Resolves once the registry asks the channel to close.
#[derive(Debug, Clone)]
pub struct CloseSignal {
    rx: watch::Receiver<bool>,
}

impl CloseSignal {
    pub fn is_closed(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait for the close request. Also returns if the registration is gone.
    pub async fn closed(&mut self) {
        let _ = self.rx.wait_for(|closed| *closed).await;
    }
}
