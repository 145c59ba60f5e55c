//! Versioned config store with change notification.
//!
//! `ConfigStore<T>` keeps the current value behind `Arc<RwLock<T>>` and
//! bumps a `watch` channel on every update, so the orchestrator can react
//! to configuration events without polling.

use std::sync::Arc;
use tokio::sync::{RwLock, watch};

/// A shared configuration value with change notification.
///
/// Readers take cloned snapshots with [`current`](ConfigStore::current);
/// subscribers receive a [`ConfigWatcher`] that resolves on the next
/// [`update`](ConfigStore::update) or [`modify`](ConfigStore::modify).
pub struct ConfigStore<T> {
    inner: Arc<ConfigStoreInner<T>>,
}

struct ConfigStoreInner<T> {
    data: RwLock<T>,
    version_tx: watch::Sender<u64>,
}

/// Receives notifications when a [`ConfigStore`] is updated.
pub struct ConfigWatcher {
    version_rx: watch::Receiver<u64>,
}

impl<T: Clone> ConfigStore<T> {
    pub fn new(initial: T) -> Self {
        let (version_tx, _) = watch::channel(0u64);
        Self {
            inner: Arc::new(ConfigStoreInner {
                data: RwLock::new(initial),
                version_tx,
            }),
        }
    }

    /// Replace the stored value and notify all watchers.
    pub async fn update(&self, value: T) {
        self.modify(|current| *current = value).await;
    }

    /// Edit the stored value in place and notify all watchers.
    pub async fn modify(&self, edit: impl FnOnce(&mut T)) {
        let mut guard = self.inner.data.write().await;
        edit(&mut *guard);
        // Release the write lock before notifying so watchers can read
        // the new value right away.
        drop(guard);
        self.inner.version_tx.send_modify(|version| *version += 1);
    }

    /// A snapshot of the current value.
    pub async fn current(&self) -> T {
        self.inner.data.read().await.clone()
    }

    /// Number of updates applied since creation.
    pub fn version(&self) -> u64 {
        *self.inner.version_tx.borrow()
    }

    /// Subscribe to change notifications.
    ///
    /// The watcher only fires for updates made after subscribing.
    pub fn subscribe(&self) -> ConfigWatcher {
        ConfigWatcher {
            version_rx: self.inner.version_tx.subscribe(),
        }
    }
}

impl<T> Clone for ConfigStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl ConfigWatcher {
    /// Wait until the config store is updated.
    ///
    /// Returns `Err` once the [`ConfigStore`] has been dropped.
    pub async fn changed(&mut self) -> Result<(), watch::error::RecvError> {
        self.version_rx.changed().await
    }
}
