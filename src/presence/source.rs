//! Observable camera presence.
//!
//! [`CameraPresenceSource`] caches the latest [`PresenceSnapshot`] and fans
//! changes out to observers. The underlying hardware watch is supplied by a
//! [`PresenceMonitor`] and only runs while at least one observer is
//! subscribed.
//!
//! Each observer sees snapshots in commit order. A delivery overtaken by a
//! newer one on the same observer is dropped.

use crate::errors::CameraError;
use crate::executor::Executor;
use crate::lock::{lock, read, write};
use crate::types::{CameraId, PresenceSnapshot};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

/// Receives presence changes.
pub trait PresenceObserver: Send + Sync {
    fn on_new_data(&self, camera_ids: &[CameraId]);
    fn on_error(&self, error: &CameraError);
}

/// The hardware-facing half of a presence source.
pub trait PresenceMonitor: Send + Sync {
    /// Called when the first observer subscribes. Push changes through
    /// `updater` until [`stop_monitoring`](Self::stop_monitoring).
    fn start_monitoring(&self, updater: PresenceUpdater);

    /// Called when the last observer unsubscribes.
    fn stop_monitoring(&self);

    /// Query the current camera ids synchronously.
    fn fetch(&self) -> Result<Vec<CameraId>, CameraError>;
}

#[derive(Clone)]
struct ObserverEntry {
    executor: Arc<dyn Executor>,
    observer: Arc<dyn PresenceObserver>,
    // Sequence number of the newest snapshot handed to this observer.
    delivered: Arc<AtomicU64>,
}

/// A committed snapshot and its position in commit order.
struct Committed {
    seq: u64,
    snapshot: PresenceSnapshot,
}

struct SourceInner {
    monitor: Box<dyn PresenceMonitor>,
    observers: RwLock<Arc<Vec<ObserverEntry>>>,
    active: Mutex<bool>,
    committed: Mutex<Committed>,
}

/// Shared handle to a presence source.
#[derive(Clone)]
pub struct CameraPresenceSource {
    inner: Arc<SourceInner>,
}

/// Producer-side handle used by monitors to publish updates.
///
/// Holds the source weakly; updates after the source is dropped are ignored.
#[derive(Clone)]
pub struct PresenceUpdater {
    inner: Weak<SourceInner>,
}

impl PresenceUpdater {
    pub fn update_data(&self, camera_ids: Vec<CameraId>) {
        if let Some(inner) = self.inner.upgrade() {
            inner.update_state(PresenceSnapshot::Available(camera_ids));
        }
    }

    pub fn update_error(&self, error: CameraError) {
        if let Some(inner) = self.inner.upgrade() {
            inner.update_state(PresenceSnapshot::Failed(error));
        }
    }
}

fn same_observer(a: &Arc<dyn PresenceObserver>, b: &Arc<dyn PresenceObserver>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

impl SourceInner {
    fn update_state(&self, next: PresenceSnapshot) {
        let (should_notify, seq, snapshot) = {
            let mut current = lock(&self.committed);
            let should_notify = match (&current.snapshot, &next) {
                (PresenceSnapshot::Failed(_), PresenceSnapshot::Failed(_)) => false,
                (PresenceSnapshot::Available(_), PresenceSnapshot::Failed(_)) => true,
                (PresenceSnapshot::Failed(_), PresenceSnapshot::Available(_)) => true,
                (PresenceSnapshot::Available(old), PresenceSnapshot::Available(new)) => old != new,
            };
            current.seq += 1;
            current.snapshot = next;
            (should_notify, current.seq, current.snapshot.clone())
        };

        if should_notify {
            let observers = read(&self.observers).clone();
            log::debug!(
                "Presence changed. Notifying {} observers. Error: {}",
                observers.len(),
                snapshot.is_error()
            );
            for entry in observers.iter() {
                notify_observer(entry, seq, snapshot.clone());
            }
        }
    }

    fn latest(&self) -> (u64, PresenceSnapshot) {
        let committed = lock(&self.committed);
        (committed.seq, committed.snapshot.clone())
    }
}

/// Hand `snapshot` to the observer unless it has already seen a snapshot
/// committed at or after `seq`.
fn notify_observer(entry: &ObserverEntry, seq: u64, snapshot: PresenceSnapshot) {
    let observer = entry.observer.clone();
    let delivered = entry.delivered.clone();
    let result = entry.executor.execute(Box::new(move || {
        if delivered.fetch_max(seq, Ordering::SeqCst) >= seq {
            log::trace!("Skipping stale presence snapshot #{}", seq);
            return;
        }
        match &snapshot {
            PresenceSnapshot::Available(ids) => observer.on_new_data(ids),
            PresenceSnapshot::Failed(error) => observer.on_error(error),
        }
    }));
    if let Err(e) = result {
        log::warn!("Unable to notify presence observer: {}", e);
    }
}

impl CameraPresenceSource {
    pub fn new(monitor: impl PresenceMonitor + 'static) -> Self {
        Self::with_initial_ids(monitor, Vec::new())
    }

    /// Create a source whose snapshot starts with `camera_ids`.
    pub fn with_initial_ids(
        monitor: impl PresenceMonitor + 'static,
        camera_ids: Vec<CameraId>,
    ) -> Self {
        Self {
            inner: Arc::new(SourceInner {
                monitor: Box::new(monitor),
                observers: RwLock::new(Arc::new(Vec::new())),
                active: Mutex::new(false),
                committed: Mutex::new(Committed {
                    seq: 1,
                    snapshot: PresenceSnapshot::Available(camera_ids),
                }),
            }),
        }
    }

    pub fn updater(&self) -> PresenceUpdater {
        PresenceUpdater {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Subscribe `observer`. The current snapshot is delivered right away on
    /// `executor`.
    pub fn add_observer(&self, executor: Arc<dyn Executor>, observer: Arc<dyn PresenceObserver>) {
        let entry = ObserverEntry {
            executor,
            observer,
            delivered: Arc::new(AtomicU64::new(0)),
        };
        {
            let mut observers = write(&self.inner.observers);
            let mut next: Vec<ObserverEntry> = observers.as_ref().clone();
            next.push(entry.clone());
            *observers = Arc::new(next);
        }

        {
            let mut active = lock(&self.inner.active);
            if !*active && !read(&self.inner.observers).is_empty() {
                log::info!("First observer added. Starting monitoring.");
                *active = true;
                self.inner.monitor.start_monitoring(self.updater());
            }
        }

        let (seq, snapshot) = self.inner.latest();
        notify_observer(&entry, seq, snapshot);
    }

    /// Unsubscribe `observer`. Unknown observers are ignored.
    pub fn remove_observer(&self, observer: &Arc<dyn PresenceObserver>) {
        {
            let mut observers = write(&self.inner.observers);
            if observers.iter().any(|e| same_observer(&e.observer, observer)) {
                let next: Vec<ObserverEntry> = observers
                    .iter()
                    .filter(|e| !same_observer(&e.observer, observer))
                    .cloned()
                    .collect();
                *observers = Arc::new(next);
            }
        }

        let mut active = lock(&self.inner.active);
        if *active && read(&self.inner.observers).is_empty() {
            log::info!("Last observer removed. Stopping monitoring.");
            *active = false;
            self.inner.monitor.stop_monitoring();
        }
    }

    pub fn update_data(&self, camera_ids: Vec<CameraId>) {
        self.inner.update_state(PresenceSnapshot::Available(camera_ids));
    }

    pub fn update_error(&self, error: CameraError) {
        self.inner.update_state(PresenceSnapshot::Failed(error));
    }

    pub fn snapshot(&self) -> PresenceSnapshot {
        lock(&self.inner.committed).snapshot.clone()
    }

    pub fn is_monitoring(&self) -> bool {
        *lock(&self.inner.active)
    }

    pub fn observer_count(&self) -> usize {
        read(&self.inner.observers).len()
    }

    /// Query the monitor and commit the result, blocking the caller.
    pub fn refresh(&self) -> Result<Vec<CameraId>, CameraError> {
        refresh_inner(&self.inner)
    }

    /// Force a refresh from the monitor on Tokio's blocking pool. Resolves
    /// once the new snapshot has been committed.
    pub async fn fetch_data(&self) -> Result<Vec<CameraId>, CameraError> {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || refresh_inner(&inner))
            .await
            .map_err(|e| CameraError::TaskFailed(format!("Presence refresh task failed: {}", e)))?
    }
}

fn refresh_inner(inner: &SourceInner) -> Result<Vec<CameraId>, CameraError> {
    match inner.monitor.fetch() {
        Ok(camera_ids) => {
            inner.update_state(PresenceSnapshot::Available(camera_ids.clone()));
            Ok(camera_ids)
        }
        Err(error) => {
            log::warn!("Presence refresh failed: {}", error);
            inner.update_state(PresenceSnapshot::Failed(error.clone()));
            Err(error)
        }
    }
}
