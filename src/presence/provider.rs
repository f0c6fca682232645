//! Transactional fan-out of presence changes
//!
//! [`CameraPresenceProvider`] subscribes to a [`CameraPresenceSource`] and
//! applies each change in a fixed order: the camera factory, then the
//! repository, then every dependent listener. If any step fails the steps
//! that already succeeded are rolled back to the previous id list. Public
//! listeners only hear about changes that committed.
//!
//! While monitoring, the provider also follows the status stream of every
//! present camera. A camera that closes or reports an error makes the
//! provider ask the source for a fresh id list.

use crate::camera::{CameraFactory, CameraPresenceListener};
use crate::errors::CameraError;
use crate::executor::{spawn_detached, Executor};
use crate::lock::{lock, read, write};
use crate::presence::{CameraPresenceSource, PresenceObserver};
use crate::repository::CameraRepository;
use crate::types::{CameraId, CameraStatus};
use futures::future::{abortable, AbortHandle};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use tokio::sync::watch;

/// Public notification of cameras appearing or disappearing.
pub trait CameraPresenceCallback: Send + Sync {
    fn on_cameras_added(&self, camera_ids: &BTreeSet<CameraId>);
    fn on_cameras_removed(&self, camera_ids: &BTreeSet<CameraId>);
}

#[derive(Clone)]
struct CallbackEntry {
    callback: Arc<dyn CameraPresenceCallback>,
    executor: Arc<dyn Executor>,
}

#[derive(Clone)]
struct Wiring {
    source: CameraPresenceSource,
    factory: Arc<dyn CameraFactory>,
    repository: Arc<CameraRepository>,
}

struct ProviderInner {
    executor: Arc<dyn Executor>,
    monitoring: AtomicBool,
    wiring: Mutex<Option<Wiring>>,
    current_ids: Mutex<Vec<CameraId>>,
    dependents: RwLock<Vec<Arc<dyn CameraPresenceListener>>>,
    callbacks: RwLock<Vec<CallbackEntry>>,
    state_watches: Mutex<HashMap<CameraId, AbortHandle>>,
}

/// Orchestrates presence updates across the core components.
pub struct CameraPresenceProvider {
    inner: Arc<ProviderInner>,
    observer: Arc<dyn PresenceObserver>,
}

struct SourceObserver {
    inner: Weak<ProviderInner>,
}

impl PresenceObserver for SourceObserver {
    fn on_new_data(&self, camera_ids: &[CameraId]) {
        if let Some(inner) = self.inner.upgrade() {
            inner.on_source_data(camera_ids);
        }
    }

    fn on_error(&self, error: &CameraError) {
        if let Some(inner) = self.inner.upgrade() {
            inner.on_source_error(error);
        }
    }
}

impl CameraPresenceProvider {
    /// `executor` is where source notifications, transactions and
    /// refreshes run.
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        let inner = Arc::new(ProviderInner {
            executor,
            monitoring: AtomicBool::new(false),
            wiring: Mutex::new(None),
            current_ids: Mutex::new(Vec::new()),
            dependents: RwLock::new(Vec::new()),
            callbacks: RwLock::new(Vec::new()),
            state_watches: Mutex::new(HashMap::new()),
        });
        let observer: Arc<dyn PresenceObserver> = Arc::new(SourceObserver {
            inner: Arc::downgrade(&inner),
        });
        Self { inner, observer }
    }

    /// Start following `source`. Calls after the first are ignored until
    /// [`shutdown`](Self::shutdown).
    pub fn startup(
        &self,
        source: CameraPresenceSource,
        factory: Arc<dyn CameraFactory>,
        repository: Arc<CameraRepository>,
    ) {
        if self
            .inner
            .monitoring
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        log::info!("Starting camera presence provider");

        let seeded = repository.camera_ids();
        let wiring = Wiring {
            source: source.clone(),
            factory,
            repository,
        };
        *lock(&self.inner.current_ids) = seeded.clone();
        *lock(&self.inner.wiring) = Some(wiring.clone());

        for camera_id in &seeded {
            self.inner.watch_camera(&wiring, camera_id);
        }

        source.add_observer(self.inner.executor.clone(), self.observer.clone());
    }

    /// Stop following the source and drop every listener.
    pub fn shutdown(&self) {
        if !self.inner.monitoring.swap(false, Ordering::SeqCst) {
            log::debug!("Shutdown called when not monitoring. Ignoring.");
            return;
        }
        log::info!("Shutting down camera presence provider");

        let wiring = lock(&self.inner.wiring).take();
        if let Some(wiring) = wiring {
            wiring.source.remove_observer(&self.observer);
        }
        self.inner.clear_watches();
        write(&self.inner.dependents).clear();
        write(&self.inner.callbacks).clear();
        lock(&self.inner.current_ids).clear();
    }

    pub fn is_monitoring(&self) -> bool {
        self.inner.monitoring.load(Ordering::SeqCst)
    }

    /// Ids of the last committed update.
    pub fn current_camera_ids(&self) -> Vec<CameraId> {
        lock(&self.inner.current_ids).clone()
    }

    /// Ids of cameras whose status stream is being followed.
    pub fn watched_camera_ids(&self) -> BTreeSet<CameraId> {
        lock(&self.inner.state_watches).keys().cloned().collect()
    }

    pub fn add_dependent_listener(&self, listener: Arc<dyn CameraPresenceListener>) {
        write(&self.inner.dependents).push(listener);
    }

    pub fn remove_dependent_listener(&self, listener: &Arc<dyn CameraPresenceListener>) {
        write(&self.inner.dependents).retain(|l| {
            !std::ptr::eq(Arc::as_ptr(l) as *const (), Arc::as_ptr(listener) as *const ())
        });
    }

    /// Register a public listener. Cameras already present are reported to
    /// it as added right away.
    pub fn add_camera_presence_listener(
        &self,
        callback: Arc<dyn CameraPresenceCallback>,
        executor: Arc<dyn Executor>,
    ) {
        write(&self.inner.callbacks).push(CallbackEntry {
            callback: callback.clone(),
            executor: executor.clone(),
        });

        let current: BTreeSet<CameraId> = lock(&self.inner.current_ids).iter().cloned().collect();
        if current.is_empty() {
            return;
        }
        if let Err(e) = executor.execute(Box::new(move || callback.on_cameras_added(&current))) {
            log::warn!("Unable to notify presence listener: {}", e);
        }
    }

    pub fn remove_camera_presence_listener(&self, callback: &Arc<dyn CameraPresenceCallback>) {
        write(&self.inner.callbacks).retain(|entry| {
            !std::ptr::eq(
                Arc::as_ptr(&entry.callback) as *const (),
                Arc::as_ptr(callback) as *const (),
            )
        });
    }
}

impl Drop for CameraPresenceProvider {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl ProviderInner {
    fn wiring(&self) -> Option<Wiring> {
        if !self.monitoring.load(Ordering::SeqCst) {
            return None;
        }
        lock(&self.wiring).clone()
    }

    fn on_source_data(self: &Arc<Self>, raw_ids: &[CameraId]) {
        let Some(wiring) = self.wiring() else {
            return;
        };

        if let Err(e) = wiring.factory.on_camera_ids_updated(raw_ids) {
            log::error!("Camera factory failed to update. Triggering refresh: {}", e);
            self.request_refresh(&wiring);
            return;
        }

        match wiring.factory.available_camera_ids() {
            Ok(filtered) => self.apply_update(&wiring, filtered),
            Err(e) => {
                log::error!("Camera factory could not list cameras. Triggering refresh: {}", e);
                self.request_refresh(&wiring);
            }
        }
    }

    fn on_source_error(&self, error: &CameraError) {
        let Some(wiring) = self.wiring() else {
            return;
        };
        log::error!("Error from camera presence source. Triggering refresh: {}", error);
        self.request_refresh(&wiring);
    }

    /// Queue a source refresh on the provider's executor.
    fn request_refresh(&self, wiring: &Wiring) {
        let source = wiring.source.clone();
        let queued = self.executor.execute(Box::new(move || {
            if let Err(e) = source.refresh() {
                log::error!("Camera presence refresh failed: {}", e);
            }
        }));
        if let Err(e) = queued {
            log::error!("Unable to schedule camera presence refresh: {}", e);
        }
    }

    fn apply_update(self: &Arc<Self>, wiring: &Wiring, new_ids: Vec<CameraId>) {
        let old_ids = lock(&self.current_ids).clone();
        if new_ids == old_ids {
            return;
        }

        let old_set: BTreeSet<CameraId> = old_ids.iter().cloned().collect();
        let new_set: BTreeSet<CameraId> = new_ids.iter().cloned().collect();
        let added: BTreeSet<CameraId> = new_set.difference(&old_set).cloned().collect();
        let removed: BTreeSet<CameraId> = old_set.difference(&new_set).cloned().collect();

        for camera_id in &removed {
            self.unwatch_camera(camera_id);
        }

        let repository: Arc<dyn CameraPresenceListener> = wiring.repository.clone();
        let mut listeners = vec![repository];
        listeners.extend(read(&self.dependents).iter().cloned());

        let mut updated: Vec<Arc<dyn CameraPresenceListener>> = Vec::new();
        for listener in listeners {
            match listener.on_cameras_updated(&new_ids) {
                Ok(()) => updated.push(listener),
                Err(e) => {
                    log::error!("A core component failed to update. Rolling back: {}", e);
                    for done in updated.iter().rev() {
                        if let Err(rollback) = done.on_cameras_updated(&old_ids) {
                            log::error!("Failed to roll back listener: {}", rollback);
                        }
                    }
                    for camera_id in &removed {
                        self.watch_camera(wiring, camera_id);
                    }
                    for camera_id in &added {
                        self.unwatch_camera(camera_id);
                    }
                    return;
                }
            }
        }

        *lock(&self.current_ids) = new_ids;
        for camera_id in &added {
            self.watch_camera(wiring, camera_id);
        }
        self.notify_callbacks(added, removed);
    }

    /// Follow the status stream of `camera_id`, if its handle has one.
    fn watch_camera(self: &Arc<Self>, wiring: &Wiring, camera_id: &CameraId) {
        if !self.monitoring.load(Ordering::SeqCst) {
            return;
        }
        let camera = match wiring.repository.get_camera(camera_id) {
            Ok(camera) => camera,
            Err(_) => {
                log::warn!("No handle for camera {}. Cannot watch its state.", camera_id);
                return;
            }
        };

        let mut watches = lock(&self.state_watches);
        if watches.contains_key(camera_id) {
            return;
        }
        let Some(updates) = camera.state_updates() else {
            return;
        };
        let (follow, handle) = abortable(follow_camera_status(
            camera_id.clone(),
            updates,
            Arc::downgrade(self),
        ));
        spawn_detached("camgate-camera-state", async move {
            let _ = follow.await;
        });
        watches.insert(camera_id.clone(), handle);
        log::debug!("Watching state of camera {}", camera_id);
    }

    fn unwatch_camera(&self, camera_id: &CameraId) {
        if let Some(handle) = lock(&self.state_watches).remove(camera_id) {
            handle.abort();
            log::debug!("Stopped watching state of camera {}", camera_id);
        }
    }

    fn clear_watches(&self) {
        let watches: Vec<(CameraId, AbortHandle)> = lock(&self.state_watches).drain().collect();
        for (_, handle) in watches {
            handle.abort();
        }
    }

    fn notify_callbacks(&self, added: BTreeSet<CameraId>, removed: BTreeSet<CameraId>) {
        let callbacks = read(&self.callbacks).clone();

        if !added.is_empty() {
            log::info!("Notifying {} cameras added", added.len());
            let added = Arc::new(added);
            for entry in &callbacks {
                let callback = entry.callback.clone();
                let added = added.clone();
                if let Err(e) = entry
                    .executor
                    .execute(Box::new(move || callback.on_cameras_added(&added)))
                {
                    log::warn!("Unable to notify presence listener: {}", e);
                }
            }
        }

        if !removed.is_empty() {
            log::info!("Notifying {} cameras removed", removed.len());
            let removed = Arc::new(removed);
            for entry in &callbacks {
                let callback = entry.callback.clone();
                let removed = removed.clone();
                if let Err(e) = entry
                    .executor
                    .execute(Box::new(move || callback.on_cameras_removed(&removed)))
                {
                    log::warn!("Unable to notify presence listener: {}", e);
                }
            }
        }
    }
}

async fn follow_camera_status(
    camera_id: CameraId,
    mut updates: watch::Receiver<CameraStatus>,
    inner: Weak<ProviderInner>,
) {
    while updates.changed().await.is_ok() {
        let status = updates.borrow_and_update().clone();
        if !status.warrants_refresh() {
            continue;
        }
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let Some(wiring) = inner.wiring() else {
            log::debug!("Ignoring state change of camera {}. Not monitoring.", camera_id);
            continue;
        };
        match &status.error {
            Some(error) => log::warn!(
                "Camera {} changed to {} with error: {}. Triggering refresh.",
                camera_id,
                status.state,
                error
            ),
            None => log::warn!(
                "Camera {} changed to {}. Triggering refresh.",
                camera_id,
                status.state
            ),
        }
        inner.request_refresh(&wiring);
    }
}
