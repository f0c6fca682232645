//! Camera repository
//!
//! Owns the map from [`CameraId`] to camera handle and reconciles it against
//! presence updates. Handles for ids that survive an update are kept as-is;
//! only genuinely new ids get a fresh handle from the factory.

use crate::camera::{same_camera, CameraFactory, CameraInternal, CameraPresenceListener};
use crate::errors::CameraError;
use crate::executor::spawn_detached;
use crate::lock::lock;
use crate::types::CameraId;
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

struct RepositoryState {
    cameras: Vec<(CameraId, Arc<dyn CameraInternal>)>,
    releasing: Vec<Arc<dyn CameraInternal>>,
    deinit_done: Option<watch::Sender<bool>>,
}

impl RepositoryState {
    fn get(&self, camera_id: &CameraId) -> Option<&Arc<dyn CameraInternal>> {
        self.cameras
            .iter()
            .find(|(id, _)| id == camera_id)
            .map(|(_, camera)| camera)
    }
}

/// A collection of camera handles keyed by id.
pub struct CameraRepository {
    factory: Mutex<Option<Arc<dyn CameraFactory>>>,
    // Serializes init, deinit and reconciliation. Readers only take `state`.
    update_lock: Mutex<()>,
    state: Arc<Mutex<RepositoryState>>,
}

impl CameraRepository {
    pub fn new() -> Self {
        Self {
            factory: Mutex::new(None),
            update_lock: Mutex::new(()),
            state: Arc::new(Mutex::new(RepositoryState {
                cameras: Vec::new(),
                releasing: Vec::new(),
                deinit_done: None,
            })),
        }
    }

    /// Populate the repository with every camera the factory reports.
    ///
    /// A handle already stored under a reported id is replaced and released.
    pub fn init(&self, factory: Arc<dyn CameraFactory>) -> Result<(), CameraError> {
        let _serial = lock(&self.update_lock);
        *lock(&self.factory) = Some(factory.clone());

        let camera_ids = factory.available_camera_ids().map_err(|e| {
            CameraError::InitializationError(format!("Failed to enumerate cameras: {}", e))
        })?;

        let mut created = Vec::with_capacity(camera_ids.len());
        for camera_id in camera_ids {
            match factory.camera(&camera_id) {
                Ok(camera) => created.push((camera_id, camera)),
                Err(e) => {
                    release_unused(created);
                    return Err(CameraError::InitializationError(format!(
                        "Failed to create camera {}: {}",
                        camera_id, e
                    )));
                }
            }
        }

        let mut displaced = Vec::new();
        {
            let mut state = lock(&self.state);
            for (camera_id, camera) in created {
                log::debug!("Added camera: {}", camera_id);
                match state.cameras.iter_mut().find(|(id, _)| *id == camera_id) {
                    Some(slot) => displaced.push(std::mem::replace(&mut slot.1, camera)),
                    None => state.cameras.push((camera_id, camera)),
                }
            }
        }

        for camera in displaced {
            log::debug!("Releasing displaced camera: {}", camera.camera_id());
            spawn_release(camera.release());
        }

        Ok(())
    }

    /// Release every camera and empty the repository.
    ///
    /// The returned future resolves once all outstanding releases are done,
    /// including ones started by earlier `deinit` calls. Dropping it does not
    /// cancel the releases.
    pub fn deinit(&self) -> impl Future<Output = ()> + Send + 'static {
        let _serial = lock(&self.update_lock);
        let mut state = lock(&self.state);

        if state.cameras.is_empty() {
            let pending = state.deinit_done.as_ref().map(|done| done.subscribe());
            return wait_for_release(pending);
        }

        let done = state
            .deinit_done
            .get_or_insert_with(|| watch::channel(false).0)
            .subscribe();

        // Track every camera before starting any release so an inline
        // completion cannot finish the deinit early.
        let cameras: Vec<Arc<dyn CameraInternal>> =
            state.cameras.drain(..).map(|(_, camera)| camera).collect();
        state.releasing.extend(cameras.iter().cloned());
        drop(state);

        log::info!("Releasing {} cameras", cameras.len());
        for camera in cameras {
            let tracker = self.state.clone();
            let release = camera.release();
            spawn_release(async move {
                release.await;
                finish_release(&tracker, &camera);
            });
        }

        wait_for_release(Some(done))
    }

    /// Get the handle for `camera_id`.
    pub fn get_camera(&self, camera_id: &CameraId) -> Result<Arc<dyn CameraInternal>, CameraError> {
        lock(&self.state)
            .get(camera_id)
            .cloned()
            .ok_or_else(|| CameraError::InvalidCamera(camera_id.to_string()))
    }

    /// All handles, in presence order.
    pub fn get_cameras(&self) -> Vec<Arc<dyn CameraInternal>> {
        lock(&self.state)
            .cameras
            .iter()
            .map(|(_, camera)| camera.clone())
            .collect()
    }

    /// All ids, in presence order.
    pub fn camera_ids(&self) -> Vec<CameraId> {
        lock(&self.state)
            .cameras
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Number of cameras whose release has not completed yet.
    pub fn releasing_count(&self) -> usize {
        lock(&self.state).releasing.len()
    }

    fn reconcile(&self, new_camera_ids: &[CameraId]) -> Result<(), CameraError> {
        let _serial = lock(&self.update_lock);
        let factory = lock(&self.factory).clone().ok_or_else(|| {
            CameraError::update(
                "Repository is not initialized",
                CameraError::InitializationError("no camera factory".to_string()),
            )
        })?;

        // Stage 1: build handles for new ids without holding the map lock.
        let to_create: Vec<CameraId> = {
            let state = lock(&self.state);
            let mut seen = HashSet::new();
            new_camera_ids
                .iter()
                .filter(|id| seen.insert((*id).clone()) && state.get(id).is_none())
                .cloned()
                .collect()
        };

        let mut created = Vec::with_capacity(to_create.len());
        for camera_id in to_create {
            match factory.camera(&camera_id) {
                Ok(camera) => created.push((camera_id, camera)),
                Err(e) => {
                    release_unused(created);
                    return Err(CameraError::update("Failed to create camera", e));
                }
            }
        }

        // Stage 2: swap in the new ordered map.
        let removed = {
            let mut state = lock(&self.state);
            let keep: HashSet<&CameraId> = new_camera_ids.iter().collect();
            let removed: Vec<Arc<dyn CameraInternal>> = state
                .cameras
                .iter()
                .filter(|(id, _)| !keep.contains(id))
                .map(|(_, camera)| camera.clone())
                .collect();

            let mut next: Vec<(CameraId, Arc<dyn CameraInternal>)> =
                Vec::with_capacity(new_camera_ids.len());
            for camera_id in new_camera_ids {
                if next.iter().any(|(id, _)| id == camera_id) {
                    continue;
                }
                let camera = match state.get(camera_id) {
                    Some(existing) => existing.clone(),
                    None => match created.iter().find(|(id, _)| id == camera_id) {
                        Some((_, fresh)) => fresh.clone(),
                        None => continue,
                    },
                };
                next.push((camera_id.clone(), camera));
            }

            state.cameras = next;
            removed
        };

        for camera in removed {
            log::info!("Camera removed: {}", camera.camera_id());
            camera.on_removed();
        }

        Ok(())
    }
}

impl Default for CameraRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraPresenceListener for CameraRepository {
    fn on_cameras_updated(&self, camera_ids: &[CameraId]) -> Result<(), CameraError> {
        self.reconcile(camera_ids)
    }
}

fn finish_release(state: &Mutex<RepositoryState>, camera: &Arc<dyn CameraInternal>) {
    let mut state = lock(state);
    if let Some(pos) = state.releasing.iter().position(|c| same_camera(c, camera)) {
        state.releasing.remove(pos);
    }
    if state.releasing.is_empty() {
        if let Some(done) = state.deinit_done.take() {
            log::debug!("All cameras released");
            done.send_replace(true);
        }
    }
}

async fn wait_for_release(done: Option<watch::Receiver<bool>>) {
    if let Some(mut done) = done {
        // A closed channel also means the deinit finished.
        let _ = done.wait_for(|released| *released).await;
    }
}

fn spawn_release<F>(release: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    spawn_detached("camgate-release", release);
}

/// Release handles built for an update that did not commit.
fn release_unused(created: Vec<(CameraId, Arc<dyn CameraInternal>)>) {
    for (camera_id, camera) in created {
        log::debug!("Releasing unused camera: {}", camera_id);
        spawn_release(camera.release());
    }
}
