//! Camera admission control
//!
//! [`CameraStateRegistry`] is a shared ledger of how many cameras hold an
//! open slot. Cameras ask it for permission before opening, report every
//! lifecycle transition back to it, and get called back when a slot frees
//! up while they wait in [`CameraState::PendingOpen`].
//!
//! The number of slots is one in single mode and two in concurrent mode
//! (both configurable through [`RegistryConfig`]).

use crate::assert_invariant;
use crate::config::RegistryConfig;
use crate::coordinator::{ConcurrentModeListener, OperatingModeSource};
use crate::executor::Executor;
use crate::lock::lock;
use crate::types::{CameraId, CameraState, OperatingMode};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex};

/// Called when a pending camera may retry [`CameraStateRegistry::try_open_camera`].
pub trait OnOpenAvailableListener: Send + Sync {
    fn on_open_available(&self);
}

/// Called when the paired camera of a concurrent session became configured.
pub trait OnConfigureAvailableListener: Send + Sync {
    fn on_configure_available(&self);
}

impl<F> OnOpenAvailableListener for F
where
    F: Fn() + Send + Sync,
{
    fn on_open_available(&self) {
        self()
    }
}

impl<F> OnConfigureAvailableListener for F
where
    F: Fn() + Send + Sync,
{
    fn on_configure_available(&self) {
        self()
    }
}

#[derive(Clone)]
struct Registration {
    state: Option<CameraState>,
    executor: Arc<dyn Executor>,
    on_configure_available: Arc<dyn OnConfigureAvailableListener>,
    on_open_available: Arc<dyn OnOpenAvailableListener>,
}

impl Registration {
    fn holds_camera_slot(&self) -> bool {
        self.state.is_some_and(CameraState::holds_camera_slot)
    }

    fn notify_open_available(&self, camera_id: &CameraId) {
        let listener = self.on_open_available.clone();
        if let Err(e) = self
            .executor
            .execute(Box::new(move || listener.on_open_available()))
        {
            log::error!("Unable to notify camera {} to open: {}", camera_id, e);
        }
    }

    fn notify_configure_available(&self, camera_id: &CameraId) {
        let listener = self.on_configure_available.clone();
        if let Err(e) = self
            .executor
            .execute(Box::new(move || listener.on_configure_available()))
        {
            log::error!("Unable to notify camera {} to configure: {}", camera_id, e);
        }
    }
}

struct RegistryState {
    max_allowed_open_cameras: usize,
    available_cameras: usize,
    cameras: BTreeMap<CameraId, Registration>,
}

impl RegistryState {
    fn recalculate_available_cameras(&mut self) {
        let debug = log::log_enabled!(log::Level::Debug);
        let mut table = String::new();
        if debug {
            table.push_str("Recalculating open cameras:\n");
            let _ = writeln!(table, "{:<45}{:<22}", "Camera", "State");
            table.push_str(&"-".repeat(67));
            table.push('\n');
        }

        let mut open_count = 0;
        for (camera_id, registration) in &self.cameras {
            if debug {
                let state = registration.state.map_or("UNKNOWN", CameraState::as_str);
                let _ = writeln!(table, "{:<45}{:<22}", camera_id.as_str(), state);
            }
            if registration.holds_camera_slot() {
                open_count += 1;
            }
        }

        if debug {
            table.push_str(&"-".repeat(67));
            table.push('\n');
            let _ = write!(
                table,
                "Open count: {} (Max allowed: {})",
                open_count, self.max_allowed_open_cameras
            );
            log::debug!("{}", table);
        }

        self.available_cameras = self.max_allowed_open_cameras.saturating_sub(open_count);
    }

    fn unregister_camera(&mut self, camera_id: &CameraId) -> Option<CameraState> {
        let registration = self.cameras.remove(camera_id)?;
        self.recalculate_available_cameras();
        registration.state
    }

    fn update_and_verify_state(
        &mut self,
        camera_id: &CameraId,
        state: CameraState,
    ) -> Option<CameraState> {
        let registration = self.cameras.get_mut(camera_id);
        assert_invariant!(
            registration.is_some(),
            "Cannot update state of a camera which has not been registered",
            "CameraStateRegistry::mark_camera_state"
        );
        let Some(registration) = registration else {
            return None;
        };

        if state == CameraState::Opening {
            assert_invariant!(
                registration.holds_camera_slot(),
                "Cannot mark camera as opening until it was granted a slot by try_open_camera",
                "CameraStateRegistry::mark_camera_state"
            );
        }

        let previous = registration.state.replace(state);
        if previous != Some(state) {
            self.recalculate_available_cameras();
        }
        previous
    }
}

/// Slot ledger shared by every camera in the process.
pub struct CameraStateRegistry {
    mode_source: Arc<dyn OperatingModeSource>,
    limits: RegistryConfig,
    state: Mutex<RegistryState>,
}

impl CameraStateRegistry {
    pub fn new(mode_source: Arc<dyn OperatingModeSource>, limits: RegistryConfig) -> Self {
        let max_allowed_open_cameras = if mode_source.camera_operating_mode().is_concurrent() {
            limits.max_open_cameras_concurrent
        } else {
            limits.max_open_cameras_single
        };
        Self {
            mode_source,
            limits,
            state: Mutex::new(RegistryState {
                max_allowed_open_cameras,
                available_cameras: max_allowed_open_cameras,
                cameras: BTreeMap::new(),
            }),
        }
    }

    /// Start tracking `camera_id`. Its notifications are delivered on
    /// `executor`.
    ///
    /// # Panics
    /// Panics if the camera is already registered.
    pub fn register_camera(
        &self,
        camera_id: CameraId,
        executor: Arc<dyn Executor>,
        on_configure_available: Arc<dyn OnConfigureAvailableListener>,
        on_open_available: Arc<dyn OnOpenAvailableListener>,
    ) {
        let mut state = lock(&self.state);
        assert_invariant!(
            !state.cameras.contains_key(&camera_id),
            "Camera is already registered",
            "CameraStateRegistry::register_camera"
        );
        state.cameras.insert(
            camera_id,
            Registration {
                state: None,
                executor,
                on_configure_available,
                on_open_available,
            },
        );
    }

    /// Ask for an open slot. On success the camera is moved to
    /// [`CameraState::Opening`]. A camera that already holds a slot is
    /// always admitted.
    ///
    /// # Panics
    /// Panics if the camera is not registered.
    pub fn try_open_camera(&self, camera_id: &CameraId) -> bool {
        let mut state = lock(&self.state);
        let available = state.available_cameras;
        let registration = state.cameras.get_mut(camera_id);
        assert_invariant!(
            registration.is_some(),
            "Camera must first be registered with register_camera",
            "CameraStateRegistry::try_open_camera"
        );
        let Some(registration) = registration else {
            return false;
        };

        let already_open = registration.holds_camera_slot();
        let previous = registration.state;
        let success = available > 0 || already_open;
        if success {
            registration.state = Some(CameraState::Opening);
        }

        log::debug!(
            "try_open_camera({}) [Available cameras: {}, Already open: {} (Previous state: {})] --> {}",
            camera_id,
            available,
            already_open,
            previous.map_or("UNKNOWN", CameraState::as_str),
            if success { "SUCCESS" } else { "FAIL" }
        );

        if success {
            state.recalculate_available_cameras();
        }
        success
    }

    /// Rendezvous gate for concurrent capture sessions. Outside concurrent
    /// mode this always allows. In concurrent mode both cameras must be
    /// open or configured.
    pub fn try_open_capture_session(
        &self,
        camera_id: &CameraId,
        paired_camera_id: Option<&CameraId>,
    ) -> bool {
        let state = lock(&self.state);
        if !self.mode_source.camera_operating_mode().is_concurrent() {
            return true;
        }

        let ready = |id: &CameraId| {
            matches!(
                state.cameras.get(id).and_then(|r| r.state),
                Some(CameraState::Open) | Some(CameraState::Configured)
            )
        };
        ready(camera_id) && paired_camera_id.is_some_and(ready)
    }

    pub fn mark_camera_state(&self, camera_id: &CameraId, state: CameraState) {
        self.mark_camera_state_with_notify(camera_id, state, true);
    }

    /// Record a lifecycle transition. [`CameraState::Released`] removes the
    /// registration; releasing an unknown camera does nothing.
    ///
    /// With `notify_immediately` unset the calling camera is left out of any
    /// open-available notifications this transition triggers.
    ///
    /// # Panics
    /// Panics if the camera is not registered (for states other than
    /// released), or if it is marked opening without holding a slot.
    pub fn mark_camera_state_with_notify(
        &self,
        camera_id: &CameraId,
        new_state: CameraState,
        notify_immediately: bool,
    ) {
        let mut to_notify_open: Vec<(CameraId, Registration)> = Vec::new();
        let mut to_notify_configure: Option<(CameraId, Registration)> = None;

        {
            let mut state = lock(&self.state);
            let previous_available = state.available_cameras;
            let previous_state = if new_state == CameraState::Released {
                state.unregister_camera(camera_id)
            } else {
                state.update_and_verify_state(camera_id, new_state)
            };

            if previous_state == Some(new_state) {
                return;
            }

            if new_state == CameraState::Configured
                && self.mode_source.camera_operating_mode() == OperatingMode::Concurrent
            {
                if let Some(paired_id) = self.mode_source.paired_concurrent_camera_id(camera_id) {
                    to_notify_configure = state
                        .cameras
                        .get(&paired_id)
                        .map(|registration| (paired_id.clone(), registration.clone()));
                }
            }

            if previous_available < 1 && state.available_cameras > 0 {
                to_notify_open = state
                    .cameras
                    .iter()
                    .filter(|(_, r)| r.state == Some(CameraState::PendingOpen))
                    .map(|(id, r)| (id.clone(), r.clone()))
                    .collect();
            } else if new_state == CameraState::PendingOpen && state.available_cameras > 0 {
                if let Some(registration) = state.cameras.get(camera_id) {
                    to_notify_open.push((camera_id.clone(), registration.clone()));
                }
            }

            if !notify_immediately {
                to_notify_open.retain(|(id, _)| id != camera_id);
            }
        }

        for (id, registration) in &to_notify_open {
            registration.notify_open_available(id);
        }
        if let Some((id, registration)) = &to_notify_configure {
            registration.notify_configure_available(id);
        }
    }

    /// True if any registered camera is closing.
    pub fn is_camera_closing(&self) -> bool {
        lock(&self.state)
            .cameras
            .values()
            .any(|r| r.state == Some(CameraState::Closing))
    }

    pub fn available_cameras(&self) -> usize {
        lock(&self.state).available_cameras
    }

    pub fn max_allowed_open_cameras(&self) -> usize {
        lock(&self.state).max_allowed_open_cameras
    }

    /// `None` for unknown cameras and for cameras that never reported a state.
    pub fn camera_state(&self, camera_id: &CameraId) -> Option<CameraState> {
        lock(&self.state).cameras.get(camera_id).and_then(|r| r.state)
    }

    pub fn registered_camera_count(&self) -> usize {
        lock(&self.state).cameras.len()
    }
}

impl ConcurrentModeListener for CameraStateRegistry {
    fn on_camera_operating_mode_updated(&self, prev: OperatingMode, curr: OperatingMode) {
        let mut state = lock(&self.state);
        state.max_allowed_open_cameras = if curr.is_concurrent() {
            self.limits.max_open_cameras_concurrent
        } else {
            self.limits.max_open_cameras_single
        };
        if prev.is_concurrent() != curr.is_concurrent() {
            state.recalculate_available_cameras();
        }
    }
}
