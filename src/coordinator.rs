//! Concurrent camera coordination
//!
//! Tracks which cameras may stream together, which of them are currently
//! active as a pair, and the global operating mode. Mode changes are pushed
//! to [`ConcurrentModeListener`]s such as the state registry.

use crate::camera::CameraPresenceListener;
use crate::errors::CameraError;
use crate::lock::lock;
use crate::types::{CameraId, OperatingMode};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Read side of the coordinator, as seen by the state registry.
pub trait OperatingModeSource: Send + Sync {
    fn camera_operating_mode(&self) -> OperatingMode;

    /// The partner of `camera_id` that is currently active, if any.
    fn paired_concurrent_camera_id(&self, camera_id: &CameraId) -> Option<CameraId>;
}

/// Notified after the operating mode changes.
pub trait ConcurrentModeListener: Send + Sync {
    fn on_camera_operating_mode_updated(&self, prev: OperatingMode, curr: OperatingMode);
}

#[derive(Default)]
struct CoordinatorState {
    mode: OperatingMode,
    /// Pairs whose cameras are both present, in declaration order.
    pairs: Vec<[CameraId; 2]>,
    partners: BTreeMap<CameraId, Vec<CameraId>>,
    active: Vec<CameraId>,
    listeners: Vec<Arc<dyn ConcurrentModeListener>>,
}

/// Owns the operating mode and the concurrent pairing table.
pub struct CameraCoordinator {
    known_pairs: Vec<[CameraId; 2]>,
    state: Mutex<CoordinatorState>,
}

impl CameraCoordinator {
    /// Until the first presence update every declared pair counts as present.
    pub fn new(concurrent_pairs: Vec<[CameraId; 2]>) -> Self {
        let (pairs, partners) = build_pairs(&concurrent_pairs, None);
        Self {
            known_pairs: concurrent_pairs,
            state: Mutex::new(CoordinatorState {
                pairs,
                partners,
                ..CoordinatorState::default()
            }),
        }
    }

    pub fn set_camera_operating_mode(&self, mode: OperatingMode) {
        let (prev, listeners) = {
            let mut state = lock(&self.state);
            if state.mode == mode {
                return;
            }
            let prev = state.mode;
            state.mode = mode;
            if prev.is_concurrent() && !mode.is_concurrent() {
                state.active.clear();
            }
            (prev, state.listeners.clone())
        };

        log::info!("Camera operating mode changed: {:?} -> {:?}", prev, mode);
        for listener in listeners {
            listener.on_camera_operating_mode_updated(prev, mode);
        }
    }

    pub fn set_active_concurrent_cameras(&self, camera_ids: Vec<CameraId>) {
        lock(&self.state).active = camera_ids;
    }

    pub fn active_concurrent_cameras(&self) -> Vec<CameraId> {
        lock(&self.state).active.clone()
    }

    /// Pairs whose cameras are both currently present.
    pub fn concurrent_camera_pairs(&self) -> Vec<[CameraId; 2]> {
        lock(&self.state).pairs.clone()
    }

    pub fn add_listener(&self, listener: Arc<dyn ConcurrentModeListener>) {
        lock(&self.state).listeners.push(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn ConcurrentModeListener>) {
        lock(&self.state).listeners.retain(|l| {
            !std::ptr::eq(Arc::as_ptr(l) as *const (), Arc::as_ptr(listener) as *const ())
        });
    }

    /// Forget listeners, pairs and active cameras; mode returns to unspecified.
    pub fn shutdown(&self) {
        let mut state = lock(&self.state);
        state.listeners.clear();
        state.pairs.clear();
        state.partners.clear();
        state.active.clear();
        state.mode = OperatingMode::Unspecified;
    }
}

fn build_pairs(
    declared: &[[CameraId; 2]],
    present: Option<&[CameraId]>,
) -> (Vec<[CameraId; 2]>, BTreeMap<CameraId, Vec<CameraId>>) {
    let mut pairs = Vec::new();
    let mut partners: BTreeMap<CameraId, Vec<CameraId>> = BTreeMap::new();

    for [first, second] in declared {
        if first == second || pairs.iter().any(|p: &[CameraId; 2]| same_pair(p, first, second)) {
            continue;
        }
        if let Some(present) = present {
            if !present.contains(first) || !present.contains(second) {
                continue;
            }
        }
        pairs.push([first.clone(), second.clone()]);
        partners.entry(first.clone()).or_default().push(second.clone());
        partners.entry(second.clone()).or_default().push(first.clone());
    }

    (pairs, partners)
}

fn same_pair(pair: &[CameraId; 2], a: &CameraId, b: &CameraId) -> bool {
    (&pair[0] == a && &pair[1] == b) || (&pair[0] == b && &pair[1] == a)
}

impl OperatingModeSource for CameraCoordinator {
    fn camera_operating_mode(&self) -> OperatingMode {
        lock(&self.state).mode
    }

    fn paired_concurrent_camera_id(&self, camera_id: &CameraId) -> Option<CameraId> {
        let state = lock(&self.state);
        state
            .partners
            .get(camera_id)?
            .iter()
            .find(|partner| state.active.contains(partner))
            .cloned()
    }
}

impl CameraPresenceListener for CameraCoordinator {
    fn on_cameras_updated(&self, camera_ids: &[CameraId]) -> Result<(), CameraError> {
        let (pairs, partners) = build_pairs(&self.known_pairs, Some(camera_ids));

        let mut state = lock(&self.state);
        log::debug!("Updated concurrent camera pairs: {:?}", pairs);
        state.pairs = pairs;
        state.partners = partners;
        Ok(())
    }
}
