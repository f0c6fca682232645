//! Camera-facing traits implemented by the hardware layer.

use crate::errors::CameraError;
use crate::types::{CameraId, CameraStatus};
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::watch;

/// Handle to an openable camera device.
pub trait CameraInternal: Send + Sync {
    fn camera_id(&self) -> &CameraId;

    /// Release the device. The future completes once teardown is done.
    fn release(&self) -> BoxFuture<'static, ()>;

    /// Called when the camera disappeared from the presence list.
    fn on_removed(&self);

    /// Stream of the camera's own status, if the backend publishes one.
    fn state_updates(&self) -> Option<watch::Receiver<CameraStatus>> {
        None
    }
}

/// Enumerates cameras and builds handles for them.
pub trait CameraFactory: Send + Sync {
    /// Ids of cameras currently usable by the system.
    fn available_camera_ids(&self) -> Result<Vec<CameraId>, CameraError>;

    /// Build a handle for `camera_id`. May block while the device is probed.
    fn camera(&self, camera_id: &CameraId) -> Result<Arc<dyn CameraInternal>, CameraError>;

    /// Feed raw ids from the presence source. Factories that filter devices
    /// (for example by capability) update what
    /// [`available_camera_ids`](Self::available_camera_ids) returns.
    fn on_camera_ids_updated(&self, _camera_ids: &[CameraId]) -> Result<(), CameraError> {
        Ok(())
    }
}

/// A component that keeps per-camera state in sync with presence.
pub trait CameraPresenceListener: Send + Sync {
    fn on_cameras_updated(&self, camera_ids: &[CameraId]) -> Result<(), CameraError>;
}

/// Whether two handles point at the same camera object.
pub fn same_camera(a: &Arc<dyn CameraInternal>, b: &Arc<dyn CameraInternal>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}
