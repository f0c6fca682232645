//! Core value types shared by the presence, repository and registry layers.

use crate::errors::CameraError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of a camera as reported by the hardware layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CameraId(String);

impl CameraId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert a list of raw ids, preserving order.
    pub fn from_strs<S: AsRef<str>>(ids: &[S]) -> Vec<CameraId> {
        ids.iter().map(|id| CameraId::new(id.as_ref())).collect()
    }
}

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CameraId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for CameraId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Lifecycle state of a camera tracked by the state registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CameraState {
    PendingOpen,
    Opening,
    Open,
    Configured,
    Closing,
    Closed,
    Releasing,
    Released,
}

impl CameraState {
    /// Whether a camera in this state occupies one of the open slots.
    ///
    /// `Closing` and `Releasing` count as open: the device may still be
    /// tearing down and a new open must not be admitted yet.
    pub fn holds_camera_slot(self) -> bool {
        matches!(
            self,
            CameraState::Opening
                | CameraState::Open
                | CameraState::Configured
                | CameraState::Closing
                | CameraState::Releasing
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CameraState::PendingOpen => "PENDING_OPEN",
            CameraState::Opening => "OPENING",
            CameraState::Open => "OPEN",
            CameraState::Configured => "CONFIGURED",
            CameraState::Closing => "CLOSING",
            CameraState::Closed => "CLOSED",
            CameraState::Releasing => "RELEASING",
            CameraState::Released => "RELEASED",
        }
    }
}

impl fmt::Display for CameraState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How many cameras the system is asked to run at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OperatingMode {
    #[default]
    Unspecified,
    Single,
    Concurrent,
}

impl OperatingMode {
    pub fn is_concurrent(self) -> bool {
        self == OperatingMode::Concurrent
    }
}

/// What a camera handle reports about itself, optionally with the error
/// that moved it there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraStatus {
    pub state: CameraState,
    pub error: Option<CameraError>,
}

impl CameraStatus {
    pub fn new(state: CameraState) -> Self {
        Self { state, error: None }
    }

    pub fn with_error(state: CameraState, error: CameraError) -> Self {
        Self {
            state,
            error: Some(error),
        }
    }

    /// A closed or failed camera may have gone away; presence should be
    /// queried again.
    pub fn warrants_refresh(&self) -> bool {
        self.error.is_some() || self.state == CameraState::Closed
    }
}

/// Most recently known presence state: either a list of ids or an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceSnapshot {
    Available(Vec<CameraId>),
    Failed(CameraError),
}

impl PresenceSnapshot {
    /// Ids in the snapshot; empty when the snapshot holds an error.
    pub fn camera_ids(&self) -> &[CameraId] {
        match self {
            PresenceSnapshot::Available(ids) => ids,
            PresenceSnapshot::Failed(_) => &[],
        }
    }

    pub fn error(&self) -> Option<&CameraError> {
        match self {
            PresenceSnapshot::Available(_) => None,
            PresenceSnapshot::Failed(error) => Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, PresenceSnapshot::Failed(_))
    }
}

impl Default for PresenceSnapshot {
    fn default() -> Self {
        PresenceSnapshot::Available(Vec::new())
    }
}
