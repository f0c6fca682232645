//! Camera presence: monitoring, snapshots and transactional fan-out

pub mod polling;
pub mod provider;
pub mod source;

pub use polling::PollingPresenceMonitor;
pub use provider::{CameraPresenceCallback, CameraPresenceProvider};
pub use source::{CameraPresenceSource, PresenceMonitor, PresenceObserver, PresenceUpdater};
