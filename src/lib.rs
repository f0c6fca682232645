//! camgate: camera presence tracking and open admission control
//!
//! This crate keeps track of which cameras exist and decides which of them
//! may be opened at any moment.
//!
//! # Components
//! - [`CameraPresenceSource`]: latest list of camera ids, fanned out to
//!   observers on their own executors
//! - [`CameraRepository`]: reconciles ids into camera handles, keeping the
//!   handles of cameras that stay present
//! - [`CameraStateRegistry`]: bounds how many cameras hold an open slot and
//!   wakes cameras waiting for one
//! - [`CameraCoordinator`]: operating mode and concurrent camera pairs
//! - [`CameraPresenceProvider`]: applies presence changes as a transaction
//!   across the repository and its dependents
//!
//! # Usage
//! ```rust,ignore
//! use camgate::{CameraCoordinator, CameraStateRegistry, CamgateConfig, CameraId};
//! use camgate::executor::DirectExecutor;
//! use std::sync::Arc;
//!
//! let config = CamgateConfig::load_or_default();
//! let coordinator = Arc::new(CameraCoordinator::new(config.coordinator.concurrent_pairs));
//! let registry = Arc::new(CameraStateRegistry::new(coordinator.clone(), config.registry));
//! coordinator.add_listener(registry.clone());
//!
//! registry.register_camera(
//!     CameraId::new("0"),
//!     Arc::new(DirectExecutor),
//!     Arc::new(|| {}),
//!     Arc::new(|| println!("slot free, retry open")),
//! );
//! assert!(registry.try_open_camera(&CameraId::new("0")));
//! ```
pub mod camera;
pub mod config;
pub mod coordinator;
pub mod errors;
pub mod executor;
pub mod invariant_ppt;
mod lock;
pub mod presence;
pub mod registry;
pub mod repository;
pub mod types;

// Testing utilities - in-memory fakes for offline testing
pub mod testing;

// Re-exports for convenience
pub use camera::{CameraFactory, CameraInternal, CameraPresenceListener};
pub use config::CamgateConfig;
pub use coordinator::{CameraCoordinator, ConcurrentModeListener, OperatingModeSource};
pub use errors::CameraError;
pub use executor::Executor;
pub use presence::{
    CameraPresenceCallback, CameraPresenceProvider, CameraPresenceSource, PollingPresenceMonitor,
    PresenceMonitor, PresenceObserver, PresenceUpdater,
};
pub use registry::{CameraStateRegistry, OnConfigureAvailableListener, OnOpenAvailableListener};
pub use repository::CameraRepository;
pub use types::{CameraId, CameraState, CameraStatus, OperatingMode, PresenceSnapshot};

/// Initialize logging for camgate
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "camgate=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}
