//! Testing utilities for camgate
//!
//! In-memory stand-ins for the hardware layer so the presence, repository
//! and registry code can be exercised without devices.

pub mod fakes;

pub use fakes::{
    FakeCamera, FakeCameraFactory, FakePresenceMonitor, ManualExecutor, PresenceEvent,
    RecordingListener, RecordingObserver, RecordingPresenceCallback, RejectingExecutor,
};
