//! Presence monitoring by polling
//!
//! Periodically enumerates a [`CameraFactory`] and publishes the result to
//! a presence source, detecting cameras that were connected or removed
//! since the last scan.

use crate::camera::CameraFactory;
use crate::errors::CameraError;
use crate::lock::lock;
use crate::presence::{PresenceMonitor, PresenceUpdater};
use crate::types::CameraId;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Presence monitor that rescans the factory on a fixed interval.
pub struct PollingPresenceMonitor {
    factory: Arc<dyn CameraFactory>,
    poll_interval: Duration,
    handle: Handle,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PollingPresenceMonitor {
    pub fn new(factory: Arc<dyn CameraFactory>, poll_interval: Duration, handle: Handle) -> Self {
        Self {
            factory,
            poll_interval,
            handle,
            task: Mutex::new(None),
        }
    }

    pub fn is_polling(&self) -> bool {
        lock(&self.task).is_some()
    }
}

impl PresenceMonitor for PollingPresenceMonitor {
    fn start_monitoring(&self, updater: PresenceUpdater) {
        let mut task = lock(&self.task);
        if task.is_some() {
            return;
        }

        log::info!(
            "Starting presence polling every {}ms",
            self.poll_interval.as_millis()
        );

        let factory = self.factory.clone();
        let poll_interval = self.poll_interval;
        *task = Some(self.handle.spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut last_seen: Option<Vec<CameraId>> = None;

            loop {
                ticker.tick().await;

                let scan = {
                    let factory = factory.clone();
                    tokio::task::spawn_blocking(move || factory.available_camera_ids()).await
                };

                match scan {
                    Ok(Ok(camera_ids)) => {
                        if let Some(previous) = &last_seen {
                            log_changes(previous, &camera_ids);
                        }
                        last_seen = Some(camera_ids.clone());
                        updater.update_data(camera_ids);
                    }
                    Ok(Err(e)) => {
                        log::warn!("Camera scan failed: {}", e);
                        last_seen = None;
                        updater.update_error(e);
                    }
                    Err(e) => {
                        log::error!("Camera scan task failed: {}", e);
                        updater.update_error(CameraError::TaskFailed(e.to_string()));
                    }
                }
            }
        }));
    }

    fn stop_monitoring(&self) {
        if let Some(task) = lock(&self.task).take() {
            log::info!("Stopping presence polling");
            task.abort();
        }
    }

    fn fetch(&self) -> Result<Vec<CameraId>, CameraError> {
        self.factory.available_camera_ids()
    }
}

impl Drop for PollingPresenceMonitor {
    fn drop(&mut self) {
        self.stop_monitoring();
    }
}

fn log_changes(previous: &[CameraId], current: &[CameraId]) {
    for id in previous {
        if !current.contains(id) {
            log::info!("Camera disconnected: {}", id);
        }
    }
    for id in current {
        if !previous.contains(id) {
            log::info!("Camera connected: {}", id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::DirectExecutor;
    use crate::presence::CameraPresenceSource;
    use crate::testing::{FakeCameraFactory, RecordingObserver};

    #[tokio::test(flavor = "multi_thread")]
    async fn test_polling_publishes_scans() {
        let factory = Arc::new(FakeCameraFactory::new(&["0"]));
        let monitor = PollingPresenceMonitor::new(
            factory.clone(),
            Duration::from_millis(10),
            Handle::current(),
        );
        let source = CameraPresenceSource::new(monitor);
        let observer = Arc::new(RecordingObserver::new());
        source.add_observer(Arc::new(DirectExecutor), observer.clone());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(source.snapshot().camera_ids(), CameraId::from_strs(&["0"]).as_slice());

        factory.set_available(CameraId::from_strs(&["0", "1"]));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(
            source.snapshot().camera_ids(),
            CameraId::from_strs(&["0", "1"]).as_slice()
        );
    }

    #[tokio::test]
    async fn test_stop_aborts_polling() {
        let factory = Arc::new(FakeCameraFactory::new(&["0"]));
        let monitor =
            PollingPresenceMonitor::new(factory, Duration::from_millis(50), Handle::current());
        let source = CameraPresenceSource::new(AssertingMonitor(monitor));
        let observer: Arc<dyn crate::presence::PresenceObserver> =
            Arc::new(RecordingObserver::new());

        source.add_observer(Arc::new(DirectExecutor), observer.clone());
        assert!(source.is_monitoring());
        source.remove_observer(&observer);
        assert!(!source.is_monitoring());
    }

    #[test]
    fn test_fetch_enumerates_factory() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let factory = Arc::new(FakeCameraFactory::new(&["3", "4"]));
        let monitor =
            PollingPresenceMonitor::new(factory, Duration::from_secs(1), runtime.handle().clone());
        assert_eq!(monitor.fetch().unwrap(), CameraId::from_strs(&["3", "4"]));
        assert!(!monitor.is_polling());
    }

    struct AssertingMonitor(PollingPresenceMonitor);

    impl PresenceMonitor for AssertingMonitor {
        fn start_monitoring(&self, updater: PresenceUpdater) {
            self.0.start_monitoring(updater);
            assert!(self.0.is_polling());
        }

        fn stop_monitoring(&self) {
            self.0.stop_monitoring();
            assert!(!self.0.is_polling());
        }

        fn fetch(&self) -> Result<Vec<CameraId>, CameraError> {
            self.0.fetch()
        }
    }
}
