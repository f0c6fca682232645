//! Fake cameras, factories, monitors and executors.

use crate::camera::{CameraFactory, CameraInternal, CameraPresenceListener};
use crate::errors::CameraError;
use crate::executor::{Executor, Task};
use crate::lock::lock;
use crate::presence::{CameraPresenceCallback, PresenceMonitor, PresenceObserver, PresenceUpdater};
use crate::types::{CameraId, CameraState, CameraStatus};
use futures::future::BoxFuture;
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{watch, Semaphore};

/// A camera whose release can optionally be held until
/// [`complete_release`](Self::complete_release) is called.
pub struct FakeCamera {
    camera_id: CameraId,
    releases: AtomicUsize,
    removals: AtomicUsize,
    release_gate: Option<Arc<Semaphore>>,
    status: watch::Sender<CameraStatus>,
}

impl FakeCamera {
    pub fn new(camera_id: impl Into<CameraId>) -> Self {
        Self {
            camera_id: camera_id.into(),
            releases: AtomicUsize::new(0),
            removals: AtomicUsize::new(0),
            release_gate: None,
            status: watch::channel(CameraStatus::new(CameraState::Closed)).0,
        }
    }

    /// A camera whose release future stays pending until completed by hand.
    pub fn with_held_release(camera_id: impl Into<CameraId>) -> Self {
        Self {
            release_gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::new(camera_id)
        }
    }

    pub fn complete_release(&self) {
        if let Some(gate) = &self.release_gate {
            gate.add_permits(1);
        }
    }

    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn removed_count(&self) -> usize {
        self.removals.load(Ordering::SeqCst)
    }

    /// Publish a new status to everyone watching this camera.
    pub fn set_status(&self, status: CameraStatus) {
        self.status.send_replace(status);
    }

    /// How many status streams are currently held open.
    pub fn status_watchers(&self) -> usize {
        self.status.receiver_count()
    }
}

impl CameraInternal for FakeCamera {
    fn camera_id(&self) -> &CameraId {
        &self.camera_id
    }

    fn release(&self) -> BoxFuture<'static, ()> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        let gate = self.release_gate.clone();
        Box::pin(async move {
            if let Some(gate) = gate {
                if let Ok(permit) = gate.acquire().await {
                    permit.forget();
                }
            }
        })
    }

    fn on_removed(&self) {
        self.removals.fetch_add(1, Ordering::SeqCst);
    }

    fn state_updates(&self) -> Option<watch::Receiver<CameraStatus>> {
        Some(self.status.subscribe())
    }
}

#[derive(Default)]
struct FactoryState {
    available: Vec<CameraId>,
    hidden: HashSet<CameraId>,
    failing: HashSet<CameraId>,
    enumeration_error: Option<CameraError>,
    update_error: Option<CameraError>,
    created: Vec<Arc<FakeCamera>>,
}

/// A factory over a mutable list of ids.
#[derive(Default)]
pub struct FakeCameraFactory {
    state: Mutex<FactoryState>,
    hold_releases: AtomicBool,
}

impl FakeCameraFactory {
    pub fn new(camera_ids: &[&str]) -> Self {
        let factory = Self::default();
        lock(&factory.state).available = CameraId::from_strs(camera_ids);
        factory
    }

    pub fn set_available(&self, camera_ids: Vec<CameraId>) {
        lock(&self.state).available = camera_ids;
    }

    /// Drop `camera_id` from what the factory reports as available.
    pub fn hide(&self, camera_id: &CameraId) {
        lock(&self.state).hidden.insert(camera_id.clone());
    }

    pub fn fail_camera(&self, camera_id: &CameraId) {
        lock(&self.state).failing.insert(camera_id.clone());
    }

    pub fn fail_enumeration(&self, error: CameraError) {
        lock(&self.state).enumeration_error = Some(error);
    }

    pub fn fail_ids_update(&self, error: Option<CameraError>) {
        lock(&self.state).update_error = error;
    }

    /// Cameras created from now on hold their release until completed.
    pub fn hold_releases(&self, hold: bool) {
        self.hold_releases.store(hold, Ordering::SeqCst);
    }

    /// The most recently created camera for `camera_id`.
    pub fn camera_for(&self, camera_id: &CameraId) -> Option<Arc<FakeCamera>> {
        lock(&self.state)
            .created
            .iter()
            .rev()
            .find(|camera| camera.camera_id() == camera_id)
            .cloned()
    }

    pub fn created_count(&self) -> usize {
        lock(&self.state).created.len()
    }
}

impl CameraFactory for FakeCameraFactory {
    fn available_camera_ids(&self) -> Result<Vec<CameraId>, CameraError> {
        let state = lock(&self.state);
        if let Some(error) = &state.enumeration_error {
            return Err(error.clone());
        }
        Ok(state
            .available
            .iter()
            .filter(|id| !state.hidden.contains(*id))
            .cloned()
            .collect())
    }

    fn camera(&self, camera_id: &CameraId) -> Result<Arc<dyn CameraInternal>, CameraError> {
        let mut state = lock(&self.state);
        if state.failing.contains(camera_id) {
            return Err(CameraError::CameraUnavailable(camera_id.to_string()));
        }
        let camera = if self.hold_releases.load(Ordering::SeqCst) {
            Arc::new(FakeCamera::with_held_release(camera_id.clone()))
        } else {
            Arc::new(FakeCamera::new(camera_id.clone()))
        };
        state.created.push(camera.clone());
        let handle: Arc<dyn CameraInternal> = camera;
        Ok(handle)
    }

    fn on_camera_ids_updated(&self, camera_ids: &[CameraId]) -> Result<(), CameraError> {
        let mut state = lock(&self.state);
        if let Some(error) = &state.update_error {
            return Err(error.clone());
        }
        state.available = camera_ids.to_vec();
        Ok(())
    }
}

#[derive(Default)]
struct MonitorState {
    fetch_result: Option<Result<Vec<CameraId>, CameraError>>,
    updater: Option<PresenceUpdater>,
    starts: usize,
    stops: usize,
    fetches: usize,
}

/// A presence monitor driven by hand. Clones share state.
#[derive(Clone, Default)]
pub struct FakePresenceMonitor {
    state: Arc<Mutex<MonitorState>>,
}

impl FakePresenceMonitor {
    pub fn new(fetch_result: Result<Vec<CameraId>, CameraError>) -> Self {
        let monitor = Self::default();
        lock(&monitor.state).fetch_result = Some(fetch_result);
        monitor
    }

    pub fn set_fetch_result(&self, fetch_result: Result<Vec<CameraId>, CameraError>) {
        lock(&self.state).fetch_result = Some(fetch_result);
    }

    /// Publish ids as if the hardware reported them. No-op while stopped.
    pub fn push_data(&self, camera_ids: Vec<CameraId>) {
        let updater = lock(&self.state).updater.clone();
        if let Some(updater) = updater {
            updater.update_data(camera_ids);
        }
    }

    pub fn push_error(&self, error: CameraError) {
        let updater = lock(&self.state).updater.clone();
        if let Some(updater) = updater {
            updater.update_error(error);
        }
    }

    pub fn start_count(&self) -> usize {
        lock(&self.state).starts
    }

    pub fn stop_count(&self) -> usize {
        lock(&self.state).stops
    }

    pub fn fetch_count(&self) -> usize {
        lock(&self.state).fetches
    }
}

impl PresenceMonitor for FakePresenceMonitor {
    fn start_monitoring(&self, updater: PresenceUpdater) {
        let mut state = lock(&self.state);
        state.starts += 1;
        state.updater = Some(updater);
    }

    fn stop_monitoring(&self) {
        let mut state = lock(&self.state);
        state.stops += 1;
        state.updater = None;
    }

    fn fetch(&self) -> Result<Vec<CameraId>, CameraError> {
        let mut state = lock(&self.state);
        state.fetches += 1;
        state.fetch_result.clone().unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// What a [`RecordingObserver`] saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceEvent {
    Data(Vec<CameraId>),
    Error(CameraError),
}

/// Records every presence notification in order.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<PresenceEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PresenceEvent> {
        lock(&self.events).clone()
    }
}

impl PresenceObserver for RecordingObserver {
    fn on_new_data(&self, camera_ids: &[CameraId]) {
        lock(&self.events).push(PresenceEvent::Data(camera_ids.to_vec()));
    }

    fn on_error(&self, error: &CameraError) {
        lock(&self.events).push(PresenceEvent::Error(error.clone()));
    }
}

/// A presence listener that records updates and can be told to fail.
#[derive(Default)]
pub struct RecordingListener {
    updates: Mutex<Vec<Vec<CameraId>>>,
    fail_on: Mutex<Option<Vec<CameraId>>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail whenever asked to apply exactly `camera_ids`.
    pub fn fail_on(&self, camera_ids: Vec<CameraId>) {
        *lock(&self.fail_on) = Some(camera_ids);
    }

    pub fn updates(&self) -> Vec<Vec<CameraId>> {
        lock(&self.updates).clone()
    }
}

impl CameraPresenceListener for RecordingListener {
    fn on_cameras_updated(&self, camera_ids: &[CameraId]) -> Result<(), CameraError> {
        if lock(&self.fail_on).as_deref() == Some(camera_ids) {
            return Err(CameraError::CameraUnavailable(format!(
                "listener refused {:?}",
                camera_ids
            )));
        }
        lock(&self.updates).push(camera_ids.to_vec());
        Ok(())
    }
}

/// Records public added/removed notifications.
#[derive(Default)]
pub struct RecordingPresenceCallback {
    added: Mutex<Vec<BTreeSet<CameraId>>>,
    removed: Mutex<Vec<BTreeSet<CameraId>>>,
}

impl RecordingPresenceCallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn added(&self) -> Vec<BTreeSet<CameraId>> {
        lock(&self.added).clone()
    }

    pub fn removed(&self) -> Vec<BTreeSet<CameraId>> {
        lock(&self.removed).clone()
    }
}

impl CameraPresenceCallback for RecordingPresenceCallback {
    fn on_cameras_added(&self, camera_ids: &BTreeSet<CameraId>) {
        lock(&self.added).push(camera_ids.clone());
    }

    fn on_cameras_removed(&self, camera_ids: &BTreeSet<CameraId>) {
        lock(&self.removed).push(camera_ids.clone());
    }
}

/// Queues tasks until [`run_all`](Self::run_all) is called.
#[derive(Default)]
pub struct ManualExecutor {
    queue: Mutex<VecDeque<Task>>,
}

impl ManualExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        lock(&self.queue).len()
    }

    /// Run queued tasks, including any they enqueue. Returns how many ran.
    pub fn run_all(&self) -> usize {
        let mut ran = 0;
        loop {
            let task = lock(&self.queue).pop_front();
            match task {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }
}

impl Executor for ManualExecutor {
    fn execute(&self, task: Task) -> Result<(), CameraError> {
        lock(&self.queue).push_back(task);
        Ok(())
    }
}

/// An executor that refuses every task, like one that has shut down.
#[derive(Debug, Default, Clone, Copy)]
pub struct RejectingExecutor;

impl Executor for RejectingExecutor {
    fn execute(&self, _task: Task) -> Result<(), CameraError> {
        Err(CameraError::ExecutionRejected("executor is shut down".to_string()))
    }
}
