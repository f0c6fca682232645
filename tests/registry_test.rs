//! Admission control scenarios across the coordinator and state registry.

use camgate::config::RegistryConfig;
use camgate::executor::{DirectExecutor, Executor, SerialExecutor};
use camgate::testing::ManualExecutor;
use camgate::{
    CameraCoordinator, CameraId, CameraState, CameraStateRegistry, OperatingMode,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn id(raw: &str) -> CameraId {
    CameraId::new(raw)
}

fn setup(pairs: Vec<[CameraId; 2]>) -> (Arc<CameraCoordinator>, Arc<CameraStateRegistry>) {
    let coordinator = Arc::new(CameraCoordinator::new(pairs));
    let registry = Arc::new(CameraStateRegistry::new(
        coordinator.clone(),
        RegistryConfig::default(),
    ));
    coordinator.add_listener(registry.clone());
    (coordinator, registry)
}

fn register_counting(
    registry: &CameraStateRegistry,
    camera_id: &str,
    executor: Arc<dyn Executor>,
) -> Arc<AtomicUsize> {
    let opens = Arc::new(AtomicUsize::new(0));
    let counter = opens.clone();
    registry.register_camera(
        id(camera_id),
        executor,
        Arc::new(|| {}),
        Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );
    opens
}

#[test]
fn test_capacity_one_scenario() {
    let (_coordinator, registry) = setup(Vec::new());
    let _a = register_counting(&registry, "A", Arc::new(DirectExecutor));
    let b = register_counting(&registry, "B", Arc::new(DirectExecutor));

    assert!(registry.try_open_camera(&id("A")));
    assert!(!registry.try_open_camera(&id("B")));
    registry.mark_camera_state(&id("B"), CameraState::PendingOpen);

    registry.mark_camera_state(&id("A"), CameraState::Released);
    assert_eq!(b.load(Ordering::SeqCst), 1);
}

#[test]
fn test_all_pending_cameras_wake_when_slot_frees() {
    let (_coordinator, registry) = setup(Vec::new());
    let _a = register_counting(&registry, "A", Arc::new(DirectExecutor));
    let b = register_counting(&registry, "B", Arc::new(DirectExecutor));
    let c = register_counting(&registry, "C", Arc::new(DirectExecutor));

    assert!(registry.try_open_camera(&id("A")));
    registry.mark_camera_state(&id("A"), CameraState::Open);
    registry.mark_camera_state(&id("B"), CameraState::PendingOpen);
    registry.mark_camera_state(&id("C"), CameraState::PendingOpen);
    assert_eq!(b.load(Ordering::SeqCst), 0);
    assert_eq!(c.load(Ordering::SeqCst), 0);

    registry.mark_camera_state(&id("A"), CameraState::Closing);
    assert_eq!(b.load(Ordering::SeqCst), 0);
    registry.mark_camera_state(&id("A"), CameraState::Closed);
    assert_eq!(b.load(Ordering::SeqCst), 1);
    assert_eq!(c.load(Ordering::SeqCst), 1);

    // Only one of them wins the slot.
    assert!(registry.try_open_camera(&id("B")));
    assert!(!registry.try_open_camera(&id("C")));
}

#[test]
fn test_concurrent_mode_admits_two() {
    let (coordinator, registry) = setup(vec![[id("X"), id("Y")]]);
    coordinator.set_camera_operating_mode(OperatingMode::Concurrent);
    for raw in ["X", "Y", "Z"] {
        register_counting(&registry, raw, Arc::new(DirectExecutor));
    }

    assert!(registry.try_open_camera(&id("X")));
    assert!(registry.try_open_camera(&id("Y")));
    assert!(!registry.try_open_camera(&id("Z")));
    assert_eq!(registry.available_cameras(), 0);
}

#[test]
fn test_paired_cameras_rendezvous() {
    let (coordinator, registry) = setup(vec![[id("X"), id("Y")]]);
    coordinator.set_camera_operating_mode(OperatingMode::Concurrent);
    coordinator.set_active_concurrent_cameras(vec![id("X"), id("Y")]);

    let configures = Arc::new(Mutex::new(Vec::new()));
    for raw in ["X", "Y"] {
        let log = configures.clone();
        registry.register_camera(
            id(raw),
            Arc::new(DirectExecutor),
            Arc::new(move || log.lock().unwrap().push(raw)),
            Arc::new(|| {}),
        );
        assert!(registry.try_open_camera(&id(raw)));
    }

    registry.mark_camera_state(&id("X"), CameraState::Open);
    assert!(!registry.try_open_capture_session(&id("X"), Some(&id("Y"))));

    registry.mark_camera_state(&id("Y"), CameraState::Open);
    assert!(registry.try_open_capture_session(&id("X"), Some(&id("Y"))));

    registry.mark_camera_state(&id("X"), CameraState::Configured);
    assert_eq!(*configures.lock().unwrap(), vec!["Y"]);
    registry.mark_camera_state(&id("Y"), CameraState::Configured);
    assert_eq!(*configures.lock().unwrap(), vec!["Y", "X"]);
}

#[test]
fn test_notifications_are_dispatched_outside_the_lock() {
    let (_coordinator, registry) = setup(Vec::new());
    let executor = Arc::new(ManualExecutor::new());
    let reentered = Arc::new(AtomicUsize::new(0));

    let registry_for_callback = Arc::downgrade(&registry);
    let seen = reentered.clone();
    registry.register_camera(
        id("A"),
        executor.clone(),
        Arc::new(|| {}),
        Arc::new(move || {
            if let Some(registry) = registry_for_callback.upgrade() {
                if registry.try_open_camera(&CameraId::new("A")) {
                    seen.fetch_add(1, Ordering::SeqCst);
                }
            }
        }),
    );

    registry.mark_camera_state(&id("A"), CameraState::PendingOpen);
    assert_eq!(executor.run_all(), 1);
    assert_eq!(reentered.load(Ordering::SeqCst), 1);
    assert_eq!(registry.camera_state(&id("A")), Some(CameraState::Opening));
}

#[test]
fn test_serial_executor_delivers_notifications() {
    let (_coordinator, registry) = setup(Vec::new());
    let executor = Arc::new(SerialExecutor::new("registry-test").unwrap());
    let opens = register_counting(&registry, "A", executor.clone());

    registry.mark_camera_state(&id("A"), CameraState::PendingOpen);
    executor.shutdown();
    executor.join();
    assert_eq!(opens.load(Ordering::SeqCst), 1);

    // A shut down executor rejects, the ledger is unaffected.
    registry.mark_camera_state(&id("A"), CameraState::Closed);
    registry.mark_camera_state(&id("A"), CameraState::PendingOpen);
    std::thread::sleep(Duration::from_millis(10));
    assert_eq!(opens.load(Ordering::SeqCst), 1);
    assert_eq!(registry.camera_state(&id("A")), Some(CameraState::PendingOpen));
}

#[test]
fn test_concurrent_threads_never_exceed_capacity() {
    let (_coordinator, registry) = setup(Vec::new());
    let open_now = Arc::new(AtomicUsize::new(0));
    let max_seen = Arc::new(AtomicUsize::new(0));

    for i in 0..8 {
        register_counting(&registry, &i.to_string(), Arc::new(DirectExecutor));
    }

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let registry = registry.clone();
            let open_now = open_now.clone();
            let max_seen = max_seen.clone();
            std::thread::spawn(move || {
                let camera_id = CameraId::new(i.to_string());
                for _ in 0..50 {
                    if registry.try_open_camera(&camera_id) {
                        let now = open_now.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        registry.mark_camera_state(&camera_id, CameraState::Open);
                        open_now.fetch_sub(1, Ordering::SeqCst);
                        registry.mark_camera_state(&camera_id, CameraState::Closed);
                    } else {
                        std::thread::yield_now();
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    assert_eq!(registry.available_cameras(), 1);
}
