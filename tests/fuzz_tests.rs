//! Fuzz-style tests using proptest
//!
//! Random operation sequences against the registry, presence source and
//! repository. Run with: cargo test --test fuzz_tests

use camgate::config::RegistryConfig;
use camgate::executor::DirectExecutor;
use camgate::testing::{FakeCameraFactory, FakePresenceMonitor, PresenceEvent, RecordingObserver};
use camgate::{
    CameraCoordinator, CameraError, CameraId, CameraPresenceListener, CameraPresenceSource,
    CameraRepository, CameraState, CameraStateRegistry, OperatingMode,
};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

const CAMERAS: [&str; 4] = ["0", "1", "2", "3"];

#[derive(Debug, Clone)]
enum Op {
    TryOpen(usize),
    Mark(usize, CameraState),
}

fn state_strategy() -> impl Strategy<Value = CameraState> {
    prop_oneof![
        Just(CameraState::PendingOpen),
        Just(CameraState::Opening),
        Just(CameraState::Open),
        Just(CameraState::Configured),
        Just(CameraState::Closing),
        Just(CameraState::Closed),
        Just(CameraState::Releasing),
        Just(CameraState::Released),
    ]
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..CAMERAS.len()).prop_map(Op::TryOpen),
        (0..CAMERAS.len(), state_strategy()).prop_map(|(i, s)| Op::Mark(i, s)),
    ]
}

fn build_registry(mode: OperatingMode) -> (Arc<CameraCoordinator>, Arc<CameraStateRegistry>) {
    let coordinator = Arc::new(CameraCoordinator::new(vec![[
        CameraId::new("0"),
        CameraId::new("1"),
    ]]));
    let registry = Arc::new(CameraStateRegistry::new(
        coordinator.clone(),
        RegistryConfig::default(),
    ));
    coordinator.add_listener(registry.clone());
    coordinator.set_camera_operating_mode(mode);
    (coordinator, registry)
}

/// Registry plus the set of cameras the test has registered.
struct Harness {
    registry: Arc<CameraStateRegistry>,
    registered: HashSet<usize>,
}

impl Harness {
    fn new(registry: Arc<CameraStateRegistry>) -> Self {
        Self {
            registry,
            registered: HashSet::new(),
        }
    }

    /// Apply `op` the way a well-behaved camera would: slot-holding states
    /// are only reported after a granted open.
    fn apply(&mut self, op: &Op) {
        let index = match op {
            Op::TryOpen(i) | Op::Mark(i, _) => *i,
        };
        let camera_id = CameraId::new(CAMERAS[index]);

        if self.registered.insert(index) {
            self.registry.register_camera(
                camera_id.clone(),
                Arc::new(DirectExecutor),
                Arc::new(|| {}),
                Arc::new(|| {}),
            );
        }

        let held = self
            .registry
            .camera_state(&camera_id)
            .is_some_and(CameraState::holds_camera_slot);

        match op {
            Op::TryOpen(_) => {
                let available = self.registry.available_cameras();
                let granted = self.registry.try_open_camera(&camera_id);
                assert_eq!(granted, available > 0 || held);
            }
            Op::Mark(_, state) => {
                if state.holds_camera_slot() && !held {
                    return;
                }
                self.registry.mark_camera_state(&camera_id, *state);
                if *state == CameraState::Released {
                    self.registered.remove(&index);
                }
            }
        }
    }
}

fn open_count(registry: &CameraStateRegistry) -> usize {
    CAMERAS
        .iter()
        .filter(|raw| {
            registry
                .camera_state(&CameraId::new(**raw))
                .is_some_and(CameraState::holds_camera_slot)
        })
        .count()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Open slots never exceed the cap and the available count always
    /// matches the ledger.
    #[test]
    fn fuzz_registry_capacity_never_exceeded(
        concurrent in any::<bool>(),
        ops in prop::collection::vec(op_strategy(), 0..64),
    ) {
        let mode = if concurrent { OperatingMode::Concurrent } else { OperatingMode::Single };
        let (_coordinator, registry) = build_registry(mode);
        let cap = registry.max_allowed_open_cameras();
        let mut harness = Harness::new(registry.clone());

        for op in &ops {
            harness.apply(op);
            let open = open_count(&registry);
            prop_assert!(open <= cap, "{} open with cap {}", open, cap);
            prop_assert_eq!(registry.available_cameras(), cap - open);
        }
    }

    /// Toggling concurrent mode on and off restores cap and availability.
    #[test]
    fn fuzz_mode_toggle_round_trip(ops in prop::collection::vec(op_strategy(), 0..32)) {
        let (coordinator, registry) = build_registry(OperatingMode::Single);
        let mut harness = Harness::new(registry.clone());
        for op in &ops {
            harness.apply(op);
        }
        let before = (registry.max_allowed_open_cameras(), registry.available_cameras());

        coordinator.set_camera_operating_mode(OperatingMode::Concurrent);
        prop_assert_eq!(registry.max_allowed_open_cameras(), 2);
        coordinator.set_camera_operating_mode(OperatingMode::Single);

        prop_assert_eq!(
            (registry.max_allowed_open_cameras(), registry.available_cameras()),
            before
        );
    }

    /// A late observer sees exactly the latest snapshot.
    #[test]
    fn fuzz_late_observer_gets_latest_snapshot(
        updates in prop::collection::vec(
            prop::option::of(prop::collection::vec(0..CAMERAS.len(), 0..4)),
            1..16,
        ),
    ) {
        let source = CameraPresenceSource::new(FakePresenceMonitor::new(Ok(Vec::new())));
        let mut expected = PresenceEvent::Data(Vec::new());
        for update in &updates {
            match update {
                Some(indices) => {
                    let ids: Vec<CameraId> =
                        indices.iter().map(|i| CameraId::new(CAMERAS[*i])).collect();
                    expected = PresenceEvent::Data(ids.clone());
                    source.update_data(ids);
                }
                None => {
                    let error = CameraError::CameraUnavailable("enumeration".to_string());
                    expected = PresenceEvent::Error(error.clone());
                    source.update_error(error);
                }
            }
        }

        let observer = Arc::new(RecordingObserver::new());
        source.add_observer(Arc::new(DirectExecutor), observer.clone());
        prop_assert_eq!(observer.events(), vec![expected]);
    }

    /// Ids present before and after a reconciliation keep their handle.
    #[test]
    fn fuzz_reconcile_preserves_surviving_handles(
        lists in prop::collection::vec(
            prop::collection::vec(0..CAMERAS.len(), 0..4),
            1..8,
        ),
    ) {
        let factory = Arc::new(FakeCameraFactory::new(&[]));
        let repository = CameraRepository::new();
        repository.init(factory).unwrap();

        for indices in &lists {
            let ids: Vec<CameraId> = indices.iter().map(|i| CameraId::new(CAMERAS[*i])).collect();
            let before: Vec<_> = repository
                .camera_ids()
                .into_iter()
                .zip(repository.get_cameras())
                .collect();

            repository.on_cameras_updated(&ids).unwrap();

            for (id, handle) in before {
                if ids.contains(&id) {
                    let after = repository.get_camera(&id).unwrap();
                    prop_assert!(camgate::camera::same_camera(&handle, &after));
                } else {
                    prop_assert!(repository.get_camera(&id).is_err());
                }
            }
        }
    }
}
