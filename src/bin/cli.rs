use camgate::executor::DirectExecutor;
use camgate::testing::FakeCameraFactory;
use camgate::{
    CameraCoordinator, CameraFactory, CameraId, CameraRepository, CameraState,
    CameraStateRegistry, CamgateConfig, OperatingMode,
};
use serde::Serialize;
use std::env;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    camgate::init_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: camgate-cli <command> [args]");
        eprintln!("Commands: print-config, validate-config, simulate");
        std::process::exit(1);
    }

    let command = &args[1];
    match command.as_str() {
        "print-config" => cmd_print_config(&args),
        "validate-config" => cmd_validate_config(&args),
        "simulate" => cmd_simulate(&args),
        _ => {
            eprintln!("Unknown command: {}", command);
            std::process::exit(1);
        }
    }
}

fn cmd_print_config(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let config = CamgateConfig::default();
    if args.contains(&"--json".to_string()) {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        print!("{}", toml::to_string_pretty(&config)?);
    }
    Ok(())
}

fn cmd_validate_config(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    if args.len() < 3 {
        eprintln!("Usage: camgate-cli validate-config <path>");
        std::process::exit(1);
    }
    let path = &args[2];
    if !std::path::Path::new(path).exists() {
        return Err(format!("Config file not found: {}", path).into());
    }
    let config = CamgateConfig::load_from_file(path)?;
    println!(
        "OK: {} cameras, {} concurrent pairs, limits {}/{}",
        config.presence.initial_camera_ids.len(),
        config.coordinator.concurrent_pairs.len(),
        config.registry.max_open_cameras_single,
        config.registry.max_open_cameras_concurrent
    );
    Ok(())
}

/// One line of simulation output.
#[derive(Debug, Serialize)]
struct Step {
    action: String,
    camera: String,
    outcome: String,
    available: usize,
}

fn cmd_simulate(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let mut config_path = None;
    let mut json = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                config_path = Some(args.get(i).ok_or("--config requires a path")?.clone());
            }
            "--json" => json = true,
            other => return Err(format!("Unknown argument: {}", other).into()),
        }
        i += 1;
    }

    let config = match config_path {
        Some(path) => CamgateConfig::load_from_file(path)?,
        None => CamgateConfig::default(),
    };

    let steps = simulate(&config)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&steps)?);
    } else {
        for step in &steps {
            println!(
                "{:<28}{:<10}{:<24}available={}",
                step.action, step.camera, step.outcome, step.available
            );
        }
    }
    Ok(())
}

fn step(registry: &CameraStateRegistry, action: &str, camera: &CameraId, outcome: &str) -> Step {
    Step {
        action: action.to_string(),
        camera: camera.to_string(),
        outcome: outcome.to_string(),
        available: registry.available_cameras(),
    }
}

fn simulate(config: &CamgateConfig) -> Result<Vec<Step>, Box<dyn std::error::Error>> {
    let raw_ids: Vec<&str> = config
        .presence
        .initial_camera_ids
        .iter()
        .map(CameraId::as_str)
        .collect();
    let factory = Arc::new(FakeCameraFactory::new(&raw_ids));
    let repository = CameraRepository::new();
    repository.init(factory.clone())?;

    let coordinator = Arc::new(CameraCoordinator::new(
        config.coordinator.concurrent_pairs.clone(),
    ));
    let registry = Arc::new(CameraStateRegistry::new(
        coordinator.clone(),
        config.registry,
    ));
    coordinator.add_listener(registry.clone());
    coordinator.set_camera_operating_mode(OperatingMode::Single);

    let mut steps = Vec::new();
    let notified = Arc::new(AtomicUsize::new(0));
    let camera_ids = repository.camera_ids();
    for camera_id in &camera_ids {
        let counter = notified.clone();
        registry.register_camera(
            camera_id.clone(),
            Arc::new(DirectExecutor),
            Arc::new(|| {}),
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        steps.push(step(&registry, "register", camera_id, "registered"));
    }

    // Single mode: the first camera wins the slot, the rest wait.
    let mut opened = Vec::new();
    let mut pending = Vec::new();
    for camera_id in &camera_ids {
        if registry.try_open_camera(camera_id) {
            registry.mark_camera_state(camera_id, CameraState::Open);
            opened.push(camera_id.clone());
            steps.push(step(&registry, "try_open_camera", camera_id, "OPEN"));
        } else {
            registry.mark_camera_state(camera_id, CameraState::PendingOpen);
            pending.push(camera_id.clone());
            steps.push(step(&registry, "try_open_camera", camera_id, "PENDING_OPEN"));
        }
    }

    for camera_id in opened.iter().chain(pending.iter()) {
        if pending.contains(camera_id) {
            let granted = registry.try_open_camera(camera_id);
            if granted {
                registry.mark_camera_state(camera_id, CameraState::Open);
            }
            let outcome = if granted { "OPEN" } else { "DENIED" };
            steps.push(step(&registry, "retry_open_camera", camera_id, outcome));
            if !granted {
                continue;
            }
        }
        registry.mark_camera_state(camera_id, CameraState::Closing);
        steps.push(step(&registry, "close", camera_id, "CLOSING"));
        registry.mark_camera_state(camera_id, CameraState::Closed);
        let woken = format!("CLOSED, {} woken", notified.swap(0, Ordering::SeqCst));
        steps.push(step(&registry, "close", camera_id, &woken));
    }

    // Concurrent mode: the first available pair opens together.
    coordinator.set_camera_operating_mode(OperatingMode::Concurrent);
    let registered = |id: &CameraId| registry.camera_state(id).is_some();
    let pair = coordinator
        .concurrent_camera_pairs()
        .into_iter()
        .find(|[first, second]| registered(first) && registered(second));
    if let Some(pair) = pair {
        coordinator.set_active_concurrent_cameras(pair.to_vec());
        for camera_id in &pair {
            let granted = registry.try_open_camera(camera_id);
            if granted {
                registry.mark_camera_state(camera_id, CameraState::Open);
            }
            let outcome = if granted { "OPEN" } else { "DENIED" };
            steps.push(step(&registry, "concurrent_open_camera", camera_id, outcome));
        }
        let session = registry.try_open_capture_session(&pair[0], Some(&pair[1]));
        let outcome = if session { "ALLOWED" } else { "WAITING" };
        steps.push(step(&registry, "try_open_capture_session", &pair[0], outcome));
    }

    for camera_id in &camera_ids {
        registry.mark_camera_state(camera_id, CameraState::Released);
        steps.push(step(&registry, "release", camera_id, "RELEASED"));
    }

    futures::executor::block_on(repository.deinit());
    log::info!(
        "Simulation finished with {} cameras",
        factory.available_camera_ids()?.len()
    );

    Ok(steps)
}
