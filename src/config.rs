//! Configuration management for camgate
//!
//! Provides configuration loading, saving, and validation for the slot
//! limits of the state registry, presence polling, and the concurrent
//! camera pairs known to the coordinator.

use crate::errors::CameraError;
use crate::types::CameraId;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CamgateConfig {
    pub registry: RegistryConfig,
    pub presence: PresenceConfig,
    pub coordinator: CoordinatorConfig,
}

/// Slot limits for the state registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Cameras allowed open at once outside concurrent mode
    pub max_open_cameras_single: usize,
    /// Cameras allowed open at once in concurrent mode
    pub max_open_cameras_concurrent: usize,
}

/// Presence monitoring configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// Polling interval in milliseconds
    pub poll_interval_ms: u64,
    /// Ids the presence source starts with before the first refresh
    pub initial_camera_ids: Vec<CameraId>,
}

/// Concurrent camera configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Pairs of cameras that may stream concurrently
    pub concurrent_pairs: Vec<[CameraId; 2]>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_open_cameras_single: 1,
            max_open_cameras_concurrent: 2,
        }
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            initial_camera_ids: Vec::new(),
        }
    }
}

impl PresenceConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for CamgateConfig {
    fn default() -> Self {
        Self {
            registry: RegistryConfig::default(),
            presence: PresenceConfig {
                poll_interval_ms: 2000,
                initial_camera_ids: CameraId::from_strs(&["0", "1"]),
            },
            coordinator: CoordinatorConfig {
                concurrent_pairs: vec![[CameraId::new("0"), CameraId::new("1")]],
            },
        }
    }
}

impl CamgateConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, CameraError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| CameraError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: CamgateConfig = toml::from_str(&contents)
            .map_err(|e| CameraError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.validate().map_err(CameraError::ConfigError)?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), CameraError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                CameraError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| CameraError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| CameraError::ConfigError(format!("Failed to write config file: {}", e)))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("camgate.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.registry.max_open_cameras_single == 0 {
            return Err("max_open_cameras_single must be at least 1".to_string());
        }
        if self.registry.max_open_cameras_concurrent < self.registry.max_open_cameras_single {
            return Err(
                "max_open_cameras_concurrent must not be below max_open_cameras_single"
                    .to_string(),
            );
        }

        if self.presence.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be greater than 0".to_string());
        }

        for [a, b] in &self.coordinator.concurrent_pairs {
            if a == b {
                return Err(format!("Concurrent pair pairs camera {} with itself", a));
            }
        }

        Ok(())
    }
}
