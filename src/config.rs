//! Configuration management for camgent
//!
//! Provides configuration loading, saving, and validation for device
//! selection, capture storage and the worker thread.

use crate::errors::ControllerError;
use crate::types::LensFacing;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CamgentConfig {
    pub camera: CameraConfig,
    pub capture: CaptureConfig,
    pub worker: WorkerConfig,
}

/// Device selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Facing to prefer when picking a device
    pub preferred_facing: LensFacing,
}

/// Still capture and storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Upper bound on frames discarded by one drain
    pub drain_limit: usize,
    /// Directory the file storage writes into
    pub storage_directory: String,
    /// File name prefix for saved captures
    pub file_prefix: String,
}

/// Worker thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub thread_name: String,
    /// How long pause waits for the worker to finish
    pub shutdown_timeout_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            preferred_facing: LensFacing::Back,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            drain_limit: 8,
            storage_directory: "./captures".to_string(),
            file_prefix: "IMG_".to_string(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            thread_name: "camgent-worker".to_string(),
            shutdown_timeout_ms: 2000,
        }
    }
}

impl WorkerConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl CamgentConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ControllerError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| ControllerError::Config(format!("Failed to read config file: {}", e)))?;

        let config: CamgentConfig = toml::from_str(&contents)
            .map_err(|e| ControllerError::Config(format!("Failed to parse config file: {}", e)))?;

        config.validate().map_err(ControllerError::Config)?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ControllerError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ControllerError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| ControllerError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| ControllerError::Config(format!("Failed to write config file: {}", e)))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("camgent.toml")
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
        if self.capture.drain_limit == 0 || self.capture.drain_limit > 1024 {
            return Err("Drain limit must be between 1 and 1024".to_string());
        }
        if self.capture.storage_directory.trim().is_empty() {
            return Err("Storage directory must not be empty".to_string());
        }
        if self.capture.file_prefix.contains(|c: char| c == '/' || c == '\\') {
            return Err("File prefix must not contain path separators".to_string());
        }

        if self.worker.thread_name.trim().is_empty() {
            return Err("Worker thread name must not be empty".to_string());
        }
        if self.worker.shutdown_timeout_ms == 0 {
            return Err("Worker shutdown timeout must be positive".to_string());
        }

        Ok(())
    }
}
