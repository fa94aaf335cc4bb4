//! Configuration for profiling sessions.
//!
//! Settings load from a `.callscope.yaml` file (explicit path or
//! discovered by walking up from the working directory) and fall back to
//! defaults on any failure. Invalid values are reported as warnings, not
//! errors: profiling proceeds with whatever was configured.

use crate::utils::error::ConfigError;
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Current output schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Config file name used for discovery
pub const CONFIG_FILE_NAME: &str = ".callscope.yaml";

/// How many parent directories discovery walks up
const DISCOVERY_DEPTH: usize = 6;

/// Profiling session settings
///
/// **Public** - consumed by the profiler, extrapolator, and session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    /// Number of workload items the profiled run processes
    pub sample_size: u64,

    /// Workload size to extrapolate to
    pub expected_size: u64,

    /// Directory receiving run outputs
    pub output_dir: String,

    /// Whether to write the HTML summary report
    pub enable_dashboard: bool,

    /// Title shown in the HTML report
    pub dashboard_title: String,

    /// Functions faster than this are left out of report tables
    pub min_time_threshold_ms: f64,

    /// Functions below this share of total time are left out of report tables
    pub min_time_percentage: f64,

    /// Substrings matched against filename or module to exclude from tracking
    pub ignore_modules: Vec<String>,

    /// Skip framework/standard-library functions entirely
    pub collapse_stdlib: bool,

    pub enable_cpu_monitoring: bool,
    pub enable_gpu_monitoring: bool,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            sample_size: 100,
            expected_size: 1_000_000,
            output_dir: ".callscope_output".to_string(),
            enable_dashboard: true,
            dashboard_title: "Callscope".to_string(),
            min_time_threshold_ms: 1.0,
            min_time_percentage: 0.5,
            ignore_modules: vec![
                "venv".to_string(),
                "site-packages".to_string(),
                ".venv".to_string(),
                "env".to_string(),
            ],
            collapse_stdlib: true,
            enable_cpu_monitoring: true,
            enable_gpu_monitoring: true,
        }
    }
}

impl ScopeConfig {
    /// Load config from a YAML file or fall back to defaults
    ///
    /// **Public** - `config_path: None` triggers discovery. Parse failures
    /// and validation issues are logged as warnings; this never fails.
    pub fn load(config_path: Option<&Path>) -> Self {
        let path = match config_path {
            Some(path) => Some(path.to_path_buf()),
            None => Self::discover(),
        };

        let Some(path) = path.filter(|p| p.exists()) else {
            return Self::default();
        };

        let config = match std::fs::read_to_string(&path)
            .map_err(ConfigError::from)
            .and_then(|data| serde_yaml::from_str::<Self>(&data).map_err(ConfigError::from))
        {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to load config {}: {e}", path.display());
                return Self::default();
            }
        };

        for issue in config.validate() {
            warn!("Config validation: {issue}");
        }

        config
    }

    /// Search for the config file in the working directory and its parents
    ///
    /// **Private** - bounded walk, stops at the filesystem root
    fn discover() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;

        for _ in 0..DISCOVERY_DEPTH {
            let candidate = current.join(CONFIG_FILE_NAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                break;
            }
        }

        None
    }

    /// Write this config as a YAML file, unless one already exists
    pub fn write_default(&self, path: &Path) -> Result<(), ConfigError> {
        if path.exists() {
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Collect human-readable validation issues
    ///
    /// **Public** - issues are surfaced as warnings, never fatal
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.sample_size == 0 {
            errors.push("sample_size must be > 0".to_string());
        }

        if self.expected_size == 0 {
            errors.push("expected_size must be > 0".to_string());
        }

        if self.min_time_threshold_ms < 0.0 {
            errors.push("min_time_threshold_ms must be >= 0".to_string());
        }

        if !(0.0..=100.0).contains(&self.min_time_percentage) {
            errors.push("min_time_percentage must be between 0 and 100".to_string());
        }

        errors
    }
}
