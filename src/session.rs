//! Profiling session orchestration.
//!
//! The session ties the pieces together for a host program:
//! 1. Load configuration
//! 2. Run the profiler over the host's call/return events
//! 3. On stop: extrapolate, serialize JSON, render the HTML report
//!
//! Outputs land in a fresh `run_<timestamp>` directory under the
//! configured output directory, which is what the diff tool consumes.

use crate::config::{ScopeConfig, CONFIG_FILE_NAME};
use crate::output::{build_profile_data, write_html, write_profile_data};
use crate::profiler::extrapolation::extrapolate;
use crate::profiler::{CallSite, Profiler};
use crate::report::generate_report;
use anyhow::{Context, Result};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Paths produced by a finished session
#[derive(Debug, Clone)]
pub struct SessionOutput {
    pub run_dir: PathBuf,
    pub json_path: PathBuf,
    pub report_path: Option<PathBuf>,
}

/// Entry point for profiling a host program
///
/// **Public** - the host adapter owns one session per thread, forwards
/// every call/return boundary to it, and calls `stop()` when done.
pub struct ProfileSession {
    config: ScopeConfig,
    profiler: Profiler,
}

impl ProfileSession {
    pub fn new(config: ScopeConfig) -> Self {
        let profiler = Profiler::new(&config);
        Self { config, profiler }
    }

    /// Build a session from a config file (or discovery, or defaults)
    ///
    /// **Public** - when no explicit path is given and discovery found
    /// nothing, a default config file is written next to the program so
    /// the next run starts from something editable.
    pub fn from_config_file(config_path: Option<&Path>) -> Self {
        let config = ScopeConfig::load(config_path);

        info!(
            "Configuration loaded from: {}",
            config_path
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "defaults".to_string())
        );

        if config_path.is_none() {
            let default_path = PathBuf::from(CONFIG_FILE_NAME);
            if let Err(e) = config.write_default(&default_path) {
                warn!("Could not write default config: {e}");
            }
        }

        Self::new(config)
    }

    pub fn config(&self) -> &ScopeConfig {
        &self.config
    }

    /// Arm the tracer (idempotent)
    pub fn start(&mut self) {
        self.profiler.start();
        info!("Callscope profiling started");
    }

    /// Forward a call event from the host adapter
    pub fn on_call(&mut self, site: &CallSite<'_>) {
        self.profiler.on_call(site);
    }

    /// Forward a return event from the host adapter
    pub fn on_return(&mut self) {
        self.profiler.on_return();
    }

    /// Stop profiling and generate outputs
    ///
    /// **Public** - returns `None` when the session was inactive or
    /// collected nothing. File I/O failures propagate with context.
    pub fn stop(&mut self) -> Result<Option<SessionOutput>> {
        let Some(result) = self.profiler.stop() else {
            return Ok(None);
        };

        if result.function_stats.is_empty() {
            warn!("No profiling data collected");
            return Ok(None);
        }

        info!("Tracked {} functions", result.function_stats.len());
        info!(
            "Extrapolating from {} to {}",
            self.config.sample_size, self.config.expected_size
        );

        let extrapolated = extrapolate(&result, &self.config);

        let run_dir = next_run_dir(Path::new(&self.config.output_dir));
        std::fs::create_dir_all(&run_dir)
            .with_context(|| format!("Failed to create run directory {}", run_dir.display()))?;

        let json_path = run_dir.join("profile_data.json");
        let data = build_profile_data(&result, &extrapolated);
        write_profile_data(&data, &json_path).context("Failed to write profile JSON")?;

        let report_path = if self.config.enable_dashboard {
            let path = run_dir.join("summary.html");
            let html = generate_report(&result, &extrapolated, &self.config);
            write_html(&html, &path).context("Failed to write summary report")?;
            info!("Report generated: {}", path.display());
            Some(path)
        } else {
            None
        };

        info!("JSON data saved: {}", json_path.display());
        info!("Callscope profiling complete");

        Ok(Some(SessionOutput {
            run_dir,
            json_path,
            report_path,
        }))
    }
}

/// Pick a fresh `run_<unix_ts>` directory, suffixing on collision
fn next_run_dir(output_dir: &Path) -> PathBuf {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let candidate = output_dir.join(format!("run_{timestamp}"));
    if !candidate.exists() {
        return candidate;
    }

    let mut suffix = 2;
    loop {
        let candidate = output_dir.join(format!("run_{timestamp}_{suffix}"));
        if !candidate.exists() {
            return candidate;
        }
        suffix += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &Path) -> ScopeConfig {
        ScopeConfig {
            output_dir: dir.display().to_string(),
            enable_cpu_monitoring: false,
            enable_gpu_monitoring: false,
            ..Default::default()
        }
    }

    fn site<'a>(funcname: &'a str) -> CallSite<'a> {
        CallSite {
            module: "pipeline",
            filename: "pipeline.py",
            funcname,
            lineno: 1,
            receiver_type: None,
        }
    }

    #[test]
    fn test_stop_without_start_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = ProfileSession::new(test_config(dir.path()));
        assert!(session.stop().unwrap().is_none());
    }

    #[test]
    fn test_stop_without_data_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = ProfileSession::new(test_config(dir.path()));
        session.start();
        assert!(session.stop().unwrap().is_none());
    }

    #[test]
    fn test_session_writes_run_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = ProfileSession::new(test_config(dir.path()));

        session.start();
        session.on_call(&site("load"));
        session.on_call(&site("parse"));
        session.on_return();
        session.on_return();

        let output = session.stop().unwrap().expect("session produced output");
        assert!(output.json_path.exists());
        assert!(output.report_path.as_ref().unwrap().exists());

        let data = crate::output::read_profile_data(&output.json_path).unwrap();
        assert_eq!(data.metadata.total_functions, 2);
        assert_eq!(data.call_edges.len(), 1);
    }

    #[test]
    fn test_dashboard_can_be_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let config = ScopeConfig {
            enable_dashboard: false,
            ..test_config(dir.path())
        };
        let mut session = ProfileSession::new(config);

        session.start();
        session.on_call(&site("load"));
        session.on_return();

        let output = session.stop().unwrap().unwrap();
        assert!(output.report_path.is_none());
    }

    #[test]
    fn test_run_dirs_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let first = next_run_dir(dir.path());
        std::fs::create_dir_all(&first).unwrap();
        let second = next_run_dir(dir.path());
        assert_ne!(first, second);
    }
}
