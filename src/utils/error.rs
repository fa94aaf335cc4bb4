//! Error types for the entire application.
//!
//! We use `thiserror` for library-style errors with custom types,
//! and `anyhow` for application-level error propagation in main.rs and
//! the session layer. Nothing on the instrumentation path returns errors:
//! the tracer absorbs malformed events and failed probes silently.

use thiserror::Error;

/// Errors that can occur while loading or writing configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors that can occur during file output
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Failed to write file: {0}")]
    WriteFailed(#[from] std::io::Error),

    #[error("Failed to serialize JSON: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("Invalid output path: {0}")]
    InvalidPath(String),
}

/// Errors that can occur while comparing stored runs
#[derive(Error, Debug)]
pub enum DiffError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed profile data: {0}")]
    MalformedData(#[from] serde_json::Error),

    #[error("Output directory not found: {0}")]
    OutputDirNotFound(String),

    #[error("profile_data.json not found in {0}")]
    MissingRunData(String),

    #[error("Need at least 2 runs to compare, found {0}")]
    NotEnoughRuns(usize),
}
