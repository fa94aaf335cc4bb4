//! Utility modules for error handling and shared helpers.

pub mod error;

// Re-export commonly used error types for convenience
pub use error::{ConfigError, DiffError, OutputError};

/// Round to two decimal places for serialized output
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
