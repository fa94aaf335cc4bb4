//! Serialization of profiling results.
//!
//! `schema` defines the stored JSON contract; `json` handles file I/O.

pub mod json;
pub mod schema;

// Re-export main types and functions
pub use json::{read_profile_data, write_html, write_profile_data};
pub use schema::{build_profile_data, CallEdgeRecord, FunctionRecord, ProfileData, RunMetadata};
