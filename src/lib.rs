//! Callscope
//!
//! Call-graph profiling for pipeline workloads: per-function wall-clock
//! attribution (total and self time), caller/callee edge counts,
//! periodic CPU/memory/GPU sampling, and extrapolation from a sample
//! run to a projected full workload.
//!
//! This crate provides the core implementation for the `callscope`
//! CLI tool and the embeddable [`session::ProfileSession`].
//!
//! ## Getting Started
//!
//! ```no_run
//! use callscope::config::ScopeConfig;
//! use callscope::profiler::CallSite;
//! use callscope::session::ProfileSession;
//!
//! let mut session = ProfileSession::new(ScopeConfig::default());
//! session.start();
//! session.on_call(&CallSite {
//!     module: "pipeline",
//!     filename: "pipeline.py",
//!     funcname: "load",
//!     lineno: 10,
//!     receiver_type: None,
//! });
//! session.on_return();
//! let output = session.stop().unwrap();
//! ```

pub mod analyzer;
pub mod config;
pub mod diff;
pub mod output;
pub mod profiler;
pub mod report;
pub mod session;
pub mod utils;
