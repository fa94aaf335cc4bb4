//! Aggregate statistics data model.
//!
//! These types accumulate during a profiling session and are frozen into
//! a `ProfilingResult` when the profiler stops.

use crate::profiler::identity::FunctionKey;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::rc::Rc;

/// Point-in-time CPU/GPU resource measurement
///
/// **Public** - produced by the resource monitor, buffered per function.
/// GPU vectors are parallel ordered sequences, one entry per device.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub cpu_percent: f64,
    pub memory_mb: f64,
    pub gpu_utilization: Vec<f64>,
    pub gpu_memory_mb: Vec<f64>,
}

/// Accumulated statistics for a single function
///
/// **Public** - one per distinct `FunctionKey`, created lazily on first call.
#[derive(Debug, Clone, Default)]
pub struct FunctionStats {
    /// Number of observed invocations
    pub call_count: u64,

    /// Inclusive wall-clock time summed across all invocations.
    /// Recursive calls each add their own elapsed time independently.
    pub total_time_ms: f64,

    /// Exclusive time: total minus time attributed to direct callees.
    /// Derived once at finalization, never incrementally.
    pub self_time_ms: f64,

    /// Unix timestamp of the first observed invocation
    pub first_call_time: Option<f64>,

    /// Mean CPU utilization over the buffered samples, set once
    pub avg_cpu_percent: f64,

    /// Largest resident memory observed in any sample
    pub peak_memory_mb: f64,

    /// Per-device mean GPU utilization, sized to the last retained snapshot
    pub avg_gpu_utilization: Vec<f64>,

    /// Per-device peak GPU memory, sized to the last retained snapshot
    pub peak_gpu_memory_mb: Vec<f64>,

    /// Counter driving sample decimation (every Nth call of this function)
    pub(crate) sample_counter: u64,

    /// Samples taken during the most recent invocation; cleared on return
    pub(crate) resource_samples: Vec<ResourceSnapshot>,
}

impl FunctionStats {
    /// Average inclusive time per call
    pub fn avg_time_ms(&self) -> f64 {
        if self.call_count > 0 {
            self.total_time_ms / self.call_count as f64
        } else {
            0.0
        }
    }
}

/// Aggregate for one caller→callee relationship
///
/// **Public** - keyed by the ordered (caller, callee) pair in the edge map.
/// `total_time_ms` sums the callee's inclusive durations attributed while
/// this specific caller was the immediate parent on the stack.
#[derive(Debug, Clone, Default)]
pub struct CallEdge {
    pub call_count: u64,
    pub total_time_ms: f64,
}

impl CallEdge {
    /// Average callee time per call through this edge
    pub fn avg_time_ms(&self) -> f64 {
        if self.call_count > 0 {
            self.total_time_ms / self.call_count as f64
        } else {
            0.0
        }
    }
}

/// Immutable snapshot of a completed profiling session
///
/// **Public** - produced exactly once per session by `Profiler::stop`;
/// ownership transfers to extrapolation and reporting.
#[derive(Debug)]
pub struct ProfilingResult {
    pub function_stats: HashMap<Rc<FunctionKey>, FunctionStats>,
    pub call_edges: HashMap<(Rc<FunctionKey>, Rc<FunctionKey>), CallEdge>,
    pub total_runtime_ms: f64,
    pub start_timestamp: f64,
    pub end_timestamp: f64,
}

impl ProfilingResult {
    /// Sum of all inclusive function times.
    /// May exceed `total_runtime_ms` because nested calls overlap.
    pub fn total_function_time_ms(&self) -> f64 {
        self.function_stats
            .values()
            .map(|stats| stats.total_time_ms)
            .sum()
    }
}
