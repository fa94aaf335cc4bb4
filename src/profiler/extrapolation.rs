//! Linear extrapolation of observed statistics to a projected workload.
//!
//! Profiling typically runs over a small sample of the real workload.
//! Extrapolation scales observed call counts and times by
//! `expected_size / sample_size`. Resource metrics pass through unscaled:
//! CPU percentages and memory peaks do not grow with sample size.

use crate::config::ScopeConfig;
use crate::profiler::identity::FunctionKey;
use crate::profiler::stats::{FunctionStats, ProfilingResult};
use log::debug;
use std::collections::HashMap;
use std::rc::Rc;

/// Observed and projected statistics for one function
///
/// **Public** - derived data, recomputed each time extrapolation runs
#[derive(Debug, Clone)]
pub struct ExtrapolatedStats {
    pub observed_calls: u64,
    pub observed_time_ms: f64,
    pub observed_self_time_ms: f64,

    pub projected_calls: u64,
    pub projected_time_ms: f64,
    pub projected_self_time_ms: f64,

    pub avg_cpu_percent: f64,
    pub peak_memory_mb: f64,
    pub avg_gpu_utilization: Vec<f64>,
    pub peak_gpu_memory_mb: Vec<f64>,

    /// Share of summed projected self time, in percent
    pub percentage_of_total: f64,
}

impl ExtrapolatedStats {
    fn new(stats: &FunctionStats, scale_factor: f64) -> Self {
        Self {
            observed_calls: stats.call_count,
            observed_time_ms: stats.total_time_ms,
            observed_self_time_ms: stats.self_time_ms,
            projected_calls: (stats.call_count as f64 * scale_factor) as u64,
            projected_time_ms: stats.total_time_ms * scale_factor,
            projected_self_time_ms: stats.self_time_ms * scale_factor,
            avg_cpu_percent: stats.avg_cpu_percent,
            peak_memory_mb: stats.peak_memory_mb,
            avg_gpu_utilization: stats.avg_gpu_utilization.clone(),
            peak_gpu_memory_mb: stats.peak_gpu_memory_mb.clone(),
            percentage_of_total: 0.0,
        }
    }
}

/// Extrapolate a profiling result to the expected workload size
///
/// **Public** - pure linear scaling, no sublinear/superlinear modeling.
/// A sample size of zero (or less) yields a scale factor of 1.0 rather
/// than a division error.
pub fn extrapolate(
    result: &ProfilingResult,
    config: &ScopeConfig,
) -> HashMap<Rc<FunctionKey>, ExtrapolatedStats> {
    let scale_factor = if config.sample_size > 0 {
        config.expected_size as f64 / config.sample_size as f64
    } else {
        1.0
    };

    debug!(
        "Extrapolating {} functions with scale factor {scale_factor:.2}",
        result.function_stats.len()
    );

    let mut extrapolated: HashMap<Rc<FunctionKey>, ExtrapolatedStats> = result
        .function_stats
        .iter()
        .map(|(key, stats)| (Rc::clone(key), ExtrapolatedStats::new(stats, scale_factor)))
        .collect();

    let total_projected_self_time: f64 = extrapolated
        .values()
        .map(|stats| stats.projected_self_time_ms)
        .sum();

    if total_projected_self_time > 0.0 {
        for stats in extrapolated.values_mut() {
            stats.percentage_of_total =
                (stats.projected_self_time_ms / total_projected_self_time) * 100.0;
        }
    }

    extrapolated
}
