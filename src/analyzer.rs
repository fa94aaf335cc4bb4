//! Hotspot extraction and per-module aggregation.
//!
//! Hotspots are the functions projected to dominate self time at the
//! expected workload size. These are the primary targets for optimization.
//! Selection uses a bounded min-heap of size N rather than a full sort,
//! with the display name as a deterministic secondary key.

use crate::profiler::extrapolation::ExtrapolatedStats;
use crate::profiler::identity::FunctionKey;
use crate::profiler::stats::{FunctionStats, ProfilingResult};
use log::debug;
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};
use std::rc::Rc;

/// A hotspot candidate with all metrics a report needs
///
/// **Public** - returned by `extract_hotspots` and `all_functions`
#[derive(Debug, Clone)]
pub struct HotspotFunction {
    pub display_name: String,
    pub module: String,
    pub classname: Option<String>,

    pub call_count: u64,
    pub total_time_ms: f64,
    pub self_time_ms: f64,
    pub avg_time_ms: f64,

    pub projected_calls: u64,
    pub projected_time_ms: f64,
    pub projected_self_time_ms: f64,
    pub percentage_of_total: f64,

    pub avg_cpu_percent: f64,
    pub peak_memory_mb: f64,
    pub avg_gpu_utilization: Vec<f64>,
    pub peak_gpu_memory_mb: Vec<f64>,
}

impl HotspotFunction {
    fn new(key: &FunctionKey, stats: &FunctionStats, extrapolated: &ExtrapolatedStats) -> Self {
        Self {
            display_name: key.display_name().to_string(),
            module: key.module.clone(),
            classname: key.classname.clone(),
            call_count: stats.call_count,
            total_time_ms: stats.total_time_ms,
            self_time_ms: stats.self_time_ms,
            avg_time_ms: stats.avg_time_ms(),
            projected_calls: extrapolated.projected_calls,
            projected_time_ms: extrapolated.projected_time_ms,
            projected_self_time_ms: extrapolated.projected_self_time_ms,
            percentage_of_total: extrapolated.percentage_of_total,
            avg_cpu_percent: stats.avg_cpu_percent,
            peak_memory_mb: stats.peak_memory_mb,
            avg_gpu_utilization: stats.avg_gpu_utilization.clone(),
            peak_gpu_memory_mb: stats.peak_gpu_memory_mb.clone(),
        }
    }

    /// Mean utilization across devices, 0 when no GPU samples exist
    pub fn mean_gpu_utilization(&self) -> f64 {
        if self.avg_gpu_utilization.is_empty() {
            return 0.0;
        }
        self.avg_gpu_utilization.iter().sum::<f64>() / self.avg_gpu_utilization.len() as f64
    }

    /// Largest per-device peak memory, 0 when no GPU samples exist
    pub fn max_gpu_memory_mb(&self) -> f64 {
        self.peak_gpu_memory_mb
            .iter()
            .fold(0.0_f64, |peak, &mb| peak.max(mb))
    }
}

/// Aggregated metrics for one module/script
///
/// **Public** - returned by `aggregate_by_module`
#[derive(Debug, Clone)]
pub struct ModuleAggregate {
    pub module_name: String,
    pub function_count: usize,
    pub total_calls: u64,
    pub total_time_ms: f64,
    pub projected_time_ms: f64,
    pub percentage_of_total: f64,
}

/// Heap ordering: projected self time, then display name for stable ties.
/// The name comparison is reversed so that among equal times the entry
/// with the lexicographically larger name is treated as smaller and
/// evicted from the bounded heap first.
struct ByProjectedSelfTime(HotspotFunction);

impl Ord for ByProjectedSelfTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .projected_self_time_ms
            .total_cmp(&other.0.projected_self_time_ms)
            .then_with(|| other.0.display_name.cmp(&self.0.display_name))
    }
}

impl PartialOrd for ByProjectedSelfTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ByProjectedSelfTime {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ByProjectedSelfTime {}

/// Report inclusion filter
///
/// **Private** - drops synthetic names and framework code
fn should_include(key: &FunctionKey) -> bool {
    if key.funcname.trim().is_empty() {
        return false;
    }
    if key.funcname.starts_with('<') {
        return false;
    }
    !key.is_framework()
}

/// Select the top-N functions by projected self time
///
/// **Public** - bounded min-heap keeps memory at O(N); the result is
/// sorted descending and deterministic across runs.
pub fn extract_hotspots(
    result: &ProfilingResult,
    extrapolated: &HashMap<Rc<FunctionKey>, ExtrapolatedStats>,
    top_n: usize,
) -> Vec<HotspotFunction> {
    debug!(
        "Extracting top {top_n} hotspots from {} functions",
        result.function_stats.len()
    );

    let mut heap: BinaryHeap<Reverse<ByProjectedSelfTime>> = BinaryHeap::new();

    for (key, stats) in &result.function_stats {
        let Some(extra) = extrapolated.get(key) else {
            continue;
        };
        if !should_include(key) {
            continue;
        }

        heap.push(Reverse(ByProjectedSelfTime(HotspotFunction::new(
            key, stats, extra,
        ))));
        if heap.len() > top_n {
            heap.pop();
        }
    }

    let mut hotspots: Vec<HotspotFunction> =
        heap.into_iter().map(|Reverse(entry)| entry.0).collect();
    hotspots.sort_by(|a, b| {
        b.projected_self_time_ms
            .total_cmp(&a.projected_self_time_ms)
            .then_with(|| a.display_name.cmp(&b.display_name))
    });
    hotspots
}

/// Every included function, sorted by projected self time descending
///
/// **Public** - used by the full function table in the HTML report
pub fn all_functions(
    result: &ProfilingResult,
    extrapolated: &HashMap<Rc<FunctionKey>, ExtrapolatedStats>,
) -> Vec<HotspotFunction> {
    let mut functions: Vec<HotspotFunction> = result
        .function_stats
        .iter()
        .filter(|(key, _)| should_include(key))
        .filter_map(|(key, stats)| {
            extrapolated
                .get(key)
                .map(|extra| HotspotFunction::new(key, stats, extra))
        })
        .collect();

    functions.sort_by(|a, b| {
        b.projected_self_time_ms
            .total_cmp(&a.projected_self_time_ms)
            .then_with(|| a.display_name.cmp(&b.display_name))
    });
    functions
}

/// Group calls/time/projected-time by module
///
/// **Public** - sorted by projected time descending; modules with empty
/// names are dropped
pub fn aggregate_by_module(
    result: &ProfilingResult,
    extrapolated: &HashMap<Rc<FunctionKey>, ExtrapolatedStats>,
) -> Vec<ModuleAggregate> {
    let mut by_module: HashMap<&str, ModuleAggregate> = HashMap::new();
    let mut total_projected = 0.0;

    for (key, stats) in &result.function_stats {
        if !should_include(key) {
            continue;
        }

        let aggregate = by_module
            .entry(key.module.as_str())
            .or_insert_with(|| ModuleAggregate {
                module_name: key.module.clone(),
                function_count: 0,
                total_calls: 0,
                total_time_ms: 0.0,
                projected_time_ms: 0.0,
                percentage_of_total: 0.0,
            });

        aggregate.function_count += 1;
        aggregate.total_calls += stats.call_count;
        aggregate.total_time_ms += stats.total_time_ms;

        if let Some(extra) = extrapolated.get(key) {
            aggregate.projected_time_ms += extra.projected_time_ms;
            total_projected += extra.projected_time_ms;
        }
    }

    let mut aggregates: Vec<ModuleAggregate> = by_module
        .into_values()
        .filter(|aggregate| !aggregate.module_name.is_empty())
        .collect();

    if total_projected > 0.0 {
        for aggregate in &mut aggregates {
            aggregate.percentage_of_total =
                (aggregate.projected_time_ms / total_projected) * 100.0;
        }
    }

    aggregates.sort_by(|a, b| {
        b.projected_time_ms
            .total_cmp(&a.projected_time_ms)
            .then_with(|| a.module_name.cmp(&b.module_name))
    });
    aggregates
}
