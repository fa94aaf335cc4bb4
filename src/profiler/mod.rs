//! The call/return event tracer.
//!
//! `Profiler` consumes call and return events delivered synchronously by a
//! host integration layer and maintains:
//! - per-function aggregate statistics (counts, inclusive time)
//! - a caller→callee edge table keyed by immediate-parent-at-call-time
//! - a single call stack identifying the current caller
//!
//! Exclusive (self) time is derived once at `stop()` from the edge table.
//! Nothing on the event path panics or returns errors: a profiler must
//! never destabilize the program it observes.
//!
//! One instance owns one logical call stack. The type holds `Rc` keys and
//! is not `Send`; multi-threaded hosts create one profiler per thread.

pub mod extrapolation;
pub mod identity;
pub mod resources;
pub mod stats;

pub use extrapolation::{extrapolate, ExtrapolatedStats};
pub use identity::{CallSite, FunctionKey, KeyResolver};
pub use resources::ResourceMonitor;
pub use stats::{CallEdge, FunctionStats, ProfilingResult, ResourceSnapshot};

use crate::config::ScopeConfig;
use log::debug;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Take a resource snapshot every Nth call of a function
const SAMPLE_INTERVAL: u64 = 100;

/// The profiler's own module namespace, always excluded from tracking
const SELF_NAMESPACE: &str = "callscope";

/// Inline call-graph profiler
///
/// **Public** - one instance per profiling session (and per thread).
///
/// Lifecycle: `start()` arms the tracer (idempotent), the host adapter
/// feeds `on_call`/`on_return` for every function boundary, and `stop()`
/// finalizes and returns the session's `ProfilingResult`.
pub struct Profiler {
    active: bool,

    function_stats: HashMap<Rc<FunctionKey>, FunctionStats>,
    call_edges: HashMap<(Rc<FunctionKey>, Rc<FunctionKey>), CallEdge>,
    call_stack: Vec<(Rc<FunctionKey>, Instant)>,

    resolver: KeyResolver,
    resource_monitor: ResourceMonitor,

    ignore_modules: Vec<String>,
    collapse_stdlib: bool,

    /// Monotonic session start plus the matching wall-clock timestamp
    started: Option<(Instant, f64)>,
}

impl Profiler {
    pub fn new(config: &ScopeConfig) -> Self {
        Self {
            active: false,
            function_stats: HashMap::new(),
            call_edges: HashMap::new(),
            call_stack: Vec::new(),
            resolver: KeyResolver::new(),
            resource_monitor: ResourceMonitor::new(
                config.enable_cpu_monitoring,
                config.enable_gpu_monitoring,
            ),
            ignore_modules: config.ignore_modules.clone(),
            collapse_stdlib: config.collapse_stdlib,
            started: None,
        }
    }

    /// Arm the tracer. Calling while already active is a no-op.
    pub fn start(&mut self) {
        if self.active {
            return;
        }

        self.active = true;
        self.started = Some((Instant::now(), unix_now()));
        debug!("profiler started");
    }

    /// Whether a session is currently active
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Handle a call event
    ///
    /// **Public** - fired by the host adapter on every function entry.
    /// Ignored identities are skipped entirely: they are never pushed, so
    /// they never become an edge-attribution parent and their time stays
    /// invisible.
    pub fn on_call(&mut self, site: &CallSite<'_>) {
        if !self.active {
            return;
        }

        let key = self.resolver.resolve(site);

        if self.should_ignore(&key) {
            return;
        }

        let stats = self.function_stats.entry(Rc::clone(&key)).or_default();

        if stats.first_call_time.is_none() {
            stats.first_call_time = Some(unix_now());
        }

        stats.call_count += 1;
        stats.sample_counter += 1;

        if stats.sample_counter % SAMPLE_INTERVAL == 0 {
            stats.resource_samples.push(self.resource_monitor.snapshot());
        }

        if let Some((caller, _)) = self.call_stack.last() {
            let edge_key = (Rc::clone(caller), Rc::clone(&key));
            self.call_edges.entry(edge_key).or_default().call_count += 1;
        }

        self.call_stack.push((key, Instant::now()));
    }

    /// Handle a return event
    ///
    /// **Public** - fired by the host adapter on every function exit.
    /// Mismatched events (empty stack, identities ignored at call time)
    /// are silently absorbed so visibility stays symmetric.
    pub fn on_return(&mut self) {
        if !self.active {
            return;
        }

        let Some((key, entry_time)) = self.call_stack.pop() else {
            return;
        };

        // A key missing from the map was ignored at call time; keep
        // call/return visibility symmetric by ignoring the return too.
        let Some(stats) = self.function_stats.get_mut(&key) else {
            return;
        };

        let elapsed_ms = entry_time.elapsed().as_secs_f64() * 1000.0;
        stats.total_time_ms += elapsed_ms;

        if !stats.resource_samples.is_empty() {
            for sample in &stats.resource_samples {
                if sample.memory_mb > stats.peak_memory_mb {
                    stats.peak_memory_mb = sample.memory_mb;
                }
            }

            if stats.avg_cpu_percent == 0.0 {
                let sum: f64 = stats.resource_samples.iter().map(|s| s.cpu_percent).sum();
                stats.avg_cpu_percent = sum / stats.resource_samples.len() as f64;
            }
        }
        // Bounded memory: only the most recent invocation's samples are kept
        stats.resource_samples.clear();

        if let Some((caller, _)) = self.call_stack.last() {
            let edge_key = (Rc::clone(caller), Rc::clone(&key));
            if let Some(edge) = self.call_edges.get_mut(&edge_key) {
                edge.total_time_ms += elapsed_ms;
            }
        }
    }

    /// Stop the session and return its finalized result
    ///
    /// **Public** - returns `None` when no session is active. Internal
    /// state is cleared, so the next `start()` begins a fresh session.
    pub fn stop(&mut self) -> Option<ProfilingResult> {
        if !self.active {
            return None;
        }

        self.active = false;
        let end_timestamp = unix_now();
        let (start_instant, start_timestamp) = self.started.take()?;
        let total_runtime_ms = start_instant.elapsed().as_secs_f64() * 1000.0;

        self.finalize_resource_metrics();
        self.finalize_self_times();

        let result = ProfilingResult {
            function_stats: std::mem::take(&mut self.function_stats),
            call_edges: std::mem::take(&mut self.call_edges),
            total_runtime_ms,
            start_timestamp,
            end_timestamp,
        };

        self.call_stack.clear();

        debug!(
            "profiler stopped: {} functions, {} edges, {:.2}ms",
            result.function_stats.len(),
            result.call_edges.len(),
            result.total_runtime_ms
        );

        Some(result)
    }

    /// Derive exclusive time from the edge table
    ///
    /// **Private** - single global pass: sum every caller's attributed
    /// callee time, then subtract per function. Edges are keyed by
    /// immediate-parent-at-call-time, so callee time fully partitions
    /// under one caller at a time.
    fn finalize_self_times(&mut self) {
        let mut caller_children: HashMap<Rc<FunctionKey>, f64> = HashMap::new();
        for ((caller, _), edge) in &self.call_edges {
            *caller_children.entry(Rc::clone(caller)).or_insert(0.0) += edge.total_time_ms;
        }

        for (key, stats) in &mut self.function_stats {
            let children = caller_children.get(key).copied().unwrap_or(0.0);
            let self_time = stats.total_time_ms - children;
            if self_time < 0.0 {
                debug!(
                    "clamping negative self time for {} ({self_time:.3}ms)",
                    key.display_name()
                );
            }
            stats.self_time_ms = self_time.max(0.0);
        }
    }

    /// Fold retained resource samples into per-device GPU metrics
    ///
    /// **Private** - sized to however many devices the last retained
    /// snapshot saw; samples missing a device index are skipped.
    fn finalize_resource_metrics(&mut self) {
        for stats in self.function_stats.values_mut() {
            let Some(last) = stats.resource_samples.last() else {
                continue;
            };

            if last.gpu_utilization.is_empty() {
                continue;
            }

            let num_gpus = last.gpu_utilization.len();
            let sample_count = stats.resource_samples.len() as f64;

            stats.avg_gpu_utilization = (0..num_gpus)
                .map(|i| {
                    let sum: f64 = stats
                        .resource_samples
                        .iter()
                        .filter_map(|s| s.gpu_utilization.get(i))
                        .sum();
                    sum / sample_count
                })
                .collect();

            stats.peak_gpu_memory_mb = (0..num_gpus)
                .map(|i| {
                    stats
                        .resource_samples
                        .iter()
                        .filter_map(|s| s.gpu_memory_mb.get(i))
                        .fold(0.0_f64, |peak, &mb| peak.max(mb))
                })
                .collect();
        }
    }

    /// Exclusion policy for a resolved identity
    ///
    /// **Private** - framework collapse, self-exclusion, and configured
    /// ignore substrings matched against filename or module
    fn should_ignore(&self, key: &FunctionKey) -> bool {
        if self.collapse_stdlib && key.is_framework() {
            return true;
        }

        if key.module == SELF_NAMESPACE
            || key
                .module
                .strip_prefix(SELF_NAMESPACE)
                .is_some_and(|rest| rest.starts_with('.'))
        {
            return true;
        }

        self.ignore_modules
            .iter()
            .any(|ignored| key.filename.contains(ignored) || key.module.contains(ignored))
    }
}

/// Wall-clock time as unix seconds
fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ScopeConfig {
        ScopeConfig {
            enable_cpu_monitoring: false,
            enable_gpu_monitoring: false,
            ..Default::default()
        }
    }

    fn site<'a>(module: &'a str, funcname: &'a str) -> CallSite<'a> {
        CallSite {
            module,
            filename: "pipeline.py",
            funcname,
            lineno: 1,
            receiver_type: None,
        }
    }

    fn find<'a>(
        result: &'a ProfilingResult,
        funcname: &str,
    ) -> (&'a Rc<FunctionKey>, &'a FunctionStats) {
        result
            .function_stats
            .iter()
            .find(|(key, _)| key.funcname == funcname)
            .unwrap_or_else(|| panic!("function {funcname} not tracked"))
    }

    #[test]
    fn test_stop_before_start_returns_none() {
        let mut profiler = Profiler::new(&test_config());
        assert!(profiler.stop().is_none());
    }

    #[test]
    fn test_start_is_idempotent() {
        let mut profiler = Profiler::new(&test_config());
        profiler.start();
        profiler.start();

        profiler.on_call(&site("m", "f"));
        profiler.on_return();

        let result = profiler.stop().unwrap();
        let (_, stats) = find(&result, "f");
        assert_eq!(stats.call_count, 1);

        // second stop is a fresh (inactive) session
        assert!(profiler.stop().is_none());
    }

    #[test]
    fn test_events_ignored_when_inactive() {
        let mut profiler = Profiler::new(&test_config());
        profiler.on_call(&site("m", "f"));
        profiler.on_return();

        profiler.start();
        let result = profiler.stop().unwrap();
        assert!(result.function_stats.is_empty());
    }

    #[test]
    fn test_unmatched_return_is_absorbed() {
        let mut profiler = Profiler::new(&test_config());
        profiler.start();
        profiler.on_return();
        profiler.on_return();

        let result = profiler.stop().unwrap();
        assert!(result.function_stats.is_empty());
    }

    #[test]
    fn test_edge_attribution() {
        let mut profiler = Profiler::new(&test_config());
        profiler.start();

        profiler.on_call(&site("m", "outer"));
        profiler.on_call(&site("m", "inner"));
        profiler.on_return();
        profiler.on_return();

        let result = profiler.stop().unwrap();
        assert_eq!(result.function_stats.len(), 2);
        assert_eq!(result.call_edges.len(), 1);

        let ((caller, callee), edge) = result.call_edges.iter().next().unwrap();
        assert_eq!(caller.funcname, "outer");
        assert_eq!(callee.funcname, "inner");
        assert_eq!(edge.call_count, 1);
    }

    #[test]
    fn test_self_time_identity() {
        let mut profiler = Profiler::new(&test_config());
        profiler.start();

        profiler.on_call(&site("m", "outer"));
        for _ in 0..3 {
            profiler.on_call(&site("m", "inner"));
            profiler.on_return();
        }
        profiler.on_return();

        let result = profiler.stop().unwrap();

        for (key, stats) in &result.function_stats {
            let children: f64 = result
                .call_edges
                .iter()
                .filter(|((caller, _), _)| caller == key)
                .map(|(_, edge)| edge.total_time_ms)
                .sum();
            assert!((stats.self_time_ms - (stats.total_time_ms - children)).abs() < 1e-9);
            assert!(stats.self_time_ms <= stats.total_time_ms + 1e-9);
        }
    }

    #[test]
    fn test_recursion_counts_each_frame() {
        let mut profiler = Profiler::new(&test_config());
        profiler.start();

        // fact(3): fact calls itself down to the base case
        for _ in 0..4 {
            profiler.on_call(&site("m", "fact"));
        }
        for _ in 0..4 {
            profiler.on_return();
        }

        let result = profiler.stop().unwrap();
        let (key, stats) = find(&result, "fact");
        assert_eq!(stats.call_count, 4);

        let edge = result
            .call_edges
            .get(&(Rc::clone(key), Rc::clone(key)))
            .expect("recursive self edge");
        assert_eq!(edge.call_count, 3);
    }

    #[test]
    fn test_ignored_function_is_invisible() {
        let mut profiler = Profiler::new(&test_config());
        profiler.start();

        profiler.on_call(&site("m", "outer"));
        profiler.on_call(&CallSite {
            module: "numpy",
            filename: "/venv/site-packages/numpy/core.py",
            funcname: "dot",
            lineno: 1,
            receiver_type: None,
        });
        profiler.on_return(); // pops outer, not the ignored call
        profiler.on_return(); // empty stack, absorbed

        let result = profiler.stop().unwrap();
        assert_eq!(result.function_stats.len(), 1);
        assert!(result.call_edges.is_empty());

        let (_, stats) = find(&result, "outer");
        // no edges means all of outer's time is its own
        assert!((stats.self_time_ms - stats.total_time_ms).abs() < 1e-9);
    }

    #[test]
    fn test_self_namespace_excluded() {
        let mut profiler = Profiler::new(&test_config());
        profiler.start();

        profiler.on_call(&CallSite {
            module: "callscope.profiler",
            filename: "profiler.rs",
            funcname: "on_call",
            lineno: 1,
            receiver_type: None,
        });

        let result = profiler.stop().unwrap();
        assert!(result.function_stats.is_empty());
    }

    #[test]
    fn test_collapse_stdlib_can_be_disabled() {
        let config = ScopeConfig {
            collapse_stdlib: false,
            ignore_modules: Vec::new(),
            enable_cpu_monitoring: false,
            enable_gpu_monitoring: false,
            ..Default::default()
        };
        let mut profiler = Profiler::new(&config);
        profiler.start();

        profiler.on_call(&CallSite {
            module: "json.decoder",
            filename: "/usr/lib/json/decoder.py",
            funcname: "decode",
            lineno: 1,
            receiver_type: None,
        });
        profiler.on_return();

        let result = profiler.stop().unwrap();
        assert_eq!(result.function_stats.len(), 1);
    }

    #[test]
    fn test_stop_clears_state() {
        let mut profiler = Profiler::new(&test_config());
        profiler.start();
        profiler.on_call(&site("m", "f"));
        profiler.on_return();
        let first = profiler.stop().unwrap();
        assert_eq!(first.function_stats.len(), 1);

        profiler.start();
        let second = profiler.stop().unwrap();
        assert!(second.function_stats.is_empty());
        assert!(second.call_edges.is_empty());
    }
}
