//! Stored profile schema.
//!
//! The JSON contract for a stored run: run-level metadata, per-function
//! aggregates merged with their projections, and the caller/callee edge
//! table. Collections are sorted and times rounded before serialization
//! so identical sessions produce byte-identical files.

use crate::profiler::extrapolation::ExtrapolatedStats;
use crate::profiler::identity::FunctionKey;
use crate::profiler::stats::ProfilingResult;
use crate::utils::round2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::rc::Rc;

/// Run-level statistics stored under the `metadata` key
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunMetadata {
    pub total_runtime_ms: f64,
    pub start_timestamp: f64,
    pub end_timestamp: f64,
    pub total_functions: usize,
}

/// One function's stored aggregates and projections
///
/// **Public** - the projected fields default to zero so profiles written
/// before extrapolation existed still deserialize.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionRecord {
    pub module: String,
    pub filename: String,
    pub funcname: String,
    pub lineno: u32,
    pub classname: Option<String>,
    pub display_name: String,

    pub call_count: u64,
    pub total_time_ms: f64,
    pub self_time_ms: f64,
    pub avg_time_ms: f64,

    pub avg_cpu_percent: f64,
    pub peak_memory_mb: f64,

    #[serde(default)]
    pub projected_calls: u64,
    #[serde(default)]
    pub projected_time_ms: f64,
    #[serde(default)]
    pub projected_self_time_ms: f64,
    #[serde(default)]
    pub percentage_of_total: f64,
}

impl FunctionRecord {
    /// Cross-run identity, stable across line-number churn
    ///
    /// **Public** - the diff layer matches functions between runs by this
    pub fn signature(&self) -> String {
        match &self.classname {
            Some(class) => format!("{}.{}.{}", self.module, class, self.funcname),
            None => format!("{}.{}", self.module, self.funcname),
        }
    }
}

/// One caller→callee relationship in the stored profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallEdgeRecord {
    pub caller: String,
    pub callee: String,
    pub call_count: u64,
    pub total_time_ms: f64,
    pub avg_time_ms: f64,
}

/// Complete stored profile for one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileData {
    pub metadata: RunMetadata,
    pub functions: Vec<FunctionRecord>,
    pub call_edges: Vec<CallEdgeRecord>,
}

/// Flatten a profiling result and its projections into the stored schema
///
/// **Public** - functions sort by display name, edges by (caller, callee)
pub fn build_profile_data(
    result: &ProfilingResult,
    extrapolated: &HashMap<Rc<FunctionKey>, ExtrapolatedStats>,
) -> ProfileData {
    let mut functions: Vec<FunctionRecord> = result
        .function_stats
        .iter()
        .map(|(key, stats)| {
            let projection = extrapolated.get(key);
            FunctionRecord {
                module: key.module.clone(),
                filename: key.filename.clone(),
                funcname: key.funcname.clone(),
                lineno: key.lineno,
                classname: key.classname.clone(),
                display_name: key.display_name().to_string(),
                call_count: stats.call_count,
                total_time_ms: round2(stats.total_time_ms),
                self_time_ms: round2(stats.self_time_ms),
                avg_time_ms: round2(stats.avg_time_ms()),
                avg_cpu_percent: round2(stats.avg_cpu_percent),
                peak_memory_mb: round2(stats.peak_memory_mb),
                projected_calls: projection.map(|p| p.projected_calls).unwrap_or(0),
                projected_time_ms: round2(
                    projection.map(|p| p.projected_time_ms).unwrap_or(0.0),
                ),
                projected_self_time_ms: round2(
                    projection.map(|p| p.projected_self_time_ms).unwrap_or(0.0),
                ),
                percentage_of_total: round2(
                    projection.map(|p| p.percentage_of_total).unwrap_or(0.0),
                ),
            }
        })
        .collect();
    functions.sort_by(|a, b| a.display_name.cmp(&b.display_name));

    let mut call_edges: Vec<CallEdgeRecord> = result
        .call_edges
        .iter()
        .map(|((caller, callee), edge)| CallEdgeRecord {
            caller: caller.display_name().to_string(),
            callee: callee.display_name().to_string(),
            call_count: edge.call_count,
            total_time_ms: round2(edge.total_time_ms),
            avg_time_ms: round2(edge.avg_time_ms()),
        })
        .collect();
    call_edges.sort_by(|a, b| (&a.caller, &a.callee).cmp(&(&b.caller, &b.callee)));

    ProfileData {
        metadata: RunMetadata {
            total_runtime_ms: round2(result.total_runtime_ms),
            start_timestamp: result.start_timestamp,
            end_timestamp: result.end_timestamp,
            total_functions: functions.len(),
        },
        functions,
        call_edges,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiler::stats::{CallEdge, FunctionStats};

    fn sample_result() -> ProfilingResult {
        let outer = Rc::new(FunctionKey::new("etl", "etl.py", "outer", 1, None));
        let inner = Rc::new(FunctionKey::new("etl", "etl.py", "inner", 9, None));

        let mut function_stats = HashMap::new();
        function_stats.insert(
            Rc::clone(&outer),
            FunctionStats {
                call_count: 2,
                total_time_ms: 10.005,
                self_time_ms: 4.0,
                ..Default::default()
            },
        );
        function_stats.insert(
            Rc::clone(&inner),
            FunctionStats {
                call_count: 4,
                total_time_ms: 6.0,
                self_time_ms: 6.0,
                ..Default::default()
            },
        );

        let mut call_edges = HashMap::new();
        call_edges.insert(
            (outer, inner),
            CallEdge {
                call_count: 4,
                total_time_ms: 6.0,
            },
        );

        ProfilingResult {
            function_stats,
            call_edges,
            total_runtime_ms: 10.005,
            start_timestamp: 1000.0,
            end_timestamp: 1000.01,
        }
    }

    #[test]
    fn test_build_sorts_and_rounds() {
        let result = sample_result();
        let extrapolated =
            crate::profiler::extrapolation::extrapolate(&result, &Default::default());

        let data = build_profile_data(&result, &extrapolated);

        assert_eq!(data.metadata.total_functions, 2);
        assert_eq!(data.metadata.total_runtime_ms, 10.01);

        // functions sorted by display name
        assert_eq!(data.functions[0].display_name, "etl.inner");
        assert_eq!(data.functions[1].display_name, "etl.outer");
        assert_eq!(data.functions[1].total_time_ms, 10.01);
        assert_eq!(data.functions[1].avg_time_ms, 5.0);

        assert_eq!(data.call_edges.len(), 1);
        assert_eq!(data.call_edges[0].caller, "etl.outer");
        assert_eq!(data.call_edges[0].callee, "etl.inner");
        assert_eq!(data.call_edges[0].avg_time_ms, 1.5);
    }

    #[test]
    fn test_signature_includes_classname() {
        let record = FunctionRecord {
            module: "etl".to_string(),
            filename: "etl.py".to_string(),
            funcname: "run".to_string(),
            lineno: 1,
            classname: Some("Loader".to_string()),
            display_name: "etl.Loader.run".to_string(),
            call_count: 0,
            total_time_ms: 0.0,
            self_time_ms: 0.0,
            avg_time_ms: 0.0,
            avg_cpu_percent: 0.0,
            peak_memory_mb: 0.0,
            projected_calls: 0,
            projected_time_ms: 0.0,
            projected_self_time_ms: 0.0,
            percentage_of_total: 0.0,
        };
        assert_eq!(record.signature(), "etl.Loader.run");

        let plain = FunctionRecord {
            classname: None,
            ..record
        };
        assert_eq!(plain.signature(), "etl.run");
    }

    #[test]
    fn test_missing_projection_defaults_to_zero() {
        let result = sample_result();
        let data = build_profile_data(&result, &HashMap::new());

        for function in &data.functions {
            assert_eq!(function.projected_calls, 0);
            assert_eq!(function.projected_time_ms, 0.0);
            assert_eq!(function.percentage_of_total, 0.0);
        }
    }
}
