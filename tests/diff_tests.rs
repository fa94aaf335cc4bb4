//! Run comparison over stored profiles, end to end on disk.

use callscope::diff::compare_runs;
use callscope::output::{
    write_profile_data, CallEdgeRecord, FunctionRecord, ProfileData, RunMetadata,
};
use callscope::utils::DiffError;
use std::path::Path;

fn record(funcname: &str, projected_time_ms: f64) -> FunctionRecord {
    FunctionRecord {
        module: "etl".to_string(),
        filename: "etl.py".to_string(),
        funcname: funcname.to_string(),
        lineno: 1,
        classname: None,
        display_name: format!("etl.{funcname}"),
        call_count: 10,
        total_time_ms: projected_time_ms / 100.0,
        self_time_ms: projected_time_ms / 100.0,
        avg_time_ms: projected_time_ms / 1000.0,
        avg_cpu_percent: 0.0,
        peak_memory_mb: 0.0,
        projected_calls: 1000,
        projected_time_ms,
        projected_self_time_ms: projected_time_ms,
        percentage_of_total: 0.0,
    }
}

fn write_run(output_dir: &Path, run_id: &str, functions: Vec<FunctionRecord>) {
    let data = ProfileData {
        metadata: RunMetadata {
            total_runtime_ms: 100.0,
            start_timestamp: 1000.0,
            end_timestamp: 1000.1,
            total_functions: functions.len(),
        },
        functions,
        call_edges: Vec::<CallEdgeRecord>::new(),
    };
    write_profile_data(&data, output_dir.join(run_id).join("profile_data.json")).unwrap();
}

#[test]
fn comparison_classifies_every_change_kind() {
    let dir = tempfile::tempdir().unwrap();
    write_run(
        dir.path(),
        "run_1000",
        vec![
            record("load", 100.0),
            record("parse", 50.0),
            record("clean", 20.0),
            record("report", 40.0),
        ],
    );
    write_run(
        dir.path(),
        "run_2000",
        vec![
            record("load", 30.0),    // improved
            record("parse", 90.0),   // regressed
            record("save", 10.0),    // new
            record("report", 41.0),  // stable, within threshold
        ],
    );

    let html = compare_runs(dir.path(), None).unwrap();

    assert!(html.contains("run_1000 → run_2000"));
    assert!(html.contains("Improved Functions (1)"));
    assert!(html.contains("Regressed Functions (1)"));
    assert!(html.contains("New Functions (1)"));
    assert!(html.contains("Removed Functions (1)"));
    assert!(html.contains("etl.load"));
    assert!(html.contains("etl.save"));
    assert!(html.contains("etl.clean"));
    // stable functions stay out of the report
    assert!(!html.contains("etl.report"));
}

#[test]
fn comparison_uses_latest_two_runs() {
    let dir = tempfile::tempdir().unwrap();
    write_run(dir.path(), "run_1000", vec![record("load", 100.0)]);
    write_run(dir.path(), "run_2000", vec![record("load", 100.0)]);
    write_run(dir.path(), "run_3000", vec![record("load", 10.0)]);

    let html = compare_runs(dir.path(), None).unwrap();
    assert!(html.contains("run_2000 → run_3000"));
    assert!(html.contains("Improved Functions (1)"));
}

#[test]
fn explicit_run_ids_restrict_the_comparison() {
    let dir = tempfile::tempdir().unwrap();
    write_run(dir.path(), "run_1000", vec![record("load", 100.0)]);
    write_run(dir.path(), "run_2000", vec![record("load", 200.0)]);
    write_run(dir.path(), "run_3000", vec![record("load", 200.0)]);

    let runs = vec!["run_1000".to_string(), "run_2000".to_string()];
    let html = compare_runs(dir.path(), Some(&runs)).unwrap();

    assert!(html.contains("run_1000 → run_2000"));
    assert!(html.contains("Regressed Functions (1)"));
}

#[test]
fn single_run_is_not_enough() {
    let dir = tempfile::tempdir().unwrap();
    write_run(dir.path(), "run_1000", vec![record("load", 100.0)]);

    let result = compare_runs(dir.path(), None);
    assert!(matches!(result, Err(DiffError::NotEnoughRuns(1))));
}

#[test]
fn missing_profile_json_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    write_run(dir.path(), "run_1000", vec![record("load", 100.0)]);
    std::fs::create_dir_all(dir.path().join("run_2000")).unwrap();

    let result = compare_runs(dir.path(), None);
    assert!(matches!(result, Err(DiffError::MissingRunData(_))));
}

#[test]
fn malformed_profile_json_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    write_run(dir.path(), "run_1000", vec![record("load", 100.0)]);
    std::fs::create_dir_all(dir.path().join("run_2000")).unwrap();
    std::fs::write(dir.path().join("run_2000/profile_data.json"), "{oops").unwrap();

    let result = compare_runs(dir.path(), None);
    assert!(matches!(result, Err(DiffError::MalformedData(_))));
}

#[test]
fn non_run_directories_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    write_run(dir.path(), "run_1000", vec![record("load", 100.0)]);
    write_run(dir.path(), "run_2000", vec![record("load", 100.0)]);
    std::fs::create_dir_all(dir.path().join("scratch")).unwrap();

    // scratch/ has no profile but does not break the comparison
    assert!(compare_runs(dir.path(), None).is_ok());
}
