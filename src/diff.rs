//! Comparison of stored profiling runs.
//!
//! Loads serialized profiles from `run_*` directories under the output
//! directory, matches functions across runs by their stable signature,
//! and classifies each as improved, regressed, new, removed, or stable
//! based on projected time. Unlike the tracer, this layer fails loudly:
//! missing directories and malformed snapshots propagate to the CLI.

use crate::output::read_profile_data;
use crate::output::schema::FunctionRecord;
use crate::utils::error::DiffError;
use chrono::Local;
use log::{debug, info};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;

/// Projected-time change (in percent) separating stable from changed
const CHANGE_THRESHOLD_PERCENT: f64 = 10.0;

/// Classification of one function between two runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeStatus {
    Improved,
    Regressed,
    New,
    Removed,
    Stable,
}

/// A function's metrics across every loaded run
///
/// **Public** - keyed by the cross-run signature
#[derive(Debug, Clone)]
pub struct FunctionComparison {
    pub signature: String,
    pub runs: HashMap<String, FunctionRecord>,
}

impl FunctionComparison {
    pub fn new(signature: impl Into<String>) -> Self {
        Self {
            signature: signature.into(),
            runs: HashMap::new(),
        }
    }

    pub fn add_run(&mut self, run_id: impl Into<String>, record: FunctionRecord) {
        self.runs.insert(run_id.into(), record);
    }

    /// Classify the change from `run1` to `run2`
    ///
    /// **Public** - returns the status plus the percent change in
    /// projected time (0 for new/removed/absent)
    pub fn get_change(&self, run1_id: &str, run2_id: &str) -> (ChangeStatus, f64) {
        let before = self.runs.get(run1_id);
        let after = self.runs.get(run2_id);

        let (before, after) = match (before, after) {
            (None, Some(_)) => return (ChangeStatus::New, 0.0),
            (Some(_), None) => return (ChangeStatus::Removed, 0.0),
            (None, None) => return (ChangeStatus::Stable, 0.0),
            (Some(before), Some(after)) => (before, after),
        };

        if before.projected_time_ms == 0.0 {
            return (ChangeStatus::Stable, 0.0);
        }

        let percent_change = ((after.projected_time_ms - before.projected_time_ms)
            / before.projected_time_ms)
            * 100.0;

        let status = if percent_change < -CHANGE_THRESHOLD_PERCENT {
            ChangeStatus::Improved
        } else if percent_change > CHANGE_THRESHOLD_PERCENT {
            ChangeStatus::Regressed
        } else {
            ChangeStatus::Stable
        };

        (status, percent_change)
    }
}

/// Load one run directory's profile, keyed by function signature
///
/// **Public** - returns (run_id, signature → record)
pub fn load_run_data(run_dir: &Path) -> Result<(String, HashMap<String, FunctionRecord>), DiffError> {
    let json_path = run_dir.join("profile_data.json");

    if !json_path.exists() {
        return Err(DiffError::MissingRunData(run_dir.display().to_string()));
    }

    let data = read_profile_data(&json_path).map_err(|e| match e {
        crate::utils::error::OutputError::SerializationFailed(e) => DiffError::MalformedData(e),
        crate::utils::error::OutputError::WriteFailed(e) => DiffError::Io(e),
        crate::utils::error::OutputError::InvalidPath(p) => DiffError::MissingRunData(p),
    })?;

    let run_id = run_dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let functions = data
        .functions
        .into_iter()
        .map(|record| (record.signature(), record))
        .collect();

    Ok((run_id, functions))
}

/// Compare stored runs and render the HTML comparison report
///
/// **Public** - `run_ids: None` compares every `run_*` directory found;
/// the report always contrasts the latest two runs by sorted id.
pub fn compare_runs(output_dir: &Path, run_ids: Option<&[String]>) -> Result<String, DiffError> {
    if !output_dir.exists() {
        return Err(DiffError::OutputDirNotFound(
            output_dir.display().to_string(),
        ));
    }

    let mut run_dirs: Vec<_> = std::fs::read_dir(output_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_dir()
                && path
                    .file_name()
                    .map(|name| name.to_string_lossy().starts_with("run_"))
                    .unwrap_or(false)
        })
        .collect();
    run_dirs.sort();

    if let Some(ids) = run_ids {
        run_dirs.retain(|dir| {
            dir.file_name()
                .map(|name| ids.iter().any(|id| id.as_str() == name.to_string_lossy()))
                .unwrap_or(false)
        });
    }

    if run_dirs.len() < 2 {
        return Err(DiffError::NotEnoughRuns(run_dirs.len()));
    }

    info!("Comparing {} runs in {}", run_dirs.len(), output_dir.display());

    let mut all_runs: HashMap<String, HashMap<String, FunctionRecord>> = HashMap::new();
    for run_dir in &run_dirs {
        let (run_id, functions) = load_run_data(run_dir)?;
        all_runs.insert(run_id, functions);
    }

    let mut comparisons: HashMap<String, FunctionComparison> = HashMap::new();
    for (run_id, functions) in &all_runs {
        for (signature, record) in functions {
            comparisons
                .entry(signature.clone())
                .or_insert_with(|| FunctionComparison::new(signature.clone()))
                .add_run(run_id.clone(), record.clone());
        }
    }

    let mut sorted_ids: Vec<&String> = all_runs.keys().collect();
    sorted_ids.sort();
    let run1_id = sorted_ids[sorted_ids.len() - 2].clone();
    let run2_id = sorted_ids[sorted_ids.len() - 1].clone();

    debug!("Contrasting {run1_id} → {run2_id}");

    let mut improved = Vec::new();
    let mut regressed = Vec::new();
    let mut new_funcs = Vec::new();
    let mut removed_funcs = Vec::new();

    for comparison in comparisons.values() {
        let (status, percent_change) = comparison.get_change(&run1_id, &run2_id);
        match status {
            ChangeStatus::Improved => improved.push((
                comparison.signature.clone(),
                percent_change,
                comparison.runs[&run2_id].clone(),
            )),
            ChangeStatus::Regressed => regressed.push((
                comparison.signature.clone(),
                percent_change,
                comparison.runs[&run2_id].clone(),
            )),
            ChangeStatus::New => {
                new_funcs.push((comparison.signature.clone(), comparison.runs[&run2_id].clone()))
            }
            ChangeStatus::Removed => removed_funcs.push((
                comparison.signature.clone(),
                comparison.runs[&run1_id].clone(),
            )),
            ChangeStatus::Stable => {}
        }
    }

    improved.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    regressed.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    new_funcs.sort_by(|a, b| a.0.cmp(&b.0));
    removed_funcs.sort_by(|a, b| a.0.cmp(&b.0));

    Ok(generate_comparison_html(
        &run1_id,
        &run2_id,
        &improved,
        &regressed,
        &new_funcs,
        &removed_funcs,
    ))
}

/// Render the comparison report
///
/// **Private** - one section per change category, omitted when empty
fn generate_comparison_html(
    run1_id: &str,
    run2_id: &str,
    improved: &[(String, f64, FunctionRecord)],
    regressed: &[(String, f64, FunctionRecord)],
    new_funcs: &[(String, FunctionRecord)],
    removed_funcs: &[(String, FunctionRecord)],
) -> String {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");

    let mut html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Callscope Comparison Report</title>
    <style>
        * {{ margin: 0; padding: 0; box-sizing: border-box; }}
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            background: #f8f9fa;
            color: #212529;
            padding: 20px;
        }}
        .container {{ max-width: 1200px; margin: 0 auto; }}
        .header, .section {{
            background: white;
            padding: 30px;
            border-radius: 8px;
            box-shadow: 0 2px 4px rgba(0,0,0,0.1);
            margin-bottom: 20px;
        }}
        h1 {{ font-size: 28px; margin-bottom: 10px; }}
        .meta {{ color: #6c757d; font-size: 14px; }}
        .section-title {{
            font-size: 20px;
            font-weight: 700;
            margin-bottom: 20px;
            padding-bottom: 10px;
            border-bottom: 2px solid #e9ecef;
        }}
        .improved {{ border-left: 4px solid #28a745; }}
        .regressed {{ border-left: 4px solid #dc3545; }}
        .new {{ border-left: 4px solid #007bff; }}
        .removed {{ border-left: 4px solid #6c757d; }}
        table {{ width: 100%; border-collapse: collapse; font-size: 14px; }}
        th {{
            background: #f8f9fa;
            padding: 12px;
            text-align: left;
            font-weight: 600;
            border-bottom: 2px solid #dee2e6;
        }}
        td {{ padding: 12px; border-bottom: 1px solid #e9ecef; }}
    </style>
</head>
<body>
    <div class="container">
        <div class="header">
            <h1>Callscope Comparison Report</h1>
            <div class="meta">
                Comparing: {run1_id} → {run2_id}<br>
                Generated: {timestamp}
            </div>
        </div>
"#
    );

    push_change_section(&mut html, "improved", "Improved Functions", improved, true);
    push_change_section(&mut html, "regressed", "Regressed Functions", regressed, false);

    if !new_funcs.is_empty() {
        let _ = write!(
            html,
            r#"        <div class="section new">
            <div class="section-title">+ New Functions ({})</div>
            <table>
                <thead>
                    <tr><th>Function</th><th>Time (ms)</th><th>% of Total</th></tr>
                </thead>
                <tbody>
"#,
            new_funcs.len()
        );
        for (signature, record) in new_funcs {
            let _ = write!(
                html,
                "                    <tr><td><strong>{}</strong></td><td>{:.2}</td><td>{:.2}%</td></tr>\n",
                signature, record.projected_time_ms, record.percentage_of_total
            );
        }
        html.push_str("                </tbody>\n            </table>\n        </div>\n");
    }

    if !removed_funcs.is_empty() {
        let _ = write!(
            html,
            r#"        <div class="section removed">
            <div class="section-title">- Removed Functions ({})</div>
            <table>
                <thead>
                    <tr><th>Function</th><th>Previous Time (ms)</th></tr>
                </thead>
                <tbody>
"#,
            removed_funcs.len()
        );
        for (signature, record) in removed_funcs {
            let _ = write!(
                html,
                "                    <tr><td>{}</td><td>{:.2}</td></tr>\n",
                signature, record.projected_time_ms
            );
        }
        html.push_str("                </tbody>\n            </table>\n        </div>\n");
    }

    html.push_str("    </div>\n</body>\n</html>\n");
    html
}

fn push_change_section(
    html: &mut String,
    class: &str,
    title: &str,
    rows: &[(String, f64, FunctionRecord)],
    improved: bool,
) {
    if rows.is_empty() {
        return;
    }

    let _ = write!(
        html,
        r#"        <div class="section {class}">
            <div class="section-title">{marker} {title} ({count})</div>
            <table>
                <thead>
                    <tr><th>Function</th><th>Change</th><th>New Time (ms)</th><th>% of Total</th></tr>
                </thead>
                <tbody>
"#,
        marker = if improved { "✓" } else { "⚠" },
        count = rows.len(),
    );

    for (signature, percent_change, record) in rows {
        let sign = if *percent_change > 0.0 { "+" } else { "" };
        let _ = write!(
            html,
            "                    <tr><td><strong>{}</strong></td><td>{}{:.1}%</td><td>{:.2}</td><td>{:.2}%</td></tr>\n",
            signature, sign, percent_change, record.projected_time_ms, record.percentage_of_total
        );
    }

    html.push_str("                </tbody>\n            </table>\n        </div>\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(projected_time_ms: f64) -> FunctionRecord {
        FunctionRecord {
            module: "etl".to_string(),
            filename: "etl.py".to_string(),
            funcname: "run".to_string(),
            lineno: 1,
            classname: None,
            display_name: "etl.run".to_string(),
            call_count: 1,
            total_time_ms: 0.0,
            self_time_ms: 0.0,
            avg_time_ms: 0.0,
            avg_cpu_percent: 0.0,
            peak_memory_mb: 0.0,
            projected_calls: 0,
            projected_time_ms,
            projected_self_time_ms: 0.0,
            percentage_of_total: 0.0,
        }
    }

    #[test]
    fn test_change_classification() {
        let mut comparison = FunctionComparison::new("etl.run");
        comparison.add_run("run_1", record(100.0));
        comparison.add_run("run_2", record(50.0));

        let (status, change) = comparison.get_change("run_1", "run_2");
        assert_eq!(status, ChangeStatus::Improved);
        assert_eq!(change, -50.0);
    }

    #[test]
    fn test_regression_above_threshold() {
        let mut comparison = FunctionComparison::new("etl.run");
        comparison.add_run("run_1", record(100.0));
        comparison.add_run("run_2", record(150.0));

        let (status, _) = comparison.get_change("run_1", "run_2");
        assert_eq!(status, ChangeStatus::Regressed);
    }

    #[test]
    fn test_small_change_is_stable() {
        let mut comparison = FunctionComparison::new("etl.run");
        comparison.add_run("run_1", record(100.0));
        comparison.add_run("run_2", record(105.0));

        let (status, change) = comparison.get_change("run_1", "run_2");
        assert_eq!(status, ChangeStatus::Stable);
        assert_eq!(change, 5.0);
    }

    #[test]
    fn test_new_and_removed() {
        let mut comparison = FunctionComparison::new("etl.run");
        comparison.add_run("run_2", record(10.0));
        assert_eq!(
            comparison.get_change("run_1", "run_2").0,
            ChangeStatus::New
        );

        let mut comparison = FunctionComparison::new("etl.run");
        comparison.add_run("run_1", record(10.0));
        assert_eq!(
            comparison.get_change("run_1", "run_2").0,
            ChangeStatus::Removed
        );
    }

    #[test]
    fn test_zero_baseline_is_stable() {
        let mut comparison = FunctionComparison::new("etl.run");
        comparison.add_run("run_1", record(0.0));
        comparison.add_run("run_2", record(100.0));

        let (status, _) = comparison.get_change("run_1", "run_2");
        assert_eq!(status, ChangeStatus::Stable);
    }

    #[test]
    fn test_compare_runs_missing_dir() {
        let result = compare_runs(Path::new("/does/not/exist"), None);
        assert!(matches!(result, Err(DiffError::OutputDirNotFound(_))));
    }

    #[test]
    fn test_compare_runs_needs_two() {
        let dir = tempfile::tempdir().unwrap();
        let result = compare_runs(dir.path(), None);
        assert!(matches!(result, Err(DiffError::NotEnoughRuns(0))));
    }
}
