//! Static HTML summary report.
//!
//! Renders the hotspot table, per-module aggregates, and the full
//! function list into a single self-contained HTML page written next to
//! the JSON profile in each run directory.

use crate::analyzer::{aggregate_by_module, all_functions, extract_hotspots, HotspotFunction};
use crate::config::ScopeConfig;
use crate::profiler::extrapolation::ExtrapolatedStats;
use crate::profiler::identity::FunctionKey;
use crate::profiler::stats::ProfilingResult;
use crate::utils::round2;
use chrono::Local;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::rc::Rc;

/// Hotspots shown in the headline table
const HOTSPOT_COUNT: usize = 5;

const STYLE: &str = r#"
        * { margin: 0; padding: 0; box-sizing: border-box; }
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            background: #f8f9fa;
            color: #212529;
            padding: 20px;
        }
        .container { max-width: 1200px; margin: 0 auto; }
        .header, .section {
            background: white;
            padding: 30px;
            border-radius: 8px;
            box-shadow: 0 2px 4px rgba(0,0,0,0.1);
            margin-bottom: 20px;
        }
        h1 { font-size: 28px; margin-bottom: 10px; }
        .meta { color: #6c757d; font-size: 14px; }
        .section-title {
            font-size: 20px;
            font-weight: 700;
            margin-bottom: 20px;
            padding-bottom: 10px;
            border-bottom: 2px solid #e9ecef;
        }
        table { width: 100%; border-collapse: collapse; font-size: 14px; }
        th {
            background: #f8f9fa;
            padding: 12px;
            text-align: left;
            font-weight: 600;
            border-bottom: 2px solid #dee2e6;
        }
        td { padding: 12px; border-bottom: 1px solid #e9ecef; }
"#;

/// Convert milliseconds to a human-readable duration
///
/// **Public** - also used by the diff report
pub fn format_time_human(ms: f64) -> String {
    if ms < 1000.0 {
        return format!("{}ms", ms as i64);
    }

    let total_seconds = (ms / 1000.0) as i64;
    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if seconds > 0 || parts.is_empty() {
        parts.push(format!("{seconds}s"));
    }

    parts.join(" ")
}

/// Render the full summary report
///
/// **Public** - pure string generation; the session layer writes the file
pub fn generate_report(
    result: &ProfilingResult,
    extrapolated: &HashMap<Rc<FunctionKey>, ExtrapolatedStats>,
    config: &ScopeConfig,
) -> String {
    let hotspots = extract_hotspots(result, extrapolated, HOTSPOT_COUNT);
    let modules = aggregate_by_module(result, extrapolated);
    let functions: Vec<HotspotFunction> = all_functions(result, extrapolated)
        .into_iter()
        .filter(|f| {
            f.total_time_ms >= config.min_time_threshold_ms
                || f.percentage_of_total >= config.min_time_percentage
        })
        .collect();

    let projected_total: f64 = extrapolated
        .values()
        .map(|stats| stats.projected_self_time_ms)
        .sum();

    let generated_at = Local::now().format("%Y-%m-%d %H:%M:%S");

    let mut html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <style>{STYLE}</style>
</head>
<body>
    <div class="container">
        <div class="header">
            <h1>{title}</h1>
            <div class="meta">
                Observed runtime: {runtime} | Functions tracked: {count}<br>
                Extrapolated from {sample} to {expected} items
                (projected self time: {projected})<br>
                Generated: {generated_at}
            </div>
        </div>
"#,
        title = config.dashboard_title,
        runtime = format_time_human(result.total_runtime_ms),
        count = result.function_stats.len(),
        sample = config.sample_size,
        expected = config.expected_size,
        projected = format_time_human(projected_total),
    );

    push_hotspot_section(&mut html, "Top Hotspots", &hotspots);
    push_module_section(&mut html, &modules);
    push_hotspot_section(&mut html, "All Functions", &functions);

    html.push_str(
        "    </div>\n</body>\n</html>\n",
    );

    html
}

fn push_hotspot_section(html: &mut String, title: &str, rows: &[HotspotFunction]) {
    let _ = write!(
        html,
        r#"        <div class="section">
            <div class="section-title">{title} ({count})</div>
            <table>
                <thead>
                    <tr>
                        <th>Function</th>
                        <th>Calls</th>
                        <th>Total (ms)</th>
                        <th>Self (ms)</th>
                        <th>Projected Self</th>
                        <th>% of Total</th>
                        <th>CPU %</th>
                        <th>Peak Mem (MB)</th>
                    </tr>
                </thead>
                <tbody>
"#,
        count = rows.len(),
    );

    for row in rows {
        let _ = write!(
            html,
            r#"                    <tr>
                        <td><strong>{}</strong></td>
                        <td>{}</td>
                        <td>{:.2}</td>
                        <td>{:.2}</td>
                        <td>{}</td>
                        <td>{:.2}%</td>
                        <td>{:.2}</td>
                        <td>{:.2}</td>
                    </tr>
"#,
            row.display_name,
            row.call_count,
            round2(row.total_time_ms),
            round2(row.self_time_ms),
            format_time_human(row.projected_self_time_ms),
            round2(row.percentage_of_total),
            round2(row.avg_cpu_percent),
            round2(row.peak_memory_mb),
        );
    }

    html.push_str("                </tbody>\n            </table>\n        </div>\n");
}

fn push_module_section(html: &mut String, modules: &[crate::analyzer::ModuleAggregate]) {
    let _ = write!(
        html,
        r#"        <div class="section">
            <div class="section-title">By Module ({count})</div>
            <table>
                <thead>
                    <tr>
                        <th>Module</th>
                        <th>Functions</th>
                        <th>Calls</th>
                        <th>Total (ms)</th>
                        <th>Projected</th>
                        <th>% of Total</th>
                    </tr>
                </thead>
                <tbody>
"#,
        count = modules.len(),
    );

    for module in modules {
        let _ = write!(
            html,
            r#"                    <tr>
                        <td><strong>{}</strong></td>
                        <td>{}</td>
                        <td>{}</td>
                        <td>{:.2}</td>
                        <td>{}</td>
                        <td>{:.2}%</td>
                    </tr>
"#,
            module.module_name,
            module.function_count,
            module.total_calls,
            round2(module.total_time_ms),
            format_time_human(module.projected_time_ms),
            round2(module.percentage_of_total),
        );
    }

    html.push_str("                </tbody>\n            </table>\n        </div>\n");
}
