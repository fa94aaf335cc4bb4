//! Callscope CLI
//!
//! Tooling around stored profiling runs: comparing runs, validating
//! profile JSON, and inspecting the serialization contract. Profiling
//! itself happens in-process through `callscope::session::ProfileSession`.

use anyhow::{Context, Result};
use callscope::config::SCHEMA_VERSION;
use callscope::diff::compare_runs;
use callscope::output::{read_profile_data, write_html};
use clap::{Parser, Subcommand};
use env_logger::Env;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// Callscope - call-graph profiling for pipeline workloads
#[derive(Parser, Debug)]
#[command(name = "callscope")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Compare the two most recent stored runs
    Diff {
        /// Directory holding run_* subdirectories
        #[arg(short, long, default_value = ".callscope_output")]
        output_dir: PathBuf,

        /// Specific run ids to compare (defaults to all runs found)
        #[arg(short, long, value_delimiter = ',')]
        runs: Option<Vec<String>>,

        /// Output path for the comparison HTML (defaults into output_dir)
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Validate a profile JSON file
    Validate {
        /// Path to profile_data.json
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Display schema information
    Schema {
        /// Show full schema details
        #[arg(long)]
        show: bool,
    },

    /// Display version information
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    match cli.command {
        Commands::Diff {
            output_dir,
            runs,
            report,
        } => {
            execute_diff(output_dir, runs, report)?;
        }

        Commands::Validate { file } => {
            validate_profile_file(file)?;
        }

        Commands::Schema { show } => {
            display_schema(show);
        }

        Commands::Version => {
            display_version();
        }
    }

    Ok(())
}

/// Compare stored runs and write the comparison report
///
/// **Private** - internal command implementation
fn execute_diff(
    output_dir: PathBuf,
    runs: Option<Vec<String>>,
    report: Option<PathBuf>,
) -> Result<()> {
    let html = compare_runs(&output_dir, runs.as_deref())
        .with_context(|| format!("Failed to compare runs in {}", output_dir.display()))?;

    let report_path = report.unwrap_or_else(|| {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        output_dir.join(format!("comparison_{timestamp}.html"))
    });

    write_html(&html, &report_path).context("Failed to write comparison report")?;

    println!("Comparison report: {}", report_path.display());

    Ok(())
}

/// Validate a profile JSON file
///
/// **Private** - internal command implementation
fn validate_profile_file(file_path: PathBuf) -> Result<()> {
    println!("Validating profile: {}", file_path.display());

    let profile = read_profile_data(&file_path)
        .with_context(|| format!("Failed to read {}", file_path.display()))?;

    println!("✓ Valid profile JSON");
    println!("  Runtime: {:.2}ms", profile.metadata.total_runtime_ms);
    println!("  Functions: {}", profile.metadata.total_functions);
    println!("  Call Edges: {}", profile.call_edges.len());

    Ok(())
}

/// Display schema information
///
/// **Private** - internal command implementation
fn display_schema(show_details: bool) {
    println!("Callscope Profile Schema");
    println!("Current Version: {}", SCHEMA_VERSION);
    println!();

    if show_details {
        println!("Schema Structure:");
        println!("  metadata: object              - Run-level statistics");
        println!("    total_runtime_ms: number    - Observed wall-clock runtime");
        println!("    start_timestamp: number     - Unix start time (seconds)");
        println!("    end_timestamp: number       - Unix end time (seconds)");
        println!("    total_functions: number     - Functions tracked");
        println!("  functions: array              - Per-function aggregates");
        println!("    module/filename/funcname    - Code location identity");
        println!("    lineno: number              - Definition line");
        println!("    classname: string?          - Receiver type, if any");
        println!("    call_count: number          - Observed calls");
        println!("    total_time_ms: number       - Inclusive wall-clock time");
        println!("    self_time_ms: number        - Exclusive wall-clock time");
        println!("    avg_time_ms: number         - total_time_ms / call_count");
        println!("    avg_cpu_percent: number     - Sampled process CPU");
        println!("    peak_memory_mb: number      - Sampled peak RSS");
        println!("    projected_calls: number     - Extrapolated call count");
        println!("    projected_time_ms: number   - Extrapolated total time");
        println!("    projected_self_time_ms      - Extrapolated self time");
        println!("    percentage_of_total: number - Share of projected self time");
        println!("  call_edges: array             - Caller/callee statistics");
        println!("    caller/callee: string       - Function display names");
        println!("    call_count: number          - Edge traversals");
        println!("    total_time_ms: number       - Time under this edge");
        println!("    avg_time_ms: number         - total_time_ms / call_count");
    } else {
        println!("Use --show for detailed schema information");
    }
}

/// Display version information
///
/// **Private** - internal command implementation
fn display_version() {
    println!("Callscope v{}", env!("CARGO_PKG_VERSION"));
    println!("Profile Schema: v{}", SCHEMA_VERSION);
    println!();
    println!("Call-graph profiling and extrapolation for pipeline workloads.");
}
