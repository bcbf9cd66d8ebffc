//! RISC-V conformance harness CLI.
//!
//! This binary is the entry point for running and inspecting conformance tests. It performs:
//! 1. **Suite run:** Compile, simulate and compare a list of tests against the golden model.
//! 2. **Report:** Render the HTML report for one pair of signature files.
//! 3. **Compare:** Print the row-level diff of two signature files to stdout.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rvconform_core::common::ProcessRunner;
use rvconform_core::{Config, HarnessError, Suite, TestCase, compare_files, report};

#[derive(Parser, Debug)]
#[command(
    name = "rvconform",
    author,
    version,
    about = "Signature-based RISC-V conformance harness",
    long_about = "Run architecture tests on an RTL core and a golden model, then compare signatures.\n\nExamples:\n  rvconform run --config harness.json --work-dir riscof_work tests/*.S\n  rvconform report --expected ref.sig --actual dut.sig --log run.log --out report.html\n  rvconform compare ref.sig dut.sig"
)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG` overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run tests through the DUT and the reference model and compare them.
    Run {
        /// JSON configuration file; built-in defaults when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Root directory for per-test working directories.
        #[arg(short, long)]
        work_dir: Option<PathBuf>,

        /// Worker threads (0 = one per CPU).
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Regenerate reference signatures even when present.
        #[arg(long)]
        force_reference: bool,

        /// Test sources.
        #[arg(required = true)]
        tests: Vec<PathBuf>,
    },

    /// Render the HTML report for two signature files.
    Report {
        /// Expected (reference) signature.
        #[arg(long)]
        expected: PathBuf,

        /// Actual (DUT) signature.
        #[arg(long)]
        actual: PathBuf,

        /// Simulation log to excerpt.
        #[arg(long)]
        log: Option<PathBuf>,

        /// Output HTML file.
        #[arg(long)]
        out: PathBuf,
    },

    /// Print the row-level diff of two signature files.
    Compare {
        /// Expected (reference) signature.
        expected: PathBuf,

        /// Actual (DUT) signature.
        actual: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let result = match cli.command {
        Commands::Run {
            config,
            work_dir,
            jobs,
            force_reference,
            tests,
        } => cmd_run(config.as_deref(), work_dir, jobs, force_reference, &tests),
        Commands::Report {
            expected,
            actual,
            log,
            out,
        } => report::generate(&expected, &actual, log.as_deref(), &out).map(|r| r.is_pass()),
        Commands::Compare { expected, actual } => cmd_compare(&expected, &actual),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::from(2)
        }
    }
}

/// Runs a suite; returns whether every test passed.
fn cmd_run(
    config: Option<&Path>,
    work_dir: Option<PathBuf>,
    jobs: Option<usize>,
    force_reference: bool,
    tests: &[PathBuf],
) -> Result<bool, HarnessError> {
    let mut config = match config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(dir) = work_dir {
        config.general.work_dir = dir;
    }
    if let Some(jobs) = jobs {
        config.general.jobs = jobs;
    }
    config.general.force_reference |= force_reference;
    config.validate()?;

    let root = std::path::absolute(&config.general.work_dir)
        .map_err(|e| HarnessError::io(&config.general.work_dir, e))?;
    let suite = Suite::from_config(&config, &root, Arc::new(ProcessRunner))?;
    let cases = TestCase::for_sources(tests, &root);
    let summary = suite.run(&cases, &root)?;

    for t in &summary.tests {
        println!("{:<40} {}", t.name, t.status);
    }
    println!(
        "\n{} passed, {} failed, {} total",
        summary.passed, summary.failed, summary.total
    );
    Ok(summary.is_pass())
}

/// Prints the diff table; returns whether the signatures match.
fn cmd_compare(expected: &Path, actual: &Path) -> Result<bool, HarnessError> {
    let result = compare_files(expected, actual)?;
    print!("{}", result.to_text_table());
    Ok(result.is_pass())
}
