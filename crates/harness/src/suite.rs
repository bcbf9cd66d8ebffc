//! Suite runner: many tests, one working directory each, in parallel.
//!
//! Per-test failures never escape [`Suite::run`]; they become typed
//! [`TestFailure`] records on the test's [`TestVerdict`] while a sentinel is
//! left in place of the missing signature. Only suite-fatal errors (see
//! [`HarnessError::is_suite_fatal`]) abort the run.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rayon::prelude::*;
use serde::Serialize;

use crate::common::constants::{DUT_SIGNATURE_NAME, SUMMARY_NAME};
use crate::common::{HarnessError, Result, Stage, ToolRunner};
use crate::compare::{ComparisonResult, Status, compare};
use crate::config::Config;
use crate::plugin::{DutPlugin, Plugin};
use crate::reference::{Acquisition, ReferenceSignatureProvider, ReferenceSource};
use crate::report::{ReportInput, write_json, write_report};
use crate::signature::{Role, SignatureOutcome, write_sentinel};

/// One test and the directory it owns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TestCase {
    /// Source stem.
    pub name: String,
    /// Test source.
    pub source: PathBuf,
    /// Working directory, exclusive to this test.
    pub work_dir: PathBuf,
}

impl TestCase {
    /// Places `source` in its own directory under `root`.
    pub fn new(source: impl Into<PathBuf>, root: &Path) -> Self {
        let source = source.into();
        let name = source
            .file_stem()
            .map_or_else(|| "test".to_string(), |s| s.to_string_lossy().into_owned());
        Self {
            work_dir: root.join(&name),
            name,
            source,
        }
    }

    /// Places every source in its own directory under `root`.
    ///
    /// Sources sharing a stem get their directory named after the shortest
    /// run of parent directories that tells them apart, joined with `__`
    /// (`I/src/add-01.S` becomes `I__src__add-01`). Names stay the stem.
    pub fn for_sources<P: Into<PathBuf>>(
        sources: impl IntoIterator<Item = P>,
        root: &Path,
    ) -> Vec<Self> {
        let mut cases: Vec<Self> = sources.into_iter().map(|s| Self::new(s, root)).collect();
        let mut by_name: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (i, case) in cases.iter().enumerate() {
            by_name.entry(case.name.clone()).or_default().push(i);
        }
        for (name, group) in by_name.into_iter().filter(|(_, g)| g.len() > 1) {
            let sources: Vec<&Path> = group.iter().map(|&i| cases[i].source.as_path()).collect();
            let dirs = distinct_dirs(&name, &sources);
            for (&i, dir) in group.iter().zip(dirs) {
                tracing::debug!(test = %name, dir = %dir, "stem shared by several sources");
                cases[i].work_dir = root.join(dir);
            }
        }
        cases
    }

    /// DUT artifacts directory.
    pub fn dut_dir(&self) -> PathBuf {
        self.work_dir.join("dut")
    }

    /// Simulation log.
    pub fn log(&self) -> PathBuf {
        self.dut_dir().join(format!("{}.log", self.name))
    }

    /// DUT signature file.
    pub fn dut_signature(&self) -> PathBuf {
        self.dut_dir().join(DUT_SIGNATURE_NAME)
    }

    /// Reference signature file.
    pub fn reference_signature(&self) -> PathBuf {
        ReferenceSignatureProvider::destination(&self.work_dir)
    }

    /// HTML report.
    pub fn report(&self) -> PathBuf {
        self.work_dir.join("report.html")
    }
}

/// A typed, test-scoped failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TestFailure {
    /// Stage that failed.
    pub stage: Stage,
    /// One-line description.
    pub message: String,
    /// Captured stderr of the failing tool, verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

impl From<&HarnessError> for TestFailure {
    fn from(e: &HarnessError) -> Self {
        let text = e.to_string();
        Self {
            stage: e.stage(),
            message: text.lines().next().unwrap_or_default().to_string(),
            stderr: e.captured_stderr().map(str::to_string),
        }
    }
}

/// Outcome of one test.
#[derive(Clone, Debug, Serialize)]
pub struct TestVerdict {
    /// Test name.
    pub name: String,
    /// Verdict.
    pub status: Status,
    /// Row-level comparison.
    pub comparison: ComparisonResult,
    /// Failures recorded along the way.
    pub failures: Vec<TestFailure>,
    /// How the reference signature was obtained.
    pub reference_source: Option<ReferenceSource>,
    /// Report path.
    pub report: PathBuf,
}

/// Outcome of a whole suite.
#[derive(Clone, Debug, Serialize)]
pub struct SuiteReport {
    /// Per-test verdicts, in input order.
    pub tests: Vec<TestVerdict>,
    /// Passing tests.
    pub passed: usize,
    /// Failing tests.
    pub failed: usize,
    /// All tests.
    pub total: usize,
}

impl SuiteReport {
    fn new(tests: Vec<TestVerdict>) -> Self {
        let passed = tests.iter().filter(|t| t.status == Status::Pass).count();
        Self {
            total: tests.len(),
            failed: tests.len() - passed,
            passed,
            tests,
        }
    }

    /// Returns `true` when there was at least one test and all passed.
    pub fn is_pass(&self) -> bool {
        self.total > 0 && self.failed == 0
    }
}

/// Drives the DUT plugin and the reference provider over a list of tests.
#[derive(Debug)]
pub struct Suite {
    dut: Arc<dyn Plugin>,
    reference: ReferenceSignatureProvider,
    run_timeout: Duration,
    jobs: usize,
}

impl Suite {
    /// Creates a suite; `jobs == 0` uses one worker per CPU.
    pub fn new(
        dut: Arc<dyn Plugin>,
        reference: ReferenceSignatureProvider,
        run_timeout: Duration,
        jobs: usize,
    ) -> Self {
        Self {
            dut,
            reference,
            run_timeout,
            jobs,
        }
    }

    /// Wires up the verilated DUT plugin and the reference provider from `config`.
    ///
    /// # Errors
    ///
    /// Suite-fatal errors from toolchain discovery.
    pub fn from_config(config: &Config, work_dir: &Path, runner: Arc<dyn ToolRunner>) -> Result<Self> {
        let dut = DutPlugin::new(config, work_dir, Arc::clone(&runner))?;
        Ok(Self::new(
            Arc::new(dut),
            ReferenceSignatureProvider::from_config(config, runner),
            config.dut.run_timeout(),
            config.general.jobs,
        ))
    }

    /// Runs every case and writes `summary.json` under `root`.
    ///
    /// # Errors
    ///
    /// A simulator build that leaves no usable binary, or any other
    /// suite-fatal error raised by a test.
    pub fn run(&self, cases: &[TestCase], root: &Path) -> Result<SuiteReport> {
        std::fs::create_dir_all(root).map_err(|e| HarnessError::io(root, e))?;
        self.dut.build()?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .build()
            .map_err(|e| HarnessError::Setup(format!("cannot start worker pool: {e}")))?;
        tracing::info!(tests = cases.len(), workers = pool.current_num_threads(), "running suite");
        let results: Vec<Result<TestVerdict>> =
            pool.install(|| cases.par_iter().map(|c| self.run_one(c)).collect());
        let tests = results.into_iter().collect::<Result<Vec<_>>>()?;

        let report = SuiteReport::new(tests);
        write_json(&report, &root.join(SUMMARY_NAME))?;
        tracing::info!(
            passed = report.passed,
            failed = report.failed,
            total = report.total,
            "suite finished"
        );
        Ok(report)
    }

    /// Runs one test to a verdict.
    ///
    /// # Errors
    ///
    /// Suite-fatal failures, or a test directory that cannot be created.
    pub fn run_one(&self, case: &TestCase) -> Result<TestVerdict> {
        let span = tracing::info_span!(parent: None, "test", test = %case.name);
        let dut_dir = case.dut_dir();
        std::fs::create_dir_all(&dut_dir).map_err(|e| HarnessError::io(&dut_dir, e))?;

        let (reference, dut) = rayon::join(
            || span.in_scope(|| self.reference.acquire(&case.source, &case.work_dir)),
            || span.in_scope(|| self.run_dut(case)),
        );
        span.in_scope(|| Self::conclude(case, reference, dut))
    }

    fn conclude(
        case: &TestCase,
        reference: Result<Acquisition>,
        dut: Result<()>,
    ) -> Result<TestVerdict> {
        let mut failures = Vec::new();
        let mut reference_source = None;
        match reference {
            Ok(acq) => {
                reference_source = Some(acq.source);
                if let SignatureOutcome::Unavailable { reason } = &acq.outcome {
                    failures.push(TestFailure {
                        stage: Stage::Reference,
                        message: reason.clone(),
                        stderr: None,
                    });
                }
            }
            Err(e) => record(e, &mut failures)?,
        }
        if let Err(e) = dut {
            let reason = e.to_string();
            record(e, &mut failures)?;
            if let Err(e) = write_sentinel(&case.dut_signature(), Role::Dut, &reason) {
                failures.push(TestFailure::from(&e));
            }
        }

        let expected = read_outcome(&case.reference_signature());
        let actual = read_outcome(&case.dut_signature());
        let comparison = compare(&expected, &actual);
        let report = case.report();
        let input = ReportInput {
            title: &format!("Signature Report - {}", case.name),
            expected: &case.reference_signature(),
            actual: &case.dut_signature(),
            log: Some(&case.log()),
            failures: &failures,
        };
        if let Err(e) = write_report(&comparison, &input, &report) {
            tracing::error!(error = %e, "cannot write report");
            failures.push(TestFailure {
                stage: Stage::Report,
                message: e.to_string(),
                stderr: None,
            });
        }

        match comparison.status {
            Status::Pass => tracing::info!(rows = comparison.total, "PASS"),
            Status::Fail => tracing::error!(
                failed = comparison.failed,
                total = comparison.total,
                "FAIL"
            ),
        }
        Ok(TestVerdict {
            name: case.name.clone(),
            status: comparison.status,
            comparison,
            failures,
            reference_source,
            report,
        })
    }

    fn run_dut(&self, case: &TestCase) -> Result<()> {
        let sig = case.dut_signature();
        if sig.exists() {
            std::fs::remove_file(&sig).map_err(|e| HarnessError::io(&sig, e))?;
        }
        let dut_dir = case.dut_dir();
        let artifact = self.dut.compile(&case.source, &dut_dir)?;
        let log = case.log();
        let _ = self.dut.run(&artifact, &log, self.run_timeout)?;
        self.dut.parse_signature(&log, &sig)
    }
}

fn distinct_dirs(name: &str, sources: &[&Path]) -> Vec<String> {
    let parents: Vec<Vec<String>> = sources
        .iter()
        .map(|s| {
            s.parent()
                .into_iter()
                .flat_map(Path::components)
                .filter_map(|c| match c {
                    Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                    _ => None,
                })
                .collect()
        })
        .collect();
    let deepest = parents.iter().map(Vec::len).max().unwrap_or(0);
    for depth in 1..=deepest {
        let dirs: Vec<String> = parents
            .iter()
            .map(|p| {
                let mut parts: Vec<&str> =
                    p.iter().skip(p.len().saturating_sub(depth)).map(String::as_str).collect();
                parts.push(name);
                parts.join("__")
            })
            .collect();
        if dirs.iter().collect::<BTreeSet<_>>().len() == dirs.len() {
            return dirs;
        }
    }
    (1..=sources.len()).map(|n| format!("{name}-{n}")).collect()
}

/// Records a test-scoped failure; hands suite-fatal ones back to the caller.
fn record(e: HarnessError, failures: &mut Vec<TestFailure>) -> Result<()> {
    if e.is_suite_fatal() {
        tracing::error!(error = %e, "suite-fatal failure");
        return Err(e);
    }
    tracing::error!(stage = %e.stage(), error = %e, "test failed");
    failures.push(TestFailure::from(&e));
    Ok(())
}

fn read_outcome(path: &Path) -> SignatureOutcome {
    SignatureOutcome::read(path).unwrap_or_else(|e| SignatureOutcome::Unavailable {
        reason: e.to_string(),
    })
}
