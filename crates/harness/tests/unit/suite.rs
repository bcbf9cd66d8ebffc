//! # Plugin and Suite Tests
//!
//! Drives whole tests through the plugin lifecycle and the parallel suite
//! runner with an in-process core model and scripted tools.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::{assert_eq, assert_ne};
use rvconform_core::common::constants::{MEM_BASE, TOHOST_ADDR};
use rvconform_core::common::{DataRequest, Stage, ToolRunner};
use rvconform_core::config::{BackendKind, SignatureExtraction};
use rvconform_core::plugin::{DutPlugin, Plugin, ReferencePlugin};
use rvconform_core::reference::{PregeneratedLookup, ReferenceSignatureProvider, ReferenceSource};
use rvconform_core::signature::Role;
use rvconform_core::sim::{Dut, DutFactory, SimBackend, SimulationHarness, SimulatorBuild, SimulatorSpec};
use rvconform_core::toolchain::{ProfileKind, ToolchainInvoker};
use rvconform_core::{HarnessError, Status, Suite, TestCase};
use tracing::span::{Attributes, Id};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;

use crate::common::fixtures::{self, SIG_START};
use crate::common::mocks::{self, CounterDut, ScriptedRunner};

/// Core model that stores `a`, `b` into the signature and then signals pass.
fn writer(a: u32, b: u32) -> Arc<dyn DutFactory> {
    Arc::new(move || -> Box<dyn Dut> {
        Box::new(
            CounterDut::new(MEM_BASE)
                .with_write(1, DataRequest::write(SIG_START, a))
                .with_write(2, DataRequest::write(SIG_START + 4, b))
                .with_write(3, DataRequest::write(TOHOST_ADDR, 1)),
        )
    })
}

fn native_plugin(root: &Path, runner: &Arc<ScriptedRunner>, factory: Arc<dyn DutFactory>) -> DutPlugin {
    let dyn_runner: Arc<dyn ToolRunner> = runner.clone();
    let config = fixtures::config(root);
    DutPlugin::with_parts(
        ToolchainInvoker::new(fixtures::profile(ProfileKind::Dut, root), Arc::clone(&dyn_runner)),
        SimulationHarness::new(SimBackend::Native(factory), dyn_runner, config.dut),
    )
}

fn pregenerated(root: &Path) -> ReferenceSignatureProvider {
    ReferenceSignatureProvider::new(PregeneratedLookup::new(root.join("sigs")), None, false)
}

fn suite(root: &Path, runner: &Arc<ScriptedRunner>, factory: Arc<dyn DutFactory>) -> Suite {
    Suite::new(
        Arc::new(native_plugin(root, runner, factory)),
        pregenerated(root),
        Duration::from_secs(30),
        2,
    )
}

fn verilated_plugin(root: &Path, runner: &Arc<ScriptedRunner>) -> DutPlugin {
    let dyn_runner: Arc<dyn ToolRunner> = runner.clone();
    let config = fixtures::config(root);
    let build = SimulatorBuild::new(
        SimulatorSpec::from_config(&config.dut, root),
        Arc::clone(&dyn_runner),
    );
    DutPlugin::with_parts(
        ToolchainInvoker::new(fixtures::profile(ProfileKind::Dut, root), Arc::clone(&dyn_runner)),
        SimulationHarness::new(SimBackend::Verilated(build), dyn_runner, config.dut),
    )
}

/// Writes a test source and its pregenerated reference signature.
fn test_with_reference(root: &Path, name: &str, reference: &str) -> PathBuf {
    let _ = fixtures::write(&root.join("sigs").join(format!("{name}.signature")), reference);
    fixtures::write(&root.join("suite").join(format!("{name}.S")), "RVTEST_CODE_BEGIN\n")
}

// ══════════════════════════════════════════════════════════
// 1. Test cases
// ══════════════════════════════════════════════════════════

#[test]
fn test_case_owns_its_directory() {
    let case = TestCase::new("/suite/rv32i/add-01.S", Path::new("/work"));
    assert_eq!(case.name, "add-01");
    assert_eq!(case.work_dir, PathBuf::from("/work/add-01"));
    assert_eq!(case.log(), PathBuf::from("/work/add-01/dut/add-01.log"));
    assert_eq!(
        case.dut_signature(),
        PathBuf::from("/work/add-01/dut/DUT-rvconform.signature")
    );
    assert_eq!(
        case.reference_signature(),
        PathBuf::from("/work/add-01/ref/Reference-spike.signature")
    );
    assert_eq!(case.report(), PathBuf::from("/work/add-01/report.html"));
}

#[test]
fn shared_stems_get_distinct_directories() {
    let cases = TestCase::for_sources(
        [
            "/suite/rv32i_m/I/src/add-01.S",
            "/suite/rv32i_m/M/src/add-01.S",
            "/suite/rv32i_m/I/src/sub-01.S",
        ],
        Path::new("/work"),
    );
    let names: Vec<_> = cases.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["add-01", "add-01", "sub-01"]);
    assert_eq!(cases[0].work_dir, PathBuf::from("/work/I__src__add-01"));
    assert_eq!(cases[1].work_dir, PathBuf::from("/work/M__src__add-01"));
    assert_eq!(cases[2].work_dir, PathBuf::from("/work/sub-01"));
}

#[test]
fn repeated_source_gets_numbered_directories() {
    let cases = TestCase::for_sources(["/suite/add-01.S", "/suite/add-01.S"], Path::new("/work"));
    assert_eq!(cases[0].work_dir, PathBuf::from("/work/add-01-1"));
    assert_eq!(cases[1].work_dir, PathBuf::from("/work/add-01-2"));
}

// ══════════════════════════════════════════════════════════
// 2. Suite runs
// ══════════════════════════════════════════════════════════

#[test]
fn matching_signatures_pass() {
    let dir = fixtures::workspace();
    let src = test_with_reference(dir.path(), "add-01", "00000001\n00000002\n");
    let runner = ScriptedRunner::succeeding();
    let work = dir.path().join("work");
    let case = TestCase::new(src, &work);

    let report = suite(dir.path(), &runner, writer(1, 2))
        .run(std::slice::from_ref(&case), &work)
        .unwrap();

    assert!(report.is_pass());
    assert_eq!((report.passed, report.failed, report.total), (1, 0, 1));
    let verdict = &report.tests[0];
    assert_eq!(verdict.status, Status::Pass);
    assert!(verdict.failures.is_empty());
    assert_eq!(verdict.reference_source, Some(ReferenceSource::Pregenerated));
    assert_eq!(fixtures::read(&case.dut_signature()), "00000001\n00000002\n");
    assert!(fixtures::read(&case.report()).contains("PASS"));
    assert!(case.log().exists());

    let summary: serde_json::Value =
        serde_json::from_str(&fixtures::read(&work.join("summary.json"))).unwrap();
    assert_eq!(summary["passed"], 1);
    assert_eq!(summary["tests"][0]["name"], "add-01");
}

#[test]
fn mismatching_word_fails() {
    let dir = fixtures::workspace();
    let src = test_with_reference(dir.path(), "add-01", "00000001\n00000003\n");
    let runner = ScriptedRunner::succeeding();
    let work = dir.path().join("work");

    let report = suite(dir.path(), &runner, writer(1, 2))
        .run(&[TestCase::new(src, &work)], &work)
        .unwrap();

    assert!(!report.is_pass());
    let verdict = &report.tests[0];
    assert_eq!(verdict.status, Status::Fail);
    assert_eq!(verdict.comparison.failed, 1);
    assert!(!verdict.comparison.rows[1].matched);
    assert!(verdict.failures.is_empty());
}

#[test]
fn verdicts_keep_input_order() {
    let dir = fixtures::workspace();
    let work = dir.path().join("work");
    let cases: Vec<_> = ["add-01", "sub-01", "xor-01", "and-01"]
        .iter()
        .map(|n| TestCase::new(test_with_reference(dir.path(), n, "00000001\n00000002\n"), &work))
        .collect();
    let runner = ScriptedRunner::succeeding();

    let report = suite(dir.path(), &runner, writer(1, 2)).run(&cases, &work).unwrap();
    let names: Vec<_> = report.tests.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["add-01", "sub-01", "xor-01", "and-01"]);
    assert_eq!(report.passed, 4);
    assert_eq!(runner.count("gcc"), 4);
}

#[test]
fn compile_failure_is_recorded_and_suite_continues() {
    let dir = fixtures::workspace();
    let bad = test_with_reference(dir.path(), "bad-01", "00000001\n00000002\n");
    let good = test_with_reference(dir.path(), "add-01", "00000001\n00000002\n");
    let runner = ScriptedRunner::new(|inv| {
        let compiling_bad = inv.program_name().ends_with("gcc")
            && inv.args.last().is_some_and(|a| a.ends_with("bad-01.S"));
        if compiling_bad {
            Ok(mocks::exit_with(1, "bad-01.S:1: Error: unknown mnemonic"))
        } else {
            mocks::fabricate(inv)
        }
    });
    let work = dir.path().join("work");
    let cases = [TestCase::new(bad, &work), TestCase::new(good, &work)];

    let report = suite(dir.path(), &runner, writer(1, 2)).run(&cases, &work).unwrap();
    assert_eq!((report.passed, report.failed), (1, 1));

    let verdict = &report.tests[0];
    assert_eq!(verdict.status, Status::Fail);
    assert_eq!(verdict.failures[0].stage, Stage::Compile);
    assert_eq!(
        verdict.failures[0].stderr.as_deref(),
        Some("bad-01.S:1: Error: unknown mnemonic")
    );
    assert_eq!(verdict.comparison.unavailable[0].role, Role::Dut);
    assert!(fixtures::read(&cases[0].dut_signature()).starts_with("# dut unavailable:"));
}

#[test]
fn run_timeout_is_test_scoped() {
    let dir = fixtures::workspace();
    let src = test_with_reference(dir.path(), "add-01", "00000001\n00000002\n");
    let runner = ScriptedRunner::succeeding();
    let work = dir.path().join("work");
    let suite = Suite::new(
        Arc::new(native_plugin(dir.path(), &runner, writer(1, 2))),
        pregenerated(dir.path()),
        Duration::ZERO,
        1,
    );

    let report = suite.run(&[TestCase::new(src, &work)], &work).unwrap();
    let verdict = &report.tests[0];
    assert_eq!(verdict.status, Status::Fail);
    assert_eq!(verdict.failures[0].stage, Stage::Run);
}

#[test]
fn missing_reference_fails_without_aborting() {
    let dir = fixtures::workspace();
    let src = fixtures::write(&dir.path().join("suite").join("add-01.S"), "RVTEST_CODE_BEGIN\n");
    let runner = ScriptedRunner::succeeding();
    let work = dir.path().join("work");

    let report = suite(dir.path(), &runner, writer(1, 2))
        .run(&[TestCase::new(src, &work)], &work)
        .unwrap();
    let verdict = &report.tests[0];
    assert_eq!(verdict.status, Status::Fail);
    assert_eq!(verdict.reference_source, Some(ReferenceSource::Sentinel));
    assert_eq!(verdict.failures[0].stage, Stage::Reference);
    assert_eq!(verdict.comparison.unavailable[0].role, Role::Reference);
}

#[test]
fn missing_rtl_aborts_the_suite() {
    let dir = fixtures::workspace();
    let src = test_with_reference(dir.path(), "add-01", "00000001\n");
    let runner = ScriptedRunner::succeeding();
    let plugin = verilated_plugin(dir.path(), &runner);
    let suite = Suite::new(Arc::new(plugin), pregenerated(dir.path()), Duration::from_secs(1), 1);
    let work = dir.path().join("work");

    let err = suite.run(&[TestCase::new(src, &work)], &work).unwrap_err();
    assert!(matches!(err, HarnessError::Setup(_)));
    assert!(runner.calls().is_empty());
}

#[test]
fn same_stem_in_two_directories_keeps_both_results() {
    let dir = fixtures::workspace();
    let _ = fixtures::write(&dir.path().join("sigs/add-01.signature"), "00000001\n00000002\n");
    let first = fixtures::write(&dir.path().join("suite/I/add-01.S"), "RVTEST_CODE_BEGIN\n");
    let second = fixtures::write(&dir.path().join("suite/M/add-01.S"), "RVTEST_CODE_BEGIN\n");
    let runner = ScriptedRunner::succeeding();
    let work = dir.path().join("work");
    let cases = TestCase::for_sources([first, second], &work);

    let report = suite(dir.path(), &runner, writer(1, 2)).run(&cases, &work).unwrap();
    assert_eq!((report.passed, report.total), (2, 2));
    assert_ne!(report.tests[0].report, report.tests[1].report);
    for case in &cases {
        assert_eq!(fixtures::read(&case.dut_signature()), "00000001\n00000002\n");
        assert!(case.report().exists());
    }
}

#[test]
fn stale_artifact_does_not_pass_a_silent_run() {
    let dir = fixtures::workspace();
    let src = test_with_reference(dir.path(), "add-01", "00000001\n00000002\n");
    let _ = fixtures::write(&dir.path().join("rtl/Core.v"), "module Core; endmodule\n");
    let runner = ScriptedRunner::new(|inv| {
        if inv.program_name().ends_with("VCore") {
            Ok(mocks::exit_with(3, ""))
        } else {
            mocks::fabricate(inv)
        }
    });
    let work = dir.path().join("work");
    let case = TestCase::new(src, &work);
    let stale = fixtures::write(&case.dut_dir().join("signature.txt"), "00000001\n00000002\n");
    let _ = fixtures::write(&case.dut_dir().join("add-01.signature"), "00000001\n00000002\n");
    let suite = Suite::new(
        Arc::new(verilated_plugin(dir.path(), &runner)),
        pregenerated(dir.path()),
        Duration::from_secs(30),
        1,
    );

    let report = suite.run(std::slice::from_ref(&case), &work).unwrap();
    let verdict = &report.tests[0];
    assert_eq!(verdict.status, Status::Fail);
    assert_eq!(verdict.failures[0].stage, Stage::Extract);
    assert!(!stale.exists());
    assert!(fixtures::read(&case.dut_signature()).starts_with("# dut unavailable:"));
}

#[test]
fn native_plugin_from_config_runs_end_to_end() {
    let dir = fixtures::workspace();
    let prefix = format!("{}/bin/rv32-", dir.path().display());
    let _ = fixtures::write(Path::new(&format!("{prefix}gcc")), "");
    let mut config = fixtures::config(dir.path());
    config.toolchain.prefix = Some(prefix.clone());
    config.dut.backend = BackendKind::Native;
    config.dut.extraction = SignatureExtraction::DumpMemoryRegion;

    let elf = fixtures::elf_with_symbols(&[
        ("begin_signature", 0x8000_2000),
        ("end_signature", 0x8000_2008),
        ("tohost", 0x8000_3000),
    ]);
    let runner = ScriptedRunner::new(move |inv| {
        if inv.program_name().ends_with("gcc") {
            std::fs::write(inv.value_of("-o").unwrap(), &elf).unwrap();
            Ok(mocks::ok())
        } else {
            mocks::fabricate(inv)
        }
    });
    let factory: Arc<dyn DutFactory> = Arc::new(|| -> Box<dyn Dut> {
        Box::new(
            CounterDut::new(MEM_BASE)
                .with_write(1, DataRequest::write(0x8000_2000, 5))
                .with_write(2, DataRequest::write(0x8000_2004, 6))
                .with_write(3, DataRequest::write(0x8000_3000, 1)),
        )
    });
    let dyn_runner: Arc<dyn ToolRunner> = runner.clone();
    let plugin = DutPlugin::native(&config, factory, dyn_runner).unwrap();
    let src = test_with_reference(dir.path(), "add-01", "00000005\n00000006\n");
    let work = dir.path().join("work");
    let suite = Suite::new(Arc::new(plugin), pregenerated(dir.path()), Duration::from_secs(30), 1);

    let report = suite.run(&[TestCase::new(src, &work)], &work).unwrap();
    assert!(report.is_pass(), "{:?}", report.tests[0].failures);
    assert_eq!(runner.calls()[0].program, PathBuf::from(format!("{prefix}gcc")));
    assert_eq!(runner.count("objcopy"), 1);
}

/// Records span parentage and the span each event was emitted in.
#[derive(Clone, Default)]
struct SpanLog(Arc<Mutex<Vec<String>>>);

impl<S> Layer<S> for SpanLog
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let parent = ctx.span(id).and_then(|s| s.parent()).map(|p| p.name());
        self.0
            .lock()
            .unwrap()
            .push(format!("span {} parent={parent:?}", attrs.metadata().name()));
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let span = ctx.event_span(event).map(|s| s.name());
        self.0
            .lock()
            .unwrap()
            .push(format!("{} in {span:?}", event.metadata().level()));
    }
}

#[test]
fn test_span_is_a_root_and_scopes_the_verdict() {
    let dir = fixtures::workspace();
    let src = test_with_reference(dir.path(), "add-01", "00000001\n00000002\n");
    let runner = ScriptedRunner::succeeding();
    let work = dir.path().join("work");
    let suite = suite(dir.path(), &runner, writer(1, 2));
    let log = SpanLog::default();
    let subscriber = tracing_subscriber::registry().with(log.clone());

    let verdict = tracing::subscriber::with_default(subscriber, || {
        let outer = tracing::info_span!("worker");
        outer.in_scope(|| suite.run_one(&TestCase::new(src, &work)))
    })
    .unwrap();

    assert_eq!(verdict.status, Status::Pass);
    let lines = log.0.lock().unwrap().clone();
    assert!(lines.contains(&"span test parent=None".to_string()), "{lines:?}");
    assert!(lines.contains(&"INFO in Some(\"test\")".to_string()), "{lines:?}");
}

// ══════════════════════════════════════════════════════════
// 3. Plugin lifecycle
// ══════════════════════════════════════════════════════════

#[test]
fn native_backend_needs_a_core_model() {
    let dir = fixtures::workspace();
    let mut config = fixtures::config(dir.path());
    config.dut.backend = BackendKind::Native;
    let err = DutPlugin::new(&config, dir.path(), ScriptedRunner::succeeding()).unwrap_err();
    assert!(matches!(err, HarnessError::Config(_)));
}

#[test]
fn dut_lifecycle_produces_signature() {
    let dir = fixtures::workspace();
    let src = fixtures::write(&dir.path().join("suite").join("add-01.S"), "RVTEST_CODE_BEGIN\n");
    let runner = ScriptedRunner::succeeding();
    let plugin = native_plugin(dir.path(), &runner, writer(0xa, 0xb));
    let out_dir = dir.path().join("dut");
    let log = out_dir.join("add-01.log");
    let sig = out_dir.join("DUT.signature");

    plugin.build().unwrap();
    let hex = plugin.compile(&src, &out_dir).unwrap();
    assert_eq!(hex, out_dir.join("add-01.hex"));
    assert_eq!(plugin.run(&hex, &log, Duration::from_secs(5)).unwrap(), Some(0));
    plugin.parse_signature(&log, &sig).unwrap();
    assert_eq!(fixtures::read(&sig), "0000000a\n0000000b\n");
}

#[test]
fn dut_parse_without_signature_leaves_sentinel() {
    let dir = fixtures::workspace();
    let runner = ScriptedRunner::succeeding();
    let plugin = native_plugin(dir.path(), &runner, writer(1, 2));
    let log = fixtures::write(&dir.path().join("dut").join("add-01.log"), "no markers\n");
    let sig = dir.path().join("dut").join("DUT.signature");

    let err = plugin.parse_signature(&log, &sig).unwrap_err();
    assert!(matches!(err, HarnessError::Extract(_)));
    assert!(fixtures::read(&sig).starts_with("# dut unavailable:"));
}

#[test]
fn reference_lifecycle_copies_signature() {
    let dir = fixtures::workspace();
    let src = test_with_reference(dir.path(), "add-01", "00000007\n");
    let plugin = ReferencePlugin::new(pregenerated(dir.path()));
    let out_dir = dir.path().join("ref-work");
    let log = dir.path().join("ref.log");
    let sig = dir.path().join("Reference.signature");

    plugin.build().unwrap();
    let artifact = plugin.compile(&src, &out_dir).unwrap();
    assert_eq!(plugin.run(&artifact, &log, Duration::from_secs(1)).unwrap(), Some(0));
    plugin.parse_signature(&log, &sig).unwrap();
    assert_eq!(fixtures::read(&sig), "00000007\n");
}

#[test]
fn reference_lifecycle_reports_unavailable() {
    let dir = fixtures::workspace();
    let src = fixtures::write(&dir.path().join("suite").join("add-01.S"), "RVTEST_CODE_BEGIN\n");
    let plugin = ReferencePlugin::new(pregenerated(dir.path()));
    let out_dir = dir.path().join("ref-work");
    let log = dir.path().join("ref.log");
    let sig = dir.path().join("Reference.signature");

    let artifact = plugin.compile(&src, &out_dir).unwrap();
    let _ = plugin.run(&artifact, &log, Duration::from_secs(1)).unwrap();
    let err = plugin.parse_signature(&log, &sig).unwrap_err();
    assert!(matches!(err, HarnessError::GenerationUnavailable(_)));
    assert!(fixtures::read(&sig).starts_with("# reference unavailable:"));
}
