//! # ELF Symbol Tests
//!
//! Verifies symbol lookup on a hand-assembled ELF and that native runs take
//! the signature region and completion cell from the test's own symbols.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use rvconform_core::HarnessError;
use rvconform_core::common::constants::{MEM_BASE, TOHOST_ADDR};
use rvconform_core::common::{DataRequest, ToolRunner};
use rvconform_core::sim::{
    Completion, Dut, ElfSymbols, RunRequest, SignatureRegion, SimBackend, SimulationHarness,
};

use crate::common::fixtures::{self, SIG_END, SIG_START};
use crate::common::mocks::{CounterDut, HEX_IMAGE, ScriptedRunner};

const BEGIN: u32 = 0x8000_2000;
const END: u32 = 0x8000_200c;
const TOHOST: u32 = 0x8000_3000;

fn linked_test() -> Vec<u8> {
    fixtures::elf_with_symbols(&[
        ("_start", MEM_BASE),
        ("begin_signature", BEGIN),
        ("end_signature", END),
        ("tohost", TOHOST),
        ("fromhost", TOHOST + 0x40),
    ])
}

fn native(root: &Path) -> SimulationHarness {
    let runner: Arc<dyn ToolRunner> = ScriptedRunner::succeeding();
    let factory = Arc::new(|| -> Box<dyn Dut> {
        Box::new(
            CounterDut::new(MEM_BASE)
                .with_write(1, DataRequest::write(BEGIN, 0x11))
                .with_write(2, DataRequest::write(BEGIN + 4, 0x22))
                .with_write(3, DataRequest::write(BEGIN + 8, 0x33))
                .with_write(4, DataRequest::write(TOHOST, 1)),
        )
    });
    SimulationHarness::new(SimBackend::Native(factory), runner, fixtures::config(root).dut)
}

fn request<'a>(root: &'a Path, hex: &'a Path, elf: Option<&'a Path>, log: &'a Path) -> RunRequest<'a> {
    RunRequest {
        test: "add-01",
        hex,
        elf,
        work_dir: root,
        log,
    }
}

// ══════════════════════════════════════════════════════════
// 1. Symbol lookup
// ══════════════════════════════════════════════════════════

#[test]
fn parse_finds_htif_and_signature_symbols() {
    let syms = ElfSymbols::parse(&linked_test()).unwrap();
    assert_eq!(
        syms,
        ElfSymbols {
            tohost: Some(TOHOST),
            fromhost: Some(TOHOST + 0x40),
            begin_signature: Some(BEGIN),
            end_signature: Some(END),
        }
    );
    assert_eq!(syms.signature_region(), SignatureRegion::new(BEGIN, END));
}

#[test]
fn half_a_region_is_no_region() {
    let syms = ElfSymbols::parse(&fixtures::elf_with_symbols(&[("begin_signature", BEGIN)])).unwrap();
    assert_eq!(syms.begin_signature, Some(BEGIN));
    assert_eq!(syms.tohost, None);
    assert_eq!(syms.signature_region(), None);
}

#[test]
fn garbage_is_an_elf_error() {
    let dir = fixtures::workspace();
    let path = fixtures::write(&dir.path().join("add-01.elf"), "not an elf");
    let err = ElfSymbols::read(&path).unwrap_err();
    assert!(matches!(err, HarnessError::Elf { .. }));
}

// ══════════════════════════════════════════════════════════
// 2. Image preparation
// ══════════════════════════════════════════════════════════

#[test]
fn elf_symbols_override_configured_region() {
    let dir = fixtures::workspace();
    let hex = fixtures::write(&dir.path().join("add-01.hex"), HEX_IMAGE);
    let elf = dir.path().join("add-01.elf");
    std::fs::write(&elf, linked_test()).unwrap();
    let log = dir.path().join("add-01.log");
    let sim = native(dir.path());

    let (image, tohost) = sim.prepare_image(&request(dir.path(), &hex, Some(&elf), &log)).unwrap();
    assert_eq!(image.signature(), SignatureRegion::new(BEGIN, END).unwrap());
    assert_eq!(tohost, TOHOST);
}

#[test]
fn unreadable_elf_keeps_configured_region() {
    let dir = fixtures::workspace();
    let hex = fixtures::write(&dir.path().join("add-01.hex"), HEX_IMAGE);
    let elf = fixtures::write(&dir.path().join("add-01.elf"), "truncated");
    let log = dir.path().join("add-01.log");
    let sim = native(dir.path());

    let (image, tohost) = sim.prepare_image(&request(dir.path(), &hex, Some(&elf), &log)).unwrap();
    assert_eq!(image.signature(), SignatureRegion::new(SIG_START, SIG_END).unwrap());
    assert_eq!(tohost, TOHOST_ADDR);
}

// ══════════════════════════════════════════════════════════
// 3. Native runs
// ══════════════════════════════════════════════════════════

#[test]
fn native_run_dumps_the_symbol_region_and_stops_at_symbol_tohost() {
    let dir = fixtures::workspace();
    let hex = fixtures::write(&dir.path().join("add-01.hex"), HEX_IMAGE);
    let elf = dir.path().join("add-01.elf");
    std::fs::write(&elf, linked_test()).unwrap();
    let log = dir.path().join("add-01.log");
    let sim = native(dir.path());
    let req = request(dir.path(), &hex, Some(&elf), &log);

    let run = sim.run(&req, Duration::from_secs(5)).unwrap();
    assert_eq!(run.completion, Some(Completion::Passed));
    assert!(run.cycles.unwrap() < 100);

    let sig = sim.extract(&req, &run).unwrap();
    assert_eq!(sig.to_text(), "00000011\n00000022\n00000033\n");
    assert_eq!(fixtures::read(&req.simulator_signature()), "00000011\n00000022\n00000033\n");
}

#[test]
fn native_fault_is_recorded_in_the_log() {
    let dir = fixtures::workspace();
    let hex = fixtures::write(&dir.path().join("add-01.hex"), HEX_IMAGE);
    let log = dir.path().join("add-01.log");
    let runner: Arc<dyn ToolRunner> = ScriptedRunner::succeeding();
    let factory = Arc::new(|| -> Box<dyn Dut> {
        Box::new(CounterDut::new(MEM_BASE).with_write(1, DataRequest::write(0x10, 7)))
    });
    let sim = SimulationHarness::new(SimBackend::Native(factory), runner, fixtures::config(dir.path()).dut);

    let err = sim.run(&request(dir.path(), &hex, None, &log), Duration::from_secs(5)).unwrap_err();
    assert!(matches!(err, HarnessError::MemoryFault { .. }));
    assert!(fixtures::read(&log).contains("simulation aborted"));
}
