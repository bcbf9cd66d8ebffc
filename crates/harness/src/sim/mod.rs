//! Simulation of the core under test.
//!
//! This module covers everything between a hex image and a DUT signature.
//! It provides:
//! 1. **Image:** Sparse word-addressable memory with a signature region and hex loader.
//! 2. **Testbench:** The cycle protocol (reset, fetch/data service, masked writes, completion).
//! 3. **Build:** Memoized, single-flight build of the verilated simulator.
//! 4. **Harness:** Backend selection, per-test runs under a wall-clock budget.
//! 5. **Extraction:** Artifact copy, log scraping, or memory dump.

/// Simulator build and staleness check.
pub mod build;
/// ELF symbol lookup (`tohost`, `begin_signature`, ...).
pub mod elf;
/// Signature extraction strategies.
pub mod extract;
/// Backend dispatch and per-test runs.
pub mod harness;
/// Memory image and signature region.
pub mod image;
/// In-process cycle loop.
pub mod testbench;

pub use build::{SimulatorBuild, SimulatorSpec};
pub use elf::ElfSymbols;
pub use extract::{ExtractionContext, scrape_log};
pub use harness::{DutFactory, RunRequest, SimBackend, SimRun, SimulationHarness};
pub use image::{MemoryImage, SignatureRegion};
pub use testbench::{Completion, Dut, RunOutcome, Testbench, TestbenchOptions};
