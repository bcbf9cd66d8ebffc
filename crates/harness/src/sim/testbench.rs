//! Cycle loop driving a core model over a memory image.
//!
//! This module is the in-process counterpart of the verilated testbench. It
//! provides:
//! 1. **Dut Seam:** The per-cycle port surface a core model exposes.
//! 2. **Protocol:** Reset, fetch and data service, masked writes, HTIF completion.
//! 3. **Budgets:** A cycle budget and a wall-clock deadline checked periodically.

use std::io::Write;
use std::time::{Duration, Instant};

use super::image::MemoryImage;
use crate::common::constants::{DEADLINE_CHECK_INTERVAL, TOHOST_PASS};
use crate::common::{AccessType, ByteAddr, DataRequest, HarnessError, Result};
use crate::signature::SignatureRecord;

/// Port-level view of a core under test.
///
/// The testbench calls the methods in this order every cycle:
/// `fetch_addr`, `set_fetch_data`, `data_request`, `set_load_data` (reads
/// only), then `tick`.
pub trait Dut: Send {
    /// Drives the reset input.
    fn set_reset(&mut self, asserted: bool);

    /// Byte address on the instruction port.
    fn fetch_addr(&self) -> u32;

    /// Supplies the fetched instruction word.
    fn set_fetch_data(&mut self, word: u32);

    /// Request on the data port this cycle, if any.
    fn data_request(&self) -> Option<DataRequest>;

    /// Supplies the word read for a data-port read.
    fn set_load_data(&mut self, word: u32);

    /// Advances one clock cycle.
    fn tick(&mut self);
}

/// How a run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Completion {
    /// The test wrote the pass value to the completion cell.
    Passed,
    /// The test wrote another non-zero value; `code >> 1` is the failing case.
    Failed {
        /// Raw completion value.
        code: u32,
    },
    /// The cycle budget ran out before the completion cell was written.
    BudgetExhausted,
}

impl Completion {
    /// Classifies a non-zero completion value.
    pub const fn from_tohost(value: u32) -> Self {
        if value == TOHOST_PASS {
            Self::Passed
        } else {
            Self::Failed { code: value }
        }
    }

    /// Failing test case number reported by the test, if any.
    pub const fn failing_case(&self) -> Option<u32> {
        match self {
            Self::Failed { code } => Some(*code >> 1),
            _ => None,
        }
    }
}

/// Result of a completed run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunOutcome {
    /// Cycles executed after reset.
    pub cycles: u64,
    /// How the run ended.
    pub completion: Completion,
    /// Contents of the signature region at termination.
    pub signature: SignatureRecord,
}

/// Run parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TestbenchOptions {
    /// Cycle budget after reset.
    pub max_cycles: u64,
    /// Cycles reset is held.
    pub reset_cycles: u64,
    /// Byte address of the completion cell.
    pub tohost: u32,
    /// Wall-clock budget; `None` disables the check.
    pub deadline: Option<Duration>,
}

/// Drives a [`Dut`] against a [`MemoryImage`].
#[derive(Debug)]
pub struct Testbench {
    image: MemoryImage,
    opts: TestbenchOptions,
}

impl Testbench {
    /// Creates a testbench over a loaded image.
    pub const fn new(image: MemoryImage, opts: TestbenchOptions) -> Self {
        Self { image, opts }
    }

    /// Returns the memory image.
    pub const fn image(&self) -> &MemoryImage {
        &self.image
    }

    /// Consumes the testbench, returning the final image.
    pub fn into_image(self) -> MemoryImage {
        self.image
    }

    /// Runs without a trace.
    pub fn run(&mut self, dut: &mut dyn Dut) -> Result<RunOutcome> {
        self.run_traced(dut, &mut std::io::sink())
    }

    /// Runs, writing one trace line per data write to `trace`.
    ///
    /// # Errors
    ///
    /// * [`HarnessError::MemoryFault`] on any access outside the image.
    /// * [`HarnessError::RunTimeout`] when the wall-clock deadline passes.
    pub fn run_traced(&mut self, dut: &mut dyn Dut, trace: &mut dyn Write) -> Result<RunOutcome> {
        let started = Instant::now();
        let tohost_word = ByteAddr(self.opts.tohost).word();

        dut.set_reset(true);
        for _ in 0..self.opts.reset_cycles {
            dut.tick();
        }
        dut.set_reset(false);

        let mut completion = Completion::BudgetExhausted;
        let mut cycle = 0;
        while cycle < self.opts.max_cycles {
            if cycle % DEADLINE_CHECK_INTERVAL == 0 {
                self.check_deadline(started, cycle)?;
            }
            let fault = |source| HarnessError::MemoryFault { cycle, source };

            let insn = self
                .image
                .read_word(AccessType::Fetch, dut.fetch_addr())
                .map_err(fault)?;
            dut.set_fetch_data(insn);

            let req = dut.data_request();
            match req {
                Some(r) if r.write => {
                    self.image.apply(&r).map_err(fault)?;
                    writeln!(
                        trace,
                        "cycle={cycle:#x} write addr={:#010x} data={:#010x} strobe={:#06b}",
                        r.addr, r.wdata, r.strobe
                    )
                    .map_err(trace_failed)?;
                }
                Some(r) => {
                    let word = self.image.read_word(r.access_type(), r.addr).map_err(fault)?;
                    dut.set_load_data(word);
                }
                None => {}
            }

            dut.tick();
            cycle += 1;

            if let Some(r) = req.filter(|r| r.write && ByteAddr(r.addr).word() == tohost_word) {
                let value = self.image.word_at(ByteAddr(r.addr).word());
                if value != 0 {
                    completion = Completion::from_tohost(value);
                    break;
                }
            }
        }

        match completion {
            Completion::Passed => tracing::debug!(cycle, "test signalled pass"),
            Completion::Failed { code } => {
                tracing::warn!(cycle, code, case = code >> 1, "test signalled failure");
            }
            Completion::BudgetExhausted => tracing::warn!(cycle, "cycle budget exhausted"),
        }
        writeln!(trace, "terminated at cycle {cycle}: {completion:?}").map_err(trace_failed)?;

        Ok(RunOutcome {
            cycles: cycle,
            completion,
            signature: self.image.dump_signature(),
        })
    }

    fn check_deadline(&self, started: Instant, cycle: u64) -> Result<()> {
        match self.opts.deadline {
            Some(limit) if started.elapsed() >= limit => Err(HarnessError::RunTimeout {
                after: limit,
                stderr: format!("deadline passed at cycle {cycle}"),
            }),
            _ => Ok(()),
        }
    }
}

fn trace_failed(e: std::io::Error) -> HarnessError {
    HarnessError::RunFailure {
        reason: format!("cannot write simulation log: {e}"),
        stderr: String::new(),
    }
}
