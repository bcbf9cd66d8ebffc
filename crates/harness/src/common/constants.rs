//! Harness-wide constants.
//!
//! This module defines fixed values shared across the pipeline. It includes:
//! 1. **Memory Map:** Base and size of the simulated RAM and the default signature window.
//! 2. **Testbench Protocol:** Reset length, completion sentinel and cycle budget.
//! 3. **Budgets:** Wall-clock limits for every external tool invocation.
//! 4. **File Conventions:** Sentinel prefixes and well-known artifact names.

use std::time::Duration;

/// Base byte address of simulated RAM (the reset vector of the core).
pub const MEM_BASE: u32 = 0x8000_0000;

/// Size of simulated RAM in bytes (16 MiB).
pub const MEM_SIZE: u32 = 16 * 1024 * 1024;

/// Default start of the signature region (inclusive).
pub const SIGNATURE_START: u32 = 0x8000_1000;

/// Default end of the signature region (exclusive).
pub const SIGNATURE_END: u32 = 0x8000_2000;

/// Default address of the `tohost` completion cell when the ELF carries no symbol.
pub const TOHOST_ADDR: u32 = 0x8000_0ff0;

/// `tohost` value a test writes to report that it passed.
pub const TOHOST_PASS: u32 = 1;

/// Number of cycles reset is held asserted before execution starts.
pub const RESET_CYCLES: u64 = 5;

/// Default cycle budget for one run.
pub const MAX_CYCLES: u64 = 1_000_000;

/// How often (in cycles) the native testbench checks its wall-clock deadline.
pub const DEADLINE_CHECK_INTERVAL: u64 = 1024;

/// Default wall-clock budget for compiling one test.
pub const COMPILE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default wall-clock budget for the ELF to hex conversion.
pub const CONVERT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default wall-clock budget for building the simulator.
pub const BUILD_TIMEOUT: Duration = Duration::from_secs(300);

/// Default wall-clock budget for one simulation run.
pub const RUN_TIMEOUT: Duration = Duration::from_secs(300);

/// Interval between `try_wait` polls of a child process.
pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How long output readers may run on after their child has exited.
pub const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Prefix marking a comment or sentinel line in a signature file.
pub const COMMENT_PREFIX: char = '#';

/// Number of trailing log lines embedded in a report.
pub const LOG_TAIL_LINES: usize = 50;

/// File name the reference plugin writes inside a test's `ref/` directory.
pub const REFERENCE_SIGNATURE_NAME: &str = "Reference-spike.signature";

/// Reset vector passed to the golden simulator.
pub const GOLDEN_RESET_PC: u32 = 0x8000_0000;

/// File name the DUT signature is written to inside a test's `dut/` directory.
pub const DUT_SIGNATURE_NAME: &str = "DUT-rvconform.signature";

/// File name of the suite summary written to the work root.
pub const SUMMARY_NAME: &str = "summary.json";
