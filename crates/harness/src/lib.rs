//! Signature-based RISC-V conformance harness.
//!
//! This crate runs architecture tests on an RTL core and on a golden model and
//! compares the resulting memory signatures. It provides the following:
//! 1. **Resolution:** First-match search over ordered candidate paths (toolchains, signature directories, headers).
//! 2. **Toolchain:** Compilation of test sources to ELF and conversion to word hex images.
//! 3. **Simulation:** Cached simulator builds, verilated and native runs, signature extraction.
//! 4. **Reference:** Pregenerated lookup with on-demand golden-simulator generation as fallback.
//! 5. **Comparison:** Row-level signature diffs, HTML reports and JSON summaries.
//! 6. **Orchestration:** The plugin lifecycle and a parallel suite runner.

/// Common types and constants (addresses, access types, errors, processes).
pub mod common;
/// Signature comparison.
pub mod compare;
/// Harness configuration (defaults, enums, hierarchical config structures).
pub mod config;
/// Plugin lifecycle for test-framework hosts.
pub mod plugin;
/// Reference signature acquisition.
pub mod reference;
/// HTML reports and JSON summaries.
pub mod report;
/// Candidate path resolution.
pub mod resolve;
/// Signature records and sentinels.
pub mod signature;
/// Simulator build, run and extraction.
pub mod sim;
/// Parallel suite runner.
pub mod suite;
/// Cross-compilation.
pub mod toolchain;

/// Error type returned by every fallible operation.
pub use crate::common::{HarnessError, Result};
/// Root configuration type; use `Config::default()` or load from JSON.
pub use crate::config::Config;
/// Signature comparison entry points.
pub use crate::compare::{ComparisonResult, Status, compare, compare_files};
/// Suite runner; construct with `Suite::from_config`.
pub use crate::suite::{Suite, SuiteReport, TestCase};
