//! Common utilities and types used throughout the conformance harness.
//!
//! This module provides the building blocks shared by every stage of the
//! pipeline. It includes:
//! 1. **Address Types:** Strong types for byte and word addresses.
//! 2. **Constants:** Memory map, testbench protocol and time budgets.
//! 3. **Memory Access:** Classification of bus accesses made by the core.
//! 4. **Error Handling:** The harness error taxonomy and pipeline stages.
//! 5. **Processes:** The tool-runner seam with timeout supervision.

/// Byte and word address types.
pub mod addr;

/// Harness-wide constants.
pub mod constants;

/// Memory access type definitions.
pub mod data;

/// Error types and pipeline stages.
pub mod error;

/// External process invocation.
pub mod process;

pub use addr::{ByteAddr, WORD_BYTES, WordAddr};
pub use data::{AccessType, DataRequest};
pub use error::{HarnessError, ImageError, MemoryError, Result, Stage, ToolError};
pub use process::{Invocation, OutputSink, ProcessRunner, ToolOutput, ToolRunner};
