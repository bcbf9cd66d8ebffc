//! Error taxonomy for the conformance pipeline.
//!
//! This module defines every failure the harness can produce. It provides:
//! 1. **Tool Errors:** Launch failures and timeouts of external programs, with captured stderr.
//! 2. **Image Errors:** Malformed or out-of-range memory-image text.
//! 3. **Memory Errors:** Out-of-range accesses made by the core during simulation.
//! 4. **Pipeline Errors:** The per-stage taxonomy (`CompileError`, `BuildTimeout`, ...) and
//!    the classification of which failures abort the whole suite.
//!
//! Failures that only concern one test are turned into a typed verdict at the
//! per-test boundary; only [`HarnessError::Setup`] and configuration errors stop
//! a suite.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use super::data::AccessType;

/// Result alias used throughout the crate.
pub type Result<T, E = HarnessError> = std::result::Result<T, E>;

/// Failure to run an external program at all.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The program could not be started (missing binary, permissions, ...).
    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        /// Program that was being launched.
        program: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The program exceeded its wall-clock budget and was killed.
    #[error("`{program}` timed out after {}s", .after.as_secs_f64())]
    TimedOut {
        /// Program that was killed.
        program: String,
        /// Budget that was exceeded.
        after: Duration,
        /// Standard error captured before the kill.
        stderr: String,
    },

    /// An I/O error occurred while supervising the program.
    #[error("I/O error while running `{program}`: {source}")]
    Io {
        /// Program being supervised.
        program: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Malformed memory-image text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ImageError {
    /// An `@` directive did not carry a valid hex word address.
    #[error("line {line}: invalid address directive `{text}`")]
    BadDirective {
        /// 1-based line number.
        line: usize,
        /// Offending text.
        text: String,
    },

    /// A data token was not a valid 32-bit hex word.
    #[error("line {line}: invalid data word `{text}`")]
    BadWord {
        /// 1-based line number.
        line: usize,
        /// Offending token.
        text: String,
    },

    /// A data word fell outside the allocated address range.
    #[error("line {line}: word at {addr:#x} lies outside the memory image")]
    OutOfRange {
        /// 1-based line number.
        line: usize,
        /// Byte address of the word (64-bit so overflowed directives still report).
        addr: u64,
    },
}

/// Access outside the memory image made by the core under test.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    /// The address is not backed by the image.
    #[error("{kind} at {addr:#010x} outside image [{base:#010x}, {end:#x})")]
    OutOfRange {
        /// Port that made the access.
        kind: AccessType,
        /// Offending byte address.
        addr: u32,
        /// First byte of the image.
        base: u32,
        /// One past the last byte of the image.
        end: u64,
    },
}

/// Pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Harness initialization (toolchain, RTL, simulator tool discovery).
    Setup,
    /// Source to ELF compilation.
    Compile,
    /// ELF to hex conversion.
    Convert,
    /// Simulator build.
    Build,
    /// Simulation run.
    Run,
    /// Signature extraction from the DUT run.
    Extract,
    /// Reference signature acquisition.
    Reference,
    /// Comparison and report rendering.
    Report,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Setup => "setup",
            Self::Compile => "compile",
            Self::Convert => "convert",
            Self::Build => "build",
            Self::Run => "run",
            Self::Extract => "extract",
            Self::Reference => "reference",
            Self::Report => "report",
        };
        f.write_str(s)
    }
}

/// Top-level error type for the harness.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The harness cannot be initialized at all (suite-fatal).
    #[error("setup failed: {0}")]
    Setup(String),

    /// Invalid configuration (suite-fatal).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The cross-compiler exited unsuccessfully.
    #[error("compilation of {} failed:\n{stderr}", .source_path.display())]
    CompileError {
        /// Test source being compiled.
        source_path: PathBuf,
        /// Compiler stderr, verbatim.
        stderr: String,
    },

    /// `objcopy` exited unsuccessfully.
    #[error("hex conversion of {} failed:\n{stderr}", .elf.display())]
    ConvertError {
        /// ELF being converted.
        elf: PathBuf,
        /// Converter stderr, verbatim.
        stderr: String,
    },

    /// The simulator build failed (bad exit, missing output binary).
    #[error("simulator build failed: {reason}\n{stderr}")]
    BuildFailure {
        /// Short description of the failure.
        reason: String,
        /// Build tool stderr, verbatim.
        stderr: String,
    },

    /// The simulator build exceeded its wall-clock budget.
    #[error("simulator build timed out after {}s\n{stderr}", .after.as_secs_f64())]
    BuildTimeout {
        /// Budget that was exceeded.
        after: Duration,
        /// Build tool stderr captured before the kill.
        stderr: String,
    },

    /// A simulation could not be carried out.
    #[error("simulation failed: {reason}\n{stderr}")]
    RunFailure {
        /// Short description of the failure.
        reason: String,
        /// Simulator stderr or log excerpt, verbatim.
        stderr: String,
    },

    /// A simulation exceeded its wall-clock budget.
    #[error("simulation timed out after {}s", .after.as_secs_f64())]
    RunTimeout {
        /// Budget that was exceeded.
        after: Duration,
        /// Output captured before the kill.
        stderr: String,
    },

    /// The core accessed memory outside the image.
    #[error("simulation fault at cycle {cycle}: {source}")]
    MemoryFault {
        /// Cycle at which the fault happened.
        cycle: u64,
        /// The offending access.
        #[source]
        source: MemoryError,
    },

    /// On-demand reference generation cannot be attempted (no golden
    /// toolchain or arch-test headers).
    #[error("reference generation unavailable: {0}")]
    GenerationUnavailable(String),

    /// No signature could be extracted from a finished run.
    #[error("signature extraction failed: {0}")]
    Extract(String),

    /// Memory-image text could not be loaded.
    #[error(transparent)]
    Image(#[from] ImageError),

    /// An ELF file could not be parsed.
    #[error("cannot read ELF {}: {reason}", .path.display())]
    Elf {
        /// ELF path.
        path: PathBuf,
        /// Parser message.
        reason: String,
    },

    /// An external program could not be run.
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// Filesystem error with the path it concerned.
    #[error("{}: {source}", .path.display())]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl HarnessError {
    /// Wraps an I/O error with the path it concerned.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns `true` when the failure prevents the harness from running any test.
    pub const fn is_suite_fatal(&self) -> bool {
        matches!(self, Self::Setup(_) | Self::Config(_))
    }

    /// Returns the pipeline stage this failure belongs to.
    pub const fn stage(&self) -> Stage {
        match self {
            Self::Setup(_) | Self::Config(_) => Stage::Setup,
            Self::CompileError { .. } => Stage::Compile,
            Self::ConvertError { .. } => Stage::Convert,
            Self::BuildFailure { .. } | Self::BuildTimeout { .. } => Stage::Build,
            Self::RunFailure { .. }
            | Self::RunTimeout { .. }
            | Self::MemoryFault { .. }
            | Self::Image(_)
            | Self::Elf { .. }
            | Self::Tool(_)
            | Self::Io { .. } => Stage::Run,
            Self::Extract(_) => Stage::Extract,
            Self::GenerationUnavailable(_) => Stage::Reference,
        }
    }

    /// Returns the captured stderr of the external process behind this failure, if any.
    pub fn captured_stderr(&self) -> Option<&str> {
        match self {
            Self::CompileError { stderr, .. }
            | Self::ConvertError { stderr, .. }
            | Self::BuildFailure { stderr, .. }
            | Self::BuildTimeout { stderr, .. }
            | Self::RunFailure { stderr, .. }
            | Self::RunTimeout { stderr, .. }
            | Self::Tool(ToolError::TimedOut { stderr, .. }) => Some(stderr),
            _ => None,
        }
    }
}
