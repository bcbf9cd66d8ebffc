//! Cross-compilation of test sources.
//!
//! This module turns a test source into a loadable memory image. It provides:
//! 1. **Profiles:** Compiler prefix and fixed flag sets for the DUT and golden models.
//! 2. **Categories:** Arch tests versus freestanding C programs.
//! 3. **Invoker:** `compile` (source to ELF) and `convert_to_hex` (ELF to word hex image).

/// Compilation and hex conversion.
pub mod invoker;
/// Toolchain discovery and flag sets.
pub mod profile;

pub use invoker::ToolchainInvoker;
pub use profile::{ProfileKind, TestCategory, ToolchainProfile};
