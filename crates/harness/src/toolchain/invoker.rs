//! Compilation and hex conversion through the resolved toolchain.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::profile::{TestCategory, ToolchainProfile};
use crate::common::{HarnessError, Invocation, Result, ToolError, ToolRunner};

/// Runs the cross-compiler and object converter for one profile.
#[derive(Clone, Debug)]
pub struct ToolchainInvoker {
    profile: ToolchainProfile,
    runner: Arc<dyn ToolRunner>,
}

/// Renders a tool failure together with whatever stderr it captured.
pub(crate) fn describe_tool_error(err: &ToolError) -> String {
    match err {
        ToolError::TimedOut { stderr, .. } if !stderr.is_empty() => format!("{err}\n{stderr}"),
        _ => err.to_string(),
    }
}

impl ToolchainInvoker {
    /// Creates an invoker over a resolved profile.
    pub fn new(profile: ToolchainProfile, runner: Arc<dyn ToolRunner>) -> Self {
        Self { profile, runner }
    }

    /// Returns the profile in use.
    pub const fn profile(&self) -> &ToolchainProfile {
        &self.profile
    }

    /// Returns the deterministic ELF path for a test: `<work_dir>/<stem>.elf`.
    pub fn elf_path(test: &Path, work_dir: &Path) -> PathBuf {
        let stem = test.file_stem().unwrap_or(test.as_os_str());
        work_dir.join(format!("{}.elf", stem.to_string_lossy()))
    }

    /// Compiles `test` into `<work_dir>/<stem>.elf`.
    ///
    /// # Errors
    ///
    /// [`HarnessError::CompileError`] carrying the compiler's stderr verbatim
    /// when it exits non-zero, times out, or produces no output file.
    pub fn compile(&self, test: &Path, work_dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(work_dir).map_err(|e| HarnessError::io(work_dir, e))?;
        let elf = Self::elf_path(test, work_dir);
        let category = TestCategory::from_source(test);

        let mut inv = Invocation::new(self.profile.gcc(), self.profile.compile_timeout)
            .args(self.profile.compile_flags(category))
            .arg("-o")
            .arg_path(&elf);
        let crt0 = (category == TestCategory::Functional)
            .then(|| self.profile.crt0())
            .flatten();
        if let Some(crt0) = crt0 {
            inv = inv.arg_path(&crt0);
        }
        let inv = inv.arg_path(test);

        tracing::debug!(command = %inv, "compiling");
        let fail = |stderr: String| HarnessError::CompileError {
            source_path: test.to_path_buf(),
            stderr,
        };
        let out = self
            .runner
            .run(&inv)
            .map_err(|e| fail(describe_tool_error(&e)))?;
        if !out.success() {
            return Err(fail(out.stderr));
        }
        if !elf.exists() {
            return Err(fail(format!("compiler produced no {}", elf.display())));
        }
        Ok(elf)
    }

    /// Converts an ELF into a word-oriented hex image next to it in `work_dir`.
    ///
    /// # Errors
    ///
    /// [`HarnessError::ConvertError`] carrying the converter's stderr verbatim.
    pub fn convert_to_hex(&self, elf: &Path, work_dir: &Path) -> Result<PathBuf> {
        let stem = elf.file_stem().unwrap_or(elf.as_os_str());
        let hex = work_dir.join(format!("{}.hex", stem.to_string_lossy()));
        let inv = Invocation::new(self.profile.objcopy(), self.profile.convert_timeout)
            .args(["-O", "verilog", "--verilog-data-width=4"])
            .arg_path(elf)
            .arg_path(&hex);

        tracing::debug!(command = %inv, "converting");
        let fail = |stderr: String| HarnessError::ConvertError {
            elf: elf.to_path_buf(),
            stderr,
        };
        let out = self
            .runner
            .run(&inv)
            .map_err(|e| fail(describe_tool_error(&e)))?;
        if !out.success() {
            return Err(fail(out.stderr));
        }
        if !hex.exists() {
            return Err(fail(format!("converter produced no {}", hex.display())));
        }
        Ok(hex)
    }
}
