//! Resolved compiler prefix and fixed flag sets.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::common::{HarnessError, Result};
use crate::config::Config;
use crate::resolve::{ArchTestEnvCandidates, PathResolver, ToolchainCandidates};

/// Which model a profile compiles for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProfileKind {
    /// The core under test.
    Dut,
    /// The golden instruction-set simulator.
    Golden,
}

/// Kind of test source, chosen from its extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TestCategory {
    /// Assembly architecture test (`.S`, `.s`).
    ArchTest,
    /// Freestanding C program (`.c`).
    Functional,
}

impl TestCategory {
    /// Classifies a source file; anything that is not C is treated as an arch test.
    pub fn from_source(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("c") => Self::Functional,
            _ => Self::ArchTest,
        }
    }
}

/// Compiler prefix and flags, fixed for the lifetime of a harness.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolchainProfile {
    /// Model this profile targets.
    pub kind: ProfileKind,
    /// Tool prefix, e.g. `/opt/riscv/bin/riscv32-unknown-elf-`.
    pub prefix: String,
    /// `-march` value.
    pub march: String,
    /// `-mabi` value.
    pub mabi: String,
    /// Model environment directory: `link.ld`, `model_test.h`, optional `crt0.S`.
    pub env_dir: PathBuf,
    /// Architecture-test header directory (`arch_test.h`).
    pub arch_test_env: PathBuf,
    /// Test-environment macro definition.
    pub env_macro: String,
    /// Compile budget.
    pub compile_timeout: Duration,
    /// Conversion budget.
    pub convert_timeout: Duration,
}

impl ToolchainProfile {
    /// Macro selecting the bare test environment.
    pub const ENV_MACRO: &'static str = "RVTEST_E=1";

    /// Discovers the compiler and header directories for `kind`.
    ///
    /// A missing compiler is a setup error. A missing arch-test directory is
    /// tolerated for the DUT (the fallback is used and a warning logged) but
    /// is an error for the golden profile, whose caller treats it as
    /// "generation unavailable".
    pub fn discover(kind: ProfileKind, config: &Config) -> Result<Self> {
        let tc = &config.toolchain;
        let compiler = PathResolver::resolve_source(&ToolchainCandidates {
            prefix: tc.prefix.clone(),
            install_dirs: tc.install_dirs.clone(),
            triples: tc.triples.clone(),
            search_path: true,
        });
        let Some(gcc) = compiler.found() else {
            return Err(HarnessError::Setup(
                "no RISC-V cross-compiler found in any install directory or on PATH".into(),
            ));
        };

        let at = &config.arch_test;
        let local_root = at.local_root.clone().unwrap_or_else(|| {
            ArchTestEnvCandidates::local_root_for(&config.reference.plugin_dir)
        });
        let env = PathResolver::resolve_source(&ArchTestEnvCandidates::from_env(
            local_root,
            at.system_root.clone(),
            &at.root_var,
        ));
        if kind == ProfileKind::Golden && !env.is_found() {
            return Err(HarnessError::Setup(
                "no architecture-test environment directory found".into(),
            ));
        }

        let env_dir = match kind {
            ProfileKind::Dut => tc.env_dir.clone(),
            ProfileKind::Golden => config.reference.env_dir.clone(),
        };
        let profile = Self {
            kind,
            prefix: ToolchainCandidates::prefix_of(&gcc),
            march: tc.march.clone(),
            mabi: tc.mabi.clone(),
            env_dir,
            arch_test_env: env.path,
            env_macro: Self::ENV_MACRO.into(),
            compile_timeout: tc.compile_timeout(),
            convert_timeout: tc.convert_timeout(),
        };
        tracing::info!(kind = ?profile.kind, prefix = %profile.prefix, "toolchain selected");
        Ok(profile)
    }

    /// Path of the C compiler.
    pub fn gcc(&self) -> String {
        format!("{}gcc", self.prefix)
    }

    /// Path of the object converter.
    pub fn objcopy(&self) -> String {
        format!("{}objcopy", self.prefix)
    }

    /// Linker script inside the model environment.
    pub fn linker_script(&self) -> PathBuf {
        self.env_dir.join("link.ld")
    }

    /// Startup file linked into functional tests when present.
    pub fn crt0(&self) -> Option<PathBuf> {
        let p = self.env_dir.join("crt0.S");
        p.exists().then_some(p)
    }

    /// Returns the compiler flags for a category, excluding output and inputs.
    pub fn compile_flags(&self, category: TestCategory) -> Vec<String> {
        let mut flags = vec![
            format!("-march={}", self.march),
            format!("-mabi={}", self.mabi),
            "-static".into(),
            "-mcmodel=medany".into(),
            "-fvisibility=hidden".into(),
            "-nostdlib".into(),
            "-nostartfiles".into(),
        ];
        match category {
            TestCategory::ArchTest => {
                flags.push(format!("-Wa,-march={}", self.march));
                flags.push("-Wa,--no-warn".into());
            }
            TestCategory::Functional => {
                flags.push("-O2".into());
                flags.push("-ffreestanding".into());
            }
        }
        flags.push(format!("-T{}", self.linker_script().display()));
        flags.push(format!("-I{}", self.env_dir.display()));
        flags.push(format!("-I{}", self.arch_test_env.display()));
        flags.push(format!("-D{}", self.env_macro));
        flags
    }
}
