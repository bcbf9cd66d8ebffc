//! Configuration system for the conformance harness.
//!
//! This module defines all configuration structures used to parameterize a
//! run. It provides:
//! 1. **Defaults:** Baseline toolchain flags, memory map, budgets and search roots.
//! 2. **Structures:** Hierarchical config for general, toolchain, DUT, reference and arch-test settings.
//! 3. **Enums:** Signature extraction strategy and simulation backend selection.
//!
//! Configuration is supplied as JSON (see [`Config::load`]) or built with
//! `Config::default()`; every field has a default, so partial documents are fine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::common::{HarnessError, Result, WORD_BYTES};

/// Default configuration constants for the harness.
mod defaults {
    use crate::common::constants;

    /// ISA string of the core under test.
    pub const ISA: &str = "RV32I";

    /// Architecture string handed to the compiler.
    pub const MARCH: &str = "rv32i";

    /// ABI string handed to the compiler.
    pub const MABI: &str = "ilp32";

    /// Toolchain triples, most specific first.
    pub const TRIPLES: [&str; 4] = [
        "riscv32-unknown-elf-",
        "riscv64-unknown-elf-",
        "riscv32-unknown-linux-gnu-",
        "riscv64-unknown-linux-gnu-",
    ];

    /// Toolchain install directories searched before `PATH`.
    pub const INSTALL_DIRS: [&str; 4] = [
        "/opt/riscv-conformance/riscv/bin",
        "/opt/riscv/bin",
        "/usr/local/riscv/bin",
        "/usr/local/bin",
    ];

    /// DUT model environment (link script, `model_test.h`).
    pub const DUT_ENV_DIR: &str = "riscof/zeronyte/env";

    /// Golden model environment.
    pub const REF_ENV_DIR: &str = "riscof/spike/env";

    /// Generated RTL of the core under test.
    pub const RTL: &str = "rtl/generators/generated/verilog_hierarchical_timed/ZeroNyteRV32ICore.v";

    /// Top-level module of the RTL.
    pub const TOP: &str = "ZeroNyteRV32ICore";

    /// HDL compiler.
    pub const VERILATOR: &str = "verilator";

    /// Golden instruction-set simulator.
    pub const GOLDEN_SIM: &str = "spike";

    /// Proxy kernel installation root.
    pub const PK_DIR: &str = "/opt/riscv-conformance/pk";

    /// Environment variable naming an arch-test checkout.
    pub const ARCH_TEST_ROOT_VAR: &str = "RISCV_ARCH_TEST_ROOT";

    /// System-wide arch-test installation.
    pub const ARCH_TEST_SYSTEM_ROOT: &str = "/opt/riscv-conformance/riscv-arch-test";

    /// Work directory for suite artifacts.
    pub const WORK_DIR: &str = "riscof_work";

    pub const COMPILE_TIMEOUT_SECS: u64 = constants::COMPILE_TIMEOUT.as_secs();
    pub const CONVERT_TIMEOUT_SECS: u64 = constants::CONVERT_TIMEOUT.as_secs();
    pub const BUILD_TIMEOUT_SECS: u64 = constants::BUILD_TIMEOUT.as_secs();
    pub const RUN_TIMEOUT_SECS: u64 = constants::RUN_TIMEOUT.as_secs();
}

/// How the DUT-side signature is obtained after a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureExtraction {
    /// Copy a signature file the simulator wrote into its working directory.
    #[default]
    CopyFromArtifactFile,
    /// Scrape `SIGNATURE:` lines or a `begin_signature` block out of the log.
    ScrapeLogMarkers,
    /// Serialize the signature region of the in-process memory image.
    DumpMemoryRegion,
}

/// Which simulation backend executes the DUT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Externally built, cycle-accurate simulator executable.
    #[default]
    Verilated,
    /// In-process testbench over a linked [`Dut`](crate::sim::testbench::Dut) model.
    Native,
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Suite-wide settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Cross-compiler discovery and flags.
    #[serde(default)]
    pub toolchain: ToolchainConfig,
    /// Core under test and its simulator.
    #[serde(default)]
    pub dut: DutConfig,
    /// Reference signature acquisition.
    #[serde(default)]
    pub reference: ReferenceConfig,
    /// Architecture-test header discovery.
    #[serde(default)]
    pub arch_test: ArchTestConfig,
}

impl Config {
    /// Parses a configuration from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| HarnessError::Config(e.to_string()))
    }

    /// Loads a configuration file and validates it.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| HarnessError::io(path, e))?;
        let config = Self::from_json_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field invariants.
    ///
    /// The signature region must be non-empty, word-aligned and inside the
    /// memory image; the completion cell must be inside the image; budgets must
    /// be non-zero.
    pub fn validate(&self) -> Result<()> {
        let dut = &self.dut;
        if dut.signature_start >= dut.signature_end {
            return Err(HarnessError::Config(format!(
                "signature region [{:#x}, {:#x}) is empty",
                dut.signature_start, dut.signature_end
            )));
        }
        if dut.signature_start % WORD_BYTES != 0 || dut.signature_end % WORD_BYTES != 0 {
            return Err(HarnessError::Config(
                "signature region bounds must be word-aligned".into(),
            ));
        }
        if dut.mem_size == 0 || dut.mem_size % WORD_BYTES != 0 {
            return Err(HarnessError::Config(
                "memory size must be a non-zero multiple of 4".into(),
            ));
        }
        let end = u64::from(dut.mem_base) + u64::from(dut.mem_size);
        let inside = |a: u32| a >= dut.mem_base && u64::from(a) < end;
        if !inside(dut.signature_start) || u64::from(dut.signature_end) > end {
            return Err(HarnessError::Config(
                "signature region lies outside the memory image".into(),
            ));
        }
        if !inside(dut.tohost) {
            return Err(HarnessError::Config(format!(
                "completion cell {:#x} lies outside the memory image",
                dut.tohost
            )));
        }
        if dut.max_cycles == 0 {
            return Err(HarnessError::Config("max_cycles must be non-zero".into()));
        }
        let timeouts = [
            ("toolchain.compile_timeout_secs", self.toolchain.compile_timeout_secs),
            ("toolchain.convert_timeout_secs", self.toolchain.convert_timeout_secs),
            ("dut.build_timeout_secs", dut.build_timeout_secs),
            ("dut.run_timeout_secs", dut.run_timeout_secs),
            ("reference.timeout_secs", self.reference.timeout_secs),
        ];
        if let Some((field, _)) = timeouts.iter().find(|(_, secs)| *secs == 0) {
            return Err(HarnessError::Config(format!("{field} must be non-zero")));
        }
        Ok(())
    }
}

/// Suite-wide settings.
#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    /// ISA string of the core (e.g. `RV32IMCZicsr_Zifencei`).
    #[serde(default = "GeneralConfig::default_isa")]
    pub isa: String,
    /// Root directory for per-test working directories.
    #[serde(default = "GeneralConfig::default_work_dir")]
    pub work_dir: PathBuf,
    /// Worker threads for the suite; `0` uses one per CPU.
    #[serde(default)]
    pub jobs: usize,
    /// Regenerate reference signatures even when one already exists.
    #[serde(default)]
    pub force_reference: bool,
}

impl GeneralConfig {
    fn default_isa() -> String {
        defaults::ISA.into()
    }

    fn default_work_dir() -> PathBuf {
        defaults::WORK_DIR.into()
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            isa: Self::default_isa(),
            work_dir: Self::default_work_dir(),
            jobs: 0,
            force_reference: false,
        }
    }
}

/// Cross-compiler discovery and flags.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolchainConfig {
    /// Explicit prefix (e.g. `/opt/riscv/bin/riscv32-unknown-elf-`); tried first.
    #[serde(default)]
    pub prefix: Option<String>,
    /// Install directories searched before `PATH`.
    #[serde(default = "ToolchainConfig::default_install_dirs")]
    pub install_dirs: Vec<PathBuf>,
    /// Target triples tried in each directory.
    #[serde(default = "ToolchainConfig::default_triples")]
    pub triples: Vec<String>,
    /// `-march` value.
    #[serde(default = "ToolchainConfig::default_march")]
    pub march: String,
    /// `-mabi` value.
    #[serde(default = "ToolchainConfig::default_mabi")]
    pub mabi: String,
    /// DUT model environment directory (holds `link.ld`).
    #[serde(default = "ToolchainConfig::default_env_dir")]
    pub env_dir: PathBuf,
    /// Compile budget in seconds.
    #[serde(default = "ToolchainConfig::default_compile_timeout")]
    pub compile_timeout_secs: u64,
    /// ELF to hex conversion budget in seconds.
    #[serde(default = "ToolchainConfig::default_convert_timeout")]
    pub convert_timeout_secs: u64,
}

impl ToolchainConfig {
    fn default_install_dirs() -> Vec<PathBuf> {
        defaults::INSTALL_DIRS.iter().map(PathBuf::from).collect()
    }

    fn default_triples() -> Vec<String> {
        defaults::TRIPLES.iter().map(|t| (*t).to_string()).collect()
    }

    fn default_march() -> String {
        defaults::MARCH.into()
    }

    fn default_mabi() -> String {
        defaults::MABI.into()
    }

    fn default_env_dir() -> PathBuf {
        defaults::DUT_ENV_DIR.into()
    }

    const fn default_compile_timeout() -> u64 {
        defaults::COMPILE_TIMEOUT_SECS
    }

    const fn default_convert_timeout() -> u64 {
        defaults::CONVERT_TIMEOUT_SECS
    }

    /// Compile budget.
    pub const fn compile_timeout(&self) -> Duration {
        Duration::from_secs(self.compile_timeout_secs)
    }

    /// Conversion budget.
    pub const fn convert_timeout(&self) -> Duration {
        Duration::from_secs(self.convert_timeout_secs)
    }
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            prefix: None,
            install_dirs: Self::default_install_dirs(),
            triples: Self::default_triples(),
            march: Self::default_march(),
            mabi: Self::default_mabi(),
            env_dir: Self::default_env_dir(),
            compile_timeout_secs: defaults::COMPILE_TIMEOUT_SECS,
            convert_timeout_secs: defaults::CONVERT_TIMEOUT_SECS,
        }
    }
}

/// Core under test and its simulator.
#[derive(Debug, Clone, Deserialize)]
pub struct DutConfig {
    /// Simulation backend.
    #[serde(default)]
    pub backend: BackendKind,
    /// Hardware-description source of the core.
    #[serde(default = "DutConfig::default_rtl")]
    pub rtl: PathBuf,
    /// Top-level module name.
    #[serde(default = "DutConfig::default_top")]
    pub top: String,
    /// Testbench sources compiled together with the RTL.
    #[serde(default)]
    pub testbench: Vec<PathBuf>,
    /// HDL compiler program.
    #[serde(default = "DutConfig::default_verilator")]
    pub verilator: String,
    /// Extra HDL compiler arguments.
    #[serde(default = "DutConfig::default_verilator_args")]
    pub verilator_args: Vec<String>,
    /// Build output directory; defaults to `<work_dir>/obj_dir`.
    #[serde(default)]
    pub obj_dir: Option<PathBuf>,
    /// Build budget in seconds.
    #[serde(default = "DutConfig::default_build_timeout")]
    pub build_timeout_secs: u64,
    /// Run budget in seconds.
    #[serde(default = "DutConfig::default_run_timeout")]
    pub run_timeout_secs: u64,
    /// Cycle budget per run.
    #[serde(default = "DutConfig::default_max_cycles")]
    pub max_cycles: u64,
    /// Cycles reset is held before execution.
    #[serde(default = "DutConfig::default_reset_cycles")]
    pub reset_cycles: u64,
    /// First byte of simulated RAM.
    #[serde(default = "DutConfig::default_mem_base")]
    pub mem_base: u32,
    /// Size of simulated RAM in bytes.
    #[serde(default = "DutConfig::default_mem_size")]
    pub mem_size: u32,
    /// Default signature region start (overridden by ELF symbols).
    #[serde(default = "DutConfig::default_signature_start")]
    pub signature_start: u32,
    /// Default signature region end, exclusive (overridden by ELF symbols).
    #[serde(default = "DutConfig::default_signature_end")]
    pub signature_end: u32,
    /// Default completion cell (overridden by the `tohost` ELF symbol).
    #[serde(default = "DutConfig::default_tohost")]
    pub tohost: u32,
    /// Signature extraction strategy for the DUT role.
    #[serde(default)]
    pub extraction: SignatureExtraction,
}

impl DutConfig {
    fn default_rtl() -> PathBuf {
        defaults::RTL.into()
    }

    fn default_top() -> String {
        defaults::TOP.into()
    }

    fn default_verilator() -> String {
        defaults::VERILATOR.into()
    }

    /// Returns the default HDL compiler flags.
    ///
    /// X-propagation is resolved fast and assertions are disabled, matching
    /// what the generated RTL expects.
    fn default_verilator_args() -> Vec<String> {
        ["-O3", "--x-assign", "fast", "--x-initial", "fast", "--noassert"]
            .iter()
            .map(|s| (*s).to_string())
            .collect()
    }

    const fn default_build_timeout() -> u64 {
        defaults::BUILD_TIMEOUT_SECS
    }

    const fn default_run_timeout() -> u64 {
        defaults::RUN_TIMEOUT_SECS
    }

    const fn default_max_cycles() -> u64 {
        crate::common::constants::MAX_CYCLES
    }

    const fn default_reset_cycles() -> u64 {
        crate::common::constants::RESET_CYCLES
    }

    const fn default_mem_base() -> u32 {
        crate::common::constants::MEM_BASE
    }

    const fn default_mem_size() -> u32 {
        crate::common::constants::MEM_SIZE
    }

    const fn default_signature_start() -> u32 {
        crate::common::constants::SIGNATURE_START
    }

    const fn default_signature_end() -> u32 {
        crate::common::constants::SIGNATURE_END
    }

    const fn default_tohost() -> u32 {
        crate::common::constants::TOHOST_ADDR
    }

    /// Build budget.
    pub const fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }

    /// Run budget.
    pub const fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }
}

impl Default for DutConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            rtl: Self::default_rtl(),
            top: Self::default_top(),
            testbench: Vec::new(),
            verilator: Self::default_verilator(),
            verilator_args: Self::default_verilator_args(),
            obj_dir: None,
            build_timeout_secs: defaults::BUILD_TIMEOUT_SECS,
            run_timeout_secs: defaults::RUN_TIMEOUT_SECS,
            max_cycles: Self::default_max_cycles(),
            reset_cycles: Self::default_reset_cycles(),
            mem_base: Self::default_mem_base(),
            mem_size: Self::default_mem_size(),
            signature_start: Self::default_signature_start(),
            signature_end: Self::default_signature_end(),
            tohost: Self::default_tohost(),
            extraction: SignatureExtraction::default(),
        }
    }
}

/// Reference signature acquisition.
#[derive(Debug, Clone, Deserialize)]
pub struct ReferenceConfig {
    /// Explicit pregenerated-signature directory; searched before derived locations.
    #[serde(default)]
    pub signature_dir: Option<PathBuf>,
    /// Directory the reference plugin lives in; ancestor search starts here.
    #[serde(default = "ReferenceConfig::default_plugin_dir")]
    pub plugin_dir: PathBuf,
    /// Allow on-demand generation with the golden simulator.
    #[serde(default = "ReferenceConfig::default_generate")]
    pub generate: bool,
    /// Golden simulator program.
    #[serde(default = "ReferenceConfig::default_golden_sim")]
    pub golden_sim: String,
    /// Proxy kernel installation root.
    #[serde(default = "ReferenceConfig::default_pk_dir")]
    pub pk_dir: PathBuf,
    /// Golden model environment directory (holds its `link.ld`).
    #[serde(default = "ReferenceConfig::default_env_dir")]
    pub env_dir: PathBuf,
    /// Golden compile and run budget in seconds.
    #[serde(default = "ReferenceConfig::default_timeout")]
    pub timeout_secs: u64,
}

impl ReferenceConfig {
    fn default_plugin_dir() -> PathBuf {
        PathBuf::from("riscof/spike")
    }

    const fn default_generate() -> bool {
        true
    }

    fn default_golden_sim() -> String {
        defaults::GOLDEN_SIM.into()
    }

    fn default_pk_dir() -> PathBuf {
        defaults::PK_DIR.into()
    }

    fn default_env_dir() -> PathBuf {
        defaults::REF_ENV_DIR.into()
    }

    const fn default_timeout() -> u64 {
        defaults::RUN_TIMEOUT_SECS
    }

    /// Golden compile and run budget.
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            signature_dir: None,
            plugin_dir: Self::default_plugin_dir(),
            generate: true,
            golden_sim: Self::default_golden_sim(),
            pk_dir: Self::default_pk_dir(),
            env_dir: Self::default_env_dir(),
            timeout_secs: defaults::RUN_TIMEOUT_SECS,
        }
    }
}

/// Architecture-test header discovery.
#[derive(Debug, Clone, Deserialize)]
pub struct ArchTestConfig {
    /// Local checkout of `riscv-arch-test`; derived from the plugin directory when unset.
    #[serde(default)]
    pub local_root: Option<PathBuf>,
    /// System-wide installation root.
    #[serde(default = "ArchTestConfig::default_system_root")]
    pub system_root: PathBuf,
    /// Environment variable consulted last.
    #[serde(default = "ArchTestConfig::default_root_var")]
    pub root_var: String,
}

impl ArchTestConfig {
    fn default_system_root() -> PathBuf {
        defaults::ARCH_TEST_SYSTEM_ROOT.into()
    }

    fn default_root_var() -> String {
        defaults::ARCH_TEST_ROOT_VAR.into()
    }
}

impl Default for ArchTestConfig {
    fn default() -> Self {
        Self {
            local_root: None,
            system_root: Self::default_system_root(),
            root_var: Self::default_root_var(),
        }
    }
}
