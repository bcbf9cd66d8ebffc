//! One-time, single-flight build of the cycle-accurate simulator.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};

use crate::common::{HarnessError, Invocation, Result, ToolError, ToolRunner};
use crate::config::DutConfig;

/// Inputs of a simulator build.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimulatorSpec {
    /// HDL compiler program.
    pub verilator: String,
    /// Extra compiler arguments (optimization, X handling).
    pub args: Vec<String>,
    /// Top-level module.
    pub top: String,
    /// Hardware-description source.
    pub rtl: PathBuf,
    /// Testbench sources.
    pub testbench: Vec<PathBuf>,
    /// Output directory.
    pub obj_dir: PathBuf,
    /// Build budget.
    pub timeout: Duration,
}

impl SimulatorSpec {
    /// Derives a build spec from the DUT configuration.
    pub fn from_config(dut: &DutConfig, work_dir: &Path) -> Self {
        Self {
            verilator: dut.verilator.clone(),
            args: dut.verilator_args.clone(),
            top: dut.top.clone(),
            rtl: dut.rtl.clone(),
            testbench: dut.testbench.clone(),
            obj_dir: dut.obj_dir.clone().unwrap_or_else(|| work_dir.join("obj_dir")),
            timeout: dut.build_timeout(),
        }
    }

    /// Path of the built executable: `<obj_dir>/V<top>`.
    pub fn binary(&self) -> PathBuf {
        self.obj_dir.join(format!("V{}", self.top))
    }

    fn invocation(&self) -> Invocation {
        Invocation::new(&self.verilator, self.timeout)
            .args(["--cc", "--exe", "--build", "--top-module"])
            .arg(&self.top)
            .args(self.args.iter().cloned())
            .args(["-CFLAGS", "-std=c++17", "--Mdir"])
            .arg_path(&self.obj_dir)
            .arg_path(&self.rtl)
            .args(self.testbench.iter().map(|p| p.to_string_lossy().into_owned()))
    }
}

fn mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Memoized simulator build shared by every test of a harness.
#[derive(Debug)]
pub struct SimulatorBuild {
    spec: SimulatorSpec,
    runner: Arc<dyn ToolRunner>,
    built: Mutex<Option<PathBuf>>,
}

impl SimulatorBuild {
    /// Creates an unbuilt handle.
    pub fn new(spec: SimulatorSpec, runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            spec,
            runner,
            built: Mutex::new(None),
        }
    }

    /// Returns the build inputs.
    pub const fn spec(&self) -> &SimulatorSpec {
        &self.spec
    }

    /// Returns `true` when the binary is missing or older than any source.
    pub fn is_stale(&self) -> bool {
        let Some(bin) = mtime(&self.spec.binary()) else {
            return true;
        };
        std::iter::once(&self.spec.rtl)
            .chain(&self.spec.testbench)
            .filter_map(|p| mtime(p))
            .any(|src| src > bin)
    }

    /// Builds the simulator if needed and returns the executable path.
    ///
    /// Concurrent callers serialize on an internal lock; the first performs
    /// the build and the rest reuse its result. A failed rebuild falls back
    /// to an existing binary when one is present.
    ///
    /// # Errors
    ///
    /// * [`HarnessError::Setup`] when the RTL source is missing or the HDL
    ///   compiler cannot be launched and no binary exists.
    /// * [`HarnessError::BuildFailure`] / [`HarnessError::BuildTimeout`] when the
    ///   build fails and no binary exists.
    pub fn ensure_built(&self) -> Result<PathBuf> {
        let mut built = self.built.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(bin) = built.as_ref() {
            return Ok(bin.clone());
        }
        if !self.spec.rtl.exists() {
            return Err(HarnessError::Setup(format!(
                "hardware-description source {} is missing",
                self.spec.rtl.display()
            )));
        }
        let bin = self.spec.binary();
        if !self.is_stale() {
            tracing::info!(binary = %bin.display(), "simulator up to date");
            *built = Some(bin.clone());
            return Ok(bin);
        }

        match self.build() {
            Ok(()) => {
                tracing::info!(binary = %bin.display(), "simulator built");
                *built = Some(bin.clone());
                Ok(bin)
            }
            Err(e) if bin.exists() => {
                tracing::warn!(
                    error = %e,
                    binary = %bin.display(),
                    "rebuild failed; using cached simulator"
                );
                *built = Some(bin.clone());
                Ok(bin)
            }
            Err(e) => Err(e),
        }
    }

    fn build(&self) -> Result<()> {
        std::fs::create_dir_all(&self.spec.obj_dir)
            .map_err(|e| HarnessError::io(&self.spec.obj_dir, e))?;
        let inv = self.spec.invocation();
        tracing::info!(command = %inv, "building simulator");

        let out = self.runner.run(&inv).map_err(|e| match e {
            ToolError::TimedOut { after, stderr, .. } => {
                HarnessError::BuildTimeout { after, stderr }
            }
            ToolError::Spawn { program, source } => {
                HarnessError::Setup(format!("cannot launch HDL compiler `{program}`: {source}"))
            }
            other @ ToolError::Io { .. } => HarnessError::BuildFailure {
                reason: other.to_string(),
                stderr: String::new(),
            },
        })?;
        if !out.success() {
            return Err(HarnessError::BuildFailure {
                reason: format!("HDL compiler exited with {:?}", out.code),
                stderr: out.stderr,
            });
        }
        if !self.spec.binary().exists() {
            return Err(HarnessError::BuildFailure {
                reason: format!("no executable at {}", self.spec.binary().display()),
                stderr: out.stderr,
            });
        }
        Ok(())
    }
}
