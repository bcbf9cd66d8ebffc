//! Plugin lifecycle surface for a test-framework host.
//!
//! A host constructs one plugin per model, calls [`Plugin::build`] once, then
//! for every test calls [`Plugin::compile`], [`Plugin::run`] and
//! [`Plugin::parse_signature`] in that order. Every per-test failure leaves
//! an explicit sentinel at the signature path and is returned as a typed
//! error, so the host can record it and continue with the next test.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::common::{HarnessError, Result, ToolRunner};
use crate::config::{BackendKind, Config};
use crate::reference::{ReferenceSignatureProvider, ReferenceSource};
use crate::signature::{Role, SignatureOutcome, write_sentinel};
use crate::sim::{
    DutFactory, RunRequest, SimBackend, SimRun, SimulationHarness, SimulatorBuild, SimulatorSpec,
};
use crate::toolchain::{ProfileKind, ToolchainInvoker, ToolchainProfile};

/// Lifecycle a model plugin exposes to its host.
pub trait Plugin: Send + Sync {
    /// One-time preparation (e.g. building the simulator).
    fn build(&self) -> Result<()>;

    /// Turns a test source into a runnable artifact inside `output_dir`.
    fn compile(&self, test: &Path, output_dir: &Path) -> Result<PathBuf>;

    /// Runs an artifact, writing `log`; returns the exit status.
    fn run(&self, artifact: &Path, log: &Path, timeout: Duration) -> Result<Option<i32>>;

    /// Writes the signature of the run that produced `log` to `out`.
    fn parse_signature(&self, log: &Path, out: &Path) -> Result<()>;
}

impl std::fmt::Debug for dyn Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Plugin")
    }
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn parent(path: &Path) -> PathBuf {
    path.parent().map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

#[derive(Debug)]
struct PendingRun {
    hex: PathBuf,
    elf: Option<PathBuf>,
    run: SimRun,
}

/// Plugin for the core under test.
#[derive(Debug)]
pub struct DutPlugin {
    invoker: ToolchainInvoker,
    sim: SimulationHarness,
    runs: Mutex<HashMap<PathBuf, PendingRun>>,
}

impl DutPlugin {
    /// Constructs the plugin for `config`, building into `work_dir`.
    ///
    /// # Errors
    ///
    /// [`HarnessError::Setup`] when no cross-compiler can be found, and
    /// [`HarnessError::Config`] when the configuration selects the native
    /// backend (use [`DutPlugin::native`] with a core model instead).
    pub fn new(config: &Config, work_dir: &Path, runner: Arc<dyn ToolRunner>) -> Result<Self> {
        if config.dut.backend == BackendKind::Native {
            return Err(HarnessError::Config(
                "the native backend needs a linked core model".into(),
            ));
        }
        let build = SimulatorBuild::new(
            SimulatorSpec::from_config(&config.dut, work_dir),
            Arc::clone(&runner),
        );
        Self::with_backend(config, SimBackend::Verilated(build), runner)
    }

    /// Constructs a plugin that simulates `factory`'s core in-process.
    ///
    /// # Errors
    ///
    /// [`HarnessError::Setup`] when no cross-compiler can be found.
    pub fn native(
        config: &Config,
        factory: Arc<dyn DutFactory>,
        runner: Arc<dyn ToolRunner>,
    ) -> Result<Self> {
        Self::with_backend(config, SimBackend::Native(factory), runner)
    }

    fn with_backend(config: &Config, backend: SimBackend, runner: Arc<dyn ToolRunner>) -> Result<Self> {
        let profile = ToolchainProfile::discover(ProfileKind::Dut, config)?;
        Ok(Self::with_parts(
            ToolchainInvoker::new(profile, Arc::clone(&runner)),
            SimulationHarness::new(backend, runner, config.dut.clone()),
        ))
    }

    /// Assembles a plugin from an invoker and a harness.
    pub fn with_parts(invoker: ToolchainInvoker, sim: SimulationHarness) -> Self {
        Self {
            invoker,
            sim,
            runs: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the simulation harness.
    pub const fn harness(&self) -> &SimulationHarness {
        &self.sim
    }
}

impl Plugin for DutPlugin {
    fn build(&self) -> Result<()> {
        self.sim.build()
    }

    fn compile(&self, test: &Path, output_dir: &Path) -> Result<PathBuf> {
        let elf = self.invoker.compile(test, output_dir)?;
        self.invoker.convert_to_hex(&elf, output_dir)
    }

    fn run(&self, artifact: &Path, log: &Path, timeout: Duration) -> Result<Option<i32>> {
        let test = stem(artifact);
        let work_dir = parent(artifact);
        let elf = Some(artifact.with_extension("elf")).filter(|p| p.exists());
        let req = RunRequest {
            test: &test,
            hex: artifact,
            elf: elf.as_deref(),
            work_dir: &work_dir,
            log,
        };
        let run = self.sim.run(&req, timeout)?;
        let code = run.exit_code;
        let _ = self
            .runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                log.to_path_buf(),
                PendingRun {
                    hex: artifact.to_path_buf(),
                    elf,
                    run,
                },
            );
        Ok(code)
    }

    fn parse_signature(&self, log: &Path, out: &Path) -> Result<()> {
        let pending = self
            .runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(log);
        let work_dir = parent(log);
        let test = stem(log);
        let (hex, elf, run) = match pending {
            Some(p) => (p.hex, p.elf, p.run),
            None => (
                work_dir.join(format!("{test}.hex")),
                None,
                SimRun {
                    exit_code: None,
                    completion: None,
                    cycles: None,
                    image: None,
                },
            ),
        };
        let req = RunRequest {
            test: &test,
            hex: &hex,
            elf: elf.as_deref(),
            work_dir: &work_dir,
            log,
        };
        match self.sim.extract(&req, &run) {
            Ok(record) => record.write(out),
            Err(e) => {
                write_sentinel(out, Role::Dut, &e.to_string())?;
                Err(e)
            }
        }
    }
}

/// Plugin for the golden model.
///
/// `compile` acquires the reference signature (existing, pregenerated or
/// generated) and returns its path; `run` copies it into the log and
/// `parse_signature` places it at the requested path.
#[derive(Debug)]
pub struct ReferencePlugin {
    provider: ReferenceSignatureProvider,
}

impl ReferencePlugin {
    /// Wraps a provider.
    pub const fn new(provider: ReferenceSignatureProvider) -> Self {
        Self { provider }
    }
}

impl Plugin for ReferencePlugin {
    fn build(&self) -> Result<()> {
        Ok(())
    }

    fn compile(&self, test: &Path, output_dir: &Path) -> Result<PathBuf> {
        let acq = self.provider.acquire(test, output_dir)?;
        if acq.source == ReferenceSource::Sentinel {
            tracing::warn!(test = %test.display(), "reference plugin produced a sentinel");
        }
        Ok(acq.path)
    }

    fn run(&self, artifact: &Path, log: &Path, _timeout: Duration) -> Result<Option<i32>> {
        let _ = std::fs::copy(artifact, log).map_err(|e| HarnessError::io(log, e))?;
        Ok(Some(0))
    }

    fn parse_signature(&self, log: &Path, out: &Path) -> Result<()> {
        if SignatureOutcome::read(out)?.is_available() {
            return Ok(());
        }
        match SignatureOutcome::read(log)? {
            SignatureOutcome::Available(record) => record.write(out),
            SignatureOutcome::Unavailable { reason } => {
                write_sentinel(out, Role::Reference, &reason)?;
                Err(HarnessError::GenerationUnavailable(reason))
            }
        }
    }
}
