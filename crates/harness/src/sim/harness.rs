//! Simulation harness: build once, run per test, extract the DUT signature.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::build::SimulatorBuild;
use super::elf::ElfSymbols;
use super::extract::ExtractionContext;
use super::image::{MemoryImage, SignatureRegion};
use super::testbench::{Completion, Dut, Testbench, TestbenchOptions};
use crate::common::{HarnessError, Invocation, Result, ToolError, ToolRunner};
use crate::config::{DutConfig, SignatureExtraction};
use crate::report::tail_lines;
use crate::signature::SignatureRecord;

/// Creates fresh core models for native runs.
pub trait DutFactory: Send + Sync {
    /// Returns a core model in its power-on state.
    fn create(&self) -> Box<dyn Dut>;
}

impl<F> DutFactory for F
where
    F: Fn() -> Box<dyn Dut> + Send + Sync,
{
    fn create(&self) -> Box<dyn Dut> {
        self()
    }
}

/// How the DUT is simulated.
pub enum SimBackend {
    /// Externally built cycle-accurate executable.
    Verilated(SimulatorBuild),
    /// In-process testbench over a linked core model.
    Native(Arc<dyn DutFactory>),
}

impl std::fmt::Debug for SimBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Verilated(b) => f.debug_tuple("Verilated").field(b).finish(),
            Self::Native(_) => f.write_str("Native"),
        }
    }
}

/// Artifacts of one DUT run.
#[derive(Clone, Copy, Debug)]
pub struct RunRequest<'a> {
    /// Test name (source stem).
    pub test: &'a str,
    /// Hex memory image.
    pub hex: &'a Path,
    /// ELF the image came from, for symbol lookup.
    pub elf: Option<&'a Path>,
    /// Per-test working directory.
    pub work_dir: &'a Path,
    /// Log file to write.
    pub log: &'a Path,
}

impl RunRequest<'_> {
    /// Signature file written by the simulator itself.
    pub fn simulator_signature(&self) -> PathBuf {
        self.work_dir.join("signature.txt")
    }
}

/// Result of a run, before extraction.
#[derive(Debug)]
pub struct SimRun {
    /// Exit code of the simulator executable (`Some(0)` for native runs).
    pub exit_code: Option<i32>,
    /// Completion, when the backend reports it.
    pub completion: Option<Completion>,
    /// Cycles executed, when the backend reports them.
    pub cycles: Option<u64>,
    /// Final memory image of a native run.
    pub image: Option<MemoryImage>,
}

/// Builds and runs the simulator for the core under test.
#[derive(Debug)]
pub struct SimulationHarness {
    backend: SimBackend,
    runner: Arc<dyn ToolRunner>,
    dut: DutConfig,
}

impl SimulationHarness {
    /// Creates a harness over a backend.
    pub fn new(backend: SimBackend, runner: Arc<dyn ToolRunner>, dut: DutConfig) -> Self {
        Self {
            backend,
            runner,
            dut,
        }
    }

    /// Returns the DUT configuration.
    pub const fn config(&self) -> &DutConfig {
        &self.dut
    }

    /// Ensures the simulator is built; a no-op for native runs.
    pub fn build(&self) -> Result<()> {
        match &self.backend {
            SimBackend::Verilated(b) => b.ensure_built().map(|_| ()),
            SimBackend::Native(_) => Ok(()),
        }
    }

    /// Runs one test image under the wall-clock `timeout`.
    ///
    /// Signature artifacts left in the work directory by an earlier run are
    /// removed first, so extraction only sees files this run wrote.
    ///
    /// # Errors
    ///
    /// [`HarnessError::RunTimeout`] when the budget is exceeded,
    /// [`HarnessError::RunFailure`] when the simulator cannot be run or dies
    /// from a signal, [`HarnessError::MemoryFault`] for stray native accesses.
    pub fn run(&self, req: &RunRequest<'_>, timeout: Duration) -> Result<SimRun> {
        self.clear_artifacts(req)?;
        match &self.backend {
            SimBackend::Verilated(build) => self.run_verilated(build, req, timeout),
            SimBackend::Native(factory) => self.run_native(factory.as_ref(), req, timeout),
        }
    }

    fn run_verilated(
        &self,
        build: &SimulatorBuild,
        req: &RunRequest<'_>,
        timeout: Duration,
    ) -> Result<SimRun> {
        let bin = build.ensure_built()?;
        let inv = Invocation::new(bin, timeout)
            .arg("--hex")
            .arg_path(req.hex)
            .arg("--signature")
            .arg_path(&req.simulator_signature())
            .arg("--max-cycles")
            .arg(self.dut.max_cycles.to_string())
            .cwd(req.work_dir)
            .log_to(req.log);

        let out = self.runner.run(&inv).map_err(|e| match e {
            ToolError::TimedOut { after, .. } => HarnessError::RunTimeout {
                after,
                stderr: log_excerpt(req.log),
            },
            other => HarnessError::RunFailure {
                reason: other.to_string(),
                stderr: String::new(),
            },
        })?;
        match out.code {
            None => Err(HarnessError::RunFailure {
                reason: "simulator terminated by a signal".into(),
                stderr: log_excerpt(req.log),
            }),
            Some(0) => Ok(SimRun {
                exit_code: Some(0),
                completion: None,
                cycles: None,
                image: None,
            }),
            Some(code) => {
                tracing::warn!(test = req.test, code, "simulator returned non-zero exit code");
                Ok(SimRun {
                    exit_code: Some(code),
                    completion: None,
                    cycles: None,
                    image: None,
                })
            }
        }
    }

    /// Builds the memory image for a test, applying ELF symbol overrides.
    ///
    /// An unreadable ELF leaves the configured region and completion cell in place.
    pub fn prepare_image(&self, req: &RunRequest<'_>) -> Result<(MemoryImage, u32)> {
        let symbols = req
            .elf
            .map(|elf| {
                ElfSymbols::read(elf).unwrap_or_else(|e| {
                    tracing::warn!(test = req.test, error = %e, "ignoring ELF symbols");
                    ElfSymbols::default()
                })
            })
            .unwrap_or_default();
        let region = symbols
            .signature_region()
            .or_else(|| SignatureRegion::new(self.dut.signature_start, self.dut.signature_end))
            .ok_or_else(|| HarnessError::RunFailure {
                reason: "empty or misaligned signature region".into(),
                stderr: String::new(),
            })?;
        let tohost = symbols.tohost.unwrap_or(self.dut.tohost);

        let mut image = MemoryImage::new(self.dut.mem_base, self.dut.mem_size, region);
        let words = image.load_hex_file(req.hex)?;
        tracing::debug!(test = req.test, words, "image loaded");
        Ok((image, tohost))
    }

    fn run_native(
        &self,
        factory: &dyn DutFactory,
        req: &RunRequest<'_>,
        timeout: Duration,
    ) -> Result<SimRun> {
        let (image, tohost) = self.prepare_image(req)?;
        let mut bench = Testbench::new(
            image,
            TestbenchOptions {
                max_cycles: self.dut.max_cycles,
                reset_cycles: self.dut.reset_cycles,
                tohost,
                deadline: Some(timeout),
            },
        );

        let file = File::create(req.log).map_err(|e| HarnessError::io(req.log, e))?;
        let mut log = BufWriter::new(file);
        let mut dut = factory.create();
        let outcome = bench.run_traced(dut.as_mut(), &mut log);
        if let Err(e) = &outcome {
            if let Err(w) = writeln!(log, "simulation aborted: {e}") {
                tracing::warn!(log = %req.log.display(), error = %w, "cannot record abort reason");
            }
        }
        log.flush().map_err(|e| HarnessError::io(req.log, e))?;
        let outcome = outcome?;

        outcome.signature.write(&req.simulator_signature())?;
        Ok(SimRun {
            exit_code: Some(0),
            completion: Some(outcome.completion),
            cycles: Some(outcome.cycles),
            image: Some(bench.into_image()),
        })
    }

    /// Extracts the DUT signature of a finished run with the configured strategy.
    pub fn extract(&self, req: &RunRequest<'_>, run: &SimRun) -> Result<SignatureRecord> {
        self.extract_with(self.dut.extraction, req, run)
    }

    /// Extracts the DUT signature with an explicit strategy.
    pub fn extract_with(
        &self,
        strategy: SignatureExtraction,
        req: &RunRequest<'_>,
        run: &SimRun,
    ) -> Result<SignatureRecord> {
        strategy.extract(&self.context(req, run.image.as_ref()))
    }

    fn context<'a>(
        &'a self,
        req: &RunRequest<'a>,
        image: Option<&'a MemoryImage>,
    ) -> ExtractionContext<'a> {
        ExtractionContext {
            work_dir: req.work_dir,
            top: &self.dut.top,
            test: req.test,
            log: req.log,
            image,
        }
    }

    fn clear_artifacts(&self, req: &RunRequest<'_>) -> Result<()> {
        for path in self.context(req, None).artifact_candidates().as_slice() {
            match std::fs::remove_file(path) {
                Ok(()) => tracing::debug!(path = %path.display(), "removed stale signature artifact"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(HarnessError::io(path, e)),
            }
        }
        Ok(())
    }
}

fn log_excerpt(log: &Path) -> String {
    std::fs::read_to_string(log)
        .map(|t| tail_lines(&t, 20).join("\n"))
        .unwrap_or_default()
}
