//! On-demand reference generation with the golden instruction-set simulator.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::common::constants::GOLDEN_RESET_PC;
use crate::common::{HarnessError, Invocation, Result, ToolError, ToolRunner};
use crate::config::Config;
use crate::resolve::{PathResolver, ProxyKernelCandidates};
use crate::signature::{SignatureOutcome, SignatureRecord};
use crate::toolchain::{ProfileKind, ToolchainInvoker, ToolchainProfile};

/// Maps an ISA string to the golden simulator's spelling.
///
/// The string is lowercased and every multi-letter extension is separated
/// by an underscore: `RV32IMCZicsr_Zifencei` becomes `rv32imc_zicsr_zifencei`.
pub fn golden_isa(isa: &str) -> String {
    let lower = isa.trim().to_ascii_lowercase();
    let mut parts = lower.split('_').filter(|p| !p.is_empty());
    let Some(head) = parts.next() else {
        return lower;
    };
    // Multi-letter extensions start at the first `z` or `x` after the base.
    let base_len = head
        .find(|c: char| c.is_ascii_alphabetic() && !"rv".contains(c))
        .unwrap_or(0);
    let mut out = match head[base_len..].find(['z', 'x']) {
        Some(i) => {
            let (single, multi) = head.split_at(base_len + i);
            format!("{single}_{multi}")
        }
        None => head.to_string(),
    };
    for p in parts {
        out.push('_');
        out.push_str(p);
    }
    out
}

/// Golden simulator together with its own toolchain profile.
#[derive(Debug)]
pub struct GoldenModel {
    program: String,
    isa: String,
    pk: Option<PathBuf>,
    timeout: Duration,
    invoker: std::result::Result<ToolchainInvoker, String>,
    runner: Arc<dyn ToolRunner>,
}

impl GoldenModel {
    /// Discovers the golden toolchain; a missing compiler or header directory
    /// is remembered and reported when generation is attempted.
    pub fn new(config: &Config, runner: Arc<dyn ToolRunner>) -> Self {
        let invoker = ToolchainProfile::discover(ProfileKind::Golden, config)
            .map(|p| ToolchainInvoker::new(p, Arc::clone(&runner)))
            .map_err(|e| e.to_string());
        Self::with_invoker(config, invoker, runner)
    }

    /// Creates a model over an explicit compile step.
    pub fn with_invoker(
        config: &Config,
        invoker: std::result::Result<ToolchainInvoker, String>,
        runner: Arc<dyn ToolRunner>,
    ) -> Self {
        let pk = PathResolver::resolve_source(&ProxyKernelCandidates {
            pk_dir: config.reference.pk_dir.clone(),
        })
        .found();
        Self {
            program: config.reference.golden_sim.clone(),
            isa: golden_isa(&config.general.isa),
            pk,
            timeout: config.reference.timeout(),
            invoker,
            runner,
        }
    }

    /// Returns the compile step, or why it is unavailable.
    pub fn invoker(&self) -> Result<&ToolchainInvoker> {
        self.invoker
            .as_ref()
            .map_err(|reason| HarnessError::GenerationUnavailable(reason.clone()))
    }

    /// Builds the simulator command for an ELF.
    pub fn command(&self, elf: &Path) -> Invocation {
        let mut inv = Invocation::new(&self.program, self.timeout)
            .arg(format!("--isa={}", self.isa))
            .arg(format!("--pc={GOLDEN_RESET_PC:#x}"));
        if let Some(pk) = &self.pk {
            inv = inv.arg_path(pk);
        }
        inv.arg_path(elf)
    }

    /// Compiles `test` and runs it, writing its stdout verbatim to `dest`.
    ///
    /// When `dest` already exists and `force` is not set, nothing is run and
    /// the existing file is returned as is. With `force`, the new output
    /// replaces `dest` only after a successful run.
    pub fn generate(
        &self,
        test: &Path,
        work_dir: &Path,
        dest: &Path,
        force: bool,
    ) -> Result<SignatureRecord> {
        if !force && dest.exists() {
            match SignatureOutcome::read(dest)? {
                SignatureOutcome::Available(r) => return Ok(r),
                SignatureOutcome::Unavailable { .. } => {}
            }
        }
        let elf = self.invoker()?.compile(test, work_dir)?;
        let inv = self.command(&elf).cwd(work_dir);
        tracing::debug!(command = %inv, "running golden simulator");
        let out = self.runner.run(&inv).map_err(run_error)?;
        if !out.success() {
            return Err(HarnessError::RunFailure {
                reason: format!("golden simulator exited with {:?}", out.code),
                stderr: out.stderr,
            });
        }
        let text = out.stdout_text();
        let record = match SignatureOutcome::parse(&text) {
            SignatureOutcome::Available(r) if !r.is_empty() => r,
            _ => {
                return Err(HarnessError::RunFailure {
                    reason: "golden simulator printed no signature".into(),
                    stderr: out.stderr,
                });
            }
        };

        let staged = dest.with_extension("partial");
        std::fs::write(&staged, &out.stdout).map_err(|e| HarnessError::io(&staged, e))?;
        std::fs::rename(&staged, dest).map_err(|e| HarnessError::io(dest, e))?;
        tracing::info!(
            test = %test.display(),
            words = record.len(),
            "reference signature generated"
        );
        Ok(record)
    }
}

fn run_error(e: ToolError) -> HarnessError {
    match e {
        ToolError::TimedOut { after, stderr, .. } => HarnessError::RunTimeout { after, stderr },
        other => HarnessError::RunFailure {
            reason: other.to_string(),
            stderr: String::new(),
        },
    }
}
