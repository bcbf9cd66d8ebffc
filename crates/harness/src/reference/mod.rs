//! Reference signature acquisition.
//!
//! The golden signature for a test is obtained by, in order:
//! 1. **Existing File:** A signature already at the destination is kept unless regeneration is forced.
//! 2. **Pregenerated Lookup:** A file under one of the historical naming conventions is copied in.
//! 3. **On-demand Generation:** The test is compiled for and run on the golden simulator.
//!
//! When every strategy fails an explicit sentinel is written in place of the
//! signature and the outcome is reported as unavailable.

/// Golden-simulator generation.
pub mod golden;
/// Pregenerated signature lookup.
pub mod pregenerated;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

pub use golden::{GoldenModel, golden_isa};
pub use pregenerated::PregeneratedLookup;

use crate::common::constants::REFERENCE_SIGNATURE_NAME;
use crate::common::{HarnessError, Result, ToolRunner};
use crate::config::Config;
use crate::signature::{Role, SignatureOutcome, write_sentinel};

/// Where a reference signature came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceSource {
    /// Already present at the destination.
    Existing,
    /// Copied from a pregenerated file.
    Pregenerated,
    /// Produced by the golden simulator.
    Generated,
    /// Nothing worked; a sentinel was written.
    Sentinel,
}

/// Result of [`ReferenceSignatureProvider::acquire`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Acquisition {
    /// Destination file.
    pub path: PathBuf,
    /// Strategy that produced it.
    pub source: ReferenceSource,
    /// Parsed content.
    pub outcome: SignatureOutcome,
}

/// Supplies the reference signature for each test.
#[derive(Debug)]
pub struct ReferenceSignatureProvider {
    lookup: PregeneratedLookup,
    golden: Option<GoldenModel>,
    force: bool,
}

impl ReferenceSignatureProvider {
    /// Creates a provider; `golden` is `None` when generation is disabled.
    pub const fn new(lookup: PregeneratedLookup, golden: Option<GoldenModel>, force: bool) -> Self {
        Self {
            lookup,
            golden,
            force,
        }
    }

    /// Creates the provider described by `config`.
    pub fn from_config(config: &Config, runner: Arc<dyn ToolRunner>) -> Self {
        let golden = config
            .reference
            .generate
            .then(|| GoldenModel::new(config, runner));
        Self::new(
            PregeneratedLookup::from_config(&config.reference),
            golden,
            config.general.force_reference,
        )
    }

    /// Destination of the reference signature inside a test's working directory.
    pub fn destination(work_dir: &Path) -> PathBuf {
        work_dir.join("ref").join(REFERENCE_SIGNATURE_NAME)
    }

    /// Acquires the reference signature for `test` into its working directory.
    ///
    /// Only filesystem errors on the destination itself are returned; every
    /// strategy failure ends in [`ReferenceSource::Sentinel`].
    pub fn acquire(&self, test: &Path, work_dir: &Path) -> Result<Acquisition> {
        let name = test
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ref_dir = work_dir.join("ref");
        std::fs::create_dir_all(&ref_dir).map_err(|e| HarnessError::io(&ref_dir, e))?;
        let dest = Self::destination(work_dir);
        let done = |source| -> Result<Acquisition> {
            Ok(Acquisition {
                outcome: SignatureOutcome::read(&dest)?,
                path: dest.clone(),
                source,
            })
        };

        let existing = SignatureOutcome::read(&dest).is_ok_and(|o| o.is_available());
        if existing && !self.force {
            tracing::info!(test = %name, "reference signature already exists, skipping");
            return done(ReferenceSource::Existing);
        }

        let mut reasons = Vec::new();
        if !existing {
            // A stale sentinel from an earlier run must not block a fresh copy.
            if dest.exists() {
                std::fs::remove_file(&dest).map_err(|e| HarnessError::io(&dest, e))?;
            }
            match self.lookup.copy_into(&name, &dest) {
                Ok(Some(_)) => return done(ReferenceSource::Pregenerated),
                Ok(None) => reasons.push(format!(
                    "no pregenerated signature in {}",
                    self.lookup.dir().display()
                )),
                Err(e) => reasons.push(e.to_string()),
            }
        }

        match &self.golden {
            Some(golden) => match golden.generate(test, &ref_dir, &dest, self.force) {
                Ok(_) => return done(ReferenceSource::Generated),
                Err(e) => {
                    tracing::warn!(test = %name, error = %e, "reference generation failed");
                    reasons.push(e.to_string());
                }
            },
            None => reasons.push("on-demand generation disabled".into()),
        }

        if existing {
            tracing::warn!(
                test = %name,
                "regeneration failed; keeping existing reference signature"
            );
            return done(ReferenceSource::Existing);
        }
        let reason = reasons.join("; ");
        tracing::error!(test = %name, %reason, "reference signature unavailable");
        write_sentinel(&dest, Role::Reference, &reason)?;
        done(ReferenceSource::Sentinel)
    }
}
