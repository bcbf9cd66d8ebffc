//! Lookup of pregenerated reference signatures.

use std::path::{Path, PathBuf};

use crate::common::{HarnessError, Result};
use crate::config::ReferenceConfig;
use crate::resolve::{CandidatePathList, PathResolver, ReferenceDirCandidates};

/// File-name conventions tried inside the signature directory, in order.
const SUFFIXES: [&str; 3] = ["signature", "reference_output", "ref"];

/// Copies a pregenerated signature into place when one exists.
#[derive(Clone, Debug)]
pub struct PregeneratedLookup {
    dir: PathBuf,
}

impl PregeneratedLookup {
    /// Uses `dir` as the signature directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Resolves the signature directory from the reference configuration.
    pub fn from_config(config: &ReferenceConfig) -> Self {
        let res = PathResolver::resolve_source(&ReferenceDirCandidates {
            explicit: config.signature_dir.clone(),
            plugin_dir: config.plugin_dir.clone(),
        });
        Self::new(res.path)
    }

    /// Returns the signature directory in use.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Candidate files for a test, most specific first.
    pub fn candidates(&self, name: &str) -> CandidatePathList {
        let flat = SUFFIXES.iter().map(|s| self.dir.join(format!("{name}.{s}")));
        let nested = SUFFIXES
            .iter()
            .map(|s| self.dir.join("I").join(format!("{name}.{s}")));
        let src = SUFFIXES[..2]
            .iter()
            .map(|s| self.dir.join("src").join(format!("{name}.{s}")));
        let mut all = flat.chain(nested).chain(src);
        let first = all.next().unwrap_or_else(|| self.dir.join(name));
        CandidatePathList::new(first, all)
    }

    /// Returns the first existing signature file for `name`.
    pub fn find(&self, name: &str) -> Option<PathBuf> {
        self.candidates(name)
            .as_slice()
            .iter()
            .find(|p| p.is_file())
            .cloned()
    }

    /// Copies the pregenerated signature for `name` to `dest`.
    ///
    /// Returns the source path, or `None` when no file exists. An existing
    /// `dest` is left untouched and reported as found.
    pub fn copy_into(&self, name: &str, dest: &Path) -> Result<Option<PathBuf>> {
        if dest.exists() {
            tracing::info!(test = name, "reference signature already present; skipping copy");
            return Ok(Some(dest.to_path_buf()));
        }
        let Some(src) = self.find(name) else {
            return Ok(None);
        };
        let _ = std::fs::copy(&src, dest).map_err(|e| HarnessError::io(dest, e))?;
        tracing::info!(test = name, from = %src.display(), "copied pregenerated reference signature");
        Ok(Some(src))
    }
}
