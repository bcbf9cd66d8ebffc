//! First-match path resolution over ordered candidate lists.
//!
//! Toolchain discovery, reference-directory discovery and arch-test header
//! discovery all share one resolver. It provides:
//! 1. **Candidate Lists:** A non-empty, order-preserving list whose first entry is the fallback.
//! 2. **Resolution:** The first existing candidate, or the fallback with a [`PathResolutionWarning`].
//! 3. **Sources:** Per-search-kind generators in [`candidates`].

/// Candidate generators for each search kind.
pub mod candidates;

use std::fmt;
use std::path::{Path, PathBuf};

pub use candidates::{
    ArchTestEnvCandidates, CandidateSource, ProxyKernelCandidates, ReferenceDirCandidates,
    SearchKind, ToolchainCandidates,
};

/// Ordered, never-empty list of filesystem locations.
///
/// Order encodes priority: earlier candidates are more specific.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CandidatePathList {
    paths: Vec<PathBuf>,
}

impl CandidatePathList {
    /// Creates a list from a fallback and further candidates.
    ///
    /// The fallback is always the first element, so resolution can never
    /// come back empty-handed.
    pub fn new(fallback: impl Into<PathBuf>, rest: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut paths = vec![fallback.into()];
        paths.extend(rest);
        Self { paths }
    }

    /// Builds a list from an iterator; returns `None` when it yields nothing.
    pub fn from_paths(paths: impl IntoIterator<Item = PathBuf>) -> Option<Self> {
        let paths: Vec<PathBuf> = paths.into_iter().collect();
        if paths.is_empty() {
            None
        } else {
            Some(Self { paths })
        }
    }

    /// Returns the fallback (first) candidate.
    pub fn fallback(&self) -> &Path {
        // Non-empty by construction.
        self.paths.first().map_or_else(|| Path::new(""), PathBuf::as_path)
    }

    /// Returns the candidates in priority order.
    pub fn as_slice(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Returns the number of candidates.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Always `false`; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Non-fatal notice that no candidate existed and the fallback was used.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathResolutionWarning {
    /// What was being searched for.
    pub kind: SearchKind,
    /// Every candidate that was tried, in order.
    pub tried: Vec<PathBuf>,
}

impl fmt::Display for PathResolutionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "no {} candidate exists ({} tried); falling back to {}",
            self.kind,
            self.tried.len(),
            self.tried
                .first()
                .map_or_else(String::new, |p| p.display().to_string())
        )
    }
}

/// Outcome of a resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    /// Chosen path.
    pub path: PathBuf,
    /// Present when the path is the fallback rather than an existing candidate.
    pub warning: Option<PathResolutionWarning>,
}

impl Resolution {
    /// Returns `true` when the chosen path was found to exist.
    pub const fn is_found(&self) -> bool {
        self.warning.is_none()
    }

    /// Returns the path only if it was found.
    pub fn found(self) -> Option<PathBuf> {
        if self.warning.is_none() {
            Some(self.path)
        } else {
            None
        }
    }
}

/// Deterministic first-existing-wins resolver.
#[derive(Clone, Copy, Debug, Default)]
pub struct PathResolver;

impl PathResolver {
    /// Resolves a list, labelling any warning as a generic search.
    pub fn resolve(candidates: &CandidatePathList) -> Resolution {
        Self::resolve_kind(SearchKind::Generic, candidates)
    }

    /// Resolves a list for a particular search kind.
    ///
    /// Never fails: when nothing exists the fallback is returned together
    /// with a warning, which is also logged.
    pub fn resolve_kind(kind: SearchKind, candidates: &CandidatePathList) -> Resolution {
        if let Some(hit) = candidates.as_slice().iter().find(|p| p.exists()) {
            tracing::debug!(%kind, path = %hit.display(), "resolved");
            return Resolution {
                path: hit.clone(),
                warning: None,
            };
        }
        let warning = PathResolutionWarning {
            kind,
            tried: candidates.as_slice().to_vec(),
        };
        tracing::warn!("{warning}");
        Resolution {
            path: candidates.fallback().to_path_buf(),
            warning: Some(warning),
        }
    }

    /// Resolves the candidates produced by a source.
    pub fn resolve_source(source: &dyn CandidateSource) -> Resolution {
        Self::resolve_kind(source.kind(), &source.candidates())
    }
}
