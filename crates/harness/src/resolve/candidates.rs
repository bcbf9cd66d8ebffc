//! Candidate generators, one per search kind.

use std::fmt;
use std::path::{Path, PathBuf};

use super::CandidatePathList;

/// What a candidate list is searching for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SearchKind {
    /// Cross-compiler `gcc` binary; the prefix is derived from its path.
    Toolchain,
    /// Directory of pregenerated reference signatures.
    ReferenceDir,
    /// Architecture-test environment header directory.
    ArchTestEnv,
    /// Proxy kernel for the golden simulator.
    ProxyKernel,
    /// Anything else.
    Generic,
}

impl fmt::Display for SearchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Toolchain => "toolchain",
            Self::ReferenceDir => "reference directory",
            Self::ArchTestEnv => "arch-test environment",
            Self::ProxyKernel => "proxy kernel",
            Self::Generic => "path",
        })
    }
}

/// Produces the ordered candidate list for one search kind.
pub trait CandidateSource {
    /// The kind of search, for diagnostics.
    fn kind(&self) -> SearchKind;

    /// The ordered candidates; the first is the fallback.
    fn candidates(&self) -> CandidatePathList;
}

/// Cross-compiler `gcc` candidates.
///
/// Order: explicit prefix, then every install directory crossed with every
/// triple, then `PATH` hits per triple.
#[derive(Clone, Debug)]
pub struct ToolchainCandidates {
    /// Explicitly configured prefix.
    pub prefix: Option<String>,
    /// Install directories to search.
    pub install_dirs: Vec<PathBuf>,
    /// Triples (`riscv32-unknown-elf-`, ...) to try.
    pub triples: Vec<String>,
    /// Whether to consult `PATH` after the directories.
    pub search_path: bool,
}

impl ToolchainCandidates {
    /// Returns the toolchain prefix implied by a resolved `gcc` path.
    ///
    /// `/opt/riscv/bin/riscv32-unknown-elf-gcc` yields
    /// `/opt/riscv/bin/riscv32-unknown-elf-`.
    pub fn prefix_of(gcc: &Path) -> String {
        let s = gcc.to_string_lossy();
        s.strip_suffix("gcc").unwrap_or(&s).to_string()
    }
}

impl CandidateSource for ToolchainCandidates {
    fn kind(&self) -> SearchKind {
        SearchKind::Toolchain
    }

    fn candidates(&self) -> CandidatePathList {
        let mut out = Vec::new();
        if let Some(p) = &self.prefix {
            out.push(PathBuf::from(format!("{p}gcc")));
        }
        for dir in &self.install_dirs {
            for triple in &self.triples {
                out.push(dir.join(format!("{triple}gcc")));
            }
        }
        if self.search_path {
            for triple in &self.triples {
                if let Ok(hit) = which::which(format!("{triple}gcc")) {
                    out.push(hit);
                }
            }
        }
        CandidatePathList::from_paths(out).unwrap_or_else(|| {
            let first = self.triples.first().map_or("riscv32-unknown-elf-", String::as_str);
            CandidatePathList::new(format!("{first}gcc"), [])
        })
    }
}

/// Pregenerated reference-signature directory candidates.
///
/// Derived from the reference plugin's own directory by walking up to three
/// ancestors: `<ancestor>/reference_signatures/src` for each, then
/// `<ancestor>/riscof_work/reference_signatures` for the second and third.
#[derive(Clone, Debug)]
pub struct ReferenceDirCandidates {
    /// Explicitly configured directory, tried first.
    pub explicit: Option<PathBuf>,
    /// Directory the reference plugin lives in.
    pub plugin_dir: PathBuf,
}

impl CandidateSource for ReferenceDirCandidates {
    fn kind(&self) -> SearchKind {
        SearchKind::ReferenceDir
    }

    fn candidates(&self) -> CandidatePathList {
        let ancestors: Vec<&Path> = self.plugin_dir.ancestors().skip(1).take(3).collect();
        let mut out: Vec<PathBuf> = self.explicit.iter().cloned().collect();
        out.extend(
            ancestors
                .iter()
                .map(|a| a.join("reference_signatures").join("src")),
        );
        out.extend(
            ancestors
                .iter()
                .skip(1)
                .map(|a| a.join("riscof_work").join("reference_signatures")),
        );
        CandidatePathList::from_paths(out).unwrap_or_else(|| {
            CandidatePathList::new(self.plugin_dir.join("reference_signatures"), [])
        })
    }
}

/// Architecture-test environment header candidates.
///
/// Order: local checkout, system install, then the environment-variable root.
#[derive(Clone, Debug)]
pub struct ArchTestEnvCandidates {
    /// Root of a local `riscv-arch-test` checkout.
    pub local_root: PathBuf,
    /// System-wide install root.
    pub system_root: PathBuf,
    /// Value of the root environment variable, if set.
    pub env_root: Option<PathBuf>,
}

impl ArchTestEnvCandidates {
    const ENV_SUFFIX: [&'static str; 2] = ["riscv-test-suite", "env"];

    fn env_dir(root: &Path) -> PathBuf {
        Self::ENV_SUFFIX.iter().fold(root.to_path_buf(), |p, c| p.join(c))
    }

    /// Derives the local checkout root from a plugin directory.
    ///
    /// The checkout sits next to the directory three levels above the plugin.
    pub fn local_root_for(plugin_dir: &Path) -> PathBuf {
        plugin_dir
            .ancestors()
            .nth(3)
            .unwrap_or(plugin_dir)
            .join("riscv-arch-test")
    }

    /// Reads the root from the named environment variable.
    pub fn from_env(local_root: PathBuf, system_root: PathBuf, var: &str) -> Self {
        Self {
            local_root,
            system_root,
            env_root: std::env::var_os(var).map(PathBuf::from),
        }
    }
}

impl CandidateSource for ArchTestEnvCandidates {
    fn kind(&self) -> SearchKind {
        SearchKind::ArchTestEnv
    }

    fn candidates(&self) -> CandidatePathList {
        CandidatePathList::new(
            Self::env_dir(&self.local_root),
            [Some(Self::env_dir(&self.system_root)), self.env_root.as_deref().map(Self::env_dir)]
                .into_iter()
                .flatten(),
        )
    }
}

/// Proxy-kernel candidates for the golden simulator.
#[derive(Clone, Debug)]
pub struct ProxyKernelCandidates {
    /// Configured proxy kernel installation root.
    pub pk_dir: PathBuf,
}

impl CandidateSource for ProxyKernelCandidates {
    fn kind(&self) -> SearchKind {
        SearchKind::ProxyKernel
    }

    fn candidates(&self) -> CandidatePathList {
        CandidatePathList::new(
            self.pk_dir.join("bin").join("pk"),
            [
                self.pk_dir.join("riscv32-unknown-elf").join("bin").join("pk"),
                self.pk_dir.join("riscv64-unknown-elf").join("bin").join("pk"),
                PathBuf::from("/opt/riscv-conformance/pk/bin/pk"),
                PathBuf::from("/opt/riscv/bin/pk"),
            ],
        )
    }
}
