//! Signature extraction strategies for finished DUT runs.

use std::path::Path;

use super::image::MemoryImage;
use crate::common::{HarnessError, Result};
use crate::config::SignatureExtraction;
use crate::resolve::{CandidatePathList, PathResolver, SearchKind};
use crate::signature::{SignatureOutcome, SignatureRecord, normalize};

/// What a strategy may look at after a run.
#[derive(Clone, Copy, Debug)]
pub struct ExtractionContext<'a> {
    /// Per-test working directory.
    pub work_dir: &'a Path,
    /// Top-level module name of the DUT.
    pub top: &'a str,
    /// Test name (source file stem).
    pub test: &'a str,
    /// Simulation log.
    pub log: &'a Path,
    /// Final memory image, for in-process runs.
    pub image: Option<&'a MemoryImage>,
}

impl ExtractionContext<'_> {
    /// Files a simulator may have written its signature to, most specific first.
    pub fn artifact_candidates(&self) -> CandidatePathList {
        CandidatePathList::new(
            self.work_dir.join("signature.txt"),
            [
                self.work_dir.join("rtl.sig"),
                self.work_dir.join(format!("{}.sig", self.top)),
                self.work_dir.join(format!("{}.signature", self.test)),
            ],
        )
    }
}

impl SignatureExtraction {
    /// Extracts the DUT signature.
    ///
    /// # Errors
    ///
    /// [`HarnessError::Extract`] when the strategy finds nothing usable.
    pub fn extract(self, ctx: &ExtractionContext<'_>) -> Result<SignatureRecord> {
        match self {
            Self::CopyFromArtifactFile => {
                let found =
                    PathResolver::resolve_kind(SearchKind::Generic, &ctx.artifact_candidates());
                let path = found.found().ok_or_else(|| {
                    HarnessError::Extract(format!(
                        "no signature artifact in {}",
                        ctx.work_dir.display()
                    ))
                })?;
                read_artifact(&path)
            }
            Self::ScrapeLogMarkers => {
                let text = std::fs::read_to_string(ctx.log)
                    .map_err(|e| HarnessError::io(ctx.log, e))?;
                scrape_log(&text).ok_or_else(|| {
                    HarnessError::Extract(format!(
                        "no signature markers in {}",
                        ctx.log.display()
                    ))
                })
            }
            Self::DumpMemoryRegion => ctx.image.map(MemoryImage::dump_signature).ok_or_else(|| {
                HarnessError::Extract("no in-process memory image to dump".into())
            }),
        }
    }
}

fn read_artifact(path: &Path) -> Result<SignatureRecord> {
    match SignatureOutcome::read(path)? {
        SignatureOutcome::Available(r) => Ok(r),
        SignatureOutcome::Unavailable { reason } => Err(HarnessError::Extract(reason)),
    }
}

fn is_hex_word(token: &str) -> bool {
    !token.is_empty() && token.len() <= 8 && token.chars().all(|c| c.is_ascii_hexdigit())
}

/// Scrapes signature words out of simulator log text.
///
/// `SIGNATURE: <hex> [<hex> ...]` lines are collected first; if there are
/// none, the hex words between a `begin_signature` line and the following
/// `end_signature` line are used.
pub fn scrape_log(text: &str) -> Option<SignatureRecord> {
    let tagged: Vec<String> = text
        .lines()
        .filter_map(|l| l.split_once("SIGNATURE:").map(|(_, rest)| rest))
        .flat_map(str::split_whitespace)
        .map(normalize)
        .filter(|w| is_hex_word(w))
        .collect();
    if !tagged.is_empty() {
        return Some(SignatureRecord::from_words(tagged));
    }

    let mut inside = false;
    let mut block = Vec::new();
    for line in text.lines() {
        let lower = line.trim().to_ascii_lowercase();
        if lower.contains("begin_signature") {
            inside = true;
        } else if lower.contains("end_signature") {
            break;
        } else if inside {
            block.extend(
                lower
                    .split_whitespace()
                    .map(normalize)
                    .filter(|w| is_hex_word(w)),
            );
        }
    }
    (!block.is_empty()).then(|| SignatureRecord::from_words(block))
}
