//! # Signature Extraction Tests
//!
//! Verifies the three DUT extraction strategies: artifact files written by
//! the simulator, markers scraped from the log, and the in-process memory
//! dump.

use std::path::Path;

use pretty_assertions::assert_eq;
use rvconform_core::HarnessError;
use rvconform_core::common::DataRequest;
use rvconform_core::config::SignatureExtraction;
use rvconform_core::signature::SignatureRecord;
use rvconform_core::sim::{ExtractionContext, MemoryImage, SignatureRegion, scrape_log};

use crate::common::fixtures;

fn ctx<'a>(dir: &'a Path, log: &'a Path, image: Option<&'a MemoryImage>) -> ExtractionContext<'a> {
    ExtractionContext {
        work_dir: dir,
        top: "Core",
        test: "add-01",
        log,
        image,
    }
}

fn words(r: &SignatureRecord) -> Vec<&str> {
    r.words().iter().map(String::as_str).collect()
}

// ══════════════════════════════════════════════════════════
// 1. Log scraping
// ══════════════════════════════════════════════════════════

#[test]
fn tagged_lines_are_collected_in_order() {
    let log = "boot\nSIGNATURE: 0xDEADBEEF 00000001\nnoise\nSIGNATURE: cafe\n";
    let r = scrape_log(log).unwrap();
    assert_eq!(words(&r), ["deadbeef", "00000001", "cafe"]);
}

#[test]
fn begin_end_block_is_used_without_tags() {
    let log = "start\nbegin_signature\n00000010\n00000020 00000030\nend_signature\n00000040\n";
    let r = scrape_log(log).unwrap();
    assert_eq!(words(&r), ["00000010", "00000020", "00000030"]);
}

#[test]
fn tags_win_over_blocks() {
    let log = "begin_signature\n11111111\nend_signature\nSIGNATURE: 22222222\n";
    assert_eq!(words(&scrape_log(log).unwrap()), ["22222222"]);
}

#[test]
fn non_hex_tokens_are_skipped() {
    let log = "begin_signature\nword: 0000abcd zzz\nend_signature\n";
    assert_eq!(words(&scrape_log(log).unwrap()), ["0000abcd"]);
}

#[test]
fn log_without_markers_has_no_signature() {
    assert!(scrape_log("cycle 1\ncycle 2\n").is_none());
    assert!(scrape_log("begin_signature\nend_signature\n").is_none());
}

#[test]
fn scrape_strategy_reports_missing_markers() {
    let dir = fixtures::workspace();
    let log = fixtures::write(&dir.path().join("add-01.log"), "nothing here\n");
    let err = SignatureExtraction::ScrapeLogMarkers
        .extract(&ctx(dir.path(), &log, None))
        .unwrap_err();
    assert!(matches!(err, HarnessError::Extract(_)));
}

// ══════════════════════════════════════════════════════════
// 2. Artifact files
// ══════════════════════════════════════════════════════════

#[test]
fn artifact_candidates_prefer_signature_txt() {
    let dir = fixtures::workspace();
    let log = dir.path().join("add-01.log");
    let c = ctx(dir.path(), &log, None);
    let list = c.artifact_candidates();
    let names: Vec<_> = list
        .as_slice()
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, ["signature.txt", "rtl.sig", "Core.sig", "add-01.signature"]);
}

#[test]
fn copies_first_existing_artifact() {
    let dir = fixtures::workspace();
    let log = dir.path().join("add-01.log");
    let _ = fixtures::write(&dir.path().join("rtl.sig"), "00000005\n00000006\n");
    let _ = fixtures::write(&dir.path().join("add-01.signature"), "ffffffff\n");
    let r = SignatureExtraction::CopyFromArtifactFile
        .extract(&ctx(dir.path(), &log, None))
        .unwrap();
    assert_eq!(words(&r), ["00000005", "00000006"]);
}

#[test]
fn missing_artifact_is_an_extract_error() {
    let dir = fixtures::workspace();
    let log = dir.path().join("add-01.log");
    let err = SignatureExtraction::CopyFromArtifactFile
        .extract(&ctx(dir.path(), &log, None))
        .unwrap_err();
    assert!(matches!(err, HarnessError::Extract(_)));
}

#[test]
fn sentinel_artifact_is_an_extract_error() {
    let dir = fixtures::workspace();
    let log = dir.path().join("add-01.log");
    let _ = fixtures::write(&dir.path().join("signature.txt"), "# dut unavailable: hung\n");
    match SignatureExtraction::CopyFromArtifactFile.extract(&ctx(dir.path(), &log, None)) {
        Err(HarnessError::Extract(reason)) => assert_eq!(reason, "hung"),
        other => panic!("unexpected {other:?}"),
    }
}

// ══════════════════════════════════════════════════════════
// 3. Memory dump
// ══════════════════════════════════════════════════════════

#[test]
fn dump_serializes_region_with_zero_fill() {
    let dir = fixtures::workspace();
    let log = dir.path().join("add-01.log");
    let mut image = MemoryImage::new(
        0x8000_0000,
        0x1_0000,
        SignatureRegion::new(fixtures::SIG_START, fixtures::SIG_END + 4).unwrap(),
    );
    image.apply(&DataRequest::write(fixtures::SIG_START, 0xDEAD_BEEF)).unwrap();
    image.apply(&DataRequest::write(fixtures::SIG_END, 7)).unwrap();

    let r = SignatureExtraction::DumpMemoryRegion
        .extract(&ctx(dir.path(), &log, Some(&image)))
        .unwrap();
    assert_eq!(words(&r), ["deadbeef", "00000000", "00000007"]);
}

#[test]
fn dump_without_image_is_an_extract_error() {
    let dir = fixtures::workspace();
    let log = dir.path().join("add-01.log");
    let err = SignatureExtraction::DumpMemoryRegion
        .extract(&ctx(dir.path(), &log, None))
        .unwrap_err();
    assert!(matches!(err, HarnessError::Extract(_)));
}
