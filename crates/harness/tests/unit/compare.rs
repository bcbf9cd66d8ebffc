//! # Comparison Tests
//!
//! Verifies row alignment, the PASS rule (every row matches and at least one
//! exists), and how unavailable sides are counted.

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rvconform_core::compare::{Row, Status, compare, compare_files, compare_records};
use rvconform_core::signature::{Role, SignatureOutcome, SignatureRecord};

use crate::common::fixtures;

fn rec(words: &[&str]) -> SignatureRecord {
    SignatureRecord::from_words(words.iter().copied())
}

// ══════════════════════════════════════════════════════════
// 1. Row alignment
// ══════════════════════════════════════════════════════════

#[test]
fn one_mismatch_of_two() {
    let r = compare_records(&rec(&["00000001", "00000002"]), &rec(&["00000001", "00000003"]));
    assert_eq!(
        r.rows,
        vec![
            Row {
                index: 0,
                expected: "00000001".into(),
                actual: "00000001".into(),
                matched: true
            },
            Row {
                index: 1,
                expected: "00000002".into(),
                actual: "00000003".into(),
                matched: false
            },
        ]
    );
    assert_eq!(r.status, Status::Fail);
    assert_eq!((r.passed, r.failed, r.total), (1, 1, 2));
}

#[test]
fn empty_actual_fails_every_row() {
    let expected = rec(&["00000001", "00000002", "00000003"]);
    let r = compare_records(&expected, &SignatureRecord::default());
    assert_eq!(r.status, Status::Fail);
    assert_eq!((r.passed, r.failed, r.total), (0, 3, 3));
    assert!(r.rows.iter().all(|row| row.actual.is_empty()));
}

#[test]
fn longer_actual_adds_failing_rows() {
    let r = compare_records(&rec(&["00000001"]), &rec(&["00000001", "00000002"]));
    assert_eq!((r.passed, r.failed, r.total), (1, 1, 2));
}

#[test]
fn case_and_prefix_are_ignored() {
    let r = compare_records(&rec(&["0xDEADBEEF"]), &rec(&["deadbeef"]));
    assert!(r.is_pass());
}

#[test]
fn empty_expected_word_never_matches() {
    let r = compare_records(&rec(&["00000001", "", "00000003"]), &rec(&["00000001", "", "00000003"]));
    assert_eq!(r.failed, 1);
    assert!(!r.rows[1].matched);
}

#[test]
fn nothing_compared_is_fail() {
    let r = compare_records(&SignatureRecord::default(), &SignatureRecord::default());
    assert_eq!(r.total, 0);
    assert_eq!(r.status, Status::Fail);
}

// ══════════════════════════════════════════════════════════
// 2. Unavailable sides
// ══════════════════════════════════════════════════════════

#[test]
fn unavailable_reference_contributes_no_rows() {
    let expected = SignatureOutcome::Unavailable {
        reason: "no golden toolchain".into(),
    };
    let actual = SignatureOutcome::Available(rec(&["00000001", "00000002"]));
    let r = compare(&expected, &actual);
    assert_eq!((r.passed, r.failed, r.total), (0, 2, 2));
    assert_eq!(r.unavailable.len(), 1);
    assert_eq!(r.unavailable[0].role, Role::Reference);
    assert_eq!(r.status, Status::Fail);
}

#[test]
fn files_with_sentinel_compare_as_fail() {
    let dir = fixtures::workspace();
    let e = fixtures::write(&dir.path().join("ref.sig"), "00000001\n");
    let a = fixtures::write(&dir.path().join("dut.sig"), "# dut unavailable: run timed out\n");
    let r = compare_files(&e, &a).unwrap();
    assert_eq!(r.status, Status::Fail);
    assert_eq!(r.unavailable[0].role, Role::Dut);
    assert_eq!(r.unavailable[0].reason, "run timed out");
    assert!(r.to_text_table().contains("dut unavailable: run timed out"));
}

// ══════════════════════════════════════════════════════════
// 3. Properties
// ══════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn equal_non_empty_sequences_pass(words in prop::collection::vec(any::<u32>(), 1..64)) {
        let a = SignatureRecord::from_values(words.iter().copied());
        let r = compare_records(&a, &a.clone());
        prop_assert_eq!(r.status, Status::Pass);
        prop_assert_eq!(r.passed, words.len());
    }

    #[test]
    fn failed_is_total_minus_passed(
        e in prop::collection::vec(any::<u32>(), 0..32),
        a in prop::collection::vec(any::<u32>(), 0..32),
    ) {
        let r = compare_records(
            &SignatureRecord::from_values(e.iter().copied()),
            &SignatureRecord::from_values(a.iter().copied()),
        );
        prop_assert_eq!(r.total, e.len().max(a.len()));
        prop_assert_eq!(r.failed, r.total - r.passed);
        prop_assert_eq!(r.is_pass(), r.total > 0 && r.failed == 0);
    }

    #[test]
    fn uppercase_prefixed_words_match_canonical(v in any::<u32>()) {
        let canonical = SignatureRecord::from_values([v]);
        let shouted = SignatureRecord::from_words([format!("0x{v:08X}")]);
        prop_assert!(compare_records(&shouted, &canonical).is_pass());
    }
}
