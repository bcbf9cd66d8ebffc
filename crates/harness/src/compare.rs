//! Line-by-line signature comparison.
//!
//! Rows are aligned by index up to the longer side. A row matches when both
//! sides are present, the expected word is non-empty, and the two are equal
//! after [`normalize`]. The verdict is PASS only when every row matches and
//! at least one row exists.

use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::common::Result;
use crate::signature::{Role, SignatureOutcome, SignatureRecord, normalize};

/// Aggregate verdict.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    /// Every row matched and there was at least one.
    Pass,
    /// Anything else.
    Fail,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
        })
    }
}

/// One aligned pair of words.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Row {
    /// Zero-based line index.
    pub index: usize,
    /// Expected word as read (empty when absent).
    pub expected: String,
    /// Actual word as read (empty when absent).
    pub actual: String,
    /// Whether the row matched.
    pub matched: bool,
}

/// A side that carried no data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UnavailableSide {
    /// Which side.
    pub role: Role,
    /// Reason recorded in its sentinel.
    pub reason: String,
}

/// Result of comparing two signatures.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ComparisonResult {
    /// Every aligned row, in order.
    pub rows: Vec<Row>,
    /// Number of matching rows.
    pub passed: usize,
    /// `total - passed`.
    pub failed: usize,
    /// Number of rows.
    pub total: usize,
    /// Verdict.
    pub status: Status,
    /// Sides that were unavailable; such a side contributes no rows.
    pub unavailable: Vec<UnavailableSide>,
}

/// Compares two records.
pub fn compare_records(expected: &SignatureRecord, actual: &SignatureRecord) -> ComparisonResult {
    build(expected.words(), actual.words(), Vec::new())
}

/// Compares two outcomes; an unavailable side compares as empty and is recorded.
///
/// The expected side plays the [`Role::Reference`] role and the actual side
/// the [`Role::Dut`] role.
pub fn compare(expected: &SignatureOutcome, actual: &SignatureOutcome) -> ComparisonResult {
    let mut unavailable = Vec::new();
    let mut side = |outcome: &SignatureOutcome, role| -> Vec<String> {
        match outcome {
            SignatureOutcome::Available(r) => r.words().to_vec(),
            SignatureOutcome::Unavailable { reason } => {
                unavailable.push(UnavailableSide {
                    role,
                    reason: reason.clone(),
                });
                Vec::new()
            }
        }
    };
    let exp = side(expected, Role::Reference);
    let act = side(actual, Role::Dut);
    build(&exp, &act, unavailable)
}

/// Reads and compares two signature files.
pub fn compare_files(expected: &Path, actual: &Path) -> Result<ComparisonResult> {
    Ok(compare(
        &SignatureOutcome::read(expected)?,
        &SignatureOutcome::read(actual)?,
    ))
}

fn build(
    expected: &[String],
    actual: &[String],
    unavailable: Vec<UnavailableSide>,
) -> ComparisonResult {
    let total = expected.len().max(actual.len());
    let rows: Vec<Row> = (0..total)
        .map(|index| {
            let exp = expected.get(index).map_or("", String::as_str);
            let act = actual.get(index).map_or("", String::as_str);
            let (ne, na) = (normalize(exp), normalize(act));
            Row {
                index,
                expected: exp.to_string(),
                actual: act.to_string(),
                matched: !ne.is_empty() && ne == na,
            }
        })
        .collect();
    let passed = rows.iter().filter(|r| r.matched).count();
    let failed = total - passed;
    let status = if failed == 0 && total > 0 && unavailable.is_empty() {
        Status::Pass
    } else {
        Status::Fail
    };
    ComparisonResult {
        rows,
        passed,
        failed,
        total,
        status,
        unavailable,
    }
}

impl ComparisonResult {
    /// Returns `true` for a PASS verdict.
    pub fn is_pass(&self) -> bool {
        self.status == Status::Pass
    }

    /// Renders the rows as a plain-text table.
    pub fn to_text_table(&self) -> String {
        let mut out = format!("{:>5}  {:<10}  {:<10}  match\n", "index", "expected", "actual");
        for r in &self.rows {
            out.push_str(&format!(
                "{:>5}  {:<10}  {:<10}  {}\n",
                r.index,
                r.expected,
                r.actual,
                if r.matched { "OK" } else { "BAD" }
            ));
        }
        for u in &self.unavailable {
            out.push_str(&format!("{} unavailable: {}\n", u.role, u.reason));
        }
        out.push_str(&format!(
            "{}: rows {}, passed {}, failed {}\n",
            self.status, self.total, self.passed, self.failed
        ));
        out
    }
}
