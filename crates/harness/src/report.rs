//! Self-contained HTML reports and JSON summaries.
//!
//! A report carries the verdict, a timestamp, the input paths, the summary
//! counts, the full diff table, typed failure records and the last
//! [`LOG_TAIL_LINES`] lines of the simulation log. Styling is inline; every
//! piece of untrusted text goes through [`escape_html`].

use std::fmt::Write as _;
use std::path::Path;

use chrono::{DateTime, Local};

use crate::common::constants::LOG_TAIL_LINES;
use crate::common::{HarnessError, Result};
use crate::compare::{ComparisonResult, Status, compare_files};
use crate::suite::TestFailure;

const STYLE: &str = "\
body{font-family:system-ui,-apple-system,Segoe UI,Roboto,Helvetica,Arial,sans-serif;margin:24px;background:#f7f7f9;color:#111;}
.card{background:#fff;border:1px solid #e3e3e8;border-radius:8px;padding:16px;margin-bottom:16px;}
.status{font-weight:700;}
.pass{color:#0a7a3d;} .fail{color:#b00020;}
table{border-collapse:collapse;width:100%;} th,td{border:1px solid #e3e3e8;padding:6px 8px;text-align:left;font-family:ui-monospace,Menlo,Monaco,Consolas,'Liberation Mono','Courier New',monospace;}
tr.ok{background:#eafff1;} tr.bad{background:#ffecec;}
.meta{color:#444;font-size:0.9em;}
pre{white-space:pre-wrap;background:#111;color:#eee;padding:12px;border-radius:6px;}
";

/// Escapes text for HTML element and attribute content.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Returns the last `n` lines of `text`, trimmed.
pub fn tail_lines(text: &str, n: usize) -> Vec<&str> {
    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    let skip = lines.len().saturating_sub(n);
    lines.into_iter().skip(skip).collect()
}

/// Paths and context shown in a report.
#[derive(Clone, Copy, Debug)]
pub struct ReportInput<'a> {
    /// Report heading.
    pub title: &'a str,
    /// Expected (reference) signature path.
    pub expected: &'a Path,
    /// Actual (DUT) signature path.
    pub actual: &'a Path,
    /// Simulation log, if any.
    pub log: Option<&'a Path>,
    /// Typed failures recorded for the test.
    pub failures: &'a [TestFailure],
}

/// Renders a report document.
///
/// `log_text` is the raw log content, if it could be read.
pub fn render_html(
    result: &ComparisonResult,
    input: &ReportInput<'_>,
    log_text: Option<&str>,
    generated: DateTime<Local>,
) -> String {
    let mut h = String::new();
    let status_class = match result.status {
        Status::Pass => "pass",
        Status::Fail => "fail",
    };

    // Writing to a String cannot fail.
    let _ = writeln!(h, "<!doctype html>\n<html lang=\"en\">\n<head>");
    let _ = writeln!(h, "<meta charset=\"utf-8\">");
    let _ = writeln!(
        h,
        "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">"
    );
    let _ = writeln!(h, "<title>{}</title>", escape_html(input.title));
    let _ = writeln!(h, "<style>\n{STYLE}</style>\n</head>\n<body>");

    let _ = writeln!(h, "<div class=\"card\">");
    let _ = writeln!(h, "<h1>{}</h1>", escape_html(input.title));
    let _ = writeln!(h, "<div class=\"status {status_class}\">{}</div>", result.status);
    let meta = |h: &mut String, label: &str, value: &str| {
        let _ = writeln!(h, "<div class=\"meta\">{label}: {}</div>", escape_html(value));
    };
    meta(&mut h, "Generated", &generated.format("%Y-%m-%d %H:%M:%S").to_string());
    meta(&mut h, "Expected", &input.expected.display().to_string());
    meta(&mut h, "Actual", &input.actual.display().to_string());
    if let Some(log) = input.log {
        meta(&mut h, "Log", &log.display().to_string());
    }
    let _ = writeln!(
        h,
        "<div class=\"meta\">Rows: {}, Passed: {}, Failed: {}</div>",
        result.total, result.passed, result.failed
    );
    for u in &result.unavailable {
        let _ = writeln!(
            h,
            "<div class=\"meta fail\">{} signature unavailable: {}</div>",
            escape_html(&u.role.to_string()),
            escape_html(&u.reason)
        );
    }
    let _ = writeln!(h, "</div>");

    if !input.failures.is_empty() {
        let _ = writeln!(h, "<div class=\"card\">\n<h2>Failures</h2>");
        for f in input.failures {
            let _ = writeln!(
                h,
                "<div class=\"meta fail\">[{}] {}</div>",
                f.stage,
                escape_html(&f.message)
            );
            if let Some(stderr) = f.stderr.as_deref().filter(|s| !s.is_empty()) {
                let _ = writeln!(h, "<pre>{}</pre>", escape_html(stderr));
            }
        }
        let _ = writeln!(h, "</div>");
    }

    let _ = writeln!(h, "<div class=\"card\">\n<h2>Signature Diff</h2>");
    let _ = writeln!(
        h,
        "<table>\n<thead><tr><th>Index</th><th>Expected</th><th>Actual</th><th>Match</th></tr></thead>\n<tbody>"
    );
    for r in &result.rows {
        let (class, mark) = if r.matched { ("ok", "OK") } else { ("bad", "BAD") };
        let _ = writeln!(
            h,
            "<tr class=\"{class}\"><td>{}</td><td>{}</td><td>{}</td><td>{mark}</td></tr>",
            r.index,
            escape_html(&r.expected),
            escape_html(&r.actual)
        );
    }
    let _ = writeln!(h, "</tbody>\n</table>\n</div>");

    let _ = writeln!(h, "<div class=\"card\">\n<h2>Simulation Log (tail)</h2>");
    let tail = log_text.map(|t| tail_lines(t, LOG_TAIL_LINES)).unwrap_or_default();
    if tail.is_empty() {
        let _ = writeln!(h, "<div class=\"meta\">No log data available.</div>");
    } else {
        let _ = writeln!(h, "<pre>{}</pre>", escape_html(&tail.join("\n")));
    }
    let _ = writeln!(h, "</div>\n</body>\n</html>");
    h
}

/// Renders a report for `result` and writes it to `out`.
pub fn write_report(result: &ComparisonResult, input: &ReportInput<'_>, out: &Path) -> Result<()> {
    let log_text = input.log.and_then(|p| std::fs::read_to_string(p).ok());
    let html = render_html(result, input, log_text.as_deref(), Local::now());
    std::fs::write(out, html).map_err(|e| HarnessError::io(out, e))
}

/// Compares two signature files and writes the report; the stand-alone generator.
pub fn generate(
    expected: &Path,
    actual: &Path,
    log: Option<&Path>,
    out: &Path,
) -> Result<ComparisonResult> {
    let result = compare_files(expected, actual)?;
    let title = actual
        .file_stem()
        .map_or_else(|| "Signature Report".to_string(), |s| {
            format!("Signature Report - {}", s.to_string_lossy())
        });
    write_report(
        &result,
        &ReportInput {
            title: &title,
            expected,
            actual,
            log,
            failures: &[],
        },
        out,
    )?;
    tracing::info!(status = %result.status, out = %out.display(), "report written");
    Ok(result)
}

/// Serializes any summary value as pretty JSON to `out`.
pub fn write_json<T: serde::Serialize>(value: &T, out: &Path) -> Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(|e| HarnessError::io(out, e.into()))?;
    std::fs::write(out, text).map_err(|e| HarnessError::io(out, e))
}
