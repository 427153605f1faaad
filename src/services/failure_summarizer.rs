//! Failure Summarizer
//!
//! Turns raw test-runner output into a [`StructuredSummary`]. Runner summary
//! lines differ in field order and presence between versions and plugins, so
//! the parser accepts any subset of recognized status words in any order.

use regex::Regex;
use std::sync::LazyLock;

use crate::domain::models::{Count, StructuredSummary};

static COUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)\s+(passed|failed|skipped|xfailed|xpassed|errors|error)\b")
        .expect("summary count pattern is valid")
});

const SELECTION_WORDS: [&str; 3] = ["passed", "failed", "skipped"];

/// Last line of `raw_output` that looks like a runner summary
///
/// A summary line contains an `=` delimiter and at least one of
/// `passed`, `failed` or `skipped`.
pub fn find_summary_line(raw_output: &str) -> Option<&str> {
    raw_output
        .lines()
        .rev()
        .find(|line| line.contains('=') && SELECTION_WORDS.iter().any(|w| line.contains(w)))
}

/// Parse the final summary line of a test run
///
/// Without a summary line every field is unknown except `failed` and `errors`,
/// which read as zero. That zero means "no evidence of failure", not a
/// verified clean run.
pub fn summarize(raw_output: &str) -> StructuredSummary {
    let mut summary = StructuredSummary::default();

    let Some(line) = find_summary_line(raw_output) else {
        return summary;
    };

    for caps in COUNT_RE.captures_iter(line) {
        let Ok(count) = caps[1].parse::<u32>() else {
            continue;
        };
        let slot = match &caps[2] {
            "passed" => &mut summary.passed,
            "failed" => &mut summary.failed,
            "skipped" => &mut summary.skipped,
            "xfailed" => &mut summary.xfailed,
            "xpassed" => &mut summary.xpassed,
            _ => &mut summary.errors,
        };
        *slot = Count::Known(count);
    }

    summary
}
