//! CLI output formatting for build results.
//!
//! # Output Format
//!
//! One line per phase that did anything, failures listed beneath their
//! phase with the offending file, then a totals line:
//!
//! ```text
//! import      12 ok
//! render       3 ok   9 skipped
//!     FAILED /site/src/content/odd.md: unknown template `Missing`
//! publish      3 ok   9 skipped
//! images       1 ok
//! site         1 ok   1 skipped
//!
//! Built in 0.42s: 20 ok, 1 failed
//! ```
//!
//! # Architecture
//!
//! [`format_summary`] returns `Vec<String>` for testability and
//! [`print_summary`] writes it to stdout. Format functions are pure.

use crate::batch::PhaseReport;
use crate::engine::BuildSummary;

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Format one phase row: name column, then the non-zero counts.
fn phase_line(report: &PhaseReport) -> String {
    let mut line = format!("{:<10} {:>3} ok", report.name, report.succeeded);
    if report.skipped > 0 {
        line.push_str(&format!(" {:>3} skipped", report.skipped));
    }
    if report.failed() > 0 {
        line.push_str(&format!(" {:>3} failed", report.failed()));
    }
    line
}

/// Format a build summary as display lines.
pub fn format_summary(summary: &BuildSummary) -> Vec<String> {
    let mut lines = Vec::new();
    for report in summary.phases.iter().filter(|p| !p.is_empty()) {
        lines.push(phase_line(report));
        for failure in &report.failures {
            lines.push(format!(
                "{}FAILED {}: {}",
                indent(1),
                failure.key,
                failure.message
            ));
        }
    }

    if !lines.is_empty() {
        lines.push(String::new());
    }
    let mut totals = format!(
        "Built in {:.2}s: {} ok",
        summary.elapsed.as_secs_f64(),
        summary.succeeded()
    );
    if summary.failed() > 0 {
        totals.push_str(&format!(", {} failed", summary.failed()));
    }
    lines.push(totals);
    lines
}

/// Print a build summary to stdout.
pub fn print_summary(summary: &BuildSummary) {
    for line in format_summary(summary) {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn report(name: &'static str, ok: usize, skipped: usize) -> PhaseReport {
        PhaseReport {
            succeeded: ok,
            skipped,
            ..PhaseReport::new(name)
        }
    }

    #[test]
    fn empty_phases_are_hidden() {
        let summary = BuildSummary {
            phases: vec![report("import", 2, 0), report("static", 0, 0)],
            elapsed: Duration::from_millis(1500),
        };
        assert_eq!(
            format_summary(&summary),
            vec!["import       2 ok", "", "Built in 1.50s: 2 ok"]
        );
    }

    #[test]
    fn skipped_and_failed_counts_shown() {
        let mut render = report("render", 3, 9);
        render.fail("/c/odd.md", "unknown template `Missing`");
        let summary = BuildSummary {
            phases: vec![render],
            elapsed: Duration::ZERO,
        };
        let lines = format_summary(&summary);
        assert_eq!(lines[0], "render       3 ok   9 skipped   1 failed");
        assert_eq!(lines[1], "    FAILED /c/odd.md: unknown template `Missing`");
        assert_eq!(lines.last().unwrap(), "Built in 0.00s: 3 ok, 1 failed");
    }

    #[test]
    fn nothing_to_do() {
        let summary = BuildSummary::default();
        assert_eq!(format_summary(&summary), vec!["Built in 0.00s: 0 ok"]);
    }
}
