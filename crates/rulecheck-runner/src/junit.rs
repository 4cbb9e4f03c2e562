//! JUnit XML report.
//!
//! One `<testsuite>` per unit-test file and one `<testcase>` per test group.
//! Mismatches become `<failure>` elements, an aborted test group gets an
//! `<error>`, and errors that stopped a whole file are listed in the suite's
//! `<system-err>`.

use crate::error::{Result, UnitTestError};
use crate::failure::FileReport;
use std::path::Path;

/// Renders `reports` as a JUnit XML document.
pub fn render(reports: &[FileReport]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<testsuites>\n");
    for report in reports {
        let failures = report
            .cases
            .iter()
            .filter(|c| !c.aborted() && !c.passed())
            .count();
        let errors = report.cases.iter().filter(|c| c.aborted()).count() + usize::from(!report.errors.is_empty());

        xml.push_str(&format!(
            "  <testsuite name=\"{}\" tests=\"{}\" failures=\"{failures}\" errors=\"{errors}\" skipped=\"{}\" timestamp=\"{}\">\n",
            escape(&report.file),
            report.cases.len(),
            report.skipped,
            escape(&report.timestamp),
        ));
        for case in &report.cases {
            if case.passed() {
                xml.push_str(&format!("    <testcase name=\"{}\"></testcase>\n", escape(&case.name)));
                continue;
            }
            xml.push_str(&format!("    <testcase name=\"{}\">\n", escape(&case.name)));
            for failure in &case.failures {
                xml.push_str(&format!("      <failure>{}</failure>\n", escape(&failure.to_string())));
            }
            if case.aborted() {
                let message = case
                    .errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("\n");
                xml.push_str(&format!("      <error>{}</error>\n", escape(&message)));
            }
            xml.push_str("    </testcase>\n");
        }
        if !report.errors.is_empty() {
            let message = report
                .errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\n");
            xml.push_str(&format!("    <system-err>{}</system-err>\n", escape(&message)));
        }
        xml.push_str("  </testsuite>\n");
    }
    xml.push_str("</testsuites>\n");
    xml
}

/// Writes the report for `reports` to `path`.
pub fn write(path: &Path, reports: &[FileReport]) -> Result<()> {
    std::fs::write(path, render(reports)).map_err(|source| UnitTestError::Report {
        path: path.display().to_string(),
        source,
    })?;
    tracing::debug!(path = %path.display(), suites = reports.len(), "Wrote JUnit report");
    Ok(())
}

/// Escapes markup characters. Control characters XML 1.0 cannot carry are
/// dropped.
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            '\t' => out.push('\t'),
            c if c < '\u{20}' => {}
            c => out.push(c),
        }
    }
    out
}
