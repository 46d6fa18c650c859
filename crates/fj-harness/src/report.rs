use crate::driver::{RunSummary, TestOutcome};
use console::style;
use fj_core::DiagnosticSink;
use std::io::{self, Write};

/// Line-oriented progress report.
///
/// `[Test] name` is written before a test runs and flushed, so a crash inside
/// generated code still shows which test was running. The verdict finishes the
/// same line unless something else was printed in between.
pub struct Reporter<W: Write> {
    out: W,
    verbose: bool,
    color: bool,
    line_open: bool,
    current: String,
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W, verbose: bool, color: bool) -> Self {
        Self {
            out,
            verbose,
            color,
            line_open: false,
            current: String::new(),
        }
    }

    pub fn begin(&mut self, name: &str) -> io::Result<()> {
        self.current = name.to_string();
        write!(self.out, "[Test] {name}")?;
        if self.verbose {
            writeln!(self.out)?;
        } else {
            self.line_open = true;
        }
        self.out.flush()
    }

    /// Prints a block of text between the test line and its verdict.
    pub fn dump(&mut self, text: &str) -> io::Result<()> {
        self.close_line()?;
        self.out.write_all(text.as_bytes())?;
        if !text.is_empty() && !text.ends_with('\n') {
            writeln!(self.out)?;
        }
        Ok(())
    }

    pub fn finish(&mut self, outcome: &TestOutcome, diagnostics: &DiagnosticSink) -> io::Result<()> {
        let status = if outcome.is_failure() {
            style("[FAILED]").red().bold().force_styling(self.color)
        } else {
            style("[OK]").green().force_styling(self.color)
        };
        if self.line_open {
            writeln!(self.out, " {status}")?;
            self.line_open = false;
        } else {
            writeln!(self.out, "[Test] {} {status}", self.current)?;
        }

        if outcome.is_failure() {
            if !diagnostics.is_streaming() && !diagnostics.is_empty() {
                self.dump(diagnostics.contents())?;
            }
            writeln!(self.out, "[Status]")?;
            match outcome {
                TestOutcome::Mismatch { verification, .. } => {
                    writeln!(self.out, "  Returned: {}", verification.observed)?;
                    writeln!(self.out, "  Expected: {}", verification.expected)?;
                }
                TestOutcome::Failed { code, message, .. } => {
                    writeln!(self.out, "  ERROR {code}: {message}")?;
                }
                TestOutcome::Passed { .. } => {}
            }
            writeln!(self.out)?;
        }
        self.out.flush()
    }

    pub fn summary(&mut self, summary: &RunSummary) -> io::Result<()> {
        self.close_line()?;
        writeln!(self.out)?;
        let tag = if summary.failed == 0 {
            style("[PASSED]").green().force_styling(self.color)
        } else {
            style("[FAILED]").red().bold().force_styling(self.color)
        };
        writeln!(self.out, "{tag} {} of {} failed", summary.failed, summary.total)?;
        writeln!(self.out, "  OutputSize={}", summary.code_size)?;
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn close_line(&mut self) -> io::Result<()> {
        if self.line_open {
            writeln!(self.out)?;
            self.line_open = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::Verification;
    use fj_core::ErrorCode;
    use pretty_assertions::assert_eq;

    fn text(reporter: Reporter<Vec<u8>>) -> String {
        String::from_utf8(reporter.into_inner()).unwrap()
    }

    #[test]
    fn passing_test_is_one_line() {
        let mut reporter = Reporter::new(Vec::new(), false, false);
        reporter.begin("AllocBase").unwrap();
        let outcome = TestOutcome::Passed {
            name: "AllocBase".into(),
            code_size: 16,
            verification: Verification::unit(),
        };
        reporter.finish(&outcome, &DiagnosticSink::buffered()).unwrap();
        assert_eq!(text(reporter), "[Test] AllocBase [OK]\n");
    }

    #[test]
    fn mismatch_prints_both_sides_and_diagnostics() {
        let mut reporter = Reporter::new(Vec::new(), false, false);
        let mut sink = DiagnosticSink::buffered();
        sink.log("; body\n");
        reporter.begin("Sum").unwrap();
        let outcome = TestOutcome::Mismatch {
            name: "Sum".into(),
            code_size: 8,
            verification: Verification::compare(5, 6, |v| format!("ret={v}")),
        };
        reporter.finish(&outcome, &sink).unwrap();
        assert_eq!(
            text(reporter),
            "[Test] Sum [FAILED]\n; body\n[Status]\n  Returned: ret=5\n  Expected: ret=6\n\n"
        );
    }

    #[test]
    fn emit_failure_prints_error_code() {
        let mut reporter = Reporter::new(Vec::new(), false, false);
        reporter.begin("Open").unwrap();
        let outcome = TestOutcome::Failed {
            name: "Open".into(),
            code: ErrorCode::UnclosedFunction,
            message: "function `open` was begun but never closed".into(),
        };
        reporter.finish(&outcome, &DiagnosticSink::buffered()).unwrap();
        let out = text(reporter);
        assert!(out.contains("ERROR 0x00000002: function `open`"), "{out}");
    }

    #[test]
    fn summary_counts_failures() {
        let mut reporter = Reporter::new(Vec::new(), false, false);
        let summary = RunSummary {
            total: 3,
            failed: 1,
            code_size: 120,
            ..RunSummary::default()
        };
        reporter.summary(&summary).unwrap();
        assert_eq!(text(reporter), "\n[FAILED] 1 of 3 failed\n  OutputSize=120\n");
    }
}
