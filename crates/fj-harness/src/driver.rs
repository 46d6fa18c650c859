use crate::case::{TestCase, Verification};
use crate::config::HarnessOptions;
use crate::registry::TestRegistry;
use crate::report::Reporter;
use crate::session::CompilationSession;
use fj_core::{DiagnosticSink, Error, ErrorCode, Result};
use fj_jit::JitRuntime;
use std::io::Write;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum TestOutcome {
    Passed {
        name: String,
        code_size: usize,
        verification: Verification,
    },
    /// Ran, but the result differed from the expectation.
    Mismatch {
        name: String,
        code_size: usize,
        verification: Verification,
    },
    /// Never ran: emitting, finalizing or loading failed.
    Failed {
        name: String,
        code: ErrorCode,
        message: String,
    },
}

impl TestOutcome {
    fn failed(name: &str, err: &Error) -> Self {
        TestOutcome::Failed {
            name: name.to_string(),
            code: err.code(),
            message: err.message().to_string(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            TestOutcome::Passed { name, .. }
            | TestOutcome::Mismatch { name, .. }
            | TestOutcome::Failed { name, .. } => name,
        }
    }

    pub fn is_failure(&self) -> bool {
        !matches!(self, TestOutcome::Passed { .. })
    }

    /// Bytes of machine code loaded for this test, zero if nothing was.
    pub fn code_size(&self) -> usize {
        match self {
            TestOutcome::Passed { code_size, .. } | TestOutcome::Mismatch { code_size, .. } => *code_size,
            TestOutcome::Failed { .. } => 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub total: usize,
    pub failed: usize,
    /// Sum of machine code bytes over every successfully loaded test.
    pub code_size: usize,
    pub loads: usize,
    pub releases: usize,
    pub outcomes: Vec<TestOutcome>,
}

impl RunSummary {
    pub fn passed(&self) -> usize {
        self.total - self.failed
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    pub fn exit_code(&self) -> i32 {
        if self.all_passed() {
            0
        } else {
            1
        }
    }

    fn record(&mut self, outcome: TestOutcome) {
        self.total += 1;
        if outcome.is_failure() {
            self.failed += 1;
        }
        self.code_size += outcome.code_size();
        self.outcomes.push(outcome);
    }
}

/// Runs every selected test in its own runtime and reports as it goes.
pub struct HarnessDriver<W: Write> {
    options: HarnessOptions,
    reporter: Reporter<W>,
    sink: DiagnosticSink,
}

impl<W: Write> HarnessDriver<W> {
    /// Verbose runs stream diagnostics to the process stdout, not to `out`.
    /// Others buffer them and only show them for failing tests. Use
    /// [`HarnessDriver::with_sink`] to capture streamed diagnostics.
    pub fn new(options: HarnessOptions, out: W) -> Self {
        let sink = if options.verbose {
            DiagnosticSink::stdout()
        } else {
            DiagnosticSink::buffered()
        };
        Self::with_sink(options, out, sink)
    }

    pub fn with_sink(options: HarnessOptions, out: W, sink: DiagnosticSink) -> Self {
        let reporter = Reporter::new(out, options.verbose, options.color);
        Self {
            options,
            reporter,
            sink,
        }
    }

    pub fn options(&self) -> &HarnessOptions {
        &self.options
    }

    pub fn run(&mut self, registry: &TestRegistry) -> Result<RunSummary> {
        let selected: Vec<&dyn TestCase> = registry
            .iter()
            .filter(|case| self.options.selects(case.name()))
            .collect();
        info!(selected = selected.len(), registered = registry.len(), "running tests");

        let mut summary = RunSummary::default();
        for case in selected {
            let (outcome, loads, releases) = self.run_case(case)?;
            summary.loads += loads;
            summary.releases += releases;
            summary.record(outcome);
        }

        self.reporter.summary(&summary)?;
        info!(failed = summary.failed, total = summary.total, code_size = summary.code_size, "run finished");
        Ok(summary)
    }

    pub fn into_output(self) -> W {
        self.reporter.into_inner()
    }

    fn run_case(&mut self, case: &dyn TestCase) -> Result<(TestOutcome, usize, usize)> {
        let name = case.name();
        self.reporter.begin(name)?;
        self.sink.clear();

        let mut target = self.options.target.clone();
        case.configure_target(&mut target);
        let mut runtime = match JitRuntime::new(&target) {
            Ok(runtime) => runtime,
            Err(err) => {
                let outcome = TestOutcome::failed(name, &err);
                self.reporter.finish(&outcome, &self.sink)?;
                return Ok((outcome, 0, 0));
            }
        };

        let outcome = {
            let mut session = CompilationSession::initialize(&mut runtime, Some(&mut self.sink));
            session.emit_test(case);
            match session.finalize() {
                Err(err) => TestOutcome::failed(name, &err),
                Ok(code) => {
                    if self.options.dump_asm {
                        self.reporter.dump(&code.disassembly())?;
                    }
                    match session.load(&code) {
                        Err(err) => TestOutcome::failed(name, &err),
                        Ok(loaded) => {
                            let code_size = loaded.code_size();
                            let verification = case.verify(loaded.entry());
                            if let Err(err) = loaded.release() {
                                warn!(test = name, %err, "release failed");
                            }
                            if verification.passed {
                                TestOutcome::Passed {
                                    name: name.to_string(),
                                    code_size,
                                    verification,
                                }
                            } else {
                                TestOutcome::Mismatch {
                                    name: name.to_string(),
                                    code_size,
                                    verification,
                                }
                            }
                        }
                    }
                }
            }
        };

        let stats = runtime.stats();
        debug!(test = name, failed = outcome.is_failure(), live = runtime.live(), "test finished");
        self.reporter.finish(&outcome, &self.sink)?;
        Ok((outcome, stats.loads, stats.releases))
    }
}
