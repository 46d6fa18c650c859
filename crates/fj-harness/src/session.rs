use crate::case::TestCase;
use fj_core::{DiagnosticSink, ErrorCollector, ErrorHandler, Result, Stage};
use fj_jit::{CodeBuffer, Compiler, FinalizedCode, JitRuntime, LoadedCode};
use std::cell::{Ref, RefCell};
use std::rc::Rc;

/// Code buffer bound to one runtime plus the collector listening to it.
pub struct CompilationSession<'s> {
    buffer: CodeBuffer<'s>,
    collector: Rc<RefCell<ErrorCollector>>,
}

impl<'s> CompilationSession<'s> {
    pub fn initialize(runtime: &'s mut JitRuntime, sink: Option<&'s mut DiagnosticSink>) -> Self {
        let collector = Rc::new(RefCell::new(ErrorCollector::new()));
        let mut buffer = CodeBuffer::new(runtime);
        buffer.set_error_handler(collector.clone());
        if let Some(sink) = sink {
            buffer.set_diagnostic_sink(sink);
        }
        Self { buffer, collector }
    }

    /// Lets `case` describe its program. Faults end up in the collector
    /// rather than being returned.
    pub fn emit_test(&mut self, case: &dyn TestCase) {
        let result = {
            let mut cc = Compiler::new(&mut self.buffer);
            case.emit(&mut cc)
        };
        if let Err(err) = result {
            let mut collector = self.collector.borrow_mut();
            if !collector.has_error() {
                collector.report(err.code(), err.message(), err.stage().unwrap_or(Stage::Emit));
            }
        }
    }

    /// The first collected error wins over whatever finalize itself returns.
    pub fn finalize(&mut self) -> Result<FinalizedCode> {
        let result = self.buffer.finalize();
        if let Some(first) = self.collector.borrow().first() {
            return Err(first.to_error());
        }
        result
    }

    pub fn load(&mut self, code: &FinalizedCode) -> Result<LoadedCode<'_>> {
        self.buffer.runtime_mut().load_scoped(code)
    }

    pub fn collector(&self) -> Ref<'_, ErrorCollector> {
        self.collector.borrow()
    }

    pub fn runtime(&self) -> &JitRuntime {
        self.buffer.runtime()
    }
}
