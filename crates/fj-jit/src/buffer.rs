use crate::compiler::FuncDecl;
use crate::runtime::{JitRuntime, RuntimeId};
use cranelift_codegen::ir::{Function, Inst};
use cranelift_codegen::print_errors::pretty_error;
use cranelift_codegen::{CodegenError, Context};
use cranelift_frontend::FunctionBuilderContext;
use cranelift_module::{FuncId, Module, ModuleError};
use fj_core::{DiagnosticSink, Error, ErrorCode, ErrorHandler, Result, Stage};
use std::cell::RefCell;
use std::fmt::{self, Write as _};
use std::rc::Rc;
use tracing::trace;

pub type SharedHandler = Rc<RefCell<dyn ErrorHandler>>;

/// Forwards faults to the attached handler, if any.
#[derive(Clone, Default)]
pub(crate) struct ErrorRoute {
    handler: Option<SharedHandler>,
}

impl ErrorRoute {
    pub(crate) fn raise(&self, code: ErrorCode, message: impl Into<String>, stage: Stage) -> Error {
        let message = message.into();
        if let Some(handler) = &self.handler {
            handler.borrow_mut().report(code, &message, stage);
        }
        Error::emitter(code, message, stage)
    }
}

pub(crate) struct PendingFunction {
    pub(crate) id: FuncId,
    pub(crate) name: String,
    pub(crate) ctx: Context,
    pub(crate) closed: bool,
    /// First structural fault seen while emitting. The body is never compiled.
    pub(crate) poisoned: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FunctionReport {
    pub name: String,
    pub code_size: usize,
    pub disassembly: Option<String>,
}

/// Result of a successful [`CodeBuffer::finalize`], ready for [`JitRuntime::load`].
#[derive(Debug, Clone)]
pub struct FinalizedCode {
    runtime: RuntimeId,
    generation: u64,
    entry: FuncId,
    code_size: usize,
    functions: Vec<FunctionReport>,
}

impl FinalizedCode {
    pub fn runtime(&self) -> RuntimeId {
        self.runtime
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn entry(&self) -> FuncId {
        self.entry
    }

    /// Machine code bytes across every function in the buffer.
    pub fn code_size(&self) -> usize {
        self.code_size
    }

    pub fn functions(&self) -> &[FunctionReport] {
        &self.functions
    }

    pub fn disassembly(&self) -> String {
        let mut out = String::new();
        for function in &self.functions {
            let _ = writeln!(out, "; {} ({} bytes)", function.name, function.code_size);
            if let Some(text) = &function.disassembly {
                out.push_str(text);
                if !text.ends_with('\n') {
                    out.push('\n');
                }
            }
        }
        out
    }
}

/// Holds the functions of one compilation until they are finalized.
///
/// A buffer borrows its runtime for its whole life, so it can never be
/// finalized into a different one.
pub struct CodeBuffer<'a> {
    pub(crate) runtime: &'a mut JitRuntime,
    pub(crate) errors: ErrorRoute,
    sink: Option<&'a mut DiagnosticSink>,
    pub(crate) declared: Vec<FuncDecl>,
    pub(crate) functions: Vec<PendingFunction>,
    pub(crate) builder_ctx: FunctionBuilderContext,
    pub(crate) entry: Option<FuncId>,
    code_size: usize,
    finalized: bool,
}

impl<'a> CodeBuffer<'a> {
    pub fn new(runtime: &'a mut JitRuntime) -> Self {
        Self {
            runtime,
            errors: ErrorRoute::default(),
            sink: None,
            declared: Vec::new(),
            functions: Vec::new(),
            builder_ctx: FunctionBuilderContext::new(),
            entry: None,
            code_size: 0,
            finalized: false,
        }
    }

    pub fn set_error_handler(&mut self, handler: SharedHandler) {
        self.errors.handler = Some(handler);
    }

    pub fn set_diagnostic_sink(&mut self, sink: &'a mut DiagnosticSink) {
        self.sink = Some(sink);
    }

    pub fn runtime(&self) -> &JitRuntime {
        self.runtime
    }

    pub fn runtime_mut(&mut self) -> &mut JitRuntime {
        self.runtime
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Zero until the buffer has been finalized.
    pub fn code_size(&self) -> usize {
        self.code_size
    }

    pub(crate) fn raise(&self, code: ErrorCode, message: impl Into<String>, stage: Stage) -> Error {
        self.errors.raise(code, message, stage)
    }

    pub(crate) fn log(&mut self, args: fmt::Arguments<'_>) {
        if let Some(sink) = self.sink.as_deref_mut() {
            let _ = sink.write_fmt(args);
        }
    }

    /// Compiles every function and lays out the final machine code.
    pub fn finalize(&mut self) -> Result<FinalizedCode> {
        if self.finalized {
            return Err(self.raise(ErrorCode::InvalidState, "code buffer was already finalized", Stage::Finalize));
        }
        if let Some(message) = self.functions.iter().find_map(|f| f.poisoned.clone()) {
            return Err(self.raise(ErrorCode::UnterminatedBlock, message, Stage::Finalize));
        }
        if let Some(open) = self.functions.iter().find(|f| !f.closed) {
            let message = format!("function `{}` was begun but never closed", open.name);
            return Err(self.raise(ErrorCode::UnclosedFunction, message, Stage::Finalize));
        }
        let Some(entry) = self.entry else {
            return Err(self.raise(ErrorCode::NoEntryFunction, "no function was emitted", Stage::Finalize));
        };
        if let Some(missing) = self
            .declared
            .iter()
            .find(|decl| !self.functions.iter().any(|f| f.id == decl.id()))
        {
            let message = format!("function `{}` was declared but never defined", missing.name());
            return Err(self.raise(ErrorCode::UndefinedFunction, message, Stage::Finalize));
        }

        let generation = self.runtime.generation();
        let runtime_id = self.runtime.id();
        let CodeBuffer {
            runtime,
            errors,
            sink,
            functions,
            ..
        } = self;
        let module = runtime.module_mut();
        let mut reports = Vec::with_capacity(functions.len());
        let mut total = 0usize;

        for function in functions.iter_mut() {
            if let Some(sink) = sink.as_deref_mut() {
                let _ = write!(sink, "; {}\n{}", function.name, function.ctx.func.display());
            }
            function.ctx.set_disasm(true);
            if let Err(err) = module.define_function(function.id, &mut function.ctx) {
                let (code, message) = describe_module_error(&function.ctx.func, err);
                let message = format!("{}: {}", function.name, message);
                return Err(errors.raise(code, message, Stage::Finalize));
            }

            let compiled = function.ctx.compiled_code();
            let size = compiled.map(|c| c.code_buffer().len()).unwrap_or(0);
            let disassembly = compiled.and_then(|c| c.vcode.clone());
            if let Some(sink) = sink.as_deref_mut() {
                if let Some(text) = &disassembly {
                    let _ = write!(sink, "{text}");
                }
                let _ = writeln!(sink, "; {} CodeSize={}", function.name, size);
            }
            trace!(function = %function.name, size, "compiled function");

            total += size;
            reports.push(FunctionReport {
                name: function.name.clone(),
                code_size: size,
                disassembly,
            });
        }

        self.finalized = true;
        self.code_size = total;
        Ok(FinalizedCode {
            runtime: runtime_id,
            generation,
            entry,
            code_size: total,
            functions: reports,
        })
    }
}

pub(crate) fn is_terminated(func: &Function, last: Option<Inst>) -> bool {
    last.is_some_and(|inst| func.dfg.insts[inst].opcode().is_terminator())
}

fn describe_module_error(func: &Function, err: ModuleError) -> (ErrorCode, String) {
    match err {
        ModuleError::Compilation(err) => {
            let code = match &err {
                CodegenError::Verifier(_) => ErrorCode::Verifier,
                CodegenError::CodeTooLarge | CodegenError::ImplLimitExceeded => ErrorCode::CodeTooLarge,
                CodegenError::Unsupported(_) => ErrorCode::Unsupported,
                _ => ErrorCode::Codegen,
            };
            (code, pretty_error(func, err))
        }
        other @ ModuleError::Allocation { .. } => (ErrorCode::OutOfMemory, other.to_string()),
        other @ (ModuleError::Undeclared(_)
        | ModuleError::IncompatibleDeclaration(_)
        | ModuleError::IncompatibleSignature(..)
        | ModuleError::DuplicateDefinition(_)) => (ErrorCode::InvalidDeclaration, other.to_string()),
        other => (ErrorCode::Codegen, other.to_string()),
    }
}
