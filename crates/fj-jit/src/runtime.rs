//! Executable memory owner.
//!
//! A [`JitRuntime`] wraps one Cranelift [`JITModule`]. Code buffers compile
//! functions into it, [`JitRuntime::load`] makes them executable and hands out
//! a [`JitFunction`], and [`JitRuntime::release`] takes it back. Once the last
//! live function is released the module's pages are returned to the OS and the
//! runtime moves to a new generation.

use crate::buffer::FinalizedCode;
use crate::target::TargetOptions;
use cranelift_codegen::ir::Type;
use cranelift_codegen::isa::{OwnedTargetIsa, TargetIsa};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::ModuleError;
use fj_core::{Error, ErrorCode, Result};
use std::marker::PhantomData;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

static NEXT_RUNTIME_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuntimeId(u64);

impl RuntimeId {
    fn next() -> Self {
        RuntimeId(NEXT_RUNTIME_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeStats {
    pub loads: usize,
    pub releases: usize,
}

pub struct JitRuntime {
    id: RuntimeId,
    isa: OwnedTargetIsa,
    module: Option<JITModule>,
    generation: u64,
    live: usize,
    stats: RuntimeStats,
}

impl JitRuntime {
    pub fn new(options: &TargetOptions) -> Result<Self> {
        let isa = options.build_isa()?;
        let id = RuntimeId::next();
        debug!(runtime = id.0, triple = %isa.triple(), opt_level = %options.opt_level, "created jit runtime");
        Ok(Self {
            id,
            isa,
            module: None,
            generation: 0,
            live: 0,
            stats: RuntimeStats::default(),
        })
    }

    pub fn id(&self) -> RuntimeId {
        self.id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of loaded functions not yet released.
    pub fn live(&self) -> usize {
        self.live
    }

    pub fn stats(&self) -> RuntimeStats {
        self.stats
    }

    pub fn isa(&self) -> &dyn TargetIsa {
        &*self.isa
    }

    pub fn pointer_type(&self) -> Type {
        self.isa.pointer_type()
    }

    pub(crate) fn module_mut(&mut self) -> &mut JITModule {
        let isa = &self.isa;
        self.module.get_or_insert_with(|| {
            let builder = JITBuilder::with_isa(isa.clone(), cranelift_module::default_libcall_names());
            JITModule::new(builder)
        })
    }

    /// Relocates everything compiled so far and returns the entry point of `code`.
    pub fn load(&mut self, code: &FinalizedCode) -> Result<JitFunction> {
        if code.runtime() != self.id || code.generation() != self.generation {
            return Err(Error::runtime(
                ErrorCode::RuntimeMismatch,
                format!(
                    "code finalized for runtime {}/{} cannot be loaded into runtime {}/{}",
                    code.runtime().0,
                    code.generation(),
                    self.id.0,
                    self.generation
                ),
            ));
        }
        let module = self.module.as_mut().ok_or_else(|| {
            Error::runtime(ErrorCode::InvalidState, "no code has been compiled into this runtime")
        })?;
        module.finalize_definitions().map_err(load_error)?;
        let ptr = module.get_finalized_function(code.entry());

        self.live += 1;
        self.stats.loads += 1;
        debug!(runtime = self.id.0, address = ptr as usize, size = code.code_size(), "loaded code");
        Ok(JitFunction {
            ptr,
            runtime: self.id,
            generation: self.generation,
            code_size: code.code_size(),
        })
    }

    /// Loads `code` behind a guard that releases it when dropped.
    pub fn load_scoped(&mut self, code: &FinalizedCode) -> Result<LoadedCode<'_>> {
        let function = self.load(code)?;
        Ok(LoadedCode {
            entry: function.ptr,
            code_size: function.code_size,
            runtime: self,
            function: Some(function),
        })
    }

    pub fn release(&mut self, function: JitFunction) -> Result<()> {
        if function.runtime != self.id || function.generation != self.generation {
            return Err(Error::runtime(
                ErrorCode::RuntimeMismatch,
                "function does not belong to this runtime generation",
            ));
        }
        if self.live == 0 {
            return Err(Error::runtime(ErrorCode::InvalidState, "release without a matching load"));
        }
        self.live -= 1;
        self.stats.releases += 1;
        debug!(runtime = self.id.0, live = self.live, "released code");
        if self.live == 0 {
            self.reclaim();
        }
        Ok(())
    }

    fn reclaim(&mut self) {
        if let Some(module) = self.module.take() {
            // SAFETY: every `JitFunction` of this generation has been released,
            // and entries cannot outlive the function they were borrowed from.
            unsafe { module.free_memory() };
            self.generation += 1;
        }
    }
}

impl Drop for JitRuntime {
    fn drop(&mut self) {
        if self.live > 0 {
            warn!(runtime = self.id.0, live = self.live, "runtime dropped with live code; leaking it");
            return;
        }
        self.reclaim();
    }
}

fn load_error(err: ModuleError) -> Error {
    let code = match &err {
        ModuleError::Allocation { .. } => ErrorCode::OutOfMemory,
        ModuleError::Undeclared(_) => ErrorCode::UndefinedFunction,
        _ => ErrorCode::Codegen,
    };
    Error::runtime(code, err.to_string())
}

/// A loaded function. Must be handed back to [`JitRuntime::release`].
#[derive(Debug)]
#[must_use = "loaded code has to be released through JitRuntime::release"]
pub struct JitFunction {
    ptr: *const u8,
    runtime: RuntimeId,
    generation: u64,
    code_size: usize,
}

impl JitFunction {
    pub fn entry(&self) -> JitEntry<'_> {
        JitEntry::new(self.ptr)
    }

    pub fn code_size(&self) -> usize {
        self.code_size
    }
}

/// Native entry point, valid only while the loaded code it came from is.
#[derive(Debug, Clone, Copy)]
pub struct JitEntry<'a> {
    ptr: *const u8,
    _loaded: PhantomData<&'a JitFunction>,
}

impl<'a> JitEntry<'a> {
    fn new(ptr: *const u8) -> Self {
        Self {
            ptr,
            _loaded: PhantomData,
        }
    }

    pub fn address(&self) -> usize {
        self.ptr as usize
    }

    /// Reinterprets the entry point as a function pointer.
    ///
    /// # Safety
    ///
    /// `F` must be an `extern "C"` function pointer type whose parameters and
    /// results match the signature the code was emitted with.
    pub unsafe fn as_fn<F: Copy>(&self) -> F {
        debug_assert_eq!(
            mem::size_of::<F>(),
            mem::size_of::<*const u8>(),
            "entry points can only be viewed as function pointers"
        );
        mem::transmute_copy::<*const u8, F>(&self.ptr)
    }
}

/// Scoped load. Releases the code when dropped.
pub struct LoadedCode<'r> {
    entry: *const u8,
    code_size: usize,
    runtime: &'r mut JitRuntime,
    function: Option<JitFunction>,
}

impl<'r> LoadedCode<'r> {
    pub fn entry(&self) -> JitEntry<'_> {
        JitEntry::new(self.entry)
    }

    pub fn code_size(&self) -> usize {
        self.code_size
    }

    pub fn runtime(&self) -> &JitRuntime {
        self.runtime
    }

    /// Releases now and surfaces any error instead of logging it.
    pub fn release(mut self) -> Result<()> {
        match self.function.take() {
            Some(function) => self.runtime.release(function),
            None => Ok(()),
        }
    }
}

impl Drop for LoadedCode<'_> {
    fn drop(&mut self) {
        if let Some(function) = self.function.take() {
            if let Err(err) = self.runtime.release(function) {
                warn!(%err, "failed to release loaded code");
            }
        }
    }
}
