//! Cranelift-backed emitter and executable-memory runtime.
//!
//! The pieces line up with the three collaborators the harness talks to:
//! [`Compiler`] is the emitter context, [`CodeBuffer`] collects functions and
//! finalizes them, and [`JitRuntime`] loads and releases executable code.

pub mod buffer;
pub mod compiler;
pub mod runtime;
pub mod target;

pub use buffer::{CodeBuffer, FinalizedCode, FunctionReport, SharedHandler};
pub use compiler::{Compiler, FuncDecl, FuncEmitter};
pub use runtime::{JitEntry, JitFunction, JitRuntime, LoadedCode, RuntimeId, RuntimeStats};
pub use target::{host_arch, host_pointer_bits, OptLevel, TargetOptions};
