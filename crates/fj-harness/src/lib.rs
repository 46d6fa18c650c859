//! Conformance harness for the JIT emitter.
//!
//! Every [`TestCase`] emits a small program, the driver compiles and loads it
//! into a fresh [`fj_jit::JitRuntime`], calls it, and compares what it returns
//! or writes against a value computed in Rust.

pub mod case;
pub mod config;
pub mod driver;
pub mod fixtures;
pub mod invoke;
pub mod registry;
pub mod report;
pub mod session;
pub mod trampoline;

pub use case::{TestCase, Verification};
pub use config::HarnessOptions;
pub use driver::{HarnessDriver, RunSummary, TestOutcome};
pub use registry::TestRegistry;
pub use report::Reporter;
pub use session::CompilationSession;
