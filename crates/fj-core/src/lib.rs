pub mod collector;
pub mod config;
pub mod diagnostics;
pub mod error;

pub use collector::{CollectedError, ErrorCollector, ErrorHandler};
pub use diagnostics::DiagnosticSink;
pub use error::{Error, ErrorCode, Result, Stage};
