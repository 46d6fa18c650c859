//! Command-line front end for the JIT conformance harness.

pub mod cli;
pub mod diagnostics;

pub mod error {
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum CliError {
        #[error("IO error: {0}")]
        Io(#[from] std::io::Error),

        #[error("Configuration error: {0}")]
        Config(String),

        #[error("Harness error: {0}")]
        Harness(#[from] fj_core::Error),

        #[error("Invalid input: {0}")]
        InvalidInput(String),
    }

    impl CliError {
        /// Bad configuration or input is a usage error. Anything else means
        /// the run itself broke.
        pub fn exit_code(&self) -> i32 {
            match self {
                CliError::Config(_) | CliError::InvalidInput(_) => super::EXIT_USAGE,
                CliError::Io(_) | CliError::Harness(_) => super::EXIT_FAILURE,
            }
        }
    }

    pub type Result<T> = std::result::Result<T, CliError>;
}

pub use error::{CliError, Result};

/// Exit status for failing tests and broken runs.
pub const EXIT_FAILURE: i32 = 1;

/// Exit status for runs that never got to execute tests.
pub const EXIT_USAGE: i32 = 2;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_config_and_input_errors_are_usage_errors() {
        assert_eq!(CliError::Config("bad".into()).exit_code(), EXIT_USAGE);
        assert_eq!(CliError::InvalidInput("bad".into()).exit_code(), EXIT_USAGE);

        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed");
        assert_eq!(CliError::from(io).exit_code(), EXIT_FAILURE);
        let harness = fj_core::Error::emitter(
            fj_core::ErrorCode::InvalidState,
            "broken",
            fj_core::Stage::Emit,
        );
        assert_eq!(CliError::from(harness).exit_code(), EXIT_FAILURE);
    }
}
