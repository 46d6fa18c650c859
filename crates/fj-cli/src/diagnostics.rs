//! Diagnostic and error reporting utilities

use crate::{CliError, Result};
use miette::Diagnostic;
use thiserror::Error;

/// Set up enhanced error reporting with miette
pub fn setup_error_reporting() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(false)
                .unicode(true)
                .context_lines(2)
                .build(),
        )
    }))
    .map_err(|e| CliError::Config(format!("Failed to setup error reporting: {}", e)))?;

    Ok(())
}

/// Errors that stop the harness before any test runs.
#[derive(Error, Debug, Diagnostic)]
pub enum HarnessCliError {
    #[error("{message}")]
    #[diagnostic(
        code(fj::config),
        help("Check the [harness] table of your fj.toml; known keys are verbose, dump_asm, filter, opt_level, verifier and color")
    )]
    Config { message: String },

    #[error("{message}")]
    #[diagnostic(code(fj::harness), help("Run with -v for more detail"))]
    Harness { message: String },

    #[error("{message}")]
    #[diagnostic(code(fj::input))]
    Input { message: String },
}

impl From<&CliError> for HarnessCliError {
    fn from(err: &CliError) -> Self {
        match err {
            CliError::Config(message) => HarnessCliError::Config {
                message: message.clone(),
            },
            CliError::InvalidInput(message) => HarnessCliError::Input {
                message: message.clone(),
            },
            CliError::Io(_) | CliError::Harness(_) => HarnessCliError::Harness {
                message: err.to_string(),
            },
        }
    }
}

/// Prints `err` through the installed miette handler. Returns `false` when
/// the error has no richer rendering and should be logged instead.
pub fn render_cli_error(err: &CliError) -> bool {
    match err {
        CliError::Config(_) | CliError::InvalidInput(_) => {
            let report = miette::Report::new(HarnessCliError::from(err));
            eprintln!("{report:?}");
            true
        }
        CliError::Io(_) | CliError::Harness(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_keep_their_message() {
        let err = CliError::Config("Failed to parse config file fj.toml".into());
        match HarnessCliError::from(&err) {
            HarnessCliError::Config { message } => assert!(message.contains("fj.toml")),
            other => panic!("Expected Config, got {other:?}"),
        }
    }

    #[test]
    fn diagnostic_codes_are_set() {
        let diag = HarnessCliError::Config {
            message: "bad".into(),
        };
        let code = diag.code().map(|c| c.to_string());
        assert_eq!(code.as_deref(), Some("fj::config"));
    }
}
