use serde::Serialize;
use std::fmt;
use std::result;
use thiserror::Error;

/// Numeric error codes surfaced in reports as `0x%08X`.
///
/// Values are stable across releases so that logs from different runs can be
/// compared directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u32)]
pub enum ErrorCode {
    InvalidState = 1,
    UnclosedFunction = 2,
    EmptyFunction = 3,
    UnterminatedBlock = 4,
    NoEntryFunction = 5,
    UndefinedFunction = 6,
    InvalidDeclaration = 7,
    Verifier = 8,
    CodeTooLarge = 9,
    Unsupported = 10,
    Codegen = 11,
    OutOfMemory = 12,
    RuntimeMismatch = 13,
    UnsupportedTarget = 14,
}

impl ErrorCode {
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            ErrorCode::InvalidState => "InvalidState",
            ErrorCode::UnclosedFunction => "UnclosedFunction",
            ErrorCode::EmptyFunction => "EmptyFunction",
            ErrorCode::UnterminatedBlock => "UnterminatedBlock",
            ErrorCode::NoEntryFunction => "NoEntryFunction",
            ErrorCode::UndefinedFunction => "UndefinedFunction",
            ErrorCode::InvalidDeclaration => "InvalidDeclaration",
            ErrorCode::Verifier => "Verifier",
            ErrorCode::CodeTooLarge => "CodeTooLarge",
            ErrorCode::Unsupported => "Unsupported",
            ErrorCode::Codegen => "Codegen",
            ErrorCode::OutOfMemory => "OutOfMemory",
            ErrorCode::RuntimeMismatch => "RuntimeMismatch",
            ErrorCode::UnsupportedTarget => "UnsupportedTarget",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.as_u32())
    }
}

/// Pipeline step an error was raised from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Stage {
    Emit,
    Finalize,
    Load,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Emit => "emit",
            Stage::Finalize => "finalize",
            Stage::Load => "load",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("{stage} error {code}: {message}")]
    Emitter {
        code: ErrorCode,
        message: String,
        stage: Stage,
    },
    #[error("runtime error {code}: {message}")]
    Runtime { code: ErrorCode, message: String },
    #[error("Generic error: {0}")]
    Generic(String),
}

impl Error {
    pub fn emitter(code: ErrorCode, message: impl Into<String>, stage: Stage) -> Self {
        Error::Emitter {
            code,
            message: message.into(),
            stage,
        }
    }

    pub fn runtime(code: ErrorCode, message: impl Into<String>) -> Self {
        Error::Runtime {
            code,
            message: message.into(),
        }
    }

    /// Code reported for this error. Generic errors map to `InvalidState`.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Emitter { code, .. } | Error::Runtime { code, .. } => *code,
            Error::Generic(_) => ErrorCode::InvalidState,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Error::Emitter { message, .. } | Error::Runtime { message, .. } => message,
            Error::Generic(message) => message,
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::Emitter { stage, .. } => Some(*stage),
            Error::Runtime { .. } => Some(Stage::Load),
            Error::Generic(_) => None,
        }
    }
}

pub type Result<T> = result::Result<T, Error>;

impl From<eyre::Report> for Error {
    fn from(err: eyre::Report) -> Self {
        Error::Generic(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Generic(e.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Generic(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Generic(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_render_as_fixed_width_hex() {
        assert_eq!(ErrorCode::UnclosedFunction.to_string(), "0x00000002");
        assert_eq!(ErrorCode::UnsupportedTarget.to_string(), "0x0000000E");
    }

    #[test]
    fn emitter_error_keeps_code_and_stage() {
        let err = Error::emitter(ErrorCode::Verifier, "bad operand", Stage::Finalize);
        assert_eq!(err.code(), ErrorCode::Verifier);
        assert_eq!(err.message(), "bad operand");
        assert_eq!(err.stage(), Some(Stage::Finalize));
        assert_eq!(err.to_string(), "finalize error 0x00000008: bad operand");
    }

    #[test]
    fn generic_errors_fall_back_to_invalid_state() {
        let err: Error = "boom".into();
        assert_eq!(err.code(), ErrorCode::InvalidState);
        assert_eq!(err.stage(), None);
    }
}
