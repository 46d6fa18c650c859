use crate::error::{Error, ErrorCode, Stage};

/// Callback target the emitter reports compilation faults to.
pub trait ErrorHandler {
    fn report(&mut self, code: ErrorCode, message: &str, origin: Stage);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedError {
    pub code: ErrorCode,
    pub message: String,
    pub origin: Stage,
}

impl CollectedError {
    pub fn to_error(&self) -> Error {
        Error::emitter(self.code, self.message.clone(), self.origin)
    }
}

/// Keeps the first reported error. Later reports are only counted.
#[derive(Debug, Default)]
pub struct ErrorCollector {
    first: Option<CollectedError>,
    reports: usize,
}

impl ErrorCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn first(&self) -> Option<&CollectedError> {
        self.first.as_ref()
    }

    pub fn has_error(&self) -> bool {
        self.first.is_some()
    }

    pub fn report_count(&self) -> usize {
        self.reports
    }
}

impl ErrorHandler for ErrorCollector {
    fn report(&mut self, code: ErrorCode, message: &str, origin: Stage) {
        self.reports += 1;
        tracing::debug!(code = %code, %origin, "{message}");
        if self.first.is_none() {
            self.first = Some(CollectedError {
                code,
                message: message.to_string(),
                origin,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_the_first_error() {
        let mut collector = ErrorCollector::new();
        assert!(!collector.has_error());

        collector.report(ErrorCode::UnterminatedBlock, "block0 falls through", Stage::Emit);
        collector.report(ErrorCode::Verifier, "later noise", Stage::Finalize);

        let first = collector.first().expect("first error");
        assert_eq!(first.code, ErrorCode::UnterminatedBlock);
        assert_eq!(first.message, "block0 falls through");
        assert_eq!(first.origin, Stage::Emit);
        assert_eq!(collector.report_count(), 2);
    }

    #[test]
    fn collected_error_converts_back() {
        let collected = CollectedError {
            code: ErrorCode::UnclosedFunction,
            message: "f".into(),
            origin: Stage::Finalize,
        };
        assert_eq!(collected.to_error().code(), ErrorCode::UnclosedFunction);
    }
}
