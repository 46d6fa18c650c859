use fj_core::Result;
use fj_jit::{Compiler, JitEntry, TargetOptions};

/// One self-contained program: emit it, then run it and judge the result.
pub trait TestCase {
    /// Display name. Parameterized cases encode their parameters here.
    fn name(&self) -> &str;

    /// Adjusts code generation settings for this case's private runtime.
    fn configure_target(&self, _options: &mut TargetOptions) {}

    /// Describes the program. Must not run it.
    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()>;

    /// Calls the loaded program with fixed inputs and compares against an
    /// independently computed expectation. `entry` must not escape.
    fn verify(&self, entry: JitEntry<'_>) -> Verification;
}

/// Verdict of [`TestCase::verify`] plus both sides rendered for the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub passed: bool,
    pub observed: String,
    pub expected: String,
}

impl Verification {
    /// Compares by value and renders both sides with the same formatter.
    pub fn compare<T, F>(observed: T, expected: T, render: F) -> Self
    where
        T: PartialEq,
        F: Fn(&T) -> String,
    {
        Self {
            passed: observed == expected,
            observed: render(&observed),
            expected: render(&expected),
        }
    }

    /// For programs whose only observable behavior is returning at all.
    pub fn unit() -> Self {
        Self {
            passed: true,
            observed: "ret={}".to_string(),
            expected: "ret={}".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compare_uses_values_not_text() {
        let v = Verification::compare(0.1f64 + 0.2, 0.3, |x| format!("{x:.1}"));
        assert!(!v.passed);
        assert_eq!(v.observed, v.expected);

        let v = Verification::compare(36, 36, |x| format!("ret={x}"));
        assert!(v.passed);
        assert_eq!(v.observed, "ret=36");
    }
}
