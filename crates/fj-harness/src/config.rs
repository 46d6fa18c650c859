use fj_jit::TargetOptions;

/// Run-wide switches. Per-test code generation tweaks go through
/// [`crate::TestCase::configure_target`] on a copy of `target`.
#[derive(Debug, Clone, Default)]
pub struct HarnessOptions {
    /// Stream diagnostics as they are produced instead of buffering them.
    pub verbose: bool,
    /// Print the disassembly of every finalized test.
    pub dump_asm: bool,
    /// Only run tests whose name contains this substring.
    pub filter: Option<String>,
    pub color: bool,
    pub target: TargetOptions,
}

impl HarnessOptions {
    pub fn selects(&self, name: &str) -> bool {
        match &self.filter {
            Some(pattern) => name.contains(pattern.as_str()),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_matches_substrings() {
        let mut options = HarnessOptions::default();
        assert!(options.selects("AllocBase"));
        options.filter = Some("Call".into());
        assert!(options.selects("FuncCallBase1"));
        assert!(!options.selects("AllocBase"));
    }
}
