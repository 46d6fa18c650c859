use crate::case::TestCase;
use crate::fixtures;

/// Ordered list of test cases. Run order is insertion order.
#[derive(Default)]
pub struct TestRegistry {
    cases: Vec<Box<dyn TestCase>>,
}

impl TestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in battery.
    pub fn with_fixtures() -> Self {
        let mut registry = Self::new();
        fixtures::register_all(&mut registry);
        registry
    }

    pub fn add<T: TestCase + 'static>(&mut self, case: T) {
        self.cases.push(Box::new(case));
    }

    pub fn add_boxed(&mut self, case: Box<dyn TestCase>) {
        self.cases.push(case);
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn TestCase> + '_ {
        self.cases.iter().map(|case| case.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.iter().map(|case| case.name()).collect()
    }
}

impl std::fmt::Debug for TestRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn fixture_names_are_unique() {
        let registry = TestRegistry::with_fixtures();
        let names = registry.names();
        let unique: HashSet<_> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
        assert!(names.contains(&"AllocBase"));
        assert!(names.contains(&"AlignBase {NumArgs=16 Alignment=16 PreserveFP=Y}"));
    }

    #[test]
    fn fixtures_run_in_registration_order() {
        let registry = TestRegistry::with_fixtures();
        let names = registry.names();
        assert_eq!(names.first(), Some(&"NoCode"));
        let alloc = names.iter().position(|n| *n == "AllocBase");
        let call = names.iter().position(|n| *n == "FuncCallBase1");
        assert!(alloc < call);
    }
}
