use cranelift_codegen::ir::{types, InstBuilder};
use fj_core::{DiagnosticSink, Error, ErrorCode, Result};
use fj_harness::invoke::call_u32;
use fj_harness::{HarnessDriver, HarnessOptions, RunSummary, TestCase, TestOutcome, TestRegistry, Verification};
use fj_jit::{Compiler, JitEntry};
use pretty_assertions::assert_eq;
use std::io;
use std::sync::{Arc, Mutex};

struct ConstReturn {
    value: i32,
    expected: i32,
}

impl TestCase for ConstReturn {
    fn name(&self) -> &str {
        "ConstReturn"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let sig = cc.signature(&[], &[types::I32]);
        let mut f = cc.add_function("const_return", &sig)?;
        f.entry_args();
        let v = f.iconst32(self.value);
        f.ins().return_(&[v]);
        f.end_function()
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        let f: extern "C" fn() -> i32 = unsafe { entry.as_fn() };
        Verification::compare(f(), self.expected, |v| format!("ret={v}"))
    }
}

struct SumArgs {
    count: u32,
    name: String,
}

impl SumArgs {
    fn new(count: u32) -> Self {
        Self {
            count,
            name: format!("SumArgs {count}"),
        }
    }
}

impl TestCase for SumArgs {
    fn name(&self) -> &str {
        &self.name
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let sig = cc.signature(&vec![types::I32; self.count as usize], &[types::I32]);
        let mut f = cc.add_function("sum_args", &sig)?;
        let args = f.entry_args();
        let mut sum = f.iconst32(0);
        for arg in args {
            sum = f.ins().iadd(sum, arg);
        }
        f.ins().return_(&[sum]);
        f.end_function()
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        let args: Vec<u32> = (1..=self.count).collect();
        let observed = unsafe { call_u32(entry, &args) };
        Verification::compare(observed, Some(args.iter().sum()), |v| format!("ret={v:?}"))
    }
}

struct Unclosed;

impl TestCase for Unclosed {
    fn name(&self) -> &str {
        "Unclosed"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let sig = cc.signature(&[], &[types::I32]);
        let mut f = cc.add_function("unclosed", &sig)?;
        f.entry_args();
        let v = f.iconst32(1);
        f.ins().return_(&[v]);
        Ok(())
    }

    fn verify(&self, _entry: JitEntry<'_>) -> Verification {
        panic!("unclosed code must never run");
    }
}

struct EmitFails;

impl TestCase for EmitFails {
    fn name(&self) -> &str {
        "EmitFails"
    }

    fn emit(&self, _cc: &mut Compiler<'_, '_>) -> Result<()> {
        Err(Error::from("body refused"))
    }

    fn verify(&self, _entry: JitEntry<'_>) -> Verification {
        panic!("failed emission must never run");
    }
}

/// Leaves its entry block open and moves on to another block.
struct AbandonedBlock;

impl TestCase for AbandonedBlock {
    fn name(&self) -> &str {
        "AbandonedBlock"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let sig = cc.signature(&[types::I32], &[types::I32]);
        let mut f = cc.add_function("abandoned", &sig)?;
        let args = f.entry_args();
        let exit = f.create_block();
        f.ins().iadd_imm(args[0], 1i64);
        f.switch_to_block(exit);
        f.ins().return_(&[args[0]]);
        f.end_function()
    }

    fn verify(&self, _entry: JitEntry<'_>) -> Verification {
        panic!("poisoned code must never run");
    }
}

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn text(&self) -> String {
        String::from_utf8(self.0.lock().expect("lock").clone()).expect("utf8 stream")
    }
}

impl io::Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn run(registry: &TestRegistry, options: HarnessOptions) -> (RunSummary, String) {
    let mut driver = HarnessDriver::new(options, Vec::new());
    let summary = driver.run(registry).expect("report output");
    let out = String::from_utf8(driver.into_output()).expect("utf8 report");
    (summary, out)
}

#[test]
fn constant_return_passes_and_counts_code() {
    let mut registry = TestRegistry::new();
    registry.add(ConstReturn { value: 42, expected: 42 });
    let (summary, out) = run(&registry, HarnessOptions::default());

    assert_eq!(summary.failed, 0);
    assert_eq!(summary.total, 1);
    assert!(summary.code_size > 0);
    assert_eq!(summary.code_size, summary.outcomes[0].code_size());
    assert!(out.starts_with("[Test] ConstReturn [OK]\n"), "{out}");
    assert!(out.contains("[PASSED] 0 of 1 failed"), "{out}");
    assert!(out.contains(&format!("OutputSize={}", summary.code_size)), "{out}");
}

#[test]
fn sums_up_to_sixteen_arguments() {
    let mut registry = TestRegistry::new();
    for count in 0..=16 {
        registry.add(SumArgs::new(count));
    }
    let (summary, out) = run(&registry, HarnessOptions::default());
    assert_eq!(summary.failed, 0, "{out}");
    assert_eq!(summary.total, 17);
}

#[test]
fn unclosed_function_fails_without_running() {
    let mut registry = TestRegistry::new();
    registry.add(Unclosed);
    registry.add(ConstReturn { value: 1, expected: 1 });
    let (summary, out) = run(&registry, HarnessOptions::default());

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.total, 2);
    match &summary.outcomes[0] {
        TestOutcome::Failed { code, .. } => assert_eq!(*code, ErrorCode::UnclosedFunction),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(out.contains("[Test] Unclosed [FAILED]"), "{out}");
    assert!(out.contains("ERROR 0x00000002"), "{out}");
    assert!(out.contains("[Test] ConstReturn [OK]"), "{out}");
    assert_eq!(summary.code_size, summary.outcomes[1].code_size());
    assert_eq!(out.matches(" [FAILED]").count(), summary.failed);
    assert_eq!(summary.exit_code(), 1);
}

#[test]
fn emit_error_is_reported_with_its_code() {
    let mut registry = TestRegistry::new();
    registry.add(EmitFails);
    let (summary, out) = run(&registry, HarnessOptions::default());
    assert_eq!(summary.failed, 1);
    assert!(out.contains("ERROR 0x00000001: body refused"), "{out}");
    assert_eq!(summary.loads, 0);
}

#[test]
fn mismatch_still_releases_code() {
    let mut registry = TestRegistry::new();
    registry.add(ConstReturn { value: 5, expected: 6 });
    let (summary, out) = run(&registry, HarnessOptions::default());

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.loads, 1);
    assert_eq!(summary.releases, 1);
    assert!(out.contains("  Returned: ret=5\n  Expected: ret=6\n"), "{out}");
    assert!(out.contains("[FAILED] 1 of 1 failed"), "{out}");
}

#[test]
fn diagnostics_do_not_leak_between_tests() {
    struct Wrong;

    impl TestCase for Wrong {
        fn name(&self) -> &str {
            "Wrong"
        }

        fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
            let sig = cc.signature(&[], &[types::I32]);
            let mut f = cc.add_function("wrong_answer", &sig)?;
            f.entry_args();
            let v = f.iconst32(0);
            f.ins().return_(&[v]);
            f.end_function()
        }

        fn verify(&self, entry: JitEntry<'_>) -> Verification {
            let f: extern "C" fn() -> i32 = unsafe { entry.as_fn() };
            Verification::compare(f(), 1, |v| format!("ret={v}"))
        }
    }

    let mut registry = TestRegistry::new();
    registry.add(ConstReturn { value: 3, expected: 3 });
    registry.add(Wrong);
    let (summary, out) = run(&registry, HarnessOptions::default());

    assert_eq!(summary.failed, 1);
    assert!(out.contains("; begin wrong_answer"), "{out}");
    assert!(!out.contains("const_return"), "{out}");
}

#[test]
fn empty_registry_passes() {
    let (summary, out) = run(&TestRegistry::new(), HarnessOptions::default());
    assert_eq!(summary.total, 0);
    assert_eq!(summary.exit_code(), 0);
    assert!(out.contains("0 of 0 failed"), "{out}");
    assert!(out.contains("OutputSize=0"), "{out}");
}

#[test]
fn filter_selects_by_substring() {
    let options = HarnessOptions {
        filter: Some("IfElse".into()),
        ..HarnessOptions::default()
    };
    let (summary, out) = run(&TestRegistry::with_fixtures(), options);
    assert_eq!(summary.total, 4, "{out}");
    assert_eq!(summary.failed, 0, "{out}");
}

#[test]
fn runs_are_deterministic() {
    let options = HarnessOptions {
        filter: Some("Alloc".into()),
        ..HarnessOptions::default()
    };
    let registry = TestRegistry::with_fixtures();
    let (first, _) = run(&registry, options.clone());
    let (second, _) = run(&registry, options);
    assert_eq!(first, second);
}

#[test]
fn dump_asm_prints_each_function() {
    let mut registry = TestRegistry::new();
    registry.add(ConstReturn { value: 9, expected: 9 });
    let options = HarnessOptions {
        dump_asm: true,
        ..HarnessOptions::default()
    };
    let (summary, out) = run(&registry, options);
    assert_eq!(summary.failed, 0);
    assert!(out.contains("; const_return ("), "{out}");
    assert!(out.contains("[Test] ConstReturn [OK]"), "{out}");
}

#[test]
fn full_battery_passes() {
    let registry = TestRegistry::with_fixtures();
    let (summary, out) = run(&registry, HarnessOptions::default());
    assert_eq!(summary.failed, 0, "{out}");
    assert_eq!(summary.total, registry.len());
    assert_eq!(summary.loads, summary.releases);
}

#[test]
fn abandoned_block_fails_one_test_and_the_run_goes_on() {
    let mut registry = TestRegistry::new();
    registry.add(AbandonedBlock);
    registry.add(ConstReturn { value: 5, expected: 5 });
    let (summary, out) = run(&registry, HarnessOptions::default());

    assert_eq!(summary.total, 2);
    assert_eq!(summary.failed, 1);
    assert!(out.contains("[Test] AbandonedBlock [FAILED]"), "{out}");
    assert!(out.contains("ERROR 0x00000004:"), "{out}");
    assert!(out.contains("[Test] ConstReturn [OK]"), "{out}");
    assert_eq!(summary.loads, 1);
    assert_eq!(summary.releases, 1);
}

#[test]
fn verbose_run_streams_diagnostics_instead_of_repeating_them() {
    let mut registry = TestRegistry::new();
    registry.add(ConstReturn { value: 1, expected: 2 });
    let stream = SharedBuf::default();
    let options = HarnessOptions {
        verbose: true,
        ..HarnessOptions::default()
    };
    let sink = DiagnosticSink::streaming(Box::new(stream.clone()));
    let mut driver = HarnessDriver::with_sink(options, Vec::new(), sink);
    let summary = driver.run(&registry).expect("report output");
    let out = String::from_utf8(driver.into_output()).expect("utf8 report");

    assert_eq!(summary.failed, 1);
    let streamed = stream.text();
    assert_eq!(streamed.matches("; begin const_return").count(), 1, "{streamed}");
    assert!(!out.contains("; begin"), "{out}");
    assert!(out.starts_with("[Test] ConstReturn\n[Test] ConstReturn [FAILED]\n[Status]\n"), "{out}");
    assert!(out.contains("  Returned: ret=1\n  Expected: ret=2\n"), "{out}");
}
