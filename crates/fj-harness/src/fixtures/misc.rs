use super::braces;
use crate::case::{TestCase, Verification};
use crate::registry::TestRegistry;
use crate::trampoline::{recovery_handler_address, RecoverySignal, RECOVERED};
use cranelift_codegen::ir::{condcodes::IntCC, types, InstBuilder};
use fj_core::Result;
use fj_jit::{Compiler, JitEntry};

pub(super) fn register(registry: &mut TestRegistry) {
    registry.add(MiscConstPool1);
    registry.add(MiscConstPool2);
    registry.add(MiscMultiRet);
    registry.add(MiscMultiFunc);
    registry.add(MiscUnfollow);
}

struct MiscConstPool1;

impl TestCase for MiscConstPool1 {
    fn name(&self) -> &str {
        "MiscConstPool1"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let sig = cc.signature(&[], &[types::I32]);
        let mut f = cc.add_function("misc_const_pool1", &sig)?;
        f.entry_args();
        let a = f.const_i32(200)?;
        let b = f.const_i32(33)?;
        let sum = f.ins().iadd(a, b);
        f.ins().return_(&[sum]);
        f.end_function()
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        let f: extern "C" fn() -> i32 = unsafe { entry.as_fn() };
        Verification::compare(f(), 233, |v| format!("ret={v}"))
    }
}

struct MiscConstPool2;

impl TestCase for MiscConstPool2 {
    fn name(&self) -> &str {
        "MiscConstPool2"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let sig = cc.signature(&[types::F64], &[types::F64]);
        let mut f = cc.add_function("misc_const_pool2", &sig)?;
        let args = f.entry_args();
        let scale = f.const_f64(1.5)?;
        let bias = f.const_f64(0.25)?;
        let scaled = f.ins().fmul(args[0], scale);
        let ret = f.ins().fadd(scaled, bias);
        f.ins().return_(&[ret]);
        f.end_function()
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        let f: extern "C" fn(f64) -> f64 = unsafe { entry.as_fn() };
        Verification::compare(f(4.0), 4.0 * 1.5 + 0.25, |v| format!("ret={v}"))
    }
}

/// One return per operator, plus a shared zero return for division by
/// zero and unknown operators.
struct MiscMultiRet;

impl TestCase for MiscMultiRet {
    fn name(&self) -> &str {
        "MiscMultiRet"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let sig = cc.signature(&[types::I32; 3], &[types::I32]);
        let mut f = cc.add_function("misc_multi_ret", &sig)?;
        let args = f.entry_args();
        let (op, a, b) = (args[0], args[1], args[2]);
        let zero = f.create_block();
        let div = f.create_block();
        let checked_div = f.create_block();

        for code in 0..3i64 {
            let block = f.create_block();
            let next = f.create_block();
            let hit = f.ins().icmp_imm(IntCC::Equal, op, code);
            f.ins().brif(hit, block, &[], next, &[]);

            f.switch_to_block(block);
            let ret = match code {
                0 => f.ins().iadd(a, b),
                1 => f.ins().isub(a, b),
                _ => f.ins().imul(a, b),
            };
            f.ins().return_(&[ret]);
            f.switch_to_block(next);
        }
        let hit = f.ins().icmp_imm(IntCC::Equal, op, 3);
        f.ins().brif(hit, div, &[], zero, &[]);

        f.switch_to_block(div);
        let by_zero = f.ins().icmp_imm(IntCC::Equal, b, 0);
        f.ins().brif(by_zero, zero, &[], checked_div, &[]);

        f.switch_to_block(checked_div);
        let ret = f.ins().sdiv(a, b);
        f.ins().return_(&[ret]);

        f.switch_to_block(zero);
        let ret = f.iconst32(0);
        f.ins().return_(&[ret]);
        f.end_function()
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        let f: extern "C" fn(i32, i32, i32) -> i32 = unsafe { entry.as_fn() };
        let (a, b) = (44, 3);
        let observed = [f(0, a, b), f(1, a, b), f(2, a, b), f(3, a, b), f(3, a, 0), f(9, a, b)];
        let expected = [a + b, a - b, a * b, a / b, 0, 0];
        Verification::compare(observed, expected, |v| format!("ret={}", braces(v)))
    }
}

/// Entry calls a second function whose body is emitted afterwards.
struct MiscMultiFunc;

impl TestCase for MiscMultiFunc {
    fn name(&self) -> &str {
        "MiscMultiFunc"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let sig = cc.signature(&[types::I32; 2], &[types::I32]);
        let outer = cc.declare_function("misc_multi_func", &sig)?;
        let inner = cc.declare_function("misc_multi_func_add", &sig)?;

        let mut f = cc.begin_function(&outer)?;
        let args = f.entry_args();
        let ret = f.call(&inner, &args);
        f.ins().return_(&ret);
        f.end_function()?;

        let mut f = cc.begin_function(&inner)?;
        let args = f.entry_args();
        let sum = f.ins().iadd(args[0], args[1]);
        f.ins().return_(&[sum]);
        f.end_function()
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        let f: extern "C" fn(i32, i32) -> i32 = unsafe { entry.as_fn() };
        Verification::compare(f(56, 22), 78, |v| format!("ret={v}"))
    }
}

/// Hands control to a host handler that returns a sentinel instead of
/// resuming normally. The generated code forwards it unchanged.
struct MiscUnfollow;

impl TestCase for MiscUnfollow {
    fn name(&self) -> &str {
        "MiscUnfollow"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let ptr = cc.pointer_type();
        let sig = cc.signature(&[types::I32, ptr, ptr], &[types::I32]);
        let handler_sig = cc.signature(&[ptr], &[types::I32]);
        let mut f = cc.add_function("misc_unfollow", &sig)?;
        let args = f.entry_args();
        let (value, handler, signal) = (args[0], args[1], args[2]);
        let escape = f.create_block();
        let normal = f.create_block();

        f.ins().brif(value, normal, &[], escape, &[]);

        f.switch_to_block(escape);
        let ret = f.call_ptr(handler, handler_sig, &[signal]);
        f.ins().return_(&ret);

        f.switch_to_block(normal);
        f.ins().return_(&[value]);
        f.end_function()
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        let f: extern "C" fn(i32, usize, *const RecoverySignal) -> i32 = unsafe { entry.as_fn() };
        let handler = recovery_handler_address();

        let signal = RecoverySignal::new();
        let normal = f(7, handler, signal.as_ptr());
        let untouched = signal.recovered();
        let escaped = f(0, handler, signal.as_ptr());

        Verification::compare(
            (normal, untouched, escaped, signal.hits()),
            (7, false, RECOVERED, 1),
            |(normal, untouched, escaped, hits)| {
                format!("ret={{{normal}, {escaped}}} recovered_early={untouched} hits={hits}")
            },
        )
    }
}
