use super::braces;
use crate::case::{TestCase, Verification};
use crate::registry::TestRegistry;
use cranelift_codegen::ir::{condcodes::IntCC, types, InstBuilder, MemFlags, Type, Value};
use fj_core::Result;
use fj_jit::{Compiler, FuncEmitter, JitEntry};

pub(super) fn register(registry: &mut TestRegistry) {
    registry.add(AllocBase);
    registry.add(AllocMany1);
    registry.add(AllocMany2);
    registry.add(AllocImul1);
    registry.add(AllocImul2);
    registry.add(AllocIdiv1);
    registry.add(AllocSetz);
    registry.add(AllocShlRor);
    registry.add(AllocIfElse1);
    registry.add(AllocIfElse2);
    registry.add(AllocIfElse3);
    registry.add(AllocIfElse4);
    registry.add(AllocInt8);
    registry.add(AllocUnhandledArg);
    registry.add(AllocArgsIntPtr);
    registry.add(AllocArgsFloat { double: false });
    registry.add(AllocArgsFloat { double: true });
    registry.add(AllocRetFloat1 { double: false });
    registry.add(AllocRetFloat1 { double: true });
    registry.add(AllocRetFloat2 { double: false });
    registry.add(AllocRetFloat2 { double: true });
    registry.add(AllocStack);
    registry.add(AllocMemcpy);
    registry.add(AllocExtraBlock);
}

fn ret_i32(v: &i32) -> String {
    format!("ret={v}")
}

/// High 32 bits of the signed 64-bit product of two 32-bit values.
fn imul_hi(f: &mut FuncEmitter<'_>, a: Value, b: Value) -> Value {
    let a = f.ins().sextend(types::I64, a);
    let b = f.ins().sextend(types::I64, b);
    let wide = f.ins().imul(a, b);
    let hi = f.ins().sshr_imm(wide, 32);
    f.ins().ireduce(types::I32, hi)
}

fn store(f: &mut FuncEmitter<'_>, value: Value, addr: Value, offset: i32) {
    f.ins().store(MemFlags::trusted(), value, addr, offset);
}

fn load(f: &mut FuncEmitter<'_>, ty: Type, addr: Value, offset: i32) -> Value {
    f.ins().load(ty, MemFlags::trusted(), addr, offset)
}

struct AllocBase;

impl TestCase for AllocBase {
    fn name(&self) -> &str {
        "AllocBase"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let sig = cc.signature(&[], &[types::I32]);
        let mut f = cc.add_function("alloc_base", &sig)?;
        f.entry_args();
        let vars: Vec<_> = (0..5)
            .map(|i| {
                let value = f.iconst32(i);
                f.var_from(types::I32, value)
            })
            .collect();
        let mut acc = f.use_var(vars[0]);
        for var in &vars[1..] {
            let v = f.use_var(*var);
            acc = f.ins().iadd(acc, v);
        }
        f.def_var(vars[0], acc);
        let ret = f.use_var(vars[0]);
        f.ins().return_(&[ret]);
        f.end_function()
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        let f: extern "C" fn() -> i32 = unsafe { entry.as_fn() };
        Verification::compare(f(), 10, ret_i32)
    }
}

/// Eight live values summed into one output and subtracted into another.
struct AllocMany1;

impl TestCase for AllocMany1 {
    fn name(&self) -> &str {
        "AllocMany1"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let ptr = cc.pointer_type();
        let sig = cc.signature(&[ptr, ptr], &[]);
        let mut f = cc.add_function("alloc_many1", &sig)?;
        let args = f.entry_args();
        let values: Vec<Value> = (1..=8).map(|i| f.iconst32(i)).collect();

        let t = f.new_var(types::I32);
        let zero = f.iconst32(0);
        f.def_var(t, zero);
        for v in &values {
            let acc = f.use_var(t);
            let acc = f.ins().iadd(acc, *v);
            f.def_var(t, acc);
        }
        let sum = f.use_var(t);
        store(&mut f, sum, args[0], 0);

        f.def_var(t, zero);
        for v in &values {
            let acc = f.use_var(t);
            let acc = f.ins().isub(acc, *v);
            f.def_var(t, acc);
        }
        let diff = f.use_var(t);
        store(&mut f, diff, args[1], 0);
        f.ins().return_(&[]);
        f.end_function()
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        let f: extern "C" fn(*mut i32, *mut i32) = unsafe { entry.as_fn() };
        let (mut x, mut y) = (0, 0);
        f(&mut x, &mut y);
        Verification::compare((x, y), (36, -36), |(x, y)| format!("x={x} y={y}"))
    }
}

/// Thirty-two accumulators kept alive across a loop.
struct AllocMany2;

const MANY2_VARS: usize = 32;

impl TestCase for AllocMany2 {
    fn name(&self) -> &str {
        "AllocMany2"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let ptr = cc.pointer_type();
        let sig = cc.signature(&[ptr], &[]);
        let mut f = cc.add_function("alloc_many2", &sig)?;
        let args = f.entry_args();
        let zero = f.iconst32(0);
        let vars: Vec<_> = (0..MANY2_VARS).map(|_| f.var_from(types::I32, zero)).collect();
        let count = f.iconst32(MANY2_VARS as i32);
        let x = f.var_from(types::I32, count);

        let body = f.create_block();
        let exit = f.create_block();
        f.ins().jump(body, &[]);

        f.switch_to_block(body);
        for (i, var) in vars.iter().enumerate() {
            let v = f.use_var(*var);
            let v = f.ins().iadd_imm(v, i as i64);
            f.def_var(*var, v);
        }
        let n = f.use_var(x);
        let n = f.ins().iadd_imm(n, -1);
        f.def_var(x, n);
        f.ins().brif(n, body, &[], exit, &[]);

        f.switch_to_block(exit);
        for (i, var) in vars.iter().enumerate() {
            let v = f.use_var(*var);
            store(&mut f, v, args[0], (i * 4) as i32);
        }
        f.ins().return_(&[]);
        f.end_function()
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        let f: extern "C" fn(*mut i32) = unsafe { entry.as_fn() };
        let mut buf = [0i32; MANY2_VARS];
        f(buf.as_mut_ptr());
        let expected: Vec<i32> = (0..MANY2_VARS as i32).map(|i| i * MANY2_VARS as i32).collect();
        Verification::compare(buf.to_vec(), expected, |v| format!("ret={}", braces(v)))
    }
}

/// Full 64-bit signed product split into two outputs.
struct AllocImul1;

impl TestCase for AllocImul1 {
    fn name(&self) -> &str {
        "AllocImul1"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let ptr = cc.pointer_type();
        let sig = cc.signature(&[ptr, ptr, types::I32, types::I32], &[]);
        let mut f = cc.add_function("alloc_imul1", &sig)?;
        let args = f.entry_args();
        let (dst_hi, dst_lo, a, b) = (args[0], args[1], args[2], args[3]);
        let hi = imul_hi(&mut f, a, b);
        let lo = f.ins().imul(a, b);
        store(&mut f, hi, dst_hi, 0);
        store(&mut f, lo, dst_lo, 0);
        f.ins().return_(&[]);
        f.end_function()
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        let f: extern "C" fn(*mut i32, *mut i32, i32, i32) = unsafe { entry.as_fn() };
        let (mut hi, mut lo) = (-1, -1);
        f(&mut hi, &mut lo, 4, 4);
        Verification::compare((hi, lo), (0, 16), |(hi, lo)| format!("hi={hi} lo={lo}"))
    }
}

/// Products accumulated into memory four times over.
struct AllocImul2;

impl TestCase for AllocImul2 {
    fn name(&self) -> &str {
        "AllocImul2"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let ptr = cc.pointer_type();
        let sig = cc.signature(&[ptr, ptr], &[]);
        let mut f = cc.add_function("alloc_imul2", &sig)?;
        let args = f.entry_args();
        let (dst, src) = (args[0], args[1]);
        for _ in 0..4 {
            let x = load(&mut f, types::I32, src, 0);
            let y = load(&mut f, types::I32, src, 4);
            let hi = imul_hi(&mut f, x, y);
            let lo = f.ins().imul(x, y);

            let d0 = load(&mut f, types::I32, dst, 0);
            let d0 = f.ins().iadd(d0, hi);
            store(&mut f, d0, dst, 0);
            let d1 = load(&mut f, types::I32, dst, 4);
            let d1 = f.ins().iadd(d1, lo);
            store(&mut f, d1, dst, 4);
        }
        f.ins().return_(&[]);
        f.end_function()
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        let f: extern "C" fn(*mut i32, *const i32) = unsafe { entry.as_fn() };
        let src = [4i32, 9];
        let mut dst = [0i32; 2];
        f(dst.as_mut_ptr(), src.as_ptr());
        Verification::compare(dst, [0, 144], |v| format!("ret={}", braces(v)))
    }
}

struct AllocIdiv1;

impl TestCase for AllocIdiv1 {
    fn name(&self) -> &str {
        "AllocIdiv1"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let sig = cc.signature(&[types::I32, types::I32], &[types::I32]);
        let mut f = cc.add_function("alloc_idiv1", &sig)?;
        let args = f.entry_args();
        let q = f.ins().sdiv(args[0], args[1]);
        f.ins().return_(&[q]);
        f.end_function()
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        let f: extern "C" fn(i32, i32) -> i32 = unsafe { entry.as_fn() };
        Verification::compare(f(2999, 245), 2999 / 245, ret_i32)
    }
}

/// Equality flag stored as a byte.
struct AllocSetz;

impl TestCase for AllocSetz {
    fn name(&self) -> &str {
        "AllocSetz"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let ptr = cc.pointer_type();
        let sig = cc.signature(&[types::I32, types::I32, ptr], &[]);
        let mut f = cc.add_function("alloc_setz", &sig)?;
        let args = f.entry_args();
        let flag = f.ins().icmp(IntCC::Equal, args[0], args[1]);
        store(&mut f, flag, args[2], 0);
        f.ins().return_(&[]);
        f.end_function()
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        let f: extern "C" fn(i32, i32, *mut u8) = unsafe { entry.as_fn() };
        let mut flags = [0xFFu8; 4];
        f(0, 0, &mut flags[0]);
        f(0, 1, &mut flags[1]);
        f(1, 0, &mut flags[2]);
        f(1, 1, &mut flags[3]);
        Verification::compare(flags, [1, 0, 0, 1], |v| format!("out={}", braces(v)))
    }
}

struct AllocShlRor;

impl TestCase for AllocShlRor {
    fn name(&self) -> &str {
        "AllocShlRor"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let ptr = cc.pointer_type();
        let sig = cc.signature(&[ptr, types::I32, types::I32, types::I32], &[]);
        let mut f = cc.add_function("alloc_shl_ror", &sig)?;
        let args = f.entry_args();
        let (dst, var, shl, ror) = (args[0], args[1], args[2], args[3]);
        let shifted = f.ins().ishl(var, shl);
        let rotated = f.ins().rotr(shifted, ror);
        store(&mut f, rotated, dst, 0);
        f.ins().return_(&[]);
        f.end_function()
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        let f: extern "C" fn(*mut u32, u32, u32, u32) = unsafe { entry.as_fn() };
        let mut out = 0u32;
        f(&mut out, 0xFF, 16, 8);
        Verification::compare(out, 0xFFu32.wrapping_shl(16).rotate_right(8), |v| format!("ret={v:#X}"))
    }
}

fn verify_if_else(entry: JitEntry<'_>) -> Verification {
    let f: extern "C" fn(i32, i32) -> i32 = unsafe { entry.as_fn() };
    let observed = [f(0, 1), f(1, 0)];
    Verification::compare(observed, [1, 2], |v| format!("ret={}", braces(v)))
}

/// Returns 2 when a > b, else 1, via a two-armed branch.
struct AllocIfElse1;

impl TestCase for AllocIfElse1 {
    fn name(&self) -> &str {
        "AllocIfElse1"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let sig = cc.signature(&[types::I32, types::I32], &[types::I32]);
        let mut f = cc.add_function("alloc_if_else1", &sig)?;
        let args = f.entry_args();
        let v = f.new_var(types::I32);
        let greater = f.create_block();
        let less_eq = f.create_block();
        let exit = f.create_block();

        let c = f.ins().icmp(IntCC::SignedGreaterThan, args[0], args[1]);
        f.ins().brif(c, greater, &[], less_eq, &[]);

        f.switch_to_block(less_eq);
        let one = f.iconst32(1);
        f.def_var(v, one);
        f.ins().jump(exit, &[]);

        f.switch_to_block(greater);
        let two = f.iconst32(2);
        f.def_var(v, two);
        f.ins().jump(exit, &[]);

        f.switch_to_block(exit);
        let ret = f.use_var(v);
        f.ins().return_(&[ret]);
        f.end_function()
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        verify_if_else(entry)
    }
}

/// Same result as [`AllocIfElse1`], with the blocks laid out out of order.
struct AllocIfElse2;

impl TestCase for AllocIfElse2 {
    fn name(&self) -> &str {
        "AllocIfElse2"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let sig = cc.signature(&[types::I32, types::I32], &[types::I32]);
        let mut f = cc.add_function("alloc_if_else2", &sig)?;
        let args = f.entry_args();
        let v = f.var_from(types::I32, args[0]);
        let l1 = f.create_block();
        let l2 = f.create_block();
        let l3 = f.create_block();
        let l4 = f.create_block();
        let less_eq = f.create_block();

        f.ins().jump(l1, &[]);

        f.switch_to_block(l2);
        f.ins().jump(l4, &[]);

        f.switch_to_block(l1);
        let c = f.ins().icmp(IntCC::SignedGreaterThan, args[0], args[1]);
        f.ins().brif(c, l3, &[], less_eq, &[]);

        f.switch_to_block(less_eq);
        let one = f.iconst32(1);
        f.def_var(v, one);
        f.ins().jump(l2, &[]);

        f.switch_to_block(l3);
        let two = f.iconst32(2);
        f.def_var(v, two);
        f.ins().jump(l2, &[]);

        f.switch_to_block(l4);
        let ret = f.use_var(v);
        f.ins().return_(&[ret]);
        f.end_function()
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        verify_if_else(entry)
    }
}

/// The else arm is a counting loop.
struct AllocIfElse3;

impl TestCase for AllocIfElse3 {
    fn name(&self) -> &str {
        "AllocIfElse3"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let sig = cc.signature(&[types::I32, types::I32], &[types::I32]);
        let mut f = cc.add_function("alloc_if_else3", &sig)?;
        let args = f.entry_args();
        let v = f.var_from(types::I32, args[0]);
        let counter = f.new_var(types::I32);
        let greater = f.create_block();
        let looped = f.create_block();
        let after_loop = f.create_block();
        let less_eq = f.create_block();
        let exit = f.create_block();

        let c = f.ins().icmp(IntCC::SignedGreaterThan, args[0], args[1]);
        f.ins().brif(c, greater, &[], less_eq, &[]);

        f.switch_to_block(less_eq);
        let zero = f.iconst32(0);
        f.def_var(counter, zero);
        f.ins().jump(looped, &[]);

        f.switch_to_block(looped);
        let n = f.use_var(counter);
        f.def_var(v, n);
        let n = f.ins().iadd_imm(n, 1);
        f.def_var(counter, n);
        let again = f.ins().icmp_imm(IntCC::SignedLessThanOrEqual, n, 1);
        f.ins().brif(again, looped, &[], after_loop, &[]);

        f.switch_to_block(after_loop);
        f.ins().jump(exit, &[]);

        f.switch_to_block(greater);
        let two = f.iconst32(2);
        f.def_var(v, two);
        f.ins().jump(exit, &[]);

        f.switch_to_block(exit);
        let ret = f.use_var(v);
        f.ins().return_(&[ret]);
        f.end_function()
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        verify_if_else(entry)
    }
}

/// Both arms are counting loops sharing one counter.
struct AllocIfElse4;

impl TestCase for AllocIfElse4 {
    fn name(&self) -> &str {
        "AllocIfElse4"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let sig = cc.signature(&[types::I32, types::I32], &[types::I32]);
        let mut f = cc.add_function("alloc_if_else4", &sig)?;
        let args = f.entry_args();
        let v = f.var_from(types::I32, args[0]);
        let zero = f.iconst32(0);
        let counter = f.var_from(types::I32, zero);
        let loop1 = f.create_block();
        let after_loop1 = f.create_block();
        let greater = f.create_block();
        let loop2 = f.create_block();
        let exit = f.create_block();

        let c = f.ins().icmp(IntCC::SignedGreaterThan, args[0], args[1]);
        f.ins().brif(c, greater, &[], loop1, &[]);

        for (block, next, bound) in [(loop1, after_loop1, 1i64), (loop2, exit, 2)] {
            f.switch_to_block(block);
            let n = f.use_var(counter);
            f.def_var(v, n);
            let n = f.ins().iadd_imm(n, 1);
            f.def_var(counter, n);
            let again = f.ins().icmp_imm(IntCC::SignedLessThanOrEqual, n, bound);
            f.ins().brif(again, block, &[], next, &[]);

            if block == loop1 {
                f.switch_to_block(after_loop1);
                f.ins().jump(exit, &[]);
                f.switch_to_block(greater);
                f.ins().jump(loop2, &[]);
            }
        }

        f.switch_to_block(exit);
        let ret = f.use_var(v);
        f.ins().return_(&[ret]);
        f.end_function()
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        verify_if_else(entry)
    }
}

/// Byte-sized argument widened to a full register.
struct AllocInt8;

impl TestCase for AllocInt8 {
    fn name(&self) -> &str {
        "AllocInt8"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let sig = cc.signature(&[types::I8], &[types::I32]);
        let mut f = cc.add_function("alloc_int8", &sig)?;
        let args = f.entry_args();
        let wide = f.ins().sextend(types::I32, args[0]);
        f.ins().return_(&[wide]);
        f.end_function()
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        let f: extern "C" fn(i8) -> i32 = unsafe { entry.as_fn() };
        Verification::compare(f(-13), -13, ret_i32)
    }
}

/// Only the last of three arguments is used.
struct AllocUnhandledArg;

impl TestCase for AllocUnhandledArg {
    fn name(&self) -> &str {
        "AllocUnhandledArg"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let sig = cc.signature(&[types::I32, types::I32, types::I32], &[types::I32]);
        let mut f = cc.add_function("alloc_unhandled_arg", &sig)?;
        let args = f.entry_args();
        f.ins().return_(&[args[2]]);
        f.end_function()
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        let f: extern "C" fn(i32, i32, i32) -> i32 = unsafe { entry.as_fn() };
        Verification::compare(f(42, 155, 199), 199, ret_i32)
    }
}

/// Eight pointer arguments, each offset and used to bump a byte.
struct AllocArgsIntPtr;

impl TestCase for AllocArgsIntPtr {
    fn name(&self) -> &str {
        "AllocArgsIntPtr"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let ptr = cc.pointer_type();
        let sig = cc.signature(&[ptr; 8], &[]);
        let mut f = cc.add_function("alloc_args_intptr", &sig)?;
        let args = f.entry_args();
        for (i, arg) in args.iter().enumerate() {
            let step = i as i64 + 1;
            let addr = f.ins().iadd_imm(*arg, step);
            let byte = load(&mut f, types::I8, addr, 0);
            let byte = f.ins().iadd_imm(byte, step);
            store(&mut f, byte, addr, 0);
        }
        f.ins().return_(&[]);
        f.end_function()
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        type Fn8 = extern "C" fn(*mut u8, *mut u8, *mut u8, *mut u8, *mut u8, *mut u8, *mut u8, *mut u8);
        let f: Fn8 = unsafe { entry.as_fn() };
        let mut buf = [0u8; 9];
        let p = buf.as_mut_ptr();
        f(p, p, p, p, p, p, p, p);
        Verification::compare(buf, [0, 1, 2, 3, 4, 5, 6, 7, 8], |v| format!("buf={}", braces(v)))
    }
}

/// Seven floating point arguments summed and stored through the eighth.
struct AllocArgsFloat {
    double: bool,
}

impl TestCase for AllocArgsFloat {
    fn name(&self) -> &str {
        if self.double {
            "AllocArgsDouble"
        } else {
            "AllocArgsFloat"
        }
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let ty = if self.double { types::F64 } else { types::F32 };
        let mut params = vec![ty; 7];
        params.push(cc.pointer_type());
        let sig = cc.signature(&params, &[]);
        let mut f = cc.add_function("alloc_args_float", &sig)?;
        let args = f.entry_args();
        let mut sum = args[0];
        for arg in &args[1..7] {
            sum = f.ins().fadd(sum, *arg);
        }
        store(&mut f, sum, args[7], 0);
        f.ins().return_(&[]);
        f.end_function()
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        let render = |v: &f64| format!("ret={v}");
        if self.double {
            type Fn = extern "C" fn(f64, f64, f64, f64, f64, f64, f64, *mut f64);
            let f: Fn = unsafe { entry.as_fn() };
            let mut out = 0.0;
            f(1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, &mut out);
            Verification::compare(out, 28.0, render)
        } else {
            type Fn = extern "C" fn(f32, f32, f32, f32, f32, f32, f32, *mut f32);
            let f: Fn = unsafe { entry.as_fn() };
            let mut out = 0.0f32;
            f(1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, &mut out);
            Verification::compare(f64::from(out), 28.0, render)
        }
    }
}

/// Returns its floating point argument unchanged.
struct AllocRetFloat1 {
    double: bool,
}

impl TestCase for AllocRetFloat1 {
    fn name(&self) -> &str {
        if self.double {
            "AllocRetDouble1"
        } else {
            "AllocRetFloat1"
        }
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let ty = if self.double { types::F64 } else { types::F32 };
        let sig = cc.signature(&[ty], &[ty]);
        let mut f = cc.add_function("alloc_ret_float1", &sig)?;
        let args = f.entry_args();
        f.ins().return_(&[args[0]]);
        f.end_function()
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        let observed = if self.double {
            let f: extern "C" fn(f64) -> f64 = unsafe { entry.as_fn() };
            f(42.0)
        } else {
            let f: extern "C" fn(f32) -> f32 = unsafe { entry.as_fn() };
            f64::from(f(42.0))
        };
        Verification::compare(observed, 42.0, |v| format!("ret={v}"))
    }
}

/// Returns the sum of its two floating point arguments.
struct AllocRetFloat2 {
    double: bool,
}

impl TestCase for AllocRetFloat2 {
    fn name(&self) -> &str {
        if self.double {
            "AllocRetDouble2"
        } else {
            "AllocRetFloat2"
        }
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let ty = if self.double { types::F64 } else { types::F32 };
        let sig = cc.signature(&[ty, ty], &[ty]);
        let mut f = cc.add_function("alloc_ret_float2", &sig)?;
        let args = f.entry_args();
        let sum = f.ins().fadd(args[0], args[1]);
        f.ins().return_(&[sum]);
        f.end_function()
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        let observed = if self.double {
            let f: extern "C" fn(f64, f64) -> f64 = unsafe { entry.as_fn() };
            f(1.0, 2.0)
        } else {
            let f: extern "C" fn(f32, f32) -> f32 = unsafe { entry.as_fn() };
            f64::from(f(1.0, 2.0))
        };
        Verification::compare(observed, 3.0, |v| format!("ret={v}"))
    }
}

/// Fills a 256 byte stack buffer with 0..=255 and sums it back.
struct AllocStack;

const STACK_BYTES: u32 = 256;

impl TestCase for AllocStack {
    fn name(&self) -> &str {
        "AllocStack"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let sig = cc.signature(&[], &[types::I32]);
        let mut f = cc.add_function("alloc_stack", &sig)?;
        f.entry_args();
        let ptr = f.pointer_type();
        let slot = f.stack_slot(STACK_BYTES, 1);
        let base = f.ins().stack_addr(ptr, slot, 0);
        let zero = f.ins().iconst(ptr, 0);
        let i = f.var_from(ptr, zero);
        let acc = f.new_var(types::I32);
        let fill = f.create_block();
        let start_sum = f.create_block();
        let sum = f.create_block();
        let exit = f.create_block();
        let last = i64::from(STACK_BYTES) - 1;

        f.ins().jump(fill, &[]);
        f.switch_to_block(fill);
        let n = f.use_var(i);
        let addr = f.ins().iadd(base, n);
        let byte = f.ins().ireduce(types::I8, n);
        store(&mut f, byte, addr, 0);
        let n = f.ins().iadd_imm(n, 1);
        f.def_var(i, n);
        let again = f.ins().icmp_imm(IntCC::SignedLessThanOrEqual, n, last);
        f.ins().brif(again, fill, &[], start_sum, &[]);

        f.switch_to_block(start_sum);
        let zero = f.ins().iconst(ptr, 0);
        f.def_var(i, zero);
        let zero = f.iconst32(0);
        f.def_var(acc, zero);
        f.ins().jump(sum, &[]);

        f.switch_to_block(sum);
        let n = f.use_var(i);
        let addr = f.ins().iadd(base, n);
        let byte = f.ins().uload8(types::I32, MemFlags::trusted(), addr, 0);
        let a = f.use_var(acc);
        let a = f.ins().iadd(a, byte);
        f.def_var(acc, a);
        let n = f.ins().iadd_imm(n, 1);
        f.def_var(i, n);
        let again = f.ins().icmp_imm(IntCC::SignedLessThanOrEqual, n, last);
        f.ins().brif(again, sum, &[], exit, &[]);

        f.switch_to_block(exit);
        let ret = f.use_var(acc);
        f.ins().return_(&[ret]);
        f.end_function()
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        let f: extern "C" fn() -> i32 = unsafe { entry.as_fn() };
        Verification::compare(f(), (0..STACK_BYTES as i32).sum(), ret_i32)
    }
}

/// Copies `count` 32-bit words in a loop that may run zero times.
struct AllocMemcpy;

const MEMCPY_COUNT: usize = 32;

impl TestCase for AllocMemcpy {
    fn name(&self) -> &str {
        "AllocMemcpy"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let ptr = cc.pointer_type();
        let sig = cc.signature(&[ptr, ptr, ptr], &[]);
        let mut f = cc.add_function("alloc_memcpy", &sig)?;
        let args = f.entry_args();
        let dst = f.var_from(ptr, args[0]);
        let src = f.var_from(ptr, args[1]);
        let cnt = f.var_from(ptr, args[2]);
        let body = f.create_block();
        let exit = f.create_block();

        let empty = f.ins().icmp_imm(IntCC::Equal, args[2], 0);
        f.ins().brif(empty, exit, &[], body, &[]);

        f.switch_to_block(body);
        let s = f.use_var(src);
        let d = f.use_var(dst);
        let word = load(&mut f, types::I32, s, 0);
        store(&mut f, word, d, 0);
        let s = f.ins().iadd_imm(s, 4);
        f.def_var(src, s);
        let d = f.ins().iadd_imm(d, 4);
        f.def_var(dst, d);
        let n = f.use_var(cnt);
        let n = f.ins().iadd_imm(n, -1);
        f.def_var(cnt, n);
        f.ins().brif(n, body, &[], exit, &[]);

        f.switch_to_block(exit);
        f.ins().return_(&[]);
        f.end_function()
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        let f: extern "C" fn(*mut i32, *const i32, usize) = unsafe { entry.as_fn() };
        let src: Vec<i32> = (0..MEMCPY_COUNT as i32).collect();
        let mut dst = vec![0i32; MEMCPY_COUNT];
        f(dst.as_mut_ptr(), src.as_ptr(), MEMCPY_COUNT);
        f(std::ptr::null_mut(), std::ptr::null(), 0);
        Verification::compare(dst, src, |v| format!("buf={}", braces(v)))
    }
}

/// The rarely taken arm lives in a block emitted after the return.
struct AllocExtraBlock;

impl TestCase for AllocExtraBlock {
    fn name(&self) -> &str {
        "AllocExtraBlock"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let sig = cc.signature(&[types::I32, types::I32, types::I32], &[types::I32]);
        let mut f = cc.add_function("alloc_extra_block", &sig)?;
        let args = f.entry_args();
        let (cond, a, b) = (args[0], args[1], args[2]);
        let ret = f.new_var(types::I32);
        let add = f.create_block();
        let done = f.create_block();
        let extra = f.create_block();

        f.ins().brif(cond, extra, &[], add, &[]);

        f.switch_to_block(add);
        let sum = f.ins().iadd(a, b);
        f.def_var(ret, sum);
        f.ins().jump(done, &[]);

        f.switch_to_block(done);
        let value = f.use_var(ret);
        f.ins().return_(&[value]);

        f.switch_to_block(extra);
        let diff = f.ins().isub(a, b);
        f.def_var(ret, diff);
        f.ins().jump(done, &[]);
        f.end_function()
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        let f: extern "C" fn(i32, i32, i32) -> i32 = unsafe { entry.as_fn() };
        let observed = [f(0, 4, 5), f(1, 4, 5)];
        Verification::compare(observed, [9, -1], |v| format!("ret={}", braces(v)))
    }
}
