use super::braces;
use crate::case::{TestCase, Verification};
use crate::registry::TestRegistry;
use cranelift_codegen::ir::{condcodes::IntCC, types, InstBuilder, MemFlags, Value};
use fj_core::Result;
use fj_jit::{Compiler, JitEntry};

pub(super) fn register(registry: &mut TestRegistry) {
    registry.add(FuncCallBase1);
    registry.add(FuncCallBase2);
    registry.add(FuncCallManyArgs);
    registry.add(FuncCallDuplicateArgs);
    registry.add(FuncCallImmArgs);
    registry.add(FuncCallPtrArgs);
    registry.add(FuncCallRefArgs);
    registry.add(FuncCallFloatAsXmmRet);
    registry.add(FuncCallDoubleAsXmmRet);
    registry.add(FuncCallConditional);
    registry.add(FuncCallMultiple);
    registry.add(FuncCallRecursive);
    registry.add(FuncCallMisc1);
    registry.add(FuncCallMisc2);
    registry.add(FuncCallMisc3);
    registry.add(FuncCallMisc4);
    registry.add(FuncCallMisc5);
}

fn ret_i32(v: &i32) -> String {
    format!("ret={v}")
}

fn ret_f64(v: &f64) -> String {
    format!("ret={v}")
}

extern "C" fn add_mul(a: i32, b: i32, c: i32) -> i32 {
    (a + b) * c
}

/// Arguments are shuffled on the way to the host.
struct FuncCallBase1;

impl TestCase for FuncCallBase1 {
    fn name(&self) -> &str {
        "FuncCallBase1"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let sig = cc.signature(&[types::I32; 3], &[types::I32]);
        let host = sig.clone();
        let mut f = cc.add_function("func_call_base1", &sig)?;
        let args = f.entry_args();
        let doubled: Vec<Value> = args.iter().map(|v| f.ins().ishl_imm(*v, 1)).collect();
        let address = add_mul as extern "C" fn(i32, i32, i32) -> i32 as usize;
        let ret = f.call_host(address, host, &[doubled[2], doubled[1], doubled[0]]);
        f.ins().return_(&ret);
        f.end_function()
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        let f: extern "C" fn(i32, i32, i32) -> i32 = unsafe { entry.as_fn() };
        Verification::compare(f(3, 2, 1), add_mul(2, 4, 6), ret_i32)
    }
}

const TOKEN_SIZE: usize = 32;
static TOKEN: [u8; TOKEN_SIZE] = *b"-+:|abcdefghijklmnopqrstuvwxyz|\0";

extern "C" fn copy_bytes(dst: *mut u8, src: *const u8, len: usize) -> *mut u8 {
    unsafe { std::ptr::copy_nonoverlapping(src, dst, len) };
    dst
}

extern "C" fn compare_bytes(a: *const u8, b: *const u8, len: usize) -> i32 {
    let (a, b) = unsafe { (std::slice::from_raw_parts(a, len), std::slice::from_raw_parts(b, len)) };
    i32::from(a != b)
}

/// Two stack buffers filled and compared by host calls. Returns zero when
/// the copies match and the buffers are distinct.
struct FuncCallBase2;

impl TestCase for FuncCallBase2 {
    fn name(&self) -> &str {
        "FuncCallBase2"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let ptr = cc.pointer_type();
        let sig = cc.signature(&[], &[types::I32]);
        let copy_sig = cc.signature(&[ptr, ptr, ptr], &[ptr]);
        let compare_sig = cc.signature(&[ptr, ptr, ptr], &[types::I32]);
        let mut f = cc.add_function("func_call_base2", &sig)?;
        f.entry_args();
        let exit = f.create_block();
        let same_check = f.create_block();
        f.append_block_param(exit, types::I32);

        let s1 = f.stack_slot(TOKEN_SIZE as u32, 16);
        let s2 = f.stack_slot(TOKEN_SIZE as u32, 16);
        let p1 = f.ins().stack_addr(ptr, s1, 0);
        let p2 = f.ins().stack_addr(ptr, s2, 0);
        let token = f.ins().iconst(ptr, TOKEN.as_ptr() as i64);
        let len = f.ins().iconst(ptr, TOKEN_SIZE as i64);

        let copy = copy_bytes as extern "C" fn(*mut u8, *const u8, usize) -> *mut u8 as usize;
        let compare = compare_bytes as extern "C" fn(*const u8, *const u8, usize) -> i32 as usize;
        f.call_host(copy, copy_sig.clone(), &[p1, token, len]);
        f.call_host(copy, copy_sig, &[p2, token, len]);
        let ret = f.call_host(compare, compare_sig, &[p1, p2, len]);
        f.ins().brif(ret[0], exit, &[ret[0]], same_check, &[]);

        f.switch_to_block(same_check);
        let same = f.ins().icmp(IntCC::Equal, p1, p2);
        let same = f.ins().uextend(types::I32, same);
        f.ins().jump(exit, &[same]);

        f.switch_to_block(exit);
        let ret = f.block_params(exit)[0];
        f.ins().return_(&[ret]);
        f.end_function()
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        let f: extern "C" fn() -> i32 = unsafe { entry.as_fn() };
        Verification::compare(f(), 0, ret_i32)
    }
}

extern "C" fn many_args(a: i32, b: i32, c: i32, d: i32, e: i32, f: i32, g: i32, h: i32, i: i32, j: i32) -> i32 {
    a * b * c * d * e + f * g * h * i * j
}

type ManyArgsFn = extern "C" fn(i32, i32, i32, i32, i32, i32, i32, i32, i32, i32) -> i32;

const MANY_ARGS: [i32; 10] = [0x03, 0x12, 0xA0, 0x0B, 0x2F, 0x02, 0x0C, 0x12, 0x18, 0x1E];

fn many_args_expected(v: [i32; 10]) -> i32 {
    many_args(v[0], v[1], v[2], v[3], v[4], v[5], v[6], v[7], v[8], v[9])
}

enum ArgSource {
    /// Each argument lives in its own variable.
    Vars,
    /// Every argument is the same variable.
    Duplicate,
    /// Arguments are immediates materialized at the call.
    Immediates,
}

fn emit_many_args(cc: &mut Compiler<'_, '_>, name: &str, source: ArgSource) -> Result<()> {
    let sig = cc.signature(&[], &[types::I32]);
    let host = cc.signature(&[types::I32; 10], &[types::I32]);
    let mut f = cc.add_function(name, &sig)?;
    f.entry_args();
    let args: Vec<Value> = match source {
        ArgSource::Vars => {
            let vars: Vec<_> = MANY_ARGS
                .iter()
                .map(|v| {
                    let value = f.iconst32(*v);
                    f.var_from(types::I32, value)
                })
                .collect();
            vars.into_iter().map(|var| f.use_var(var)).collect()
        }
        ArgSource::Duplicate => {
            let three = f.iconst32(3);
            let var = f.var_from(types::I32, three);
            let value = f.use_var(var);
            vec![value; 10]
        }
        ArgSource::Immediates => MANY_ARGS.iter().map(|v| f.iconst32(*v)).collect(),
    };
    let ret = f.call_host(many_args as ManyArgsFn as usize, host, &args);
    f.ins().return_(&ret);
    f.end_function()
}

fn verify_const(entry: JitEntry<'_>, expected: i32) -> Verification {
    let f: extern "C" fn() -> i32 = unsafe { entry.as_fn() };
    Verification::compare(f(), expected, ret_i32)
}

struct FuncCallManyArgs;

impl TestCase for FuncCallManyArgs {
    fn name(&self) -> &str {
        "FuncCallManyArgs"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        emit_many_args(cc, "func_call_many_args", ArgSource::Vars)
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        verify_const(entry, many_args_expected(MANY_ARGS))
    }
}

struct FuncCallDuplicateArgs;

impl TestCase for FuncCallDuplicateArgs {
    fn name(&self) -> &str {
        "FuncCallDuplicateArgs"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        emit_many_args(cc, "func_call_duplicate_args", ArgSource::Duplicate)
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        verify_const(entry, many_args_expected([3; 10]))
    }
}

struct FuncCallImmArgs;

impl TestCase for FuncCallImmArgs {
    fn name(&self) -> &str {
        "FuncCallImmArgs"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        emit_many_args(cc, "func_call_imm_args", ArgSource::Immediates)
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        verify_const(entry, many_args_expected(MANY_ARGS))
    }
}

extern "C" fn sum_pointers(
    a: usize,
    b: usize,
    c: usize,
    d: usize,
    e: usize,
    f: usize,
    g: usize,
    h: usize,
    i: usize,
    j: usize,
) -> i32 {
    (a + b + c + d + e + f + g + h + i + j) as i32
}

type PtrArgsFn = extern "C" fn(usize, usize, usize, usize, usize, usize, usize, usize, usize, usize) -> i32;

/// Pointer-sized immediates passed through ten argument slots.
struct FuncCallPtrArgs;

impl TestCase for FuncCallPtrArgs {
    fn name(&self) -> &str {
        "FuncCallPtrArgs"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let ptr = cc.pointer_type();
        let sig = cc.signature(&[], &[types::I32]);
        let host = cc.signature(&[ptr; 10], &[types::I32]);
        let mut f = cc.add_function("func_call_ptr_args", &sig)?;
        f.entry_args();
        let args: Vec<Value> = (1..=10i64).map(|i| f.ins().iconst(ptr, i)).collect();
        let ret = f.call_host(sum_pointers as PtrArgsFn as usize, host, &args);
        f.ins().return_(&ret);
        f.end_function()
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        verify_const(entry, sum_pointers(1, 2, 3, 4, 5, 6, 7, 8, 9, 10))
    }
}

extern "C" fn double_in_place(a: &mut i32, b: &mut i32, c: &mut i32, d: &mut i32) -> i32 {
    *a *= 2;
    *b *= 2;
    *c *= 2;
    *d *= 2;
    *a + *b + *c + *d
}

type RefArgsFn = extern "C" fn(&mut i32, &mut i32, &mut i32, &mut i32) -> i32;

/// Caller's references forwarded to a host function that writes through them.
struct FuncCallRefArgs;

impl TestCase for FuncCallRefArgs {
    fn name(&self) -> &str {
        "FuncCallRefArgs"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let ptr = cc.pointer_type();
        let sig = cc.signature(&[ptr; 4], &[types::I32]);
        let host = sig.clone();
        let mut f = cc.add_function("func_call_ref_args", &sig)?;
        let args = f.entry_args();
        let ret = f.call_host(double_in_place as RefArgsFn as usize, host, &args);
        f.ins().return_(&ret);
        f.end_function()
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        let f: RefArgsFn = unsafe { entry.as_fn() };
        let mut inputs = [1, 2, 3, 4];
        let [a, b, c, d] = &mut inputs;
        let ret = f(a, b, c, d);
        Verification::compare((ret, inputs), (20, [2, 4, 6, 8]), |(ret, inputs)| {
            format!("ret={ret} args={}", braces(inputs))
        })
    }
}

extern "C" fn mul_f32(a: f32, b: f32) -> f32 {
    a * b
}

extern "C" fn mul_f64(a: f64, b: f64) -> f64 {
    a * b
}

/// Floating point result handed straight back from a host call.
struct FuncCallFloatAsXmmRet;

impl TestCase for FuncCallFloatAsXmmRet {
    fn name(&self) -> &str {
        "FuncCallFloatAsXmmRet"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let sig = cc.signature(&[types::F32, types::F32], &[types::F32]);
        let host = sig.clone();
        let mut f = cc.add_function("func_call_float_ret", &sig)?;
        let args = f.entry_args();
        let ret = f.call_host(mul_f32 as extern "C" fn(f32, f32) -> f32 as usize, host, &args);
        f.ins().return_(&ret);
        f.end_function()
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        let f: extern "C" fn(f32, f32) -> f32 = unsafe { entry.as_fn() };
        Verification::compare(f(15.5, 2.0), 31.0, |v| format!("ret={v}"))
    }
}

struct FuncCallDoubleAsXmmRet;

impl TestCase for FuncCallDoubleAsXmmRet {
    fn name(&self) -> &str {
        "FuncCallDoubleAsXmmRet"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let sig = cc.signature(&[types::F64, types::F64], &[types::F64]);
        let host = sig.clone();
        let mut f = cc.add_function("func_call_double_ret", &sig)?;
        let args = f.entry_args();
        let ret = f.call_host(mul_f64 as extern "C" fn(f64, f64) -> f64 as usize, host, &args);
        f.ins().return_(&ret);
        f.end_function()
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        let f: extern "C" fn(f64, f64) -> f64 = unsafe { entry.as_fn() };
        Verification::compare(f(15.5, 2.0), 31.0, ret_f64)
    }
}

extern "C" fn add_i32(a: i32, b: i32) -> i32 {
    a + b
}

extern "C" fn mul_i32(a: i32, b: i32) -> i32 {
    a * b
}

type BinaryFn = extern "C" fn(i32, i32) -> i32;

/// Picks which host function to call from an operator argument.
struct FuncCallConditional;

impl TestCase for FuncCallConditional {
    fn name(&self) -> &str {
        "FuncCallConditional"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let sig = cc.signature(&[types::I32; 3], &[types::I32]);
        let host = cc.signature(&[types::I32; 2], &[types::I32]);
        let mut f = cc.add_function("func_call_conditional", &sig)?;
        let args = f.entry_args();
        let (x, y, op) = (args[0], args[1], args[2]);
        let add = f.create_block();
        let check_mul = f.create_block();
        let mul = f.create_block();
        let zero = f.create_block();

        let is_add = f.ins().icmp_imm(IntCC::Equal, op, 0);
        f.ins().brif(is_add, add, &[], check_mul, &[]);

        f.switch_to_block(check_mul);
        let is_mul = f.ins().icmp_imm(IntCC::Equal, op, 1);
        f.ins().brif(is_mul, mul, &[], zero, &[]);

        f.switch_to_block(zero);
        let ret = f.iconst32(0);
        f.ins().return_(&[ret]);

        for (block, target) in [(add, add_i32 as BinaryFn), (mul, mul_i32 as BinaryFn)] {
            f.switch_to_block(block);
            let ret = f.call_host(target as usize, host.clone(), &[x, y]);
            f.ins().return_(&ret);
        }
        f.end_function()
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        let f: extern "C" fn(i32, i32, i32) -> i32 = unsafe { entry.as_fn() };
        let observed = [f(4, 8, 0), f(4, 8, 1), f(4, 8, 2)];
        Verification::compare(observed, [add_i32(4, 8), mul_i32(4, 8), 0], |v| {
            format!("ret={}", braces(v))
        })
    }
}

extern "C" fn pick(buf: *const i32, index: i32) -> i32 {
    unsafe { *buf.add(index as usize) }
}

/// Back to back host calls feeding two accumulators.
struct FuncCallMultiple;

const MULTIPLE_BUF: [i32; 4] = [127, 87, 23, 17];

impl TestCase for FuncCallMultiple {
    fn name(&self) -> &str {
        "FuncCallMultiple"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let ptr = cc.pointer_type();
        let sig = cc.signature(&[ptr], &[types::I32]);
        let host = cc.signature(&[ptr, types::I32], &[types::I32]);
        let mut f = cc.add_function("func_call_multiple", &sig)?;
        let args = f.entry_args();
        let zero = f.iconst32(0);
        let acc0 = f.var_from(types::I32, zero);
        let acc1 = f.var_from(types::I32, zero);
        let address = pick as extern "C" fn(*const i32, i32) -> i32 as usize;

        for index in 0..MULTIPLE_BUF.len() as i32 {
            let idx = f.iconst32(index);
            let ret = f.call_host(address, host.clone(), &[args[0], idx]);
            let a = f.use_var(acc0);
            let a = f.ins().iadd(a, ret[0]);
            f.def_var(acc0, a);

            let ret = f.call_host(address, host.clone(), &[args[0], idx]);
            let b = f.use_var(acc1);
            let b = f.ins().isub(b, ret[0]);
            f.def_var(acc1, b);
        }
        let a = f.use_var(acc0);
        let b = f.use_var(acc1);
        let ret = f.ins().iadd(a, b);
        f.ins().return_(&[ret]);
        f.end_function()
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        let f: extern "C" fn(*const i32) -> i32 = unsafe { entry.as_fn() };
        Verification::compare(f(MULTIPLE_BUF.as_ptr()), 0, ret_i32)
    }
}

/// Factorial calling itself directly.
struct FuncCallRecursive;

impl TestCase for FuncCallRecursive {
    fn name(&self) -> &str {
        "FuncCallRecursive"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let sig = cc.signature(&[types::I32], &[types::I32]);
        let decl = cc.declare_function("factorial", &sig)?;
        let mut f = cc.begin_function(&decl)?;
        let args = f.entry_args();
        let val = args[0];
        let result = f.var_from(types::I32, val);
        let recurse = f.create_block();
        let done = f.create_block();

        let small = f.ins().icmp_imm(IntCC::SignedLessThanOrEqual, val, 1);
        f.ins().brif(small, done, &[], recurse, &[]);

        f.switch_to_block(recurse);
        let n = f.ins().iadd_imm(val, -1);
        let ret = f.call(&decl, &[n]);
        let product = f.ins().imul(val, ret[0]);
        f.def_var(result, product);
        f.ins().jump(done, &[]);

        f.switch_to_block(done);
        let ret = f.use_var(result);
        f.ins().return_(&[ret]);
        f.end_function()
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        let f: extern "C" fn(i32) -> i32 = unsafe { entry.as_fn() };
        Verification::compare(f(5), (1..=5).product(), ret_i32)
    }
}

extern "C" fn ignore_pair(_a: i32, _b: i32) {}

/// Arguments stay live across a call that returns nothing.
struct FuncCallMisc1;

impl TestCase for FuncCallMisc1 {
    fn name(&self) -> &str {
        "FuncCallMisc1"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let sig = cc.signature(&[types::I32; 2], &[types::I32]);
        let host = cc.signature(&[types::I32; 2], &[]);
        let mut f = cc.add_function("func_call_misc1", &sig)?;
        let args = f.entry_args();
        let address = ignore_pair as extern "C" fn(i32, i32) as usize;
        f.call_host(address, host, &[args[0], args[1]]);
        let ret = f.ins().iadd(args[0], args[1]);
        f.ins().return_(&[ret]);
        f.end_function()
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        let f: extern "C" fn(i32, i32) -> i32 = unsafe { entry.as_fn() };
        Verification::compare(f(44, 199), 243, ret_i32)
    }
}

extern "C" fn square(x: f64) -> f64 {
    x * x
}

fn emit_square(cc: &mut Compiler<'_, '_>, name: &str, negate: bool) -> Result<()> {
    let ptr = cc.pointer_type();
    let sig = cc.signature(&[ptr], &[types::F64]);
    let host = cc.signature(&[types::F64], &[types::F64]);
    let mut f = cc.add_function(name, &sig)?;
    let args = f.entry_args();
    let arg = f.ins().load(types::F64, MemFlags::trusted(), args[0], 0);
    let ret = f.call_host(square as extern "C" fn(f64) -> f64 as usize, host, &[arg]);
    let mut ret = ret[0];
    if negate {
        let zero = f.ins().f64const(0.0);
        ret = f.ins().fsub(zero, ret);
    }
    f.ins().return_(&[ret]);
    f.end_function()
}

/// Double loaded from memory, squared by the host.
struct FuncCallMisc2;

impl TestCase for FuncCallMisc2 {
    fn name(&self) -> &str {
        "FuncCallMisc2"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        emit_square(cc, "func_call_misc2", false)
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        let f: extern "C" fn(*const f64) -> f64 = unsafe { entry.as_fn() };
        let arg = 2.0;
        Verification::compare(f(&arg), square(arg), ret_f64)
    }
}

/// Like [`FuncCallMisc2`], negated after the call.
struct FuncCallMisc3;

impl TestCase for FuncCallMisc3 {
    fn name(&self) -> &str {
        "FuncCallMisc3"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        emit_square(cc, "func_call_misc3", true)
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        let f: extern "C" fn(*const f64) -> f64 = unsafe { entry.as_fn() };
        let arg = 2.0;
        Verification::compare(f(&arg), -square(arg), ret_f64)
    }
}

extern "C" fn host_constant() -> f64 {
    42.25
}

/// Host result returned without touching it.
struct FuncCallMisc4;

impl TestCase for FuncCallMisc4 {
    fn name(&self) -> &str {
        "FuncCallMisc4"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let sig = cc.signature(&[], &[types::F64]);
        let host = sig.clone();
        let mut f = cc.add_function("func_call_misc4", &sig)?;
        f.entry_args();
        let ret = f.call_host(host_constant as extern "C" fn() -> f64 as usize, host, &[]);
        f.ins().return_(&ret);
        f.end_function()
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        let f: extern "C" fn() -> f64 = unsafe { entry.as_fn() };
        Verification::compare(f(), host_constant(), ret_f64)
    }
}

extern "C" fn do_nothing() {}

const MISC5_VARS: i32 = 14;

/// Many live values across an indirect call through a register.
struct FuncCallMisc5;

impl TestCase for FuncCallMisc5 {
    fn name(&self) -> &str {
        "FuncCallMisc5"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let ptr = cc.pointer_type();
        let sig = cc.signature(&[], &[types::I32]);
        let host = cc.signature(&[], &[]);
        let mut f = cc.add_function("func_call_misc5", &sig)?;
        f.entry_args();
        let callee = f.ins().iconst(ptr, do_nothing as extern "C" fn() as usize as i64);
        let vars: Vec<_> = (0..MISC5_VARS)
            .map(|_| {
                let one = f.iconst32(1);
                f.var_from(types::I32, one)
            })
            .collect();
        f.call_ptr(callee, host, &[]);

        let mut sum = f.iconst32(0);
        for var in vars {
            let v = f.use_var(var);
            sum = f.ins().iadd(sum, v);
        }
        f.ins().return_(&[sum]);
        f.end_function()
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        let f: extern "C" fn() -> i32 = unsafe { entry.as_fn() };
        Verification::compare(f(), MISC5_VARS, ret_i32)
    }
}
