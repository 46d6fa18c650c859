use super::braces;
use crate::case::{TestCase, Verification};
use crate::registry::TestRegistry;
use cranelift_codegen::ir::{condcodes::IntCC, types, InstBuilder, MemFlags};
use fj_core::Result;
use fj_jit::{Compiler, JitEntry};

pub(super) fn register(registry: &mut TestRegistry) {
    registry.add(JumpMerge);
    registry.add(JumpCross);
    registry.add(JumpMany);
    registry.add(JumpUnreachable1);
    registry.add(JumpUnreachable2);
}

fn call_void(entry: JitEntry<'_>) -> Verification {
    let f: extern "C" fn() = unsafe { entry.as_fn() };
    f();
    Verification::unit()
}

/// Three labels bound back to back, each targeted by its own branch.
struct JumpMerge;

impl TestCase for JumpMerge {
    fn name(&self) -> &str {
        "JumpMerge"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let ptr = cc.pointer_type();
        let sig = cc.signature(&[ptr, types::I32], &[]);
        let mut f = cc.add_function("jump_merge", &sig)?;
        let args = f.entry_args();
        let (dst, val) = (args[0], args[1]);

        let l0 = f.create_block();
        let l1 = f.create_block();
        let l2 = f.create_block();
        let check1 = f.create_block();
        let check2 = f.create_block();
        let store = f.create_block();
        let exit = f.create_block();

        let c = f.ins().icmp_imm(IntCC::Equal, val, 0);
        f.ins().brif(c, l0, &[], check1, &[]);

        f.switch_to_block(check1);
        let c = f.ins().icmp_imm(IntCC::Equal, val, 1);
        f.ins().brif(c, l1, &[], check2, &[]);

        f.switch_to_block(check2);
        let c = f.ins().icmp_imm(IntCC::Equal, val, 2);
        f.ins().brif(c, l2, &[], store, &[]);

        f.switch_to_block(store);
        f.ins().store(MemFlags::trusted(), val, dst, 0);
        f.ins().jump(exit, &[]);

        f.switch_to_block(l0);
        f.ins().jump(l1, &[]);
        f.switch_to_block(l1);
        f.ins().jump(l2, &[]);
        f.switch_to_block(l2);
        let zero = f.iconst32(0);
        f.ins().store(MemFlags::trusted(), zero, dst, 0);
        f.ins().jump(exit, &[]);

        f.switch_to_block(exit);
        f.ins().return_(&[]);
        f.end_function()
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        let f: extern "C" fn(*mut i32, i32) = unsafe { entry.as_fn() };
        let mut arr = [-1i32; 5];
        for (i, slot) in arr.iter_mut().enumerate() {
            f(slot, i as i32);
        }
        Verification::compare(arr, [0, 0, 0, 3, 4], |v| format!("ret={}", braces(v)))
    }
}

/// Jumps that cross each other before reaching the exit.
struct JumpCross;

impl TestCase for JumpCross {
    fn name(&self) -> &str {
        "JumpCross"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let sig = cc.signature(&[], &[]);
        let mut f = cc.add_function("jump_cross", &sig)?;
        f.entry_args();
        let l1 = f.create_block();
        let l2 = f.create_block();
        let l3 = f.create_block();

        f.ins().jump(l2, &[]);
        f.switch_to_block(l1);
        f.ins().jump(l3, &[]);
        f.switch_to_block(l2);
        f.ins().jump(l1, &[]);
        f.switch_to_block(l3);
        f.ins().return_(&[]);
        f.end_function()
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        call_void(entry)
    }
}

/// A thousand jumps, each to the block right after it.
struct JumpMany;

const MANY_JUMPS: usize = 1000;

impl TestCase for JumpMany {
    fn name(&self) -> &str {
        "JumpMany"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let sig = cc.signature(&[], &[types::I32]);
        let mut f = cc.add_function("jump_many", &sig)?;
        f.entry_args();
        for _ in 0..MANY_JUMPS {
            let next = f.create_block();
            f.ins().jump(next, &[]);
            f.switch_to_block(next);
        }
        let ret = f.iconst32(0);
        f.ins().return_(&[ret]);
        f.end_function()
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        let f: extern "C" fn() -> i32 = unsafe { entry.as_fn() };
        Verification::compare(f(), 0, |v| format!("ret={{{v}}}"))
    }
}

/// Several blocks nothing jumps to, mixed with reachable ones. Variables
/// read in unreachable code were never written.
struct JumpUnreachable1;

impl TestCase for JumpUnreachable1 {
    fn name(&self) -> &str {
        "JumpUnreachable1"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let sig = cc.signature(&[], &[]);
        let mut f = cc.add_function("jump_unreachable1", &sig)?;
        f.entry_args();
        let v0 = f.new_var(types::I32);
        let v1 = f.new_var(types::I32);

        let l1 = f.create_block();
        let l2 = f.create_block();
        let l3 = f.create_block();
        let l4 = f.create_block();
        let l5 = f.create_block();
        let l6 = f.create_block();
        let l7 = f.create_block();
        let dead = f.create_block();

        f.ins().jump(l2, &[]);

        f.switch_to_block(l5);
        let zero = f.iconst32(0);
        f.def_var(v0, zero);
        f.ins().jump(l6, &[]);

        f.switch_to_block(l6);
        f.ins().jump(l3, &[]);

        f.switch_to_block(dead);
        let one = f.iconst32(1);
        f.def_var(v1, one);
        f.ins().jump(l1, &[]);

        f.switch_to_block(l4);
        f.ins().jump(l2, &[]);

        f.switch_to_block(l7);
        let a = f.use_var(v0);
        let b = f.use_var(v1);
        let sum = f.ins().iadd(a, b);
        f.def_var(v0, sum);
        f.ins().jump(l1, &[]);

        f.switch_to_block(l2);
        f.ins().jump(l3, &[]);

        f.switch_to_block(l3);
        f.ins().jump(l1, &[]);

        f.switch_to_block(l1);
        f.ins().return_(&[]);
        f.end_function()
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        call_void(entry)
    }
}

/// An unreachable block that loops back into itself.
struct JumpUnreachable2;

impl TestCase for JumpUnreachable2 {
    fn name(&self) -> &str {
        "JumpUnreachable2"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let sig = cc.signature(&[], &[]);
        let mut f = cc.add_function("jump_unreachable2", &sig)?;
        f.entry_args();
        let l1 = f.create_block();
        let l2 = f.create_block();
        let fallthrough = f.create_block();

        f.ins().jump(l1, &[]);

        f.switch_to_block(l2);
        let a = f.iconst32(1);
        let b = f.iconst32(2);
        let c = f.ins().icmp(IntCC::Equal, a, b);
        f.ins().brif(c, l2, &[], fallthrough, &[]);

        f.switch_to_block(fallthrough);
        f.ins().jump(l1, &[]);

        f.switch_to_block(l1);
        f.ins().return_(&[]);
        f.end_function()
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        call_void(entry)
    }
}
