use crate::case::{TestCase, Verification};
use crate::invoke::{call_u32, MAX_ARGS};
use crate::registry::TestRegistry;
use cranelift_codegen::ir::{types, InstBuilder};
use fj_core::Result;
use fj_jit::{Compiler, JitEntry, TargetOptions};

pub(super) fn register(registry: &mut TestRegistry) {
    registry.add(NoCode);
    registry.add(NoAlign);
    for num_args in 0..=MAX_ARGS as u32 {
        for alignment in [8, 16] {
            for preserve_fp in [false, true] {
                registry.add(AlignBase::new(num_args, alignment, preserve_fp));
            }
        }
    }
}

/// Empty void function.
struct NoCode;

impl TestCase for NoCode {
    fn name(&self) -> &str {
        "NoCode"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let sig = cc.signature(&[], &[]);
        cc.add_function("no_code", &sig)?.end_function()
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        let f: extern "C" fn() = unsafe { entry.as_fn() };
        f();
        Verification::unit()
    }
}

/// Void function with an explicit entry block and nothing in it.
struct NoAlign;

impl TestCase for NoAlign {
    fn name(&self) -> &str {
        "NoAlign"
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let sig = cc.signature(&[], &[]);
        let mut f = cc.add_function("no_align", &sig)?;
        f.entry_args();
        f.end_function()
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        let f: extern "C" fn() = unsafe { entry.as_fn() };
        f();
        Verification::unit()
    }
}

/// Takes `num_args` integers, returns their sum OR'd with the low bits of an
/// aligned stack slot's address. Any misalignment shows up in the result.
struct AlignBase {
    num_args: u32,
    alignment: u32,
    preserve_fp: bool,
    name: String,
}

impl AlignBase {
    fn new(num_args: u32, alignment: u32, preserve_fp: bool) -> Self {
        let name = format!(
            "AlignBase {{NumArgs={} Alignment={} PreserveFP={}}}",
            num_args,
            alignment,
            if preserve_fp { 'Y' } else { 'N' }
        );
        Self {
            num_args,
            alignment,
            preserve_fp,
            name,
        }
    }
}

impl TestCase for AlignBase {
    fn name(&self) -> &str {
        &self.name
    }

    fn configure_target(&self, options: &mut TargetOptions) {
        options.preserve_frame_pointers = self.preserve_fp;
    }

    fn emit(&self, cc: &mut Compiler<'_, '_>) -> Result<()> {
        let params = vec![types::I32; self.num_args as usize];
        let sig = cc.signature(&params, &[types::I32]);
        let mut f = cc.add_function("align_base", &sig)?;
        let args = f.entry_args();
        let ptr = f.pointer_type();

        let slot = f.stack_slot(self.alignment, self.alignment);
        let addr = f.ins().stack_addr(ptr, slot, 0);
        let mut masked = f.ins().band_imm(addr, i64::from(self.alignment - 1));
        if ptr != types::I32 {
            masked = f.ins().ireduce(types::I32, masked);
        }

        let mut sum = f.iconst32(0);
        for arg in args {
            sum = f.ins().iadd(sum, arg);
        }
        let ret = f.ins().bor(masked, sum);
        f.ins().return_(&[ret]);
        f.end_function()
    }

    fn verify(&self, entry: JitEntry<'_>) -> Verification {
        let args: Vec<u32> = (1..=self.num_args).collect();
        let expected: u32 = args.iter().sum();
        let observed = unsafe { call_u32(entry, &args) }.unwrap_or(u32::MAX);
        Verification::compare(observed, expected, |v| {
            format!("ret={{{}, {}}}", v >> 28, v & 0x0FFF_FFFF)
        })
    }
}
