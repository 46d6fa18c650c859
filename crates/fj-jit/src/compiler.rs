//! Emitter context handed to test bodies.
//!
//! [`Compiler`] declares and begins functions inside a [`CodeBuffer`].
//! [`FuncEmitter`] dereferences to Cranelift's [`FunctionBuilder`], so blocks
//! act as labels and `ins()` exposes the instruction set, with a few helpers on
//! top for variables, calls, stack slots and the constant pool.

use crate::buffer::{is_terminated, CodeBuffer, ErrorRoute, PendingFunction};
use cranelift_codegen::ir::{
    types, AbiParam, Block, Function, InstBuilder, MemFlags, Signature, StackSlot, StackSlotData,
    StackSlotKind, TrapCode, Type, UserFuncName, Value,
};
use cranelift_codegen::Context;
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext, Variable};
use cranelift_jit::JITModule;
use cranelift_module::{DataDescription, FuncId, Module};
use fj_core::{Error, ErrorCode, Result, Stage};
use std::ops::{Deref, DerefMut};

#[derive(Debug, Clone)]
pub struct FuncDecl {
    id: FuncId,
    name: String,
    signature: Signature,
}

impl FuncDecl {
    pub fn id(&self) -> FuncId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }
}

pub struct Compiler<'c, 'a> {
    buffer: &'c mut CodeBuffer<'a>,
}

impl<'c, 'a> Compiler<'c, 'a> {
    pub fn new(buffer: &'c mut CodeBuffer<'a>) -> Self {
        Self { buffer }
    }

    pub fn pointer_type(&self) -> Type {
        self.buffer.runtime().pointer_type()
    }

    /// Host calling convention signature. Integer parameters narrower than
    /// 32 bits are sign-extended as C expects.
    pub fn signature(&self, params: &[Type], returns: &[Type]) -> Signature {
        let mut sig = Signature::new(self.buffer.runtime().isa().default_call_conv());
        sig.params.extend(params.iter().copied().map(abi_param));
        sig.returns.extend(returns.iter().copied().map(abi_param));
        sig
    }

    /// Declares a function without defining it, so it can be called before
    /// its body is emitted.
    pub fn declare_function(&mut self, name: &str, signature: &Signature) -> Result<FuncDecl> {
        if self.buffer.is_finalized() {
            return Err(self.buffer.raise(
                ErrorCode::InvalidState,
                "cannot declare functions after finalize",
                Stage::Emit,
            ));
        }
        let id = self
            .buffer
            .runtime_mut()
            .module_mut()
            .declare_anonymous_function(signature)
            .map_err(|e| self.buffer.raise(ErrorCode::InvalidDeclaration, e.to_string(), Stage::Emit))?;
        let decl = FuncDecl {
            id,
            name: name.to_string(),
            signature: signature.clone(),
        };
        self.buffer.declared.push(decl.clone());
        Ok(decl)
    }

    /// Starts emitting the body of `decl`. The first function begun in a
    /// buffer is its entry point.
    pub fn begin_function(&mut self, decl: &FuncDecl) -> Result<FuncEmitter<'_>> {
        if self.buffer.is_finalized() {
            return Err(self.buffer.raise(
                ErrorCode::InvalidState,
                "cannot begin a function after finalize",
                Stage::Emit,
            ));
        }
        if self.buffer.functions.iter().any(|f| f.id == decl.id) {
            let message = format!("function `{}` was already begun", decl.name);
            return Err(self.buffer.raise(ErrorCode::InvalidDeclaration, message, Stage::Emit));
        }

        self.buffer
            .log(format_args!("; begin {} {}\n", decl.name, decl.signature));
        self.buffer.entry.get_or_insert(decl.id);

        let mut ctx = Context::new();
        ctx.func = Function::with_name_signature(UserFuncName::user(0, decl.id.as_u32()), decl.signature.clone());
        self.buffer.functions.push(PendingFunction {
            id: decl.id,
            name: decl.name.clone(),
            ctx,
            closed: false,
            poisoned: None,
        });
        // An abandoned function leaves the builder context dirty.
        self.buffer.builder_ctx = FunctionBuilderContext::new();

        let pointer_type = self.pointer_type();
        let CodeBuffer {
            runtime,
            errors,
            functions,
            builder_ctx,
            ..
        } = &mut *self.buffer;
        let Some(pending) = functions.last_mut() else {
            return Err(errors.raise(ErrorCode::InvalidState, "function list is empty", Stage::Emit));
        };
        Ok(FuncEmitter {
            builder: FunctionBuilder::new(&mut pending.ctx.func, builder_ctx),
            module: runtime.module_mut(),
            closed: &mut pending.closed,
            poisoned: &mut pending.poisoned,
            decl: decl.clone(),
            errors: errors.clone(),
            pointer_type,
            next_var: 0,
        })
    }

    /// Declares and begins a function in one step.
    pub fn add_function(&mut self, name: &str, signature: &Signature) -> Result<FuncEmitter<'_>> {
        let decl = self.declare_function(name, signature)?;
        self.begin_function(&decl)
    }
}

/// Fills a block that was abandoned without a terminator.
const ABANDONED_BLOCK: TrapCode = TrapCode::unwrap_user(1);

fn abi_param(ty: Type) -> AbiParam {
    if ty.is_int() && ty.bits() < 32 {
        AbiParam::new(ty).sext()
    } else {
        AbiParam::new(ty)
    }
}

/// Body of one function under construction.
pub struct FuncEmitter<'f> {
    builder: FunctionBuilder<'f>,
    module: &'f mut JITModule,
    closed: &'f mut bool,
    poisoned: &'f mut Option<String>,
    decl: FuncDecl,
    errors: ErrorRoute,
    pointer_type: Type,
    next_var: u32,
}

impl<'f> Deref for FuncEmitter<'f> {
    type Target = FunctionBuilder<'f>;

    fn deref(&self) -> &Self::Target {
        &self.builder
    }
}

impl<'f> DerefMut for FuncEmitter<'f> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.builder
    }
}

impl<'f> FuncEmitter<'f> {
    pub fn decl(&self) -> &FuncDecl {
        &self.decl
    }

    pub fn pointer_type(&self) -> Type {
        self.pointer_type
    }

    /// Creates the entry block, binds it to the function parameters and
    /// returns them.
    pub fn entry_args(&mut self) -> Vec<Value> {
        let block = self.builder.create_block();
        self.builder.append_block_params_for_function_params(block);
        self.builder.switch_to_block(block);
        self.builder.block_params(block).to_vec()
    }

    /// Moves emission to `block`.
    ///
    /// Shadows [`FunctionBuilder::switch_to_block`]. Leaving a block without a
    /// terminator, or re-entering a terminated one, is reported through the
    /// error handler and poisons the function so it is never compiled.
    pub fn switch_to_block(&mut self, block: Block) {
        if let Some(current) = self.builder.current_block() {
            if self.builder.func.layout.is_block_inserted(current) && !self.is_filled(current) {
                let message = format!("{current} in `{}` was left without a terminator", self.decl.name);
                self.poison(message);
                self.builder.ins().trap(ABANDONED_BLOCK);
            }
        }
        if self.is_filled(block) {
            let message = format!("{block} in `{}` is already terminated", self.decl.name);
            self.poison(message);
            let detached = self.builder.create_block();
            self.builder.switch_to_block(detached);
            return;
        }
        self.builder.switch_to_block(block);
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.is_some()
    }

    fn is_filled(&self, block: Block) -> bool {
        let func = &*self.builder.func;
        is_terminated(func, func.layout.last_inst(block))
    }

    fn poison(&mut self, message: String) {
        if self.poisoned.is_none() {
            self.errors.raise(ErrorCode::UnterminatedBlock, message.as_str(), Stage::Emit);
            *self.poisoned = Some(message);
        }
    }

    /// Fresh virtual register of type `ty`.
    pub fn new_var(&mut self, ty: Type) -> Variable {
        let var = Variable::from_u32(self.next_var);
        self.next_var += 1;
        self.builder.declare_var(var, ty);
        var
    }

    /// Virtual register initialised with `value`.
    pub fn var_from(&mut self, ty: Type, value: Value) -> Variable {
        let var = self.new_var(ty);
        self.builder.def_var(var, value);
        var
    }

    pub fn iconst32(&mut self, value: i32) -> Value {
        self.builder.ins().iconst(types::I32, i64::from(value))
    }

    /// Direct call to a function declared in the same buffer.
    pub fn call(&mut self, callee: &FuncDecl, args: &[Value]) -> Vec<Value> {
        let func_ref = self.module.declare_func_in_func(callee.id, self.builder.func);
        let call = self.builder.ins().call(func_ref, args);
        self.builder.inst_results(call).to_vec()
    }

    /// Indirect call through the absolute address of a host function.
    pub fn call_host(&mut self, address: usize, signature: Signature, args: &[Value]) -> Vec<Value> {
        let sig_ref = self.builder.import_signature(signature);
        let callee = self.builder.ins().iconst(self.pointer_type, address as i64);
        self.call_value(sig_ref, callee, args)
    }

    /// Indirect call through a pointer held in a register.
    pub fn call_ptr(&mut self, callee: Value, signature: Signature, args: &[Value]) -> Vec<Value> {
        let sig_ref = self.builder.import_signature(signature);
        self.call_value(sig_ref, callee, args)
    }

    fn call_value(
        &mut self,
        sig_ref: cranelift_codegen::ir::SigRef,
        callee: Value,
        args: &[Value],
    ) -> Vec<Value> {
        let call = self.builder.ins().call_indirect(sig_ref, callee, args);
        self.builder.inst_results(call).to_vec()
    }

    pub fn stack_slot(&mut self, size: u32, align: u32) -> StackSlot {
        let align_shift = align.max(1).next_power_of_two().trailing_zeros() as u8;
        self.builder
            .create_sized_stack_slot(StackSlotData::new(StackSlotKind::ExplicitSlot, size, align_shift))
    }

    /// Loads `bytes` from a read-only constant pool entry.
    pub fn constant(&mut self, ty: Type, bytes: &[u8]) -> Result<Value> {
        let data = self
            .module
            .declare_anonymous_data(false, false)
            .map_err(|e| self.errors.raise(ErrorCode::InvalidDeclaration, e.to_string(), Stage::Emit))?;
        let mut desc = DataDescription::new();
        desc.define(bytes.to_vec().into_boxed_slice());
        desc.set_align(u64::from(ty.bytes().max(1)));
        self.module
            .define_data(data, &desc)
            .map_err(|e| self.errors.raise(ErrorCode::InvalidDeclaration, e.to_string(), Stage::Emit))?;

        let gv = self.module.declare_data_in_func(data, self.builder.func);
        let addr = self.builder.ins().global_value(self.pointer_type, gv);
        Ok(self.builder.ins().load(ty, MemFlags::trusted().with_readonly(), addr, 0))
    }

    pub fn const_i32(&mut self, value: i32) -> Result<Value> {
        self.constant(types::I32, &value.to_ne_bytes())
    }

    pub fn const_f64(&mut self, value: f64) -> Result<Value> {
        self.constant(types::F64, &value.to_ne_bytes())
    }

    /// Closes the function. A void function whose last block falls through
    /// gets an implicit return.
    pub fn end_function(mut self) -> Result<()> {
        let name = self.decl.name.clone();
        if let Some(message) = self.poisoned.clone() {
            return Err(Error::emitter(ErrorCode::UnterminatedBlock, message, Stage::Emit));
        }
        let returns_void = self.builder.func.signature.returns.is_empty();
        match self.builder.current_block() {
            None if returns_void => {
                let block = self.builder.create_block();
                self.builder.append_block_params_for_function_params(block);
                self.builder.switch_to_block(block);
                self.builder.ins().return_(&[]);
            }
            None => {
                let message = format!("function `{name}` has no body");
                return Err(self.errors.raise(ErrorCode::EmptyFunction, message, Stage::Emit));
            }
            Some(block) if self.is_filled(block) => {}
            Some(_) if returns_void => {
                self.builder.ins().return_(&[]);
            }
            Some(block) if !self.builder.func.layout.is_block_inserted(block) => {}
            Some(block) => {
                let message = format!("{block} in `{name}` falls off the end of the function");
                return Err(self.errors.raise(ErrorCode::UnterminatedBlock, message, Stage::Emit));
            }
        }

        let func = &*self.builder.func;
        if let Some(block) = func
            .layout
            .blocks()
            .find(|block| !is_terminated(func, func.layout.last_inst(*block)))
        {
            let message = format!("{block} in `{name}` has no terminator");
            return Err(self.errors.raise(ErrorCode::UnterminatedBlock, message, Stage::Emit));
        }

        let FuncEmitter {
            mut builder,
            closed,
            ..
        } = self;
        builder.seal_all_blocks();
        builder.finalize();
        *closed = true;
        Ok(())
    }
}
