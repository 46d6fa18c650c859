//! End-to-end tests for the emitter, code buffer and runtime.

use cranelift_codegen::ir::{types, InstBuilder};
use fj_core::{ErrorCode, ErrorCollector};
use fj_jit::{CodeBuffer, Compiler, JitRuntime, TargetOptions};
use std::cell::RefCell;
use std::rc::Rc;

fn runtime() -> JitRuntime {
    JitRuntime::new(&TargetOptions::default()).expect("host runtime")
}

fn emit_const(buffer: &mut CodeBuffer<'_>, value: i32) {
    let mut cc = Compiler::new(buffer);
    let sig = cc.signature(&[], &[types::I32]);
    let mut f = cc.add_function("const", &sig).expect("add function");
    f.entry_args();
    let v = f.iconst32(value);
    f.ins().return_(&[v]);
    f.end_function().expect("end function");
}

#[test]
fn constant_function_loads_and_runs() -> eyre::Result<()> {
    let mut rt = runtime();
    let code = {
        let mut buffer = CodeBuffer::new(&mut rt);
        emit_const(&mut buffer, 42);
        buffer.finalize()?
    };
    assert!(code.code_size() > 0);
    assert_eq!(code.functions().len(), 1);

    let function = rt.load(&code)?;
    let f: extern "C" fn() -> i32 = unsafe { function.entry().as_fn() };
    assert_eq!(f(), 42);
    assert_eq!(rt.live(), 1);

    rt.release(function)?;
    assert_eq!(rt.live(), 0);
    assert_eq!(rt.stats().loads, 1);
    assert_eq!(rt.stats().releases, 1);
    Ok(())
}

#[test]
fn releasing_last_function_starts_a_new_generation() -> eyre::Result<()> {
    let mut rt = runtime();
    let first = {
        let mut buffer = CodeBuffer::new(&mut rt);
        emit_const(&mut buffer, 1);
        buffer.finalize()?
    };
    {
        let loaded = rt.load_scoped(&first)?;
        let f: extern "C" fn() -> i32 = unsafe { loaded.entry().as_fn() };
        assert_eq!(f(), 1);
    }
    assert_eq!(rt.generation(), 1);

    let err = rt.load(&first).expect_err("stale code must be rejected");
    assert_eq!(err.code(), ErrorCode::RuntimeMismatch);

    let second = {
        let mut buffer = CodeBuffer::new(&mut rt);
        emit_const(&mut buffer, 2);
        buffer.finalize()?
    };
    let loaded = rt.load_scoped(&second)?;
    let f: extern "C" fn() -> i32 = unsafe { loaded.entry().as_fn() };
    assert_eq!(f(), 2);
    loaded.release()?;
    assert_eq!(rt.stats().releases, 2);
    Ok(())
}

#[test]
fn code_from_another_runtime_is_rejected() -> eyre::Result<()> {
    let mut a = runtime();
    let mut b = runtime();
    let code = {
        let mut buffer = CodeBuffer::new(&mut a);
        emit_const(&mut buffer, 7);
        buffer.finalize()?
    };
    let err = b.load(&code).expect_err("foreign code must be rejected");
    assert_eq!(err.code(), ErrorCode::RuntimeMismatch);
    assert_eq!(b.live(), 0);
    Ok(())
}

#[test]
fn unclosed_function_is_reported_at_finalize() {
    let mut rt = runtime();
    let collector = Rc::new(RefCell::new(ErrorCollector::new()));
    let mut buffer = CodeBuffer::new(&mut rt);
    buffer.set_error_handler(collector.clone());
    {
        let mut cc = Compiler::new(&mut buffer);
        let sig = cc.signature(&[], &[types::I32]);
        let mut f = cc.add_function("open", &sig).expect("add function");
        f.entry_args();
        let v = f.iconst32(3);
        f.ins().return_(&[v]);
    }
    let err = buffer.finalize().expect_err("unclosed function");
    assert_eq!(err.code(), ErrorCode::UnclosedFunction);
    let collector = collector.borrow();
    let first = collector.first().expect("reported");
    assert_eq!(first.code, ErrorCode::UnclosedFunction);
    assert!(first.message.contains("open"));
}

#[test]
fn falling_off_a_non_void_function_is_an_error() {
    let mut rt = runtime();
    let mut buffer = CodeBuffer::new(&mut rt);
    let mut cc = Compiler::new(&mut buffer);
    let sig = cc.signature(&[types::I32], &[types::I32]);
    let mut f = cc.add_function("fallthrough", &sig).expect("add function");
    let args = f.entry_args();
    f.ins().iadd_imm(args[0], 1);
    let err = f.end_function().expect_err("unterminated block");
    assert_eq!(err.code(), ErrorCode::UnterminatedBlock);
}

#[test]
fn void_functions_get_an_implicit_return() -> eyre::Result<()> {
    let mut rt = runtime();
    let code = {
        let mut buffer = CodeBuffer::new(&mut rt);
        let mut cc = Compiler::new(&mut buffer);
        let sig = cc.signature(&[], &[]);
        cc.add_function("empty", &sig)?.end_function()?;
        buffer.finalize()?
    };
    let loaded = rt.load_scoped(&code)?;
    let f: extern "C" fn() = unsafe { loaded.entry().as_fn() };
    f();
    Ok(())
}

#[test]
fn declared_but_undefined_function_fails_finalize() {
    let mut rt = runtime();
    let mut buffer = CodeBuffer::new(&mut rt);
    {
        let mut cc = Compiler::new(&mut buffer);
        let sig = cc.signature(&[], &[types::I32]);
        let helper = cc.declare_function("helper", &sig).expect("declare");
        let mut f = cc.add_function("main", &sig).expect("add function");
        f.entry_args();
        let ret = f.call(&helper, &[]);
        f.ins().return_(&ret);
        f.end_function().expect("end function");
    }
    let err = buffer.finalize().expect_err("helper has no body");
    assert_eq!(err.code(), ErrorCode::UndefinedFunction);
}

#[test]
fn empty_buffer_has_no_entry() {
    let mut rt = runtime();
    let mut buffer = CodeBuffer::new(&mut rt);
    let err = buffer.finalize().expect_err("nothing emitted");
    assert_eq!(err.code(), ErrorCode::NoEntryFunction);
}

#[test]
fn constant_pool_and_diagnostics() -> eyre::Result<()> {
    let mut rt = runtime();
    let mut sink = fj_core::DiagnosticSink::buffered();
    let code = {
        let mut buffer = CodeBuffer::new(&mut rt);
        buffer.set_diagnostic_sink(&mut sink);
        let mut cc = Compiler::new(&mut buffer);
        let sig = cc.signature(&[], &[types::I32]);
        let mut f = cc.add_function("pool", &sig)?;
        f.entry_args();
        let a = f.const_i32(200)?;
        let b = f.const_i32(33)?;
        let sum = f.ins().iadd(a, b);
        f.ins().return_(&[sum]);
        f.end_function()?;
        buffer.finalize()?
    };
    assert!(sink.contents().contains("; begin pool"));
    assert!(sink.contents().contains("CodeSize="));

    let loaded = rt.load_scoped(&code)?;
    let f: extern "C" fn() -> i32 = unsafe { loaded.entry().as_fn() };
    assert_eq!(f(), 233);
    Ok(())
}

#[test]
fn switching_away_from_an_open_block_is_reported_not_panicked() {
    let mut rt = runtime();
    let collector = Rc::new(RefCell::new(ErrorCollector::new()));
    let mut buffer = CodeBuffer::new(&mut rt);
    buffer.set_error_handler(collector.clone());
    {
        let mut cc = Compiler::new(&mut buffer);
        let sig = cc.signature(&[types::I32], &[types::I32]);
        let mut f = cc.add_function("abandon", &sig).expect("add function");
        let args = f.entry_args();
        let next = f.create_block();
        f.ins().iadd_imm(args[0], 1);
        f.switch_to_block(next);
        assert!(f.is_poisoned());
        f.ins().return_(&[args[0]]);
        let err = f.end_function().expect_err("poisoned function");
        assert_eq!(err.code(), ErrorCode::UnterminatedBlock);
    }
    let err = buffer.finalize().expect_err("poisoned buffer");
    assert_eq!(err.code(), ErrorCode::UnterminatedBlock);

    let collector = collector.borrow();
    let first = collector.first().expect("reported");
    assert_eq!(first.code, ErrorCode::UnterminatedBlock);
    assert!(first.message.contains("abandon"), "{}", first.message);
}

#[test]
fn reentering_a_terminated_block_is_reported() {
    let mut rt = runtime();
    let collector = Rc::new(RefCell::new(ErrorCollector::new()));
    let mut buffer = CodeBuffer::new(&mut rt);
    buffer.set_error_handler(collector.clone());
    {
        let mut cc = Compiler::new(&mut buffer);
        let sig = cc.signature(&[], &[types::I32]);
        let mut f = cc.add_function("reenter", &sig).expect("add function");
        f.entry_args();
        let entry = f.current_block().expect("entry block");
        let v = f.iconst32(1);
        f.ins().return_(&[v]);
        f.switch_to_block(entry);
        let w = f.iconst32(2);
        f.ins().return_(&[w]);
        assert!(f.end_function().is_err());
    }
    assert_eq!(
        buffer.finalize().expect_err("poisoned buffer").code(),
        ErrorCode::UnterminatedBlock
    );
    assert!(collector.borrow().first().is_some());
}

#[test]
fn trailing_empty_block_after_return_is_accepted() -> eyre::Result<()> {
    let mut rt = runtime();
    let code = {
        let mut buffer = CodeBuffer::new(&mut rt);
        let mut cc = Compiler::new(&mut buffer);
        let sig = cc.signature(&[], &[types::I32]);
        let mut f = cc.add_function("trailing", &sig)?;
        f.entry_args();
        let v = f.iconst32(9);
        f.ins().return_(&[v]);
        let after = f.create_block();
        f.switch_to_block(after);
        assert!(!f.is_poisoned());
        f.end_function()?;
        buffer.finalize()?
    };
    let loaded = rt.load_scoped(&code)?;
    let f: extern "C" fn() -> i32 = unsafe { loaded.entry().as_fn() };
    assert_eq!(f(), 9);
    Ok(())
}
