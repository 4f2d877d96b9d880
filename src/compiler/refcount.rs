//! Retain and release bookkeeping emitted around heap values.
//!
//! Ownership rules of the generated code:
//!
//! - a copy into an owner (slot, global, field, element, return value) retains
//! - overwriting an owner releases the previous value once the new one is held
//! - call results of heap type and `pop` results arrive owned and are
//!   released at the end of their statement unless an owner retained them
//! - every heap slot of a function is released at each of its exits

use crate::{
    errors::errors::Error,
    ir::ir::{IrType, Predicate, Value},
    runtime::abi::{RT_RELEASE, RT_RETAIN},
};

use super::compiler::Compiler;

pub fn retain(compiler: &mut Compiler, value: Value) -> Result<(), Error> {
    compiler.call_runtime(RT_RETAIN, vec![value], "rc")?;
    Ok(())
}

pub fn release(compiler: &mut Compiler, value: Value) -> Result<(), Error> {
    compiler.call_runtime(RT_RELEASE, vec![value], "rc")?;
    Ok(())
}

/// Releases `value` unless it is null.
pub fn release_guarded(compiler: &mut Compiler, value: Value) -> Result<(), Error> {
    let is_null = compiler
        .builder
        .build_compare(Predicate::Eq, value, Value::Null, "is_null")?;

    let release_block = compiler.create_basic_block("release");
    let done = compiler.create_basic_block("released");
    compiler
        .builder
        .build_cond_br(is_null, done, release_block)?;

    compiler.builder.position_at_end(release_block);
    release(compiler, value)?;
    compiler.builder.build_br(done)?;

    compiler.builder.position_at_end(done);
    Ok(())
}

/// Stores a heap value into an owner that may already hold one.
///
/// The new value is retained before the old one is released so that
/// assigning a value to the owner already holding it keeps it alive.
pub fn store_owned(compiler: &mut Compiler, ptr: Value, value: Value) -> Result<(), Error> {
    retain(compiler, value)?;
    let old = compiler.builder.build_load(IrType::Ptr, ptr, "old")?;
    compiler.builder.build_store(ptr, value)?;
    release_guarded(compiler, old)
}

/// Stores into `ptr`, using the owning protocol for heap values.
pub fn store(compiler: &mut Compiler, ptr: Value, value: Value, ty: IrType) -> Result<(), Error> {
    if ty == IrType::Ptr {
        store_owned(compiler, ptr, value)
    } else {
        compiler.builder.build_store(ptr, value)
    }
}

/// Releases the owned temporaries of the current statement.
pub fn release_temps(compiler: &mut Compiler) -> Result<(), Error> {
    release_temps_from(compiler, 0)
}

/// Releases the temporaries created after the first `mark` ones.
pub fn release_temps_from(compiler: &mut Compiler, mark: usize) -> Result<(), Error> {
    if compiler.temps.len() <= mark {
        return Ok(());
    }

    let temps = compiler.temps.split_off(mark);
    for temp in temps {
        release(compiler, temp)?;
    }
    Ok(())
}

/// Releases every heap slot of the current function, null guarded.
pub fn release_slots(compiler: &mut Compiler) -> Result<(), Error> {
    for slot in compiler.heap_slots.clone() {
        let value = compiler.builder.build_load(IrType::Ptr, slot, "slot")?;
        release_guarded(compiler, value)?;
    }
    Ok(())
}

/// Releases every heap global, null guarded. Only `main` does this.
pub fn release_globals(compiler: &mut Compiler) -> Result<(), Error> {
    let mut globals = compiler
        .globals
        .values()
        .filter(|storage| storage.ty == IrType::Ptr)
        .map(|storage| storage.ptr)
        .collect::<Vec<_>>();
    globals.sort_by_key(|ptr| match ptr {
        Value::Global(id) => id.0,
        _ => u32::MAX,
    });

    for ptr in globals {
        let value = compiler.builder.build_load(IrType::Ptr, ptr, "global")?;
        release_guarded(compiler, value)?;
    }
    Ok(())
}
