//! Memory load and store instructions
//!
//! The effective address is the unsigned 32-bit base popped from the stack
//! plus the static offset, computed in 64 bits so it never wraps. The
//! alignment hint is not enforced.

use super::{RuntimeError, Stack, Value};
use crate::instr::MemArg;
use crate::runtime::Memory;
use crate::types::{LoadOp, StoreOp};

fn effective_address(base: i32, memarg: &MemArg) -> u64 {
    base as u32 as u64 + memarg.offset as u64
}

/// Copy `bytes` into memory at `offset`, all or nothing.
/// Used for data segments during instantiation.
pub fn copy_to_memory(memory: &mut Memory, offset: u32, bytes: &[u8]) -> Result<(), RuntimeError> {
    memory.write_bytes(offset as u64, bytes)
}

/// Executes a load.
/// [i32] → [t]
pub fn load(stack: &mut Stack, memory: &Memory, op: LoadOp, memarg: &MemArg) -> Result<(), RuntimeError> {
    let ea = effective_address(stack.pop_i32()?, memarg);
    let value = match op {
        LoadOp::I32Load => Value::I32(memory.read_u32(ea)? as i32),
        LoadOp::I64Load => Value::I64(memory.read_u64(ea)? as i64),
        LoadOp::F32Load => Value::F32(memory.read_f32(ea)?),
        LoadOp::F64Load => Value::F64(memory.read_f64(ea)?),
        LoadOp::I32Load8S => Value::I32(memory.read_u8(ea)? as i8 as i32),
        LoadOp::I32Load8U => Value::I32(memory.read_u8(ea)? as i32),
        LoadOp::I32Load16S => Value::I32(memory.read_u16(ea)? as i16 as i32),
        LoadOp::I32Load16U => Value::I32(memory.read_u16(ea)? as i32),
        LoadOp::I64Load8S => Value::I64(memory.read_u8(ea)? as i8 as i64),
        LoadOp::I64Load8U => Value::I64(memory.read_u8(ea)? as i64),
        LoadOp::I64Load16S => Value::I64(memory.read_u16(ea)? as i16 as i64),
        LoadOp::I64Load16U => Value::I64(memory.read_u16(ea)? as i64),
        LoadOp::I64Load32S => Value::I64(memory.read_u32(ea)? as i32 as i64),
        LoadOp::I64Load32U => Value::I64(memory.read_u32(ea)? as i64),
    };
    stack.push(value);
    Ok(())
}

/// Executes a store. Narrow stores keep the low-order bytes.
/// [i32 t] → []
pub fn store(stack: &mut Stack, memory: &mut Memory, op: StoreOp, memarg: &MemArg) -> Result<(), RuntimeError> {
    let value = stack.pop_typed(op.value_type())?;
    let ea = effective_address(stack.pop_i32()?, memarg);
    match (op, value) {
        (StoreOp::I32Store, Value::I32(v)) => memory.write_u32(ea, v as u32),
        (StoreOp::I32Store8, Value::I32(v)) => memory.write_u8(ea, v as u8),
        (StoreOp::I32Store16, Value::I32(v)) => memory.write_u16(ea, v as u16),
        (StoreOp::I64Store, Value::I64(v)) => memory.write_u64(ea, v as u64),
        (StoreOp::I64Store8, Value::I64(v)) => memory.write_u8(ea, v as u8),
        (StoreOp::I64Store16, Value::I64(v)) => memory.write_u16(ea, v as u16),
        (StoreOp::I64Store32, Value::I64(v)) => memory.write_u32(ea, v as u32),
        (StoreOp::F32Store, Value::F32(v)) => memory.write_f32(ea, v),
        (StoreOp::F64Store, Value::F64(v)) => memory.write_f64(ea, v),
        (op, value) => Err(RuntimeError::TypeMismatch {
            expected: op.value_type().to_string(),
            actual: value.typ().to_string(),
        }),
    }
}
