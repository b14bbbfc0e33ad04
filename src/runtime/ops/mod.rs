//! Instruction semantics
//!
//! Numeric, comparison, conversion and memory instructions, each operating
//! on the shared [`Stack`]. Operands are popped right to left: the last
//! operand pushed is the first popped.

pub mod comparison;
pub mod conversion;
pub mod memory;
pub mod numeric;

pub(crate) use crate::runtime::stack::Stack;
pub(crate) use crate::runtime::{RuntimeError, Value};

/// A Rust type that maps onto one run-time value type.
pub(crate) trait Operand: Sized {
    fn pop(stack: &mut Stack) -> Result<Self, RuntimeError>;
    fn into_value(self) -> Value;
}

impl Operand for i32 {
    fn pop(stack: &mut Stack) -> Result<Self, RuntimeError> {
        stack.pop_i32()
    }

    fn into_value(self) -> Value {
        Value::I32(self)
    }
}

impl Operand for i64 {
    fn pop(stack: &mut Stack) -> Result<Self, RuntimeError> {
        stack.pop_i64()
    }

    fn into_value(self) -> Value {
        Value::I64(self)
    }
}

impl Operand for f32 {
    fn pop(stack: &mut Stack) -> Result<Self, RuntimeError> {
        stack.pop_f32()
    }

    fn into_value(self) -> Value {
        Value::F32(self)
    }
}

impl Operand for f64 {
    fn pop(stack: &mut Stack) -> Result<Self, RuntimeError> {
        stack.pop_f64()
    }

    fn into_value(self) -> Value {
        Value::F64(self)
    }
}

/// Booleans are `i32` 0 or 1.
impl Operand for bool {
    fn pop(stack: &mut Stack) -> Result<Self, RuntimeError> {
        Ok(stack.pop_i32()? != 0)
    }

    fn into_value(self) -> Value {
        Value::I32(self as i32)
    }
}

pub(crate) fn unary<T: Operand, R: Operand>(stack: &mut Stack, f: impl FnOnce(T) -> R) -> Result<(), RuntimeError> {
    let c = T::pop(stack)?;
    stack.push(f(c).into_value());
    Ok(())
}

pub(crate) fn try_unary<T: Operand, R: Operand>(
    stack: &mut Stack,
    f: impl FnOnce(T) -> Result<R, RuntimeError>,
) -> Result<(), RuntimeError> {
    let c = T::pop(stack)?;
    stack.push(f(c)?.into_value());
    Ok(())
}

/// Pops `c2` then `c1` and pushes `f(c1, c2)`.
pub(crate) fn binary<T: Operand, R: Operand>(stack: &mut Stack, f: impl FnOnce(T, T) -> R) -> Result<(), RuntimeError> {
    let c2 = T::pop(stack)?;
    let c1 = T::pop(stack)?;
    stack.push(f(c1, c2).into_value());
    Ok(())
}

pub(crate) fn try_binary<T: Operand, R: Operand>(
    stack: &mut Stack,
    f: impl FnOnce(T, T) -> Result<R, RuntimeError>,
) -> Result<(), RuntimeError> {
    let c2 = T::pop(stack)?;
    let c1 = T::pop(stack)?;
    stack.push(f(c1, c2)?.into_value());
    Ok(())
}

/// Executes any single-byte numeric opcode (`0x45..=0xC4`).
pub fn execute_numeric(stack: &mut Stack, op: u8) -> Result<(), RuntimeError> {
    match op {
        0x45..=0x66 => comparison::execute(stack, op),
        0xA7..=0xBF => conversion::execute(stack, op),
        _ => numeric::execute(stack, op),
    }
}
