//! Operand stack shared by every frame of one invocation

use super::{RuntimeError, Value};
use crate::types::ValueType;

/// The value stack. Frames address their parameters and locals by absolute
/// index from a base pointer.
#[derive(Debug, Default)]
pub struct Stack {
    values: Vec<Value>,
}

impl Stack {
    pub fn new() -> Self {
        Stack { values: Vec::new() }
    }

    pub fn push(&mut self, value: Value) {
        self.values.push(value);
    }

    pub fn push_all(&mut self, values: impl IntoIterator<Item = Value>) {
        self.values.extend(values);
    }

    pub fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.values.pop().ok_or(RuntimeError::StackUnderflow)
    }

    /// Pop a value and check its run-time type
    pub fn pop_typed(&mut self, expected: ValueType) -> Result<Value, RuntimeError> {
        let value = self.pop()?;
        value.check(expected)?;
        Ok(value)
    }

    pub fn pop_i32(&mut self) -> Result<i32, RuntimeError> {
        self.pop_typed(ValueType::I32)?
            .as_i32()
            .ok_or(RuntimeError::StackUnderflow)
    }

    pub fn pop_i64(&mut self) -> Result<i64, RuntimeError> {
        self.pop_typed(ValueType::I64)?
            .as_i64()
            .ok_or(RuntimeError::StackUnderflow)
    }

    pub fn pop_f32(&mut self) -> Result<f32, RuntimeError> {
        self.pop_typed(ValueType::F32)?
            .as_f32()
            .ok_or(RuntimeError::StackUnderflow)
    }

    pub fn pop_f64(&mut self) -> Result<f64, RuntimeError> {
        self.pop_typed(ValueType::F64)?
            .as_f64()
            .ok_or(RuntimeError::StackUnderflow)
    }

    pub fn pop_func_ref(&mut self) -> Result<Option<u32>, RuntimeError> {
        self.pop_typed(ValueType::FuncRef)?
            .as_func_ref()
            .ok_or(RuntimeError::StackUnderflow)
    }

    /// Removes the top `n` values, returned bottom first.
    pub fn pop_n(&mut self, n: usize) -> Result<Vec<Value>, RuntimeError> {
        if n > self.values.len() {
            return Err(RuntimeError::StackUnderflow);
        }
        Ok(self.values.split_off(self.values.len() - n))
    }

    /// Value at absolute index `index`.
    pub fn get(&self, index: usize) -> Result<Value, RuntimeError> {
        self.values.get(index).copied().ok_or(RuntimeError::StackUnderflow)
    }

    pub fn set(&mut self, index: usize, value: Value) -> Result<(), RuntimeError> {
        let slot = self.values.get_mut(index).ok_or(RuntimeError::StackUnderflow)?;
        *slot = value;
        Ok(())
    }

    /// Discards everything at or above `height`.
    pub fn truncate(&mut self, height: usize) {
        self.values.truncate(height);
    }

    /// Unwinds to `height`, keeping the top `keep` values on top.
    pub fn unwind(&mut self, height: usize, keep: usize) -> Result<(), RuntimeError> {
        let kept = self.pop_n(keep)?;
        if height > self.values.len() {
            return Err(RuntimeError::StackUnderflow);
        }
        self.values.truncate(height);
        self.values.extend(kept);
        Ok(())
    }

    pub fn depth(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn peek(&self) -> Option<&Value> {
        self.values.last()
    }
}
