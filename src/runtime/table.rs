//! Function-reference tables
//!
//! A table is a resizable vector of nullable function indices. Indirect calls
//! look up their callee here; the callee's signature is checked against the
//! call's expected type before the call proceeds.

use super::RuntimeError;
use crate::module::Limits;

#[derive(Debug)]
pub struct Table {
    /// Function indices into the owning instance; `None` is null.
    elements: Vec<Option<u32>>,
    limits: Limits,
}

impl Table {
    /// Creates a table of `limits.min` null references.
    pub fn new(limits: Limits) -> Result<Self, RuntimeError> {
        if let Some(max) = limits.max {
            if limits.min > max {
                return Err(RuntimeError::TableSizeExceeded);
            }
        }
        Ok(Table {
            elements: vec![None; limits.min as usize],
            limits,
        })
    }

    /// Current number of elements
    pub fn size(&self) -> u32 {
        self.elements.len() as u32
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    /// # Errors
    ///
    /// Returns `TableIndexOutOfBounds` if the index is out of bounds.
    pub fn get(&self, index: u32) -> Result<Option<u32>, RuntimeError> {
        self.elements
            .get(index as usize)
            .copied()
            .ok_or(RuntimeError::TableIndexOutOfBounds(index))
    }

    /// # Errors
    ///
    /// Returns `TableIndexOutOfBounds` if the index is out of bounds.
    pub fn set(&mut self, index: u32, func: Option<u32>) -> Result<(), RuntimeError> {
        let elem = self
            .elements
            .get_mut(index as usize)
            .ok_or(RuntimeError::TableIndexOutOfBounds(index))?;
        *elem = func;
        Ok(())
    }

    /// Grows by `delta` slots filled with `init`.
    ///
    /// Returns the old size, or `None` if the maximum would be exceeded.
    pub fn grow(&mut self, delta: u32, init: Option<u32>) -> Option<u32> {
        let old_size = self.size();
        let new_size = old_size.checked_add(delta)?;
        if self.limits.max.is_some_and(|max| new_size > max) {
            return None;
        }
        self.elements.resize(new_size as usize, init);
        Some(old_size)
    }

    /// Writes `funcs` into consecutive slots starting at `offset`. Used for
    /// element segments; nothing is written if the range does not fit.
    pub fn init(&mut self, offset: u32, funcs: &[u32]) -> Result<(), RuntimeError> {
        let end = (offset as usize)
            .checked_add(funcs.len())
            .filter(|&end| end <= self.elements.len())
            .ok_or(RuntimeError::TableIndexOutOfBounds(offset))?;
        for (slot, func) in self.elements[offset as usize..end].iter_mut().zip(funcs) {
            *slot = Some(*func);
        }
        Ok(())
    }
}
