//! Host-provided imports
//!
//! An [`ImportObject`] maps `(module, name)` pairs to the functions,
//! memories, globals and tables a module imports. Memories, tables and
//! globals are shared handles: the host keeps its clone and observes every
//! write the instance makes.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use super::{Memory, RuntimeError, Table, Value};
use crate::types::{FuncType, ValueType};

pub type SharedMemory = Rc<RefCell<Memory>>;
pub type SharedTable = Rc<RefCell<Table>>;

type HostFn = dyn Fn(&[Value]) -> Result<Vec<Value>, RuntimeError>;

/// A function implemented by the host.
#[derive(Clone)]
pub struct HostFunc {
    ty: FuncType,
    func: Rc<HostFn>,
}

impl HostFunc {
    pub fn new<F>(params: &[ValueType], results: &[ValueType], func: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Vec<Value>, RuntimeError> + 'static,
    {
        HostFunc {
            ty: FuncType::new(params, results),
            func: Rc::new(func),
        }
    }

    pub fn func_type(&self) -> &FuncType {
        &self.ty
    }

    /// Calls the host function, checking the number and types of its
    /// results against the declared signature.
    pub fn call(&self, args: &[Value]) -> Result<Vec<Value>, RuntimeError> {
        let results = (self.func)(args)?;
        if results.len() != self.ty.results.len() {
            return Err(RuntimeError::ResultMismatch {
                expected: self.ty.results.len(),
                actual: results.len(),
            });
        }
        for (value, ty) in results.iter().zip(&self.ty.results) {
            value.check(*ty)?;
        }
        Ok(results)
    }
}

impl fmt::Debug for HostFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFunc").field("ty", &self.ty).finish_non_exhaustive()
    }
}

/// A global slot shared between the host and an instance.
#[derive(Debug, Clone)]
pub struct SharedGlobal {
    value: Rc<Cell<Value>>,
    ty: ValueType,
    mutable: bool,
}

impl SharedGlobal {
    /// # Errors
    /// Returns `TypeMismatch` if `value` is not of type `ty`.
    pub fn new(ty: ValueType, mutable: bool, value: Value) -> Result<Self, RuntimeError> {
        value.check(ty)?;
        Ok(SharedGlobal {
            value: Rc::new(Cell::new(value)),
            ty,
            mutable,
        })
    }

    pub fn get(&self) -> Value {
        self.value.get()
    }

    /// Host-side write. Fails for immutable globals and wrong types.
    pub fn set(&self, value: Value) -> Result<(), RuntimeError> {
        if !self.mutable {
            return Err(RuntimeError::ImmutableGlobal(self.ty.to_string()));
        }
        value.check(self.ty)?;
        self.value.set(value);
        Ok(())
    }

    /// Write from validated code; type and mutability were checked at build
    /// time.
    pub(crate) fn store(&self, value: Value) {
        self.value.set(value);
    }

    pub fn ty(&self) -> ValueType {
        self.ty
    }

    pub fn is_mutable(&self) -> bool {
        self.mutable
    }
}

type Key = (String, String);

fn key(module: &str, name: &str) -> Key {
    (module.to_string(), name.to_string())
}

fn unresolved(module: &str, name: &str) -> RuntimeError {
    RuntimeError::UnresolvedImport {
        module: module.to_string(),
        name: name.to_string(),
    }
}

/// Container for the values a module imports, keyed by
/// `(module_name, field_name)`.
#[derive(Debug, Clone, Default)]
pub struct ImportObject {
    functions: HashMap<Key, HostFunc>,
    memories: HashMap<Key, SharedMemory>,
    globals: HashMap<Key, SharedGlobal>,
    tables: HashMap<Key, SharedTable>,
}

impl ImportObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_function(&mut self, module: impl Into<String>, name: impl Into<String>, func: HostFunc) {
        self.functions.insert((module.into(), name.into()), func);
    }

    /// # Errors
    /// Returns `UnresolvedImport` if the import doesn't exist
    pub fn get_function(&self, module: &str, name: &str) -> Result<&HostFunc, RuntimeError> {
        self.functions
            .get(&key(module, name))
            .ok_or_else(|| unresolved(module, name))
    }

    pub fn add_memory(&mut self, module: impl Into<String>, name: impl Into<String>, memory: SharedMemory) {
        self.memories.insert((module.into(), name.into()), memory);
    }

    pub fn get_memory(&self, module: &str, name: &str) -> Result<&SharedMemory, RuntimeError> {
        self.memories
            .get(&key(module, name))
            .ok_or_else(|| unresolved(module, name))
    }

    pub fn add_global(&mut self, module: impl Into<String>, name: impl Into<String>, global: SharedGlobal) {
        self.globals.insert((module.into(), name.into()), global);
    }

    pub fn get_global(&self, module: &str, name: &str) -> Result<&SharedGlobal, RuntimeError> {
        self.globals
            .get(&key(module, name))
            .ok_or_else(|| unresolved(module, name))
    }

    pub fn add_table(&mut self, module: impl Into<String>, name: impl Into<String>, table: SharedTable) {
        self.tables.insert((module.into(), name.into()), table);
    }

    pub fn get_table(&self, module: &str, name: &str) -> Result<&SharedTable, RuntimeError> {
        self.tables
            .get(&key(module, name))
            .ok_or_else(|| unresolved(module, name))
    }
}
