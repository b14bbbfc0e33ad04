//! Module instances
//!
//! Instantiation resolves every import against an [`ImportObject`],
//! allocates the memory, tables and globals the module defines, copies data
//! and element segments into place and finally runs the start function.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::debug;

use super::imports::{HostFunc, ImportObject, SharedGlobal, SharedMemory, SharedTable};
use super::interpreter::Interpreter;
use super::ops::memory::copy_to_memory;
use super::{Config, Memory, RuntimeError, Table, Value};
use crate::module::{ExportKind, FuncKind, ImportName, Limits, Module};
use crate::types::{FuncType, ValueType};

/// A function in the instance's index space.
#[derive(Debug, Clone)]
pub(crate) enum Callee {
    Host(HostFunc),
    /// Compiled body at this index of the module.
    Defined,
}

/// A [`Module`] bound to its imports.
#[derive(Debug)]
pub struct Instance {
    module: Rc<Module>,
    funcs: Vec<Callee>,
    memory: Option<SharedMemory>,
    tables: Vec<SharedTable>,
    globals: Vec<SharedGlobal>,
    config: Config,
}

fn import_mismatch(import: &ImportName, expected: impl ToString, actual: impl ToString) -> RuntimeError {
    RuntimeError::ImportTypeMismatch {
        module: import.module.clone(),
        name: import.name.clone(),
        expected: expected.to_string(),
        actual: actual.to_string(),
    }
}

fn describe_limits(limits: Limits) -> String {
    match limits.max {
        Some(max) => format!("limits {}..={max}", limits.min),
        None => format!("limits {}..", limits.min),
    }
}

/// A `bool` import needs a host global that can only ever hold 0 or 1:
/// one declared `bool`, or an immutable one currently holding 0 or 1.
fn bool_global_fits(ty: ValueType, global: &SharedGlobal) -> bool {
    ty != ValueType::Bool
        || global.ty() == ValueType::Bool
        || (!global.is_mutable() && global.get().matches(ValueType::Bool))
}

fn describe_global(ty: ValueType, mutable: bool) -> String {
    if mutable {
        format!("mut {ty}")
    } else {
        ty.to_string()
    }
}

/// An import satisfies `wanted` if it is at least as large and its maximum,
/// when one is required, is no larger.
fn limits_match(wanted: Limits, size: u32, max: Option<u32>) -> bool {
    if size < wanted.min {
        return false;
    }
    match (wanted.max, max) {
        (None, _) => true,
        (Some(want), Some(have)) => have <= want,
        (Some(_), None) => false,
    }
}

impl Instance {
    /// Instantiates `module` with the default [`Config`].
    pub fn new(module: impl Into<Rc<Module>>, imports: &ImportObject) -> Result<Self, RuntimeError> {
        Self::with_config(module, imports, Config::default())
    }

    /// Instantiates `module`.
    ///
    /// # Errors
    /// - `UnresolvedImport` when an import is missing from `imports`
    /// - `ImportTypeMismatch` when an import has the wrong signature, type,
    ///   mutability or limits
    /// - `MemoryError` / `TableIndexOutOfBounds` when a data or element
    ///   segment does not fit
    /// - any trap raised by the start function
    pub fn with_config(
        module: impl Into<Rc<Module>>,
        imports: &ImportObject,
        config: Config,
    ) -> Result<Self, RuntimeError> {
        let module = module.into();
        debug!(
            funcs = module.functions().len(),
            globals = module.globals().len(),
            tables = module.tables().len(),
            "instantiating module"
        );

        let mut funcs = Vec::with_capacity(module.functions().len());
        for (index, entry) in module.functions().iter().enumerate() {
            match &entry.kind {
                FuncKind::Import(import) => {
                    let host = imports.get_function(&import.module, &import.name)?;
                    let wanted = module
                        .func_type(index as u32)
                        .ok_or(RuntimeError::FunctionIndexOutOfBounds(index as u32))?;
                    if !host.func_type().matches_encoding(wanted) {
                        return Err(import_mismatch(import, wanted, host.func_type()));
                    }
                    debug!(%import, "resolved function import");
                    funcs.push(Callee::Host(host.clone()));
                }
                FuncKind::Defined(_) => funcs.push(Callee::Defined),
            }
        }

        let memory = match module.memory() {
            None => None,
            Some(entry) => match &entry.import {
                Some(import) => {
                    let shared = imports.get_memory(&import.module, &import.name)?;
                    {
                        let memory = shared.borrow();
                        if !limits_match(entry.limits, memory.size(), memory.max_pages()) {
                            let actual = Limits {
                                min: memory.size(),
                                max: memory.max_pages(),
                            };
                            return Err(import_mismatch(
                                import,
                                describe_limits(entry.limits),
                                describe_limits(actual),
                            ));
                        }
                    }
                    debug!(%import, "resolved memory import");
                    Some(Rc::clone(shared))
                }
                None => Some(Rc::new(RefCell::new(Memory::new(entry.limits.min, entry.limits.max)?))),
            },
        };

        let mut tables = Vec::with_capacity(module.tables().len());
        for entry in module.tables() {
            match &entry.import {
                Some(import) => {
                    let shared = imports.get_table(&import.module, &import.name)?;
                    {
                        let table = shared.borrow();
                        if !limits_match(entry.limits, table.size(), table.limits().max) {
                            let actual = Limits {
                                min: table.size(),
                                max: table.limits().max,
                            };
                            return Err(import_mismatch(
                                import,
                                describe_limits(entry.limits),
                                describe_limits(actual),
                            ));
                        }
                    }
                    debug!(%import, "resolved table import");
                    tables.push(Rc::clone(shared));
                }
                None => tables.push(Rc::new(RefCell::new(Table::new(entry.limits)?))),
            }
        }

        let mut globals = Vec::with_capacity(module.globals().len());
        for entry in module.globals() {
            match &entry.import {
                Some(import) => {
                    let global = imports.get_global(&import.module, &import.name)?;
                    if global.ty().encoding() != entry.ty.encoding()
                        || global.is_mutable() != entry.mutable
                        || !bool_global_fits(entry.ty, global)
                    {
                        return Err(import_mismatch(
                            import,
                            describe_global(entry.ty, entry.mutable),
                            describe_global(global.ty(), global.is_mutable()),
                        ));
                    }
                    debug!(%import, "resolved global import");
                    globals.push(global.clone());
                }
                None => globals.push(SharedGlobal::new(entry.ty, entry.mutable, entry.init)?),
            }
        }

        if let Some(memory) = &memory {
            let mut memory = memory.borrow_mut();
            for segment in module.data() {
                copy_to_memory(&mut memory, segment.offset, &segment.bytes)?;
            }
        }
        for segment in module.elements() {
            let table = tables
                .get(segment.table as usize)
                .ok_or(RuntimeError::TableIndexOutOfBounds(segment.table))?;
            table.borrow_mut().init(segment.offset, &segment.funcs)?;
        }

        let instance = Instance {
            module,
            funcs,
            memory,
            tables,
            globals,
            config,
        };

        if let Some(start) = instance.module.start() {
            debug!(start, "running start function");
            Interpreter::new(&instance).invoke(start, &[])?;
        }
        debug!("instantiated module");
        Ok(instance)
    }

    /// Calls the exported function `name`.
    ///
    /// # Errors
    /// - `UnknownExport` if `name` is not an exported function
    /// - `ArgumentCountMismatch` / `TypeMismatch` if `args` do not fit the
    ///   function's parameters
    /// - `ResultMismatch` if the function leaves the wrong number of results
    /// - any trap raised during execution
    pub fn invoke(&self, name: &str, args: &[Value]) -> Result<Vec<Value>, RuntimeError> {
        let Some(ExportKind::Func(index)) = self.module.export(name) else {
            return Err(RuntimeError::UnknownExport(name.to_string()));
        };
        let ty = self.func_type(index)?;
        if args.len() != ty.params.len() {
            return Err(RuntimeError::ArgumentCountMismatch {
                expected: ty.params.len(),
                actual: args.len(),
            });
        }
        for (arg, param) in args.iter().zip(&ty.params) {
            arg.check(*param)?;
        }

        debug!(name, index, "invoke");
        let results = Interpreter::new(self).invoke(index, args)?;
        if results.len() != ty.results.len() {
            return Err(RuntimeError::ResultMismatch {
                expected: ty.results.len(),
                actual: results.len(),
            });
        }
        debug!(name, ?results, "invoke returned");
        Ok(results)
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn config(&self) -> Config {
        self.config
    }

    /// The exported memory `name`.
    pub fn memory(&self, name: &str) -> Result<SharedMemory, RuntimeError> {
        match (self.module.export(name), &self.memory) {
            (Some(ExportKind::Memory), Some(memory)) => Ok(Rc::clone(memory)),
            _ => Err(RuntimeError::UnknownExport(name.to_string())),
        }
    }

    /// The exported global `name`.
    pub fn global(&self, name: &str) -> Result<SharedGlobal, RuntimeError> {
        match self.module.export(name) {
            Some(ExportKind::Global(index)) => self.global_at(index).cloned(),
            _ => Err(RuntimeError::UnknownExport(name.to_string())),
        }
    }

    /// The exported table `name`.
    pub fn table(&self, name: &str) -> Result<SharedTable, RuntimeError> {
        match self.module.export(name) {
            Some(ExportKind::Table(index)) => self.table_at(index).cloned(),
            _ => Err(RuntimeError::UnknownExport(name.to_string())),
        }
    }

    pub(crate) fn func_type(&self, index: u32) -> Result<&FuncType, RuntimeError> {
        self.module
            .func_type(index)
            .ok_or(RuntimeError::FunctionIndexOutOfBounds(index))
    }

    pub(crate) fn callee(&self, index: u32) -> Result<&Callee, RuntimeError> {
        self.funcs
            .get(index as usize)
            .ok_or(RuntimeError::FunctionIndexOutOfBounds(index))
    }

    pub(crate) fn memory_instance(&self) -> Result<&SharedMemory, RuntimeError> {
        self.memory
            .as_ref()
            .ok_or_else(|| RuntimeError::MemoryError("No memory instance available".to_string()))
    }

    pub(crate) fn table_at(&self, index: u32) -> Result<&SharedTable, RuntimeError> {
        self.tables
            .get(index as usize)
            .ok_or(RuntimeError::TableIndexOutOfBounds(index))
    }

    pub(crate) fn global_at(&self, index: u32) -> Result<&SharedGlobal, RuntimeError> {
        self.globals
            .get(index as usize)
            .ok_or(RuntimeError::GlobalIndexOutOfBounds(index))
    }
}
