//! Module construction.
//!
//! [`ModuleBuilder`] owns the type table and every index space of the module
//! under construction. Function bodies are written through a
//! [`FunctionBuilder`] borrowed from it; finished bodies are compiled to
//! bytes immediately. [`ModuleBuilder::finish`] produces an immutable
//! [`Module`].
//!
//! ```
//! use wasmkit::builder::ModuleBuilder;
//! use wasmkit::expr::Expr;
//! use wasmkit::types::{BinaryOp, ValueType};
//!
//! let mut mb = ModuleBuilder::new();
//! let mut f = mb.function(&[ValueType::I32]);
//! let x = f.param(ValueType::I32).unwrap();
//! f.push(Expr::binary(BinaryOp::Add, Expr::local(x), Expr::i32(1)).unwrap()).unwrap();
//! let inc = f.finish().unwrap();
//! mb.export_function("inc", &inc).unwrap();
//! let module = mb.finish().unwrap();
//! assert!(module.export("inc").is_some());
//! ```

mod function;

pub use function::{FunctionBuilder, Label};

use std::collections::HashMap;
use std::rc::Rc;

use tracing::debug;

use crate::error::BuildError;
use crate::module::{
    CompiledFunction, DataSegment, ElementSegment, ExportKind, Func, FuncEntry, FuncKind, Global,
    GlobalEntry, ImportName, Limits, MemoryEntry, Module, Signature, TableEntry, TableId,
};
use crate::runtime::Value;
use crate::types::{FuncType, TypeTable, ValueType};

#[derive(Debug)]
enum FuncSlot {
    Import { name: ImportName, signature: Signature },
    /// Forward declaration awaiting an implementation.
    Declared(Signature),
    /// A body is being written.
    Building,
    Defined(CompiledFunction),
}

#[derive(Debug, Default)]
pub struct ModuleBuilder {
    types: TypeTable,
    funcs: Vec<FuncSlot>,
    tables: Vec<TableEntry>,
    memory: Option<MemoryEntry>,
    globals: Vec<GlobalEntry>,
    data: Vec<DataSegment>,
    elements: Vec<ElementSegment>,
    start: Option<u32>,
    exports: HashMap<String, ExportKind>,
    labels: u32,
}

fn import_name(module: &str, name: &str) -> ImportName {
    ImportName {
        module: module.to_string(),
        name: name.to_string(),
    }
}

impl ModuleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns a signature, returning a handle usable with `call_indirect`.
    pub fn signature(&mut self, params: impl Into<Vec<ValueType>>, results: impl Into<Vec<ValueType>>) -> Signature {
        let ty = FuncType::new(params, results);
        let index = self.types.intern(ty.clone());
        Signature { index, ty: Rc::new(ty) }
    }

    // -- Imports --

    pub fn import_function(
        &mut self,
        module: &str,
        name: &str,
        params: &[ValueType],
        results: &[ValueType],
    ) -> Result<Func, BuildError> {
        if self.funcs.iter().any(|f| !matches!(f, FuncSlot::Import { .. })) {
            return Err(BuildError::ImportAfterDefinition);
        }
        let signature = self.signature(params, results);
        let index = self.funcs.len() as u32;
        self.funcs.push(FuncSlot::Import {
            name: import_name(module, name),
            signature: signature.clone(),
        });
        Ok(Func { index, signature })
    }

    pub fn import_memory(&mut self, module: &str, name: &str, min: u32, max: Option<u32>) -> Result<(), BuildError> {
        if self.memory.is_some() {
            return Err(BuildError::MultipleMemories);
        }
        self.memory = Some(MemoryEntry {
            limits: Limits { min, max },
            import: Some(import_name(module, name)),
        });
        Ok(())
    }

    pub fn import_global(&mut self, module: &str, name: &str, ty: ValueType, mutable: bool) -> Result<Global, BuildError> {
        if self.globals.iter().any(|g| g.import.is_none()) {
            return Err(BuildError::ImportAfterDefinition);
        }
        let index = self.globals.len() as u32;
        self.globals.push(GlobalEntry {
            ty,
            mutable,
            init: Value::default_for(ty),
            import: Some(import_name(module, name)),
        });
        Ok(Global { index, ty, mutable })
    }

    pub fn import_table(&mut self, module: &str, name: &str, min: u32, max: Option<u32>) -> Result<TableId, BuildError> {
        if self.tables.iter().any(|t| t.import.is_none()) {
            return Err(BuildError::ImportAfterDefinition);
        }
        let index = self.tables.len() as u32;
        self.tables.push(TableEntry {
            limits: Limits { min, max },
            import: Some(import_name(module, name)),
        });
        Ok(TableId(index))
    }

    // -- Functions --

    /// Starts a new function returning `results`. Parameters are declared on
    /// the returned builder.
    pub fn function(&mut self, results: &[ValueType]) -> FunctionBuilder<'_> {
        let index = self.funcs.len() as u32;
        self.funcs.push(FuncSlot::Building);
        FunctionBuilder::new(self, index, Vec::new(), results.to_vec(), None)
    }

    /// Reserves an index and signature for a function implemented later.
    pub fn forward_decl(&mut self, params: &[ValueType], results: &[ValueType]) -> Func {
        let signature = self.signature(params, results);
        let index = self.funcs.len() as u32;
        self.funcs.push(FuncSlot::Declared(signature.clone()));
        Func { index, signature }
    }

    /// Opens the body of a forward-declared function. Its parameters are
    /// already declared; see [`FunctionBuilder::params`].
    pub fn implementation(&mut self, func: &Func) -> Result<FunctionBuilder<'_>, BuildError> {
        let slot = self
            .funcs
            .get_mut(func.index as usize)
            .ok_or(BuildError::UnknownFunction(func.index))?;
        let signature = match slot {
            FuncSlot::Declared(signature) => signature.clone(),
            _ => return Err(BuildError::AlreadyImplemented(func.index)),
        };
        *slot = FuncSlot::Building;
        let params = signature.params().to_vec();
        let results = signature.results().to_vec();
        Ok(FunctionBuilder::new(self, func.index, params, results, Some(signature)))
    }

    /// Like [`implementation`](Self::implementation), but first checks that
    /// the declaration has exactly the given signature.
    pub fn implementation_with(
        &mut self,
        func: &Func,
        params: &[ValueType],
        results: &[ValueType],
    ) -> Result<FunctionBuilder<'_>, BuildError> {
        let declared = self.declared_signature(func.index)?;
        let actual = FuncType::new(params, results);
        if *declared.ty != actual {
            return Err(BuildError::SignatureMismatch {
                func: func.index,
                declared: declared.ty.to_string(),
                actual: actual.to_string(),
            });
        }
        self.implementation(func)
    }

    fn declared_signature(&self, index: u32) -> Result<Signature, BuildError> {
        match self.funcs.get(index as usize) {
            Some(FuncSlot::Declared(signature)) => Ok(signature.clone()),
            Some(_) => Err(BuildError::AlreadyImplemented(index)),
            None => Err(BuildError::UnknownFunction(index)),
        }
    }

    pub(crate) fn define(&mut self, index: u32, compiled: CompiledFunction) {
        debug!(index, size = compiled.body().len(), "function compiled");
        if let Some(slot) = self.funcs.get_mut(index as usize) {
            *slot = FuncSlot::Defined(compiled);
        }
    }

    pub(crate) fn next_label(&mut self) -> u32 {
        let id = self.labels;
        self.labels += 1;
        id
    }

    pub(crate) fn function_count(&self) -> usize {
        self.funcs.len()
    }

    // -- Other definitions --

    pub fn global(&mut self, ty: ValueType, mutable: bool, init: Value) -> Result<Global, BuildError> {
        if !init.matches(ty) {
            return Err(BuildError::TypeMismatch {
                expected: vec![ty],
                actual: vec![init.typ()],
            });
        }
        let index = self.globals.len() as u32;
        self.globals.push(GlobalEntry {
            ty,
            mutable,
            init,
            import: None,
        });
        Ok(Global { index, ty, mutable })
    }

    pub(crate) fn global_entry(&self, index: u32) -> Option<&GlobalEntry> {
        self.globals.get(index as usize)
    }

    /// Declares the module's memory, sized in 64KiB pages.
    pub fn memory(&mut self, min: u32, max: Option<u32>) -> Result<(), BuildError> {
        if self.memory.is_some() {
            return Err(BuildError::MultipleMemories);
        }
        self.memory = Some(MemoryEntry {
            limits: Limits { min, max },
            import: None,
        });
        Ok(())
    }

    pub(crate) fn has_memory(&self) -> bool {
        self.memory.is_some()
    }

    /// Declares a function-reference table.
    pub fn table(&mut self, min: u32, max: Option<u32>) -> TableId {
        let index = self.tables.len() as u32;
        self.tables.push(TableEntry {
            limits: Limits { min, max },
            import: None,
        });
        TableId(index)
    }

    pub(crate) fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Bytes copied into memory at `offset` on instantiation.
    pub fn data(&mut self, offset: u32, bytes: impl Into<Vec<u8>>) -> Result<(), BuildError> {
        if self.memory.is_none() {
            return Err(BuildError::NoMemory);
        }
        self.data.push(DataSegment {
            offset,
            bytes: bytes.into(),
        });
        Ok(())
    }

    /// Functions written into `table` starting at `offset` on instantiation.
    pub fn elements(&mut self, table: TableId, offset: u32, funcs: &[Func]) -> Result<(), BuildError> {
        if table.0 as usize >= self.tables.len() {
            return Err(BuildError::UnknownTable(table.0));
        }
        for f in funcs {
            self.check_func(f)?;
        }
        self.elements.push(ElementSegment {
            table: table.0,
            offset,
            funcs: funcs.iter().map(|f| f.index).collect(),
        });
        Ok(())
    }

    /// Runs `func` at the end of instantiation.
    pub fn start(&mut self, func: &Func) -> Result<(), BuildError> {
        self.check_func(func)?;
        if !func.signature.params().is_empty() || !func.signature.results().is_empty() {
            return Err(BuildError::InvalidStart);
        }
        self.start = Some(func.index);
        Ok(())
    }

    fn check_func(&self, func: &Func) -> Result<(), BuildError> {
        if func.index as usize >= self.funcs.len() {
            return Err(BuildError::UnknownFunction(func.index));
        }
        Ok(())
    }

    // -- Exports --

    /// Exports an entity under `name`. Export names are unique.
    pub fn export(&mut self, name: &str, kind: ExportKind) -> Result<(), BuildError> {
        match kind {
            ExportKind::Func(index) if index as usize >= self.funcs.len() => {
                return Err(BuildError::UnknownFunction(index))
            }
            ExportKind::Table(index) if index as usize >= self.tables.len() => {
                return Err(BuildError::UnknownTable(index))
            }
            ExportKind::Global(index) if index as usize >= self.globals.len() => {
                return Err(BuildError::UnknownGlobal(index))
            }
            ExportKind::Memory if self.memory.is_none() => return Err(BuildError::NoMemory),
            _ => {}
        }
        if self.exports.contains_key(name) {
            return Err(BuildError::DuplicateExport(name.to_string()));
        }
        self.exports.insert(name.to_string(), kind);
        Ok(())
    }

    pub fn export_function(&mut self, name: &str, func: &Func) -> Result<(), BuildError> {
        self.export(name, ExportKind::Func(func.index))
    }

    pub fn export_memory(&mut self, name: &str) -> Result<(), BuildError> {
        self.export(name, ExportKind::Memory)
    }

    pub fn export_global(&mut self, name: &str, global: Global) -> Result<(), BuildError> {
        self.export(name, ExportKind::Global(global.index))
    }

    pub fn export_table(&mut self, name: &str, table: TableId) -> Result<(), BuildError> {
        self.export(name, ExportKind::Table(table.0))
    }

    /// Produces the immutable module. Fails if a forward declaration was
    /// never implemented or a function builder was dropped unfinished.
    pub fn finish(self) -> Result<Module, BuildError> {
        let mut funcs = Vec::with_capacity(self.funcs.len());
        for (index, slot) in self.funcs.into_iter().enumerate() {
            let index = index as u32;
            funcs.push(match slot {
                FuncSlot::Import { name, signature } => FuncEntry {
                    type_index: signature.index,
                    kind: FuncKind::Import(name),
                },
                FuncSlot::Defined(compiled) => FuncEntry {
                    type_index: compiled.type_index,
                    kind: FuncKind::Defined(compiled),
                },
                FuncSlot::Declared(_) => return Err(BuildError::UnimplementedForwardDecl(index)),
                FuncSlot::Building => return Err(BuildError::UnfinishedFunction(index)),
            });
        }
        debug!(
            types = self.types.len(),
            funcs = funcs.len(),
            exports = self.exports.len(),
            "module built"
        );
        Ok(Module {
            types: self.types,
            funcs,
            tables: self.tables,
            memory: self.memory,
            globals: self.globals,
            data: self.data,
            elements: self.elements,
            start: self.start,
            exports: self.exports,
        })
    }
}
