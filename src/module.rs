//! Built modules and the handles that index into them.
//!
//! A [`Module`] is produced once by
//! [`ModuleBuilder::finish`](crate::builder::ModuleBuilder::finish) and never
//! mutated afterwards. It is shared between instances through an `Rc`.

use std::collections::HashMap;
use std::rc::Rc;

use crate::encoding::write_vu32;
use crate::runtime::Value;
use crate::types::{FuncType, TypeTable, ValueType};
use crate::writer::Wasm;

/// A parameter or local of the function being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Local {
    pub(crate) index: u32,
    pub(crate) ty: ValueType,
}

impl Local {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn ty(&self) -> ValueType {
        self.ty
    }
}

/// A module global.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Global {
    pub(crate) index: u32,
    pub(crate) ty: ValueType,
    pub(crate) mutable: bool,
}

impl Global {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn ty(&self) -> ValueType {
        self.ty
    }

    pub fn is_mutable(&self) -> bool {
        self.mutable
    }
}

/// An interned function signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub(crate) index: u32,
    pub(crate) ty: Rc<FuncType>,
}

impl Signature {
    /// Index in the module's type table.
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn func_type(&self) -> &FuncType {
        &self.ty
    }

    pub fn params(&self) -> &[ValueType] {
        &self.ty.params
    }

    pub fn results(&self) -> &[ValueType] {
        &self.ty.results
    }
}

/// A function in the module's function index space.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Func {
    pub(crate) index: u32,
    pub(crate) signature: Signature,
}

impl Func {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableId(pub(crate) u32);

impl TableId {
    pub fn index(&self) -> u32 {
        self.0
    }
}

/// Size limits of a memory (in pages) or table (in elements).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub min: u32,
    pub max: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImportName {
    pub module: String,
    pub name: String,
}

impl std::fmt::Display for ImportName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.module, self.name)
    }
}

/// A compiled function body: its signature, declared locals (beyond the
/// parameters) and code.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFunction {
    pub(crate) type_index: u32,
    pub(crate) locals: Vec<ValueType>,
    pub(crate) body: Wasm,
}

impl CompiledFunction {
    pub fn type_index(&self) -> u32 {
        self.type_index
    }

    pub fn locals(&self) -> &[ValueType] {
        &self.locals
    }

    pub fn body(&self) -> &Wasm {
        &self.body
    }

    /// Code-section entry for this function, without the leading size:
    /// run-length encoded local declarations followed by the expression.
    pub fn encode_body(&self) -> Vec<u8> {
        let mut groups: Vec<(u32, u8)> = Vec::new();
        for ty in &self.locals {
            match groups.last_mut() {
                Some((count, enc)) if *enc == ty.encoding() => *count += 1,
                _ => groups.push((1, ty.encoding())),
            }
        }
        let mut buf = Vec::with_capacity(self.body.len() + 1 + groups.len() * 2);
        write_vu32(&mut buf, groups.len() as u32);
        for (count, enc) in groups {
            write_vu32(&mut buf, count);
            buf.push(enc);
        }
        buf.extend_from_slice(self.body.code());
        buf
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FuncKind {
    Import(ImportName),
    Defined(CompiledFunction),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncEntry {
    pub type_index: u32,
    pub kind: FuncKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableEntry {
    pub limits: Limits,
    pub import: Option<ImportName>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryEntry {
    pub limits: Limits,
    pub import: Option<ImportName>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlobalEntry {
    pub ty: ValueType,
    pub mutable: bool,
    /// Initial value; ignored for imports.
    pub init: Value,
    pub import: Option<ImportName>,
}

/// Bytes copied into memory at `offset` during instantiation.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSegment {
    pub offset: u32,
    pub bytes: Vec<u8>,
}

/// Function indices written into `table` starting at `offset`.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementSegment {
    pub table: u32,
    pub offset: u32,
    pub funcs: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Func(u32),
    Table(u32),
    Memory,
    Global(u32),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    pub(crate) types: TypeTable,
    pub(crate) funcs: Vec<FuncEntry>,
    pub(crate) tables: Vec<TableEntry>,
    pub(crate) memory: Option<MemoryEntry>,
    pub(crate) globals: Vec<GlobalEntry>,
    pub(crate) data: Vec<DataSegment>,
    pub(crate) elements: Vec<ElementSegment>,
    pub(crate) start: Option<u32>,
    pub(crate) exports: HashMap<String, ExportKind>,
}

impl Module {
    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    pub fn functions(&self) -> &[FuncEntry] {
        &self.funcs
    }

    pub fn function(&self, index: u32) -> Option<&FuncEntry> {
        self.funcs.get(index as usize)
    }

    /// Signature of the function at `index`.
    pub fn func_type(&self, index: u32) -> Option<&FuncType> {
        self.function(index).and_then(|f| self.types.get(f.type_index))
    }

    /// Compiled body of the function at `index`, if it is not an import.
    pub fn compiled(&self, index: u32) -> Option<&CompiledFunction> {
        match self.function(index) {
            Some(FuncEntry {
                kind: FuncKind::Defined(compiled),
                ..
            }) => Some(compiled),
            _ => None,
        }
    }

    pub fn tables(&self) -> &[TableEntry] {
        &self.tables
    }

    pub fn memory(&self) -> Option<&MemoryEntry> {
        self.memory.as_ref()
    }

    pub fn globals(&self) -> &[GlobalEntry] {
        &self.globals
    }

    pub fn data(&self) -> &[DataSegment] {
        &self.data
    }

    pub fn elements(&self) -> &[ElementSegment] {
        &self.elements
    }

    pub fn start(&self) -> Option<u32> {
        self.start
    }

    pub fn export(&self, name: &str) -> Option<ExportKind> {
        self.exports.get(name).copied()
    }

    pub fn exports(&self) -> impl Iterator<Item = (&str, ExportKind)> {
        self.exports.iter().map(|(name, kind)| (name.as_str(), *kind))
    }
}
