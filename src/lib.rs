//! Build, encode and run WebAssembly functions without an external engine.
//!
//! wasmkit provides a complete in-process pipeline: a typed builder that
//! validates function bodies as they are written, a binary writer that
//! serializes them with Wasm's structured-control and LEB128 conventions,
//! and a stack-machine interpreter that executes the resulting bytecode.
//!
//! # Modules
//!
//! - [`types`] -- Value types, function signatures and the operator tables.
//! - [`expr`] -- Immutable, typed expression trees.
//! - [`builder`] -- [`ModuleBuilder`](builder::ModuleBuilder) and
//!   [`FunctionBuilder`](builder::FunctionBuilder): statements, structured
//!   control, labels, imports and exports.
//! - [`encoding`], [`instr`], [`writer`] -- LEB128 and IEEE754 primitives,
//!   the instruction IR and the [`CodeWriter`](writer::CodeWriter) that
//!   records where every block ends.
//! - [`module`] -- The immutable built [`Module`](module::Module).
//! - [`runtime`] -- Instances, imports, memory, tables and the interpreter.
//!
//! # Example
//!
//! Build a factorial function, instantiate it, and call it:
//!
//! ```
//! use wasmkit::builder::ModuleBuilder;
//! use wasmkit::expr::Expr;
//! use wasmkit::runtime::{ImportObject, Instance, Value};
//! use wasmkit::types::{BinaryOp, RelOp, ValueType};
//!
//! let mut mb = ModuleBuilder::new();
//! let mut f = mb.function(&[ValueType::I64]);
//! let n = f.param(ValueType::I64).unwrap();
//! let acc = f.local(ValueType::I64).unwrap();
//! f.set(acc, Expr::i64(1)).unwrap();
//! let positive = Expr::compare(RelOp::GtS, Expr::local(n), Expr::i64(0)).unwrap();
//! f.while_(positive, |f| {
//!     f.set(acc, Expr::binary(BinaryOp::Mul, Expr::local(acc), Expr::local(n))?)?;
//!     f.set(n, Expr::binary(BinaryOp::Sub, Expr::local(n), Expr::i64(1))?)
//! })
//! .unwrap();
//! f.push(Expr::local(acc)).unwrap();
//! let fac = f.finish().unwrap();
//! mb.export_function("fac", &fac).unwrap();
//!
//! let instance = Instance::new(mb.finish().unwrap(), &ImportObject::new()).unwrap();
//! let results = instance.invoke("fac", &[Value::I64(5)]).unwrap();
//! assert_eq!(results, vec![Value::I64(120)]);
//! ```

pub mod builder;
pub mod encoding;
pub mod error;
pub mod expr;
pub mod instr;
pub mod module;
pub mod opcode;
pub mod runtime;
pub mod types;
pub mod writer;

pub use builder::{FunctionBuilder, ModuleBuilder};
pub use error::BuildError;
pub use expr::Expr;
pub use module::Module;
pub use runtime::{Instance, RuntimeError, Value};
