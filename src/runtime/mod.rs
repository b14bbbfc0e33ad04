//! Execution of built modules
//!
//! An [`Instance`] binds a [`Module`](crate::module::Module) to its imports
//! and owns the memory, tables and globals it defines. Exported functions
//! run on a stack-machine interpreter that decodes the compiled bytecode
//! directly, using the writer's position maps to resolve structured control
//! flow.

pub mod control;
pub mod decode;
pub mod imports;
pub mod instance;
pub mod interpreter;
pub mod memory;
pub mod ops;
pub mod stack;
pub mod table;
pub mod test_utils;
pub mod value;

pub use imports::{HostFunc, ImportObject, SharedGlobal, SharedMemory, SharedTable};
pub use instance::Instance;
pub use interpreter::{Interpreter, Step};
pub use memory::Memory;
pub use table::Table;
pub use value::Value;

/// Default bound on nested calls.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 10_000;

/// Interpreter settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Maximum number of active frames before a call fails with
    /// [`RuntimeError::CallStackOverflow`].
    pub max_call_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Stack underflow")]
    StackUnderflow,
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },
    #[error("Unknown export: {0}")]
    UnknownExport(String),
    #[error("Function index out of bounds: {0}")]
    FunctionIndexOutOfBounds(u32),
    #[error("Unimplemented instruction: {0}")]
    UnimplementedInstruction(String),
    #[error("Local variable index out of bounds: {0}")]
    LocalIndexOutOfBounds(u32),
    #[error("Global variable index out of bounds: {0}")]
    GlobalIndexOutOfBounds(u32),
    #[error("Invalid label: {0}")]
    InvalidLabel(u32),
    #[error("Memory error: {0}")]
    MemoryError(String),
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Integer overflow")]
    IntegerOverflow,
    #[error("Invalid conversion: {0}")]
    InvalidConversion(String),
    #[error("Trap: {0}")]
    Trap(String),
    #[error("Call stack overflow")]
    CallStackOverflow,
    #[error("Table index out of bounds: {0}")]
    TableIndexOutOfBounds(u32),
    #[error("Table size exceeded")]
    TableSizeExceeded,
    #[error("Undefined table element: {0}")]
    UndefinedElement(u32),
    #[error("Indirect call type mismatch: expected {expected}, got {actual}")]
    IndirectCallTypeMismatch { expected: String, actual: String },
    #[error("Unresolved import: {module}.{name}")]
    UnresolvedImport { module: String, name: String },
    #[error("Import type mismatch for {module}.{name}: expected {expected}, got {actual}")]
    ImportTypeMismatch {
        module: String,
        name: String,
        expected: String,
        actual: String,
    },
    #[error("Argument count mismatch: expected {expected}, got {actual}")]
    ArgumentCountMismatch { expected: usize, actual: usize },
    #[error("Result count mismatch: expected {expected}, got {actual}")]
    ResultMismatch { expected: usize, actual: usize },
    #[error("Immutable global: {0}")]
    ImmutableGlobal(String),
    #[error("No jump target recorded for construct at {0}")]
    MissingJumpTarget(usize),
    #[error("Malformed code: {0}")]
    Decode(#[from] std::io::Error),
}
