//! Build-time errors.
//!
//! Everything that can go wrong while constructing expressions, function
//! bodies or modules is reported synchronously as a [`BuildError`] from the
//! offending call. Failures at link or run time are
//! [`RuntimeError`](crate::runtime::RuntimeError)s instead.

use crate::types::ValueType;

fn list(types: &[ValueType]) -> String {
    let names: Vec<String> = types.iter().map(|t| t.to_string()).collect();
    format!("[{}]", names.join(" "))
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BuildError {
    #[error("type mismatch: expected {}, got {}", list(.expected), list(.actual))]
    TypeMismatch {
        expected: Vec<ValueType>,
        actual: Vec<ValueType>,
    },
    #[error("arity mismatch in {context}: expected {expected} values, got {actual}")]
    ArityMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("operator {op} is not defined for {ty}")]
    IllegalOperator { op: String, ty: ValueType },
    #[error("condition must be bool, got {}", list(.0))]
    ConditionNotBool(Vec<ValueType>),
    #[error("label must be followed by block, loop or if")]
    MisplacedLabel,
    #[error("label {0} is not in scope")]
    LabelOutOfScope(u32),
    #[error("a module may declare at most one memory")]
    MultipleMemories,
    #[error("no memory declared")]
    NoMemory,
    #[error("duplicate export name: {0}")]
    DuplicateExport(String),
    #[error("parameters must be declared before locals and statements")]
    ParamAfterBody,
    #[error("locals must be declared before statements")]
    LocalAfterBody,
    #[error("signature mismatch for function {func}: declared {declared}, got {actual}")]
    SignatureMismatch {
        func: u32,
        declared: String,
        actual: String,
    },
    #[error("unknown function: {0}")]
    UnknownFunction(u32),
    #[error("unknown global: {0}")]
    UnknownGlobal(u32),
    #[error("unknown table: {0}")]
    UnknownTable(u32),
    #[error("unknown local {index} of type {ty}")]
    UnknownLocal { index: u32, ty: ValueType },
    #[error("global {0} is immutable")]
    ImmutableGlobal(u32),
    #[error("imports must be declared before definitions of the same kind")]
    ImportAfterDefinition,
    #[error("{0} block(s) left open")]
    UnclosedBlock(usize),
    #[error("no open block to end")]
    NoOpenBlock,
    #[error("else without a matching if")]
    ElseWithoutIf,
    #[error("if with results requires an else branch")]
    MissingElse,
    #[error("start function must have type [] -> []")]
    InvalidStart,
    #[error("forward-declared function {0} has no implementation")]
    UnimplementedForwardDecl(u32),
    #[error("function {0} was never finished")]
    UnfinishedFunction(u32),
    #[error("function {0} already has an implementation")]
    AlreadyImplemented(u32),
}
