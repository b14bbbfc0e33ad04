//! Typed expression trees.
//!
//! An [`Expr`] is an immutable, cheaply clonable node describing code in
//! expression position: something that leaves zero or more values on the
//! stack. Every constructor checks operand types against the operator tables
//! in [`crate::types`], so an `Expr` that exists is well typed. Statements
//! (stores, branches, local writes) are not expressions; the function
//! builder emits those directly.
//!
//! `Display` renders the tree as an S-expression in text-format style:
//!
//! ```
//! use wasmkit::expr::Expr;
//! use wasmkit::types::BinaryOp;
//!
//! let e = Expr::binary(BinaryOp::Add, Expr::i32(1), Expr::i32(2)).unwrap();
//! assert_eq!(e.to_string(), "(i32.add (i32.const 1) (i32.const 2))");
//! ```

use std::fmt;
use std::rc::Rc;

use fhex::ToHex;

use crate::error::BuildError;
use crate::instr::{Instr, MemArg};
use crate::module::{Func, Global, Local, Signature, TableId};
use crate::opcode;
use crate::runtime::Value;
use crate::types::{BinaryOp, ConvertCode, ConvertOp, LoadOp, RelOp, UnaryOp, ValueType};

#[derive(Debug)]
pub(crate) enum ExprKind {
    Const(Value),
    /// A constant typed as `bool`.
    Bool(bool),
    LocalGet(Local),
    LocalTee(Local, Expr),
    GlobalGet(Global),
    Unary { opcode: u8, operand: Expr },
    Binary { opcode: u8, lhs: Expr, rhs: Expr },
    Compare { opcode: u8, lhs: Expr, rhs: Expr },
    Convert { op: ConvertOp, operand: Expr },
    /// Reads a `bool` as an `i32`; emits no code.
    BoolToI32(Expr),
    Load { op: LoadOp, offset: u32, addr: Expr },
    MemorySize,
    MemoryGrow(Expr),
    Select { cond: Expr, then: Expr, otherwise: Expr },
    Call { func: Func, args: Vec<Expr> },
    CallIndirect { signature: Signature, table: TableId, index: Expr, args: Vec<Expr> },
    RefNull,
    RefFunc(Func),
}

#[derive(Debug)]
struct Node {
    kind: ExprKind,
    results: Vec<ValueType>,
}

#[derive(Debug, Clone)]
pub struct Expr(Rc<Node>);

fn single(expr: &Expr) -> Result<ValueType, BuildError> {
    match expr.result_types() {
        [ty] => Ok(*ty),
        other => Err(BuildError::ArityMismatch {
            context: "operand",
            expected: 1,
            actual: other.len(),
        }),
    }
}

fn expect_type(expr: &Expr, expected: ValueType) -> Result<(), BuildError> {
    let actual = single(expr)?;
    if actual != expected {
        return Err(BuildError::TypeMismatch {
            expected: vec![expected],
            actual: vec![actual],
        });
    }
    Ok(())
}

fn expect_bool(expr: &Expr) -> Result<(), BuildError> {
    match expr.result_types() {
        [ValueType::Bool] => Ok(()),
        other => Err(BuildError::ConditionNotBool(other.to_vec())),
    }
}

/// Checks that the concatenated results of `args` match `params`.
fn check_args(args: &[Expr], params: &[ValueType]) -> Result<(), BuildError> {
    let actual: Vec<ValueType> = args.iter().flat_map(|a| a.result_types().iter().copied()).collect();
    if actual.len() != params.len() {
        return Err(BuildError::ArityMismatch {
            context: "call arguments",
            expected: params.len(),
            actual: actual.len(),
        });
    }
    if actual != params {
        return Err(BuildError::TypeMismatch {
            expected: params.to_vec(),
            actual,
        });
    }
    Ok(())
}

impl Expr {
    fn new(kind: ExprKind, results: Vec<ValueType>) -> Expr {
        Expr(Rc::new(Node { kind, results }))
    }

    pub(crate) fn kind(&self) -> &ExprKind {
        &self.0.kind
    }

    /// Types this expression leaves on the stack, bottom first.
    pub fn result_types(&self) -> &[ValueType] {
        &self.0.results
    }

    // -- Constants --

    pub fn i32(value: i32) -> Expr {
        Expr::constant(Value::I32(value))
    }

    pub fn i64(value: i64) -> Expr {
        Expr::constant(Value::I64(value))
    }

    pub fn f32(value: f32) -> Expr {
        Expr::constant(Value::F32(value))
    }

    pub fn f64(value: f64) -> Expr {
        Expr::constant(Value::F64(value))
    }

    pub fn bool(value: bool) -> Expr {
        Expr::new(ExprKind::Bool(value), vec![ValueType::Bool])
    }

    pub fn constant(value: Value) -> Expr {
        Expr::new(ExprKind::Const(value), vec![value.typ()])
    }

    // -- Variables --

    pub fn local(local: Local) -> Expr {
        Expr::new(ExprKind::LocalGet(local), vec![local.ty])
    }

    /// Stores `value` into `local` and yields it.
    pub fn tee(local: Local, value: Expr) -> Result<Expr, BuildError> {
        expect_type(&value, local.ty)?;
        Ok(Expr::new(ExprKind::LocalTee(local, value), vec![local.ty]))
    }

    pub fn global(global: Global) -> Expr {
        Expr::new(ExprKind::GlobalGet(global), vec![global.ty])
    }

    // -- Operators --

    pub fn unary(op: UnaryOp, operand: Expr) -> Result<Expr, BuildError> {
        let ty = single(&operand)?;
        let opcode = ty.unary_opcode(op).ok_or_else(|| BuildError::IllegalOperator {
            op: op.to_string(),
            ty,
        })?;
        Ok(Expr::new(
            ExprKind::Unary { opcode, operand },
            vec![op.result_type(ty)],
        ))
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Result<Expr, BuildError> {
        let ty = single(&lhs)?;
        expect_type(&rhs, ty)?;
        let opcode = ty.binary_opcode(op).ok_or_else(|| BuildError::IllegalOperator {
            op: op.to_string(),
            ty,
        })?;
        Ok(Expr::new(ExprKind::Binary { opcode, lhs, rhs }, vec![ty]))
    }

    pub fn compare(op: RelOp, lhs: Expr, rhs: Expr) -> Result<Expr, BuildError> {
        let ty = single(&lhs)?;
        expect_type(&rhs, ty)?;
        let opcode = ty.compare_opcode(op).ok_or_else(|| BuildError::IllegalOperator {
            op: op.to_string(),
            ty,
        })?;
        Ok(Expr::new(
            ExprKind::Compare { opcode, lhs, rhs },
            vec![ValueType::Bool],
        ))
    }

    pub fn convert(op: ConvertOp, operand: Expr) -> Result<Expr, BuildError> {
        expect_type(&operand, op.from())?;
        Ok(Expr::new(ExprKind::Convert { op, operand }, vec![op.to()]))
    }

    /// Logical negation of a `bool`.
    pub fn not(operand: Expr) -> Result<Expr, BuildError> {
        expect_bool(&operand)?;
        Expr::unary(UnaryOp::Not, operand)
    }

    /// Treats a `bool` as the `i32` 0 or 1.
    pub fn bool_to_i32(operand: Expr) -> Result<Expr, BuildError> {
        expect_bool(&operand)?;
        Ok(Expr::new(ExprKind::BoolToI32(operand), vec![ValueType::I32]))
    }

    // -- Memory --

    /// Loads from linear memory at `addr + offset`.
    pub fn load(op: LoadOp, offset: u32, addr: Expr) -> Result<Expr, BuildError> {
        expect_type(&addr, ValueType::I32)?;
        Ok(Expr::new(
            ExprKind::Load { op, offset, addr },
            vec![op.result_type()],
        ))
    }

    /// Current memory size in pages.
    pub fn memory_size() -> Expr {
        Expr::new(ExprKind::MemorySize, vec![ValueType::I32])
    }

    /// Grows memory by `pages`, yielding the old size or -1.
    pub fn memory_grow(pages: Expr) -> Result<Expr, BuildError> {
        expect_type(&pages, ValueType::I32)?;
        Ok(Expr::new(ExprKind::MemoryGrow(pages), vec![ValueType::I32]))
    }

    // -- Parametric --

    /// `then` if `cond` holds, otherwise `otherwise`. Both are evaluated.
    pub fn select(cond: Expr, then: Expr, otherwise: Expr) -> Result<Expr, BuildError> {
        expect_bool(&cond)?;
        let ty = single(&then)?;
        expect_type(&otherwise, ty)?;
        Ok(Expr::new(
            ExprKind::Select { cond, then, otherwise },
            vec![ty],
        ))
    }

    // -- Calls --

    pub fn call(func: &Func, args: Vec<Expr>) -> Result<Expr, BuildError> {
        check_args(&args, func.signature.params())?;
        let results = func.signature.results().to_vec();
        Ok(Expr::new(
            ExprKind::Call {
                func: func.clone(),
                args,
            },
            results,
        ))
    }

    /// Calls the function stored at `index` in `table`, which must have
    /// type `signature` at run time.
    pub fn call_indirect(
        signature: &Signature,
        table: TableId,
        index: Expr,
        args: Vec<Expr>,
    ) -> Result<Expr, BuildError> {
        expect_type(&index, ValueType::I32)?;
        check_args(&args, signature.params())?;
        let results = signature.results().to_vec();
        Ok(Expr::new(
            ExprKind::CallIndirect {
                signature: signature.clone(),
                table,
                index,
                args,
            },
            results,
        ))
    }

    // -- References --

    pub fn ref_null() -> Expr {
        Expr::new(ExprKind::RefNull, vec![ValueType::FuncRef])
    }

    pub fn ref_func(func: &Func) -> Expr {
        Expr::new(ExprKind::RefFunc(func.clone()), vec![ValueType::FuncRef])
    }

    pub fn ref_is_null(operand: Expr) -> Result<Expr, BuildError> {
        Expr::unary(UnaryOp::IsNull, operand)
    }

    /// Direct children, in evaluation order.
    pub(crate) fn children(&self) -> Vec<&Expr> {
        match &self.0.kind {
            ExprKind::LocalTee(_, e)
            | ExprKind::Unary { operand: e, .. }
            | ExprKind::Convert { operand: e, .. }
            | ExprKind::BoolToI32(e)
            | ExprKind::Load { addr: e, .. }
            | ExprKind::MemoryGrow(e) => vec![e],
            ExprKind::Binary { lhs, rhs, .. } | ExprKind::Compare { lhs, rhs, .. } => vec![lhs, rhs],
            ExprKind::Select { cond, then, otherwise } => vec![then, otherwise, cond],
            ExprKind::Call { args, .. } => args.iter().collect(),
            ExprKind::CallIndirect { args, index, .. } => args.iter().chain(std::iter::once(index)).collect(),
            _ => Vec::new(),
        }
    }

    /// Calls `visit` on this node and every descendant, parents first.
    pub(crate) fn walk<E>(&self, visit: &mut impl FnMut(&Expr) -> Result<(), E>) -> Result<(), E> {
        visit(self)?;
        for child in self.children() {
            child.walk(visit)?;
        }
        Ok(())
    }

    /// Appends the instructions computing this expression to `out`.
    pub(crate) fn lower(&self, out: &mut Vec<Instr>) {
        for child in self.children() {
            child.lower(out);
        }
        match &self.0.kind {
            ExprKind::Const(value) => out.push(const_instr(*value)),
            ExprKind::Bool(b) => out.push(Instr::I32Const(*b as i32)),
            ExprKind::LocalGet(local) => out.push(Instr::LocalGet(local.index)),
            ExprKind::LocalTee(local, _) => out.push(Instr::LocalTee(local.index)),
            ExprKind::GlobalGet(global) => out.push(Instr::GlobalGet(global.index)),
            ExprKind::Unary { opcode, .. } if *opcode == opcode::REF_IS_NULL => out.push(Instr::RefIsNull),
            ExprKind::Unary { opcode, .. }
            | ExprKind::Binary { opcode, .. }
            | ExprKind::Compare { opcode, .. } => out.push(Instr::Numeric(*opcode)),
            ExprKind::Convert { op, .. } => out.push(match op.signature().2 {
                ConvertCode::Plain(code) => Instr::Numeric(code),
                ConvertCode::Prefixed(sub) => Instr::Prefixed(sub),
            }),
            ExprKind::BoolToI32(_) => {}
            ExprKind::Load { op, offset, .. } => out.push(Instr::Load(
                *op,
                MemArg {
                    align: op.natural_alignment(),
                    offset: *offset,
                },
            )),
            ExprKind::MemorySize => out.push(Instr::MemorySize),
            ExprKind::MemoryGrow(_) => out.push(Instr::MemoryGrow),
            ExprKind::Select { then, .. } => match then.result_types() {
                [ValueType::FuncRef] => out.push(Instr::SelectTyped(ValueType::FuncRef)),
                _ => out.push(Instr::Select),
            },
            ExprKind::Call { func, .. } => out.push(Instr::Call(func.index)),
            ExprKind::CallIndirect { signature, table, .. } => out.push(Instr::CallIndirect {
                type_index: signature.index,
                table: table.0,
            }),
            ExprKind::RefNull => out.push(Instr::RefNull),
            ExprKind::RefFunc(func) => out.push(Instr::RefFunc(func.index)),
        }
    }
}

fn const_instr(value: Value) -> Instr {
    match value {
        Value::I32(v) => Instr::I32Const(v),
        Value::I64(v) => Instr::I64Const(v),
        Value::F32(v) => Instr::F32Const(v),
        Value::F64(v) => Instr::F64Const(v),
        Value::FuncRef(None) => Instr::RefNull,
        Value::FuncRef(Some(index)) => Instr::RefFunc(index),
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let head = match &self.0.kind {
            ExprKind::Const(Value::I32(v)) => return write!(f, "(i32.const {v})"),
            ExprKind::Const(Value::I64(v)) => return write!(f, "(i64.const {v})"),
            ExprKind::Const(Value::F32(v)) => return write!(f, "(f32.const {})", v.to_hex()),
            ExprKind::Const(Value::F64(v)) => return write!(f, "(f64.const {})", v.to_hex()),
            ExprKind::Const(Value::FuncRef(None)) | ExprKind::RefNull => return write!(f, "(ref.null func)"),
            ExprKind::Const(Value::FuncRef(Some(i))) => return write!(f, "(ref.func {i})"),
            ExprKind::RefFunc(func) => return write!(f, "(ref.func {})", func.index),
            ExprKind::Bool(b) => return write!(f, "(i32.const {})", *b as i32),
            ExprKind::LocalGet(local) => return write!(f, "(local.get {})", local.index),
            ExprKind::GlobalGet(global) => return write!(f, "(global.get {})", global.index),
            ExprKind::MemorySize => return write!(f, "(memory.size)"),
            ExprKind::BoolToI32(inner) => return write!(f, "{inner}"),
            ExprKind::LocalTee(local, _) => format!("local.tee {}", local.index),
            ExprKind::Unary { opcode, .. }
            | ExprKind::Binary { opcode, .. }
            | ExprKind::Compare { opcode, .. } => opcode::name(*opcode).unwrap_or("?").to_string(),
            ExprKind::Convert { op, .. } => match op.signature().2 {
                ConvertCode::Plain(code) => opcode::name(code),
                ConvertCode::Prefixed(sub) => opcode::prefixed_name(sub),
            }
            .unwrap_or("?")
            .to_string(),
            ExprKind::Load { op, offset: 0, .. } => opcode::name(op.opcode()).unwrap_or("?").to_string(),
            ExprKind::Load { op, offset, .. } => {
                format!("{} offset={offset}", opcode::name(op.opcode()).unwrap_or("?"))
            }
            ExprKind::MemoryGrow(_) => "memory.grow".to_string(),
            ExprKind::Select { .. } => "select".to_string(),
            ExprKind::Call { func, .. } => format!("call {}", func.index),
            ExprKind::CallIndirect { signature, table, .. } => {
                format!("call_indirect {} (type {})", table.0, signature.index)
            }
        };
        write!(f, "({head}")?;
        for child in self.children() {
            write!(f, " {child}")?;
        }
        write!(f, ")")
    }
}
