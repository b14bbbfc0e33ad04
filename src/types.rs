//! Value types, function signatures and the operator tables.
//!
//! Every arithmetic, unary and relational instruction is described by a
//! `(ValueType, operator)` pair. The lookup functions on [`ValueType`] return
//! the opcode for legal pairs and `None` for everything else, which is how
//! the expression builder rejects e.g. `f32.rem_s` or `i64.sqrt`.

use std::collections::HashMap;
use std::fmt;

use crate::opcode;

/// A value type as seen by the builder.
///
/// `Bool` exists only at build time: it is encoded as `i32` and holds 0 or 1
/// at run time. Relational operators produce it and conditions require it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    I32,
    I64,
    F32,
    F64,
    Bool,
    FuncRef,
}

impl ValueType {
    /// Binary format byte for this type.
    pub fn encoding(self) -> u8 {
        match self {
            ValueType::I32 | ValueType::Bool => 0x7F,
            ValueType::I64 => 0x7E,
            ValueType::F32 => 0x7D,
            ValueType::F64 => 0x7C,
            ValueType::FuncRef => opcode::REF_TYPE_FUNC,
        }
    }

    /// Decodes a value type byte. `0x7F` always decodes as `I32`.
    pub fn from_encoding(byte: u8) -> Option<ValueType> {
        match byte {
            0x7F => Some(ValueType::I32),
            0x7E => Some(ValueType::I64),
            0x7D => Some(ValueType::F32),
            0x7C => Some(ValueType::F64),
            opcode::REF_TYPE_FUNC => Some(ValueType::FuncRef),
            _ => None,
        }
    }

    /// The type values of this type carry at run time.
    pub fn runtime(self) -> ValueType {
        match self {
            ValueType::Bool => ValueType::I32,
            other => other,
        }
    }

    /// Type of a run-time value. Never returns `Bool`.
    pub fn of(value: &crate::runtime::Value) -> ValueType {
        value.typ()
    }

    pub fn is_integer(self) -> bool {
        matches!(self, ValueType::I32 | ValueType::I64)
    }

    pub fn is_float(self) -> bool {
        matches!(self, ValueType::F32 | ValueType::F64)
    }

    /// Opcode for `op` applied to two operands of this type.
    pub fn binary_opcode(self, op: BinaryOp) -> Option<u8> {
        use BinaryOp::*;
        let code = match (self, op) {
            (ValueType::I32, Add) => 0x6A,
            (ValueType::I32, Sub) => 0x6B,
            (ValueType::I32, Mul) => 0x6C,
            (ValueType::I32, DivS) => 0x6D,
            (ValueType::I32, DivU) => 0x6E,
            (ValueType::I32, RemS) => 0x6F,
            (ValueType::I32, RemU) => 0x70,
            (ValueType::I32 | ValueType::Bool, And) => 0x71,
            (ValueType::I32 | ValueType::Bool, Or) => 0x72,
            (ValueType::I32 | ValueType::Bool, Xor) => 0x73,
            (ValueType::I32, Shl) => 0x74,
            (ValueType::I32, ShrS) => 0x75,
            (ValueType::I32, ShrU) => 0x76,
            (ValueType::I32, Rotl) => 0x77,
            (ValueType::I32, Rotr) => 0x78,

            (ValueType::I64, Add) => 0x7C,
            (ValueType::I64, Sub) => 0x7D,
            (ValueType::I64, Mul) => 0x7E,
            (ValueType::I64, DivS) => 0x7F,
            (ValueType::I64, DivU) => 0x80,
            (ValueType::I64, RemS) => 0x81,
            (ValueType::I64, RemU) => 0x82,
            (ValueType::I64, And) => 0x83,
            (ValueType::I64, Or) => 0x84,
            (ValueType::I64, Xor) => 0x85,
            (ValueType::I64, Shl) => 0x86,
            (ValueType::I64, ShrS) => 0x87,
            (ValueType::I64, ShrU) => 0x88,
            (ValueType::I64, Rotl) => 0x89,
            (ValueType::I64, Rotr) => 0x8A,

            (ValueType::F32, Add) => 0x92,
            (ValueType::F32, Sub) => 0x93,
            (ValueType::F32, Mul) => 0x94,
            (ValueType::F32, Div) => 0x95,
            (ValueType::F32, Min) => 0x96,
            (ValueType::F32, Max) => 0x97,
            (ValueType::F32, Copysign) => 0x98,

            (ValueType::F64, Add) => 0xA0,
            (ValueType::F64, Sub) => 0xA1,
            (ValueType::F64, Mul) => 0xA2,
            (ValueType::F64, Div) => 0xA3,
            (ValueType::F64, Min) => 0xA4,
            (ValueType::F64, Max) => 0xA5,
            (ValueType::F64, Copysign) => 0xA6,
            _ => return None,
        };
        Some(code)
    }

    /// Opcode for `op` applied to one operand of this type.
    pub fn unary_opcode(self, op: UnaryOp) -> Option<u8> {
        use UnaryOp::*;
        let code = match (self, op) {
            (ValueType::I32, Eqz) => 0x45,
            (ValueType::I32, Clz) => 0x67,
            (ValueType::I32, Ctz) => 0x68,
            (ValueType::I32, Popcnt) => 0x69,
            (ValueType::I32, Extend8S) => 0xC0,
            (ValueType::I32, Extend16S) => 0xC1,

            (ValueType::I64, Eqz) => 0x50,
            (ValueType::I64, Clz) => 0x79,
            (ValueType::I64, Ctz) => 0x7A,
            (ValueType::I64, Popcnt) => 0x7B,
            (ValueType::I64, Extend8S) => 0xC2,
            (ValueType::I64, Extend16S) => 0xC3,
            (ValueType::I64, Extend32S) => 0xC4,

            (ValueType::F32, Abs) => 0x8B,
            (ValueType::F32, Neg) => 0x8C,
            (ValueType::F32, Ceil) => 0x8D,
            (ValueType::F32, Floor) => 0x8E,
            (ValueType::F32, Trunc) => 0x8F,
            (ValueType::F32, Nearest) => 0x90,
            (ValueType::F32, Sqrt) => 0x91,

            (ValueType::F64, Abs) => 0x99,
            (ValueType::F64, Neg) => 0x9A,
            (ValueType::F64, Ceil) => 0x9B,
            (ValueType::F64, Floor) => 0x9C,
            (ValueType::F64, Trunc) => 0x9D,
            (ValueType::F64, Nearest) => 0x9E,
            (ValueType::F64, Sqrt) => 0x9F,

            (ValueType::Bool, Not) => 0x45,
            (ValueType::FuncRef, IsNull) => opcode::REF_IS_NULL,
            _ => return None,
        };
        Some(code)
    }

    /// Opcode for relational `op` applied to two operands of this type.
    pub fn compare_opcode(self, op: RelOp) -> Option<u8> {
        use RelOp::*;
        let code = match (self, op) {
            (ValueType::I32 | ValueType::Bool, Eq) => 0x46,
            (ValueType::I32 | ValueType::Bool, Ne) => 0x47,
            (ValueType::I32, LtS) => 0x48,
            (ValueType::I32, LtU) => 0x49,
            (ValueType::I32, GtS) => 0x4A,
            (ValueType::I32, GtU) => 0x4B,
            (ValueType::I32, LeS) => 0x4C,
            (ValueType::I32, LeU) => 0x4D,
            (ValueType::I32, GeS) => 0x4E,
            (ValueType::I32, GeU) => 0x4F,

            (ValueType::I64, Eq) => 0x51,
            (ValueType::I64, Ne) => 0x52,
            (ValueType::I64, LtS) => 0x53,
            (ValueType::I64, LtU) => 0x54,
            (ValueType::I64, GtS) => 0x55,
            (ValueType::I64, GtU) => 0x56,
            (ValueType::I64, LeS) => 0x57,
            (ValueType::I64, LeU) => 0x58,
            (ValueType::I64, GeS) => 0x59,
            (ValueType::I64, GeU) => 0x5A,

            (ValueType::F32, Eq) => 0x5B,
            (ValueType::F32, Ne) => 0x5C,
            (ValueType::F32, Lt) => 0x5D,
            (ValueType::F32, Gt) => 0x5E,
            (ValueType::F32, Le) => 0x5F,
            (ValueType::F32, Ge) => 0x60,

            (ValueType::F64, Eq) => 0x61,
            (ValueType::F64, Ne) => 0x62,
            (ValueType::F64, Lt) => 0x63,
            (ValueType::F64, Gt) => 0x64,
            (ValueType::F64, Le) => 0x65,
            (ValueType::F64, Ge) => 0x66,
            _ => return None,
        };
        Some(code)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::I32 => "i32",
            ValueType::I64 => "i64",
            ValueType::F32 => "f32",
            ValueType::F64 => "f64",
            ValueType::Bool => "bool",
            ValueType::FuncRef => "funcref",
        };
        f.write_str(name)
    }
}

/// Two-operand arithmetic and bitwise operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    DivS,
    DivU,
    RemS,
    RemU,
    And,
    Or,
    Xor,
    Shl,
    ShrS,
    ShrU,
    Rotl,
    Rotr,
    /// Float division.
    Div,
    Min,
    Max,
    Copysign,
}

/// One-operand operators, including the integer test `eqz`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Clz,
    Ctz,
    Popcnt,
    Eqz,
    Extend8S,
    Extend16S,
    Extend32S,
    Abs,
    Neg,
    Sqrt,
    Ceil,
    Floor,
    Trunc,
    Nearest,
    /// Logical negation of a `Bool`.
    Not,
    /// `ref.is_null` on a `FuncRef`.
    IsNull,
}

impl UnaryOp {
    /// Result type of this operator applied to `operand`.
    pub fn result_type(self, operand: ValueType) -> ValueType {
        match self {
            UnaryOp::Eqz | UnaryOp::Not | UnaryOp::IsNull => ValueType::Bool,
            _ => operand,
        }
    }
}

/// Relational operators. `Lt`/`Gt`/`Le`/`Ge` are the float forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelOp {
    Eq,
    Ne,
    LtS,
    LtU,
    GtS,
    GtU,
    LeS,
    LeU,
    GeS,
    GeU,
    Lt,
    Gt,
    Le,
    Ge,
}

macro_rules! display_as_debug {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{self:?}")
            }
        })*
    };
}

display_as_debug!(BinaryOp, UnaryOp, RelOp, ConvertOp);

/// Conversions between value types. Each variant has a fixed source and
/// target type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConvertOp {
    I32WrapI64,
    I32TruncF32S,
    I32TruncF32U,
    I32TruncF64S,
    I32TruncF64U,
    I64ExtendI32S,
    I64ExtendI32U,
    I64TruncF32S,
    I64TruncF32U,
    I64TruncF64S,
    I64TruncF64U,
    F32ConvertI32S,
    F32ConvertI32U,
    F32ConvertI64S,
    F32ConvertI64U,
    F32DemoteF64,
    F64ConvertI32S,
    F64ConvertI32U,
    F64ConvertI64S,
    F64ConvertI64U,
    F64PromoteF32,
    I32ReinterpretF32,
    I64ReinterpretF64,
    F32ReinterpretI32,
    F64ReinterpretI64,
    I32TruncSatF32S,
    I32TruncSatF32U,
    I32TruncSatF64S,
    I32TruncSatF64U,
    I64TruncSatF32S,
    I64TruncSatF32U,
    I64TruncSatF64S,
    I64TruncSatF64U,
}

/// How a conversion is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertCode {
    Plain(u8),
    /// `0xFC` prefix followed by a LEB128 sub-opcode.
    Prefixed(u32),
}

impl ConvertOp {
    /// `(from, to, encoding)` for this conversion.
    pub fn signature(self) -> (ValueType, ValueType, ConvertCode) {
        use ConvertCode::{Plain, Prefixed};
        use ConvertOp::*;
        use ValueType::{F32, F64, I32, I64};
        match self {
            I32WrapI64 => (I64, I32, Plain(0xA7)),
            I32TruncF32S => (F32, I32, Plain(0xA8)),
            I32TruncF32U => (F32, I32, Plain(0xA9)),
            I32TruncF64S => (F64, I32, Plain(0xAA)),
            I32TruncF64U => (F64, I32, Plain(0xAB)),
            I64ExtendI32S => (I32, I64, Plain(0xAC)),
            I64ExtendI32U => (I32, I64, Plain(0xAD)),
            I64TruncF32S => (F32, I64, Plain(0xAE)),
            I64TruncF32U => (F32, I64, Plain(0xAF)),
            I64TruncF64S => (F64, I64, Plain(0xB0)),
            I64TruncF64U => (F64, I64, Plain(0xB1)),
            F32ConvertI32S => (I32, F32, Plain(0xB2)),
            F32ConvertI32U => (I32, F32, Plain(0xB3)),
            F32ConvertI64S => (I64, F32, Plain(0xB4)),
            F32ConvertI64U => (I64, F32, Plain(0xB5)),
            F32DemoteF64 => (F64, F32, Plain(0xB6)),
            F64ConvertI32S => (I32, F64, Plain(0xB7)),
            F64ConvertI32U => (I32, F64, Plain(0xB8)),
            F64ConvertI64S => (I64, F64, Plain(0xB9)),
            F64ConvertI64U => (I64, F64, Plain(0xBA)),
            F64PromoteF32 => (F32, F64, Plain(0xBB)),
            I32ReinterpretF32 => (F32, I32, Plain(0xBC)),
            I64ReinterpretF64 => (F64, I64, Plain(0xBD)),
            F32ReinterpretI32 => (I32, F32, Plain(0xBE)),
            F64ReinterpretI64 => (I64, F64, Plain(0xBF)),
            I32TruncSatF32S => (F32, I32, Prefixed(0)),
            I32TruncSatF32U => (F32, I32, Prefixed(1)),
            I32TruncSatF64S => (F64, I32, Prefixed(2)),
            I32TruncSatF64U => (F64, I32, Prefixed(3)),
            I64TruncSatF32S => (F32, I64, Prefixed(4)),
            I64TruncSatF32U => (F32, I64, Prefixed(5)),
            I64TruncSatF64S => (F64, I64, Prefixed(6)),
            I64TruncSatF64U => (F64, I64, Prefixed(7)),
        }
    }

    pub fn from(self) -> ValueType {
        self.signature().0
    }

    pub fn to(self) -> ValueType {
        self.signature().1
    }
}

/// Memory load instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadOp {
    I32Load,
    I64Load,
    F32Load,
    F64Load,
    I32Load8S,
    I32Load8U,
    I32Load16S,
    I32Load16U,
    I64Load8S,
    I64Load8U,
    I64Load16S,
    I64Load16U,
    I64Load32S,
    I64Load32U,
}

const LOADS: [LoadOp; 14] = [
    LoadOp::I32Load,
    LoadOp::I64Load,
    LoadOp::F32Load,
    LoadOp::F64Load,
    LoadOp::I32Load8S,
    LoadOp::I32Load8U,
    LoadOp::I32Load16S,
    LoadOp::I32Load16U,
    LoadOp::I64Load8S,
    LoadOp::I64Load8U,
    LoadOp::I64Load16S,
    LoadOp::I64Load16U,
    LoadOp::I64Load32S,
    LoadOp::I64Load32U,
];

impl LoadOp {
    pub fn opcode(self) -> u8 {
        opcode::LOAD_FIRST + self as u8
    }

    pub fn from_opcode(op: u8) -> Option<LoadOp> {
        op.checked_sub(opcode::LOAD_FIRST)
            .and_then(|i| LOADS.get(i as usize))
            .copied()
    }

    pub fn result_type(self) -> ValueType {
        use LoadOp::*;
        match self {
            I32Load | I32Load8S | I32Load8U | I32Load16S | I32Load16U => ValueType::I32,
            F32Load => ValueType::F32,
            F64Load => ValueType::F64,
            _ => ValueType::I64,
        }
    }

    /// Number of bytes read.
    pub fn width(self) -> u32 {
        use LoadOp::*;
        match self {
            I32Load8S | I32Load8U | I64Load8S | I64Load8U => 1,
            I32Load16S | I32Load16U | I64Load16S | I64Load16U => 2,
            I32Load | F32Load | I64Load32S | I64Load32U => 4,
            I64Load | F64Load => 8,
        }
    }

    /// log2 of the natural alignment, as written in the memarg.
    pub fn natural_alignment(self) -> u32 {
        self.width().trailing_zeros()
    }
}

/// Memory store instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    I32Store,
    I64Store,
    F32Store,
    F64Store,
    I32Store8,
    I32Store16,
    I64Store8,
    I64Store16,
    I64Store32,
}

const STORES: [StoreOp; 9] = [
    StoreOp::I32Store,
    StoreOp::I64Store,
    StoreOp::F32Store,
    StoreOp::F64Store,
    StoreOp::I32Store8,
    StoreOp::I32Store16,
    StoreOp::I64Store8,
    StoreOp::I64Store16,
    StoreOp::I64Store32,
];

impl StoreOp {
    pub fn opcode(self) -> u8 {
        opcode::STORE_FIRST + self as u8
    }

    pub fn from_opcode(op: u8) -> Option<StoreOp> {
        op.checked_sub(opcode::STORE_FIRST)
            .and_then(|i| STORES.get(i as usize))
            .copied()
    }

    /// Type of the stored operand.
    pub fn value_type(self) -> ValueType {
        use StoreOp::*;
        match self {
            I32Store | I32Store8 | I32Store16 => ValueType::I32,
            F32Store => ValueType::F32,
            F64Store => ValueType::F64,
            I64Store | I64Store8 | I64Store16 | I64Store32 => ValueType::I64,
        }
    }

    pub fn width(self) -> u32 {
        use StoreOp::*;
        match self {
            I32Store8 | I64Store8 => 1,
            I32Store16 | I64Store16 => 2,
            I32Store | F32Store | I64Store32 => 4,
            I64Store | F64Store => 8,
        }
    }

    pub fn natural_alignment(self) -> u32 {
        self.width().trailing_zeros()
    }
}

/// A function signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FuncType {
    pub results: Vec<ValueType>,
    pub params: Vec<ValueType>,
}

impl FuncType {
    pub fn new(params: impl Into<Vec<ValueType>>, results: impl Into<Vec<ValueType>>) -> Self {
        FuncType {
            results: results.into(),
            params: params.into(),
        }
    }

    /// True when both signatures have the same binary encoding, i.e. they
    /// are equal once `Bool` is read as `i32`.
    pub fn matches_encoding(&self, other: &FuncType) -> bool {
        fn same(a: &[ValueType], b: &[ValueType]) -> bool {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.encoding() == y.encoding())
        }
        same(&self.params, &other.params) && same(&self.results, &other.results)
    }
}

impl fmt::Display for FuncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(func")?;
        if !self.params.is_empty() {
            write!(f, " (param")?;
            for p in &self.params {
                write!(f, " {p}")?;
            }
            write!(f, ")")?;
        }
        if !self.results.is_empty() {
            write!(f, " (result")?;
            for r in &self.results {
                write!(f, " {r}")?;
            }
            write!(f, ")")?;
        }
        write!(f, ")")
    }
}

/// Interning table for function signatures. Structurally equal signatures
/// always receive the same index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeTable {
    types: Vec<FuncType>,
    index: HashMap<FuncType, u32>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the index of `ty`, adding it if not yet present.
    pub fn intern(&mut self, ty: FuncType) -> u32 {
        if let Some(&idx) = self.index.get(&ty) {
            return idx;
        }
        let idx = self.types.len() as u32;
        self.types.push(ty.clone());
        self.index.insert(ty, idx);
        idx
    }

    pub fn get(&self, index: u32) -> Option<&FuncType> {
        self.types.get(index as usize)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FuncType> {
        self.types.iter()
    }
}
