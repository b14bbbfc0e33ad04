//! Instruction-level IR.
//!
//! The builder collects a function body as a flat `Vec<Instr>`; the
//! [`CodeWriter`](crate::writer::CodeWriter) turns that list into bytes in a
//! single pass. The interpreter decodes bytes back into `Instr` one at a
//! time.

use std::fmt;

use fhex::ToHex;

use crate::encoding::{write_f32, write_f64, write_vs32, write_vs64, write_vu32};
use crate::opcode;
use crate::types::{LoadOp, StoreOp, ValueType};

/// Result signature of a structured block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    Empty,
    Value(ValueType),
    /// Multi-value block; index into the module's type table.
    Func(u32),
}

impl BlockType {
    pub fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            BlockType::Empty => buf.push(opcode::BLOCK_TYPE_EMPTY),
            BlockType::Value(ty) => buf.push(ty.encoding()),
            BlockType::Func(index) => write_vs64(buf, *index as i64),
        }
    }
}

/// Alignment hint (log2) and static offset of a memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemArg {
    pub align: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    Unreachable,
    Nop,
    Block(BlockType),
    Loop(BlockType),
    If(BlockType),
    Else,
    End,
    Br(u32),
    BrIf(u32),
    BrTable(Vec<u32>, u32),
    Return,
    Call(u32),
    CallIndirect { type_index: u32, table: u32 },
    Drop,
    Select,
    SelectTyped(ValueType),
    LocalGet(u32),
    LocalSet(u32),
    LocalTee(u32),
    GlobalGet(u32),
    GlobalSet(u32),
    Load(LoadOp, MemArg),
    Store(StoreOp, MemArg),
    MemorySize,
    MemoryGrow,
    I32Const(i32),
    I64Const(i64),
    F32Const(f32),
    F64Const(f64),
    RefNull,
    RefIsNull,
    RefFunc(u32),
    /// Any single-byte numeric instruction in `0x45..=0xC4`.
    Numeric(u8),
    /// `0xFC`-prefixed instruction.
    Prefixed(u32),
}

impl Instr {
    /// Leading opcode byte.
    pub fn opcode(&self) -> u8 {
        use Instr::*;
        match self {
            Unreachable => opcode::UNREACHABLE,
            Nop => opcode::NOP,
            Block(_) => opcode::BLOCK,
            Loop(_) => opcode::LOOP,
            If(_) => opcode::IF,
            Else => opcode::ELSE,
            End => opcode::END,
            Br(_) => opcode::BR,
            BrIf(_) => opcode::BR_IF,
            BrTable(..) => opcode::BR_TABLE,
            Return => opcode::RETURN,
            Call(_) => opcode::CALL,
            CallIndirect { .. } => opcode::CALL_INDIRECT,
            Drop => opcode::DROP,
            Select => opcode::SELECT,
            SelectTyped(_) => opcode::SELECT_T,
            LocalGet(_) => opcode::LOCAL_GET,
            LocalSet(_) => opcode::LOCAL_SET,
            LocalTee(_) => opcode::LOCAL_TEE,
            GlobalGet(_) => opcode::GLOBAL_GET,
            GlobalSet(_) => opcode::GLOBAL_SET,
            Load(op, _) => op.opcode(),
            Store(op, _) => op.opcode(),
            MemorySize => opcode::MEMORY_SIZE,
            MemoryGrow => opcode::MEMORY_GROW,
            I32Const(_) => opcode::I32_CONST,
            I64Const(_) => opcode::I64_CONST,
            F32Const(_) => opcode::F32_CONST,
            F64Const(_) => opcode::F64_CONST,
            RefNull => opcode::REF_NULL,
            RefIsNull => opcode::REF_IS_NULL,
            RefFunc(_) => opcode::REF_FUNC,
            Numeric(op) => *op,
            Prefixed(_) => opcode::PREFIX_FC,
        }
    }

    /// Appends the binary encoding of this instruction to `buf`.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(self.opcode());
        match self {
            Instr::Block(bt) | Instr::Loop(bt) | Instr::If(bt) => bt.encode(buf),
            Instr::Br(depth) | Instr::BrIf(depth) => write_vu32(buf, *depth),
            Instr::BrTable(labels, default) => {
                write_vu32(buf, labels.len() as u32);
                for label in labels {
                    write_vu32(buf, *label);
                }
                write_vu32(buf, *default);
            }
            Instr::Call(index)
            | Instr::LocalGet(index)
            | Instr::LocalSet(index)
            | Instr::LocalTee(index)
            | Instr::GlobalGet(index)
            | Instr::GlobalSet(index)
            | Instr::RefFunc(index) => write_vu32(buf, *index),
            Instr::CallIndirect { type_index, table } => {
                write_vu32(buf, *type_index);
                write_vu32(buf, *table);
            }
            Instr::Load(_, memarg) | Instr::Store(_, memarg) => {
                write_vu32(buf, memarg.align);
                write_vu32(buf, memarg.offset);
            }
            // Reserved memory index byte.
            Instr::MemorySize | Instr::MemoryGrow => buf.push(0x00),
            Instr::I32Const(v) => write_vs32(buf, *v),
            Instr::I64Const(v) => write_vs64(buf, *v),
            Instr::F32Const(v) => write_f32(buf, *v),
            Instr::F64Const(v) => write_f64(buf, *v),
            Instr::RefNull => buf.push(opcode::REF_TYPE_FUNC),
            Instr::SelectTyped(ty) => {
                write_vu32(buf, 1);
                buf.push(ty.encoding());
            }
            Instr::Prefixed(sub) => write_vu32(buf, *sub),
            _ => {}
        }
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Instr::Prefixed(sub) => opcode::prefixed_name(*sub),
            other => opcode::name(other.opcode()),
        };
        f.write_str(name.unwrap_or("<unknown>"))?;
        match self {
            Instr::Br(n)
            | Instr::BrIf(n)
            | Instr::Call(n)
            | Instr::LocalGet(n)
            | Instr::LocalSet(n)
            | Instr::LocalTee(n)
            | Instr::GlobalGet(n)
            | Instr::GlobalSet(n)
            | Instr::RefFunc(n) => write!(f, " {n}"),
            Instr::BrTable(labels, default) => {
                for l in labels {
                    write!(f, " {l}")?;
                }
                write!(f, " {default}")
            }
            Instr::CallIndirect { type_index, table } => write!(f, " {table} (type {type_index})"),
            Instr::Load(_, m) | Instr::Store(_, m) if m.offset != 0 => write!(f, " offset={}", m.offset),
            Instr::I32Const(v) => write!(f, " {v}"),
            Instr::I64Const(v) => write!(f, " {v}"),
            Instr::F32Const(v) => write!(f, " {}", v.to_hex()),
            Instr::F64Const(v) => write!(f, " {}", v.to_hex()),
            Instr::RefNull => write!(f, " func"),
            Instr::SelectTyped(ty) => write!(f, " (result {ty})"),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(instr: Instr) -> Vec<u8> {
        let mut buf = Vec::new();
        instr.encode(&mut buf);
        buf
    }

    #[test]
    fn test_encode_immediates() {
        assert_eq!(bytes(Instr::I32Const(-1)), vec![0x41, 0x7f]);
        assert_eq!(bytes(Instr::I64Const(128)), vec![0x42, 0x80, 0x01]);
        assert_eq!(bytes(Instr::Block(BlockType::Empty)), vec![0x02, 0x40]);
        assert_eq!(bytes(Instr::If(BlockType::Value(ValueType::I64))), vec![0x04, 0x7e]);
        assert_eq!(bytes(Instr::Loop(BlockType::Func(3))), vec![0x03, 0x03]);
        assert_eq!(bytes(Instr::BrTable(vec![0, 2], 1)), vec![0x0e, 0x02, 0x00, 0x02, 0x01]);
        assert_eq!(
            bytes(Instr::Load(LoadOp::I32Load8U, MemArg { align: 0, offset: 20 })),
            vec![0x2d, 0x00, 0x14]
        );
        assert_eq!(bytes(Instr::CallIndirect { type_index: 1, table: 0 }), vec![0x11, 0x01, 0x00]);
        assert_eq!(bytes(Instr::MemoryGrow), vec![0x40, 0x00]);
        assert_eq!(bytes(Instr::SelectTyped(ValueType::FuncRef)), vec![0x1c, 0x01, 0x70]);
        assert_eq!(bytes(Instr::Prefixed(5)), vec![0xfc, 0x05]);
        assert_eq!(bytes(Instr::Numeric(0x6a)), vec![0x6a]);
    }

    #[test]
    fn test_display() {
        assert_eq!(Instr::LocalGet(2).to_string(), "local.get 2");
        assert_eq!(Instr::Numeric(0x7c).to_string(), "i64.add");
        assert_eq!(Instr::Prefixed(0).to_string(), "i32.trunc_sat_f32_s");
        assert_eq!(Instr::SelectTyped(ValueType::FuncRef).to_string(), "select (result funcref)");
        assert_eq!(
            Instr::Load(LoadOp::I64Load, MemArg { align: 3, offset: 8 }).to_string(),
            "i64.load offset=8"
        );
    }
}
