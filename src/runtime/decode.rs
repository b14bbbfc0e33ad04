//! Decoding of compiled code, one instruction at a time.

use std::io;

use crate::encoding::CodeReader;
use crate::instr::{BlockType, Instr, MemArg};
use crate::opcode;
use crate::types::{LoadOp, StoreOp, ValueType};

use super::RuntimeError;

fn block_type(reader: &mut CodeReader<'_>) -> Result<BlockType, RuntimeError> {
    let Some(byte) = reader.peek_u8() else {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "missing block type").into());
    };
    if byte == opcode::BLOCK_TYPE_EMPTY {
        reader.read_u8()?;
        return Ok(BlockType::Empty);
    }
    if let Some(ty) = ValueType::from_encoding(byte) {
        reader.read_u8()?;
        return Ok(BlockType::Value(ty));
    }
    let index = reader.read_vs64()?;
    u32::try_from(index)
        .map(BlockType::Func)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "negative block type index").into())
}

fn memarg(reader: &mut CodeReader<'_>) -> Result<MemArg, RuntimeError> {
    let align = reader.read_vu32()?;
    let offset = reader.read_vu32()?;
    Ok(MemArg { align, offset })
}

/// Decodes the instruction at the reader's position and advances past it.
///
/// # Errors
/// `Decode` on truncated or malformed immediates, `UnimplementedInstruction`
/// on an opcode outside the supported set.
pub fn decode(reader: &mut CodeReader<'_>) -> Result<Instr, RuntimeError> {
    let op = reader.read_u8()?;
    Ok(match op {
        opcode::UNREACHABLE => Instr::Unreachable,
        opcode::NOP => Instr::Nop,
        opcode::BLOCK => Instr::Block(block_type(reader)?),
        opcode::LOOP => Instr::Loop(block_type(reader)?),
        opcode::IF => Instr::If(block_type(reader)?),
        opcode::ELSE => Instr::Else,
        opcode::END => Instr::End,
        opcode::BR => Instr::Br(reader.read_vu32()?),
        opcode::BR_IF => Instr::BrIf(reader.read_vu32()?),
        opcode::BR_TABLE => {
            let count = reader.read_vu32()?;
            let mut labels = Vec::with_capacity(count.min(1024) as usize);
            for _ in 0..count {
                labels.push(reader.read_vu32()?);
            }
            Instr::BrTable(labels, reader.read_vu32()?)
        }
        opcode::RETURN => Instr::Return,
        opcode::CALL => Instr::Call(reader.read_vu32()?),
        opcode::CALL_INDIRECT => {
            let type_index = reader.read_vu32()?;
            let table = reader.read_vu32()?;
            Instr::CallIndirect { type_index, table }
        }
        opcode::DROP => Instr::Drop,
        opcode::SELECT => Instr::Select,
        opcode::SELECT_T => {
            let count = reader.read_vu32()?;
            let byte = reader.read_u8()?;
            match ValueType::from_encoding(byte) {
                Some(ty) if count == 1 => Instr::SelectTyped(ty),
                _ => {
                    return Err(io::Error::new(io::ErrorKind::InvalidData, "malformed select result type").into());
                }
            }
        }
        opcode::LOCAL_GET => Instr::LocalGet(reader.read_vu32()?),
        opcode::LOCAL_SET => Instr::LocalSet(reader.read_vu32()?),
        opcode::LOCAL_TEE => Instr::LocalTee(reader.read_vu32()?),
        opcode::GLOBAL_GET => Instr::GlobalGet(reader.read_vu32()?),
        opcode::GLOBAL_SET => Instr::GlobalSet(reader.read_vu32()?),
        opcode::LOAD_FIRST..=opcode::LOAD_LAST => match LoadOp::from_opcode(op) {
            Some(load) => Instr::Load(load, memarg(reader)?),
            None => return Err(RuntimeError::UnimplementedInstruction(opcode::describe(op))),
        },
        opcode::STORE_FIRST..=opcode::STORE_LAST => match StoreOp::from_opcode(op) {
            Some(store) => Instr::Store(store, memarg(reader)?),
            None => return Err(RuntimeError::UnimplementedInstruction(opcode::describe(op))),
        },
        opcode::MEMORY_SIZE => {
            reader.read_u8()?;
            Instr::MemorySize
        }
        opcode::MEMORY_GROW => {
            reader.read_u8()?;
            Instr::MemoryGrow
        }
        opcode::I32_CONST => Instr::I32Const(reader.read_vs32()?),
        opcode::I64_CONST => Instr::I64Const(reader.read_vs64()?),
        opcode::F32_CONST => Instr::F32Const(reader.read_f32()?),
        opcode::F64_CONST => Instr::F64Const(reader.read_f64()?),
        opcode::NUMERIC_FIRST..=opcode::NUMERIC_LAST => Instr::Numeric(op),
        opcode::REF_NULL => {
            reader.read_u8()?;
            Instr::RefNull
        }
        opcode::REF_IS_NULL => Instr::RefIsNull,
        opcode::REF_FUNC => Instr::RefFunc(reader.read_vu32()?),
        opcode::PREFIX_FC => {
            let sub = reader.read_vu32()?;
            if sub > opcode::FC_TRUNC_SAT_LAST {
                return Err(RuntimeError::UnimplementedInstruction(format!("0xfc {sub}")));
            }
            Instr::Prefixed(sub)
        }
        other => return Err(RuntimeError::UnimplementedInstruction(opcode::describe(other))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConvertOp;
    use rstest::rstest;

    #[rstest]
    #[case(Instr::Block(BlockType::Empty))]
    #[case(Instr::Loop(BlockType::Value(ValueType::F64)))]
    #[case(Instr::If(BlockType::Func(3)))]
    #[case(Instr::BrTable(vec![0, 2, 1], 4))]
    #[case(Instr::CallIndirect { type_index: 2, table: 0 })]
    #[case(Instr::Load(LoadOp::I64Load32U, MemArg { align: 2, offset: 65536 }))]
    #[case(Instr::Store(StoreOp::F32Store, MemArg { align: 2, offset: 0 }))]
    #[case(Instr::I32Const(i32::MIN))]
    #[case(Instr::I64Const(-129))]
    #[case(Instr::F32Const(-0.0))]
    #[case(Instr::MemoryGrow)]
    #[case(Instr::RefNull)]
    #[case(Instr::RefFunc(300))]
    #[case(Instr::SelectTyped(ValueType::FuncRef))]
    #[case(Instr::Prefixed(7))]
    fn test_decode_encoded(#[case] instr: Instr) {
        let mut buf = Vec::new();
        instr.encode(&mut buf);
        let mut reader = CodeReader::new(&buf);
        assert_eq!(decode(&mut reader).unwrap(), instr);
        assert!(reader.is_at_end());
    }

    #[test]
    fn test_bool_block_decodes_as_i32() {
        let mut buf = Vec::new();
        Instr::Block(BlockType::Value(ValueType::Bool)).encode(&mut buf);
        let instr = decode(&mut CodeReader::new(&buf)).unwrap();
        assert_eq!(instr, Instr::Block(BlockType::Value(ValueType::I32)));
    }

    #[test]
    fn test_conversion_opcodes() {
        let (_, _, code) = ConvertOp::I32WrapI64.signature();
        let mut buf = Vec::new();
        match code {
            crate::types::ConvertCode::Plain(op) => Instr::Numeric(op).encode(&mut buf),
            crate::types::ConvertCode::Prefixed(sub) => Instr::Prefixed(sub).encode(&mut buf),
        }
        assert_eq!(decode(&mut CodeReader::new(&buf)).unwrap(), Instr::Numeric(0xa7));
    }

    #[test]
    fn test_unknown_opcode() {
        let err = decode(&mut CodeReader::new(&[0xfd, 0x00])).unwrap_err();
        assert_eq!(err.to_string(), "Unimplemented instruction: 0xfd");
        let err = decode(&mut CodeReader::new(&[0x06])).unwrap_err();
        assert!(matches!(err, RuntimeError::UnimplementedInstruction(_)));
        let err = decode(&mut CodeReader::new(&[0xfc, 0x08])).unwrap_err();
        assert_eq!(err.to_string(), "Unimplemented instruction: 0xfc 8");
    }

    #[test]
    fn test_malformed_select_type() {
        let err = decode(&mut CodeReader::new(&[opcode::SELECT_T, 0x02, 0x70, 0x70])).unwrap_err();
        assert!(matches!(err, RuntimeError::Decode(_)));
        let err = decode(&mut CodeReader::new(&[opcode::SELECT_T, 0x01, 0x55])).unwrap_err();
        assert!(matches!(err, RuntimeError::Decode(_)));
    }

    #[test]
    fn test_truncated_immediate() {
        let err = decode(&mut CodeReader::new(&[opcode::I32_CONST, 0x80])).unwrap_err();
        assert!(matches!(err, RuntimeError::Decode(_)));
        let err = decode(&mut CodeReader::new(&[opcode::BLOCK])).unwrap_err();
        assert!(matches!(err, RuntimeError::Decode(_)));
    }
}
