//! Bytecode Instruction Representation
//!
//! Decodes the flat instruction stream into opcode + operand pairs.
//! This layer contains no execution semantics.

use crate::error::{LvmError, LvmResult};
use super::opcode::OpCode;

/// Decoded bytecode instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub offset: usize,
    pub opcode: OpCode,
    pub operand: Option<u16>,
}

impl Instruction {
    /// Decode the instruction starting at `offset`
    pub fn decode(bytecode: &[u8], offset: usize) -> LvmResult<Self> {
        let byte = *bytecode.get(offset).ok_or(LvmError::BytecodeTooShort)?;
        let opcode = OpCode::from_u8(byte).ok_or(LvmError::InvalidOpcode(byte))?;

        let operand = match opcode.operand_count() {
            0 => None,
            _ => Some(read_u16(bytecode, offset + 1)?),
        };

        Ok(Instruction {
            offset,
            opcode,
            operand,
        })
    }

    /// Encoded size in bytes
    pub fn size(&self) -> usize {
        1 + 2 * self.opcode.operand_count()
    }

    /// Offset of the instruction that follows this one
    pub fn next_offset(&self) -> usize {
        self.offset + self.size()
    }
}

/// Read a big-endian u16 operand
pub fn read_u16(bytecode: &[u8], offset: usize) -> LvmResult<u16> {
    match bytecode.get(offset..offset + 2) {
        Some(&[high, low]) => Ok(u16::from_be_bytes([high, low])),
        _ => Err(LvmError::BytecodeTooShort),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_operand_and_length() {
        let code = [OpCode::Const as u8, 0x01, 0x02, OpCode::Halt as u8];
        let first = Instruction::decode(&code, 0).expect("decode const");
        assert_eq!(first.opcode, OpCode::Const);
        assert_eq!(first.operand, Some(0x0102));
        assert_eq!(first.next_offset(), 3);

        let second = Instruction::decode(&code, 3).expect("decode halt");
        assert_eq!(second.opcode, OpCode::Halt);
        assert_eq!(second.operand, None);
    }

    #[test]
    fn truncated_operand_is_rejected() {
        let code = [OpCode::Jmp as u8, 0x00];
        assert_eq!(Instruction::decode(&code, 0), Err(LvmError::BytecodeTooShort));
        assert_eq!(Instruction::decode(&[0xEE], 0), Err(LvmError::InvalidOpcode(0xEE)));
    }
}
