//! Bytecode Opcode Definitions
//!
//! Defines the raw opcode set shared by the compiler and the VM.
//! This file contains no execution semantics.
//! Opcode values and operand layouts must match on both sides bit for bit.

/// Bytecode opcodes
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    // System
    Halt = 0x00,

    // Constants
    Const = 0x01,

    // Arithmetic
    Add = 0x02,
    Sub = 0x03,
    Mul = 0x04,
    Div = 0x05,

    // Comparison
    Compare = 0x06,

    // Control flow
    JmpIfFalse = 0x07,
    Jmp = 0x08,

    // Globals
    GetGlobal = 0x09,
    SetGlobal = 0x0A,

    // Stack
    Pop = 0x0B,

    // Locals
    GetLocal = 0x0C,
    SetLocal = 0x0D,
    ScopeExit = 0x0E,

    // Calls
    Call = 0x0F,
    Return = 0x10,
}

impl OpCode {
    /// Convert raw byte to opcode
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(OpCode::Halt),
            0x01 => Some(OpCode::Const),

            0x02 => Some(OpCode::Add),
            0x03 => Some(OpCode::Sub),
            0x04 => Some(OpCode::Mul),
            0x05 => Some(OpCode::Div),

            0x06 => Some(OpCode::Compare),

            0x07 => Some(OpCode::JmpIfFalse),
            0x08 => Some(OpCode::Jmp),

            0x09 => Some(OpCode::GetGlobal),
            0x0A => Some(OpCode::SetGlobal),

            0x0B => Some(OpCode::Pop),

            0x0C => Some(OpCode::GetLocal),
            0x0D => Some(OpCode::SetLocal),
            0x0E => Some(OpCode::ScopeExit),

            0x0F => Some(OpCode::Call),
            0x10 => Some(OpCode::Return),

            _ => None,
        }
    }

    /// Number of 16-bit operands following the opcode byte
    pub fn operand_count(self) -> usize {
        match self {
            OpCode::Const
            | OpCode::Compare
            | OpCode::JmpIfFalse
            | OpCode::Jmp
            | OpCode::GetGlobal
            | OpCode::SetGlobal
            | OpCode::GetLocal
            | OpCode::SetLocal
            | OpCode::ScopeExit
            | OpCode::Call => 1,

            OpCode::Halt
            | OpCode::Add
            | OpCode::Sub
            | OpCode::Mul
            | OpCode::Div
            | OpCode::Pop
            | OpCode::Return => 0,
        }
    }

    /// Human readable name used by the disassembler
    pub fn mnemonic(self) -> &'static str {
        match self {
            OpCode::Halt => "HALT",
            OpCode::Const => "CONST",
            OpCode::Add => "ADD",
            OpCode::Sub => "SUB",
            OpCode::Mul => "MUL",
            OpCode::Div => "DIV",
            OpCode::Compare => "COMPARE",
            OpCode::JmpIfFalse => "JMP_IF_FALSE",
            OpCode::Jmp => "JMP",
            OpCode::GetGlobal => "GET_GLOBAL",
            OpCode::SetGlobal => "SET_GLOBAL",
            OpCode::Pop => "POP",
            OpCode::GetLocal => "GET_LOCAL",
            OpCode::SetLocal => "SET_LOCAL",
            OpCode::ScopeExit => "SCOPE_EXIT",
            OpCode::Call => "CALL",
            OpCode::Return => "RETURN",
        }
    }
}

/// Comparator codes carried as the operand of `COMPARE`
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Greater = 1,
    Less = 2,
    Equal = 3,
    LessEqual = 4,
    GreaterEqual = 5,
    NotEqual = 6,
}

impl Comparator {
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            1 => Some(Comparator::Greater),
            2 => Some(Comparator::Less),
            3 => Some(Comparator::Equal),
            4 => Some(Comparator::LessEqual),
            5 => Some(Comparator::GreaterEqual),
            6 => Some(Comparator::NotEqual),
            _ => None,
        }
    }

    /// Map a source-level operator symbol to its comparator
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            ">" => Some(Comparator::Greater),
            "<" => Some(Comparator::Less),
            "==" => Some(Comparator::Equal),
            "<=" => Some(Comparator::LessEqual),
            ">=" => Some(Comparator::GreaterEqual),
            "!=" => Some(Comparator::NotEqual),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Comparator::Greater => ">",
            Comparator::Less => "<",
            Comparator::Equal => "==",
            Comparator::LessEqual => "<=",
            Comparator::GreaterEqual => ">=",
            Comparator::NotEqual => "!=",
        }
    }

    /// Evaluate `left <op> right`
    pub fn apply<T: PartialOrd>(self, left: &T, right: &T) -> bool {
        match self {
            Comparator::Greater => left > right,
            Comparator::Less => left < right,
            Comparator::Equal => left == right,
            Comparator::LessEqual => left <= right,
            Comparator::GreaterEqual => left >= right,
            Comparator::NotEqual => left != right,
        }
    }
}
