//! LVM Error Types
//!
//! Defines every error condition produced while reading, compiling or
//! executing a program. None of them are recoverable: each one aborts the
//! current compile or run and is handed back to the caller.

use std::io;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LvmError {
    // Reader errors
    #[error("parse error: {message}")]
    Parse { message: String },

    // Compile errors
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("variable '{0}' is not defined")]
    UndefinedVariable(String),
    #[error("{what} {value} does not fit in a 16-bit operand")]
    OperandOverflow { what: &'static str, value: usize },

    // VM execution errors
    #[error("type mismatch in {op}: expected {expected}, found {found}")]
    TypeMismatch {
        op: &'static str,
        expected: &'static str,
        found: &'static str,
    },
    #[error("value of type {0} is not callable")]
    NotCallable(&'static str),
    #[error("'{name}' expects {expected} argument(s), got {got}")]
    ArityMismatch {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("stack overflow")]
    StackOverflow,
    #[error("stack underflow")]
    StackUnderflow,
    #[error("call depth limit of {0} exceeded")]
    CallDepthExceeded(usize),
    #[error("return outside of a function call")]
    ReturnOutsideFunction,
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow in {0}")]
    IntegerOverflow(&'static str),

    // Malformed bytecode
    #[error("invalid opcode: 0x{0:02X}")]
    InvalidOpcode(u8),
    #[error("invalid operand {operand} for {op}")]
    InvalidOperand { op: &'static str, operand: u16 },
    #[error("invalid constant access: {0}")]
    InvalidConstantAccess(usize),
    #[error("invalid local access: {0}")]
    InvalidLocalAccess(usize),
    #[error("invalid global access: {0}")]
    InvalidGlobalAccess(usize),
    #[error("bytecode is too short")]
    BytecodeTooShort,

    // IO boundary
    #[error("io error: {0}")]
    Io(String),
}

impl From<io::Error> for LvmError {
    fn from(err: io::Error) -> Self {
        LvmError::Io(err.to_string())
    }
}

pub type LvmResult<T> = Result<T, LvmError>;
