//! LVM - Core Library
//!
//! Reader, single-pass bytecode compiler and stack virtual machine for a
//! small Lisp-like language. Public API surface for the LVM core.

pub mod error;
pub mod config;
pub mod bytecode;
pub mod reader;
pub mod compiler;
pub mod vm;
pub mod natives;
pub mod disasm;

// Re-export commonly used types
pub use error::{LvmError, LvmResult};
pub use config::LvmConfig;
pub use bytecode::opcode::{Comparator, OpCode};
pub use compiler::Compiler;
pub use reader::Expr;
pub use vm::globals::Globals;
pub use vm::value::{CodeObject, Function, Value};
pub use vm::vm::VirtualMachine;
