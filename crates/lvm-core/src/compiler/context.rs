//! Compilation Context
//!
//! A code object under construction plus the bookkeeping needed to emit
//! into it: the simulated operand-stack depth and jump backpatching.

use std::mem;
use std::ops::{Deref, DerefMut};

use crate::bytecode::OpCode;
use crate::error::{LvmError, LvmResult};
use crate::vm::value::CodeObject;

#[derive(Debug)]
pub struct Context {
    pub code: CodeObject,

    /// Set for function bodies; the top-level program is never a function
    pub is_function: bool,

    /// Values the emitted code leaves on the stack above the base pointer
    pub depth: usize,
}

impl Context {
    /// Context for the top-level program
    pub fn main() -> Self {
        Context {
            code: CodeObject::new("main", 0),
            is_function: false,
            depth: 0,
        }
    }

    /// Context for a function body. Slot 0 holds the function itself and the
    /// parameters follow in declaration order.
    pub fn function(name: &str, params: &[&str]) -> Self {
        let mut code = CodeObject::new(name, params.len());
        code.add_local(name, 0);
        for (i, param) in params.iter().enumerate() {
            code.add_local(*param, i + 1);
        }
        Context {
            code,
            is_function: true,
            depth: params.len() + 1,
        }
    }

    /// Only the outermost block of the top-level program declares globals.
    pub fn is_global_scope(&self) -> bool {
        !self.is_function && self.code.scope_level == 1
    }

    /// Bind `name` to the value currently on top of the stack
    pub fn declare_local(&mut self, name: &str) {
        let slot = self.depth.saturating_sub(1);
        self.code.add_local(name, slot);
    }

    pub fn offset(&self) -> usize {
        self.code.bytecode.len()
    }

    pub fn emit(&mut self, op: OpCode) {
        self.code.bytecode.push(op as u8);
        self.track(op, 0);
    }

    /// Emit an opcode with one operand and return the operand's offset
    pub fn emit_with(&mut self, op: OpCode, operand: usize) -> LvmResult<usize> {
        let encoded = encode(op, operand)?;
        self.code.bytecode.push(op as u8);
        let at = self.offset();
        self.code.bytecode.extend_from_slice(&encoded.to_be_bytes());
        self.track(op, operand);
        Ok(at)
    }

    /// Overwrite the jump operand at `at` with `target`
    pub fn patch(&mut self, at: usize, target: usize) -> LvmResult<()> {
        let encoded = encode(OpCode::Jmp, target)?;
        match self.code.bytecode.get_mut(at..at + 2) {
            Some(operand) => {
                operand.copy_from_slice(&encoded.to_be_bytes());
                Ok(())
            }
            None => Err(LvmError::BytecodeTooShort),
        }
    }

    fn track(&mut self, op: OpCode, operand: usize) {
        match op {
            OpCode::Const | OpCode::GetGlobal | OpCode::GetLocal => self.depth += 1,

            OpCode::Add
            | OpCode::Sub
            | OpCode::Mul
            | OpCode::Div
            | OpCode::Compare
            | OpCode::JmpIfFalse
            | OpCode::Pop
            | OpCode::Halt => self.depth = self.depth.saturating_sub(1),

            OpCode::ScopeExit | OpCode::Call => {
                self.depth = self.depth.saturating_sub(operand)
            }

            OpCode::Jmp | OpCode::SetGlobal | OpCode::SetLocal | OpCode::Return => {}
        }
    }
}

/// The context being emitted into, on top of the contexts of the functions
/// that enclose it. Dereferences to the current context.
#[derive(Debug)]
pub struct ContextStack {
    current: Context,
    enclosing: Vec<Context>,
}

impl ContextStack {
    pub fn new(main: Context) -> Self {
        ContextStack {
            current: main,
            enclosing: Vec::new(),
        }
    }

    /// Start emitting into `context`; the current one becomes its parent.
    pub fn push(&mut self, context: Context) {
        let parent = mem::replace(&mut self.current, context);
        self.enclosing.push(parent);
    }

    /// Finish the current context and resume its parent.
    /// Returns `None` at the outermost context.
    pub fn pop(&mut self) -> Option<Context> {
        let parent = self.enclosing.pop()?;
        Some(mem::replace(&mut self.current, parent))
    }

    /// Number of contexts below the current one
    pub fn nesting(&self) -> usize {
        self.enclosing.len()
    }

    pub fn into_current(self) -> Context {
        self.current
    }
}

impl Deref for ContextStack {
    type Target = Context;

    fn deref(&self) -> &Context {
        &self.current
    }
}

impl DerefMut for ContextStack {
    fn deref_mut(&mut self) -> &mut Context {
        &mut self.current
    }
}

fn encode(op: OpCode, operand: usize) -> LvmResult<u16> {
    u16::try_from(operand).map_err(|_| LvmError::OperandOverflow {
        what: match op {
            OpCode::Const => "constant index",
            OpCode::GetGlobal | OpCode::SetGlobal => "global index",
            OpCode::GetLocal | OpCode::SetLocal => "local slot",
            OpCode::ScopeExit => "scope size",
            OpCode::Call => "argument count",
            _ => "jump target",
        },
        value: operand,
    })
}
