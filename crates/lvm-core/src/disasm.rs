//! Bytecode Disassembler
//!
//! Human readable listing of a code object and every code object nested
//! in its constant pool. Read-only; never affects execution.

use std::fmt::{self, Write};

use crate::bytecode::{Comparator, Instruction, OpCode};
use crate::vm::globals::Globals;
use crate::vm::value::{CodeObject, Value};

/// Render `code` and, recursively, its nested function bodies.
pub fn disassemble(code: &CodeObject, globals: &Globals) -> String {
    Listing { code, globals }.to_string()
}

struct Listing<'a> {
    code: &'a CodeObject,
    globals: &'a Globals,
}

impl fmt::Display for Listing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self.code;
        writeln!(f, "---------- Disassembly: {}/{} ----------", code.name, code.arity)?;

        let constants: Vec<String> = code.constants.iter().map(render_constant).collect();
        writeln!(f, "constants: [{}]", constants.join(", "))?;

        let mut offset = 0;
        while offset < code.bytecode.len() {
            match Instruction::decode(&code.bytecode, offset) {
                Ok(instruction) => {
                    self.write_instruction(f, &instruction)?;
                    offset = instruction.next_offset();
                }
                Err(err) => {
                    writeln!(f, "{:#06X}  <{}>", offset, err)?;
                    break;
                }
            }
        }

        for constant in &code.constants {
            if let Value::Code(nested) = constant {
                writeln!(f)?;
                write!(f, "{}", Listing { code: nested, globals: self.globals })?;
            }
        }
        Ok(())
    }
}

impl Listing<'_> {
    fn write_instruction(&self, f: &mut fmt::Formatter<'_>, instruction: &Instruction) -> fmt::Result {
        let end = instruction.next_offset();
        let mut bytes = String::new();
        for byte in &self.code.bytecode[instruction.offset..end] {
            write!(bytes, "{:02X} ", byte)?;
        }

        let mut text = instruction.opcode.mnemonic().to_string();
        if let Some(operand) = instruction.operand {
            write!(text, " {}", operand)?;
        }

        let note = instruction
            .operand
            .map(|operand| self.annotate(instruction.opcode, operand))
            .unwrap_or_default();

        let line = format!("{:#06X}  {:<10}{:<18}{}", instruction.offset, bytes, text, note);
        writeln!(f, "{}", line.trim_end())
    }

    fn annotate(&self, opcode: OpCode, operand: u16) -> String {
        let index = operand as usize;
        match opcode {
            OpCode::Const => match self.code.constants.get(index) {
                Some(constant) => format!("({})", render_constant(constant)),
                None => "(?)".to_string(),
            },
            OpCode::GetGlobal | OpCode::SetGlobal => {
                format!("({})", self.globals.name(index).unwrap_or("?"))
            }
            OpCode::GetLocal | OpCode::SetLocal => {
                let mut names: Vec<&str> = self
                    .code
                    .local_names
                    .iter()
                    .filter(|local| local.slot == index)
                    .map(|local| local.name.as_str())
                    .collect();
                names.dedup();
                match names.is_empty() {
                    true => String::new(),
                    false => format!("({})", names.join("|")),
                }
            }
            OpCode::Compare => u8::try_from(operand)
                .ok()
                .and_then(Comparator::from_u8)
                .map(|comparator| format!("({})", comparator.symbol()))
                .unwrap_or_default(),
            OpCode::Jmp | OpCode::JmpIfFalse => format!("-> {:#06X}", operand),
            _ => String::new(),
        }
    }
}

fn render_constant(value: &Value) -> String {
    match value {
        Value::Str(s) => format!("{:?}", s),
        other => other.to_string(),
    }
}
