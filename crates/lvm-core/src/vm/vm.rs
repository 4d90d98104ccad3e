//! Virtual Machine Core
//!
//! Defines the virtual machine structure and its dispatch loop.
//! One VM owns one operand stack, one call stack and one global table;
//! compiled functions are shared read-only.

use std::mem;
use std::rc::Rc;

use tracing::trace;

use crate::bytecode::instruction::read_u16;
use crate::bytecode::{Comparator, OpCode};
use crate::compiler::Compiler;
use crate::config::LvmConfig;
use crate::error::{LvmError, LvmResult};
use crate::natives;
use crate::reader;

use super::globals::Globals;
use super::stack::Stack;
use super::value::{Function, Native, NativeFn, Value};

/// Call frame saved across a user-defined function call
#[derive(Debug)]
struct CallFrame {
    return_ip: usize,
    base_pointer: usize,
    function: Rc<Function>,
}

/// Stack-based virtual machine
#[derive(Debug)]
pub struct VirtualMachine {
    config: LvmConfig,
    stack: Stack,
    globals: Globals,
    call_stack: Vec<CallFrame>,

    /// Offset into the executing function's bytecode
    ip: usize,

    /// Stack index of slot 0 of the executing function
    bp: usize,
}

impl VirtualMachine {
    /// Create a new VM with the native library registered
    pub fn new(config: LvmConfig) -> Self {
        let mut globals = Globals::new();
        natives::install(&mut globals);

        VirtualMachine {
            stack: Stack::new(config.max_stack_size),
            globals,
            call_stack: Vec::new(),
            ip: 0,
            bp: 0,
            config,
        }
    }

    pub fn config(&self) -> &LvmConfig {
        &self.config
    }

    pub fn globals(&self) -> &Globals {
        &self.globals
    }

    pub fn globals_mut(&mut self) -> &mut Globals {
        &mut self.globals
    }

    /// Register a host function callable from programs
    pub fn register_native(&mut self, name: &str, arity: usize, func: NativeFn) -> usize {
        self.globals.add_native(name, arity, func)
    }

    /// Parse and compile `source` against this VM's global table.
    /// Globals declared by a compile that fails are discarded.
    pub fn compile(&mut self, source: &str) -> LvmResult<Rc<Function>> {
        let program = reader::parse_program(source)?;

        let defined = self.globals.len();
        let compiled = Compiler::new(&mut self.globals).compile(&program);
        if compiled.is_err() {
            self.globals.truncate(defined);
        }
        compiled
    }

    /// Compile and run `source`. Globals persist between calls.
    pub fn eval(&mut self, source: &str) -> LvmResult<Value> {
        let main = self.compile(source)?;
        self.execute(main)
    }

    /// Run `main` until `HALT` and return the value it leaves on top.
    pub fn execute(&mut self, main: Rc<Function>) -> LvmResult<Value> {
        self.reset();
        let result = self.run(main);
        if result.is_err() {
            self.reset();
        }
        result
    }

    /// Current operand stack depth
    pub fn stack_size(&self) -> usize {
        self.stack.size()
    }

    /// Number of active user-function calls
    pub fn call_depth(&self) -> usize {
        self.call_stack.len()
    }

    fn reset(&mut self) {
        self.stack.clear();
        self.call_stack.clear();
        self.ip = 0;
        self.bp = 0;
    }

    fn run(&mut self, main: Rc<Function>) -> LvmResult<Value> {
        let mut function = main;

        loop {
            let opcode_byte = self.read_u8(&function)?;
            let opcode = OpCode::from_u8(opcode_byte)
                .ok_or(LvmError::InvalidOpcode(opcode_byte))?;

            match opcode {
                OpCode::Halt => return self.stack.pop(),

                OpCode::Const => {
                    let index = self.read_operand(&function)?;
                    let value = function
                        .code
                        .constants
                        .get(index)
                        .cloned()
                        .ok_or(LvmError::InvalidConstantAccess(index))?;
                    self.stack.push(value)?;
                }

                // Arithmetic
                OpCode::Add => self.add()?,
                OpCode::Sub => self.arithmetic("SUB", i64::checked_sub)?,
                OpCode::Mul => self.arithmetic("MUL", i64::checked_mul)?,
                OpCode::Div => self.divide()?,

                OpCode::Compare => {
                    let code = read_u16(&function.code.bytecode, self.ip)?;
                    self.ip += 2;
                    self.compare(code)?;
                }

                // Control flow
                OpCode::JmpIfFalse => {
                    let target = self.read_operand(&function)?;
                    let condition = self.stack.pop()?;
                    match condition.as_bool() {
                        Some(false) => self.ip = target,
                        Some(true) => {}
                        None => {
                            return Err(LvmError::TypeMismatch {
                                op: "JMP_IF_FALSE",
                                expected: "boolean",
                                found: condition.type_name(),
                            })
                        }
                    }
                }
                OpCode::Jmp => self.ip = self.read_operand(&function)?,

                // Globals
                OpCode::GetGlobal => {
                    let index = self.read_operand(&function)?;
                    let value = self.globals.get(index)?.clone();
                    self.stack.push(value)?;
                }
                OpCode::SetGlobal => {
                    let index = self.read_operand(&function)?;
                    let value = self.stack.peek()?.clone();
                    self.globals.set(index, value)?;
                }

                OpCode::Pop => {
                    self.stack.pop()?;
                }

                // Locals
                OpCode::GetLocal => {
                    let slot = self.read_operand(&function)?;
                    let value = self.stack.get(self.bp + slot)?.clone();
                    self.stack.push(value)?;
                }
                OpCode::SetLocal => {
                    let slot = self.read_operand(&function)?;
                    let value = self.stack.peek()?.clone();
                    self.stack.set(self.bp + slot, value)?;
                }
                OpCode::ScopeExit => {
                    let count = self.read_operand(&function)?;
                    self.stack.collapse(count)?;
                }

                // Calls
                OpCode::Call => {
                    let argc = self.read_operand(&function)?;
                    self.call(&mut function, argc)?;
                }
                OpCode::Return => {
                    let frame = self
                        .call_stack
                        .pop()
                        .ok_or(LvmError::ReturnOutsideFunction)?;
                    trace!(function = function.name(), depth = self.call_stack.len(), "return");
                    self.ip = frame.return_ip;
                    self.bp = frame.base_pointer;
                    function = frame.function;
                }
            }
        }
    }

    /// Stack before the call, top last: `[callee, arg1 .. argN]`
    fn call(&mut self, function: &mut Rc<Function>, argc: usize) -> LvmResult<()> {
        let callee = self.stack.peek_at(argc)?.clone();

        match callee {
            Value::Native(native) => self.call_native(&native, argc),
            Value::Function(callee) => {
                if callee.arity() != argc {
                    return Err(LvmError::ArityMismatch {
                        name: callee.name().to_string(),
                        expected: callee.arity(),
                        got: argc,
                    });
                }
                if self.call_stack.len() >= self.config.max_call_depth {
                    return Err(LvmError::CallDepthExceeded(self.config.max_call_depth));
                }
                trace!(function = callee.name(), argc, depth = self.call_stack.len() + 1, "call");

                let caller = mem::replace(function, callee);
                self.call_stack.push(CallFrame {
                    return_ip: self.ip,
                    base_pointer: self.bp,
                    function: caller,
                });
                self.bp = self.stack.size() - argc - 1;
                self.ip = 0;
                Ok(())
            }
            other => Err(LvmError::NotCallable(other.type_name())),
        }
    }

    fn call_native(&mut self, native: &Native, argc: usize) -> LvmResult<()> {
        if native.arity != argc {
            return Err(LvmError::ArityMismatch {
                name: native.name.clone(),
                expected: native.arity,
                got: argc,
            });
        }

        (native.func)(&mut self.stack)?;

        let result = self.stack.pop()?;
        self.stack.drop_n(argc + 1)?;
        self.stack.push(result)
    }

    /// Pop the right operand, then the left one
    fn operands(&mut self) -> LvmResult<(Value, Value)> {
        let right = self.stack.pop()?;
        let left = self.stack.pop()?;
        Ok((left, right))
    }

    fn add(&mut self) -> LvmResult<()> {
        let result = match self.operands()? {
            (Value::Number(a), Value::Number(b)) => {
                Value::Number(a.checked_add(b).ok_or(LvmError::IntegerOverflow("ADD"))?)
            }
            (Value::Str(a), Value::Str(b)) => Value::Str(a + &b),
            (left, right) => {
                let found = match left {
                    Value::Number(_) | Value::Str(_) => right.type_name(),
                    _ => left.type_name(),
                };
                return Err(LvmError::TypeMismatch {
                    op: "ADD",
                    expected: "two numbers or two strings",
                    found,
                });
            }
        };
        self.stack.push(result)
    }

    fn numbers(&mut self, op: &'static str) -> LvmResult<(i64, i64)> {
        match self.operands()? {
            (Value::Number(a), Value::Number(b)) => Ok((a, b)),
            (Value::Number(_), other) | (other, _) => Err(LvmError::TypeMismatch {
                op,
                expected: "number",
                found: other.type_name(),
            }),
        }
    }

    fn arithmetic(&mut self, op: &'static str, apply: fn(i64, i64) -> Option<i64>) -> LvmResult<()> {
        let (a, b) = self.numbers(op)?;
        let result = apply(a, b).ok_or(LvmError::IntegerOverflow(op))?;
        self.stack.push(Value::Number(result))
    }

    fn divide(&mut self) -> LvmResult<()> {
        let (a, b) = self.numbers("DIV")?;
        if b == 0 {
            return Err(LvmError::DivisionByZero);
        }
        let result = a.checked_div(b).ok_or(LvmError::IntegerOverflow("DIV"))?;
        self.stack.push(Value::Number(result))
    }

    fn compare(&mut self, code: u16) -> LvmResult<()> {
        let comparator = u8::try_from(code)
            .ok()
            .and_then(Comparator::from_u8)
            .ok_or(LvmError::InvalidOperand {
                op: "COMPARE",
                operand: code,
            })?;

        let result = match self.operands()? {
            (Value::Number(a), Value::Number(b)) => comparator.apply(&a, &b),
            (Value::Bool(a), Value::Bool(b)) => comparator.apply(&a, &b),
            (left, right) => {
                let found = match left {
                    Value::Number(_) | Value::Bool(_) => right.type_name(),
                    _ => left.type_name(),
                };
                return Err(LvmError::TypeMismatch {
                    op: "COMPARE",
                    expected: "two numbers or two booleans",
                    found,
                });
            }
        };
        self.stack.push(Value::Bool(result))
    }

    /// Read next byte from the executing function's bytecode
    fn read_u8(&mut self, function: &Function) -> LvmResult<u8> {
        let byte = *function
            .code
            .bytecode
            .get(self.ip)
            .ok_or(LvmError::BytecodeTooShort)?;
        self.ip += 1;
        Ok(byte)
    }

    /// Read a big-endian u16 operand as an index
    fn read_operand(&mut self, function: &Function) -> LvmResult<usize> {
        let operand = read_u16(&function.code.bytecode, self.ip)?;
        self.ip += 2;
        Ok(operand as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::value::CodeObject;

    fn program(constants: Vec<Value>, bytecode: Vec<u8>) -> Rc<Function> {
        let mut code = CodeObject::new("main", 0);
        code.constants = constants;
        code.bytecode = bytecode;
        Rc::new(Function::new(Rc::new(code)))
    }

    fn run(constants: Vec<Value>, bytecode: Vec<u8>) -> LvmResult<Value> {
        VirtualMachine::new(LvmConfig::new()).execute(program(constants, bytecode))
    }

    const CONST: u8 = OpCode::Const as u8;
    const HALT: u8 = OpCode::Halt as u8;

    #[test]
    fn sub_and_div_respect_source_order() {
        let constants = vec![Value::Number(7), Value::Number(2)];
        let sub = vec![CONST, 0, 0, CONST, 0, 1, OpCode::Sub as u8, HALT];
        assert_eq!(run(constants.clone(), sub), Ok(Value::Number(5)));
        let div = vec![CONST, 0, 0, CONST, 0, 1, OpCode::Div as u8, HALT];
        assert_eq!(run(constants, div), Ok(Value::Number(3)));
    }

    #[test]
    fn add_concatenates_strings() {
        let constants = vec![Value::Str("foo".into()), Value::Str("bar".into())];
        let code = vec![CONST, 0, 0, CONST, 0, 1, OpCode::Add as u8, HALT];
        assert_eq!(run(constants, code), Ok(Value::Str("foobar".into())));
    }

    #[test]
    fn add_rejects_mixed_operands() {
        let constants = vec![Value::Number(1), Value::Bool(true)];
        let code = vec![CONST, 0, 0, CONST, 0, 1, OpCode::Add as u8, HALT];
        assert_eq!(
            run(constants, code),
            Err(LvmError::TypeMismatch {
                op: "ADD",
                expected: "two numbers or two strings",
                found: "boolean",
            })
        );
    }

    #[test]
    fn division_by_zero_is_fatal() {
        let constants = vec![Value::Number(1), Value::Number(0)];
        let code = vec![CONST, 0, 0, CONST, 0, 1, OpCode::Div as u8, HALT];
        assert_eq!(run(constants, code), Err(LvmError::DivisionByZero));
    }

    #[test]
    fn compare_rejects_mismatched_tags() {
        let constants = vec![Value::Number(1), Value::Bool(true)];
        let code = vec![
            CONST, 0, 0, CONST, 0, 1,
            OpCode::Compare as u8, 0, Comparator::Equal as u8,
            HALT,
        ];
        assert!(matches!(run(constants, code), Err(LvmError::TypeMismatch { op: "COMPARE", .. })));
    }

    #[test]
    fn unknown_comparator_is_invalid_operand() {
        let constants = vec![Value::Number(1)];
        let code = vec![CONST, 0, 0, CONST, 0, 0, OpCode::Compare as u8, 0, 9, HALT];
        assert_eq!(
            run(constants, code),
            Err(LvmError::InvalidOperand { op: "COMPARE", operand: 9 })
        );
    }

    #[test]
    fn jump_if_false_requires_boolean() {
        let constants = vec![Value::Number(1)];
        let code = vec![CONST, 0, 0, OpCode::JmpIfFalse as u8, 0, 0, HALT];
        assert!(matches!(run(constants, code), Err(LvmError::TypeMismatch { op: "JMP_IF_FALSE", .. })));
    }

    #[test]
    fn scope_exit_keeps_block_result() {
        let constants = vec![Value::Number(1), Value::Number(2), Value::Number(3)];
        let code = vec![
            CONST, 0, 0, CONST, 0, 1, CONST, 0, 2,
            OpCode::ScopeExit as u8, 0, 2,
            HALT,
        ];
        let mut vm = VirtualMachine::new(LvmConfig::new());
        assert_eq!(vm.execute(program(constants, code)), Ok(Value::Number(3)));
        assert_eq!(vm.stack_size(), 0);
    }

    #[test]
    fn unknown_opcode_is_fatal() {
        assert_eq!(run(vec![], vec![0xEE]), Err(LvmError::InvalidOpcode(0xEE)));
    }

    #[test]
    fn running_off_the_end_is_reported() {
        let constants = vec![Value::Number(1)];
        assert_eq!(run(constants, vec![CONST, 0, 0]), Err(LvmError::BytecodeTooShort));
    }

    #[test]
    fn halt_on_empty_stack_underflows() {
        assert_eq!(run(vec![], vec![HALT]), Err(LvmError::StackUnderflow));
    }

    #[test]
    fn stack_overflow_trapped() {
        let config = LvmConfig {
            max_stack_size: 1,
            ..LvmConfig::default()
        };
        let main = program(vec![Value::Number(1)], vec![CONST, 0, 0, CONST, 0, 0, HALT]);
        let mut vm = VirtualMachine::new(config);
        assert_eq!(vm.execute(main), Err(LvmError::StackOverflow));
        assert_eq!(vm.stack_size(), 0);
    }

    #[test]
    fn calling_a_number_is_rejected() {
        let code = vec![CONST, 0, 0, OpCode::Call as u8, 0, 0, HALT];
        assert_eq!(run(vec![Value::Number(4)], code), Err(LvmError::NotCallable("number")));
    }

    #[test]
    fn return_without_frame_is_rejected() {
        assert_eq!(run(vec![], vec![OpCode::Return as u8]), Err(LvmError::ReturnOutsideFunction));
    }
}
