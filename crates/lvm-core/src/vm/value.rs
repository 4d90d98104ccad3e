//! Runtime Value Representation
//!
//! Defines the tagged value set shared by the compiler and the VM, along
//! with the compiled units (code objects) and callables that values carry.

use std::fmt;
use std::rc::Rc;

use crate::error::LvmResult;
use super::stack::Stack;

/// Host implementation of a native function.
///
/// Reads its arguments with stack peeks (top of stack is the last argument)
/// and pushes exactly one result. The VM pops the arguments afterwards.
pub type NativeFn = fn(&mut Stack) -> LvmResult<()>;

/// Runtime value
#[derive(Debug, Clone)]
pub enum Value {
    /// 64-bit signed integer
    Number(i64),

    /// Owned text
    Str(String),

    /// Boolean value
    Bool(bool),

    /// Compiled unit, kept in constant pools for disassembly
    Code(Rc<CodeObject>),

    /// User-defined function
    Function(Rc<Function>),

    /// Host-provided function
    Native(Rc<Native>),

    /// Absence of a value
    Void,
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Bool(_) => "boolean",
            Value::Code(_) => "code",
            Value::Function(_) => "function",
            Value::Native(_) => "native",
            Value::Void => "void",
        }
    }

    pub fn as_number(&self) -> Option<i64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// Literals compare by tag and payload; compiled objects by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Code(a), Value::Code(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
            (Value::Void, Value::Void) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "{}", s),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Code(code) => write!(f, "<code {}>", code.name),
            Value::Function(function) => {
                write!(f, "<fn {}/{}>", function.name(), function.arity())
            }
            Value::Native(native) => write!(f, "<native {}/{}>", native.name, native.arity),
            Value::Void => write!(f, "void"),
        }
    }
}

/// A local variable declared in a code object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Local {
    pub name: String,

    /// Lexical depth of the declaring block
    pub scope_level: usize,

    /// Operand stack slot relative to the frame's base pointer
    pub slot: usize,
}

/// One compiled unit: the top-level program or a single function body.
#[derive(Debug, Clone, Default)]
pub struct CodeObject {
    pub name: String,
    pub arity: usize,
    pub bytecode: Vec<u8>,
    pub constants: Vec<Value>,

    /// Current lexical depth; only meaningful while compiling
    pub scope_level: usize,

    /// Locals currently in scope; only mutated while compiling
    pub locals: Vec<Local>,

    /// Every local ever declared, in declaration order
    pub local_names: Vec<Local>,
}

impl CodeObject {
    pub fn new(name: impl Into<String>, arity: usize) -> Self {
        CodeObject {
            name: name.into(),
            arity,
            ..Default::default()
        }
    }

    /// Index of an equal literal constant, appending it when absent.
    pub fn intern_constant(&mut self, value: Value) -> usize {
        match self.constants.iter().position(|c| *c == value) {
            Some(index) => index,
            None => self.push_constant(value),
        }
    }

    /// Append a constant unconditionally
    pub fn push_constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    pub fn add_local(&mut self, name: impl Into<String>, slot: usize) {
        let local = Local {
            name: name.into(),
            scope_level: self.scope_level,
            slot,
        };
        self.local_names.push(local.clone());
        self.locals.push(local);
    }

    /// Slot of the innermost local named `name`
    pub fn local_slot(&self, name: &str) -> Option<usize> {
        self.locals
            .iter()
            .rev()
            .find(|local| local.name == name)
            .map(|local| local.slot)
    }

    /// Remove and count the locals declared at the current scope level
    pub fn drop_scope_locals(&mut self) -> usize {
        let mut count = 0;
        let level = self.scope_level;
        while self.locals.last().is_some_and(|local| local.scope_level == level) {
            self.locals.pop();
            count += 1;
        }
        count
    }
}

/// A callable wrapping exactly one code object
#[derive(Debug)]
pub struct Function {
    pub code: Rc<CodeObject>,
}

impl Function {
    pub fn new(code: Rc<CodeObject>) -> Self {
        Function { code }
    }

    pub fn name(&self) -> &str {
        &self.code.name
    }

    pub fn arity(&self) -> usize {
        self.code.arity
    }
}

/// A host-provided function registered in the global table
#[derive(Debug)]
pub struct Native {
    pub name: String,
    pub arity: usize,
    pub func: NativeFn,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_reuses_equal_literals() {
        let mut code = CodeObject::new("main", 0);
        let a = code.intern_constant(Value::Number(5));
        let b = code.intern_constant(Value::Str("5".into()));
        let c = code.intern_constant(Value::Number(5));
        let d = code.intern_constant(Value::Bool(true));
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(d, 2);
        assert_eq!(code.constants.len(), 3);
    }

    #[test]
    fn functions_compare_by_identity() {
        let code = Rc::new(CodeObject::new("f", 0));
        let f1 = Value::Function(Rc::new(Function::new(code.clone())));
        let f2 = Value::Function(Rc::new(Function::new(code)));
        assert_eq!(f1, f1.clone());
        assert_ne!(f1, f2);
    }

    #[test]
    fn inner_local_shadows_outer() {
        let mut code = CodeObject::new("main", 0);
        code.scope_level = 1;
        code.add_local("x", 0);
        code.scope_level = 2;
        code.add_local("x", 1);
        assert_eq!(code.local_slot("x"), Some(1));
        assert_eq!(code.drop_scope_locals(), 1);
        code.scope_level = 1;
        assert_eq!(code.local_slot("x"), Some(0));
        assert_eq!(code.local_names.len(), 2);
    }

    #[test]
    fn display_forms() {
        assert_eq!(Value::Number(-40).to_string(), "-40");
        assert_eq!(Value::Str("hi".into()).to_string(), "hi");
        assert_eq!(Value::Bool(false).to_string(), "false");
        assert_eq!(Value::Void.to_string(), "void");
        let f = Function::new(Rc::new(CodeObject::new("square", 1)));
        assert_eq!(Value::Function(Rc::new(f)).to_string(), "<fn square/1>");
    }
}
