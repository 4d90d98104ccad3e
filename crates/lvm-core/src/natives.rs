//! Native Function Library
//!
//! Host functions installed into every VM's global table. A native finds
//! its arguments on top of the operand stack (last argument topmost),
//! pushes exactly one result and leaves the arguments for the caller to
//! discard.

use crate::error::{LvmError, LvmResult};
use crate::vm::globals::Globals;
use crate::vm::stack::Stack;
use crate::vm::value::{NativeFn, Value};

/// Built-in natives in registration order
const BUILTINS: &[(&str, usize, NativeFn)] = &[
    ("print", 1, print),
    ("square", 1, square),
    ("abs", 1, abs),
    ("min", 2, min),
    ("max", 2, max),
    ("len", 1, len),
    ("str", 1, to_str),
];

/// Register every built-in native in `globals`.
pub fn install(globals: &mut Globals) {
    for &(name, arity, func) in BUILTINS {
        globals.add_native(name, arity, func);
    }
}

/// Numeric argument `depth` values below the top of the stack
fn number_arg(stack: &Stack, depth: usize, op: &'static str) -> LvmResult<i64> {
    match stack.peek_at(depth)? {
        Value::Number(n) => Ok(*n),
        other => Err(LvmError::TypeMismatch {
            op,
            expected: "number",
            found: other.type_name(),
        }),
    }
}

fn print(stack: &mut Stack) -> LvmResult<()> {
    println!("{}", stack.peek()?);
    stack.push(Value::Void)
}

fn square(stack: &mut Stack) -> LvmResult<()> {
    let x = number_arg(stack, 0, "square")?;
    let result = x.checked_mul(x).ok_or(LvmError::IntegerOverflow("square"))?;
    stack.push(Value::Number(result))
}

fn abs(stack: &mut Stack) -> LvmResult<()> {
    let x = number_arg(stack, 0, "abs")?;
    let result = x.checked_abs().ok_or(LvmError::IntegerOverflow("abs"))?;
    stack.push(Value::Number(result))
}

fn min(stack: &mut Stack) -> LvmResult<()> {
    let a = number_arg(stack, 1, "min")?;
    let b = number_arg(stack, 0, "min")?;
    stack.push(Value::Number(a.min(b)))
}

fn max(stack: &mut Stack) -> LvmResult<()> {
    let a = number_arg(stack, 1, "max")?;
    let b = number_arg(stack, 0, "max")?;
    stack.push(Value::Number(a.max(b)))
}

fn len(stack: &mut Stack) -> LvmResult<()> {
    let arg = stack.peek()?;
    let count = match arg.as_str() {
        Some(text) => text.chars().count(),
        None => {
            return Err(LvmError::TypeMismatch {
                op: "len",
                expected: "string",
                found: arg.type_name(),
            })
        }
    };
    let count = i64::try_from(count).map_err(|_| LvmError::IntegerOverflow("len"))?;
    stack.push(Value::Number(count))
}

fn to_str(stack: &mut Stack) -> LvmResult<()> {
    let text = stack.peek()?.to_string();
    stack.push(Value::Str(text))
}
