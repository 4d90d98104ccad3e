//! Bytecode Compiler
//!
//! Walks the parsed tree once and emits bytecode and constants into code
//! objects. Variables are resolved at compile time, either to a stack slot
//! relative to the frame's base pointer or to a global table index.

use std::rc::Rc;
use std::slice;

use tracing::debug;

use crate::bytecode::{Comparator, OpCode};
use crate::error::{LvmError, LvmResult};
use crate::reader::Expr;
use crate::vm::globals::Globals;
use crate::vm::value::{Function, Value};

use super::context::{Context, ContextStack};

/// How a block ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    /// `begin`: collapse only the locals it declared
    Plain,

    /// The outermost block of a function: also collapse the callee and arguments
    FunctionBody,
}

/// Single-pass compiler from `Expr` trees to bytecode
pub struct Compiler<'g> {
    globals: &'g mut Globals,
    context: ContextStack,
}

impl<'g> Compiler<'g> {
    pub fn new(globals: &'g mut Globals) -> Self {
        Compiler {
            globals,
            context: ContextStack::new(Context::main()),
        }
    }

    /// Compile a whole program into its "main" function.
    ///
    /// The top-level expressions form the outermost block, which is the only
    /// place where `var` and `def` create globals.
    pub fn compile(mut self, program: &[Expr]) -> LvmResult<Rc<Function>> {
        self.block(program, Block::Plain)?;
        self.context.emit(OpCode::Halt);

        let code = Rc::new(self.context.into_current().code);
        debug!(
            bytes = code.bytecode.len(),
            constants = code.constants.len(),
            globals = self.globals.len(),
            "compiled main"
        );
        Ok(Rc::new(Function::new(code)))
    }

    fn gen(&mut self, expr: &Expr) -> LvmResult<()> {
        match expr {
            Expr::Number(n) => self.constant(Value::Number(*n)),
            Expr::Str(s) => self.constant(Value::Str(s.clone())),
            Expr::Symbol(name) => self.symbol(name),
            Expr::List(items) => self.list(expr, items),
        }
    }

    fn list(&mut self, form: &Expr, items: &[Expr]) -> LvmResult<()> {
        let (head, args) = match items.split_first() {
            Some(split) => split,
            None => return Err(LvmError::Syntax("cannot evaluate an empty list".into())),
        };

        let op = match head.as_symbol() {
            Some(op) => op,
            None => return self.call(head, args),
        };

        match op {
            "+" => self.binary(form, args, OpCode::Add),
            "-" => self.binary(form, args, OpCode::Sub),
            "*" => self.binary(form, args, OpCode::Mul),
            "/" => self.binary(form, args, OpCode::Div),
            "<" | ">" | "==" | ">=" | "<=" | "!=" => self.compare(form, args, op),
            "if" => self.if_form(form, args),
            "var" | "def" if !self.context.is_global_scope() => Err(LvmError::Syntax(format!(
                "local declaration outside a block: {}",
                form
            ))),
            "var" => self.var(form, args),
            "set" => self.set(form, args),
            "begin" => self.block(args, Block::Plain),
            "while" => self.while_form(form, args),
            "for" => self.for_form(form, args),
            "def" => self.def(form, args),
            "lambda" => {
                expect_operands(form, args, 2, 2)?;
                self.function(form, "lambda", &args[0], &args[1])
            }
            _ => self.call(head, args),
        }
    }

    /// Block items and `for` initialisers may declare locals.
    fn item(&mut self, expr: &Expr) -> LvmResult<()> {
        match expr.as_list() {
            Some([_, args @ ..]) if expr.is_form("var") => self.var(expr, args),
            Some([_, args @ ..]) if expr.is_form("def") => self.def(expr, args),
            _ => self.gen(expr),
        }
    }

    fn constant(&mut self, value: Value) -> LvmResult<()> {
        let index = self.context.code.intern_constant(value);
        self.context.emit_with(OpCode::Const, index)?;
        Ok(())
    }

    fn symbol(&mut self, name: &str) -> LvmResult<()> {
        match name {
            "true" => return self.constant(Value::Bool(true)),
            "false" => return self.constant(Value::Bool(false)),
            _ => {}
        }

        if let Some(slot) = self.context.code.local_slot(name) {
            self.context.emit_with(OpCode::GetLocal, slot)?;
            return Ok(());
        }

        match self.globals.index_of(name) {
            Some(index) => {
                self.context.emit_with(OpCode::GetGlobal, index)?;
                Ok(())
            }
            None => Err(LvmError::UndefinedVariable(name.to_string())),
        }
    }

    // Left operand is emitted first so it sits below the right one.
    fn binary(&mut self, form: &Expr, args: &[Expr], op: OpCode) -> LvmResult<()> {
        expect_operands(form, args, 2, 2)?;
        self.gen(&args[0])?;
        self.gen(&args[1])?;
        self.context.emit(op);
        Ok(())
    }

    fn compare(&mut self, form: &Expr, args: &[Expr], symbol: &str) -> LvmResult<()> {
        expect_operands(form, args, 2, 2)?;
        let comparator = Comparator::from_symbol(symbol)
            .ok_or_else(|| LvmError::Syntax(format!("unknown comparator '{}'", symbol)))?;
        self.gen(&args[0])?;
        self.gen(&args[1])?;
        self.context.emit_with(OpCode::Compare, comparator as usize)?;
        Ok(())
    }

    /// `(if test consequent [alternate])`; a missing alternate yields void.
    fn if_form(&mut self, form: &Expr, args: &[Expr]) -> LvmResult<()> {
        expect_operands(form, args, 2, 3)?;

        self.gen(&args[0])?;
        let else_jump = self.context.emit_with(OpCode::JmpIfFalse, 0)?;
        let depth = self.context.depth;

        self.gen(&args[1])?;
        let end_jump = self.context.emit_with(OpCode::Jmp, 0)?;

        let else_target = self.context.offset();
        self.context.patch(else_jump, else_target)?;
        self.context.depth = depth;
        match args.get(2) {
            Some(alternate) => self.gen(alternate)?,
            None => self.constant(Value::Void)?,
        }

        let end_target = self.context.offset();
        self.context.patch(end_jump, end_target)
    }

    fn var(&mut self, form: &Expr, args: &[Expr]) -> LvmResult<()> {
        expect_operands(form, args, 2, 2)?;
        let name = symbol_name(form, &args[0])?;
        let init = &args[1];

        // (var name (lambda ...)) names the function after the variable
        match init.as_list() {
            Some([_, params, body]) if init.is_form("lambda") => {
                self.function(init, name, params, body)?
            }
            _ => self.gen(init)?,
        }

        self.declare(name)
    }

    /// Bind `name` to the value on top of the stack: a global at global
    /// scope, otherwise a new local whose slot is that stack position.
    fn declare(&mut self, name: &str) -> LvmResult<()> {
        if self.context.is_global_scope() {
            let index = self.globals.define(name);
            self.context.emit_with(OpCode::SetGlobal, index)?;
        } else {
            self.context.declare_local(name);
        }
        Ok(())
    }

    fn set(&mut self, form: &Expr, args: &[Expr]) -> LvmResult<()> {
        expect_operands(form, args, 2, 2)?;
        let name = symbol_name(form, &args[0])?;

        if let Some(slot) = self.context.code.local_slot(name) {
            self.gen(&args[1])?;
            self.context.emit_with(OpCode::SetLocal, slot)?;
            return Ok(());
        }

        let index = self
            .globals
            .index_of(name)
            .ok_or_else(|| LvmError::UndefinedVariable(name.to_string()))?;
        self.gen(&args[1])?;
        self.context.emit_with(OpCode::SetGlobal, index)?;
        Ok(())
    }

    fn block(&mut self, exprs: &[Expr], kind: Block) -> LvmResult<()> {
        self.context.code.scope_level += 1;

        if exprs.is_empty() {
            self.constant(Value::Void)?;
        }

        for (i, expr) in exprs.iter().enumerate() {
            let is_last = i + 1 == exprs.len();
            let is_local_declaration = is_declaration(expr) && !self.context.is_global_scope();

            self.item(expr)?;

            if is_local_declaration {
                // the declared value is now a local slot; the block result
                // has to sit above it
                if is_last {
                    if let Some(slot) = self.context.code.locals.last().map(|local| local.slot) {
                        self.context.emit_with(OpCode::GetLocal, slot)?;
                    }
                }
            } else if !is_last {
                self.context.emit(OpCode::Pop);
            }
        }

        self.scope_exit(kind)
    }

    fn scope_exit(&mut self, kind: Block) -> LvmResult<()> {
        let declared = self.context.code.drop_scope_locals();
        let count = match kind {
            Block::Plain => declared,
            Block::FunctionBody => declared + self.context.code.arity + 1,
        };

        if count > 0 {
            self.context.emit_with(OpCode::ScopeExit, count)?;
        }

        self.context.code.scope_level -= 1;
        Ok(())
    }

    /// `(while test body)` evaluates to void.
    fn while_form(&mut self, form: &Expr, args: &[Expr]) -> LvmResult<()> {
        expect_operands(form, args, 2, 2)?;
        self.emit_loop(&args[0], &[&args[1]])
    }

    /// `(for init test step body)` lowers to `init; while test { body; step }`.
    ///
    /// Outside the global scope the loop gets its own scope, so a local
    /// declared by `init` is collapsed once the loop ends.
    fn for_form(&mut self, form: &Expr, args: &[Expr]) -> LvmResult<()> {
        expect_operands(form, args, 4, 4)?;
        let init = &args[0];

        let scoped = !self.context.is_global_scope();
        if scoped {
            self.context.code.scope_level += 1;
        }

        self.item(init)?;
        if !(scoped && is_declaration(init)) {
            self.context.emit(OpCode::Pop);
        }
        self.emit_loop(&args[1], &[&args[3], &args[2]])?;

        if scoped {
            self.scope_exit(Block::Plain)?;
        }
        Ok(())
    }

    fn emit_loop(&mut self, test: &Expr, body: &[&Expr]) -> LvmResult<()> {
        let loop_start = self.context.offset();

        self.gen(test)?;
        let exit_jump = self.context.emit_with(OpCode::JmpIfFalse, 0)?;

        for expr in body {
            self.gen(expr)?;
            self.context.emit(OpCode::Pop);
        }

        self.context.emit_with(OpCode::Jmp, loop_start)?;
        let exit_target = self.context.offset();
        self.context.patch(exit_jump, exit_target)?;

        self.constant(Value::Void)
    }

    fn def(&mut self, form: &Expr, args: &[Expr]) -> LvmResult<()> {
        expect_operands(form, args, 3, 3)?;
        let name = symbol_name(form, &args[0])?;
        self.function(form, name, &args[1], &args[2])?;
        self.declare(name)
    }

    /// Compile a function body into its own code object and push the
    /// resulting function value in the enclosing one.
    fn function(&mut self, form: &Expr, name: &str, params: &Expr, body: &Expr) -> LvmResult<()> {
        let params = param_names(form, params)?;
        let arity = params.len();

        self.context.push(Context::function(name, &params));
        let compiled = self.function_body(body);
        let nesting = self.context.nesting();
        let finished = self.context.pop();
        compiled?;

        let finished = finished.ok_or_else(|| {
            LvmError::Syntax(format!("unbalanced function context in {}", form))
        })?;
        let code = Rc::new(finished.code);
        debug!(
            name,
            arity,
            nesting,
            bytes = code.bytecode.len(),
            constants = code.constants.len(),
            "compiled function"
        );

        self.context.code.push_constant(Value::Code(code.clone()));
        let index = self
            .context
            .code
            .push_constant(Value::Function(Rc::new(Function::new(code))));
        self.context.emit_with(OpCode::Const, index)?;
        Ok(())
    }

    /// A `begin` body is the function's outermost block; any other body is
    /// treated as a block of one expression.
    fn function_body(&mut self, body: &Expr) -> LvmResult<()> {
        let exprs = match body.as_list() {
            Some([_, exprs @ ..]) if body.is_form("begin") => exprs,
            _ => slice::from_ref(body),
        };
        self.block(exprs, Block::FunctionBody)?;
        self.context.emit(OpCode::Return);
        Ok(())
    }

    fn call(&mut self, callee: &Expr, args: &[Expr]) -> LvmResult<()> {
        self.gen(callee)?;
        for arg in args {
            self.gen(arg)?;
        }
        self.context.emit_with(OpCode::Call, args.len())?;
        Ok(())
    }
}

fn is_declaration(expr: &Expr) -> bool {
    expr.is_form("var") || expr.is_form("def")
}

fn expect_operands(form: &Expr, args: &[Expr], min: usize, max: usize) -> LvmResult<()> {
    if args.len() < min {
        return Err(LvmError::Syntax(format!("missing operand in {}", form)));
    }
    if args.len() > max {
        return Err(LvmError::Syntax(format!("too many operands in {}", form)));
    }
    Ok(())
}

fn symbol_name<'e>(form: &Expr, expr: &'e Expr) -> LvmResult<&'e str> {
    expr.as_symbol()
        .ok_or_else(|| LvmError::Syntax(format!("expected a name, found {} in {}", expr, form)))
}

fn param_names<'e>(form: &Expr, params: &'e Expr) -> LvmResult<Vec<&'e str>> {
    let list = params
        .as_list()
        .ok_or_else(|| LvmError::Syntax(format!("expected a parameter list in {}", form)))?;
    list.iter().map(|param| symbol_name(form, param)).collect()
}
