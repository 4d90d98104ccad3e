//! LVM - CLI
//!
//! Runs a source file through the compiler and virtual machine, or starts
//! an interactive session when no file is given.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use lvm_core::disasm::disassemble;
use lvm_core::{LvmConfig, LvmResult, Value, VirtualMachine};

#[derive(Parser)]
#[command(name = "lvm")]
#[command(about = "Compile and run programs on the LVM bytecode virtual machine")]
#[command(version)]
struct Cli {
    /// Source file to run; starts a REPL when omitted
    file: Option<PathBuf>,

    /// Print the bytecode listing before running
    #[arg(short, long)]
    disassemble: bool,

    /// Log compiler and VM activity to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Operand stack capacity
    #[arg(long, default_value_t = 512)]
    stack_size: usize,

    /// Maximum nesting of user function calls
    #[arg(long, default_value_t = 256)]
    max_depth: usize,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = LvmConfig {
        max_stack_size: cli.stack_size,
        max_call_depth: cli.max_depth,
    };
    let mut vm = VirtualMachine::new(config);

    match &cli.file {
        Some(path) => match run_file(&mut vm, path, cli.disassemble) {
            Ok(value) => println!("{}", value),
            Err(e) => {
                eprintln!("Error: {}", e);
                process::exit(1);
            }
        },
        None => repl(&mut vm, cli.disassemble),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_file(vm: &mut VirtualMachine, path: &Path, show_bytecode: bool) -> LvmResult<Value> {
    let source = fs::read_to_string(path)?;
    debug!(path = %path.display(), bytes = source.len(), "source loaded");
    evaluate(vm, &source, show_bytecode)
}

fn evaluate(vm: &mut VirtualMachine, source: &str, show_bytecode: bool) -> LvmResult<Value> {
    let main = vm.compile(source)?;
    if show_bytecode {
        print!("{}", disassemble(&main.code, vm.globals()));
    }
    vm.execute(main)
}

fn repl(vm: &mut VirtualMachine, show_bytecode: bool) {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("Error: could not start REPL: {}", e);
            process::exit(1);
        }
    };

    println!("LVM {} (:globals lists globals, :quit exits)", env!("CARGO_PKG_VERSION"));

    loop {
        match editor.readline("lvm> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line);

                match line {
                    ":quit" | ":exit" => break,
                    ":globals" => {
                        for global in vm.globals().iter() {
                            println!("  {} = {}", global.name, global.value);
                        }
                    }
                    _ => match evaluate(vm, line, show_bytecode) {
                        Ok(Value::Void) => {}
                        Ok(value) => println!("{}", value),
                        Err(e) => eprintln!("Error: {}", e),
                    },
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Error: {}", e);
                break;
            }
        }
    }
}
