pub mod compiler;
mod context;

pub use compiler::Compiler;
