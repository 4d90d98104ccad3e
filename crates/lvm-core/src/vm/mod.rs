pub mod globals;
pub mod stack;
pub mod value;
pub mod vm;

pub use globals::Globals;
pub use vm::VirtualMachine;
pub use value::Value;
