//! LVM Configuration
//!
//! Runtime limits for the virtual machine.
//! Configuration specifies constraints only; enforcement is handled by the VM.

/// VM Configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LvmConfig {
    /// Operand stack capacity
    pub max_stack_size: usize,

    /// Maximum number of nested user function calls
    pub max_call_depth: usize,
}

impl Default for LvmConfig {
    fn default() -> Self {
        LvmConfig {
            max_stack_size: 512,
            max_call_depth: 256,
        }
    }
}

impl LvmConfig {
    /// Create a new configuration with default limits
    pub fn new() -> Self {
        Self::default()
    }
}
