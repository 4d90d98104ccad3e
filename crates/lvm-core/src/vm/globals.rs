//! Global Table
//!
//! Ordered, name-indexed storage for global variables and native functions.
//! Insertion order assigns the index that bytecode uses to address a slot.
//! The table only grows, except that a failed compile discards the slots it
//! declared.

use std::rc::Rc;

use tracing::debug;

use crate::error::{LvmError, LvmResult};
use super::value::{Native, NativeFn, Value};

/// A named global slot
#[derive(Debug, Clone)]
pub struct Global {
    pub name: String,
    pub value: Value,
}

/// Global variable storage (index-based)
#[derive(Debug, Default)]
pub struct Globals {
    entries: Vec<Global>,
}

impl Globals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a slot initialised to numeric zero unless `name` already exists.
    /// Returns the slot index either way.
    pub fn define(&mut self, name: &str) -> usize {
        self.add_const(name, Value::Number(0))
    }

    /// Register `name` with an initial value; existing names are left untouched.
    pub fn add_const(&mut self, name: &str, value: Value) -> usize {
        if let Some(index) = self.index_of(name) {
            return index;
        }
        debug!(name, index = self.entries.len(), "global defined");
        self.entries.push(Global {
            name: name.to_string(),
            value,
        });
        self.entries.len() - 1
    }

    /// Register a host function under `name`
    pub fn add_native(&mut self, name: &str, arity: usize, func: NativeFn) -> usize {
        let native = Native {
            name: name.to_string(),
            arity,
            func,
        };
        self.add_const(name, Value::Native(Rc::new(native)))
    }

    /// Drop every slot from index `len` upward
    pub fn truncate(&mut self, len: usize) {
        if len < self.entries.len() {
            debug!(discarded = self.entries.len() - len, "globals rolled back");
        }
        self.entries.truncate(len);
    }

    pub fn get(&self, index: usize) -> LvmResult<&Value> {
        self.entries
            .get(index)
            .map(|global| &global.value)
            .ok_or(LvmError::InvalidGlobalAccess(index))
    }

    pub fn set(&mut self, index: usize, value: Value) -> LvmResult<()> {
        match self.entries.get_mut(index) {
            Some(global) => {
                global.value = value;
                Ok(())
            }
            None => Err(LvmError::InvalidGlobalAccess(index)),
        }
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(|global| global.name.as_str())
    }

    pub fn exists(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|global| global.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Global> {
        self.entries.iter()
    }
}
