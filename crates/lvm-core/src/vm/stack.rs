//! VM Stack Implementation
//!
//! Fixed-capacity operand stack shared by locals and expression temporaries.
//! No execution semantics.

use crate::error::{LvmError, LvmResult};
use super::value::Value;

/// VM operand stack
#[derive(Debug)]
pub struct Stack {
    values: Vec<Value>,
    max_size: usize,
}

impl Stack {
    /// Create new stack with maximum size
    pub fn new(max_size: usize) -> Self {
        Stack {
            values: Vec::with_capacity(max_size),
            max_size,
        }
    }

    /// Push value onto stack
    pub fn push(&mut self, value: Value) -> LvmResult<()> {
        if self.values.len() >= self.max_size {
            return Err(LvmError::StackOverflow);
        }
        self.values.push(value);
        Ok(())
    }

    /// Pop value from stack
    pub fn pop(&mut self) -> LvmResult<Value> {
        self.values.pop().ok_or(LvmError::StackUnderflow)
    }

    /// Peek at top of stack without removing
    pub fn peek(&self) -> LvmResult<&Value> {
        self.peek_at(0)
    }

    /// Peek `depth` values below the top (0 is the top itself)
    pub fn peek_at(&self, depth: usize) -> LvmResult<&Value> {
        let len = self.values.len();
        if depth >= len {
            return Err(LvmError::StackUnderflow);
        }
        Ok(&self.values[len - 1 - depth])
    }

    /// Read an absolute slot
    pub fn get(&self, index: usize) -> LvmResult<&Value> {
        self.values
            .get(index)
            .ok_or(LvmError::InvalidLocalAccess(index))
    }

    /// Overwrite an absolute slot
    pub fn set(&mut self, index: usize, value: Value) -> LvmResult<()> {
        match self.values.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(LvmError::InvalidLocalAccess(index)),
        }
    }

    /// Discard the top `count` values
    pub fn drop_n(&mut self, count: usize) -> LvmResult<()> {
        let len = self.values.len();
        if count > len {
            return Err(LvmError::StackUnderflow);
        }
        self.values.truncate(len - count);
        Ok(())
    }

    /// Remove the `count` values directly below the top, keeping the top
    pub fn collapse(&mut self, count: usize) -> LvmResult<()> {
        let top = self.pop()?;
        self.drop_n(count)?;
        self.push(top)
    }

    /// Get current stack size
    pub fn size(&self) -> usize {
        self.values.len()
    }

    /// Clear stack
    pub fn clear(&mut self) {
        self.values.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_and_underflow_are_errors() {
        let mut stack = Stack::new(1);
        stack.push(Value::Number(1)).expect("first push");
        assert_eq!(stack.push(Value::Number(2)), Err(LvmError::StackOverflow));
        stack.pop().expect("pop");
        assert_eq!(stack.pop(), Err(LvmError::StackUnderflow));
        assert_eq!(stack.peek().cloned(), Err(LvmError::StackUnderflow));
    }

    #[test]
    fn peek_at_counts_from_top() {
        let mut stack = Stack::new(8);
        for n in 1..=3 {
            stack.push(Value::Number(n)).expect("push");
        }
        assert_eq!(stack.peek_at(0), Ok(&Value::Number(3)));
        assert_eq!(stack.peek_at(2), Ok(&Value::Number(1)));
        assert!(stack.peek_at(3).is_err());
    }

    #[test]
    fn collapse_keeps_top_value() {
        let mut stack = Stack::new(8);
        for n in [10, 20, 30, 99] {
            stack.push(Value::Number(n)).expect("push");
        }
        stack.collapse(2).expect("collapse");
        assert_eq!(stack.size(), 2);
        assert_eq!(stack.get(0), Ok(&Value::Number(10)));
        assert_eq!(stack.get(1), Ok(&Value::Number(99)));
        assert_eq!(stack.collapse(5), Err(LvmError::StackUnderflow));
    }
}
