//! Purpose: Define the four primitives through which the interpreter is reached.
//! Exports: `StackChannel`.
//! Role: Injection seam between the marshaller and any interpreter binding.
//! Invariants: One logical operation at a time; callers serialize access per channel.
use crate::core::error::Error;
use crate::core::value::Value;

pub trait StackChannel {
    /// Place one encoded value on the operand stack.
    fn push(&mut self, value: Value) -> Result<(), Error>;

    /// Remove the top value.
    fn pop(&mut self) -> Result<Value, Error>;

    /// Run a named command; it consumes and produces operands per its own arity.
    fn execute(&mut self, command: &str) -> Result<(), Error>;

    /// Current operand count.
    fn depth(&self) -> usize;
}

impl<C: StackChannel + ?Sized> StackChannel for &mut C {
    fn push(&mut self, value: Value) -> Result<(), Error> {
        (**self).push(value)
    }

    fn pop(&mut self) -> Result<Value, Error> {
        (**self).pop()
    }

    fn execute(&mut self, command: &str) -> Result<(), Error> {
        (**self).execute(command)
    }

    fn depth(&self) -> usize {
        (**self).depth()
    }
}

impl<C: StackChannel + ?Sized> StackChannel for Box<C> {
    fn push(&mut self, value: Value) -> Result<(), Error> {
        (**self).push(value)
    }

    fn pop(&mut self) -> Result<Value, Error> {
        (**self).pop()
    }

    fn execute(&mut self, command: &str) -> Result<(), Error> {
        (**self).execute(command)
    }

    fn depth(&self) -> usize {
        (**self).depth()
    }
}
