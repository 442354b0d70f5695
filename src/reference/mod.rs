//! Purpose: In-process stand-in for the external command interpreter.
//! Exports: `ReferenceInterpreter`.
//! Role: Backs the CLI and the test suite; implements the command table the marshaller emits.
//! Invariants: Follows the interpreter's operand conventions (operands popped top first,
//! consumed even when the command fails). Simulation only advances the clock.
//! Invariants: Printed network trees are buffered, never written to stdout.
#![allow(clippy::result_large_err)]

mod commands;
mod network;

use std::cell::Cell;

use tracing::trace;

use crate::core::channel::StackChannel;
use crate::core::error::{Error, ErrorKind};
use crate::core::value::{ParamMap, Value};

use network::Network;

#[derive(Debug, Default)]
pub struct ReferenceInterpreter {
    stack: Vec<Value>,
    network: Network,
    executed: usize,
    interactions: Cell<usize>,
    output: String,
}

impl ReferenceInterpreter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current defaults of `model`, if it exists.
    pub fn model_defaults(&self, model: &str) -> Option<ParamMap> {
        self.network.model_defaults(model).ok()
    }

    /// Number of allocated elements, the root container included.
    pub fn element_count(&self) -> usize {
        self.network.element_count()
    }

    /// Commands executed so far.
    pub fn commands_executed(&self) -> usize {
        self.executed
    }

    /// Every channel call so far: pushes, pops, executions, and depth queries.
    pub fn interactions(&self) -> usize {
        self.interactions.get()
    }

    /// Text printed by commands such as `PrintNetwork` since the last `take_output`.
    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    fn touch(&self) {
        self.interactions.set(self.interactions.get() + 1);
    }
}

impl StackChannel for ReferenceInterpreter {
    fn push(&mut self, value: Value) -> Result<(), Error> {
        self.touch();
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> Result<Value, Error> {
        self.touch();
        self.stack
            .pop()
            .ok_or_else(|| Error::new(ErrorKind::Protocol).with_message("operand stack is empty"))
    }

    fn execute(&mut self, command: &str) -> Result<(), Error> {
        self.touch();
        self.executed += 1;
        trace!(command, depth = self.stack.len(), "reference execute");
        commands::execute(&mut self.network, &mut self.stack, &mut self.output, command)
    }

    fn depth(&self) -> usize {
        self.touch();
        self.stack.len()
    }
}

#[cfg(test)]
mod tests {
    use super::ReferenceInterpreter;
    use crate::core::channel::StackChannel;
    use crate::core::error::ErrorKind;
    use crate::core::value::Value;

    #[test]
    fn create_pushes_last_id() {
        let mut interp = ReferenceInterpreter::new();
        interp.push(Value::literal("iaf_neuron")).expect("push");
        interp.push(Value::Int(4)).expect("push");
        interp.execute("Create_l_i").expect("create");
        assert_eq!(interp.pop().expect("pop"), Value::Int(4));
        assert_eq!(interp.element_count(), 5);
    }

    #[test]
    fn failed_commands_consume_operands() {
        let mut interp = ReferenceInterpreter::new();
        interp.push(Value::literal("no_such_model")).expect("push");
        interp.push(Value::Int(1)).expect("push");
        let err = interp.execute("Create_l_i").expect_err("unknown model");
        assert_eq!(err.kind(), ErrorKind::Engine);
        assert_eq!(
            err.message(),
            Some("UnknownModelName in Create_l_i: /no_such_model is not a known model")
        );
        assert_eq!(interp.depth(), 0);
    }

    #[test]
    fn empty_pop_is_a_protocol_error() {
        let mut interp = ReferenceInterpreter::new();
        let err = interp.pop().expect_err("empty");
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[test]
    fn unknown_commands_are_engine_errors() {
        let mut interp = ReferenceInterpreter::new();
        let err = interp.execute("Frobnicate").expect_err("unknown");
        assert_eq!(err.kind(), ErrorKind::Engine);
        assert!(err.message().expect("message").starts_with("UndefinedName"));
    }

    #[test]
    fn print_network_is_buffered() {
        let mut interp = ReferenceInterpreter::new();
        interp.push(Value::literal("iaf_neuron")).expect("push");
        interp.push(Value::Int(2)).expect("push");
        interp.execute("Create_l_i").expect("create");
        interp.pop().expect("last id");
        interp.push(Value::Int(0)).expect("push");
        interp.push(Value::Int(1)).expect("push");
        interp.execute("PrintNetwork_i_i").expect("print");
        assert_eq!(interp.depth(), 0);
        assert_eq!(
            interp.take_output(),
            "+-[0] subnet dim=[2]\n   +-[1] iaf_neuron\n   +-[2] iaf_neuron\n"
        );
        assert!(interp.output().is_empty());
    }

    #[test]
    fn options_reject_their_defaults_entry() {
        let mut interp = ReferenceInterpreter::new();
        interp.push(Value::literal("RandomConvergentConnect")).expect("push");
        interp.execute("GetOptions_l").expect("options");
        let options = interp.pop().expect("pop").into_dict("options").expect("dict");
        assert_eq!(options.get("allow_autapses"), Some(&Value::Bool(true)));
        assert!(options.contains_key("DefaultOptions"));

        interp.push(Value::literal("RandomConvergentConnect")).expect("push");
        interp.push(Value::Dict(options)).expect("push");
        let err = interp.execute("SetOptions_l_D").expect_err("read-only");
        assert!(err.message().expect("message").starts_with("ReadOnlyProperty"));
    }

    #[test]
    fn interactions_count_every_call() {
        let mut interp = ReferenceInterpreter::new();
        interp.depth();
        interp.push(Value::Int(1)).expect("push");
        interp.pop().expect("pop");
        assert_eq!(interp.interactions(), 3);
        assert_eq!(interp.commands_executed(), 0);
    }
}
