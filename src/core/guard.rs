//! Purpose: Verify that a marshalled operation leaves the operand stack depth unchanged.
//! Exports: `StackCheck`, `StackGuard`, `check_balance`, `set_stack_checks`, `stack_checks_enabled`.
//! Role: Diagnostic wrapper applied per call-site by the marshaller.
//! Invariants: The process-wide flag is set before marshalling starts, not mid-operation.
//! Invariants: Only successful operations are checked; failures propagate unchanged.
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};

use crate::core::channel::StackChannel;
use crate::core::error::{Error, ErrorKind};

static STACK_CHECKS: AtomicBool = AtomicBool::new(false);

/// Enable or disable stack balance checks for every marshaller using `StackCheck::Inherit`.
pub fn set_stack_checks(enabled: bool) {
    STACK_CHECKS.store(enabled, Ordering::SeqCst);
}

pub fn stack_checks_enabled() -> bool {
    STACK_CHECKS.load(Ordering::SeqCst)
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum StackCheck {
    /// Follow the process-wide flag.
    #[default]
    Inherit,
    Always,
    Never,
}

impl StackCheck {
    pub fn is_active(self) -> bool {
        match self {
            StackCheck::Inherit => stack_checks_enabled(),
            StackCheck::Always => true,
            StackCheck::Never => false,
        }
    }
}

#[derive(Debug)]
pub struct StackGuard<'a> {
    operation: &'a str,
    before: usize,
}

impl<'a> StackGuard<'a> {
    pub fn enter(operation: &'a str, depth: usize) -> Self {
        Self {
            operation,
            before: depth,
        }
    }

    pub fn finish(self, depth: usize) -> Result<(), Error> {
        let leaked = depth as i64 - self.before as i64;
        debug!(operation = self.operation, before = self.before, after = depth, "stack check");
        if leaked == 0 {
            return Ok(());
        }
        Err(Error::new(ErrorKind::StackImbalance)
            .with_message(format!(
                "operation '{}' left {leaked} elements on the stack",
                self.operation
            ))
            .with_operation(self.operation)
            .with_leaked(leaked))
    }

    /// Log drift observed after a failed operation without masking its error.
    pub fn abandon(self, depth: usize) {
        let leaked = depth as i64 - self.before as i64;
        if leaked != 0 {
            warn!(operation = self.operation, leaked, "operation failed with stack drift");
        }
    }

    /// Close the guard over an operation's outcome: successes are checked at
    /// `depth`, failures pass through after logging any drift.
    pub fn settle<T>(self, result: Result<T, Error>, depth: usize) -> Result<T, Error> {
        match result {
            Ok(value) => {
                self.finish(depth)?;
                Ok(value)
            }
            Err(err) => {
                self.abandon(depth);
                Err(err)
            }
        }
    }
}

/// Run `f` against `channel`, failing with `StackImbalance` if it changes the depth.
pub fn check_balance<C, T>(
    channel: &mut C,
    check: StackCheck,
    operation: &str,
    f: impl FnOnce(&mut C) -> Result<T, Error>,
) -> Result<T, Error>
where
    C: StackChannel + ?Sized,
{
    if !check.is_active() {
        return f(channel);
    }
    let guard = StackGuard::enter(operation, channel.depth());
    let result = f(channel);
    guard.settle(result, channel.depth())
}

#[cfg(test)]
mod tests {
    use super::{StackCheck, StackGuard, check_balance};
    use crate::core::channel::StackChannel;
    use crate::core::error::{Error, ErrorKind};
    use crate::core::value::Value;

    #[derive(Default)]
    struct VecChannel {
        stack: Vec<Value>,
    }

    impl StackChannel for VecChannel {
        fn push(&mut self, value: Value) -> Result<(), Error> {
            self.stack.push(value);
            Ok(())
        }

        fn pop(&mut self) -> Result<Value, Error> {
            self.stack
                .pop()
                .ok_or_else(|| Error::new(ErrorKind::Protocol).with_message("empty"))
        }

        fn execute(&mut self, _command: &str) -> Result<(), Error> {
            Ok(())
        }

        fn depth(&self) -> usize {
            self.stack.len()
        }
    }

    #[test]
    fn balanced_operation_passes() {
        let mut channel = VecChannel::default();
        let out = check_balance(&mut channel, StackCheck::Always, "echo", |ch| {
            ch.push(Value::Int(1))?;
            ch.pop()
        })
        .expect("balanced");
        assert_eq!(out, Value::Int(1));
    }

    #[test]
    fn leftover_operand_is_reported() {
        let mut channel = VecChannel::default();
        let err = check_balance(&mut channel, StackCheck::Always, "leaky", |ch| {
            ch.push(Value::Int(1))?;
            ch.push(Value::Int(2))
        })
        .expect_err("imbalance");
        assert_eq!(err.kind(), ErrorKind::StackImbalance);
        assert_eq!(err.operation(), Some("leaky"));
        assert_eq!(err.leaked(), Some(2));
    }

    #[test]
    fn over_consumption_is_negative() {
        let mut channel = VecChannel::default();
        channel.push(Value::Int(9)).expect("seed");
        let err = check_balance(&mut channel, StackCheck::Always, "greedy", |ch| ch.pop().map(drop))
            .expect_err("imbalance");
        assert_eq!(err.leaked(), Some(-1));
    }

    #[test]
    fn disabled_check_ignores_drift() {
        let mut channel = VecChannel::default();
        check_balance(&mut channel, StackCheck::Never, "leaky", |ch| ch.push(Value::Int(1)))
            .expect("unchecked");
        assert_eq!(channel.depth(), 1);
    }

    #[test]
    fn failures_are_not_masked() {
        let mut channel = VecChannel::default();
        let err = check_balance(&mut channel, StackCheck::Always, "broken", |ch| {
            ch.push(Value::Int(1))?;
            Err::<(), _>(Error::new(ErrorKind::Engine).with_message("IllegalConnection"))
        })
        .expect_err("engine");
        assert_eq!(err.kind(), ErrorKind::Engine);
    }

    #[test]
    fn guard_finish_at_same_depth_is_ok() {
        StackGuard::enter("noop", 3).finish(3).expect("balanced");
    }

    #[test]
    fn settle_checks_successes_and_passes_failures() {
        let value = StackGuard::enter("ok", 2).settle(Ok::<_, Error>(5), 2).expect("balanced");
        assert_eq!(value, 5);
        let err = StackGuard::enter("drift", 2)
            .settle(Ok::<_, Error>(5), 4)
            .expect_err("imbalance");
        assert_eq!(err.leaked(), Some(2));
        let err = StackGuard::enter("failed", 2)
            .settle::<()>(Err(Error::new(ErrorKind::Engine)), 4)
            .expect_err("engine");
        assert_eq!(err.kind(), ErrorKind::Engine);
    }
}
