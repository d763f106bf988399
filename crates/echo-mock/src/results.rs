// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Result production: recorded outcomes and delegates.

use std::fmt;
use std::sync::Arc;

use crate::error::Thrown;
use crate::value::{ObjectRef, Value};

/// Context handed to a [`Delegate`].
#[derive(Debug)]
pub struct DelegateCall<'a> {
    /// Receiving instance; `None` for static methods.
    pub instance: Option<&'a ObjectRef>,
    /// Actual arguments.
    pub args: &'a [Value],
    /// Invocations of the expectation so far, this one included.
    pub invocation_count: u32,
    /// Minimum invocations of the expectation.
    pub min_invocations: u32,
    /// Maximum invocations of the expectation; `None` when unbounded.
    pub max_invocations: Option<u32>,
    /// `Type#method(..) -> R` of the invoked method.
    pub method: &'a str,
}

/// Computes the result of an invocation from its arguments.
///
/// Delegates run with no engine lock held, so they may call back into
/// mocked code.
pub trait Delegate: Send + Sync {
    /// Produces the value to return, or a failure to throw.
    fn invoke(&self, call: &DelegateCall<'_>) -> Result<Value, Thrown>;
}

impl<F> Delegate for F
where
    F: Fn(&DelegateCall<'_>) -> Result<Value, Thrown> + Send + Sync,
{
    fn invoke(&self, call: &DelegateCall<'_>) -> Result<Value, Thrown> {
        self(call)
    }
}

/// One recorded outcome.
#[derive(Clone)]
pub(crate) enum InvocationResult {
    Return(Value),
    Throw(Thrown),
    Delegate(Arc<dyn Delegate>),
    RealImplementation,
}

impl fmt::Debug for InvocationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Return(v) => write!(f, "Return({v})"),
            Self::Throw(t) => write!(f, "Throw({t})"),
            Self::Delegate(_) => f.write_str("Delegate"),
            Self::RealImplementation => f.write_str("RealImplementation"),
        }
    }
}

/// Ordered queue of outcomes. The last one repeats once reached.
#[derive(Clone, Debug, Default)]
pub(crate) struct InvocationResults {
    results: Vec<InvocationResult>,
    next: usize,
}

impl InvocationResults {
    /// Appends an outcome and returns how many are queued.
    pub(crate) fn push(&mut self, result: InvocationResult) -> usize {
        self.results.push(result);
        self.results.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Next outcome; `None` when nothing was recorded.
    pub(crate) fn next_result(&mut self) -> Option<InvocationResult> {
        let result = self.results.get(self.next)?.clone();
        if self.next + 1 < self.results.len() {
            self.next += 1;
        }
        Some(result)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn value_of(result: Option<InvocationResult>) -> Option<Value> {
        match result {
            Some(InvocationResult::Return(v)) => Some(v),
            _ => None,
        }
    }

    #[test]
    fn last_result_repeats() {
        let mut results = InvocationResults::default();
        results.push(InvocationResult::Return(Value::Int(1)));
        results.push(InvocationResult::Return(Value::Int(2)));
        assert_eq!(value_of(results.next_result()), Some(Value::Int(1)));
        assert_eq!(value_of(results.next_result()), Some(Value::Int(2)));
        assert_eq!(value_of(results.next_result()), Some(Value::Int(2)));
    }

    #[test]
    fn empty_queue_yields_nothing() {
        let mut results = InvocationResults::default();
        assert!(results.is_empty());
        assert!(results.next_result().is_none());
    }

    #[test]
    fn closures_are_delegates() {
        let doubler = |call: &DelegateCall<'_>| match call.args.first() {
            Some(Value::Int(n)) => Ok(Value::Int(n * 2)),
            _ => Err(Thrown::new("IllegalArgument", "expected an int")),
        };
        let call = DelegateCall {
            instance: None,
            args: &[Value::Int(21)],
            invocation_count: 1,
            min_invocations: 0,
            max_invocations: None,
            method: "Calculator#twice(i32) -> i32",
        };
        assert_eq!(doubler.invoke(&call), Ok(Value::Int(42)));
    }
}
