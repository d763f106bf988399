// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Delegates that count and record their calls.

use echo_mock::{Delegate, DelegateCall, Thrown, Value};
use std::sync::{Arc, Mutex, PoisonError};

type Answer = dyn Fn(&DelegateCall<'_>) -> Result<Value, Thrown> + Send + Sync;

/// What a [`CountingDelegate`] saw on one call.
#[derive(Debug, Clone, PartialEq)]
pub struct SeenCall {
    /// Arguments of the call.
    pub args: Vec<Value>,
    /// Invocation count of the expectation when the delegate ran.
    pub invocation_count: u32,
    /// Minimum invocations of the expectation.
    pub min_invocations: u32,
    /// Maximum invocations of the expectation.
    pub max_invocations: Option<u32>,
    /// Method description.
    pub method: String,
}

/// A delegate that records every call and answers through a closure.
///
/// Clones share the record, so a test keeps one handle and gives the other
/// to the engine.
#[derive(Clone)]
pub struct CountingDelegate {
    seen: Arc<Mutex<Vec<SeenCall>>>,
    answer: Arc<Answer>,
}

impl CountingDelegate {
    /// Answers every call with `answer`.
    pub fn new(answer: impl Fn(&DelegateCall<'_>) -> Result<Value, Thrown> + Send + Sync + 'static) -> Self {
        Self {
            seen: Arc::default(),
            answer: Arc::new(answer),
        }
    }

    /// Answers every call with `value`.
    pub fn returning(value: impl Into<Value>) -> Self {
        let value = value.into();
        Self::new(move |_| Ok(value.clone()))
    }

    /// Number of calls so far.
    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Every call so far, oldest first.
    pub fn seen(&self) -> Vec<SeenCall> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl std::fmt::Debug for CountingDelegate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountingDelegate")
            .field("calls", &self.calls())
            .finish_non_exhaustive()
    }
}

impl Delegate for CountingDelegate {
    fn invoke(&self, call: &DelegateCall<'_>) -> Result<Value, Thrown> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SeenCall {
                args: call.args.to_vec(),
                invocation_count: call.invocation_count,
                min_invocations: call.min_invocations,
                max_invocations: call.max_invocations,
                method: call.method.to_string(),
            });
        (self.answer)(call)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn records_calls_and_answers() {
        let delegate = CountingDelegate::new(|call| Ok(Value::Long(call.args.len().try_into().unwrap_or_default())));
        let call = DelegateCall {
            instance: None,
            args: &[Value::Int(1), Value::Int(2)],
            invocation_count: 1,
            min_invocations: 0,
            max_invocations: None,
            method: "add(i32, i32) -> i32",
        };
        assert_eq!(delegate.invoke(&call).unwrap(), Value::Long(2));
        let shared = delegate.clone();
        assert_eq!(shared.calls(), 1);
        assert_eq!(shared.seen()[0].method, "add(i32, i32) -> i32");
    }
}
