// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Expectations: what an invocation must look like, how often it may occur,
//! and what it yields.

use std::fmt;
use std::sync::Arc;

use crate::conversion::{convert_recorded, convert_sequence, Recorded};
use crate::error::{MockError, Thrown};
use crate::matcher::ArgumentSpec;
use crate::results::{Delegate, InvocationResult, InvocationResults};
use crate::signature::{MethodSignature, TypeDesc};
use crate::value::{ObjectRef, TypeName, Value};

/// Index of an expectation in the execution's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExpectationId(pub(crate) usize);

/// How an expectation came to exist.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Origin {
    /// Recorded in a strict block.
    Strict,
    /// Recorded in a non-strict block.
    NonStrict,
    /// Created on first replay of an unrecorded non-strict invocation.
    Replayed,
}

/// Invocation-count range plus the running count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct InvocationConstraints {
    pub(crate) min: u32,
    pub(crate) max: Option<u32>,
    pub(crate) count: u32,
}

impl InvocationConstraints {
    pub(crate) const fn new(min: u32, max: Option<u32>) -> Self {
        Self { min, max, count: 0 }
    }

    /// Replaces both limits. `min > max` is rejected.
    pub(crate) fn set_limits(&mut self, min: u32, max: Option<u32>) -> Result<(), MockError> {
        if max.is_some_and(|max| min > max) {
            return Err(MockError::illegal_argument(format!(
                "minimum {min} exceeds maximum {}",
                max.unwrap_or_default()
            )));
        }
        self.min = min;
        self.max = max;
        Ok(())
    }

    /// Raises a finite maximum to admit `results` recorded outcomes.
    pub(crate) fn admit_results(&mut self, results: usize) {
        let results = u32::try_from(results).unwrap_or(u32::MAX);
        if let Some(max) = self.max {
            if max < results {
                self.max = Some(results);
            }
        }
    }

    pub(crate) fn increment(&mut self) -> u32 {
        self.count = self.count.saturating_add(1);
        self.count
    }

    pub(crate) fn is_satisfied(&self) -> bool {
        self.count >= self.min
    }

    pub(crate) fn is_at_max(&self) -> bool {
        self.max.is_some_and(|max| self.count >= max)
    }

    pub(crate) fn exceeds_max(&self) -> bool {
        self.max.is_some_and(|max| self.count > max)
    }

    pub(crate) fn missing(&self) -> u32 {
        self.min.saturating_sub(self.count)
    }
}

/// The invocation an expectation (or a verification) stands for.
#[derive(Clone, Debug)]
pub(crate) struct ExpectedInvocation {
    pub(crate) instance: Option<ObjectRef>,
    pub(crate) match_instance: bool,
    pub(crate) class: TypeName,
    pub(crate) method: Arc<MethodSignature>,
    pub(crate) return_type: TypeDesc,
    pub(crate) args: ArgumentSpec,
}

impl ExpectedInvocation {
    pub(crate) fn is_constructor(&self) -> bool {
        self.method.is_constructor()
    }

    pub(crate) fn same_signature(&self, class: &TypeName, method: &MethodSignature) -> bool {
        self.class == *class && *self.method == *method
    }

    pub(crate) fn describe_method(&self) -> String {
        format!("{}#{}", self.class, self.method)
    }
}

impl fmt::Display for ExpectedInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.class, self.method)?;
        if self.match_instance {
            if let Some(instance) = &self.instance {
                write!(f, " on {instance}")?;
            }
        }
        write!(f, " with {}", self.args)
    }
}

#[derive(Debug)]
pub(crate) struct Expectation {
    pub(crate) id: ExpectationId,
    pub(crate) origin: Origin,
    pub(crate) invocation: ExpectedInvocation,
    pub(crate) constraints: InvocationConstraints,
    pub(crate) results: InvocationResults,
    /// Replaced by a later equivalent non-strict recording.
    pub(crate) superseded: bool,
    /// Partially mocked and never recorded: the real code ran.
    pub(crate) executed_real: bool,
}

impl Expectation {
    pub(crate) fn new(id: ExpectationId, origin: Origin, invocation: ExpectedInvocation) -> Self {
        let constraints = match origin {
            Origin::Strict => InvocationConstraints::new(1, None),
            Origin::NonStrict | Origin::Replayed => InvocationConstraints::new(0, None),
        };
        Self {
            id,
            origin,
            invocation,
            constraints,
            results: InvocationResults::default(),
            superseded: false,
            executed_real: false,
        }
    }

    /// Copy for the next iteration of a strict block: same invocation,
    /// limits, and outcomes, with a fresh count.
    pub(crate) fn replicate(&self, id: ExpectationId) -> Self {
        Self {
            id,
            origin: self.origin,
            invocation: self.invocation.clone(),
            constraints: InvocationConstraints::new(self.constraints.min, self.constraints.max),
            results: self.results.clone(),
            superseded: false,
            executed_real: false,
        }
    }

    /// Multiplies both limits by the block's iteration count.
    pub(crate) fn scale_limits(&mut self, iterations: u32) {
        self.constraints.min = self.constraints.min.saturating_mul(iterations);
        self.constraints.max = self.constraints.max.map(|max| max.saturating_mul(iterations));
    }

    pub(crate) fn is_strict(&self) -> bool {
        self.origin == Origin::Strict
    }

    pub(crate) fn is_recorded(&self) -> bool {
        self.origin != Origin::Replayed
    }

    fn push(&mut self, result: InvocationResult) {
        let queued = self.results.push(result);
        self.constraints.admit_results(queued);
    }

    fn incompatible(&self, value: &Value) -> MockError {
        MockError::IncompatibleResult {
            value_type: value.kind_label(),
            return_type: self.invocation.return_type.to_string(),
            method: self.invocation.describe_method(),
        }
    }

    /// Records a return value, converted to the declared return type.
    pub(crate) fn add_value(&mut self, value: Value) -> Result<(), MockError> {
        if self.invocation.is_constructor() && value != Value::Unit && value != Value::Null {
            return Err(MockError::illegal_argument(format!(
                "constructor {} cannot return {value}",
                self.invocation.describe_method()
            )));
        }
        match convert_recorded(value.clone(), &self.invocation.return_type) {
            Some(Recorded::One(v)) => self.push(InvocationResult::Return(v)),
            Some(Recorded::Consecutive(vs)) => {
                for v in vs {
                    self.push(InvocationResult::Return(v));
                }
            }
            None => return Err(self.incompatible(&value)),
        }
        Ok(())
    }

    /// Records consecutive return values.
    pub(crate) fn add_values(&mut self, values: Vec<Value>) -> Result<(), MockError> {
        if values.is_empty() {
            return Err(MockError::illegal_argument("no values to return"));
        }
        if self.invocation.is_constructor() {
            return Err(MockError::illegal_argument(format!(
                "constructor {} cannot return values",
                self.invocation.describe_method()
            )));
        }
        let first = values.first().cloned().unwrap_or(Value::Null);
        let converted = convert_sequence(values, &self.invocation.return_type)
            .ok_or_else(|| self.incompatible(&first))?;
        for v in converted {
            self.push(InvocationResult::Return(v));
        }
        Ok(())
    }

    pub(crate) fn add_thrown(&mut self, thrown: Thrown) {
        self.push(InvocationResult::Throw(thrown));
    }

    pub(crate) fn add_delegate(&mut self, delegate: Arc<dyn Delegate>) {
        self.push(InvocationResult::Delegate(delegate));
    }

    pub(crate) fn add_real_implementation(&mut self) {
        self.push(InvocationResult::RealImplementation);
    }

    /// Description with the outstanding count, for missing-invocation errors.
    pub(crate) fn missing_error(&self, non_matching: Vec<String>) -> MockError {
        MockError::MissingInvocation {
            expected: self.invocation.to_string(),
            missing: self.constraints.missing(),
            non_matching,
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::value::InstanceId;

    fn expectation(sig: &str, origin: Origin) -> Expectation {
        let method = Arc::new(MethodSignature::parse(sig).unwrap());
        let invocation = ExpectedInvocation {
            instance: Some(ObjectRef::new(InstanceId(1), "Calculator")),
            match_instance: false,
            class: "Calculator".into(),
            return_type: method.returns().clone(),
            args: ArgumentSpec::exact(&method, &[]),
            method,
        };
        Expectation::new(ExpectationId(0), origin, invocation)
    }

    #[test]
    fn default_limits_depend_on_origin() {
        let strict = expectation("reset()", Origin::Strict);
        assert_eq!((strict.constraints.min, strict.constraints.max), (1, None));
        let loose = expectation("reset()", Origin::NonStrict);
        assert_eq!((loose.constraints.min, loose.constraints.max), (0, None));
    }

    #[test]
    fn min_above_max_is_rejected() {
        let mut c = InvocationConstraints::new(0, None);
        assert!(c.set_limits(3, Some(2)).is_err());
        assert!(c.set_limits(2, Some(2)).is_ok());
        c.increment();
        c.increment();
        assert!(c.is_at_max());
        assert!(!c.exceeds_max());
    }

    #[test]
    fn recording_results_raises_finite_maximum() {
        let mut e = expectation("total() -> i32", Origin::Strict);
        e.constraints.set_limits(1, Some(1)).unwrap();
        e.add_values(vec![Value::Int(1), Value::Int(2), Value::Int(3)]).unwrap();
        assert_eq!(e.constraints.max, Some(3));
    }

    #[test]
    fn incompatible_value_is_rejected_at_record_time() {
        let mut e = expectation("total() -> i32", Origin::Strict);
        let err = e.add_value(Value::str("seven")).unwrap_err();
        assert!(matches!(err, MockError::IncompatibleResult { .. }), "got {err:?}");
    }

    #[test]
    fn constructor_cannot_return_a_value() {
        let mut e = expectation("<init>()", Origin::Strict);
        assert!(matches!(e.add_value(Value::Int(1)), Err(MockError::IllegalArgument(_))));
        assert!(e.add_value(Value::Unit).is_ok());
    }
}
