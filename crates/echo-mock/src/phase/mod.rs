// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Phase handlers.
//!
//! Exactly one phase handles intercepted invocations at a time. Record and
//! verification phases are driven by blocks on the test thread; replay runs
//! between them and persists after a verification block closes.

mod record;
mod replay;
mod verify;
mod verify_full;
mod verify_ordered;
mod verify_unordered;

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

pub(crate) use record::RecordPhase;
pub(crate) use replay::ReplayPhase;
pub(crate) use verify_full::FullVerificationPhase;
pub use verify_full::VerifyScope;
pub(crate) use verify_ordered::OrderedVerificationPhase;
pub(crate) use verify_unordered::UnorderedVerificationPhase;

use crate::config::EngineConfig;
use crate::error::{MockError, Thrown};
use crate::expectation::{ExpectationId, ExpectedInvocation};
use crate::invocation::Invocation;
use crate::matcher::{ArgMatcher, ArgumentSpec};
use crate::registry::MockRegistry;
use crate::results::{Delegate, InvocationResult};
use crate::signature::TypeDesc;
use crate::state::PhasedExecutionState;
use crate::value::{ObjectRef, Value};

/// Which phase is handling invocations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhaseKind {
    /// Expectations are being recorded.
    Record,
    /// Code under test is running.
    Replay,
    /// Invocations are being verified without regard to order.
    VerifyUnordered,
    /// Invocations are being verified in replay order.
    VerifyOrdered,
    /// Invocations are being verified exhaustively.
    VerifyFull,
}

impl PhaseKind {
    /// True for the three verification phases.
    pub fn is_verification(self) -> bool {
        matches!(self, Self::VerifyUnordered | Self::VerifyOrdered | Self::VerifyFull)
    }
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Record => "record",
            Self::Replay => "replay",
            Self::VerifyUnordered => "verify-unordered",
            Self::VerifyOrdered => "verify-ordered",
            Self::VerifyFull => "verify-full",
        };
        f.write_str(s)
    }
}

/// What a phase decided for one invocation. Delegates are invoked by the
/// coordinator after every lock is released.
pub(crate) enum Production {
    Value(Value),
    Throw(Thrown),
    ExecuteReal,
    Delegate(DelegateProduction),
}

pub(crate) struct DelegateProduction {
    pub(crate) delegate: Arc<dyn Delegate>,
    pub(crate) return_type: TypeDesc,
    pub(crate) method: String,
    pub(crate) invocation_count: u32,
    pub(crate) min_invocations: u32,
    pub(crate) max_invocations: Option<u32>,
}

/// Borrowed engine state handed to a phase for one call.
pub(crate) struct PhaseContext<'a> {
    pub(crate) state: &'a mut PhasedExecutionState,
    pub(crate) mocks: &'a Mutex<MockRegistry>,
    pub(crate) config: &'a EngineConfig,
}

impl PhaseContext<'_> {
    /// Default outcome for `return_type`: a cascaded mock tied to `id` when
    /// cascading applies, else the zero value.
    pub(crate) fn default_value(&self, id: ExpectationId, return_type: &TypeDesc) -> Value {
        match return_type.object_name() {
            Some(name) if self.config.cascading => {
                Value::Object(self.mocks.lock().cascade_for_expectation(id, name))
            }
            _ => return_type.zero_value(),
        }
    }

    /// Consumes the next outcome of expectation `id`.
    pub(crate) fn produce(&mut self, id: ExpectationId) -> Production {
        let expectation = self.state.get_mut(id);
        let return_type = expectation.invocation.return_type.clone();
        let Some(result) = expectation.results.next_result() else {
            return Production::Value(self.default_value(id, &return_type));
        };
        match result {
            InvocationResult::Return(value) => Production::Value(value),
            InvocationResult::Throw(thrown) => Production::Throw(thrown),
            InvocationResult::RealImplementation => Production::ExecuteReal,
            InvocationResult::Delegate(delegate) => Production::Delegate(DelegateProduction {
                delegate,
                method: expectation.invocation.describe_method(),
                invocation_count: expectation.constraints.count,
                min_invocations: expectation.constraints.min,
                max_invocations: expectation.constraints.max,
                return_type,
            }),
        }
    }
}

/// Behavior shared by every phase.
pub(crate) trait PhaseHandler {
    fn kind(&self) -> PhaseKind;

    /// Handles one intercepted invocation. Errors are raised to the caller
    /// in record and verification phases and deferred in replay.
    fn handle_invocation(
        &mut self,
        ctx: &mut PhaseContext<'_>,
        invocation: &Invocation,
    ) -> Result<Production, MockError>;
}

/// How a verification block checks the replay log.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum VerifyMode {
    /// Each verified invocation happened, in any order.
    #[default]
    Unordered,
    /// Verified invocations happened in the order they are verified.
    Ordered,
    /// Every replayed invocation in `scope` is verified or recorded.
    Full {
        /// Also require replay order.
        ordered: bool,
        /// Mocks the check covers; empty means all of them.
        scope: Vec<VerifyScope>,
    },
}

/// The verification phase of an open block.
#[derive(Debug)]
pub(crate) enum VerificationPhase {
    Unordered(UnorderedVerificationPhase),
    Ordered(OrderedVerificationPhase),
    Full(FullVerificationPhase),
}

impl VerificationPhase {
    pub(crate) fn new(mode: VerifyMode, block: u32) -> Self {
        match mode {
            VerifyMode::Unordered => Self::Unordered(UnorderedVerificationPhase::new(block)),
            VerifyMode::Ordered => Self::Ordered(OrderedVerificationPhase::new(block)),
            VerifyMode::Full { ordered, scope } => Self::Full(FullVerificationPhase::new(block, ordered, scope)),
        }
    }

    pub(crate) fn staging(&mut self) -> &mut ArgumentStaging {
        match self {
            Self::Unordered(phase) | Self::Full(FullVerificationPhase::Unordered(phase, _)) => &mut phase.core.staging,
            Self::Ordered(phase) | Self::Full(FullVerificationPhase::Ordered(phase, _)) => &mut phase.core.staging,
        }
    }

    pub(crate) fn apply_limits(
        &mut self,
        state: &mut PhasedExecutionState,
        min: u32,
        max: Option<u32>,
    ) -> Result<(), MockError> {
        match self {
            Self::Unordered(phase) => phase.apply_limits(state, min, max),
            Self::Ordered(phase) => phase.apply_limits(state, min, max),
            Self::Full(phase) => phase.apply_limits(state, min, max),
        }
    }

    pub(crate) fn end(&mut self, state: &PhasedExecutionState) -> Result<(), MockError> {
        match self {
            Self::Unordered(phase) => phase.end(),
            Self::Ordered(phase) => phase.end(),
            Self::Full(phase) => phase.end(state),
        }
    }
}

impl PhaseHandler for VerificationPhase {
    fn kind(&self) -> PhaseKind {
        match self {
            Self::Unordered(phase) => phase.kind(),
            Self::Ordered(phase) => phase.kind(),
            Self::Full(phase) => phase.kind(),
        }
    }

    fn handle_invocation(
        &mut self,
        ctx: &mut PhaseContext<'_>,
        invocation: &Invocation,
    ) -> Result<Production, MockError> {
        match self {
            Self::Unordered(phase) => phase.handle_invocation(ctx, invocation),
            Self::Ordered(phase) => phase.handle_invocation(ctx, invocation),
            Self::Full(phase) => phase.handle_invocation(ctx, invocation),
        }
    }
}

/// Matchers and receiver staged for the next invocation of a block.
#[derive(Debug, Default)]
pub(crate) struct ArgumentStaging {
    matchers: Vec<Option<ArgMatcher>>,
    instance: Option<ObjectRef>,
    iterations: u32,
}

impl ArgumentStaging {
    pub(crate) fn push(&mut self, matcher: ArgMatcher) {
        self.matchers.push(Some(matcher));
    }

    pub(crate) fn set(&mut self, position: usize, matcher: ArgMatcher) {
        if self.matchers.len() <= position {
            self.matchers.resize(position + 1, None);
        }
        self.matchers[position] = Some(matcher);
    }

    pub(crate) fn on_instance(&mut self, instance: ObjectRef) {
        self.instance = Some(instance);
    }

    pub(crate) fn set_iterations(&mut self, iterations: u32) -> Result<(), MockError> {
        if iterations == 0 {
            return Err(MockError::illegal_argument("iterations must be at least 1"));
        }
        self.iterations = iterations;
        Ok(())
    }

    /// Repetition count of the block; 1 when never set.
    pub(crate) fn iterations(&self) -> u32 {
        self.iterations.max(1)
    }

    /// Builds the expected form of `invocation`, consuming staged matchers
    /// and receiver.
    pub(crate) fn take_expected(
        &mut self,
        state: &PhasedExecutionState,
        invocation: &Invocation,
    ) -> Result<ExpectedInvocation, MockError> {
        let staged = std::mem::take(&mut self.matchers);
        let pinned = self.instance.take();
        let args = ArgumentSpec::new(&invocation.method, &invocation.args, staged)?;
        let (instance, match_instance) = match (pinned, &invocation.instance) {
            (Some(pinned), Some(_)) if *pinned.type_name() == invocation.class => (Some(pinned), true),
            (_, Some(actual)) => (
                Some(actual.clone()),
                !invocation.is_constructor() && state.is_matched_on_instance(&invocation.class),
            ),
            (_, None) => (None, false),
        };
        Ok(ExpectedInvocation {
            instance,
            match_instance,
            class: invocation.class.clone(),
            method: Arc::clone(&invocation.method),
            return_type: invocation.return_type().clone(),
            args,
        })
    }

    /// Drops staged matchers that no invocation consumed.
    pub(crate) fn discard(&mut self) -> bool {
        let had = self.matchers.iter().any(Option::is_some) || self.instance.is_some();
        self.matchers.clear();
        self.instance = None;
        had
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::signature::MethodSignature;
    use crate::value::InstanceId;

    fn invocation(instance: &ObjectRef, sig: &str, args: Vec<Value>) -> Invocation {
        let method = Arc::new(MethodSignature::parse(sig).unwrap());
        Invocation::new(Some(instance.clone()), instance.type_name().clone(), method, args)
    }

    #[test]
    fn staged_matchers_are_consumed_once() {
        let state = PhasedExecutionState::default();
        let calc = ObjectRef::new(InstanceId(1), "Calculator");
        let mut staging = ArgumentStaging::default();
        staging.set(1, ArgMatcher::Any);
        let call = invocation(&calc, "add(i32, i32) -> i32", vec![Value::Int(1), Value::Int(0)]);
        let expected = staging.take_expected(&state, &call).unwrap();
        assert_eq!(expected.args.to_string(), "(1, any)");
        let again = staging.take_expected(&state, &call).unwrap();
        assert!(!again.args.has_matchers());
    }

    #[test]
    fn pinned_instance_forces_instance_matching() {
        let state = PhasedExecutionState::default();
        let a = ObjectRef::new(InstanceId(1), "Calculator");
        let b = ObjectRef::new(InstanceId(2), "Calculator");
        let mut staging = ArgumentStaging::default();
        staging.on_instance(b.clone());
        let expected = staging
            .take_expected(&state, &invocation(&a, "reset()", vec![]))
            .unwrap();
        assert_eq!(expected.instance, Some(b));
        assert!(expected.match_instance);
    }

    #[test]
    fn zero_iterations_rejected() {
        let mut staging = ArgumentStaging::default();
        assert_eq!(staging.iterations(), 1);
        assert!(staging.set_iterations(0).is_err());
        staging.set_iterations(3).unwrap();
        assert_eq!(staging.iterations(), 3);
    }
}
