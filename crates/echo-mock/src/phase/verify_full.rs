// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Full verification: every replayed invocation in scope must be explained.
//!
//! An invocation is explained when some verification block matched it, or
//! when its expectation had a positive minimum (a recorded strict call is
//! already verified implicitly), or when it ran real code.

use super::{OrderedVerificationPhase, PhaseContext, PhaseHandler, PhaseKind, Production, UnorderedVerificationPhase};
use crate::error::{MockError, UnexpectedReason};
use crate::invocation::Invocation;
use crate::state::{describe_replay, PhasedExecutionState, ReplayedInvocation};
use crate::value::{ObjectRef, TypeName};

/// Restricts full verification to some mocks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerifyScope {
    /// Invocations on any instance of the type, and its static methods.
    Type(TypeName),
    /// Invocations on one instance.
    Instance(ObjectRef),
}

#[derive(Debug)]
pub(crate) enum FullVerificationPhase {
    Unordered(UnorderedVerificationPhase, Vec<VerifyScope>),
    Ordered(OrderedVerificationPhase, Vec<VerifyScope>),
}

impl FullVerificationPhase {
    pub(crate) fn new(block: u32, ordered: bool, scope: Vec<VerifyScope>) -> Self {
        if ordered {
            Self::Ordered(OrderedVerificationPhase::new(block), scope)
        } else {
            Self::Unordered(UnorderedVerificationPhase::new(block), scope)
        }
    }

    pub(crate) fn apply_limits(
        &mut self,
        state: &mut PhasedExecutionState,
        min: u32,
        max: Option<u32>,
    ) -> Result<(), MockError> {
        match self {
            Self::Unordered(phase, _) => phase.apply_limits(state, min, max),
            Self::Ordered(phase, _) => phase.apply_limits(state, min, max),
        }
    }

    fn in_scope(scope: &[VerifyScope], state: &PhasedExecutionState, entry: &ReplayedInvocation) -> bool {
        if scope.is_empty() {
            return true;
        }
        let class = &state.get(entry.expectation).invocation.class;
        scope.iter().any(|s| match (s, &entry.instance) {
            (VerifyScope::Type(name), _) => name == class,
            (VerifyScope::Instance(obj), Some(instance)) => state.equivalence.is_equivalent(obj, instance),
            (VerifyScope::Instance(obj), None) => obj.type_name() == class,
        })
    }

    /// Closes the block; the first unexplained invocation in scope fails it.
    pub(crate) fn end(&mut self, state: &PhasedExecutionState) -> Result<(), MockError> {
        let scope = match self {
            Self::Unordered(phase, scope) => {
                phase.end()?;
                scope
            }
            Self::Ordered(phase, scope) => {
                phase.end()?;
                scope
            }
        };
        let unexplained = state.replay_log.iter().enumerate().find(|(index, entry)| {
            let expectation = state.get(entry.expectation);
            expectation.constraints.min == 0
                && !expectation.executed_real
                && !state.is_verified(*index)
                && Self::in_scope(scope, state, entry)
        });
        match unexplained {
            Some((_, entry)) => Err(MockError::unexpected(
                describe_replay(&state.get(entry.expectation).invocation, entry),
                UnexpectedReason::NotVerified,
            )),
            None => Ok(()),
        }
    }
}

impl PhaseHandler for FullVerificationPhase {
    fn kind(&self) -> PhaseKind {
        PhaseKind::VerifyFull
    }

    fn handle_invocation(
        &mut self,
        ctx: &mut PhaseContext<'_>,
        invocation: &Invocation,
    ) -> Result<Production, MockError> {
        match self {
            Self::Unordered(phase, _) => phase.handle_invocation(ctx, invocation),
            Self::Ordered(phase, _) => phase.handle_invocation(ctx, invocation),
        }
    }
}
