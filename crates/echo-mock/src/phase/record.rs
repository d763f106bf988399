// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Record phase: every invocation becomes an expectation.

use std::sync::Arc;

use tracing::{debug, trace};

use super::{ArgumentStaging, PhaseContext, PhaseHandler, PhaseKind, Production};
use crate::config::Strictness;
use crate::error::{MockError, Thrown};
use crate::expectation::{Expectation, ExpectationId, Origin};
use crate::invocation::Invocation;
use crate::matcher::ArgMatcher;
use crate::results::Delegate;
use crate::state::{PhasedExecutionState, StrictTarget};
use crate::value::{ObjectRef, Value};

#[derive(Debug)]
pub(crate) struct RecordPhase {
    strictness: Strictness,
    staging: ArgumentStaging,
    current: Option<ExpectationId>,
    strict_start: usize,
    non_strict: Vec<ExpectationId>,
}

impl RecordPhase {
    pub(crate) fn new(strictness: Strictness, state: &PhasedExecutionState) -> Self {
        Self {
            strictness,
            staging: ArgumentStaging::default(),
            current: None,
            strict_start: state.strict.len(),
            non_strict: Vec::new(),
        }
    }

    fn current<'s>(&self, state: &'s mut PhasedExecutionState) -> Result<&'s mut Expectation, MockError> {
        let id = self
            .current
            .ok_or_else(|| MockError::illegal_state("no invocation has been recorded in this block yet"))?;
        Ok(state.get_mut(id))
    }

    pub(crate) fn stage_matcher(&mut self, matcher: ArgMatcher) {
        self.staging.push(matcher);
    }

    pub(crate) fn stage_matcher_at(&mut self, position: usize, matcher: ArgMatcher) {
        self.staging.set(position, matcher);
    }

    pub(crate) fn stage_instance(&mut self, instance: ObjectRef) {
        self.staging.on_instance(instance);
    }

    pub(crate) fn set_iterations(&mut self, iterations: u32) -> Result<(), MockError> {
        self.staging.set_iterations(iterations)
    }

    pub(crate) fn add_value(&self, state: &mut PhasedExecutionState, value: Value) -> Result<(), MockError> {
        self.current(state)?.add_value(value)
    }

    pub(crate) fn add_values(&self, state: &mut PhasedExecutionState, values: Vec<Value>) -> Result<(), MockError> {
        self.current(state)?.add_values(values)
    }

    pub(crate) fn add_thrown(&self, state: &mut PhasedExecutionState, thrown: Thrown) -> Result<(), MockError> {
        self.current(state)?.add_thrown(thrown);
        Ok(())
    }

    pub(crate) fn add_delegate(
        &self,
        state: &mut PhasedExecutionState,
        delegate: Arc<dyn Delegate>,
    ) -> Result<(), MockError> {
        self.current(state)?.add_delegate(delegate);
        Ok(())
    }

    pub(crate) fn add_real_implementation(&self, state: &mut PhasedExecutionState) -> Result<(), MockError> {
        self.current(state)?.add_real_implementation();
        Ok(())
    }

    pub(crate) fn limits(&self, state: &mut PhasedExecutionState) -> Result<(u32, Option<u32>), MockError> {
        let constraints = &self.current(state)?.constraints;
        Ok((constraints.min, constraints.max))
    }

    pub(crate) fn set_limits(
        &self,
        state: &mut PhasedExecutionState,
        min: u32,
        max: Option<u32>,
    ) -> Result<(), MockError> {
        self.current(state)?.constraints.set_limits(min, max)
    }

    /// Closes the block: strict expectations recorded in it are repeated
    /// once per extra iteration, non-strict limits are scaled.
    pub(crate) fn end(&mut self, state: &mut PhasedExecutionState) -> Result<(), MockError> {
        if self.staging.discard() {
            return Err(MockError::illegal_state(
                "argument matchers were staged without a following invocation",
            ));
        }
        let iterations = self.staging.iterations();
        if iterations > 1 {
            let segment: Vec<ExpectationId> = state.strict[self.strict_start..].to_vec();
            for _ in 1..iterations {
                for &id in &segment {
                    let copy = state.get(id).replicate(state.next_id());
                    state.add_expectation(copy);
                }
            }
            for &id in &self.non_strict {
                let expectation = state.get_mut(id);
                if !expectation.superseded {
                    expectation.scale_limits(iterations);
                }
            }
        }
        debug!(
            iterations,
            strict = state.strict.len() - self.strict_start,
            non_strict = self.non_strict.len(),
            "record block closed"
        );
        Ok(())
    }
}

impl PhaseHandler for RecordPhase {
    fn kind(&self) -> PhaseKind {
        PhaseKind::Record
    }

    fn handle_invocation(
        &mut self,
        ctx: &mut PhaseContext<'_>,
        invocation: &Invocation,
    ) -> Result<Production, MockError> {
        let expected = self.staging.take_expected(ctx.state, invocation)?;
        let strict = self.strictness == Strictness::Strict && !ctx.state.is_loose(&invocation.class);
        if strict {
            let target = match (&expected.instance, expected.match_instance) {
                (Some(instance), true) => StrictTarget::Instance(instance.clone()),
                _ => StrictTarget::Type(invocation.class.clone()),
            };
            ctx.state.add_strict_target(target);
        }
        let origin = if strict { Origin::Strict } else { Origin::NonStrict };
        let expectation = Expectation::new(ctx.state.next_id(), origin, expected);
        let (id, superseded) = ctx.state.add_expectation(expectation);
        if let Some(old) = superseded {
            ctx.mocks.lock().inherit_cascades(old, id);
        }
        if !strict {
            self.non_strict.push(id);
        }
        self.current = Some(id);
        trace!(%invocation, strict, expectation = id.0, "recorded expectation");
        Ok(Production::Value(ctx.default_value(id, invocation.return_type())))
    }
}
