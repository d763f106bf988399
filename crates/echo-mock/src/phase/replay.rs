// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Replay phase: invocations from code under test are matched against
//! recorded expectations.
//!
//! Non-strict expectations are searched first, by predicate. Receivers
//! registered as strict then walk the strict list from a monotonic cursor:
//! satisfied expectations are skipped, an outstanding one that differs is a
//! failure. Anything else gets a dynamic non-strict expectation.

use tracing::{debug, trace};

use super::{PhaseContext, PhaseHandler, PhaseKind, Production};
use crate::config::StrictAdvancePolicy;
use crate::error::{MockError, UnexpectedReason};
use crate::expectation::ExpectationId;
use crate::invocation::{ExecutionMode, Invocation};
use crate::state::PhasedExecutionState;

#[derive(Debug, Default)]
pub(crate) struct ReplayPhase {
    strict_cursor: usize,
}

/// Result of walking the strict list.
enum StrictMatch {
    Found(usize),
    Exhausted { max_reached: Option<u32> },
}

impl ReplayPhase {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Walks the strict list from the cursor.
    fn match_strict(
        &self,
        state: &PhasedExecutionState,
        policy: StrictAdvancePolicy,
        invocation: &Invocation,
    ) -> Result<StrictMatch, MockError> {
        let mut max_reached = None;
        let mut i = self.strict_cursor;
        while let Some(&id) = state.strict.get(i) {
            let expectation = state.get(id);
            let satisfied = expectation.constraints.is_satisfied();
            if state.signature_matches(expectation, invocation) {
                let args = &expectation.invocation.args;
                match args.first_mismatch(&invocation.args, &state.equivalence) {
                    None if expectation.constraints.is_at_max() => {
                        max_reached = expectation.constraints.max;
                    }
                    None => {
                        if satisfied && policy == StrictAdvancePolicy::PreferUnsatisfied {
                            if let Some(later) = Self::later_unsatisfied(state, i + 1, invocation) {
                                return Ok(StrictMatch::Found(later));
                            }
                        }
                        return Ok(StrictMatch::Found(i));
                    }
                    Some(_) if satisfied => {}
                    Some(position) => {
                        return Err(MockError::ArgumentMismatch {
                            expected: expectation.invocation.to_string(),
                            position,
                            matcher: args.describe_position(position),
                            actual: args.describe_actual(&invocation.args, position),
                        });
                    }
                }
            } else if !satisfied {
                return Err(MockError::unexpected(
                    invocation,
                    UnexpectedReason::OutOfOrder {
                        required: expectation.invocation.to_string(),
                    },
                ));
            }
            i += 1;
        }
        Ok(StrictMatch::Exhausted { max_reached })
    }

    /// First later expectation that fully matches and is still below its
    /// minimum, reachable across satisfied expectations only.
    fn later_unsatisfied(state: &PhasedExecutionState, from: usize, invocation: &Invocation) -> Option<usize> {
        for (offset, &id) in state.strict[from..].iter().enumerate() {
            let expectation = state.get(id);
            let satisfied = expectation.constraints.is_satisfied();
            if !satisfied && !expectation.constraints.is_at_max() && state.fully_matches(expectation, invocation) {
                return Some(from + offset);
            }
            if !satisfied {
                return None;
            }
        }
        None
    }

    /// Counts a matched invocation and records it in the replay log.
    fn consume(
        ctx: &mut PhaseContext<'_>,
        id: ExpectationId,
        invocation: &Invocation,
    ) -> Result<(), MockError> {
        let state = &mut *ctx.state;
        let recorded_mock = {
            let expectation = state.get(id);
            expectation.invocation.args.capture(&invocation.args);
            if expectation.invocation.is_constructor() && expectation.is_recorded() {
                expectation.invocation.instance.clone()
            } else {
                None
            }
        };
        if let (Some(fresh), Some(mock)) = (&invocation.instance, &recorded_mock) {
            if state.equivalence.register(fresh, mock) {
                debug!(%fresh, %mock, mapped = state.equivalence.len(), "instance stands in for mock");
            }
        }
        let expectation = state.get_mut(id);
        expectation.constraints.increment();
        let over = expectation.constraints.exceeds_max().then_some(expectation.constraints.max);
        state.log_replay(id, invocation);
        if let Some(Some(max)) = over {
            return Err(MockError::unexpected(invocation, UnexpectedReason::TooMany { max }));
        }
        Ok(())
    }

    /// Every recorded expectation still below its minimum, first one wins.
    pub(crate) fn end_execution(&self, state: &PhasedExecutionState) -> Result<(), MockError> {
        let missing = state
            .expectations()
            .find(|e| e.is_recorded() && !e.superseded && !e.constraints.is_satisfied());
        match missing {
            Some(expectation) => Err(expectation.missing_error(state.non_matching_calls(expectation.id))),
            None => Ok(()),
        }
    }
}

impl PhaseHandler for ReplayPhase {
    fn kind(&self) -> PhaseKind {
        PhaseKind::Replay
    }

    fn handle_invocation(
        &mut self,
        ctx: &mut PhaseContext<'_>,
        invocation: &Invocation,
    ) -> Result<Production, MockError> {
        if let Some(id) = ctx.state.find_non_strict(invocation) {
            Self::consume(ctx, id, invocation)?;
            let expectation = ctx.state.get_mut(id);
            if !expectation.is_recorded() && invocation.mode == ExecutionMode::Partial {
                expectation.executed_real = true;
                return Ok(Production::ExecuteReal);
            }
            trace!(%invocation, expectation = id.0, "matched non-strict expectation");
            return Ok(ctx.produce(id));
        }

        if ctx.state.is_strict_target(invocation) {
            match self.match_strict(ctx.state, ctx.config.strict_advance, invocation)? {
                StrictMatch::Found(index) => {
                    let id = ctx.state.strict[index];
                    self.strict_cursor = index;
                    Self::consume(ctx, id, invocation)?;
                    trace!(%invocation, expectation = id.0, cursor = index, "matched strict expectation");
                    return Ok(ctx.produce(id));
                }
                StrictMatch::Exhausted { .. } if invocation.mode == ExecutionMode::Partial => {}
                StrictMatch::Exhausted { max_reached } => {
                    let reason = max_reached.map_or(UnexpectedReason::NotRecorded, |max| UnexpectedReason::TooMany { max });
                    return Err(MockError::unexpected(invocation, reason));
                }
            }
        }

        let id = ctx.state.add_replayed(invocation);
        Self::consume(ctx, id, invocation)?;
        if invocation.mode == ExecutionMode::Partial {
            ctx.state.get_mut(id).executed_real = true;
            return Ok(Production::ExecuteReal);
        }
        trace!(%invocation, expectation = id.0, "created dynamic expectation");
        Ok(ctx.produce(id))
    }
}
